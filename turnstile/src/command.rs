//! Management command framework.
//!
//! A [`ManagementCommand`] declares its clap arguments and an async handler;
//! [`CommandRegistry`] assembles the registered commands into one clap
//! `Command` and dispatches parsed arguments to the matching handler.
//!
//! ```rust
//! use turnstile::command::CommandRegistry;
//!
//! let registry = CommandRegistry::with_builtins();
//! assert_eq!(registry.list_commands(), vec!["check", "createuser", "serve"]);
//! ```

use std::collections::HashMap;

use async_trait::async_trait;
use turnstile_core::error::{TurnstileError, TurnstileResult};
use turnstile_core::{settings_loader, Settings};

use crate::commands::{CheckCommand, CreateUserCommand, ServeCommand};

/// A command that can be registered and invoked through the CLI.
#[async_trait]
pub trait ManagementCommand: Send + Sync {
    /// Returns the name used to invoke this command.
    fn name(&self) -> &'static str;

    /// Returns a short help description.
    fn help(&self) -> &'static str;

    /// Adds the command's arguments. The default adds none.
    fn add_arguments(&self, cmd: clap::Command) -> clap::Command {
        cmd
    }

    /// Runs the command.
    async fn handle(&self, matches: &clap::ArgMatches, settings: &Settings) -> TurnstileResult<()>;
}

/// Registered commands, keyed by name.
pub struct CommandRegistry {
    commands: HashMap<&'static str, Box<dyn ManagementCommand>>,
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("commands", &self.list_commands())
            .finish()
    }
}

impl CommandRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            commands: HashMap::new(),
        }
    }

    /// Creates a registry holding `serve`, `createuser` and `check`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(ServeCommand));
        registry.register(Box::new(CreateUserCommand));
        registry.register(Box::new(CheckCommand));
        registry
    }

    /// Registers a command, replacing any command of the same name.
    pub fn register(&mut self, command: Box<dyn ManagementCommand>) {
        self.commands.insert(command.name(), command);
    }

    /// Returns the command with the given name.
    pub fn get(&self, name: &str) -> Option<&dyn ManagementCommand> {
        self.commands.get(name).map(AsRef::as_ref)
    }

    /// Returns the registered command names, sorted.
    pub fn list_commands(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.commands.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Returns the number of registered commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns `true` if no commands are registered.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Builds the top-level clap `Command` with one subcommand per entry.
    ///
    /// `--settings <file>` is accepted before or after the subcommand.
    pub fn build_cli(&self) -> clap::Command {
        let mut app = clap::Command::new("turnstile")
            .about("Registration, login, dashboard and logout pages")
            .subcommand_required(true)
            .arg_required_else_help(true)
            .arg(
                clap::Arg::new("settings")
                    .long("settings")
                    .global(true)
                    .value_name("FILE")
                    .help("Settings file (.toml or .json)"),
            );

        for name in self.list_commands() {
            if let Some(cmd) = self.get(name) {
                let subcmd = clap::Command::new(name).about(cmd.help());
                app = app.subcommand(cmd.add_arguments(subcmd));
            }
        }
        app
    }

    /// Dispatches parsed arguments to the selected command.
    pub async fn execute(&self, matches: &clap::ArgMatches, settings: &Settings) -> TurnstileResult<()> {
        let (name, sub_matches) = matches.subcommand().ok_or_else(|| {
            TurnstileError::ConfigurationError("No subcommand specified".to_string())
        })?;
        let cmd = self.get(name).ok_or_else(|| {
            TurnstileError::ConfigurationError(format!("Unknown command: {name}"))
        })?;

        tracing::debug!(command = name, "Running management command");
        cmd.handle(sub_matches, settings).await
    }
}

/// Loads settings from `--settings` when given, else from defaults, then
/// applies `TURNSTILE_*` environment overrides.
pub fn load_settings(matches: &clap::ArgMatches) -> TurnstileResult<Settings> {
    match matches.get_one::<String>("settings") {
        Some(path) => settings_loader::from_file_with_env(path),
        None => Ok(settings_loader::from_env()),
    }
}
