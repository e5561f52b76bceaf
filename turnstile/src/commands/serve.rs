//! The `serve` command.

use async_trait::async_trait;
use turnstile_core::error::TurnstileResult;
use turnstile_core::Settings;
use turnstile_web::{AppState, TurnstileApp};

use crate::command::ManagementCommand;

/// Serves the pages on the configured (or given) host and port.
pub struct ServeCommand;

impl ServeCommand {
    /// Returns the bind address, with `--host`/`--port` taking precedence
    /// over the settings.
    pub fn address(matches: &clap::ArgMatches, settings: &Settings) -> String {
        let mut settings = settings.clone();
        if let Some(host) = matches.get_one::<String>("host") {
            settings.host.clone_from(host);
        }
        if let Some(port) = matches.get_one::<u16>("port") {
            settings.port = *port;
        }
        settings.bind_address()
    }
}

#[async_trait]
impl ManagementCommand for ServeCommand {
    fn name(&self) -> &'static str {
        "serve"
    }

    fn help(&self) -> &'static str {
        "Serve the pages over HTTP"
    }

    fn add_arguments(&self, cmd: clap::Command) -> clap::Command {
        cmd.arg(
            clap::Arg::new("host")
                .long("host")
                .help("Host to bind to [default: settings.host]"),
        )
        .arg(
            clap::Arg::new("port")
                .long("port")
                .value_parser(clap::value_parser!(u16))
                .help("Port to bind to [default: settings.port]"),
        )
    }

    async fn handle(&self, matches: &clap::ArgMatches, settings: &Settings) -> TurnstileResult<()> {
        let addr = Self::address(matches, settings);
        let state = AppState::from_settings(settings.clone())?;
        tracing::info!(
            debug = settings.debug,
            engine = %settings.database.engine,
            "Serving turnstile"
        );
        TurnstileApp::new(state).run(&addr).await
    }
}
