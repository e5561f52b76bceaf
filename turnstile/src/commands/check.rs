//! The `check` command.

use async_trait::async_trait;
use turnstile_core::checks::CheckRegistry;
use turnstile_core::error::{TurnstileError, TurnstileResult};
use turnstile_core::Settings;

use crate::command::ManagementCommand;

/// Runs the system checks and fails if any reports an error.
pub struct CheckCommand;

#[async_trait]
impl ManagementCommand for CheckCommand {
    fn name(&self) -> &'static str {
        "check"
    }

    fn help(&self) -> &'static str {
        "Run system checks"
    }

    fn add_arguments(&self, cmd: clap::Command) -> clap::Command {
        cmd.arg(
            clap::Arg::new("tag")
                .long("tag")
                .short('t')
                .action(clap::ArgAction::Append)
                .help("Only run checks with this tag"),
        )
    }

    async fn handle(&self, matches: &clap::ArgMatches, settings: &Settings) -> TurnstileResult<()> {
        let tags: Option<Vec<&str>> = matches
            .get_many::<String>("tag")
            .map(|values| values.map(String::as_str).collect());

        let messages = CheckRegistry::with_builtins().run_checks(tags.as_deref(), settings);
        for message in &messages {
            println!("{message}");
        }

        let errors = messages.iter().filter(|m| m.is_error()).count();
        if errors > 0 {
            return Err(TurnstileError::ConfigurationError(format!(
                "System check identified {errors} error(s)."
            )));
        }
        let issues = messages.iter().filter(|m| m.is_serious()).count();
        println!("System check identified {issues} issue(s).");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(args: &[&str]) -> clap::ArgMatches {
        CheckCommand
            .add_arguments(clap::Command::new("check"))
            .try_get_matches_from(args)
            .unwrap()
    }

    #[tokio::test]
    async fn test_defaults_pass_with_warnings() {
        let result = CheckCommand.handle(&matches(&["check"]), &Settings::default()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_missing_key_outside_debug_fails() {
        let settings = Settings {
            debug: false,
            ..Settings::default()
        };
        let err = CheckCommand
            .handle(&matches(&["check"]), &settings)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("1 error(s)"));
    }

    #[tokio::test]
    async fn test_tag_filter_skips_other_checks() {
        let settings = Settings {
            debug: false,
            ..Settings::default()
        };
        let result = CheckCommand
            .handle(&matches(&["check", "--tag", "auth"]), &settings)
            .await;
        assert!(result.is_ok());
    }
}
