use std::process::ExitCode;

use turnstile::command::{load_settings, CommandRegistry};
use turnstile_core::logging::setup_logging;

#[tokio::main]
async fn main() -> ExitCode {
    let registry = CommandRegistry::with_builtins();
    let matches = registry.build_cli().get_matches();

    let settings = match load_settings(&matches) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };
    setup_logging(&settings);

    match registry.execute(&matches, &settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!(error = ?e, "Command failed");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
