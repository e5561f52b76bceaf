//! The `createuser` command.
//!
//! Creates an account through the same validation as the registration page,
//! so the command cannot create a user the page would refuse.

use async_trait::async_trait;
use turnstile_auth::forms::{self, RegistrationForm};
use turnstile_auth::PasswordPolicy;
use turnstile_core::error::TurnstileResult;
use turnstile_core::Settings;
use turnstile_web::open_credential_store;

use crate::command::ManagementCommand;

/// Creates a user account non-interactively.
pub struct CreateUserCommand;

fn arg(matches: &clap::ArgMatches, name: &str) -> String {
    matches.get_one::<String>(name).cloned().unwrap_or_default()
}

#[async_trait]
impl ManagementCommand for CreateUserCommand {
    fn name(&self) -> &'static str {
        "createuser"
    }

    fn help(&self) -> &'static str {
        "Create a user account"
    }

    fn add_arguments(&self, cmd: clap::Command) -> clap::Command {
        cmd.arg(
            clap::Arg::new("username")
                .long("username")
                .required(true)
                .help("Username of the new account"),
        )
        .arg(
            clap::Arg::new("email")
                .long("email")
                .required(true)
                .help("Email address of the new account"),
        )
        .arg(
            clap::Arg::new("password")
                .long("password")
                .required(true)
                .help("Password of the new account"),
        )
    }

    async fn handle(&self, matches: &clap::ArgMatches, settings: &Settings) -> TurnstileResult<()> {
        if settings.database.engine == "memory" {
            tracing::warn!("The memory engine keeps no data; the user is lost when this command exits");
        }

        let password = arg(matches, "password");
        let form = RegistrationForm {
            username: arg(matches, "username"),
            email: arg(matches, "email"),
            password1: password.clone(),
            password2: password,
        };

        let store = open_credential_store(&settings.database)?;
        let policy = PasswordPolicy::from_settings(&settings.password_validation);
        let id = forms::register(&form, store.as_ref(), &policy).await?;

        println!("User '{}' created (id {id}).", form.username.trim());
        Ok(())
    }
}
