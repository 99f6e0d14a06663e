use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use warden_lib::{
    config::{Settings, DEFAULT_CONFIG_FILE},
    error::AppError,
    AppState, NewUser, UserChanges, UserId,
};
use zeroize::Zeroizing;

/// Operator tool for Warden user accounts
#[derive(Parser, Debug)]
#[command(name = "warden", version, about)]
struct Cli {
    /// Configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Overrides `data_dir` from the configuration
    #[arg(long)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an account
    CreateUser {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        password_confirmation: Option<String>,
    },
    /// Change a password; the current one is required
    ChangePassword {
        #[arg(long)]
        id: UserId,
        #[arg(long)]
        old_password: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        password_confirmation: Option<String>,
    },
    /// Change the email address
    ChangeEmail {
        #[arg(long)]
        id: UserId,
        #[arg(long)]
        email: String,
    },
    /// Check an email and password
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Issue a remember-token and print it
    Remember {
        #[arg(long)]
        id: UserId,
    },
    /// Revoke the active remember-token
    Forget {
        #[arg(long)]
        id: UserId,
    },
    /// Log in with a remember-token
    VerifyToken {
        #[arg(long)]
        id: UserId,
        #[arg(long)]
        token: String,
    },
    /// Print an account
    Show {
        #[arg(long)]
        id: UserId,
    },
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let mut settings = Settings::load_from(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;
    if let Some(data_dir) = cli.data_dir {
        settings.data_dir = data_dir;
    }
    init_tracing(&settings.log_level);
    tracing::debug!(data_dir = %settings.data_dir.display(), "configuration loaded");

    let state = AppState::from_settings(settings).context("initialising user store")?;

    match run(&state, cli.command).await {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(AppError::Validation(errors)) => {
            for message in errors.full_messages() {
                eprintln!("{message}");
            }
            Ok(ExitCode::FAILURE)
        }
        Err(AppError::NotAuthenticated) => {
            eprintln!("not authenticated");
            Ok(ExitCode::FAILURE)
        }
        Err(e) => Err(e.into()),
    }
}

async fn run<S>(state: &AppState<S>, command: Command) -> Result<(), AppError>
where
    S: warden_lib::storage::UserStore + Clone + 'static,
{
    match command {
        Command::CreateUser {
            email,
            password,
            password_confirmation,
        } => {
            let new_user = NewUser {
                email,
                password: Some(Zeroizing::new(password)),
                password_confirmation: password_confirmation.map(Zeroizing::new),
            };
            let user = state.users.create(new_user).await?;
            print_json(&user.view())
        }
        Command::ChangePassword {
            id,
            old_password,
            password,
            password_confirmation,
        } => {
            let changes = UserChanges {
                password: Some(Zeroizing::new(password)),
                password_confirmation: password_confirmation.map(Zeroizing::new),
                old_password: Some(Zeroizing::new(old_password)),
                ..UserChanges::default()
            };
            let user = state.users.update(id, changes).await?;
            print_json(&user.view())
        }
        Command::ChangeEmail { id, email } => {
            let user = state.users.update(id, UserChanges::email(email)).await?;
            print_json(&user.view())
        }
        Command::Login { email, password } => {
            let password = Zeroizing::new(password);
            let user = state
                .auth
                .authenticate_password(&email, &password)
                .await?
                .ok_or(AppError::NotAuthenticated)?;
            print_json(&user.view())
        }
        Command::Remember { id } => {
            let mut user = state.users.find(id).await?;
            let token = state.remember.remember_me(&mut user).await?;
            println!("{}", token.as_str());
            Ok(())
        }
        Command::Forget { id } => {
            let mut user = state.users.find(id).await?;
            state.remember.forget_me(&mut user).await?;
            print_json(&user.view())
        }
        Command::VerifyToken { id, token } => {
            let token = Zeroizing::new(token);
            let user = state
                .auth
                .authenticate_remember_token(id, &token)
                .await?
                .ok_or(AppError::NotAuthenticated)?;
            print_json(&user.view())
        }
        Command::Show { id } => print_json(&state.users.find(id).await?.view()),
    }
}

fn print_json(value: &impl serde::Serialize) -> Result<(), AppError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_every_subcommand_has_help() {
        for sub in Cli::command().get_subcommands() {
            assert!(sub.get_about().is_some(), "{} has no help", sub.get_name());
        }
    }

    #[test]
    fn test_parse_remember() {
        let id = UserId::new();
        let cli = Cli::try_parse_from(["warden", "remember", "--id", &id.to_string()]).unwrap();
        assert!(matches!(cli.command, Command::Remember { id: parsed } if parsed == id));
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_FILE));
    }

    #[test]
    fn test_rejects_malformed_id() {
        assert!(Cli::try_parse_from(["warden", "forget", "--id", "42"]).is_err());
    }
}
