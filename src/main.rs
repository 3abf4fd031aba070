use std::path::PathBuf;
use std::process::ExitCode;

use authsync::backend::RegisterRequest;
use authsync::config::{load_config, print_schema};
use authsync::flows::{FlowError, FlowOutcome};
use authsync::session::ObserverState;
use authsync::startup::build_state;
use authsync::state::AppState;
use authsync::utils::logger::init_logging;
use clap::{Parser, Subcommand};
use tracing::error;

#[derive(Parser)]
#[command(name = "authsync")]
#[command(about = "Session and account actions against the account backend")]
#[command(version)]
struct Cli {
    /// Path to the YAML configuration
    #[arg(short, long, env = "AUTHSYNC_CONFIG", default_value = "./config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the configuration JSON schema
    Schema,
    /// Show who is logged in, validating a stored token if needed
    Whoami,
    /// Log in with email and password
    Login { email: String, password: String },
    /// Log in with a Google ID token
    GoogleLogin { id_token: String },
    /// Create an account
    Register {
        name: String,
        email: String,
        mobile: String,
        password: String,
    },
    /// Register with a Google ID token
    GoogleRegister { id_token: String },
    /// Ask for a password reset email
    ForgotPassword { email: String },
    /// Set a new password using the token from the reset email
    ResetPassword { token: String, password: String },
    /// Confirm an email address
    VerifyEmail { token: String },
    /// Forget the stored session
    Logout,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Commands::Schema = cli.command {
        return match print_schema() {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("Error printing schema: {}", e);
                ExitCode::FAILURE
            }
        };
    }

    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = init_logging(&config.logging) {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }

    let state = match build_state(config) {
        Ok(state) => state,
        Err(e) => {
            error!("Could not create backend client: {}", e);
            return ExitCode::FAILURE;
        }
    };

    run(&state, cli.command).await
}

async fn run(state: &AppState, command: Commands) -> ExitCode {
    let flows = state.flows();
    let (result, failure_text) = match command {
        Commands::Schema => return ExitCode::SUCCESS,
        Commands::Whoami => {
            let observer = state.mount_observer("cli").await;
            match observer.state() {
                ObserverState::LoggedIn(user) => {
                    println!("{}", user.display_name());
                    if let Some(email) = &user.email {
                        println!("email:    {}", email);
                    }
                    if let Some(mobile) = &user.mobile {
                        println!("mobile:   {}", mobile);
                    }
                    println!(
                        "status:   {}",
                        if user.verified { "Verified" } else { "Not Verified" }
                    );
                    if let Some(created) = user.created_at_utc() {
                        println!("created:  {}", created.to_rfc2822());
                    }
                }
                _ => println!("logged out"),
            }
            return ExitCode::SUCCESS;
        }
        Commands::Logout => {
            flows.logout();
            println!("logged out");
            return ExitCode::SUCCESS;
        }
        Commands::Login { email, password } => {
            (flows.login(&email, &password).await, "Login failed")
        }
        Commands::GoogleLogin { id_token } => {
            (flows.google_login(&id_token).await, "Google login failed")
        }
        Commands::Register {
            name,
            email,
            mobile,
            password,
        } => {
            let form = RegisterRequest {
                name,
                email,
                mobile,
                password,
            };
            (flows.register(&form).await, "Registration failed")
        }
        Commands::GoogleRegister { id_token } => (
            flows.google_register(&id_token).await,
            "Google registration failed",
        ),
        Commands::ForgotPassword { email } => (
            flows.forgot_password(&email).await,
            "Failed to reset password",
        ),
        Commands::ResetPassword { token, password } => (
            flows.reset_password(&token, &password).await,
            "Failed to reset password",
        ),
        Commands::VerifyEmail { token } => {
            (flows.verify_email(&token).await, "Verification failed")
        }
    };

    report(result, failure_text)
}

fn report(result: Result<FlowOutcome, FlowError>, failure_text: &str) -> ExitCode {
    match result {
        Ok(outcome) => {
            println!("{}", outcome.message);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}: {}", failure_text, e);
            eprintln!("{}", e.user_message(failure_text));
            ExitCode::FAILURE
        }
    }
}
