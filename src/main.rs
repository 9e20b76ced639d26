mod api;
mod audit;
mod auth;
mod cli;
mod config;
mod session;
mod storage;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::cell::RefCell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "userctl", about = "A command-line client for the user-management API")]
pub struct Args {
    #[arg(long, env = "USERCTL_BASE_URL", help = "API base URL (overrides config)")]
    pub base_url: Option<String>,

    #[arg(long, help = "Config file path")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Session data directory (overrides config)")]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Sign in and persist the session
    Login {
        email: String,
        #[arg(long, env = "USERCTL_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Sign out and clear the persisted session
    Logout,
    /// Create a new account (does not sign in)
    Register { name: String, email: String },
    /// Show the current session
    Whoami,
    /// Update your profile
    Update {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
    /// Operations on other users (admin)
    Users {
        #[command(subcommand)]
        action: UsersAction,
    },
    /// Request a password-reset email
    ForgotPassword { email: String },
    /// Complete a password reset with the emailed token
    ResetPassword { email: String, token: String },
}

#[derive(Subcommand)]
pub enum UsersAction {
    /// List all users
    List,
    /// Show a single user
    Show { id: String },
    /// Delete a user
    Delete {
        id: String,
        #[arg(long, help = "Skip the confirmation prompt")]
        yes: bool,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let mut cfg = if let Some(config_path) = &args.config {
        config::Config::load_from(config_path)?
    } else {
        config::Config::load().unwrap_or_default()
    };

    // CLI flags and env vars override both config layers
    if let Some(url) = &args.base_url {
        cfg.base_url = Some(url.clone());
    }
    if let Some(dir) = &args.data_dir {
        cfg.data_dir = Some(dir.clone());
    }

    if let Err(errors) = cfg.validate() {
        for e in &errors {
            eprintln!("Config error: {}", e);
        }
        anyhow::bail!("Invalid configuration");
    }

    let base_url = cfg.base_url().to_string();
    let store = session::SessionStore::new(Box::new(storage::FileStorage::new(&cfg.data_dir())));
    let http = api::HttpClient::new(&base_url);
    let mut auth = auth::AuthCore::new(Box::new(http), store);

    let audit_log = match audit::AuditLog::new(&cfg.data_dir().join("audit.jsonl")) {
        Ok(log) => Some(log),
        Err(e) => {
            eprintln!("Warning: audit log unavailable: {}", e);
            None
        }
    };

    // Reconstruct any persisted session before dispatching.
    let outcome = auth.hydrate();

    let ctx = cli::Context {
        auth: RefCell::new(auth),
        audit: RefCell::new(audit_log),
        base_url,
    };
    if let Some(log) = ctx.audit.borrow_mut().as_mut() {
        let _ = log.hydrate(outcome.as_str());
    }

    let ok = match args.command {
        Some(Command::Login { ref email, ref password }) => {
            cli::cmd_login(&ctx, email, password.clone())?
        }
        Some(Command::Logout) => {
            cli::cmd_logout(&ctx);
            true
        }
        Some(Command::Register { ref name, ref email }) => cli::cmd_register(&ctx, name, email)?,
        Some(Command::Whoami) => cli::cmd_whoami(&ctx),
        Some(Command::Update { name, email }) => cli::cmd_update(&ctx, name, email),
        Some(Command::Users { action }) => match action {
            UsersAction::List => cli::cmd_users_list(&ctx),
            UsersAction::Show { ref id } => cli::cmd_users_show(&ctx, id),
            UsersAction::Delete { ref id, yes } => cli::cmd_users_delete(&ctx, id, yes)?,
        },
        Some(Command::ForgotPassword { ref email }) => cli::cmd_forgot_password(&ctx, email),
        Some(Command::ResetPassword { ref email, ref token }) => {
            cli::cmd_reset_password(&ctx, email, token)?
        }
        None => return cli::run_shell(ctx),
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}
