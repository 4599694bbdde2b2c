//! Hinnat server binary
//!
//! SSH + SFTP gateway for order uploads and pricelist downloads.
//!
//! ## Usage
//!
//! ```bash
//! # Run the server (default)
//! hinnat-server [--config hinnat.toml] [--port 2222]
//!
//! # User management (database auth backend)
//! echo 's3cret' | hinnat-server add-user alice
//! hinnat-server set-active alice false
//! hinnat-server list-users
//! hinnat-server list-incoming alice
//! hinnat-server show-incoming alice order-1.csv > order-1.csv
//! ```

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use hinnat_server::config::expand;
use hinnat_server::{
    Config, SshServer, SshServerConfig, UserDb, build_authenticator, build_backends,
    load_or_generate_host_key,
};
use hinnat_vfs::storage::SqliteIncomingStore;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// SFTP gateway exposing /in for orders and /Hinnat for pricelists.
#[derive(Parser, Debug)]
#[command(name = "hinnat-server")]
#[command(about = "SFTP gateway for order uploads and pricelist downloads")]
struct Args {
    /// TOML config file (default: $HINNAT_CONFIG, else built-in defaults)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Cmd>,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Run the SSH server (default)
    Serve {
        /// Override the listening port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Add a user, or reset their password. The password is read from stdin.
    AddUser { username: String },
    /// Enable or disable a user
    SetActive {
        username: String,
        #[arg(action = clap::ArgAction::Set)]
        active: bool,
    },
    /// List all users
    ListUsers,
    /// List files uploaded to /in by a user (database incoming backend)
    ListIncoming { username: String },
    /// Write the stored content of one uploaded file to stdout
    ShowIncoming { username: String, filename: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let config = match Config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match args.command.unwrap_or(Cmd::Serve { port: None }) {
        Cmd::Serve { port } => run_server(config, port).await,
        Cmd::AddUser { username } => cmd_add_user(&config, &username),
        Cmd::SetActive { username, active } => cmd_set_active(&config, &username, active),
        Cmd::ListUsers => cmd_list_users(&config),
        Cmd::ListIncoming { username } => cmd_list_incoming(&config, &username),
        Cmd::ShowIncoming { username, filename } => {
            cmd_show_incoming(&config, &username, &filename)
        }
    }
}

async fn run_server(mut config: Config, port: Option<u16>) -> ExitCode {
    if let Some(port) = port {
        config.server.port = port;
    }

    let bind_addr = match config.bind_addr() {
        Ok(addr) => addr,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    let host_key = match load_or_generate_host_key(&config.host_key_path()) {
        Ok(key) => key,
        Err(e) => {
            tracing::error!("Host key error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };
    let backends = match build_backends(&config) {
        Ok(backends) => backends,
        Err(e) => {
            tracing::error!("Failed to set up storage: {:#}", e);
            return ExitCode::FAILURE;
        }
    };
    let authenticator = match build_authenticator(&config) {
        Ok(auth) => auth,
        Err(e) => {
            tracing::error!("Failed to set up authentication: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    tracing::info!("Starting hinnat server on {}...", bind_addr);
    let server = SshServer::new(
        SshServerConfig {
            bind_addr,
            host_key,
        },
        backends,
        authenticator,
    );

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                tracing::error!("Server error: {}", e);
                return ExitCode::FAILURE;
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("Shutting down");
        }
    }

    ExitCode::SUCCESS
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(e) => {
                tracing::warn!("SIGTERM handler unavailable: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

fn open_user_db(config: &Config) -> Option<UserDb> {
    let path = expand(&config.auth.database_path);
    match UserDb::open(&path) {
        Ok(db) => Some(db),
        Err(e) => {
            eprintln!("Failed to open user database {}: {}", path.display(), e);
            None
        }
    }
}

/// Add a user, or replace their password
fn cmd_add_user(config: &Config, username: &str) -> ExitCode {
    let mut password = String::new();
    if let Err(e) = std::io::stdin().lock().read_line(&mut password) {
        eprintln!("Failed to read password: {}", e);
        return ExitCode::FAILURE;
    }
    let password = password.trim_end_matches(['\r', '\n']);
    if password.is_empty() {
        eprintln!("Usage: echo <password> | hinnat-server add-user <username>");
        return ExitCode::FAILURE;
    }

    let Some(db) = open_user_db(config) else {
        return ExitCode::FAILURE;
    };
    match db.add_user(username, password) {
        Ok(id) => {
            println!("Saved user '{}' (id {})", username, id);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Failed to add user: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn cmd_set_active(config: &Config, username: &str, active: bool) -> ExitCode {
    let Some(db) = open_user_db(config) else {
        return ExitCode::FAILURE;
    };
    match db.set_active(username, active) {
        Ok(true) => {
            let state = if active { "enabled" } else { "disabled" };
            println!("User '{}' {}", username, state);
            ExitCode::SUCCESS
        }
        Ok(false) => {
            eprintln!("User not found: {}", username);
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("Database error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// List all users
fn cmd_list_users(config: &Config) -> ExitCode {
    let Some(db) = open_user_db(config) else {
        return ExitCode::FAILURE;
    };
    let users = match db.list_users() {
        Ok(users) => users,
        Err(e) => {
            eprintln!("Failed to list users: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if users.is_empty() {
        println!("No users found. Add one with: hinnat-server add-user <username>");
        return ExitCode::SUCCESS;
    }

    println!("{:<24} {:>6} {:>12}", "USERNAME", "ACTIVE", "CREATED");
    println!("{}", "-".repeat(44));
    for user in users {
        let active = if user.is_active { "yes" } else { "no" };
        println!(
            "{:<24} {:>6} {:>12}",
            user.username,
            active,
            format_timestamp(user.created_at)
        );
    }
    ExitCode::SUCCESS
}

fn open_incoming_db(config: &Config) -> Option<SqliteIncomingStore> {
    let path = expand(&config.incoming.database_path);
    match SqliteIncomingStore::open(&path) {
        Ok(store) => Some(store),
        Err(e) => {
            eprintln!("Failed to open database {}: {}", path.display(), e);
            None
        }
    }
}

/// List files a user has uploaded to /in
fn cmd_list_incoming(config: &Config, username: &str) -> ExitCode {
    let Some(store) = open_incoming_db(config) else {
        return ExitCode::FAILURE;
    };
    let files = match store.files_for(username) {
        Ok(files) => files,
        Err(e) => {
            eprintln!("Failed to list files: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if files.is_empty() {
        println!("No incoming files for {}", username);
        return ExitCode::SUCCESS;
    }

    println!("{:<40} {:>10} {:>12}", "FILENAME", "BYTES", "RECEIVED");
    println!("{}", "-".repeat(64));
    for file in files {
        println!(
            "{:<40} {:>10} {:>12}",
            file.name,
            file.size,
            format_timestamp(file.mtime_secs() as i64)
        );
    }
    ExitCode::SUCCESS
}

fn cmd_show_incoming(config: &Config, username: &str, filename: &str) -> ExitCode {
    let Some(store) = open_incoming_db(config) else {
        return ExitCode::FAILURE;
    };
    match store.content(username, filename) {
        Ok(Some(content)) => match std::io::stdout().lock().write_all(&content) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("Failed to write output: {}", e);
                ExitCode::FAILURE
            }
        },
        Ok(None) => {
            eprintln!("No file {} for {}", filename, username);
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("Database error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn format_timestamp(ts: i64) -> String {
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    let time = UNIX_EPOCH + Duration::from_secs(ts.max(0) as u64);
    match SystemTime::now().duration_since(time) {
        Ok(elapsed) => {
            let secs = elapsed.as_secs();
            if secs < 60 {
                format!("{}s ago", secs)
            } else if secs < 3600 {
                format!("{}m ago", secs / 60)
            } else if secs < 86400 {
                format!("{}h ago", secs / 3600)
            } else {
                format!("{}d ago", secs / 86400)
            }
        }
        Err(_) => "just now".to_string(),
    }
}
