use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use uuid::Uuid;

use family_photos::{
    Config, create_app, startup_checks,
    store::{MetadataStore, StoreError},
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Global options that apply to all commands
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: PathBuf,

    /// Overrides the level from the config file; RUST_LOG takes precedence
    #[arg(short, long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the web server (default if no command specified)
    Serve {
        #[arg(short, long, env = "PORT")]
        port: Option<u16>,

        #[arg(long)]
        host: Option<String>,

        /// Automatically quit after specified number of seconds (useful for testing)
        #[arg(long)]
        quit_after: Option<u64>,
    },

    /// Manage users in the photo store
    #[command(subcommand)]
    User(UserCommands),
}

#[derive(Subcommand, Debug)]
enum UserCommands {
    /// List all users with their album counts
    List,
    /// Add a new user
    Add {
        /// Display name (trimmed, at most 60 characters)
        name: String,
    },
    /// Remove a user that has no albums
    Remove {
        /// User id
        id: Uuid,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = load_config(&cli.config)?;

    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.app.log_level.clone())
        .to_lowercase();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Some(Commands::User(user_cmd)) => handle_user_command(&config, user_cmd).await,
        Some(Commands::Serve {
            port,
            host,
            quit_after,
        }) => run_server(config, &cli.config, port, host, quit_after).await,
        None => {
            // Default to serve command if no subcommand specified
            let port = std::env::var("PORT").ok().and_then(|p| p.parse().ok());
            run_server(config, &cli.config, port, None, None).await
        }
    }
}

fn load_config(config_path: &std::path::Path) -> Result<Config, Box<dyn std::error::Error>> {
    if config_path.exists() {
        let config_content = std::fs::read_to_string(config_path)?;
        Ok(toml_edit::de::from_str::<Config>(&config_content)?)
    } else {
        Ok(Config::default())
    }
}

async fn handle_user_command(
    config: &Config,
    cmd: UserCommands,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = MetadataStore::new(config.storage.uploads_directory.clone());
    store.initialize().await?;

    match cmd {
        UserCommands::List => {
            let users = store.list_users().await?;
            if users.is_empty() {
                println!("No users in {:?}", store.root());
            } else {
                println!("Users:");
                for user in users {
                    println!("  {}  {}  ({} albums)", user.id, user.name, user.album_count);
                }
            }
        }
        UserCommands::Add { name } => match store.create_user(&name).await {
            Ok(user) => println!("Added user '{}' with id {}", user.name, user.id),
            Err(StoreError::Validation(msg)) => {
                eprintln!("Error: {}", msg);
                std::process::exit(1);
            }
            Err(e) => return Err(e.into()),
        },
        UserCommands::Remove { id } => match store.delete_user(id).await {
            Ok(user) => println!("Removed user '{}'", user.name),
            Err(StoreError::NotFound(msg) | StoreError::Conflict(msg)) => {
                eprintln!("Error: {}", msg);
                std::process::exit(1);
            }
            Err(e) => return Err(e.into()),
        },
    }

    Ok(())
}

async fn run_server(
    config: Config,
    config_path: &std::path::Path,
    port: Option<u16>,
    host: Option<String>,
    quit_after: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let host = host.unwrap_or(config.server.host.clone());
    let port = port.unwrap_or(config.server.port);

    info!("Starting {} server", config.app.name);
    if config_path.exists() {
        info!("Configuration loaded from: {:?}", config_path);
    } else {
        info!("Config file not found at {:?}, using defaults", config_path);
    }
    info!(
        "Uploads directory: {:?}",
        config.storage.uploads_directory
    );
    info!("Public directory: {:?}", config.storage.public_directory);

    match startup_checks::perform_startup_checks(&config).await {
        Ok(()) => info!("All startup checks passed"),
        Err(errors) => {
            for error in &errors {
                tracing::error!("Startup check failed: {}", error);
            }

            if errors.iter().any(|e| e.is_critical()) {
                tracing::error!("Critical startup check failed, exiting");
                return Err("Critical startup check failed".into());
            } else {
                tracing::warn!("Non-critical startup checks failed, continuing");
            }
        }
    }

    let app = create_app(config.clone()).await;

    let addr = SocketAddr::from((host.parse::<std::net::IpAddr>()?, port));
    info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Add ConnectInfo layer to track client IPs
    let app = app.into_make_service_with_connect_info::<SocketAddr>();

    let server = axum::serve(listener, app);
    let graceful = server.with_graceful_shutdown(shutdown_signal(quit_after));

    if let Err(e) = graceful.await {
        tracing::error!("Server error: {}", e);
    }

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal(quit_after: Option<u64>) {
    use tokio::signal;
    use tokio::time::{Duration, sleep};

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let quit_timer = async {
        if let Some(seconds) = quit_after {
            info!(
                "Server will automatically shut down after {} seconds",
                seconds
            );
            sleep(Duration::from_secs(seconds)).await;
            info!("Quit timer expired, shutting down");
        } else {
            std::future::pending::<()>().await
        }
    };

    tokio::select! {
        _ = ctrl_c => {
            info!("Shutdown signal received (Ctrl+C)");
        },
        _ = terminate => {
            info!("Shutdown signal received (SIGTERM)");
        },
        _ = quit_timer => {},
    }
}
