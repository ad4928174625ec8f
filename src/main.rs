use clap::{Parser, Subcommand};
use std::path::PathBuf;

use session_hub::config::Config;
use session_hub::db;
use session_hub::serve::run_server;
use session_hub::store::RecordStore;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Session capture backend: transcribe, summarize and broadcast browser sessions"
)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP/WebSocket server
    Serve {
        /// Path to config file (TOML format)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Listen port (overrides config file)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Set or clear a stored session's video URL (maintenance)
    SetVideo {
        /// Path to config file (TOML format)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Durable session id
        session_id: String,

        /// New video URL; omit to clear
        #[arg(long)]
        video_url: Option<String>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    match args.command {
        Command::Serve { config, port } => {
            let mut config = load_config(config)?;
            if let Some(port) = port {
                config.port = port;
            }
            run_server(config)
        }
        Command::SetVideo {
            config,
            session_id,
            video_url,
        } => set_video(load_config(config)?, &session_id, video_url),
    }
}

fn load_config(path: Option<PathBuf>) -> Result<Config, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Config::load(&path),
        None => Ok(Config::default()),
    }
}

/// Video backfill: updates video_url and has_video together in the store
fn set_video(
    config: Config,
    session_id: &str,
    video_url: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let pool = db::open_database_pool(&config.db_path).await?;
        db::init_database_schema(&pool).await?;
        let store = RecordStore::new(pool);

        let updated = store
            .update_session_video(session_id, video_url.as_deref())
            .await?;
        if !updated {
            return Err(format!("Session not found: {}", session_id).into());
        }
        match video_url {
            Some(url) => println!("Set video URL for {}: {}", session_id, url),
            None => println!("Cleared video URL for {}", session_id),
        }
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}
