use clap::{Parser, Subcommand, ValueEnum};
use log::LevelFilter;
use std::path::PathBuf;
use std::sync::Arc;

use vidfetch::api::HttpBackend;
use vidfetch::cache::web::start_proxy_server;
use vidfetch::config::Config;
use vidfetch::console::ConsoleView;
use vidfetch::controller::{Controller, UiState};
use vidfetch::models::{DownloadKind, DownloadOptions};

#[derive(Parser, Debug)]
#[command(author, version = env!("CARGO_PKG_VERSION"), about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the app shell through the offline cache proxy
    Serve,
    /// Download one video through the backend
    Fetch {
        url: String,
        #[arg(short, long, value_enum, default_value = "video")]
        kind: KindArg,
        /// Quality token, e.g. 256 for audio or 1080p for video
        #[arg(short, long)]
        quality: Option<String>,
        /// Directory the finished file is written to
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum KindArg {
    Audio,
    Video,
}

impl From<KindArg> for DownloadKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Audio => DownloadKind::Audio,
            KindArg::Video => DownloadKind::Video,
        }
    }
}

fn io_err(message: &str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, message.to_string())
}

fn log_level() -> LevelFilter {
    std::env::var("VIDFETCH_LOG")
        .ok()
        .and_then(|level| level.parse::<LevelFilter>().ok())
        .unwrap_or(LevelFilter::Info)
}

async fn fetch(
    config: &Config,
    url: &str,
    kind: DownloadKind,
    quality: Option<&str>,
    out: PathBuf,
) -> std::io::Result<()> {
    let options = match quality {
        Some(quality) => DownloadOptions::new(kind, quality).ok_or_else(|| {
            let offered: Vec<String> = kind
                .qualities()
                .iter()
                .map(|q| format!("{} {}", q.token, q.label))
                .collect();
            io_err(&format!(
                "{} must be one of: {}",
                kind.group_label(),
                offered.join(", ")
            ))
        })?,
        None => DownloadOptions::with_default_quality(kind),
    };

    let backend = Arc::new(HttpBackend::new(&config.backend));
    let mut controller = Controller::new(
        backend.clone(),
        ConsoleView::default(),
        config.controller.clone(),
    );

    controller.blur(url).await;

    let input = controller.input().to_owned();
    controller
        .submit(&input, options)
        .await
        .map_err(|e| io_err(&e.to_string()))?;

    if controller.run_until_settled().await != UiState::Completed {
        return Err(io_err("download did not complete"));
    }

    let retrieval = controller
        .retrieve()
        .ok_or_else(|| io_err("no completed job to retrieve"))?;

    let path = backend
        .download_artifact(&retrieval.handle, &out)
        .await
        .map_err(|e| io_err(&e.to_string()))?;

    println!("saved {}", path.display());

    Ok(())
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    simple_logger::SimpleLogger::new()
        .with_level(log_level())
        .with_local_timestamps()
        .init()
        .map_err(|e| io_err(&format!("failed to build logger instance: {e}")))?;

    let args = Args::parse();
    let config = Config::from_env().map_err(|e| io_err(&e.to_string()))?;

    match args.command {
        Command::Serve => start_proxy_server(&config).await,
        Command::Fetch {
            url,
            kind,
            quality,
            out,
        } => fetch(&config, &url, kind.into(), quality.as_deref(), out).await,
    }
}
