//! framecast — entry point.
//!
//! ```text
//! framecast <peer-addr>          Connect and stream frames (producer)
//! framecast                      Listen, receive, and display (consumer)
//! framecast --mode write ...     Use remote-write transfers
//! framecast --config <path>      Load a custom config TOML
//! framecast --gen-config         Write default config to stdout
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use framecast_core::consumer::FrameConsumer;
use framecast_core::error::CastError;
use framecast_core::fabric::TcpFabric;
use framecast_core::producer::FrameProducer;
use framecast_core::session::{Role, Session};
use framecast_core::sink::TraceSink;
use framecast_core::source::LoopingFileSource;
use framecast_core::transfer::TransferMode;

use framecast_cli::config::CastConfig;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "framecast", about = "Stream raw YUV frames between two hosts")]
struct Cli {
    /// Peer address (host:port) to connect and stream frames to.
    /// Absent: listen, receive, and display.
    peer: Option<String>,

    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "framecast.toml")]
    config: PathBuf,

    /// Transfer mode override: message | write.
    #[arg(short, long)]
    mode: Option<String>,

    /// Frame file override (producer role).
    #[arg(short, long)]
    source: Option<PathBuf>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&CastConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = CastConfig::load(&cli.config);

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // CLI overrides.
    if let Some(mode) = cli.mode.as_deref() {
        match mode.parse::<TransferMode>() {
            Ok(m) => config.stream.mode = m,
            Err(e) => {
                error!("{e}");
                std::process::exit(2);
            }
        }
    }
    if let Some(source) = cli.source {
        config.video.source = source.display().to_string();
    }

    info!("framecast v{}", env!("CARGO_PKG_VERSION"));
    info!(
        mode = %config.stream.mode,
        width = config.video.width,
        height = config.video.height,
        "starting"
    );

    // Ctrl-C cancels the streaming loop at its next suspension point.
    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received — shutting down");
        ctrl_c.cancel();
    });

    let outcome = match cli.peer.as_deref() {
        Some(addr) => run_initiator(&config, addr, cancel).await,
        None => run_responder(&config, cancel).await,
    };

    match outcome {
        Ok(()) => {
            info!("exit");
            Ok(())
        }
        Err(e) => {
            error!("{e}");
            info!("exit");
            std::process::exit(if e.is_setup() { 2 } else { 1 });
        }
    }
}

// ── Roles ────────────────────────────────────────────────────────

/// Connect to the peer, read frames from the source file, stream.
async fn run_initiator(
    config: &CastConfig,
    peer: &str,
    cancel: CancellationToken,
) -> Result<(), CastError> {
    let timeout = Duration::from_millis(config.network.connect_timeout_ms);
    let mut fabric = TcpFabric::connect(peer, timeout).await?;

    let session = Session::establish(&mut fabric, Role::Initiator, config.settings()).await?;
    let source =
        LoopingFileSource::open(&config.video.source, session.geometry.frame_len()).await?;

    let mut producer = FrameProducer::new(session, fabric, Box::new(source), cancel);
    producer.run().await
}

/// Wait for a connection, then receive, display, and meter.
async fn run_responder(config: &CastConfig, cancel: CancellationToken) -> Result<(), CastError> {
    let bind = format!("0.0.0.0:{}", config.network.listen_port);
    let listener = TcpListener::bind(&bind)
        .await
        .map_err(|e| CastError::Setup(format!("bind {bind}: {e}")))?;
    info!("listening on {bind}");

    let (stream, peer) = tokio::select! {
        accepted = listener.accept() => {
            accepted.map_err(|e| CastError::Setup(format!("accept: {e}")))?
        }
        _ = cancel.cancelled() => return Ok(()),
    };
    info!("peer connected from {peer}");

    let mut fabric = TcpFabric::new(stream);
    let session = Session::establish(&mut fabric, Role::Responder, config.settings()).await?;

    let fps_window = Duration::from_secs(config.stream.fps_window_secs);
    let mut consumer = FrameConsumer::new(
        session,
        fabric,
        Box::new(TraceSink::new()),
        fps_window,
        cancel,
    );
    consumer.run().await
}
