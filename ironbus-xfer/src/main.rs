//! ironbus-xfer — file transfer tool over the IronBus transport.
//!
//! ```text
//! ironbus-xfer serve --bind 0.0.0.0:8050 --dir ./inbox --token demo
//! ironbus-xfer send  --addr 10.0.0.5:8050 --file ./report.bin --token demo
//! ```
//!
//! The server accepts one file per connection and stores it under the
//! name the sender provides; the client pushes one local file and exits.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use ironbus_core::{BusError, ProgressReport, Token, send_file_and_confirm};
use tokio::net::{TcpListener, TcpStream};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "ironbus-xfer", about = "IronBus file transfer tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Accept incoming files and store them in a directory.
    Serve {
        /// Address to listen on.
        #[arg(long, default_value = "0.0.0.0:8050")]
        bind: String,

        /// Directory incoming files are stored in.
        #[arg(long, default_value = ".")]
        dir: PathBuf,

        /// Shared token (up to 16 ASCII bytes, zero-padded).
        #[arg(long, default_value = "")]
        token: String,
    },

    /// Send one local file to a serving peer.
    Send {
        /// Address of the serving peer.
        #[arg(long)]
        addr: String,

        /// Local file to send.
        #[arg(long)]
        file: PathBuf,

        /// Shared token (up to 16 ASCII bytes, zero-padded).
        #[arg(long, default_value = "")]
        token: String,

        /// Tag stored alongside the file on the remote.
        #[arg(long, default_value = "")]
        tag: String,

        /// Uploader name stored alongside the file on the remote.
        #[arg(long, default_value = "")]
        uploader: String,
    },
}

/// Pad a short ASCII string into the 16-byte wire token.
fn parse_token(text: &str) -> Result<Token, String> {
    let bytes = text.as_bytes();
    if bytes.len() > ironbus_core::TOKEN_SIZE {
        return Err(format!(
            "token is {} bytes, maximum is {}",
            bytes.len(),
            ironbus_core::TOKEN_SIZE
        ));
    }
    let mut token = [0u8; ironbus_core::TOKEN_SIZE];
    token[..bytes.len()].copy_from_slice(bytes);
    Ok(token)
}

// ── Serve ────────────────────────────────────────────────────────

async fn serve(bind: &str, dir: &Path, token: Token) -> Result<(), BusError> {
    let listener = TcpListener::bind(bind).await?;
    info!(%bind, dir = %dir.display(), "listening for incoming files");

    loop {
        let (stream, peer) = listener.accept().await?;
        let dir = dir.to_path_buf();
        tokio::spawn(async move {
            if let Err(e) = receive_one(stream, &dir, token).await {
                warn!(%peer, error = %e, "transfer failed");
            }
        });
    }
}

async fn receive_one(mut stream: TcpStream, dir: &Path, token: Token) -> Result<(), BusError> {
    // The metadata frame names the file; receive into a temporary spot
    // first so a failed transfer never leaves a half-written target.
    let head = ironbus_core::receive_file_head(&mut stream, &token).await?;

    // Strip any path components the sender smuggled into the name.
    let name = Path::new(&head.name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unnamed".to_string());
    let target = dir.join(&name);
    let partial = dir.join(format!("{name}.partial"));

    let mut file = tokio::fs::File::create(&partial).await?;
    let result = ironbus_core::receive_stream(
        &mut stream,
        &mut file,
        head.size,
        |moved, total| info!(%name, moved, total, "receiving"),
        ProgressReport::WholePercent,
    )
    .await;
    drop(file);

    match result {
        Ok(()) => {
            tokio::fs::rename(&partial, &target).await?;
            info!(
                name = %name,
                size = head.size,
                tag = %head.tag,
                uploader = %head.uploader,
                "file stored"
            );
            Ok(())
        }
        Err(e) => {
            let _ = tokio::fs::remove_file(&partial).await;
            Err(e)
        }
    }
}

// ── Send ─────────────────────────────────────────────────────────

async fn send(
    addr: &str,
    file: &Path,
    token: Token,
    tag: &str,
    uploader: &str,
) -> Result<(), BusError> {
    let remote_name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| BusError::FileNotExist(file.display().to_string()))?;

    let mut stream = TcpStream::connect(addr).await?;
    info!(%addr, file = %file.display(), "connected, sending");

    send_file_and_confirm(
        &mut stream,
        &token,
        file,
        &remote_name,
        tag,
        uploader,
        |moved, total| info!(moved, total, "sending"),
        ProgressReport::WholePercent,
    )
    .await?;

    info!("transfer complete");
    Ok(())
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("ironbus-xfer v{}", env!("CARGO_PKG_VERSION"));

    let outcome = match &cli.command {
        Command::Serve { bind, dir, token } => match parse_token(token) {
            Ok(token) => serve(bind, dir, token).await,
            Err(msg) => {
                error!("{msg}");
                std::process::exit(2);
            }
        },
        Command::Send {
            addr,
            file,
            token,
            tag,
            uploader,
        } => match parse_token(token) {
            Ok(token) => send(addr, file, token, tag, uploader).await,
            Err(msg) => {
                error!("{msg}");
                std::process::exit(2);
            }
        },
    };

    if let Err(e) = outcome {
        error!(error = %e, "exiting with failure");
        std::process::exit(1);
    }
}
