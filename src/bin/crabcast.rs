// crabcast: stream a local camera to a browser over WebRTC

use anyhow::Context;
use clap::Parser;
use crabcast::config::StreamerConfig;
use crabcast::{server, StreamError, Streamer, WebRtcTransport};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "crabcast", version, about = "Live camera to browser streaming over WebRTC")]
struct Cli {
    /// TOML configuration file (missing file means defaults)
    #[arg(short, long, default_value = "crabcast.toml")]
    config: PathBuf,

    /// Camera index, /dev/videoN path or device name
    #[arg(short = 'd', long)]
    device: Option<String>,

    /// Stream a generated test pattern instead of a camera
    #[arg(long, conflicts_with = "device")]
    synthetic: bool,

    /// Address the signaling server binds to
    #[arg(short = 'i', long)]
    host: Option<String>,

    #[arg(short, long)]
    port: Option<u16>,

    #[arg(long)]
    width: Option<u32>,

    #[arg(long)]
    height: Option<u32>,

    #[arg(long)]
    fps: Option<u32>,

    /// Directory holding the viewer page
    #[arg(long)]
    static_dir: Option<PathBuf>,

    /// STUN/TURN server URL (repeatable)
    #[arg(long = "ice-server")]
    ice_servers: Vec<String>,
}

impl Cli {
    fn apply(self, config: &mut StreamerConfig) {
        if let Some(device) = self.device {
            config.capture.source = device;
        }
        if self.synthetic {
            config.capture.source = "synthetic".to_string();
        }
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(width) = self.width {
            config.capture.width = width;
        }
        if let Some(height) = self.height {
            config.capture.height = height;
        }
        if let Some(fps) = self.fps {
            config.capture.fps = fps;
        }
        if let Some(static_dir) = self.static_dir {
            config.server.static_dir = static_dir;
        }
        if !self.ice_servers.is_empty() {
            config.transport.ice_servers = self.ice_servers;
        }
    }
}

fn session_error(e: StreamError) -> anyhow::Error {
    if e.is_fatal_at_start() {
        log::error!("Session could not start: {}", e);
    } else {
        log::error!("Session ended with error: {}", e);
    }
    e.into()
}

fn main() -> anyhow::Result<()> {
    crabcast::init_logging();

    let cli = Cli::parse();
    let mut config = StreamerConfig::load_from_file(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    cli.apply(&mut config);
    config.validate().context("invalid configuration")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("crabcast-rt")
        .build()
        .context("failed to start async runtime")?;

    let transport = runtime
        .block_on(WebRtcTransport::new(
            &config.transport,
            runtime.handle().clone(),
        ))
        .context("failed to create peer connection")?;
    let streamer = Streamer::new(config, Arc::new(transport)).map_err(session_error)?;
    let addr = streamer
        .config()
        .server
        .bind_addr()
        .map_err(|e| session_error(e.into()))?;

    let control = streamer.control();
    ctrlc::set_handler(move || {
        log::info!("Interrupt received, stopping stream");
        control.set_running(false);
    })
    .context("failed to install Ctrl-C handler")?;

    // Capture is opened before anything is exposed to viewers.
    let source = streamer.open_source().map_err(session_error)?;

    let listener = runtime
        .block_on(server::bind(addr))
        .map_err(|e| session_error(e.into()))
        .with_context(|| format!("failed to bind {}", addr))?;
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server_task = runtime.spawn(server::serve(listener, streamer.app_state(), async move {
        let _ = shutdown_rx.await;
    }));

    streamer.start_negotiation().map_err(session_error)?;
    println!("🦀 crabcast session {}", streamer.session().id);
    println!("   Open http://{} in a browser to view the stream", addr);

    let outcome = streamer.run(source);

    let _ = shutdown_tx.send(());
    match runtime.block_on(server_task) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => log::warn!("Signaling server error: {}", e),
        Err(e) => log::warn!("Signaling server task failed: {}", e),
    }
    if let Err(e) = streamer.shutdown() {
        log::warn!("Transport close failed: {}", e);
    }

    let report = outcome.map_err(session_error)?;
    println!(
        "✅ Streamed {} frames ({} of media) in {:.1}s",
        report.frames,
        report.next_timestamp,
        report.elapsed.as_secs_f64()
    );
    Ok(())
}
