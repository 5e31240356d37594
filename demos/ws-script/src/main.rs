use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use boa_ws_bridge::js::JsEngineBuilder;
use boa_ws_bridge::js::websocket::{TungsteniteNetwork, WebSocketConfig, WebSocketExtension};
use clap::Parser;

/// Run a script that can open WebSocket connections.
#[derive(Parser, Debug)]
#[command(name = "ws-script", version, about)]
struct Args {
    /// Script to run
    script: PathBuf,

    /// JSON file with websocket settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Load the script as an ES module (allows `import ... from 'websocket'`)
    #[arg(long)]
    module: bool,

    /// How long to keep the event loop running, in milliseconds
    #[arg(long, default_value_t = 5000)]
    run_for_ms: u64,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            WebSocketConfig::from_json(&json)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => WebSocketConfig::default(),
    };
    log::debug!("Config: {:?}", config);

    let source = std::fs::read_to_string(&args.script)
        .with_context(|| format!("reading script {}", args.script.display()))?;

    let network = Arc::new(TungsteniteNetwork::new(config.clone()).context("starting network runtime")?);
    let engine = JsEngineBuilder::new()
        .with_extension(WebSocketExtension::new(network).with_config(config))
        .build()?
        .spawn()?;

    let client = engine.client();
    if args.module {
        client.load_esm_file(&args.script, source);
    } else {
        client.execute(source);
    }

    // Timers only advance when the event loop is flushed.
    let deadline = Instant::now() + Duration::from_millis(args.run_for_ms);
    while Instant::now() < deadline {
        client.flush_event_loop();
        std::thread::sleep(Duration::from_millis(10));
    }

    log::info!("Run time elapsed, shutting down");
    engine.shutdown();
    Ok(())
}
