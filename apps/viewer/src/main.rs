mod commands;
mod config;
mod session;

use std::{io::BufRead, sync::Arc};

use anyhow::Context;
use clap::Parser;
use uuid::Uuid;

use commands::{parse_click, CommandChannel};
use config::{fetch_specification, Args};
use iox::FrameRecorder;
use od4_ingest_core::FramedJsonCodec;
use od4_ingest_ws::WsSource;
use render::{MarkerLayer, SvgCanvas};
use session::{run_source, Inner, ViewerSession};

type Session = ViewerSession<SvgCanvas, MarkerLayer>;

/// Stdin stands in for the map pane: each `click <lat> <lon>` line is sent
/// to the relay as a geodetic command.
fn read_clicks(sess: Arc<Session>, commands: CommandChannel) {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        match parse_click(&line) {
            Ok(Some(cmd)) => {
                let inner = sess.inner.lock();
                match commands.send_click(inner.codec.as_ref(), cmd) {
                    Ok(n) => log::debug!(
                        "Sending geodetic command {}, {} ({} bytes)",
                        cmd.latitude,
                        cmd.longitude,
                        n
                    ),
                    Err(e) => log::warn!("Command not sent: {}", e),
                }
            }
            Ok(None) => {}
            Err(e) => log::warn!("{}", e),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let cfg = args.into_config()?;
    tokio::fs::create_dir_all(&cfg.output_dir)
        .await
        .with_context(|| format!("create {}", cfg.output_dir.display()))?;

    let session_id = Uuid::new_v4();
    log::info!("Viewer session {} writing to {}", session_id, cfg.output_dir.display());

    let canvas = SvgCanvas::new(cfg.object_view.width, cfg.object_view.height)
        .with_output(cfg.output_dir.join("2d-view.svg"));
    let mut inner = Inner::new(&cfg, Box::new(FramedJsonCodec::new()), canvas, MarkerLayer::new());

    if let Some(path) = &cfg.map_file {
        let objects = iox::import_map_file(path)?;
        inner.add_landmarks(&objects);
        let doc = iox::map_objects_json(&objects);
        std::fs::write(cfg.output_dir.join("map.json"), serde_json::to_string(&doc)?)?;
        log::info!("Loaded {} landmarks from {}", objects.len(), path.display());
    }
    if cfg.record_frames {
        let path = cfg.output_dir.join("frames.ndjson");
        inner.recorder = Some(FrameRecorder::create(&path, session_id)?);
    }

    // decoding stays gated until the specification is in
    let location = cfg.specification_location();
    let fetched = fetch_specification(&location).await;
    inner.initialize_from(&location, fetched);

    let sess = Arc::new(ViewerSession::new(inner));
    let (out_tx, pump) = run_source(WsSource::new(cfg.ws.clone()), sess.clone());
    let commands = CommandChannel::new(out_tx, cfg.command_sender_stamp);
    {
        let sess = sess.clone();
        std::thread::spawn(move || read_clicks(sess, commands));
    }

    tokio::select! {
        joined = tokio::task::spawn_blocking(move || pump.join()) => {
            if !matches!(joined, Ok(Ok(()))) {
                log::error!("Session pump stopped unexpectedly");
            }
        }
        _ = tokio::signal::ctrl_c() => log::info!("Interrupted"),
    }

    let inner = sess.inner.lock();
    let markers_path = cfg.output_dir.join("markers.geojson");
    iox::export_geojson(inner.map.markers(), &markers_path)?;
    log::info!(
        "{} frames committed, {} dropped, {} envelopes ({} ignored, {} undecodable), {} markers",
        inner.accumulator.committed_frames(),
        inner.accumulator.dropped_frames(),
        inner.stats.envelopes,
        inner.stats.ignored,
        inner.stats.undecodable,
        inner.map.markers().len()
    );
    Ok(())
}
