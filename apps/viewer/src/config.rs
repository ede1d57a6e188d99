use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use serde::{Deserialize, Serialize};

use od4_ingest_ws::WsConfig;
use perception::FrameStartPolicy;
use render::{MapViewConfig, ObjectViewConfig};

/// Name under which the relay serves the message specification.
pub const SPECIFICATION_FILE: &str = "opendlv-standard-message-set-v0.9.10.odvd";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub ws: WsConfig,
    /// Local path or http(s) URL. Defaults to the relay's copy.
    pub specification: Option<String>,
    pub frame_start_policy: FrameStartPolicy,
    pub object_view: ObjectViewConfig,
    pub map_view: MapViewConfig,
    pub output_dir: PathBuf,
    /// Landmarks, `id;type;latitude;longitude`.
    pub map_file: Option<PathBuf>,
    pub record_frames: bool,
    pub command_sender_stamp: u32,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            ws: WsConfig::default(),
            specification: None,
            frame_start_policy: FrameStartPolicy::default(),
            object_view: ObjectViewConfig::default(),
            map_view: MapViewConfig::default(),
            output_dir: PathBuf::from("od4-viewer-out"),
            map_file: None,
            record_frames: false,
            command_sender_stamp: 0,
        }
    }
}

impl ViewerConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parse config {}", path.display()))
    }

    pub fn specification_location(&self) -> String {
        self.specification
            .clone()
            .unwrap_or_else(|| format!("{}/{}", http_base(&self.ws.url), SPECIFICATION_FILE))
    }
}

/// `ws://host:port/path` -> `http://host:port`
pub fn http_base(ws_url: &str) -> String {
    let (scheme, rest) = if let Some(r) = ws_url.strip_prefix("wss://") {
        ("https://", r)
    } else if let Some(r) = ws_url.strip_prefix("ws://") {
        ("http://", r)
    } else {
        ("http://", ws_url)
    };
    let host = rest.split('/').next().unwrap_or(rest);
    format!("{}{}", scheme, host)
}

/// Reads the message specification from disk or from the relay.
pub async fn fetch_specification(location: &str) -> anyhow::Result<String> {
    if location.starts_with("http://") || location.starts_with("https://") {
        let text = reqwest::get(location)
            .await
            .with_context(|| format!("fetch {}", location))?
            .error_for_status()?
            .text()
            .await?;
        Ok(text)
    } else {
        tokio::fs::read_to_string(location)
            .await
            .with_context(|| format!("read {}", location))
    }
}

/// Live viewer for OD4 perception streams
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// JSON configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Websocket endpoint of the stream relay
    #[arg(long)]
    pub url: Option<String>,

    /// Message specification, path or URL
    #[arg(long)]
    pub spec: Option<String>,

    /// Output directory for the 2D view, markers and recordings
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Landmark file to show on the map
    #[arg(long)]
    pub map_file: Option<PathBuf>,

    /// Keep objects seen before a frame start in that frame
    #[arg(long)]
    pub keep_objects_on_frame_start: bool,

    /// Record committed frames as NDJSON
    #[arg(long)]
    pub record: bool,

    /// Debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    pub fn into_config(self) -> anyhow::Result<ViewerConfig> {
        let mut cfg = match &self.config {
            Some(path) => ViewerConfig::load(path)?,
            None => ViewerConfig::default(),
        };
        if let Some(url) = self.url {
            cfg.ws.url = url;
        }
        if self.spec.is_some() {
            cfg.specification = self.spec;
        }
        if let Some(out) = self.out {
            cfg.output_dir = out;
        }
        if self.map_file.is_some() {
            cfg.map_file = self.map_file;
        }
        if self.keep_objects_on_frame_start {
            cfg.frame_start_policy = FrameStartPolicy::KeepWorkingSet;
        }
        cfg.record_frames |= self.record;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_specification_defaults_to_relay() {
        let mut cfg = ViewerConfig::default();
        cfg.ws.url = "ws://10.0.0.2:8000/".into();
        assert_eq!(
            cfg.specification_location(),
            "http://10.0.0.2:8000/opendlv-standard-message-set-v0.9.10.odvd"
        );
        assert_eq!(http_base("wss://relay.local/stream"), "https://relay.local");
    }

    #[test]
    fn test_args_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("viewer.json");
        std::fs::write(
            &path,
            r#"{ "ws": { "url": "ws://a:1/" }, "record_frames": true,
                 "object_view": { "lon_distance": 80.0 } }"#,
        )
        .unwrap();

        let args = Args::parse_from([
            "od4-viewer",
            "--config",
            path.to_str().unwrap(),
            "--url",
            "ws://b:2/",
            "--keep-objects-on-frame-start",
        ]);
        let cfg = args.into_config().unwrap();
        assert_eq!(cfg.ws.url, "ws://b:2/");
        assert_eq!(cfg.ws.subprotocol, "od4");
        assert!(cfg.record_frames);
        assert_eq!(cfg.object_view.lon_distance, 80.0);
        assert_eq!(cfg.object_view.lat_distance, 20.0);
        assert_eq!(cfg.frame_start_policy, FrameStartPolicy::KeepWorkingSet);
    }
}
