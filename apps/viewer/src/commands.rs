// apps/viewer/src/commands.rs
use serde::{Deserialize, Serialize};

use od4_ingest_core::{message_ids, EnvelopeCodec, IngestError, OutboundTx};

/// Envelope data type of an outbound map click.
pub const GEODETIC_COMMAND_TYPE: i32 = message_ids::GEODETIC_WGS84_READING;

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("unrecognised input {0:?}, expected: click <latitude> <longitude>")]
    Unrecognised(String),
    #[error("invalid coordinate {0:?}")]
    BadCoordinate(String),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Encode(#[from] IngestError),
    #[error("transport closed")]
    TransportClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeodeticCommand {
    pub latitude: f64,
    pub longitude: f64,
}

/// `click <lat> <lon>`; blank lines yield `None`.
pub fn parse_click(line: &str) -> Result<Option<GeodeticCommand>, CommandError> {
    let mut parts = line.split_whitespace();
    let Some(verb) = parts.next() else {
        return Ok(None);
    };
    let (Some(lat), Some(lon), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(CommandError::Unrecognised(line.trim().to_string()));
    };
    if verb != "click" {
        return Err(CommandError::Unrecognised(line.trim().to_string()));
    }
    let coord = |s: &str| {
        s.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| CommandError::BadCoordinate(s.to_string()))
    };
    Ok(Some(GeodeticCommand { latitude: coord(lat)?, longitude: coord(lon)? }))
}

/// Turns map clicks into outbound envelopes.
pub struct CommandChannel {
    out: OutboundTx,
    sender_stamp: u32,
}

impl CommandChannel {
    pub fn new(out: OutboundTx, sender_stamp: u32) -> Self {
        Self { out, sender_stamp }
    }

    /// Returns the encoded size in bytes.
    pub fn send_click(
        &self,
        codec: &dyn EnvelopeCodec,
        cmd: GeodeticCommand,
    ) -> Result<usize, CommandError> {
        let json = serde_json::to_string(&cmd)?;
        let buf = codec.encode_envelope_from_json(&json, GEODETIC_COMMAND_TYPE, self.sender_stamp)?;
        let len = buf.len();
        self.out.send(buf).map_err(|_| CommandError::TransportClosed)?;
        Ok(len)
    }
}
