//! Envelope codec boundary and the in-tree framed JSON codec.
//!
//! ```text
//! ┌──────────┬──────────────┬───────────┬──────────────┬──────────────┐
//! │ 0x0D 0xA4│ len (u32 LE) │ type (i32)│ sender (u32) │ JSON payload │
//! └──────────┴──────────────┴───────────┴──────────────┴──────────────┘
//! ```
//!
//! `len` counts everything after itself. All integers little-endian.

use std::io::{Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde_json::{json, Map, Value};

use crate::{IngestError, MessageSpecification};

pub const HEADER: [u8; 2] = [0x0D, 0xA4];
pub const MAX_FRAME_LEN: usize = 1 << 20;
const FIXED_LEN: usize = 8;

/// Converts between wire envelopes and their JSON description.
pub trait EnvelopeCodec: Send + Sync {
    /// Loads message definitions, returning how many were loaded.
    fn load_specification(&mut self, odvd: &str) -> Result<usize, IngestError>;

    /// Produces `{"dataType":..,"senderStamp":..,"<message_name>":{..}}`, or
    /// `{}` when the envelope carries nothing the specification knows.
    fn decode_envelope_to_json(&self, buf: &[u8]) -> Result<String, IngestError>;

    /// Wraps a JSON payload in an envelope without timestamps.
    fn encode_envelope_from_json(
        &self,
        json: &str,
        data_type: i32,
        sender_stamp: u32,
    ) -> Result<Vec<u8>, IngestError>;
}

#[derive(Debug, Clone, Default)]
pub struct FramedJsonCodec {
    spec: Option<MessageSpecification>,
}

struct Frame<'a> {
    data_type: i32,
    sender_stamp: u32,
    payload: &'a [u8],
}

impl FramedJsonCodec {
    pub fn new() -> Self {
        Self::default()
    }

    fn specification(&self) -> Result<&MessageSpecification, IngestError> {
        self.spec.as_ref().ok_or(IngestError::SpecificationNotLoaded)
    }
}

fn read_frame(buf: &[u8]) -> Result<Frame<'_>, IngestError> {
    let mut c = Cursor::new(buf);
    let mut header = [0u8; 2];
    c.read_exact(&mut header)
        .map_err(|_| IngestError::Malformed("missing header".into()))?;
    if header != HEADER {
        return Err(IngestError::Malformed(format!(
            "bad header {:02x} {:02x}",
            header[0], header[1]
        )));
    }
    let len = c
        .read_u32::<LittleEndian>()
        .map_err(|_| IngestError::Malformed("missing length".into()))? as usize;
    if len > MAX_FRAME_LEN {
        return Err(IngestError::Malformed(format!("length {} exceeds limit", len)));
    }
    if len < FIXED_LEN || buf.len() - 6 != len {
        return Err(IngestError::Malformed(format!(
            "length {} does not match {} bytes",
            len,
            buf.len() - 6
        )));
    }
    let data_type = c.read_i32::<LittleEndian>()?;
    let sender_stamp = c.read_u32::<LittleEndian>()?;
    let start = c.position() as usize;
    Ok(Frame { data_type, sender_stamp, payload: &buf[start..] })
}

impl EnvelopeCodec for FramedJsonCodec {
    fn load_specification(&mut self, odvd: &str) -> Result<usize, IngestError> {
        let spec = MessageSpecification::parse(odvd)?;
        let n = spec.len();
        self.spec = Some(spec);
        Ok(n)
    }

    fn decode_envelope_to_json(&self, buf: &[u8]) -> Result<String, IngestError> {
        let spec = self.specification()?;
        let frame = read_frame(buf)?;
        let Some(def) = spec.get(frame.data_type) else {
            return Ok("{}".to_string());
        };
        let payload: Value = serde_json::from_slice(frame.payload)?;

        let mut out = Map::new();
        out.insert("dataType".into(), json!(frame.data_type));
        out.insert("senderStamp".into(), json!(frame.sender_stamp));
        out.insert(def.json_name(), payload);
        Ok(Value::Object(out).to_string())
    }

    fn encode_envelope_from_json(
        &self,
        json: &str,
        data_type: i32,
        sender_stamp: u32,
    ) -> Result<Vec<u8>, IngestError> {
        let spec = self.specification()?;
        if spec.get(data_type).is_none() {
            return Err(IngestError::UnknownDataType(data_type));
        }
        let payload: Value = serde_json::from_str(json)?;
        let body = payload.to_string();
        let len = FIXED_LEN + body.len();
        if len > MAX_FRAME_LEN {
            return Err(IngestError::Malformed(format!("length {} exceeds limit", len)));
        }

        let mut buf = Vec::with_capacity(6 + len);
        buf.write_all(&HEADER)?;
        buf.write_u32::<LittleEndian>(len as u32)?;
        buf.write_i32::<LittleEndian>(data_type)?;
        buf.write_u32::<LittleEndian>(sender_stamp)?;
        buf.write_all(body.as_bytes())?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{decode_event, DecodedRecord, PerceptionEvent};
    use model::GeodeticReading;

    fn loaded_codec() -> FramedJsonCodec {
        let mut codec = FramedJsonCodec::new();
        let n = codec
            .load_specification(include_str!("../assets/perception.odvd"))
            .unwrap();
        assert_eq!(n, 6);
        codec
    }

    #[test]
    fn test_decode_requires_specification() {
        let codec = FramedJsonCodec::new();
        assert!(matches!(
            codec.decode_envelope_to_json(&[0x0D, 0xA4]),
            Err(IngestError::SpecificationNotLoaded)
        ));
    }

    #[test]
    fn test_geodetic_command_survives_codec() {
        let codec = loaded_codec();
        let (lat, lon) = (57.70942631838934_f64, 11.948822736740114_f64);
        let text = format!("{{\"latitude\":{}, \"longitude\":{}}}", lat, lon);
        let buf = codec.encode_envelope_from_json(&text, 19, 0).unwrap();

        match decode_event(&codec, &buf).unwrap() {
            Some(PerceptionEvent::Geodetic(r)) => {
                assert_eq!(r, GeodeticReading::new(lat, lon));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_decoded_json_names_the_message() {
        let codec = loaded_codec();
        let buf = codec
            .encode_envelope_from_json(r#"{"objectFrameId":9}"#, 1128, 4)
            .unwrap();
        let text = codec.decode_envelope_to_json(&buf).unwrap();
        let v: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(v["dataType"], 1128);
        assert_eq!(v["senderStamp"], 4);
        assert_eq!(v["opendlv_logic_perception_ObjectFrameStart"]["objectFrameId"], 9);
    }

    #[test]
    fn test_unknown_type_decodes_to_empty() {
        let codec = loaded_codec();
        let mut buf = Vec::new();
        buf.extend_from_slice(&HEADER);
        buf.extend_from_slice(&10u32.to_le_bytes());
        buf.extend_from_slice(&77i32.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(b"{}");
        let text = codec.decode_envelope_to_json(&buf).unwrap();
        assert_eq!(text, "{}");
        assert_eq!(DecodedRecord::from_json(&text).unwrap(), None);
    }

    #[test]
    fn test_truncated_and_foreign_frames_rejected() {
        let codec = loaded_codec();
        let buf = codec
            .encode_envelope_from_json(r#"{"objectId":1}"#, 1130, 0)
            .unwrap();
        assert!(matches!(
            codec.decode_envelope_to_json(&buf[..buf.len() - 1]),
            Err(IngestError::Malformed(_))
        ));
        assert!(matches!(
            codec.decode_envelope_to_json(b"GET / HTTP/1.1"),
            Err(IngestError::Malformed(_))
        ));
    }

    #[test]
    fn test_encode_rejects_unknown_type_and_bad_json() {
        let codec = loaded_codec();
        assert!(matches!(
            codec.encode_envelope_from_json("{}", 4242, 0),
            Err(IngestError::UnknownDataType(4242))
        ));
        assert!(matches!(
            codec.encode_envelope_from_json("{latitude:", 19, 0),
            Err(IngestError::Json(_))
        ));
    }
}
