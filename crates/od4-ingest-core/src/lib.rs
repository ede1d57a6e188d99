//! Core stream model and traits used by the OD4 viewer

use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;

use model::{GeodeticReading, ObjectPosition};

pub mod codec;
pub mod spec;

pub use codec::{EnvelopeCodec, FramedJsonCodec};
pub use spec::{MessageDefinition, MessageSpecification};

/// Envelope data types the viewer dispatches on.
pub mod message_ids {
    pub const GEODETIC_WGS84_READING: i32 = 19;
    pub const OBJECT_FRAME_START: i32 = 1128;
    pub const OBJECT_FRAME_END: i32 = 1129;
    pub const OBJECT: i32 = 1130;
    pub const OBJECT_TYPE: i32 = 1131;
    pub const OBJECT_POSITION: i32 = 1136;
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("{0}")]
    Msg(String),
    #[error("transport unavailable: {0}")]
    TransportUnavailable(String),
    #[error("message specification not loaded")]
    SpecificationNotLoaded,
    #[error("message specification, line {line}: {reason}")]
    Specification { line: usize, reason: String },
    #[error("malformed envelope: {0}")]
    Malformed(String),
    #[error("no message definition for data type {0}")]
    UnknownDataType(i32),
    #[error("payload of data type {data_type}: {source}")]
    Payload {
        data_type: i32,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A decoded envelope as reported by the codec, before typing.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRecord {
    pub data_type: i32,
    pub sender_stamp: u32,
    pub payload: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRecord {
    data_type: i32,
    #[serde(default)]
    sender_stamp: u32,
    // envelope timestamps are not part of the payload
    #[serde(default, rename = "sent")]
    _sent: Option<Value>,
    #[serde(default, rename = "received")]
    _received: Option<Value>,
    #[serde(default, rename = "sampleTimeStamp")]
    _sample_time_stamp: Option<Value>,
    #[serde(flatten)]
    rest: serde_json::Map<String, Value>,
}

impl DecodedRecord {
    /// Parses codec output. `{}` (or anything as short) means "nothing
    /// usable" and yields `None`.
    pub fn from_json(text: &str) -> Result<Option<Self>, IngestError> {
        if text.trim().len() <= 2 {
            return Ok(None);
        }
        let raw: RawRecord = serde_json::from_str(text)?;
        let payload = raw
            .rest
            .into_iter()
            .map(|(_, v)| v)
            .find(Value::is_object)
            .unwrap_or(Value::Null);
        Ok(Some(Self {
            data_type: raw.data_type,
            sender_stamp: raw.sender_stamp,
            payload,
        }))
    }
}

/// Closed set of events the viewer reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum PerceptionEvent {
    Geodetic(GeodeticReading),
    FrameStart { frame_id: u32 },
    FrameEnd { frame_id: u32 },
    ObjectSeen { object_id: u32 },
    ObjectType { object_id: u32, kind: u32 },
    ObjectPosition { object_id: u32, position: ObjectPosition },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FrameMarkerMsg {
    object_frame_id: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectMsg {
    object_id: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectTypeMsg {
    object_id: u32,
    #[serde(rename = "type")]
    kind: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectPositionMsg {
    object_id: u32,
    x: f64,
    y: f64,
    z: f64,
}

impl PerceptionEvent {
    /// Types a decoded record. Unrecognised data types yield `Ok(None)`.
    pub fn from_record(record: &DecodedRecord) -> Result<Option<Self>, IngestError> {
        use message_ids::*;

        let event = match record.data_type {
            GEODETIC_WGS84_READING => PerceptionEvent::Geodetic(payload(record)?),
            OBJECT_FRAME_START => {
                let m: FrameMarkerMsg = payload(record)?;
                PerceptionEvent::FrameStart { frame_id: m.object_frame_id }
            }
            OBJECT_FRAME_END => {
                let m: FrameMarkerMsg = payload(record)?;
                PerceptionEvent::FrameEnd { frame_id: m.object_frame_id }
            }
            OBJECT => {
                let m: ObjectMsg = payload(record)?;
                PerceptionEvent::ObjectSeen { object_id: m.object_id }
            }
            OBJECT_TYPE => {
                let m: ObjectTypeMsg = payload(record)?;
                PerceptionEvent::ObjectType { object_id: m.object_id, kind: m.kind }
            }
            OBJECT_POSITION => {
                let m: ObjectPositionMsg = payload(record)?;
                PerceptionEvent::ObjectPosition {
                    object_id: m.object_id,
                    position: ObjectPosition { x: m.x, y: m.y, z: m.z },
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(event))
    }
}

fn payload<T: DeserializeOwned>(record: &DecodedRecord) -> Result<T, IngestError> {
    T::deserialize(&record.payload).map_err(|source| IngestError::Payload {
        data_type: record.data_type,
        source,
    })
}

/// Runs one inbound buffer through the codec and the typing step.
pub fn decode_event(
    codec: &dyn EnvelopeCodec,
    buf: &[u8],
) -> Result<Option<PerceptionEvent>, IngestError> {
    let text = codec.decode_envelope_to_json(buf)?;
    match DecodedRecord::from_json(&text)? {
        Some(record) => PerceptionEvent::from_record(&record),
        None => Ok(None),
    }
}

/// Lifecycle and data notifications from a transport.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Opened,
    Frame(bytes::Bytes),
    Closed,
}

pub type StreamTx = crossbeam_channel::Sender<StreamEvent>;
pub type StreamRx = crossbeam_channel::Receiver<StreamEvent>;

/// Outbound binary frames. Unbounded so a blocking input thread can send.
pub type OutboundTx = tokio::sync::mpsc::UnboundedSender<Vec<u8>>;
pub type OutboundRx = tokio::sync::mpsc::UnboundedReceiver<Vec<u8>>;

/// Trait for any duplex envelope stream
#[async_trait::async_trait]
pub trait StreamSource: Send + Sync {
    async fn run(&self, tx: StreamTx, outbound: OutboundRx) -> Result<(), IngestError>;
}

pub fn channel() -> (StreamTx, StreamRx) {
    crossbeam_channel::unbounded()
}

pub fn outbound_channel() -> (OutboundTx, OutboundRx) {
    tokio::sync::mpsc::unbounded_channel()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(data_type: i32, payload: Value) -> DecodedRecord {
        DecodedRecord { data_type, sender_stamp: 0, payload }
    }

    #[test]
    fn test_empty_decode_is_noop() {
        assert_eq!(DecodedRecord::from_json("{}").unwrap(), None);
        assert_eq!(DecodedRecord::from_json("").unwrap(), None);
    }

    #[test]
    fn test_record_skips_envelope_timestamps() {
        let text = json!({
            "dataType": 1128,
            "received": { "seconds": 1, "microseconds": 2 },
            "sent": { "seconds": 1, "microseconds": 0 },
            "sampleTimeStamp": { "seconds": 1, "microseconds": 0 },
            "senderStamp": 3,
            "opendlv_logic_perception_ObjectFrameStart": { "objectFrameId": 42 }
        })
        .to_string();

        let rec = DecodedRecord::from_json(&text).unwrap().unwrap();
        assert_eq!(rec.data_type, 1128);
        assert_eq!(rec.sender_stamp, 3);
        assert_eq!(rec.payload, json!({ "objectFrameId": 42 }));
        assert_eq!(
            PerceptionEvent::from_record(&rec).unwrap(),
            Some(PerceptionEvent::FrameStart { frame_id: 42 })
        );
    }

    #[test]
    fn test_typed_events() {
        let cases = vec![
            (
                record(19, json!({ "latitude": 57.7, "longitude": 11.9 })),
                PerceptionEvent::Geodetic(GeodeticReading::new(57.7, 11.9)),
            ),
            (
                record(1129, json!({ "objectFrameId": 7 })),
                PerceptionEvent::FrameEnd { frame_id: 7 },
            ),
            (
                record(1130, json!({ "objectId": 5 })),
                PerceptionEvent::ObjectSeen { object_id: 5 },
            ),
            (
                record(1131, json!({ "objectId": 5, "type": 2 })),
                PerceptionEvent::ObjectType { object_id: 5, kind: 2 },
            ),
            (
                record(1136, json!({ "objectId": 5, "x": 3.0, "y": 4.0, "z": 0.5 })),
                PerceptionEvent::ObjectPosition {
                    object_id: 5,
                    position: ObjectPosition { x: 3.0, y: 4.0, z: 0.5 },
                },
            ),
        ];
        for (rec, expected) in cases {
            assert_eq!(PerceptionEvent::from_record(&rec).unwrap(), Some(expected));
        }
    }

    #[test]
    fn test_unknown_tag_is_ignored() {
        let rec = record(1050, json!({ "whatever": 1 }));
        assert_eq!(PerceptionEvent::from_record(&rec).unwrap(), None);
    }

    #[test]
    fn test_bad_payload_reports_data_type() {
        let rec = record(1131, json!({ "objectId": "five" }));
        match PerceptionEvent::from_record(&rec) {
            Err(IngestError::Payload { data_type, .. }) => assert_eq!(data_type, 1131),
            other => panic!("unexpected {other:?}"),
        }
    }
}
