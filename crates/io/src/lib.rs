use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Read, Write},
    path::Path,
};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use uuid::Uuid;

use model::*;

/// Reads a landmark file: `id;type;latitude;longitude`, first line is a
/// header. Rows that do not have exactly four fields are skipped.
pub fn import_map_file(path: &Path) -> Result<Vec<MapObject>> {
    let f = File::open(path).with_context(|| format!("open map file {}", path.display()))?;
    parse_map_objects(f)
}

pub fn parse_map_objects<R: Read>(input: R) -> Result<Vec<MapObject>> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input);

    let mut objects = vec![];
    for (i, rec) in rdr.records().enumerate() {
        let rec = rec?;
        if rec.len() != 4 {
            log::debug!("Skipping map row {} with {} fields", i + 2, rec.len());
            continue;
        }
        match parse_map_row(&rec) {
            Some(o) => {
                log::debug!(
                    "Found object id={} type={} at {}, {}",
                    o.id, o.kind, o.latitude, o.longitude
                );
                objects.push(o);
            }
            None => log::warn!("Skipping unparsable map row {}: {:?}", i + 2, rec),
        }
    }
    Ok(objects)
}

fn parse_map_row(rec: &csv::StringRecord) -> Option<MapObject> {
    Some(MapObject {
        id: rec.get(0)?.parse().ok()?,
        kind: rec.get(1)?.parse().ok()?,
        latitude: rec.get(2)?.parse().ok()?,
        longitude: rec.get(3)?.parse().ok()?,
    })
}

/// `{"object":[{"id":..,"type":..,"latitude":..,"longitude":..},..]}`
pub fn map_objects_json(objects: &[MapObject]) -> Value {
    json!({ "object": objects })
}

pub fn markers_geojson(markers: &[Marker]) -> Value {
    let features: Vec<Value> = markers
        .iter()
        .map(|m| {
            json!({
                "type": "Feature",
                "geometry": {
                    "type": "Point",
                    "coordinates": [m.position.longitude, m.position.latitude],
                },
                "properties": {
                    "radius_m": m.radius_m,
                    "color": m.color,
                },
            })
        })
        .collect();
    json!({ "type": "FeatureCollection", "features": features })
}

pub fn export_geojson(markers: &[Marker], path: &Path) -> Result<()> {
    let f = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let mut w = BufWriter::new(f);
    serde_json::to_writer_pretty(&mut w, &markers_geojson(markers))?;
    w.flush()?;
    Ok(())
}

/// One committed frame as written by [`FrameRecorder`].
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct RecordedFrame {
    pub session: Uuid,
    pub recorded_at: String,
    pub frame_id: u32,
    #[serde(default)]
    pub objects: Vec<TrackedObject>,
}

/// Appends committed frames to an NDJSON file, one line per frame.
pub struct FrameRecorder {
    session: Uuid,
    w: BufWriter<File>,
    frames: u64,
}

impl FrameRecorder {
    pub fn create(path: &Path, session: Uuid) -> Result<Self> {
        let f = File::create(path).with_context(|| format!("create {}", path.display()))?;
        Ok(Self { session, w: BufWriter::new(f), frames: 0 })
    }

    pub fn record(&mut self, frame_id: u32, objects: &ObjectSet) -> Result<()> {
        let frame = RecordedFrame {
            session: self.session,
            recorded_at: OffsetDateTime::now_utc().format(&Rfc3339)?,
            frame_id,
            objects: objects.values().cloned().collect(),
        };
        let s = serde_json::to_string(&frame)?;
        writeln!(self.w, "{}", s)?;
        self.w.flush()?;
        self.frames += 1;
        Ok(())
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

pub fn import_frames(path: &Path) -> Result<Vec<RecordedFrame>> {
    let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let rdr = BufReader::new(f);
    let mut frames = vec![];
    for line in rdr.lines() {
        let s = line?;
        if s.trim().is_empty() {
            continue;
        }
        frames.push(serde_json::from_str(&s)?);
    }
    Ok(frames)
}
