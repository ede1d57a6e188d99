use std::{sync::Arc, thread::JoinHandle};

use parking_lot::Mutex;

use iox::FrameRecorder;
use model::MapObject;
use od4_ingest_core::{
    channel, decode_event, outbound_channel, EnvelopeCodec, IngestError, OutboundTx,
    PerceptionEvent, StreamEvent, StreamSource,
};
use perception::{FrameAccumulator, FrameOutcome};
use render::{Canvas, MapView, MapWidget, ObjectView};

use crate::config::ViewerConfig;

/// All viewer state. Every mutation goes through the one mutex.
pub struct ViewerSession<C, M> {
    pub inner: Mutex<Inner<C, M>>,
}

impl<C: Canvas, M: MapWidget> ViewerSession<C, M> {
    pub fn new(inner: Inner<C, M>) -> Self {
        Self { inner: Mutex::new(inner) }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct SessionStats {
    pub envelopes: u64,
    /// Decoded fine but carried nothing the viewer dispatches on.
    pub ignored: u64,
    pub undecodable: u64,
}

pub struct Inner<C, M> {
    pub codec: Box<dyn EnvelopeCodec>,
    pub accumulator: FrameAccumulator,
    pub object_view: ObjectView,
    pub canvas: C,
    pub map_view: MapView,
    pub map: M,
    pub recorder: Option<FrameRecorder>,
    pub connected: bool,
    pub stats: SessionStats,
}

impl<C: Canvas, M: MapWidget> Inner<C, M> {
    pub fn new(cfg: &ViewerConfig, codec: Box<dyn EnvelopeCodec>, mut canvas: C, mut map: M) -> Self {
        let object_view = ObjectView::new(cfg.object_view.clone());
        let map_view = MapView::new(cfg.map_view.clone());
        map_view.init(&mut map);
        object_view.clear(&mut canvas);
        Self {
            codec,
            accumulator: FrameAccumulator::new(cfg.frame_start_policy),
            object_view,
            canvas,
            map_view,
            map,
            recorder: None,
            connected: false,
            stats: SessionStats::default(),
        }
    }

    /// Loads the message specification; decoding fails until this is done.
    pub fn initialize(&mut self, odvd: &str) -> Result<usize, IngestError> {
        let n = self.codec.load_specification(odvd)?;
        log::info!("Loaded {} messages from specification.", n);
        Ok(n)
    }

    /// Startup load. A missing or broken specification is logged and the
    /// session stays decode-gated; the transport still runs.
    pub fn initialize_from(&mut self, location: &str, fetched: anyhow::Result<String>) -> bool {
        let loaded = fetched.and_then(|odvd| Ok(self.initialize(&odvd)?));
        match loaded {
            Ok(_) => true,
            Err(e) => {
                log::error!("Could not load specification {}: {:#}", location, e);
                false
            }
        }
    }

    pub fn add_landmarks(&mut self, objects: &[MapObject]) {
        self.map_view.add_landmarks(&mut self.map, objects);
    }

    /// Returns false once the stream is gone.
    pub fn handle_stream_event(&mut self, ev: StreamEvent) -> bool {
        match ev {
            StreamEvent::Opened => {
                self.connected = true;
                log::info!("Connected to stream.");
                true
            }
            StreamEvent::Frame(buf) => {
                self.feed_frame(&buf);
                true
            }
            StreamEvent::Closed => {
                if self.connected {
                    log::info!("Disconnected from stream.");
                }
                self.connected = false;
                false
            }
        }
    }

    pub fn feed_frame(&mut self, buf: &[u8]) {
        self.stats.envelopes += 1;
        match decode_event(self.codec.as_ref(), buf) {
            Ok(Some(ev)) => self.feed_event(&ev),
            Ok(None) => self.stats.ignored += 1,
            Err(e) => {
                self.stats.undecodable += 1;
                log::debug!("Skipping envelope ({} bytes): {}", buf.len(), e);
            }
        }
    }

    pub fn feed_event(&mut self, ev: &PerceptionEvent) {
        match ev {
            PerceptionEvent::Geodetic(reading) => self.map_view.on_reading(&mut self.map, *reading),
            other => {
                if let Some(outcome) = self.accumulator.apply(other) {
                    self.on_frame_outcome(outcome);
                }
            }
        }
    }

    fn on_frame_outcome(&mut self, outcome: FrameOutcome) {
        let FrameOutcome::Committed { frame_id, .. } = outcome else {
            return;
        };
        self.object_view.draw(&mut self.canvas, self.accumulator.ready());
        if let Some(rec) = &mut self.recorder {
            if let Err(e) = rec.record(frame_id, self.accumulator.ready()) {
                log::error!("Frame recording stopped: {:#}", e);
                self.recorder = None;
            }
        }
    }
}

/// Spawns the transport on the runtime and a pump thread that feeds the
/// session. Returns the outbound sender and the pump handle.
pub fn run_source<S, C, M>(src: S, sess: Arc<ViewerSession<C, M>>) -> (OutboundTx, JoinHandle<()>)
where
    S: StreamSource + 'static,
    C: Canvas + Send + 'static,
    M: MapWidget + Send + 'static,
{
    let (tx, rx) = channel();
    let (out_tx, out_rx) = outbound_channel();
    let fail_tx = tx.clone();
    tokio::spawn(async move {
        if let Err(e) = src.run(tx, out_rx).await {
            log::error!("Error: {}", e);
            let _ = fail_tx.send(StreamEvent::Closed);
        }
    });
    // pump events into the session (blocking thread)
    let pump = std::thread::spawn(move || {
        for ev in rx.iter() {
            let mut inner = sess.inner.lock();
            if !inner.handle_stream_event(ev) {
                break;
            }
        }
    });
    (out_tx, pump)
}
