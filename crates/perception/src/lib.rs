//! Per-frame accumulation of perceived objects.
//!
//! Object records for a frame arrive between a frame-start and a frame-end
//! carrying the same frame id. Fields of one object arrive as separate
//! records in any order; they are merged into the working set. A matching
//! frame-end moves the working set into the ready set, replacing it.

use std::mem;

use serde::{Deserialize, Serialize};

use model::{ObjectPosition, ObjectSet, TrackedObject};
use od4_ingest_core::PerceptionEvent;

/// What a frame-start does to objects collected since the last frame-end.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameStartPolicy {
    /// Forget them. No object can leak from one frame into the next.
    #[default]
    ClearWorkingSet,
    /// Keep them; they become part of the new frame.
    KeepWorkingSet,
}

#[derive(Clone, Debug, PartialEq)]
pub enum FrameOutcome {
    /// The ready set now holds `objects` entries from frame `frame_id`.
    Committed { frame_id: u32, objects: usize },
    /// Frame-end did not match the open frame; `discarded` objects were dropped.
    Dropped {
        expected: Option<u32>,
        received: u32,
        discarded: usize,
    },
}

#[derive(Debug, Default)]
pub struct FrameAccumulator {
    policy: FrameStartPolicy,
    current_frame_id: Option<u32>,
    working: ObjectSet,
    ready: ObjectSet,
    committed: u64,
    dropped: u64,
}

impl FrameAccumulator {
    pub fn new(policy: FrameStartPolicy) -> Self {
        Self { policy, ..Self::default() }
    }

    pub fn policy(&self) -> FrameStartPolicy {
        self.policy
    }

    pub fn current_frame_id(&self) -> Option<u32> {
        self.current_frame_id
    }

    pub fn working(&self) -> &ObjectSet {
        &self.working
    }

    /// Last committed frame.
    pub fn ready(&self) -> &ObjectSet {
        &self.ready
    }

    pub fn committed_frames(&self) -> u64 {
        self.committed
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped
    }

    pub fn on_frame_start(&mut self, frame_id: u32) {
        log::debug!("Frame start {}", frame_id);
        self.current_frame_id = Some(frame_id);
        if self.policy == FrameStartPolicy::ClearWorkingSet {
            self.working.clear();
        }
    }

    pub fn on_frame_end(&mut self, frame_id: u32) -> FrameOutcome {
        log::debug!("Frame end {}", frame_id);
        if self.current_frame_id != Some(frame_id) {
            let discarded = self.working.len();
            self.working.clear();
            self.dropped += 1;
            log::warn!(
                "Dropping frame: end {} does not match start {:?} ({} objects discarded)",
                frame_id,
                self.current_frame_id,
                discarded
            );
            return FrameOutcome::Dropped {
                expected: self.current_frame_id,
                received: frame_id,
                discarded,
            };
        }

        self.ready = mem::take(&mut self.working);
        self.committed += 1;
        FrameOutcome::Committed { frame_id, objects: self.ready.len() }
    }

    pub fn on_object_seen(&mut self, object_id: u32) {
        self.entry(object_id);
    }

    pub fn on_object_type(&mut self, object_id: u32, kind: u32) {
        self.entry(object_id).kind = Some(kind);
    }

    pub fn on_object_position(&mut self, object_id: u32, position: ObjectPosition) {
        self.entry(object_id).position = Some(position);
    }

    /// Routes frame and object events; returns the outcome of a frame-end.
    pub fn apply(&mut self, event: &PerceptionEvent) -> Option<FrameOutcome> {
        match *event {
            PerceptionEvent::FrameStart { frame_id } => self.on_frame_start(frame_id),
            PerceptionEvent::FrameEnd { frame_id } => return Some(self.on_frame_end(frame_id)),
            PerceptionEvent::ObjectSeen { object_id } => self.on_object_seen(object_id),
            PerceptionEvent::ObjectType { object_id, kind } => self.on_object_type(object_id, kind),
            PerceptionEvent::ObjectPosition { object_id, position } => {
                self.on_object_position(object_id, position)
            }
            PerceptionEvent::Geodetic(_) => {}
        }
        None
    }

    fn entry(&mut self, object_id: u32) -> &mut TrackedObject {
        self.working
            .entry(object_id)
            .or_insert_with(|| TrackedObject::new(object_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(x: f64, y: f64) -> ObjectPosition {
        ObjectPosition { x, y, z: 0.0 }
    }

    fn create_test_frame(acc: &mut FrameAccumulator, frame_id: u32, ids: &[u32]) -> FrameOutcome {
        acc.on_frame_start(frame_id);
        for &id in ids {
            acc.on_object_seen(id);
            acc.on_object_type(id, id % 3);
            acc.on_object_position(id, pos(id as f64, 0.0));
        }
        acc.on_frame_end(frame_id)
    }

    #[test]
    fn test_field_order_does_not_matter() {
        let mut a = FrameAccumulator::default();
        a.on_object_type(5, 1);
        a.on_object_position(5, pos(3.0, 4.0));

        let mut b = FrameAccumulator::default();
        b.on_object_position(5, pos(3.0, 4.0));
        b.on_object_type(5, 1);

        assert_eq!(a.working(), b.working());
        let obj = &a.working()[&5];
        assert_eq!(obj.kind, Some(1));
        assert_eq!(obj.position, Some(pos(3.0, 4.0)));
    }

    #[test]
    fn test_object_seen_keeps_existing_fields() {
        let mut acc = FrameAccumulator::default();
        acc.on_object_position(2, pos(1.0, 1.0));
        acc.on_object_seen(2);
        acc.on_object_type(2, 0);
        assert!(acc.working()[&2].is_renderable());
    }

    #[test]
    fn test_matching_end_replaces_ready_set() {
        let mut acc = FrameAccumulator::default();
        assert_eq!(
            create_test_frame(&mut acc, 1, &[1, 2, 3]),
            FrameOutcome::Committed { frame_id: 1, objects: 3 }
        );
        assert!(acc.working().is_empty());

        assert_eq!(
            create_test_frame(&mut acc, 2, &[7]),
            FrameOutcome::Committed { frame_id: 2, objects: 1 }
        );
        assert_eq!(acc.ready().keys().copied().collect::<Vec<_>>(), vec![7]);
        assert!(acc.working().is_empty());
        assert_eq!(acc.committed_frames(), 2);
    }

    #[test]
    fn test_mismatched_end_leaves_ready_set() {
        let mut acc = FrameAccumulator::default();
        create_test_frame(&mut acc, 1, &[1]);
        let before = acc.ready().clone();

        acc.on_frame_start(2);
        acc.on_object_type(9, 2);
        let outcome = acc.on_frame_end(3);

        assert_eq!(
            outcome,
            FrameOutcome::Dropped { expected: Some(2), received: 3, discarded: 1 }
        );
        assert_eq!(acc.ready(), &before);
        assert!(acc.working().is_empty());
        assert_eq!(acc.dropped_frames(), 1);
    }

    #[test]
    fn test_end_without_start_is_dropped() {
        let mut acc = FrameAccumulator::default();
        acc.on_object_seen(1);
        assert!(matches!(
            acc.on_frame_end(0),
            FrameOutcome::Dropped { expected: None, received: 0, .. }
        ));
        assert!(acc.ready().is_empty());
    }

    #[test]
    fn test_start_policy() {
        let mut clear = FrameAccumulator::new(FrameStartPolicy::ClearWorkingSet);
        clear.on_object_seen(4);
        clear.on_frame_start(1);
        assert!(clear.working().is_empty());

        let mut keep = FrameAccumulator::new(FrameStartPolicy::KeepWorkingSet);
        keep.on_object_seen(4);
        keep.on_frame_start(1);
        assert!(keep.working().contains_key(&4));
        assert_eq!(
            keep.on_frame_end(1),
            FrameOutcome::Committed { frame_id: 1, objects: 1 }
        );
    }

    #[test]
    fn test_apply_routes_events() {
        let mut acc = FrameAccumulator::default();
        let events = [
            PerceptionEvent::FrameStart { frame_id: 10 },
            PerceptionEvent::ObjectSeen { object_id: 5 },
            PerceptionEvent::ObjectType { object_id: 5, kind: 1 },
            PerceptionEvent::ObjectPosition { object_id: 5, position: pos(3.0, 4.0) },
        ];
        for e in &events {
            assert_eq!(acc.apply(e), None);
        }
        assert_eq!(
            acc.apply(&PerceptionEvent::FrameEnd { frame_id: 10 }),
            Some(FrameOutcome::Committed { frame_id: 10, objects: 1 })
        );
        assert_eq!(acc.current_frame_id(), Some(10));
    }
}
