//! Fiducial marker sightings and the rolling buffer they are kept in.
//!
//! The detector publishes sightings at its own rate. Keyframes pick the
//! sighting set nearest in time: minimal absolute time difference, ties
//! broken by the earliest sighting.

use std::collections::VecDeque;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::geometry::SE3;

use super::types::MarkerId;

/// A single marker observation with its 6-DoF pose in world frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub id: MarkerId,

    /// Marker pose in world frame (T_wm). Local +Z is the marker's forward axis.
    pub pose: SE3,

    /// Timestamp in nanoseconds.
    pub timestamp_ns: u64,
}

impl Marker {
    pub fn new(id: MarkerId, pose: SE3, timestamp_ns: u64) -> Self {
        Self {
            id,
            pose,
            timestamp_ns,
        }
    }

    /// Marker centre in world frame.
    pub fn position(&self) -> Vector3<f64> {
        self.pose.translation
    }
}

/// Bounded rolling buffer of marker sightings, grouped by timestamp.
///
/// When full, the oldest sighting set is evicted. Sightings pushed with an
/// already buffered timestamp are coalesced into that set (newer sighting of
/// the same marker wins).
#[derive(Debug)]
pub struct MarkerBuffer {
    capacity: usize,
    entries: VecDeque<(u64, Vec<Marker>)>,
    dropped: usize,
}

impl MarkerBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: VecDeque::new(),
            dropped: 0,
        }
    }

    /// Add the sightings detected at `timestamp_ns`.
    pub fn push(&mut self, timestamp_ns: u64, markers: Vec<Marker>) {
        if let Some((_, existing)) = self.entries.iter_mut().find(|(ts, _)| *ts == timestamp_ns) {
            for marker in markers {
                match existing.iter_mut().find(|m| m.id == marker.id) {
                    Some(slot) => *slot = marker,
                    None => existing.push(marker),
                }
            }
            return;
        }

        self.entries.push_back((timestamp_ns, markers));
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
            self.dropped += 1;
        }
    }

    /// Sighting set nearest to `timestamp_ns`, with its absolute time offset.
    ///
    /// Sets further away than `max_offset_ns` are ignored.
    pub fn nearest(&self, timestamp_ns: u64, max_offset_ns: u64) -> Option<(u64, &[Marker])> {
        self.entries
            .iter()
            .map(|(ts, markers)| (ts.abs_diff(timestamp_ns), *ts, markers))
            .filter(|(offset, _, _)| *offset <= max_offset_ns)
            .min_by_key(|(offset, ts, _)| (*offset, *ts))
            .map(|(offset, _, markers)| (offset, markers.as_slice()))
    }

    /// Number of buffered sighting sets.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of sighting sets evicted because the buffer was full.
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sighting(id: u32, ts: u64) -> Marker {
        Marker::new(MarkerId::new(id), SE3::identity(), ts)
    }

    #[test]
    fn test_nearest_prefers_smallest_offset() {
        let mut buffer = MarkerBuffer::new(10);
        buffer.push(100, vec![sighting(1, 100)]);
        buffer.push(200, vec![sighting(2, 200)]);
        buffer.push(300, vec![sighting(3, 300)]);

        let (offset, markers) = buffer.nearest(210, 1000).unwrap();
        assert_eq!(offset, 10);
        assert_eq!(markers[0].id, MarkerId::new(2));
    }

    #[test]
    fn test_nearest_tie_breaks_to_earliest() {
        let mut buffer = MarkerBuffer::new(10);
        buffer.push(300, vec![sighting(3, 300)]);
        buffer.push(100, vec![sighting(1, 100)]);

        let (offset, markers) = buffer.nearest(200, 1000).unwrap();
        assert_eq!(offset, 100);
        assert_eq!(markers[0].id, MarkerId::new(1));
    }

    #[test]
    fn test_nearest_respects_max_offset() {
        let mut buffer = MarkerBuffer::new(10);
        buffer.push(100, vec![sighting(1, 100)]);
        assert!(buffer.nearest(1_000, 50).is_none());
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut buffer = MarkerBuffer::new(2);
        buffer.push(1, vec![sighting(1, 1)]);
        buffer.push(2, vec![sighting(2, 2)]);
        buffer.push(3, vec![sighting(3, 3)]);

        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.dropped(), 1);
        assert!(buffer.nearest(1, 0).is_none());
    }

    #[test]
    fn test_same_timestamp_coalesces() {
        let mut buffer = MarkerBuffer::new(2);
        buffer.push(5, vec![sighting(1, 5)]);
        buffer.push(5, vec![sighting(1, 5), sighting(2, 5)]);

        assert_eq!(buffer.len(), 1);
        let (_, markers) = buffer.nearest(5, 0).unwrap();
        assert_eq!(markers.len(), 2);
    }
}
