//! Recorded front-end output, replayed through the semantic system.
//!
//! A dataset directory holds three CSV files (headers required, `#` comments
//! allowed):
//!
//! - `keyframes.csv`: `id,timestamp_ns,tx,ty,tz,qw,qx,qy,qz` (camera pose T_wc)
//! - `markers.csv`: `timestamp_ns,marker_id,tx,ty,tz,qw,qx,qy,qz` (marker pose T_wm)
//! - `map_points.csv`: `keyframe_id,point_id,x,y,z,outlier` (optional)

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use csv::{ReaderBuilder, Trim};
use nalgebra::Vector3;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{info, warn};

use crate::geometry::SE3;
use crate::map::{KeyFrame, KeyFrameId, MapPoint, MapPointId};
use crate::semantic::{Marker, MarkerId};

#[derive(Debug, Deserialize)]
struct KeyFrameRow {
    id: u64,
    timestamp_ns: u64,
    tx: f64,
    ty: f64,
    tz: f64,
    qw: f64,
    qx: f64,
    qy: f64,
    qz: f64,
}

#[derive(Debug, Deserialize)]
struct MarkerRow {
    timestamp_ns: u64,
    marker_id: u32,
    tx: f64,
    ty: f64,
    tz: f64,
    qw: f64,
    qx: f64,
    qy: f64,
    qz: f64,
}

#[derive(Debug, Deserialize)]
struct MapPointRow {
    keyframe_id: u64,
    point_id: u64,
    x: f64,
    y: f64,
    z: f64,
    #[serde(default)]
    outlier: bool,
}

/// One replay step, in timestamp order.
#[derive(Debug, Clone)]
pub enum ReplayEvent {
    Markers { timestamp_ns: u64, markers: Vec<Marker> },
    KeyFrame(Arc<KeyFrame>),
}

impl ReplayEvent {
    pub fn timestamp_ns(&self) -> u64 {
        match self {
            ReplayEvent::Markers { timestamp_ns, .. } => *timestamp_ns,
            ReplayEvent::KeyFrame(kf) => kf.timestamp_ns,
        }
    }
}

#[derive(Debug)]
pub struct ReplayDataset {
    pub keyframes: Vec<Arc<KeyFrame>>,
    /// Sighting sets grouped by timestamp, ascending.
    pub marker_sightings: Vec<(u64, Vec<Marker>)>,
}

impl ReplayDataset {
    pub fn load<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref();

        let keyframe_rows: Vec<KeyFrameRow> = read_rows(root.join("keyframes.csv"))?;
        let marker_rows: Vec<MarkerRow> = read_rows(root.join("markers.csv"))?;
        let map_points_path = root.join("map_points.csv");
        let point_rows: Vec<MapPointRow> = if map_points_path.exists() {
            read_rows(map_points_path)?
        } else {
            warn!("No map_points.csv in {:?}, keyframes carry no map points", root);
            Vec::new()
        };

        let mut points_by_kf: HashMap<u64, Vec<MapPoint>> = HashMap::new();
        for row in point_rows {
            let mut mp = MapPoint::new(MapPointId::new(row.point_id), Vector3::new(row.x, row.y, row.z));
            mp.is_outlier = row.outlier;
            points_by_kf.entry(row.keyframe_id).or_default().push(mp);
        }

        let mut keyframes = Vec::with_capacity(keyframe_rows.len());
        for row in keyframe_rows {
            let pose = SE3::from_quaternion(row.qw, row.qx, row.qy, row.qz, Vector3::new(row.tx, row.ty, row.tz));
            let points = points_by_kf.remove(&row.id).unwrap_or_default();
            keyframes.push(Arc::new(KeyFrame::new(
                KeyFrameId::new(row.id),
                row.timestamp_ns,
                pose,
                points,
            )));
        }
        for kf_id in points_by_kf.keys() {
            warn!("map_points.csv references unknown keyframe {}", kf_id);
        }
        keyframes.sort_by_key(|kf| (kf.timestamp_ns, kf.id));

        let mut grouped: BTreeMap<u64, Vec<Marker>> = BTreeMap::new();
        for row in marker_rows {
            let pose = SE3::from_quaternion(row.qw, row.qx, row.qy, row.qz, Vector3::new(row.tx, row.ty, row.tz));
            grouped
                .entry(row.timestamp_ns)
                .or_default()
                .push(Marker::new(MarkerId::new(row.marker_id), pose, row.timestamp_ns));
        }

        if keyframes.is_empty() {
            bail!("No keyframes in {:?}", root);
        }
        info!(
            "Loaded {} keyframes and {} marker sighting sets from {:?}",
            keyframes.len(),
            grouped.len(),
            root
        );

        Ok(Self {
            keyframes,
            marker_sightings: grouped.into_iter().collect(),
        })
    }

    /// Marker sightings and keyframes merged in timestamp order; sightings
    /// come first when timestamps are equal.
    pub fn events(&self) -> Vec<ReplayEvent> {
        let mut events: Vec<ReplayEvent> = self
            .marker_sightings
            .iter()
            .map(|(ts, markers)| ReplayEvent::Markers {
                timestamp_ns: *ts,
                markers: markers.clone(),
            })
            .chain(self.keyframes.iter().cloned().map(ReplayEvent::KeyFrame))
            .collect();
        events.sort_by_key(|e| (e.timestamp_ns(), matches!(e, ReplayEvent::KeyFrame(_))));
        events
    }
}

fn read_rows<T: DeserializeOwned>(csv_path: PathBuf) -> Result<Vec<T>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .comment(Some(b'#'))
        .trim(Trim::All)
        .from_path(&csv_path)
        .with_context(|| format!("Failed to open {}", csv_path.display()))?;

    let mut rows = Vec::new();
    for (i, rec) in rdr.deserialize().enumerate() {
        let row: T = rec.with_context(|| format!("Malformed row {} in {}", i + 1, csv_path.display()))?;
        rows.push(row);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::fs;

    fn write_dataset(dir: &Path, with_points: bool) {
        fs::write(
            dir.join("keyframes.csv"),
            "id,timestamp_ns,tx,ty,tz,qw,qx,qy,qz\n\
             1,2000,0,0,0,1,0,0,0\n\
             0,1000,1,2,3,1,0,0,0\n",
        )
        .unwrap();
        fs::write(
            dir.join("markers.csv"),
            "timestamp_ns,marker_id,tx,ty,tz,qw,qx,qy,qz\n\
             # detector output\n\
             1000,4,1,0,1,1,0,0,0\n\
             1000,5,2,0,1,1,0,0,0\n\
             1500,4,1,0,1,1,0,0,0\n",
        )
        .unwrap();
        if with_points {
            fs::write(
                dir.join("map_points.csv"),
                "keyframe_id,point_id,x,y,z,outlier\n\
                 0,10,1,0,1,false\n\
                 0,11,1,0.1,1,true\n",
            )
            .unwrap();
        }
    }

    #[test]
    fn test_load_and_order_events() {
        let dir = tempfile::tempdir().unwrap();
        write_dataset(dir.path(), true);

        let dataset = ReplayDataset::load(dir.path()).unwrap();
        assert_eq!(dataset.keyframes.len(), 2);
        assert_eq!(dataset.keyframes[0].id, KeyFrameId::new(0));
        assert_relative_eq!(dataset.keyframes[0].camera_center(), Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(dataset.keyframes[0].map_points.len(), 2);
        assert_eq!(dataset.keyframes[0].inlier_points().count(), 1);

        assert_eq!(dataset.marker_sightings.len(), 2);
        assert_eq!(dataset.marker_sightings[0].1.len(), 2);

        let order: Vec<(u64, bool)> = dataset
            .events()
            .iter()
            .map(|e| (e.timestamp_ns(), matches!(e, ReplayEvent::KeyFrame(_))))
            .collect();
        assert_eq!(order, vec![(1000, false), (1000, true), (1500, false), (2000, true)]);
    }

    #[test]
    fn test_map_points_optional() {
        let dir = tempfile::tempdir().unwrap();
        write_dataset(dir.path(), false);
        let dataset = ReplayDataset::load(dir.path()).unwrap();
        assert!(dataset.keyframes.iter().all(|kf| kf.map_points.is_empty()));
    }

    #[test]
    fn test_malformed_row_fails() {
        let dir = tempfile::tempdir().unwrap();
        write_dataset(dir.path(), false);
        fs::write(
            dir.path().join("markers.csv"),
            "timestamp_ns,marker_id,tx,ty,tz,qw,qx,qy,qz\n1000,abc,1,0,1,1,0,0,0\n",
        )
        .unwrap();
        assert!(ReplayDataset::load(dir.path()).is_err());
    }

    #[test]
    fn test_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ReplayDataset::load(dir.path()).is_err());
    }
}
