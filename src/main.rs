use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use tracing::info;
use tracing_subscriber::EnvFilter;

use semantic_vslam::io::{ReplayDataset, ReplayEvent, write_snapshot};
use semantic_vslam::prior::PriorDatabase;
use semantic_vslam::semantic::{RoomStatus, SemanticConfig};
use semantic_vslam::system::SemanticSystem;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("semantic_vslam=info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let Some(dataset_arg) = args.get(1) else {
        bail!("usage: semantic_vslam <dataset_dir> [prior.json] [config.yaml]");
    };
    let dataset_path = PathBuf::from(dataset_arg);

    let prior = match args.get(2) {
        Some(path) => PriorDatabase::load(path)?,
        None => {
            info!("No prior given, every marker is unregistered");
            PriorDatabase::default()
        }
    };
    let config = match args.get(3) {
        Some(path) => SemanticConfig::from_yaml_file(path)?,
        None => SemanticConfig::default(),
    };

    println!("Loading replay dataset from: {}", dataset_path.display());
    let dataset = ReplayDataset::load(&dataset_path)?;
    println!(
        "Loaded {} keyframes, {} marker sighting sets, {} room priors, {} door priors",
        dataset.keyframes.len(),
        dataset.marker_sightings.len(),
        prior.rooms.len(),
        prior.doors.len()
    );

    let mut system = SemanticSystem::new(prior, config)?;
    for event in dataset.events() {
        match event {
            ReplayEvent::Markers { timestamp_ns, markers } => {
                system.add_marker_sightings(timestamp_ns, markers);
            }
            ReplayEvent::KeyFrame(keyframe) => {
                system.submit_keyframe(keyframe);
            }
        }
    }
    system.shutdown();

    let snapshot = system.snapshot();
    println!(
        "Processed {} keyframes ({} markers skipped)",
        snapshot.keyframes_processed,
        system.shared_state().markers_skipped()
    );
    println!("Walls: {}", snapshot.walls.len());
    for wall in &snapshot.walls {
        let n = wall.plane.normal();
        println!(
            "  {}: n=[{:.2}, {:.2}, {:.2}] d={:.2} markers={:?} support={}",
            wall.id,
            n.x,
            n.y,
            n.z,
            wall.plane.offset(),
            wall.markers.iter().map(|m| m.0).collect::<Vec<_>>(),
            wall.support
        );
    }
    println!("Doors: {}", snapshot.doors.len());
    for door in &snapshot.doors {
        let host = door.host_wall.map(|w| w.to_string()).unwrap_or_else(|| "none".to_string());
        println!(
            "  {} '{}': pos=[{:.2}, {:.2}, {:.2}] host={}",
            door.id, door.name, door.position.x, door.position.y, door.position.z, host
        );
    }
    println!("Rooms: {}", snapshot.rooms.len());
    for room in &snapshot.rooms {
        let marker = if room.status == RoomStatus::Finalized { " (final)" } else { "" };
        println!(
            "  {} '{}'{}: center=[{:.2}, {:.2}, {:.2}] walls={} doors={}",
            room.id,
            room.name,
            marker,
            room.center.x,
            room.center.y,
            room.center.z,
            room.walls.len(),
            room.doors.len()
        );
    }

    let out_path = dataset_path.join("scene_graph.json");
    write_snapshot(&out_path, &snapshot).with_context(|| format!("Failed to export {}", out_path.display()))?;
    println!("Scene graph written to {}", out_path.display());

    Ok(())
}
