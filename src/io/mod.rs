pub mod export;
pub mod replay;

pub use export::{snapshot_to_json, write_snapshot};
pub use replay::{ReplayDataset, ReplayEvent};
