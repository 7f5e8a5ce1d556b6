//! Static environment prior (rooms, doors and their marker IDs).

pub mod database;

pub use database::{DoorPrior, PriorDatabase, RoomPrior};
