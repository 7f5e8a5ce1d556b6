pub mod geometry;
pub mod io;
pub mod map;
pub mod prior;
pub mod semantic;
pub mod semantic_mapping;
pub mod system;
