pub mod edges;
pub mod errors;
pub mod files;
pub mod locations;
pub mod meta;
pub mod nodes;
pub mod stats;
