pub mod db;
pub mod graph;
pub mod store;
pub mod types;
