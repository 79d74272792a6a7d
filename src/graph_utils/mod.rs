pub mod alignment;
pub mod connection;
pub mod error;
pub mod graph;
pub mod history;
pub mod ids;
pub mod registry;
