pub mod aggregator;
pub mod api;
pub mod config;
pub mod error;
pub mod estimation;
pub mod queue;
pub mod recommendation;
pub mod slot;
pub mod state;
pub mod store;
