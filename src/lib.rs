//! Library crate for lan-sweep-rs exposing reusable modules.
pub mod error;
pub mod probe;
pub mod range;
pub mod resolve;
pub mod scanner;
pub mod scheduler;
pub mod server;
pub mod state;
pub mod store;
pub mod types;
