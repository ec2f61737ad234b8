pub mod api;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod fleet;
pub mod scheduler;
pub mod server;
pub mod shutdown;
pub mod sweeper;

pub use coordinator::Coordinator;
pub use error::{CoordinatorError, Result};
