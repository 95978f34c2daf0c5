// Batchflow Core - Domain Logic, Ports & Engine
// NO infrastructure dependencies: storage, processes and file locks live behind ports

pub mod application;
pub mod domain;
pub mod error;
pub mod port;
pub mod shutdown;

pub use error::{AppError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
