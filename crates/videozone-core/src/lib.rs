//! VideoZone Core - Frames, shared types, configuration and error handling

pub mod config;
pub mod error;
pub mod frame;
pub mod types;

pub use config::*;
pub use error::{Error, Result};
pub use frame::Frame;
pub use types::*;
