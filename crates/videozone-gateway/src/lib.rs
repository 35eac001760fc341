//! VideoZone Gateway - HTTP surface over the hallucination engine

pub mod server;
pub mod stream;

pub use server::{router, start_gateway, GatewayState};
pub use stream::{frame_stream, multipart_part, BOUNDARY};
