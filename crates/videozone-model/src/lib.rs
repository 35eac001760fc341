//! VideoZone Model - Generative image model adapters

pub mod fallback;
pub mod mock;
pub mod provider;
pub mod remote;

pub use fallback::{generate_or_perturb, OfflineModel};
pub use mock::{MockBehavior, MockModel};
pub use provider::{GenerateRequest, ImageModel, ModelError, ModelResult};
pub use remote::RemoteImg2Img;
