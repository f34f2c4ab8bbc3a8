pub mod config;
pub mod error;
pub mod fetch;
pub mod media;
pub mod model;
pub mod server;

pub use config::AppConfig;
pub use error::ServiceError;
pub use model::{
    HealthResponse, ModelRegistry, ProcessAudioRequest, ProcessImageRequest, ProcessResponse,
};
pub use server::build_router;
