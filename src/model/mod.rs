#[cfg(feature = "tch-backend")]
mod handle;
mod prompt;
mod registry;
mod types;

#[cfg(feature = "tch-backend")]
pub use handle::{MediaInput, MultimodalModel};
pub use prompt::{DEFAULT_AUDIO_PROMPT, DEFAULT_IMAGE_PROMPT, audio_prompt, image_prompt};
pub use registry::ModelRegistry;
pub use types::{HealthResponse, ProcessAudioRequest, ProcessImageRequest, ProcessResponse};
