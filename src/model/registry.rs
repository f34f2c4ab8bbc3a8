use tokio::task;

#[cfg(feature = "tch-backend")]
use std::sync::Arc;

use crate::{
    config::AppConfig,
    error::ServiceError,
    fetch, media,
    model::types::{ProcessAudioRequest, ProcessImageRequest, ProcessResponse},
};

#[cfg(feature = "tch-backend")]
use crate::model::{
    handle::{MediaInput, MultimodalModel},
    prompt,
};

/// Owns the loaded model and the outbound HTTP client. One instance per
/// process, shared across request handlers.
pub struct ModelRegistry {
    http: reqwest::Client,
    #[cfg(feature = "tch-backend")]
    model: Option<Arc<MultimodalModel>>,
}

impl ModelRegistry {
    /// Load model artifacts and build the registry. Called before the
    /// listener binds; a load failure aborts startup.
    pub fn initialize(config: &AppConfig) -> Result<Self, ServiceError> {
        #[cfg(feature = "tch-backend")]
        {
            let model = Arc::new(MultimodalModel::load(config)?);
            tracing::info!(model = %config.model_path.display(), "model loaded");
            let mut registry = Self::unloaded(config)?;
            registry.model = Some(model);
            Ok(registry)
        }
        #[cfg(not(feature = "tch-backend"))]
        Self::unloaded(config)
    }

    /// Registry without a model: `/health` reports unavailable and inference
    /// requests answer 503. This is the permanent state of a build without
    /// the `tch-backend` feature.
    pub fn unloaded(config: &AppConfig) -> Result<Self, ServiceError> {
        Ok(Self {
            http: fetch::build_client(config)?,
            #[cfg(feature = "tch-backend")]
            model: None,
        })
    }

    pub fn is_ready(&self) -> bool {
        #[cfg(feature = "tch-backend")]
        {
            self.model.is_some()
        }
        #[cfg(not(feature = "tch-backend"))]
        false
    }

    pub async fn describe_image(
        &self,
        request: ProcessImageRequest,
        config: &AppConfig,
    ) -> Result<ProcessResponse, ServiceError> {
        let source = required_field(request.image_url.as_deref(), "image_url")?;
        let bytes = fetch::resolve(&self.http, source).await?;
        tracing::info!(bytes = bytes.len(), "image request resolved");

        #[cfg(feature = "tch-backend")]
        {
            let model = self.model.clone();
            let prompt = prompt::image_prompt(request.prompt.as_deref());
            let image_size = config.image_size;

            let result = task::spawn_blocking(move || {
                let image = media::image::decode(&bytes, image_size)?;
                let model = model.ok_or(ServiceError::ModelUnavailable)?;
                model.generate(&prompt, MediaInput::Image(image))
            })
            .await
            .map_err(|err| ServiceError::Inference(format!("inference task failed: {err}")))??;

            Ok(ProcessResponse { result })
        }
        #[cfg(not(feature = "tch-backend"))]
        {
            let _ = (bytes, config);
            Err(ServiceError::ModelUnavailable)
        }
    }

    pub async fn transcribe_audio(
        &self,
        request: ProcessAudioRequest,
        config: &AppConfig,
    ) -> Result<ProcessResponse, ServiceError> {
        let source = required_field(request.audio_url.as_deref(), "audio_url")?;
        let bytes = fetch::resolve(&self.http, source).await?;
        tracing::info!(bytes = bytes.len(), "audio request resolved");

        let sample_rate = config.audio_sample_rate;

        #[cfg(feature = "tch-backend")]
        {
            let model = self.model.clone();
            let prompt = prompt::audio_prompt(request.prompt.as_deref());

            let result = task::spawn_blocking(move || {
                let samples = media::audio::prepare(&bytes, sample_rate)?;
                let model = model.ok_or(ServiceError::ModelUnavailable)?;
                model.generate(&prompt, MediaInput::Audio(samples))
            })
            .await
            .map_err(|err| ServiceError::Inference(format!("inference task failed: {err}")))??;

            Ok(ProcessResponse { result })
        }
        #[cfg(not(feature = "tch-backend"))]
        {
            // Decode still runs so malformed payloads surface as such.
            task::spawn_blocking(move || media::audio::prepare(&bytes, sample_rate))
                .await
                .map_err(|err| ServiceError::Inference(format!("inference task failed: {err}")))??;
            Err(ServiceError::ModelUnavailable)
        }
    }
}

fn required_field<'a>(value: Option<&'a str>, name: &str) -> Result<&'a str, ServiceError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.trim()),
        _ => Err(ServiceError::Validation(format!("{name} is required"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_source_is_a_validation_error() {
        let err = required_field(None, "image_url").unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert_eq!(err.to_string(), "invalid request: image_url is required");
    }

    #[test]
    fn blank_source_is_a_validation_error() {
        let err = required_field(Some("   "), "audio_url").unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[test]
    fn present_source_is_trimmed() {
        assert_eq!(
            required_field(Some(" a.wav "), "audio_url").unwrap(),
            "a.wav"
        );
    }
}
