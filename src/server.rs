use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::{
    config::AppConfig,
    error::ServiceError,
    model::{
        HealthResponse, ModelRegistry, ProcessAudioRequest, ProcessImageRequest, ProcessResponse,
    },
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub registry: Arc<ModelRegistry>,
}

pub fn build_router(config: Arc<AppConfig>, registry: Arc<ModelRegistry>) -> Router {
    let state = AppState { config, registry };

    Router::new()
        .route("/health", get(health))
        .route("/process_image", post(process_image))
        .route("/process_audio", post(process_audio))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    if state.registry.is_ready() {
        (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok".into(),
            }),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "unavailable".into(),
            }),
        )
    }
}

async fn process_image(
    State(state): State<AppState>,
    Json(request): Json<ProcessImageRequest>,
) -> Result<Json<ProcessResponse>, ServiceError> {
    let response = tokio::time::timeout(
        state.config.request_timeout,
        state.registry.describe_image(request, &state.config),
    )
    .await
    .map_err(|_| ServiceError::Inference("request timed out".into()))??;
    Ok(Json(response))
}

async fn process_audio(
    State(state): State<AppState>,
    Json(request): Json<ProcessAudioRequest>,
) -> Result<Json<ProcessResponse>, ServiceError> {
    let response = tokio::time::timeout(
        state.config.request_timeout,
        state.registry.transcribe_audio(request, &state.config),
    )
    .await
    .map_err(|_| ServiceError::Inference("request timed out".into()))??;
    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::path::PathBuf;
    use std::time::Duration;

    use super::*;
    use crate::fetch;

    fn test_config() -> AppConfig {
        AppConfig {
            listen_addr: "127.0.0.1:0".parse().unwrap(),
            model_path: PathBuf::from("models/phi4_multimodal.ts"),
            tokenizer_path: PathBuf::from("models/tokenizer.json"),
            max_new_tokens: 1000,
            eot_token_id: 200_020,
            image_size: 448,
            audio_sample_rate: 16_000,
            fetch_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
            #[cfg(feature = "tch-backend")]
            device: tch::Device::Cpu,
        }
    }

    /// Serve the router without a loaded model on an ephemeral port.
    async fn spawn_server() -> SocketAddr {
        let config = Arc::new(test_config());
        let registry = Arc::new(ModelRegistry::unloaded(&config).unwrap());
        let router = build_router(config, registry);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    fn wav_fixture() -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = std::io::Cursor::new(Vec::new());
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for i in 0..1_600i32 {
            writer.write_sample((i % 128) as i16 * 64).unwrap();
        }
        writer.finalize().unwrap();
        cursor.into_inner()
    }

    #[tokio::test]
    async fn health_reports_unavailable_without_a_model() {
        let addr = spawn_server().await;
        let response = reqwest::get(format!("http://{addr}/health")).await.unwrap();
        assert_eq!(response.status(), 503);

        let body: HealthResponse = response.json().await.unwrap();
        assert_eq!(body.status, "unavailable");
    }

    #[tokio::test]
    async fn process_image_requires_a_source() {
        let addr = spawn_server().await;
        let client = reqwest::Client::new();

        let response = client
            .post(format!("http://{addr}/process_image"))
            .json(&serde_json::json!({}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400);

        let body: serde_json::Value = response.json().await.unwrap();
        assert!(
            body["error"]
                .as_str()
                .unwrap()
                .contains("image_url is required")
        );
    }

    #[tokio::test]
    async fn process_audio_rejects_malformed_payloads() {
        let addr = spawn_server().await;
        let client = reqwest::Client::new();

        let request = ProcessAudioRequest {
            audio_url: Some(fetch::to_data_url(b"not audio at all", "audio/wav")),
            prompt: None,
        };
        let response = client
            .post(format!("http://{addr}/process_audio"))
            .json(&request)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 422);

        let body: serde_json::Value = response.json().await.unwrap();
        assert!(body["error"].as_str().unwrap().contains("decode"));
    }

    #[tokio::test]
    async fn process_audio_without_a_model_is_unavailable() {
        let addr = spawn_server().await;
        let client = reqwest::Client::new();

        let request = ProcessAudioRequest {
            audio_url: Some(fetch::to_data_url(&wav_fixture(), "audio/wav")),
            prompt: None,
        };
        let response = client
            .post(format!("http://{addr}/process_audio"))
            .json(&request)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 503);
    }

    #[tokio::test]
    async fn unreachable_image_url_maps_to_bad_gateway() {
        let addr = spawn_server().await;
        let client = reqwest::Client::new();

        let closed = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let closed_addr = closed.local_addr().unwrap();
        drop(closed);

        let request = ProcessImageRequest {
            image_url: Some(format!("http://{closed_addr}/cat.jpg")),
            prompt: None,
        };
        let response = client
            .post(format!("http://{addr}/process_image"))
            .json(&request)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 502);

        let body: serde_json::Value = response.json().await.unwrap();
        assert!(body["error"].as_str().unwrap().contains("fetch"));
    }

    #[tokio::test]
    async fn non_success_remote_status_maps_to_bad_gateway() {
        let addr = spawn_server().await;
        let client = reqwest::Client::new();

        // The server itself answers 404 for unknown paths, so it can act
        // as the non-2xx origin.
        let request = ProcessImageRequest {
            image_url: Some(format!("http://{addr}/no-such-artifact.jpg")),
            prompt: None,
        };
        let response = client
            .post(format!("http://{addr}/process_image"))
            .json(&request)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 502);

        let body: serde_json::Value = response.json().await.unwrap();
        assert!(body["error"].as_str().unwrap().contains("HTTP 404"));
    }

    #[tokio::test]
    async fn missing_local_audio_file_maps_to_bad_gateway() {
        let addr = spawn_server().await;
        let client = reqwest::Client::new();

        let request = ProcessAudioRequest {
            audio_url: Some("/no/such/clip.wav".into()),
            prompt: None,
        };
        let response = client
            .post(format!("http://{addr}/process_audio"))
            .json(&request)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 502);
    }
}
