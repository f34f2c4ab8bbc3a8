use std::{
    env,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
    time::Duration,
};

#[cfg(feature = "tch-backend")]
use tch::Device;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    pub model_path: PathBuf,
    pub tokenizer_path: PathBuf,
    pub max_new_tokens: usize,
    pub eot_token_id: i64,
    pub image_size: i64,
    pub audio_sample_rate: u32,
    pub fetch_timeout: Duration,
    pub request_timeout: Duration,
    #[cfg(feature = "tch-backend")]
    pub device: Device,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let listen_addr = env::var("SERVER_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:5000".into())
            .parse()
            .unwrap_or_else(|_| SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 5000));

        let model_path = PathBuf::from(
            env::var("MODEL_PATH").unwrap_or_else(|_| "models/phi4_multimodal.ts".to_string()),
        );
        let tokenizer_path = PathBuf::from(
            env::var("TOKENIZER_PATH").unwrap_or_else(|_| "models/tokenizer.json".to_string()),
        );

        let max_new_tokens = env::var("MAX_NEW_TOKENS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1000);
        // <|end|> in the Phi-4 vocabulary closes an assistant turn.
        let eot_token_id = env::var("EOT_TOKEN_ID")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(200_020);

        let image_size = env::var("IMAGE_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(448);
        let audio_sample_rate = env::var("AUDIO_SAMPLE_RATE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(16_000);

        let fetch_timeout = env::var("FETCH_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_secs(60));
        let request_timeout = env::var("REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_secs(300));

        #[cfg(feature = "tch-backend")]
        let device = {
            let raw = env::var("DEVICE").unwrap_or_else(|_| "cpu".into());
            parse_device(&raw)
        };

        Ok(Self {
            listen_addr,
            model_path,
            tokenizer_path,
            max_new_tokens,
            eot_token_id,
            image_size,
            audio_sample_rate,
            fetch_timeout,
            request_timeout,
            #[cfg(feature = "tch-backend")]
            device,
        })
    }
}

#[cfg(feature = "tch-backend")]
fn parse_device(raw: &str) -> Device {
    let lower = raw.to_lowercase();
    if lower == "cpu" {
        Device::Cpu
    } else if lower.starts_with("cuda") {
        let idx = lower
            .split(':')
            .nth(1)
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(0);
        if tch::Cuda::is_available() {
            Device::Cuda(idx)
        } else {
            Device::Cpu
        }
    } else {
        Device::Cpu
    }
}
