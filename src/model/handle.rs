use std::{io, time::Instant};

use parking_lot::Mutex;
use tch::{Device, IValue, Tensor, no_grad};
use tokenizers::Tokenizer;

use crate::{config::AppConfig, error::ServiceError};

/// Preprocessed media ready to enter the model's forward pass.
pub enum MediaInput {
    /// Float CHW image tensor in `[0, 1]`.
    Image(Tensor),
    /// Mono samples at the model's input rate.
    Audio(Vec<f32>),
}

impl MediaInput {
    fn into_tensor(self, device: Device) -> Tensor {
        match self {
            MediaInput::Image(image) => image.unsqueeze(0).to(device),
            MediaInput::Audio(samples) => Tensor::from_slice(&samples)
                .reshape([1, samples.len() as i64])
                .to(device),
        }
    }
}

/// The process-wide model handle: the exported TorchScript module plus the
/// tokenizer. Loaded once at startup; a generation locks the module for its
/// full duration, so requests run one at a time.
pub struct MultimodalModel {
    tokenizer: Tokenizer,
    device: Device,
    max_new_tokens: usize,
    eot_token_id: i64,
    module: Mutex<tch::CModule>,
}

impl MultimodalModel {
    pub fn load(config: &AppConfig) -> Result<Self, ServiceError> {
        if !config.model_path.exists() {
            return Err(ServiceError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("model artifact missing: {}", config.model_path.display()),
            )));
        }

        let tokenizer = Tokenizer::from_file(config.tokenizer_path.as_path())
            .map_err(|e| ServiceError::Tokenizer(e.to_string()))?;

        let mut module = tch::CModule::load_on_device(&config.model_path, config.device)
            .map_err(|e| ServiceError::Inference(e.to_string()))?;
        module.set_eval();

        Ok(Self {
            tokenizer,
            device: config.device,
            max_new_tokens: config.max_new_tokens,
            eot_token_id: config.eot_token_id,
            module: Mutex::new(module),
        })
    }

    /// Greedy autoregressive generation over the traced forward pass. The
    /// module takes `(input_ids, media)` and returns vocabulary logits for
    /// every position; only the newly generated ids are decoded.
    pub fn generate(&self, prompt: &str, media: MediaInput) -> Result<String, ServiceError> {
        let encoding = self
            .tokenizer
            .encode(prompt, true)
            .map_err(|e| ServiceError::Tokenizer(e.to_string()))?;
        let mut input_ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
        if input_ids.is_empty() {
            input_ids.push(0);
        }
        let prompt_token_len = input_ids.len();
        let media_tensor = media.into_tensor(self.device);

        let start = Instant::now();

        no_grad(|| {
            let module = self.module.lock();

            for _ in 0..self.max_new_tokens {
                let ids = Tensor::from_slice(&input_ids)
                    .reshape([1, input_ids.len() as i64])
                    .to(self.device);

                let output = module
                    .forward_is(&[
                        IValue::Tensor(ids),
                        IValue::Tensor(media_tensor.shallow_clone()),
                    ])
                    .map_err(|e| ServiceError::Inference(e.to_string()))?;

                // The traced module may return a bare tensor or (logits, ...)
                let logits = match output {
                    IValue::Tensor(t) => t,
                    IValue::Tuple(ref tuple) if !tuple.is_empty() => match &tuple[0] {
                        IValue::Tensor(t) => t.shallow_clone(),
                        _ => {
                            return Err(ServiceError::Inference(
                                "expected tensor as first tuple element".into(),
                            ));
                        }
                    },
                    _ => {
                        return Err(ServiceError::Inference(
                            "unexpected model output format".into(),
                        ));
                    }
                };

                let last_logits = logits.select(1, -1).squeeze();
                let next_token_id = last_logits.argmax(0, false).int64_value(&[]);

                input_ids.push(next_token_id);

                if next_token_id == self.eot_token_id {
                    break;
                }
            }

            Ok::<(), ServiceError>(())
        })?;

        let generated_ids: Vec<u32> = input_ids[prompt_token_len..]
            .iter()
            .map(|&id| id as u32)
            .collect();
        let text = self
            .tokenizer
            .decode(&generated_ids, true)
            .map_err(|e| ServiceError::Tokenizer(e.to_string()))?;
        let text = text.trim().to_string();

        tracing::info!(
            tokens = generated_ids.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "generation finished"
        );

        if text.is_empty() {
            return Err(ServiceError::Inference("model produced no output".into()));
        }
        Ok(text)
    }
}
