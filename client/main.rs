//! Command-line client for the Phi-4 multimodal inference service.
//!
//! Local files are inlined into the request as base64 `data:` URLs; remote
//! URLs are passed through so the service's own fetch path downloads them.

use std::path::Path;
#[cfg(feature = "record")]
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use phi4_multimodal_service::{
    HealthResponse, ProcessAudioRequest, ProcessImageRequest, ProcessResponse, fetch,
};

#[derive(Parser)]
#[command(
    name = "mm-client",
    about = "Client for the Phi-4 multimodal inference service",
    version
)]
struct Cli {
    /// Base URL of the inference service
    #[arg(
        long,
        global = true,
        value_name = "URL",
        default_value = "http://localhost:5000",
        env = "MM_SERVER"
    )]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Describe an image
    Image {
        /// Local path or URL of the image
        source: String,

        /// Override the default instruction
        #[arg(short, long)]
        prompt: Option<String>,
    },

    /// Transcribe and translate an audio clip
    Audio {
        /// Local path or URL of a WAV file
        source: String,

        /// Override the default instruction
        #[arg(short, long)]
        prompt: Option<String>,
    },

    /// Record from the default microphone, then transcribe
    #[cfg(feature = "record")]
    Record {
        /// Recording length in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,

        /// Keep the recorded WAV at this path
        #[arg(long, value_name = "PATH")]
        save: Option<PathBuf>,

        /// Override the default instruction
        #[arg(short, long)]
        prompt: Option<String>,
    },

    /// Check service health
    Health,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let base = cli.server.trim_end_matches('/').to_string();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Image { source, prompt } => {
            let image_url = resolve_source(&source, image_mime(Path::new(&source)))?;
            let request = ProcessImageRequest {
                image_url: Some(image_url),
                prompt,
            };
            let result = post_process(&client, format!("{base}/process_image"), &request).await?;
            render_result(&result);
        }

        Commands::Audio { source, prompt } => {
            let audio_url = resolve_source(&source, "audio/wav")?;
            let request = ProcessAudioRequest {
                audio_url: Some(audio_url),
                prompt,
            };
            let result = post_process(&client, format!("{base}/process_audio"), &request).await?;
            render_result(&result);
        }

        #[cfg(feature = "record")]
        Commands::Record {
            duration,
            save,
            prompt,
        } => {
            eprintln!("recording {duration}s from the default input device...");
            let length = std::time::Duration::from_secs(duration);
            let wav = tokio::task::spawn_blocking(move || record_wav(length)).await??;

            if let Some(path) = &save {
                std::fs::write(path, &wav)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                eprintln!("saved recording to {}", path.display());
            }

            let request = ProcessAudioRequest {
                audio_url: Some(fetch::to_data_url(&wav, "audio/wav")),
                prompt,
            };
            let result = post_process(&client, format!("{base}/process_audio"), &request).await?;
            render_result(&result);
        }

        Commands::Health => {
            let response = client
                .get(format!("{base}/health"))
                .send()
                .await
                .with_context(|| format!("could not connect to {base}"))?;
            let body: HealthResponse = response.json().await.context("invalid response body")?;
            println!("{}", body.status);
        }
    }

    Ok(())
}

/// Existing local files are read and inlined as `data:` URLs; anything else
/// (URLs, server-side paths) passes through untouched.
fn resolve_source(source: &str, mime: &str) -> anyhow::Result<String> {
    let path = Path::new(source);
    if path.is_file() {
        let bytes =
            std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        Ok(fetch::to_data_url(&bytes, mime))
    } else {
        Ok(source.to_string())
    }
}

fn image_mime(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("png") => "image/png",
        _ => "image/jpeg",
    }
}

async fn post_process<B: serde::Serialize>(
    client: &reqwest::Client,
    url: String,
    body: &B,
) -> anyhow::Result<String> {
    let response = client
        .post(&url)
        .json(body)
        .send()
        .await
        .with_context(|| format!("request to {url} failed"))?;

    let status = response.status();
    if status.is_success() {
        let body: ProcessResponse = response.json().await.context("invalid response body")?;
        Ok(body.result)
    } else {
        let message = response
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
            .unwrap_or_else(|| format!("HTTP {status}"));
        anyhow::bail!(message)
    }
}

/// The default audio instruction asks the model for transcript and
/// translation separated by `<sep>`; render them under their own headings.
fn split_sections(result: &str) -> Option<(String, String)> {
    result
        .split_once("<sep>")
        .map(|(transcript, translation)| {
            (transcript.trim().to_string(), translation.trim().to_string())
        })
}

fn render_result(result: &str) {
    match split_sections(result) {
        Some((transcript, translation)) => {
            println!("Original Transcript:\n{transcript}\n");
            println!("French Translation:\n{translation}");
        }
        None => println!("{result}"),
    }
}

#[cfg(feature = "record")]
fn record_wav(duration: std::time::Duration) -> anyhow::Result<Vec<u8>> {
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use parking_lot::Mutex;
    use std::sync::Arc;

    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .context("no input device available")?;
    let supported = device
        .default_input_config()
        .context("input device has no default configuration")?;
    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();
    let channels = config.channels as usize;
    let sample_rate = config.sample_rate.0;

    let samples = Arc::new(Mutex::new(Vec::<f32>::new()));
    let err_fn = |err: cpal::StreamError| eprintln!("input stream error: {err}");

    let stream = match sample_format {
        cpal::SampleFormat::F32 => {
            let sink = samples.clone();
            device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    sink.lock().extend_from_slice(data);
                },
                err_fn,
                None,
            )?
        }
        cpal::SampleFormat::I16 => {
            let sink = samples.clone();
            device.build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    let mut sink = sink.lock();
                    sink.extend(data.iter().map(|&s| s as f32 / i16::MAX as f32));
                },
                err_fn,
                None,
            )?
        }
        cpal::SampleFormat::U16 => {
            let sink = samples.clone();
            device.build_input_stream(
                &config,
                move |data: &[u16], _: &cpal::InputCallbackInfo| {
                    let mut sink = sink.lock();
                    sink.extend(
                        data.iter()
                            .map(|&s| (s as f32 / u16::MAX as f32) * 2.0 - 1.0),
                    );
                },
                err_fn,
                None,
            )?
        }
        other => anyhow::bail!("unsupported input sample format: {other:?}"),
    };

    stream.play().context("failed to start the input stream")?;
    std::thread::sleep(duration);
    drop(stream);

    let samples = samples.lock().clone();
    if samples.is_empty() {
        anyhow::bail!("recorded no samples; is the input device muted?");
    }
    encode_wav(&samples, channels, sample_rate)
}

/// Mix interleaved frames down to mono 16-bit PCM WAV bytes.
#[cfg(feature = "record")]
fn encode_wav(samples: &[f32], channels: usize, sample_rate: u32) -> anyhow::Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = std::io::Cursor::new(Vec::new());
    let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
    for frame in samples.chunks(channels.max(1)) {
        let mean: f32 = frame.iter().copied().sum::<f32>() / frame.len() as f32;
        let value = (mean.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer.write_sample(value)?;
    }
    writer.finalize()?;
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_transcript_and_translation() {
        let (transcript, translation) =
            split_sections("hello there <sep> bonjour à tous").unwrap();
        assert_eq!(transcript, "hello there");
        assert_eq!(translation, "bonjour à tous");
    }

    #[test]
    fn plain_results_are_not_split() {
        assert!(split_sections("a plain caption").is_none());
    }

    #[test]
    fn urls_pass_through_untouched() {
        let url = "https://example.com/cat.jpg";
        assert_eq!(resolve_source(url, "image/jpeg").unwrap(), url);
    }

    #[test]
    fn local_files_become_data_urls() {
        let path = std::env::temp_dir().join(format!("mm-client-{}.bin", std::process::id()));
        std::fs::write(&path, b"fake image bytes").unwrap();

        let resolved = resolve_source(path.to_str().unwrap(), "image/jpeg").unwrap();
        assert!(resolved.starts_with("data:image/jpeg;base64,"));
        assert_eq!(fetch::decode_data_url(&resolved).unwrap(), b"fake image bytes");

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn picks_mime_from_extension() {
        assert_eq!(image_mime(Path::new("a.png")), "image/png");
        assert_eq!(image_mime(Path::new("a.jpg")), "image/jpeg");
        assert_eq!(image_mime(Path::new("noext")), "image/jpeg");
    }
}
