//! WAV decoding and resampling for the audio endpoint.

use std::io::Cursor;

use crate::error::ServiceError;

/// Parse WAV bytes into normalized mono f32 samples plus the source rate.
pub fn decode_wav(bytes: &[u8]) -> Result<(Vec<f32>, u32), ServiceError> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes))
        .map_err(|e| ServiceError::Decode(format!("not a valid WAV payload: {e}")))?;

    let spec = reader.spec();
    let sample_rate = spec.sample_rate;
    let channels = spec.channels.max(1) as usize;

    let mut samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => {
            let bits = spec.bits_per_sample.max(1) as u32;
            let full_scale = if bits > 1 {
                ((1i64 << (bits - 1)) - 1) as f32
            } else {
                1.0
            };
            reader
                .samples::<i32>()
                .filter_map(Result::ok)
                .map(|s| (s as f32 / full_scale).clamp(-1.0, 1.0))
                .collect()
        }
        hound::SampleFormat::Float => reader.samples::<f32>().filter_map(Result::ok).collect(),
    };

    if channels > 1 {
        let mut mono = Vec::with_capacity(samples.len() / channels + 1);
        for frame in samples.chunks(channels) {
            let sum: f32 = frame.iter().copied().sum();
            mono.push(sum / frame.len() as f32);
        }
        samples = mono;
    }

    for sample in &mut samples {
        if !sample.is_finite() {
            *sample = 0.0;
        } else {
            *sample = sample.clamp(-1.0, 1.0);
        }
    }

    Ok((samples, sample_rate))
}

/// Linear resampling; returns the input unchanged when the rates match.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if samples.is_empty() || from_rate == 0 || to_rate == 0 || from_rate == to_rate {
        return samples.to_vec();
    }

    let step = from_rate as f64 / to_rate as f64;
    let out_len = ((samples.len() as f64 / step).round() as usize).max(1);
    let last = samples.len() - 1;

    let mut out = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let pos = i as f64 * step;
        let idx = (pos.floor() as usize).min(last);
        let frac = (pos - idx as f64) as f32;
        let a = samples[idx];
        let b = samples[(idx + 1).min(last)];
        out.push(a + (b - a) * frac);
    }
    out
}

/// Full audio preprocessing: WAV bytes to mono samples at the model rate.
pub fn prepare(bytes: &[u8], target_rate: u32) -> Result<Vec<f32>, ServiceError> {
    let (samples, sample_rate) = decode_wav(bytes)?;
    if samples.is_empty() {
        return Err(ServiceError::Decode("audio contains no samples".into()));
    }
    tracing::debug!(
        samples = samples.len(),
        sample_rate,
        target_rate,
        "decoded audio artifact"
    );
    Ok(resample(&samples, sample_rate, target_rate))
}
