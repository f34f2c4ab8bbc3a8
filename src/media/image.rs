//! Image decoding for the image endpoint.

use tch::{Kind, Tensor};

use crate::error::ServiceError;

/// Decode image bytes into a float CHW tensor in `[0, 1]`, resized to the
/// model's square input.
pub fn decode(bytes: &[u8], size: i64) -> Result<Tensor, ServiceError> {
    if bytes.is_empty() {
        return Err(ServiceError::Decode("image payload is empty".into()));
    }

    let image = tch::vision::image::load_from_memory(bytes)
        .map_err(|e| ServiceError::Decode(format!("not a valid image payload: {e}")))?;
    let resized = tch::vision::image::resize(&image, size, size)
        .map_err(|e| ServiceError::Decode(format!("failed to resize image: {e}")))?;

    Ok(resized.to_kind(Kind::Float) / 255.)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_bytes() {
        let err = decode(b"not an image", 448).unwrap_err();
        assert!(matches!(err, ServiceError::Decode(_)));
    }

    #[test]
    fn rejects_empty_payload() {
        let err = decode(b"", 448).unwrap_err();
        assert!(matches!(err, ServiceError::Decode(_)));
    }

    #[test]
    fn decodes_and_resizes_a_png() {
        // Round-trip a synthetic image through the PNG encoder.
        let source = Tensor::zeros([3, 8, 8], (Kind::Uint8, tch::Device::Cpu));
        let path = std::env::temp_dir().join(format!("mm-image-{}.png", std::process::id()));
        tch::vision::image::save(&source, &path).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        let tensor = decode(&bytes, 448).unwrap();
        assert_eq!(tensor.size(), vec![3, 448, 448]);
        assert_eq!(tensor.kind(), Kind::Float);
    }
}
