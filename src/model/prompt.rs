//! Chat-format prompt assembly for Phi-4 multimodal.
//!
//! Each request renders one user turn carrying a media placeholder and an
//! instruction, then opens the assistant turn for generation:
//! `<|user|><|image_1|>{instruction}<|end|><|assistant|>`.

const USER_TAG: &str = "<|user|>";
const ASSISTANT_TAG: &str = "<|assistant|>";
const END_TAG: &str = "<|end|>";
const IMAGE_SLOT: &str = "<|image_1|>";
const AUDIO_SLOT: &str = "<|audio_1|>";

pub const DEFAULT_IMAGE_PROMPT: &str = "What is shown in this image?";
pub const DEFAULT_AUDIO_PROMPT: &str = "Transcribe the audio to text, and then translate \
     the audio to French. Use <sep> as a separator between the original transcript and \
     the translation.";

pub fn image_prompt(custom: Option<&str>) -> String {
    render(IMAGE_SLOT, custom, DEFAULT_IMAGE_PROMPT)
}

pub fn audio_prompt(custom: Option<&str>) -> String {
    render(AUDIO_SLOT, custom, DEFAULT_AUDIO_PROMPT)
}

fn render(slot: &str, custom: Option<&str>, default: &str) -> String {
    let instruction = match custom {
        Some(text) if !text.trim().is_empty() => text,
        _ => default,
    };
    format!("{USER_TAG}{slot}{instruction}{END_TAG}{ASSISTANT_TAG}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_image_template() {
        assert_eq!(
            image_prompt(Some("Describe the scene.")),
            "<|user|><|image_1|>Describe the scene.<|end|><|assistant|>"
        );
    }

    #[test]
    fn renders_audio_template_with_default() {
        let prompt = audio_prompt(None);
        assert!(prompt.starts_with("<|user|><|audio_1|>Transcribe the audio"));
        assert!(prompt.ends_with("<|end|><|assistant|>"));
        assert!(prompt.contains("<sep>"));
    }

    #[test]
    fn empty_prompt_falls_back_to_default() {
        assert_eq!(image_prompt(Some("")), image_prompt(None));
        assert_eq!(audio_prompt(Some("   ")), audio_prompt(None));
    }
}
