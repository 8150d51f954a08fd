pub mod gemini;

use async_trait::async_trait;
use friday_core::Result;

pub use gemini::GeminiVision;

/// A multimodal model endpoint that can answer a text prompt about an image.
#[async_trait]
pub trait VisionProvider: Send + Sync {
    /// Upload `image` (raw bytes, `mime` e.g. "image/jpeg") with `prompt`
    /// and return the model's text answer.
    async fn analyze_image(&self, prompt: &str, image: &[u8], mime: &str) -> Result<String>;
}
