//! Embedding providers that turn chunk and query text into vectors.

pub mod openai;

use async_trait::async_trait;

use crate::error::EmbedError;

/// Maps text to fixed-length vectors. Treated as an opaque scoring function.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embeds a batch, returning one vector per input in input order.
    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;

    /// Embeds a single input.
    async fn embed(&self, input: &str) -> Result<Vec<f32>, EmbedError> {
        let mut vectors = self.embed_batch(&[input.to_string()]).await?;
        match vectors.len() {
            1 => Ok(vectors.remove(0)),
            returned => Err(EmbedError::CountMismatch {
                expected: 1,
                returned,
            }),
        }
    }
}
