//! Embedding service abstraction.
//!
//! The engine never invokes a model itself; the host supplies an
//! [`Embedder`] and the background worker calls it off the write path.
//! Embedding generation is asynchronous by contract: a write returns
//! before its vectors exist, and vector search may lag by the time to
//! process one embedding task.

use async_trait::async_trait;

use crate::error::{RemError, Result, ValidationError};
use crate::types::Embedding;

/// Embedding provider boundary.
///
/// Implementations must be thread-safe; the worker holds one instance for
/// the lifetime of the engine.
///
/// # Implementing a Provider
///
/// ```rust,ignore
/// use remdb::embedding::Embedder;
///
/// struct MyService { client: ApiClient, dimension: usize }
///
/// #[async_trait::async_trait]
/// impl Embedder for MyService {
///     async fn embed(&self, text: &str) -> remdb::Result<Vec<f32>> {
///         Ok(self.client.embed(text).await?)
///     }
///     fn dimension(&self) -> usize { self.dimension }
/// }
/// ```
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generates an embedding for a single text.
    ///
    /// # Errors
    ///
    /// Returns `RemError::Embedding` if generation fails. The worker
    /// retries with backoff before dropping the task.
    async fn embed(&self, text: &str) -> Result<Embedding>;

    /// Generates embeddings for multiple texts.
    ///
    /// The default implementation embeds sequentially; providers with a
    /// batch endpoint should override it.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    /// Dimension of vectors this provider produces.
    fn dimension(&self) -> usize;

    /// Validates that a caller-supplied embedding has the right dimension.
    fn validate_embedding(&self, embedding: &Embedding) -> Result<()> {
        if embedding.len() != self.dimension() {
            return Err(
                ValidationError::dimension_mismatch(self.dimension(), embedding.len()).into(),
            );
        }
        Ok(())
    }
}

/// Validation-only provider for externally computed embeddings.
///
/// Use this when vectors are produced outside the engine (an API service,
/// a batch pipeline). Any attempt to generate through it fails, which
/// means entities of embeddable types simply stay without vectors until
/// the host writes them explicitly.
#[derive(Clone, Debug)]
pub struct ExternalEmbedder {
    dimension: usize,
}

impl ExternalEmbedder {
    /// Creates a validation-only provider with the given dimension.
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl Embedder for ExternalEmbedder {
    async fn embed(&self, _text: &str) -> Result<Embedding> {
        Err(RemError::embedding(
            "external provider cannot generate embeddings; supply vectors explicitly",
        ))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
