//! Sentence-embedding clients used to build the index and embed queries.

use std::time::Duration;

use anyhow::Result;
use reqwest::StatusCode;

pub mod openai;
pub mod qdrant;

pub use openai::OpenAiEmbedder;
pub use qdrant::QdrantEmbedder;

/// Blocking text embedder. Implementations must return one vector per input, in input order.
pub trait Embedder: Send + Sync {
    /// Model identifier, recorded next to built indexes.
    fn model(&self) -> &str;

    /// Largest batch accepted by [`Embedder::embed_batch`].
    fn batch_size(&self) -> usize;

    /// Embeds up to [`Embedder::batch_size`] inputs.
    fn embed_batch(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>>;
}

/// Embeds any number of inputs by splitting them into batches.
pub fn embed_all(embedder: &dyn Embedder, inputs: &[&str]) -> Result<Vec<Vec<f32>>> {
    let mut out = Vec::with_capacity(inputs.len());
    for chunk in inputs.chunks(embedder.batch_size().max(1)) {
        let embeddings = embedder.embed_batch(chunk)?;
        anyhow::ensure!(
            embeddings.len() == chunk.len(),
            "embedding batch returned {} vectors for {} inputs",
            embeddings.len(),
            chunk.len()
        );
        out.extend(embeddings);
    }
    Ok(out)
}

/// Scales `vector` to unit length in place. Zero vectors are left untouched.
pub fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        vector.iter_mut().for_each(|v| *v /= norm);
    }
}

pub(crate) fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

pub(crate) fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_body() || err.is_request()
}

pub(crate) fn retry_backoff(attempt: usize) -> Duration {
    let capped = attempt.min(5) as u32;
    Duration::from_millis(500 * (1 << capped))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct LengthEmbedder;

    impl Embedder for LengthEmbedder {
        fn model(&self) -> &str {
            "length"
        }

        fn batch_size(&self) -> usize {
            2
        }

        fn embed_batch(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>> {
            anyhow::ensure!(inputs.len() <= 2, "batch too large");
            Ok(inputs.iter().map(|s| vec![s.len() as f32]).collect())
        }
    }

    #[test]
    fn embed_all_splits_batches_and_keeps_order() {
        let vectors = embed_all(&LengthEmbedder, &["a", "bb", "ccc", "dddd", "e"]).unwrap();
        assert_eq!(
            vectors,
            vec![vec![1.0], vec![2.0], vec![3.0], vec![4.0], vec![1.0]]
        );
    }

    #[test]
    fn normalize_scales_to_unit_length() {
        let mut v = vec![3.0, 4.0];
        normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let mut zero = vec![0.0, 0.0];
        normalize(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0]);
    }

    #[test]
    fn backoff_is_capped() {
        assert_eq!(retry_backoff(1), Duration::from_millis(1000));
        assert_eq!(retry_backoff(9), retry_backoff(5));
        assert!(should_retry(StatusCode::TOO_MANY_REQUESTS));
        assert!(should_retry(StatusCode::BAD_GATEWAY));
        assert!(!should_retry(StatusCode::UNAUTHORIZED));
    }
}
