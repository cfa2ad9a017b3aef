//! Deterministic fake embedder: hashes normalized token shingles into a
//! fixed-dimension vector via a SHA-256-seeded PRNG, then L2-normalizes.
//! Production deployments swap this trait impl for a real model client.

use nexus_core::model::EMBEDDING_DIMENSION;
use sha2::{Digest, Sha256};

pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Vec<f32>;
}

#[derive(Default)]
pub struct DeterministicEmbedder;

impl DeterministicEmbedder {
    pub fn new() -> Self {
        Self
    }

    fn shingles(text: &str) -> Vec<String> {
        let normalized: String = text.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ");
        let tokens: Vec<&str> = normalized.split(' ').filter(|t| !t.is_empty()).collect();
        if tokens.is_empty() {
            return vec![String::new()];
        }
        tokens.windows(2.min(tokens.len())).map(|w| w.join(" ")).collect()
    }

    fn seed_stream(seed: &[u8], len: usize) -> Vec<f32> {
        let mut out = Vec::with_capacity(len);
        let mut counter: u64 = 0;
        while out.len() < len {
            let mut hasher = Sha256::new();
            hasher.update(seed);
            hasher.update(counter.to_be_bytes());
            let digest = hasher.finalize();
            for chunk in digest.chunks(4) {
                if out.len() >= len {
                    break;
                }
                let bytes = [chunk[0], chunk[1], chunk[2], chunk[3]];
                let value = u32::from_be_bytes(bytes) as f32 / u32::MAX as f32;
                out.push(value * 2.0 - 1.0);
            }
            counter += 1;
        }
        out
    }
}

impl Embedder for DeterministicEmbedder {
    fn embed(&self, text: &str) -> Vec<f32> {
        let shingles = Self::shingles(text);
        let mut acc = vec![0.0f32; EMBEDDING_DIMENSION];
        for shingle in &shingles {
            let mut hasher = Sha256::new();
            hasher.update(shingle.as_bytes());
            let seed = hasher.finalize();
            let stream = Self::seed_stream(&seed, EMBEDDING_DIMENSION);
            for (a, s) in acc.iter_mut().zip(stream) {
                *a += s;
            }
        }
        let norm: f32 = acc.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in acc.iter_mut() {
                *v /= norm;
            }
        }
        acc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_has_expected_dimension() {
        let embedder = DeterministicEmbedder::new();
        let v = embedder.embed("hello world");
        assert_eq!(v.len(), EMBEDDING_DIMENSION);
    }

    #[test]
    fn same_text_embeds_identically() {
        let embedder = DeterministicEmbedder::new();
        assert_eq!(embedder.embed("retrieval augmented generation"), embedder.embed("retrieval augmented generation"));
    }

    #[test]
    fn different_text_embeds_differently() {
        let embedder = DeterministicEmbedder::new();
        assert_ne!(embedder.embed("cats and dogs"), embedder.embed("rockets and spaceships"));
    }

    #[test]
    fn embedding_is_l2_normalized() {
        let embedder = DeterministicEmbedder::new();
        let v = embedder.embed("some normalized text");
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }
}
