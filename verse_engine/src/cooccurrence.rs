// Raw sliding-window co-occurrence vectors.
//
// Every vocabulary token gets a fixed-length vector. For each occurrence of
// the token, each neighbour within `window` positions on the same line adds
// `1/distance` to the dimension its text hashes to (FNV-1a modulo `dims`).
// Hashing keeps the vector length independent of vocabulary size.
//
// Counts are unbounded and grow with corpus size; the kernel stage works on
// L2-normalized copies (`l2_normalized`) so kernel values stay bounded.
//
// Like `Vocabulary`, an embedding is a snapshot: `merged` and `restricted_to`
// return new values for the incremental training path.

use std::collections::BTreeMap;

use crate::vocab::{Vocabulary, tokenize};

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// FNV-1a hash of a token, reduced to a dimension index.
pub fn bucket(token: &str, dims: usize) -> usize {
    let mut h = FNV_OFFSET;
    for &b in token.as_bytes() {
        h ^= u64::from(b);
        h = h.wrapping_mul(FNV_PRIME);
    }
    (h % dims.max(1) as u64) as usize
}

/// Copy of `v` scaled to unit length. Zero vectors come back unchanged.
pub fn l2_normalized(v: &[f64]) -> Vec<f64> {
    let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm <= f64::EPSILON {
        return v.to_vec();
    }
    v.iter().map(|x| x / norm).collect()
}

/// Token -> raw co-occurrence vector.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CoOccurrenceEmbedding {
    dims: usize,
    vectors: BTreeMap<String, Vec<f64>>,
}

impl CoOccurrenceEmbedding {
    /// Accumulate vectors for every token of `vocab` over `lines`.
    pub fn build(lines: &[String], vocab: &Vocabulary, dims: usize, window: usize) -> Self {
        let mut vectors: BTreeMap<String, Vec<f64>> = vocab
            .tokens()
            .map(|t| (t.to_string(), vec![0.0; dims]))
            .collect();

        for line in lines {
            let tokens = tokenize(line);
            for (i, token) in tokens.iter().enumerate() {
                let Some(vector) = vectors.get_mut(token) else {
                    continue;
                };
                for d in 1..=window {
                    let weight = 1.0 / d as f64;
                    if let Some(left) = i.checked_sub(d) {
                        vector[bucket(&tokens[left], dims)] += weight;
                    }
                    if let Some(right) = tokens.get(i + d) {
                        vector[bucket(right, dims)] += weight;
                    }
                }
            }
        }

        Self { dims, vectors }
    }

    /// Wrap vectors restored from a checkpoint. Vectors of the wrong length
    /// are zero-padded or truncated to `dims`.
    pub fn from_vectors(dims: usize, vectors: BTreeMap<String, Vec<f64>>) -> Self {
        let vectors = vectors
            .into_iter()
            .map(|(t, mut v)| {
                v.resize(dims, 0.0);
                (t, v)
            })
            .collect();
        Self { dims, vectors }
    }

    /// Element-wise sum with `other`. Tokens present in only one side keep
    /// their vector.
    pub fn merged(&self, other: &CoOccurrenceEmbedding) -> CoOccurrenceEmbedding {
        let mut vectors = self.vectors.clone();
        for (token, v) in &other.vectors {
            let entry = vectors
                .entry(token.clone())
                .or_insert_with(|| vec![0.0; self.dims]);
            for (acc, x) in entry.iter_mut().zip(v) {
                *acc += x;
            }
        }
        CoOccurrenceEmbedding {
            dims: self.dims,
            vectors,
        }
    }

    /// Exactly the tokens of `vocab`; missing tokens get zero vectors.
    pub fn restricted_to(&self, vocab: &Vocabulary) -> CoOccurrenceEmbedding {
        let vectors = vocab
            .tokens()
            .map(|t| {
                let v = self
                    .vectors
                    .get(t)
                    .cloned()
                    .unwrap_or_else(|| vec![0.0; self.dims]);
                (t.to_string(), v)
            })
            .collect();
        CoOccurrenceEmbedding {
            dims: self.dims,
            vectors,
        }
    }

    pub fn get(&self, token: &str) -> Option<&[f64]> {
        self.vectors.get(token).map(Vec::as_slice)
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.vectors.iter().map(|(t, v)| (t.as_str(), v.as_slice()))
    }
}
