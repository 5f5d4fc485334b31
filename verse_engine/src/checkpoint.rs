// Flat, versioned snapshot of a trained engine.
//
// The record carries everything generation needs that is not derivable from
// the config: vocabulary counts, raw embeddings, the emotional space, the
// kernel model, the value model, PRNG state, corpus fingerprint and the
// trained flag. Phonetic analyses and the grammar are rebuilt from the
// vocabulary on load.
//
// Readers are lenient about numbers and strict about shape. Every numeric
// field accepts a JSON number, a numeric string or null, and anything that
// is not a finite number becomes 0. Shape problems (lengths that disagree,
// token sets that differ) are rejected by `VerseEngine::load_checkpoint`
// before any engine state changes. A record without a `version`, or with one
// other than `CHECKPOINT_VERSION`, is refused outright.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// The only record layout this build reads and writes.
pub const CHECKPOINT_VERSION: u32 = 1;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VocabEntry {
    pub token: String,
    #[serde(default, deserialize_with = "lenient::u64_value")]
    pub count: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TokenVector {
    pub token: String,
    #[serde(default, deserialize_with = "lenient::f64_vec")]
    pub vector: Vec<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct KernelRecord {
    #[serde(default, deserialize_with = "lenient::f64_matrix")]
    pub x_fit: Vec<Vec<f64>>,
    #[serde(default, deserialize_with = "lenient::f64_matrix")]
    pub eigenvectors: Vec<Vec<f64>>,
    #[serde(default, deserialize_with = "lenient::f64_vec")]
    pub eigenvalues: Vec<f64>,
    #[serde(default, deserialize_with = "lenient::u32_value")]
    pub degree: u32,
    #[serde(default, deserialize_with = "lenient::usize_value")]
    pub n_components: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ValueRecord {
    #[serde(default, deserialize_with = "lenient::f64_vec")]
    pub weights: Vec<f64>,
    #[serde(default, deserialize_with = "lenient::f64_vec")]
    pub eligibility: Vec<f64>,
    #[serde(default, deserialize_with = "lenient::f64_value")]
    pub alpha: f64,
    #[serde(default, deserialize_with = "lenient::f64_value")]
    pub gamma: f64,
    #[serde(default, deserialize_with = "lenient::f64_value")]
    pub lambda: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(default, deserialize_with = "lenient::version")]
    pub version: Option<u32>,
    #[serde(default)]
    pub vocabulary: Vec<VocabEntry>,
    #[serde(default, deserialize_with = "lenient::usize_value")]
    pub embedding_dims: usize,
    #[serde(default)]
    pub embeddings: Vec<TokenVector>,
    #[serde(default)]
    pub emotional_space: Vec<TokenVector>,
    #[serde(default)]
    pub kernel: KernelRecord,
    #[serde(default)]
    pub value: ValueRecord,
    #[serde(default, deserialize_with = "lenient::u64_array4")]
    pub rng_state: [u64; 4],
    #[serde(default, deserialize_with = "lenient::optional_u64")]
    pub fingerprint: Option<u64>,
    #[serde(default)]
    pub trained: bool,
}

impl Checkpoint {
    /// Refuse records from an unknown (or unstated) layout.
    pub fn check_version(&self) -> Result<()> {
        match self.version {
            Some(CHECKPOINT_VERSION) => Ok(()),
            other => Err(EngineError::UnsupportedCheckpoint(other)),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a record. The version is checked before the rest of the
    /// record is interpreted.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: serde_json::Value = serde_json::from_str(json)?;
        let version = raw.get("version").and_then(lenient::to_u64);
        match version {
            Some(v) if v == u64::from(CHECKPOINT_VERSION) => {}
            other => {
                return Err(EngineError::UnsupportedCheckpoint(
                    other.map(|v| u32::try_from(v).unwrap_or(u32::MAX)),
                ));
            }
        }
        let checkpoint: Checkpoint = serde_json::from_value(raw)?;
        checkpoint.check_version()?;
        Ok(checkpoint)
    }
}

/// Number coercion for checkpoint fields.
mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub(super) fn to_f64(value: &Value) -> f64 {
        let x = match value {
            Value::Number(n) => n.as_f64().unwrap_or(0.0),
            Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
            _ => 0.0,
        };
        if x.is_finite() { x } else { 0.0 }
    }

    pub(super) fn to_u64(value: &Value) -> Option<u64> {
        match value {
            Value::Number(n) => n.as_u64().or_else(|| {
                n.as_f64()
                    .filter(|x| x.is_finite() && *x >= 0.0)
                    .map(|x| x as u64)
            }),
            Value::String(s) => {
                let s = s.trim();
                s.parse::<u64>().ok().or_else(|| {
                    s.parse::<f64>()
                        .ok()
                        .filter(|x| x.is_finite() && *x >= 0.0)
                        .map(|x| x as u64)
                })
            }
            _ => None,
        }
    }

    fn matrix_row(value: &Value) -> Vec<f64> {
        match value {
            Value::Array(items) => items.iter().map(to_f64).collect(),
            _ => Vec::new(),
        }
    }

    pub(super) fn f64_value<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        Ok(to_f64(&Value::deserialize(d)?))
    }

    pub(super) fn u64_value<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
        Ok(to_u64(&Value::deserialize(d)?).unwrap_or(0))
    }

    pub(super) fn u32_value<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
        let v = to_u64(&Value::deserialize(d)?).unwrap_or(0);
        Ok(u32::try_from(v).unwrap_or(u32::MAX))
    }

    pub(super) fn usize_value<'de, D: Deserializer<'de>>(d: D) -> Result<usize, D::Error> {
        let v = to_u64(&Value::deserialize(d)?).unwrap_or(0);
        Ok(usize::try_from(v).unwrap_or(usize::MAX))
    }

    pub(super) fn optional_u64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
        Ok(to_u64(&Value::deserialize(d)?))
    }

    pub(super) fn version<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u32>, D::Error> {
        Ok(to_u64(&Value::deserialize(d)?).map(|v| u32::try_from(v).unwrap_or(u32::MAX)))
    }

    pub(super) fn f64_vec<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<f64>, D::Error> {
        Ok(matrix_row(&Value::deserialize(d)?))
    }

    pub(super) fn f64_matrix<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Vec<f64>>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Array(rows) => rows.iter().map(matrix_row).collect(),
            _ => Vec::new(),
        })
    }

    pub(super) fn u64_array4<'de, D: Deserializer<'de>>(d: D) -> Result<[u64; 4], D::Error> {
        let mut out = [0u64; 4];
        if let Value::Array(items) = Value::deserialize(d)? {
            for (slot, item) in out.iter_mut().zip(&items) {
                *slot = to_u64(item).unwrap_or(0);
            }
        }
        Ok(out)
    }
}
