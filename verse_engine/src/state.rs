// Per-decision poetic state and the small vector helpers around it.
//
// A `PoeticState` summarizes a (possibly partial) line for the value
// estimator: the recent emotional trajectory plus five scalar scores. It is
// ephemeral, built fresh for each candidate during search and once per
// completed line for the batch TD update.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Token -> k-dimensional emotional vector.
pub type EmotionalSpace = BTreeMap<String, Vec<f64>>;

const LINE_REWARD_METER: f64 = 0.5;
const LINE_REWARD_RHYME: f64 = 0.3;
const LINE_REWARD_NOVELTY: f64 = 0.2;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PoeticState {
    /// Most recent emotional vectors, oldest first.
    pub trajectory: Vec<Vec<f64>>,
    /// Spectral meter score of the line, in [0, 1].
    pub meter_score: f64,
    /// 1 when the line rhymes with its target, else 0.
    pub rhyme_consistency: f64,
    /// Fraction of line tokens not seen earlier in the poem, in [0, 1].
    pub novelty: f64,
    /// Line index over poem length, in [0, 1).
    pub line_progress: f64,
    /// Cosine agreement between trajectory and theme, in [0, 1].
    pub theme_coherence: f64,
}

impl PoeticState {
    /// Append `vector`, dropping the oldest entries beyond `cap`.
    pub fn push_vector(&mut self, vector: Vec<f64>, cap: usize) {
        self.trajectory.push(vector);
        if self.trajectory.len() > cap {
            let excess = self.trajectory.len() - cap;
            self.trajectory.drain(..excess);
        }
    }

    /// Element-wise mean of the trajectory; `None` when it is empty.
    pub fn trajectory_mean(&self) -> Option<Vec<f64>> {
        mean(&self.trajectory)
    }

    /// Reward credited for a completed line.
    pub fn line_reward(&self) -> f64 {
        LINE_REWARD_METER * self.meter_score
            + LINE_REWARD_RHYME * self.rhyme_consistency
            + LINE_REWARD_NOVELTY * self.novelty
    }
}

/// Element-wise mean of equal-length vectors. Shorter vectors count as
/// zero-padded to the first vector's length.
pub fn mean(vectors: &[Vec<f64>]) -> Option<Vec<f64>> {
    let first = vectors.first()?;
    let mut acc = vec![0.0; first.len()];
    for v in vectors {
        for (a, x) in acc.iter_mut().zip(v) {
            *a += x;
        }
    }
    let n = vectors.len() as f64;
    acc.iter_mut().for_each(|a| *a /= n);
    Some(acc)
}

pub fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// Cosine similarity; 0 when either side has no length.
pub fn cosine(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if na <= f64::EPSILON || nb <= f64::EPSILON {
        return 0.0;
    }
    (dot / (na * nb)).clamp(-1.0, 1.0)
}

/// `(cos + 1) / 2` of the trajectory mean against a theme centroid.
pub fn theme_coherence(trajectory_mean: Option<&[f64]>, centroid: &[f64]) -> f64 {
    match trajectory_mean {
        Some(m) => (cosine(m, centroid) + 1.0) / 2.0,
        None => 0.5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trajectory_is_capped() {
        let mut state = PoeticState::default();
        for i in 0..15 {
            state.push_vector(vec![i as f64], 10);
        }
        assert_eq!(state.trajectory.len(), 10);
        assert_eq!(state.trajectory[0], vec![5.0]);
        assert_eq!(state.trajectory_mean(), Some(vec![9.5]));
    }

    #[test]
    fn test_line_reward() {
        let state = PoeticState {
            meter_score: 1.0,
            rhyme_consistency: 1.0,
            novelty: 0.5,
            ..Default::default()
        };
        assert!((state.line_reward() - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_vector_helpers() {
        assert_eq!(euclidean(&[0.0, 3.0], &[4.0, 0.0]), 5.0);
        assert!((cosine(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-12);
        assert_eq!(cosine(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((theme_coherence(Some(&[1.0, 0.0][..]), &[-1.0, 0.0])).abs() < 1e-12);
        assert_eq!(theme_coherence(None, &[1.0]), 0.5);
        assert_eq!(mean(&Vec::new()), None);
    }
}
