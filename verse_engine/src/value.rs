// Linear TD(λ) value estimator over PoeticState features.
//
// V(s) = w·φ(s). An update on the transition (s, r, s', done) computes
//     δ = r + (done ? 0 : γ·V(s')) − V(s)
//     e ← γλ·e + φ(s)
//     w ← w + α·δ·e
// and clears the eligibility trace when the episode ends. Traces accumulate
// (no replacing traces) and features are not normalized.
//
// φ(s) is the trajectory mean followed by meter, rhyme, novelty, line
// progress and theme coherence, zero-padded or truncated to F. A missing
// state maps to the zero vector.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::ValueConfig;
use crate::state::PoeticState;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValueEstimator {
    weights: Vec<f64>,
    eligibility: Vec<f64>,
    alpha: f64,
    gamma: f64,
    lambda: f64,
}

impl ValueEstimator {
    pub fn new(config: &ValueConfig) -> Self {
        Self {
            weights: vec![0.0; config.feature_dim],
            eligibility: vec![0.0; config.feature_dim],
            alpha: config.alpha,
            gamma: config.gamma,
            lambda: config.lambda,
        }
    }

    /// Restore from stored fields. Both vectors are resized to
    /// `feature_dim` so the length invariant holds whatever was stored.
    pub fn from_parts(
        mut weights: Vec<f64>,
        mut eligibility: Vec<f64>,
        config: &ValueConfig,
    ) -> Self {
        weights.resize(config.feature_dim, 0.0);
        eligibility.resize(config.feature_dim, 0.0);
        Self {
            weights,
            eligibility,
            alpha: config.alpha,
            gamma: config.gamma,
            lambda: config.lambda,
        }
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn eligibility(&self) -> &[f64] {
        &self.eligibility
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    pub fn feature_dim(&self) -> usize {
        self.weights.len()
    }

    pub fn features(&self, state: Option<&PoeticState>) -> Vec<f64> {
        let f = self.feature_dim();
        let Some(state) = state else {
            return vec![0.0; f];
        };
        let mut phi = state.trajectory_mean().unwrap_or_default();
        phi.extend([
            state.meter_score,
            state.rhyme_consistency,
            state.novelty,
            state.line_progress,
            state.theme_coherence,
        ]);
        phi.resize(f, 0.0);
        phi
    }

    pub fn estimate(&self, state: Option<&PoeticState>) -> f64 {
        dot(&self.weights, &self.features(state))
    }

    /// One TD(λ) step. Returns the TD error δ.
    pub fn update(
        &mut self,
        state: Option<&PoeticState>,
        reward: f64,
        next_state: Option<&PoeticState>,
        done: bool,
    ) -> f64 {
        let reward = if reward.is_finite() {
            reward
        } else {
            warn!(reward, "non-finite reward treated as zero");
            0.0
        };

        let phi = self.features(state);
        let v = dot(&self.weights, &phi);
        let bootstrap = if done {
            0.0
        } else {
            self.gamma * self.estimate(next_state)
        };
        let delta = reward + bootstrap - v;

        let decay = self.gamma * self.lambda;
        for (e, x) in self.eligibility.iter_mut().zip(&phi) {
            *e = decay * *e + x;
        }
        let step = self.alpha * delta;
        for (w, e) in self.weights.iter_mut().zip(&self.eligibility) {
            *w += step * e;
        }
        if done {
            self.eligibility.iter_mut().for_each(|e| *e = 0.0);
        }
        delta
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_hot_state(i: usize) -> PoeticState {
        let mut v = vec![0.0; 4];
        v[i] = 1.0;
        PoeticState {
            trajectory: vec![v],
            meter_score: 0.5,
            ..Default::default()
        }
    }

    /// Run `epochs` passes over a 4-step episode, returning per-epoch mean
    /// squared TD error.
    fn run_episodes(value: &mut ValueEstimator, rewards: [f64; 4], epochs: usize) -> Vec<f64> {
        let states: Vec<PoeticState> = (0..4).map(one_hot_state).collect();
        (0..epochs)
            .map(|_| {
                let mut sq = 0.0;
                for i in 0..4 {
                    let done = i == 3;
                    let next = states.get(i + 1).filter(|_| !done);
                    let delta = value.update(Some(&states[i]), rewards[i], next, done);
                    sq += delta * delta;
                }
                sq / 4.0
            })
            .collect()
    }

    #[test]
    fn test_features_layout() {
        let value = ValueEstimator::new(&ValueConfig::default());
        let state = PoeticState {
            trajectory: vec![vec![1.0, 2.0], vec![3.0, 4.0]],
            meter_score: 0.25,
            rhyme_consistency: 1.0,
            novelty: 0.5,
            line_progress: 0.75,
            theme_coherence: 0.6,
        };
        let phi = value.features(Some(&state));
        assert_eq!(phi.len(), 16);
        assert_eq!(&phi[..7], &[2.0, 3.0, 0.25, 1.0, 0.5, 0.75, 0.6]);
        assert!(phi[7..].iter().all(|&x| x == 0.0));
        assert_eq!(value.features(None), vec![0.0; 16]);
    }

    #[test]
    fn test_features_truncate() {
        let config = ValueConfig {
            feature_dim: 3,
            ..Default::default()
        };
        let value = ValueEstimator::new(&config);
        let state = PoeticState {
            trajectory: vec![vec![1.0, 2.0, 3.0, 4.0]],
            ..Default::default()
        };
        assert_eq!(value.features(Some(&state)), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_td_error_shrinks() {
        let mut value = ValueEstimator::new(&ValueConfig::default());
        let mse = run_episodes(&mut value, [0.1, 0.2, 0.3, 1.0], 50);
        let first: f64 = mse[..10].iter().sum::<f64>() / 10.0;
        let last: f64 = mse[40..].iter().sum::<f64>() / 10.0;
        assert!(last < 0.01 * first, "first {first}, last {last}");
    }

    #[test]
    fn test_reward_ablation() {
        let mut zero = ValueEstimator::new(&ValueConfig::default());
        let mut rewarded = ValueEstimator::new(&ValueConfig::default());
        run_episodes(&mut zero, [0.0; 4], 20);
        run_episodes(&mut rewarded, [0.1, 0.2, 0.3, 1.0], 20);
        let norm = |v: &ValueEstimator| v.weights().iter().map(|w| w * w).sum::<f64>().sqrt();
        assert!(norm(&rewarded) > 0.0);
        assert!(norm(&rewarded) >= 100.0 * norm(&zero));
    }

    #[test]
    fn test_eligibility_resets_on_done() {
        let mut value = ValueEstimator::new(&ValueConfig::default());
        let s = one_hot_state(0);
        value.update(Some(&s), 1.0, Some(&s), false);
        assert!(value.eligibility().iter().any(|&e| e != 0.0));
        value.update(Some(&s), 1.0, None, true);
        assert!(value.eligibility().iter().all(|&e| e == 0.0));
    }

    #[test]
    fn test_update_returns_delta() {
        let mut value = ValueEstimator::new(&ValueConfig::default());
        let s = one_hot_state(1);
        assert_eq!(value.update(Some(&s), 0.7, None, true), 0.7);
        assert!(value.estimate(Some(&s)) > 0.0);
    }

    #[test]
    fn test_non_finite_reward_is_zero() {
        let mut value = ValueEstimator::new(&ValueConfig::default());
        let s = one_hot_state(2);
        assert_eq!(value.update(Some(&s), f64::NAN, None, true), 0.0);
        assert!(value.weights().iter().all(|&w| w == 0.0));
    }

    #[test]
    fn test_from_parts_resizes() {
        let value = ValueEstimator::from_parts(vec![1.0; 20], vec![], &ValueConfig::default());
        assert_eq!(value.weights().len(), 16);
        assert_eq!(value.eligibility().len(), 16);
    }
}
