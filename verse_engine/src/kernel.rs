// Kernel PCA with a polynomial kernel: the nonlinear embedder.
//
// `fit` builds the n×n Gram matrix `K[i][j] = (xi·xj + 1)^d`, double-centers
// it (`K - rowMean - colMean + totalMean`), and extracts the top-k
// eigenpairs by power iteration. Each component starts from a random vector
// drawn from the caller's `VerseRng`, is Gram–Schmidt orthogonalized against
// the components already found (deflation), and is renormalized after every
// multiply. Iteration stops at the configured cap, when successive iterates
// agree to `CONVERGENCE_TOL`, or when the iterate collapses to zero norm.
// The eigenvalue is the Rayleigh quotient of the final iterate.
//
// `transform` projects new vectors: entry i is `Σ_j K(y, x_fit[j]) ·
// eigvec[i][j]` with the uncentered kernel. The normalized variant divides
// entry i by `sqrt(|λ_i| + NORMALIZE_EPS)`.
//
// Invariant held by every constructed model: `eigenvectors.len() ==
// eigenvalues.len() == k <= min(n_components, x_fit.len())`, and every
// eigenvector has length `x_fit.len()`. `from_parts` enforces the same
// invariant for models restored from checkpoints.
//
// Cost is Θ(n²·dims) for the Gram matrix and Θ(k·iterations·n²) for the
// eigen-solve; the engine caps n via `KernelConfig::max_support`.

use tracing::debug;
use verse_prng::VerseRng;

use crate::error::{EngineError, Result};

/// Successive unit iterates closer than this are considered converged.
pub const CONVERGENCE_TOL: f64 = 1e-12;
/// Norms at or below this are treated as zero.
pub const ZERO_NORM: f64 = 1e-300;
/// Added to |λ| before the square root in the normalized projection.
pub const NORMALIZE_EPS: f64 = 1e-10;

/// A fitted (or empty) kernel PCA model.
#[derive(Clone, Debug, PartialEq)]
pub struct KernelModel {
    x_fit: Vec<Vec<f64>>,
    eigenvectors: Vec<Vec<f64>>,
    eigenvalues: Vec<f64>,
    degree: u32,
    n_components: usize,
}

impl KernelModel {
    /// An unfitted model. `transform` fails until `fit` succeeds.
    pub fn new(degree: u32, n_components: usize) -> Self {
        Self {
            x_fit: Vec::new(),
            eigenvectors: Vec::new(),
            eigenvalues: Vec::new(),
            degree,
            n_components,
        }
    }

    /// Rebuild a model from stored fields, checking the shape invariant.
    /// An empty `x_fit` yields an unfitted model.
    pub fn from_parts(
        x_fit: Vec<Vec<f64>>,
        eigenvectors: Vec<Vec<f64>>,
        eigenvalues: Vec<f64>,
        degree: u32,
        n_components: usize,
    ) -> Result<Self> {
        let n = x_fit.len();
        if eigenvectors.len() != eigenvalues.len() {
            return Err(EngineError::InvalidCheckpoint(format!(
                "{} eigenvectors but {} eigenvalues",
                eigenvectors.len(),
                eigenvalues.len()
            )));
        }
        if eigenvectors.len() > n_components.min(n) {
            return Err(EngineError::InvalidCheckpoint(format!(
                "{} components exceed min(n_components={n_components}, n={n})",
                eigenvectors.len()
            )));
        }
        if let Some(bad) = eigenvectors.iter().find(|v| v.len() != n) {
            return Err(EngineError::InvalidCheckpoint(format!(
                "eigenvector of length {} for a support set of {n}",
                bad.len()
            )));
        }
        if let Some(first) = x_fit.first() {
            let dims = first.len();
            if x_fit.iter().any(|x| x.len() != dims) {
                return Err(EngineError::InvalidCheckpoint(
                    "support vectors have mixed lengths".into(),
                ));
            }
        }
        Ok(Self {
            x_fit,
            eigenvectors,
            eigenvalues,
            degree,
            n_components,
        })
    }

    pub fn is_fitted(&self) -> bool {
        !self.x_fit.is_empty()
    }

    pub fn degree(&self) -> u32 {
        self.degree
    }

    pub fn n_components(&self) -> usize {
        self.n_components
    }

    /// Number of components actually extracted (`k`).
    pub fn k(&self) -> usize {
        self.eigenvalues.len()
    }

    pub fn x_fit(&self) -> &[Vec<f64>] {
        &self.x_fit
    }

    pub fn eigenvectors(&self) -> &[Vec<f64>] {
        &self.eigenvectors
    }

    pub fn eigenvalues(&self) -> &[f64] {
        &self.eigenvalues
    }

    /// Polynomial kernel `(a·b + 1)^degree`.
    pub fn kernel(&self, a: &[f64], b: &[f64]) -> f64 {
        (dot(a, b) + 1.0).powi(self.degree as i32)
    }

    /// Fit on `x`, replacing any previous fit.
    pub fn fit(&mut self, x: &[Vec<f64>], iterations: usize, rng: &mut VerseRng) -> Result<()> {
        let Some(first) = x.first() else {
            return Err(EngineError::EmptyInput("kernel fit set"));
        };
        let dims = first.len();
        if let Some(bad) = x.iter().find(|v| v.len() != dims) {
            return Err(EngineError::DimensionMismatch {
                expected: dims,
                got: bad.len(),
            });
        }

        let n = x.len();
        let k = self.n_components.min(n);
        let gram = centered_gram(x, |a, b| self.kernel(a, b));

        let mut eigenvectors: Vec<Vec<f64>> = Vec::with_capacity(k);
        let mut eigenvalues = Vec::with_capacity(k);
        for component in 0..k {
            let mut v: Vec<f64> = (0..n).map(|_| rng.range_f64(-0.5, 0.5)).collect();
            orthogonalize(&mut v, &eigenvectors);
            if !normalize(&mut v) {
                debug!(component, "initial vector vanished after deflation");
                break;
            }

            let mut steps = 0;
            for _ in 0..iterations {
                steps += 1;
                let mut w = mat_vec(&gram, &v);
                orthogonalize(&mut w, &eigenvectors);
                if !normalize(&mut w) {
                    break;
                }
                let delta = w
                    .iter()
                    .zip(&v)
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum::<f64>()
                    .sqrt();
                v = w;
                if delta < CONVERGENCE_TOL {
                    break;
                }
            }

            let lambda = dot(&v, &mat_vec(&gram, &v));
            debug!(component, steps, lambda, "kernel component extracted");
            eigenvectors.push(v);
            eigenvalues.push(lambda);
        }

        self.x_fit = x.to_vec();
        self.eigenvectors = eigenvectors;
        self.eigenvalues = eigenvalues;
        Ok(())
    }

    /// Project `y` onto the fitted components.
    pub fn transform(&self, y: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        self.project(y, false)
    }

    /// Project `y`, scaling component i by `1/sqrt(|λ_i| + eps)`.
    pub fn transform_normalized(&self, y: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        self.project(y, true)
    }

    fn project(&self, y: &[Vec<f64>], normalized: bool) -> Result<Vec<Vec<f64>>> {
        if !self.is_fitted() {
            return Err(EngineError::NotFitted);
        }
        let dims = self.x_fit[0].len();
        if let Some(bad) = y.iter().find(|v| v.len() != dims) {
            return Err(EngineError::DimensionMismatch {
                expected: dims,
                got: bad.len(),
            });
        }

        let scales: Vec<f64> = self
            .eigenvalues
            .iter()
            .map(|&l| {
                if normalized {
                    1.0 / (l.abs() + NORMALIZE_EPS).sqrt()
                } else {
                    1.0
                }
            })
            .collect();

        Ok(y.iter()
            .map(|point| {
                let k_row: Vec<f64> = self.x_fit.iter().map(|x| self.kernel(point, x)).collect();
                self.eigenvectors
                    .iter()
                    .zip(&scales)
                    .map(|(ev, s)| dot(&k_row, ev) * s)
                    .collect()
            })
            .collect())
    }
}

/// Double-centered Gram matrix of `x` under `kernel`.
pub(crate) fn centered_gram(x: &[Vec<f64>], kernel: impl Fn(&[f64], &[f64]) -> f64) -> Vec<Vec<f64>> {
    let n = x.len();
    let mut gram = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in i..n {
            let value = kernel(&x[i], &x[j]);
            gram[i][j] = value;
            gram[j][i] = value;
        }
    }

    let row_means: Vec<f64> = gram.iter().map(|r| r.iter().sum::<f64>() / n as f64).collect();
    // Symmetric, so column means equal row means.
    let total_mean = row_means.iter().sum::<f64>() / n as f64;
    for i in 0..n {
        for j in 0..n {
            gram[i][j] += total_mean - row_means[i] - row_means[j];
        }
    }
    gram
}

pub(crate) fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn mat_vec(m: &[Vec<f64>], v: &[f64]) -> Vec<f64> {
    m.iter().map(|row| dot(row, v)).collect()
}

/// Remove the components of `v` along each (unit) vector in `basis`.
fn orthogonalize(v: &mut [f64], basis: &[Vec<f64>]) {
    for u in basis {
        let proj = dot(v, u);
        for (x, ui) in v.iter_mut().zip(u) {
            *x -= proj * ui;
        }
    }
}

/// Scale to unit length. Returns false, leaving `v` untouched, for a
/// zero-norm vector.
fn normalize(v: &mut [f64]) -> bool {
    let norm = dot(v, v).sqrt();
    if !norm.is_finite() || norm <= ZERO_NORM {
        return false;
    }
    for x in v.iter_mut() {
        *x /= norm;
    }
    true
}
