// Spectral meter analysis: how regular is a 0/1 stress sequence?
//
// The score blends two measures, each in [0, 1]:
// - alternation: the fraction of adjacent positions whose stress differs;
// - spectral ratio: the strongest sub-Nyquist, non-DC magnitude divided by
//   the peak magnitude over bins `0..=N/2`.
// Alternation alone rates "da-DUM-DUM-da-DUM" as highly as a clean iamb;
// the spectral ratio rewards one clear periodicity.
//
// The transform is an iterative radix-2 Cooley–Tukey FFT over the input
// zero-padded to the next power of two. Flat input (every stress equal, so
// no AC energy) scores the alternation term alone, which is 0.

use std::f64::consts::PI;

/// Weight of the alternation term; the spectral term gets the rest.
pub const ALTERNATION_WEIGHT: f64 = 0.5;
/// Magnitudes below this count as zero energy.
const ENERGY_FLOOR: f64 = 1e-12;

/// Minimal complex number for the transform.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Complex64 {
    pub re: f64,
    pub im: f64,
}

impl Complex64 {
    #[inline]
    pub fn new(re: f64, im: f64) -> Self {
        Self { re, im }
    }

    #[inline]
    pub fn magnitude(self) -> f64 {
        self.re.hypot(self.im)
    }

    #[inline]
    fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.re * rhs.re - self.im * rhs.im,
            self.re * rhs.im + self.im * rhs.re,
        )
    }

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self::new(self.re + rhs.re, self.im + rhs.im)
    }

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.re - rhs.re, self.im - rhs.im)
    }
}

/// In-place forward FFT. `data.len()` must be a power of two (or 0/1).
pub fn fft_in_place(data: &mut [Complex64]) {
    let n = data.len();
    if n <= 1 {
        return;
    }
    debug_assert!(n.is_power_of_two(), "fft length must be a power of two");

    let bits = n.trailing_zeros();
    for i in 0..n {
        let j = i.reverse_bits() >> (usize::BITS - bits);
        if j > i {
            data.swap(i, j);
        }
    }

    let mut len = 2;
    while len <= n {
        let angle = -2.0 * PI / len as f64;
        let step = Complex64::new(angle.cos(), angle.sin());
        for start in (0..n).step_by(len) {
            let mut twiddle = Complex64::new(1.0, 0.0);
            for k in 0..len / 2 {
                let a = data[start + k];
                let b = data[start + k + len / 2].mul(twiddle);
                data[start + k] = a.add(b);
                data[start + k + len / 2] = a.sub(b);
                twiddle = twiddle.mul(step);
            }
        }
        len <<= 1;
    }
}

/// Magnitude spectrum of `signal` zero-padded to a power of two.
pub fn magnitude_spectrum(signal: &[f64]) -> Vec<f64> {
    let n = signal.len().next_power_of_two();
    let mut data: Vec<Complex64> = signal.iter().map(|&x| Complex64::new(x, 0.0)).collect();
    data.resize(n, Complex64::default());
    fft_in_place(&mut data);
    data.into_iter().map(Complex64::magnitude).collect()
}

/// Fraction of adjacent positions that differ.
pub fn alternation_score(stresses: &[u8]) -> f64 {
    if stresses.len() < 2 {
        return 0.0;
    }
    let changes = stresses
        .windows(2)
        .filter(|w| (w[0] > 0) != (w[1] > 0))
        .count();
    changes as f64 / (stresses.len() - 1) as f64
}

/// Rhythmic regularity of a stress sequence, in [0, 1].
///
/// Values greater than zero count as stressed. Sequences shorter than two
/// score 0.
pub fn analyze_stress_pattern(stresses: &[u8]) -> f64 {
    if stresses.len() < 2 {
        return 0.0;
    }
    let alternation = alternation_score(stresses);
    let first = stresses[0] > 0;
    if stresses.iter().all(|&s| (s > 0) == first) {
        return alternation;
    }

    let signal: Vec<f64> = stresses
        .iter()
        .map(|&s| if s > 0 { 1.0 } else { 0.0 })
        .collect();
    let spectrum = magnitude_spectrum(&signal);
    let half = spectrum.len() / 2;

    let peak = spectrum[..=half].iter().copied().fold(0.0, f64::max);
    let dominant = spectrum[1..half].iter().copied().fold(0.0, f64::max);
    let ac_energy = spectrum[1..=half].iter().copied().fold(0.0, f64::max);
    if ac_energy <= ENERGY_FLOOR || peak <= ENERGY_FLOOR {
        return alternation;
    }

    let ratio = (dominant / peak).clamp(0.0, 1.0);
    (ALTERNATION_WEIGHT * alternation + (1.0 - ALTERNATION_WEIGHT) * ratio).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn direct_dft(signal: &[f64]) -> Vec<f64> {
        let n = signal.len();
        (0..n)
            .map(|k| {
                let (mut re, mut im) = (0.0, 0.0);
                for (t, &x) in signal.iter().enumerate() {
                    let angle = -2.0 * PI * (k * t) as f64 / n as f64;
                    re += x * angle.cos();
                    im += x * angle.sin();
                }
                re.hypot(im)
            })
            .collect()
    }

    #[test]
    fn test_fft_matches_direct_dft() {
        let signal = [1.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0];
        let fast = magnitude_spectrum(&signal);
        let slow = direct_dft(&signal);
        for (a, b) in fast.iter().zip(&slow) {
            assert!((a - b).abs() < 1e-9, "{a} vs {b}");
        }
    }

    #[test]
    fn test_spectrum_pads_to_power_of_two() {
        assert_eq!(magnitude_spectrum(&[1.0; 5]).len(), 8);
        assert_eq!(magnitude_spectrum(&[1.0; 8]).len(), 8);
    }

    #[test]
    fn test_alternation_score() {
        assert_eq!(alternation_score(&[0, 1, 0, 1]), 1.0);
        assert_eq!(alternation_score(&[1, 1, 1]), 0.0);
        assert_eq!(alternation_score(&[1, 0, 0]), 0.5);
    }

    #[test]
    fn test_rhythm_discrimination() {
        let perfect = analyze_stress_pattern(&[0, 1, 0, 1, 0, 1, 0, 1, 0, 1]);
        let flat = analyze_stress_pattern(&[1, 1, 1, 1, 1, 1, 1, 1]);
        let chaotic = analyze_stress_pattern(&[1, 1, 0, 1, 1, 1, 0, 0, 1, 0]);
        assert!(perfect > flat, "{perfect} <= {flat}");
        assert!(flat <= chaotic, "{flat} > {chaotic}");
        assert!(perfect > chaotic, "{perfect} <= {chaotic}");
    }

    #[test]
    fn test_flat_input_is_alternation_only() {
        assert_eq!(analyze_stress_pattern(&[0, 0, 0, 0, 0]), 0.0);
        assert_eq!(analyze_stress_pattern(&[1; 10]), 0.0);
    }

    #[test]
    fn test_scores_are_bounded() {
        let patterns: [&[u8]; 5] = [
            &[0, 1],
            &[1, 0, 0, 1, 0, 0, 1, 0, 0],
            &[1, 1, 0, 0, 1, 1, 0, 0],
            &[0, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1],
            &[1, 0, 1, 0, 1, 0, 1, 0],
        ];
        for p in patterns {
            let s = analyze_stress_pattern(p);
            assert!((0.0..=1.0).contains(&s), "{p:?} -> {s}");
        }
    }

    #[test]
    fn test_short_input() {
        assert_eq!(analyze_stress_pattern(&[]), 0.0);
        assert_eq!(analyze_stress_pattern(&[1]), 0.0);
    }
}
