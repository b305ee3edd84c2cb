//! Fundamental-character readout
//!
//! A readout sums the phase histogram over its edges and channels, projects
//! it onto the k-th roots of unity and reports `|Σ n_g·e^{i2πg/k}|²`.

use crate::domain::entities::CountTensor;
use std::f64::consts::TAU;

/// `(cos, sin)` of `2πg/k` for `g` in `0..k`.
pub fn roots_of_unity(k: usize) -> Vec<(f64, f64)> {
    (0..k)
        .map(|g| {
            let theta = TAU * g as f64 / k as f64;
            (theta.cos(), theta.sin())
        })
        .collect()
}

/// Phase histogram summed over `edges` (repeats count again) and `channels`.
///
/// `None` selects every channel. Sums are `u128` so a readout spanning
/// several full lanes cannot wrap.
pub fn phase_histogram(counts: &CountTensor, edges: &[usize], channels: Option<&[usize]>) -> Vec<u128> {
    let [_, channel_count, k] = counts.shape();
    let mut hist = vec![0u128; k];
    for &edge in edges {
        let mut add = |channel: usize| {
            for (slot, value) in hist.iter_mut().zip(counts.lane(edge, channel)) {
                *slot += *value as u128;
            }
        };
        match channels {
            Some(selected) => selected.iter().copied().for_each(&mut add),
            None => (0..channel_count).for_each(&mut add),
        }
    }
    hist
}

/// Squared magnitude of the histogram's projection onto the character.
pub fn character_power(hist: &[u128]) -> f64 {
    let roots = roots_of_unity(hist.len());
    let (re, im) = hist
        .iter()
        .zip(&roots)
        .fold((0.0f64, 0.0f64), |(re, im), (&n, &(c, s))| {
            let n = n as f64;
            (re + n * c, im + n * s)
        });
    re * re + im * im
}

/// Readout value for one set of edges; an empty edge list reads 0.
pub fn measure_counts(counts: &CountTensor, edges: &[usize], channels: Option<&[usize]>) -> f64 {
    if edges.is_empty() {
        return 0.0;
    }
    character_power(&phase_histogram(counts, edges, channels))
}
