//! Shared signal helpers for the integration tests

#![allow(dead_code)]

use std::f64::consts::PI;

/// Route `log` output through the test harness
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Sine at `freq` cycles/sample, starting at sample `offset`
pub fn sine(freq: f64, offset: usize, len: usize) -> Vec<f64> {
    (offset..offset + len)
        .map(|n| (2.0 * PI * freq * n as f64).sin())
        .collect()
}

/// Reproducible noise in [-1, 1)
pub fn noise(len: usize, seed: u64) -> Vec<f64> {
    let mut state = seed;
    (0..len)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (state >> 11) as f64 / (1u64 << 53) as f64 * 2.0 - 1.0
        })
        .collect()
}

/// SNR (dB) of `signal[start..]` against its least-squares fit
/// `a sin + b cos + c` at the known frequency. Independent of delay.
pub fn snr_db(signal: &[f64], freq: f64, start: usize) -> f64 {
    let basis = |n: usize| {
        let w = 2.0 * PI * freq * n as f64;
        [w.sin(), w.cos(), 1.0]
    };

    let mut m = [[0.0; 4]; 3];
    for (n, &s) in signal.iter().enumerate().skip(start) {
        let b = basis(n);
        for i in 0..3 {
            for j in 0..3 {
                m[i][j] += b[i] * b[j];
            }
            m[i][3] += b[i] * s;
        }
    }
    // Gauss-Jordan on the 3x3 normal equations
    for i in 0..3 {
        let pivot = m[i][i];
        for v in &mut m[i][i..] {
            *v /= pivot;
        }
        for k in 0..3 {
            if k != i {
                let factor = m[k][i];
                for j in i..4 {
                    m[k][j] -= factor * m[i][j];
                }
            }
        }
    }
    let coef = [m[0][3], m[1][3], m[2][3]];

    let mut signal_power = 0.0;
    let mut error_power = 0.0;
    for (n, &s) in signal.iter().enumerate().skip(start) {
        let b = basis(n);
        let fit = coef[0] * b[0] + coef[1] * b[1] + coef[2] * b[2];
        signal_power += fit * fit;
        error_power += (s - fit) * (s - fit);
    }
    10.0 * (signal_power / error_power.max(1e-300)).log10()
}
