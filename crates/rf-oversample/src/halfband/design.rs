//! Polyphase half-band coefficient synthesis
//!
//! Elliptic half-band prototype realised as two parallel chains of
//! first-order allpass sections in z^-2. Coefficients are returned in
//! ascending order; even indices belong to path 0, odd indices to path 1
//! (which carries the extra one-sample delay).

use num_complex::Complex64;
use std::f64::consts::PI;

const SERIES_EPSILON: f64 = 1e-100;

/// Coefficients for the given stopband attenuation (dB) and transition
/// bandwidth, normalised to the filter's (higher) sample rate, `]0, 0.5[`.
pub fn compute_coefficients(attenuation_db: f64, transition: f64) -> Vec<f64> {
    debug_assert!(attenuation_db > 0.0);
    debug_assert!(transition > 0.0 && transition < 0.5);

    let (k, q) = transition_param(transition);
    let order = filter_order(attenuation_db, q);
    let count = (order - 1) / 2;

    (0..count).map(|i| coefficient(i, k, q, order)).collect()
}

/// Filter order (odd, at least 3) needed for the attenuation at modulus `q`.
fn filter_order(attenuation_db: f64, q: f64) -> usize {
    let attn_p2 = 10f64.powf(-attenuation_db / 10.0);
    let a = attn_p2 / (1.0 - attn_p2);
    let mut order = ((a * a / 16.0).ln() / q.ln()).ceil() as usize;
    if order % 2 == 0 {
        order += 1;
    }
    order.max(3)
}

fn transition_param(transition: f64) -> (f64, f64) {
    let mut k = ((1.0 - transition * 2.0) * PI / 4.0).tan();
    k *= k;
    let kksqrt = (1.0 - k * k).powf(0.25);
    let e = 0.5 * (1.0 - kksqrt) / (1.0 + kksqrt);
    let e2 = e * e;
    let e4 = e2 * e2;
    let q = e * (1.0 + e4 * (2.0 + e4 * (15.0 + 150.0 * e4)));
    (k, q)
}

fn coefficient(index: usize, k: f64, q: f64, order: usize) -> f64 {
    let c = index + 1;
    let num = acc_num(q, order, c) * q.powf(0.25);
    let den = acc_den(q, order, c) + 0.5;
    let ww = num / den;
    let wwsq = ww * ww;

    let x = ((1.0 - wwsq * k) * (1.0 - wwsq / k)).sqrt() / (1.0 + wwsq);
    (1.0 - x) / (1.0 + x)
}

fn acc_num(q: f64, order: usize, c: usize) -> f64 {
    let mut acc = 0.0;
    let mut sign = 1.0;
    let mut i = 0i32;
    loop {
        let term = q.powi(i * (i + 1))
            * (((i * 2 + 1) as usize * c) as f64 * PI / order as f64).sin()
            * sign;
        acc += term;
        sign = -sign;
        i += 1;
        if term.abs() <= SERIES_EPSILON {
            break acc;
        }
    }
}

fn acc_den(q: f64, order: usize, c: usize) -> f64 {
    let mut acc = 0.0;
    let mut sign = -1.0;
    let mut i = 1i32;
    loop {
        let term = q.powi(i * i) * ((i as usize * 2 * c) as f64 * PI / order as f64).cos() * sign;
        acc += term;
        sign = -sign;
        i += 1;
        if term.abs() <= SERIES_EPSILON {
            break acc;
        }
    }
}

/// Group delay of one allpass section `(a + u^-1) / (1 + a u^-1)`, u = z^2,
/// in samples of the higher rate.
#[inline]
fn section_group_delay(a: f64, w: f64) -> f64 {
    let theta = 2.0 * w;
    2.0 * (1.0 - a * a) / (1.0 + 2.0 * a * theta.cos() + a * a)
}

#[inline]
fn section_response(a: f64, w: f64) -> Complex64 {
    let u_inv = Complex64::from_polar(1.0, -2.0 * w);
    (a + u_inv) / (1.0 + a * u_inv)
}

/// Complex response `0.5 * (A0(z^2) + z^-1 A1(z^2))` at normalised frequency `freq`.
pub fn frequency_response(coefs: &[f64], freq: f64) -> Complex64 {
    let w = 2.0 * PI * freq;
    let (a0, a1) = path_responses(coefs, w);
    0.5 * (a0 + Complex64::from_polar(1.0, -w) * a1)
}

fn path_responses(coefs: &[f64], w: f64) -> (Complex64, Complex64) {
    let mut a0 = Complex64::new(1.0, 0.0);
    let mut a1 = Complex64::new(1.0, 0.0);
    for (i, &a) in coefs.iter().enumerate() {
        if i % 2 == 0 {
            a0 *= section_response(a, w);
        } else {
            a1 *= section_response(a, w);
        }
    }
    (a0, a1)
}

/// Group delay of the half-band filter in samples of its (higher) rate.
///
/// `freq` is normalised to that rate; meaningful over the passband and up to
/// the half-band point 0.25.
pub fn group_delay(coefs: &[f64], freq: f64) -> f64 {
    let w = 2.0 * PI * freq;
    let (a0, a1) = path_responses(coefs, w);
    let mut t0 = 0.0;
    let mut t1 = 1.0;
    for (i, &a) in coefs.iter().enumerate() {
        if i % 2 == 0 {
            t0 += section_group_delay(a, w);
        } else {
            t1 += section_group_delay(a, w);
        }
    }

    // tau = Re( (T0 A0 + T1 z^-1 A1) / (A0 + z^-1 A1) )
    let delayed = Complex64::from_polar(1.0, -w) * a1;
    let h = a0 + delayed;
    if h.norm_sqr() < f64::MIN_POSITIVE {
        return 0.5 * (t0 + t1);
    }
    ((a0 * t0 + delayed * t1) / h).re
}
