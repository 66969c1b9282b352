//! Band-pass filtering and amplitude envelopes of recorded activity.
//!
//! The band is tied to the sampling step: critical frequencies are
//! `(12 * 2 * dt, 16 * 2 * dt)` in Nyquist-normalized units, whatever the
//! physical unit of `dt`.

use std::f64::consts::PI;
use std::sync::Arc;

use rustfft::num_complex::Complex64;
use rustfft::{Fft, FftPlanner};

use crate::error::{Result, SimError};
use crate::matrix::Matrix;

/// Analog prototype order.
pub const BESSEL_ORDER: usize = 2;

const TAPS: usize = 2 * BESSEL_ORDER + 1;

/// Band edges for a sampling step `dt`.
pub fn band_for_step(dt: f64) -> (f64, f64) {
    (12.0 * 2.0 * dt, 16.0 * 2.0 * dt)
}

/// Digital IIR band-pass, transfer-function form (`a[0] == 1`).
#[derive(Debug, Clone, PartialEq)]
pub struct BandPass {
    pub b: [f64; TAPS],
    pub a: [f64; TAPS],
}

impl BandPass {
    /// Order-2 Bessel band-pass between Nyquist-normalized `low` and `high`.
    ///
    /// Phase-normalized analog prototype, low-pass to band-pass transform,
    /// then bilinear transform with pre-warping (`fs = 2`).
    pub fn bessel(low: f64, high: f64) -> Result<Self> {
        if !(low > 0.0 && high < 1.0 && low < high) {
            return Err(SimError::FilterDesign(format!(
                "critical frequencies must satisfy 0 < low < high < 1, got ({low}, {high})"
            )));
        }

        let fs = 2.0;
        let warp = |w: f64| 2.0 * fs * (PI * w / fs).tan();
        let (w1, w2) = (warp(low), warp(high));
        let bw = w2 - w1;
        let wo = (w1 * w2).sqrt();

        let proto = bessel_prototype_poles();

        // Low-pass -> band-pass: each pole splits in two, two zeros land at s = 0.
        let wo2 = Complex64::new(wo * wo, 0.0);
        let mut poles = [Complex64::new(0.0, 0.0); 2 * BESSEL_ORDER];
        for (k, p) in proto.iter().enumerate() {
            let p_lp = *p * (bw / 2.0);
            let root = (p_lp * p_lp - wo2).sqrt();
            poles[k] = p_lp + root;
            poles[k + BESSEL_ORDER] = p_lp - root;
        }
        let gain_s = bw.powi(BESSEL_ORDER as i32);

        // Bilinear: s-plane zeros at 0 map to z = 1, the remaining degree to z = -1.
        let fs2 = Complex64::new(2.0 * fs, 0.0);
        let mut z_poles = [Complex64::new(0.0, 0.0); 2 * BESSEL_ORDER];
        let mut den = Complex64::new(1.0, 0.0);
        for (zp, p) in z_poles.iter_mut().zip(&poles) {
            *zp = (fs2 + *p) / (fs2 - *p);
            den *= fs2 - *p;
        }
        let num = fs2.powu(BESSEL_ORDER as u32);
        let gain_z = gain_s * (num / den).re;

        let zeros = [
            Complex64::new(1.0, 0.0),
            Complex64::new(1.0, 0.0),
            Complex64::new(-1.0, 0.0),
            Complex64::new(-1.0, 0.0),
        ];
        let b_poly = poly(&zeros);
        let a_poly = poly(&z_poles);

        let mut b = [0.0; TAPS];
        let mut a = [0.0; TAPS];
        for k in 0..TAPS {
            b[k] = gain_z * b_poly[k].re;
            a[k] = a_poly[k].re;
        }
        Ok(Self { b, a })
    }

    /// The filter used for recorded activity sampled every `dt`.
    pub fn for_sampling_step(dt: f64) -> Result<Self> {
        let (low, high) = band_for_step(dt);
        Self::bessel(low, high)
    }

    /// Edge padding used by [`BandPass::filtfilt`].
    pub fn padlen(&self) -> usize {
        3 * TAPS
    }

    /// Single causal pass, direct form II transposed, starting from state `zi`.
    fn lfilter(&self, x: &[f64], zi: [f64; TAPS - 1], out: &mut Vec<f64>) {
        let (b, a) = (&self.b, &self.a);
        let mut z = zi;
        out.clear();
        for &xn in x {
            let yn = z[0] + b[0] * xn;
            for k in 0..TAPS - 2 {
                z[k] = z[k + 1] + b[k + 1] * xn - a[k + 1] * yn;
            }
            z[TAPS - 2] = b[TAPS - 1] * xn - a[TAPS - 1] * yn;
            out.push(yn);
        }
    }

    /// Steady-state filter state for a unit step input.
    fn lfilter_zi(&self) -> [f64; TAPS - 1] {
        let (b, a) = (&self.b, &self.a);
        let mut rhs = [0.0; TAPS - 1];
        for k in 0..TAPS - 1 {
            rhs[k] = b[k + 1] - a[k + 1] * b[0];
        }
        let mut zi = [0.0; TAPS - 1];
        zi[0] = rhs.iter().sum::<f64>() / a.iter().sum::<f64>();
        for k in 1..TAPS - 1 {
            zi[k] = zi[k - 1] + a[k] * zi[0] - rhs[k - 1];
        }
        zi
    }

    /// Zero-phase forward-backward filtering.
    ///
    /// The signal is extended by `padlen` samples of odd reflection at both
    /// ends; each pass starts from the steady state scaled by its first sample.
    pub fn filtfilt(&self, x: &[f64]) -> Result<Vec<f64>> {
        let pad = self.padlen();
        let n = x.len();
        if n <= pad {
            return Err(SimError::SignalTooShort { len: n, padlen: pad });
        }

        let mut ext = Vec::with_capacity(n + 2 * pad);
        let (first, last) = (x[0], x[n - 1]);
        ext.extend((1..=pad).rev().map(|k| 2.0 * first - x[k]));
        ext.extend_from_slice(x);
        ext.extend((0..pad).map(|k| 2.0 * last - x[n - 2 - k]));

        let zi = self.lfilter_zi();
        let scaled = |s: f64| zi.map(|z| z * s);

        let mut fwd = Vec::with_capacity(ext.len());
        self.lfilter(&ext, scaled(ext[0]), &mut fwd);

        fwd.reverse();
        let mut bwd = Vec::with_capacity(ext.len());
        self.lfilter(&fwd, scaled(fwd[0]), &mut bwd);
        bwd.reverse();

        Ok(bwd[pad..pad + n].to_vec())
    }
}

/// Poles of the order-2 Bessel prototype, normalized so the phase response
/// matches a Butterworth at unit frequency.
///
/// The delay-normalized polynomial is `s^2 + 3s + 3`; its poles are scaled by
/// `10^(-log10(3) / 2)`.
fn bessel_prototype_poles() -> [Complex64; BESSEL_ORDER] {
    let a_last: f64 = 3.0;
    let norm = 10f64.powf(-a_last.log10() / BESSEL_ORDER as f64);
    let im = 3f64.sqrt() / 2.0;
    [
        Complex64::new(-1.5, im) * norm,
        Complex64::new(-1.5, -im) * norm,
    ]
}

/// Monic polynomial coefficients (highest power first) from its roots.
fn poly(roots: &[Complex64]) -> Vec<Complex64> {
    let mut c = vec![Complex64::new(1.0, 0.0)];
    for r in roots {
        let mut next = vec![Complex64::new(0.0, 0.0); c.len() + 1];
        for (k, ck) in c.iter().enumerate() {
            next[k] += *ck;
            next[k + 1] -= *ck * *r;
        }
        c = next;
    }
    c
}

/// FFT-based analytic-signal magnitude, reusing plans across columns.
pub struct EnvelopeExtractor {
    len: usize,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
    buf: Vec<Complex64>,
}

impl EnvelopeExtractor {
    pub fn new(len: usize) -> Self {
        let mut planner = FftPlanner::<f64>::new();
        Self {
            len,
            forward: planner.plan_fft_forward(len),
            inverse: planner.plan_fft_inverse(len),
            buf: Vec::with_capacity(len),
        }
    }

    /// `|x + i·H[x]|` for a signal of the planned length.
    pub fn envelope(&mut self, x: &[f64], out: &mut [f64]) {
        let n = self.len;
        debug_assert_eq!(x.len(), n);
        debug_assert_eq!(out.len(), n);
        if n == 0 {
            return;
        }

        self.buf.clear();
        self.buf.extend(x.iter().map(|&v| Complex64::new(v, 0.0)));
        self.forward.process(&mut self.buf);

        // Keep DC (and Nyquist for even n), double positive frequencies, drop negative.
        let half = n / 2;
        let positive_end = if n % 2 == 0 { half } else { (n + 1) / 2 };
        for (k, c) in self.buf.iter_mut().enumerate() {
            let h = if k == 0 || (n % 2 == 0 && k == half) {
                1.0
            } else if k < positive_end {
                2.0
            } else {
                0.0
            };
            *c *= h;
        }

        self.inverse.process(&mut self.buf);
        let scale = 1.0 / n as f64;
        for (o, c) in out.iter_mut().zip(&self.buf) {
            *o = (c * scale).norm();
        }
    }
}

/// Band-pass filter each node's activity and take its Hilbert envelope.
///
/// `activity` is time x nodes; both outputs have the same shape.
pub fn filter_and_envelope(activity: &Matrix, dt: f64) -> Result<(Matrix, Matrix)> {
    let filter = BandPass::for_sampling_step(dt)?;
    let (t_len, nodes) = (activity.rows(), activity.cols());
    if t_len <= filter.padlen() {
        return Err(SimError::SignalTooShort {
            len: t_len,
            padlen: filter.padlen(),
        });
    }

    let mut filtered = Matrix::zeros(t_len, nodes);
    let mut envelope = Matrix::zeros(t_len, nodes);
    let mut extractor = EnvelopeExtractor::new(t_len);
    let mut env_col = vec![0.0; t_len];

    for node in 0..nodes {
        let y = filter.filtfilt(&activity.column(node))?;
        extractor.envelope(&y, &mut env_col);
        filtered.set_column(node, &y);
        envelope.set_column(node, &env_col);
    }
    Ok((filtered, envelope))
}
