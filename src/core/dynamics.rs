#[cfg(feature = "simd")]
use wide::f64x4;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};
use crate::matrix::Matrix;
use crate::prng::Prng;

/// Execution tier for the `CM·E` coupling product.
///
/// - `Scalar`: plain row loop (default, reference results)
/// - `Simd`: 4-lane `f64x4` accumulation (requires `simd` feature)
///
/// The tiers sum in different orders, so results may differ in the last ulp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionTier {
    #[default]
    Scalar,
    Simd,
}

impl ExecutionTier {
    /// Tier actually used, given the compiled features.
    pub fn effective(self) -> ExecutionTier {
        match self {
            ExecutionTier::Scalar => ExecutionTier::Scalar,
            ExecutionTier::Simd => {
                #[cfg(feature = "simd")]
                {
                    ExecutionTier::Simd
                }
                #[cfg(not(feature = "simd"))]
                {
                    ExecutionTier::Scalar
                }
            }
        }
    }
}

/// Scalar constants of the Wilson-Cowan model. Fixed for a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    /// Sigmoid threshold.
    pub mu: f64,
    /// Sigmoid slope.
    pub sigma: f64,
    pub a_ee: f64,
    pub a_ie: f64,
    pub a_ii: f64,
    /// Refractory terms.
    pub r_e: f64,
    pub r_i: f64,
    /// Target excitatory activity of the plasticity rule.
    pub rho_e: f64,
    /// Noise standard deviation per call, already scaled as `D / sqrt(dt_sim)`.
    pub sqdt_d: f64,
    pub tau_e: f64,
    pub tau_i: f64,
}

#[inline]
pub fn sigmoid(x: f64, mu: f64, sigma: f64) -> f64 {
    1.0 / (1.0 + (-(x - mu) / sigma).exp())
}

/// Network state: rows E, I and the adaptive I->E weight `a_ei`, one column per node.
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    n: usize,
    // Row-major 3 x n.
    data: Vec<f64>,
}

impl State {
    pub const ROWS: usize = 3;

    /// Broadcast scalar initial conditions across `n` nodes.
    pub fn broadcast(n: usize, e0: f64, i0: f64, a_ei0: f64) -> Self {
        let mut data = Vec::with_capacity(Self::ROWS * n);
        data.extend(std::iter::repeat(e0).take(n));
        data.extend(std::iter::repeat(i0).take(n));
        data.extend(std::iter::repeat(a_ei0).take(n));
        Self { n, data }
    }

    pub fn zeros(n: usize) -> Self {
        Self::broadcast(n, 0.0, 0.0, 0.0)
    }

    #[inline]
    pub fn node_count(&self) -> usize {
        self.n
    }

    #[inline]
    pub fn e(&self) -> &[f64] {
        &self.data[..self.n]
    }

    #[inline]
    pub fn i(&self) -> &[f64] {
        &self.data[self.n..2 * self.n]
    }

    #[inline]
    pub fn a_ei(&self) -> &[f64] {
        &self.data[2 * self.n..]
    }

    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Mutable (E, I, a_ei) rows.
    #[inline]
    pub fn rows_mut(&mut self) -> (&mut [f64], &mut [f64], &mut [f64]) {
        let (e, rest) = self.data.split_at_mut(self.n);
        let (i, a) = rest.split_at_mut(self.n);
        (e, i, a)
    }

    /// `self += dt * rate`, elementwise.
    #[inline]
    pub fn add_scaled(&mut self, dt: f64, rate: &State) {
        debug_assert_eq!(self.n, rate.n);
        for (x, d) in self.data.iter_mut().zip(&rate.data) {
            *x += dt * d;
        }
    }
}

/// Coupling matrix and external drives shared by every call of one task.
#[derive(Debug, Clone, Copy)]
pub struct Network<'a> {
    cm: &'a Matrix,
    p: &'a [f64],
    q: &'a [f64],
}

impl<'a> Network<'a> {
    pub fn new(cm: &'a Matrix, p: &'a [f64], q: &'a [f64]) -> Result<Self> {
        let n = cm.ensure_square("coupling matrix")?;
        if p.len() != n {
            return Err(SimError::DimensionMismatch {
                context: "external input P",
                expected: n,
                actual: p.len(),
            });
        }
        if q.len() != n {
            return Err(SimError::DimensionMismatch {
                context: "external input Q",
                expected: n,
                actual: q.len(),
            });
        }
        Ok(Self { cm, p, q })
    }

    #[inline]
    pub fn node_count(&self) -> usize {
        self.p.len()
    }

    pub fn check_state(&self, state: &State) -> Result<()> {
        if state.node_count() != self.node_count() {
            return Err(SimError::DimensionMismatch {
                context: "state",
                expected: self.node_count(),
                actual: state.node_count(),
            });
        }
        Ok(())
    }
}

/// Scratch buffers for [`derivative_into`], allocated once per integration.
#[derive(Debug, Clone)]
pub struct Workspace {
    noise: Vec<f64>,
    coupled: Vec<f64>,
    rate: State,
}

impl Workspace {
    pub fn new(n: usize) -> Self {
        Self {
            noise: vec![0.0; n],
            coupled: vec![0.0; n],
            rate: State::zeros(n),
        }
    }

    pub fn rate(&self) -> &State {
        &self.rate
    }
}

/// `d/dt state`, allocating the result.
///
/// Draws one fresh Gaussian per node from `rng` for the excitatory input.
/// Non-finite values are not guarded and propagate.
pub fn derivative(
    state: &State,
    net: &Network<'_>,
    tau_ip: f64,
    params: &ModelParams,
    rng: &mut Prng,
) -> Result<State> {
    net.check_state(state)?;
    let mut ws = Workspace::new(state.node_count());
    derivative_into(state, net, tau_ip, params, ExecutionTier::Scalar, rng, &mut ws);
    Ok(ws.rate)
}

/// Allocation-free derivative; the result is left in `ws.rate()`.
///
/// Callers must have checked dimensions with [`Network::check_state`].
pub fn derivative_into(
    state: &State,
    net: &Network<'_>,
    tau_ip: f64,
    p: &ModelParams,
    tier: ExecutionTier,
    rng: &mut Prng,
    ws: &mut Workspace,
) {
    let e = state.e();
    let i = state.i();
    let a_ei = state.a_ei();

    rng.fill_normal(&mut ws.noise, 0.0, p.sqdt_d);
    coupling_input(net.cm, e, &mut ws.coupled, tier);

    let (de, di, da) = ws.rate.rows_mut();
    for k in 0..e.len() {
        let ek = e[k];
        let ik = i[k];

        let exc_in = p.a_ee * ek - a_ei[k] * ik + ws.coupled[k] + net.p[k] + ws.noise[k];
        de[k] = (-ek + (1.0 - p.r_e * ek) * sigmoid(exc_in, p.mu, p.sigma)) / p.tau_e;

        let inh_in = p.a_ie * ek - p.a_ii * ik + net.q[k];
        di[k] = (-ik + (1.0 - p.r_i * ik) * sigmoid(inh_in, p.mu, p.sigma)) / p.tau_i;

        da[k] = ik * (ek - p.rho_e) / tau_ip;
    }
}

/// `out = cm · e`.
fn coupling_input(cm: &Matrix, e: &[f64], out: &mut [f64], tier: ExecutionTier) {
    match tier.effective() {
        ExecutionTier::Scalar => {
            for (r, o) in out.iter_mut().enumerate() {
                *o = cm.row(r).iter().zip(e).map(|(w, x)| w * x).sum();
            }
        }
        ExecutionTier::Simd => {
            #[cfg(feature = "simd")]
            coupling_input_simd(cm, e, out);
            #[cfg(not(feature = "simd"))]
            unreachable!("effective() never yields Simd without the feature");
        }
    }
}

#[cfg(feature = "simd")]
fn coupling_input_simd(cm: &Matrix, e: &[f64], out: &mut [f64]) {
    let n = e.len();
    let simd_end = n - (n % 4);
    for (r, o) in out.iter_mut().enumerate() {
        let row = cm.row(r);
        let mut acc = f64x4::splat(0.0);
        for j in (0..simd_end).step_by(4) {
            let w = f64x4::from([row[j], row[j + 1], row[j + 2], row[j + 3]]);
            let x = f64x4::from([e[j], e[j + 1], e[j + 2], e[j + 3]]);
            acc += w * x;
        }
        let lanes = acc.to_array();
        let mut sum = lanes[0] + lanes[1] + lanes[2] + lanes[3];
        for j in simd_end..n {
            sum += row[j] * e[j];
        }
        *o = sum;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn test_params(sqdt_d: f64) -> ModelParams {
        ModelParams {
            mu: 1.0,
            sigma: 0.25,
            a_ee: 3.5,
            a_ie: 2.5,
            a_ii: 0.0,
            r_e: 0.5,
            r_i: 0.5,
            rho_e: 0.14,
            sqdt_d,
            tau_e: 0.01,
            tau_i: 0.02,
        }
    }

    #[test]
    fn sigmoid_is_half_at_threshold() {
        assert_eq!(sigmoid(1.0, 1.0, 0.25), 0.5);
        assert!(sigmoid(100.0, 1.0, 0.25) > 0.999_999);
        assert!(sigmoid(-100.0, 1.0, 0.25) < 1e-6);
    }

    #[test]
    fn derivative_matches_closed_form_without_noise() {
        let params = test_params(0.0);
        let cm = Matrix::from_rows(&[vec![0.0, 0.5], vec![0.25, 0.0]]).unwrap();
        let p = [0.4, 0.45];
        let q = [0.0, 0.1];
        let net = Network::new(&cm, &p, &q).unwrap();
        let state = State::broadcast(2, 0.1, 0.2, 1.0);
        let mut rng = Prng::new(1);

        let d = derivative(&state, &net, 0.05, &params, &mut rng).unwrap();

        let (e, i, a) = (0.1, 0.2, 1.0);
        let ce0 = 0.5 * e;
        let de0 = (-e
            + (1.0 - params.r_e * e)
                * sigmoid(params.a_ee * e - a * i + ce0 + p[0], params.mu, params.sigma))
            / params.tau_e;
        let di1 = (-i
            + (1.0 - params.r_i * i)
                * sigmoid(params.a_ie * e - params.a_ii * i + q[1], params.mu, params.sigma))
            / params.tau_i;
        let da = i * (e - params.rho_e) / 0.05;

        assert!((d.e()[0] - de0).abs() < 1e-12);
        assert!((d.i()[1] - di1).abs() < 1e-12);
        assert!((d.a_ei()[0] - da).abs() < 1e-12);
        assert!((d.a_ei()[1] - da).abs() < 1e-12);
    }

    #[test]
    fn noise_changes_excitatory_rate_only() {
        let quiet = test_params(0.0);
        let noisy = test_params(5.0);
        let cm = Matrix::zeros(3, 3);
        let p = [0.4; 3];
        let q = [0.0; 3];
        let net = Network::new(&cm, &p, &q).unwrap();
        let state = State::broadcast(3, 0.1, 0.2, 1.0);

        let a = derivative(&state, &net, 0.05, &quiet, &mut Prng::new(9)).unwrap();
        let b = derivative(&state, &net, 0.05, &noisy, &mut Prng::new(9)).unwrap();

        assert_ne!(a.e(), b.e());
        assert_eq!(a.i(), b.i());
        assert_eq!(a.a_ei(), b.a_ei());
    }

    #[test]
    fn mismatched_inputs_are_rejected() {
        let cm = Matrix::zeros(3, 3);
        let p = [0.0; 2];
        let q = [0.0; 3];
        assert!(matches!(
            Network::new(&cm, &p, &q),
            Err(SimError::DimensionMismatch { .. })
        ));

        let p = [0.0; 3];
        let net = Network::new(&cm, &p, &q).unwrap();
        let state = State::zeros(4);
        assert!(derivative(&state, &net, 0.05, &test_params(0.0), &mut Prng::new(1)).is_err());
    }

    #[test]
    fn divergent_state_propagates_nan() {
        let cm = Matrix::zeros(1, 1);
        let p = [0.0];
        let q = [0.0];
        let net = Network::new(&cm, &p, &q).unwrap();
        let state = State::broadcast(1, f64::NAN, 0.0, 0.0);
        let d = derivative(&state, &net, 0.05, &test_params(0.0), &mut Prng::new(1)).unwrap();
        assert!(d.e()[0].is_nan());
    }

    #[test]
    fn simd_tier_falls_back_or_agrees() {
        let n = 7;
        let mut cm = Matrix::zeros(n, n);
        for r in 0..n {
            for c in 0..n {
                cm.set(r, c, (r + 2 * c) as f64 * 0.01);
            }
        }
        let e: Vec<f64> = (0..n).map(|k| 0.1 * k as f64).collect();
        let mut scalar = vec![0.0; n];
        let mut simd = vec![0.0; n];
        coupling_input(&cm, &e, &mut scalar, ExecutionTier::Scalar);
        coupling_input(&cm, &e, &mut simd, ExecutionTier::Simd);
        for (a, b) in scalar.iter().zip(&simd) {
            assert!((a - b).abs() < 1e-12);
        }
    }
}
