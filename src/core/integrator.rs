//! Fixed-step Euler-Maruyama integration and the transient annealing protocol.

use crate::dynamics::{derivative_into, ExecutionTier, ModelParams, Network, State, Workspace};
use crate::error::{Result, SimError};
use crate::matrix::Matrix;
use crate::prng::Prng;

/// Plasticity time constant of the first transient phase.
pub const TAU_IP_FAST: f64 = 0.05;

/// Half-open time grid `[start, stop)` with step `step`.
///
/// Length follows `numpy.arange`: `ceil((stop - start) / step)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeGrid {
    start: f64,
    stop: f64,
    step: f64,
}

impl TimeGrid {
    pub fn new(start: f64, stop: f64, step: f64) -> Result<Self> {
        if !(step.is_finite() && step > 0.0) {
            return Err(SimError::Config(format!("time step must be > 0, got {step}")));
        }
        if !(start.is_finite() && stop.is_finite()) {
            return Err(SimError::Config("time grid bounds must be finite".into()));
        }
        Ok(Self { start, stop, step })
    }

    /// `[0, stop)`.
    pub fn up_to(stop: f64, step: f64) -> Result<Self> {
        Self::new(0.0, stop, step)
    }

    pub fn len(&self) -> usize {
        let n = ((self.stop - self.start) / self.step).ceil();
        if n > 0.0 {
            n as usize
        } else {
            0
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        (0..self.len()).map(move |k| self.start + k as f64 * self.step)
    }
}

/// Downsampled record of one integration, shape `(samples, 3, nodes)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    n: usize,
    samples: usize,
    data: Vec<f64>,
}

impl Trajectory {
    fn with_capacity(n: usize, samples: usize) -> Self {
        Self {
            n,
            samples: 0,
            data: Vec::with_capacity(samples * State::ROWS * n),
        }
    }

    fn push(&mut self, state: &State) {
        self.data.extend_from_slice(state.as_slice());
        self.samples += 1;
    }

    pub fn len(&self) -> usize {
        self.samples
    }

    pub fn is_empty(&self) -> bool {
        self.samples == 0
    }

    pub fn node_count(&self) -> usize {
        self.n
    }

    /// Flattened `[E, I, a_ei]` rows of sample `t`.
    pub fn sample(&self, t: usize) -> &[f64] {
        let width = State::ROWS * self.n;
        &self.data[t * width..(t + 1) * width]
    }

    pub fn excitatory_at(&self, t: usize) -> &[f64] {
        &self.sample(t)[..self.n]
    }

    /// Excitatory activity as a time x nodes matrix.
    pub fn excitatory(&self) -> Matrix {
        let mut data = Vec::with_capacity(self.samples * self.n);
        for t in 0..self.samples {
            data.extend_from_slice(self.excitatory_at(t));
        }
        Matrix::from_parts(self.samples, self.n, data)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }
}

/// Fixed settings of one integrator invocation.
#[derive(Debug, Clone, Copy)]
pub struct Integrator<'a> {
    pub net: Network<'a>,
    pub params: &'a ModelParams,
    pub dt_sim: f64,
    pub downsample: usize,
    pub tier: ExecutionTier,
}

impl<'a> Integrator<'a> {
    pub fn new(
        net: Network<'a>,
        params: &'a ModelParams,
        dt_sim: f64,
        downsample: usize,
    ) -> Result<Self> {
        if !(dt_sim.is_finite() && dt_sim > 0.0) {
            return Err(SimError::Config(format!("dt_sim must be > 0, got {dt_sim}")));
        }
        if downsample == 0 {
            return Err(SimError::Config("downsample factor must be >= 1".into()));
        }
        Ok(Self {
            net,
            params,
            dt_sim,
            downsample,
            tier: ExecutionTier::Scalar,
        })
    }

    pub fn with_tier(mut self, tier: ExecutionTier) -> Self {
        self.tier = tier;
        self
    }

    /// One Euler-Maruyama pass over `grid`.
    ///
    /// Takes the state by value and hands back the final state, so phases are
    /// chained explicitly. A sample is recorded after every step whose index
    /// is a multiple of `downsample`, starting with step 0; the record holds
    /// `floor(grid.len() / downsample)` samples.
    pub fn integrate(
        &self,
        grid: &TimeGrid,
        mut state: State,
        tau_ip: f64,
        rng: &mut Prng,
    ) -> Result<(State, Trajectory)> {
        self.net.check_state(&state)?;
        let n = state.node_count();
        let steps = grid.len();
        let out_len = steps / self.downsample;

        let mut ws = Workspace::new(n);
        let mut traj = Trajectory::with_capacity(n, out_len);

        for k in 0..steps {
            derivative_into(&state, &self.net, tau_ip, self.params, self.tier, rng, &mut ws);
            state.add_scaled(self.dt_sim, ws.rate());
            // The last partial block is not recorded.
            if k % self.downsample == 0 && traj.len() < out_len {
                traj.push(&state);
            }
        }

        Ok((state, traj))
    }

    /// Two transient passes with annealed plasticity, then the analysis run.
    ///
    /// The transient passes use `TAU_IP_FAST` and `TAU_IP_FAST / 2` in that
    /// order; their trajectories are discarded. Returns the analysis-run
    /// result.
    pub fn run_with_transient(
        &self,
        transient: &TimeGrid,
        analysis: &TimeGrid,
        state: State,
        tau_ip: f64,
        rng: &mut Prng,
    ) -> Result<(State, Trajectory)> {
        let (state, _) = self.integrate(transient, state, TAU_IP_FAST, rng)?;
        let (state, _) = self.integrate(transient, state, TAU_IP_FAST / 2.0, rng)?;
        self.integrate(analysis, state, tau_ip, rng)
    }
}
