//! Whole-brain Wilson-Cowan simulation with inhibitory plasticity.
//!
//! Each node is an excitatory/inhibitory population pair whose I->E weight
//! adapts towards a target excitatory rate. Nodes are coupled through a
//! structural connectome scaled by a global gain (or by separate intra- and
//! inter-hemispheric gains). Simulated activity is band-pass filtered, its
//! amplitude envelope correlated across nodes, and the resulting functional
//! connectivity scored against an empirical one.

#[path = "core/prng.rs"]
pub mod prng;

#[path = "core/matrix.rs"]
pub mod matrix;

#[path = "core/dynamics.rs"]
pub mod dynamics;

#[path = "core/integrator.rs"]
pub mod integrator;

#[path = "core/signal.rs"]
pub mod signal;

#[path = "core/metrics.rs"]
pub mod metrics;

#[path = "core/coupling.rs"]
pub mod coupling;

pub mod config;
pub mod connectivity;
pub mod error;
pub mod observer;
pub mod output;
pub mod sweep;

pub mod prelude {
    pub use crate::config::{RunConfig, SimulationParams, SweepMode};
    pub use crate::connectivity::{Connectome, ConnectivityStore};
    pub use crate::coupling::Coupling;
    pub use crate::dynamics::{ExecutionTier, ModelParams, Network, State};
    pub use crate::error::{Result, SimError};
    pub use crate::integrator::{Integrator, TimeGrid, Trajectory};
    pub use crate::matrix::Matrix;
    pub use crate::metrics::{correlation_matrix, score, Score};
    pub use crate::prng::Prng;
    pub use crate::sweep::{run_task, Sweep, TaskOutcome};
}
