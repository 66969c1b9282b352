//! JSON configuration documents.
//!
//! A configuration directory holds three documents:
//! - `global.json`: the coupling sweep (`G`, or `G1`/`G2` for hemispheric runs)
//! - `simulation_parameters.json`: model constants, drives, time windows
//! - `plotting_parameters.json`: which optional artifacts to write

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use crate::coupling::Coupling;
use crate::dynamics::{ModelParams, State};
use crate::error::{Result, SimError};
use crate::integrator::TimeGrid;
use crate::prng::Prng;

pub const SWEEP_FILE: &str = "global.json";
pub const SIMULATION_FILE: &str = "simulation_parameters.json";
pub const OUTPUT_FILE: &str = "plotting_parameters.json";

/// Distribution of an external drive across nodes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "dist", rename_all = "lowercase")]
pub enum Distribution {
    Uniform { low: f64, high: f64 },
    Normal { mean: f64, std: f64 },
}

impl Distribution {
    pub fn sample(&self, n: usize, rng: &mut Prng) -> Vec<f64> {
        let mut out = vec![0.0; n];
        match *self {
            Distribution::Uniform { low, high } => rng.fill_uniform(&mut out, low, high),
            Distribution::Normal { mean, std } => rng.fill_normal(&mut out, mean, std),
        }
        out
    }

    fn validate(&self, name: &str) -> Result<()> {
        match *self {
            Distribution::Uniform { low, high } if !(low <= high) => Err(SimError::Config(
                format!("{name}: uniform bounds must satisfy low <= high"),
            )),
            Distribution::Normal { std, .. } if !(std >= 0.0) => {
                Err(SimError::Config(format!("{name}: normal std must be >= 0")))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            OneOrMany::One(s) => vec![s.clone()],
            OneOrMany::Many(v) => v.clone(),
        }
    }
}

/// Coupling values to sweep.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepConfig {
    #[serde(rename = "G", default)]
    pub g: Vec<f64>,
    #[serde(rename = "G1", default)]
    pub g1: Vec<f64>,
    #[serde(rename = "G2", default)]
    pub g2: Vec<f64>,
}

/// Which coupling builder a sweep uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepMode {
    Uniform,
    Hemispheric,
}

impl SweepConfig {
    /// Coupling settings in sweep order. Hemispheric runs cover the full
    /// `G1 x G2` grid, `G2` varying fastest.
    pub fn couplings(&self, mode: SweepMode) -> Result<Vec<Coupling>> {
        let out: Vec<Coupling> = match mode {
            SweepMode::Uniform => self.g.iter().map(|&g| Coupling::Uniform(g)).collect(),
            SweepMode::Hemispheric => self
                .g1
                .iter()
                .flat_map(|&g1| self.g2.iter().map(move |&g2| Coupling::Hemispheric { g1, g2 }))
                .collect(),
        };
        if out.is_empty() {
            let keys = match mode {
                SweepMode::Uniform => "G",
                SweepMode::Hemispheric => "G1 and G2",
            };
            return Err(SimError::Config(format!("sweep lists no values for {keys}")));
        }
        Ok(out)
    }
}

/// Model constants, drives and time windows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationParams {
    /// Parcellation scale, part of the connectivity file names.
    #[serde(deserialize_with = "string_or_number")]
    pub scale: String,
    pub group: OneOrMany,

    pub mu: f64,
    pub sigma: f64,
    #[serde(rename = "E0")]
    pub e0: f64,
    #[serde(rename = "I0")]
    pub i0: f64,
    #[serde(rename = "rE")]
    pub r_e: f64,
    #[serde(rename = "rI")]
    pub r_i: f64,
    #[serde(rename = "rhoE")]
    pub rho_e: f64,

    pub a_ee: f64,
    pub a_ei_0: f64,
    pub a_ie: f64,
    pub a_ii: f64,

    pub num_simuls: usize,
    #[serde(rename = "P_init")]
    pub p_init: Distribution,
    #[serde(rename = "Q_init")]
    pub q_init: Distribution,

    #[serde(rename = "tauE")]
    pub tau_e: f64,
    #[serde(rename = "tauI")]
    pub tau_i: f64,
    pub tau_ip: f64,

    /// Sampling step of recorded signals.
    pub dt: f64,
    /// Internal integration step.
    pub dt_sim: f64,
    /// Noise diffusion coefficient.
    #[serde(rename = "D")]
    pub d: f64,
    pub t_trans: f64,
    pub t_stop: f64,

    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_seed() -> u64 {
    1
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Int(i64),
        Float(f64),
    }
    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Int(i) => i.to_string(),
        Raw::Float(f) => f.to_string(),
    })
}

impl SimulationParams {
    pub fn validate(&self) -> Result<()> {
        if !(self.dt_sim > 0.0 && self.dt_sim.is_finite()) {
            return Err(SimError::Config("dt_sim must be finite and > 0".into()));
        }
        if !(self.dt > 0.0 && self.dt.is_finite()) {
            return Err(SimError::Config("dt must be finite and > 0".into()));
        }
        if self.downsample() == 0 {
            return Err(SimError::Config(format!(
                "dt ({}) must be at least dt_sim ({})",
                self.dt, self.dt_sim
            )));
        }
        if !(self.t_stop > 0.0) || !(self.t_trans >= 0.0) {
            return Err(SimError::Config("t_stop must be > 0 and t_trans >= 0".into()));
        }
        if self.sigma == 0.0 {
            return Err(SimError::Config("sigma must be non-zero".into()));
        }
        if self.tau_e == 0.0 || self.tau_i == 0.0 || self.tau_ip == 0.0 {
            return Err(SimError::Config("time constants must be non-zero".into()));
        }
        if self.d < 0.0 {
            return Err(SimError::Config("D must be >= 0".into()));
        }
        if self.groups().is_empty() {
            return Err(SimError::Config("group list is empty".into()));
        }
        self.p_init.validate("P_init")?;
        self.q_init.validate("Q_init")?;
        Ok(())
    }

    pub fn groups(&self) -> Vec<String> {
        self.group.to_vec()
    }

    /// Internal steps per recorded sample, truncated like `int(dt / dt_sim)`.
    pub fn downsample(&self) -> usize {
        let ratio = self.dt / self.dt_sim;
        if ratio.is_finite() && ratio >= 1.0 {
            ratio as usize
        } else {
            0
        }
    }

    /// Noise standard deviation per derivative call.
    pub fn sqdt_d(&self) -> f64 {
        self.d / self.dt_sim.sqrt()
    }

    pub fn model_params(&self) -> ModelParams {
        ModelParams {
            mu: self.mu,
            sigma: self.sigma,
            a_ee: self.a_ee,
            a_ie: self.a_ie,
            a_ii: self.a_ii,
            r_e: self.r_e,
            r_i: self.r_i,
            rho_e: self.rho_e,
            sqdt_d: self.sqdt_d(),
            tau_e: self.tau_e,
            tau_i: self.tau_i,
        }
    }

    pub fn initial_state(&self, n: usize) -> State {
        State::broadcast(n, self.e0, self.i0, self.a_ei_0)
    }

    pub fn transient_grid(&self) -> Result<TimeGrid> {
        TimeGrid::up_to(self.t_trans, self.dt_sim)
    }

    pub fn analysis_grid(&self) -> Result<TimeGrid> {
        TimeGrid::up_to(self.t_stop, self.dt_sim)
    }
}

/// Output toggles. Axis ranges are kept for compatibility with existing files.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputOptions {
    #[serde(default)]
    pub save_figures: bool,
    #[serde(default)]
    pub save_fc_txt: bool,
    #[serde(default)]
    pub save_signals_txt: bool,
    #[serde(default)]
    pub ylim_exc_activity: Option<[f64; 2]>,
    #[serde(default)]
    pub ylim_global: Option<[f64; 2]>,
}

/// The three documents, parsed, plus their raw JSON for the run snapshot.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub sweep: SweepConfig,
    pub sim: SimulationParams,
    pub output: OutputOptions,
    pub raw: RawDocuments,
}

#[derive(Debug, Clone, Serialize)]
pub struct RawDocuments {
    #[serde(rename = "G_params")]
    pub sweep: serde_json::Value,
    #[serde(rename = "plotting_params")]
    pub output: serde_json::Value,
    #[serde(rename = "sim_params")]
    pub sim: serde_json::Value,
}

impl RunConfig {
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let (sweep, raw_sweep) = load_json::<SweepConfig>(&dir.join(SWEEP_FILE))?;
        let (sim, raw_sim) = load_json::<SimulationParams>(&dir.join(SIMULATION_FILE))?;
        let (output, raw_output) = load_json::<OutputOptions>(&dir.join(OUTPUT_FILE))?;
        sim.validate()?;
        Ok(Self {
            sweep,
            sim,
            output,
            raw: RawDocuments {
                sweep: raw_sweep,
                output: raw_output,
                sim: raw_sim,
            },
        })
    }
}

/// Parse a JSON document into `T`, also returning the raw value.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<(T, serde_json::Value)> {
    let text = fs::read_to_string(path).map_err(|e| SimError::io(path, e))?;
    let json_err = |source| SimError::Json {
        path: PathBuf::from(path),
        source,
    };
    let raw: serde_json::Value = serde_json::from_str(&text).map_err(json_err)?;
    let parsed = T::deserialize(&raw).map_err(json_err)?;
    Ok((parsed, raw))
}
