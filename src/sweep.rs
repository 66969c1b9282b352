//! Parameter sweep: groups x replicas x coupling values.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::config::{RunConfig, SimulationParams, SweepMode};
use crate::connectivity::{Connectome, ConnectivityStore};
use crate::coupling::Coupling;
use crate::dynamics::{ExecutionTier, Network};
use crate::error::{Result, SimError};
use crate::integrator::Integrator;
use crate::matrix::Matrix;
use crate::metrics::{correlation_matrix, score, Score};
use crate::observer::{StabilityReport, TrajectoryObserver};
use crate::output::{
    progress_message, timestamp, write_snapshot, ArtifactDir, ResultRow, ResultSink, ResultTable,
    RunLog, RESULTS_FILE,
};
use crate::prng::Prng;

/// Everything one simulation produces.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub score: Score,
    /// Simulated FC, nodes x nodes.
    pub fc: Matrix,
    /// Raw excitatory activity, time x nodes.
    pub e_t: Matrix,
    /// Band-limited amplitude envelope, time x nodes.
    pub envelope: Matrix,
    pub stability: StabilityReport,
}

/// Run one simulation and score it against the group's empirical FC.
///
/// Draws `P` then `Q` from `rng`; the same generator then drives the noise of
/// the transient and analysis runs.
pub fn run_task(
    connectome: &Connectome,
    sim: &SimulationParams,
    coupling: Coupling,
    tier: ExecutionTier,
    rng: &mut Prng,
) -> Result<TaskOutcome> {
    let n = connectome.node_count();
    let p = sim.p_init.sample(n, rng);
    let q = sim.q_init.sample(n, rng);
    let cm = coupling.build(&connectome.sc)?;
    let params = sim.model_params();

    let net = Network::new(&cm, &p, &q)?;
    let integ = Integrator::new(net, &params, sim.dt_sim, sim.downsample())?.with_tier(tier);
    let (_, traj) = integ.run_with_transient(
        &sim.transient_grid()?,
        &sim.analysis_grid()?,
        sim.initial_state(n),
        sim.tau_ip,
        rng,
    )?;

    let e_t = traj.excitatory();
    let (_, envelope) = crate::signal::filter_and_envelope(&e_t, sim.dt)?;
    let fc = correlation_matrix(&envelope);
    let score = score(&fc, &connectome.fc_emp)?;
    let stability = TrajectoryObserver::new(&traj).report_with_fc(&fc);

    Ok(TaskOutcome {
        score,
        fc,
        e_t,
        envelope,
        stability,
    })
}

/// A configured sweep over every group, replica and coupling value.
pub struct Sweep<'a> {
    config: &'a RunConfig,
    store: ConnectivityStore,
    results_root: PathBuf,
    mode: SweepMode,
    tier: ExecutionTier,
}

impl<'a> Sweep<'a> {
    pub fn new(
        config: &'a RunConfig,
        data_dir: impl Into<PathBuf>,
        results_root: impl Into<PathBuf>,
        mode: SweepMode,
    ) -> Self {
        Self {
            config,
            store: ConnectivityStore::new(data_dir),
            results_root: results_root.into(),
            mode,
            tier: ExecutionTier::Scalar,
        }
    }

    pub fn with_tier(mut self, tier: ExecutionTier) -> Self {
        self.tier = tier;
        self
    }

    pub fn results_root(&self) -> &Path {
        &self.results_root
    }

    /// Create the results directory, snapshot the configuration and run every
    /// task, appending to `corr_dist_results.txt`. Returns the rows written.
    pub fn run(&self) -> Result<Vec<ResultRow>> {
        fs::create_dir_all(&self.results_root).map_err(|e| SimError::io(&self.results_root, e))?;
        let stamp = timestamp();
        let log = write_snapshot(&self.results_root, &stamp, &self.config.raw)?;
        let mut table = ResultTable::open(
            self.results_root.join(RESULTS_FILE),
            self.mode == SweepMode::Hemispheric,
        )?;
        info!("Results directory: {:?}", self.results_root);

        let mut rows = Vec::new();
        self.run_into(&mut RowTee(&mut table, &mut rows), &log)?;
        Ok(rows)
    }

    /// Run every task, sending rows to `sink` and progress lines to `log`.
    pub fn run_into(&self, sink: &mut dyn ResultSink, log: &RunLog) -> Result<()> {
        let sim = &self.config.sim;
        let output = &self.config.output;
        let couplings = self.config.sweep.couplings(self.mode)?;

        if output.save_figures {
            warn!("save_figures is set but figure rendering is not available; skipping");
        }

        for (gi, group) in sim.groups().iter().enumerate() {
            let connectome = self.store.load(group, &sim.scale)?;
            if self.mode == SweepMode::Hemispheric && connectome.node_count() % 2 != 0 {
                return Err(SimError::OddNodeCount(connectome.node_count()));
            }
            info!(
                "Group {}: {} nodes, {} coupling values, {} replicas",
                group,
                connectome.node_count(),
                couplings.len(),
                sim.num_simuls
            );

            for replica in 1..=sim.num_simuls {
                let artifacts = ArtifactDir::create(&self.results_root, group, replica)?;

                for (ci, &coupling) in couplings.iter().enumerate() {
                    let mut rng = Prng::for_task(sim.seed, gi, ci, replica);
                    let outcome = run_task(&connectome, sim, coupling, self.tier, &mut rng)?;

                    if outcome.stability.is_unstable() {
                        warn!(
                            group = group.as_str(),
                            replica,
                            coupling = ?coupling,
                            non_finite = outcome.stability.non_finite_values,
                            first_sample = ?outcome.stability.first_non_finite_sample,
                            non_finite_fc = outcome.stability.non_finite_fc_entries,
                            max_abs_e = outcome.stability.max_abs_excitatory,
                            "simulation produced non-finite values"
                        );
                    }

                    sink.append(&ResultRow {
                        group: group.clone(),
                        coupling,
                        replica,
                        score: outcome.score,
                    })?;

                    if output.save_fc_txt {
                        artifacts.write_fc(&coupling, &outcome.fc)?;
                    }
                    if output.save_signals_txt {
                        artifacts.write_signals(&coupling, &outcome.e_t, &outcome.envelope)?;
                    }

                    let message = progress_message(group, &coupling, replica);
                    log.append(&message)?;
                    info!("{}", message);
                }
            }
        }
        Ok(())
    }
}

// Writes each row to the table and keeps a copy.
struct RowTee<'s>(&'s mut ResultTable, &'s mut Vec<ResultRow>);

impl ResultSink for RowTee<'_> {
    fn append(&mut self, row: &ResultRow) -> Result<()> {
        self.0.append(row)?;
        self.1.push(row.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::sim_params;
    use crate::config::{Distribution, OneOrMany, OutputOptions, RawDocuments, SweepConfig};
    use crate::signal::filter_and_envelope;

    fn quick_params() -> SimulationParams {
        let mut p = sim_params();
        p.group = OneOrMany::One("ctrl".into());
        p.num_simuls = 2;
        p.dt = 0.01;
        p.dt_sim = 0.001;
        p.t_trans = 0.1;
        p.t_stop = 2.0;
        p
    }

    fn pair() -> Connectome {
        let sc = Matrix::from_rows(&[vec![0.0, 1.0], vec![1.0, 0.0]]).unwrap();
        let fc = Matrix::from_rows(&[vec![1.0, 0.3], vec![0.3, 1.0]]).unwrap();
        Connectome::new("ctrl", sc, fc).unwrap()
    }

    #[test]
    fn uncoupled_noiseless_pair() {
        let mut sim = quick_params();
        sim.d = 0.0;
        let connectome = pair();
        let coupling = Coupling::Uniform(0.0);

        let cm = coupling.build(&connectome.sc).unwrap();
        assert!(cm.as_slice().iter().all(|&v| v == 0.0));

        let outcome = run_task(
            &connectome,
            &sim,
            coupling,
            ExecutionTier::Scalar,
            &mut Prng::for_task(1, 0, 0, 1),
        )
        .unwrap();
        assert_eq!(outcome.fc.rows(), 2);
        assert_eq!(outcome.e_t.cols(), 2);
        assert_eq!(outcome.e_t.rows(), outcome.envelope.rows());
        assert_eq!(outcome.stability.samples, outcome.e_t.rows());
        assert_eq!(outcome.stability.non_finite_values, 0);

        assert_eq!(outcome.fc.get(0, 1).to_bits(), outcome.fc.get(1, 0).to_bits());
        for &v in outcome.fc.as_slice() {
            assert!(v.is_nan() || (-1.0..=1.0).contains(&v));
        }
    }

    #[test]
    fn uncoupled_nodes_evolve_independently_through_the_pipeline() {
        let mut sim = quick_params();
        sim.d = 0.0;
        let connectome = pair();
        let cm = Coupling::Uniform(0.0).build(&connectome.sc).unwrap();
        let params = sim.model_params();
        let q = [0.0, 0.0];

        let envelope_for = |p: [f64; 2]| {
            let net = Network::new(&cm, &p, &q).unwrap();
            let integ = Integrator::new(net, &params, sim.dt_sim, sim.downsample()).unwrap();
            let (_, traj) = integ
                .run_with_transient(
                    &sim.transient_grid().unwrap(),
                    &sim.analysis_grid().unwrap(),
                    sim.initial_state(2),
                    sim.tau_ip,
                    &mut Prng::new(9),
                )
                .unwrap();
            let (_, env) = filter_and_envelope(&traj.excitatory(), sim.dt).unwrap();
            env
        };

        let a = envelope_for([0.4, 0.45]);
        let b = envelope_for([0.4, 0.3]);
        assert_eq!(a.column(0), b.column(0));
        assert_ne!(a.column(1), b.column(1));
    }

    #[test]
    fn same_task_coordinates_reproduce_the_result() {
        let sim = quick_params();
        let connectome = pair();
        let run = |replica| {
            run_task(
                &connectome,
                &sim,
                Coupling::Uniform(0.2),
                ExecutionTier::Scalar,
                &mut Prng::for_task(sim.seed, 0, 0, replica),
            )
            .unwrap()
        };

        let first = run(1);
        let again = run(1);
        assert_eq!(first.e_t, again.e_t);
        assert_eq!(
            first.score.distance.to_bits(),
            again.score.distance.to_bits()
        );

        let other = run(2);
        assert_ne!(first.e_t, other.e_t);
    }

    #[test]
    fn replicas_draw_different_drives() {
        let sim = quick_params();
        let draw = |replica| {
            let mut rng = Prng::for_task(sim.seed, 0, 0, replica);
            sim.p_init.sample(4, &mut rng)
        };
        assert_ne!(draw(1), draw(2));
        assert_eq!(draw(3), draw(3));
    }

    fn write_inputs(data: &Path) {
        let store = ConnectivityStore::new(data);
        fs::write(store.sc_path("ctrl", "1"), "0,2,1,0\n2,0,0,1\n1,0,0,2\n0,1,2,0\n").unwrap();
        fs::write(
            store.fc_path("ctrl", "1"),
            "1,0.4,0.1,0.0\n0.4,1,0.0,0.1\n0.1,0.0,1,0.4\n0.0,0.1,0.4,1\n",
        )
        .unwrap();
    }

    fn run_config(sweep: SweepConfig, output: OutputOptions) -> RunConfig {
        let sim = quick_params();
        RunConfig {
            raw: RawDocuments {
                sweep: serde_json::to_value(&sweep).unwrap(),
                output: serde_json::to_value(&output).unwrap(),
                sim: serde_json::to_value(&sim).unwrap(),
            },
            sweep,
            sim,
            output,
        }
    }

    #[test]
    fn uniform_sweep_writes_table_log_and_artifacts() {
        let data = tempfile::tempdir().unwrap();
        let results = tempfile::tempdir().unwrap();
        write_inputs(data.path());

        let sweep = SweepConfig {
            g: vec![0.0, 0.5],
            ..SweepConfig::default()
        };
        let output = OutputOptions {
            save_fc_txt: true,
            save_signals_txt: true,
            ..OutputOptions::default()
        };
        let cfg = run_config(sweep, output);
        let root = results.path().join("out");

        let rows = Sweep::new(&cfg, data.path(), &root, SweepMode::Uniform)
            .run()
            .unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].replica, 1);
        assert_eq!(rows[1].coupling, Coupling::Uniform(0.5));
        assert_eq!(rows[2].replica, 2);

        let table = fs::read_to_string(root.join(RESULTS_FILE)).unwrap();
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "group,G,simulation,correlation,distance");
        assert!(lines[2].starts_with("ctrl,0.5000,1,"));

        assert!(root.join("ctrl/sim_2/FC_G0.50_sim2_ctrl.txt").exists());
        assert!(root.join("ctrl/sim_1/envelope_G_0.00_sim1_ctrl.txt").exists());

        let mut snapshots = 0;
        let mut log_lines = 0;
        for entry in fs::read_dir(&root).unwrap() {
            let name = entry.unwrap().file_name().into_string().unwrap();
            if name.starts_with("used_configs_") {
                snapshots += 1;
            }
            if name.starts_with("log_") {
                log_lines += fs::read_to_string(root.join(&name)).unwrap().lines().count();
            }
        }
        assert_eq!(snapshots, 1);
        assert_eq!(log_lines, 4);
    }

    #[test]
    fn hemispheric_sweep_covers_grid() {
        let data = tempfile::tempdir().unwrap();
        write_inputs(data.path());
        let sweep = SweepConfig {
            g1: vec![0.2, 0.4],
            g2: vec![0.1],
            ..SweepConfig::default()
        };
        let mut cfg = run_config(sweep, OutputOptions::default());
        cfg.sim.num_simuls = 1;
        cfg.sim.p_init = Distribution::Uniform { low: 0.4, high: 0.45 };

        let mut rows: Vec<ResultRow> = Vec::new();
        let log_dir = tempfile::tempdir().unwrap();
        let log = RunLog::new(log_dir.path().join("log.txt"));
        Sweep::new(&cfg, data.path(), log_dir.path(), SweepMode::Hemispheric)
            .run_into(&mut rows, &log)
            .unwrap();

        assert_eq!(
            rows.iter().map(|r| r.coupling).collect::<Vec<_>>(),
            vec![
                Coupling::Hemispheric { g1: 0.2, g2: 0.1 },
                Coupling::Hemispheric { g1: 0.4, g2: 0.1 },
            ]
        );
        let text = fs::read_to_string(log.path()).unwrap();
        assert!(text.starts_with("[INFO] Done hemispheric model with (G1,G2) = (0.20,0.10)"));
    }

    #[test]
    fn missing_connectivity_is_an_io_error() {
        let data = tempfile::tempdir().unwrap();
        let cfg = run_config(
            SweepConfig {
                g: vec![0.1],
                ..SweepConfig::default()
            },
            OutputOptions::default(),
        );
        let log = RunLog::new(data.path().join("log.txt"));
        let err = Sweep::new(&cfg, data.path(), data.path(), SweepMode::Uniform)
            .run_into(&mut Vec::<ResultRow>::new(), &log)
            .unwrap_err();
        assert!(matches!(err, SimError::Io { .. }));
    }
}
