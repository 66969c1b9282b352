//! Result table, progress log, config snapshot and per-task artifacts.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::coupling::Coupling;
use crate::error::{Result, SimError};
use crate::matrix::Matrix;
use crate::metrics::Score;

pub const RESULTS_FILE: &str = "corr_dist_results.txt";

/// One completed simulation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRow {
    pub group: String,
    pub coupling: Coupling,
    /// 1-based replica index.
    pub replica: usize,
    pub score: Score,
}

impl ResultRow {
    pub fn to_line(&self) -> String {
        format!(
            "{},{},{},{},{}",
            self.group,
            coupling_columns(&self.coupling),
            self.replica,
            fixed(self.score.correlation, 6),
            fixed(self.score.distance, 6)
        )
    }
}

/// `%.<prec>f`, with `nan`/`inf` spelled the way numeric text tools expect.
pub fn fixed(v: f64, prec: usize) -> String {
    if v.is_nan() {
        "nan".to_string()
    } else if v.is_infinite() {
        if v > 0.0 { "inf" } else { "-inf" }.to_string()
    } else {
        format!("{v:.prec$}")
    }
}

pub fn header(hemispheric: bool) -> &'static str {
    if hemispheric {
        "group,G1,G2,simulation,correlation,distance"
    } else {
        "group,G,simulation,correlation,distance"
    }
}

fn coupling_columns(c: &Coupling) -> String {
    match *c {
        Coupling::Uniform(g) => fixed(g, 4),
        Coupling::Hemispheric { g1, g2 } => format!("{},{}", fixed(g1, 4), fixed(g2, 4)),
    }
}

/// Short coupling label used in artifact names, e.g. `G0.50` or `G1_1.00_G2_0.10`.
pub fn coupling_tag(c: &Coupling) -> String {
    match *c {
        Coupling::Uniform(g) => format!("G{}", fixed(g, 2)),
        Coupling::Hemispheric { g1, g2 } => format!("G1_{}_G2_{}", fixed(g1, 2), fixed(g2, 2)),
    }
}

/// Destination for result rows.
pub trait ResultSink {
    fn append(&mut self, row: &ResultRow) -> Result<()>;
}

impl ResultSink for Vec<ResultRow> {
    fn append(&mut self, row: &ResultRow) -> Result<()> {
        self.push(row.clone());
        Ok(())
    }
}

/// Append-only CSV result table. The header is written only for a new file.
pub struct ResultTable {
    path: PathBuf,
    out: BufWriter<File>,
}

impl ResultTable {
    pub fn open(path: impl Into<PathBuf>, hemispheric: bool) -> Result<Self> {
        let path = path.into();
        let exists = path.exists();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| SimError::io(&path, e))?;
        let mut table = Self {
            out: BufWriter::new(file),
            path,
        };
        if !exists {
            table.write_line(header(hemispheric))?;
        }
        Ok(table)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_line(&mut self, line: &str) -> Result<()> {
        writeln!(self.out, "{line}")
            .and_then(|_| self.out.flush())
            .map_err(|e| SimError::io(&self.path, e))
    }
}

impl ResultSink for ResultTable {
    fn append(&mut self, row: &ResultRow) -> Result<()> {
        let line = row.to_line();
        self.write_line(&line)
    }
}

/// Plain-text progress log, one line per completed task.
pub struct RunLog {
    path: PathBuf,
}

impl RunLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, message: &str) -> Result<()> {
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| SimError::io(&self.path, e))?;
        writeln!(f, "{message}").map_err(|e| SimError::io(&self.path, e))
    }
}

pub fn progress_message(group: &str, coupling: &Coupling, replica: usize) -> String {
    match *coupling {
        Coupling::Uniform(g) => format!(
            "[INFO] Done global model with G = {} for group = {group}, sim = {replica}",
            fixed(g, 2)
        ),
        Coupling::Hemispheric { g1, g2 } => format!(
            "[INFO] Done hemispheric model with (G1,G2) = ({},{}) for group = {group}, sim = {replica}",
            fixed(g1, 2),
            fixed(g2, 2)
        ),
    }
}

/// Timestamp used in snapshot and log names.
pub fn timestamp() -> String {
    chrono::Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Write `used_configs_<stamp>.json` and return the matching log path.
pub fn write_snapshot<T: Serialize>(results_root: &Path, stamp: &str, docs: &T) -> Result<RunLog> {
    let config_file = results_root.join(format!("used_configs_{stamp}.json"));
    let text = serde_json::to_string_pretty(docs).map_err(|source| SimError::Json {
        path: config_file.clone(),
        source,
    })?;
    fs::write(&config_file, text).map_err(|e| SimError::io(&config_file, e))?;
    Ok(RunLog::new(results_root.join(format!("log_{stamp}.txt"))))
}

/// Write a matrix as comma-delimited `%.6f` text.
pub fn write_matrix_txt(path: &Path, m: &Matrix) -> Result<()> {
    let file = File::create(path).map_err(|e| SimError::io(path, e))?;
    let mut out = BufWriter::new(file);
    for r in 0..m.rows() {
        let line = m
            .row(r)
            .iter()
            .map(|&v| fixed(v, 6))
            .collect::<Vec<_>>()
            .join(",");
        writeln!(out, "{line}").map_err(|e| SimError::io(path, e))?;
    }
    out.flush().map_err(|e| SimError::io(path, e))
}

/// Per-replica artifact folder, `<root>/<group>/sim_<replica>/`.
pub struct ArtifactDir {
    dir: PathBuf,
    group: String,
    replica: usize,
}

impl ArtifactDir {
    pub fn create(results_root: &Path, group: &str, replica: usize) -> Result<Self> {
        let dir = results_root.join(group).join(format!("sim_{replica}"));
        fs::create_dir_all(&dir).map_err(|e| SimError::io(&dir, e))?;
        Ok(Self {
            dir,
            group: group.to_string(),
            replica,
        })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn fc_path(&self, coupling: &Coupling) -> PathBuf {
        self.dir.join(format!(
            "FC_{}_sim{}_{}.txt",
            coupling_tag(coupling),
            self.replica,
            self.group
        ))
    }

    pub fn signal_path(&self, kind: &str, coupling: &Coupling) -> PathBuf {
        self.dir.join(format!(
            "{kind}_{}_sim{}_{}.txt",
            signal_tag(coupling),
            self.replica,
            self.group
        ))
    }

    pub fn write_fc(&self, coupling: &Coupling, fc: &Matrix) -> Result<()> {
        write_matrix_txt(&self.fc_path(coupling), fc)
    }

    pub fn write_signals(&self, coupling: &Coupling, e_t: &Matrix, envelope: &Matrix) -> Result<()> {
        write_matrix_txt(&self.signal_path("E_t", coupling), e_t)?;
        write_matrix_txt(&self.signal_path("envelope", coupling), envelope)
    }
}

// Signal files separate the "G" from its value: `E_t_G_0.50_...`.
fn signal_tag(c: &Coupling) -> String {
    match *c {
        Coupling::Uniform(g) => format!("G_{}", fixed(g, 2)),
        Coupling::Hemispheric { .. } => coupling_tag(c),
    }
}
