//! Structural and empirical functional connectivity on disk.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Result, SimError};
use crate::matrix::Matrix;

/// SC (normalized to a unit maximum) and empirical FC for one group.
#[derive(Debug, Clone)]
pub struct Connectome {
    pub group: String,
    pub sc: Matrix,
    pub fc_emp: Matrix,
}

impl Connectome {
    pub fn node_count(&self) -> usize {
        self.sc.rows()
    }

    /// Check both matrices are square and the same size.
    pub fn new(group: impl Into<String>, sc: Matrix, fc_emp: Matrix) -> Result<Self> {
        let n = sc.ensure_square("structural connectivity")?;
        let m = fc_emp.ensure_square("empirical functional connectivity")?;
        if n != m {
            return Err(SimError::DimensionMismatch {
                context: "SC vs empirical FC",
                expected: n,
                actual: m,
            });
        }
        Ok(Self {
            group: group.into(),
            sc,
            fc_emp,
        })
    }
}

/// Where the `avg_sc_*`/`avg_fc_*` files live.
#[derive(Debug, Clone)]
pub struct ConnectivityStore {
    base: PathBuf,
}

impl ConnectivityStore {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn sc_path(&self, group: &str, scale: &str) -> PathBuf {
        self.base.join(format!("avg_sc_{group}_{scale}.csv"))
    }

    pub fn fc_path(&self, group: &str, scale: &str) -> PathBuf {
        self.base.join(format!("avg_fc_{group}_{scale}.csv"))
    }

    pub fn load(&self, group: &str, scale: &str) -> Result<Connectome> {
        let sc = normalize_by_max(read_matrix(&self.sc_path(group, scale))?);
        let fc = read_matrix(&self.fc_path(group, scale))?;
        let connectome = Connectome::new(group, sc, fc)?;
        debug!(
            group,
            scale,
            nodes = connectome.node_count(),
            "loaded connectivity"
        );
        Ok(connectome)
    }
}

/// Divide every entry by the largest one. A NaN entry turns the whole matrix NaN.
pub fn normalize_by_max(m: Matrix) -> Matrix {
    let max = m.max();
    m.scale(1.0 / max)
}

/// Read a comma-delimited numeric matrix. Blank lines are skipped.
pub fn read_matrix(path: &Path) -> Result<Matrix> {
    let text = fs::read_to_string(path).map_err(|e| SimError::io(path, e))?;
    parse_matrix(&text, path)
}

fn parse_matrix(text: &str, path: &Path) -> Result<Matrix> {
    let mut rows: Vec<Vec<f64>> = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut row = Vec::new();
        for field in line.split(',') {
            let field = field.trim();
            let v = field.parse::<f64>().map_err(|e| SimError::Parse {
                path: path.to_path_buf(),
                line: idx + 1,
                message: format!("{field:?}: {e}"),
            })?;
            row.push(v);
        }
        if let Some(first) = rows.first() {
            if first.len() != row.len() {
                return Err(SimError::Parse {
                    path: path.to_path_buf(),
                    line: idx + 1,
                    message: format!("expected {} columns, found {}", first.len(), row.len()),
                });
            }
        }
        rows.push(row);
    }
    Matrix::from_rows(&rows)
}
