//! Effective coupling matrices built from structural connectivity.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};
use crate::matrix::Matrix;

/// Global coupling setting for one simulation task.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Coupling {
    /// `CM = SC * G`.
    Uniform(f64),
    /// Intra-hemispheric `g1`, inter-hemispheric `g2`.
    Hemispheric { g1: f64, g2: f64 },
}

impl Coupling {
    pub fn build(&self, sc: &Matrix) -> Result<Matrix> {
        match *self {
            Coupling::Uniform(g) => uniform(sc, g),
            Coupling::Hemispheric { g1, g2 } => hemispheric(sc, g1, g2),
        }
    }
}

pub fn uniform(sc: &Matrix, g: f64) -> Result<Matrix> {
    sc.ensure_square("structural connectivity")?;
    Ok(sc.scale(g))
}

/// `CM = kron([[g1, g2], [g2, g1]], ones(N/2, N/2)) ⊙ SC`.
///
/// Nodes `0..N/2` form the first hemisphere. Each entry is `block * sc`, the
/// same product `uniform` computes, so `g1 == g2` reproduces it bit for bit.
pub fn hemispheric(sc: &Matrix, g1: f64, g2: f64) -> Result<Matrix> {
    let n = sc.ensure_square("structural connectivity")?;
    if n % 2 != 0 {
        return Err(SimError::OddNodeCount(n));
    }
    let half = n / 2;
    let mut cm = Matrix::zeros(n, n);
    for i in 0..n {
        for j in 0..n {
            let block = if (i < half) == (j < half) { g1 } else { g2 };
            cm.set(i, j, sc.get(i, j) * block);
        }
    }
    Ok(cm)
}
