//! Scoring simulated connectivity against empirical connectivity.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};
use crate::matrix::Matrix;

/// Similarity of two connectivity matrices over their strictly-lower triangles.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Score {
    /// Sample Pearson correlation. NaN when either triangle has zero variance.
    pub correlation: f64,
    /// Root-mean-square difference.
    pub distance: f64,
}

/// Compare two equal-size square matrices.
///
/// No fallback is substituted for an undefined correlation: a constant
/// triangle divides by zero and yields NaN.
pub fn score(a: &Matrix, b: &Matrix) -> Result<Score> {
    let n = a.ensure_square("score lhs")?;
    let m = b.ensure_square("score rhs")?;
    if n != m {
        return Err(SimError::DimensionMismatch {
            context: "score",
            expected: n,
            actual: m,
        });
    }

    let v1 = a.lower_triangle();
    let v2 = b.lower_triangle();
    Ok(Score {
        correlation: pearson(&v1, &v2),
        distance: rmse(&v1, &v2),
    })
}

pub fn pearson(v1: &[f64], v2: &[f64]) -> f64 {
    let size = v1.len() as f64;
    let m1 = v1.iter().sum::<f64>() / size;
    let m2 = v2.iter().sum::<f64>() / size;

    let mut cov = 0.0;
    let mut var1 = 0.0;
    let mut var2 = 0.0;
    for (x, y) in v1.iter().zip(v2) {
        let d1 = x - m1;
        let d2 = y - m2;
        cov += d1 * d2;
        var1 += d1 * d1;
        var2 += d2 * d2;
    }
    cov / (var1 * var2).sqrt()
}

pub fn rmse(v1: &[f64], v2: &[f64]) -> f64 {
    let sum_sq: f64 = v1.iter().zip(v2).map(|(x, y)| (x - y) * (x - y)).sum();
    (sum_sq / v1.len() as f64).sqrt()
}

/// Pearson correlation between the columns of a time x nodes matrix.
///
/// Entries are clipped to [-1, 1]. A constant column has zero variance and
/// produces NaN in its row and column, diagonal included.
pub fn correlation_matrix(signals: &Matrix) -> Matrix {
    let (t_len, nodes) = (signals.rows(), signals.cols());

    let mut centered = Matrix::zeros(nodes, t_len);
    for c in 0..nodes {
        let col = signals.column(c);
        let mean = col.iter().sum::<f64>() / t_len as f64;
        for (dst, v) in centered.row_mut(c).iter_mut().zip(&col) {
            *dst = v - mean;
        }
    }

    let ddof = (t_len as f64 - 1.0).max(0.0);
    let mut cov = Matrix::zeros(nodes, nodes);
    for i in 0..nodes {
        for j in i..nodes {
            let s: f64 = centered
                .row(i)
                .iter()
                .zip(centered.row(j))
                .map(|(x, y)| x * y)
                .sum();
            let c = s / ddof;
            cov.set(i, j, c);
            cov.set(j, i, c);
        }
    }

    let std: Vec<f64> = (0..nodes).map(|k| cov.get(k, k).sqrt()).collect();
    // Lower triangle is computed, then mirrored, so the result is exactly symmetric.
    let mut corr = Matrix::zeros(nodes, nodes);
    for i in 0..nodes {
        for j in 0..=i {
            let r = (cov.get(i, j) / std[i] / std[j]).clamp(-1.0, 1.0);
            corr.set(i, j, r);
            corr.set(j, i, r);
        }
    }
    corr
}
