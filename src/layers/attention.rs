use ndarray::{s, Array1, Array2, ArrayView2, ArrayView3};
use ndarray_rand::{rand_distr::Normal, RandomExt};

use super::activations::softmax;
use crate::error::{NetErr, Result};

/// Luong attention over a batch of source hidden states.
///
/// Owns a weight vector and a target hidden state, both randomly initialized
/// when not supplied; scores weigh each time step of the source against the
/// target.
pub struct Attention {
    weights: Array1<f32>,
    target: Array1<f32>,
}

impl Attention {
    /// Returns a new `Attention` with a randomly initialized target hidden
    /// state.
    ///
    /// # Arguments
    /// * `dim` - Size of the source (and target) hidden states.
    pub fn new(dim: usize) -> Result<Self> {
        if dim == 0 {
            return Err(NetErr::InvalidInput("attention dimension must be nonzero"));
        }

        let init = Normal::new(0.0, 1.0).unwrap();
        Ok(Self {
            weights: Array1::random(dim, init),
            target: Array1::random(dim, init),
        })
    }

    /// Returns a new `Attention` scoring against a given target hidden
    /// state.
    pub fn with_target(target: Array1<f32>) -> Result<Self> {
        if target.is_empty() {
            return Err(NetErr::InvalidInput("attention target must be nonempty"));
        }

        let init = Normal::new(0.0, 1.0).unwrap();
        Ok(Self {
            weights: Array1::random(target.len(), init),
            target,
        })
    }

    /// Computes softmaxed attention weights over the time axis.
    ///
    /// # Arguments
    /// * `source` - Source hidden states, shaped `[batch, time, dim]`.
    ///
    /// # Returns
    /// Attention weights shaped `[batch, time]`, each row summing to one.
    pub fn scores(&self, source: ArrayView3<f32>) -> Result<Array2<f32>> {
        let (batch, time, dim) = source.dim();

        if dim != self.weights.len() {
            return Err(NetErr::ShapeMismatch {
                what: "attention source features",
                got: dim,
                expected: self.weights.len(),
            });
        }
        if time == 0 {
            return Err(NetErr::InvalidInput("attention needs at least one time step"));
        }

        let mut score = Array2::zeros((batch, time));
        for bi in 0..batch {
            for t in 0..time {
                let hidden = source.slice(s![bi, t, ..]);
                score[[bi, t]] = (&hidden * &self.weights).dot(&self.target);
            }
        }

        Ok(softmax(score.view()))
    }
}

/// Reduces source hidden states into one context vector per batch row, each
/// time step weighed by its attention score.
///
/// # Arguments
/// * `source` - Source hidden states, shaped `[batch, time, dim]`.
/// * `scores` - Attention weights, shaped `[batch, time]`.
///
/// # Returns
/// Context vectors shaped `[batch, dim]`.
pub fn context_vector(source: ArrayView3<f32>, scores: ArrayView2<f32>) -> Result<Array2<f32>> {
    let (batch, time, dim) = source.dim();

    if scores.nrows() != batch {
        return Err(NetErr::ShapeMismatch {
            what: "attention score rows",
            got: scores.nrows(),
            expected: batch,
        });
    }
    if scores.ncols() != time {
        return Err(NetErr::ShapeMismatch {
            what: "attention score columns",
            got: scores.ncols(),
            expected: time,
        });
    }

    let mut context = Array2::zeros((batch, dim));
    for bi in 0..batch {
        for t in 0..time {
            context
                .row_mut(bi)
                .scaled_add(scores[[bi, t]], &source.slice(s![bi, t, ..]));
        }
    }

    Ok(context)
}
