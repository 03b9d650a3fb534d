use ndarray::{Array1, Array2, ArrayView2};
use ndarray_rand::{rand_distr::Normal, RandomExt};
use rand::Rng;

use super::{activations::ActFn, ops};
use crate::error::{NetErr, Result};

/// Fully connected layer.
///
/// Owns its weights (drawn from `N(0, 0.02)`) and zero-initialized biases.
/// Applies dropout and then the activation, defaulting to a leaky ReLU; pass
/// `None` to [`Dense::with_activation`] for a final linear layer.
pub struct Dense {
    weights: Array2<f32>,
    biases: Array1<f32>,
    act_fn: Option<ActFn>,
    keep_prob: f32,
}

impl Dense {
    /// Returns a new `Dense` mapping `dim_in` features to `dim_out`.
    pub fn new(dim_in: usize, dim_out: usize) -> Result<Self> {
        if dim_in == 0 || dim_out == 0 {
            return Err(NetErr::InvalidInput("dense dimensions must be nonzero"));
        }

        // The standard deviation is a constant, so the distribution is valid.
        let init = Normal::new(0.0, 0.02).unwrap();

        Ok(Self {
            weights: Array2::random((dim_in, dim_out), init),
            biases: Array1::zeros(dim_out),
            act_fn: Some(ActFn::lrelu()),
            keep_prob: 1.0,
        })
    }

    /// Sets the activation, `None` meaning a linear output.
    pub fn with_activation(mut self, act_fn: Option<ActFn>) -> Self {
        self.act_fn = act_fn;
        self
    }

    /// Sets the dropout keep probability. `1.0` disables dropout.
    pub fn with_keep_prob(mut self, keep_prob: f32) -> Self {
        self.keep_prob = keep_prob;
        self
    }

    /// Returns the size of this layer.
    ///
    /// # Returns
    /// The amount of parameters this layer has.
    pub fn size(&self) -> usize {
        self.weights.len() + self.biases.len()
    }

    /// Makes a forward pass.
    ///
    /// # Arguments
    /// * `x` - The input batch, shaped `[batch, dim_in]`.
    /// * `rng` - A random number generator, consulted only when dropout is on.
    ///
    /// # Returns
    /// The activated output, shaped `[batch, dim_out]`.
    pub fn forward<R: Rng>(&self, x: ArrayView2<f32>, rng: &mut R) -> Result<Array2<f32>> {
        if x.ncols() != self.weights.nrows() {
            return Err(NetErr::ShapeMismatch {
                what: "dense input features",
                got: x.ncols(),
                expected: self.weights.nrows(),
            });
        }

        let mut out = x.dot(&self.weights) + &self.biases;
        ops::dropout(&mut out, self.keep_prob, rng)?;

        if let Some(act_fn) = self.act_fn {
            out.mapv_inplace(|v| act_fn.f(v));
        }

        Ok(out)
    }
}
