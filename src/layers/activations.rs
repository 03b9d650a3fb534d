use ndarray::{Array2, ArrayView2, Axis};

/// Element-wise activations applied by the layer builders.
#[derive(Clone, Copy, Debug)]
pub enum ActFn {
    Sigmoid,
    LeakyRelu { alpha: f32 },
}

impl ActFn {
    /// Returns a leaky ReLU with the default slope of `0.1`.
    pub fn lrelu() -> Self {
        ActFn::LeakyRelu { alpha: 0.1 }
    }

    pub fn f(&self, x: f32) -> f32 {
        match *self {
            ActFn::Sigmoid => sigmoid(x),
            ActFn::LeakyRelu { alpha } => lrelu(x, alpha),
        }
    }
}

/// Logistic sigmoid.
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Leaky ReLU: `x` for positive inputs, `alpha * x` for negative ones.
pub fn lrelu(x: f32, alpha: f32) -> f32 {
    let linear = 0.5 * (x + x.abs());
    let leaky = 0.5 * alpha * (x - x.abs());
    linear + leaky
}

/// Row-wise softmax, stabilized by shifting each row by its maximum.
pub fn softmax(x: ArrayView2<f32>) -> Array2<f32> {
    let mut out = x.to_owned();

    for mut row in out.axis_iter_mut(Axis(0)) {
        let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        if sum > 0.0 {
            row.mapv_inplace(|v| v / sum);
        }
    }

    out
}

#[cfg(test)]
mod test {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_lrelu_passes_positives_and_damps_negatives() {
        assert_eq!(lrelu(2.0, 0.1), 2.0);
        assert!((lrelu(-2.0, 0.1) - -0.2).abs() < 1e-6);
        assert_eq!(lrelu(0.0, 0.1), 0.0);
    }

    #[test]
    fn test_sigmoid_is_centered_and_bounded() {
        assert_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(10.0) > 0.99);
        assert!(sigmoid(-10.0) < 0.01);
    }

    #[test]
    fn test_act_fn_dispatch() {
        assert_eq!(ActFn::lrelu().f(-1.0), -0.1);
        assert_eq!(ActFn::Sigmoid.f(0.0), 0.5);
    }

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let x = array![[1.0, 2.0, 3.0], [0.0, 0.0, 0.0]];
        let s = softmax(x.view());

        for row in s.axis_iter(Axis(0)) {
            assert!((row.sum() - 1.0).abs() < 1e-6);
        }

        // Larger logits get larger weights.
        assert!(s[[0, 2]] > s[[0, 1]] && s[[0, 1]] > s[[0, 0]]);
        // Uniform logits give uniform weights.
        assert!((s[[1, 0]] - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_softmax_survives_large_logits() {
        let x = array![[1000.0, 1000.0, 999.0]];
        let s = softmax(x.view());

        assert!(s.iter().all(|v| v.is_finite()));
        assert!((s.sum() - 1.0).abs() < 1e-6);
    }
}
