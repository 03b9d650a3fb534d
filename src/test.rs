#![cfg(test)]

use std::num::NonZeroUsize;

use ndarray::{Array2, Array3};
use rand::{rngs::StdRng, SeedableRng};

use crate::{
    layers::{activations::ActFn, context_vector, Attention, Dense, Lstm},
    model::{Config, Model, Network},
    Result,
};

/// An in-memory supervised batch.
struct Batch {
    x: Array2<f32>,
    y: Array2<f32>,
}

/// A two-layer network over a `Batch`, wired into the model skeleton.
struct DenseNet {
    hidden: Dense,
    output: Dense,
    rng: StdRng,
}

impl DenseNet {
    fn new(dim_in: usize, dim_hidden: usize, dim_out: usize) -> Result<Self> {
        Ok(Self {
            hidden: Dense::new(dim_in, dim_hidden)?,
            output: Dense::new(dim_hidden, dim_out)?.with_activation(Some(ActFn::Sigmoid)),
            rng: StdRng::seed_from_u64(7),
        })
    }

    fn forward(&mut self, x: &Array2<f32>) -> Result<Array2<f32>> {
        let h = self.hidden.forward(x.view(), &mut self.rng)?;
        self.output.forward(h.view(), &mut self.rng)
    }
}

impl Network for DenseNet {
    type Data = Batch;
    type Prediction = Array2<f32>;
    type Loss = f32;
    type Metric = f32;
    type Optimize = f32;

    fn build_prediction(&mut self, cfg: &Config<Batch>) -> Result<Array2<f32>> {
        self.forward(&cfg.data().x)
    }

    fn build_loss(&mut self, cfg: &Config<Batch>) -> Result<f32> {
        let y_pred = self.forward(&cfg.data().x)?;
        let diff = &y_pred - &cfg.data().y;
        Ok(diff.mapv(|v| v.powi(2)).mean().unwrap_or_default())
    }

    fn build_metric(&mut self, cfg: &Config<Batch>) -> Result<f32> {
        let y_pred = self.forward(&cfg.data().x)?;
        let hits = y_pred
            .iter()
            .zip(cfg.data().y.iter())
            .filter(|&(p, y)| (p.round() - y).abs() < 0.5)
            .count();
        Ok(hits as f32 / y_pred.len() as f32)
    }

    fn build_optimize(&mut self, cfg: &Config<Batch>) -> Result<f32> {
        let loss = self.build_loss(cfg)?;
        Ok(cfg.learning_rate() * loss)
    }
}

fn xor_batch() -> Batch {
    let x = Array2::from_shape_vec((4, 2), vec![0., 0., 0., 1., 1., 0., 1., 1.]).unwrap();
    let y = Array2::from_shape_vec((4, 1), vec![0., 1., 1., 0.]).unwrap();
    Batch { x, y }
}

#[test]
fn test_model_memoizes_network_outputs() {
    let _ = env_logger::builder().is_test(true).try_init();

    let net = DenseNet::new(2, 4, 1).unwrap();
    let cfg = Config::new(xor_batch(), NonZeroUsize::new(4).unwrap()).with_learning_rate(0.1);
    let mut model = Model::new(net, cfg);

    let first = model.prediction().unwrap().clone();
    assert_eq!(first.dim(), (4, 1));

    // Same cached array on every later read.
    let second = model.prediction().unwrap().clone();
    assert_eq!(first, second);

    let loss = *model.loss().unwrap();
    assert!(loss.is_finite() && loss >= 0.0);
    assert_eq!(*model.loss().unwrap(), loss);

    let metric = *model.metric().unwrap();
    assert!((0.0..=1.0).contains(&metric));

    let update = *model.optimize().unwrap();
    assert!((update - 0.1 * loss).abs() < 1e-6);
}

#[test]
fn test_training_loop_drives_global_step() {
    let net = DenseNet::new(2, 4, 1).unwrap();
    let cfg = Config::new(xor_batch(), NonZeroUsize::new(4).unwrap());
    let mut model = Model::new(net, cfg);

    for expected in 1..=5 {
        model.optimize().unwrap();
        assert_eq!(model.step(), expected);
    }
    assert_eq!(model.global_step(), 5);
}

#[test]
fn test_recurrent_attention_pipeline() {
    let mut rng = StdRng::seed_from_u64(11);

    let x = Array3::from_shape_fn((2, 5, 3), |(b, t, f)| {
        ((b + t + f) as f32 * 0.3).sin()
    });
    let seq_len = [5, 3];

    let lstm = Lstm::new(3, 8, 2, 1.0, true).unwrap();
    let outputs = lstm.run(x.view(), &seq_len, &mut rng).unwrap();
    assert_eq!(outputs.dim(), (2, 5, 8));

    let attention = Attention::new(8).unwrap();
    let scores = attention.scores(outputs.view()).unwrap();
    assert_eq!(scores.dim(), (2, 5));

    let context = context_vector(outputs.view(), scores.view()).unwrap();
    assert_eq!(context.dim(), (2, 8));
    assert!(context.iter().all(|v| v.is_finite()));
}
