use std::num::NonZeroUsize;

use log::debug;

use crate::{error::Result, memo::Memo};

/// Configuration fixed at model construction and read-only afterwards.
pub struct Config<D> {
    data: D,
    batch_size: NonZeroUsize,
    testing: bool,
    learning_rate: f32,
}

impl<D> Config<D> {
    /// Returns a new `Config` with a learning rate of `1e-4` and the testing
    /// flag off.
    ///
    /// # Arguments
    /// * `data` - The handle to the model's input data.
    /// * `batch_size` - The size of each batch.
    pub fn new(data: D, batch_size: NonZeroUsize) -> Self {
        Self {
            data,
            batch_size,
            testing: false,
            learning_rate: 1e-4,
        }
    }

    /// Sets the testing flag.
    pub fn with_testing(mut self, testing: bool) -> Self {
        self.testing = testing;
        self
    }

    /// Sets the learning rate.
    pub fn with_learning_rate(mut self, learning_rate: f32) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    /// Returns the data handle.
    pub fn data(&self) -> &D {
        &self.data
    }

    /// Returns the batch size.
    pub fn batch_size(&self) -> NonZeroUsize {
        self.batch_size
    }

    /// Returns `true` when the model runs in testing mode.
    pub fn testing(&self) -> bool {
        self.testing
    }

    /// Returns the learning rate.
    pub fn learning_rate(&self) -> f32 {
        self.learning_rate
    }
}

/// The hook surface a concrete network must supply.
///
/// Every hook is a required method: forgetting one is a compile error, not a
/// silent no-op. Hooks receive the model configuration explicitly instead of
/// reaching into ambient shared state, so independent models can coexist.
pub trait Network {
    /// The handle to the input data (a dataset, a file list, a reader...).
    type Data;

    /// The value produced by the prediction hook.
    type Prediction;

    /// The value produced by the loss hook.
    type Loss;

    /// The value produced by the metric hook.
    type Metric;

    /// The value produced by the optimizer hook.
    type Optimize;

    /// Builds the network's prediction output.
    fn build_prediction(&mut self, cfg: &Config<Self::Data>) -> Result<Self::Prediction>;

    /// Builds the loss output.
    fn build_loss(&mut self, cfg: &Config<Self::Data>) -> Result<Self::Loss>;

    /// Builds the evaluation metric output.
    fn build_metric(&mut self, cfg: &Config<Self::Data>) -> Result<Self::Metric>;

    /// Builds the optimization step output.
    fn build_optimize(&mut self, cfg: &Config<Self::Data>) -> Result<Self::Optimize>;
}

/// Base model skeleton: configuration, a global step counter, and four
/// independently memoized outputs.
///
/// Each accessor forces exactly its own slot: the matching [`Network`] hook
/// runs on the first read, and every later read returns the cached value for
/// the lifetime of the instance. A hook that fails leaves its slot unset, so
/// the next read retries it; the error itself propagates unchanged.
pub struct Model<N: Network> {
    cfg: Config<N::Data>,
    net: N,
    global_step: u64,

    prediction: Memo<N::Prediction>,
    loss: Memo<N::Loss>,
    metric: Memo<N::Metric>,
    optimize: Memo<N::Optimize>,
}

impl<N: Network> Model<N> {
    /// Returns a new `Model` with all four output slots unset.
    ///
    /// # Arguments
    /// * `net` - The concrete network supplying the hooks.
    /// * `cfg` - The model configuration.
    pub fn new(net: N, cfg: Config<N::Data>) -> Self {
        Self {
            cfg,
            net,
            global_step: 0,
            prediction: Memo::unset(),
            loss: Memo::unset(),
            metric: Memo::unset(),
            optimize: Memo::unset(),
        }
    }

    /// Returns the model configuration.
    pub fn config(&self) -> &Config<N::Data> {
        &self.cfg
    }

    /// Returns the underlying network.
    pub fn network(&self) -> &N {
        &self.net
    }

    /// Returns the global step counter.
    pub fn global_step(&self) -> u64 {
        self.global_step
    }

    /// Increments the global step counter and returns the new value. Meant
    /// to be driven by an external training loop.
    pub fn step(&mut self) -> u64 {
        self.global_step += 1;
        self.global_step
    }

    /// Returns the prediction output, building it on the first read.
    pub fn prediction(&mut self) -> Result<&N::Prediction> {
        let Self {
            net,
            cfg,
            prediction,
            ..
        } = self;

        prediction.get_or_try_init(|| {
            debug!("building prediction output");
            net.build_prediction(cfg)
        })
    }

    /// Returns the loss output, building it on the first read.
    pub fn loss(&mut self) -> Result<&N::Loss> {
        let Self { net, cfg, loss, .. } = self;

        loss.get_or_try_init(|| {
            debug!("building loss output");
            net.build_loss(cfg)
        })
    }

    /// Returns the metric output, building it on the first read.
    pub fn metric(&mut self) -> Result<&N::Metric> {
        let Self {
            net, cfg, metric, ..
        } = self;

        metric.get_or_try_init(|| {
            debug!("building metric output");
            net.build_metric(cfg)
        })
    }

    /// Returns the optimization output, building it on the first read.
    pub fn optimize(&mut self) -> Result<&N::Optimize> {
        let Self {
            net, cfg, optimize, ..
        } = self;

        optimize.get_or_try_init(|| {
            debug!("building optimization output");
            net.build_optimize(cfg)
        })
    }
}
