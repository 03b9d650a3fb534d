use ndarray::{s, Array1, Array4, ArrayView4};

use crate::error::{NetErr, Result};

/// Batch normalization over the batch and spatial axes of an NHWC tensor.
///
/// Scale starts at one and offset at zero, one of each per channel.
pub struct BatchNorm {
    scale: Array1<f32>,
    offset: Array1<f32>,
    epsilon: f32,
}

impl BatchNorm {
    /// Returns a new `BatchNorm` for `channels` channels with the usual
    /// variance epsilon of `1e-5`.
    pub fn new(channels: usize) -> Result<Self> {
        if channels == 0 {
            return Err(NetErr::InvalidInput("batch norm needs at least one channel"));
        }

        Ok(Self {
            scale: Array1::ones(channels),
            offset: Array1::zeros(channels),
            epsilon: 1e-5,
        })
    }

    /// Normalizes `x` per channel, using moments computed over the batch,
    /// height and width axes.
    pub fn forward(&self, x: ArrayView4<f32>) -> Result<Array4<f32>> {
        let (batch, height, width, channels) = x.dim();

        if channels != self.scale.len() {
            return Err(NetErr::ShapeMismatch {
                what: "batch norm channels",
                got: channels,
                expected: self.scale.len(),
            });
        }

        let n = batch * height * width;
        if n == 0 {
            return Err(NetErr::InvalidInput("cannot normalize an empty tensor"));
        }

        let mut out = x.to_owned();
        for ch in 0..channels {
            let lane = x.slice(s![.., .., .., ch]);
            let mean = lane.sum() / n as f32;
            let variance = lane.mapv(|v| (v - mean).powi(2)).sum() / n as f32;
            let denom = (variance + self.epsilon).sqrt();

            let scale = self.scale[ch];
            let offset = self.offset[ch];
            out.slice_mut(s![.., .., .., ch])
                .mapv_inplace(|v| (v - mean) / denom * scale + offset);
        }

        Ok(out)
    }
}
