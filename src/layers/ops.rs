use ndarray::{Array, Array2, ArrayView4, Dimension};
use rand::Rng;

use crate::error::{NetErr, Result};

/// Flattens a `[batch, height, width, channels]` tensor into
/// `[batch, height * width * channels]`, one row per image.
pub fn flatten(x: ArrayView4<f32>) -> Array2<f32> {
    let (batch, height, width, channels) = x.dim();

    // An owned copy of a view is in standard layout, so the reshape is exact.
    x.to_owned()
        .into_shape_with_order((batch, height * width * channels))
        .unwrap()
}

/// Inverted dropout: keeps each element with probability `keep_prob`, scaling
/// survivors by `1 / keep_prob` so the expected activation is unchanged.
///
/// A `keep_prob` of `1.0` is a no-op and draws no randomness.
pub fn dropout<D, R>(x: &mut Array<f32, D>, keep_prob: f32, rng: &mut R) -> Result<()>
where
    D: Dimension,
    R: Rng,
{
    if !(keep_prob > 0.0 && keep_prob <= 1.0) {
        return Err(NetErr::InvalidInput("keep_prob must be in (0, 1]"));
    }

    if keep_prob == 1.0 {
        return Ok(());
    }

    let scale = 1.0 / keep_prob;
    x.mapv_inplace(|v| {
        if rng.random::<f32>() < keep_prob {
            v * scale
        } else {
            0.0
        }
    });

    Ok(())
}
