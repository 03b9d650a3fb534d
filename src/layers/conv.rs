use ndarray::{s, Array1, Array4, ArrayView4};
use ndarray_rand::{rand_distr::Normal, RandomExt};

use super::{activations, norm::BatchNorm};
use crate::error::{NetErr, Result};

/// Padding scheme for convolution and pooling windows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Padding {
    /// No padding; windows must fit entirely inside the input.
    Valid,
    /// Zero-pad so the output covers `ceil(input / stride)` positions.
    Same,
}

/// Pooling reduction applied over each window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PoolMethod {
    Max,
    Avg,
}

/// A pooling stage: a window size, a stride and a reduction method.
#[derive(Clone, Copy, Debug)]
pub struct Pool {
    method: PoolMethod,
    ksize: (usize, usize),
    stride: (usize, usize),
}

impl Pool {
    /// Returns a new `Pool`.
    ///
    /// # Arguments
    /// * `method` - Whether each window reduces to its maximum or its mean.
    /// * `ksize` - The window height and width.
    /// * `stride` - The window step along height and width.
    pub fn new(method: PoolMethod, ksize: (usize, usize), stride: (usize, usize)) -> Result<Self> {
        if ksize.0 == 0 || ksize.1 == 0 {
            return Err(NetErr::InvalidInput("pool window must be nonzero"));
        }
        if stride.0 == 0 || stride.1 == 0 {
            return Err(NetErr::InvalidInput("pool stride must be nonzero"));
        }

        Ok(Self {
            method,
            ksize,
            stride,
        })
    }

    /// Pools an NHWC tensor window by window.
    ///
    /// With `Same` padding the pad cells are virtual: windows at the edges
    /// are clamped to the valid region, so the maximum only sees real
    /// activations and the average divides by the count of real cells.
    pub fn forward(&self, x: ArrayView4<f32>, padding: Padding) -> Result<Array4<f32>> {
        if x.is_empty() {
            return Err(NetErr::InvalidInput("cannot pool an empty tensor"));
        }

        let (batch, height, width, channels) = x.dim();
        let (out_h, top) = pool_span(height, self.ksize.0, self.stride.0, padding)?;
        let (out_w, left) = pool_span(width, self.ksize.1, self.stride.1, padding)?;

        let mut out = Array4::zeros((batch, out_h, out_w, channels));
        for bi in 0..batch {
            for oy in 0..out_h {
                let (y0, y1) = clamp_window(oy, self.stride.0, self.ksize.0, top, height);
                for ox in 0..out_w {
                    let (x0, x1) = clamp_window(ox, self.stride.1, self.ksize.1, left, width);
                    for ch in 0..channels {
                        let window = x.slice(s![bi, y0..y1, x0..x1, ch]);
                        out[[bi, oy, ox, ch]] = match self.method {
                            PoolMethod::Max => {
                                window.fold(f32::NEG_INFINITY, |m, &v| m.max(v))
                            }
                            PoolMethod::Avg => window.sum() / window.len() as f32,
                        };
                    }
                }
            }
        }

        Ok(out)
    }
}

/// Convolution layer with an optional pooling stage.
///
/// Forward order matches the usual convnet block: convolution, bias, optional
/// batch normalization, leaky ReLU, optional pooling. The kernel is laid out
/// `[kh, kw, in_channels, out_channels]` over NHWC inputs.
pub struct Conv {
    kernel: Array4<f32>,
    bias: Array1<f32>,
    stride: (usize, usize),
    padding: Padding,
    alpha: f32,
    batchnorm: Option<BatchNorm>,
    pool: Option<Pool>,
}

impl Conv {
    /// Returns a new `Conv` with valid padding, batch normalization on and a
    /// leaky ReLU slope of `0.1`.
    ///
    /// # Arguments
    /// * `ksize` - The kernel height and width.
    /// * `in_channels` - Channels of the input tensor.
    /// * `out_channels` - Channels produced by the layer.
    /// * `stride` - The kernel step along height and width.
    pub fn new(
        ksize: (usize, usize),
        in_channels: usize,
        out_channels: usize,
        stride: (usize, usize),
    ) -> Result<Self> {
        if ksize.0 == 0 || ksize.1 == 0 {
            return Err(NetErr::InvalidInput("conv kernel must be nonzero"));
        }
        if in_channels == 0 || out_channels == 0 {
            return Err(NetErr::InvalidInput("conv channels must be nonzero"));
        }
        if stride.0 == 0 || stride.1 == 0 {
            return Err(NetErr::InvalidInput("conv stride must be nonzero"));
        }

        let init = Normal::new(0.0, 1.0).unwrap();

        Ok(Self {
            kernel: Array4::random((ksize.0, ksize.1, in_channels, out_channels), init),
            bias: Array1::zeros(out_channels),
            stride,
            padding: Padding::Valid,
            alpha: 0.1,
            batchnorm: Some(BatchNorm::new(out_channels)?),
            pool: None,
        })
    }

    /// Sets the padding scheme, used by both the convolution and the pooling
    /// stage.
    pub fn with_padding(mut self, padding: Padding) -> Self {
        self.padding = padding;
        self
    }

    /// Sets the leaky ReLU slope.
    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.alpha = alpha;
        self
    }

    /// Turns batch normalization off.
    pub fn without_batchnorm(mut self) -> Self {
        self.batchnorm = None;
        self
    }

    /// Adds a pooling stage after the activation.
    pub fn with_pool(mut self, pool: Pool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Convolves an NHWC input batch.
    ///
    /// # Arguments
    /// * `x` - The input, shaped `[batch, height, width, in_channels]`.
    ///
    /// # Returns
    /// The convoluted (and possibly normalized, activated and pooled) tensor.
    pub fn forward(&self, x: ArrayView4<f32>) -> Result<Array4<f32>> {
        let (kh, kw, in_c, out_c) = self.kernel.dim();

        if x.is_empty() {
            return Err(NetErr::InvalidInput("cannot convolve an empty tensor"));
        }
        if x.dim().3 != in_c {
            return Err(NetErr::ShapeMismatch {
                what: "conv input channels",
                got: x.dim().3,
                expected: in_c,
            });
        }

        let padded = pad(x, (kh, kw), self.stride, self.padding);
        let (batch, height, width, _) = padded.dim();
        let (out_h, out_w) = window_positions((height, width), (kh, kw), self.stride)?;

        let mut out = Array4::zeros((batch, out_h, out_w, out_c));
        for bi in 0..batch {
            for oy in 0..out_h {
                let y0 = oy * self.stride.0;
                for ox in 0..out_w {
                    let x0 = ox * self.stride.1;
                    let patch = padded.slice(s![bi, y0..y0 + kh, x0..x0 + kw, ..]);
                    for oc in 0..out_c {
                        let filter = self.kernel.slice(s![.., .., .., oc]);
                        out[[bi, oy, ox, oc]] = (&patch * &filter).sum() + self.bias[oc];
                    }
                }
            }
        }

        if let Some(bn) = &self.batchnorm {
            out = bn.forward(out.view())?;
        }

        let alpha = self.alpha;
        out.mapv_inplace(|v| activations::lrelu(v, alpha));

        match &self.pool {
            Some(pool) => pool.forward(out.view(), self.padding),
            None => Ok(out),
        }
    }
}

/// Number of window positions along the height and width of a (padded)
/// input, or an error if a window does not fit at all.
fn window_positions(
    dim: (usize, usize),
    ksize: (usize, usize),
    stride: (usize, usize),
) -> Result<(usize, usize)> {
    if dim.0 < ksize.0 || dim.1 < ksize.1 {
        return Err(NetErr::InvalidInput("window is larger than the input"));
    }

    Ok(((dim.0 - ksize.0) / stride.0 + 1, (dim.1 - ksize.1) / stride.1 + 1))
}

/// Output positions and leading (virtual) padding along one pooling axis.
fn pool_span(
    dim: usize,
    ksize: usize,
    stride: usize,
    padding: Padding,
) -> Result<(usize, usize)> {
    match padding {
        Padding::Valid => {
            if dim < ksize {
                return Err(NetErr::InvalidInput("window is larger than the input"));
            }
            Ok(((dim - ksize) / stride + 1, 0))
        }
        Padding::Same => Ok((dim.div_ceil(stride), same_padding(dim, ksize, stride) / 2)),
    }
}

/// Clamps one pooling window to the valid `0..dim` range. With a nonempty
/// input every window keeps at least one real cell.
fn clamp_window(
    pos: usize,
    stride: usize,
    ksize: usize,
    offset: usize,
    dim: usize,
) -> (usize, usize) {
    let start = (pos * stride) as isize - offset as isize;
    let lo = start.max(0) as usize;
    let hi = ((start + ksize as isize).max(0) as usize).min(dim);
    (lo, hi)
}

/// Zero-pads an NHWC tensor for the given scheme. `Same` splits the padding
/// evenly, with the odd element going to the bottom/right edge.
fn pad(
    x: ArrayView4<f32>,
    ksize: (usize, usize),
    stride: (usize, usize),
    padding: Padding,
) -> Array4<f32> {
    if padding == Padding::Valid {
        return x.to_owned();
    }

    let (batch, height, width, channels) = x.dim();
    let pad_h = same_padding(height, ksize.0, stride.0);
    let pad_w = same_padding(width, ksize.1, stride.1);

    let mut padded = Array4::zeros((batch, height + pad_h, width + pad_w, channels));
    let top = pad_h / 2;
    let left = pad_w / 2;
    padded
        .slice_mut(s![.., top..top + height, left..left + width, ..])
        .assign(&x);

    padded
}

/// Total padding needed along one axis for `Same` output coverage.
fn same_padding(dim: usize, ksize: usize, stride: usize) -> usize {
    let out = dim.div_ceil(stride);
    ((out - 1) * stride + ksize).saturating_sub(dim)
}

#[cfg(test)]
mod test {
    use super::*;
    use ndarray::{array, Array4};

    #[test]
    fn test_conv_output_shape_valid() {
        let conv = Conv::new((3, 3), 2, 5, (1, 1)).unwrap();
        let x = Array4::<f32>::ones((2, 8, 8, 2));

        let y = conv.forward(x.view()).unwrap();
        assert_eq!(y.dim(), (2, 6, 6, 5));
    }

    #[test]
    fn test_conv_output_shape_same_with_stride() {
        let conv = Conv::new((3, 3), 1, 4, (2, 2))
            .unwrap()
            .with_padding(Padding::Same);
        let x = Array4::<f32>::ones((1, 7, 7, 1));

        let y = conv.forward(x.view()).unwrap();
        // Same padding covers ceil(7 / 2) = 4 positions per axis.
        assert_eq!(y.dim(), (1, 4, 4, 4));
    }

    #[test]
    fn test_conv_then_pool_shape() {
        let pool = Pool::new(PoolMethod::Max, (2, 2), (2, 2)).unwrap();
        let conv = Conv::new((3, 3), 1, 2, (1, 1)).unwrap().with_pool(pool);
        let x = Array4::<f32>::ones((1, 10, 10, 1));

        let y = conv.forward(x.view()).unwrap();
        assert_eq!(y.dim(), (1, 4, 4, 2));
    }

    #[test]
    fn test_conv_rejects_channel_mismatch() {
        let conv = Conv::new((3, 3), 2, 5, (1, 1)).unwrap();
        let x = Array4::<f32>::ones((1, 8, 8, 3));

        assert!(matches!(
            conv.forward(x.view()),
            Err(NetErr::ShapeMismatch { got: 3, expected: 2, .. })
        ));
    }

    #[test]
    fn test_conv_rejects_oversized_kernel() {
        let conv = Conv::new((5, 5), 1, 1, (1, 1)).unwrap();
        let x = Array4::<f32>::ones((1, 3, 3, 1));

        assert!(conv.forward(x.view()).is_err());
    }

    #[test]
    fn test_max_pool_picks_the_largest() {
        let x = array![[1.0, 2.0], [3.0, 4.0]]
            .into_shape_with_order((1, 2, 2, 1))
            .unwrap();
        let pool = Pool::new(PoolMethod::Max, (2, 2), (2, 2)).unwrap();

        let y = pool.forward(x.view(), Padding::Valid).unwrap();
        assert_eq!(y.dim(), (1, 1, 1, 1));
        assert_eq!(y[[0, 0, 0, 0]], 4.0);
    }

    #[test]
    fn test_avg_pool_averages() {
        let x = array![[1.0, 2.0], [3.0, 4.0]]
            .into_shape_with_order((1, 2, 2, 1))
            .unwrap();
        let pool = Pool::new(PoolMethod::Avg, (2, 2), (2, 2)).unwrap();

        let y = pool.forward(x.view(), Padding::Valid).unwrap();
        assert_eq!(y[[0, 0, 0, 0]], 2.5);
    }

    #[test]
    fn test_pool_channels_stay_separate() {
        let mut x = Array4::<f32>::zeros((1, 2, 2, 2));
        x.slice_mut(s![0, .., .., 0]).fill(1.0);
        x.slice_mut(s![0, .., .., 1]).fill(9.0);
        let pool = Pool::new(PoolMethod::Max, (2, 2), (1, 1)).unwrap();

        let y = pool.forward(x.view(), Padding::Valid).unwrap();
        assert_eq!(y[[0, 0, 0, 0]], 1.0);
        assert_eq!(y[[0, 0, 0, 1]], 9.0);
    }

    #[test]
    fn test_conv_rejects_empty_input() {
        let conv = Conv::new((3, 3), 1, 1, (1, 1))
            .unwrap()
            .with_padding(Padding::Same);
        let x = Array4::<f32>::zeros((1, 0, 5, 1));

        assert!(matches!(
            conv.forward(x.view()),
            Err(NetErr::InvalidInput(_))
        ));
    }

    #[test]
    fn test_pool_rejects_empty_input() {
        let pool = Pool::new(PoolMethod::Max, (2, 2), (2, 2)).unwrap();
        let x = Array4::<f32>::zeros((0, 3, 3, 1));

        assert!(matches!(
            pool.forward(x.view(), Padding::Same),
            Err(NetErr::InvalidInput(_))
        ));
    }

    #[test]
    fn test_max_pool_same_sees_no_virtual_padding() {
        // Every activation is negative; a zero sneaking in from the padded
        // edge would win the max.
        let x = Array4::from_elem((1, 3, 3, 1), -1.0);
        let pool = Pool::new(PoolMethod::Max, (2, 2), (2, 2)).unwrap();

        let y = pool.forward(x.view(), Padding::Same).unwrap();
        assert_eq!(y.dim(), (1, 2, 2, 1));
        assert!(y.iter().all(|&v| v == -1.0));
    }

    #[test]
    fn test_avg_pool_same_divides_by_real_cells_only() {
        let x = Array4::from_elem((1, 3, 3, 1), 1.0);
        let pool = Pool::new(PoolMethod::Avg, (2, 2), (2, 2)).unwrap();

        // Edge windows are clamped, so the mean of an all-ones input stays
        // exactly one everywhere.
        let y = pool.forward(x.view(), Padding::Same).unwrap();
        assert!(y.iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_pool_rejects_zero_window() {
        assert!(Pool::new(PoolMethod::Max, (0, 2), (1, 1)).is_err());
        assert!(Pool::new(PoolMethod::Max, (2, 2), (0, 1)).is_err());
    }

    #[test]
    fn test_same_padding_amounts() {
        // 7 wide, kernel 3, stride 2: 4 outputs need 3 + 3 * 2 = 9 columns.
        assert_eq!(same_padding(7, 3, 2), 2);
        // Already aligned: no padding needed.
        assert_eq!(same_padding(4, 2, 2), 0);
    }
}
