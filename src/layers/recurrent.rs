use ndarray::{s, Array1, Array2, Array3, ArrayView2, ArrayView3, Axis};
use ndarray_rand::{rand_distr::Normal, RandomExt};
use rand::Rng;

use super::{activations::sigmoid, ops};
use crate::error::{NetErr, Result};

/// Diagonal peephole weights, one vector per gate that looks at the cell
/// state.
struct Peephole {
    w_ci: Array1<f32>,
    w_cf: Array1<f32>,
    w_co: Array1<f32>,
}

/// A single LSTM cell with a forget bias of `1.0` and optional peephole
/// connections.
///
/// The input and recurrent weights are fused into one `[input + state,
/// 4 * state]` matrix; the gate order along the columns is input, forget,
/// candidate, output.
pub struct LstmCell {
    input_size: usize,
    state_size: usize,
    w: Array2<f32>,
    b: Array1<f32>,
    peephole: Option<Peephole>,
}

impl LstmCell {
    /// Returns a new `LstmCell`.
    ///
    /// # Arguments
    /// * `input_size` - Features per time step fed into the cell.
    /// * `state_size` - Size of the hidden and cell states.
    /// * `peepholes` - Set true to let the gates see the cell state.
    pub fn new(input_size: usize, state_size: usize, peepholes: bool) -> Result<Self> {
        if input_size == 0 || state_size == 0 {
            return Err(NetErr::InvalidInput("lstm dimensions must be nonzero"));
        }

        let fan_in = input_size + state_size;
        let init = Normal::new(0.0, 1.0 / (fan_in as f32).sqrt()).unwrap();
        let peep_init = Normal::new(0.0, 0.1).unwrap();

        Ok(Self {
            input_size,
            state_size,
            w: Array2::random((fan_in, 4 * state_size), init),
            b: Array1::zeros(4 * state_size),
            peephole: peepholes.then(|| Peephole {
                w_ci: Array1::random(state_size, peep_init),
                w_cf: Array1::random(state_size, peep_init),
                w_co: Array1::random(state_size, peep_init),
            }),
        })
    }

    /// Returns the size of the hidden and cell states.
    pub fn state_size(&self) -> usize {
        self.state_size
    }

    /// Advances the cell by one time step for a whole batch.
    ///
    /// # Arguments
    /// * `x` - The step input, shaped `[batch, input_size]`.
    /// * `h` - The previous hidden state, shaped `[batch, state_size]`.
    /// * `c` - The previous cell state, same shape as `h`.
    ///
    /// # Returns
    /// The next hidden and cell states.
    pub fn step(
        &self,
        x: ArrayView2<f32>,
        h: &Array2<f32>,
        c: &Array2<f32>,
    ) -> Result<(Array2<f32>, Array2<f32>)> {
        if x.ncols() != self.input_size {
            return Err(NetErr::ShapeMismatch {
                what: "lstm step input",
                got: x.ncols(),
                expected: self.input_size,
            });
        }
        if h.ncols() != self.state_size || c.ncols() != self.state_size {
            return Err(NetErr::ShapeMismatch {
                what: "lstm state",
                got: h.ncols().max(c.ncols()),
                expected: self.state_size,
            });
        }

        let batch = x.nrows();
        let mut joined = Array2::zeros((batch, self.input_size + self.state_size));
        joined.slice_mut(s![.., ..self.input_size]).assign(&x);
        joined.slice_mut(s![.., self.input_size..]).assign(h);

        let z = joined.dot(&self.w) + &self.b;
        let n = self.state_size;
        let mut i = z.slice(s![.., 0..n]).to_owned();
        let mut f = z.slice(s![.., n..2 * n]).to_owned();
        let g = z.slice(s![.., 2 * n..3 * n]).mapv(f32::tanh);
        let mut o = z.slice(s![.., 3 * n..4 * n]).to_owned();

        if let Some(p) = &self.peephole {
            i += &(c * &p.w_ci);
            f += &(c * &p.w_cf);
        }
        i.mapv_inplace(sigmoid);
        // Forget bias keeps memories around early in training.
        f.mapv_inplace(|v| sigmoid(v + 1.0));

        let c_next = &f * c + &i * &g;

        if let Some(p) = &self.peephole {
            o += &(&c_next * &p.w_co);
        }
        o.mapv_inplace(sigmoid);

        let h_next = &o * &c_next.mapv(f32::tanh);
        Ok((h_next, c_next))
    }
}

/// A stack of LSTM cells with dropout on each layer's outputs.
///
/// Dropout touches the outputs only; the cell inputs and recurrent state are
/// never masked.
///
/// Outputs past each sequence's length are zeroed and the state stops
/// advancing there, so ragged batches behave as if each row ended at its own
/// length.
pub struct Lstm {
    cells: Vec<LstmCell>,
    state_size: usize,
    keep_prob: f32,
}

impl Lstm {
    /// Returns a new `Lstm`.
    ///
    /// # Arguments
    /// * `input_size` - Features per time step.
    /// * `state_size` - Size of every layer's state.
    /// * `num_layers` - Number of stacked cells.
    /// * `keep_prob` - Dropout keep probability applied to layer outputs.
    /// * `peepholes` - Set true to use peephole connections.
    pub fn new(
        input_size: usize,
        state_size: usize,
        num_layers: usize,
        keep_prob: f32,
        peepholes: bool,
    ) -> Result<Self> {
        if num_layers == 0 {
            return Err(NetErr::InvalidInput("lstm needs at least one layer"));
        }

        let mut cells = Vec::with_capacity(num_layers);
        for li in 0..num_layers {
            let dim_in = if li == 0 { input_size } else { state_size };
            cells.push(LstmCell::new(dim_in, state_size, peepholes)?);
        }

        Ok(Self {
            cells,
            state_size,
            keep_prob,
        })
    }

    /// Returns the size of each layer's state.
    pub fn state_size(&self) -> usize {
        self.state_size
    }

    /// Runs the stack over a `[batch, time, features]` tensor, starting from
    /// zero states.
    ///
    /// # Returns
    /// The top layer's outputs, shaped `[batch, time, state_size]`, zeroed
    /// past each row's sequence length.
    pub fn run<R: Rng>(
        &self,
        x: ArrayView3<f32>,
        seq_len: &[usize],
        rng: &mut R,
    ) -> Result<Array3<f32>> {
        let (batch, time, _) = x.dim();
        check_seq_len(seq_len, batch, time)?;

        let mut layer_in = x.to_owned();
        for cell in &self.cells {
            let mut h = Array2::zeros((batch, self.state_size));
            let mut c = Array2::zeros((batch, self.state_size));
            let mut out = Array3::zeros((batch, time, self.state_size));

            for t in 0..time {
                let x_t = layer_in.slice(s![.., t, ..]);
                let (h_next, c_next) = cell.step(x_t, &h, &c)?;

                // Rows past their sequence length keep their state and emit
                // nothing.
                for bi in 0..batch {
                    if t < seq_len[bi] {
                        h.row_mut(bi).assign(&h_next.row(bi));
                        c.row_mut(bi).assign(&c_next.row(bi));
                        out.slice_mut(s![bi, t, ..]).assign(&h_next.row(bi));
                    }
                }
            }

            ops::dropout(&mut out, self.keep_prob, rng)?;
            layer_in = out;
        }

        Ok(layer_in)
    }

    /// Like [`Lstm::run`], but with the batch and time axes flattened into
    /// one, giving `[batch * time, state_size]`.
    pub fn forward<R: Rng>(
        &self,
        x: ArrayView3<f32>,
        seq_len: &[usize],
        rng: &mut R,
    ) -> Result<Array2<f32>> {
        let out = self.run(x, seq_len, rng)?;
        let (batch, time, state) = out.dim();

        // `run` builds the output in standard layout, so this cannot fail.
        Ok(out.into_shape_with_order((batch * time, state)).unwrap())
    }
}

/// A bidirectional LSTM: a forward stack and a backward stack over the
/// reversed sequences, with their outputs concatenated feature-wise.
pub struct BiLstm {
    fw: Lstm,
    bw: Lstm,
}

impl BiLstm {
    /// Returns a new `BiLstm`; both directions share the same geometry.
    pub fn new(
        input_size: usize,
        state_size: usize,
        num_layers: usize,
        keep_prob: f32,
        peepholes: bool,
    ) -> Result<Self> {
        Ok(Self {
            fw: Lstm::new(input_size, state_size, num_layers, keep_prob, peepholes)?,
            bw: Lstm::new(input_size, state_size, num_layers, keep_prob, peepholes)?,
        })
    }

    /// Runs both directions over a `[batch, time, features]` tensor.
    ///
    /// Each row is reversed only within its own sequence length, mirroring
    /// how the forward pass masks ragged batches.
    ///
    /// # Returns
    /// Outputs shaped `[batch, time, 2 * state_size]`, forward features
    /// first.
    pub fn forward<R: Rng>(
        &self,
        x: ArrayView3<f32>,
        seq_len: &[usize],
        rng: &mut R,
    ) -> Result<Array3<f32>> {
        let forward = self.fw.run(x, seq_len, rng)?;

        let reversed = reverse_sequence(x, seq_len)?;
        let backward = self.bw.run(reversed.view(), seq_len, rng)?;
        let backward = reverse_sequence(backward.view(), seq_len)?;

        // Both halves have identical [batch, time, state] shapes.
        Ok(ndarray::concatenate(Axis(2), &[forward.view(), backward.view()]).unwrap())
    }
}

/// Picks each sequence's last valid output row from a flattened
/// `[batch * time, state]` output (the layout [`Lstm::forward`] produces).
pub fn last_hidden(
    outputs: ArrayView2<f32>,
    time: usize,
    seq_len: &[usize],
) -> Result<Array2<f32>> {
    let batch = seq_len.len();

    if outputs.nrows() != batch * time {
        return Err(NetErr::ShapeMismatch {
            what: "flattened lstm outputs",
            got: outputs.nrows(),
            expected: batch * time,
        });
    }
    if seq_len.iter().any(|&len| len == 0 || len > time) {
        return Err(NetErr::InvalidInput("sequence length out of range"));
    }

    let mut out = Array2::zeros((batch, outputs.ncols()));
    for (bi, &len) in seq_len.iter().enumerate() {
        let row = bi * time + (len - 1);
        out.row_mut(bi).assign(&outputs.row(row));
    }

    Ok(out)
}

/// Reverses the first `seq_len[i]` time steps of each row, leaving the
/// padded tail in place.
fn reverse_sequence(x: ArrayView3<f32>, seq_len: &[usize]) -> Result<Array3<f32>> {
    let (batch, time, _) = x.dim();
    check_seq_len(seq_len, batch, time)?;

    let mut out = x.to_owned();
    for (bi, &len) in seq_len.iter().enumerate() {
        for t in 0..len {
            out.slice_mut(s![bi, t, ..])
                .assign(&x.slice(s![bi, len - 1 - t, ..]));
        }
    }

    Ok(out)
}

fn check_seq_len(seq_len: &[usize], batch: usize, time: usize) -> Result<()> {
    if seq_len.len() != batch {
        return Err(NetErr::ShapeMismatch {
            what: "sequence lengths",
            got: seq_len.len(),
            expected: batch,
        });
    }
    if seq_len.iter().any(|&len| len > time) {
        return Err(NetErr::InvalidInput("sequence length exceeds time steps"));
    }

    Ok(())
}
