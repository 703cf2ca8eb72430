use rand::Rng;

use crate::memory::{self, Parameterized};
use crate::{Layer, Result};

/// A stack of dense layers.
///
/// Build one with [`crate::MlpBuilder`]; the layer list is never empty.
#[derive(Debug, Clone)]
pub struct Mlp {
    layers: Vec<Layer>,
}

/// Reusable buffers for `Mlp::forward` / `Mlp::forward_train`.
///
/// The output of the most recent forward pass lives inside `Scratch`, along with
/// the dropout masks drawn by `forward_train`.
#[derive(Debug, Clone)]
pub struct Scratch {
    layer_outputs: Vec<Vec<f32>>,
    dropout_masks: Vec<Vec<f32>>,
    dropout_active: bool,
}

/// Parameter gradients for an `Mlp` (overwrite semantics).
///
/// Allocate once via `Mlp::gradients()` and reuse across training steps.
#[derive(Debug, Clone)]
pub struct Gradients {
    d_weights: Vec<Vec<f32>>,
    d_biases: Vec<Vec<f32>>,

    // Gradient w.r.t. each layer output, final output included; the loss writes
    // into the last entry through `d_output_mut`.
    d_layer_outputs: Vec<Vec<f32>>,

    d_input: Vec<f32>,
}

impl Mlp {
    pub(crate) fn from_layers(layers: Vec<Layer>) -> Self {
        debug_assert!(!layers.is_empty());
        Self { layers }
    }

    #[inline]
    pub fn input_dim(&self) -> usize {
        self.layers[0].in_dim()
    }

    #[inline]
    pub fn output_dim(&self) -> usize {
        self.layers[self.layers.len() - 1].out_dim()
    }

    #[inline]
    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    #[inline]
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    #[inline]
    pub fn layer(&self, idx: usize) -> Option<&Layer> {
        self.layers.get(idx)
    }

    #[inline]
    pub fn layer_mut(&mut self, idx: usize) -> Option<&mut Layer> {
        self.layers.get_mut(idx)
    }

    /// Bytes occupied by all weights and biases.
    pub fn memory_usage(&self) -> Result<u64> {
        memory::estimate(&self.layers)
    }

    pub fn scratch(&self) -> Scratch {
        Scratch::new(self)
    }

    pub fn gradients(&self) -> Gradients {
        Gradients::new(self)
    }

    #[inline]
    pub fn trainer(&self) -> Trainer {
        Trainer::new(self)
    }

    /// Inference forward pass for a single sample. Dropout is inactive.
    ///
    /// Shape contract:
    /// - `input.len() == self.input_dim()`
    /// - `scratch` was built for this `Mlp`
    pub fn forward<'a>(&self, input: &[f32], scratch: &'a mut Scratch) -> &'a [f32] {
        self.check_scratch(input, scratch);
        scratch.dropout_active = false;

        for (idx, layer) in self.layers.iter().enumerate() {
            let (prev, out) = scratch.split_io(idx, input);
            layer.forward(prev, out);
        }
        scratch.output()
    }

    /// Training forward pass: like [`Mlp::forward`], but every layer with a
    /// non-zero dropout rate drops units using `rng`. The masks are kept in
    /// `scratch` so the following `backward` routes gradients through them.
    pub fn forward_train<'a, R: Rng + ?Sized>(
        &self,
        input: &[f32],
        scratch: &'a mut Scratch,
        rng: &mut R,
    ) -> &'a [f32] {
        self.check_scratch(input, scratch);
        scratch.dropout_active = true;

        for (idx, layer) in self.layers.iter().enumerate() {
            let (prev, out) = scratch.split_io(idx, input);
            layer.forward(prev, out);
            if layer.dropout() > 0.0 {
                layer.apply_dropout(
                    &mut scratch.layer_outputs[idx],
                    &mut scratch.dropout_masks[idx],
                    rng,
                );
            }
        }
        scratch.output()
    }

    /// Backward pass for a single sample.
    ///
    /// Call `forward` / `forward_train` first with the same `input` and
    /// `scratch`, and write `dL/d(output)` into `grads.d_output_mut()`.
    /// `grads` is overwritten. Returns dL/d(input).
    pub fn backward<'a>(
        &self,
        input: &[f32],
        scratch: &Scratch,
        grads: &'a mut Gradients,
    ) -> &'a [f32] {
        self.check_scratch(input, scratch);
        assert_eq!(
            grads.d_weights.len(),
            self.layers.len(),
            "grads has {} layers, model has {} layers",
            grads.d_weights.len(),
            self.layers.len()
        );
        assert_eq!(
            grads.d_input.len(),
            self.input_dim(),
            "grads d_input len {} does not match model input_dim {}",
            grads.d_input.len(),
            self.input_dim()
        );

        for idx in (0..self.layers.len()).rev() {
            let layer = &self.layers[idx];
            let layer_input: &[f32] = if idx == 0 {
                input
            } else {
                &scratch.layer_outputs[idx - 1]
            };
            let layer_output = &scratch.layer_outputs[idx];
            let mask = (scratch.dropout_active && layer.dropout() > 0.0)
                .then(|| scratch.dropout_masks[idx].as_slice());

            if idx == 0 {
                layer.backward(
                    layer_input,
                    layer_output,
                    &grads.d_layer_outputs[0],
                    mask,
                    &mut grads.d_input,
                    &mut grads.d_weights[0],
                    &mut grads.d_biases[0],
                );
            } else {
                // d_inputs of this layer is d_outputs of the previous one.
                let (left, right) = grads.d_layer_outputs.split_at_mut(idx);
                layer.backward(
                    layer_input,
                    layer_output,
                    &right[0],
                    mask,
                    &mut left[idx - 1],
                    &mut grads.d_weights[idx],
                    &mut grads.d_biases[idx],
                );
            }
        }

        &grads.d_input
    }

    /// `param -= lr * grad` on every layer.
    #[inline]
    pub fn sgd_step(&mut self, grads: &Gradients, lr: f32) {
        assert!(
            lr.is_finite() && lr > 0.0,
            "learning rate must be finite and > 0"
        );
        assert_eq!(
            self.layers.len(),
            grads.d_weights.len(),
            "grads has {} layers, model has {} layers",
            grads.d_weights.len(),
            self.layers.len()
        );

        for (i, layer) in self.layers.iter_mut().enumerate() {
            layer.sgd_step(&grads.d_weights[i], &grads.d_biases[i], lr);
        }
    }

    fn check_scratch(&self, input: &[f32], scratch: &Scratch) {
        assert_eq!(
            input.len(),
            self.input_dim(),
            "input len {} does not match model input_dim {}",
            input.len(),
            self.input_dim()
        );
        assert_eq!(
            scratch.layer_outputs.len(),
            self.layers.len(),
            "scratch has {} layer outputs, model has {} layers",
            scratch.layer_outputs.len(),
            self.layers.len()
        );
        for (idx, (out, layer)) in scratch.layer_outputs.iter().zip(&self.layers).enumerate() {
            assert_eq!(
                out.len(),
                layer.out_dim(),
                "scratch layer {idx} output len {} does not match layer out_dim {}",
                out.len(),
                layer.out_dim()
            );
        }
    }
}

/// Every buffer one training step needs, allocated once.
///
/// `grads` receives per-sample gradients; `batch_grads` sums them over a
/// mini-batch before the optimizer step.
#[derive(Debug, Clone)]
pub struct Trainer {
    pub scratch: Scratch,
    pub grads: Gradients,
    pub batch_grads: Gradients,
}

impl Trainer {
    pub fn new(mlp: &Mlp) -> Self {
        Self {
            scratch: Scratch::new(mlp),
            grads: Gradients::new(mlp),
            batch_grads: Gradients::new(mlp),
        }
    }
}

impl Scratch {
    pub fn new(mlp: &Mlp) -> Self {
        let layer_outputs: Vec<Vec<f32>> = mlp
            .layers
            .iter()
            .map(|layer| vec![0.0; layer.out_dim()])
            .collect();
        Self {
            dropout_masks: layer_outputs.clone(),
            layer_outputs,
            dropout_active: false,
        }
    }

    #[inline]
    pub fn output(&self) -> &[f32] {
        &self.layer_outputs[self.layer_outputs.len() - 1]
    }

    /// (input of layer `idx`, output buffer of layer `idx`).
    #[inline]
    fn split_io<'a>(&'a mut self, idx: usize, input: &'a [f32]) -> (&'a [f32], &'a mut [f32]) {
        if idx == 0 {
            (input, &mut self.layer_outputs[0])
        } else {
            let (left, right) = self.layer_outputs.split_at_mut(idx);
            (&left[idx - 1], &mut right[0])
        }
    }
}

impl Gradients {
    pub fn new(mlp: &Mlp) -> Self {
        let n = mlp.layers.len();
        let mut d_weights = Vec::with_capacity(n);
        let mut d_biases = Vec::with_capacity(n);
        let mut d_layer_outputs = Vec::with_capacity(n);

        for layer in &mlp.layers {
            d_weights.push(vec![0.0; layer.in_dim() * layer.out_dim()]);
            d_biases.push(vec![0.0; layer.out_dim()]);
            d_layer_outputs.push(vec![0.0; layer.out_dim()]);
        }

        Self {
            d_weights,
            d_biases,
            d_layer_outputs,
            d_input: vec![0.0; mlp.input_dim()],
        }
    }

    /// Upstream gradient buffer for the final model output.
    ///
    /// - `mlp.forward(input, &mut scratch)`
    /// - loss writes `dL/d(output)` here
    /// - `mlp.backward(input, &scratch, &mut grads)`
    #[inline]
    pub fn d_output_mut(&mut self) -> &mut [f32] {
        let last = self.d_layer_outputs.len() - 1;
        &mut self.d_layer_outputs[last]
    }

    #[inline]
    pub fn d_input(&self) -> &[f32] {
        &self.d_input
    }

    #[inline]
    pub fn d_weights(&self, layer_idx: usize) -> &[f32] {
        &self.d_weights[layer_idx]
    }

    #[inline]
    pub fn d_biases(&self, layer_idx: usize) -> &[f32] {
        &self.d_biases[layer_idx]
    }

    #[inline]
    pub fn d_weights_mut(&mut self, layer_idx: usize) -> &mut [f32] {
        &mut self.d_weights[layer_idx]
    }

    #[inline]
    pub fn d_biases_mut(&mut self, layer_idx: usize) -> &mut [f32] {
        &mut self.d_biases[layer_idx]
    }

    /// Zero every parameter gradient.
    pub fn zero(&mut self) {
        for g in self.d_weights.iter_mut().chain(self.d_biases.iter_mut()) {
            g.fill(0.0);
        }
    }

    /// `self += other` over parameter gradients.
    pub fn accumulate(&mut self, other: &Gradients) {
        debug_assert_eq!(self.d_weights.len(), other.d_weights.len());
        let params = self.d_weights.iter_mut().chain(self.d_biases.iter_mut());
        let others = other.d_weights.iter().chain(other.d_biases.iter());
        for (dst, src) in params.zip(others) {
            for (d, &s) in dst.iter_mut().zip(src) {
                *d += s;
            }
        }
    }

    /// `self *= factor` over parameter gradients.
    pub fn scale(&mut self, factor: f32) {
        for g in self.d_weights.iter_mut().chain(self.d_biases.iter_mut()) {
            for v in g.iter_mut() {
                *v *= factor;
            }
        }
    }
}

impl Parameterized for Mlp {
    fn parameters(&self) -> Vec<memory::TensorSpec> {
        self.layers.iter().flat_map(|l| l.parameters()).collect()
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::{Activation, MlpBuilder, loss};

    fn small_mlp(seed: u64) -> Mlp {
        MlpBuilder::new(2)
            .unwrap()
            .add_layer(3, Activation::Tanh)
            .unwrap()
            .add_layer(2, Activation::Identity)
            .unwrap()
            .build_with_seed(seed)
            .unwrap()
    }

    fn loss_for_mlp(mlp: &Mlp, input: &[f32], target: &[f32], scratch: &mut Scratch) -> f32 {
        mlp.forward(input, scratch);
        loss::softmax_cross_entropy(scratch.output(), target)
    }

    fn assert_close(analytic: f32, numeric: f32, abs_tol: f32, rel_tol: f32) {
        let diff = (analytic - numeric).abs();
        let scale = analytic.abs().max(numeric.abs()).max(1.0);
        assert!(
            diff <= abs_tol || diff / scale <= rel_tol,
            "analytic={analytic} numeric={numeric} diff={diff}"
        );
    }

    #[test]
    fn seeded_init_is_deterministic() {
        let a = small_mlp(123);
        let b = small_mlp(123);
        let input = [0.3_f32, -0.7];

        let out_a = a.forward(&input, &mut a.scratch()).to_vec();
        let out_b = b.forward(&input, &mut b.scratch()).to_vec();
        assert_eq!(out_a, out_b);
    }

    #[test]
    fn backward_matches_numeric_gradients() {
        let mut mlp = small_mlp(0);
        let mut scratch = mlp.scratch();
        let mut grads = mlp.gradients();

        let input = [0.3_f32, -0.7];
        let target = [0.0_f32, 1.0];

        mlp.forward(&input, &mut scratch);
        loss::softmax_cross_entropy_backward(scratch.output(), &target, grads.d_output_mut());
        let d_input = mlp.backward(&input, &scratch, &mut grads).to_vec();

        let eps = 1e-3_f32;
        let (abs_tol, rel_tol) = (1e-3_f32, 1e-2_f32);
        let mut scratch_tmp = mlp.scratch();

        for layer_idx in 0..mlp.num_layers() {
            let w_len = mlp.layers[layer_idx].weights().len();
            for p in 0..w_len {
                let orig = mlp.layers[layer_idx].weights()[p];
                mlp.layers[layer_idx].weights_mut()[p] = orig + eps;
                let plus = loss_for_mlp(&mlp, &input, &target, &mut scratch_tmp);
                mlp.layers[layer_idx].weights_mut()[p] = orig - eps;
                let minus = loss_for_mlp(&mlp, &input, &target, &mut scratch_tmp);
                mlp.layers[layer_idx].weights_mut()[p] = orig;

                let numeric = (plus - minus) / (2.0 * eps);
                assert_close(grads.d_weights(layer_idx)[p], numeric, abs_tol, rel_tol);
            }

            let b_len = mlp.layers[layer_idx].out_dim();
            for p in 0..b_len {
                let orig = mlp.layers[layer_idx].biases()[p];
                mlp.layers[layer_idx].biases_mut()[p] = orig + eps;
                let plus = loss_for_mlp(&mlp, &input, &target, &mut scratch_tmp);
                mlp.layers[layer_idx].biases_mut()[p] = orig - eps;
                let minus = loss_for_mlp(&mlp, &input, &target, &mut scratch_tmp);
                mlp.layers[layer_idx].biases_mut()[p] = orig;

                let numeric = (plus - minus) / (2.0 * eps);
                assert_close(grads.d_biases(layer_idx)[p], numeric, abs_tol, rel_tol);
            }
        }

        let mut input_var = input;
        for i in 0..input_var.len() {
            let orig = input_var[i];
            input_var[i] = orig + eps;
            let plus = loss_for_mlp(&mlp, &input_var, &target, &mut scratch_tmp);
            input_var[i] = orig - eps;
            let minus = loss_for_mlp(&mlp, &input_var, &target, &mut scratch_tmp);
            input_var[i] = orig;

            let numeric = (plus - minus) / (2.0 * eps);
            assert_close(d_input[i], numeric, abs_tol, rel_tol);
        }
    }

    #[test]
    fn dropout_only_applies_in_training_forward() {
        let mlp = MlpBuilder::new(4)
            .unwrap()
            .add_layer(32, Activation::ReLU)
            .unwrap()
            .with_dropout(0.5)
            .unwrap()
            .add_layer(3, Activation::Identity)
            .unwrap()
            .build_with_seed(0)
            .unwrap();
        let input = [0.5_f32, -0.1, 0.2, 0.9];

        let mut s1 = mlp.scratch();
        let mut s2 = mlp.scratch();
        let eval_a = mlp.forward(&input, &mut s1).to_vec();
        let eval_b = mlp.forward(&input, &mut s2).to_vec();
        assert_eq!(eval_a, eval_b);

        let mut rng = StdRng::seed_from_u64(3);
        let train = mlp.forward_train(&input, &mut s1, &mut rng).to_vec();
        assert_ne!(train, eval_a);

        // Same seed, same mask.
        let mut rng = StdRng::seed_from_u64(3);
        let again = mlp.forward_train(&input, &mut s2, &mut rng).to_vec();
        assert_eq!(train, again);
    }

    #[test]
    fn accumulate_then_scale_averages() {
        let mlp = small_mlp(0);
        let mut a = mlp.gradients();
        let mut b = mlp.gradients();
        a.d_weights_mut(0).fill(1.0);
        b.d_weights_mut(0).fill(3.0);
        b.d_biases_mut(1).fill(4.0);

        let mut sum = mlp.gradients();
        sum.accumulate(&a);
        sum.accumulate(&b);
        sum.scale(0.5);
        assert!(sum.d_weights(0).iter().all(|&g| g == 2.0));
        assert!(sum.d_biases(1).iter().all(|&g| g == 2.0));

        sum.zero();
        assert!(sum.d_weights(0).iter().all(|&g| g == 0.0));
    }

    #[test]
    fn memory_usage_counts_weights_and_biases() {
        let mlp = small_mlp(0);
        // (2*3 + 3) + (3*2 + 2) f32 values
        assert_eq!(mlp.memory_usage().unwrap(), 17 * 4);
        assert_eq!(memory::estimate(std::iter::once(&mlp)).unwrap(), 17 * 4);
    }

    #[test]
    #[should_panic]
    fn forward_panics_on_input_shape_mismatch() {
        let mlp = small_mlp(0);
        let mut scratch = mlp.scratch();
        mlp.forward(&[0.0_f32; 3], &mut scratch);
    }

    #[test]
    #[should_panic]
    fn forward_panics_on_scratch_mismatch() {
        let a = small_mlp(0);
        let b = MlpBuilder::new(2)
            .unwrap()
            .add_layer(4, Activation::Tanh)
            .unwrap()
            .add_layer(2, Activation::Identity)
            .unwrap()
            .build_with_seed(0)
            .unwrap();
        let mut scratch_b = b.scratch();
        a.forward(&[0.0_f32; 2], &mut scratch_b);
    }
}
