//! Dense (fully connected) layer.
//!
//! Weights are row-major with shape `(out_dim, in_dim)`; biases have shape
//! `(out_dim,)`. A layer may carry a dropout rate, applied to its outputs during
//! training only (inverted dropout: kept units are scaled by `1 / (1 - p)`).

use rand::Rng;
use rand::distributions::{Distribution, Uniform};

use crate::matmul::gemm_f32;
use crate::memory::{DType, Parameterized, TensorSpec};
use crate::{Activation, Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Weight initialization scheme. Biases always start at zero.
pub enum Init {
    /// Glorot uniform: `U(-sqrt(6 / (in + out)), +sqrt(6 / (in + out)))`.
    Xavier,
    /// He uniform: `U(-sqrt(6 / in), +sqrt(6 / in))`.
    He,
}

#[derive(Debug, Clone)]
pub struct Layer {
    in_dim: usize,
    out_dim: usize,
    activation: Activation,
    dropout: f32,
    weights: Vec<f32>,
    biases: Vec<f32>,
}

impl Layer {
    pub fn new_with_rng<R: Rng + ?Sized>(
        in_dim: usize,
        out_dim: usize,
        init: Init,
        activation: Activation,
        rng: &mut R,
    ) -> Result<Self> {
        if in_dim == 0 || out_dim == 0 {
            return Err(Error::InvalidConfig(format!(
                "layer dims must be > 0, got in_dim={in_dim} out_dim={out_dim}"
            )));
        }

        let limit = match init {
            Init::Xavier => (6.0 / (in_dim + out_dim) as f32).sqrt(),
            Init::He => (6.0 / in_dim as f32).sqrt(),
        };
        let dist = Uniform::new_inclusive(-limit, limit);
        let weights = (0..in_dim * out_dim).map(|_| dist.sample(rng)).collect();

        Ok(Self {
            in_dim,
            out_dim,
            activation,
            dropout: 0.0,
            weights,
            biases: vec![0.0; out_dim],
        })
    }

    /// Build a layer from explicit parameters (shape- and finiteness-checked).
    pub fn from_parts(
        in_dim: usize,
        out_dim: usize,
        activation: Activation,
        weights: Vec<f32>,
        biases: Vec<f32>,
    ) -> Result<Self> {
        if in_dim == 0 || out_dim == 0 {
            return Err(Error::InvalidShape(format!(
                "layer dims must be > 0, got in_dim={in_dim} out_dim={out_dim}"
            )));
        }
        if weights.len() != in_dim * out_dim {
            return Err(Error::InvalidShape(format!(
                "weights length {} does not match out_dim * in_dim ({out_dim} * {in_dim})",
                weights.len()
            )));
        }
        if biases.len() != out_dim {
            return Err(Error::InvalidShape(format!(
                "biases length {} does not match out_dim {out_dim}",
                biases.len()
            )));
        }
        if weights.iter().chain(&biases).any(|v| !v.is_finite()) {
            return Err(Error::InvalidData(
                "layer parameters must be finite".to_owned(),
            ));
        }

        Ok(Self {
            in_dim,
            out_dim,
            activation,
            dropout: 0.0,
            weights,
            biases,
        })
    }

    /// Set the training-time dropout rate. Must be finite and in `[0, 1)`.
    pub fn with_dropout(mut self, rate: f32) -> Result<Self> {
        if !(rate.is_finite() && (0.0..1.0).contains(&rate)) {
            return Err(Error::InvalidConfig(format!(
                "dropout rate must be finite and in [0,1), got {rate}"
            )));
        }
        self.dropout = rate;
        Ok(self)
    }

    #[inline]
    pub fn in_dim(&self) -> usize {
        self.in_dim
    }

    #[inline]
    pub fn out_dim(&self) -> usize {
        self.out_dim
    }

    #[inline]
    pub fn activation(&self) -> Activation {
        self.activation
    }

    #[inline]
    pub fn dropout(&self) -> f32 {
        self.dropout
    }

    #[inline]
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    #[inline]
    pub fn biases(&self) -> &[f32] {
        &self.biases
    }

    #[inline]
    pub fn weights_mut(&mut self) -> &mut [f32] {
        &mut self.weights
    }

    #[inline]
    pub fn biases_mut(&mut self) -> &mut [f32] {
        &mut self.biases
    }

    /// Forward pass for a single sample: `outputs = activation(W * inputs + b)`.
    ///
    /// Shape contract:
    /// - `inputs.len() == self.in_dim`
    /// - `outputs.len() == self.out_dim`
    #[inline]
    pub fn forward(&self, inputs: &[f32], outputs: &mut [f32]) {
        debug_assert_eq!(inputs.len(), self.in_dim);
        debug_assert_eq!(outputs.len(), self.out_dim);

        outputs.copy_from_slice(&self.biases);
        gemm_f32(
            self.out_dim,
            1,
            self.in_dim,
            1.0,
            &self.weights,
            self.in_dim,
            1,
            inputs,
            1,
            1,
            1.0,
            outputs,
            1,
            1,
        );
        for y in outputs.iter_mut() {
            *y = self.activation.forward(*y);
        }
    }

    /// Draw a dropout mask for this layer and apply it to `outputs` in place.
    ///
    /// `mask[o]` becomes `0` for dropped units and `1 / (1 - p)` for kept ones.
    pub(crate) fn apply_dropout<R: Rng + ?Sized>(
        &self,
        outputs: &mut [f32],
        mask: &mut [f32],
        rng: &mut R,
    ) {
        debug_assert_eq!(outputs.len(), self.out_dim);
        debug_assert_eq!(mask.len(), self.out_dim);

        let keep_scale = 1.0 / (1.0 - self.dropout);
        for (y, m) in outputs.iter_mut().zip(mask.iter_mut()) {
            *m = if rng.gen_bool(f64::from(self.dropout)) {
                0.0
            } else {
                keep_scale
            };
            *y *= *m;
        }
    }

    /// Backward pass for a single sample (overwrite semantics).
    ///
    /// - `outputs`: what `forward` produced (after dropout, if `mask` is given)
    /// - `d_outputs`: upstream gradient dL/d(outputs)
    /// - `mask`: the dropout mask used in the forward pass, if any
    ///
    /// `d_biases` doubles as the dL/dz buffer, so it is written first and then
    /// fed to the weight and input products.
    #[allow(clippy::too_many_arguments)]
    #[inline]
    pub fn backward(
        &self,
        inputs: &[f32],
        outputs: &[f32],
        d_outputs: &[f32],
        mask: Option<&[f32]>,
        d_inputs: &mut [f32],
        d_weights: &mut [f32],
        d_biases: &mut [f32],
    ) {
        debug_assert_eq!(inputs.len(), self.in_dim);
        debug_assert_eq!(outputs.len(), self.out_dim);
        debug_assert_eq!(d_outputs.len(), self.out_dim);
        debug_assert_eq!(d_inputs.len(), self.in_dim);
        debug_assert_eq!(d_weights.len(), self.weights.len());
        debug_assert_eq!(d_biases.len(), self.out_dim);

        for o in 0..self.out_dim {
            d_biases[o] = match mask {
                None => d_outputs[o] * self.activation.grad_from_output(outputs[o]),
                Some(m) if m[o] == 0.0 => 0.0,
                Some(m) => {
                    let y = outputs[o] / m[o];
                    d_outputs[o] * m[o] * self.activation.grad_from_output(y)
                }
            };
        }

        // dW = dz * x^T
        gemm_f32(
            self.out_dim,
            self.in_dim,
            1,
            1.0,
            d_biases,
            1,
            1,
            inputs,
            self.in_dim,
            1,
            0.0,
            d_weights,
            self.in_dim,
            1,
        );
        // dx = W^T * dz
        gemm_f32(
            self.in_dim,
            1,
            self.out_dim,
            1.0,
            &self.weights,
            1,
            self.in_dim,
            d_biases,
            1,
            1,
            0.0,
            d_inputs,
            1,
            1,
        );
    }

    /// `param -= lr * d_param`.
    #[inline]
    pub fn sgd_step(&mut self, d_weights: &[f32], d_biases: &[f32], lr: f32) {
        debug_assert_eq!(d_weights.len(), self.weights.len());
        debug_assert_eq!(d_biases.len(), self.biases.len());

        for (w, &g) in self.weights.iter_mut().zip(d_weights) {
            *w -= lr * g;
        }
        for (b, &g) in self.biases.iter_mut().zip(d_biases) {
            *b -= lr * g;
        }
    }
}

impl Parameterized for Layer {
    fn parameters(&self) -> Vec<TensorSpec> {
        // Dims are validated > 0 at construction.
        vec![
            TensorSpec::from_valid(vec![self.out_dim, self.in_dim], DType::F32),
            TensorSpec::from_valid(vec![self.out_dim], DType::F32),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn forward_computes_affine_then_activation() {
        let layer = Layer::from_parts(
            2,
            2,
            Activation::ReLU,
            vec![1.0, 2.0, -1.0, -1.0],
            vec![0.5, 0.0],
        )
        .unwrap();
        let mut out = [0.0_f32; 2];
        layer.forward(&[1.0, 1.0], &mut out);
        assert_eq!(out, [3.5, 0.0]);
    }

    #[test]
    fn he_init_stays_within_limit() {
        let mut rng = StdRng::seed_from_u64(7);
        let layer = Layer::new_with_rng(50, 20, Init::He, Activation::ReLU, &mut rng).unwrap();
        let limit = (6.0_f32 / 50.0).sqrt();
        assert!(layer.weights().iter().all(|w| w.abs() <= limit));
        assert!(layer.biases().iter().all(|&b| b == 0.0));
    }

    #[test]
    fn dropout_rate_is_validated() {
        let layer = Layer::from_parts(1, 1, Activation::Identity, vec![1.0], vec![0.0]).unwrap();
        assert!(layer.clone().with_dropout(1.0).is_err());
        assert!(layer.clone().with_dropout(-0.1).is_err());
        assert!(layer.with_dropout(0.2).is_ok());
    }

    #[test]
    fn dropout_mask_zeroes_or_rescales() {
        let layer = Layer::from_parts(1, 64, Activation::Identity, vec![1.0; 64], vec![0.0; 64])
            .unwrap()
            .with_dropout(0.5)
            .unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let mut out = [1.0_f32; 64];
        let mut mask = [0.0_f32; 64];
        layer.apply_dropout(&mut out, &mut mask, &mut rng);

        assert!(out.iter().all(|&v| v == 0.0 || v == 2.0));
        assert!(out.iter().any(|&v| v == 0.0));
        assert!(out.iter().any(|&v| v == 2.0));
        assert_eq!(out, mask);
    }

    #[test]
    fn backward_with_dropped_unit_has_zero_gradient() {
        let layer =
            Layer::from_parts(2, 2, Activation::Tanh, vec![0.1, 0.2, 0.3, 0.4], vec![0.0; 2])
                .unwrap();
        let inputs = [1.0_f32, -1.0];
        let mut outputs = [0.0_f32; 2];
        layer.forward(&inputs, &mut outputs);
        outputs[0] = 0.0;
        outputs[1] *= 2.0;
        let mask = [0.0_f32, 2.0];

        let mut d_in = [0.0_f32; 2];
        let mut d_w = [0.0_f32; 4];
        let mut d_b = [0.0_f32; 2];
        layer.backward(
            &inputs,
            &outputs,
            &[1.0, 1.0],
            Some(&mask),
            &mut d_in,
            &mut d_w,
            &mut d_b,
        );

        assert_eq!(d_b[0], 0.0);
        assert_eq!(&d_w[..2], &[0.0, 0.0]);
        assert!(d_b[1] != 0.0);
    }
}
