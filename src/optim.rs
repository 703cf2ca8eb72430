//! Optimizers.
//!
//! Optimizer *state* (momentum buffers, Adam moments) lives outside the model in
//! an [`OptimizerState`] owned by the training loop and reused across steps.

use crate::{Error, Gradients, Mlp, Result};

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
/// Optimizer choice for training.
pub enum Optimizer {
    Sgd,
    SgdMomentum { momentum: f32 },
    /// Bias-corrected Adam.
    Adam { beta1: f32, beta2: f32, eps: f32 },
}

impl Default for Optimizer {
    fn default() -> Self {
        Optimizer::Adam {
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-7,
        }
    }
}

impl Optimizer {
    /// Validate hyperparameters.
    pub fn validate(self) -> Result<()> {
        match self {
            Optimizer::Sgd => Ok(()),
            Optimizer::SgdMomentum { momentum } => {
                if !(momentum.is_finite() && (0.0..1.0).contains(&momentum)) {
                    return Err(Error::InvalidConfig(format!(
                        "momentum must be finite and in [0,1), got {momentum}"
                    )));
                }
                Ok(())
            }
            Optimizer::Adam { beta1, beta2, eps } => {
                for (name, beta) in [("beta1", beta1), ("beta2", beta2)] {
                    if !(beta.is_finite() && (0.0..1.0).contains(&beta)) {
                        return Err(Error::InvalidConfig(format!(
                            "adam {name} must be finite and in [0,1), got {beta}"
                        )));
                    }
                }
                if !(eps.is_finite() && eps > 0.0) {
                    return Err(Error::InvalidConfig(format!(
                        "adam eps must be finite and > 0, got {eps}"
                    )));
                }
                Ok(())
            }
        }
    }

    /// Allocate optimizer state for `model`.
    pub fn state(self, model: &Mlp) -> Result<OptimizerState> {
        self.validate()?;

        Ok(match self {
            Optimizer::Sgd => OptimizerState::Sgd,
            Optimizer::SgdMomentum { momentum } => OptimizerState::SgdMomentum {
                momentum,
                velocity: model.gradients(),
            },
            Optimizer::Adam { beta1, beta2, eps } => OptimizerState::Adam {
                beta1,
                beta2,
                eps,
                beta1_pow: 1.0,
                beta2_pow: 1.0,
                m: model.gradients(),
                v: model.gradients(),
            },
        })
    }
}

/// Owned optimizer state. Moment buffers reuse the `Gradients` layout.
#[derive(Debug, Clone)]
pub enum OptimizerState {
    Sgd,
    SgdMomentum {
        momentum: f32,
        velocity: Gradients,
    },
    Adam {
        beta1: f32,
        beta2: f32,
        eps: f32,
        beta1_pow: f32,
        beta2_pow: f32,
        m: Gradients,
        v: Gradients,
    },
}

impl OptimizerState {
    /// Apply one step. `grads` may be overwritten with the update direction.
    pub fn step(&mut self, model: &mut Mlp, grads: &mut Gradients, lr: f32) {
        assert!(lr.is_finite() && lr > 0.0, "lr must be finite and > 0");

        match self {
            OptimizerState::Sgd => model.sgd_step(grads, lr),
            OptimizerState::SgdMomentum { momentum, velocity } => {
                for layer_idx in 0..model.num_layers() {
                    momentum_update(
                        *momentum,
                        velocity.d_weights_mut(layer_idx),
                        grads.d_weights(layer_idx),
                    );
                    momentum_update(
                        *momentum,
                        velocity.d_biases_mut(layer_idx),
                        grads.d_biases(layer_idx),
                    );
                }
                model.sgd_step(velocity, lr);
            }
            OptimizerState::Adam {
                beta1,
                beta2,
                eps,
                beta1_pow,
                beta2_pow,
                m,
                v,
            } => {
                *beta1_pow *= *beta1;
                *beta2_pow *= *beta2;
                let moments = AdamMoments {
                    beta1: *beta1,
                    beta2: *beta2,
                    eps: *eps,
                    corr1: 1.0 - *beta1_pow,
                    corr2: 1.0 - *beta2_pow,
                };

                for layer_idx in 0..model.num_layers() {
                    moments.apply(
                        m.d_weights_mut(layer_idx),
                        v.d_weights_mut(layer_idx),
                        grads.d_weights_mut(layer_idx),
                    );
                    moments.apply(
                        m.d_biases_mut(layer_idx),
                        v.d_biases_mut(layer_idx),
                        grads.d_biases_mut(layer_idx),
                    );
                }
                model.sgd_step(grads, lr);
            }
        }
    }
}

#[inline]
fn momentum_update(momentum: f32, velocity: &mut [f32], grad: &[f32]) {
    debug_assert_eq!(velocity.len(), grad.len());
    for (v, &g) in velocity.iter_mut().zip(grad) {
        *v = momentum * *v + g;
    }
}

struct AdamMoments {
    beta1: f32,
    beta2: f32,
    eps: f32,
    corr1: f32,
    corr2: f32,
}

impl AdamMoments {
    /// Update the moments from `grad`, then overwrite `grad` with the
    /// bias-corrected direction `m_hat / (sqrt(v_hat) + eps)`.
    #[inline]
    fn apply(&self, m: &mut [f32], v: &mut [f32], grad: &mut [f32]) {
        debug_assert_eq!(m.len(), grad.len());
        debug_assert_eq!(v.len(), grad.len());
        for ((m, v), g) in m.iter_mut().zip(v.iter_mut()).zip(grad.iter_mut()) {
            *m = self.beta1 * *m + (1.0 - self.beta1) * *g;
            *v = self.beta2 * *v + (1.0 - self.beta2) * (*g * *g);
            let m_hat = *m / self.corr1;
            let v_hat = *v / self.corr2;
            *g = m_hat / (v_hat.sqrt() + self.eps);
        }
    }
}
