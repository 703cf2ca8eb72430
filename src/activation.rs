//! Activation functions.
//!
//! A dense layer computes `z = W x + b` and then `y = activation(z)` element-wise.
//! Only the post-activation `y` is cached in `Scratch`; backprop recovers
//! `dy/dz` from `y`, so no separate pre-activation buffer is needed.
//!
//! The classifier head uses `Identity` and leaves normalization to
//! [`softmax_in_place`] / the softmax cross-entropy loss.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
/// Element-wise activation function.
pub enum Activation {
    #[default]
    ReLU,
    Tanh,
    Sigmoid,
    Identity,
}

impl Activation {
    #[inline]
    pub(crate) fn forward(self, x: f32) -> f32 {
        match self {
            Activation::ReLU => x.max(0.0),
            Activation::Tanh => x.tanh(),
            Activation::Sigmoid => sigmoid(x),
            Activation::Identity => x,
        }
    }

    /// `dy/dz` expressed in terms of the cached output `y`.
    #[inline]
    pub(crate) fn grad_from_output(self, y: f32) -> f32 {
        match self {
            Activation::ReLU => {
                if y > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::Tanh => 1.0 - y * y,
            Activation::Sigmoid => y * (1.0 - y),
            Activation::Identity => 1.0,
        }
    }
}

/// Turn a row of logits into class probabilities.
///
/// Max-shifted so large logits do not overflow. An empty slice is left alone.
pub fn softmax_in_place(logits: &mut [f32]) {
    let Some(&first) = logits.first() else {
        return;
    };
    let max = logits.iter().copied().fold(first, f32::max);

    let mut sum = 0.0_f32;
    for v in logits.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    let inv = 1.0 / sum;
    for v in logits.iter_mut() {
        *v *= inv;
    }
}

#[inline]
pub(crate) fn sigmoid(x: f32) -> f32 {
    if x >= 0.0 {
        let z = (-x).exp();
        1.0 / (1.0 + z)
    } else {
        let z = x.exp();
        z / (1.0 + z)
    }
}
