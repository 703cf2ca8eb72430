//! Loss functions.
//!
//! Allocation-free helpers used like:
//!
//! - run `model.forward(...)`
//! - write `d_output` via a loss (e.g. [`softmax_cross_entropy_backward`])
//! - run `model.backward(...)`
//! - update parameters with an optimizer

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
/// Supported loss functions.
pub enum Loss {
    /// Mean squared error, `0.5 * mean((pred - target)^2)`.
    Mse,
    /// Categorical cross-entropy on raw logits.
    ///
    /// Softmax is applied internally, so the output layer should use
    /// `Activation::Identity`. Targets are one-hot (or any distribution).
    #[default]
    SoftmaxCrossEntropy,
}

impl Loss {
    /// Loss value for one sample. Shape contract: `pred.len() == target.len()`.
    #[inline]
    pub fn forward(self, pred: &[f32], target: &[f32]) -> f32 {
        match self {
            Loss::Mse => mse(pred, target),
            Loss::SoftmaxCrossEntropy => softmax_cross_entropy(pred, target),
        }
    }

    /// Loss value for one sample; writes `dL/d(pred)` into `d_pred`.
    #[inline]
    pub fn backward(self, pred: &[f32], target: &[f32], d_pred: &mut [f32]) -> f32 {
        match self {
            Loss::Mse => mse_backward(pred, target, d_pred),
            Loss::SoftmaxCrossEntropy => softmax_cross_entropy_backward(pred, target, d_pred),
        }
    }
}

/// Mean squared error: `0.5 * mean((pred - target)^2)`.
#[inline]
pub fn mse(pred: &[f32], target: &[f32]) -> f32 {
    assert_eq!(
        pred.len(),
        target.len(),
        "pred len {} does not match target len {}",
        pred.len(),
        target.len()
    );
    if pred.is_empty() {
        return 0.0;
    }

    let mut sum_sq = 0.0_f32;
    for (&p, &t) in pred.iter().zip(target) {
        let diff = p - t;
        sum_sq = diff.mul_add(diff, sum_sq);
    }
    0.5 * sum_sq / pred.len() as f32
}

/// MSE + gradient: `d_pred[i] = (pred[i] - target[i]) / N`.
#[inline]
pub fn mse_backward(pred: &[f32], target: &[f32], d_pred: &mut [f32]) -> f32 {
    assert_eq!(
        pred.len(),
        target.len(),
        "pred len {} does not match target len {}",
        pred.len(),
        target.len()
    );
    assert_eq!(
        pred.len(),
        d_pred.len(),
        "pred len {} does not match d_pred len {}",
        pred.len(),
        d_pred.len()
    );
    if pred.is_empty() {
        return 0.0;
    }

    let inv_n = 1.0 / pred.len() as f32;
    let mut sum_sq = 0.0_f32;
    for i in 0..pred.len() {
        let diff = pred[i] - target[i];
        sum_sq = diff.mul_add(diff, sum_sq);
        d_pred[i] = diff * inv_n;
    }
    0.5 * sum_sq * inv_n
}

/// Categorical cross-entropy of one sample: `-sum_i t_i * log softmax(logits)_i`.
#[inline]
pub fn softmax_cross_entropy(logits: &[f32], target: &[f32]) -> f32 {
    assert_eq!(
        logits.len(),
        target.len(),
        "pred len {} does not match target len {}",
        logits.len(),
        target.len()
    );
    assert!(
        !logits.is_empty(),
        "softmax_cross_entropy requires at least 1 class"
    );

    let (log_sum_exp, _) = log_sum_exp_and_max(logits);
    let mut loss = 0.0_f32;
    for (&x, &t) in logits.iter().zip(target) {
        if t != 0.0 {
            loss -= t * (x - log_sum_exp);
        }
    }
    loss
}

/// Cross-entropy + gradient w.r.t. the logits.
///
/// Writes `d_logits = softmax(logits) * sum(target) - target`, which is
/// `softmax - target` for a one-hot target. Softmax is built in `d_logits`
/// first, so no extra buffer is needed.
#[inline]
pub fn softmax_cross_entropy_backward(logits: &[f32], target: &[f32], d_logits: &mut [f32]) -> f32 {
    assert_eq!(
        logits.len(),
        target.len(),
        "pred len {} does not match target len {}",
        logits.len(),
        target.len()
    );
    assert_eq!(
        logits.len(),
        d_logits.len(),
        "pred len {} does not match d_pred len {}",
        logits.len(),
        d_logits.len()
    );
    assert!(
        !logits.is_empty(),
        "softmax_cross_entropy_backward requires at least 1 class"
    );

    let (log_sum_exp, max_logit) = log_sum_exp_and_max(logits);

    let mut sum_exp = 0.0_f32;
    for (d, &x) in d_logits.iter_mut().zip(logits) {
        *d = (x - max_logit).exp();
        sum_exp += *d;
    }

    let mut loss = 0.0_f32;
    let mut target_mass = 0.0_f32;
    for (&x, &t) in logits.iter().zip(target) {
        target_mass += t;
        if t != 0.0 {
            loss -= t * (x - log_sum_exp);
        }
    }

    let inv_sum = 1.0 / sum_exp;
    for (d, &t) in d_logits.iter_mut().zip(target) {
        *d = *d * inv_sum * target_mass - t;
    }
    loss
}

#[inline]
fn log_sum_exp_and_max(xs: &[f32]) -> (f32, f32) {
    let max_x = xs.iter().copied().fold(xs[0], f32::max);
    let sum_exp: f32 = xs.iter().map(|&x| (x - max_x).exp()).sum();
    (max_x + sum_exp.ln(), max_x)
}
