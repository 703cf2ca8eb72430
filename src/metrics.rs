//! Streaming evaluation metrics.
//!
//! Metrics never take part in backprop. Each accumulator keeps a couple of
//! running counters, is fed once per batch via [`StreamingMetric::update`], and
//! turns its counters into a ratio on demand. No per-example history is kept.
//!
//! Batches are flat row-major buffers of shape `(batch, num_classes)`: one-hot
//! targets on one side, per-class scores (logits or probabilities) on the other.
//! Both are reduced to class indices with [`argmax`] before counting.
//!
//! # Positive class
//!
//! [`Precision`] and [`Recall`] score a single positive class against a single
//! negative class, [`BinaryClasses::default`] being positive `1` / negative `0`.
//! On a multi-class problem every row whose label is neither of the two is
//! ignored. Use [`Precision::with_classes`] / [`Recall::with_classes`] to pick a
//! different pair.
//!
//! # Empty denominators
//!
//! When nothing has been counted in the denominator, `result()` returns `0.0`
//! and `is_defined()` reports `false`.

use std::fmt;

use crate::{Error, Result};

/// Reduce one score row to a class index.
///
/// Ties go to the lowest index. `NaN` entries are skipped, wherever they sit.
/// An empty or all-`NaN` row yields `0`.
#[inline]
pub fn argmax(row: &[f32]) -> usize {
    let mut best: Option<usize> = None;
    for (i, &v) in row.iter().enumerate() {
        if v.is_nan() {
            continue;
        }
        match best {
            Some(b) if v <= row[b] => {}
            _ => best = Some(i),
        }
    }
    best.unwrap_or(0)
}

/// Interface shared by every accumulator driven by the training loop.
pub trait StreamingMetric: fmt::Debug {
    /// Short display name (`"precision"`, `"recall"`, ...).
    fn name(&self) -> &'static str;

    /// Fold one batch into the running counters.
    ///
    /// Fails with [`Error::InvalidShape`] when the two buffers disagree in length
    /// or are not a whole number of `num_classes`-wide rows. Counters are left
    /// untouched on error.
    fn update(&mut self, targets: &[f32], preds: &[f32], num_classes: usize) -> Result<()>;

    /// Current value in `[0, 1]`.
    fn result(&self) -> f64;

    /// Whether `result()` is backed by a non-empty denominator.
    fn is_defined(&self) -> bool;

    /// Back to the freshly constructed state.
    fn reset(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
/// Metrics selectable from a training configuration.
pub enum MetricKind {
    /// Categorical accuracy (argmax match).
    Accuracy,
    Precision,
    Recall,
}

impl MetricKind {
    pub fn name(self) -> &'static str {
        match self {
            MetricKind::Accuracy => "accuracy",
            MetricKind::Precision => "precision",
            MetricKind::Recall => "recall",
        }
    }

    /// A fresh accumulator for this metric.
    pub fn accumulator(self) -> Box<dyn StreamingMetric> {
        match self {
            MetricKind::Accuracy => Box::new(Accuracy::new()),
            MetricKind::Precision => Box::new(Precision::new()),
            MetricKind::Recall => Box::new(Recall::new()),
        }
    }
}

/// The class pair scored by [`Precision`] and [`Recall`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryClasses {
    pub positive: usize,
    pub negative: usize,
}

impl Default for BinaryClasses {
    fn default() -> Self {
        Self {
            positive: 1,
            negative: 0,
        }
    }
}

/// Validate a batch and yield `(true_class, pred_class)` per row.
fn class_pairs<'a>(
    targets: &'a [f32],
    preds: &'a [f32],
    num_classes: usize,
) -> Result<impl Iterator<Item = (usize, usize)> + 'a> {
    if num_classes == 0 {
        return Err(Error::InvalidShape("num_classes must be > 0".to_owned()));
    }
    if targets.len() != preds.len() {
        return Err(Error::InvalidShape(format!(
            "targets len {} does not match preds len {}",
            targets.len(),
            preds.len()
        )));
    }
    if !targets.len().is_multiple_of(num_classes) {
        return Err(Error::InvalidShape(format!(
            "batch len {} is not a multiple of num_classes {num_classes}",
            targets.len()
        )));
    }

    Ok(targets
        .chunks_exact(num_classes)
        .zip(preds.chunks_exact(num_classes))
        .map(|(t, p)| (argmax(t), argmax(p))))
}

#[inline]
fn ratio(num: u64, other: u64) -> f64 {
    let den = num + other;
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// `tp / (tp + fp)` for the positive class.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Precision {
    classes: BinaryClasses,
    true_positives: u64,
    false_positives: u64,
}

impl Precision {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_classes(classes: BinaryClasses) -> Self {
        Self {
            classes,
            ..Self::default()
        }
    }

    #[inline]
    pub fn true_positives(&self) -> u64 {
        self.true_positives
    }

    #[inline]
    pub fn false_positives(&self) -> u64 {
        self.false_positives
    }

    /// Add the counters of a partial accumulator (e.g. one per worker).
    pub fn merge(&mut self, other: &Precision) -> Result<()> {
        if self.classes != other.classes {
            return Err(Error::InvalidConfig(format!(
                "cannot merge precision over {:?} into precision over {:?}",
                other.classes, self.classes
            )));
        }
        self.true_positives += other.true_positives;
        self.false_positives += other.false_positives;
        Ok(())
    }
}

impl StreamingMetric for Precision {
    fn name(&self) -> &'static str {
        "precision"
    }

    fn update(&mut self, targets: &[f32], preds: &[f32], num_classes: usize) -> Result<()> {
        let BinaryClasses { positive, negative } = self.classes;
        let (mut tp, mut fp) = (0, 0);
        for (t, p) in class_pairs(targets, preds, num_classes)? {
            if p != positive {
                continue;
            }
            if t == positive {
                tp += 1;
            } else if t == negative {
                fp += 1;
            }
        }
        self.true_positives += tp;
        self.false_positives += fp;
        Ok(())
    }

    fn result(&self) -> f64 {
        ratio(self.true_positives, self.false_positives)
    }

    fn is_defined(&self) -> bool {
        self.true_positives + self.false_positives > 0
    }

    fn reset(&mut self) {
        self.true_positives = 0;
        self.false_positives = 0;
    }
}

/// `tp / (tp + fn)` for the positive class.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recall {
    classes: BinaryClasses,
    true_positives: u64,
    false_negatives: u64,
}

impl Recall {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_classes(classes: BinaryClasses) -> Self {
        Self {
            classes,
            ..Self::default()
        }
    }

    #[inline]
    pub fn true_positives(&self) -> u64 {
        self.true_positives
    }

    #[inline]
    pub fn false_negatives(&self) -> u64 {
        self.false_negatives
    }

    /// Add the counters of a partial accumulator (e.g. one per worker).
    pub fn merge(&mut self, other: &Recall) -> Result<()> {
        if self.classes != other.classes {
            return Err(Error::InvalidConfig(format!(
                "cannot merge recall over {:?} into recall over {:?}",
                other.classes, self.classes
            )));
        }
        self.true_positives += other.true_positives;
        self.false_negatives += other.false_negatives;
        Ok(())
    }
}

impl StreamingMetric for Recall {
    fn name(&self) -> &'static str {
        "recall"
    }

    fn update(&mut self, targets: &[f32], preds: &[f32], num_classes: usize) -> Result<()> {
        let BinaryClasses { positive, negative } = self.classes;
        let (mut tp, mut fn_) = (0, 0);
        for (t, p) in class_pairs(targets, preds, num_classes)? {
            if t != positive {
                continue;
            }
            if p == positive {
                tp += 1;
            } else if p == negative {
                fn_ += 1;
            }
        }
        self.true_positives += tp;
        self.false_negatives += fn_;
        Ok(())
    }

    fn result(&self) -> f64 {
        ratio(self.true_positives, self.false_negatives)
    }

    fn is_defined(&self) -> bool {
        self.true_positives + self.false_negatives > 0
    }

    fn reset(&mut self) {
        self.true_positives = 0;
        self.false_negatives = 0;
    }
}

/// Fraction of rows whose predicted class matches the target class.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Accuracy {
    correct: u64,
    total: u64,
}

impl Accuracy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(&mut self, other: &Accuracy) {
        self.correct += other.correct;
        self.total += other.total;
    }
}

impl StreamingMetric for Accuracy {
    fn name(&self) -> &'static str {
        "accuracy"
    }

    fn update(&mut self, targets: &[f32], preds: &[f32], num_classes: usize) -> Result<()> {
        let (mut correct, mut total) = (0, 0);
        for (t, p) in class_pairs(targets, preds, num_classes)? {
            correct += u64::from(t == p);
            total += 1;
        }
        self.correct += correct;
        self.total += total;
        Ok(())
    }

    fn result(&self) -> f64 {
        ratio(self.correct, self.total - self.correct)
    }

    fn is_defined(&self) -> bool {
        self.total > 0
    }

    fn reset(&mut self) {
        self.correct = 0;
        self.total = 0;
    }
}
