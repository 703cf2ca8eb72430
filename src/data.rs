//! Contiguous dataset storage.
//!
//! Samples are stored row-major in two flat buffers so the training loop can
//! hand out slices without per-step allocation:
//! - `inputs.len() == len * input_dim`
//! - `targets.len() == len * target_dim`

use crate::{Error, Result};

/// A supervised dataset: inputs (X) and targets (Y).
#[derive(Debug, Clone)]
pub struct Dataset {
    inputs: Vec<f32>,
    targets: Vec<f32>,
    len: usize,
    input_dim: usize,
    target_dim: usize,
}

impl Dataset {
    /// Build a dataset from flat buffers of shape `(len, input_dim)` and
    /// `(len, target_dim)`.
    pub fn from_flat(
        inputs: Vec<f32>,
        targets: Vec<f32>,
        input_dim: usize,
        target_dim: usize,
    ) -> Result<Self> {
        if input_dim == 0 {
            return Err(Error::InvalidData("input_dim must be > 0".to_owned()));
        }
        if target_dim == 0 {
            return Err(Error::InvalidData("target_dim must be > 0".to_owned()));
        }
        if !inputs.len().is_multiple_of(input_dim) {
            return Err(Error::InvalidData(format!(
                "inputs length {} is not divisible by input_dim {input_dim}",
                inputs.len()
            )));
        }

        let len = inputs.len() / input_dim;
        if targets.len() != len * target_dim {
            return Err(Error::InvalidData(format!(
                "targets length {} does not match len * target_dim ({len} * {target_dim})",
                targets.len()
            )));
        }

        Ok(Self {
            inputs,
            targets,
            len,
            input_dim,
            target_dim,
        })
    }

    /// Build a dataset from per-sample rows (copied into contiguous storage).
    pub fn from_rows(inputs: &[Vec<f32>], targets: &[Vec<f32>]) -> Result<Self> {
        if inputs.len() != targets.len() {
            return Err(Error::InvalidData(format!(
                "inputs/targets length mismatch: {} vs {}",
                inputs.len(),
                targets.len()
            )));
        }
        let input_dim = inputs.first().map_or(0, Vec::len);
        let target_dim = targets.first().map_or(0, Vec::len);

        let flatten = |rows: &[Vec<f32>], dim: usize, what: &str| -> Result<Vec<f32>> {
            let mut flat = Vec::with_capacity(rows.len() * dim);
            for (i, row) in rows.iter().enumerate() {
                if row.len() != dim {
                    return Err(Error::InvalidData(format!(
                        "{what} row {i} has len {}, expected {dim}",
                        row.len()
                    )));
                }
                flat.extend_from_slice(row);
            }
            Ok(flat)
        };

        let inputs = flatten(inputs, input_dim, "input")?;
        let targets = flatten(targets, target_dim, "target")?;
        Self::from_flat(inputs, targets, input_dim, target_dim)
    }

    /// Build a classification dataset from integer labels, one-hot encoded over
    /// `num_classes`.
    pub fn from_labels(
        inputs: Vec<f32>,
        labels: &[usize],
        input_dim: usize,
        num_classes: usize,
    ) -> Result<Self> {
        let targets = one_hot(labels, num_classes)?;
        Self::from_flat(inputs, targets, input_dim, num_classes)
    }

    /// Keep only the first `n` samples.
    pub fn truncate(&mut self, n: usize) {
        if n < self.len {
            self.len = n;
            self.inputs.truncate(n * self.input_dim);
            self.targets.truncate(n * self.target_dim);
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    #[inline]
    pub fn target_dim(&self) -> usize {
        self.target_dim
    }

    /// The `idx`-th input row. Panics if `idx >= len`.
    #[inline]
    pub fn input(&self, idx: usize) -> &[f32] {
        let start = idx * self.input_dim;
        &self.inputs[start..start + self.input_dim]
    }

    /// The `idx`-th target row. Panics if `idx >= len`.
    #[inline]
    pub fn target(&self, idx: usize) -> &[f32] {
        let start = idx * self.target_dim;
        &self.targets[start..start + self.target_dim]
    }
}

/// One-hot encode `labels` into a flat `(labels.len(), num_classes)` buffer.
pub fn one_hot(labels: &[usize], num_classes: usize) -> Result<Vec<f32>> {
    if num_classes == 0 {
        return Err(Error::InvalidData("num_classes must be > 0".to_owned()));
    }
    let mut out = vec![0.0_f32; labels.len() * num_classes];
    for (row, &label) in labels.iter().enumerate() {
        if label >= num_classes {
            return Err(Error::InvalidData(format!(
                "label {label} at row {row} is out of range for {num_classes} classes"
            )));
        }
        out[row * num_classes + label] = 1.0;
    }
    Ok(out)
}
