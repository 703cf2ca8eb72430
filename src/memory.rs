//! Parameter memory estimation.
//!
//! Reports how many bytes a model's parameter tensors occupy. This is a
//! diagnostic number only: activations, optimizer state and scratch buffers are
//! not counted, and nothing here is used to drive allocation.
//!
//! A model is seen as an ordered collection of layers, each exposing zero or
//! more [`TensorSpec`]s through [`Parameterized`]. The total is recomputed on
//! every call.

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
/// Numeric element type of a parameter tensor.
pub enum DType {
    F16,
    F32,
    F64,
    I32,
    U8,
}

impl DType {
    /// Width of one element in bytes.
    #[inline]
    pub const fn size_bytes(self) -> usize {
        match self {
            DType::U8 => 1,
            DType::F16 => 2,
            DType::F32 | DType::I32 => 4,
            DType::F64 => 8,
        }
    }
}

/// Shape and element type of one parameter tensor.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct TensorSpec {
    shape: Vec<usize>,
    dtype: DType,
}

impl TensorSpec {
    /// Every dimension must be positive and the shape must not be empty.
    pub fn new(shape: Vec<usize>, dtype: DType) -> Result<Self> {
        if shape.is_empty() {
            return Err(Error::InvalidShape(
                "parameter tensor shape must have at least one dimension".to_owned(),
            ));
        }
        if let Some(axis) = shape.iter().position(|&d| d == 0) {
            return Err(Error::InvalidShape(format!(
                "parameter tensor shape {shape:?} has a zero-sized axis {axis}"
            )));
        }
        Ok(Self { shape, dtype })
    }

    /// For shapes already validated by the owning layer.
    #[inline]
    pub(crate) fn from_valid(shape: Vec<usize>, dtype: DType) -> Self {
        debug_assert!(!shape.is_empty() && !shape.contains(&0));
        Self { shape, dtype }
    }

    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    #[inline]
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Product of all dimensions, `None` on overflow.
    pub fn element_count(&self) -> Option<u64> {
        self.shape
            .iter()
            .try_fold(1_u64, |acc, &d| acc.checked_mul(d as u64))
    }

    /// `element_count * dtype width`, `None` on overflow.
    pub fn size_bytes(&self) -> Option<u64> {
        self.element_count()?
            .checked_mul(self.dtype.size_bytes() as u64)
    }
}

/// Anything that owns parameter tensors.
pub trait Parameterized {
    /// The tensors owned directly by `self`, in a stable order.
    fn parameters(&self) -> Vec<TensorSpec>;
}

/// Total parameter bytes across `layers`.
///
/// Fails (without a partial total) if any tensor's byte size or the running sum
/// overflows `u64`.
pub fn estimate<'a, L>(layers: impl IntoIterator<Item = &'a L>) -> Result<u64>
where
    L: Parameterized + ?Sized + 'a,
{
    let mut total = 0_u64;
    for (layer_idx, layer) in layers.into_iter().enumerate() {
        for tensor in layer.parameters() {
            let bytes = tensor.size_bytes().ok_or_else(|| {
                Error::InvalidShape(format!(
                    "layer {layer_idx}: byte size of tensor {:?} overflows u64",
                    tensor.shape()
                ))
            })?;
            total = total.checked_add(bytes).ok_or_else(|| {
                Error::InvalidShape("total parameter bytes overflow u64".to_owned())
            })?;
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Vec<TensorSpec>);

    impl Parameterized for Fixed {
        fn parameters(&self) -> Vec<TensorSpec> {
            self.0.clone()
        }
    }

    fn dense_128x64() -> Fixed {
        Fixed(vec![TensorSpec::new(vec![128, 64], DType::F32).unwrap()])
    }

    #[test]
    fn single_weight_matrix() {
        let model = [dense_128x64()];
        assert_eq!(estimate(&model).unwrap(), 32_768);
    }

    #[test]
    fn layers_add_up() {
        let model = [dense_128x64(), dense_128x64()];
        assert_eq!(estimate(&model).unwrap(), 65_536);

        let separately: u64 = model
            .iter()
            .map(|l| estimate(std::iter::once(l)).unwrap())
            .sum();
        assert_eq!(separately, 65_536);
    }

    #[test]
    fn empty_and_parameterless_models_are_zero() {
        let empty: [Fixed; 0] = [];
        assert_eq!(estimate(&empty).unwrap(), 0);

        // e.g. flatten / dropout / activation layers
        let model = [Fixed(vec![]), Fixed(vec![])];
        assert_eq!(estimate(&model).unwrap(), 0);
    }

    #[test]
    fn dtype_width_is_respected() {
        let model = [Fixed(vec![
            TensorSpec::new(vec![10, 10], DType::F64).unwrap(),
            TensorSpec::new(vec![10], DType::F16).unwrap(),
            TensorSpec::new(vec![3], DType::U8).unwrap(),
        ])];
        assert_eq!(estimate(&model).unwrap(), 800 + 20 + 3);
    }

    #[test]
    fn invalid_shapes_are_rejected() {
        assert!(TensorSpec::new(vec![], DType::F32).is_err());
        assert!(TensorSpec::new(vec![4, 0], DType::F32).is_err());
    }

    #[test]
    fn overflow_is_an_error_not_a_partial_total() {
        let huge = TensorSpec::new(vec![usize::MAX, usize::MAX], DType::F32).unwrap();
        let model = [dense_128x64(), Fixed(vec![huge])];
        assert!(matches!(estimate(&model), Err(Error::InvalidShape(_))));
    }
}
