//! Model builder.
//!
//! `MlpBuilder` makes the topology explicit: dense layer sizes, activations and
//! per-layer dropout. It picks the initializer from the activation:
//!
//! - `relu`: He uniform
//! - `tanh` / `sigmoid` / `identity`: Glorot uniform

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::{Activation, Error, Init, Layer, Mlp, Result};

#[derive(Debug, Clone, Copy)]
struct LayerSpec {
    out_dim: usize,
    activation: Activation,
    dropout: f32,
}

#[derive(Debug, Clone)]
/// Builder for an `Mlp`.
///
/// ```rust
/// use cifar_dnn::{Activation, MlpBuilder};
///
/// # fn main() -> cifar_dnn::Result<()> {
/// let mlp = MlpBuilder::new(32 * 32 * 3)?
///     .add_layer(128, Activation::ReLU)?
///     .with_dropout(0.2)?
///     .add_layer(64, Activation::ReLU)?
///     .with_dropout(0.2)?
///     .add_layer(10, Activation::Identity)?
///     .build_with_seed(0)?;
/// assert_eq!(mlp.output_dim(), 10);
/// # Ok(())
/// # }
/// ```
pub struct MlpBuilder {
    input_dim: usize,
    layers: Vec<LayerSpec>,
}

impl MlpBuilder {
    /// Start building an MLP that accepts inputs of length `input_dim`.
    pub fn new(input_dim: usize) -> Result<Self> {
        if input_dim == 0 {
            return Err(Error::InvalidConfig("input_dim must be > 0".to_owned()));
        }
        Ok(Self {
            input_dim,
            layers: Vec::new(),
        })
    }

    /// Add a dense layer with `out_dim` outputs.
    pub fn add_layer(mut self, out_dim: usize, activation: Activation) -> Result<Self> {
        if out_dim == 0 {
            return Err(Error::InvalidConfig("layer out_dim must be > 0".to_owned()));
        }
        self.layers.push(LayerSpec {
            out_dim,
            activation,
            dropout: 0.0,
        });
        Ok(self)
    }

    /// Drop the outputs of the most recently added layer with probability
    /// `rate` during training.
    pub fn with_dropout(mut self, rate: f32) -> Result<Self> {
        if !(rate.is_finite() && (0.0..1.0).contains(&rate)) {
            return Err(Error::InvalidConfig(format!(
                "dropout rate must be finite and in [0,1), got {rate}"
            )));
        }
        let last = self.layers.last_mut().ok_or_else(|| {
            Error::InvalidConfig("dropout must follow a layer".to_owned())
        })?;
        last.dropout = rate;
        Ok(self)
    }

    /// Build using a deterministic seed.
    pub fn build_with_seed(self, seed: u64) -> Result<Mlp> {
        let mut rng = StdRng::seed_from_u64(seed);
        self.build_with_rng(&mut rng)
    }

    /// Build using the provided RNG.
    pub fn build_with_rng<R: Rng + ?Sized>(self, rng: &mut R) -> Result<Mlp> {
        if self.layers.is_empty() {
            return Err(Error::InvalidConfig(
                "mlp must have at least one layer".to_owned(),
            ));
        }

        let mut layers = Vec::with_capacity(self.layers.len());
        let mut in_dim = self.input_dim;
        for spec in self.layers {
            let init = default_init_for_activation(spec.activation);
            let layer = Layer::new_with_rng(in_dim, spec.out_dim, init, spec.activation, rng)?
                .with_dropout(spec.dropout)?;
            layers.push(layer);
            in_dim = spec.out_dim;
        }

        Ok(Mlp::from_layers(layers))
    }
}

#[inline]
fn default_init_for_activation(act: Activation) -> Init {
    match act {
        Activation::Tanh | Activation::Sigmoid | Activation::Identity => Init::Xavier,
        Activation::ReLU => Init::He,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_degenerate_topologies() {
        assert!(MlpBuilder::new(0).is_err());
        assert!(MlpBuilder::new(4).unwrap().build_with_seed(0).is_err());
        assert!(
            MlpBuilder::new(4)
                .unwrap()
                .add_layer(0, Activation::ReLU)
                .is_err()
        );
        assert!(MlpBuilder::new(4).unwrap().with_dropout(0.2).is_err());
    }

    #[test]
    fn dropout_attaches_to_previous_layer() {
        let mlp = MlpBuilder::new(4)
            .unwrap()
            .add_layer(8, Activation::ReLU)
            .unwrap()
            .with_dropout(0.25)
            .unwrap()
            .add_layer(2, Activation::Identity)
            .unwrap()
            .build_with_seed(0)
            .unwrap();

        assert_eq!(mlp.layer(0).unwrap().dropout(), 0.25);
        assert_eq!(mlp.layer(1).unwrap().dropout(), 0.0);
        assert_eq!(mlp.input_dim(), 4);
        assert_eq!(mlp.output_dim(), 2);
    }
}
