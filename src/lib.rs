//! A dense-network image classifier for CIFAR-10, built from scratch.
//!
//! The crate covers the full pipeline: decoding the CIFAR-10 binary batches,
//! a fully connected network with dropout, mini-batch training with Adam,
//! streaming precision / recall / accuracy, and a parameter memory estimate.
//!
//! # Panics vs `Result`
//!
//! Two layers of API:
//!
//! - Low-level hot path (panics on misuse):
//!   - [`Mlp::forward`], [`Mlp::forward_train`], [`Mlp::backward`]
//!     Shape mismatches are programmer error and panic via `assert!`.
//!
//! - High-level APIs (shape-checked):
//!   - [`Mlp::fit`], [`Mlp::evaluate`], [`Mlp::predict`]
//!   - metric updates, [`memory::estimate`], the [`cifar`] loaders
//!     These validate inputs and return [`Result`].
//!
//! # Data layout and shapes
//!
//! - Scalars are `f32`; metric counters are `u64`.
//! - [`Dataset`] stores samples contiguously in row-major layout.
//! - Layer weights are row-major with shape `(out_dim, in_dim)`.
//! - Metric batches are flat `(batch, num_classes)` buffers.
//!
//! # Quick start
//!
//! ```rust
//! use cifar_dnn::{Activation, Dataset, FitConfig, MetricKind, MlpBuilder, Shuffle};
//!
//! # fn main() -> cifar_dnn::Result<()> {
//! let xs = vec![
//!     vec![0.0, 0.0],
//!     vec![0.0, 1.0],
//!     vec![1.0, 0.0],
//!     vec![1.0, 1.0],
//! ];
//! let train = Dataset::from_labels(xs.concat(), &[0, 1, 1, 0], 2, 2)?;
//!
//! let mut mlp = MlpBuilder::new(2)?
//!     .add_layer(8, Activation::ReLU)?
//!     .add_layer(2, Activation::Identity)?
//!     .build_with_seed(0)?;
//!
//! let report = mlp.fit(
//!     &train,
//!     None,
//!     &FitConfig {
//!         epochs: 50,
//!         lr: 1e-2,
//!         batch_size: 4,
//!         shuffle: Shuffle::Seeded(0),
//!         metrics: vec![MetricKind::Precision, MetricKind::Recall],
//!         ..FitConfig::default()
//!     },
//! )?;
//! assert_eq!(report.epochs.len(), 50);
//! Ok(())
//! # }
//! ```
//!
//! # Driving training by hand
//!
//! Buffers are allocated once and reused across steps:
//!
//! ```rust
//! use cifar_dnn::{Activation, Loss, MlpBuilder};
//!
//! # fn main() -> cifar_dnn::Result<()> {
//! let mut mlp = MlpBuilder::new(3)?
//!     .add_layer(8, Activation::Tanh)?
//!     .add_layer(2, Activation::Identity)?
//!     .build_with_seed(0)?;
//!
//! let mut trainer = mlp.trainer();
//! let x = [0.1_f32, -0.2, 0.3];
//! let t = [0.0_f32, 1.0];
//!
//! let y = mlp.forward(&x, &mut trainer.scratch);
//! let _loss = Loss::SoftmaxCrossEntropy.backward(y, &t, trainer.grads.d_output_mut());
//! mlp.backward(&x, &trainer.scratch, &mut trainer.grads);
//! mlp.sgd_step(&trainer.grads, 1e-2);
//! Ok(())
//! # }
//! ```

pub mod activation;
pub mod builder;
pub mod cifar;
pub mod data;
pub mod error;
pub mod layer;
pub mod loss;
pub(crate) mod matmul;
pub mod memory;
pub mod metrics;
pub mod mlp;
pub mod optim;
pub mod train;

pub use activation::Activation;
pub use builder::MlpBuilder;
pub use data::Dataset;
pub use error::{Error, Result};
pub use layer::{Init, Layer};
pub use loss::Loss;
pub use memory::{DType, Parameterized, TensorSpec};
pub use metrics::{Accuracy, BinaryClasses, MetricKind, Precision, Recall, StreamingMetric};
pub use mlp::{Gradients, Mlp, Scratch, Trainer};
pub use optim::{Optimizer, OptimizerState};
pub use train::{EpochReport, EvalReport, FitConfig, FitReport, MetricValue, Shuffle};
