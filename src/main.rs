//! Train the CIFAR-10 dense classifier and report test metrics.
//!
//! ```bash
//! RUST_LOG=info cargo run --release -- --data-dir data/cifar-10-batches-bin
//! ```
//!
//! The binary batches come from
//! <https://www.cs.toronto.edu/~kriz/cifar-10-binary.tar.gz>.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use serde::Serialize;

use cifar_dnn::{
    Activation, EvalReport, FitConfig, FitReport, MetricKind, MlpBuilder, Optimizer, Shuffle,
    cifar,
};

#[derive(Parser)]
#[command(
    name = "cifar-dnn",
    about = "Train a dense network on CIFAR-10 and report precision, recall and memory usage"
)]
struct Args {
    /// Directory holding the CIFAR-10 binary batches
    #[arg(long, default_value = "data/cifar-10-batches-bin")]
    data_dir: PathBuf,

    /// Training epochs
    #[arg(long, default_value_t = 35)]
    epochs: usize,

    /// Mini-batch size
    #[arg(long, default_value_t = 32)]
    batch_size: usize,

    /// Adam learning rate
    #[arg(long, default_value_t = 1e-3)]
    lr: f32,

    /// Dropout rate after each hidden layer
    #[arg(long, default_value_t = 0.2)]
    dropout: f32,

    /// Seed for weight init, shuffling and dropout
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Use only the first N training images
    #[arg(long)]
    train_limit: Option<usize>,

    /// Use only the first N test images
    #[arg(long)]
    test_limit: Option<usize>,

    /// Write a JSON run report to this path
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Serialize)]
struct RunReport<'a> {
    config: &'a FitConfig,
    train_samples: usize,
    test_samples: usize,
    history: &'a FitReport,
    test: &'a EvalReport,
    memory_bytes: u64,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut train = cifar::load_train(&args.data_dir)
        .with_context(|| format!("loading training batches from {}", args.data_dir.display()))?;
    let mut test = cifar::load_test(&args.data_dir)
        .with_context(|| format!("loading test batch from {}", args.data_dir.display()))?;
    if let Some(n) = args.train_limit {
        train.truncate(n);
    }
    if let Some(n) = args.test_limit {
        test.truncate(n);
    }
    info!("{} training / {} test images", train.len(), test.len());

    let mut model = MlpBuilder::new(cifar::INPUT_DIM)?
        .add_layer(128, Activation::ReLU)?
        .with_dropout(args.dropout)?
        .add_layer(64, Activation::ReLU)?
        .with_dropout(args.dropout)?
        .add_layer(cifar::NUM_CLASSES, Activation::Identity)?
        .build_with_seed(args.seed)?;

    let cfg = FitConfig {
        epochs: args.epochs,
        lr: args.lr,
        batch_size: args.batch_size,
        shuffle: Shuffle::Seeded(args.seed),
        optimizer: Optimizer::default(),
        dropout_seed: args.seed,
        ..FitConfig::default()
    };

    let history = model.fit(&train, Some(&test), &cfg).context("training failed")?;
    let scores = model
        .evaluate(&test, cfg.loss, &cfg.metrics, cfg.batch_size)
        .context("evaluation failed")?;

    for kind in [
        MetricKind::Accuracy,
        MetricKind::Precision,
        MetricKind::Recall,
    ] {
        if let Some(value) = scores.metric(kind.name()) {
            println!("Test {}: {value}", kind.name());
        }
    }

    let memory_bytes = model.memory_usage()?;
    println!("Estimated memory usage for the model: {memory_bytes} bytes");

    if let Some(path) = &args.report {
        let report = RunReport {
            config: &cfg,
            train_samples: train.len(),
            test_samples: test.len(),
            history: &history,
            test: &scores,
            memory_bytes,
        };
        let json = serde_json::to_string_pretty(&report)?;
        fs::write(path, json).with_context(|| format!("writing report to {}", path.display()))?;
        info!("wrote run report to {}", path.display());
    }

    Ok(())
}
