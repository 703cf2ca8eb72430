//! Mini-batch training and evaluation loops.
//!
//! Per-sample forward/backward runs on reusable buffers; per-sample gradients
//! are summed over the mini-batch, averaged, and handed to the optimizer once
//! per batch. Metric accumulators are fed once per batch.

use log::{info, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::metrics::{MetricKind, StreamingMetric};
use crate::{Dataset, Error, Loss, Mlp, Optimizer, Result, Trainer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Sample order within an epoch.
pub enum Shuffle {
    /// Dataset order every epoch.
    None,
    /// Reshuffle every epoch from a seeded RNG.
    Seeded(u64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitConfig {
    pub epochs: usize,
    pub lr: f32,
    pub batch_size: usize,
    pub shuffle: Shuffle,
    pub optimizer: Optimizer,
    pub loss: Loss,
    pub metrics: Vec<MetricKind>,
    /// Seed for the dropout masks.
    pub dropout_seed: u64,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            epochs: 35,
            lr: 1e-3,
            batch_size: 32,
            shuffle: Shuffle::Seeded(0),
            optimizer: Optimizer::default(),
            loss: Loss::default(),
            metrics: vec![
                MetricKind::Accuracy,
                MetricKind::Precision,
                MetricKind::Recall,
            ],
            dropout_seed: 0,
        }
    }
}

impl FitConfig {
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(Error::InvalidConfig("epochs must be > 0".to_owned()));
        }
        if !(self.lr.is_finite() && self.lr > 0.0) {
            return Err(Error::InvalidConfig("lr must be finite and > 0".to_owned()));
        }
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be > 0".to_owned()));
        }
        self.optimizer.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricValue {
    pub name: &'static str,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
/// Mean loss and final metric values over one pass.
pub struct EvalReport {
    pub loss: f32,
    pub metrics: Vec<MetricValue>,
}

impl EvalReport {
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics
            .iter()
            .find(|m| m.name == name)
            .map(|m| m.value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpochReport {
    pub epoch: usize,
    pub train: EvalReport,
    pub val: Option<EvalReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitReport {
    pub epochs: Vec<EpochReport>,
}

/// Reusable per-batch buffers shared by `fit` and `evaluate`.
struct BatchBuffers {
    targets: Vec<f32>,
    preds: Vec<f32>,
    target_dim: usize,
}

impl BatchBuffers {
    fn new(batch_size: usize, target_dim: usize) -> Self {
        Self {
            targets: Vec::with_capacity(batch_size * target_dim),
            preds: Vec::with_capacity(batch_size * target_dim),
            target_dim,
        }
    }

    fn clear(&mut self) {
        self.targets.clear();
        self.preds.clear();
    }

    fn push(&mut self, target: &[f32], pred: &[f32]) {
        self.targets.extend_from_slice(target);
        self.preds.extend_from_slice(pred);
    }

    fn feed(&self, metrics: &mut [Box<dyn StreamingMetric>]) -> Result<()> {
        for m in metrics.iter_mut() {
            m.update(&self.targets, &self.preds, self.target_dim)?;
        }
        Ok(())
    }
}

fn collect_metrics(metrics: &[Box<dyn StreamingMetric>]) -> Vec<MetricValue> {
    metrics
        .iter()
        .map(|m| MetricValue {
            name: m.name(),
            value: m.result(),
        })
        .collect()
}

fn format_metrics(report: &EvalReport) -> String {
    report
        .metrics
        .iter()
        .map(|m| format!("{}={:.4}", m.name, m.value))
        .collect::<Vec<_>>()
        .join(" ")
}

impl Mlp {
    fn check_dataset(&self, data: &Dataset, what: &str) -> Result<()> {
        if data.is_empty() {
            return Err(Error::InvalidData(format!("{what} dataset must not be empty")));
        }
        if data.input_dim() != self.input_dim() {
            return Err(Error::InvalidData(format!(
                "{what} input_dim {} does not match model input_dim {}",
                data.input_dim(),
                self.input_dim()
            )));
        }
        if data.target_dim() != self.output_dim() {
            return Err(Error::InvalidData(format!(
                "{what} target_dim {} does not match model output_dim {}",
                data.target_dim(),
                self.output_dim()
            )));
        }
        Ok(())
    }

    /// Train on `train`, optionally evaluating on `val` after every epoch.
    ///
    /// Train metrics are accumulated from the training-mode forward pass
    /// (dropout active), as the weights change within the epoch.
    pub fn fit(
        &mut self,
        train: &Dataset,
        val: Option<&Dataset>,
        cfg: &FitConfig,
    ) -> Result<FitReport> {
        cfg.validate()?;
        self.check_dataset(train, "train")?;
        if let Some(val) = val {
            self.check_dataset(val, "validation")?;
        }

        let mut opt = cfg.optimizer.state(self)?;
        let mut trainer = Trainer::new(self);
        let mut dropout_rng = StdRng::seed_from_u64(cfg.dropout_seed);
        let mut shuffle_rng = match cfg.shuffle {
            Shuffle::None => None,
            Shuffle::Seeded(seed) => Some(StdRng::seed_from_u64(seed)),
        };

        let mut order: Vec<usize> = (0..train.len()).collect();
        let mut metrics: Vec<Box<dyn StreamingMetric>> =
            cfg.metrics.iter().map(|k| k.accumulator()).collect();
        let mut batch = BatchBuffers::new(cfg.batch_size, self.output_dim());
        let mut epochs = Vec::with_capacity(cfg.epochs);

        for epoch in 1..=cfg.epochs {
            if let Some(rng) = shuffle_rng.as_mut() {
                order.shuffle(rng);
            }
            metrics.iter_mut().for_each(|m| m.reset());
            let mut loss_sum = 0.0_f64;

            for chunk in order.chunks(cfg.batch_size) {
                trainer.batch_grads.zero();
                batch.clear();

                for &idx in chunk {
                    let input = train.input(idx);
                    let target = train.target(idx);

                    let pred = self.forward_train(input, &mut trainer.scratch, &mut dropout_rng);
                    batch.push(target, pred);
                    let loss = cfg.loss.backward(pred, target, trainer.grads.d_output_mut());
                    loss_sum += f64::from(loss);

                    self.backward(input, &trainer.scratch, &mut trainer.grads);
                    trainer.batch_grads.accumulate(&trainer.grads);
                }

                trainer.batch_grads.scale(1.0 / chunk.len() as f32);
                opt.step(self, &mut trainer.batch_grads, cfg.lr);
                batch.feed(&mut metrics)?;
            }

            let train_loss = (loss_sum / train.len() as f64) as f32;
            if !train_loss.is_finite() {
                return Err(Error::InvalidData(format!(
                    "training loss became non-finite at epoch {epoch}"
                )));
            }
            let train_report = EvalReport {
                loss: train_loss,
                metrics: collect_metrics(&metrics),
            };

            let val_report = match val {
                Some(val) => Some(self.evaluate(val, cfg.loss, &cfg.metrics, cfg.batch_size)?),
                None => None,
            };

            match &val_report {
                Some(v) => info!(
                    "epoch {epoch}/{}: loss={:.4} {} val_loss={:.4} val {}",
                    cfg.epochs,
                    train_report.loss,
                    format_metrics(&train_report),
                    v.loss,
                    format_metrics(v)
                ),
                None => info!(
                    "epoch {epoch}/{}: loss={:.4} {}",
                    cfg.epochs,
                    train_report.loss,
                    format_metrics(&train_report)
                ),
            }

            epochs.push(EpochReport {
                epoch,
                train: train_report,
                val: val_report,
            });
        }

        Ok(FitReport { epochs })
    }

    /// Inference-mode pass over `data`: mean loss plus the requested metrics,
    /// each fed once per batch of `batch_size` samples.
    pub fn evaluate(
        &self,
        data: &Dataset,
        loss: Loss,
        metrics: &[MetricKind],
        batch_size: usize,
    ) -> Result<EvalReport> {
        self.check_dataset(data, "evaluation")?;
        if batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be > 0".to_owned()));
        }

        let mut scratch = self.scratch();
        let mut accumulators: Vec<Box<dyn StreamingMetric>> =
            metrics.iter().map(|k| k.accumulator()).collect();
        let mut batch = BatchBuffers::new(batch_size, self.output_dim());
        let mut loss_sum = 0.0_f64;

        let mut start = 0;
        while start < data.len() {
            let end = (start + batch_size).min(data.len());
            batch.clear();
            for idx in start..end {
                let target = data.target(idx);
                let pred = self.forward(data.input(idx), &mut scratch);
                loss_sum += f64::from(loss.forward(pred, target));
                batch.push(target, pred);
            }
            batch.feed(&mut accumulators)?;
            start = end;
        }

        for m in accumulators.iter().filter(|m| !m.is_defined()) {
            warn!(
                "{} has an empty denominator over {} samples; reporting 0",
                m.name(),
                data.len()
            );
        }

        Ok(EvalReport {
            loss: (loss_sum / data.len() as f64) as f32,
            metrics: collect_metrics(&accumulators),
        })
    }

    /// Raw model outputs for every sample, shape `(len, output_dim)`.
    pub fn predict(&self, data: &Dataset) -> Result<Vec<f32>> {
        if data.input_dim() != self.input_dim() {
            return Err(Error::InvalidData(format!(
                "dataset input_dim {} does not match model input_dim {}",
                data.input_dim(),
                self.input_dim()
            )));
        }

        let mut scratch = self.scratch();
        let mut preds = Vec::with_capacity(data.len() * self.output_dim());
        for idx in 0..data.len() {
            preds.extend_from_slice(self.forward(data.input(idx), &mut scratch));
        }
        Ok(preds)
    }
}
