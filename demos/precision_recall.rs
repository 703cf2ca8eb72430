use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use cifar_dnn::{
    Activation, BinaryClasses, Dataset, FitConfig, Loss, MetricKind, MlpBuilder, Precision,
    Recall, StreamingMetric,
};

fn main() -> cifar_dnn::Result<()> {
    // Two overlapping blobs, so the classifier makes some mistakes.
    let mut rng = StdRng::seed_from_u64(0);
    let centers = [[-0.5_f32, 0.0], [0.5, 0.0]];
    let n_per_class = 200;
    let mut inputs = Vec::with_capacity(2 * 2 * n_per_class);
    let mut labels = Vec::with_capacity(2 * n_per_class);
    for (class, center) in centers.iter().enumerate() {
        for _ in 0..n_per_class {
            inputs.push(center[0] + rng.gen_range(-0.8..0.8));
            inputs.push(center[1] + rng.gen_range(-0.8..0.8));
            labels.push(class);
        }
    }
    let data = Dataset::from_labels(inputs, &labels, 2, centers.len())?;

    let mut mlp = MlpBuilder::new(2)?
        .add_layer(8, Activation::ReLU)?
        .add_layer(2, Activation::Identity)?
        .build_with_seed(0)?;
    mlp.fit(
        &data,
        None,
        &FitConfig {
            epochs: 20,
            lr: 1e-2,
            ..FitConfig::default()
        },
    )?;

    // Through the training API...
    let report = mlp.evaluate(
        &data,
        Loss::SoftmaxCrossEntropy,
        &[MetricKind::Precision, MetricKind::Recall],
        32,
    )?;
    println!("evaluate: {:?}", report.metrics);

    // ...or by driving the accumulators directly, one batch at a time.
    let preds = mlp.predict(&data)?;
    let targets = cifar_dnn::data::one_hot(&labels, 2)?;
    let mut precision = Precision::new();
    let mut recall = Recall::with_classes(BinaryClasses::default());
    for (t, p) in targets.chunks(2 * 64).zip(preds.chunks(2 * 64)) {
        precision.update(t, p, 2)?;
        recall.update(t, p, 2)?;
    }
    println!(
        "precision={:.4} (tp={}, fp={})",
        precision.result(),
        precision.true_positives(),
        precision.false_positives()
    );
    println!(
        "recall={:.4} (tp={}, fn={})",
        recall.result(),
        recall.true_positives(),
        recall.false_negatives()
    );
    Ok(())
}
