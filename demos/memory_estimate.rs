use cifar_dnn::memory::{self, DType, Parameterized, TensorSpec};
use cifar_dnn::{Activation, MlpBuilder, cifar};

/// A layer stored in half precision, to show the dtype width at work.
struct HalfDense {
    in_dim: usize,
    out_dim: usize,
}

impl Parameterized for HalfDense {
    fn parameters(&self) -> Vec<TensorSpec> {
        [vec![self.out_dim, self.in_dim], vec![self.out_dim]]
            .into_iter()
            .filter_map(|shape| TensorSpec::new(shape, DType::F16).ok())
            .collect()
    }
}

fn main() -> cifar_dnn::Result<()> {
    let mlp = MlpBuilder::new(cifar::INPUT_DIM)?
        .add_layer(128, Activation::ReLU)?
        .with_dropout(0.2)?
        .add_layer(64, Activation::ReLU)?
        .with_dropout(0.2)?
        .add_layer(cifar::NUM_CLASSES, Activation::Identity)?
        .build_with_seed(0)?;

    for (idx, layer) in mlp.layers().iter().enumerate() {
        let bytes = memory::estimate(std::iter::once(layer))?;
        println!("layer {idx}: {} -> {}: {bytes} bytes", layer.in_dim(), layer.out_dim());
    }
    println!("f32 model: {} bytes", mlp.memory_usage()?);

    let half = [
        HalfDense { in_dim: cifar::INPUT_DIM, out_dim: 128 },
        HalfDense { in_dim: 128, out_dim: 64 },
        HalfDense { in_dim: 64, out_dim: cifar::NUM_CLASSES },
    ];
    println!("f16 model: {} bytes", memory::estimate(&half)?);
    Ok(())
}
