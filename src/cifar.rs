//! CIFAR-10 binary loader.
//!
//! The binary distribution (`cifar-10-batches-bin`) stores fixed-size records:
//! one label byte followed by 3072 pixel bytes, 1024 per channel in R, G, B
//! order, each channel row-major over 32x32.
//!
//! Pixels are scaled to `[0, 1]` and re-laid out channel-last, i.e. each sample
//! is the flattening of a `(32, 32, 3)` image. Labels are one-hot encoded.

use std::fs;
use std::path::Path;

use log::debug;

use crate::{Dataset, Error, Result, data};

pub const IMAGE_SIDE: usize = 32;
pub const CHANNELS: usize = 3;
pub const NUM_CLASSES: usize = 10;
/// Features per flattened image.
pub const INPUT_DIM: usize = IMAGE_SIDE * IMAGE_SIDE * CHANNELS;
const RECORD_LEN: usize = 1 + INPUT_DIM;

pub const CLASS_NAMES: [&str; NUM_CLASSES] = [
    "airplane",
    "automobile",
    "bird",
    "cat",
    "deer",
    "dog",
    "frog",
    "horse",
    "ship",
    "truck",
];

pub const TRAIN_FILES: [&str; 5] = [
    "data_batch_1.bin",
    "data_batch_2.bin",
    "data_batch_3.bin",
    "data_batch_4.bin",
    "data_batch_5.bin",
];
pub const TEST_FILE: &str = "test_batch.bin";

/// Decode raw records, appending normalized HWC pixels to `pixels` and class
/// indices to `labels`.
pub fn decode_records(
    bytes: &[u8],
    pixels: &mut Vec<f32>,
    labels: &mut Vec<usize>,
) -> Result<()> {
    if !bytes.len().is_multiple_of(RECORD_LEN) {
        return Err(Error::InvalidData(format!(
            "cifar buffer of {} bytes is not a whole number of {RECORD_LEN}-byte records",
            bytes.len()
        )));
    }

    let plane = IMAGE_SIDE * IMAGE_SIDE;
    let count = bytes.len() / RECORD_LEN;
    pixels.reserve(count * INPUT_DIM);
    labels.reserve(count);

    for (idx, record) in bytes.chunks_exact(RECORD_LEN).enumerate() {
        let label = usize::from(record[0]);
        if label >= NUM_CLASSES {
            return Err(Error::InvalidData(format!(
                "record {idx} has label {label}, expected < {NUM_CLASSES}"
            )));
        }
        labels.push(label);

        let image = &record[1..];
        for p in 0..plane {
            for c in 0..CHANNELS {
                pixels.push(f32::from(image[c * plane + p]) / 255.0);
            }
        }
    }
    Ok(())
}

/// Load the given batch files from `dir` into one dataset.
pub fn load_files<P: AsRef<Path>>(dir: P, files: &[&str]) -> Result<Dataset> {
    let dir = dir.as_ref();
    let mut pixels = Vec::new();
    let mut labels = Vec::new();

    for name in files {
        let path = dir.join(name);
        let bytes = fs::read(&path).map_err(|e| Error::io(&path, e))?;
        let before = labels.len();
        decode_records(&bytes, &mut pixels, &mut labels).map_err(|e| match e {
            Error::InvalidData(msg) => {
                Error::InvalidData(format!("{}: {msg}", path.display()))
            }
            other => other,
        })?;
        debug!("loaded {} images from {}", labels.len() - before, path.display());
    }

    if labels.is_empty() {
        return Err(Error::InvalidData(format!(
            "no cifar images found in {}",
            dir.display()
        )));
    }
    Dataset::from_labels(pixels, &labels, INPUT_DIM, NUM_CLASSES)
}

/// The 50 000-image training split.
pub fn load_train<P: AsRef<Path>>(dir: P) -> Result<Dataset> {
    load_files(dir, &TRAIN_FILES)
}

/// The 10 000-image test split.
pub fn load_test<P: AsRef<Path>>(dir: P) -> Result<Dataset> {
    load_files(dir, &[TEST_FILE])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(label: u8, r: u8, g: u8, b: u8) -> Vec<u8> {
        let plane = IMAGE_SIDE * IMAGE_SIDE;
        let mut rec = vec![label];
        rec.extend(std::iter::repeat_n(r, plane));
        rec.extend(std::iter::repeat_n(g, plane));
        rec.extend(std::iter::repeat_n(b, plane));
        rec
    }

    #[test]
    fn decodes_channel_last_and_normalizes() {
        let mut bytes = record(3, 255, 0, 51);
        bytes.extend(record(9, 0, 0, 0));

        let (mut pixels, mut labels) = (Vec::new(), Vec::new());
        decode_records(&bytes, &mut pixels, &mut labels).unwrap();

        assert_eq!(labels, vec![3, 9]);
        assert_eq!(pixels.len(), 2 * INPUT_DIM);
        assert_eq!(&pixels[..3], &[1.0, 0.0, 0.2]);
        assert_eq!(&pixels[INPUT_DIM - 3..INPUT_DIM], &[1.0, 0.0, 0.2]);
        assert!(pixels[INPUT_DIM..].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn first_pixel_channels_come_from_each_plane() {
        let mut rec = record(0, 0, 0, 0);
        let plane = IMAGE_SIDE * IMAGE_SIDE;
        rec[1 + 1] = 255; // R of pixel 1
        rec[1 + plane + 1] = 255; // G of pixel 1
        let (mut pixels, mut labels) = (Vec::new(), Vec::new());
        decode_records(&rec, &mut pixels, &mut labels).unwrap();
        assert_eq!(&pixels[3..6], &[1.0, 1.0, 0.0]);
    }

    #[test]
    fn rejects_truncated_buffers_and_bad_labels() {
        let mut bytes = record(1, 0, 0, 0);
        bytes.pop();
        let (mut pixels, mut labels) = (Vec::new(), Vec::new());
        assert!(decode_records(&bytes, &mut pixels, &mut labels).is_err());

        let bytes = record(10, 0, 0, 0);
        assert!(decode_records(&bytes, &mut pixels, &mut labels).is_err());
    }

    #[test]
    fn truncated_file_error_names_the_path_once() {
        let dir = std::env::temp_dir().join(format!("cifar-dnn-truncated-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let mut bytes = record(2, 0, 0, 0);
        bytes.truncate(100);
        fs::write(dir.join(TEST_FILE), &bytes).unwrap();

        let err = load_test(&dir).unwrap_err();
        fs::remove_dir_all(&dir).unwrap();

        let msg = err.to_string();
        assert!(matches!(err, Error::InvalidData(_)));
        assert_eq!(msg.matches("invalid data").count(), 1, "{msg}");
        assert!(msg.contains(TEST_FILE), "{msg}");
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = std::env::temp_dir().join("cifar-dnn-missing-dir");
        assert!(matches!(load_test(&dir), Err(Error::Io { .. })));
    }
}
