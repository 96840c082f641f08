//! End-to-end runs against an in-process model double.

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use nnbench_core::config::BenchConfig;
use nnbench_core::{
    BenchError, Benchmark, DatasetKind, InferenceBackend, InferenceError, InputTensor,
    OutputTensor, PreparedInputs, SampleStage, TensorSpec, TensorType,
};

/// Returns the first input's bytes unchanged and remembers the shapes it saw.
struct EchoModel {
    specs: Vec<TensorSpec>,
    outputs: Vec<String>,
    seen: Mutex<Vec<Vec<usize>>>,
}

impl EchoModel {
    fn new(spec: TensorSpec, outputs: usize) -> Self {
        Self {
            specs: vec![spec],
            outputs: (0..outputs).map(|i| format!("out{}", i)).collect(),
            seen: Mutex::new(Vec::new()),
        }
    }

    fn seen(&self) -> Vec<Vec<usize>> {
        self.seen.lock().unwrap().clone()
    }
}

impl InferenceBackend for EchoModel {
    fn run(&self, inputs: &[InputTensor]) -> nnbench_inference::Result<Vec<OutputTensor>> {
        let input = &inputs[0];
        self.seen.lock().unwrap().push(input.shape().to_vec());
        self.outputs
            .iter()
            .map(|name| {
                OutputTensor::from_elements(name.clone(), vec![input.byte_len()], input.as_bytes())
            })
            .collect()
    }

    fn input_specs(&self) -> &[TensorSpec] {
        &self.specs
    }

    fn output_names(&self) -> &[String] {
        &self.outputs
    }
}

struct FailingModel {
    specs: Vec<TensorSpec>,
}

impl InferenceBackend for FailingModel {
    fn run(&self, _inputs: &[InputTensor]) -> nnbench_inference::Result<Vec<OutputTensor>> {
        Err(InferenceError::InferenceFailed("device lost".to_string()))
    }

    fn input_specs(&self) -> &[TensorSpec] {
        &self.specs
    }

    fn output_names(&self) -> &[String] {
        &[]
    }
}

fn blob_spec() -> TensorSpec {
    TensorSpec::new("x", TensorType::Float32, vec![1, 4])
}

struct Workspace {
    root: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir(root.path().join("input")).unwrap();
        fs::write(root.path().join("model.onnx"), b"placeholder").unwrap();
        Self { root }
    }

    fn input(&self) -> PathBuf {
        self.root.path().join("input")
    }

    fn results(&self) -> PathBuf {
        self.root.path().join("result_Files")
    }

    fn summary(&self) -> PathBuf {
        self.root.path().join("time_Result/test_perform_static.txt")
    }

    fn config(&self, kind: DatasetKind) -> BenchConfig {
        let mut config = BenchConfig::default();
        config.model.path = self.root.path().join("model.onnx");
        config.dataset.kind = kind;
        config.dataset.input_dir = self.input();
        config.output.results_dir = self.results();
        config.output.summary_path = self.summary();
        config
    }
}

fn write_blob(dir: &Path, name: &str, len: usize) {
    let bytes: Vec<u8> = (0..len).map(|i| (i * 7 % 251) as u8).collect();
    fs::write(dir.join(name), bytes).unwrap();
}

fn write_jpeg(path: &Path, width: u32, height: u32) {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, ImageFormat::Jpeg)
        .unwrap();
    fs::write(path, buf.into_inner()).unwrap();
}

fn write_flat_png(path: &Path, size: u32, value: u8) {
    let img = RgbImage::from_pixel(size, size, Rgb([value, value, value]));
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, ImageFormat::Png)
        .unwrap();
    fs::write(path, buf.into_inner()).unwrap();
}

fn sorted_listing(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn three_matching_blobs_produce_three_results() {
    let ws = Workspace::new();
    for name in ["s1.bin", "s2.bin", "s3.bin"] {
        write_blob(&ws.input(), name, 16);
    }

    let model = EchoModel::new(blob_spec(), 1);
    let bench = Benchmark::prepare(ws.config(DatasetKind::DirectTensor)).unwrap();
    let report = bench.execute(&model, |_| {}).unwrap();

    assert_eq!(report.summary.count, 3);
    assert!(report.summary.average_ms >= 0.0);
    assert_eq!(
        sorted_listing(&ws.results()),
        vec!["s1_0.bin", "s2_0.bin", "s3_0.bin"]
    );
    assert_eq!(
        fs::read(ws.results().join("s2_0.bin")).unwrap(),
        fs::read(ws.input().join("s2.bin")).unwrap()
    );

    let summary = fs::read_to_string(ws.summary()).unwrap();
    assert!(summary.starts_with("NN inference cost average time: "));
    assert!(summary.trim_end().ends_with("ms of infer_count 3"));
}

#[test]
fn oversized_blob_is_truncated_to_model_input() {
    let ws = Workspace::new();
    write_blob(&ws.input(), "big.bin", 64);

    let model = EchoModel::new(blob_spec(), 1);
    let bench = Benchmark::prepare(ws.config(DatasetKind::DirectTensor)).unwrap();
    bench.execute(&model, |_| {}).unwrap();

    let out = fs::read(ws.results().join("big_0.bin")).unwrap();
    assert_eq!(out.len(), 16);
    assert_eq!(out, fs::read(ws.input().join("big.bin")).unwrap()[..16].to_vec());
}

#[test]
fn short_blob_aborts_with_size_mismatch() {
    let ws = Workspace::new();
    write_blob(&ws.input(), "a.bin", 16);
    write_blob(&ws.input(), "b.bin", 6);
    write_blob(&ws.input(), "c.bin", 16);

    let model = EchoModel::new(blob_spec(), 1);
    let bench = Benchmark::prepare(ws.config(DatasetKind::DirectTensor)).unwrap();
    let err = bench.execute(&model, |_| {}).unwrap_err();

    match &err {
        BenchError::SizeMismatch {
            path,
            expected,
            actual,
        } => {
            assert!(path.ends_with("b.bin"));
            assert_eq!((*expected, *actual), (16, 6));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(err.stage(), Some(SampleStage::Bound));
    assert_ne!(err.exit_code(), 0);

    // a.bin ran before the failure; nothing for b.bin or later, no summary
    assert_eq!(sorted_listing(&ws.results()), vec!["a_0.bin"]);
    assert!(!ws.summary().exists());
    assert_eq!(model.seen().len(), 1);
}

#[test]
fn image_is_bound_as_224_square() {
    let ws = Workspace::new();
    fs::create_dir(ws.input().join("n01440764")).unwrap();
    write_jpeg(&ws.input().join("n01440764/fish.JPEG"), 500, 500);

    let spec = TensorSpec::new("x", TensorType::Float32, vec![1, 3, 224, 224]);
    let model = EchoModel::new(spec, 1);
    let bench = Benchmark::prepare(ws.config(DatasetKind::ImageClassification)).unwrap();
    let report = bench.execute(&model, |_| {}).unwrap();

    assert_eq!(report.summary.count, 1);
    assert_eq!(model.seen(), vec![vec![1, 3, 224, 224]]);
    let out = fs::read(ws.results().join("n01440764/fish_0.bin")).unwrap();
    assert_eq!(out.len(), 224 * 224 * 3 * 4);
}

#[test]
fn small_image_still_binds_to_nhwc_uint8() {
    let ws = Workspace::new();
    fs::create_dir(ws.input().join("cls")).unwrap();
    write_jpeg(&ws.input().join("cls/tiny.jpg"), 40, 30);

    let spec = TensorSpec::new("x", TensorType::Uint8, vec![1, 224, 224, 3]);
    let model = EchoModel::new(spec, 1);
    let bench = Benchmark::prepare(ws.config(DatasetKind::ImageClassification)).unwrap();
    bench.execute(&model, |_| {}).unwrap();

    assert_eq!(model.seen(), vec![vec![1, 224, 224, 3]]);
    let out = fs::read(ws.results().join("cls/tiny_0.bin")).unwrap();
    assert_eq!(out.len(), 224 * 224 * 3);
}

#[test]
fn undecodable_image_aborts() {
    let ws = Workspace::new();
    fs::create_dir(ws.input().join("cls")).unwrap();
    fs::write(ws.input().join("cls/broken.jpg"), b"not really a jpeg").unwrap();

    let spec = TensorSpec::new("x", TensorType::Uint8, vec![1, 224, 224, 3]);
    let model = EchoModel::new(spec, 1);
    let bench = Benchmark::prepare(ws.config(DatasetKind::ImageClassification)).unwrap();
    let err = bench.execute(&model, |_| {}).unwrap_err();

    assert!(matches!(err, BenchError::DecodeFailure { .. }));
    assert!(model.seen().is_empty());
    assert!(!ws.summary().exists());
}

#[test]
fn empty_input_dir_aborts_before_running() {
    let ws = Workspace::new();
    let err = Benchmark::prepare(ws.config(DatasetKind::DirectTensor)).unwrap_err();

    assert!(matches!(err, BenchError::EmptyInputSet(_)));
    assert_ne!(err.exit_code(), 0);
    assert!(!ws.summary().exists());
}

#[test]
fn missing_model_is_reported_first() {
    let ws = Workspace::new();
    let mut config = ws.config(DatasetKind::DirectTensor);
    config.model.path = ws.root.path().join("missing.onnx");

    let err = Benchmark::prepare(config).unwrap_err();
    assert!(matches!(err, BenchError::InvalidModelPath(_)));
}

#[test]
fn predict_failure_aborts_without_summary() {
    let ws = Workspace::new();
    write_blob(&ws.input(), "a.bin", 16);

    let model = FailingModel {
        specs: vec![blob_spec()],
    };
    let bench = Benchmark::prepare(ws.config(DatasetKind::DirectTensor)).unwrap();
    let err = bench.execute(&model, |_| {}).unwrap_err();

    assert!(matches!(err, BenchError::PredictFailure { .. }));
    assert_eq!(err.stage(), Some(SampleStage::Predicted));
    assert!(sorted_listing(&ws.results()).is_empty());
    assert!(!ws.summary().exists());
}

#[test]
fn unwritable_results_dir_is_write_failure() {
    let ws = Workspace::new();
    write_blob(&ws.input(), "a.bin", 16);
    let mut config = ws.config(DatasetKind::DirectTensor);
    config.output.results_dir = ws.input().join("a.bin");

    let model = EchoModel::new(blob_spec(), 1);
    let bench = Benchmark::prepare(config).unwrap();
    let err = bench.execute(&model, |_| {}).unwrap_err();

    assert!(matches!(err, BenchError::WriteFailure { .. }));
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn reruns_are_byte_identical() {
    let ws = Workspace::new();
    for name in ["x.bin", "y.bin"] {
        write_blob(&ws.input(), name, 20);
    }
    let model = EchoModel::new(blob_spec(), 2);
    let bench = Benchmark::prepare(ws.config(DatasetKind::DirectTensor)).unwrap();

    let first = bench.execute(&model, |_| {}).unwrap();
    let first_bytes: Vec<Vec<u8>> = first.written_files.iter().map(|p| fs::read(p).unwrap()).collect();

    let second = bench.execute(&model, |_| {}).unwrap();
    let second_bytes: Vec<Vec<u8>> = second.written_files.iter().map(|p| fs::read(p).unwrap()).collect();

    assert_eq!(first.written_files, second.written_files);
    assert_eq!(first_bytes, second_bytes);
    assert_eq!(
        sorted_listing(&ws.results()),
        vec!["x_0.bin", "x_1.bin", "y_0.bin", "y_1.bin"]
    );
}

#[test]
fn warmup_passes_are_not_timed() {
    let ws = Workspace::new();
    write_blob(&ws.input(), "a.bin", 16);
    write_blob(&ws.input(), "b.bin", 16);
    let mut config = ws.config(DatasetKind::DirectTensor);
    config.run.warmup = 3;
    config.output.latency_csv = Some(ws.root.path().join("latency.csv"));

    let model = EchoModel::new(blob_spec(), 1);
    let bench = Benchmark::prepare(config).unwrap();
    let mut progressed = Vec::new();
    let report = bench
        .execute(&model, |s| progressed.push(s.path().to_path_buf()))
        .unwrap();

    assert_eq!(model.seen().len(), 5);
    assert_eq!(report.summary.count, 2);
    assert_eq!(progressed.len(), 2);

    let csv = fs::read_to_string(ws.root.path().join("latency.csv")).unwrap();
    assert_eq!(csv.lines().count(), 3);
}

#[test]
fn same_file_name_in_two_classes_keeps_both_results() {
    let ws = Workspace::new();
    for (class, value) in [("c1", 10u8), ("c2", 200u8)] {
        fs::create_dir(ws.input().join(class)).unwrap();
        write_flat_png(&ws.input().join(class).join("img.png"), 300, value);
    }

    let spec = TensorSpec::new("x", TensorType::Uint8, vec![1, 224, 224, 3]);
    let model = EchoModel::new(spec, 1);
    let bench = Benchmark::prepare(ws.config(DatasetKind::ImageClassification)).unwrap();
    let report = bench.execute(&model, |_| {}).unwrap();

    assert_eq!(report.summary.count, 2);
    assert_eq!(
        report.written_files,
        vec![
            ws.results().join("c1/img_0.bin"),
            ws.results().join("c2/img_0.bin")
        ]
    );
    assert_eq!(sorted_listing(&ws.results()), vec!["c1", "c2"]);
    let first = fs::read(ws.results().join("c1/img_0.bin")).unwrap();
    let second = fs::read(ws.results().join("c2/img_0.bin")).unwrap();
    assert!(first.iter().all(|&b| b == 10));
    assert!(second.iter().all(|&b| b == 200));
}

#[test]
fn symbolic_image_dims_take_the_crop_size() {
    let ws = Workspace::new();
    fs::create_dir(ws.input().join("cls")).unwrap();
    write_jpeg(&ws.input().join("cls/photo.jpg"), 320, 240);

    let spec = TensorSpec::from_dims("x", TensorType::Float32, &[-1, 3, -1, -1]);
    let model = EchoModel::new(spec, 1);
    let bench = Benchmark::prepare(ws.config(DatasetKind::ImageClassification)).unwrap();
    bench.execute(&model, |_| {}).unwrap();

    assert_eq!(model.seen(), vec![vec![1, 3, 224, 224]]);
}

#[test]
fn csv_failure_leaves_no_summary() {
    let ws = Workspace::new();
    write_blob(&ws.input(), "a.bin", 16);
    let mut config = ws.config(DatasetKind::DirectTensor);
    config.output.latency_csv = Some(ws.input().join("a.bin").join("latency.csv"));

    let model = EchoModel::new(blob_spec(), 1);
    let bench = Benchmark::prepare(config).unwrap();
    let err = bench.execute(&model, |_| {}).unwrap_err();

    assert!(matches!(err, BenchError::WriteFailure { .. }));
    assert_eq!(err.exit_code(), 2);
    assert!(!ws.summary().exists());
}

/// Spends a fixed time converting inputs; the forward pass itself is free.
struct SlowPrepareModel {
    specs: Vec<TensorSpec>,
    outputs: Vec<String>,
}

impl InferenceBackend for SlowPrepareModel {
    fn run(&self, inputs: &[InputTensor]) -> nnbench_inference::Result<Vec<OutputTensor>> {
        self.run_prepared(self.prepare(inputs)?)
    }

    fn prepare(&self, inputs: &[InputTensor]) -> nnbench_inference::Result<PreparedInputs> {
        std::thread::sleep(std::time::Duration::from_millis(80));
        Ok(PreparedInputs::new(inputs[0].as_bytes().to_vec()))
    }

    fn run_prepared(&self, inputs: PreparedInputs) -> nnbench_inference::Result<Vec<OutputTensor>> {
        let bytes: Vec<u8> = inputs.downcast()?;
        Ok(vec![OutputTensor::from_elements("y", vec![bytes.len()], &bytes)?])
    }

    fn input_specs(&self) -> &[TensorSpec] {
        &self.specs
    }

    fn output_names(&self) -> &[String] {
        &self.outputs
    }
}

#[test]
fn input_conversion_is_outside_the_timed_region() {
    let ws = Workspace::new();
    write_blob(&ws.input(), "a.bin", 16);

    let model = SlowPrepareModel {
        specs: vec![blob_spec()],
        outputs: vec!["y".to_string()],
    };
    let bench = Benchmark::prepare(ws.config(DatasetKind::DirectTensor)).unwrap();
    let report = bench.execute(&model, |_| {}).unwrap();

    assert_eq!(report.summary.count, 1);
    assert!(report.summary.average_ms < 80.0);
    assert_eq!(
        fs::read(ws.results().join("a_0.bin")).unwrap(),
        fs::read(ws.input().join("a.bin")).unwrap()
    );
}

#[test]
fn model_without_inputs_is_a_load_failure() {
    let ws = Workspace::new();
    write_blob(&ws.input(), "a.bin", 16);

    let model = FailingModel { specs: Vec::new() };
    let bench = Benchmark::prepare(ws.config(DatasetKind::DirectTensor)).unwrap();
    let err = bench.execute(&model, |_| {}).unwrap_err();

    match &err {
        BenchError::ModelLoadFailure(reason) => assert!(reason.contains("no inputs")),
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(err.exit_code(), 1);
    assert!(sorted_listing(&ws.results()).is_empty());
    assert!(!ws.summary().exists());
}
