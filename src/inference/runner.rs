use anyhow::{anyhow, Context, Result};
use ndarray::{Array3, ArrayView2, Axis};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;

/// シーケンスウィンドウを入力に取るモデルの共通インターフェース
///
/// 分類器 (出力 = クラスごとのlogit) と埋め込みモデル (出力 = 埋め込み
/// ベクトル) の両方をこの形で扱う。
pub trait SequenceModel {
    /// window: [seq_len, feat_dim] → 出力ベクトル
    fn run(&mut self, window: ArrayView2<f32>) -> Result<Vec<f32>>;
}

fn build_session(model_path: &Path) -> Result<Session> {
    let builder = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?;

    #[cfg(feature = "cuda")]
    let builder = {
        tracing::info!("attempting CUDA execution provider");
        builder.with_execution_providers([
            ort::execution_providers::CUDAExecutionProvider::default().build(),
        ])?
    };

    builder
        .commit_from_file(model_path)
        .with_context(|| format!("Failed to load ONNX model: {}", model_path.display()))
}

/// ONNX形式のsignモデルランナー
///
/// 入出力名はモデルごとに違う (tf2onnx変換の産物) のでセッションの
/// メタデータから先頭のものを取る。
pub struct OrtSignRunner {
    session: Session,
    input_name: String,
    output_name: String,
}

impl OrtSignRunner {
    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let session = build_session(model_path.as_ref())?;
        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .ok_or_else(|| anyhow!("model has no inputs"))?;
        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| anyhow!("model has no outputs"))?;

        Ok(Self {
            session,
            input_name,
            output_name,
        })
    }
}

impl SequenceModel for OrtSignRunner {
    fn run(&mut self, window: ArrayView2<f32>) -> Result<Vec<f32>> {
        // [seq_len, feat_dim] → [1, seq_len, feat_dim]
        let input: Array3<f32> = window.to_owned().insert_axis(Axis(0));
        let input_tensor = Tensor::from_array(input)?;

        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => input_tensor])
            .context("Inference failed")?;

        let output: ndarray::ArrayViewD<f32> = outputs[self.output_name.as_str()]
            .try_extract_array()
            .context("Failed to extract output tensor")?;

        Ok(output.iter().copied().collect())
    }
}
