use anyhow::{Context, Result};
use ndarray::Array4;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;

use super::keypoint::{Keypoint, KeypointIndex, Pose};

/// MoveNet singlepose の入出力テンソル名
const INPUT_NAME: &str = "serving_default_input_0";
const OUTPUT_NAME: &str = "StatefulPartitionedCall_0";

/// MoveNet singlepose による姿勢検出器。
/// シングルサブジェクト・最大1検出はモデル自体の性質。
pub struct PoseDetector {
    session: Session,
}

impl PoseDetector {
    /// ONNXモデルを読み込んでセッションを構築
    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .commit_from_file(model_path.as_ref())
            .with_context(|| {
                format!(
                    "Failed to load ONNX model: {}",
                    model_path.as_ref().display()
                )
            })?;

        Ok(Self { session })
    }

    /// 前処理済みテンソル [1, 192, 192, 3] から姿勢を検出する
    pub fn detect(&mut self, input: Array4<f32>) -> Result<Pose> {
        let tensor = Tensor::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs![INPUT_NAME => tensor])
            .context("Inference failed")?;

        let view: ndarray::ArrayViewD<f32> = outputs[OUTPUT_NAME]
            .try_extract_array()
            .context("Failed to extract output tensor")?;

        pose_from_output(&view)
    }
}

/// MoveNet の出力 [1, 1, 17, 3]（各行 y, x, confidence）から Pose を組み立てる
fn pose_from_output(output: &ndarray::ArrayViewD<f32>) -> Result<Pose> {
    anyhow::ensure!(
        output.ndim() == 4 && output.shape()[2] == KeypointIndex::COUNT,
        "Unexpected output shape: {:?}",
        output.shape()
    );

    let keypoints: [Keypoint; KeypointIndex::COUNT] = std::array::from_fn(|i| {
        Keypoint::new(
            output[[0, 0, i, 1]],
            output[[0, 0, i, 0]],
            output[[0, 0, i, 2]],
        )
    });

    Ok(Pose::new(keypoints))
}
