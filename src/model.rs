// 该文件是 Shuangmu （双目） 项目的一部分。
// src/model.rs - 模型与检测适配器
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::{
  path::{Path, PathBuf},
  sync::Arc,
  time::Instant,
};

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{FromUrl, frame::Frame, output::draw::Draw};

mod labels;
mod letterbox;
mod nms;
#[cfg(feature = "onnx")]
mod onnx;
#[cfg(feature = "model_yolo26")]
mod yolo26;

pub use self::labels::{COCO_CLASSES, Labels, parse_ultralytics_names};
pub use self::letterbox::Letterbox;
pub use self::nms::{iou, non_max_suppression};
#[cfg(feature = "onnx")]
pub use self::onnx::{OnnxYolo, OnnxYoloBuilder};
#[cfg(feature = "model_yolo26")]
pub use self::yolo26::{Yolo26, Yolo26Builder};

/// 模型加载错误
///
/// 文件缺失、格式不支持、权重损坏都归为这一类，加载失败不会保留任何中间状态。
#[derive(Error, Debug)]
pub enum LoadError {
  #[error("模型文件不存在: {0}")]
  NotFound(PathBuf),
  #[error("不支持的模型格式: {0}")]
  UnsupportedFormat(String),
  #[error("模型读取错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("模型无效: {0}")]
  Invalid(String),
  #[error("模型 URL 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("未启用 {0} 特性")]
  FeatureDisabled(&'static str),
}

impl LoadError {
  pub fn invalid(err: impl std::fmt::Display) -> Self {
    LoadError::Invalid(err.to_string())
  }
}

/// 单帧推理错误，只影响当前这一帧
#[derive(Error, Debug)]
pub enum InferenceError {
  #[error("推理后端错误: {0}")]
  Backend(String),
  #[error("模型输出形状异常: {0:?}")]
  OutputShape(Vec<usize>),
  #[error("输入帧为空")]
  EmptyFrame,
}

impl InferenceError {
  pub fn backend(err: impl std::fmt::Display) -> Self {
    InferenceError::Backend(err.to_string())
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectItem {
  pub class_id: u32,
  pub label: Arc<str>,
  pub score: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]，相对原图归一化
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
}

impl DetectResult {
  pub fn new(items: Vec<DetectItem>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }
}

/// 推理后端
pub trait Model: Send + Sync {
  fn infer(&self, frame: &Frame) -> Result<DetectResult, InferenceError>;
  fn labels(&self) -> &Labels;
  fn name(&self) -> &str;
}

/// 检测参数
#[derive(Debug, Clone)]
pub struct DetectorConfig {
  /// 置信度阈值 (0.0 - 1.0)
  pub confidence: f32,
  /// NMS IOU 阈值 (0.0 - 1.0)
  pub nms_threshold: f32,
  /// 单帧最多保留的检测数
  pub max_detections: usize,
  /// 标注用字体文件，缺省时在系统字体目录中查找
  pub font: Option<PathBuf>,
}

impl Default for DetectorConfig {
  fn default() -> Self {
    Self {
      confidence: 0.25,
      nms_threshold: 0.45,
      max_detections: 300,
      font: None,
    }
  }
}

/// 一次推理的完整结果：结构化检测加上标注后的图像
#[derive(Debug, Clone)]
pub struct Detection {
  pub result: DetectResult,
  pub annotated: RgbImage,
}

/// 检测适配器
///
/// 包装一个已加载的模型，推理后顺带完成标注绘制。
pub struct Detector {
  model: Box<dyn Model>,
  draw: Draw,
}

impl std::fmt::Debug for Detector {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Detector")
      .field("model", &self.model.name())
      .finish()
  }
}

impl Detector {
  pub fn new(model: Box<dyn Model>, draw: Draw) -> Self {
    Self { model, draw }
  }

  /// 根据文件扩展名选择推理后端并加载模型
  pub fn load(path: impl AsRef<Path>, config: &DetectorConfig) -> Result<Self, LoadError> {
    let path = path.as_ref();
    if !path.is_file() {
      return Err(LoadError::NotFound(path.to_path_buf()));
    }

    let extension = path
      .extension()
      .and_then(|ext| ext.to_str())
      .map(str::to_ascii_lowercase)
      .unwrap_or_default();

    let model: Box<dyn Model> = match extension.as_str() {
      #[cfg(feature = "onnx")]
      "onnx" => Box::new(OnnxYoloBuilder::new(path).config(config.clone()).build()?),
      #[cfg(not(feature = "onnx"))]
      "onnx" => return Err(LoadError::FeatureDisabled("onnx")),
      #[cfg(feature = "model_yolo26")]
      "rknn" => Box::new(Yolo26Builder::new(path).config(config.clone()).build()?),
      #[cfg(not(feature = "model_yolo26"))]
      "rknn" => return Err(LoadError::FeatureDisabled("model_yolo26")),
      other => return Err(LoadError::UnsupportedFormat(other.to_string())),
    };

    Ok(Self::new(model, Draw::from_config(config)))
  }

  pub fn labels(&self) -> &Labels {
    self.model.labels()
  }

  pub fn name(&self) -> &str {
    self.model.name()
  }

  pub fn infer(&self, frame: &Frame) -> Result<Detection, InferenceError> {
    if frame.width() == 0 || frame.height() == 0 {
      return Err(InferenceError::EmptyFrame);
    }

    let now = Instant::now();
    let result = self.model.infer(frame)?;
    let elapsed = now.elapsed();
    debug!(
      "第 {} 帧推理完成，耗时: {:.2?}，检测到 {} 个物体",
      frame.index,
      elapsed,
      result.len()
    );

    let annotated = self.draw.annotate(&frame.image, &result);
    Ok(Detection { result, annotated })
  }
}

/// 通过 URL 加载模型，例如 `onnx:///models/yolo11n.onnx`
pub struct DetectorUrl {
  path: PathBuf,
  config: DetectorConfig,
}

impl FromUrl for DetectorUrl {
  type Error = LoadError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    let path = crate::url_path(url);
    let expected = match url.scheme() {
      "onnx" => "onnx",
      "yolo26" | "rknn" => "rknn",
      "file" => {
        return Ok(DetectorUrl {
          path,
          config: DetectorConfig::default(),
        });
      }
      other => return Err(LoadError::SchemeMismatch(other.to_string())),
    };

    let matches = path
      .extension()
      .and_then(|ext| ext.to_str())
      .is_some_and(|ext| ext.eq_ignore_ascii_case(expected));
    if !matches {
      return Err(LoadError::UnsupportedFormat(path.display().to_string()));
    }

    Ok(DetectorUrl {
      path,
      config: DetectorConfig::default(),
    })
  }
}

impl DetectorUrl {
  pub fn config(mut self, config: DetectorConfig) -> Self {
    self.config = config;
    self
  }

  pub fn load(self) -> Result<Detector, LoadError> {
    info!("加载模型: {}", self.path.display());
    Detector::load(&self.path, &self.config)
  }
}


#[cfg(test)]
mod tests {
  use super::testing::*;
  use super::*;

  #[test]
  fn load_reports_missing_file() {
    let err = Detector::load("/nonexistent/model.onnx", &DetectorConfig::default()).unwrap_err();
    assert!(matches!(err, LoadError::NotFound(_)));
  }

  #[test]
  fn load_rejects_unknown_extension() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("weights.pt");
    std::fs::write(&path, b"not a model").unwrap();

    let err = Detector::load(&path, &DetectorConfig::default()).unwrap_err();
    assert!(matches!(err, LoadError::UnsupportedFormat(ext) if ext == "pt"));
  }

  #[cfg(feature = "onnx")]
  #[test]
  fn load_rejects_corrupt_onnx() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.onnx");
    std::fs::write(&path, b"\x00\x01garbage").unwrap();

    let err = Detector::load(&path, &DetectorConfig::default()).unwrap_err();
    assert!(matches!(err, LoadError::Invalid(_)));
  }

  #[test]
  fn infer_returns_detections_and_annotated_copy() {
    let detector = detector(ScriptedModel::new(vec![Ok(vec!["person", "dog"])]));
    let frame = Frame::still(RgbImage::new(32, 24));

    let detection = detector.infer(&frame).unwrap();
    assert_eq!(detection.result.len(), 2);
    assert_eq!(detection.annotated.dimensions(), (32, 24));
    assert_ne!(detection.annotated, frame.image);
  }

  #[test]
  fn infer_rejects_empty_frame() {
    let detector = detector(ScriptedModel::repeating(vec![]));
    let frame = Frame::still(RgbImage::new(0, 0));
    assert!(matches!(
      detector.infer(&frame),
      Err(InferenceError::EmptyFrame)
    ));
  }

  #[test]
  fn url_scheme_must_match_extension() {
    let url = Url::parse("onnx:///models/yolo.rknn").unwrap();
    assert!(matches!(
      DetectorUrl::from_url(&url),
      Err(LoadError::UnsupportedFormat(_))
    ));

    let url = Url::parse("ftp:///models/yolo.onnx").unwrap();
    assert!(matches!(
      DetectorUrl::from_url(&url),
      Err(LoadError::SchemeMismatch(_))
    ));
  }
}
