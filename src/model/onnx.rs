// 该文件是 Shuangmu （双目） 项目的一部分。
// src/model/onnx.rs - ONNX YOLO 推理后端
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

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use tract_onnx::prelude::*;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{AsNchwFrame, Frame, RgbNchwFrame},
  model::{
    DetectItem, DetectResult, DetectorConfig, InferenceError, Labels, Letterbox, LoadError, Model,
    non_max_suppression, parse_ultralytics_names,
  },
};

const ONNX_DEFAULT_INPUT_SIZE: u32 = 640;
const ONNX_BOX_VALUES: usize = 4;

type OnnxPlan = TypedRunnableModel<TypedModel>;

/// ultralytics 导出的 YOLOv8 / YOLO11 ONNX 模型
///
/// 输出张量为 `[1, 4 + nc, N]`，每一列是一个候选框 `cx, cy, w, h` 加各类别分数。
pub struct OnnxYolo {
  plan: OnnxPlan,
  input_size: (u32, u32),
  labels: Labels,
  config: DetectorConfig,
  name: String,
}

pub struct OnnxYoloBuilder {
  model_path: PathBuf,
  input_size: u32,
  config: DetectorConfig,
}

impl FromUrlWithScheme for OnnxYoloBuilder {
  const SCHEME: &'static str = "onnx";
}

impl FromUrl for OnnxYoloBuilder {
  type Error = LoadError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(LoadError::SchemeMismatch(url.scheme().to_string()));
    }

    let mut builder = OnnxYoloBuilder::new(crate::url_path(url));
    for (k, v) in url.query_pairs() {
      match k.as_ref() {
        "size" => {
          if let Ok(size) = v.parse() {
            builder.input_size = size;
          }
        }
        "conf" => {
          if let Ok(conf) = v.parse() {
            builder.config.confidence = conf;
          }
        }
        "iou" => {
          if let Ok(iou) = v.parse() {
            builder.config.nms_threshold = iou;
          }
        }
        other => warn!("忽略未知的模型参数: {}", other),
      }
    }
    Ok(builder)
  }
}

impl OnnxYoloBuilder {
  pub fn new(model_path: impl AsRef<Path>) -> Self {
    Self {
      model_path: model_path.as_ref().to_path_buf(),
      input_size: ONNX_DEFAULT_INPUT_SIZE,
      config: DetectorConfig::default(),
    }
  }

  pub fn input_size(mut self, size: u32) -> Self {
    self.input_size = size;
    self
  }

  pub fn config(mut self, config: DetectorConfig) -> Self {
    self.config = config;
    self
  }

  pub fn build(self) -> Result<OnnxYolo, LoadError> {
    info!("加载模型文件: {}", self.model_path.display());
    if !self.model_path.is_file() {
      return Err(LoadError::NotFound(self.model_path));
    }

    let onnx = tract_onnx::onnx();
    let proto = onnx
      .proto_model_for_path(&self.model_path)
      .map_err(LoadError::invalid)?;

    let labels = proto
      .metadata_props
      .iter()
      .find(|prop| prop.key == "names")
      .and_then(|prop| parse_ultralytics_names(&prop.value))
      .map(Labels::from)
      .unwrap_or_else(|| {
        debug!("模型元数据中没有类别名称，使用 COCO 类别");
        Labels::coco()
      });
    debug!("模型类别数量: {}", labels.len());

    let size = self.input_size as usize;
    let plan = onnx
      .model_for_proto_model(&proto)
      .and_then(|model| model.with_input_fact(0, f32::fact([1, 3, size, size]).into()))
      .and_then(|model| model.into_optimized())
      .and_then(|model| model.into_runnable())
      .map_err(LoadError::invalid)?;
    info!("模型加载完成");

    let name = self
      .model_path
      .file_stem()
      .and_then(|s| s.to_str())
      .unwrap_or("onnx")
      .to_string();

    Ok(OnnxYolo {
      plan,
      input_size: (self.input_size, self.input_size),
      labels,
      config: self.config,
      name,
    })
  }
}

impl OnnxYolo {
  fn preprocess(&self, frame: &Frame) -> (Tensor, Letterbox) {
    let letterbox = Letterbox::new(frame.image.dimensions(), self.input_size);
    let boxed = letterbox.apply(&frame.image);
    let nchw = RgbNchwFrame::from(&boxed);
    let data = nchw.as_nchw();

    let (w, h) = (nchw.width(), nchw.height());
    let tensor: Tensor =
      tract_ndarray::Array4::from_shape_fn((1, 3, h, w), |(_, c, y, x)| {
        data[c * h * w + y * w + x] as f32 / 255.0
      })
      .into();
    (tensor, letterbox)
  }

  fn postprocess(
    &self,
    shape: &[usize],
    data: &[f32],
    letterbox: &Letterbox,
  ) -> Result<DetectResult, InferenceError> {
    if shape.len() != 3 || shape[0] != 1 {
      return Err(InferenceError::OutputShape(shape.to_vec()));
    }

    // 一般是 [1, 4 + nc, N]，少数导出会转置成 [1, N, 4 + nc]
    let transposed = shape[1] > shape[2];
    let (values, proposals) = if transposed {
      (shape[2], shape[1])
    } else {
      (shape[1], shape[2])
    };
    if values <= ONNX_BOX_VALUES {
      return Err(InferenceError::OutputShape(shape.to_vec()));
    }
    let num_classes = values - ONNX_BOX_VALUES;

    let at = |row: usize, col: usize| {
      if transposed {
        data[col * values + row]
      } else {
        data[row * proposals + col]
      }
    };

    let mut items = Vec::new();
    for i in 0..proposals {
      let (class_id, score) = (0..num_classes)
        .map(|c| (c, at(ONNX_BOX_VALUES + c, i)))
        .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });

      if score < self.config.confidence {
        continue;
      }

      let (cx, cy, w, h) = (at(0, i), at(1, i), at(2, i), at(3, i));
      let bbox = letterbox.to_source_bbox([cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0]);
      if bbox[0] >= bbox[2] || bbox[1] >= bbox[3] {
        continue;
      }

      items.push(DetectItem {
        class_id: class_id as u32,
        label: self.labels.get(class_id as u32),
        score,
        bbox,
      });
    }

    debug!("NMS 前候选框数量: {}", items.len());
    let items = non_max_suppression(
      items,
      self.config.nms_threshold,
      self.config.max_detections,
    );
    Ok(DetectResult::new(items))
  }
}

impl Model for OnnxYolo {
  fn infer(&self, frame: &Frame) -> Result<DetectResult, InferenceError> {
    let (input, letterbox) = self.preprocess(frame);

    debug!("执行模型推理");
    let outputs = self
      .plan
      .run(tvec!(input.into()))
      .map_err(InferenceError::backend)?;

    let output = outputs
      .first()
      .ok_or_else(|| InferenceError::Backend("模型没有输出".to_string()))?;
    let view = output
      .to_array_view::<f32>()
      .map_err(InferenceError::backend)?;
    let shape = view.shape().to_vec();
    let data: Vec<f32> = view.iter().copied().collect();

    self.postprocess(&shape, &data, &letterbox)
  }

  fn labels(&self) -> &Labels {
    &self.labels
  }

  fn name(&self) -> &str {
    &self.name
  }
}
