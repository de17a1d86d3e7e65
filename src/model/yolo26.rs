// 该文件是 Shuangmu （双目） 项目的一部分。
// src/model/yolo26.rs - RKNN YOLO26 推理后端
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

use rknpu::{Context, InitFlags, TensorType};
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{AsNhwcFrame, Frame, RgbNhwcFrame},
  model::{
    DetectItem, DetectResult, DetectorConfig, InferenceError, Labels, Letterbox, LoadError, Model,
    non_max_suppression,
  },
};

const YOLO26_NUM_INPUTS: u32 = 1;
const YOLO26_NUM_OUTPUTS: u32 = 6;
const YOLO26_CLASS_NUM: usize = 80;
const YOLO26_INPUT_W: f32 = 640.0;
const YOLO26_INPUT_H: f32 = 640.0;
const YOLO26_HEAD_SIZES: [(usize, usize); 3] = [(80, 80), (40, 40), (20, 20)];
const YOLO26_STRIDES: [f32; 3] = [8.0, 16.0, 32.0];

pub struct Yolo26 {
  context: Context,
  labels: Labels,
  config: DetectorConfig,
}

pub struct Yolo26Builder {
  model_path: PathBuf,
  flags: InitFlags,
  config: DetectorConfig,
}

impl FromUrlWithScheme for Yolo26Builder {
  const SCHEME: &'static str = "yolo26";
}

impl FromUrl for Yolo26Builder {
  type Error = LoadError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(LoadError::SchemeMismatch(url.scheme().to_string()));
    }
    Ok(Yolo26Builder::new(crate::url_path(url)))
  }
}

impl Yolo26Builder {
  pub fn new(model_path: impl AsRef<Path>) -> Self {
    Self {
      model_path: model_path.as_ref().to_path_buf(),
      flags: InitFlags::default(),
      config: DetectorConfig::default(),
    }
  }

  pub fn flags(mut self, flags: InitFlags) -> Self {
    self.flags = flags;
    self
  }

  pub fn config(mut self, config: DetectorConfig) -> Self {
    self.config = config;
    self
  }

  pub fn build(self) -> Result<Yolo26, LoadError> {
    info!("加载模型文件: {}", self.model_path.display());
    let model_data = std::fs::read(&self.model_path)?;
    debug!(
      "模型文件大小: {:.2} MB",
      model_data.len() as f64 / (1024.0 * 1024.0)
    );

    info!("创建 RKNN 推理上下文");
    let context = Context::new(&model_data, self.flags).map_err(LoadError::invalid)?;

    let num_inputs = context.num_inputs().map_err(LoadError::invalid)?;
    let num_outputs = context.num_outputs().map_err(LoadError::invalid)?;
    if num_inputs != YOLO26_NUM_INPUTS || num_outputs != YOLO26_NUM_OUTPUTS {
      error!(
        "预期模型输入/输出数量为 {}/{}, 实际为 {}/{}",
        YOLO26_NUM_INPUTS, YOLO26_NUM_OUTPUTS, num_inputs, num_outputs
      );
      return Err(LoadError::Invalid(format!(
        "模型输入/输出数量为 {}/{}",
        num_inputs, num_outputs
      )));
    }
    info!("模型加载完成");

    Ok(Yolo26 {
      context,
      labels: Labels::coco(),
      config: self.config,
    })
  }
}

/// 根据张量大小匹配回归和分类输出，RKNN 的输出顺序并不固定
fn match_reg_cls_tensors<'a>(
  tensor1: &'a [f32],
  tensor2: &'a [f32],
  reg_expected: usize,
  cls_expected: usize,
) -> Option<(&'a [f32], &'a [f32])> {
  if tensor1.len() == reg_expected && tensor2.len() == cls_expected {
    Some((tensor1, tensor2))
  } else if tensor1.len() == cls_expected && tensor2.len() == reg_expected {
    Some((tensor2, tensor1))
  } else {
    None
  }
}

impl Yolo26 {
  fn postprocess(&self, output: &rknpu::Output, letterbox: &Letterbox) -> DetectResult {
    let mut items = Vec::new();

    for (head_idx, (&(map_h, map_w), stride)) in
      YOLO26_HEAD_SIZES.iter().zip(YOLO26_STRIDES).enumerate()
    {
      let spatial = map_h * map_w;
      let (tensor1, tensor2) = match (output.get_f32(head_idx * 2), output.get_f32(head_idx * 2 + 1))
      {
        (Ok(t1), Ok(t2)) => (t1, t2),
        _ => {
          error!("获取检测头 {} 的输出失败", head_idx);
          continue;
        }
      };

      let Some((reg, cls)) =
        match_reg_cls_tensors(tensor1, tensor2, 4 * spatial, YOLO26_CLASS_NUM * spatial)
      else {
        error!(
          "检测头 {}: 输出大小不匹配 - {} / {}",
          head_idx,
          tensor1.len(),
          tensor2.len()
        );
        continue;
      };

      for h in 0..map_h {
        for w in 0..map_w {
          let idx = h * map_w + w;

          let (max_logit, class_id) = (0..YOLO26_CLASS_NUM)
            .map(|c| (cls[c * spatial + idx], c))
            .fold((f32::MIN, 0), |best, cur| if cur.0 > best.0 { cur } else { best });
          let score = sigmoid(max_logit);
          if score <= self.config.confidence {
            continue;
          }

          let grid_x = (w as f32) + 0.5;
          let grid_y = (h as f32) + 0.5;

          let xmin = ((grid_x - reg[idx]) * stride).clamp(0.0, YOLO26_INPUT_W);
          let ymin = ((grid_y - reg[spatial + idx]) * stride).clamp(0.0, YOLO26_INPUT_H);
          let xmax = ((grid_x + reg[2 * spatial + idx]) * stride).clamp(0.0, YOLO26_INPUT_W);
          let ymax = ((grid_y + reg[3 * spatial + idx]) * stride).clamp(0.0, YOLO26_INPUT_H);

          items.push(DetectItem {
            class_id: class_id as u32,
            label: self.labels.get(class_id as u32),
            score,
            bbox: letterbox.to_source_bbox([xmin, ymin, xmax, ymax]),
          });
        }
      }
    }

    debug!("检测到 {} 个物体", items.len());
    DetectResult::new(non_max_suppression(
      items,
      self.config.nms_threshold,
      self.config.max_detections,
    ))
  }
}

impl Model for Yolo26 {
  fn infer(&self, frame: &Frame) -> Result<DetectResult, InferenceError> {
    let letterbox = Letterbox::new(
      frame.image.dimensions(),
      (YOLO26_INPUT_W as u32, YOLO26_INPUT_H as u32),
    );
    let input = RgbNhwcFrame::from(&letterbox.apply(&frame.image));

    debug!("设置模型输入");
    self
      .context
      .set_input(
        0,
        input.as_nhwc(),
        rknpu::TensorFormat::NHWC,
        TensorType::UInt8,
      )
      .map_err(InferenceError::backend)?;

    debug!("执行模型推理");
    self.context.run().map_err(InferenceError::backend)?;

    let output = self
      .context
      .get_outputs()
      .map_err(InferenceError::backend)?;
    Ok(self.postprocess(&output, &letterbox))
  }

  fn labels(&self) -> &Labels {
    &self.labels
  }

  fn name(&self) -> &str {
    "yolo26"
  }
}

fn sigmoid(x: f32) -> f32 {
  1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn matches_tensors_in_either_order() {
    let reg = [0.0f32; 8];
    let cls = [0.0f32; 4];
    assert!(match_reg_cls_tensors(&reg, &cls, 8, 4).is_some());
    assert!(match_reg_cls_tensors(&cls, &reg, 8, 4).is_some());
    assert!(match_reg_cls_tensors(&cls, &cls, 8, 4).is_none());
  }
}
