// 该文件是 Shuangmu （双目） 项目的一部分。
// src/model/nms.rs - 非极大值抑制
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

use super::DetectItem;

/// 计算两个边界框的 IoU
pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let x1 = a[0].max(b[0]);
  let y1 = a[1].max(b[1]);
  let x2 = a[2].min(b[2]);
  let y2 = a[3].min(b[3]);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
  let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
  let union = area_a + area_b - intersection;

  if union > 0.0 {
    intersection / union
  } else {
    0.0
  }
}

/// 按类别做非极大值抑制，结果按置信度降序并截断到 `max_detections`
pub fn non_max_suppression(
  mut detections: Vec<DetectItem>,
  threshold: f32,
  max_detections: usize,
) -> Vec<DetectItem> {
  // 按置信度降序排序
  detections.sort_by(|a, b| b.score.total_cmp(&a.score));

  let mut result: Vec<DetectItem> = Vec::new();
  for det in detections {
    if result.len() >= max_detections {
      break;
    }
    let suppressed = result
      .iter()
      .any(|kept| kept.class_id == det.class_id && iou(&kept.bbox, &det.bbox) >= threshold);
    if !suppressed {
      result.push(det);
    }
  }

  result
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Arc;

  fn item(class_id: u32, score: f32, bbox: [f32; 4]) -> DetectItem {
    DetectItem {
      class_id,
      label: Arc::from(format!("c{}", class_id)),
      score,
      bbox,
    }
  }

  #[test]
  fn iou_of_disjoint_and_identical_boxes() {
    let a = [0.0, 0.0, 0.5, 0.5];
    assert_eq!(iou(&a, &[0.6, 0.6, 0.9, 0.9]), 0.0);
    assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
  }

  #[test]
  fn suppresses_overlapping_boxes_of_same_class() {
    let kept = non_max_suppression(
      vec![
        item(0, 0.6, [0.1, 0.1, 0.5, 0.5]),
        item(0, 0.9, [0.12, 0.1, 0.5, 0.52]),
        item(1, 0.5, [0.1, 0.1, 0.5, 0.5]),
      ],
      0.45,
      10,
    );

    assert_eq!(kept.len(), 2);
    assert_eq!(kept[0].score, 0.9);
    assert_eq!(kept[1].class_id, 1);
  }

  #[test]
  fn truncates_to_max_detections() {
    let boxes = (0..5)
      .map(|i| {
        let x = i as f32 * 0.2;
        item(0, 0.5 + i as f32 * 0.01, [x, 0.0, x + 0.1, 0.1])
      })
      .collect();
    assert_eq!(non_max_suppression(boxes, 0.45, 3).len(), 3);
  }
}
