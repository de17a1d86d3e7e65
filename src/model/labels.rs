// 该文件是 Shuangmu （双目） 项目的一部分。
// src/model/labels.rs - 类别标签
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

use std::sync::Arc;

/// COCO 数据集类别名称
pub const COCO_CLASSES: [&str; 80] = [
  "person",
  "bicycle",
  "car",
  "motorcycle",
  "airplane",
  "bus",
  "train",
  "truck",
  "boat",
  "traffic light",
  "fire hydrant",
  "stop sign",
  "parking meter",
  "bench",
  "bird",
  "cat",
  "dog",
  "horse",
  "sheep",
  "cow",
  "elephant",
  "bear",
  "zebra",
  "giraffe",
  "backpack",
  "umbrella",
  "handbag",
  "tie",
  "suitcase",
  "frisbee",
  "skis",
  "snowboard",
  "sports ball",
  "kite",
  "baseball bat",
  "baseball glove",
  "skateboard",
  "surfboard",
  "tennis racket",
  "bottle",
  "wine glass",
  "cup",
  "fork",
  "knife",
  "spoon",
  "bowl",
  "banana",
  "apple",
  "sandwich",
  "orange",
  "broccoli",
  "carrot",
  "hot dog",
  "pizza",
  "donut",
  "cake",
  "chair",
  "couch",
  "potted plant",
  "bed",
  "dining table",
  "toilet",
  "tv",
  "laptop",
  "mouse",
  "remote",
  "keyboard",
  "cell phone",
  "microwave",
  "oven",
  "toaster",
  "sink",
  "refrigerator",
  "book",
  "clock",
  "vase",
  "scissors",
  "teddy bear",
  "hair drier",
  "toothbrush",
];

/// 类别 id 到名称的映射
#[derive(Debug, Clone)]
pub struct Labels {
  names: Arc<[Arc<str>]>,
}

impl Labels {
  pub fn coco() -> Self {
    Self::from(COCO_CLASSES.iter().map(|s| s.to_string()).collect::<Vec<_>>())
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  /// 超出范围的 id 用 `class{id}` 代替
  pub fn get(&self, class_id: u32) -> Arc<str> {
    self
      .names
      .get(class_id as usize)
      .cloned()
      .unwrap_or_else(|| Arc::from(format!("class{}", class_id)))
  }
}

impl From<Vec<String>> for Labels {
  fn from(names: Vec<String>) -> Self {
    Self {
      names: names.into_iter().map(Arc::from).collect(),
    }
  }
}

/// 解析 ultralytics 导出时写入元数据的 `names` 字段
///
/// 格式形如 `{0: 'person', 1: 'bicycle'}`，id 不连续或格式不符时返回 `None`。
pub fn parse_ultralytics_names(raw: &str) -> Option<Vec<String>> {
  let body = raw.trim().strip_prefix('{')?.strip_suffix('}')?;
  let mut names = Vec::new();

  let mut rest = body.trim();
  while !rest.is_empty() {
    let (id, tail) = rest.split_once(':')?;
    let id: usize = id.trim().parse().ok()?;
    if id != names.len() {
      return None;
    }

    let tail = tail.trim_start();
    let quote = tail.chars().next().filter(|c| *c == '\'' || *c == '"')?;
    let tail = &tail[1..];
    let end = tail.find(quote)?;
    names.push(tail[..end].to_string());

    rest = tail[end + 1..].trim_start();
    rest = rest.strip_prefix(',').unwrap_or(rest).trim_start();
  }

  if names.is_empty() { None } else { Some(names) }
}
