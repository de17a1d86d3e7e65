// 该文件是 Shuangmu （双目） 项目的一部分。
// src/model/letterbox.rs - 等比缩放与填充
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

use image::{
  Rgb, RgbImage,
  imageops::{self, FilterType},
};

const PAD_VALUE: u8 = 114;

/// 把原图等比缩放进模型输入尺寸，剩余部分用灰色填充
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
  scale: f32,
  pad_x: u32,
  pad_y: u32,
  resized: (u32, u32),
  source: (u32, u32),
  target: (u32, u32),
}

impl Letterbox {
  pub fn new(source: (u32, u32), target: (u32, u32)) -> Self {
    let scale = (target.0 as f32 / source.0 as f32).min(target.1 as f32 / source.1 as f32);
    let resized = (
      ((source.0 as f32 * scale).round() as u32).clamp(1, target.0),
      ((source.1 as f32 * scale).round() as u32).clamp(1, target.1),
    );

    Self {
      scale,
      pad_x: (target.0 - resized.0) / 2,
      pad_y: (target.1 - resized.1) / 2,
      resized,
      source,
      target,
    }
  }

  pub fn scale(&self) -> f32 {
    self.scale
  }

  pub fn padding(&self) -> (u32, u32) {
    (self.pad_x, self.pad_y)
  }

  pub fn apply(&self, image: &RgbImage) -> RgbImage {
    let resized = imageops::resize(image, self.resized.0, self.resized.1, FilterType::Triangle);
    let mut canvas = RgbImage::from_pixel(self.target.0, self.target.1, Rgb([PAD_VALUE; 3]));
    imageops::overlay(&mut canvas, &resized, self.pad_x as i64, self.pad_y as i64);
    canvas
  }

  /// 模型输入坐标系下的 `[x_min, y_min, x_max, y_max]` 映射回原图并归一化
  pub fn to_source_bbox(&self, bbox: [f32; 4]) -> [f32; 4] {
    let (w, h) = (self.source.0 as f32, self.source.1 as f32);
    let unmap_x = |x: f32| ((x - self.pad_x as f32) / self.scale / w).clamp(0.0, 1.0);
    let unmap_y = |y: f32| ((y - self.pad_y as f32) / self.scale / h).clamp(0.0, 1.0);
    [
      unmap_x(bbox[0]),
      unmap_y(bbox[1]),
      unmap_x(bbox[2]),
      unmap_y(bbox[3]),
    ]
  }
}
