// 该文件是 Shuangmu （双目） 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
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

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size},
  rect::Rect,
};
use tracing::{debug, warn};

use crate::model::{DetectItem, DetectResult, DetectorConfig};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_TEXT_HEIGHT: i32 = 24;
const LABEL_CHAR_WIDTH: f32 = 11.0; // 没有字体时用来估算标签宽度
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const BOX_THICKNESS: i32 = 2;
const PALETTE_SIZE: u32 = 80;

const SYSTEM_FONTS: [&str; 5] = [
  "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
  "/usr/share/fonts/dejavu/DejaVuSans.ttf",
  "/usr/share/fonts/TTF/DejaVuSans.ttf",
  "/System/Library/Fonts/Supplemental/Arial.ttf",
  "C:\\Windows\\Fonts\\arial.ttf",
];

pub struct Draw {
  font: Option<FontArc>,
  font_size: f32,
  label_text_height: i32,
}

impl Draw {
  pub fn from_config(config: &DetectorConfig) -> Self {
    let candidates: Vec<PathBuf> = match &config.font {
      Some(path) => vec![path.clone()],
      None => SYSTEM_FONTS.iter().map(PathBuf::from).collect(),
    };

    let font = candidates.iter().find_map(|path| load_font(path));
    if font.is_none() {
      warn!("没有找到可用字体，标注中不绘制文字");
    }
    Self::with_font(font)
  }

  pub fn without_font() -> Self {
    Self::with_font(None)
  }

  fn with_font(font: Option<FontArc>) -> Self {
    Self {
      font,
      font_size: LABEL_FONT_SIZE,
      label_text_height: LABEL_TEXT_HEIGHT,
    }
  }

  /// 返回标注后的副本，原图不变
  pub fn annotate(&self, image: &RgbImage, result: &DetectResult) -> RgbImage {
    let mut annotated = image.clone();
    for item in result.items.iter() {
      self.draw_bbox_with_label(&mut annotated, item);
    }
    annotated
  }

  // bbox 为归一化坐标 [x_min, y_min, x_max, y_max]
  fn draw_bbox_with_label(&self, image: &mut RgbImage, item: &DetectItem) {
    let (w, h) = (image.width() as f32, image.height() as f32);
    if w < 1.0 || h < 1.0 {
      return;
    }

    let x_min = ((item.bbox[0] * w).floor() as i32).clamp(0, w as i32 - 1);
    let y_min = ((item.bbox[1] * h).floor() as i32).clamp(0, h as i32 - 1);
    let x_max = ((item.bbox[2] * w).ceil() as i32).clamp(0, w as i32 - 1);
    let y_max = ((item.bbox[3] * h).ceil() as i32).clamp(0, h as i32 - 1);

    if x_min >= x_max || y_min >= y_max {
      return;
    }

    let color = class_color(item.class_id);

    // 边框加粗
    for t in 0..BOX_THICKNESS {
      let width = (x_max - x_min - 2 * t + 1).max(1) as u32;
      let height = (y_max - y_min - 2 * t + 1).max(1) as u32;
      draw_hollow_rect_mut(image, Rect::at(x_min + t, y_min + t).of_size(width, height), color);
    }

    let label = format!("{} {:.2}", item.label, item.score);
    let scale = PxScale::from(self.font_size);
    let text_width = match &self.font {
      Some(font) => text_size(scale, font, &label).0 as i32 + 4,
      None => (label.len() as f32 * LABEL_CHAR_WIDTH) as i32,
    };

    // 标签放在边框上方，放不下时贴着图像上沿
    let label_x = x_min;
    let label_y = (y_min - self.label_text_height).max(0);
    let label_width = text_width.min(w as i32 - label_x).max(0) as u32;
    let label_height = (self.label_text_height.min(h as i32 - label_y)).max(0) as u32;
    if label_width == 0 || label_height == 0 {
      return;
    }

    draw_filled_rect_mut(
      image,
      Rect::at(label_x, label_y).of_size(label_width, label_height),
      color,
    );

    if let Some(font) = &self.font {
      draw_text_mut(
        image,
        Rgb([255u8, 255u8, 255u8]),
        label_x + 2,
        label_y + LABEL_TEXT_VERTICAL_PADDING,
        scale,
        font,
        &label,
      );
    }
  }
}

fn load_font(path: &Path) -> Option<FontArc> {
  let data = std::fs::read(path).ok()?;
  match FontArc::try_from_vec(data) {
    Ok(font) => {
      debug!("使用字体: {}", path.display());
      Some(font)
    }
    Err(e) => {
      warn!("字体文件无效 {}: {}", path.display(), e);
      None
    }
  }
}

/// 按类别在色环上取色
pub fn class_color(class_id: u32) -> Rgb<u8> {
  let hue = ((class_id % PALETTE_SIZE) as f32 / PALETTE_SIZE as f32) * 360.0;
  hsv_to_rgb(hue, 0.8, 0.9)
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb<u8> {
  let c = v * s;
  let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
  let m = v - c;

  let (r, g, b) = if h < 60.0 {
    (c, x, 0.0)
  } else if h < 120.0 {
    (x, c, 0.0)
  } else if h < 180.0 {
    (0.0, c, x)
  } else if h < 240.0 {
    (0.0, x, c)
  } else if h < 300.0 {
    (x, 0.0, c)
  } else {
    (c, 0.0, x)
  };

  Rgb([
    ((r + m) * 255.0) as u8,
    ((g + m) * 255.0) as u8,
    ((b + m) * 255.0) as u8,
  ])
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Arc;

  fn result(bbox: [f32; 4]) -> DetectResult {
    DetectResult::new(vec![DetectItem {
      class_id: 0,
      label: Arc::from("person"),
      score: 0.87,
      bbox,
    }])
  }

  #[test]
  fn draws_box_edges_in_class_color() {
    let image = RgbImage::new(100, 100);
    let annotated = Draw::without_font().annotate(&image, &result([0.2, 0.4, 0.8, 0.9]));

    let color = class_color(0);
    assert_eq!(annotated.get_pixel(20, 60), &color);
    assert_eq!(annotated.get_pixel(80, 60), &color);
    // 框内部保持原样
    assert_eq!(annotated.get_pixel(50, 70), &Rgb([0, 0, 0]));
    // 原图不被修改
    assert_eq!(image.get_pixel(20, 60), &Rgb([0, 0, 0]));
  }

  #[test]
  fn degenerate_box_is_skipped() {
    let image = RgbImage::new(50, 50);
    let annotated = Draw::without_font().annotate(&image, &result([0.5, 0.5, 0.5, 0.9]));
    assert_eq!(annotated, image);
  }

  #[test]
  fn palette_differs_between_classes() {
    assert_ne!(class_color(0), class_color(1));
    assert_eq!(class_color(3), class_color(83));
  }
}
