// 该文件是 Shuangmu （双目） 项目的一部分。
// src/output/bitmap.rs - 可显示位图
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

use std::path::Path;

use image::{
  ImageFormat, RgbImage,
  imageops::{self, FilterType},
};
use tracing::info;

use super::OutputError;

const SAVE_FORMATS: [ImageFormat; 3] = [ImageFormat::Png, ImageFormat::Jpeg, ImageFormat::Bmp];

/// 按显示面尺寸等比缩放后的位图
#[derive(Debug, Clone, PartialEq)]
pub struct Bitmap {
  image: RgbImage,
}

impl Bitmap {
  /// 保持宽高比缩放到 `bounds` 以内
  pub fn fit(image: &RgbImage, bounds: (u32, u32)) -> Self {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 || bounds.0 == 0 || bounds.1 == 0 {
      return Self {
        image: image.clone(),
      };
    }

    let scale = (bounds.0 as f32 / w as f32).min(bounds.1 as f32 / h as f32);
    let target = (
      ((w as f32 * scale).round() as u32).max(1),
      ((h as f32 * scale).round() as u32).max(1),
    );
    if target == (w, h) {
      return Self {
        image: image.clone(),
      };
    }

    Self {
      image: imageops::resize(image, target.0, target.1, FilterType::Triangle),
    }
  }

  pub fn image(&self) -> &RgbImage {
    &self.image
  }

  pub fn dimensions(&self) -> (u32, u32) {
    self.image.dimensions()
  }

  /// 以扩展名决定格式保存，支持 png / jpg / bmp
  pub fn save(&self, path: impl AsRef<Path>) -> Result<(), OutputError> {
    let path = path.as_ref();
    let format = ImageFormat::from_path(path)
      .ok()
      .filter(|f| SAVE_FORMATS.contains(f))
      .ok_or_else(|| OutputError::UnsupportedFormat(path.to_path_buf()))?;

    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    self.image.save_with_format(path, format)?;
    info!("图片已保存到 {}", path.display());
    Ok(())
  }
}
