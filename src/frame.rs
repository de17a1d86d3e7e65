// 该文件是 Shuangmu （双目） 项目的一部分。
// src/frame.rs - 帧定义
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

use image::RgbImage;

const RGB_CHANNELS: usize = 3;

pub trait AsNchwFrame {
  fn as_nchw(&self) -> &[u8];
}

pub trait AsNhwcFrame {
  fn as_nhwc(&self) -> &[u8];
}

/// 一帧解码后的 RGB 图像
///
/// 帧在创建后不会再被修改，显示或推理时只读借用。
#[derive(Debug, Clone)]
pub struct Frame {
  /// RGB 图像数据
  pub image: RgbImage,
  /// 帧索引
  pub index: u64,
  /// 时间戳（毫秒）
  pub timestamp_ms: u64,
}

impl Frame {
  pub fn new(image: RgbImage, index: u64, timestamp_ms: u64) -> Self {
    Self {
      image,
      index,
      timestamp_ms,
    }
  }

  pub fn still(image: RgbImage) -> Self {
    Self::new(image, 0, 0)
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }
}

#[derive(Debug, Clone)]
pub struct RgbNchwFrame {
  width: usize,
  height: usize,
  data: Box<[u8]>,
}

impl RgbNchwFrame {
  pub fn with_shape(height: usize, width: usize) -> Self {
    Self {
      width,
      height,
      data: vec![0u8; RGB_CHANNELS * width * height].into_boxed_slice(),
    }
  }

  pub fn height(&self) -> usize {
    self.height
  }

  pub fn width(&self) -> usize {
    self.width
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }
}

impl AsMut<[u8]> for RgbNchwFrame {
  fn as_mut(&mut self) -> &mut [u8] {
    &mut self.data
  }
}

impl AsNchwFrame for RgbNchwFrame {
  fn as_nchw(&self) -> &[u8] {
    &self.data
  }
}

impl From<&RgbImage> for RgbNchwFrame {
  fn from(image: &RgbImage) -> Self {
    let (width, height) = image.dimensions();
    let mut frame = RgbNchwFrame::with_shape(height as usize, width as usize);
    let plane = frame.width * frame.height;
    let slice = frame.as_mut();

    // HWC -> CHW
    for (idx, pixel) in image.pixels().enumerate() {
      slice[idx] = pixel[0];
      slice[plane + idx] = pixel[1];
      slice[2 * plane + idx] = pixel[2];
    }
    frame
  }
}

#[derive(Debug, Clone)]
pub struct RgbNhwcFrame {
  width: usize,
  height: usize,
  data: Box<[u8]>,
}

impl RgbNhwcFrame {
  pub fn height(&self) -> usize {
    self.height
  }

  pub fn width(&self) -> usize {
    self.width
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }
}

impl AsNhwcFrame for RgbNhwcFrame {
  fn as_nhwc(&self) -> &[u8] {
    &self.data
  }
}

impl From<&RgbImage> for RgbNhwcFrame {
  fn from(image: &RgbImage) -> Self {
    // RgbImage 本身就是 HWC 排列
    Self {
      width: image.width() as usize,
      height: image.height() as usize,
      data: image.as_raw().clone().into_boxed_slice(),
    }
  }
}
