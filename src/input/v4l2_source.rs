// 该文件是 Shuangmu （双目） 项目的一部分。
// src/input/v4l2_source.rs - V4L2 摄像头输入
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

use std::time::Instant;

use image::RgbImage;
use tracing::{debug, info};
use v4l::{
  FourCC, buffer::Type, io::mmap::Stream, io::traits::CaptureStream, prelude::*, video::Capture,
};

use crate::{
  frame::Frame,
  input::{FrameSource, InputError, SourceKind},
};

const V4L2_BUFFER_COUNT: u32 = 4;

/// V4L2 摄像头，按 YUYV 采集后转换为 RGB
pub struct V4l2Source {
  // stream 需要先于 device 释放
  stream: Option<Stream<'static>>,
  device: Device,
  device_path: String,
  frame_index: u64,
  width: u32,
  height: u32,
  start_time: Instant,
}

impl V4l2Source {
  pub fn open(device_path: &str, width: u32, height: u32) -> Result<Self, InputError> {
    let unavailable =
      |e: std::io::Error| InputError::DeviceUnavailable(format!("{}: {}", device_path, e));

    let device = Device::with_path(device_path).map_err(unavailable)?;

    let mut format = device.format().map_err(unavailable)?;
    format.width = width;
    format.height = height;
    format.fourcc = FourCC::new(b"YUYV");
    let format = device.set_format(&format).map_err(unavailable)?;
    if format.fourcc != FourCC::new(b"YUYV") {
      return Err(InputError::Unsupported(format!(
        "摄像头像素格式 {}",
        format.fourcc
      )));
    }
    info!(
      "摄像头 {} 输出 {}x{} YUYV",
      device_path, format.width, format.height
    );

    let stream =
      Stream::with_buffers(&device, Type::VideoCapture, V4L2_BUFFER_COUNT).map_err(unavailable)?;

    Ok(Self {
      stream: Some(stream),
      device,
      device_path: device_path.to_string(),
      frame_index: 0,
      width: format.width,
      height: format.height,
      start_time: Instant::now(),
    })
  }

  pub fn device(&self) -> &Device {
    &self.device
  }
}

impl Drop for V4l2Source {
  fn drop(&mut self) {
    self.stream.take();
    debug!("摄像头 {} 已释放", self.device_path);
  }
}

/// YUYV (YUV 4:2:2) 转 RGB，每 4 字节对应两个像素
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Vec<u8> {
  let mut rgb = Vec::with_capacity((width * height * 3) as usize);

  for chunk in yuyv.chunks_exact(4) {
    let u = chunk[1] as f32 - 128.0;
    let v = chunk[3] as f32 - 128.0;
    for y in [chunk[0] as f32, chunk[2] as f32] {
      let r = (y + 1.402 * v).clamp(0.0, 255.0) as u8;
      let g = (y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8;
      let b = (y + 1.772 * u).clamp(0.0, 255.0) as u8;
      rgb.extend_from_slice(&[r, g, b]);
    }
  }

  rgb
}

impl FrameSource for V4l2Source {
  fn kind(&self) -> SourceKind {
    SourceKind::Camera
  }

  fn next_frame(&mut self) -> Result<Option<Frame>, InputError> {
    let stream = self
      .stream
      .as_mut()
      .ok_or_else(|| InputError::Capture("采集流已关闭".to_string()))?;

    let (buffer, _meta) = stream
      .next()
      .map_err(|e| InputError::Capture(format!("无法捕获帧: {}", e)))?;

    let rgb = yuyv_to_rgb(buffer, self.width, self.height);
    let image = RgbImage::from_raw(self.width, self.height, rgb)
      .ok_or_else(|| InputError::Capture("无法创建 RGB 图像".to_string()))?;

    let frame = Frame::new(
      image,
      self.frame_index,
      self.start_time.elapsed().as_millis() as u64,
    );
    self.frame_index += 1;
    Ok(Some(frame))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn yuyv_grey_converts_to_grey() {
    let yuyv = [128u8, 128, 64, 128];
    let rgb = yuyv_to_rgb(&yuyv, 2, 1);
    assert_eq!(rgb, vec![128, 128, 128, 64, 64, 64]);
  }
}
