// 该文件是 Shuangmu （双目） 项目的一部分。
// src/input/gstreamer_input.rs - GStreamer 视频/摄像头输入
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

//! # GStreamer 输入
//!
//! 通过 `appsink` 拉取 RGB 帧，支持视频文件和 V4L2 摄像头。
//!
//! 使用前需要安装 GStreamer 开发库：
//!
//! ```bash
//! sudo apt-get install libgstreamer1.0-dev libgstreamer-plugins-base1.0-dev
//! ```
//!
//! 视频读到结尾时 `next_frame` 返回 `Ok(None)`，摄像头不会读完。

use std::{path::Path, time::Instant};

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use image::RgbImage;
use tracing::{debug, info, warn};

use crate::{
  frame::Frame,
  input::{FrameSource, InputError, SourceKind},
};

enum PipelineItem {
  FileSource(String),
  CameraSource {
    device: String,
    width: u32,
    height: u32,
    fps: u32,
  },
  TargetFormat(&'static str),
}

impl PipelineItem {
  fn to_pipeline(&self) -> String {
    match self {
      PipelineItem::FileSource(path) => {
        format!("filesrc location=\"{}\" ! decodebin", path)
      }
      PipelineItem::CameraSource {
        device,
        width,
        height,
        fps,
      } => format!(
        "v4l2src device={} ! video/x-raw,width={},height={},framerate={}/1",
        device, width, height, fps
      ),
      PipelineItem::TargetFormat(format) => {
        format!("videoconvert ! video/x-raw,format={}", format)
      }
    }
  }
}

/// GStreamer 管道构建器
pub struct GStreamerSourceBuilder {
  kind: SourceKind,
  items: Vec<PipelineItem>,
}

impl GStreamerSourceBuilder {
  pub fn file(path: impl AsRef<Path>) -> Self {
    Self {
      kind: SourceKind::Video,
      items: vec![
        PipelineItem::FileSource(path.as_ref().display().to_string()),
        PipelineItem::TargetFormat("RGB"),
      ],
    }
  }

  pub fn camera(device: &str, width: u32, height: u32, fps: u32) -> Self {
    Self {
      kind: SourceKind::Camera,
      items: vec![
        PipelineItem::CameraSource {
          device: device.to_string(),
          width,
          height,
          fps,
        },
        PipelineItem::TargetFormat("RGB"),
      ],
    }
  }

  pub fn description(&self) -> String {
    let basic = self
      .items
      .iter()
      .map(PipelineItem::to_pipeline)
      .collect::<Vec<String>>()
      .join(" ! ");
    // 视频文件不丢帧，摄像头只留最新的两帧
    match self.kind {
      SourceKind::Camera => format!("{} ! appsink max-buffers=2 drop=true name=sink", basic),
      _ => format!("{} ! appsink sync=false name=sink", basic),
    }
  }

  pub fn build(self) -> Result<GStreamerSource, InputError> {
    let unavailable = |e: String| match self.kind {
      SourceKind::Camera => InputError::DeviceUnavailable(e),
      _ => InputError::Unsupported(e),
    };

    gst::init().map_err(|e| unavailable(e.to_string()))?;

    let description = self.description();
    info!("GStreamer 管道: {}", description);

    let pipeline = gst::parse::launch(&description)
      .map_err(|e| unavailable(e.to_string()))?
      .downcast::<gst::Pipeline>()
      .map_err(|_| unavailable("无法创建管道".to_string()))?;

    let appsink = pipeline
      .by_name("sink")
      .and_then(|sink| sink.downcast::<gst_app::AppSink>().ok())
      .ok_or_else(|| unavailable("找不到 appsink".to_string()))?;

    if let Err(e) = pipeline.set_state(gst::State::Playing) {
      let _ = pipeline.set_state(gst::State::Null);
      return Err(unavailable(e.to_string()));
    }

    Ok(GStreamerSource {
      pipeline,
      appsink,
      kind: self.kind,
      frame_index: 0,
      start_time: Instant::now(),
    })
  }
}

pub struct GStreamerSource {
  pipeline: gst::Pipeline,
  appsink: gst_app::AppSink,
  kind: SourceKind,
  frame_index: u64,
  start_time: Instant,
}

impl Drop for GStreamerSource {
  fn drop(&mut self) {
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("停止 GStreamer 管道失败: {}", e);
    }
    debug!("GStreamer 管道已释放");
  }
}

impl FrameSource for GStreamerSource {
  fn kind(&self) -> SourceKind {
    self.kind
  }

  fn next_frame(&mut self) -> Result<Option<Frame>, InputError> {
    let sample = match self.appsink.pull_sample() {
      Ok(sample) => sample,
      Err(_) if self.appsink.is_eos() => {
        info!("视频读取完毕，共 {} 帧", self.frame_index);
        return Ok(None);
      }
      Err(e) => return Err(InputError::Capture(e.to_string())),
    };

    let image = sample_to_rgb_image(&sample)?;
    let frame = Frame::new(
      image,
      self.frame_index,
      self.start_time.elapsed().as_millis() as u64,
    );
    self.frame_index += 1;
    Ok(Some(frame))
  }
}

fn sample_to_rgb_image(sample: &gst::Sample) -> Result<RgbImage, InputError> {
  let buffer = sample
    .buffer()
    .ok_or_else(|| InputError::Capture("样本中没有缓冲区".to_string()))?;
  let caps = sample
    .caps()
    .ok_or_else(|| InputError::Capture("样本中没有 caps".to_string()))?;
  let info = gst_video::VideoInfo::from_caps(caps)
    .map_err(|_| InputError::Capture("无法解析视频信息".to_string()))?;

  let width = info.width() as usize;
  let height = info.height() as usize;
  let stride = info.stride()[0] as usize;

  let map = buffer
    .map_readable()
    .map_err(|e| InputError::Capture(format!("无法映射缓冲区: {}", e)))?;
  let data = map.as_slice();

  let expected = stride * (height.saturating_sub(1)) + width * 3;
  if data.len() < expected {
    return Err(InputError::Capture(format!(
      "缓冲区大小不匹配: 需要 {} 字节，实际 {} 字节",
      expected,
      data.len()
    )));
  }

  let bgr = match info.format() {
    gst_video::VideoFormat::Rgb => false,
    gst_video::VideoFormat::Bgr => true,
    other => return Err(InputError::Unsupported(format!("视频格式 {:?}", other))),
  };

  let mut rgb = Vec::with_capacity(width * height * 3);
  for row in data.chunks(stride).take(height) {
    for px in row[..width * 3].chunks_exact(3) {
      if bgr {
        rgb.extend_from_slice(&[px[2], px[1], px[0]]);
      } else {
        rgb.extend_from_slice(px);
      }
    }
  }

  RgbImage::from_raw(width as u32, height as u32, rgb)
    .ok_or_else(|| InputError::Capture("无法创建 RGB 图像".to_string()))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn camera_pipeline_description() {
    let builder = GStreamerSourceBuilder::camera("/dev/video0", 640, 480, 30);
    assert_eq!(
      builder.description(),
      "v4l2src device=/dev/video0 ! video/x-raw,width=640,height=480,framerate=30/1 ! \
       videoconvert ! video/x-raw,format=RGB ! appsink max-buffers=2 drop=true name=sink"
    );
  }

  #[test]
  fn file_pipeline_description() {
    let builder = GStreamerSourceBuilder::file("/data/clip.mp4");
    assert!(
      builder
        .description()
        .starts_with("filesrc location=\"/data/clip.mp4\" ! decodebin ! videoconvert")
    );
  }
}
