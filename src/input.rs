// 该文件是 Shuangmu （双目） 项目的一部分。
// src/input.rs - 图片/视频/摄像头输入
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

use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::{FromUrl, frame::Frame};

mod image_list;
mod slot;

#[cfg(feature = "gstreamer_input")]
mod gstreamer_input;
#[cfg(feature = "v4l2_input")]
mod v4l2_source;

pub use self::image_list::ImageList;
pub use self::slot::SourceSlot;

#[cfg(feature = "gstreamer_input")]
pub use self::gstreamer_input::{GStreamerSource, GStreamerSourceBuilder};
#[cfg(feature = "v4l2_input")]
pub use self::v4l2_source::V4l2Source;

pub const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];
pub const VIDEO_EXTENSIONS: [&str; 3] = ["mp4", "avi", "mov"];

#[derive(Error, Debug)]
pub enum InputError {
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("文件不存在: {0}")]
  NotFound(PathBuf),
  #[error("图像解码失败: {0}")]
  Decode(#[from] image::ImageError),
  #[error("无法打开摄像头: {0}")]
  DeviceUnavailable(String),
  #[error("采集失败: {0}")]
  Capture(String),
  #[error("不支持的输入: {0}")]
  Unsupported(String),
  #[error("图片列表为空")]
  EmptyImageList,
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
  ImageList,
  Video,
  Camera,
}

impl SourceKind {
  /// 视频和摄像头需要定时拉帧
  pub fn is_streaming(self) -> bool {
    !matches!(self, SourceKind::ImageList)
  }
}

/// 帧来源，唯一的能力是“取下一帧”
///
/// `Ok(None)` 表示已经读完，不是错误。
pub trait FrameSource: Send {
  fn kind(&self) -> SourceKind;
  fn next_frame(&mut self) -> Result<Option<Frame>, InputError>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
  fn kind(&self) -> SourceKind {
    (**self).kind()
  }

  fn next_frame(&mut self) -> Result<Option<Frame>, InputError> {
    (**self).next_frame()
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraSpec {
  pub device: String,
  pub width: u32,
  pub height: u32,
  pub fps: u32,
  pub backend: CameraBackend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraBackend {
  GStreamer,
  V4l2,
}

impl CameraSpec {
  pub fn new(device: impl Into<String>) -> Self {
    Self {
      device: device.into(),
      width: 640,
      height: 480,
      fps: 30,
      backend: if cfg!(feature = "gstreamer_input") {
        CameraBackend::GStreamer
      } else {
        CameraBackend::V4l2
      },
    }
  }
}

/// 输入描述，打开之前的形态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSpec {
  Images(Vec<PathBuf>),
  Video(PathBuf),
  Camera(CameraSpec),
}

impl SourceSpec {
  /// 按扩展名把普通路径归类为图片或视频
  pub fn classify(path: impl AsRef<Path>) -> Result<Self, InputError> {
    let path = path.as_ref();
    let extension = path
      .extension()
      .and_then(|ext| ext.to_str())
      .map(str::to_ascii_lowercase)
      .unwrap_or_default();

    if IMAGE_EXTENSIONS.contains(&extension.as_str()) {
      Ok(SourceSpec::Images(vec![path.to_path_buf()]))
    } else if VIDEO_EXTENSIONS.contains(&extension.as_str()) {
      Ok(SourceSpec::Video(path.to_path_buf()))
    } else {
      Err(InputError::Unsupported(path.display().to_string()))
    }
  }

  pub fn kind(&self) -> SourceKind {
    match self {
      SourceSpec::Images(_) => SourceKind::ImageList,
      SourceSpec::Video(_) => SourceKind::Video,
      SourceSpec::Camera(_) => SourceKind::Camera,
    }
  }

  /// 释放旧输入之前先做的廉价检查：文件或设备节点存在，对应的后端已编译进来
  pub fn preflight(&self) -> Result<(), InputError> {
    self.check_media()?;
    self.check_backend()
  }

  fn check_backend(&self) -> Result<(), InputError> {
    match self {
      SourceSpec::Images(_) => Ok(()),
      SourceSpec::Video(_) => {
        if cfg!(feature = "gstreamer_input") {
          Ok(())
        } else {
          Err(InputError::Unsupported(
            "视频输入需要 gstreamer_input 特性".to_string(),
          ))
        }
      }
      SourceSpec::Camera(camera) => {
        let enabled = match camera.backend {
          CameraBackend::GStreamer => cfg!(feature = "gstreamer_input"),
          CameraBackend::V4l2 => cfg!(feature = "v4l2_input"),
        };
        if enabled {
          Ok(())
        } else {
          Err(InputError::Unsupported(format!(
            "摄像头后端 {:?} 未启用",
            camera.backend
          )))
        }
      }
    }
  }

  fn check_media(&self) -> Result<(), InputError> {
    match self {
      SourceSpec::Images(paths) => {
        if paths.is_empty() {
          return Err(InputError::EmptyImageList);
        }
        match paths.iter().find(|p| !p.is_file()) {
          Some(missing) => Err(InputError::NotFound(missing.clone())),
          None => Ok(()),
        }
      }
      SourceSpec::Video(path) => {
        if path.is_file() {
          Ok(())
        } else {
          Err(InputError::NotFound(path.clone()))
        }
      }
      SourceSpec::Camera(camera) => {
        if camera.device.starts_with("/dev/") && !Path::new(&camera.device).exists() {
          Err(InputError::DeviceUnavailable(camera.device.clone()))
        } else {
          Ok(())
        }
      }
    }
  }

  /// 打开输入，得到可以放进 [`SourceSlot`] 的状态
  pub fn open(&self) -> Result<SourceSlot, InputError> {
    match self {
      SourceSpec::Images(paths) => Ok(SourceSlot::ImageList(ImageList::new(paths.clone())?)),
      SourceSpec::Video(path) => Ok(SourceSlot::Video(open_video(path)?)),
      SourceSpec::Camera(camera) => Ok(SourceSlot::Camera(open_camera(camera)?)),
    }
  }
}

impl FromUrl for SourceSpec {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match (url.scheme(), url.host_str()) {
      ("image", _) => Ok(SourceSpec::Images(vec![crate::url_path(url)])),
      ("gst", Some("file")) => Ok(SourceSpec::Video(crate::url_path(url))),
      ("gst", Some("camera")) => {
        let mut camera = CameraSpec::new(crate::url_path(url).display().to_string());
        camera.backend = CameraBackend::GStreamer;
        for (k, v) in url.query_pairs() {
          match k.as_ref() {
            "width" => camera.width = v.parse().unwrap_or(camera.width),
            "height" => camera.height = v.parse().unwrap_or(camera.height),
            "fps" => camera.fps = v.parse().unwrap_or(camera.fps),
            other => warn!("忽略未知的摄像头参数: {}", other),
          }
        }
        Ok(SourceSpec::Camera(camera))
      }
      ("v4l", _) => {
        let path = crate::url_path(url);
        let device = if path.as_os_str().is_empty() || path == Path::new("/") {
          "/dev/video0".to_string()
        } else {
          path.display().to_string()
        };
        let mut camera = CameraSpec::new(device);
        camera.backend = CameraBackend::V4l2;
        Ok(SourceSpec::Camera(camera))
      }
      ("file", _) => Self::classify(crate::url_path(url)),
      _ => Err(InputError::SchemeMismatch),
    }
  }
}

impl std::str::FromStr for SourceSpec {
  type Err = InputError;

  /// URL 或普通路径都可以
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match Url::parse(s) {
      // Windows 盘符会被当成单字母方案
      Ok(url) if url.scheme().len() > 1 => Self::from_url(&url),
      _ => Self::classify(s),
    }
  }
}

/// 打开视频文件
pub fn open_video(path: &Path) -> Result<Box<dyn FrameSource>, InputError> {
  if !path.is_file() {
    return Err(InputError::NotFound(path.to_path_buf()));
  }
  info!("打开视频文件: {}", path.display());

  #[cfg(feature = "gstreamer_input")]
  {
    let source = GStreamerSourceBuilder::file(path).build()?;
    Ok(Box::new(source))
  }
  #[cfg(not(feature = "gstreamer_input"))]
  {
    Err(InputError::Unsupported(
      "视频输入需要 gstreamer_input 特性".to_string(),
    ))
  }
}

/// 打开摄像头
pub fn open_camera(camera: &CameraSpec) -> Result<Box<dyn FrameSource>, InputError> {
  info!("打开摄像头: {}", camera.device);

  match camera.backend {
    #[cfg(feature = "gstreamer_input")]
    CameraBackend::GStreamer => {
      let source =
        GStreamerSourceBuilder::camera(&camera.device, camera.width, camera.height, camera.fps)
          .build()?;
      Ok(Box::new(source))
    }
    #[cfg(feature = "v4l2_input")]
    CameraBackend::V4l2 => {
      let source = V4l2Source::open(&camera.device, camera.width, camera.height)?;
      Ok(Box::new(source))
    }
    #[allow(unreachable_patterns)]
    _ => Err(InputError::Unsupported(format!(
      "摄像头后端 {:?} 未启用",
      camera.backend
    ))),
  }
}
