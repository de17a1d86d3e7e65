// 该文件是 Shuangmu （双目） 项目的一部分。
// src/output.rs - 显示面定义
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

use std::path::PathBuf;

use thiserror::Error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme};

pub mod bitmap;
pub mod draw;

mod directory_record;
mod memory;

pub use self::bitmap::Bitmap;
pub use self::directory_record::DirectoryRecordSurface;
pub use self::memory::MemorySurface;

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("不支持的图片格式: {0}")]
  UnsupportedFormat(PathBuf),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

/// 显示面：原图和标注图各对应一个
pub trait Surface: Send {
  fn present(&mut self, bitmap: &Bitmap) -> Result<(), OutputError>;
  fn clear(&mut self);
}

impl<S: Surface + ?Sized> Surface for Box<S> {
  fn present(&mut self, bitmap: &Bitmap) -> Result<(), OutputError> {
    (**self).present(bitmap)
  }

  fn clear(&mut self) {
    (**self).clear()
  }
}

/// 由 URL 创建显示面，`memory:` 或 `folder:///path?side=raw`
pub enum SurfaceWrapper {
  Memory(MemorySurface),
  DirectoryRecord(DirectoryRecordSurface),
}

impl FromUrl for SurfaceWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      MemorySurface::SCHEME => Ok(SurfaceWrapper::Memory(MemorySurface::default())),
      DirectoryRecordSurface::SCHEME => Ok(SurfaceWrapper::DirectoryRecord(
        DirectoryRecordSurface::from_url(url)?,
      )),
      _ => Err(OutputError::SchemeMismatch),
    }
  }
}

impl Surface for SurfaceWrapper {
  fn present(&mut self, bitmap: &Bitmap) -> Result<(), OutputError> {
    match self {
      SurfaceWrapper::Memory(surface) => surface.present(bitmap),
      SurfaceWrapper::DirectoryRecord(surface) => surface.present(bitmap),
    }
  }

  fn clear(&mut self) {
    match self {
      SurfaceWrapper::Memory(surface) => surface.clear(),
      SurfaceWrapper::DirectoryRecord(surface) => surface.clear(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn wrapper_from_url() {
    let url = Url::parse("memory:").unwrap();
    assert!(matches!(
      SurfaceWrapper::from_url(&url),
      Ok(SurfaceWrapper::Memory(_))
    ));

    let url = Url::parse("folder:///tmp/out?side=annotated").unwrap();
    assert!(matches!(
      SurfaceWrapper::from_url(&url),
      Ok(SurfaceWrapper::DirectoryRecord(_))
    ));

    let url = Url::parse("rtsp://camera.local/stream").unwrap();
    assert!(matches!(
      SurfaceWrapper::from_url(&url),
      Err(OutputError::SchemeMismatch)
    ));
  }
}
