// 该文件是 Shuangmu （双目） 项目的一部分。
// src/output/memory.rs - 内存显示面
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

use std::{
  path::Path,
  sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  output::{Bitmap, OutputError, Surface},
};

#[derive(Default)]
struct MemoryState {
  current: Option<Bitmap>,
  presented: usize,
  cleared: usize,
}

/// 只保留最近一帧的显示面
///
/// 克隆出的句柄共享同一块状态，可以一边交给流水线一边在外面查看。
#[derive(Clone, Default)]
pub struct MemorySurface {
  state: Arc<Mutex<MemoryState>>,
}

impl FromUrlWithScheme for MemorySurface {
  const SCHEME: &'static str = "memory";
}

impl FromUrl for MemorySurface {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OutputError::SchemeMismatch);
    }
    Ok(Self::default())
  }
}

impl MemorySurface {
  fn state(&self) -> MutexGuard<'_, MemoryState> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn current(&self) -> Option<Bitmap> {
    self.state().current.clone()
  }

  pub fn is_blank(&self) -> bool {
    self.state().current.is_none()
  }

  pub fn presented(&self) -> usize {
    self.state().presented
  }

  pub fn cleared(&self) -> usize {
    self.state().cleared
  }

  /// 保存当前显示的位图，空白时返回 `false`
  pub fn save_to(&self, path: impl AsRef<Path>) -> Result<bool, OutputError> {
    match self.current() {
      Some(bitmap) => {
        bitmap.save(path)?;
        Ok(true)
      }
      None => Ok(false),
    }
  }
}

impl Surface for MemorySurface {
  fn present(&mut self, bitmap: &Bitmap) -> Result<(), OutputError> {
    let mut state = self.state();
    state.current = Some(bitmap.clone());
    state.presented += 1;
    Ok(())
  }

  fn clear(&mut self) {
    let mut state = self.state();
    state.current = None;
    state.cleared += 1;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::RgbImage;

  #[test]
  fn clones_share_state() {
    let viewer = MemorySurface::default();
    let mut surface = viewer.clone();
    let bitmap = Bitmap::fit(&RgbImage::new(4, 4), (4, 4));

    surface.present(&bitmap).unwrap();
    assert_eq!(viewer.current(), Some(bitmap));
    assert_eq!(viewer.presented(), 1);

    surface.clear();
    assert!(viewer.is_blank());
    assert_eq!(viewer.cleared(), 1);
  }

  #[test]
  fn save_blank_surface_is_noop() {
    let dir = tempfile::tempdir().unwrap();
    let surface = MemorySurface::default();
    assert!(!surface.save_to(dir.path().join("a.png")).unwrap());
    assert!(!dir.path().join("a.png").exists());
  }
}
