// 该文件是 Shuangmu （双目） 项目的一部分。
// src/input/slot.rs - 当前输入槽
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

use tracing::info;

use crate::{
  frame::Frame,
  input::{FrameSource, ImageList, InputError, SourceKind},
};

/// 同一时刻最多只有一个输入
#[derive(Default)]
pub enum SourceSlot {
  #[default]
  None,
  ImageList(ImageList),
  Video(Box<dyn FrameSource>),
  Camera(Box<dyn FrameSource>),
}

impl std::fmt::Debug for SourceSlot {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      SourceSlot::None => write!(f, "None"),
      SourceSlot::ImageList(images) => write!(f, "ImageList({})", images.index()),
      SourceSlot::Video(_) => write!(f, "Video"),
      SourceSlot::Camera(_) => write!(f, "Camera"),
    }
  }
}

impl SourceSlot {
  pub fn kind(&self) -> Option<SourceKind> {
    match self {
      SourceSlot::None => None,
      SourceSlot::ImageList(_) => Some(SourceKind::ImageList),
      SourceSlot::Video(_) => Some(SourceKind::Video),
      SourceSlot::Camera(_) => Some(SourceKind::Camera),
    }
  }

  pub fn is_none(&self) -> bool {
    matches!(self, SourceSlot::None)
  }

  pub fn is_streaming(&self) -> bool {
    self.kind().is_some_and(SourceKind::is_streaming)
  }

  pub fn images(&self) -> Option<&ImageList> {
    match self {
      SourceSlot::ImageList(images) => Some(images),
      _ => None,
    }
  }

  pub fn images_mut(&mut self) -> Option<&mut ImageList> {
    match self {
      SourceSlot::ImageList(images) => Some(images),
      _ => None,
    }
  }

  /// 释放当前输入，视频/摄像头句柄在这里被 drop
  pub fn release(&mut self) {
    let previous = std::mem::take(self);
    if let Some(kind) = previous.kind() {
      info!("释放输入: {:?}", kind);
    }
    drop(previous);
  }

  /// 先释放旧输入，再获取新输入
  ///
  /// 获取失败时槽位保持为空。
  pub fn switch<F>(&mut self, acquire: F) -> Result<(), InputError>
  where
    F: FnOnce() -> Result<SourceSlot, InputError>,
  {
    self.release();
    *self = acquire()?;
    Ok(())
  }

  pub fn next_frame(&mut self) -> Result<Option<Frame>, InputError> {
    match self {
      SourceSlot::None => Ok(None),
      SourceSlot::ImageList(images) => images.next_frame(),
      SourceSlot::Video(source) | SourceSlot::Camera(source) => source.next_frame(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::{
    path::PathBuf,
    sync::{
      Arc, Mutex,
      atomic::{AtomicUsize, Ordering},
    },
  };

  struct Tracked {
    events: Arc<Mutex<Vec<&'static str>>>,
  }

  impl FrameSource for Tracked {
    fn kind(&self) -> SourceKind {
      SourceKind::Video
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, InputError> {
      Ok(None)
    }
  }

  impl Drop for Tracked {
    fn drop(&mut self) {
      self.events.lock().unwrap().push("release");
    }
  }

  #[test]
  fn switch_releases_before_acquire() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let mut slot = SourceSlot::Video(Box::new(Tracked {
      events: events.clone(),
    }));

    let log = events.clone();
    slot
      .switch(|| {
        log.lock().unwrap().push("acquire");
        Ok(SourceSlot::ImageList(ImageList::new(vec![PathBuf::from("a.png")])?))
      })
      .unwrap();

    assert_eq!(*events.lock().unwrap(), vec!["release", "acquire"]);
    assert_eq!(slot.kind(), Some(SourceKind::ImageList));
  }

  #[test]
  fn failed_acquire_leaves_slot_empty() {
    let calls = AtomicUsize::new(0);
    let mut slot = SourceSlot::ImageList(ImageList::new(vec![PathBuf::from("a.png")]).unwrap());
    let err = slot
      .switch(|| {
        calls.fetch_add(1, Ordering::SeqCst);
        Err(InputError::DeviceUnavailable("/dev/video9".into()))
      })
      .unwrap_err();

    assert!(matches!(err, InputError::DeviceUnavailable(_)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(slot.is_none());
  }
}
