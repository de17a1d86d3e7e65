// 该文件是 Shuangmu （双目） 项目的一部分。
// src/input/image_list.rs - 图片列表输入
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

use image::ImageReader;
use tracing::debug;

use crate::{
  frame::Frame,
  input::{FrameSource, InputError, SourceKind},
};

/// 按下标访问的图片列表
///
/// `next` / `prev` 在两端停住，不回绕。拉帧时总是给出当前下标的图片。
#[derive(Debug, Clone)]
pub struct ImageList {
  paths: Vec<PathBuf>,
  index: usize,
}

impl ImageList {
  pub fn new(paths: Vec<PathBuf>) -> Result<Self, InputError> {
    if paths.is_empty() {
      return Err(InputError::EmptyImageList);
    }
    Ok(Self { paths, index: 0 })
  }

  pub fn len(&self) -> usize {
    self.paths.len()
  }

  pub fn is_empty(&self) -> bool {
    self.paths.is_empty()
  }

  pub fn index(&self) -> usize {
    self.index
  }

  pub fn current_path(&self) -> &Path {
    &self.paths[self.index]
  }

  pub fn next(&mut self) -> usize {
    self.index = (self.index + 1).min(self.paths.len() - 1);
    self.index
  }

  pub fn prev(&mut self) -> usize {
    self.index = self.index.saturating_sub(1);
    self.index
  }

  pub fn load_current(&self) -> Result<Frame, InputError> {
    let path = self.current_path();
    debug!("读取图片 [{}/{}]: {}", self.index + 1, self.len(), path.display());

    let image = ImageReader::open(path)?
      .with_guessed_format()?
      .decode()?
      .to_rgb8();
    Ok(Frame::new(image, self.index as u64, 0))
  }
}

impl FrameSource for ImageList {
  fn kind(&self) -> SourceKind {
    SourceKind::ImageList
  }

  fn next_frame(&mut self) -> Result<Option<Frame>, InputError> {
    self.load_current().map(Some)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::RgbImage;

  fn list(n: usize) -> ImageList {
    ImageList::new((0..n).map(|i| PathBuf::from(format!("{i}.png"))).collect()).unwrap()
  }

  #[test]
  fn navigation_clamps_at_both_ends() {
    let mut images = list(3);
    for _ in 0..3 {
      images.next();
    }
    assert_eq!(images.index(), 2);
    for _ in 0..5 {
      images.prev();
    }
    assert_eq!(images.index(), 0);
  }

  #[test]
  fn single_image_never_moves() {
    let mut images = list(1);
    assert_eq!(images.next(), 0);
    assert_eq!(images.prev(), 0);
  }

  #[test]
  fn empty_list_is_rejected() {
    assert!(matches!(
      ImageList::new(Vec::new()),
      Err(InputError::EmptyImageList)
    ));
  }

  #[test]
  fn pulls_current_image() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.png");
    let b = dir.path().join("b.png");
    RgbImage::new(4, 2).save(&a).unwrap();
    RgbImage::new(6, 3).save(&b).unwrap();

    let mut images = ImageList::new(vec![a, b]).unwrap();
    let frame = images.next_frame().unwrap().unwrap();
    assert_eq!((frame.width(), frame.height()), (4, 2));

    images.next();
    let frame = images.next_frame().unwrap().unwrap();
    assert_eq!((frame.width(), frame.height()), (6, 3));
    assert_eq!(frame.index, 1);

    // 图片列表不会读完
    assert!(images.next_frame().unwrap().is_some());
  }

  #[test]
  fn undecodable_image_reports_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.png");
    std::fs::write(&path, b"not an image").unwrap();

    let images = ImageList::new(vec![path]).unwrap();
    assert!(images.load_current().is_err());
  }
}
