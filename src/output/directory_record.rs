// 该文件是 Shuangmu （双目） 项目的一部分。
// src/output/directory_record.rs - 目录记录显示面
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

use chrono::{Datelike, Local};
use tracing::debug;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  output::{Bitmap, OutputError, Surface},
};

/// 把每次显示的位图写入按日期分层的目录
///
/// 文件路径形如 `dir/2026/10/19/14-03-22-0001-annotated.png`。
pub struct DirectoryRecordSurface {
  directory: PathBuf,
  side: String,
  counter: u16,
  last: Option<PathBuf>,
}

impl FromUrlWithScheme for DirectoryRecordSurface {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordSurface {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OutputError::SchemeMismatch);
    }

    let side = url
      .query_pairs()
      .find(|(k, _)| k == "side")
      .map(|(_, v)| v.into_owned())
      .unwrap_or_else(|| "frame".to_string());

    Ok(Self::new(crate::url_path(url), side))
  }
}

impl DirectoryRecordSurface {
  pub fn new(directory: impl AsRef<Path>, side: impl Into<String>) -> Self {
    Self {
      directory: directory.as_ref().to_path_buf(),
      side: side.into(),
      counter: 0,
      last: None,
    }
  }

  pub fn directory(&self) -> &Path {
    &self.directory
  }

  /// 最近一次写出的文件，清空后为 `None`
  pub fn last_written(&self) -> Option<&Path> {
    self.last.as_deref()
  }

  fn frame_path(&mut self) -> PathBuf {
    self.counter = self.counter.wrapping_add(1);
    let now = Local::now();
    self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()))
      .join(format!(
        "{}-{:04X}-{}.png",
        now.format("%H-%M-%S"),
        self.counter,
        self.side
      ))
  }
}

impl Surface for DirectoryRecordSurface {
  fn present(&mut self, bitmap: &Bitmap) -> Result<(), OutputError> {
    let path = self.frame_path();
    bitmap.save(&path)?;
    debug!("{} 已写入 {}", self.side, path.display());
    self.last = Some(path);
    Ok(())
  }

  // 已写出的文件保留
  fn clear(&mut self) {
    self.last = None;
  }
}
