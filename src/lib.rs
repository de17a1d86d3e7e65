// 该文件是 Shuangmu （双目） 项目的一部分。
// src/lib.rs - 库主文件
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

pub mod aggregate;
pub mod frame;
pub mod input;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod profile;
pub mod session;
pub mod shell;
pub mod task;
pub mod worker;

pub trait FromUrl {
  type Error;
  fn from_url(url: &url::Url) -> Result<Self, Self::Error>
  where
    Self: Sized;
}

pub trait FromUrlWithScheme: FromUrl {
  const SCHEME: &'static str;
}

/// URL 路径部分解码成文件路径
pub(crate) fn url_path(url: &url::Url) -> PathBuf {
  let path = url.path();
  match urlencoding::decode(path) {
    Ok(decoded) => PathBuf::from(decoded.into_owned()),
    Err(_) => PathBuf::from(path),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn url_path_decodes_percent_escapes() {
    let url = url::Url::parse("image:///data/my%20photos/a.jpg").unwrap();
    assert_eq!(url_path(&url), PathBuf::from("/data/my photos/a.jpg"));
  }
}
