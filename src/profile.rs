// 该文件是 Shuangmu （双目） 项目的一部分。
// src/profile.rs - 应用配置档
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

use std::time::Duration;

use clap::ValueEnum;

use crate::{aggregate::Summary, input::SourceKind};

/// 两种界面变体的参数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Profile {
  /// 带摄像头的完整版
  #[default]
  Full,
  /// 只有图片和视频的精简版
  Compact,
}

impl Profile {
  /// 显示面尺寸（宽，高）
  pub fn surface_size(self) -> (u32, u32) {
    match self {
      Profile::Full => (680, 550),
      Profile::Compact => (580, 450),
    }
  }

  pub fn camera_enabled(self) -> bool {
    matches!(self, Profile::Full)
  }

  pub fn summary_header(self) -> &'static str {
    match self {
      Profile::Full => "识别物体总数",
      Profile::Compact => "识别到的物体总个数",
    }
  }

  /// 分类列表前的小标题，精简版没有
  pub fn summary_breakdown(self) -> Option<&'static str> {
    match self {
      Profile::Full => Some("其中："),
      Profile::Compact => None,
    }
  }

  pub fn render_summary(self, summary: &Summary) -> String {
    summary.render(self.summary_header(), self.summary_breakdown())
  }

  pub fn tick_interval(self, kind: SourceKind) -> Duration {
    match (self, kind) {
      (Profile::Full, SourceKind::Camera) => Duration::from_millis(30),
      (Profile::Full, _) => Duration::from_millis(33),
      (Profile::Compact, _) => Duration::from_millis(60),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn profile_parameters() {
    assert_eq!(Profile::default(), Profile::Full);
    assert_eq!(
      Profile::Full.tick_interval(SourceKind::Video),
      Duration::from_millis(33)
    );
    assert_eq!(
      Profile::Full.tick_interval(SourceKind::Camera),
      Duration::from_millis(30)
    );
    assert_eq!(
      Profile::Compact.tick_interval(SourceKind::Video),
      Duration::from_millis(60)
    );
    assert!(!Profile::Compact.camera_enabled());
    assert_eq!(Profile::Compact.surface_size(), (580, 450));
  }

  #[test]
  fn summary_layout_follows_profile() {
    let summary = Summary::Counts {
      total: 2,
      entries: vec![crate::aggregate::LabelCount {
        label: "bus".into(),
        count: 2,
      }],
    };
    assert_eq!(
      Profile::Full.render_summary(&summary),
      "识别物体总数：2\n其中：\nbus: 2"
    );
    assert_eq!(
      Profile::Compact.render_summary(&summary),
      "识别到的物体总个数：2\nbus: 2"
    );
  }

  #[test]
  fn parses_from_cli_value() {
    assert_eq!(Profile::from_str("compact", true), Ok(Profile::Compact));
  }
}
