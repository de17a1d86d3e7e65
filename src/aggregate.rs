// 该文件是 Shuangmu （双目） 项目的一部分。
// src/aggregate.rs - 检测结果分类计数
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

use std::{fmt::Write, sync::Arc};

use serde_json::{Value, json};

use crate::model::DetectResult;

pub const NO_OBJECTS_TEXT: &str = "未检测到物体";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelCount {
  pub label: Arc<str>,
  pub count: usize,
}

/// 一次检测结果的分类计数
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Summary {
  /// 没有任何检测，和空列表区分开
  NoObjects,
  /// 按数量降序，数量相同时按首次出现的顺序
  Counts {
    total: usize,
    entries: Vec<LabelCount>,
  },
}

pub fn summarize(result: &DetectResult) -> Summary {
  if result.is_empty() {
    return Summary::NoObjects;
  }

  let mut entries: Vec<LabelCount> = Vec::new();
  for item in result.items.iter() {
    match entries.iter_mut().find(|e| e.label == item.label) {
      Some(entry) => entry.count += 1,
      None => entries.push(LabelCount {
        label: item.label.clone(),
        count: 1,
      }),
    }
  }
  // sort_by 是稳定排序
  entries.sort_by(|a, b| b.count.cmp(&a.count));

  Summary::Counts {
    total: result.len(),
    entries,
  }
}

impl Summary {
  pub fn total(&self) -> usize {
    match self {
      Summary::NoObjects => 0,
      Summary::Counts { total, .. } => *total,
    }
  }

  pub fn entries(&self) -> &[LabelCount] {
    match self {
      Summary::NoObjects => &[],
      Summary::Counts { entries, .. } => entries,
    }
  }

  /// 渲染成多行文本
  ///
  /// `header` 为总数那一行的标题；`breakdown` 为分类列表前的小标题，`None` 时直接列出。
  pub fn render(&self, header: &str, breakdown: Option<&str>) -> String {
    match self {
      Summary::NoObjects => NO_OBJECTS_TEXT.to_string(),
      Summary::Counts { total, entries } => {
        let mut text = format!("{}：{}", header, total);
        if let Some(breakdown) = breakdown {
          let _ = write!(text, "\n{}", breakdown);
        }
        for entry in entries {
          let _ = write!(text, "\n{}: {}", entry.label, entry.count);
        }
        text
      }
    }
  }

  pub fn to_json(&self) -> Value {
    match self {
      Summary::NoObjects => json!({ "total": 0, "classes": [] }),
      Summary::Counts { total, entries } => json!({
        "total": total,
        "classes": entries
          .iter()
          .map(|e| json!({ "label": &*e.label, "count": e.count }))
          .collect::<Vec<_>>(),
      }),
    }
  }
}
