// 该文件是 Shuangmu （双目） 项目的一部分。
// src/args.rs - 命令行参数
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

use clap::{Parser, Subcommand};

use shuangmu::{model::DetectorConfig, profile::Profile};

/// Shuangmu 目标检测查看器
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  #[command(flatten)]
  pub detector: DetectorArgs,

  #[command(subcommand)]
  pub command: Command,
}

#[derive(clap::Args, Debug)]
pub struct DetectorArgs {
  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, global = true, default_value_t = 0.25, value_name = "THRESHOLD")]
  pub confidence: f32,

  /// NMS IOU 阈值 (0.0 - 1.0)
  #[arg(long, global = true, default_value_t = 0.45, value_name = "THRESHOLD")]
  pub nms_threshold: f32,

  /// 单帧最多保留的检测数
  #[arg(long, global = true, default_value_t = 300, value_name = "COUNT")]
  pub max_detections: usize,

  /// 标注用 TrueType 字体
  #[arg(long, global = true, value_name = "FONT")]
  pub font: Option<PathBuf>,
}

impl DetectorArgs {
  pub fn to_config(&self) -> DetectorConfig {
    DetectorConfig {
      confidence: self.confidence,
      nms_threshold: self.nms_threshold,
      max_detections: self.max_detections,
      font: self.font.clone(),
    }
  }
}

#[derive(Subcommand, Debug)]
pub enum Command {
  /// 检测图片
  Images {
    /// 模型文件路径或 URL（onnx:///… / yolo26:///…）
    #[arg(long, value_name = "MODEL")]
    model: String,
    /// 图片文件
    #[arg(required = true, value_name = "IMAGE")]
    images: Vec<PathBuf>,
    /// 原图和标注图的输出目录
    #[arg(long, value_name = "DIR")]
    output: Option<PathBuf>,
    /// 打印每张图片的分类统计
    #[arg(long)]
    summary: bool,
    /// 统计以 JSON 输出
    #[arg(long)]
    json: bool,
    #[arg(long, value_enum, default_value_t = Profile::Full)]
    profile: Profile,
  },
  /// 检测视频文件
  Video {
    #[arg(long, value_name = "MODEL")]
    model: String,
    /// 视频文件或 gst://file/… URL
    #[arg(long, value_name = "VIDEO")]
    input: String,
    #[arg(long, value_name = "DIR")]
    output: Option<PathBuf>,
    /// 最大处理帧数，0 表示不限制
    #[arg(long, default_value_t = 0, value_name = "COUNT")]
    max_frames: usize,
    #[arg(long, value_enum, default_value_t = Profile::Full)]
    profile: Profile,
  },
  /// 检测摄像头画面
  Camera {
    #[arg(long, value_name = "MODEL")]
    model: String,
    /// 设备路径或 URL（v4l:///dev/video0、gst://camera/dev/video0?width=640）
    #[arg(long, default_value = "/dev/video0", value_name = "DEVICE")]
    device: String,
    #[arg(long, value_name = "DIR")]
    output: Option<PathBuf>,
    #[arg(long, default_value_t = 0, value_name = "COUNT")]
    max_frames: usize,
  },
  /// 交互模式，从标准输入读取命令
  Interactive {
    #[arg(long, value_enum, default_value_t = Profile::Full)]
    profile: Profile,
    #[arg(long, value_name = "DIR")]
    output: Option<PathBuf>,
    /// 启动时加载的模型
    #[arg(long, value_name = "MODEL")]
    model: Option<String>,
  },
}
