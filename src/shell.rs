// 该文件是 Shuangmu （双目） 项目的一部分。
// src/shell.rs - 交互命令解析与分发
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

use std::{path::PathBuf, str::FromStr};

use thiserror::Error;
use tracing::warn;

use crate::{
  input::{CameraSpec, SourceSpec},
  pipeline::TickOutcome,
  session::{Session, SessionError, Side},
};

pub const END_OF_STREAM_NOTICE: &str = "视频播放结束或摄像头停止";

pub const HELP_TEXT: &str = "\
model <文件>            加载模型 (.onnx / .rknn)
images <文件>...        打开图片
next | prev             下一张 / 上一张图片
video <文件>            播放视频
camera [设备]           打开摄像头，默认 /dev/video0
stop                    停止播放并清空显示
stats [json]            显示检测统计
save raw|annotated <文件>  保存当前显示的图像
controls                查看可用操作
quit                    退出";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CommandError {
  #[error("空命令")]
  Empty,
  #[error("未知命令: {0}")]
  Unknown(String),
  #[error("缺少参数: {0}")]
  MissingArgument(&'static str),
  #[error("参数无效: {0}")]
  InvalidArgument(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
  Model(PathBuf),
  Images(Vec<PathBuf>),
  Next,
  Prev,
  Video(PathBuf),
  Camera(Option<String>),
  Stop,
  Stats { json: bool },
  Save { side: Side, path: PathBuf },
  Controls,
  Help,
  Quit,
}

impl FromStr for Command {
  type Err = CommandError;

  fn from_str(line: &str) -> Result<Self, Self::Err> {
    let mut words = line.split_whitespace();
    let name = words.next().ok_or(CommandError::Empty)?;
    let args: Vec<&str> = words.collect();

    let one_path = |what: &'static str| {
      args
        .first()
        .map(PathBuf::from)
        .ok_or(CommandError::MissingArgument(what))
    };

    match name.to_ascii_lowercase().as_str() {
      "model" | "m" => Ok(Command::Model(one_path("模型文件")?)),
      "images" | "image" | "i" => {
        if args.is_empty() {
          return Err(CommandError::MissingArgument("图片文件"));
        }
        Ok(Command::Images(args.iter().map(PathBuf::from).collect()))
      }
      "next" | "n" => Ok(Command::Next),
      "prev" | "p" => Ok(Command::Prev),
      "video" | "v" => Ok(Command::Video(one_path("视频文件")?)),
      "camera" | "c" => Ok(Command::Camera(args.first().map(|d| d.to_string()))),
      "stop" | "s" => Ok(Command::Stop),
      "stats" => match args.first() {
        None => Ok(Command::Stats { json: false }),
        Some(&"json") => Ok(Command::Stats { json: true }),
        Some(other) => Err(CommandError::InvalidArgument(other.to_string())),
      },
      "save" => {
        let side = match args.first() {
          Some(&"raw") => Side::Raw,
          Some(&"annotated") => Side::Annotated,
          Some(other) => return Err(CommandError::InvalidArgument(other.to_string())),
          None => return Err(CommandError::MissingArgument("raw 或 annotated")),
        };
        let path = args
          .get(1)
          .map(PathBuf::from)
          .ok_or(CommandError::MissingArgument("保存路径"))?;
        Ok(Command::Save { side, path })
      }
      "controls" => Ok(Command::Controls),
      "help" | "?" => Ok(Command::Help),
      "quit" | "exit" | "q" => Ok(Command::Quit),
      other => Err(CommandError::Unknown(other.to_string())),
    }
  }
}

/// 命令执行后的回应
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
  Message(String),
  Quit,
}

/// 把命令翻译成会话操作
pub struct Shell {
  session: Session,
}

impl Shell {
  pub fn new(session: Session) -> Self {
    Self { session }
  }

  pub fn session(&self) -> &Session {
    &self.session
  }

  pub fn session_mut(&mut self) -> &mut Session {
    &mut self.session
  }

  pub fn handle_line(&mut self, line: &str) -> Result<Reply, SessionError> {
    match line.parse::<Command>() {
      Ok(command) => self.handle(command),
      Err(CommandError::Empty) => Ok(Reply::Message(String::new())),
      Err(e) => Ok(Reply::Message(format!("{}\n{}", e, HELP_TEXT))),
    }
  }

  pub fn handle(&mut self, command: Command) -> Result<Reply, SessionError> {
    let message = match command {
      Command::Model(path) => {
        self.session.load_model(&path)?;
        format!("模型已加载: {}", path.display())
      }
      Command::Images(paths) => {
        let count = paths.len();
        self.session.open_images(paths)?;
        format!("已打开 {} 张图片", count)
      }
      Command::Next => format!("当前第 {} 张", self.session.next_image()? + 1),
      Command::Prev => format!("当前第 {} 张", self.session.prev_image()? + 1),
      Command::Video(path) => {
        self.session.open_video(&path)?;
        format!("开始播放: {}", path.display())
      }
      Command::Camera(device) => {
        let camera = match device {
          Some(device) => match device.parse::<SourceSpec>() {
            Ok(SourceSpec::Camera(camera)) => camera,
            _ => CameraSpec::new(device),
          },
          None => CameraSpec::new("/dev/video0"),
        };
        let name = camera.device.clone();
        self.session.start_camera(camera)?;
        format!("摄像头已打开: {}", name)
      }
      Command::Stop => {
        self.session.stop();
        "已停止".to_string()
      }
      Command::Stats { json } => {
        if json {
          self.session.summary()?.to_json().to_string()
        } else {
          self.session.summary_text()?
        }
      }
      Command::Save { side, path } => {
        self.session.save(side, &path)?;
        format!("图片已保存到 {}", path.display())
      }
      Command::Controls => format!("{:?}", self.session.controls()),
      Command::Help => HELP_TEXT.to_string(),
      Command::Quit => return Ok(Reply::Quit),
    };
    Ok(Reply::Message(message))
  }

  /// 推进一拍；视频结束时返回提示
  pub fn tick(&mut self) -> Option<String> {
    match self.session.tick() {
      Ok(TickOutcome::Exhausted) => Some(END_OF_STREAM_NOTICE.to_string()),
      Ok(_) => None,
      Err(e) => {
        warn!("播放中止: {}", e);
        Some(format!("播放中止: {}", e))
      }
    }
  }
}
