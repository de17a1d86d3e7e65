// 该文件是 Shuangmu （双目） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use std::{
  io::BufRead,
  path::Path,
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
    mpsc,
  },
  thread,
};

use anyhow::Result;
use clap::Parser;
use serde_json::json;
use tracing::{info, warn};
use url::Url;

use shuangmu::{
  FromUrl,
  input::{CameraSpec, SourceSpec},
  model::{DetectorConfig, DetectorUrl},
  output::{DirectoryRecordSurface, MemorySurface, Surface},
  profile::Profile,
  session::Session,
  shell::Shell,
  task::{ImageBatchTask, InteractiveTask, PlaybackTask, Task},
};

use args::{Args, Command};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();
  let config = args.detector.to_config();

  match args.command {
    Command::Images {
      model,
      images,
      output,
      summary,
      json,
      profile,
    } => {
      let mut session = open_session(profile, output.as_deref(), &config);
      load_model(&mut session, &model, &config)?;

      let summaries = ImageBatchTask::new(images).run_task(&mut session)?;
      if json {
        let value: Vec<_> = summaries
          .iter()
          .map(|(path, s)| json!({ "image": path.display().to_string(), "summary": s.to_json() }))
          .collect();
        println!("{}", serde_json::to_string_pretty(&value)?);
      } else if summary {
        for (path, s) in &summaries {
          println!("{}\n{}\n", path.display(), profile.render_summary(s));
        }
      }
    }
    Command::Video {
      model,
      input,
      output,
      max_frames,
      profile,
    } => {
      let mut session = open_session(profile, output.as_deref(), &config);
      load_model(&mut session, &model, &config)?;

      let path = match input.parse::<SourceSpec>()? {
        SourceSpec::Video(path) => path,
        other => anyhow::bail!("不是视频输入: {:?}", other),
      };
      session.open_video(&path)?;
      run_playback(&mut session, max_frames)?;
    }
    Command::Camera {
      model,
      device,
      output,
      max_frames,
    } => {
      let mut session = open_session(Profile::Full, output.as_deref(), &config);
      load_model(&mut session, &model, &config)?;

      let camera = match device.parse::<SourceSpec>() {
        Ok(SourceSpec::Camera(camera)) => camera,
        _ => CameraSpec::new(device),
      };
      session.start_camera(camera)?;
      run_playback(&mut session, max_frames)?;
    }
    Command::Interactive {
      profile,
      output,
      model,
    } => {
      let mut session = open_session(profile, output.as_deref(), &config);
      if let Some(model) = model {
        load_model(&mut session, &model, &config)?;
      }
      run_interactive(session)?;
    }
  }

  Ok(())
}

fn open_session(profile: Profile, output: Option<&Path>, config: &DetectorConfig) -> Session {
  let (raw, annotated): (Box<dyn Surface>, Box<dyn Surface>) = match output {
    Some(dir) => {
      info!("输出目录: {}", dir.display());
      (
        Box::new(DirectoryRecordSurface::new(dir, "raw")),
        Box::new(DirectoryRecordSurface::new(dir, "annotated")),
      )
    }
    None => (
      Box::new(MemorySurface::default()),
      Box::new(MemorySurface::default()),
    ),
  };
  Session::new(profile, raw, annotated).with_config(config.clone())
}

/// 模型可以是普通路径，也可以是 `onnx:///…` 这样的 URL
fn load_model(session: &mut Session, model: &str, config: &DetectorConfig) -> Result<()> {
  info!("模型: {}", model);
  match Url::parse(model) {
    Ok(url) if url.scheme().len() > 1 => {
      let detector = DetectorUrl::from_url(&url)?.config(config.clone()).load()?;
      session.use_detector(detector)?;
    }
    _ => session.load_model(model)?,
  }
  Ok(())
}

fn interrupt_flag() -> Result<Arc<AtomicBool>> {
  let flag = Arc::new(AtomicBool::new(false));
  let handler_flag = flag.clone();
  ctrlc::set_handler(move || {
    if handler_flag.swap(true, Ordering::SeqCst) {
      warn!("再次收到中断信号，强制退出");
      std::process::exit(1);
    }
    info!("收到中断信号，准备停止...");
  })?;
  Ok(flag)
}

fn run_playback(session: &mut Session, max_frames: usize) -> Result<()> {
  let report = PlaybackTask::default()
    .with_max_frames(Some(max_frames))
    .with_cancel(interrupt_flag()?)
    .run_task(session)?;
  println!(
    "显示 {} 帧，检测到 {} 个物体",
    report.presented, report.detections
  );
  Ok(())
}

fn run_interactive(session: Session) -> Result<()> {
  let (tx, rx) = mpsc::channel();
  thread::Builder::new()
    .name("stdin".to_string())
    .spawn(move || {
      for line in std::io::stdin().lock().lines() {
        let Ok(line) = line else { break };
        if tx.send(line).is_err() {
          break;
        }
      }
    })?;

  println!("{}", shuangmu::shell::HELP_TEXT);
  let mut shell = Shell::new(session);
  InteractiveTask::new(rx, interrupt_flag()?, |line: &str| println!("{}", line))
    .run_task(&mut shell)?;
  Ok(())
}
