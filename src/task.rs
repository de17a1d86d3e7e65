// 该文件是 Shuangmu （双目） 项目的一部分。
// src/task.rs - 图片批处理、视频播放与交互任务
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
  path::PathBuf,
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
    mpsc::{Receiver, RecvTimeoutError},
  },
  thread,
  time::{Duration, Instant},
};

use tracing::{info, warn};

use crate::{
  aggregate::Summary,
  pipeline::{PipelineState, TickOutcome},
  session::Session,
  shell::{END_OF_STREAM_NOTICE, Reply, Shell},
};

const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub trait Task<S>: Sized {
  type Output;
  fn run_task(self, target: S) -> anyhow::Result<Self::Output>;
}

/// 逐张处理图片，返回每张图片的统计
#[derive(Debug, Default)]
pub struct ImageBatchTask {
  paths: Vec<PathBuf>,
}

impl ImageBatchTask {
  pub fn new(paths: Vec<PathBuf>) -> Self {
    Self { paths }
  }
}

impl Task<&mut Session> for ImageBatchTask {
  type Output = Vec<(PathBuf, Summary)>;

  fn run_task(self, session: &mut Session) -> anyhow::Result<Self::Output> {
    info!("开始处理 {} 张图片", self.paths.len());
    let mut summaries = Vec::with_capacity(self.paths.len());

    session.open_images(self.paths.clone())?;
    for (i, path) in self.paths.into_iter().enumerate() {
      if i > 0 {
        session.next_image()?;
      }
      let summary = session.summary()?;
      info!("{}: 检测到 {} 个物体", path.display(), summary.total());
      summaries.push((path, summary));
    }

    info!("图片处理完成");
    Ok(summaries)
  }
}

/// 播放统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackReport {
  pub ticks: usize,
  pub presented: usize,
  pub detections: usize,
  pub failed: usize,
  pub exhausted: bool,
}

/// 按配置档的节拍驱动视频/摄像头，直到读完、达到帧数或收到中断
#[derive(Debug, Default)]
pub struct PlaybackTask {
  max_frames: Option<usize>,
  cancel: Option<Arc<AtomicBool>>,
}

impl PlaybackTask {
  pub fn with_max_frames(mut self, max_frames: Option<usize>) -> Self {
    self.max_frames = max_frames.filter(|&n| n > 0);
    self
  }

  pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
    self.cancel = Some(cancel);
    self
  }

  fn cancelled(&self) -> bool {
    self
      .cancel
      .as_ref()
      .is_some_and(|flag| flag.load(Ordering::SeqCst))
  }
}

impl Task<&mut Session> for PlaybackTask {
  type Output = PlaybackReport;

  fn run_task(self, session: &mut Session) -> anyhow::Result<Self::Output> {
    let interval = session
      .tick_interval()
      .ok_or_else(|| anyhow::anyhow!("没有正在播放的视频或摄像头"))?;
    info!("开始播放，节拍 {:?}", interval);

    let mut report = PlaybackReport::default();
    while session.state() == PipelineState::Running {
      if self.cancelled() {
        warn!("中断信号接收，停止播放");
        session.stop();
        break;
      }

      let started = Instant::now();
      report.ticks += 1;
      match session.tick()? {
        TickOutcome::Presented { detections, .. } => {
          report.presented += 1;
          report.detections += detections.unwrap_or(0);
        }
        TickOutcome::InferenceFailed => report.failed += 1,
        TickOutcome::Exhausted => {
          info!("{}", END_OF_STREAM_NOTICE);
          report.exhausted = true;
        }
        TickOutcome::Submitted | TickOutcome::Idle => {}
      }

      if self.max_frames.is_some_and(|n| report.presented >= n) {
        info!("达到指定帧数 {}, 停止播放", report.presented);
        session.stop();
        break;
      }

      if let Some(rest) = interval.checked_sub(started.elapsed()) {
        thread::sleep(rest);
      }
    }

    info!(
      "播放结束：显示 {} 帧，检测到 {} 个物体，{} 帧推理失败",
      report.presented, report.detections, report.failed
    );
    Ok(report)
  }
}

/// 交互任务：命令来自读取线程，节拍和命令在同一个循环里处理
pub struct InteractiveTask<W> {
  commands: Receiver<String>,
  cancel: Arc<AtomicBool>,
  write: W,
}

impl<W: FnMut(&str)> InteractiveTask<W> {
  pub fn new(commands: Receiver<String>, cancel: Arc<AtomicBool>, write: W) -> Self {
    Self {
      commands,
      cancel,
      write,
    }
  }
}

impl<W: FnMut(&str)> Task<&mut Shell> for InteractiveTask<W> {
  type Output = ();

  fn run_task(mut self, shell: &mut Shell) -> anyhow::Result<Self::Output> {
    info!("进入交互模式");
    let mut next_tick = Instant::now();

    loop {
      let running = shell.session().state() == PipelineState::Running;
      if self.cancel.swap(false, Ordering::SeqCst) && running {
        warn!("收到中断信号，停止播放");
        shell.session_mut().stop();
        (self.write)("已停止");
      }

      let interval = shell
        .session()
        .tick_interval()
        .filter(|_| shell.session().state() == PipelineState::Running);
      let timeout = match interval {
        Some(_) => next_tick.saturating_duration_since(Instant::now()),
        None => IDLE_POLL_INTERVAL,
      };

      match self.commands.recv_timeout(timeout) {
        Ok(line) => match shell.handle_line(&line) {
          Ok(Reply::Quit) => break,
          Ok(Reply::Message(message)) if !message.is_empty() => (self.write)(&message),
          Ok(Reply::Message(_)) => {}
          Err(e) => (self.write)(&format!("错误: {}", e)),
        },
        Err(RecvTimeoutError::Timeout) => {}
        Err(RecvTimeoutError::Disconnected) => {
          info!("输入已关闭");
          break;
        }
      }

      if let Some(interval) = interval
        && Instant::now() >= next_tick
      {
        if let Some(notice) = shell.tick() {
          (self.write)(&notice);
        }
        next_tick = Instant::now() + interval;
      }
    }

    shell.session_mut().stop();
    info!("退出交互模式");
    Ok(())
  }
}
