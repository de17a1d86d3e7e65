// 该文件是 Shuangmu （双目） 项目的一部分。
// src/worker.rs - 摄像头推理线程与单槽信箱
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
  sync::{
    Arc, Condvar, Mutex, MutexGuard, PoisonError,
    mpsc::{self, Receiver, RecvTimeoutError, Sender},
  },
  thread::{self, JoinHandle},
  time::Duration,
};

use tracing::{debug, info, warn};

use crate::{
  frame::Frame,
  model::{Detection, Detector, InferenceError},
};

struct MailboxState<T> {
  slot: Option<T>,
  closed: bool,
  dropped: u64,
}

/// 只保存最新一项的信箱
///
/// `post` 直接覆盖旧内容，从不阻塞等待消费者；被覆盖的旧帧计入 `dropped`。
pub struct LatestFrameMailbox<T> {
  state: Mutex<MailboxState<T>>,
  ready: Condvar,
}

impl<T> Default for LatestFrameMailbox<T> {
  fn default() -> Self {
    Self {
      state: Mutex::new(MailboxState {
        slot: None,
        closed: false,
        dropped: 0,
      }),
      ready: Condvar::new(),
    }
  }
}

impl<T> LatestFrameMailbox<T> {
  pub fn new() -> Self {
    Self::default()
  }

  fn state(&self) -> MutexGuard<'_, MailboxState<T>> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// 放入新内容，返回是否覆盖了尚未取走的旧内容
  pub fn post(&self, item: T) -> bool {
    let mut state = self.state();
    if state.closed {
      return false;
    }
    let replaced = state.slot.replace(item).is_some();
    if replaced {
      state.dropped += 1;
    }
    drop(state);
    self.ready.notify_one();
    replaced
  }

  pub fn try_take(&self) -> Option<T> {
    self.state().slot.take()
  }

  /// 阻塞等待内容；信箱关闭且为空时返回 `None`
  pub fn take(&self) -> Option<T> {
    let mut state = self.state();
    loop {
      if let Some(item) = state.slot.take() {
        return Some(item);
      }
      if state.closed {
        return None;
      }
      state = self
        .ready
        .wait(state)
        .unwrap_or_else(PoisonError::into_inner);
    }
  }

  pub fn close(&self) {
    let mut state = self.state();
    state.closed = true;
    state.slot = None;
    drop(state);
    self.ready.notify_all();
  }

  pub fn is_closed(&self) -> bool {
    self.state().closed
  }

  pub fn dropped(&self) -> u64 {
    self.state().dropped
  }
}

/// 推理线程送回的一项结果，原帧和标注图成对出现
pub struct WorkerOutput {
  pub frame: Frame,
  pub outcome: Result<Detection, InferenceError>,
}

/// 在独立线程上做推理，调度方只管投递最新帧
pub struct InferenceWorker {
  mailbox: Arc<LatestFrameMailbox<Frame>>,
  results: Receiver<WorkerOutput>,
  handle: Option<JoinHandle<()>>,
}

impl InferenceWorker {
  pub fn spawn(detector: Arc<Detector>) -> std::io::Result<Self> {
    let mailbox = Arc::new(LatestFrameMailbox::new());
    let (tx, rx) = mpsc::channel();

    let inbox = mailbox.clone();
    let handle = thread::Builder::new()
      .name("inference".to_string())
      .spawn(move || run_worker(detector, inbox, tx))?;
    info!("推理线程已启动");

    Ok(Self {
      mailbox,
      results: rx,
      handle: Some(handle),
    })
  }

  /// 投递一帧，旧帧若还没被处理就丢弃
  pub fn submit(&self, frame: Frame) {
    if self.mailbox.post(frame) {
      debug!("丢弃过期帧，累计 {} 帧", self.mailbox.dropped());
    }
  }

  /// 取出已完成结果中最新的一项，不阻塞
  pub fn latest(&self) -> Option<WorkerOutput> {
    self.results.try_iter().last()
  }

  pub fn recv_timeout(&self, timeout: Duration) -> Option<WorkerOutput> {
    match self.results.recv_timeout(timeout) {
      Ok(output) => Some(output),
      Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
    }
  }

  pub fn dropped_frames(&self) -> u64 {
    self.mailbox.dropped()
  }
}

impl Drop for InferenceWorker {
  fn drop(&mut self) {
    self.mailbox.close();
    if let Some(handle) = self.handle.take()
      && handle.join().is_err()
    {
      warn!("推理线程异常退出");
    }
    info!("推理线程已停止");
  }
}

fn run_worker(
  detector: Arc<Detector>,
  mailbox: Arc<LatestFrameMailbox<Frame>>,
  results: Sender<WorkerOutput>,
) {
  while let Some(frame) = mailbox.take() {
    let outcome = detector.infer(&frame);
    if let Err(e) = &outcome {
      warn!("第 {} 帧推理失败: {}", frame.index, e);
    }
    if results.send(WorkerOutput { frame, outcome }).is_err() {
      break;
    }
  }
  debug!("推理线程退出循环");
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::testing::{ScriptedModel, detector};
  use image::RgbImage;

  #[test]
  fn mailbox_keeps_only_latest() {
    let mailbox = LatestFrameMailbox::new();
    assert!(!mailbox.post(1));
    assert!(mailbox.post(2));
    assert!(mailbox.post(3));
    assert_eq!(mailbox.try_take(), Some(3));
    assert_eq!(mailbox.try_take(), None);
    assert_eq!(mailbox.dropped(), 2);
  }

  #[test]
  fn closed_mailbox_wakes_consumer() {
    let mailbox = Arc::new(LatestFrameMailbox::<u32>::new());
    let consumer = {
      let mailbox = mailbox.clone();
      thread::spawn(move || mailbox.take())
    };
    mailbox.close();
    assert_eq!(consumer.join().unwrap(), None);
    assert!(!mailbox.post(7));
  }

  #[test]
  fn worker_infers_submitted_frames() {
    let worker =
      InferenceWorker::spawn(Arc::new(detector(ScriptedModel::repeating(vec!["person"])))).unwrap();
    worker.submit(Frame::new(RgbImage::new(16, 16), 5, 0));

    let output = worker.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(output.frame.index, 5);
    assert_eq!(output.outcome.unwrap().result.len(), 1);
  }

  #[test]
  fn worker_reports_failures_and_keeps_running() {
    let script = vec![Err("npu busy".to_string()), Ok(vec!["dog"])];
    let worker = InferenceWorker::spawn(Arc::new(detector(ScriptedModel::new(script)))).unwrap();

    worker.submit(Frame::new(RgbImage::new(8, 8), 0, 0));
    let first = worker.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(first.outcome.is_err());

    worker.submit(Frame::new(RgbImage::new(8, 8), 1, 33));
    let second = worker.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(second.outcome.unwrap().result.items[0].label.as_ref(), "dog");
  }
}
