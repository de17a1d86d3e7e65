// 该文件是 Shuangmu （双目） 项目的一部分。
// src/pipeline.rs - 帧处理流水线
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

//! 帧处理流水线
//!
//! 每次 `tick` 取一帧、推理、缩放成两张位图分别送到原图和标注两个显示面。
//! 取帧、渲染、显示都在调用方的同一个调度上下文中完成；
//! 只有摄像头模式下推理交给 [`InferenceWorker`]。

use std::sync::Arc;

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
  frame::Frame,
  input::{InputError, SourceKind, SourceSlot},
  model::{DetectResult, Detection, Detector, InferenceError},
  output::{Bitmap, OutputError, Surface},
  worker::{InferenceWorker, WorkerOutput},
};

#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("当前输入不是视频或摄像头")]
  NotStreaming,
  #[error("输入错误: {0}")]
  Input(#[from] InputError),
  #[error("显示错误: {0}")]
  Output(#[from] OutputError),
  #[error("推理错误: {0}")]
  Inference(#[from] InferenceError),
  #[error("无法启动推理线程: {0}")]
  Worker(std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
  Idle,
  Running,
  Stopped,
}

/// 一次 `tick` 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
  /// 没有在运行，什么也没做
  Idle,
  /// 显示了一帧；没有模型时 `detections` 为 `None`，只显示原图
  Presented {
    frame_index: u64,
    detections: Option<usize>,
  },
  /// 摄像头帧已交给推理线程，结果还没回来
  Submitted,
  /// 本帧推理失败，流水线继续运行
  InferenceFailed,
  /// 视频读完，流水线已停止
  Exhausted,
}

/// 会话状态：模型、当前输入和最近一次检测结果
#[derive(Debug, Default)]
pub struct SessionState {
  pub detector: Option<Arc<Detector>>,
  pub source: SourceSlot,
  pub last_result: Option<DetectResult>,
}

pub struct Pipeline {
  state: PipelineState,
  session: SessionState,
  raw: Box<dyn Surface>,
  annotated: Box<dyn Surface>,
  bounds: (u32, u32),
  worker: Option<InferenceWorker>,
  last_raw: Option<Bitmap>,
  last_annotated: Option<Bitmap>,
}

impl Pipeline {
  pub fn new(raw: Box<dyn Surface>, annotated: Box<dyn Surface>, bounds: (u32, u32)) -> Self {
    Self {
      state: PipelineState::Idle,
      session: SessionState::default(),
      raw,
      annotated,
      bounds,
      worker: None,
      last_raw: None,
      last_annotated: None,
    }
  }

  pub fn state(&self) -> PipelineState {
    self.state
  }

  pub fn is_running(&self) -> bool {
    self.state == PipelineState::Running
  }

  pub fn detector(&self) -> Option<&Arc<Detector>> {
    self.session.detector.as_ref()
  }

  /// 替换模型；正在运行的摄像头推理线程随之重建
  pub fn set_detector(&mut self, detector: Arc<Detector>) -> Result<(), PipelineError> {
    info!("使用模型: {}", detector.name());
    self.session.detector = Some(detector);
    if self.worker.is_some() {
      self.worker = None;
      self.spawn_worker()?;
    }
    Ok(())
  }

  pub fn source(&self) -> &SourceSlot {
    &self.session.source
  }

  pub fn source_mut(&mut self) -> &mut SourceSlot {
    &mut self.session.source
  }

  pub fn last_result(&self) -> Option<&DetectResult> {
    self.session.last_result.as_ref()
  }

  pub fn last_raw(&self) -> Option<&Bitmap> {
    self.last_raw.as_ref()
  }

  pub fn last_annotated(&self) -> Option<&Bitmap> {
    self.last_annotated.as_ref()
  }

  /// 切换输入：先停掉流水线并释放旧输入，再获取新输入
  ///
  /// 获取失败时输入槽为空，显示面和上次结果一并清空，流水线处于停止状态。
  pub fn replace_source<F>(&mut self, acquire: F) -> Result<(), PipelineError>
  where
    F: FnOnce() -> Result<SourceSlot, InputError>,
  {
    if self.is_running() {
      self.stop();
    }
    self.worker = None;

    if let Err(e) = self.session.source.switch(acquire) {
      error!("打开输入失败: {}", e);
      self.discard_result();
      if self.state != PipelineState::Idle {
        self.state = PipelineState::Stopped;
      }
      return Err(e.into());
    }
    debug!("当前输入: {:?}", self.session.source);
    Ok(())
  }

  /// idle/stopped -> running，要求当前输入是视频或摄像头
  pub fn start(&mut self) -> Result<(), PipelineError> {
    let kind = self
      .session
      .source
      .kind()
      .filter(|kind| kind.is_streaming())
      .ok_or(PipelineError::NotStreaming)?;

    if kind == SourceKind::Camera && self.session.detector.is_some() && self.worker.is_none() {
      self.spawn_worker()?;
    }

    info!("流水线开始运行: {:?}", kind);
    self.state = PipelineState::Running;
    Ok(())
  }

  fn spawn_worker(&mut self) -> Result<(), PipelineError> {
    if let Some(detector) = &self.session.detector {
      let worker = InferenceWorker::spawn(detector.clone()).map_err(PipelineError::Worker)?;
      self.worker = Some(worker);
    }
    Ok(())
  }

  /// 拉一帧并处理
  ///
  /// 读完时停止并清空显示面；推理失败只放弃这一帧；读帧出错时停止。
  pub fn tick(&mut self) -> Result<TickOutcome, PipelineError> {
    if !self.is_running() {
      return Ok(TickOutcome::Idle);
    }

    let frame = match self.session.source.next_frame() {
      Ok(Some(frame)) => frame,
      Ok(None) => {
        info!("视频播放结束或摄像头停止");
        self.stop();
        return Ok(TickOutcome::Exhausted);
      }
      Err(e) => {
        error!("读取帧失败: {}", e);
        self.stop();
        return Err(e.into());
      }
    };

    if let Some(worker) = &self.worker {
      worker.submit(frame);
      return match worker.latest() {
        Some(output) => self.present_worker_output(output),
        None => Ok(TickOutcome::Submitted),
      };
    }

    match self.show_frame(&frame) {
      Err(PipelineError::Inference(e)) => {
        warn!("第 {} 帧推理失败，跳过: {}", frame.index, e);
        Ok(TickOutcome::InferenceFailed)
      }
      other => other,
    }
  }

  fn present_worker_output(&mut self, output: WorkerOutput) -> Result<TickOutcome, PipelineError> {
    match output.outcome {
      Ok(detection) => self.present(&output.frame, Some(detection)),
      Err(e) => {
        warn!("第 {} 帧推理失败，跳过: {}", output.frame.index, e);
        Ok(TickOutcome::InferenceFailed)
      }
    }
  }

  /// 同步处理一帧：有模型时推理并显示两张图，没有模型时只显示原图
  pub fn show_frame(&mut self, frame: &Frame) -> Result<TickOutcome, PipelineError> {
    let detection = match &self.session.detector {
      Some(detector) => Some(detector.infer(frame)?),
      None => None,
    };
    self.present(frame, detection)
  }

  fn present(
    &mut self,
    frame: &Frame,
    detection: Option<Detection>,
  ) -> Result<TickOutcome, PipelineError> {
    let raw = Bitmap::fit(&frame.image, self.bounds);
    self.raw.present(&raw)?;
    self.last_raw = Some(raw);

    let detections = match detection {
      Some(Detection { result, annotated }) => {
        self.publish_annotated(&annotated)?;
        let count = result.len();
        self.session.last_result = Some(result);
        Some(count)
      }
      None => None,
    };

    Ok(TickOutcome::Presented {
      frame_index: frame.index,
      detections,
    })
  }

  fn publish_annotated(&mut self, annotated: &RgbImage) -> Result<(), PipelineError> {
    let bitmap = Bitmap::fit(annotated, self.bounds);
    self.annotated.present(&bitmap)?;
    self.last_annotated = Some(bitmap);
    Ok(())
  }

  /// any -> stopped：释放视频/摄像头并清空两个显示面
  pub fn stop(&mut self) {
    self.worker = None;
    if self.session.source.is_streaming() {
      self.session.source.release();
    }
    self.clear_surfaces();
    if self.state != PipelineState::Stopped {
      info!("流水线已停止");
    }
    self.state = PipelineState::Stopped;
  }

  /// 清空两个显示面和最近一次检测结果，输入和状态不变
  pub fn discard_result(&mut self) {
    self.clear_surfaces();
    self.session.last_result = None;
  }

  fn clear_surfaces(&mut self) {
    self.raw.clear();
    self.annotated.clear();
    self.last_raw = None;
    self.last_annotated = None;
  }
}

impl Drop for Pipeline {
  fn drop(&mut self) {
    self.worker = None;
    self.session.source.release();
  }
}
