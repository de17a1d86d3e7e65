// 该文件是 Shuangmu （双目） 项目的一部分。
// src/session.rs - 检测会话
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
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use thiserror::Error;
use tracing::{error, info, warn};

use crate::{
  aggregate::{Summary, summarize},
  input::{CameraSpec, InputError, SourceKind, SourceSlot, SourceSpec},
  model::{Detector, DetectorConfig, LoadError},
  output::{OutputError, Surface},
  pipeline::{Pipeline, PipelineError, PipelineState, TickOutcome},
  profile::Profile,
};

#[derive(Error, Debug)]
pub enum SessionError {
  #[error("请先加载模型")]
  ModelRequired,
  #[error("当前配置不支持: {0}")]
  Disabled(&'static str),
  #[error("没有打开图片")]
  NoImages,
  #[error("没有可保存的图像")]
  NothingToSave,
  #[error("模型加载失败: {0}")]
  Load(#[from] LoadError),
  #[error("输入错误: {0}")]
  Input(#[from] InputError),
  #[error("{0}")]
  Pipeline(#[from] PipelineError),
  #[error("保存失败: {0}")]
  Output(#[from] OutputError),
}

/// 当前可用的操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Controls {
  pub load_model: bool,
  pub images: bool,
  pub video: bool,
  pub camera: bool,
  pub prev: bool,
  pub next: bool,
  pub stats: bool,
  pub stop: bool,
  pub save: bool,
}

/// 显示面的哪一侧
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
  Raw,
  Annotated,
}

/// 一次检测会话
///
/// 持有模型、当前输入、流水线和最近一次检测结果。所有用户操作都从这里进入。
pub struct Session {
  profile: Profile,
  config: DetectorConfig,
  pipeline: Pipeline,
}

impl Session {
  pub fn new(profile: Profile, raw: Box<dyn Surface>, annotated: Box<dyn Surface>) -> Self {
    Self {
      profile,
      config: DetectorConfig::default(),
      pipeline: Pipeline::new(raw, annotated, profile.surface_size()),
    }
  }

  pub fn with_config(mut self, config: DetectorConfig) -> Self {
    self.config = config;
    self
  }

  pub fn profile(&self) -> Profile {
    self.profile
  }

  pub fn pipeline(&self) -> &Pipeline {
    &self.pipeline
  }

  pub fn state(&self) -> PipelineState {
    self.pipeline.state()
  }

  pub fn source_kind(&self) -> Option<SourceKind> {
    self.pipeline.source().kind()
  }

  pub fn has_model(&self) -> bool {
    self.pipeline.detector().is_some()
  }

  pub fn image_index(&self) -> Option<usize> {
    self.pipeline.source().images().map(|images| images.index())
  }

  /// 当前输入对应的节拍间隔，没有流式输入时为 `None`
  pub fn tick_interval(&self) -> Option<Duration> {
    self
      .source_kind()
      .filter(|kind| kind.is_streaming())
      .map(|kind| self.profile.tick_interval(kind))
  }

  /// 加载模型；失败时保持原有状态
  pub fn load_model(&mut self, path: impl AsRef<Path>) -> Result<(), SessionError> {
    let path = path.as_ref();
    let detector = Detector::load(path, &self.config).inspect_err(|e| {
      error!("模型加载失败 {}: {}", path.display(), e);
    })?;
    self.use_detector(detector)
  }

  /// 直接使用已经构建好的检测器
  pub fn use_detector(&mut self, detector: Detector) -> Result<(), SessionError> {
    self.pipeline.set_detector(Arc::new(detector))?;
    info!("模型已加载");
    Ok(())
  }

  fn require_model(&self) -> Result<(), SessionError> {
    if self.has_model() {
      Ok(())
    } else {
      Err(SessionError::ModelRequired)
    }
  }

  /// 打开图片列表并显示第一张
  pub fn open_images(&mut self, paths: Vec<PathBuf>) -> Result<usize, SessionError> {
    self.require_model()?;
    let spec = SourceSpec::Images(paths);
    spec.preflight()?;
    self.pipeline.replace_source(|| spec.open())?;
    info!(
      "已打开 {} 张图片",
      self.pipeline.source().images().map_or(0, |i| i.len())
    );
    self.show_current_image()?;
    Ok(0)
  }

  pub fn next_image(&mut self) -> Result<usize, SessionError> {
    self.step_image(|images| images.next())
  }

  pub fn prev_image(&mut self) -> Result<usize, SessionError> {
    self.step_image(|images| images.prev())
  }

  fn step_image<F>(&mut self, step: F) -> Result<usize, SessionError>
  where
    F: FnOnce(&mut crate::input::ImageList) -> usize,
  {
    let images = self
      .pipeline
      .source_mut()
      .images_mut()
      .ok_or(SessionError::NoImages)?;
    let before = images.index();
    let after = step(images);
    if after != before {
      self.show_current_image()?;
    }
    Ok(after)
  }

  fn show_current_image(&mut self) -> Result<(), SessionError> {
    let frame = self
      .pipeline
      .source()
      .images()
      .ok_or(SessionError::NoImages)?
      .load_current()?;
    // 新图片没有结果时，不能继续显示上一张的画面和计数
    if let Err(e) = self.pipeline.show_frame(&frame) {
      warn!("图片显示失败: {}", e);
      self.pipeline.discard_result();
      return Err(e.into());
    }
    Ok(())
  }

  pub fn open_video(&mut self, path: impl AsRef<Path>) -> Result<(), SessionError> {
    let spec = SourceSpec::Video(path.as_ref().to_path_buf());
    self.require_model()?;
    spec.preflight()?;
    self.open_stream(|| spec.open())
  }

  pub fn start_camera(&mut self, camera: CameraSpec) -> Result<(), SessionError> {
    if !self.profile.camera_enabled() {
      return Err(SessionError::Disabled("camera"));
    }
    self.require_model()?;
    let spec = SourceSpec::Camera(camera);
    spec.preflight()?;
    self.open_stream(|| spec.open())
  }

  /// 用给定的获取函数切换到视频或摄像头输入并开始运行
  pub fn open_stream<F>(&mut self, acquire: F) -> Result<(), SessionError>
  where
    F: FnOnce() -> Result<SourceSlot, InputError>,
  {
    self.require_model()?;
    self.pipeline.replace_source(acquire)?;
    self.pipeline.start()?;
    Ok(())
  }

  pub fn start(&mut self) -> Result<(), SessionError> {
    self.pipeline.start()?;
    Ok(())
  }

  pub fn tick(&mut self) -> Result<TickOutcome, SessionError> {
    Ok(self.pipeline.tick()?)
  }

  pub fn stop(&mut self) {
    self.pipeline.stop();
  }

  /// 最近一次检测结果的分类计数；还没有结果时视为未检测到物体
  pub fn summary(&self) -> Result<Summary, SessionError> {
    self.require_model()?;
    Ok(
      self
        .pipeline
        .last_result()
        .map(summarize)
        .unwrap_or(Summary::NoObjects),
    )
  }

  pub fn summary_text(&self) -> Result<String, SessionError> {
    Ok(self.profile.render_summary(&self.summary()?))
  }

  pub fn save_annotated(&self, path: impl AsRef<Path>) -> Result<(), SessionError> {
    self.save(Side::Annotated, path)
  }

  pub fn save_raw(&self, path: impl AsRef<Path>) -> Result<(), SessionError> {
    self.save(Side::Raw, path)
  }

  pub fn save(&self, side: Side, path: impl AsRef<Path>) -> Result<(), SessionError> {
    let bitmap = match side {
      Side::Raw => self.pipeline.last_raw(),
      Side::Annotated => self.pipeline.last_annotated(),
    };
    bitmap.ok_or(SessionError::NothingToSave)?.save(path)?;
    Ok(())
  }

  pub fn controls(&self) -> Controls {
    let model = self.has_model();
    let image_count = self.pipeline.source().images().map_or(0, |i| i.len());
    let streaming = self.pipeline.is_running();
    Controls {
      load_model: true,
      images: model,
      video: model,
      camera: model && self.profile.camera_enabled(),
      prev: model && image_count > 1,
      next: model && image_count > 1,
      stats: model,
      stop: model && (streaming || self.pipeline.source().is_streaming()),
      save: self.pipeline.last_raw().is_some(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    model::testing::{ScriptedModel, detector},
    output::MemorySurface,
  };
  use image::RgbImage;

  fn session(profile: Profile) -> (Session, MemorySurface, MemorySurface) {
    let raw = MemorySurface::default();
    let annotated = MemorySurface::default();
    let session = Session::new(profile, Box::new(raw.clone()), Box::new(annotated.clone()));
    (session, raw, annotated)
  }

  fn write_images(dir: &Path, n: usize) -> Vec<PathBuf> {
    (0..n)
      .map(|i| {
        let path = dir.join(format!("{i}.png"));
        RgbImage::new(10 + i as u32, 10).save(&path).unwrap();
        path
      })
      .collect()
  }

  #[test]
  fn controls_disabled_until_model_loaded() {
    let (mut session, _, _) = session(Profile::Full);
    let controls = session.controls();
    assert!(controls.load_model);
    assert!(!controls.images && !controls.video && !controls.camera);
    assert!(!controls.stats && !controls.stop);

    assert!(session.load_model("/nonexistent/yolo.onnx").is_err());
    assert_eq!(session.controls(), controls);

    session
      .use_detector(detector(ScriptedModel::repeating(vec![])))
      .unwrap();
    let controls = session.controls();
    assert!(controls.images && controls.video && controls.camera && controls.stats);
    assert!(!controls.prev && !controls.next);
  }

  #[test]
  fn compact_profile_has_no_camera() {
    let (mut session, _, _) = session(Profile::Compact);
    session
      .use_detector(detector(ScriptedModel::repeating(vec![])))
      .unwrap();
    assert!(!session.controls().camera);
    assert!(matches!(
      session.start_camera(CameraSpec::new("/dev/video0")),
      Err(SessionError::Disabled("camera"))
    ));
  }

  #[test]
  fn opening_media_requires_model() {
    let dir = tempfile::tempdir().unwrap();
    let (mut session, _, _) = session(Profile::Full);
    let paths = write_images(dir.path(), 1);
    assert!(matches!(
      session.open_images(paths),
      Err(SessionError::ModelRequired)
    ));
    assert!(matches!(session.summary(), Err(SessionError::ModelRequired)));
  }

  #[test]
  fn image_navigation_shows_and_clamps() {
    let dir = tempfile::tempdir().unwrap();
    let (mut session, raw, annotated) = session(Profile::Full);
    session
      .use_detector(detector(ScriptedModel::repeating(vec!["person", "person", "dog"])))
      .unwrap();

    session.open_images(write_images(dir.path(), 3)).unwrap();
    assert_eq!(session.image_index(), Some(0));
    assert_eq!(raw.presented(), 1);
    assert!(session.controls().next);

    for _ in 0..3 {
      session.next_image().unwrap();
    }
    assert_eq!(session.image_index(), Some(2));
    // 停在最后一张时不再重新显示
    assert_eq!(raw.presented(), 3);

    for _ in 0..5 {
      session.prev_image().unwrap();
    }
    assert_eq!(session.image_index(), Some(0));
    assert_eq!(annotated.presented(), 5);

    let text = session.summary_text().unwrap();
    assert!(text.starts_with("识别物体总数：3"));
  }

  #[test]
  fn summary_without_result_is_no_objects() {
    let (mut session, _, _) = session(Profile::Full);
    session
      .use_detector(detector(ScriptedModel::repeating(vec![])))
      .unwrap();
    assert_eq!(session.summary().unwrap(), Summary::NoObjects);
  }

  #[test]
  fn save_requires_displayed_image() {
    let dir = tempfile::tempdir().unwrap();
    let (mut session, _, _) = session(Profile::Full);
    session
      .use_detector(detector(ScriptedModel::repeating(vec!["cat"])))
      .unwrap();
    assert!(matches!(
      session.save_annotated(dir.path().join("a.png")),
      Err(SessionError::NothingToSave)
    ));

    session.open_images(write_images(dir.path(), 1)).unwrap();
    session.save_annotated(dir.path().join("out/a.png")).unwrap();
    session.save_raw(dir.path().join("out/r.jpg")).unwrap();
    assert!(dir.path().join("out/a.png").is_file());
    assert!(dir.path().join("out/r.jpg").is_file());
  }

  #[test]
  fn missing_video_keeps_current_images() {
    let dir = tempfile::tempdir().unwrap();
    let (mut session, _, _) = session(Profile::Full);
    session
      .use_detector(detector(ScriptedModel::repeating(vec![])))
      .unwrap();
    session.open_images(write_images(dir.path(), 2)).unwrap();

    let err = session.open_video(dir.path().join("missing.mp4")).unwrap_err();
    assert!(matches!(err, SessionError::Input(InputError::NotFound(_))));
    assert_eq!(session.source_kind(), Some(SourceKind::ImageList));
  }

  #[cfg(not(feature = "gstreamer_input"))]
  #[test]
  fn video_without_backend_keeps_current_images() {
    let dir = tempfile::tempdir().unwrap();
    let (mut session, raw, _) = session(Profile::Full);
    session
      .use_detector(detector(ScriptedModel::repeating(vec!["cat"])))
      .unwrap();
    session.open_images(write_images(dir.path(), 1)).unwrap();
    let clip = dir.path().join("clip.mp4");
    std::fs::write(&clip, b"not really a video").unwrap();

    let err = session.open_video(&clip).unwrap_err();
    assert!(matches!(err, SessionError::Input(InputError::Unsupported(_))));
    assert_eq!(session.source_kind(), Some(SourceKind::ImageList));
    assert!(!raw.is_blank());
    assert!(session.pipeline().last_raw().is_some());
  }

  #[cfg(not(feature = "v4l2_input"))]
  #[test]
  fn camera_without_backend_keeps_current_images() {
    let dir = tempfile::tempdir().unwrap();
    let (mut session, raw, _) = session(Profile::Full);
    session
      .use_detector(detector(ScriptedModel::repeating(vec!["cat", "cat"])))
      .unwrap();
    session.open_images(write_images(dir.path(), 2)).unwrap();
    let node = dir.path().join("video0");
    std::fs::write(&node, b"").unwrap();

    let mut camera = CameraSpec::new(node.display().to_string());
    camera.backend = crate::input::CameraBackend::V4l2;
    let err = session.start_camera(camera).unwrap_err();
    assert!(matches!(err, SessionError::Input(InputError::Unsupported(_))));
    assert_eq!(session.source_kind(), Some(SourceKind::ImageList));
    assert!(!raw.is_blank());
    assert_eq!(session.summary().unwrap().total(), 2);
  }

  #[test]
  fn failed_acquire_after_release_clears_display() {
    let dir = tempfile::tempdir().unwrap();
    let (mut session, raw, annotated) = session(Profile::Full);
    session
      .use_detector(detector(ScriptedModel::repeating(vec!["cat"])))
      .unwrap();
    session.open_images(write_images(dir.path(), 2)).unwrap();

    let err = session
      .open_stream(|| Err(InputError::DeviceUnavailable("/dev/video0".to_string())))
      .unwrap_err();
    assert!(matches!(err, SessionError::Pipeline(_)));
    assert_eq!(session.source_kind(), None);
    assert!(raw.is_blank() && annotated.is_blank());
    assert_eq!(session.summary().unwrap(), Summary::NoObjects);
    assert!(!session.controls().save);
  }

  #[test]
  fn failed_inference_on_new_image_drops_previous_counts() {
    let dir = tempfile::tempdir().unwrap();
    let (mut session, raw, annotated) = session(Profile::Full);
    let script = vec![Ok(vec!["cat", "cat"]), Err("boom".to_string())];
    session
      .use_detector(detector(ScriptedModel::new(script)))
      .unwrap();
    session.open_images(write_images(dir.path(), 2)).unwrap();
    assert_eq!(session.summary().unwrap().total(), 2);

    assert!(matches!(
      session.next_image(),
      Err(SessionError::Pipeline(PipelineError::Inference(_)))
    ));
    assert_eq!(session.image_index(), Some(1));
    assert_eq!(session.summary().unwrap(), Summary::NoObjects);
    assert!(raw.is_blank() && annotated.is_blank());
  }
}
