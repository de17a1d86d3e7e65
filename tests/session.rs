// 该文件是 Shuangmu （双目） 项目的一部分。
// tests/session.rs - 会话集成测试
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
  sync::{Arc, Mutex},
};

use image::RgbImage;
use shuangmu::{
  aggregate::Summary,
  frame::Frame,
  input::{FrameSource, InputError, SourceKind, SourceSlot},
  model::{DetectItem, DetectResult, Detector, InferenceError, Labels, Model},
  output::{MemorySurface, draw::Draw},
  pipeline::{PipelineState, TickOutcome},
  profile::Profile,
  session::{Session, SessionError},
  shell::{END_OF_STREAM_NOTICE, Reply, Shell},
};

/// 每次都返回同样标签的模型
struct FixedModel {
  labels: Labels,
  detections: Vec<&'static str>,
}

impl Model for FixedModel {
  fn infer(&self, _frame: &Frame) -> Result<DetectResult, InferenceError> {
    Ok(DetectResult::new(
      self
        .detections
        .iter()
        .enumerate()
        .map(|(i, label)| DetectItem {
          class_id: i as u32,
          label: Arc::from(*label),
          score: 0.8,
          bbox: [0.2, 0.2, 0.6, 0.6],
        })
        .collect(),
    ))
  }

  fn labels(&self) -> &Labels {
    &self.labels
  }

  fn name(&self) -> &str {
    "fixed"
  }
}

fn detector(detections: Vec<&'static str>) -> Detector {
  Detector::new(
    Box::new(FixedModel {
      labels: Labels::coco(),
      detections,
    }),
    Draw::without_font(),
  )
}

/// 记录获取和释放顺序的输入
struct Tracked {
  name: &'static str,
  frames: u64,
  kind: SourceKind,
  log: Arc<Mutex<Vec<String>>>,
}

impl Tracked {
  fn acquire(
    name: &'static str,
    frames: u64,
    kind: SourceKind,
    log: &Arc<Mutex<Vec<String>>>,
  ) -> Result<SourceSlot, InputError> {
    log.lock().unwrap().push(format!("acquire {name}"));
    let tracked = Box::new(Tracked {
      name,
      frames,
      kind,
      log: log.clone(),
    });
    Ok(match kind {
      SourceKind::Camera => SourceSlot::Camera(tracked),
      _ => SourceSlot::Video(tracked),
    })
  }
}

impl FrameSource for Tracked {
  fn kind(&self) -> SourceKind {
    self.kind
  }

  fn next_frame(&mut self) -> Result<Option<Frame>, InputError> {
    if self.frames == 0 {
      return Ok(None);
    }
    self.frames -= 1;
    Ok(Some(Frame::new(RgbImage::new(40, 30), self.frames, 0)))
  }
}

impl Drop for Tracked {
  fn drop(&mut self) {
    self.log.lock().unwrap().push(format!("release {}", self.name));
  }
}

fn session(profile: Profile) -> (Session, MemorySurface, MemorySurface) {
  let raw = MemorySurface::default();
  let annotated = MemorySurface::default();
  let session = Session::new(profile, Box::new(raw.clone()), Box::new(annotated.clone()));
  (session, raw, annotated)
}

fn write_images(dir: &Path, n: usize) -> Vec<PathBuf> {
  (0..n)
    .map(|i| {
      let path = dir.join(format!("img{i}.bmp"));
      RgbImage::new(20, 10).save(&path).unwrap();
      path
    })
    .collect()
}

#[test]
fn three_images_clamp_navigation() {
  let dir = tempfile::tempdir().unwrap();
  let (mut session, _, _) = session(Profile::Full);
  session.use_detector(detector(vec!["person"])).unwrap();
  session.open_images(write_images(dir.path(), 3)).unwrap();

  for _ in 0..3 {
    session.next_image().unwrap();
  }
  assert_eq!(session.image_index(), Some(2));
  for _ in 0..5 {
    session.prev_image().unwrap();
  }
  assert_eq!(session.image_index(), Some(0));
}

#[test]
fn switching_sources_releases_exactly_once_before_acquire() {
  let log = Arc::new(Mutex::new(Vec::new()));
  let (mut session, _, _) = session(Profile::Full);
  session.use_detector(detector(vec![])).unwrap();

  session
    .open_stream(|| Tracked::acquire("video", 100, SourceKind::Video, &log))
    .unwrap();
  session.tick().unwrap();
  session
    .open_stream(|| Tracked::acquire("camera", 100, SourceKind::Camera, &log))
    .unwrap();
  session.stop();

  assert_eq!(
    *log.lock().unwrap(),
    vec![
      "acquire video",
      "release video",
      "acquire camera",
      "release camera"
    ]
  );
}

#[test]
fn failed_model_load_keeps_media_controls_disabled() {
  let dir = tempfile::tempdir().unwrap();
  let broken = dir.path().join("weights.bin");
  std::fs::write(&broken, b"junk").unwrap();

  let (mut session, _, _) = session(Profile::Full);
  assert!(matches!(
    session.load_model(&broken),
    Err(SessionError::Load(_))
  ));
  let controls = session.controls();
  assert!(!controls.images && !controls.video && !controls.camera);
  assert!(!session.has_model());
}

#[test]
fn video_exhaustion_stops_and_clears_surfaces() {
  let log = Arc::new(Mutex::new(Vec::new()));
  let (mut session, raw, annotated) = session(Profile::Full);
  session.use_detector(detector(vec!["car", "car"])).unwrap();
  session
    .open_stream(|| Tracked::acquire("video", 2, SourceKind::Video, &log))
    .unwrap();

  assert!(matches!(
    session.tick().unwrap(),
    TickOutcome::Presented { .. }
  ));
  assert!(!raw.is_blank() && !annotated.is_blank());
  session.tick().unwrap();
  assert_eq!(session.tick().unwrap(), TickOutcome::Exhausted);

  assert_eq!(session.state(), PipelineState::Stopped);
  assert!(raw.is_blank());
  assert!(annotated.is_blank());
  assert_eq!(log.lock().unwrap().last().map(String::as_str), Some("release video"));
}

#[test]
fn zero_detections_summarize_as_no_objects() {
  let dir = tempfile::tempdir().unwrap();
  let (mut session, _, _) = session(Profile::Compact);
  session.use_detector(detector(vec![])).unwrap();
  session.open_images(write_images(dir.path(), 1)).unwrap();

  assert_eq!(session.summary().unwrap(), Summary::NoObjects);
  assert_eq!(session.summary_text().unwrap(), "未检测到物体");
}

#[test]
fn shell_drives_a_full_image_session() {
  let dir = tempfile::tempdir().unwrap();
  let paths = write_images(dir.path(), 2);
  let (mut session, _, _) = session(Profile::Compact);
  session
    .use_detector(detector(vec!["dog", "cat", "dog"]))
    .unwrap();
  let mut shell = Shell::new(session);

  let line = format!("images {} {}", paths[0].display(), paths[1].display());
  assert!(matches!(shell.handle_line(&line).unwrap(), Reply::Message(_)));
  shell.handle_line("next").unwrap();

  let Reply::Message(stats) = shell.handle_line("stats").unwrap() else {
    panic!("expected message");
  };
  assert_eq!(stats, "识别到的物体总个数：3\ndog: 2\ncat: 1");

  let saved = dir.path().join("saved/annotated.png");
  shell
    .handle_line(&format!("save annotated {}", saved.display()))
    .unwrap();
  assert!(saved.is_file());
}

#[test]
fn shell_reports_end_of_stream() {
  let log = Arc::new(Mutex::new(Vec::new()));
  let (mut session, _, _) = session(Profile::Full);
  session.use_detector(detector(vec![])).unwrap();
  session
    .open_stream(|| Tracked::acquire("video", 1, SourceKind::Video, &log))
    .unwrap();

  let mut shell = Shell::new(session);
  assert_eq!(shell.tick(), None);
  assert_eq!(shell.tick().as_deref(), Some(END_OF_STREAM_NOTICE));
}
