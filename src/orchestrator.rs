//! Scene backup and restore across many cameras.
//!
//! A job walks a scene range on every participating camera. Cameras run in
//! parallel (optionally capped), scenes within a camera run in order. Each
//! camera reports through its own child of the job's root [`Progress`].
//!
//! Per-scene failures are collected and the walk continues. Cancelling the
//! root stops each camera at its next scene boundary; cameras that had not
//! started are skipped.

use log::{debug, error, info, warn};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::camera::Camera;
use crate::error::{Error, Result};
use crate::progress::Progress;
use crate::scene::SceneRange;
use crate::types::Property;

// =============================================================================
// Configuration
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Direction {
    /// Recall each scene and capture the pose it holds.
    Backup,
    /// Recall each scene.
    Restore,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Backup => write!(f, "Backup"),
            Direction::Restore => write!(f, "Restore"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct JobConfig {
    pub direction: Direction,
    pub scenes: SceneRange,
    /// Copy scenes `offset` slots away: backup stores each scene again at
    /// `scene + offset`, restore fills `scene` from `scene + offset`.
    pub offset: Option<i32>,
    /// Pause between scenes on one camera.
    pub step_delay: Duration,
    /// Cameras processed at once; `None` runs them all in parallel.
    pub max_concurrent_cameras: Option<usize>,
}

impl JobConfig {
    pub fn new(direction: Direction, scenes: SceneRange) -> Self {
        Self {
            direction,
            scenes,
            offset: None,
            step_delay: Duration::ZERO,
            max_concurrent_cameras: None,
        }
    }

    pub fn backup(scenes: SceneRange) -> Self {
        Self::new(Direction::Backup, scenes)
    }

    pub fn restore(scenes: SceneRange) -> Self {
        Self::new(Direction::Restore, scenes)
    }

    pub fn with_offset(mut self, offset: i32) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    pub fn with_max_concurrent_cameras(mut self, limit: usize) -> Self {
        self.max_concurrent_cameras = Some(limit);
        self
    }
}

// =============================================================================
// Report
// =============================================================================

/// A scene that could not be processed on one camera.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneFailure {
    pub camera: String,
    pub scene: u8,
    pub error: Error,
}

/// The pose a scene holds, read back during a backup.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SceneCapture {
    pub camera: String,
    pub scene: u8,
    pub pan: i32,
    pub tilt: i32,
    pub zoom: i32,
    pub focus: i32,
    pub snapshot: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobReport {
    pub failures: Vec<SceneFailure>,
    /// Backup only, in camera then scene order.
    pub captures: Vec<SceneCapture>,
    pub cancelled: bool,
}

impl JobReport {
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }
}

// =============================================================================
// Job
// =============================================================================

#[derive(Debug)]
struct CameraTask {
    camera: Arc<Camera>,
    progress: Progress,
    scenes: Vec<u8>,
    offset: Option<i32>,
}

#[derive(Default)]
struct CameraOutcome {
    failures: Vec<SceneFailure>,
    captures: Vec<SceneCapture>,
}

#[derive(Debug)]
pub struct BackupRestoreJob {
    config: JobConfig,
    root: Progress,
    tasks: Vec<CameraTask>,
}

impl BackupRestoreJob {
    /// Plan the job. Each camera gets a progress child sized to the scenes
    /// its dialect can address; reserved and out-of-range indices are
    /// skipped. An offset any camera cannot address is rejected.
    pub fn new(config: JobConfig, cameras: Vec<Arc<Camera>>) -> Result<Self> {
        if config.scenes.is_empty() {
            return Err(Error::invalid_argument("job has no scenes"));
        }
        if config.max_concurrent_cameras == Some(0) {
            return Err(Error::invalid_argument("max_concurrent_cameras must be at least 1"));
        }

        let root = Progress::group().with_title(format!(
            "{} {}",
            config.direction,
            config.scenes.pretty_with_name()
        ));
        let mut tasks = Vec::with_capacity(cameras.len());
        for camera in cameras {
            let dialect = camera.dialect();
            let scenes = config.scenes.valid_for(dialect);
            let skipped = config.scenes.len() - scenes.len();
            if skipped > 0 {
                debug!("{}: skipping {} unaddressable scene(s)", camera.name(), skipped);
            }
            // A shifted offset would store into the wrong slots.
            if let Some(k) = config.offset {
                if dialect.validate_range_offset(k) != k {
                    return Err(Error::invalid_argument(format!(
                        "{}: offset {} is outside 1..={}",
                        camera.name(),
                        k,
                        dialect.max_scene_index
                    )));
                }
            }
            let offset = config.offset;

            let progress = Progress::new(scenes.len() as u64).with_title(camera.name());
            root.add_child(&progress);
            tasks.push(CameraTask {
                camera,
                progress,
                scenes,
                offset,
            });
        }

        Ok(Self {
            config,
            root,
            tasks,
        })
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    /// The root node; one child per camera, in the order given.
    pub fn progress(&self) -> Progress {
        self.root.clone()
    }

    pub fn camera_progress(&self, camera: &str) -> Option<Progress> {
        self.tasks
            .iter()
            .find(|t| t.camera.name() == camera)
            .map(|t| t.progress.clone())
    }

    /// Run on a background thread.
    pub fn start(self) -> JobHandle {
        let progress = self.root.clone();
        let handle = thread::spawn(move || self.run());
        JobHandle {
            progress,
            handle: Some(handle),
        }
    }

    /// Run to completion on the calling thread.
    pub fn run(self) -> JobReport {
        let Self {
            config,
            root,
            tasks,
        } = self;
        info!("{} started on {} camera(s)", root.title().unwrap_or_default(), tasks.len());
        if tasks.is_empty() {
            root.finish();
            return JobReport {
                cancelled: root.is_cancelled(),
                ..JobReport::default()
            };
        }

        let workers = config
            .max_concurrent_cameras
            .unwrap_or(tasks.len())
            .min(tasks.len());
        let next = AtomicUsize::new(0);
        let outcomes: Mutex<BTreeMap<usize, CameraOutcome>> = Mutex::new(BTreeMap::new());

        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    let index = next.fetch_add(1, Ordering::SeqCst);
                    let Some(task) = tasks.get(index) else {
                        break;
                    };
                    let outcome = run_camera(&config, task);
                    outcomes
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .insert(index, outcome);
                });
            }
        });

        let mut report = JobReport {
            cancelled: root.is_cancelled(),
            ..JobReport::default()
        };
        for (_, outcome) in outcomes.into_inner().unwrap_or_else(|e| e.into_inner()) {
            report.failures.extend(outcome.failures);
            report.captures.extend(outcome.captures);
        }
        info!(
            "{} finished: {} failure(s){}",
            root.title().unwrap_or_default(),
            report.failures.len(),
            if report.cancelled { ", cancelled" } else { "" }
        );
        report
    }
}

/// One camera's sub-loop.
fn run_camera(config: &JobConfig, task: &CameraTask) -> CameraOutcome {
    let mut outcome = CameraOutcome::default();
    let camera = &task.camera;
    if task.progress.is_cancelled() {
        debug!("{}: job cancelled before start", camera.name());
        task.progress.finish();
        return outcome;
    }

    for (i, &scene) in task.scenes.iter().enumerate() {
        if i > 0 && !config.step_delay.is_zero() {
            thread::sleep(config.step_delay);
        }
        if task.progress.is_cancelled() {
            debug!("{}: stopping before scene {}", camera.name(), scene);
            break;
        }
        task.progress.set_description(format!("Scene {}", scene));

        let result = match config.direction {
            Direction::Restore => restore_scene(camera, scene, task.offset),
            Direction::Backup => backup_scene(camera, scene, task.offset).map(Some),
        };
        match result {
            Ok(capture) => outcome.captures.extend(capture),
            Err(Error::Cancelled) => {
                // The command itself was aborted; treat it as a job cancel.
                task.progress.cancel();
                break;
            }
            Err(e) => {
                warn!("{}: scene {} failed: {}", camera.name(), scene, e);
                outcome.failures.push(SceneFailure {
                    camera: camera.name().to_string(),
                    scene,
                    error: e,
                });
            }
        }
        task.progress.increment(1);
    }
    task.progress.finish();
    outcome
}

fn restore_scene(camera: &Camera, scene: u8, offset: Option<i32>) -> Result<Option<SceneCapture>> {
    match offset {
        None => camera.memory_recall(scene as i32).wait()?,
        Some(k) => {
            camera.memory_recall(scene as i32 + k).wait()?;
            camera.memory_set(scene as i32).wait()?;
        }
    }
    Ok(None)
}

fn backup_scene(camera: &Camera, scene: u8, offset: Option<i32>) -> Result<SceneCapture> {
    camera.memory_recall(scene as i32).wait()?;
    let pan = camera.fetch(Property::Pan, true)?;
    // Refreshed alongside pan.
    let tilt = camera.fetch(Property::Tilt, false)?;
    let zoom = camera.fetch(Property::Zoom, true)?;
    let focus = camera.fetch(Property::Focus, true)?;
    let snapshot = if camera.has_snapshot_source() {
        match camera.fetch_snapshot(Some(scene)) {
            Ok(image) => Some(image),
            Err(e) => {
                warn!("{}: no snapshot for scene {}: {}", camera.name(), scene, e);
                None
            }
        }
    } else {
        None
    };
    if let Some(k) = offset {
        camera.memory_set(scene as i32 + k).wait()?;
    }
    Ok(SceneCapture {
        camera: camera.name().to_string(),
        scene,
        pan,
        tilt,
        zoom,
        focus,
        snapshot,
    })
}

// =============================================================================
// Handle
// =============================================================================

/// A running job.
pub struct JobHandle {
    progress: Progress,
    handle: Option<JoinHandle<JobReport>>,
}

impl JobHandle {
    pub fn progress(&self) -> Progress {
        self.progress.clone()
    }

    /// Stop every camera at its next scene boundary.
    pub fn cancel(&self) -> bool {
        self.progress.cancel()
    }

    pub fn is_finished(&self) -> bool {
        self.progress.is_finished()
    }

    /// Block until every camera is done.
    pub fn wait(mut self) -> JobReport {
        let Some(handle) = self.handle.take() else {
            return JobReport::default();
        };
        match handle.join() {
            Ok(report) => report,
            Err(_) => {
                error!("job thread panicked");
                JobReport {
                    cancelled: true,
                    ..JobReport::default()
                }
            }
        }
    }
}

impl fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobHandle")
            .field("progress", &self.progress)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CameraConfig;
    use crate::engine::EngineConfig;
    use crate::error::DeviceError;
    use crate::events::EventHub;
    use crate::protocol::{command, decode_command, DialectKind, Response};
    use crate::transport::mock::{ScriptHandle, ScriptedTransport, VirtualCamera};
    use crate::types::Endpoint;
    use std::sync::atomic::AtomicBool;
    use std::time::Instant;

    fn config(name: &str) -> CameraConfig {
        CameraConfig::new(name, Endpoint::tcp("192.0.2.10", 5678)).with_engine_config(
            EngineConfig::default()
                .with_ack_timeout(Duration::from_millis(200))
                .with_poll_interval(Duration::from_millis(5)),
        )
    }

    fn camera_with(name: &str, transport: ScriptedTransport) -> (Arc<Camera>, ScriptHandle) {
        let handle = transport.handle();
        let camera = Camera::with_transport(config(name), Box::new(transport), EventHub::new())
            .unwrap();
        (Arc::new(camera), handle)
    }

    fn virtual_camera(name: &str) -> (Arc<Camera>, Arc<Mutex<VirtualCamera>>, ScriptHandle) {
        let cam = Arc::new(Mutex::new(VirtualCamera::new(DialectKind::PtzOptics)));
        let (camera, handle) = camera_with(name, ScriptedTransport::camera(Arc::clone(&cam)));
        (camera, cam, handle)
    }

    /// Store a pose with pan = scene * 100 in each scene.
    fn seed_scenes(cam: &Mutex<VirtualCamera>, scenes: &[u8]) {
        let mut cam = cam.lock().unwrap();
        for &scene in scenes {
            cam.set_value(Property::Pan, scene as i32 * 100);
            cam.set_value(Property::Zoom, scene as i32);
            cam.handle(&command::memory_set(scene).encode(1).unwrap());
        }
        cam.set_value(Property::Pan, 0);
    }

    fn counts(progress: &Progress) -> (u64, u64, bool, bool) {
        (
            progress.completed_units(),
            progress.total_units(),
            progress.is_finished(),
            progress.is_cancelled(),
        )
    }

    #[test]
    fn test_cancel_after_second_scene() {
        let root_slot: Arc<Mutex<Option<Progress>>> = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&root_slot);
        let recall_two = command::memory_recall(2).body().to_vec();
        let (a, _) = camera_with(
            "a",
            ScriptedTransport::new(move |frame| {
                let body = decode_command(frame).map(|(_, b)| b.to_vec()).unwrap_or_default();
                if body == recall_two {
                    if let Some(root) = slot.lock().unwrap().as_ref() {
                        root.cancel();
                    }
                }
                vec![
                    Response::Ack { socket: 1 }.encode(1),
                    Response::Completion { socket: 1 }.encode(1),
                ]
            }),
        );
        let (b, _, b_script) = virtual_camera("b");

        let job = BackupRestoreJob::new(
            JobConfig::restore(SceneRange::contiguous("", 1, 5)).with_max_concurrent_cameras(1),
            vec![a, b],
        )
        .unwrap();
        *root_slot.lock().unwrap() = Some(job.progress());
        let a_progress = job.camera_progress("a").unwrap();
        let b_progress = job.camera_progress("b").unwrap();

        let handle = job.start();
        let report = handle.wait();

        assert_eq!(counts(&a_progress), (2, 5, true, true));
        assert_eq!(counts(&b_progress), (0, 5, true, true));
        assert!(report.failures.is_empty());
        assert!(report.cancelled);
        assert!(b_script.writes().is_empty());
    }

    #[test]
    fn test_cancel_stops_cameras_running_together() {
        let root_slot: Arc<Mutex<Option<Progress>>> = Arc::new(Mutex::new(None));
        let b_started = Arc::new(AtomicBool::new(false));
        let ack_complete = || {
            vec![
                Response::Ack { socket: 1 }.encode(1),
                Response::Completion { socket: 1 }.encode(1),
            ]
        };
        let wait_for = |what: &str, f: &dyn Fn() -> bool| {
            let deadline = Instant::now() + Duration::from_secs(2);
            while !f() {
                assert!(Instant::now() < deadline, "timed out waiting for {}", what);
                thread::sleep(Duration::from_millis(1));
            }
        };

        // A cancels the job on its second recall, once B is mid-scene.
        let recall_two = command::memory_recall(2).body().to_vec();
        let (slot, started) = (Arc::clone(&root_slot), Arc::clone(&b_started));
        let (a, _) = camera_with(
            "a",
            ScriptedTransport::new(move |frame| {
                let body = decode_command(frame).map(|(_, b)| b.to_vec()).unwrap_or_default();
                if body == recall_two {
                    wait_for("b to start", &|| started.load(Ordering::SeqCst));
                    if let Some(root) = slot.lock().unwrap().as_ref() {
                        root.cancel();
                    }
                }
                ack_complete()
            }),
        );
        // B's first scene finishes only after the cancel.
        let (slot, started) = (Arc::clone(&root_slot), Arc::clone(&b_started));
        let (b, b_script) = camera_with(
            "b",
            ScriptedTransport::new(move |_| {
                started.store(true, Ordering::SeqCst);
                wait_for("cancel", &|| {
                    slot.lock()
                        .unwrap()
                        .as_ref()
                        .map_or(false, |root| root.is_cancelled())
                });
                ack_complete()
            }),
        );

        let job = BackupRestoreJob::new(
            JobConfig::restore(SceneRange::contiguous("", 1, 5)),
            vec![a, b],
        )
        .unwrap();
        *root_slot.lock().unwrap() = Some(job.progress());
        let a_progress = job.camera_progress("a").unwrap();
        let b_progress = job.camera_progress("b").unwrap();

        let report = job.start().wait();

        assert_eq!(counts(&a_progress), (2, 5, true, true));
        assert_eq!(counts(&b_progress), (1, 5, true, true));
        assert!(report.failures.is_empty());
        assert!(report.cancelled);
        assert_eq!(b_script.writes(), vec![command::memory_recall(1).encode(1).unwrap()]);
    }

    #[test]
    fn test_cancel_before_start_skips_everything() {
        let (a, _, script) = virtual_camera("a");
        let job = BackupRestoreJob::new(JobConfig::backup(SceneRange::contiguous("", 1, 3)), vec![a])
            .unwrap();
        let root = job.progress();
        assert!(root.cancel());
        let report = job.run();
        assert!(report.cancelled);
        assert!(report.captures.is_empty());
        assert!(root.is_finished());
        assert!(script.writes().is_empty());
    }

    #[test]
    fn test_backup_continues_past_failures() {
        let cam = Arc::new(Mutex::new(VirtualCamera::new(DialectKind::PtzOptics)));
        seed_scenes(&cam, &[1, 2, 3]);
        let recall_two = command::memory_recall(2).encode(1).unwrap();
        let inner = Arc::clone(&cam);
        let (camera, _) = camera_with(
            "stage",
            ScriptedTransport::new(move |frame| {
                if frame == recall_two.as_slice() {
                    return vec![
                        Response::Ack { socket: 1 }.encode(1),
                        Response::Error {
                            socket: 1,
                            error: DeviceError::NotExecutable,
                        }
                        .encode(1),
                    ];
                }
                inner.lock().unwrap().handle(frame)
            }),
        );

        let job = BackupRestoreJob::new(
            JobConfig::backup(SceneRange::contiguous("", 1, 3)),
            vec![Arc::clone(&camera)],
        )
        .unwrap();
        let root = job.progress();
        let report = job.run();

        assert_eq!(
            report.failures,
            vec![SceneFailure {
                camera: "stage".into(),
                scene: 2,
                error: Error::Device(DeviceError::NotExecutable),
            }]
        );
        let captured: Vec<(u8, i32, i32)> = report
            .captures
            .iter()
            .map(|c| (c.scene, c.pan, c.zoom))
            .collect();
        assert_eq!(captured, vec![(1, 100, 1), (3, 300, 3)]);
        assert_eq!(counts(&root), (3, 3, true, false));
        assert!(!report.is_ok());
    }

    #[test]
    fn test_backup_with_offset_copies_scenes() {
        let (camera, cam, _) = virtual_camera("stage");
        seed_scenes(&cam, &[1, 2]);
        let report = BackupRestoreJob::new(
            JobConfig::backup(SceneRange::contiguous("", 1, 2)).with_offset(10),
            vec![camera],
        )
        .unwrap()
        .run();
        assert!(report.is_ok());
        assert_eq!(cam.lock().unwrap().stored_scenes(), vec![1, 2, 11, 12]);
    }

    #[test]
    fn test_restore_with_offset_recalls_then_stores() {
        let (camera, _, script) = virtual_camera("stage");
        let report = BackupRestoreJob::new(
            JobConfig::restore(SceneRange::new("", [4])).with_offset(20),
            vec![camera],
        )
        .unwrap()
        .run();
        assert!(report.is_ok());
        assert_eq!(
            script.writes(),
            vec![
                command::memory_recall(24).encode(1).unwrap(),
                command::memory_set(4).encode(1).unwrap(),
            ]
        );
    }

    #[test]
    fn test_rejects_offset_outside_scene_range() {
        for offset in [-5, 0, 255] {
            let (camera, _, script) = virtual_camera("stage");
            let err = BackupRestoreJob::new(
                JobConfig::backup(SceneRange::contiguous("", 1, 3)).with_offset(offset),
                vec![camera],
            )
            .unwrap_err();
            assert!(matches!(err, Error::InvalidArgument(_)), "{}: {:?}", offset, err);
            assert!(script.writes().is_empty());
        }
    }

    #[test]
    fn test_reserved_scenes_are_not_counted() {
        let (a, _, _) = virtual_camera("a");
        let (b, _, _) = virtual_camera("b");
        let job = BackupRestoreJob::new(
            JobConfig::restore(SceneRange::contiguous("", 88, 91))
                .with_step_delay(Duration::from_millis(1)),
            vec![a, b],
        )
        .unwrap();
        let root = job.progress();
        assert_eq!(root.total_units(), 4);
        let report = job.start().wait();
        assert!(report.is_ok());
        assert_eq!(counts(&root), (4, 4, true, false));
    }

    #[test]
    fn test_rejects_empty_plans() {
        let (a, _, _) = virtual_camera("a");
        assert!(BackupRestoreJob::new(JobConfig::restore(SceneRange::default()), vec![]).is_err());
        assert!(BackupRestoreJob::new(
            JobConfig::restore(SceneRange::contiguous("", 1, 2)).with_max_concurrent_cameras(0),
            vec![a],
        )
        .is_err());
    }
}
