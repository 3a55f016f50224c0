//! One object per camera.
//!
//! [`Camera`] ties a [`CameraConfig`] to its command engine and property
//! cache, and adds the direct controls, scene memory, snapshots and events
//! the UI and orchestration layers use.

use log::{debug, info, warn};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};

use crate::cache::{BatchReport, Cached, PropertyCache};
use crate::engine::{CameraEngine, Completion, EngineConfig, StateObserver};
use crate::error::{Error, Result};
use crate::events::{CameraEvent, EventHub, SnapshotSource, SwitcherEvent};
use crate::prefs::{camera_key, PrefStore};
use crate::protocol::{command, Command, Dialect, DialectKind, DEFAULT_ADDRESS};
use crate::transport::{self, Transport};
use crate::types::{
    Capabilities, ConnectionState, Endpoint, PanTiltDrive, Property, PropertyGroup, QueueState,
};

// =============================================================================
// Configuration
// =============================================================================

/// Identity of one camera. Changing it means building a new [`Camera`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CameraConfig {
    /// Display name, also the preference namespace.
    pub name: String,
    pub endpoint: Endpoint,
    pub dialect: DialectKind,
    /// VISCA device address, 1-7.
    pub address: u8,
    /// Name of this camera's source in the production switcher. Defaults to
    /// the camera name.
    pub source_name: Option<String>,
    pub engine: EngineConfig,
}

impl CameraConfig {
    pub fn new(name: impl Into<String>, endpoint: Endpoint) -> Self {
        Self {
            name: name.into(),
            endpoint,
            dialect: DialectKind::default(),
            address: DEFAULT_ADDRESS,
            source_name: None,
            engine: EngineConfig::default(),
        }
    }

    /// Parse `devicename` the way it is stored in preferences, using the
    /// dialect's default port for a bare host.
    pub fn from_devicename(
        name: impl Into<String>,
        devicename: &str,
        dialect: DialectKind,
    ) -> Result<Self> {
        let endpoint = Endpoint::parse(devicename, dialect.dialect().default_port)?;
        Ok(Self::new(name, endpoint).with_dialect(dialect))
    }

    pub fn with_dialect(mut self, dialect: DialectKind) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn with_address(mut self, address: u8) -> Self {
        self.address = address;
        self
    }

    pub fn with_source_name(mut self, source: impl Into<String>) -> Self {
        self.source_name = Some(source.into());
        self
    }

    pub fn with_engine_config(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }

    pub fn source_name(&self) -> &str {
        self.source_name.as_deref().unwrap_or(&self.name)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::invalid_argument("camera name is empty"));
        }
        if !(1..=7).contains(&self.address) {
            return Err(Error::invalid_argument(format!(
                "VISCA address {} outside 1-7",
                self.address
            )));
        }
        Ok(())
    }

    /// Read `camera.<name>.*`. The device name is required.
    pub fn load(store: &dyn PrefStore, name: &str) -> Result<Self> {
        let devicename = store
            .get(&camera_key(name, "devicename"))
            .ok_or_else(|| Error::invalid_argument(format!("no device name saved for {}", name)))?;
        let dialect = match store.get(&camera_key(name, "dialect")) {
            Some(key) => DialectKind::from_key(&key).unwrap_or_else(|| {
                warn!("{}: unknown dialect '{}', using default", name, key);
                DialectKind::default()
            }),
            None => DialectKind::default(),
        };
        let mut config = Self::from_devicename(name, &devicename, dialect)?;
        if let Some(address) = store.get_i32(&camera_key(name, "address")) {
            config.address = u8::try_from(address)
                .map_err(|_| Error::invalid_argument(format!("bad address {}", address)))?;
        }
        config.source_name = store.get(&camera_key(name, "sourceName"));
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, store: &dyn PrefStore) {
        store.set(&camera_key(&self.name, "devicename"), &self.endpoint.devicename());
        store.set(&camera_key(&self.name, "dialect"), self.dialect.key());
        store.set_i32(&camera_key(&self.name, "address"), self.address as i32);
        match &self.source_name {
            Some(source) => store.set(&camera_key(&self.name, "sourceName"), source),
            None => store.remove(&camera_key(&self.name, "sourceName")),
        }
    }
}

// =============================================================================
// Camera
// =============================================================================

pub struct Camera {
    config: CameraConfig,
    dialect: &'static Dialect,
    engine: Arc<CameraEngine>,
    cache: Arc<PropertyCache>,
    events: EventHub,
    snapshot_source: Option<Arc<dyn SnapshotSource>>,
    /// Keyed by scene; `None` is the live view.
    snapshots: Mutex<BTreeMap<Option<u8>, Vec<u8>>>,
}

impl Camera {
    /// Build the transport for the configured endpoint and start the engine.
    /// Nothing is connected until the first command or [`Camera::open`].
    pub fn new(config: CameraConfig, events: EventHub) -> Result<Self> {
        config.validate()?;
        let transport = transport::for_endpoint(&config.endpoint, config.engine.connect_timeout)?;
        Self::with_transport(config, transport, events)
    }

    pub fn with_transport(
        config: CameraConfig,
        transport: Box<dyn Transport>,
        events: EventHub,
    ) -> Result<Self> {
        config.validate()?;
        let dialect = config.dialect.dialect();

        let observer: StateObserver = {
            let events = events.clone();
            let camera = config.name.clone();
            Box::new(move |state| {
                events.publish(CameraEvent::ConnectionStateChanged {
                    camera: camera.clone(),
                    state,
                })
            })
        };
        let engine = Arc::new(CameraEngine::with_observer(
            config.name.clone(),
            config.address,
            transport,
            config.engine,
            Some(observer),
        ));
        let cache = Arc::new(PropertyCache::new(Arc::clone(&engine), dialect));
        info!("{}: {} camera at {}", config.name, dialect.name, config.endpoint);

        Ok(Self {
            config,
            dialect,
            engine,
            cache,
            events,
            snapshot_source: None,
            snapshots: Mutex::new(BTreeMap::new()),
        })
    }

    pub fn with_snapshot_source(mut self, source: Arc<dyn SnapshotSource>) -> Self {
        self.snapshot_source = Some(source);
        self
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &CameraConfig {
        &self.config
    }

    pub fn dialect(&self) -> &'static Dialect {
        self.dialect
    }

    pub fn engine(&self) -> &CameraEngine {
        &self.engine
    }

    pub fn cache(&self) -> &PropertyCache {
        &self.cache
    }

    pub fn events(&self) -> &EventHub {
        &self.events
    }

    pub fn subscribe(&self) -> Receiver<CameraEvent> {
        self.events.subscribe()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.engine.connection_state()
    }

    pub fn queue_state(&self) -> QueueState {
        self.engine.queue_state()
    }

    // -------------------------------------------------------------------------
    // Connection
    // -------------------------------------------------------------------------

    /// Open (or reopen) the connection. Cached values become stale.
    pub fn open(&self) -> Completion<()> {
        self.cache.invalidate();
        self.engine.open()
    }

    pub fn close(&self) -> Completion<()> {
        self.engine.close()
    }

    /// Close, then reopen with nothing trusted from before.
    pub fn close_and_reload(&self) -> Completion<()> {
        self.cache.invalidate();
        self.lock_snapshots().clear();
        // Ordered behind the close by the engine queue.
        drop(self.engine.close());
        self.engine.open()
    }

    /// Abort the in-flight command and drop queued ones.
    pub fn cancel_command(&self) -> bool {
        self.engine.cancel_command()
    }

    // -------------------------------------------------------------------------
    // Properties
    // -------------------------------------------------------------------------

    /// Run a cache operation and announce every value it confirmed.
    fn observe<T>(&self, op: impl FnOnce(&PropertyCache) -> T) -> T {
        let before = self.cache.snapshot();
        let result = op(&self.cache);
        for (property, value) in self.cache.snapshot() {
            if before.get(&property) != Some(&value) {
                self.events.publish(CameraEvent::PropertyChanged {
                    camera: self.config.name.clone(),
                    property,
                    value,
                });
            }
        }
        result
    }

    pub fn fetch(&self, property: Property, force_refresh: bool) -> Result<i32> {
        self.observe(|cache| cache.fetch(property, force_refresh))
    }

    pub fn apply(&self, property: Property, value: i32) -> Result<()> {
        self.observe(|cache| cache.apply(property, value))
    }

    /// Move to an absolute position at full speed.
    pub fn pantilt_absolute(&self, pan: i32, tilt: i32) -> Result<()> {
        self.observe(|cache| cache.apply_pantilt(pan, tilt))
    }

    pub fn cached(&self, property: Property) -> Option<Cached> {
        self.cache.peek(property)
    }

    /// Limit non-`fetch_all` batches to `selection`.
    pub fn set_selection(&self, selection: Capabilities) {
        self.cache.set_selection(selection);
    }

    pub fn update_camera_state(&self) -> BatchReport {
        self.observe(|cache| cache.update_camera_state())
    }

    pub fn update_autofocus_state(&self) -> BatchReport {
        self.observe(|cache| cache.update_autofocus_state())
    }

    pub fn update_wb_mode_values(&self, fetch_all: bool) -> BatchReport {
        self.observe(|cache| cache.update_wb_mode_values(fetch_all))
    }

    pub fn update_exposure_mode_values(&self, fetch_all: bool) -> BatchReport {
        self.observe(|cache| cache.update_exposure_mode_values(fetch_all))
    }

    pub fn update_image_camera_values(&self, fetch_all: bool) -> BatchReport {
        self.observe(|cache| cache.update_image_camera_values(fetch_all))
    }

    pub fn apply_wb_mode_values(&self) -> BatchReport {
        self.observe(|cache| cache.apply_wb_mode_values())
    }

    pub fn apply_exposure_mode_values(&self) -> BatchReport {
        self.observe(|cache| cache.apply_exposure_mode_values())
    }

    pub fn apply_image_camera_values(&self) -> BatchReport {
        self.observe(|cache| cache.apply_image_camera_values())
    }

    pub fn save_local_prefs(&self, store: &dyn PrefStore) -> usize {
        self.cache.save_local_prefs(store, &self.config.name)
    }

    pub fn load_local_prefs(&self, store: &dyn PrefStore) -> usize {
        self.cache.load_local_prefs(store, &self.config.name)
    }

    // -------------------------------------------------------------------------
    // Scenes
    // -------------------------------------------------------------------------

    /// Move to the pose stored in `scene`.
    pub fn memory_recall(&self, scene: i32) -> Completion<()> {
        match self.dialect.memory_recall(scene) {
            Ok(command) => {
                let events = self.events.clone();
                let cache = Arc::clone(&self.cache);
                let camera = self.config.name.clone();
                self.engine
                    .submit_then(command, move || {
                        cache.invalidate_group(PropertyGroup::Position);
                        events.publish(CameraEvent::SceneRecalled {
                            camera,
                            scene: scene as u8,
                        });
                    })
                    .map(|_| Ok(()))
            }
            Err(e) => Completion::ready(Err(e)),
        }
    }

    /// Store the current pose in `scene`.
    pub fn memory_set(&self, scene: i32) -> Completion<()> {
        match self.dialect.memory_set(scene) {
            Ok(command) => {
                let events = self.events.clone();
                let camera = self.config.name.clone();
                self.engine
                    .submit_then(command, move || {
                        events.publish(CameraEvent::SceneStored {
                            camera,
                            scene: scene as u8,
                        });
                    })
                    .map(|_| Ok(()))
            }
            Err(e) => Completion::ready(Err(e)),
        }
    }

    pub fn memory_reset(&self, scene: i32) -> Completion<()> {
        match self.dialect.memory_reset(scene) {
            Ok(command) => self.control(command, false),
            Err(e) => Completion::ready(Err(e)),
        }
    }

    /// User-visible scene name, `Scene N` when none is saved.
    pub fn scene_name(&self, store: &dyn PrefStore, scene: u8) -> String {
        store
            .get(&camera_key(&self.config.name, &format!("sceneName.{}", scene)))
            .unwrap_or_else(|| format!("Scene {}", scene))
    }

    pub fn set_scene_name(&self, store: &dyn PrefStore, scene: u8, name: &str) {
        let key = camera_key(&self.config.name, &format!("sceneName.{}", scene));
        if name.is_empty() {
            store.remove(&key);
        } else {
            store.set(&key, name);
        }
    }

    // -------------------------------------------------------------------------
    // Direct controls
    // -------------------------------------------------------------------------

    fn control(&self, command: Command, moves: bool) -> Completion<()> {
        let submitted = if moves {
            let cache = Arc::clone(&self.cache);
            self.engine.submit_then(command, move || {
                cache.invalidate_group(PropertyGroup::Position)
            })
        } else {
            self.engine.submit(command)
        };
        submitted.map(|_| Ok(()))
    }

    pub fn pantilt_drive(&self, drive: PanTiltDrive) -> Completion<()> {
        self.control(self.dialect.pantilt_drive(drive), true)
    }

    pub fn pantilt_stop(&self) -> Completion<()> {
        self.pantilt_drive(PanTiltDrive::stop())
    }

    pub fn pantilt_home(&self) -> Completion<()> {
        self.control(command::pantilt_home(), true)
    }

    pub fn pantilt_reset(&self) -> Completion<()> {
        self.control(command::pantilt_reset(), true)
    }

    /// Zoom in, at `speed` (0 slowest) or the camera's standard speed.
    pub fn zoom_in(&self, speed: Option<u8>) -> Completion<()> {
        let command = match speed {
            Some(s) => command::zoom_tele_speed(s.min(self.dialect.max_drive_speed)),
            None => command::zoom_tele(),
        };
        self.control(command, true)
    }

    pub fn zoom_out(&self, speed: Option<u8>) -> Completion<()> {
        let command = match speed {
            Some(s) => command::zoom_wide_speed(s.min(self.dialect.max_drive_speed)),
            None => command::zoom_wide(),
        };
        self.control(command, true)
    }

    pub fn zoom_stop(&self) -> Completion<()> {
        self.control(command::zoom_stop(), true)
    }

    pub fn focus_far(&self, speed: Option<u8>) -> Completion<()> {
        let command = match speed {
            Some(s) => command::focus_far_speed(s.min(self.dialect.max_drive_speed)),
            None => command::focus_far(),
        };
        self.control(command, true)
    }

    pub fn focus_near(&self, speed: Option<u8>) -> Completion<()> {
        let command = match speed {
            Some(s) => command::focus_near_speed(s.min(self.dialect.max_drive_speed)),
            None => command::focus_near(),
        };
        self.control(command, true)
    }

    pub fn focus_stop(&self) -> Completion<()> {
        self.control(command::focus_stop(), true)
    }

    /// Speed used by later scene recalls.
    pub fn set_preset_speed(&self, speed: u8) -> Completion<()> {
        self.control(self.dialect.preset_speed(speed), false)
    }

    pub fn osd_menu_toggle(&self) -> Completion<()> {
        self.control(command::osd_menu_toggle(), false)
    }

    pub fn osd_menu_close(&self) -> Completion<()> {
        self.control(command::osd_menu_close(), false)
    }

    pub fn osd_menu_enter(&self) -> Completion<()> {
        self.control(command::osd_menu_enter(), false)
    }

    pub fn osd_menu_return(&self) -> Completion<()> {
        self.control(command::osd_menu_return(), false)
    }

    // -------------------------------------------------------------------------
    // Snapshots and switcher
    // -------------------------------------------------------------------------

    fn lock_snapshots(&self) -> std::sync::MutexGuard<'_, BTreeMap<Option<u8>, Vec<u8>>> {
        self.snapshots.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn has_snapshot_source(&self) -> bool {
        self.snapshot_source.is_some()
    }

    /// Grab an image of what the camera sees now and cache it under `scene`.
    pub fn fetch_snapshot(&self, scene: Option<u8>) -> Result<Vec<u8>> {
        let source = self.snapshot_source.as_ref().ok_or_else(|| {
            Error::invalid_argument(format!("{} has no snapshot source", self.config.name))
        })?;
        let image = source.fetch_snapshot(&self.config.name, &self.config.endpoint)?;
        debug!(
            "{}: snapshot for {:?} ({} bytes)",
            self.config.name,
            scene,
            image.len()
        );
        self.lock_snapshots().insert(scene, image.clone());
        self.events.publish(CameraEvent::SnapshotUpdated {
            camera: self.config.name.clone(),
            scene,
        });
        Ok(image)
    }

    /// The cached image for `scene`, if any.
    pub fn snapshot(&self, scene: Option<u8>) -> Option<Vec<u8>> {
        self.lock_snapshots().get(&scene).cloned()
    }

    /// React to a switcher notification. Returns whether it concerned this
    /// camera and a snapshot was taken.
    pub fn handle_switcher_event(&self, event: &SwitcherEvent) -> Result<bool> {
        if event.source() != self.config.source_name() {
            return Ok(false);
        }
        if self.snapshot_source.is_none() {
            debug!("{}: ignoring {:?}, no snapshot source", self.config.name, event);
            return Ok(false);
        }
        self.fetch_snapshot(None)?;
        Ok(true)
    }
}

impl fmt::Debug for Camera {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Camera")
            .field("config", &self.config)
            .field("connection", &self.engine.connection_state())
            .field("snapshot_source", &self.snapshot_source.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefs::MemoryPrefStore;
    use crate::protocol::Response;
    use crate::transport::mock::{ScriptHandle, ScriptedTransport, VirtualCamera};
    use crate::types::Freshness;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    const WAIT: Duration = Duration::from_secs(2);

    fn wait_until(what: &str, f: impl Fn() -> bool) {
        let deadline = Instant::now() + WAIT;
        while !f() {
            assert!(Instant::now() < deadline, "timed out waiting for {}", what);
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    fn stage_config() -> CameraConfig {
        CameraConfig::from_devicename("stage", "192.0.2.10:5678", DialectKind::PtzOptics)
            .unwrap()
            .with_engine_config(
                EngineConfig::default()
                    .with_ack_timeout(Duration::from_millis(200))
                    .with_poll_interval(Duration::from_millis(5)),
            )
    }

    fn virtual_camera(kind: DialectKind) -> (Camera, Arc<Mutex<VirtualCamera>>, ScriptHandle) {
        let cam = Arc::new(Mutex::new(VirtualCamera::new(kind)));
        let transport = ScriptedTransport::camera(Arc::clone(&cam));
        let handle = transport.handle();
        let config = stage_config().with_dialect(kind);
        let camera = Camera::with_transport(config, Box::new(transport), EventHub::new()).unwrap();
        (camera, cam, handle)
    }

    struct FixedImage {
        calls: AtomicUsize,
    }

    impl SnapshotSource for FixedImage {
        fn fetch_snapshot(&self, camera: &str, endpoint: &Endpoint) -> Result<Vec<u8>> {
            assert_eq!(camera, "stage");
            assert_eq!(endpoint, &Endpoint::tcp("192.0.2.10", 5678));
            let n = self.calls.fetch_add(1, Ordering::SeqCst) as u8;
            Ok(vec![0xFF, 0xD8, n])
        }
    }

    #[test]
    fn test_memory_set_resolves_once() {
        let transport = ScriptedTransport::new(|_| {
            vec![
                Response::Ack { socket: 1 }.encode(1),
                Response::Completion { socket: 1 }.encode(1),
            ]
        });
        let handle = transport.handle();
        let camera = Camera::with_transport(stage_config(), Box::new(transport), EventHub::new())
            .unwrap();
        let events = camera.subscribe();
        assert_eq!(camera.config().endpoint, Endpoint::tcp("192.0.2.10", 5678));

        let mut done = camera.memory_set(3);
        assert_eq!(done.wait_timeout(WAIT), Some(Ok(())));
        assert_eq!(done.try_result(), None);
        wait_until("idle", || camera.queue_state() == QueueState::Idle);

        assert_eq!(handle.writes(), vec![vec![0x81, 0x01, 0x04, 0x3F, 0x01, 0x03, 0xFF]]);
        let received: Vec<CameraEvent> = events.try_iter().collect();
        assert!(received.contains(&CameraEvent::SceneStored {
            camera: "stage".into(),
            scene: 3
        }));
        assert!(received.contains(&CameraEvent::ConnectionStateChanged {
            camera: "stage".into(),
            state: ConnectionState::Open
        }));
    }

    #[test]
    fn test_invalid_scene_never_reaches_camera() {
        let (camera, _, handle) = virtual_camera(DialectKind::PtzOptics);
        assert!(matches!(
            camera.memory_recall(95).wait(),
            Err(Error::InvalidArgument(_))
        ));
        assert!(camera.memory_set(255).wait().is_err());
        assert!(handle.writes().is_empty());
    }

    #[test]
    fn test_recall_restores_pose_and_invalidates_position() {
        let (camera, _, _) = virtual_camera(DialectKind::PtzOptics);
        camera.pantilt_absolute(100, -50).unwrap();
        camera.apply(Property::Zoom, 0x1000).unwrap();
        camera.memory_set(4).wait().unwrap();

        camera.pantilt_absolute(-20, 30).unwrap();
        camera.memory_recall(4).wait().unwrap();
        assert_eq!(
            camera.cached(Property::Pan).map(|c| c.freshness),
            Some(Freshness::Stale)
        );
        assert_eq!(camera.fetch(Property::Pan, false).unwrap(), 100);
        assert_eq!(camera.fetch(Property::Tilt, false).unwrap(), -50);
        assert_eq!(camera.fetch(Property::Zoom, false).unwrap(), 0x1000);
    }

    #[test]
    fn test_dropped_recall_still_invalidates_position() {
        let (camera, cam, _) = virtual_camera(DialectKind::PtzOptics);
        camera.pantilt_absolute(100, -50).unwrap();
        camera.memory_set(4).wait().unwrap();
        camera.pantilt_absolute(-20, 30).unwrap();
        let events = camera.subscribe();

        drop(camera.memory_recall(4));
        // Queued behind the recall, so the recall has completed by now.
        camera.set_preset_speed(5).wait().unwrap();

        assert_eq!(cam.lock().unwrap().value(Property::Pan), Some(100));
        assert_eq!(
            camera.cached(Property::Pan).map(|c| c.freshness),
            Some(Freshness::Stale)
        );
        assert_eq!(camera.fetch(Property::Pan, false).unwrap(), 100);
        assert!(events.try_iter().any(|e| e
            == CameraEvent::SceneRecalled {
                camera: "stage".into(),
                scene: 4
            }));
    }

    #[test]
    fn test_dropped_zoom_invalidates_zoom() {
        let (camera, _, _) = virtual_camera(DialectKind::PtzOptics);
        camera.apply(Property::Zoom, 0x1000).unwrap();
        drop(camera.zoom_in(None));
        camera.zoom_stop().wait().unwrap();
        assert_eq!(
            camera.cached(Property::Zoom).map(|c| c.freshness),
            Some(Freshness::Stale)
        );
    }

    #[test]
    fn test_property_changes_are_published() {
        let (camera, cam, _) = virtual_camera(DialectKind::PtzOptics);
        cam.lock().unwrap().set_value(Property::Bright, 9);
        let events = camera.subscribe();

        assert_eq!(camera.fetch(Property::Bright, false).unwrap(), 9);
        // Cached: no second event.
        assert_eq!(camera.fetch(Property::Bright, false).unwrap(), 9);
        camera.apply(Property::Bright, 11).unwrap();

        let changes: Vec<(Property, i32)> = events
            .try_iter()
            .filter_map(|e| match e {
                CameraEvent::PropertyChanged { property, value, .. } => Some((property, value)),
                _ => None,
            })
            .collect();
        assert_eq!(changes, vec![(Property::Bright, 9), (Property::Bright, 11)]);
    }

    #[test]
    fn test_drive_speeds_are_clamped() {
        let (camera, _, handle) = virtual_camera(DialectKind::Sony);
        camera.zoom_in(Some(12)).wait().unwrap();
        camera.set_preset_speed(0x7F).wait().unwrap();
        let writes = handle.writes();
        assert_eq!(writes[0], vec![0x81, 0x01, 0x04, 0x07, 0x27, 0xFF]);
        assert_eq!(writes[1], vec![0x81, 0x01, 0x7E, 0x01, 0x0B, 0x18, 0xFF]);
    }

    #[test]
    fn test_switcher_event_takes_snapshot() {
        let (camera, _, _) = virtual_camera(DialectKind::PtzOptics);
        let camera = camera.with_snapshot_source(Arc::new(FixedImage {
            calls: AtomicUsize::new(0),
        }));
        let events = camera.subscribe();

        let other = SwitcherEvent::ProgramSceneChanged {
            source: "lobby".into(),
        };
        assert!(!camera.handle_switcher_event(&other).unwrap());
        let ours = SwitcherEvent::PreviewSceneChanged {
            source: "stage".into(),
        };
        assert!(camera.handle_switcher_event(&ours).unwrap());
        assert_eq!(camera.snapshot(None), Some(vec![0xFF, 0xD8, 0]));
        assert_eq!(
            events.try_recv().unwrap(),
            CameraEvent::SnapshotUpdated {
                camera: "stage".into(),
                scene: None
            }
        );

        camera.fetch_snapshot(Some(7)).unwrap();
        assert_eq!(camera.snapshot(Some(7)), Some(vec![0xFF, 0xD8, 1]));
        camera.close_and_reload().wait().unwrap();
        assert_eq!(camera.snapshot(Some(7)), None);
    }

    #[test]
    fn test_config_round_trips_through_prefs() {
        let store = MemoryPrefStore::new();
        let config = CameraConfig::from_devicename("pulpit", "10.0.0.7", DialectKind::Sony)
            .unwrap()
            .with_address(2)
            .with_source_name("Pulpit Cam");
        assert_eq!(config.endpoint, Endpoint::tcp("10.0.0.7", 52381));
        config.save(&store);
        assert_eq!(store.get("camera.pulpit.devicename").as_deref(), Some("10.0.0.7:52381"));

        let loaded = CameraConfig::load(&store, "pulpit").unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.source_name(), "Pulpit Cam");

        assert!(CameraConfig::load(&store, "missing").is_err());
        store.set_i32("camera.pulpit.address", 9);
        assert!(CameraConfig::load(&store, "pulpit").is_err());
    }

    #[test]
    fn test_scene_names_default_and_persist() {
        let (camera, _, _) = virtual_camera(DialectKind::PtzOptics);
        let store = MemoryPrefStore::new();
        assert_eq!(camera.scene_name(&store, 5), "Scene 5");
        camera.set_scene_name(&store, 5, "Choir");
        assert_eq!(camera.scene_name(&store, 5), "Choir");
        camera.set_scene_name(&store, 5, "");
        assert_eq!(camera.scene_name(&store, 5), "Scene 5");
    }
}
