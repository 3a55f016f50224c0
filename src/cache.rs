//! Last-known camera property values.
//!
//! Reads go to the camera only when the cached value is not fresh or the
//! caller forces a refresh. Writes are optimistic: the new value is cached
//! as [`Freshness::Pending`] while the set command runs and rolled back to
//! exactly the previous entry if it fails.
//!
//! Properties the dialect does not support are filtered out before any
//! command is built, so they never reach the camera.

use log::{debug, warn};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::engine::CameraEngine;
use crate::error::{Error, Result};
use crate::prefs::{camera_key, PrefStore};
use crate::protocol::{Command, Dialect};
use crate::types::{Capabilities, Freshness, Property, PropertyGroup};

/// A cached value and how far it can be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cached {
    pub value: i32,
    pub freshness: Freshness,
}

impl Cached {
    fn fresh(value: i32) -> Self {
        Self {
            value,
            freshness: Freshness::Fresh,
        }
    }
}

/// Outcome of a batch fetch or apply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Properties fetched or applied successfully.
    pub done: Vec<Property>,
    pub failures: Vec<(Property, Error)>,
}

impl BatchReport {
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }

    /// The first failure, if any.
    pub fn into_result(self) -> Result<Vec<Property>> {
        match self.failures.into_iter().next() {
            Some((_, e)) => Err(e),
            None => Ok(self.done),
        }
    }
}

/// Groups whose values are kept as local presets.
const PRESET_GROUPS: [PropertyGroup; 3] = [
    PropertyGroup::WhiteBalance,
    PropertyGroup::Exposure,
    PropertyGroup::Image,
];

pub struct PropertyCache {
    engine: Arc<CameraEngine>,
    dialect: &'static Dialect,
    entries: Mutex<BTreeMap<Property, Cached>>,
    selection: Mutex<Capabilities>,
}

impl PropertyCache {
    pub fn new(engine: Arc<CameraEngine>, dialect: &'static Dialect) -> Self {
        Self {
            engine,
            dialect,
            entries: Mutex::new(BTreeMap::new()),
            selection: Mutex::new(Capabilities::all()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, BTreeMap<Property, Cached>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn dialect(&self) -> &'static Dialect {
        self.dialect
    }

    /// Restrict batch operations that are not `fetch_all` to these properties.
    pub fn set_selection(&self, selection: Capabilities) {
        *self.selection.lock().unwrap_or_else(|e| e.into_inner()) = selection;
    }

    pub fn selection(&self) -> Capabilities {
        *self.selection.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The raw entry, whatever its freshness.
    pub fn peek(&self, property: Property) -> Option<Cached> {
        self.entries().get(&property).copied()
    }

    /// The value only if it is fresh.
    pub fn cached(&self, property: Property) -> Option<i32> {
        self.peek(property)
            .filter(|c| c.freshness == Freshness::Fresh)
            .map(|c| c.value)
    }

    /// Every fresh value.
    pub fn snapshot(&self) -> BTreeMap<Property, i32> {
        self.entries()
            .iter()
            .filter(|(_, c)| c.freshness == Freshness::Fresh)
            .map(|(p, c)| (*p, c.value))
            .collect()
    }

    /// Mark every entry stale, keeping the values.
    pub fn invalidate(&self) {
        for cached in self.entries().values_mut() {
            cached.freshness = Freshness::Stale;
        }
    }

    /// Mark one group stale, e.g. the position after a recall moved the head.
    pub fn invalidate_group(&self, group: PropertyGroup) {
        let mut entries = self.entries();
        for property in group.properties() {
            if let Some(cached) = entries.get_mut(&property) {
                cached.freshness = Freshness::Stale;
            }
        }
    }

    fn check_supported(&self, property: Property) -> Result<()> {
        if self.dialect.supports(property) {
            Ok(())
        } else {
            Err(Error::CapabilityUnsupported(property))
        }
    }

    // -------------------------------------------------------------------------
    // Fetch / Apply
    // -------------------------------------------------------------------------

    /// Current value of `property`, asking the camera unless a fresh value
    /// is cached and `force_refresh` is false.
    pub fn fetch(&self, property: Property, force_refresh: bool) -> Result<i32> {
        self.check_supported(property)?;
        if !force_refresh {
            if let Some(value) = self.cached(property) {
                return Ok(value);
            }
        }

        let payload = self
            .engine
            .submit(self.dialect.inquiry(property)?)
            .wait()?;

        if matches!(property, Property::Pan | Property::Tilt) {
            let pan = self.dialect.decode(Property::Pan, &payload)?;
            let tilt = self.dialect.decode(Property::Tilt, &payload)?;
            let mut entries = self.entries();
            entries.insert(Property::Pan, Cached::fresh(pan));
            entries.insert(Property::Tilt, Cached::fresh(tilt));
            return Ok(if property == Property::Pan { pan } else { tilt });
        }

        let value = self.dialect.decode(property, &payload)?;
        debug!("{}: {} = {}", self.engine.name(), property, value);
        self.entries().insert(property, Cached::fresh(value));
        Ok(value)
    }

    /// Set `property` on the camera.
    pub fn apply(&self, property: Property, value: i32) -> Result<()> {
        self.check_supported(property)?;
        match property {
            Property::Pan => {
                let tilt = self.peek(Property::Tilt).map_or(0, |c| c.value);
                self.apply_pantilt(value, tilt)
            }
            Property::Tilt => {
                let pan = self.peek(Property::Pan).map_or(0, |c| c.value);
                self.apply_pantilt(pan, value)
            }
            _ => {
                let command = self.dialect.set(property, value)?;
                self.apply_with_rollback(&[(property, value)], command)
            }
        }
    }

    /// Move to an absolute pan/tilt position at full speed.
    pub fn apply_pantilt(&self, pan: i32, tilt: i32) -> Result<()> {
        let command = self.dialect.pantilt_absolute(
            self.dialect.max_pan_speed,
            self.dialect.max_tilt_speed,
            pan,
            tilt,
        )?;
        self.apply_with_rollback(&[(Property::Pan, pan), (Property::Tilt, tilt)], command)
    }

    fn apply_with_rollback(&self, values: &[(Property, i32)], command: Command) -> Result<()> {
        let previous: Vec<(Property, Option<Cached>)> = {
            let mut entries = self.entries();
            values
                .iter()
                .map(|&(property, value)| {
                    let old = entries.insert(
                        property,
                        Cached {
                            value,
                            freshness: Freshness::Pending,
                        },
                    );
                    (property, old)
                })
                .collect()
        };

        let result = self.engine.submit(command).wait();

        let mut entries = self.entries();
        match result {
            Ok(_) => {
                for &(property, value) in values {
                    entries.insert(property, Cached::fresh(value));
                }
                Ok(())
            }
            Err(e) => {
                for (property, old) in previous {
                    match old {
                        Some(cached) => entries.insert(property, cached),
                        None => entries.remove(&property),
                    };
                }
                warn!("{}: set failed, rolled back: {}", self.engine.name(), e);
                Err(e)
            }
        }
    }

    // -------------------------------------------------------------------------
    // Batches
    // -------------------------------------------------------------------------

    /// The supported, selected members of `group`.
    fn batch(&self, group: PropertyGroup, fetch_all: bool) -> Vec<Property> {
        let supported = self.dialect.capabilities();
        let selection = if fetch_all {
            Capabilities::all()
        } else {
            self.selection()
        };
        group
            .properties()
            .filter(|p| supported.supports(*p) && selection.supports(*p))
            .collect()
    }

    fn fetch_batch(&self, properties: &[Property]) -> BatchReport {
        let mut report = BatchReport::default();
        for &property in properties {
            // Pan and tilt arrive in one reply.
            if property == Property::Tilt && report.done.contains(&Property::Pan) {
                report.done.push(property);
                continue;
            }
            match self.fetch(property, true) {
                Ok(_) => report.done.push(property),
                Err(e) => report.failures.push((property, e)),
            }
        }
        report
    }

    fn apply_batch(&self, properties: &[Property]) -> BatchReport {
        let mut report = BatchReport::default();
        for &property in properties {
            let Some(cached) = self.peek(property) else {
                continue;
            };
            match self.apply(property, cached.value) {
                Ok(()) => report.done.push(property),
                Err(e) => report.failures.push((property, e)),
            }
        }
        report
    }

    pub fn update_wb_mode_values(&self, fetch_all: bool) -> BatchReport {
        self.fetch_batch(&self.batch(PropertyGroup::WhiteBalance, fetch_all))
    }

    pub fn update_exposure_mode_values(&self, fetch_all: bool) -> BatchReport {
        self.fetch_batch(&self.batch(PropertyGroup::Exposure, fetch_all))
    }

    pub fn update_image_camera_values(&self, fetch_all: bool) -> BatchReport {
        self.fetch_batch(&self.batch(PropertyGroup::Image, fetch_all))
    }

    /// Refresh pan, tilt, zoom, focus and autofocus.
    pub fn update_camera_state(&self) -> BatchReport {
        self.fetch_batch(&self.batch(PropertyGroup::Position, true))
    }

    pub fn update_autofocus_state(&self) -> BatchReport {
        self.fetch_batch(&[Property::Autofocus])
    }

    pub fn apply_wb_mode_values(&self) -> BatchReport {
        self.apply_batch(&self.batch(PropertyGroup::WhiteBalance, false))
    }

    pub fn apply_exposure_mode_values(&self) -> BatchReport {
        self.apply_batch(&self.batch(PropertyGroup::Exposure, false))
    }

    pub fn apply_image_camera_values(&self) -> BatchReport {
        self.apply_batch(&self.batch(PropertyGroup::Image, false))
    }

    // -------------------------------------------------------------------------
    // Local presets
    // -------------------------------------------------------------------------

    /// Store cached white balance, exposure and image values under
    /// `camera.<name>.<property>`.
    pub fn save_local_prefs(&self, store: &dyn PrefStore, camera: &str) -> usize {
        let entries = self.entries();
        let mut saved = 0;
        for group in PRESET_GROUPS {
            for property in group.properties() {
                if let Some(cached) = entries.get(&property) {
                    store.set_i32(&camera_key(camera, property.name()), cached.value);
                    saved += 1;
                }
            }
        }
        saved
    }

    /// Load presets saved by [`PropertyCache::save_local_prefs`]. Loaded
    /// values are stale until applied or fetched.
    pub fn load_local_prefs(&self, store: &dyn PrefStore, camera: &str) -> usize {
        let mut entries = self.entries();
        let mut loaded = 0;
        for group in PRESET_GROUPS {
            for property in group.properties() {
                let Some(range) = self.dialect.range(property) else {
                    continue;
                };
                let key = camera_key(camera, property.name());
                match store.get_i32(&key) {
                    Some(value) if range.contains(&value) => {
                        entries.insert(
                            property,
                            Cached {
                                value,
                                freshness: Freshness::Stale,
                            },
                        );
                        loaded += 1;
                    }
                    Some(value) => warn!("ignoring {} = {}: out of range", key, value),
                    None => {}
                }
            }
        }
        loaded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineConfig;
    use crate::error::DeviceError;
    use crate::prefs::MemoryPrefStore;
    use crate::protocol::{DialectKind, Response};
    use crate::transport::mock::{ScriptHandle, ScriptedTransport, VirtualCamera};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::{Duration, Instant};

    struct Rig {
        cache: Arc<PropertyCache>,
        script: ScriptHandle,
        camera: Arc<Mutex<VirtualCamera>>,
        reject: Arc<AtomicBool>,
        hold: Arc<AtomicBool>,
    }

    /// A cache over a virtual camera that can be told to reject sets or to
    /// hold back their completion.
    fn rig(kind: DialectKind) -> Rig {
        let camera = Arc::new(Mutex::new(VirtualCamera::new(kind)));
        let reject = Arc::new(AtomicBool::new(false));
        let hold = Arc::new(AtomicBool::new(false));
        let (cam, rej, hld) = (Arc::clone(&camera), Arc::clone(&reject), Arc::clone(&hold));
        let transport = ScriptedTransport::new(move |frame| {
            let is_set = frame.get(1) == Some(&0x01);
            if is_set && rej.load(Ordering::SeqCst) {
                return vec![
                    Response::Ack { socket: 1 }.encode(1),
                    Response::Error {
                        socket: 1,
                        error: DeviceError::NotExecutable,
                    }
                    .encode(1),
                ];
            }
            let mut replies = cam.lock().unwrap().handle(frame);
            if is_set && hld.load(Ordering::SeqCst) {
                replies.truncate(1);
            }
            replies
        });
        let script = transport.handle();
        let config = EngineConfig::default()
            .with_ack_timeout(Duration::from_millis(200))
            .with_poll_interval(Duration::from_millis(5));
        let engine = Arc::new(CameraEngine::new("cam", 1, Box::new(transport), config));
        Rig {
            cache: Arc::new(PropertyCache::new(engine, kind.dialect())),
            script,
            camera,
            reject,
            hold,
        }
    }

    fn inquiries(script: &ScriptHandle) -> usize {
        script.writes().iter().filter(|f| f[1] == 0x09).count()
    }

    #[test]
    fn test_fetch_uses_fresh_value_unless_forced() {
        let rig = rig(DialectKind::PtzOptics);
        rig.camera.lock().unwrap().set_value(Property::Zoom, 0x0800);

        assert_eq!(rig.cache.cached(Property::Zoom), None);
        assert_eq!(rig.cache.fetch(Property::Zoom, false), Ok(0x0800));
        assert_eq!(rig.cache.fetch(Property::Zoom, false), Ok(0x0800));
        assert_eq!(inquiries(&rig.script), 1);

        rig.camera.lock().unwrap().set_value(Property::Zoom, 0x0900);
        assert_eq!(rig.cache.fetch(Property::Zoom, true), Ok(0x0900));
        assert_eq!(inquiries(&rig.script), 2);
    }

    #[test]
    fn test_pan_and_tilt_refresh_together() {
        let rig = rig(DialectKind::Sony);
        {
            let mut cam = rig.camera.lock().unwrap();
            cam.set_value(Property::Pan, -40000);
            cam.set_value(Property::Tilt, 1200);
        }
        assert_eq!(rig.cache.fetch(Property::Pan, true), Ok(-40000));
        assert_eq!(rig.cache.cached(Property::Tilt), Some(1200));

        let report = rig.cache.update_camera_state();
        assert!(report.is_ok());
        // Pan/tilt, zoom, focus and autofocus.
        assert_eq!(inquiries(&rig.script), 1 + 4);
    }

    #[test]
    fn test_apply_rolls_back_on_failure() {
        let rig = rig(DialectKind::PtzOptics);
        rig.camera.lock().unwrap().set_value(Property::Iris, 5);
        rig.cache.fetch(Property::Iris, false).unwrap();

        rig.reject.store(true, Ordering::SeqCst);
        let err = rig.cache.apply(Property::Iris, 9).unwrap_err();
        assert_eq!(err, Error::Device(DeviceError::NotExecutable));
        assert_eq!(
            rig.cache.peek(Property::Iris),
            Some(Cached {
                value: 5,
                freshness: Freshness::Fresh
            })
        );

        // A property with no previous entry goes back to having none.
        assert!(rig.cache.apply(Property::Gain, 3).is_err());
        assert_eq!(rig.cache.peek(Property::Gain), None);
    }

    #[test]
    fn test_value_is_pending_until_set_completes() {
        let rig = rig(DialectKind::PtzOptics);
        rig.hold.store(true, Ordering::SeqCst);

        let cache = Arc::clone(&rig.cache);
        let apply = thread::spawn(move || cache.apply(Property::Bright, 12));

        let deadline = Instant::now() + Duration::from_secs(2);
        while rig.script.writes().is_empty() {
            assert!(Instant::now() < deadline);
            thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(
            rig.cache.peek(Property::Bright).map(|c| c.freshness),
            Some(Freshness::Pending)
        );
        assert_eq!(rig.cache.cached(Property::Bright), None);
        assert!(rig.cache.snapshot().is_empty());

        rig.script.inject(Response::Completion { socket: 1 }.encode(1));
        assert_eq!(apply.join().unwrap(), Ok(()));
        assert_eq!(rig.cache.cached(Property::Bright), Some(12));
        assert_eq!(rig.camera.lock().unwrap().value(Property::Bright), Some(12));
    }

    #[test]
    fn test_unsupported_property_is_never_sent() {
        let rig = rig(DialectKind::Sony);
        assert_eq!(
            rig.cache.fetch(Property::Flicker, true),
            Err(Error::CapabilityUnsupported(Property::Flicker))
        );
        assert_eq!(
            rig.cache.apply(Property::Luminance, 3),
            Err(Error::CapabilityUnsupported(Property::Luminance))
        );
        assert!(rig.script.writes().is_empty());

        let report = rig.cache.update_exposure_mode_values(true);
        assert!(report.is_ok());
        assert!(!report.done.contains(&Property::Flicker));
        let flicker_inquiry = vec![0x81, 0x09, 0x04, 0x23, 0xFF];
        assert!(!rig.script.writes().contains(&flicker_inquiry));
    }

    #[test]
    fn test_batch_limited_to_selection_unless_fetch_all() {
        let rig = rig(DialectKind::PtzOptics);
        rig.cache.set_selection(Capabilities::IRIS | Capabilities::GAIN);

        let report = rig.cache.update_exposure_mode_values(false);
        assert_eq!(report.done, vec![Property::Iris, Property::Gain]);
        assert_eq!(inquiries(&rig.script), 2);

        let report = rig.cache.update_exposure_mode_values(true);
        assert_eq!(report.done.len(), PropertyGroup::Exposure.properties().count());
    }

    #[test]
    fn test_out_of_range_value_is_rejected_before_sending() {
        let rig = rig(DialectKind::PtzOptics);
        assert!(matches!(
            rig.cache.apply(Property::Saturation, 15),
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(rig.cache.peek(Property::Saturation), None);
        assert!(rig.script.writes().is_empty());
    }

    #[test]
    fn test_local_prefs_load_then_apply() {
        let rig = rig(DialectKind::PtzOptics);
        let store = MemoryPrefStore::new();
        store.set_i32("camera.stage.redGain", 140);
        store.set_i32("camera.stage.hue", 99);

        assert_eq!(rig.cache.load_local_prefs(&store, "stage"), 1);
        assert_eq!(rig.cache.cached(Property::RedGain), None);

        let report = rig.cache.apply_wb_mode_values();
        assert_eq!(report.done, vec![Property::RedGain]);
        assert_eq!(rig.camera.lock().unwrap().value(Property::RedGain), Some(140));
        assert_eq!(rig.cache.cached(Property::RedGain), Some(140));

        let saved = MemoryPrefStore::new();
        assert_eq!(rig.cache.save_local_prefs(&saved, "stage"), 1);
        assert_eq!(saved.get_i32("camera.stage.redGain"), Some(140));
    }

    #[test]
    fn test_invalidate_keeps_values_but_not_freshness() {
        let rig = rig(DialectKind::PtzOptics);
        rig.cache.fetch(Property::Focus, true).unwrap();
        rig.cache.invalidate();
        assert_eq!(rig.cache.cached(Property::Focus), None);
        assert_eq!(
            rig.cache.peek(Property::Focus).map(|c| c.freshness),
            Some(Freshness::Stale)
        );
    }
}
