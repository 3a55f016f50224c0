//! In-memory transport and virtual camera for tests and the simulator.
//!
//! [`ScriptedTransport`] hands every written frame to a responder closure and
//! queues whatever frames it returns for subsequent reads. [`VirtualCamera`]
//! is a responder that behaves like a real camera of a given dialect.

use log::debug;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use super::Transport;
use crate::error::{DeviceError, TransportError};
use crate::protocol::{decode_command, Dialect, DialectKind, Response};
use crate::types::Property;

/// Produces the camera's replies to one written frame.
pub type Responder = Box<dyn FnMut(&[u8]) -> Vec<Vec<u8>> + Send>;

#[derive(Debug, Default)]
struct ScriptState {
    writes: Vec<Vec<u8>>,
    opens: usize,
    closes: usize,
    refuse_open: bool,
    failing_writes: usize,
    injected: VecDeque<Vec<u8>>,
}

/// Shared view of a [`ScriptedTransport`] that stays usable after the
/// transport moves into an engine.
#[derive(Clone, Debug, Default)]
pub struct ScriptHandle {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptHandle {
    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Every frame written so far, in order.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.lock().writes.clone()
    }

    pub fn opens(&self) -> usize {
        self.lock().opens
    }

    pub fn closes(&self) -> usize {
        self.lock().closes
    }

    /// Make subsequent `open` calls fail with a connect error.
    pub fn set_refuse_open(&self, refuse: bool) {
        self.lock().refuse_open = refuse;
    }

    /// Fail the next `count` writes with a write error.
    pub fn fail_next_writes(&self, count: usize) {
        self.lock().failing_writes = count;
    }

    /// Queue a frame the camera sends on its own.
    pub fn inject(&self, frame: Vec<u8>) {
        self.lock().injected.push_back(frame);
    }
}

/// A transport whose peer is a closure.
pub struct ScriptedTransport {
    responder: Responder,
    pending: VecDeque<Vec<u8>>,
    open: bool,
    handle: ScriptHandle,
}

impl ScriptedTransport {
    pub fn new<F>(responder: F) -> Self
    where
        F: FnMut(&[u8]) -> Vec<Vec<u8>> + Send + 'static,
    {
        Self {
            responder: Box::new(responder),
            pending: VecDeque::new(),
            open: false,
            handle: ScriptHandle::default(),
        }
    }

    /// A peer that never answers.
    pub fn silent() -> Self {
        Self::new(|_| Vec::new())
    }

    /// A peer backed by a shared virtual camera.
    pub fn camera(camera: Arc<Mutex<VirtualCamera>>) -> Self {
        Self::new(move |frame| {
            camera
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .handle(frame)
        })
    }

    pub fn handle(&self) -> ScriptHandle {
        self.handle.clone()
    }
}

impl Transport for ScriptedTransport {
    fn open(&mut self) -> Result<(), TransportError> {
        let mut state = self.handle.lock();
        state.opens += 1;
        if state.refuse_open {
            self.open = false;
            return Err(TransportError::connect("scripted peer refused connection"));
        }
        self.pending.clear();
        self.open = true;
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::closed("not connected"));
        }
        {
            let mut state = self.handle.lock();
            state.writes.push(bytes.to_vec());
            if state.failing_writes > 0 {
                state.failing_writes -= 1;
                return Err(TransportError::new(
                    crate::error::TransportErrorKind::Write,
                    "scripted write failure",
                ));
            }
        }
        let replies = (self.responder)(bytes);
        self.pending.extend(replies);
        Ok(())
    }

    fn read_frame(&mut self, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        if !self.open {
            return Err(TransportError::closed("not connected"));
        }
        if let Some(frame) = self.handle.lock().injected.pop_front() {
            return Ok(frame);
        }
        if let Some(frame) = self.pending.pop_front() {
            return Ok(frame);
        }
        thread::sleep(timeout);
        match self.handle.lock().injected.pop_front() {
            Some(frame) => Ok(frame),
            None => Err(TransportError::timeout("scripted peer sent nothing")),
        }
    }

    fn close(&mut self) {
        if self.open {
            self.handle.lock().closes += 1;
        }
        self.open = false;
        self.pending.clear();
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}

// =============================================================================
// Virtual Camera
// =============================================================================

/// Pose stored by a memory set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct Pose {
    pan: i32,
    tilt: i32,
    zoom: i32,
    focus: i32,
}

/// A camera model that answers VISCA frames the way hardware of the given
/// dialect does: ACK and Completion for controls, inquiry replies from its
/// property store, and memory slots for scenes.
#[derive(Debug)]
pub struct VirtualCamera {
    dialect: &'static Dialect,
    values: BTreeMap<Property, i32>,
    scenes: BTreeMap<u8, Pose>,
    socket: u8,
}

impl VirtualCamera {
    pub fn new(kind: DialectKind) -> Self {
        let dialect = kind.dialect();
        let values = dialect
            .capabilities()
            .properties()
            .filter_map(|p| dialect.spec(p).map(|s| (p, s.min.max(0))))
            .collect();
        Self {
            dialect,
            values,
            scenes: BTreeMap::new(),
            socket: 1,
        }
    }

    pub fn value(&self, property: Property) -> Option<i32> {
        self.values.get(&property).copied()
    }

    pub fn set_value(&mut self, property: Property, value: i32) {
        self.values.insert(property, value);
    }

    /// Scene indices that hold a stored pose.
    pub fn stored_scenes(&self) -> Vec<u8> {
        self.scenes.keys().copied().collect()
    }

    fn pose(&self) -> Pose {
        let get = |p| self.value(p).unwrap_or(0);
        Pose {
            pan: get(Property::Pan),
            tilt: get(Property::Tilt),
            zoom: get(Property::Zoom),
            focus: get(Property::Focus),
        }
    }

    fn set_pose(&mut self, pose: Pose) {
        self.set_value(Property::Pan, pose.pan);
        self.set_value(Property::Tilt, pose.tilt);
        self.set_value(Property::Zoom, pose.zoom);
        self.set_value(Property::Focus, pose.focus);
    }

    /// Replies to one command frame.
    pub fn handle(&mut self, frame: &[u8]) -> Vec<Vec<u8>> {
        let (address, body) = match decode_command(frame) {
            Ok(decoded) => decoded,
            Err(e) => {
                debug!("virtual camera ignoring frame: {}", e);
                return Vec::new();
            }
        };
        let reply = |r: Response| r.encode(address);
        let error = |socket, error| {
            vec![Response::Error { socket, error }.encode(address)]
        };

        match body.first().copied() {
            Some(0x09) => match self.inquire(body) {
                Some(data) => vec![reply(Response::InquiryReply(data))],
                None => error(0, DeviceError::Syntax),
            },
            Some(0x01) => {
                let socket = self.socket;
                match self.control(body) {
                    Ok(()) => vec![
                        reply(Response::Ack { socket }),
                        reply(Response::Completion { socket }),
                    ],
                    Err(e) => {
                        let mut frames = vec![reply(Response::Ack { socket })];
                        frames.extend(error(socket, e));
                        frames
                    }
                }
            }
            Some(b) if b & 0xF0 == 0x20 => error(b & 0x0F, DeviceError::NoSocket),
            _ => error(0, DeviceError::Syntax),
        }
    }

    fn inquire(&self, body: &[u8]) -> Option<Vec<u8>> {
        if body == [0x09, 0x06, 0x12] {
            let pan = self.dialect.spec(Property::Pan)?;
            let tilt = self.dialect.spec(Property::Tilt)?;
            let mut data = pan.field.encode(self.value(Property::Pan).unwrap_or(0));
            data.extend(tilt.field.encode(self.value(Property::Tilt).unwrap_or(0)));
            return Some(data);
        }
        let spec = Property::ALL
            .iter()
            .filter_map(|p| self.dialect.spec(*p))
            .find(|s| !s.set.is_empty() && s.inquiry == body)?;
        let mut data = vec![0x00; spec.set.len().saturating_sub(3)];
        data.extend(spec.field.encode(self.value(spec.property).unwrap_or(0)));
        Some(data)
    }

    fn control(&mut self, body: &[u8]) -> Result<(), DeviceError> {
        match body {
            [0x01, 0x04, 0x3F, op, scene] => {
                if !self.dialect.is_valid_scene_index(*scene as i32) {
                    return Err(DeviceError::NotExecutable);
                }
                match *op {
                    0x00 => {
                        self.scenes.remove(scene);
                    }
                    0x01 => {
                        let pose = self.pose();
                        self.scenes.insert(*scene, pose);
                    }
                    0x02 => {
                        if let Some(pose) = self.scenes.get(scene).copied() {
                            self.set_pose(pose);
                        }
                    }
                    _ => return Err(DeviceError::Syntax),
                }
                Ok(())
            }
            [0x01, 0x06, 0x02, _, _, rest @ ..] => {
                let pan = self.dialect.spec(Property::Pan).ok_or(DeviceError::Syntax)?;
                let tilt = self.dialect.spec(Property::Tilt).ok_or(DeviceError::Syntax)?;
                let pan_width = pan.field.width();
                if rest.len() != pan_width + tilt.field.width() {
                    return Err(DeviceError::MessageLength);
                }
                let pan_value = pan
                    .field
                    .decode(&rest[..pan_width])
                    .map_err(|_| DeviceError::Syntax)?;
                let tilt_value = tilt
                    .field
                    .decode(&rest[pan_width..])
                    .map_err(|_| DeviceError::Syntax)?;
                if !pan.range().contains(&pan_value) || !tilt.range().contains(&tilt_value) {
                    return Err(DeviceError::NotExecutable);
                }
                self.set_value(Property::Pan, pan_value);
                self.set_value(Property::Tilt, tilt_value);
                Ok(())
            }
            [0x01, 0x06, 0x04] | [0x01, 0x06, 0x05] => {
                self.set_value(Property::Pan, 0);
                self.set_value(Property::Tilt, 0);
                Ok(())
            }
            _ => {
                let spec = Property::ALL
                    .iter()
                    .filter_map(|p| self.dialect.spec(*p))
                    .find(|s| !s.set.is_empty() && body.starts_with(s.set));
                match spec {
                    Some(spec) => {
                        let value = spec
                            .field
                            .decode(&body[spec.set.len()..])
                            .map_err(|_| DeviceError::MessageLength)?;
                        if !spec.range().contains(&value) {
                            return Err(DeviceError::NotExecutable);
                        }
                        self.set_value(spec.property, value);
                        Ok(())
                    }
                    // Drives, OSD and preset speed only need acknowledging.
                    None => Ok(()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::command;

    #[test]
    fn test_virtual_camera_stores_and_recalls_scenes() {
        let mut cam = VirtualCamera::new(DialectKind::PtzOptics);
        let dialect = DialectKind::PtzOptics.dialect();
        cam.handle(&dialect.pantilt_absolute(5, 5, -100, 200).unwrap().encode(1).unwrap());
        let replies = cam.handle(&command::memory_set(3).encode(1).unwrap());
        assert_eq!(replies, vec![vec![0x90, 0x41, 0xFF], vec![0x90, 0x51, 0xFF]]);

        cam.handle(&command::pantilt_home().encode(1).unwrap());
        assert_eq!(cam.value(Property::Pan), Some(0));
        cam.handle(&command::memory_recall(3).encode(1).unwrap());
        assert_eq!(cam.value(Property::Pan), Some(-100));
        assert_eq!(cam.value(Property::Tilt), Some(200));
        assert_eq!(cam.stored_scenes(), vec![3]);
    }

    #[test]
    fn test_virtual_camera_answers_inquiries() {
        let mut cam = VirtualCamera::new(DialectKind::PtzOptics);
        cam.set_value(Property::Zoom, 0x1234);
        let dialect = DialectKind::PtzOptics.dialect();
        let replies = cam.handle(&dialect.inquiry(Property::Zoom).unwrap().encode(1).unwrap());
        assert_eq!(replies, vec![vec![0x90, 0x50, 0x01, 0x02, 0x03, 0x04, 0xFF]]);
    }

    #[test]
    fn test_scripted_transport_logs_writes() {
        let mut transport = ScriptedTransport::new(|_| vec![vec![0x90, 0x41, 0xFF]]);
        let handle = transport.handle();
        assert!(transport.write(&[0x81, 0xFF]).is_err());
        transport.open().unwrap();
        transport.write(&[0x81, 0x01, 0xFF]).unwrap();
        assert_eq!(
            transport.read_frame(Duration::from_millis(1)).unwrap(),
            vec![0x90, 0x41, 0xFF]
        );
        assert!(transport
            .read_frame(Duration::from_millis(1))
            .unwrap_err()
            .is_timeout());
        transport.close();
        assert_eq!(handle.opens(), 1);
        assert_eq!(handle.closes(), 1);
        assert_eq!(handle.writes(), vec![vec![0x81, 0x01, 0xFF]]);
    }
}
