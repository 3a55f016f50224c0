//! VISCA pan-tilt-zoom camera control.
//!
//! This crate drives PTZ cameras that speak VISCA over TCP or a serial line,
//! and runs batch scene backup and restore across many cameras at once.
//!
//! # Layers
//!
//! - [`transport`]: byte-stream connections (TCP, serial) that read whole
//!   frames.
//! - [`protocol`]: frame encoding, reply decoding, nibble packing and the
//!   per-family [`Dialect`] tables.
//! - [`engine`]: one worker thread per camera that runs one exchange at a
//!   time and resolves [`Completion`] handles.
//! - [`cache`]: last-known property values with optimistic sets and
//!   rollback.
//! - [`camera`]: the [`Camera`] facade tying the above together.
//! - [`progress`] and [`orchestrator`]: hierarchical progress with
//!   cancellation, and the backup/restore job that reports through it.
//!
//! # Features
//!
//! - `serial` (default): serial line transport via `serialport`
//! - `serde`: serialize configuration and value types
//! - `testutils`: export the scripted transport and virtual camera
//!
//! # Example
//!
//! ```no_run
//! use ptz_visca::{Camera, CameraConfig, DialectKind, EventHub};
//!
//! let config = CameraConfig::from_devicename("stage", "192.0.2.10", DialectKind::PtzOptics)?;
//! let camera = Camera::new(config, EventHub::new())?;
//! camera.memory_recall(3).wait()?;
//! # Ok::<(), ptz_visca::Error>(())
//! ```

pub mod cache;
pub mod camera;
pub mod engine;
mod error;
pub mod events;
pub mod orchestrator;
pub mod prefs;
pub mod progress;
pub mod protocol;
pub mod scene;
pub mod transport;
pub mod types;

// Error types
pub use error::{DeviceError, Error, Result, TransportError, TransportErrorKind};

// Camera and engine
pub use cache::{BatchReport, Cached, PropertyCache};
pub use camera::{Camera, CameraConfig};
pub use engine::{CameraEngine, Completion, EngineConfig};

// Batch jobs
pub use orchestrator::{
    BackupRestoreJob, Direction, JobConfig, JobHandle, JobReport, SceneCapture, SceneFailure,
};
pub use progress::Progress;
pub use scene::SceneRange;

// Collaborators
pub use events::{CameraEvent, EventHub, SnapshotSource, SwitcherEvent};
pub use prefs::{MemoryPrefStore, PrefStore};

// Protocol and types
pub use protocol::{Dialect, DialectKind};
pub use transport::Transport;
pub use types::{
    Capabilities, ConnectionState, Endpoint, Freshness, Horizontal, PanTiltDrive, Property,
    PropertyGroup, QueueState, Vertical,
};
