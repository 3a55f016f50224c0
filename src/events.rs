//! Did-change notifications and the collaborators that feed a camera from
//! outside: the production switcher and the snapshot source.

use log::debug;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{ConnectionState, Endpoint, Property};

// =============================================================================
// Camera Events
// =============================================================================

/// Something about a camera changed.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CameraEvent {
    ConnectionStateChanged {
        camera: String,
        state: ConnectionState,
    },
    SceneRecalled {
        camera: String,
        scene: u8,
    },
    SceneStored {
        camera: String,
        scene: u8,
    },
    /// A property was confirmed by a fetch or a completed set.
    PropertyChanged {
        camera: String,
        property: Property,
        value: i32,
    },
    /// A new snapshot image is cached. `scene` is `None` for the live view.
    SnapshotUpdated {
        camera: String,
        scene: Option<u8>,
    },
}

impl CameraEvent {
    pub fn camera(&self) -> &str {
        match self {
            CameraEvent::ConnectionStateChanged { camera, .. }
            | CameraEvent::SceneRecalled { camera, .. }
            | CameraEvent::SceneStored { camera, .. }
            | CameraEvent::PropertyChanged { camera, .. }
            | CameraEvent::SnapshotUpdated { camera, .. } => camera,
        }
    }
}

/// Fan-out of [`CameraEvent`]s to any number of subscribers.
///
/// Clones share the subscriber list. Subscribers whose receiver was dropped
/// are pruned on the next publish.
#[derive(Debug, Clone, Default)]
pub struct EventHub {
    subscribers: Arc<Mutex<Vec<Sender<CameraEvent>>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<CameraEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(tx);
        rx
    }

    pub fn publish(&self, event: CameraEvent) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        let before = subscribers.len();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        if subscribers.len() != before {
            debug!("pruned {} closed event subscriber(s)", before - subscribers.len());
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

// =============================================================================
// Collaborators
// =============================================================================

/// Notification from the production switcher client.
///
/// Sources are matched against a camera's configured source name.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SwitcherEvent {
    ProgramSceneChanged { source: String },
    PreviewSceneChanged { source: String },
    /// The switcher wants a fresh image of `source`.
    SnapshotRequested { source: String },
}

impl SwitcherEvent {
    pub fn source(&self) -> &str {
        match self {
            SwitcherEvent::ProgramSceneChanged { source }
            | SwitcherEvent::PreviewSceneChanged { source }
            | SwitcherEvent::SnapshotRequested { source } => source,
        }
    }
}

/// Fetches still images from a camera, for example over its HTTP snapshot
/// endpoint or an RTSP decoder.
pub trait SnapshotSource: Send + Sync {
    fn fetch_snapshot(&self, camera: &str, endpoint: &Endpoint) -> Result<Vec<u8>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_subscriber_gets_each_event() {
        let hub = EventHub::new();
        let a = hub.subscribe();
        let b = hub.clone().subscribe();
        let event = CameraEvent::SceneStored {
            camera: "stage".into(),
            scene: 3,
        };
        hub.publish(event.clone());
        assert_eq!(a.try_recv().unwrap(), event);
        assert_eq!(b.try_recv().unwrap(), event);
        assert_eq!(event.camera(), "stage");
    }

    #[test]
    fn test_dropped_subscribers_are_pruned() {
        let hub = EventHub::new();
        let keep = hub.subscribe();
        drop(hub.subscribe());
        assert_eq!(hub.subscriber_count(), 2);
        hub.publish(CameraEvent::SnapshotUpdated {
            camera: "stage".into(),
            scene: None,
        });
        assert_eq!(hub.subscriber_count(), 1);
        assert!(keep.try_recv().is_ok());
    }
}
