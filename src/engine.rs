//! Per-camera command queue.
//!
//! VISCA has no request IDs and no multiplexing, so each camera gets one
//! worker thread that owns its [`Transport`] and runs exactly one exchange
//! at a time:
//!
//! ```text
//! Idle --write--> AwaitingAck --ACK--> AwaitingCompletion --Completion--> Idle
//!                      |                       |
//!                      +-- inquiry reply ------+--> Idle
//!                      +-- Error / timeout / cancel --> Idle (failure)
//! ```
//!
//! Callers get a [`Completion`] handle back from [`CameraEngine::submit`] and
//! wait on it from their own thread. Work that must follow a successful
//! command even when nobody waits (cache invalidation, events) goes through
//! [`CameraEngine::submit_then`]; its hook runs on the worker and must not
//! block or submit.
//!
//! Transport failures and missing ACKs are retried up to
//! [`EngineConfig::max_retries`] times, each retry reopening the connection
//! and resending the frame. When the budget runs out the connection is
//! `Faulted`: the command and everything queued behind it fail with the same
//! error, and later commands fail immediately until [`CameraEngine::open`]
//! succeeds. Device errors, protocol errors and completion timeouts are
//! never retried.

use log::{debug, error, info, warn};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TryRecvError};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::{Error, Result, TransportError};
use crate::protocol::{command, Command, Response, ResponseShape};
use crate::transport::Transport;
use crate::types::{ConnectionState, QueueState};

// =============================================================================
// Configuration
// =============================================================================

/// Timeouts and retry budget for one camera's engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EngineConfig {
    /// Bound on establishing the connection.
    pub connect_timeout: Duration,
    /// How long to wait for the ACK (or inquiry reply) after writing.
    pub ack_timeout: Duration,
    /// How long to wait for the Completion after the ACK. Recalls that move
    /// the head a long way take several seconds.
    pub completion_timeout: Duration,
    /// Reads are sliced to this length so cancellation is noticed promptly.
    pub poll_interval: Duration,
    /// Extra attempts after a transport failure or missing ACK.
    pub max_retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(3),
            ack_timeout: Duration::from_secs(1),
            completion_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(20),
            max_retries: 2,
        }
    }
}

impl EngineConfig {
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    pub fn with_completion_timeout(mut self, timeout: Duration) -> Self {
        self.completion_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }
}

// =============================================================================
// Completion Handle
// =============================================================================

type Payload = Result<Vec<u8>>;
type Convert<T> = Box<dyn FnOnce(Vec<u8>) -> Result<T> + Send>;

enum Slot<T> {
    Waiting(Receiver<Payload>, Convert<T>),
    Ready(Result<T>),
    Taken,
}

/// The eventual result of one queued operation.
///
/// Resolves exactly once: after a result has been returned by any of the
/// accessors, [`Completion::try_result`] and [`Completion::wait_timeout`]
/// return `None`.
pub struct Completion<T> {
    tag: u64,
    slot: Slot<T>,
}

impl Completion<Vec<u8>> {
    fn pending(tag: u64, rx: Receiver<Payload>) -> Self {
        Self {
            tag,
            slot: Slot::Waiting(rx, Box::new(|payload: Vec<u8>| Ok::<_, Error>(payload))),
        }
    }
}

impl<T: 'static> Completion<T> {
    /// An already-resolved handle.
    pub fn ready(result: Result<T>) -> Self {
        Self {
            tag: 0,
            slot: Slot::Ready(result),
        }
    }

    /// Sequence tag of the command; 0 for handles that never reached a queue.
    pub fn tag(&self) -> u64 {
        self.tag
    }

    /// Transform the successful result once it arrives.
    pub fn map<U: 'static, F>(self, f: F) -> Completion<U>
    where
        F: FnOnce(T) -> Result<U> + Send + 'static,
    {
        let slot = match self.slot {
            Slot::Waiting(rx, convert) => {
                Slot::Waiting(rx, Box::new(move |raw: Vec<u8>| convert(raw).and_then(f)))
            }
            Slot::Ready(result) => Slot::Ready(result.and_then(f)),
            Slot::Taken => Slot::Taken,
        };
        Completion {
            tag: self.tag,
            slot,
        }
    }

    /// Block until the operation resolves.
    pub fn wait(self) -> Result<T> {
        match self.slot {
            Slot::Waiting(rx, convert) => match rx.recv() {
                Ok(result) => result.and_then(convert),
                Err(_) => Err(Error::Closed),
            },
            Slot::Ready(result) => result,
            Slot::Taken => Err(Error::Closed),
        }
    }

    /// Block for at most `timeout`. `None` if still pending.
    pub fn wait_timeout(&mut self, timeout: Duration) -> Option<Result<T>> {
        self.take_with(|rx| match rx.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(Error::Closed)),
        })
    }

    /// The result if it is already available.
    pub fn try_result(&mut self) -> Option<Result<T>> {
        self.take_with(|rx| match rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(Error::Closed)),
        })
    }

    fn take_with(
        &mut self,
        poll: impl FnOnce(&Receiver<Payload>) -> Option<Payload>,
    ) -> Option<Result<T>> {
        match std::mem::replace(&mut self.slot, Slot::Taken) {
            Slot::Waiting(rx, convert) => match poll(&rx) {
                Some(result) => Some(result.and_then(convert)),
                None => {
                    self.slot = Slot::Waiting(rx, convert);
                    None
                }
            },
            Slot::Ready(result) => Some(result),
            Slot::Taken => None,
        }
    }
}

impl<T> fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.slot {
            Slot::Waiting(..) => "waiting",
            Slot::Ready(_) => "ready",
            Slot::Taken => "taken",
        };
        f.debug_struct("Completion")
            .field("tag", &self.tag)
            .field("state", &state)
            .finish()
    }
}

// =============================================================================
// Shared State
// =============================================================================

/// Called on the worker thread whenever the connection state changes.
pub type StateObserver = Box<dyn Fn(ConnectionState) + Send>;

/// Run on the worker after a command completes successfully.
pub type SuccessHook = Box<dyn FnOnce() + Send>;

struct Pending {
    tag: u64,
    command: Command,
    reply: SyncSender<Payload>,
    on_success: Option<SuccessHook>,
}

enum Request {
    Command(Pending),
    Open(SyncSender<Payload>),
    Close(SyncSender<Payload>),
}

impl Request {
    fn fail(self, err: Error) {
        match self {
            Request::Command(Pending { reply, .. }) | Request::Open(reply) => {
                let _ = reply.send(Err(err));
            }
            Request::Close(reply) => {
                let _ = reply.send(Ok(Vec::new()));
            }
        }
    }
}

struct Queue {
    requests: VecDeque<Request>,
    in_flight: Option<u64>,
    queue_state: QueueState,
    connection: ConnectionState,
    fault: Option<Error>,
}

impl Queue {
    fn open_queued(&self) -> bool {
        self.requests.iter().any(|r| matches!(r, Request::Open(_)))
    }

    /// Remove queued commands. With `before_open`, stop at the first queued
    /// reopen so commands submitted after it still get their chance.
    fn take_commands(&mut self, before_open: bool) -> Vec<Pending> {
        let mut taken = Vec::new();
        let mut kept = VecDeque::with_capacity(self.requests.len());
        let mut reached_open = false;
        for request in self.requests.drain(..) {
            match request {
                Request::Open(_) if before_open => {
                    reached_open = true;
                    kept.push_back(request);
                }
                Request::Command(pending) if !reached_open => taken.push(pending),
                other => kept.push_back(other),
            }
        }
        self.requests = kept;
        taken
    }
}

struct Shared {
    queue: Mutex<Queue>,
    wake: Condvar,
    cancel: AtomicBool,
    shutdown: AtomicBool,
    next_tag: AtomicU64,
    last_completed: AtomicU64,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// =============================================================================
// Engine
// =============================================================================

/// Serializes VISCA exchanges for one camera on a dedicated thread.
pub struct CameraEngine {
    name: String,
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl CameraEngine {
    /// Start the worker. The transport is opened lazily by the first command.
    pub fn new(
        name: impl Into<String>,
        address: u8,
        transport: Box<dyn Transport>,
        config: EngineConfig,
    ) -> Self {
        Self::with_observer(name, address, transport, config, None)
    }

    pub fn with_observer(
        name: impl Into<String>,
        address: u8,
        transport: Box<dyn Transport>,
        config: EngineConfig,
        observer: Option<StateObserver>,
    ) -> Self {
        let name = name.into();
        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue {
                requests: VecDeque::new(),
                in_flight: None,
                queue_state: QueueState::Idle,
                connection: ConnectionState::Closed,
                fault: None,
            }),
            wake: Condvar::new(),
            cancel: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            next_tag: AtomicU64::new(0),
            last_completed: AtomicU64::new(0),
        });

        let worker = Worker {
            name: name.clone(),
            address,
            transport,
            config,
            shared: Arc::clone(&shared),
            observer,
            stale_sockets: Vec::new(),
            orphan: None,
        };
        let handle = thread::spawn(move || worker.run());

        Self {
            name,
            shared,
            handle: Some(handle),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue a command. The payload is the inquiry data for inquiries and
    /// empty for everything else.
    pub fn submit(&self, command: Command) -> Completion<Vec<u8>> {
        self.enqueue(command, None)
    }

    /// Queue a command and run `on_success` on the worker once it completes,
    /// before the handle resolves. The hook runs even if the handle was
    /// dropped.
    pub fn submit_then(
        &self,
        command: Command,
        on_success: impl FnOnce() + Send + 'static,
    ) -> Completion<Vec<u8>> {
        self.enqueue(command, Some(Box::new(on_success)))
    }

    fn enqueue(&self, command: Command, on_success: Option<SuccessHook>) -> Completion<Vec<u8>> {
        let tag = self.shared.next_tag.fetch_add(1, Ordering::SeqCst) + 1;
        let (tx, rx) = mpsc::sync_channel(1);
        let completion = Completion::pending(tag, rx);

        let mut queue = self.shared.lock();
        if self.shared.shutdown.load(Ordering::SeqCst) {
            let _ = tx.send(Err(Error::Closed));
            return completion;
        }
        if let Some(fault) = queue.fault.clone() {
            if !queue.open_queued() {
                debug!("{}: rejecting #{}, connection faulted", self.name, tag);
                let _ = tx.send(Err(fault));
                return completion;
            }
        }
        queue.requests.push_back(Request::Command(Pending {
            tag,
            command,
            reply: tx,
            on_success,
        }));
        self.shared.wake.notify_one();
        completion
    }

    /// Open, or close and reopen, the connection. The only way out of
    /// [`ConnectionState::Faulted`].
    pub fn open(&self) -> Completion<()> {
        self.control(Request::Open)
    }

    /// Close the connection after everything queued before this call.
    pub fn close(&self) -> Completion<()> {
        self.control(Request::Close)
    }

    fn control(&self, make: fn(SyncSender<Payload>) -> Request) -> Completion<()> {
        let (tx, rx) = mpsc::sync_channel(1);
        let mut queue = self.shared.lock();
        if self.shared.shutdown.load(Ordering::SeqCst) {
            let _ = tx.send(Err(Error::Closed));
        } else {
            queue.requests.push_back(make(tx));
            self.shared.wake.notify_one();
        }
        Completion::pending(0, rx).map(|_| Ok(()))
    }

    /// Abort the in-flight exchange and drop everything queued.
    ///
    /// Queued commands fail with [`Error::Cancelled`] before this returns.
    /// The in-flight command fails with the same error once the worker
    /// notices; if the camera had acknowledged it, a VISCA cancel is sent
    /// for its socket. The connection stays open.
    ///
    /// Returns whether a command was in flight.
    pub fn cancel_command(&self) -> bool {
        let (in_flight, dropped) = {
            let mut queue = self.shared.lock();
            let in_flight = queue.in_flight.is_some();
            if in_flight {
                self.shared.cancel.store(true, Ordering::SeqCst);
            }
            (in_flight, queue.take_commands(false))
        };
        if in_flight || !dropped.is_empty() {
            info!(
                "{}: cancelling ({} queued command(s) dropped)",
                self.name,
                dropped.len()
            );
        }
        for pending in dropped {
            let _ = pending.reply.send(Err(Error::Cancelled));
        }
        in_flight
    }

    pub fn queue_state(&self) -> QueueState {
        self.shared.lock().queue_state
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.shared.lock().connection
    }

    /// The error that faulted the connection, if it is faulted.
    pub fn fault(&self) -> Option<Error> {
        self.shared.lock().fault.clone()
    }

    /// Tag of the most recent command that completed successfully.
    pub fn last_completed_tag(&self) -> u64 {
        self.shared.last_completed.load(Ordering::SeqCst)
    }

    /// Commands waiting behind the in-flight one.
    pub fn pending_len(&self) -> usize {
        self.shared
            .lock()
            .requests
            .iter()
            .filter(|r| matches!(r, Request::Command(_)))
            .count()
    }
}

impl Drop for CameraEngine {
    fn drop(&mut self) {
        let requests: Vec<Request> = {
            let mut queue = self.shared.lock();
            self.shared.shutdown.store(true, Ordering::SeqCst);
            queue.requests.drain(..).collect()
        };
        self.shared.wake.notify_all();
        for request in requests {
            request.fail(Error::Closed);
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl fmt::Debug for CameraEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CameraEngine")
            .field("name", &self.name)
            .field("queue_state", &self.queue_state())
            .field("connection", &self.connection_state())
            .finish()
    }
}

// =============================================================================
// Worker
// =============================================================================

enum Failure {
    /// Transport trouble or no ACK: reopen and resend if budget remains.
    Retry(Error),
    /// Fails this command only.
    Command(Error),
    /// Faults the connection.
    Fatal(Error),
}

struct Worker {
    name: String,
    address: u8,
    transport: Box<dyn Transport>,
    config: EngineConfig,
    shared: Arc<Shared>,
    observer: Option<StateObserver>,
    /// Sockets of cancelled exchanges whose late replies may still arrive.
    stale_sockets: Vec<u8>,
    /// A command cancelled before its ACK: the camera may still answer it,
    /// ahead of anything written later. Expires at the deadline.
    orphan: Option<(ResponseShape, Instant)>,
}

impl Worker {
    fn run(mut self) {
        while let Some(request) = self.next_request() {
            match request {
                Request::Command(pending) => self.execute(pending),
                Request::Open(reply) => {
                    let result = self.connect().map(|_| Vec::new());
                    if let Err(e) = &result {
                        self.fault(e.clone());
                    }
                    let _ = reply.send(result);
                }
                Request::Close(reply) => {
                    self.transport.close();
                    if self.connection() != ConnectionState::Faulted {
                        self.set_connection(ConnectionState::Closed);
                    }
                    self.set_queue_state(QueueState::Closed);
                    info!("{}: closed", self.name);
                    let _ = reply.send(Ok(Vec::new()));
                }
            }
        }
        self.transport.close();
        self.set_queue_state(QueueState::Closed);
        debug!("{}: worker stopped", self.name);
    }

    fn next_request(&self) -> Option<Request> {
        let mut queue = self.shared.lock();
        loop {
            if self.shared.shutdown.load(Ordering::SeqCst) {
                return None;
            }
            if let Some(request) = queue.requests.pop_front() {
                if let Request::Command(pending) = &request {
                    queue.in_flight = Some(pending.tag);
                    self.shared.cancel.store(false, Ordering::SeqCst);
                }
                return Some(request);
            }
            queue = self
                .shared
                .wake
                .wait(queue)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    fn execute(&mut self, pending: Pending) {
        let Pending {
            tag,
            command,
            reply,
            on_success,
        } = pending;
        let outcome = self.run_exchange(tag, &command);

        {
            let mut queue = self.shared.lock();
            queue.in_flight = None;
            queue.queue_state = QueueState::Idle;
        }

        match outcome {
            Ok(payload) => {
                self.shared.last_completed.store(tag, Ordering::SeqCst);
                if let Some(hook) = on_success {
                    hook();
                }
                let _ = reply.send(Ok(payload));
            }
            Err(Failure::Command(e)) | Err(Failure::Retry(e)) => {
                debug!("{}: command #{} failed: {}", self.name, tag, e);
                let _ = reply.send(Err(e));
            }
            Err(Failure::Fatal(e)) => {
                self.mark_faulted(e.clone());
                let _ = reply.send(Err(e.clone()));
                self.drain_faulted(e);
            }
        }
    }

    fn run_exchange(
        &mut self,
        tag: u64,
        command: &Command,
    ) -> std::result::Result<Vec<u8>, Failure> {
        let frame = command.encode(self.address).map_err(Failure::Command)?;
        if !self.transport.is_open() || self.connection() != ConnectionState::Open {
            self.connect().map_err(Failure::Fatal)?;
        }
        let mut attempt = 0;
        loop {
            match self.exchange(tag, command, &frame) {
                Err(Failure::Retry(e)) => {
                    if attempt >= self.config.max_retries {
                        error!(
                            "{}: command #{} failed after {} attempt(s): {}",
                            self.name,
                            tag,
                            attempt + 1,
                            e
                        );
                        return Err(Failure::Fatal(e));
                    }
                    attempt += 1;
                    warn!(
                        "{}: retrying command #{} ({}/{}): {}",
                        self.name, tag, attempt, self.config.max_retries, e
                    );
                    self.connect().map_err(Failure::Fatal)?;
                }
                other => return other,
            }
        }
    }

    /// One write and the reads that answer it.
    fn exchange(
        &mut self,
        tag: u64,
        command: &Command,
        frame: &[u8],
    ) -> std::result::Result<Vec<u8>, Failure> {
        self.set_queue_state(QueueState::AwaitingAck);
        debug!("{}: -> #{} {:02X?}", self.name, tag, frame);
        self.transport
            .write(frame)
            .map_err(|e| Failure::Retry(e.into()))?;

        let expects = command.expects();
        let mut acked: Option<u8> = None;
        let mut deadline = Instant::now() + self.config.ack_timeout;

        loop {
            if self.shared.shutdown.load(Ordering::SeqCst) {
                return Err(Failure::Command(Error::Closed));
            }
            if self.shared.cancel.load(Ordering::SeqCst) {
                match acked {
                    Some(socket) => {
                        let sent = command::cancel(socket)
                            .encode(self.address)
                            .and_then(|frame| self.transport.write(&frame).map_err(Error::from));
                        if let Err(e) = sent {
                            warn!("{}: could not send cancel: {}", self.name, e);
                        }
                        self.stale_sockets.push(socket);
                    }
                    None => {
                        self.orphan = Some((expects, Instant::now() + self.config.ack_timeout));
                    }
                }
                info!("{}: command #{} cancelled", self.name, tag);
                return Err(Failure::Command(Error::Cancelled));
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(match acked {
                    None => Failure::Retry(
                        TransportError::timeout(format!(
                            "no reply to command #{} within {:?}",
                            tag, self.config.ack_timeout
                        ))
                        .into(),
                    ),
                    Some(_) => Failure::Command(
                        TransportError::timeout(format!(
                            "command #{} did not complete within {:?}",
                            tag, self.config.completion_timeout
                        ))
                        .into(),
                    ),
                });
            }

            let bytes = match self
                .transport
                .read_frame(remaining.min(self.config.poll_interval))
            {
                Ok(bytes) => bytes,
                Err(e) if e.is_timeout() => continue,
                Err(e) => return Err(Failure::Retry(e.into())),
            };
            debug!("{}: <- {:02X?}", self.name, bytes);

            let response = Response::decode(&bytes).map_err(|e| {
                warn!("{}: command #{}: {}", self.name, tag, e);
                Failure::Command(e)
            })?;

            if acked.is_none() && self.take_orphan_reply(&response) {
                continue;
            }

            match response {
                Response::Ack { socket }
                    if acked.is_none() && expects == ResponseShape::Completion =>
                {
                    acked = Some(socket);
                    self.stale_sockets.retain(|s| *s != socket);
                    self.set_queue_state(QueueState::AwaitingCompletion);
                    deadline = Instant::now() + self.config.completion_timeout;
                }
                Response::Completion { socket }
                    if expects == ResponseShape::Completion && self.owns(acked, socket) =>
                {
                    return Ok(Vec::new());
                }
                Response::InquiryReply(data) if expects == ResponseShape::InquiryReply => {
                    return Ok(data);
                }
                Response::Error { socket, error } if self.owns(acked, socket) => {
                    return Err(Failure::Command(Error::Device(error)));
                }
                other => {
                    if let Response::Completion { socket } | Response::Error { socket, .. } = &other {
                        self.stale_sockets.retain(|s| s != socket);
                    }
                    debug!(
                        "{}: discarding {:?} while waiting on #{}",
                        self.name, other, tag
                    );
                }
            }
        }
    }

    /// Consume a reply that answers the command cancelled before its ACK.
    /// Its ACK marks the socket stale; a terminal frame ends it.
    fn take_orphan_reply(&mut self, response: &Response) -> bool {
        let Some((shape, deadline)) = self.orphan else {
            return false;
        };
        if Instant::now() >= deadline {
            debug!("{}: no late reply to the cancelled command", self.name);
            self.orphan = None;
            return false;
        }
        let taken = match (shape, response) {
            (ResponseShape::Completion, Response::Ack { socket }) => {
                self.stale_sockets.push(*socket);
                true
            }
            (ResponseShape::Completion, Response::Completion { .. })
            | (ResponseShape::InquiryReply, Response::InquiryReply(_))
            | (_, Response::Error { .. }) => true,
            _ => false,
        };
        if taken {
            debug!("{}: discarding late {:?} for cancelled command", self.name, response);
            self.orphan = None;
        }
        taken
    }

    /// Whether a frame for `socket` belongs to the current exchange.
    fn owns(&self, acked: Option<u8>, socket: u8) -> bool {
        match acked {
            Some(s) => s == socket,
            None => !self.stale_sockets.contains(&socket),
        }
    }

    fn connect(&mut self) -> Result<()> {
        self.transport.close();
        self.stale_sockets.clear();
        self.orphan = None;
        self.set_connection(ConnectionState::Opening);
        match self.transport.open() {
            Ok(()) => {
                self.shared.lock().fault = None;
                self.set_connection(ConnectionState::Open);
                info!("{}: connected to {}", self.name, self.transport.describe());
                Ok(())
            }
            Err(e) => {
                warn!("{}: open failed: {}", self.name, e);
                Err(e.into())
            }
        }
    }

    fn fault(&mut self, err: Error) {
        self.mark_faulted(err.clone());
        self.drain_faulted(err);
    }

    fn mark_faulted(&mut self, err: Error) {
        self.transport.close();
        self.shared.lock().fault = Some(err);
        self.set_connection(ConnectionState::Faulted);
    }

    fn drain_faulted(&mut self, err: Error) {
        let dropped = self.shared.lock().take_commands(true);
        if !dropped.is_empty() {
            warn!(
                "{}: failing {} queued command(s): {}",
                self.name,
                dropped.len(),
                err
            );
        }
        for pending in dropped {
            let _ = pending.reply.send(Err(err.clone()));
        }
    }

    fn connection(&self) -> ConnectionState {
        self.shared.lock().connection
    }

    fn set_connection(&self, state: ConnectionState) {
        let changed = {
            let mut queue = self.shared.lock();
            let changed = queue.connection != state;
            queue.connection = state;
            changed
        };
        if changed {
            debug!("{}: connection {:?}", self.name, state);
            if let Some(observer) = &self.observer {
                observer(state);
            }
        }
    }

    fn set_queue_state(&self, state: QueueState) {
        self.shared.lock().queue_state = state;
    }
}
