//! Async driver for a [`CaptureSession`].
//!
//! The controller owns the session on a single tokio task and feeds it one
//! event at a time: user commands, device listings, finished acquisitions,
//! finished identifications and permission changes. Collaborator calls run
//! on their own tasks and report back through an event channel, so a slow
//! camera or backend never blocks the loop.
//!
//! After every event the controller publishes a [`SessionSnapshot`] on a
//! watch channel for interfaces to render.

use std::sync::Arc;

use tokio::sync::mpsc::error::SendError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::devices::{DeviceEnumerator, EnumerationError, VideoDevice};
use crate::identify::{IdentificationResult, Identifier, IdentifyError};
use crate::permissions::{PermissionSource, PermissionState};
use crate::session::{
    AcquireOutcome, AcquireRequest, AcquireTicket, CaptureSession, IdentifyRequest,
    IdentifyTicket, ModeChange, SessionError, SessionSettings, SessionSnapshot,
};
use crate::stream::{stop_all_tracks, AcquireError, MediaStream, MediaStreamProvider};

/// The collaborators a controller drives.
#[derive(Clone)]
pub struct Backend {
    pub devices: Arc<dyn DeviceEnumerator>,
    pub streams: Arc<dyn MediaStreamProvider>,
    /// `None` when the platform cannot report permission status.
    pub permissions: Option<Arc<dyn PermissionSource>>,
    pub identifier: Arc<dyn Identifier>,
}

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("Capture controller has stopped")]
    Stopped,

    #[error(transparent)]
    Session(#[from] SessionError),
}

type Reply = oneshot::Sender<Result<(), SessionError>>;

enum Command {
    ToggleMode(Reply),
    SwitchToLive(Reply),
    SwitchToUpload(Reply),
    SelectDevice(String, Reply),
    RetryPermission(Reply),
    RefreshDevices(Reply),
    Capture(Reply),
    Upload {
        bytes: Vec<u8>,
        file_name: Option<String>,
        reply: Reply,
    },
    Reset(Reply),
    Shutdown,
}

enum Event {
    DevicesListed(Result<Vec<VideoDevice>, EnumerationError>),
    StreamAcquired {
        ticket: AcquireTicket,
        result: Result<Box<dyn MediaStream>, AcquireError>,
    },
    Identified {
        ticket: IdentifyTicket,
        result: Result<IdentificationResult, IdentifyError>,
    },
}

/// Cloneable handle to a running controller.
#[derive(Clone)]
pub struct ControllerHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<SessionSnapshot>,
}

impl ControllerHandle {
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }

    /// Wait until a published snapshot satisfies `predicate`. The current
    /// snapshot is checked first.
    pub async fn wait_for<F>(&self, mut predicate: F) -> Result<SessionSnapshot, ControllerError>
    where
        F: FnMut(&SessionSnapshot) -> bool,
    {
        let mut rx = self.snapshots.clone();
        let snapshot = rx
            .wait_for(|s| predicate(s))
            .await
            .map_err(|_| ControllerError::Stopped)?;
        Ok(snapshot.clone())
    }

    pub async fn toggle_mode(&self) -> Result<(), ControllerError> {
        self.request(Command::ToggleMode).await
    }

    pub async fn switch_to_live(&self) -> Result<(), ControllerError> {
        self.request(Command::SwitchToLive).await
    }

    pub async fn switch_to_upload(&self) -> Result<(), ControllerError> {
        self.request(Command::SwitchToUpload).await
    }

    pub async fn select_device(&self, device_id: impl Into<String>) -> Result<(), ControllerError> {
        let device_id = device_id.into();
        self.request(|reply| Command::SelectDevice(device_id, reply)).await
    }

    pub async fn retry_permission(&self) -> Result<(), ControllerError> {
        self.request(Command::RetryPermission).await
    }

    /// Enumerate devices again. The listing lands in a later snapshot.
    pub async fn refresh_devices(&self) -> Result<(), ControllerError> {
        self.request(Command::RefreshDevices).await
    }

    /// Capture a still from the live stream and submit it.
    pub async fn capture(&self) -> Result<(), ControllerError> {
        self.request(Command::Capture).await
    }

    /// Submit an uploaded file.
    pub async fn upload(
        &self,
        bytes: Vec<u8>,
        file_name: Option<String>,
    ) -> Result<(), ControllerError> {
        self.request(|reply| Command::Upload {
            bytes,
            file_name,
            reply,
        })
        .await
    }

    pub async fn reset(&self) -> Result<(), ControllerError> {
        self.request(Command::Reset).await
    }

    /// Ask the controller to tear the session down and exit. Safe to call
    /// from any thread, including signal handlers.
    pub fn shutdown(&self) {
        if self.commands.send(Command::Shutdown).is_err() {
            log::debug!("Capture controller already stopped");
        }
    }

    async fn request(&self, make: impl FnOnce(Reply) -> Command) -> Result<(), ControllerError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .map_err(|_| ControllerError::Stopped)?;
        rx.await.map_err(|_| ControllerError::Stopped)??;
        Ok(())
    }
}

pub struct CameraController {
    session: CaptureSession,
    backend: Backend,
    events: mpsc::UnboundedSender<Event>,
    snapshots: watch::Sender<SessionSnapshot>,
    /// Acquisition waiting for a device listing.
    held: Option<AcquireRequest>,
}

impl CameraController {
    /// Start a controller on the current tokio runtime.
    ///
    /// The returned task finishes after [`ControllerHandle::shutdown`] or
    /// once every handle is dropped; by then the session has been torn down
    /// and every stream it ever held has been stopped.
    pub fn spawn(backend: Backend, settings: SessionSettings) -> (ControllerHandle, JoinHandle<()>) {
        let session = CaptureSession::new(settings);
        let (snapshot_tx, snapshot_rx) = watch::channel(session.snapshot());
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let permission = backend.permissions.as_ref().and_then(|p| p.subscribe());

        let controller = CameraController {
            session,
            backend,
            events: event_tx,
            snapshots: snapshot_tx,
            held: None,
        };
        let task = tokio::spawn(controller.run(command_rx, event_rx, permission));

        let handle = ControllerHandle {
            commands: command_tx,
            snapshots: snapshot_rx,
        };
        (handle, task)
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut events: mpsc::UnboundedReceiver<Event>,
        mut permission: Option<watch::Receiver<PermissionState>>,
    ) {
        if let Some(rx) = permission.as_mut() {
            let initial = *rx.borrow_and_update();
            self.session.permission_changed(initial);
        }
        self.enumerate();
        self.publish();

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => {
                        if let Some((reply, result)) = self.handle_command(command) {
                            self.publish();
                            respond(reply, result);
                        }
                    }
                },
                Some(event) = events.recv() => self.handle_event(event),
                changed = next_permission(&mut permission) => match changed {
                    Some(state) => self.session.permission_changed(state),
                    None => {
                        log::debug!("Permission source closed");
                        permission = None;
                    }
                },
            }
            self.publish();
        }

        log::info!("Shutting down capture controller");
        self.session.teardown();

        // Anything already queued is stale now; late streams get stopped
        events.close();
        while let Ok(event) = events.try_recv() {
            self.handle_event(event);
        }
        self.publish();
    }

    /// Apply a command to the session. The reply is sent by the caller
    /// after the resulting snapshot has been published.
    fn handle_command(&mut self, command: Command) -> Option<(Reply, Result<(), SessionError>)> {
        let handled = match command {
            Command::ToggleMode(reply) => {
                let result = self.session.toggle_mode().map(|change| {
                    if let ModeChange::Live(request) = change {
                        self.enumerate();
                        self.dispatch(request);
                    }
                });
                (reply, result)
            }
            Command::SwitchToLive(reply) => {
                let result = self.session.switch_to_live().map(|request| {
                    self.enumerate();
                    self.dispatch(request);
                });
                (reply, result)
            }
            Command::SwitchToUpload(reply) => (reply, self.session.switch_to_upload()),
            Command::SelectDevice(device_id, reply) => {
                let result = self.session.select_device(&device_id).map(|request| {
                    if let Some(request) = request {
                        self.dispatch(request);
                    }
                });
                (reply, result)
            }
            Command::RetryPermission(reply) => {
                let result = self.session.retry_permission().map(|request| {
                    self.enumerate();
                    self.dispatch(request);
                });
                (reply, result)
            }
            Command::RefreshDevices(reply) => {
                let result = if self.session.is_shut_down() {
                    Err(SessionError::ShutDown)
                } else {
                    self.enumerate();
                    Ok(())
                };
                (reply, result)
            }
            Command::Capture(reply) => {
                let result = self.session.capture().map(|request| self.identify(request));
                (reply, result)
            }
            Command::Upload {
                bytes,
                file_name,
                reply,
            } => {
                let result = self
                    .session
                    .upload(&bytes, file_name.as_deref())
                    .map(|request| self.identify(request));
                (reply, result)
            }
            Command::Reset(reply) => {
                let result = if self.session.is_shut_down() {
                    Err(SessionError::ShutDown)
                } else {
                    self.session.reset();
                    Ok(())
                };
                (reply, result)
            }
            Command::Shutdown => return None,
        };
        Some(handled)
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::DevicesListed(listing) => {
                self.session.devices_enumerated(listing);
                if let Some(request) = self.held.take() {
                    // The listing may have picked a default camera
                    if let Some(request) = self.session.refresh_acquire(request) {
                        self.acquire(request);
                    }
                }
            }
            Event::StreamAcquired { ticket, result } => {
                if self.session.stream_acquired(ticket, result) == AcquireOutcome::Active {
                    // Labels are usually disclosed once access is granted
                    self.enumerate();
                }
            }
            Event::Identified { ticket, result } => {
                self.session.identification_finished(ticket, result);
            }
        }
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.session.snapshot());
    }

    fn enumerate(&self) {
        let devices = self.backend.devices.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let listing = tokio::task::spawn_blocking(move || devices.list_video_input_devices())
                .await
                .unwrap_or_else(|e| Err(EnumerationError::Failed(e.to_string())));
            // A closed channel means the controller is gone; nothing to do
            let _ = events.send(Event::DevicesListed(listing));
        });
    }

    /// Run an acquisition. Without a selected device it waits for the
    /// listing already in flight, so the default camera is opened rather
    /// than whichever one the provider picks.
    fn dispatch(&mut self, request: AcquireRequest) {
        if request.device_id.is_none() {
            log::debug!("No camera selected yet; waiting for device listing");
            self.held = Some(request);
        } else {
            self.held = None;
            self.acquire(request);
        }
    }

    fn acquire(&self, request: AcquireRequest) {
        let streams = self.backend.streams.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let AcquireRequest { ticket, device_id } = request;
            log::debug!(
                "Acquiring camera stream ({})",
                device_id.as_deref().unwrap_or("any device")
            );
            let result = tokio::task::spawn_blocking(move || streams.acquire(device_id.as_deref()))
                .await
                .unwrap_or_else(|e| Err(AcquireError::Other(e.to_string())));

            if let Err(SendError(Event::StreamAcquired {
                result: Ok(mut stream),
                ..
            })) = events.send(Event::StreamAcquired { ticket, result })
            {
                log::info!(
                    "Controller gone before stream from {} arrived; stopping it",
                    stream.device_id()
                );
                stop_all_tracks(stream.as_mut());
            }
        });
    }

    fn identify(&self, request: IdentifyRequest) {
        let IdentifyRequest { ticket, image } = request;
        let pending = self.backend.identifier.identify(image);
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = pending.await;
            let _ = events.send(Event::Identified { ticket, result });
        });
    }
}

fn respond(reply: Reply, result: Result<(), SessionError>) {
    if let Err(err) = &result {
        log::warn!("Rejected: {}", err);
    }
    // The requester may have given up waiting
    let _ = reply.send(result);
}

async fn next_permission(
    rx: &mut Option<watch::Receiver<PermissionState>>,
) -> Option<PermissionState> {
    match rx {
        Some(rx) => match rx.changed().await {
            Ok(()) => Some(*rx.borrow_and_update()),
            Err(_) => None,
        },
        None => std::future::pending().await,
    }
}
