//! Capture session: the camera acquisition and still capture lifecycle.
//!
//! [`CaptureSession`] is a synchronous state machine over
//! `(mode, permission, active stream)`. It never calls collaborators itself.
//! Operations that need a stream or an identification hand back a request
//! carrying a ticket; the driver performs the work and reports the outcome
//! with the same ticket. Outcomes whose ticket has been superseded are
//! stale: late streams are stopped on arrival and late results dropped.
//!
//! The session is the only owner of the active stream. Every path that
//! clears or replaces it stops all of its tracks first.

mod errors;
mod types;

use std::sync::Arc;

use crate::capture::{decode_upload, rasterize_frame, CapturedImage};
use crate::devices::{default_device_id, EnumerationError, VideoDevice};
use crate::identify::{IdentificationResult, IdentifyError};
use crate::permissions::PermissionState;
use crate::stream::{stop_all_tracks, AcquireError, MediaStream};

pub use errors::SessionError;
pub use types::{
    unavailable_reason, AcquireOutcome, AcquireRequest, AcquireTicket, Identification,
    IdentifyRequest, IdentifyTicket, Mode, ModeChange, SessionSettings, SessionSnapshot,
    SessionState, UnavailableReason,
};

pub struct CaptureSession {
    settings: SessionSettings,
    mode: Mode,
    state: SessionState,
    permission: PermissionState,
    stream: Option<Box<dyn MediaStream>>,
    devices: Vec<VideoDevice>,
    selected_device: Option<String>,
    last_error: Option<String>,
    pending_acquire: Option<AcquireTicket>,
    pending_identify: Option<IdentifyTicket>,
    next_ticket: u64,
    image: Option<Arc<CapturedImage>>,
    identification: Option<Identification>,
    analyzing: bool,
    shut_down: bool,
}

impl CaptureSession {
    /// New session in upload mode. Permission starts at `Prompt` until a
    /// collaborator reports otherwise.
    pub fn new(settings: SessionSettings) -> Self {
        let selected_device = settings.preferred_device.clone();
        Self {
            settings,
            mode: Mode::Upload,
            state: SessionState::Upload,
            permission: PermissionState::Prompt,
            stream: None,
            devices: Vec::new(),
            selected_device,
            last_error: None,
            pending_acquire: None,
            pending_identify: None,
            next_ticket: 0,
            image: None,
            identification: None,
            analyzing: false,
            shut_down: false,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn permission(&self) -> PermissionState {
        self.permission
    }

    pub fn devices(&self) -> &[VideoDevice] {
        &self.devices
    }

    pub fn selected_device(&self) -> Option<&str> {
        self.selected_device.as_deref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn has_active_stream(&self) -> bool {
        self.stream.is_some()
    }

    pub fn is_analyzing(&self) -> bool {
        self.analyzing
    }

    pub fn image(&self) -> Option<&Arc<CapturedImage>> {
        self.image.as_ref()
    }

    pub fn identification(&self) -> Option<&Identification> {
        self.identification.as_ref()
    }

    pub fn result(&self) -> Option<&IdentificationResult> {
        self.identification.as_ref().and_then(Identification::result)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// One-line description of where the session stands.
    pub fn status_line(&self) -> String {
        let detail = match &self.state {
            SessionState::Upload => "Upload an image to identify objects".to_string(),
            SessionState::AwaitingPermission => PermissionState::Prompt.headline().to_string(),
            SessionState::Active => match self.stream.as_ref() {
                Some(stream) => format!("LIVE on {}", stream.device_id()),
                None => "LIVE".to_string(),
            },
            SessionState::Denied => format!(
                "{}. {}",
                PermissionState::Denied.headline(),
                PermissionState::Denied.guidance()
            ),
            SessionState::Unavailable(reason) => format!(
                "{}: {}",
                PermissionState::Unavailable.headline(),
                reason.message()
            ),
        };
        if self.analyzing {
            format!("{} (analyzing image...)", detail)
        } else {
            detail
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            mode: self.mode,
            state: self.state.clone(),
            permission: self.permission,
            devices: self.devices.clone(),
            selected_device: self.selected_device.clone(),
            last_error: self.last_error.clone(),
            streaming: self.stream.is_some(),
            analyzing: self.analyzing,
            image: self.image.clone(),
            identification: self.identification.clone(),
            shut_down: self.shut_down,
        }
    }

    /// Apply a device listing. Best-effort: never changes the lifecycle
    /// state, only the known devices, the selection and `last_error`.
    pub fn devices_enumerated(&mut self, listing: Result<Vec<VideoDevice>, EnumerationError>) {
        if self.shut_down {
            return;
        }
        match listing {
            Ok(devices) => {
                log::debug!("Enumerated {} video input device(s)", devices.len());
                if devices.is_empty() && self.permission == PermissionState::Granted {
                    self.last_error = Some("No camera devices detected".to_string());
                }
                self.devices = devices;

                let selection_valid = match &self.selected_device {
                    Some(id) => {
                        self.devices.is_empty() || self.devices.iter().any(|d| &d.device_id == id)
                    }
                    None => false,
                };
                if !selection_valid {
                    if let Some(id) = default_device_id(&self.devices) {
                        log::debug!("Selecting default camera {}", id);
                        self.selected_device = Some(id.to_string());
                    }
                }
            }
            Err(err) => {
                log::warn!("Device enumeration failed: {}", err);
                self.last_error = Some(err.to_string());
            }
        }
    }

    /// `Idle/Upload -> AwaitingPermission`. The caller enumerates devices
    /// and then runs the returned acquisition.
    pub fn switch_to_live(&mut self) -> Result<AcquireRequest, SessionError> {
        let result = self.try_switch_to_live();
        self.record(result)
    }

    fn try_switch_to_live(&mut self) -> Result<AcquireRequest, SessionError> {
        self.ensure_running()?;
        if self.analyzing {
            return Err(SessionError::Analyzing);
        }
        if self.mode == Mode::Live {
            return Err(SessionError::WrongMode {
                required: Mode::Upload,
                current: Mode::Live,
            });
        }
        log::info!("Switching to live camera mode");
        self.mode = Mode::Live;
        self.reset();
        Ok(self.begin_acquire())
    }

    /// Back to upload mode. The stream's tracks are stopped before the
    /// reference is dropped, and any acquisition in flight becomes stale.
    pub fn switch_to_upload(&mut self) -> Result<(), SessionError> {
        let result = self.try_switch_to_upload();
        self.record(result)
    }

    fn try_switch_to_upload(&mut self) -> Result<(), SessionError> {
        self.ensure_running()?;
        if self.analyzing {
            return Err(SessionError::Analyzing);
        }
        if self.mode == Mode::Upload {
            return Err(SessionError::WrongMode {
                required: Mode::Live,
                current: Mode::Upload,
            });
        }
        log::info!("Switching to upload mode");
        self.release_stream();
        self.pending_acquire = None;
        self.mode = Mode::Upload;
        self.state = SessionState::Upload;
        self.last_error = None;
        self.reset();
        Ok(())
    }

    pub fn toggle_mode(&mut self) -> Result<ModeChange, SessionError> {
        match self.mode {
            Mode::Upload => self.switch_to_live().map(ModeChange::Live),
            Mode::Live => self.switch_to_upload().map(|()| ModeChange::Upload),
        }
    }

    /// User-initiated retry after a denial or failure. Nothing is ever
    /// retried automatically.
    pub fn retry_permission(&mut self) -> Result<AcquireRequest, SessionError> {
        let result = self.try_retry_permission();
        self.record(result)
    }

    fn try_retry_permission(&mut self) -> Result<AcquireRequest, SessionError> {
        self.ensure_running()?;
        if self.mode != Mode::Live {
            return Err(SessionError::WrongMode {
                required: Mode::Live,
                current: self.mode,
            });
        }
        if !self.state.needs_retry() {
            return Err(SessionError::NothingToRetry(self.state.to_string()));
        }
        log::info!("Retrying camera access");
        Ok(self.begin_acquire())
    }

    /// Select a device. While streaming (or while an acquisition is in
    /// flight) this tears down the current stream first and returns a new
    /// acquisition bound to `device_id`.
    pub fn select_device(&mut self, device_id: &str) -> Result<Option<AcquireRequest>, SessionError> {
        let result = self.try_select_device(device_id);
        self.record(result)
    }

    fn try_select_device(&mut self, device_id: &str) -> Result<Option<AcquireRequest>, SessionError> {
        self.ensure_running()?;
        if !self.devices.is_empty() && !self.devices.iter().any(|d| d.device_id == device_id) {
            return Err(SessionError::UnknownDevice(device_id.to_string()));
        }
        let unchanged = self.selected_device.as_deref() == Some(device_id);
        self.selected_device = Some(device_id.to_string());

        match self.state {
            SessionState::Active if unchanged => Ok(None),
            SessionState::Active => {
                log::info!("Switching camera to {}", device_id);
                self.release_stream();
                Ok(Some(self.begin_acquire()))
            }
            SessionState::AwaitingPermission if !unchanged => Ok(Some(self.begin_acquire())),
            _ => Ok(None),
        }
    }

    /// Re-read the device for a request that has not been run yet, picking
    /// up a selection made by a listing that arrived in the meantime.
    /// Returns `None` if the request has been superseded or the session
    /// has shut down.
    pub fn refresh_acquire(&self, request: AcquireRequest) -> Option<AcquireRequest> {
        if self.shut_down || self.pending_acquire != Some(request.ticket) {
            return None;
        }
        Some(AcquireRequest {
            ticket: request.ticket,
            device_id: self.selected_device.clone(),
        })
    }

    /// Report the completion of an acquisition.
    pub fn stream_acquired(
        &mut self,
        ticket: AcquireTicket,
        result: Result<Box<dyn MediaStream>, AcquireError>,
    ) -> AcquireOutcome {
        if self.shut_down || self.pending_acquire != Some(ticket) {
            if let Ok(mut stream) = result {
                log::info!(
                    "Discarding late stream from {}; stopping its tracks",
                    stream.device_id()
                );
                stop_all_tracks(stream.as_mut());
            }
            return AcquireOutcome::Stale;
        }
        self.pending_acquire = None;

        match result {
            Ok(stream) => {
                // Nothing should be bound here, but never overwrite a live stream
                self.release_stream();
                log::info!("Camera stream active on {}", stream.device_id());
                if self.selected_device.is_none() {
                    self.selected_device = Some(stream.device_id().to_string());
                }
                self.stream = Some(stream);
                self.permission = PermissionState::Granted;
                self.state = SessionState::Active;
                self.last_error = None;
                AcquireOutcome::Active
            }
            Err(err) => {
                log::warn!("Camera acquisition failed: {}", err);
                self.last_error = Some(err.to_string());
                match unavailable_reason(&err) {
                    None => {
                        self.permission = PermissionState::Denied;
                        self.state = SessionState::Denied;
                        AcquireOutcome::Denied
                    }
                    Some(reason) => {
                        self.permission = PermissionState::Unavailable;
                        self.state = SessionState::Unavailable(reason.clone());
                        AcquireOutcome::Unavailable(reason)
                    }
                }
            }
        }
    }

    /// Observe a change reported by the platform permission subsystem.
    ///
    /// Losing permission while streaming releases the stream, so the
    /// session never holds a stream without a grant.
    pub fn permission_changed(&mut self, permission: PermissionState) {
        if self.shut_down || self.permission == permission {
            return;
        }
        log::info!("Camera permission is now {}", permission);
        self.permission = permission;

        if permission != PermissionState::Granted && self.stream.is_some() {
            self.release_stream();
            if permission == PermissionState::Denied {
                self.state = SessionState::Denied;
                self.last_error = Some(AcquireError::PermissionDenied.to_string());
            } else {
                let reason = UnavailableReason::PermissionRevoked;
                self.last_error = Some(reason.message());
                self.state = SessionState::Unavailable(reason);
            }
        }
    }

    /// Draw the current frame into a still. `Live/Active` only.
    pub fn capture(&mut self) -> Result<IdentifyRequest, SessionError> {
        let result = self.try_capture();
        self.record(result)
    }

    fn try_capture(&mut self) -> Result<IdentifyRequest, SessionError> {
        self.ensure_running()?;
        if self.mode != Mode::Live {
            return Err(SessionError::WrongMode {
                required: Mode::Live,
                current: self.mode,
            });
        }
        if self.analyzing {
            return Err(SessionError::Analyzing);
        }
        let stream = match (&self.state, self.stream.as_mut()) {
            (SessionState::Active, Some(stream)) => stream,
            _ => return Err(SessionError::CameraInactive),
        };

        let frame = stream.current_frame()?;
        let device_id = stream.device_id().to_string();
        let still = rasterize_frame(&frame, self.settings.capture_size, &device_id)?;
        Ok(self.begin_identification(still))
    }

    /// Decode an uploaded file into a still. `Idle/Upload` only.
    pub fn upload(
        &mut self,
        bytes: &[u8],
        file_name: Option<&str>,
    ) -> Result<IdentifyRequest, SessionError> {
        let result = self.try_upload(bytes, file_name);
        self.record(result)
    }

    fn try_upload(
        &mut self,
        bytes: &[u8],
        file_name: Option<&str>,
    ) -> Result<IdentifyRequest, SessionError> {
        self.ensure_running()?;
        if self.mode != Mode::Upload {
            return Err(SessionError::WrongMode {
                required: Mode::Upload,
                current: self.mode,
            });
        }
        if self.analyzing {
            return Err(SessionError::Analyzing);
        }
        let still = decode_upload(bytes, file_name, &self.settings.upload_limits)?;
        Ok(self.begin_identification(still))
    }

    /// Report the completion of an identification. Returns `false` when the
    /// result was stale and dropped.
    pub fn identification_finished(
        &mut self,
        ticket: IdentifyTicket,
        result: Result<IdentificationResult, IdentifyError>,
    ) -> bool {
        if self.shut_down || self.pending_identify != Some(ticket) {
            log::debug!("Discarding stale identification result");
            return false;
        }
        self.pending_identify = None;
        self.analyzing = false;

        let identification = match result {
            Ok(result) => {
                log::info!(
                    "Identified {} ({})",
                    result.label,
                    result.confidence_percent()
                );
                Identification::Identified(result)
            }
            Err(err) => {
                log::error!("Identification failed: {}", err);
                let message = err.to_string();
                self.last_error = Some(message.clone());
                Identification::Failed(message)
            }
        };
        self.identification = Some(identification);
        true
    }

    /// Drop the still, its result and the analyzing flag. Mode is kept.
    pub fn reset(&mut self) {
        self.image = None;
        self.identification = None;
        self.analyzing = false;
        self.pending_identify = None;
    }

    /// Release everything. Stops the stream's tracks regardless of state;
    /// afterwards every operation is rejected and late completions are
    /// treated as stale.
    pub fn teardown(&mut self) {
        if !self.shut_down {
            log::debug!("Tearing down capture session");
        }
        self.release_stream();
        self.pending_acquire = None;
        self.reset();
        self.mode = Mode::Upload;
        self.state = SessionState::Upload;
        self.shut_down = true;
    }

    fn ensure_running(&self) -> Result<(), SessionError> {
        if self.shut_down {
            Err(SessionError::ShutDown)
        } else {
            Ok(())
        }
    }

    fn record<T>(&mut self, result: Result<T, SessionError>) -> Result<T, SessionError> {
        if let Err(err) = &result {
            self.last_error = Some(err.to_string());
        }
        result
    }

    fn next_ticket(&mut self) -> u64 {
        self.next_ticket += 1;
        self.next_ticket
    }

    fn begin_acquire(&mut self) -> AcquireRequest {
        let ticket = AcquireTicket(self.next_ticket());
        self.pending_acquire = Some(ticket);
        self.state = SessionState::AwaitingPermission;
        self.last_error = None;
        AcquireRequest {
            ticket,
            device_id: self.selected_device.clone(),
        }
    }

    fn begin_identification(&mut self, still: CapturedImage) -> IdentifyRequest {
        let ticket = IdentifyTicket(self.next_ticket());
        log::info!(
            "Submitting {} ({}x{}) for identification",
            still.short_digest(),
            still.width(),
            still.height()
        );
        let image = Arc::new(still);
        self.image = Some(image.clone());
        self.identification = None;
        self.analyzing = true;
        self.pending_identify = Some(ticket);
        self.last_error = None;
        IdentifyRequest { ticket, image }
    }

    /// Stop every track, then drop the reference.
    fn release_stream(&mut self) {
        if let Some(stream) = self.stream.as_mut() {
            let stopped = stop_all_tracks(stream.as_mut());
            log::debug!("Released camera stream ({} track(s) stopped)", stopped);
        }
        self.stream = None;
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_starts_in_upload_mode() {
        let session = CaptureSession::new(SessionSettings::default());
        assert_eq!(session.mode(), Mode::Upload);
        assert_eq!(session.state(), &SessionState::Upload);
        assert_eq!(session.permission(), PermissionState::Prompt);
        assert!(!session.has_active_stream());
        assert!(!session.is_analyzing());
        assert!(session.selected_device().is_none());
    }

    #[test]
    fn test_preferred_device_is_initial_selection() {
        let settings = SessionSettings {
            preferred_device: Some("cam0".to_string()),
            ..SessionSettings::default()
        };
        let mut session = CaptureSession::new(settings);
        assert_eq!(session.selected_device(), Some("cam0"));

        session.devices_enumerated(Ok(vec![
            VideoDevice::new("cam0", ""),
            VideoDevice::new("cam1", ""),
        ]));
        assert_eq!(session.selected_device(), Some("cam0"));
    }

    #[test]
    fn test_stale_selection_falls_back_to_default() {
        let settings = SessionSettings {
            preferred_device: Some("gone".to_string()),
            ..SessionSettings::default()
        };
        let mut session = CaptureSession::new(settings);
        session.devices_enumerated(Ok(vec![
            VideoDevice::new("cam0", ""),
            VideoDevice::new("cam1", ""),
        ]));
        assert_eq!(session.selected_device(), Some("cam1"));
    }

    #[test]
    fn test_enumeration_failure_only_records_error() {
        let mut session = CaptureSession::new(SessionSettings::default());
        session.devices_enumerated(Err(EnumerationError::Unsupported));
        assert_eq!(session.state(), &SessionState::Upload);
        assert!(session.last_error().unwrap().contains("not supported"));
    }

    #[test]
    fn test_empty_listing_before_permission_is_not_an_error() {
        let mut session = CaptureSession::new(SessionSettings::default());
        session.devices_enumerated(Ok(vec![]));
        assert!(session.last_error().is_none());
    }

    #[test]
    fn test_switch_to_live_issues_acquisition() {
        let mut session = CaptureSession::new(SessionSettings::default());
        session.devices_enumerated(Ok(vec![VideoDevice::new("camA", "")]));

        let request = session.switch_to_live().unwrap();
        assert_eq!(request.device_id.as_deref(), Some("camA"));
        assert_eq!(session.mode(), Mode::Live);
        assert_eq!(session.state(), &SessionState::AwaitingPermission);

        assert!(matches!(
            session.switch_to_live(),
            Err(SessionError::WrongMode { .. })
        ));
    }

    #[test]
    fn test_acquisition_without_selection_requests_any_device() {
        let mut session = CaptureSession::new(SessionSettings::default());
        let request = session.switch_to_live().unwrap();
        assert!(request.device_id.is_none());
    }

    #[test]
    fn test_retry_requires_denied_or_unavailable() {
        let mut session = CaptureSession::new(SessionSettings::default());
        assert!(matches!(
            session.retry_permission(),
            Err(SessionError::WrongMode { .. })
        ));

        let request = session.switch_to_live().unwrap();
        assert!(matches!(
            session.retry_permission(),
            Err(SessionError::NothingToRetry(_))
        ));

        session.stream_acquired(request.ticket, Err(AcquireError::PermissionDenied));
        assert_eq!(session.state(), &SessionState::Denied);
        let retry = session.retry_permission().unwrap();
        assert_ne!(retry.ticket, request.ticket);
        assert_eq!(session.state(), &SessionState::AwaitingPermission);
        assert!(session.last_error().is_none());
    }

    #[test]
    fn test_upload_rejected_in_live_mode() {
        let mut session = CaptureSession::new(SessionSettings::default());
        session.switch_to_live().unwrap();
        let err = session.upload(b"anything", None).unwrap_err();
        assert!(matches!(
            err,
            SessionError::WrongMode {
                required: Mode::Upload,
                current: Mode::Live
            }
        ));
    }

    #[test]
    fn test_capture_rejected_without_stream() {
        let mut session = CaptureSession::new(SessionSettings::default());
        assert!(matches!(
            session.capture(),
            Err(SessionError::WrongMode { .. })
        ));

        session.switch_to_live().unwrap();
        assert!(matches!(session.capture(), Err(SessionError::CameraInactive)));
        assert_eq!(session.last_error(), Some("Camera is not active"));
    }

    #[test]
    fn test_operations_rejected_after_teardown() {
        let mut session = CaptureSession::new(SessionSettings::default());
        session.teardown();
        assert!(session.is_shut_down());
        assert!(matches!(session.switch_to_live(), Err(SessionError::ShutDown)));
        assert!(matches!(session.upload(b"x", None), Err(SessionError::ShutDown)));
    }

    #[test]
    fn test_status_line_reflects_state() {
        let mut session = CaptureSession::new(SessionSettings::default());
        assert!(session.status_line().contains("Upload an image"));

        let request = session.switch_to_live().unwrap();
        assert!(session.status_line().contains("Permission Required"));

        session.stream_acquired(
            request.ticket,
            Err(AcquireError::DeviceBusy { device_id: None }),
        );
        let line = session.status_line();
        assert!(line.contains("Camera Unavailable"));
        assert!(line.contains("already in use"));
    }
}
