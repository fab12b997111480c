//! Camera permission state as reported by the platform.
//!
//! The permission subsystem belongs to the platform, not to the capture
//! session. The session only observes it, through a [`PermissionSource`]
//! subscription injected at construction time.

use std::fmt;
use std::str::FromStr;

use tokio::sync::watch;

/// Camera permission as seen by the capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PermissionState {
    /// The user has not decided yet; acquiring a stream will prompt.
    #[default]
    Prompt,
    Granted,
    Denied,
    /// No usable device, the device is busy, or the capability is missing.
    Unavailable,
}

impl PermissionState {
    pub fn name(&self) -> &'static str {
        match self {
            PermissionState::Prompt => "prompt",
            PermissionState::Granted => "granted",
            PermissionState::Denied => "denied",
            PermissionState::Unavailable => "unavailable",
        }
    }

    /// Title shown in the permission overlay for this state.
    pub fn headline(&self) -> &'static str {
        match self {
            PermissionState::Prompt => "Camera Permission Required",
            PermissionState::Granted => "Camera Ready",
            PermissionState::Denied => "Camera Access Denied",
            PermissionState::Unavailable => "Camera Unavailable",
        }
    }

    /// Advice shown under the headline.
    pub fn guidance(&self) -> &'static str {
        match self {
            PermissionState::Prompt => {
                "VisionIQ needs access to your camera to identify objects in real-time."
            }
            PermissionState::Granted => "The camera is streaming.",
            PermissionState::Denied => {
                "You've denied camera access. Please enable camera permissions in your system settings."
            }
            PermissionState::Unavailable => {
                "Camera is not available on this device or platform."
            }
        }
    }
}

impl fmt::Display for PermissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PermissionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prompt" => Ok(PermissionState::Prompt),
            "granted" => Ok(PermissionState::Granted),
            "denied" => Ok(PermissionState::Denied),
            "unavailable" => Ok(PermissionState::Unavailable),
            other => Err(format!(
                "Unknown permission state '{}'. Expected prompt, granted, denied or unavailable",
                other
            )),
        }
    }
}

/// Platform permission subsystem.
pub trait PermissionSource: Send + Sync {
    /// Subscribe to camera permission changes.
    ///
    /// Returns `None` when the platform cannot report permission status; the
    /// session then learns about permission only from acquisition results.
    fn subscribe(&self) -> Option<watch::Receiver<PermissionState>>;
}

/// A permission source driven by hand, for platforms that report status
/// through callbacks and for tests.
pub struct ManualPermission {
    tx: watch::Sender<PermissionState>,
}

impl ManualPermission {
    pub fn new(initial: PermissionState) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    pub fn current(&self) -> PermissionState {
        *self.tx.borrow()
    }

    /// Publish a new state. Subscribers are only woken on actual changes.
    pub fn set(&self, state: PermissionState) {
        self.tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                log::debug!("Camera permission changed: {} -> {}", current, state);
                *current = state;
                true
            }
        });
    }
}

impl Default for ManualPermission {
    fn default() -> Self {
        Self::new(PermissionState::Prompt)
    }
}

impl PermissionSource for ManualPermission {
    fn subscribe(&self) -> Option<watch::Receiver<PermissionState>> {
        Some(self.tx.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_state_names() {
        assert_eq!(PermissionState::Prompt.name(), "prompt");
        assert_eq!(PermissionState::Granted.name(), "granted");
        assert_eq!(PermissionState::Denied.name(), "denied");
        assert_eq!(PermissionState::Unavailable.name(), "unavailable");
    }

    #[test]
    fn test_permission_state_default_is_prompt() {
        assert_eq!(PermissionState::default(), PermissionState::Prompt);
    }

    #[test]
    fn test_permission_state_from_str() {
        assert_eq!("granted".parse::<PermissionState>(), Ok(PermissionState::Granted));
        assert_eq!(" Denied ".parse::<PermissionState>(), Ok(PermissionState::Denied));
        assert!("maybe".parse::<PermissionState>().is_err());
    }

    #[test]
    fn test_headlines_distinguish_denied_and_unavailable() {
        assert_ne!(
            PermissionState::Denied.headline(),
            PermissionState::Unavailable.headline()
        );
        assert!(PermissionState::Denied.guidance().contains("denied"));
    }

    #[test]
    fn test_manual_permission_notifies_on_change_only() {
        let source = ManualPermission::default();
        let mut rx = source.subscribe().unwrap();
        assert!(!rx.has_changed().unwrap());

        source.set(PermissionState::Prompt);
        assert!(!rx.has_changed().unwrap());

        source.set(PermissionState::Granted);
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), PermissionState::Granted);
        assert_eq!(source.current(), PermissionState::Granted);
    }
}
