//! Subcommand handlers.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::args::ConfigAction;
use crate::capture::{read_upload, UploadError};
use crate::config::{default_path, Config, ConfigError, IdentifyBackend, DEFAULT_CONFIG};
use crate::controller::{CameraController, ControllerError, ControllerHandle};
use crate::devices::{
    default_device_id, display_label, DeviceEnumerator, DeviceListing, EnumerationError,
};
use crate::identify::IdentifyError;
use crate::session::{Identification, SessionSnapshot, SessionState};

/// Errors surfaced by the command-line front end.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Config file already exists: {}", .0.display())]
    ConfigExists(PathBuf),

    #[error(transparent)]
    Identify(#[from] IdentifyError),

    #[error(transparent)]
    Controller(#[from] ControllerError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Devices(#[from] EnumerationError),

    /// The camera never became active.
    #[error("{0}")]
    Camera(String),

    #[error("Identification failed: {0}")]
    IdentificationFailed(String),

    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("Interrupted")]
    Interrupted,

    #[error("Failed to write '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to encode JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to start async runtime: {0}")]
    Runtime(std::io::Error),

    #[error("Failed to set Ctrl-C handler: {0}")]
    Signal(#[from] ctrlc::Error),
}

/// List available cameras and print them to stdout.
pub fn list_devices(config: &Config, json: bool) -> Result<(), CliError> {
    let camera = config.simulated_camera();
    let devices = camera.list_video_input_devices()?;
    let selected = config
        .camera
        .device
        .as_deref()
        .filter(|id| devices.iter().any(|d| d.device_id == *id))
        .or_else(|| default_device_id(&devices));

    if json {
        let entries: Vec<serde_json::Value> = devices
            .iter()
            .enumerate()
            .map(|(i, d)| {
                serde_json::json!({
                    "deviceId": d.device_id,
                    "label": display_label(d, i),
                    "selected": Some(d.device_id.as_str()) == selected,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if devices.is_empty() {
        println!("No cameras found.");
        println!();
        println!("Make sure your camera is connected and permissions are granted.");
        return Ok(());
    }
    print!("{}", DeviceListing(&devices, selected));
    if devices.iter().all(|d| d.label.is_empty()) {
        println!();
        println!("Device names are shown once camera access has been granted.");
    }
    println!();
    println!("Use --device <id> to select a camera.");
    Ok(())
}

/// Upload flow: submit `path` and print the identification.
pub async fn identify_file(config: &Config, path: &Path, json: bool) -> Result<(), CliError> {
    let bytes = read_upload(path, &config.upload)?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned());

    let (handle, task) = CameraController::spawn(config.backend()?, config.session_settings());
    install_ctrlc(&handle)?;

    let outcome = async {
        handle.upload(bytes, file_name).await?;
        log::info!("Analyzing image...");
        let snapshot = handle
            .wait_for(|s| s.identification.is_some() || s.shut_down)
            .await?;
        print_outcome(&snapshot, json)
    }
    .await;

    stop(handle, task).await;
    outcome
}

/// Live flow: open the camera, capture one still, identify it, release the
/// camera.
pub async fn capture(
    config: &Config,
    device: Option<String>,
    save: Option<PathBuf>,
    timeout_secs: u64,
    json: bool,
) -> Result<(), CliError> {
    let (handle, task) = CameraController::spawn(config.backend()?, config.session_settings());
    install_ctrlc(&handle)?;

    let outcome = async {
        if let Some(device) = device {
            handle.select_device(device).await?;
        }
        handle.switch_to_live().await?;

        let snapshot = within(
            timeout_secs,
            "the camera",
            handle.wait_for(|s| s.shut_down || s.state != SessionState::AwaitingPermission),
        )
        .await?;
        if snapshot.shut_down {
            return Err(CliError::Interrupted);
        }
        if snapshot.state != SessionState::Active {
            let message = snapshot
                .last_error
                .clone()
                .unwrap_or_else(|| snapshot.state.to_string());
            return Err(CliError::Camera(message));
        }

        handle.capture().await?;
        log::info!("Analyzing image...");
        let snapshot = within(
            timeout_secs,
            "identification",
            handle.wait_for(|s| s.identification.is_some() || s.shut_down),
        )
        .await?;

        if let (Some(path), Some(image)) = (save.as_ref(), snapshot.image.as_ref()) {
            std::fs::write(path, image.encoded()).map_err(|e| CliError::Io {
                path: path.clone(),
                source: e,
            })?;
            log::info!("Saved still to {}", path.display());
        }
        print_outcome(&snapshot, json)?;

        // Release the camera before the controller goes away
        handle.switch_to_upload().await?;
        Ok(())
    }
    .await;

    stop(handle, task).await;
    outcome
}

/// Handle config subcommand actions.
pub fn handle_config_action(action: ConfigAction, path: Option<&Path>) -> Result<(), CliError> {
    let config_path = path.map(Path::to_path_buf).unwrap_or_else(default_path);
    match action {
        ConfigAction::Show => {
            let config = Config::load_from(path)?;
            println!("Current configuration:");
            println!(
                "  Camera: {}",
                config.camera.device.as_deref().unwrap_or("(last listed)")
            );
            println!("  Simulated devices: {}", config.camera.devices.join(", "));
            println!("  Simulated failure: {:?}", config.camera.failure);
            println!("  Capture size: {}", config.capture.resolution);
            println!(
                "  Upload limits: {} bytes, {}px",
                config.upload.max_bytes, config.upload.max_dimension
            );
            match config.identify.backend {
                IdentifyBackend::Mock => println!(
                    "  Identify: mock ({} ms delay)",
                    config.identify.mock_delay_ms
                ),
                IdentifyBackend::Remote => println!(
                    "  Identify: remote {} (timeout {}s, {} retries)",
                    config.identify.base_url,
                    config.identify.timeout_secs,
                    config.identify.max_retries
                ),
            }
            println!();

            if config_path.exists() {
                println!("Config file: {} (exists)", config_path.display());
            } else {
                println!("Config file: {} (not found)", config_path.display());
            }
        }
        ConfigAction::Init => {
            if config_path.exists() {
                return Err(CliError::ConfigExists(config_path));
            }

            // Create parent directories if needed
            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| CliError::Io {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
            std::fs::write(&config_path, DEFAULT_CONFIG).map_err(|e| CliError::Io {
                path: config_path.clone(),
                source: e,
            })?;

            println!("Created config file: {}", config_path.display());
        }
    }
    Ok(())
}

fn print_outcome(snapshot: &SessionSnapshot, json: bool) -> Result<(), CliError> {
    match &snapshot.identification {
        Some(Identification::Identified(result)) => {
            if json {
                println!("{}", serde_json::to_string_pretty(result)?);
            } else {
                if let Some(image) = &snapshot.image {
                    println!(
                        "Image: {}x{} {} ({})",
                        image.width(),
                        image.height(),
                        image.mime_type(),
                        image.short_digest()
                    );
                }
                print!("{}", result);
            }
            Ok(())
        }
        Some(Identification::Failed(message)) => {
            Err(CliError::IdentificationFailed(message.clone()))
        }
        None => Err(CliError::Interrupted),
    }
}

async fn within<T>(
    secs: u64,
    what: &'static str,
    pending: impl Future<Output = Result<T, ControllerError>>,
) -> Result<T, CliError> {
    tokio::time::timeout(Duration::from_secs(secs), pending)
        .await
        .map_err(|_| CliError::Timeout(what))?
        .map_err(CliError::from)
}

/// Ctrl-C tears the session down so the camera is always released.
fn install_ctrlc(handle: &ControllerHandle) -> Result<(), CliError> {
    let handle = handle.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nReceived Ctrl+C, shutting down...");
        handle.shutdown();
    })?;
    Ok(())
}

async fn stop(handle: ControllerHandle, task: tokio::task::JoinHandle<()>) {
    handle.shutdown();
    if let Err(e) = task.await {
        log::error!("Capture controller task failed: {}", e);
    }
}
