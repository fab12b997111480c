//! CLI argument parsing with clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Identify objects from a camera or an uploaded image
#[derive(Parser, Debug)]
#[command(name = "visioniq")]
#[command(version, about = "Identify objects from a camera or an uploaded image", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Config file path
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List available cameras
    ListDevices,
    /// Identify the object in an image file
    Identify {
        /// Image to upload (PNG, JPEG, GIF, WebP or BMP)
        file: PathBuf,
    },
    /// Capture a still from the camera and identify it
    Capture {
        /// Camera device id (from list-devices)
        #[arg(long, short)]
        device: Option<String>,

        /// Write the captured still to this path
        #[arg(long)]
        save: Option<PathBuf>,

        /// Seconds to wait for the camera and the result
        #[arg(long, default_value = "15", value_parser = parse_timeout)]
        timeout: u64,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Show current configuration
    Show,
    /// Create default config file
    Init,
}

/// Parse and validate a timeout (1-600 seconds)
fn parse_timeout(s: &str) -> Result<u64, String> {
    let secs: u64 = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid number of seconds", s))?;
    if !(1..=600).contains(&secs) {
        return Err(format!(
            "Timeout must be between 1 and 600 seconds, got {}",
            secs
        ));
    }
    Ok(secs)
}
