//! visioniq library crate.
//!
//! The core is [`session::CaptureSession`], the camera acquisition and
//! still capture lifecycle. [`controller::CameraController`] drives it on
//! tokio against injected collaborators: a device enumerator, a media
//! stream provider, a permission source and an identification backend.

pub mod capture;
pub mod cli;
pub mod config;
pub mod controller;
pub mod devices;
pub mod identify;
pub mod permissions;
pub mod session;
pub mod simulated;
pub mod stream;
