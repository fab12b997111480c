//! Shared fakes for the session and controller tests.

#![allow(dead_code)]

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use visioniq::devices::{DeviceEnumerator, EnumerationError, VideoDevice};
use visioniq::stream::{
    AcquireError, MediaStream, MediaStreamProvider, MediaTrack, StreamError, TrackKind,
};

/// Counts acquisitions and track stops, and keeps them in order.
#[derive(Default)]
pub struct Recorder {
    acquisitions: AtomicUsize,
    stops: AtomicUsize,
    log: Mutex<Vec<String>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn push(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }
}

struct FakeTrack {
    live: bool,
    device_id: String,
    recorder: Arc<Recorder>,
}

impl MediaTrack for FakeTrack {
    fn kind(&self) -> TrackKind {
        TrackKind::Video
    }

    fn is_live(&self) -> bool {
        self.live
    }

    fn stop(&mut self) {
        if self.live {
            self.live = false;
            self.recorder.stops.fetch_add(1, Ordering::SeqCst);
            self.recorder.push(format!("stop:{}", self.device_id));
        }
    }
}

struct FakeStream {
    device_id: String,
    track: FakeTrack,
}

impl MediaStream for FakeStream {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn tracks_mut(&mut self) -> Vec<&mut dyn MediaTrack> {
        vec![&mut self.track as &mut dyn MediaTrack]
    }

    fn current_frame(&mut self) -> Result<RgbImage, StreamError> {
        if !self.track.live {
            return Err(StreamError::Ended);
        }
        Ok(RgbImage::from_pixel(160, 120, Rgb([10, 200, 30])))
    }
}

/// A freshly acquired single-track stream on `device_id`.
pub fn fake_stream(recorder: &Arc<Recorder>, device_id: &str) -> Box<dyn MediaStream> {
    recorder.acquisitions.fetch_add(1, Ordering::SeqCst);
    recorder.push(format!("acquire:{}", device_id));
    Box::new(FakeStream {
        device_id: device_id.to_string(),
        track: FakeTrack {
            live: true,
            device_id: device_id.to_string(),
            recorder: recorder.clone(),
        },
    })
}

/// Stream provider that blocks every acquisition until the test releases
/// it, so completions can be made to arrive late.
pub struct GatedProvider {
    recorder: Arc<Recorder>,
    gate: Mutex<mpsc::Receiver<()>>,
}

impl GatedProvider {
    pub fn new(recorder: Arc<Recorder>) -> (Self, mpsc::Sender<()>) {
        let (tx, rx) = mpsc::channel();
        let provider = Self {
            recorder,
            gate: Mutex::new(rx),
        };
        (provider, tx)
    }
}

impl MediaStreamProvider for GatedProvider {
    fn acquire(&self, device_id: Option<&str>) -> Result<Box<dyn MediaStream>, AcquireError> {
        let gate = self.gate.lock().unwrap();
        gate.recv()
            .map_err(|_| AcquireError::Other("gate closed".to_string()))?;
        Ok(fake_stream(&self.recorder, device_id.unwrap_or("default")))
    }
}

/// Stream provider that opens a fake stream on the requested device right
/// away.
pub struct RecordingProvider(pub Arc<Recorder>);

impl MediaStreamProvider for RecordingProvider {
    fn acquire(&self, device_id: Option<&str>) -> Result<Box<dyn MediaStream>, AcquireError> {
        Ok(fake_stream(&self.0, device_id.unwrap_or("default")))
    }
}

/// Enumerator that blocks every listing until the test releases it.
pub struct GatedDevices {
    devices: Vec<VideoDevice>,
    gate: Mutex<mpsc::Receiver<()>>,
}

impl GatedDevices {
    pub fn new(devices: Vec<VideoDevice>) -> (Self, mpsc::Sender<()>) {
        let (tx, rx) = mpsc::channel();
        let enumerator = Self {
            devices,
            gate: Mutex::new(rx),
        };
        (enumerator, tx)
    }
}

impl DeviceEnumerator for GatedDevices {
    fn list_video_input_devices(&self) -> Result<Vec<VideoDevice>, EnumerationError> {
        let gate = self.gate.lock().unwrap();
        gate.recv()
            .map_err(|_| EnumerationError::Failed("gate closed".to_string()))?;
        Ok(self.devices.clone())
    }
}

/// Enumerator returning a fixed listing.
pub struct FixedDevices(pub Vec<VideoDevice>);

impl DeviceEnumerator for FixedDevices {
    fn list_video_input_devices(&self) -> Result<Vec<VideoDevice>, EnumerationError> {
        Ok(self.0.clone())
    }
}

/// `camA`, `camB` with labels.
pub fn two_devices() -> Vec<VideoDevice> {
    vec![
        VideoDevice::new("camA", "Front Camera"),
        VideoDevice::new("camB", "Back Camera"),
    ]
}

/// Encode a solid-color image in `format`.
pub fn encoded_image(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb([90, 60, 30]));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut out, format)
        .unwrap();
    out.into_inner()
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    encoded_image(width, height, ImageFormat::Png)
}
