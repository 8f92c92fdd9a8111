//! Video source seam
//!
//! A source yields RGB frames at its own cadence. `read` returning `None`
//! means "nothing right now", never "finished"; the capture task retries
//! after a short pause. Sources are driven from a blocking thread, so a
//! blocking `read` is fine.

use crate::{CvError, CvResult};
use image::{Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub trait VideoSource: Send {
    /// Next frame, or `None` when temporarily unavailable
    fn read(&mut self) -> Option<RgbImage>;

    /// Free the underlying device; later reads return `None`
    fn release(&mut self);

    fn describe(&self) -> String;
}

/// Which source to open at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Synthetic,
    ImageDir,
    Camera,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub kind: SourceKind,
    /// Directory of still images (`image_dir`)
    pub path: Option<PathBuf>,
    /// Restart from the first image when the directory runs out
    pub looping: bool,
    /// Device index (`camera`)
    pub camera_index: i32,
    pub width: u32,
    pub height: u32,
    /// Target frame rate; 0 reads as fast as the source allows
    pub fps: f64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::Synthetic,
            path: None,
            looping: true,
            camera_index: 0,
            width: 640,
            height: 480,
            fps: 30.0,
        }
    }
}

impl SourceConfig {
    pub fn validate(&self) -> CvResult<()> {
        self.frame_interval().map(|_| ())
    }

    /// Pause between frames; `None` when unpaced
    fn frame_interval(&self) -> CvResult<Option<Duration>> {
        if self.fps == 0.0 {
            return Ok(None);
        }
        if !(self.fps > 0.0 && self.fps.is_finite()) {
            return Err(CvError::invalid_config(format!("source.fps must be >= 0, got {}", self.fps)));
        }
        Duration::try_from_secs_f64(1.0 / self.fps)
            .map(Some)
            .map_err(|_| CvError::invalid_config(format!("source.fps {} is too small", self.fps)))
    }
}

/// Open the configured source; failure here is fatal for the process
pub fn open_source(config: &SourceConfig) -> CvResult<Box<dyn VideoSource>> {
    let source: Box<dyn VideoSource> = match config.kind {
        SourceKind::Synthetic => Box::new(SyntheticSource::new(
            config.width,
            config.height,
            config.frame_interval()?,
        )?),
        SourceKind::ImageDir => {
            let path = config
                .path
                .as_deref()
                .ok_or_else(|| CvError::invalid_config("source.path is required for image_dir"))?;
            Box::new(ImageDirSource::open(path, config.looping, config.frame_interval()?)?)
        }
        SourceKind::Camera => open_camera(config)?,
    };
    info!("📹 Video source opened: {}", source.describe());
    Ok(source)
}

#[cfg(feature = "opencv")]
fn open_camera(config: &SourceConfig) -> CvResult<Box<dyn VideoSource>> {
    Ok(Box::new(CameraSource::open(
        config.camera_index,
        config.width,
        config.height,
        config.fps,
    )?))
}

#[cfg(not(feature = "opencv"))]
fn open_camera(_config: &SourceConfig) -> CvResult<Box<dyn VideoSource>> {
    Err(CvError::ResourceUnavailable(
        "camera capture requires the `opencv` feature".to_string(),
    ))
}

/// Sleeps out the remainder of a frame interval
#[derive(Debug)]
struct Pacer {
    interval: Option<Duration>,
    last: Option<Instant>,
}

impl Pacer {
    fn new(interval: Option<Duration>) -> Self {
        Self { interval, last: None }
    }

    fn wait(&mut self) {
        if let (Some(interval), Some(last)) = (self.interval, self.last) {
            let elapsed = last.elapsed();
            if elapsed < interval {
                std::thread::sleep(interval - elapsed);
            }
        }
        self.last = Some(Instant::now());
    }
}

// ============================================================================
// IMAGE DIRECTORY
// ============================================================================

/// Replays still images from a directory in name order
pub struct ImageDirSource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    cursor: usize,
    looping: bool,
    released: bool,
    pacer: Pacer,
}

impl ImageDirSource {
    pub fn open(dir: &Path, looping: bool, interval: Option<Duration>) -> CvResult<Self> {
        let entries = std::fs::read_dir(dir)
            .map_err(|e| CvError::source(format!("{}: {}", dir.display(), e)))?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| is_image_file(p))
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(CvError::source(format!("no images found in {}", dir.display())));
        }
        debug!("Found {} images in {}", files.len(), dir.display());

        Ok(Self {
            dir: dir.to_path_buf(),
            files,
            cursor: 0,
            looping,
            released: false,
            pacer: Pacer::new(interval),
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| matches!(e.to_ascii_lowercase().as_str(), "jpg" | "jpeg" | "png"))
        .unwrap_or(false)
}

impl VideoSource for ImageDirSource {
    fn read(&mut self) -> Option<RgbImage> {
        if self.released {
            return None;
        }
        if self.cursor >= self.files.len() {
            if !self.looping {
                return None;
            }
            self.cursor = 0;
        }

        self.pacer.wait();
        let path = &self.files[self.cursor];
        self.cursor += 1;

        match image::open(path) {
            Ok(img) => Some(img.to_rgb8()),
            Err(e) => {
                warn!("Skipping unreadable image {}: {}", path.display(), e);
                None
            }
        }
    }

    fn release(&mut self) {
        self.released = true;
    }

    fn describe(&self) -> String {
        format!("image directory {} ({} files)", self.dir.display(), self.files.len())
    }
}

// ============================================================================
// SYNTHETIC
// ============================================================================

/// Generated frames with a box sweeping across a plain background
pub struct SyntheticSource {
    width: u32,
    height: u32,
    frame: u64,
    released: bool,
    pacer: Pacer,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32, interval: Option<Duration>) -> CvResult<Self> {
        if width < 16 || height < 16 {
            return Err(CvError::invalid_config(format!(
                "synthetic source needs at least 16x16, got {}x{}",
                width, height
            )));
        }
        Ok(Self {
            width,
            height,
            frame: 0,
            released: false,
            pacer: Pacer::new(interval),
        })
    }

    fn render(&self) -> RgbImage {
        let mut img = RgbImage::from_pixel(self.width, self.height, Rgb([96, 128, 96]));
        let size = (self.width.min(self.height) / 6).max(4);
        let span = self.width - size;
        let x0 = (self.frame * 4 % span as u64) as u32;
        let y0 = (self.height - size) / 2;
        for y in y0..y0 + size {
            for x in x0..x0 + size {
                img.put_pixel(x, y, Rgb([139, 90, 43]));
            }
        }
        img
    }
}

impl VideoSource for SyntheticSource {
    fn read(&mut self) -> Option<RgbImage> {
        if self.released {
            return None;
        }
        self.pacer.wait();
        let img = self.render();
        self.frame += 1;
        Some(img)
    }

    fn release(&mut self) {
        self.released = true;
    }

    fn describe(&self) -> String {
        format!("synthetic {}x{}", self.width, self.height)
    }
}

// ============================================================================
// CAMERA (OpenCV)
// ============================================================================

#[cfg(feature = "opencv")]
pub use camera::CameraSource;

#[cfg(feature = "opencv")]
mod camera {
    use super::VideoSource;
    use crate::CvResult;
    use image::RgbImage;
    use opencv::{
        core::Mat,
        imgproc,
        prelude::*,
        videoio::{self, VideoCapture, VideoCaptureAPIs},
    };
    use tracing::{debug, warn};

    /// Capture device through OpenCV's VideoCapture
    pub struct CameraSource {
        capture: VideoCapture,
        index: i32,
        width: u32,
        height: u32,
    }

    impl CameraSource {
        pub fn open(index: i32, width: u32, height: u32, fps: f64) -> CvResult<Self> {
            let mut capture = VideoCapture::new(index, VideoCaptureAPIs::CAP_ANY as i32)?;
            if !capture.is_opened()? {
                return Err(crate::CvError::source(format!("camera {} is not available", index)));
            }

            capture.set(videoio::CAP_PROP_FRAME_WIDTH, width as f64)?;
            capture.set(videoio::CAP_PROP_FRAME_HEIGHT, height as f64)?;
            if fps > 0.0 {
                capture.set(videoio::CAP_PROP_FPS, fps)?;
            }
            capture.set(videoio::CAP_PROP_BUFFERSIZE, 1.0)?;

            let actual_width = capture.get(videoio::CAP_PROP_FRAME_WIDTH)? as u32;
            let actual_height = capture.get(videoio::CAP_PROP_FRAME_HEIGHT)? as u32;
            debug!(
                "Camera {} opened at {}x{} ({} fps)",
                index,
                actual_width,
                actual_height,
                capture.get(videoio::CAP_PROP_FPS)?
            );

            Ok(Self {
                capture,
                index,
                width: actual_width,
                height: actual_height,
            })
        }

        fn read_rgb(&mut self) -> CvResult<Option<RgbImage>> {
            let mut bgr = Mat::default();
            if !self.capture.read(&mut bgr)? || bgr.empty() {
                return Ok(None);
            }

            let mut rgb = Mat::default();
            imgproc::cvt_color(&bgr, &mut rgb, imgproc::COLOR_BGR2RGB, 0)?;
            let rgb = if rgb.is_continuous() { rgb } else { rgb.try_clone()? };

            let (cols, rows) = (rgb.cols() as u32, rgb.rows() as u32);
            let bytes = rgb.data_bytes()?.to_vec();
            Ok(RgbImage::from_raw(cols, rows, bytes))
        }
    }

    impl VideoSource for CameraSource {
        fn read(&mut self) -> Option<RgbImage> {
            match self.read_rgb() {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("Camera read failed: {}", e);
                    None
                }
            }
        }

        fn release(&mut self) {
            if let Err(e) = self.capture.release() {
                warn!("Camera release failed: {}", e);
            }
        }

        fn describe(&self) -> String {
            format!("camera {} ({}x{})", self.index, self.width, self.height)
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("sight-cv-{}-{}", tag, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_frame_interval_from_fps() {
        let config = |fps| SourceConfig {
            fps,
            ..Default::default()
        };
        assert_eq!(config(0.0).frame_interval().unwrap(), None);
        assert_eq!(config(4.0).frame_interval().unwrap(), Some(Duration::from_millis(250)));
        assert!(config(1e-30).validate().is_err());
        assert!(config(-1.0).validate().is_err());
        assert!(config(f64::NAN).validate().is_err());
        assert!(config(f64::INFINITY).validate().is_err());
        assert!(matches!(
            open_source(&config(1e-30)),
            Err(CvError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_synthetic_frames() {
        let mut source = SyntheticSource::new(64, 48, None).unwrap();
        let a = source.read().unwrap();
        let b = source.read().unwrap();
        assert_eq!(a.dimensions(), (64, 48));
        assert_ne!(a, b);

        source.release();
        assert!(source.read().is_none());
    }

    #[test]
    fn test_synthetic_rejects_tiny_frames() {
        assert!(SyntheticSource::new(8, 8, None).is_err());
    }

    #[test]
    fn test_image_dir_missing_or_empty() {
        let missing = std::env::temp_dir().join("sight-cv-does-not-exist");
        assert!(matches!(ImageDirSource::open(&missing, true, None), Err(CvError::Source(_))));

        let empty = temp_dir("empty");
        std::fs::write(empty.join("notes.txt"), "x").unwrap();
        assert!(ImageDirSource::open(&empty, true, None).is_err());
        let _ = std::fs::remove_dir_all(&empty);
    }

    #[test]
    fn test_image_dir_replay() {
        let dir = temp_dir("replay");
        RgbImage::from_pixel(10, 10, Rgb([255, 0, 0])).save(dir.join("a.png")).unwrap();
        RgbImage::from_pixel(10, 10, Rgb([0, 0, 255])).save(dir.join("b.png")).unwrap();

        let mut source = ImageDirSource::open(&dir, false, None).unwrap();
        assert_eq!(source.len(), 2);
        assert_eq!(source.read().unwrap().get_pixel(0, 0), &Rgb([255, 0, 0]));
        assert_eq!(source.read().unwrap().get_pixel(0, 0), &Rgb([0, 0, 255]));
        assert!(source.read().is_none());

        let mut looping = ImageDirSource::open(&dir, true, None).unwrap();
        looping.read();
        looping.read();
        assert_eq!(looping.read().unwrap().get_pixel(0, 0), &Rgb([255, 0, 0]));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[cfg(not(feature = "opencv"))]
    #[test]
    fn test_camera_needs_feature() {
        let config = SourceConfig {
            kind: SourceKind::Camera,
            ..SourceConfig::default()
        };
        assert!(matches!(open_source(&config), Err(CvError::ResourceUnavailable(_))));
    }
}
