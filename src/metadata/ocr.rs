//! Caption recognition for image sources
//!
//! The printed caption of a schedule image is cropped, PNG-encoded and fed to
//! a [`TextRecognizer`]. Any failure along the way is logged and treated as
//! "no metadata".

use std::io::{Cursor, Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use image::{DynamicImage, GenericImageView, ImageFormat};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::SourceMetadata;
use crate::utils::error::OcrError;

/// Rectangle in image pixels, right and bottom exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRect {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl CropRect {
    pub const fn new(left: u32, top: u32, right: u32, bottom: u32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Intersection with a `width` x `height` image as (x, y, w, h)
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let right = self.right.min(width);
        let bottom = self.bottom.min(height);

        if self.left >= right || self.top >= bottom {
            return None;
        }

        Some((self.left, self.top, right - self.left, bottom - self.top))
    }
}

/// OCR settings of an image source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Run OCR at all; when off, metadata always falls back
    pub enabled: bool,

    /// Recognizer binary
    pub command: PathBuf,

    /// Recognizer language set
    pub languages: String,

    /// Page segmentation mode
    pub psm: u8,

    /// Recognizer is killed after this many seconds
    pub timeout_secs: u64,

    /// Caption area of the image
    pub caption: CropRect,
}

impl OcrConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: PathBuf::from("tesseract"),
            languages: String::from("ukr+eng"),
            psm: 6,
            timeout_secs: 30,
            caption: CropRect::new(0, 0, 1000, 400),
        }
    }
}

/// Turns an image into text
pub trait TextRecognizer: Send + Sync {
    /// Recognize the text of a PNG-encoded image
    fn recognize(&self, png: &[u8]) -> Result<String, OcrError>;
}

/// The `tesseract` command-line engine, image on stdin, text on stdout
#[derive(Debug, Clone)]
pub struct TesseractCli {
    command: PathBuf,
    languages: String,
    psm: u8,
    timeout: Duration,
}

const POLL_INTERVAL: Duration = Duration::from_millis(20);

impl TesseractCli {
    pub fn new(config: &OcrConfig) -> Self {
        Self {
            command: config.command.clone(),
            languages: config.languages.clone(),
            psm: config.psm,
            timeout: config.timeout(),
        }
    }

    fn args(&self) -> Vec<String> {
        vec![
            "stdin".to_string(),
            "stdout".to_string(),
            "-l".to_string(),
            self.languages.clone(),
            "--psm".to_string(),
            self.psm.to_string(),
        ]
    }
}

impl Default for TesseractCli {
    fn default() -> Self {
        Self::new(&OcrConfig::default())
    }
}

impl TextRecognizer for TesseractCli {
    /// Runs the engine with the image on stdin; the child is killed and
    /// reaped on timeout or on any I/O error while it runs.
    fn recognize(&self, png: &[u8]) -> Result<String, OcrError> {
        let mut child = Command::new(&self.command)
            .args(self.args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // Pipes are serviced on helper threads while this one polls
        let writer = feed(child.stdin.take(), png.to_vec());
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = match wait_until(&mut child, self.timeout) {
            Ok(Some(status)) => status,
            Ok(None) => {
                reap(&mut child);
                return Err(OcrError::Timeout(self.timeout));
            }
            Err(e) => {
                reap(&mut child);
                return Err(e.into());
            }
        };

        let stdout = stdout.join().unwrap_or_default();
        let stderr = stderr.join().unwrap_or_default();

        if !status.success() {
            return Err(OcrError::Engine(format!(
                "{} exited with {}: {}",
                self.command.display(),
                status,
                String::from_utf8_lossy(&stderr).trim()
            )));
        }

        match writer.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(OcrError::Engine("stdin writer panicked".to_string())),
        }

        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }
}

fn feed(stdin: Option<impl Write + Send + 'static>, input: Vec<u8>) -> JoinHandle<std::io::Result<()>> {
    thread::spawn(move || match stdin {
        Some(mut stdin) => stdin.write_all(&input),
        None => Ok(()),
    })
}

fn drain(pipe: Option<impl Read + Send + 'static>) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

/// Exit status, or `None` once `timeout` has passed
fn wait_until(child: &mut Child, timeout: Duration) -> std::io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn reap(child: &mut Child) {
    if let Err(e) = child.kill() {
        debug!(error = %e, "OCR engine already gone");
    }
    if let Err(e) = child.wait() {
        warn!(error = %e, "Failed to reap OCR engine");
    }
}

/// Reads the caption of a decoded schedule image
pub struct ImageMetadataReader {
    recognizer: Box<dyn TextRecognizer>,
    caption: CropRect,
}

impl ImageMetadataReader {
    pub fn new(recognizer: Box<dyn TextRecognizer>, caption: CropRect) -> Self {
        Self {
            recognizer,
            caption,
        }
    }

    /// Recognize the caption and extract date and time from it
    ///
    /// Never fails: OCR errors, empty text and pattern misses all yield an
    /// empty [`SourceMetadata`].
    pub fn read(&self, image: &DynamicImage) -> SourceMetadata {
        match self.caption_text(image) {
            Ok(text) => {
                let metadata = SourceMetadata::from_text(&text);
                if metadata.is_empty() {
                    warn!(text = %super::flatten(&text).trim(), "Caption has no date or time");
                } else {
                    debug!(date = ?metadata.date, as_of = ?metadata.as_of_time, "Caption recognized");
                }
                metadata
            }
            Err(e) => {
                warn!(error = %e, "Caption recognition failed");
                SourceMetadata::default()
            }
        }
    }

    fn caption_text(&self, image: &DynamicImage) -> Result<String, OcrError> {
        let (width, height) = image.dimensions();
        let (x, y, w, h) = self
            .caption
            .clamp_to(width, height)
            .ok_or_else(|| OcrError::Engine("caption area lies outside the image".to_string()))?;

        let crop = image.crop_imm(x, y, w, h);
        let mut png = Cursor::new(Vec::new());
        crop.write_to(&mut png, ImageFormat::Png)?;

        let text = self.recognizer.recognize(png.get_ref())?;
        if text.trim().is_empty() {
            return Err(OcrError::Empty);
        }

        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};
    use image::RgbImage;
    use std::sync::{Arc, Mutex};

    struct FakeRecognizer {
        reply: Result<String, String>,
        seen: Arc<Mutex<Vec<(u32, u32)>>>,
    }

    impl TextRecognizer for FakeRecognizer {
        fn recognize(&self, png: &[u8]) -> Result<String, OcrError> {
            let img = image::load_from_memory(png)?;
            self.seen.lock().unwrap().push(img.dimensions());
            self.reply.clone().map_err(OcrError::Engine)
        }
    }

    fn make_reader(reply: Result<&str, &str>) -> (ImageMetadataReader, Arc<Mutex<Vec<(u32, u32)>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recognizer = FakeRecognizer {
            reply: reply.map(str::to_string).map_err(str::to_string),
            seen: Arc::clone(&seen),
        };
        (
            ImageMetadataReader::new(Box::new(recognizer), CropRect::new(0, 0, 1000, 400)),
            seen,
        )
    }

    fn blank(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::new(width, height))
    }

    #[test]
    fn test_crop_clamped_to_image() {
        assert_eq!(CropRect::new(0, 0, 1000, 400).clamp_to(600, 300), Some((0, 0, 600, 300)));
        assert_eq!(CropRect::new(700, 0, 1000, 400).clamp_to(600, 300), None);
    }

    #[test]
    fn test_read_caption() {
        let (reader, seen) = make_reader(Ok("Графік погодинних\nвідключень на 14.03.2026\nстаном на 06:15"));
        let meta = reader.read(&blank(1200, 1500));

        assert_eq!(meta.date, NaiveDate::from_ymd_opt(2026, 3, 14));
        assert_eq!(meta.as_of_time, NaiveTime::from_hms_opt(6, 15, 0));
        assert_eq!(seen.lock().unwrap().as_slice(), &[(1000, 400)]);
    }

    #[test]
    fn test_read_downgrades_failures() {
        let (reader, _) = make_reader(Err("engine crashed"));
        assert!(reader.read(&blank(100, 100)).is_empty());

        let (reader, _) = make_reader(Ok("   \n"));
        assert!(reader.read(&blank(100, 100)).is_empty());

        let (reader, _) = make_reader(Ok("no caption text"));
        assert!(reader.read(&blank(100, 100)).is_empty());
    }

    #[test]
    fn test_tesseract_args() {
        let cli = TesseractCli::default();
        assert_eq!(
            cli.args(),
            vec!["stdin", "stdout", "-l", "ukr+eng", "--psm", "6"]
        );
    }

    #[cfg(unix)]
    fn script(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.path().join("engine.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    fn cli(command: PathBuf, timeout_secs: u64) -> TesseractCli {
        TesseractCli::new(&OcrConfig {
            command,
            timeout_secs,
            ..OcrConfig::default()
        })
    }

    #[cfg(unix)]
    #[test]
    fn test_engine_output_returned() {
        let dir = tempfile::tempdir().unwrap();
        let engine = cli(script(&dir, "cat > /dev/null\necho 'станом на 06:15'"), 10);

        let text = engine.recognize(&[0u8; 256 * 1024]).unwrap();
        assert_eq!(text.trim(), "станом на 06:15");
    }

    #[cfg(unix)]
    #[test]
    fn test_hung_engine_killed_after_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let engine = TesseractCli {
            timeout: Duration::from_millis(300),
            ..cli(script(&dir, "exec sleep 30"), 1)
        };

        let started = Instant::now();
        let result = engine.recognize(&[0u8; 256 * 1024]);

        assert!(matches!(result, Err(OcrError::Timeout(_))));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[test]
    fn test_engine_ignoring_stdin_reports_exit_status() {
        let dir = tempfile::tempdir().unwrap();
        let engine = cli(script(&dir, "echo 'bad image' >&2\nexit 3"), 10);

        match engine.recognize(&[0u8; 256 * 1024]) {
            Err(OcrError::Engine(message)) => assert!(message.contains("bad image")),
            other => panic!("expected engine error, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_binary_is_an_error() {
        let cli = TesseractCli::new(&OcrConfig {
            command: PathBuf::from("/nonexistent/tesseract"),
            ..OcrConfig::default()
        });
        assert!(matches!(cli.recognize(b"png"), Err(OcrError::Io(_))));
    }
}
