//! Video encoding of the rendered preview, delivered as byte chunks in the
//! order the encoder produces them.
use std::{
    io::{Read, Write},
    process::{Child, ChildStdin, Command, Stdio},
    thread::JoinHandle,
};

use crossbeam_channel::{Receiver, unbounded};
use image::RgbaImage;

use crate::{error::*, pipeline::Resolution};

/// Frame rate of recorded exports.
pub const CAPTURE_FPS: u32 = 30;
/// Target bitrate of recorded exports, in bits per second.
pub const CAPTURE_BITRATE: u64 = 8_000_000;

const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderSettings {
    pub resolution: Resolution,
    pub fps: u32,
    pub bitrate: u64,
}

impl EncoderSettings {
    pub fn new(resolution: Resolution) -> Self {
        Self {
            resolution,
            fps: CAPTURE_FPS,
            bitrate: CAPTURE_BITRATE,
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.resolution.width == 0 || self.resolution.height == 0 {
            return Err(Error::Capture("encode width/height must be non-zero".into()));
        }
        if self.fps == 0 || self.bitrate == 0 {
            return Err(Error::Capture("encode fps/bitrate must be non-zero".into()));
        }
        Ok(())
    }
}

/// An open encoder session.
pub trait StreamEncoder {
    fn encode_frame(&mut self, frame: &RgbaImage) -> Result<(), Error>;
    /// Chunks produced since the last call, oldest first.
    fn drain(&mut self) -> Vec<Vec<u8>>;
    /// Flushes the encoder and returns the chunks it still held.
    fn finish(self: Box<Self>) -> Result<Vec<Vec<u8>>, Error>;
}

pub trait EncoderFactory {
    /// Container MIME type of what the encoders produce.
    fn mime(&self) -> &'static str;
    fn extension(&self) -> &'static str;
    fn open(&self, settings: &EncoderSettings) -> Result<Box<dyn StreamEncoder>, Error>;
}

pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// WebM/VP9 through the system `ffmpeg` binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegEncoderFactory;

impl EncoderFactory for FfmpegEncoderFactory {
    fn mime(&self) -> &'static str {
        "video/webm"
    }

    fn extension(&self) -> &'static str {
        "webm"
    }

    fn open(&self, settings: &EncoderSettings) -> Result<Box<dyn StreamEncoder>, Error> {
        Ok(Box::new(FfmpegEncoder::spawn(settings)?))
    }
}

pub struct FfmpegEncoder {
    settings: EncoderSettings,
    child: Child,
    stdin: Option<ChildStdin>,
    reader: Option<JoinHandle<()>>,
    chunks: Receiver<Vec<u8>>,
}

impl std::fmt::Debug for FfmpegEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FfmpegEncoder")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl FfmpegEncoder {
    pub fn spawn(settings: &EncoderSettings) -> Result<Self, Error> {
        settings.validate()?;
        if !is_ffmpeg_on_path() {
            return Err(Error::Capture(format!(
                "{ERROR_CAPTURE_UNAVAILABLE}: ffmpeg was not found on PATH"
            )));
        }

        let Resolution { width, height } = settings.resolution;
        let mut child = Command::new("ffmpeg")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .args([
                "-loglevel",
                "error",
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgba",
                "-s",
                &format!("{width}x{height}"),
                "-r",
                &settings.fps.to_string(),
                "-i",
                "pipe:0",
                "-an",
                // yuv420p needs even dimensions
                "-vf",
                "pad=ceil(iw/2)*2:ceil(ih/2)*2",
                "-c:v",
                "libvpx-vp9",
                "-b:v",
                &settings.bitrate.to_string(),
                "-deadline",
                "realtime",
                "-pix_fmt",
                "yuv420p",
                "-f",
                "webm",
                "pipe:1",
            ])
            .spawn()
            .map_err(|e| Error::Capture(format!("{ERROR_CAPTURE_UNAVAILABLE}: {e}")))?;

        let stdin = child.stdin.take();
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Capture(format!("{ERROR_CAPTURE_UNAVAILABLE}: no ffmpeg stdout")))?;

        let (tx, chunks) = unbounded();
        let reader = std::thread::spawn(move || {
            let mut buf = vec![0u8; CHUNK_SIZE];
            loop {
                match stdout.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        log::warn!("reading encoder output failed: {e}");
                        break;
                    }
                }
            }
        });

        log::debug!("ffmpeg encoder started at {width}x{height}");
        Ok(Self {
            settings: *settings,
            child,
            stdin,
            reader: Some(reader),
            chunks,
        })
    }
}

impl StreamEncoder for FfmpegEncoder {
    fn encode_frame(&mut self, frame: &RgbaImage) -> Result<(), Error> {
        let Resolution { width, height } = self.settings.resolution;
        if frame.width() != width || frame.height() != height {
            return Err(Error::Capture(format!(
                "frame size mismatch: got {}x{}, expected {width}x{height}",
                frame.width(),
                frame.height()
            )));
        }
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(Error::Capture("encoder is already finalized".into()));
        };
        stdin
            .write_all(frame.as_raw())
            .map_err(|e| Error::Capture(format!("{ERROR_ENCODING}: {e}")))
    }

    fn drain(&mut self) -> Vec<Vec<u8>> {
        self.chunks.try_iter().collect()
    }

    fn finish(mut self: Box<Self>) -> Result<Vec<Vec<u8>>, Error> {
        drop(self.stdin.take());
        if let Some(reader) = self.reader.take() {
            reader
                .join()
                .map_err(|_| Error::Capture(format!("{ERROR_ENCODING}: output reader panicked")))?;
        }
        let remaining: Vec<Vec<u8>> = self.chunks.try_iter().collect();

        let mut stderr = String::new();
        if let Some(mut err) = self.child.stderr.take() {
            let _ = err.read_to_string(&mut stderr);
        }
        let status = self
            .child
            .wait()
            .map_err(|e| Error::Capture(format!("{ERROR_ENCODING}: {e}")))?;
        if !status.success() {
            return Err(Error::Capture(format!(
                "{ERROR_ENCODING}: ffmpeg exited with status {status}: {}",
                stderr.trim()
            )));
        }
        Ok(remaining)
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        if self.stdin.is_some() {
            drop(self.stdin.take());
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}
