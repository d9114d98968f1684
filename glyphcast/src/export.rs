use std::{
    fs,
    io::{Cursor, Write},
    path::{Path, PathBuf},
};

use image::{DynamicImage, ImageFormat, RgbaImage};

use crate::error::*;

/// File name prefix of every exported artifact.
pub const ARTIFACT_PREFIX: &str = "glyphcast_export";

/// Largest raster export side in pixels.
pub const MAX_EXPORT_SIDE: u32 = 16_384;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Png,
    Jpeg,
    Text,
    Webm,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Png => "png",
            ExportFormat::Jpeg => "jpg",
            ExportFormat::Text => "txt",
            ExportFormat::Webm => "webm",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportRequest {
    pub format: ExportFormat,
    /// Raster scale factor, ignored by the other formats.
    pub scale: u32,
}

impl ExportRequest {
    pub fn new(format: ExportFormat, scale: u32) -> Self {
        Self {
            format,
            scale: scale.max(1),
        }
    }
}

#[derive(Debug)]
pub enum ExportOutcome {
    /// Nothing to export yet: no media, no rendered frame or empty transcript.
    Skipped,
    Raster(Artifact),
    TranscriptDelivered,
    RecordingStarted,
    Video(Artifact),
}

/// A finished export, ready to be saved or handed on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub name: String,
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}

impl Artifact {
    pub fn new(name: impl Into<String>, mime: &'static str, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime,
            bytes,
        }
    }

    /// Encodes a raster export. JPEG has no alpha channel, so it is dropped.
    pub fn from_raster(image: RgbaImage, format: ExportFormat, prefix: &str) -> Result<Self, Error> {
        let (image_format, mime, image) = match format {
            ExportFormat::Png => (ImageFormat::Png, "image/png", DynamicImage::ImageRgba8(image)),
            ExportFormat::Jpeg => (
                ImageFormat::Jpeg,
                "image/jpeg",
                DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(image).into_rgb8()),
            ),
            other => {
                return Err(Error::Application(format!(
                    "{other:?} is not a raster format"
                )));
            }
        };
        let mut bytes = Cursor::new(Vec::new());
        image.write_to(&mut bytes, image_format)?;
        Ok(Self::new(
            format!("{prefix}.{}", format.extension()),
            mime,
            bytes.into_inner(),
        ))
    }

    pub fn save_in(&self, dir: &Path) -> Result<PathBuf, Error> {
        fs::create_dir_all(dir)?;
        let path = dir.join(&self.name);
        fs::write(&path, &self.bytes)?;
        log::info!("saved {} ({} bytes)", path.display(), self.bytes.len());
        Ok(path)
    }
}

/// Where text exports go.
pub trait TranscriptSink {
    fn deliver(&mut self, transcript: &str) -> Result<(), Error>;
}

/// Writes each transcript to a writer, such as stdout or a file.
#[derive(Debug)]
pub struct WriterSink<W: Write> {
    writer: W,
}

impl<W: Write> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> TranscriptSink for WriterSink<W> {
    fn deliver(&mut self, transcript: &str) -> Result<(), Error> {
        self.writer
            .write_all(transcript.as_bytes())
            .and_then(|_| self.writer.flush())
            .map_err(|e| Error::Delivery(format!("{e}")))
    }
}

/// Writes each transcript to `<dir>/<prefix>.txt`, replacing the last one.
#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(dir: &Path, prefix: &str) -> Self {
        Self {
            path: dir.join(format!("{prefix}.{}", ExportFormat::Text.extension())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TranscriptSink for FileSink {
    fn deliver(&mut self, transcript: &str) -> Result<(), Error> {
        fs::write(&self.path, transcript).map_err(|e| {
            Error::Delivery(format!("writing '{}': {e}", self.path.display()))
        })?;
        log::info!("transcript written to {}", self.path.display());
        Ok(())
    }
}
