//! Frame sources: a still image, or a video played back frame by frame.
use crate::error::*;
use image::{DynamicImage, ImageReader};
use std::path::Path;

/// Frame rate used when a video does not report one.
pub const DEFAULT_FPS: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Classifies by MIME type prefix. Anything that is neither an image nor
    /// a video yields `None`.
    pub fn from_mime(mime: &str) -> Option<Self> {
        if mime.starts_with("image/") {
            Some(MediaKind::Image)
        } else if mime.starts_with("video/") {
            Some(MediaKind::Video)
        } else {
            None
        }
    }
}

/// MIME type for a file extension, for the formats this crate can decode.
pub fn mime_from_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "bmp" => "image/bmp",
        "gif" => "image/gif",
        "ico" => "image/x-icon",
        "tif" | "tiff" => "image/tiff",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "flv" => "video/x-flv",
        "ogv" | "ogg" => "video/ogg",
        _ => return None,
    };
    Some(mime)
}

/// Sequential frame reader behind a [`VideoPlayer`].
pub trait VideoDecoder {
    /// The next frame, or `None` at the end of the stream.
    fn read_frame(&mut self) -> Result<Option<DynamicImage>, Error>;
    /// Seeks back to the first frame.
    fn rewind(&mut self) -> Result<(), Error>;
}

/// Frames already decoded in memory.
#[derive(Debug, Clone)]
pub struct FrameSequence {
    frames: Vec<DynamicImage>,
    current_frame: usize,
}

impl FrameSequence {
    pub fn new(frames: Vec<DynamicImage>) -> Self {
        Self {
            frames,
            current_frame: 0,
        }
    }
}

impl VideoDecoder for FrameSequence {
    fn read_frame(&mut self) -> Result<Option<DynamicImage>, Error> {
        let frame = self.frames.get(self.current_frame).cloned();
        if frame.is_some() {
            self.current_frame += 1;
        }
        Ok(frame)
    }

    fn rewind(&mut self) -> Result<(), Error> {
        self.current_frame = 0;
        Ok(())
    }
}

#[cfg(feature = "video")]
pub use opencv_decoder::OpenCvDecoder;

#[cfg(feature = "video")]
mod opencv_decoder {
    use super::VideoDecoder;
    use crate::{error::*, util::mat_to_dynamic_image};
    use image::DynamicImage;
    use opencv::{prelude::*, videoio::VideoCapture};
    use std::path::Path;

    pub struct OpenCvDecoder {
        video: VideoCapture,
    }

    impl OpenCvDecoder {
        pub fn open(path: &Path) -> Result<Self, Error> {
            let path = path
                .to_str()
                .ok_or_else(|| Error::Application(format!("{ERROR_OPENING_VIDEO}: non UTF-8 path")))?;
            let video = VideoCapture::from_file(path, opencv::videoio::CAP_ANY)?;
            if video.is_opened()? {
                Ok(Self { video })
            } else {
                Err(Error::Application(ERROR_OPENING_VIDEO.to_string()))
            }
        }

        pub fn reported_fps(&self) -> Option<f64> {
            self.video
                .get(opencv::videoio::CAP_PROP_FPS)
                .ok()
                .filter(|fps| fps.is_finite() && *fps > 0.0)
        }
    }

    impl std::fmt::Debug for OpenCvDecoder {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("OpenCvDecoder").finish_non_exhaustive()
        }
    }

    impl VideoDecoder for OpenCvDecoder {
        fn read_frame(&mut self) -> Result<Option<DynamicImage>, Error> {
            let mut frame = Mat::default();
            if self.video.read(&mut frame)? && !frame.empty() {
                Ok(mat_to_dynamic_image(&frame))
            } else {
                Ok(None)
            }
        }

        fn rewind(&mut self) -> Result<(), Error> {
            self.video.set(opencv::videoio::CAP_PROP_POS_FRAMES, 0.0)?;
            Ok(())
        }
    }
}

/// Result of moving a video one frame forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Playback {
    /// A new current frame is available.
    Frame,
    /// Paused or stopped, the current frame is unchanged.
    Idle,
    /// The last frame was shown and looping is off; playback stopped.
    Ended,
}

/// Playback state of a video: current frame, looping and play/stop.
pub struct VideoPlayer {
    decoder: Box<dyn VideoDecoder>,
    current: Option<DynamicImage>,
    looping: bool,
    playing: bool,
    fps: f64,
}

impl std::fmt::Debug for VideoPlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoPlayer")
            .field("ready", &self.current.is_some())
            .field("looping", &self.looping)
            .field("playing", &self.playing)
            .field("fps", &self.fps)
            .finish()
    }
}

impl VideoPlayer {
    /// Primes the first frame and starts looping playback.
    pub fn new(mut decoder: Box<dyn VideoDecoder>, fps: f64) -> Result<Self, Error> {
        let current = decoder.read_frame()?;
        Ok(Self {
            decoder,
            current,
            looping: true,
            playing: true,
            fps: if fps.is_finite() && fps > 0.0 { fps } else { DEFAULT_FPS },
        })
    }

    /// Ready once at least one frame has been decoded.
    pub fn is_ready(&self) -> bool {
        self.current.is_some()
    }

    pub fn current_frame(&self) -> Option<&DynamicImage> {
        self.current.as_ref()
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn advance(&mut self) -> Result<Playback, Error> {
        if !self.playing {
            return Ok(Playback::Idle);
        }
        if let Some(frame) = self.decoder.read_frame()? {
            self.current = Some(frame);
            return Ok(Playback::Frame);
        }
        if self.looping {
            self.decoder.rewind()?;
            if let Some(frame) = self.decoder.read_frame()? {
                self.current = Some(frame);
                return Ok(Playback::Frame);
            }
        }
        self.playing = false;
        Ok(Playback::Ended)
    }

    /// Stop, rewind and play once without looping.
    pub fn restart_single_pass(&mut self) -> Result<(), Error> {
        self.playing = false;
        self.looping = false;
        self.rewind_and_play()
    }

    /// Turns looping back on, restarting playback if it had ended.
    pub fn resume_loop(&mut self) -> Result<(), Error> {
        self.looping = true;
        if self.playing {
            Ok(())
        } else {
            self.rewind_and_play()
        }
    }

    fn rewind_and_play(&mut self) -> Result<(), Error> {
        self.decoder.rewind()?;
        if let Some(frame) = self.decoder.read_frame()? {
            self.current = Some(frame);
        }
        self.playing = true;
        Ok(())
    }
}

/// The media a session renders from.
#[derive(Debug)]
pub enum FrameSource {
    Image(DynamicImage),
    Video(VideoPlayer),
}

impl FrameSource {
    pub fn from_image(image: DynamicImage) -> Self {
        FrameSource::Image(image)
    }

    pub fn from_decoder(decoder: Box<dyn VideoDecoder>, fps: f64) -> Result<Self, Error> {
        Ok(FrameSource::Video(VideoPlayer::new(decoder, fps)?))
    }

    pub fn kind(&self) -> MediaKind {
        match self {
            FrameSource::Image(_) => MediaKind::Image,
            FrameSource::Video(_) => MediaKind::Video,
        }
    }

    pub fn is_ready(&self) -> bool {
        match self {
            FrameSource::Image(_) => true,
            FrameSource::Video(player) => player.is_ready(),
        }
    }

    pub fn current_frame(&self) -> Option<&DynamicImage> {
        match self {
            FrameSource::Image(image) => Some(image),
            FrameSource::Video(player) => player.current_frame(),
        }
    }

    /// Natural size of the media, `None` for a video with no frame yet.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.current_frame().map(|f| (f.width(), f.height()))
    }

    /// Playback rate, `None` for stills.
    pub fn fps(&self) -> Option<f64> {
        match self {
            FrameSource::Image(_) => None,
            FrameSource::Video(player) => Some(player.fps()),
        }
    }

    /// Moves a video forward one frame. Still images never change.
    pub fn advance(&mut self) -> Result<Playback, Error> {
        match self {
            FrameSource::Image(_) => Ok(Playback::Idle),
            FrameSource::Video(player) => player.advance(),
        }
    }

    pub fn video_mut(&mut self) -> Option<&mut VideoPlayer> {
        match self {
            FrameSource::Image(_) => None,
            FrameSource::Video(player) => Some(player),
        }
    }
}

/// Opens `path` as an image or a video depending on its MIME type.
///
/// Files that are neither yield `Ok(None)`.
pub fn open_media_from_path(path: &Path) -> Result<Option<FrameSource>, Error> {
    let Some(kind) = mime_from_path(path).and_then(MediaKind::from_mime) else {
        log::warn!("ignoring {}: not an image or a video", path.display());
        return Ok(None);
    };
    log::debug!("opening {} as {kind:?}", path.display());
    match kind {
        MediaKind::Image => open_image(path).map(Some),
        MediaKind::Video => open_video(path).map(Some),
    }
}

fn open_image(path: &Path) -> Result<FrameSource, Error> {
    let img = ImageReader::open(path)?
        .with_guessed_format()?
        .decode()
        .map_err(|e| Error::Application(format!("{ERROR_DECODING_IMAGE}: {e:?}")))?;
    Ok(FrameSource::Image(img))
}

#[cfg(feature = "video")]
fn open_video(path: &Path) -> Result<FrameSource, Error> {
    let decoder = OpenCvDecoder::open(path)?;
    let fps = crate::util::extract_fps(path)
        .or_else(|| decoder.reported_fps())
        .unwrap_or(DEFAULT_FPS);
    FrameSource::from_decoder(Box::new(decoder), fps)
}

#[cfg(not(feature = "video"))]
fn open_video(path: &Path) -> Result<FrameSource, Error> {
    Err(Error::Pipeline(format!(
        "{ERROR_OPENING_VIDEO} '{}': built without the 'video' feature",
        path.display()
    )))
}
