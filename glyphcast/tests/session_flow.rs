use std::{cell::RefCell, rc::Rc};

use glyphcast::{
    capture::CaptureState,
    config::Settings,
    encode::{EncoderFactory, EncoderSettings, StreamEncoder},
    error::Error,
    export::{ExportFormat, ExportOutcome, ExportRequest, TranscriptSink},
    frames::{FrameSequence, FrameSource},
    pipeline::{GlyphGrid, Resolution},
    render::{Surface, SurfaceFactory},
    schedule::RefreshMode,
    session::Session,
};
use image::{DynamicImage, Rgba, RgbaImage};

/// Paints each glyph cell with a gray level derived from the glyph, no font
/// needed.
struct CellSurface {
    image: RgbaImage,
    passes: usize,
}

impl Surface for CellSurface {
    fn resolution(&self) -> Resolution {
        Resolution::new(self.image.width(), self.image.height())
    }

    fn draw_grid(&mut self, grid: &GlyphGrid) {
        self.passes += 1;
        for pixel in self.image.pixels_mut() {
            *pixel = Rgba([255, 255, 255, 255]);
        }
        for glyph in grid.glyphs() {
            let (x, y) = (glyph.x as u32, glyph.y as u32);
            if x < self.image.width() && y < self.image.height() {
                let v = (glyph.ch as u32 % 256) as u8;
                self.image.put_pixel(x, y, Rgba([v, v, v, 255]));
            }
        }
    }

    fn pixels(&self) -> &RgbaImage {
        &self.image
    }
}

struct CellFactory;

impl SurfaceFactory for CellFactory {
    type Surface = CellSurface;

    fn create(&self, resolution: Resolution) -> CellSurface {
        CellSurface {
            image: RgbaImage::new(resolution.width, resolution.height),
            passes: 0,
        }
    }
}

#[derive(Default)]
struct Recorder {
    frames: Rc<RefCell<Vec<(u32, u32)>>>,
    settings: Rc<RefCell<Option<EncoderSettings>>>,
}

struct RecorderEncoder {
    frames: Rc<RefCell<Vec<(u32, u32)>>>,
    pending: Vec<Vec<u8>>,
}

impl StreamEncoder for RecorderEncoder {
    fn encode_frame(&mut self, frame: &RgbaImage) -> Result<(), Error> {
        let mut frames = self.frames.borrow_mut();
        frames.push(frame.dimensions());
        self.pending.push(vec![frames.len() as u8]);
        Ok(())
    }

    fn drain(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.pending)
    }

    fn finish(self: Box<Self>) -> Result<Vec<Vec<u8>>, Error> {
        Ok(vec![b"end".to_vec()])
    }
}

impl EncoderFactory for Recorder {
    fn mime(&self) -> &'static str {
        "video/webm"
    }

    fn extension(&self) -> &'static str {
        "webm"
    }

    fn open(&self, settings: &EncoderSettings) -> Result<Box<dyn StreamEncoder>, Error> {
        *self.settings.borrow_mut() = Some(*settings);
        Ok(Box::new(RecorderEncoder {
            frames: self.frames.clone(),
            pending: Vec::new(),
        }))
    }
}

#[derive(Clone, Default)]
struct Clipboard {
    items: Rc<RefCell<Vec<String>>>,
    broken: bool,
}

impl TranscriptSink for Clipboard {
    fn deliver(&mut self, transcript: &str) -> Result<(), Error> {
        if self.broken {
            return Err(Error::Delivery("clipboard unavailable".into()));
        }
        self.items.borrow_mut().push(transcript.to_string());
        Ok(())
    }
}

fn gradient(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgba8(RgbaImage::from_fn(width, height, |x, _| {
        let v = (x * 255 / (width - 1)) as u8;
        Rgba([v, v, v, 255])
    }))
}

fn clip(frames: usize) -> FrameSource {
    let frames = (0..frames).map(|_| gradient(300, 200)).collect();
    FrameSource::from_decoder(Box::new(FrameSequence::new(frames)), 30.0).unwrap()
}

fn session_with(recorder: Recorder, clipboard: Clipboard) -> Session<CellFactory> {
    Session::new(
        &Settings::default(),
        CellFactory,
        Box::new(recorder),
        Box::new(clipboard),
    )
}

fn session() -> Session<CellFactory> {
    session_with(Recorder::default(), Clipboard::default())
}

#[test]
fn everything_is_inert_without_media() {
    let mut session = session();
    let report = session.tick().unwrap();
    assert!(!report.rendered);
    for format in [ExportFormat::Png, ExportFormat::Text, ExportFormat::Webm] {
        let outcome = session.export(ExportRequest::new(format, 2)).unwrap();
        assert!(matches!(outcome, ExportOutcome::Skipped));
    }
    assert_eq!(session.capture_state(), CaptureState::Idle);
}

#[test]
fn image_renders_once_per_parameter_change() {
    let mut session = session();
    session
        .load_media(FrameSource::from_image(gradient(1200, 800)))
        .unwrap();
    assert_eq!(session.sample_buffer().unwrap().resolution(), Resolution::new(600, 400));
    assert_eq!(session.refresh_mode(), RefreshMode::SingleShot);

    assert!(session.tick().unwrap().rendered);
    assert_eq!(session.transcript().lines().count(), 40);
    assert!(session.transcript().lines().all(|l| l.chars().count() == 100));
    assert!(!session.tick().unwrap().rendered);
    assert_eq!(session.preview().unwrap().passes, 1);

    session.set_fidelity(20);
    assert!(session.tick().unwrap().rendered);
    assert_eq!(session.transcript().lines().count(), 20);
    assert_eq!(session.preview().unwrap().passes, 2);
}

#[test]
fn identical_frames_give_identical_transcripts() {
    let mut session = session();
    session.load_media(clip(4)).unwrap();
    session.set_density(" .:-=+*#%@");
    session.tick().unwrap();
    let first = session.transcript().to_string();
    session.tick().unwrap();
    assert_eq!(session.transcript(), first);
}

#[test]
fn empty_density_renders_blanks() {
    let mut session = session();
    session.load_media(FrameSource::from_image(gradient(60, 40))).unwrap();
    session.set_density("");
    session.tick().unwrap();
    assert!(session.transcript().chars().all(|c| c == ' ' || c == '\n'));
}

#[test]
fn raster_export_scales_the_preview() {
    let mut session = session();
    session.load_media(FrameSource::from_image(gradient(300, 200))).unwrap();
    let before_tick = session.export(ExportRequest::new(ExportFormat::Png, 2)).unwrap();
    assert!(matches!(before_tick, ExportOutcome::Skipped));

    session.tick().unwrap();
    let transcript = session.transcript().to_string();
    let ExportOutcome::Raster(artifact) = session.export(ExportRequest::new(ExportFormat::Png, 3)).unwrap() else {
        panic!("expected a raster export");
    };
    assert_eq!(artifact.name, "glyphcast_export.png");
    let decoded = image::load_from_memory(&artifact.bytes).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (1800, 1200));
    // export never touches the live transcript
    assert_eq!(session.transcript(), transcript);
    assert_eq!(session.preview().unwrap().passes, 1);
}

#[test]
fn text_export_goes_to_the_sink() {
    let clipboard = Clipboard::default();
    let mut session = session_with(Recorder::default(), clipboard.clone());
    session.load_media(FrameSource::from_image(gradient(60, 40))).unwrap();
    let outcome = session.export(ExportRequest::new(ExportFormat::Text, 1)).unwrap();
    assert!(matches!(outcome, ExportOutcome::Skipped));

    session.tick().unwrap();
    let outcome = session.export(ExportRequest::new(ExportFormat::Text, 1)).unwrap();
    assert!(matches!(outcome, ExportOutcome::TranscriptDelivered));
    assert_eq!(clipboard.items.borrow().as_slice(), &[session.transcript().to_string()]);
}

#[test]
fn failed_delivery_keeps_the_transcript() {
    let clipboard = Clipboard {
        broken: true,
        ..Clipboard::default()
    };
    let mut session = session_with(Recorder::default(), clipboard);
    session.load_media(FrameSource::from_image(gradient(60, 40))).unwrap();
    session.tick().unwrap();
    let before = session.transcript().to_string();
    let err = session.export(ExportRequest::new(ExportFormat::Text, 1)).unwrap_err();
    assert!(matches!(err, Error::Delivery(_)));
    assert_eq!(session.transcript(), before);
}

#[test]
fn video_export_records_one_pass() {
    let recorder = Recorder::default();
    let frames = recorder.frames.clone();
    let settings = recorder.settings.clone();
    let mut session = session_with(recorder, Clipboard::default());
    session.load_media(clip(4)).unwrap();
    assert_eq!(session.refresh_mode(), RefreshMode::Continuous);
    // play a little into the loop first
    session.tick().unwrap();
    session.tick().unwrap();

    let started = session.export(ExportRequest::new(ExportFormat::Webm, 1)).unwrap();
    assert!(matches!(started, ExportOutcome::RecordingStarted));
    assert_eq!(session.capture_state(), CaptureState::Recording);

    let mut artifact = None;
    for _ in 0..20 {
        if let Some(done) = session.tick().unwrap().artifact {
            artifact = Some(done);
            break;
        }
    }
    let artifact = artifact.expect("recording ends with playback");
    assert_eq!(artifact.name, "glyphcast_export.webm");
    assert_eq!(artifact.bytes, [&[1u8, 2, 3, 4][..], b"end"].concat());
    assert_eq!(frames.borrow().len(), 4);
    assert!(frames.borrow().iter().all(|&dims| dims == (600, 400)));

    let settings = settings.borrow().unwrap();
    assert_eq!((settings.fps, settings.bitrate), (30, 8_000_000));
    assert_eq!(session.capture_state(), CaptureState::Idle);
    let player = session.source().and_then(|s| match s {
        FrameSource::Video(player) => Some(player),
        FrameSource::Image(_) => None,
    });
    assert!(player.unwrap().is_looping());

    // live preview keeps going
    assert!(session.tick().unwrap().rendered);
}

#[test]
fn video_export_matches_the_source_duration() {
    let recorder = Recorder::default();
    let frames = recorder.frames.clone();
    let mut session = session_with(recorder, Clipboard::default());
    let clip = (0..24).map(|_| gradient(300, 200)).collect();
    session
        .load_media(FrameSource::from_decoder(Box::new(FrameSequence::new(clip)), 24.0).unwrap())
        .unwrap();

    session.export(ExportRequest::new(ExportFormat::Webm, 1)).unwrap();
    let mut finished = false;
    for _ in 0..40 {
        if session.tick().unwrap().artifact.is_some() {
            finished = true;
            break;
        }
    }
    assert!(finished);
    // one second of 24 fps source becomes one second at 30 fps
    assert_eq!(frames.borrow().len(), 30);
}

#[test]
fn oversized_raster_export_is_an_error() {
    let mut session = session();
    session.load_media(FrameSource::from_image(gradient(300, 200))).unwrap();
    session.tick().unwrap();

    for scale in [28, 10_000_000] {
        let err = session
            .export(ExportRequest::new(ExportFormat::Png, scale))
            .unwrap_err();
        assert!(matches!(err, Error::Pipeline(_)));
    }
    assert!(matches!(
        session.export(ExportRequest::new(ExportFormat::Png, 2)).unwrap(),
        ExportOutcome::Raster(_)
    ));
}

#[test]
fn video_export_toggles_off() {
    let mut session = session();
    session.load_media(clip(50)).unwrap();
    session.export(ExportRequest::new(ExportFormat::Webm, 1)).unwrap();
    session.tick().unwrap();
    let stopped = session.export(ExportRequest::new(ExportFormat::Webm, 1)).unwrap();
    let ExportOutcome::Video(artifact) = stopped else {
        panic!("second request stops the recording");
    };
    assert_eq!(artifact.bytes, [&[1u8][..], b"end"].concat());
    assert_eq!(session.capture_state(), CaptureState::Idle);
}

#[test]
fn video_export_of_an_image_is_rejected() {
    let mut session = session();
    session.load_media(FrameSource::from_image(gradient(60, 40))).unwrap();
    let err = session.export(ExportRequest::new(ExportFormat::Webm, 1)).unwrap_err();
    assert!(matches!(err, Error::UnsupportedCapture(_)));
    assert_eq!(session.capture_state(), CaptureState::Idle);
}

#[test]
fn switching_media_stops_the_recording() {
    let mut session = session();
    session.load_media(clip(50)).unwrap();
    session.export(ExportRequest::new(ExportFormat::Webm, 1)).unwrap();
    session.tick().unwrap();
    session.tick().unwrap();

    let artifact = session
        .load_media(FrameSource::from_image(gradient(100, 50)))
        .unwrap()
        .expect("forced stop delivers the recording");
    assert_eq!(artifact.bytes, [&[1u8, 2][..], b"end"].concat());
    assert_eq!(session.capture_state(), CaptureState::Idle);
    assert_eq!(session.sample_buffer().unwrap().resolution(), Resolution::new(600, 300));
    assert!(session.transcript().is_empty());
}

#[test]
fn unsupported_files_are_ignored() {
    let mut session = session();
    assert!(session.load_path("notes.txt".as_ref()).unwrap().is_none());
    assert_eq!(session.media_kind(), None);
}
