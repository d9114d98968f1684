//! Video export: plays the source once from the start and records the
//! rendered preview until playback ends or the user stops it.
//!
//! Every callback that matters to a recording arrives as a [`CaptureEvent`]
//! and [`CaptureController::handle`] is the one place that interprets them.
use image::RgbaImage;

use crate::{
    encode::{EncoderFactory, EncoderSettings, StreamEncoder},
    error::*,
    export::Artifact,
    frames::FrameSource,
    pipeline::Resolution,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    /// Playback rewound for a single non-looping pass, encoder not yet open.
    ArmedSinglePass,
    Recording,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    /// The user asked for a video export. Stops an active recording.
    ExportVideo,
    /// The user asked to stop recording.
    Stop,
    /// The encoder produced output.
    DataAvailable(Vec<u8>),
    /// The video played its last frame without looping.
    EndOfPlayback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: CaptureState,
    pub to: CaptureState,
}

#[derive(Debug, Default)]
pub struct CaptureOutcome {
    pub transitions: Vec<Transition>,
    /// The finalized recording, when this event ended one.
    pub artifact: Option<Artifact>,
}

/// What the controller needs from its session while handling an event.
pub struct CaptureContext<'a> {
    pub source: &'a mut FrameSource,
    pub encoders: &'a dyn EncoderFactory,
    /// Size of the surface being recorded.
    pub frame: Resolution,
}

struct RecordingSession {
    encoder: Box<dyn StreamEncoder>,
    chunks: Vec<Vec<u8>>,
    /// Encoded frames per rendered frame.
    ratio: f64,
    rendered: u64,
    written: u64,
    mime: &'static str,
    extension: &'static str,
}

pub struct CaptureController {
    state: CaptureState,
    recording: Option<RecordingSession>,
    fps: u32,
    bitrate: u64,
    prefix: String,
}

impl std::fmt::Debug for CaptureController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureController")
            .field("state", &self.state)
            .field(
                "chunks",
                &self.recording.as_ref().map_or(0, |r| r.chunks.len()),
            )
            .finish()
    }
}

impl CaptureController {
    pub fn new(fps: u32, bitrate: u64, prefix: impl Into<String>) -> Self {
        Self {
            state: CaptureState::Idle,
            recording: None,
            fps,
            bitrate,
            prefix: prefix.into(),
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == CaptureState::Recording
    }

    pub fn handle(
        &mut self,
        event: CaptureEvent,
        ctx: &mut CaptureContext<'_>,
    ) -> Result<CaptureOutcome, Error> {
        let mut outcome = CaptureOutcome::default();
        match (self.state, event) {
            (CaptureState::Idle, CaptureEvent::ExportVideo) => self.arm(ctx, &mut outcome)?,
            (CaptureState::Recording, CaptureEvent::ExportVideo | CaptureEvent::Stop) => {
                log::info!("recording stopped by request");
                outcome.artifact = Some(self.finalize(ctx, &mut outcome)?);
            }
            (CaptureState::Recording, CaptureEvent::EndOfPlayback) => {
                log::info!("recording reached the end of playback");
                outcome.artifact = Some(self.finalize(ctx, &mut outcome)?);
            }
            (CaptureState::Recording, CaptureEvent::DataAvailable(chunk)) => {
                if let Some(recording) = self.recording.as_mut() {
                    recording.chunks.push(chunk);
                }
            }
            (state, event) => log::debug!("ignoring {event:?} while {state:?}"),
        }
        Ok(outcome)
    }

    /// Feeds one rendered frame to the encoder and collects its output.
    /// Does nothing unless recording. An encoder failure aborts the
    /// recording without an artifact.
    ///
    /// Frames are repeated or dropped so the recording at the capture rate
    /// lasts as long as the source plays at its own rate.
    pub fn capture_frame(
        &mut self,
        frame: &RgbaImage,
        ctx: &mut CaptureContext<'_>,
    ) -> Result<(), Error> {
        let Some(recording) = self.recording.as_mut() else {
            return Ok(());
        };
        recording.rendered += 1;
        let due = (recording.rendered as f64 * recording.ratio).round() as u64;
        while recording.written < due {
            if let Err(err) = recording.encoder.encode_frame(frame) {
                self.abort(ctx);
                return Err(err);
            }
            recording.written += 1;
        }
        for chunk in recording.encoder.drain() {
            self.handle(CaptureEvent::DataAvailable(chunk), ctx)?;
        }
        Ok(())
    }

    fn arm(&mut self, ctx: &mut CaptureContext<'_>, outcome: &mut CaptureOutcome) -> Result<(), Error> {
        let Some(player) = ctx.source.video_mut() else {
            return Err(Error::UnsupportedCapture(ERROR_CAPTURE_STILL_IMAGE.to_string()));
        };
        player.restart_single_pass()?;
        self.transition(CaptureState::ArmedSinglePass, outcome);

        let settings = EncoderSettings {
            resolution: ctx.frame,
            fps: self.fps,
            bitrate: self.bitrate,
        };
        let encoder = match ctx.encoders.open(&settings) {
            Ok(encoder) => encoder,
            Err(err) => {
                log::warn!("could not start recording: {err}");
                self.resume_playback(ctx);
                self.transition(CaptureState::Idle, outcome);
                return Err(err);
            }
        };
        let source_fps = ctx
            .source
            .fps()
            .filter(|fps| fps.is_finite() && *fps > 0.0)
            .unwrap_or(self.fps as f64);
        self.recording = Some(RecordingSession {
            encoder,
            chunks: Vec::new(),
            ratio: self.fps as f64 / source_fps,
            rendered: 0,
            written: 0,
            mime: ctx.encoders.mime(),
            extension: ctx.encoders.extension(),
        });
        log::info!(
            "recording {}x{} at {} fps from a {source_fps} fps source",
            settings.resolution.width,
            settings.resolution.height,
            settings.fps
        );
        self.transition(CaptureState::Recording, outcome);
        Ok(())
    }

    fn finalize(
        &mut self,
        ctx: &mut CaptureContext<'_>,
        outcome: &mut CaptureOutcome,
    ) -> Result<Artifact, Error> {
        let Some(mut recording) = self.recording.take() else {
            return Err(Error::Capture("no active recording".into()));
        };
        let finished = recording.encoder.finish();
        self.resume_playback(ctx);
        self.transition(CaptureState::Idle, outcome);

        recording.chunks.extend(finished?);
        let bytes: Vec<u8> = recording.chunks.concat();
        log::info!("recording finalized, {} bytes", bytes.len());
        Ok(Artifact::new(
            format!("{}.{}", self.prefix, recording.extension),
            recording.mime,
            bytes,
        ))
    }

    /// Drops the recording without delivering anything.
    fn abort(&mut self, ctx: &mut CaptureContext<'_>) {
        if let Some(recording) = self.recording.take() {
            let _ = recording.encoder.finish();
        }
        self.resume_playback(ctx);
        self.state = CaptureState::Idle;
    }

    fn resume_playback(&self, ctx: &mut CaptureContext<'_>) {
        if let Some(player) = ctx.source.video_mut()
            && let Err(err) = player.resume_loop()
        {
            log::warn!("could not resume looping playback: {err}");
        }
    }

    fn transition(&mut self, to: CaptureState, outcome: &mut CaptureOutcome) {
        log::debug!("capture {:?} -> {to:?}", self.state);
        outcome.transitions.push(Transition {
            from: self.state,
            to,
        });
        self.state = to;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::{FrameSequence, Playback};
    use image::{DynamicImage, Rgba};
    use std::{cell::RefCell, rc::Rc};

    /// Emits one chunk per frame, tagged with the frame number, and a
    /// trailer on finish.
    #[derive(Default)]
    struct Log {
        opened: usize,
        frames: usize,
    }

    struct ScriptedEncoder {
        log: Rc<RefCell<Log>>,
        pending: Vec<Vec<u8>>,
        fail_finish: bool,
    }

    impl StreamEncoder for ScriptedEncoder {
        fn encode_frame(&mut self, _frame: &RgbaImage) -> Result<(), Error> {
            let mut log = self.log.borrow_mut();
            log.frames += 1;
            self.pending.push(vec![log.frames as u8]);
            Ok(())
        }

        fn drain(&mut self) -> Vec<Vec<u8>> {
            std::mem::take(&mut self.pending)
        }

        fn finish(self: Box<Self>) -> Result<Vec<Vec<u8>>, Error> {
            if self.fail_finish {
                return Err(Error::Capture("muxer failed".into()));
            }
            Ok(vec![vec![0xEE]])
        }
    }

    #[derive(Default)]
    struct Scripted {
        log: Rc<RefCell<Log>>,
        unavailable: bool,
        fail_finish: bool,
    }

    impl EncoderFactory for Scripted {
        fn mime(&self) -> &'static str {
            "video/webm"
        }

        fn extension(&self) -> &'static str {
            "webm"
        }

        fn open(&self, _settings: &EncoderSettings) -> Result<Box<dyn StreamEncoder>, Error> {
            if self.unavailable {
                return Err(Error::Capture(ERROR_CAPTURE_UNAVAILABLE.into()));
            }
            self.log.borrow_mut().opened += 1;
            Ok(Box::new(ScriptedEncoder {
                log: self.log.clone(),
                pending: Vec::new(),
                fail_finish: self.fail_finish,
            }))
        }
    }

    fn frame() -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([9, 9, 9, 255])))
    }

    fn video(frames: usize) -> FrameSource {
        FrameSource::from_decoder(Box::new(FrameSequence::new(vec![frame(); frames])), 30.0).unwrap()
    }

    fn controller() -> CaptureController {
        CaptureController::new(30, 8_000_000, "glyphcast_export")
    }

    fn looping(source: &mut FrameSource) -> bool {
        source.video_mut().unwrap().is_looping()
    }

    #[test]
    fn single_pass_recording_ends_with_playback() {
        let encoders = Scripted::default();
        let mut source = video(3);
        let mut capture = controller();
        let surface = RgbaImage::new(4, 4);
        let res = Resolution::new(4, 4);

        let armed = {
            let mut ctx = CaptureContext { source: &mut source, encoders: &encoders, frame: res };
            capture.handle(CaptureEvent::ExportVideo, &mut ctx).unwrap()
        };
        assert_eq!(
            armed.transitions,
            vec![
                Transition { from: CaptureState::Idle, to: CaptureState::ArmedSinglePass },
                Transition { from: CaptureState::ArmedSinglePass, to: CaptureState::Recording },
            ]
        );
        assert!(!looping(&mut source));

        // tick loop: capture the current frame, then advance
        let mut artifact = None;
        for _ in 0..10 {
            let mut ctx = CaptureContext { source: &mut source, encoders: &encoders, frame: res };
            capture.capture_frame(&surface, &mut ctx).unwrap();
            if ctx.source.advance().unwrap() == Playback::Ended {
                let outcome = capture.handle(CaptureEvent::EndOfPlayback, &mut ctx).unwrap();
                artifact = outcome.artifact;
                break;
            }
        }

        let artifact = artifact.expect("recording finalized");
        assert_eq!(artifact.bytes, vec![1, 2, 3, 0xEE]);
        assert_eq!(artifact.name, "glyphcast_export.webm");
        assert_eq!(capture.state(), CaptureState::Idle);
        assert!(looping(&mut source));
        assert!(source.video_mut().unwrap().is_playing());
        assert_eq!(encoders.log.borrow().opened, 1);
    }

    #[test]
    fn still_images_are_rejected_before_arming() {
        let encoders = Scripted::default();
        let mut source = FrameSource::from_image(frame());
        let mut capture = controller();
        let mut ctx = CaptureContext {
            source: &mut source,
            encoders: &encoders,
            frame: Resolution::new(4, 4),
        };
        let err = capture.handle(CaptureEvent::ExportVideo, &mut ctx).unwrap_err();
        assert!(matches!(err, Error::UnsupportedCapture(_)));
        assert_eq!(capture.state(), CaptureState::Idle);
        assert_eq!(encoders.log.borrow().opened, 0);
    }

    #[test]
    fn second_export_request_stops_the_recording() {
        let encoders = Scripted::default();
        let mut source = video(50);
        let mut capture = controller();
        let mut ctx = CaptureContext {
            source: &mut source,
            encoders: &encoders,
            frame: Resolution::new(4, 4),
        };
        capture.handle(CaptureEvent::ExportVideo, &mut ctx).unwrap();
        capture.capture_frame(&RgbaImage::new(4, 4), &mut ctx).unwrap();
        let stopped = capture.handle(CaptureEvent::ExportVideo, &mut ctx).unwrap();
        assert_eq!(
            stopped.transitions,
            vec![Transition { from: CaptureState::Recording, to: CaptureState::Idle }]
        );
        assert_eq!(stopped.artifact.unwrap().bytes, vec![1, 0xEE]);
        assert!(looping(&mut source));
    }

    #[test]
    fn chunks_keep_arrival_order() {
        let encoders = Scripted::default();
        let mut source = video(5);
        let mut capture = controller();
        let mut ctx = CaptureContext {
            source: &mut source,
            encoders: &encoders,
            frame: Resolution::new(4, 4),
        };
        capture.handle(CaptureEvent::ExportVideo, &mut ctx).unwrap();
        for chunk in [vec![7, 7], vec![3], vec![5, 1]] {
            capture.handle(CaptureEvent::DataAvailable(chunk), &mut ctx).unwrap();
        }
        let artifact = capture.handle(CaptureEvent::Stop, &mut ctx).unwrap().artifact.unwrap();
        assert_eq!(artifact.bytes, vec![7, 7, 3, 5, 1, 0xEE]);
    }

    fn record_pass(source_fps: f64, frames: usize) -> usize {
        let encoders = Scripted::default();
        let mut source =
            FrameSource::from_decoder(Box::new(FrameSequence::new(vec![frame(); frames])), source_fps)
                .unwrap();
        let mut capture = controller();
        let mut ctx = CaptureContext {
            source: &mut source,
            encoders: &encoders,
            frame: Resolution::new(4, 4),
        };
        capture.handle(CaptureEvent::ExportVideo, &mut ctx).unwrap();
        loop {
            capture.capture_frame(&RgbaImage::new(4, 4), &mut ctx).unwrap();
            if ctx.source.advance().unwrap() == Playback::Ended {
                capture.handle(CaptureEvent::EndOfPlayback, &mut ctx).unwrap();
                break;
            }
        }
        let written = encoders.log.borrow().frames;
        written
    }

    #[test]
    fn recording_keeps_the_source_duration() {
        // one second of source is one second at the capture rate
        assert_eq!(record_pass(24.0, 24), 30);
        assert_eq!(record_pass(60.0, 60), 30);
        assert_eq!(record_pass(30.0, 45), 45);
        assert_eq!(record_pass(12.5, 5), 12);
    }

    #[test]
    fn stray_events_while_idle_are_ignored() {
        let encoders = Scripted::default();
        let mut source = video(2);
        let mut capture = controller();
        let mut ctx = CaptureContext {
            source: &mut source,
            encoders: &encoders,
            frame: Resolution::new(4, 4),
        };
        for event in [
            CaptureEvent::Stop,
            CaptureEvent::EndOfPlayback,
            CaptureEvent::DataAvailable(vec![1]),
        ] {
            let outcome = capture.handle(event, &mut ctx).unwrap();
            assert!(outcome.transitions.is_empty() && outcome.artifact.is_none());
        }
        capture.capture_frame(&RgbaImage::new(4, 4), &mut ctx).unwrap();
        assert_eq!(encoders.log.borrow().frames, 0);
    }

    #[test]
    fn unavailable_encoder_fails_the_export() {
        let encoders = Scripted { unavailable: true, ..Scripted::default() };
        let mut source = video(2);
        let mut capture = controller();
        let mut ctx = CaptureContext {
            source: &mut source,
            encoders: &encoders,
            frame: Resolution::new(4, 4),
        };
        let err = capture.handle(CaptureEvent::ExportVideo, &mut ctx).unwrap_err();
        assert!(matches!(err, Error::Capture(_)));
        assert_eq!(capture.state(), CaptureState::Idle);
        assert!(looping(&mut source));
    }

    #[test]
    fn failed_finalize_delivers_nothing() {
        let encoders = Scripted { fail_finish: true, ..Scripted::default() };
        let mut source = video(2);
        let mut capture = controller();
        let mut ctx = CaptureContext {
            source: &mut source,
            encoders: &encoders,
            frame: Resolution::new(4, 4),
        };
        capture.handle(CaptureEvent::ExportVideo, &mut ctx).unwrap();
        let err = capture.handle(CaptureEvent::Stop, &mut ctx).unwrap_err();
        assert!(matches!(err, Error::Capture(_)));
        assert_eq!(capture.state(), CaptureState::Idle);
        assert!(looping(&mut source));
    }
}
