//! The session context: current media, preview surface, sample buffer,
//! transcript and recording, advanced one refresh tick at a time.
use std::path::Path;

use crate::{
    capture::{CaptureContext, CaptureController, CaptureEvent, CaptureState},
    config::Settings,
    encode::EncoderFactory,
    error::*,
    export::{
        Artifact, ExportFormat, ExportOutcome, ExportRequest, MAX_EXPORT_SIDE, TranscriptSink,
    },
    frames::{FrameSource, MediaKind, Playback, open_media_from_path},
    maps::DensityRamp,
    pipeline::{FrameParams, GlyphGrid, Resolution, SampleBuffer},
    render::{Surface, SurfaceFactory},
    schedule::{RefreshMode, Schedule},
};

/// What one tick did.
#[derive(Debug, Default)]
pub struct TickReport {
    /// A new glyph pass was drawn to the preview.
    pub rendered: bool,
    /// A recording finished on this tick.
    pub artifact: Option<Artifact>,
}

/// Media with the preview surface and sample buffer sized for it. They are
/// created and replaced together, so their sizes always agree.
struct Stage<S> {
    source: FrameSource,
    preview: S,
    buffer: SampleBuffer,
}

pub struct Session<F: SurfaceFactory> {
    factory: F,
    encoders: Box<dyn EncoderFactory>,
    sink: Box<dyn TranscriptSink>,
    preview_width: u32,
    prefix: String,
    fidelity: u32,
    ramp: DensityRamp,
    stage: Option<Stage<F::Surface>>,
    transcript: String,
    schedule: Schedule,
    capture: CaptureController,
}

impl<F: SurfaceFactory> std::fmt::Debug for Session<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("media", &self.media_kind())
            .field("fidelity", &self.fidelity)
            .field("ramp", &self.ramp)
            .field("schedule", &self.schedule)
            .field("capture", &self.capture)
            .finish_non_exhaustive()
    }
}

impl<F: SurfaceFactory> Session<F> {
    pub fn new(
        settings: &Settings,
        factory: F,
        encoders: Box<dyn EncoderFactory>,
        sink: Box<dyn TranscriptSink>,
    ) -> Self {
        Self {
            factory,
            encoders,
            sink,
            preview_width: settings.preview.width.max(1),
            prefix: settings.export.prefix.clone(),
            fidelity: settings.render.fidelity.max(1),
            ramp: DensityRamp::new(&settings.render.density),
            stage: None,
            transcript: String::new(),
            schedule: Schedule::default(),
            capture: CaptureController::new(
                settings.capture.fps,
                settings.capture.bitrate,
                settings.export.prefix.clone(),
            ),
        }
    }

    /// Replaces the current media. An active recording is stopped first and
    /// its artifact returned; the new media is installed even if that stop
    /// fails, in which case the error is returned.
    pub fn load_media(&mut self, source: FrameSource) -> Result<Option<Artifact>, Error> {
        let (width, height) = source.dimensions().ok_or_else(|| {
            Error::Pipeline(format!("{ERROR_DATA}: media has no decodable frame"))
        })?;
        let stopped = self.stop_recording();
        if let Err(err) = &stopped {
            log::warn!("recording aborted by media switch: {err}");
        }

        // release the old media before the new one is installed
        self.stage = None;
        let resolution = Resolution::fit_width(self.preview_width, width, height);
        log::debug!(
            "loaded {:?} {width}x{height}, preview {}x{}",
            source.kind(),
            resolution.width,
            resolution.height
        );
        self.schedule.media_loaded(source.kind());
        self.stage = Some(Stage {
            preview: self.factory.create(resolution),
            buffer: SampleBuffer::new(resolution),
            source,
        });
        self.transcript.clear();
        stopped
    }

    /// Opens and loads a file. Files that are not images or videos are
    /// ignored.
    pub fn load_path(&mut self, path: &Path) -> Result<Option<Artifact>, Error> {
        match open_media_from_path(path)? {
            Some(source) => self.load_media(source),
            None => Ok(None),
        }
    }

    pub fn set_fidelity(&mut self, step: u32) {
        self.fidelity = step.max(1);
        self.params_changed();
    }

    pub fn set_density(&mut self, density: &str) {
        self.ramp = DensityRamp::new(density);
        self.params_changed();
    }

    fn params_changed(&mut self) {
        if let Some(kind) = self.media_kind() {
            self.schedule.params_changed(kind);
        }
    }

    /// One refresh: sample the current frame, draw it to the preview, feed
    /// an active recording and move a video forward.
    pub fn tick(&mut self) -> Result<TickReport, Error> {
        let mut report = TickReport::default();
        let Some(stage) = self.stage.as_mut() else {
            return Ok(report);
        };
        if !self.schedule.should_render() || !stage.source.is_ready() {
            return Ok(report);
        }

        // parameter changes made during this pass apply from the next one
        let params = FrameParams::new(self.fidelity, self.ramp.clone());
        if let Some(frame) = stage.source.current_frame() {
            match stage.buffer.capture(frame) {
                Ok(()) => {
                    let grid = GlyphGrid::sample(&stage.buffer, &params, 1)?;
                    stage.preview.draw_grid(&grid);
                    self.transcript = grid.into_transcript();
                    self.schedule.rendered();
                    report.rendered = true;
                }
                Err(err) => log::warn!("skipping frame: {err}"),
            }
        }

        let mut ctx = CaptureContext {
            source: &mut stage.source,
            encoders: self.encoders.as_ref(),
            frame: stage.buffer.resolution(),
        };
        if report.rendered {
            self.capture.capture_frame(stage.preview.pixels(), &mut ctx)?;
        }
        if ctx.source.advance()? == Playback::Ended {
            report.artifact = self
                .capture
                .handle(CaptureEvent::EndOfPlayback, &mut ctx)?
                .artifact;
        }
        Ok(report)
    }

    pub fn export(&mut self, request: ExportRequest) -> Result<ExportOutcome, Error> {
        let Some(stage) = self.stage.as_mut() else {
            return Ok(ExportOutcome::Skipped);
        };
        match request.format {
            ExportFormat::Png | ExportFormat::Jpeg => {
                if !stage.buffer.is_populated() {
                    return Ok(ExportOutcome::Skipped);
                }
                let params = FrameParams::new(self.fidelity, self.ramp.clone());
                let grid = GlyphGrid::sample(&stage.buffer, &params, request.scale)?;
                let extent = grid.extent();
                if extent.width > MAX_EXPORT_SIDE || extent.height > MAX_EXPORT_SIDE {
                    return Err(Error::Pipeline(format!(
                        "{ERROR_RESIZE}: {}x{} export exceeds {MAX_EXPORT_SIDE} pixels per side",
                        extent.width, extent.height
                    )));
                }
                let mut surface = self.factory.create(extent);
                surface.draw_grid(&grid);
                let artifact =
                    Artifact::from_raster(surface.pixels().clone(), request.format, &self.prefix)?;
                log::info!("raster export {} at scale {}", artifact.name, request.scale);
                Ok(ExportOutcome::Raster(artifact))
            }
            ExportFormat::Text => {
                if self.transcript.is_empty() {
                    return Ok(ExportOutcome::Skipped);
                }
                self.sink.deliver(&self.transcript)?;
                Ok(ExportOutcome::TranscriptDelivered)
            }
            ExportFormat::Webm => {
                let mut ctx = CaptureContext {
                    source: &mut stage.source,
                    encoders: self.encoders.as_ref(),
                    frame: stage.buffer.resolution(),
                };
                let outcome = self.capture.handle(CaptureEvent::ExportVideo, &mut ctx)?;
                Ok(match outcome.artifact {
                    Some(artifact) => ExportOutcome::Video(artifact),
                    None => ExportOutcome::RecordingStarted,
                })
            }
        }
    }

    /// Stops an active recording, returning what it captured.
    pub fn stop_recording(&mut self) -> Result<Option<Artifact>, Error> {
        let Some(stage) = self.stage.as_mut() else {
            return Ok(None);
        };
        if !self.capture.is_recording() {
            return Ok(None);
        }
        let mut ctx = CaptureContext {
            source: &mut stage.source,
            encoders: self.encoders.as_ref(),
            frame: stage.buffer.resolution(),
        };
        Ok(self.capture.handle(CaptureEvent::Stop, &mut ctx)?.artifact)
    }

    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    pub fn capture_state(&self) -> CaptureState {
        self.capture.state()
    }

    pub fn refresh_mode(&self) -> RefreshMode {
        self.schedule.mode()
    }

    pub fn media_kind(&self) -> Option<MediaKind> {
        self.stage.as_ref().map(|s| s.source.kind())
    }

    pub fn fps(&self) -> Option<f64> {
        self.stage.as_ref().and_then(|s| s.source.fps())
    }

    pub fn fidelity(&self) -> u32 {
        self.fidelity
    }

    pub fn ramp(&self) -> &DensityRamp {
        &self.ramp
    }

    pub fn preview(&self) -> Option<&F::Surface> {
        self.stage.as_ref().map(|s| &s.preview)
    }

    pub fn sample_buffer(&self) -> Option<&SampleBuffer> {
        self.stage.as_ref().map(|s| &s.buffer)
    }

    pub fn source(&self) -> Option<&FrameSource> {
        self.stage.as_ref().map(|s| &s.source)
    }
}
