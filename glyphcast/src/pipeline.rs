use crate::{error::*, maps::DensityRamp};
use fast_image_resize as fir;
use image::DynamicImage;

/// Horizontal cell pitch relative to the step size, the usual width to
/// height ratio of a monospace glyph.
pub const HORIZONTAL_PITCH_RATIO: f64 = 0.6;

/// Width of the live preview surface in pixels.
pub const PREVIEW_WIDTH: u32 = 600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Fixed `width`, height following the media aspect ratio.
    pub fn fit_width(width: u32, media_width: u32, media_height: u32) -> Self {
        let width = width.max(1);
        let aspect = media_height as f64 / media_width.max(1) as f64;
        let height = (width as f64 * aspect).floor().max(1.0) as u32;
        Self { width, height }
    }

    /// `None` if either side overflows.
    pub fn scaled(&self, scale: u32) -> Option<Self> {
        let scale = scale.max(1);
        Some(Self {
            width: self.width.checked_mul(scale)?,
            height: self.height.checked_mul(scale)?,
        })
    }
}

/// Read-only snapshot of the sampling parameters for one pass.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameParams {
    /// Vertical pitch and font size, in pixels.
    pub step: u32,
    pub ramp: DensityRamp,
}

impl FrameParams {
    pub fn new(step: u32, ramp: DensityRamp) -> Self {
        Self {
            step: step.max(1),
            ramp,
        }
    }
}

/// Off-screen RGBA pixels of the current frame at preview resolution.
///
/// Both the live preview and the raster export sample from this buffer.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    populated: bool,
}

impl SampleBuffer {
    pub fn new(resolution: Resolution) -> Self {
        let width = resolution.width.max(1);
        let height = resolution.height.max(1);
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * 4],
            populated: false,
        }
    }

    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, Error> {
        if width == 0 || height == 0 || pixels.len() != width as usize * height as usize * 4 {
            return Err(Error::Pipeline(format!(
                "{ERROR_DATA}: expected {width}x{height} rgba pixels, got {} bytes",
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
            populated: true,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Whether a frame has been drawn into the buffer yet.
    pub fn is_populated(&self) -> bool {
        self.populated
    }

    /// Draws `frame` stretched over the whole buffer. The buffer keeps its
    /// dimensions; frames with a zero dimension are rejected.
    pub fn capture(&mut self, frame: &DynamicImage) -> Result<(), Error> {
        let (width, height) = (frame.width(), frame.height());
        if width == 0 || height == 0 {
            return Err(Error::Pipeline(format!("{ERROR_DATA}: empty frame")));
        }
        let src_image = fir::images::Image::from_vec_u8(
            width,
            height,
            frame.to_rgba8().into_raw(),
            fir::PixelType::U8x4,
        )
        .map_err(|err| Error::Pipeline(format!("{ERROR_RESIZE}:{err:?}")))?;

        let mut dst_image = fir::images::Image::new(self.width, self.height, fir::PixelType::U8x4);

        let mut resizer = fir::Resizer::new();
        resizer
            .resize(
                &src_image,
                &mut dst_image,
                &fir::ResizeOptions::new()
                    .resize_alg(fir::ResizeAlg::Convolution(fir::FilterType::Bilinear)),
            )
            .map_err(|err| Error::Pipeline(format!("{ERROR_RESIZE}:{err:?}")))?;

        let pixels = dst_image.into_vec();
        if pixels.len() != self.pixels.len() {
            return Err(Error::Pipeline(ERROR_DATA.to_string()));
        }
        self.pixels = pixels;
        self.populated = true;
        Ok(())
    }

    /// Point-samples one pixel and returns the mean of its red, green and
    /// blue channels. Alpha is ignored and coordinates are clamped to the
    /// buffer.
    pub fn brightness_at(&self, x: u32, y: u32) -> f64 {
        let x = x.min(self.width - 1) as usize;
        let y = y.min(self.height - 1) as usize;
        let idx = (x + y * self.width as usize) * 4;
        let px = &self.pixels[idx..idx + 3];
        (px[0] as f64 + px[1] as f64 + px[2] as f64) / 3.0
    }
}

/// Maps a destination coordinate on a surface `scale` times larger than the
/// sample buffer back to the buffer pixel it reads.
pub fn source_coordinate(x: f64, y: f64, scale: u32) -> (u32, u32) {
    let scale = scale.max(1) as f64;
    ((x / scale).floor() as u32, (y / scale).floor() as u32)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Glyph {
    pub ch: char,
    /// Top left of the cell on the destination surface.
    pub x: f32,
    pub y: f32,
}

/// One sampling pass: glyph rows positioned for drawing plus the text
/// transcript of the same rows.
#[derive(Debug, Clone, PartialEq)]
pub struct GlyphGrid {
    rows: Vec<Vec<Glyph>>,
    transcript: String,
    font_px: f32,
    extent: Resolution,
}

impl GlyphGrid {
    /// Samples `buffer` for a destination `scale` times its size.
    ///
    /// The step grows with the scale, so the same cells are visited at any
    /// scale; only the glyph size and positions change.
    pub fn sample(buffer: &SampleBuffer, params: &FrameParams, scale: u32) -> Result<Self, Error> {
        let scale = scale.max(1);
        let overflow = || Error::Pipeline(format!("{ERROR_RESIZE}: scale {scale} is too large"));
        let extent = buffer.resolution().scaled(scale).ok_or_else(overflow)?;
        let step = params.step.max(1).checked_mul(scale).ok_or_else(overflow)?;
        let pitch = step as f64 * HORIZONTAL_PITCH_RATIO;
        let (width, height) = (extent.width as f64, extent.height as f64);

        let mut rows = Vec::with_capacity((extent.height / step + 1) as usize);
        let mut transcript = String::new();

        let mut y = 0.0;
        while y < height {
            let mut row = Vec::new();
            // pitch accumulates, x is only floored when sampled
            let mut x = 0.0;
            while x < width {
                let (sx, sy) = source_coordinate(x.floor(), y, scale);
                let ch = params.ramp.glyph_for(buffer.brightness_at(sx, sy));
                row.push(Glyph {
                    ch,
                    x: x as f32,
                    y: y as f32,
                });
                transcript.push(ch);
                x += pitch;
            }
            transcript.push('\n');
            rows.push(row);
            y += step as f64;
        }

        Ok(Self {
            rows,
            transcript,
            font_px: step as f32,
            extent,
        })
    }

    pub fn rows(&self) -> &[Vec<Glyph>] {
        &self.rows
    }

    pub fn glyphs(&self) -> impl Iterator<Item = &Glyph> {
        self.rows.iter().flatten()
    }

    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    pub fn into_transcript(self) -> String {
        self.transcript
    }

    pub fn font_px(&self) -> f32 {
        self.font_px
    }

    /// Size of the surface the glyph positions refer to.
    pub fn extent(&self) -> Resolution {
        self.extent
    }
}
