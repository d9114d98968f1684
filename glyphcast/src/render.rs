use image::RgbaImage;

use crate::pipeline::{GlyphGrid, Resolution};

/// Destination of a glyph pass: the live preview or an export raster.
pub trait Surface {
    fn resolution(&self) -> Resolution;
    /// Clears the surface and draws every glyph of `grid` at its position,
    /// sized to the grid's font size.
    fn draw_grid(&mut self, grid: &GlyphGrid);
    /// The pixels as they are now, for capture and export.
    fn pixels(&self) -> &RgbaImage;
}

/// Builds surfaces at a given resolution. The preview surface is recreated
/// whenever the media changes, export surfaces are made per export.
pub trait SurfaceFactory {
    type Surface: Surface;

    fn create(&self, resolution: Resolution) -> Self::Surface;
}

/// Ink and background colors shared by every surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub ink: [u8; 4],
    pub background: [u8; 4],
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            ink: [44, 44, 44, 255],
            background: [255, 255, 255, 255],
        }
    }
}

impl Palette {
    pub fn from_rgb(ink: [u8; 3], background: [u8; 3]) -> Self {
        Self {
            ink: [ink[0], ink[1], ink[2], 255],
            background: [background[0], background[1], background[2], 255],
        }
    }
}

#[cfg(feature = "render")]
pub use raster::{RasterFactory, RasterSurface, load_font};

#[cfg(feature = "render")]
mod raster {
    use std::path::{Path, PathBuf};

    use ab_glyph::FontArc;
    use image::{Rgba, RgbaImage};
    use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

    use super::{Palette, Surface, SurfaceFactory};
    use crate::error::*;
    use crate::pipeline::{Glyph, GlyphGrid, Resolution};

    /// Monospace fonts tried when no font path is configured.
    const FONT_CANDIDATES: &[&str] = &[
        "/usr/share/fonts/truetype/dejavu/DejaVuSansMono.ttf",
        "/usr/share/fonts/dejavu/DejaVuSansMono.ttf",
        "/usr/share/fonts/TTF/DejaVuSansMono.ttf",
        "/usr/share/fonts/truetype/liberation/LiberationMono-Regular.ttf",
        "/usr/share/fonts/liberation-mono/LiberationMono-Regular.ttf",
        "/usr/share/fonts/truetype/noto/NotoSansMono-Regular.ttf",
        "/System/Library/Fonts/Menlo.ttc",
        "/System/Library/Fonts/Monaco.ttf",
        "C:\\Windows\\Fonts\\consola.ttf",
    ];

    /// Loads the font at `path`, or the first monospace font found in the
    /// usual system locations.
    pub fn load_font(path: Option<&Path>) -> Result<FontArc, Error> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => FONT_CANDIDATES
                .iter()
                .map(PathBuf::from)
                .find(|p| p.is_file())
                .ok_or_else(|| {
                    Error::Font(format!(
                        "{ERROR_LOADING_FONT}: no monospace font found, pass one explicitly"
                    ))
                })?,
        };
        let data = std::fs::read(&path).map_err(|e| {
            Error::Font(format!("{ERROR_LOADING_FONT} '{}': {e}", path.display()))
        })?;
        log::debug!("using font {}", path.display());
        FontArc::try_from_vec(data)
            .map_err(|e| Error::Font(format!("{ERROR_LOADING_FONT} '{}': {e}", path.display())))
    }

    #[derive(Clone)]
    pub struct RasterFactory {
        font: FontArc,
        palette: Palette,
    }

    impl RasterFactory {
        pub fn new(font: FontArc, palette: Palette) -> Self {
            Self { font, palette }
        }
    }

    impl std::fmt::Debug for RasterFactory {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("RasterFactory")
                .field("palette", &self.palette)
                .finish_non_exhaustive()
        }
    }

    impl SurfaceFactory for RasterFactory {
        type Surface = RasterSurface;

        fn create(&self, resolution: Resolution) -> RasterSurface {
            RasterSurface::new(resolution, self.font.clone(), self.palette)
        }
    }

    /// Font rasterized glyphs on an RGBA image.
    pub struct RasterSurface {
        image: RgbaImage,
        font: FontArc,
        palette: Palette,
    }

    impl RasterSurface {
        pub fn new(resolution: Resolution, font: FontArc, palette: Palette) -> Self {
            Self {
                image: RgbaImage::from_pixel(
                    resolution.width,
                    resolution.height,
                    Rgba(palette.background),
                ),
                font,
                palette,
            }
        }

        fn draw_row(&self, row: &[Glyph], font_px: f32) -> RgbaImage {
            let mut band = RgbaImage::from_pixel(
                self.image.width(),
                font_px.ceil() as u32,
                Rgba(self.palette.background),
            );
            let mut buf = [0u8; 4];
            for glyph in row {
                if glyph.ch == ' ' {
                    continue;
                }
                imageproc::drawing::draw_text_mut(
                    &mut band,
                    Rgba(self.palette.ink),
                    glyph.x.floor() as i32,
                    0,
                    font_px,
                    &self.font,
                    glyph.ch.encode_utf8(&mut buf),
                );
            }
            band
        }
    }

    impl Surface for RasterSurface {
        fn resolution(&self) -> Resolution {
            Resolution::new(self.image.width(), self.image.height())
        }

        fn draw_grid(&mut self, grid: &GlyphGrid) {
            let font_px = grid.font_px();
            // rows are disjoint horizontal bands, rendered in parallel
            let bands: Vec<(u32, RgbaImage)> = grid
                .rows()
                .par_iter()
                .filter_map(|row| {
                    let y = row.first()?.y.floor() as u32;
                    Some((y, self.draw_row(row, font_px)))
                })
                .collect();

            for pixel in self.image.pixels_mut() {
                *pixel = Rgba(self.palette.background);
            }
            for (y, band) in bands {
                image::imageops::replace(&mut self.image, &band, 0, y as i64);
            }
        }

        fn pixels(&self) -> &RgbaImage {
            &self.image
        }
    }

}
