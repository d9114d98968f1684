//! Turns still images and videos into grids of glyphs picked by brightness,
//! renders them to a preview surface every frame, and exports the result as
//! a raster image, a text transcript or a recorded video.
//!
//! # Example
//! ```no_run
//! use glyphcast::config::Settings;
//! use glyphcast::encode::FfmpegEncoderFactory;
//! use glyphcast::export::{ExportFormat, ExportRequest, WriterSink};
//! use glyphcast::render::{RasterFactory, load_font};
//! use glyphcast::session::Session;
//!
//! # fn main() -> Result<(), glyphcast::error::Error> {
//! let settings = Settings::default();
//! let factory = RasterFactory::new(load_font(None)?, settings.render.palette());
//! let mut session = Session::new(
//!     &settings,
//!     factory,
//!     Box::new(FfmpegEncoderFactory),
//!     Box::new(WriterSink::new(std::io::stdout())),
//! );
//! session.load_path("photo.jpg".as_ref())?;
//! session.tick()?;
//! session.export(ExportRequest::new(ExportFormat::Text, 1))?;
//! # Ok(())
//! # }
//! ```

pub mod capture;
pub mod config;
pub mod encode;
pub mod error;
pub mod export;
pub mod frames;
pub mod maps;
pub mod pipeline;
pub mod player;
pub mod render;
pub mod schedule;
pub mod session;
pub mod util;
