//! This module defines the custom error type `Error` used throughout the crate,
//! as well as various error message constants.
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Application error: {0}")]
    Application(String),
    #[error("Image pipeline error: {0}")]
    Pipeline(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Font error: {0}")]
    Font(String),
    #[error("Unsupported capture: {0}")]
    UnsupportedCapture(String),
    #[error("Capture error: {0}")]
    Capture(String),
    #[error("Delivery error: {0}")]
    Delivery(String),
}

impl From<Error> for io::Error {
    fn from(error: Error) -> Self {
        io::Error::other(error.to_string())
    }
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Self {
        Error::Application(format!("{error}"))
    }
}

impl From<image::ImageError> for Error {
    fn from(error: image::ImageError) -> Self {
        Error::Pipeline(format!("{error}"))
    }
}

#[cfg(feature = "video")]
impl From<opencv::Error> for Error {
    fn from(error: opencv::Error) -> Self {
        Error::Application(format!("{error}"))
    }
}

/// Error message for issues related to decoding an image.
pub const ERROR_DECODING_IMAGE: &str = "Error decoding image";
/// Error message for issues related to opening a video.
pub const ERROR_OPENING_VIDEO: &str = "Error opening video";
/// Error message for issues related to data processing.
pub const ERROR_DATA: &str = "Data error";
/// Error message for issues related to resizing a frame into the sample buffer.
pub const ERROR_RESIZE: &str = "Image resizing error";
/// Error message for a missing or unreadable font.
pub const ERROR_LOADING_FONT: &str = "Error loading font";
/// Error message for video export requested against a still image.
pub const ERROR_CAPTURE_STILL_IMAGE: &str =
    "video export needs a video source with an end of playback";
/// Error message for a missing encoder backend.
pub const ERROR_CAPTURE_UNAVAILABLE: &str = "stream capture unavailable";
/// Error message for an encoder that failed mid-recording.
pub const ERROR_ENCODING: &str = "Error encoding video";
