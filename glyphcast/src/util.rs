use std::{
    path::Path,
    process::{Command, Stdio},
    str::FromStr,
};

use num::{Rational64, ToPrimitive};
use serde_json::Value;

/// Frame rate of the first video stream as reported by `ffprobe`, if it is
/// installed and understands the file.
pub fn extract_fps(video_path: &Path) -> Option<f64> {
    let output = Command::new("ffprobe")
        .arg("-v")
        .arg("error")
        .arg("-select_streams")
        .arg("v:0")
        .arg("-show_entries")
        .arg("stream=r_frame_rate")
        .arg("-of")
        .arg("json")
        .arg(video_path)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .map_err(|e| log::debug!("ffprobe unavailable: {e}"))
        .ok()?;

    let output_str = String::from_utf8(output.stdout).unwrap_or_default();
    parse_frame_rate(&output_str)
}

fn parse_frame_rate(ffprobe_json: &str) -> Option<f64> {
    let json_value: Value = serde_json::from_str(ffprobe_json).unwrap_or(Value::Null);
    let r_frame_rate = json_value["streams"][0]["r_frame_rate"].as_str()?;
    let frame_rate = Rational64::from_str(r_frame_rate).ok()?;
    frame_rate.to_f64().filter(|fps| fps.is_finite() && *fps > 0.0)
}

#[cfg(feature = "video")]
pub fn mat_to_dynamic_image(mat: &opencv::core::Mat) -> Option<image::DynamicImage> {
    use opencv::{core::*, imgproc, prelude::*};

    let mut rgba_mat = Mat::default();
    imgproc::cvt_color(
        mat,
        &mut rgba_mat,
        imgproc::COLOR_BGR2RGBA,
        0,
        AlgorithmHint::ALGO_HINT_DEFAULT,
    )
    .ok()?;
    let size = rgba_mat.size().ok()?;
    let data = rgba_mat.data_bytes().ok()?.to_vec();
    image::RgbaImage::from_raw(size.width as u32, size.height as u32, data)
        .map(image::DynamicImage::ImageRgba8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rational_frame_rates() {
        let json = r#"{"streams":[{"r_frame_rate":"30000/1001"}]}"#;
        let fps = parse_frame_rate(json).unwrap();
        assert!((fps - 29.97).abs() < 0.01);
    }

    #[test]
    fn rejects_missing_or_zero_rates() {
        assert_eq!(parse_frame_rate("not json"), None);
        assert_eq!(parse_frame_rate(r#"{"streams":[]}"#), None);
        assert_eq!(parse_frame_rate(r#"{"streams":[{"r_frame_rate":"0/1"}]}"#), None);
    }
}
