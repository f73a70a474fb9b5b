use super::raw_image::{ColorMode, RawImage};
use crate::config::ValidationConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    TooSmall,
    NotMriLike,
    /// Bytes that do not decode. Reported by [`RawImage::decode`]; [`validate`]
    /// only sees decoded images and never returns it.
    Corrupt,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidationVerdict {
    pub accepted: bool,
    pub reason: Option<RejectReason>,
    /// Per-channel population standard deviation, when it was computed.
    pub channel_stddev: Option<[f64; 3]>,
}

impl ValidationVerdict {
    fn accept(channel_stddev: [f64; 3]) -> Self {
        Self {
            accepted: true,
            reason: None,
            channel_stddev: Some(channel_stddev),
        }
    }

    fn reject(reason: RejectReason, channel_stddev: Option<[f64; 3]>) -> Self {
        Self {
            accepted: false,
            reason: Some(reason),
            channel_stddev,
        }
    }
}

/// Population standard deviation of each RGB channel over all pixels.
pub fn channel_stddev(image: &RawImage) -> [f64; 3] {
    let rgb = match image.as_dynamic().as_rgb8() {
        Some(rgb) => std::borrow::Cow::Borrowed(rgb),
        None => std::borrow::Cow::Owned(image.as_dynamic().to_rgb8()),
    };

    let mut sum = [0f64; 3];
    let mut sum_sq = [0f64; 3];
    for pixel in rgb.pixels() {
        for c in 0..3 {
            let v = pixel.0[c] as f64;
            sum[c] += v;
            sum_sq[c] += v * v;
        }
    }

    let n = (rgb.width() as f64) * (rgb.height() as f64);
    let mut stddev = [0f64; 3];
    if n == 0.0 {
        return stddev;
    }
    for c in 0..3 {
        let mean = sum[c] / n;
        // clamp away tiny negative variances from cancellation
        stddev[c] = (sum_sq[c] / n - mean * mean).max(0.0).sqrt();
    }
    stddev
}

pub fn stddev_spread(stddev: &[f64; 3]) -> f64 {
    (stddev[0] - stddev[1]).abs() + (stddev[1] - stddev[2]).abs()
}

/// Rejects images that are too small or do not look like a grayscale scan.
pub fn validate(image: &RawImage, config: &ValidationConfig) -> ValidationVerdict {
    if image.width() < config.min_width || image.height() < config.min_height {
        return ValidationVerdict::reject(RejectReason::TooSmall, None);
    }
    if image.color_mode() != ColorMode::Rgb {
        return ValidationVerdict::reject(RejectReason::NotMriLike, None);
    }

    let stddev = channel_stddev(image);
    if stddev_spread(&stddev) <= config.max_stddev_spread {
        ValidationVerdict::accept(stddev)
    } else {
        ValidationVerdict::reject(RejectReason::NotMriLike, Some(stddev))
    }
}
