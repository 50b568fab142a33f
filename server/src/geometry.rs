//! Classical corroboration of the neural midline decision: locate the
//! horizontal centroid of dense tissue via raw image moments and convert
//! its deviation from the image center into millimeters.

use image::GrayImage;

use crate::round2;

/// Intensity cutoff separating dense tissue from background.
pub const DENSITY_THRESHOLD: u8 = 30;
/// Pixel-to-physical-unit scale.
pub const MM_PER_PIXEL: f64 = 0.5;
/// Fixed magnitude substituted when classical scoring fails outright.
pub const DEGRADED_SHIFT_MM: f64 = 5.0;

/// Outcome of the classical shift scoring. Failure degrades to a fixed
/// magnitude instead of propagating; the neural decision is still
/// reported either way.
#[derive(Debug, Clone, PartialEq)]
pub enum ShiftEstimate {
    /// Centroid deviation measured from the thresholded tissue mask.
    Measured(f64),
    /// Image unreadable or undecodable; the fallback magnitude stands in.
    Degraded { reason: String },
}

impl ShiftEstimate {
    pub fn magnitude_mm(&self) -> f64 {
        match self {
            ShiftEstimate::Measured(mm) => *mm,
            ShiftEstimate::Degraded { .. } => DEGRADED_SHIFT_MM,
        }
    }
}

/// Horizontal deviation of the dense-tissue centroid from the image
/// center, in millimeters, rounded to two decimals. `None` when no pixel
/// clears the threshold (zeroth moment is zero).
pub fn centroid_shift_mm(img: &GrayImage) -> Option<f64> {
    let (width, _) = img.dimensions();
    let mut m00: u64 = 0;
    let mut m10: u64 = 0;
    for (x, _, p) in img.enumerate_pixels() {
        if p.0[0] > DENSITY_THRESHOLD {
            m00 += 1;
            m10 += x as u64;
        }
    }
    if m00 == 0 {
        return None;
    }
    let centroid_x = (m10 / m00) as i64;
    let center_x = (width / 2) as i64;
    let shift_pixels = (centroid_x - center_x).abs() as f64;
    Some(round2(shift_pixels * MM_PER_PIXEL))
}

/// Re-reads the original image and scores it. An empty mask keeps the
/// zero default; read or decode failures degrade to [`DEGRADED_SHIFT_MM`].
pub fn estimate_shift(image_path: &str) -> ShiftEstimate {
    let bytes = match std::fs::read(image_path) {
        Ok(bytes) => bytes,
        Err(e) => return degraded(image_path, e.to_string()),
    };
    let img = match image::load_from_memory(&bytes) {
        Ok(img) => img.to_luma8(),
        Err(e) => return degraded(image_path, e.to_string()),
    };
    ShiftEstimate::Measured(centroid_shift_mm(&img).unwrap_or(0.0))
}

fn degraded(image_path: &str, reason: String) -> ShiftEstimate {
    log::warn!("shift scoring degraded for {}: {}", image_path, reason);
    ShiftEstimate::Degraded { reason }
}
