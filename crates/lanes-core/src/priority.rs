//! The drag-slider mapping between pointer offset and [`Priority`].
//!
//! The track is split into four equal buckets. Bucket edges belong to the
//! lower bucket: exactly 25% is still `low`.

use crate::model::Priority;

/// Map a pointer offset along a track of `width` to a priority.
///
/// Offsets outside the track clamp to its ends. A track with no usable
/// width (zero, negative, NaN, infinite) yields [`Priority::Low`].
#[must_use]
pub fn priority_from_offset(x: f64, width: f64) -> Priority {
    if !width.is_finite() || width <= 0.0 || x.is_nan() {
        return Priority::Low;
    }
    priority_from_ratio(x / width)
}

/// Map a ratio in `[0, 1]` (clamped) to a priority.
#[must_use]
pub fn priority_from_ratio(ratio: f64) -> Priority {
    let ratio = ratio.clamp(0.0, 1.0);
    if ratio <= 0.25 {
        Priority::Low
    } else if ratio <= 0.5 {
        Priority::Medium
    } else if ratio <= 0.75 {
        Priority::High
    } else {
        Priority::Urgent
    }
}

impl Priority {
    /// Thumb position for this priority: the centre of its bucket.
    #[must_use]
    pub const fn slider_ratio(self) -> f64 {
        match self {
            Self::Low => 0.125,
            Self::Medium => 0.375,
            Self::High => 0.625,
            Self::Urgent => 0.875,
        }
    }
}
