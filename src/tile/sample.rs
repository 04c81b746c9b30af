//! Sample-size (resolution tier) selection.
//!
//! A sample size of 1 decodes at full resolution; larger powers of two ask
//! the decoder for coarser, cheaper output. Each distinct sample size owns
//! its own tile grid in the cache.

/// Coarsest tier. Also returned when the requested scale collapses the
/// image to nothing.
pub const MAX_SAMPLE_SIZE: u32 = 32;

/// Resolve the decoder sample size for displaying a `width` x `height` image
/// at `scale` destination pixels per source pixel.
///
/// Both ratios are computed against the image *width*; this mirrors the
/// decoder's square-pixel sampling and changes which tier is chosen for
/// non-square images, so it must not be "corrected" here.
///
/// The candidate ratio is reduced to the largest power of two strictly below
/// it (or 1), matching how the region decoder rounds sample sizes, and capped
/// at [`MAX_SAMPLE_SIZE`] so extreme zoom-out never picks a finer tier than
/// the degenerate case.
pub fn calculate_sample_size(scale: f32, width: u32, height: u32) -> u32 {
    // Float to int casts saturate: negative and NaN scales land on zero.
    let req_width = (width as f32 * scale) as u32;
    let req_height = (height as f32 * scale) as u32;

    if req_width == 0 || req_height == 0 {
        return MAX_SAMPLE_SIZE;
    }

    let mut candidate = 1u32;
    if width > req_width || height > req_height {
        let width_ratio = (width as f32 / req_width as f32).round() as u32;
        let height_ratio = (width as f32 / req_height as f32).round() as u32;
        candidate = width_ratio.min(height_ratio);
    }

    let mut power = 1u32;
    while power.saturating_mul(2) < candidate {
        power *= 2;
    }
    power.min(MAX_SAMPLE_SIZE)
}

/// True if `sample_size` is a valid tier key.
#[inline]
pub fn is_valid_sample_size(sample_size: u32) -> bool {
    sample_size.is_power_of_two()
}
