//! Orientation correction between display space and source space.
//!
//! Callers always work in display space, i.e. after the orientation has been
//! applied. The region decoder only understands the raw source layout, so
//! every rectangle is mapped through [`Orientation::to_source_rect`] before a
//! decode.

use serde::Serialize;

use crate::tile::Rect;

/// Clockwise rotation needed to show the source upright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum Orientation {
    #[default]
    Normal,
    Rotate90,
    Rotate180,
    Rotate270,
}

impl Orientation {
    /// Map an EXIF orientation tag value to a rotation.
    ///
    /// Only the pure rotations are honoured; mirrored and undefined values
    /// display as-is.
    pub fn from_exif(value: u32) -> Self {
        match value {
            6 => Orientation::Rotate90,
            3 => Orientation::Rotate180,
            8 => Orientation::Rotate270,
            _ => Orientation::Normal,
        }
    }

    /// Build from a rotation in degrees. Returns `None` for anything other
    /// than 0, 90, 180 or 270.
    pub fn from_degrees(degrees: u32) -> Option<Self> {
        match degrees {
            0 => Some(Orientation::Normal),
            90 => Some(Orientation::Rotate90),
            180 => Some(Orientation::Rotate180),
            270 => Some(Orientation::Rotate270),
            _ => None,
        }
    }

    pub fn degrees(&self) -> u32 {
        match self {
            Orientation::Normal => 0,
            Orientation::Rotate90 => 90,
            Orientation::Rotate180 => 180,
            Orientation::Rotate270 => 270,
        }
    }

    /// True if width and height trade places between source and display.
    pub fn swaps_axes(&self) -> bool {
        matches!(self, Orientation::Rotate90 | Orientation::Rotate270)
    }

    /// Display dimensions of a `width` x `height` source.
    pub fn display_size(&self, width: u32, height: u32) -> (u32, u32) {
        if self.swaps_axes() {
            (height, width)
        } else {
            (width, height)
        }
    }

    /// Transform a display-space rectangle into the source rectangle handed
    /// to the region decoder.
    ///
    /// `display_width` and `display_height` are the full display extents.
    /// The quarter-turn cases reflect against the display extent of the
    /// opposite axis, exactly as the platform region decoder expects.
    pub fn to_source_rect(&self, rect: Rect, display_width: u32, display_height: u32) -> Rect {
        let w = display_width as i32;
        let h = display_height as i32;
        match self {
            Orientation::Normal => rect,
            Orientation::Rotate90 => Rect::new(rect.top, h - rect.right, rect.bottom, h - rect.left),
            Orientation::Rotate180 => Rect::new(
                w - rect.right,
                h - rect.bottom,
                w - rect.left,
                h - rect.top,
            ),
            Orientation::Rotate270 => Rect::new(w - rect.bottom, rect.left, w - rect.top, rect.right),
        }
    }
}
