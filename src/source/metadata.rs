//! EXIF metadata reading.
//!
//! Only the orientation tag is consulted; everything else in the EXIF block
//! is ignored.

use std::io::Cursor;

use exif::{In, Reader, Tag};
use tracing::trace;

use super::Orientation;

/// Read the EXIF orientation from an encoded image.
///
/// Sources without EXIF data, or with an unreadable orientation tag, are
/// treated as upright.
pub fn read_orientation(data: &[u8]) -> Orientation {
    let mut cursor = Cursor::new(data);
    let exif = match Reader::new().read_from_container(&mut cursor) {
        Ok(exif) => exif,
        Err(e) => {
            trace!("no EXIF orientation: {}", e);
            return Orientation::Normal;
        }
    };

    exif.get_field(Tag::Orientation, In::PRIMARY)
        .and_then(|field| field.value.get_uint(0))
        .map(Orientation::from_exif)
        .unwrap_or_default()
}
