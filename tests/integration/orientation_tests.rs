//! Orientation integration tests.
//!
//! Tests verify:
//! - EXIF orientation is read from real JPEG data
//! - Display dimensions swap for quarter turns
//! - Display rectangles reach the decoder in source coordinates

use tile_provider::{
    ImageRegionDecoder, Orientation, Rect, RegionDecoder, TilesProvider,
};

use super::test_utils::{jpeg_with_orientation, TrackingMockDecoder};

/// Request the top-left display tile of a 1000x1000 image and return the
/// source rectangle the decoder was asked for.
async fn top_left_source_rect(orientation: Orientation) -> Rect {
    let decoder = TrackingMockDecoder::new(1000, 1000).with_orientation(orientation);
    let mut provider = TilesProvider::new(decoder.clone(), |_| {}).unwrap();

    provider
        .request_tiles(1.0, 100, 100, Rect::new(0, 0, 100, 100))
        .unwrap();
    let outcomes = provider.settle().await.unwrap();
    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].is_accepted());

    let requests = decoder.requests();
    assert_eq!(requests.len(), 1);
    requests[0].0
}

// =============================================================================
// Source Rectangles
// =============================================================================

#[tokio::test]
async fn test_upright_source_passes_through() {
    assert_eq!(
        top_left_source_rect(Orientation::Normal).await,
        Rect::new(0, 0, 125, 125)
    );
}

#[tokio::test]
async fn test_rotate_90_source_rect() {
    assert_eq!(
        top_left_source_rect(Orientation::Rotate90).await,
        Rect::new(0, 875, 125, 1000)
    );
}

#[tokio::test]
async fn test_rotate_180_source_rect() {
    assert_eq!(
        top_left_source_rect(Orientation::Rotate180).await,
        Rect::new(875, 875, 1000, 1000)
    );
}

#[tokio::test]
async fn test_rotate_270_source_rect() {
    assert_eq!(
        top_left_source_rect(Orientation::Rotate270).await,
        Rect::new(875, 0, 1000, 125)
    );
}

#[tokio::test]
async fn test_tiles_keep_display_rects() {
    let decoder = TrackingMockDecoder::new(1000, 1000).with_orientation(Orientation::Rotate90);
    let mut provider = TilesProvider::new(decoder, |_| {}).unwrap();
    let viewport = Rect::new(0, 0, 100, 100);

    provider.request_tiles(1.0, 100, 100, viewport).unwrap();
    provider.settle().await.unwrap();

    let tiles = provider.request_tiles(1.0, 100, 100, viewport).unwrap();
    assert_eq!(tiles.len(), 1);
    assert_eq!(tiles[0].rect, Rect::new(0, 0, 125, 125));
}

#[tokio::test]
async fn test_quarter_turn_swaps_display_size() {
    let decoder = TrackingMockDecoder::new(2000, 1000).with_orientation(Orientation::Rotate90);
    let provider = TilesProvider::new(decoder, |_| {}).unwrap();

    assert_eq!((provider.width(), provider.height()), (1000, 2000));
    assert_eq!(provider.orientation(), Orientation::Rotate90);
    assert_eq!(provider.metadata().width, 2000);
}

// =============================================================================
// EXIF
// =============================================================================

#[test]
fn test_exif_orientation_values() {
    let cases = [
        (1, Orientation::Normal),
        (3, Orientation::Rotate180),
        (6, Orientation::Rotate90),
        (8, Orientation::Rotate270),
        // Mirrored orientations display as stored
        (2, Orientation::Normal),
    ];

    for (value, expected) in cases {
        let data = jpeg_with_orientation(48, 16, value);
        assert_eq!(tile_provider::read_orientation(&data), expected, "EXIF {value}");
    }
}

#[test]
fn test_decoder_reports_exif_rotation() {
    let decoder = ImageRegionDecoder::from_bytes(jpeg_with_orientation(48, 16, 6)).unwrap();
    let metadata = decoder.metadata();

    assert_eq!((metadata.width, metadata.height), (48, 16));
    assert_eq!(metadata.orientation, Orientation::Rotate90);
    assert_eq!(metadata.display_size(), (16, 48));
}

#[tokio::test]
async fn test_provider_decodes_rotated_jpeg() {
    let mut provider =
        TilesProvider::from_bytes(jpeg_with_orientation(64, 64, 8), |_| {}).unwrap();
    assert_eq!(provider.orientation(), Orientation::Rotate270);

    let whole = Rect::new(0, 0, 64, 64);
    provider.request_tiles(1.0, 64, 64, whole).unwrap();
    provider.settle().await.unwrap();

    let tiles = provider.request_tiles(1.0, 64, 64, whole).unwrap();
    assert_eq!(tiles.len(), 1);

    let pixel = tiles[0].pixels.get_pixel(32, 32);
    // JPEG is lossy; the fill colour only needs to be close
    assert!((pixel[0] as i32 - 200).abs() < 8, "{pixel:?}");
    assert!((pixel[1] as i32 - 100).abs() < 8, "{pixel:?}");
    assert!((pixel[2] as i32 - 50).abs() < 8, "{pixel:?}");
}
