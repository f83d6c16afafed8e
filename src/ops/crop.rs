// ============================================================================
// CROP — the one edit computed entirely locally
// ============================================================================
//
// The crop selection is drawn on a scaled-down display rendition, so the
// rectangle arrives in display coordinates and must be mapped to the
// composite's native resolution before pixels are extracted.

use image::{RgbaImage, imageops};

/// Axis-aligned selection rectangle in display coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CropRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// A crop request: the rectangle plus the display size it was drawn at.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CropSelection {
    pub rect: CropRect,
    pub display_width: f32,
    pub display_height: f32,
}

/// Map a display-space selection to a native-resolution pixel region
/// `(x, y, width, height)`, clamped to the image bounds.
///
/// Returns `None` for degenerate input: a zero-area rectangle, a zero-sized
/// display, or a selection entirely outside the image.
pub(crate) fn native_region(
    selection: &CropSelection,
    native_width: u32,
    native_height: u32,
) -> Option<(u32, u32, u32, u32)> {
    let rect = selection.rect;
    if rect.width <= 0.0 || rect.height <= 0.0 {
        return None;
    }
    if selection.display_width <= 0.0 || selection.display_height <= 0.0 {
        return None;
    }
    if native_width == 0 || native_height == 0 {
        return None;
    }

    let scale_x = native_width as f32 / selection.display_width;
    let scale_y = native_height as f32 / selection.display_height;

    let x0 = (rect.x * scale_x).round().max(0.0) as u32;
    let y0 = (rect.y * scale_y).round().max(0.0) as u32;
    if x0 >= native_width || y0 >= native_height {
        return None;
    }

    let w = ((rect.width * scale_x).round() as u32).min(native_width - x0);
    let h = ((rect.height * scale_y).round() as u32).min(native_height - y0);
    if w == 0 || h == 0 {
        return None;
    }

    Some((x0, y0, w, h))
}

/// Extract the region from the composite.
pub(crate) fn crop_image(source: &RgbaImage, x: u32, y: u32, width: u32, height: u32) -> RgbaImage {
    imageops::crop_imm(source, x, y, width, height).to_image()
}
