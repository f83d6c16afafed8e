// ============================================================================
// TRANSFORM SERVICE — seam to the external generative-image collaborator
// ============================================================================
//
// The editing core never talks to a concrete API. Implementations of
// [`TransformService`] wrap whatever backend performs the actual image
// generation; the core only cares that each call either yields a replacement
// raster or fails with a message.

use image::RgbaImage;

/// A pixel coordinate in the source image's native resolution, marking the
/// target region of a localized retouch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Hotspot {
    pub x: u32,
    pub y: u32,
}

/// Options shared by every generative operation.
#[derive(Clone, Debug, Default)]
pub struct TransformOptions {
    /// Free-text guidance appended to the main instruction, if any.
    pub auxiliary: Option<String>,
    /// Ask the backend for output with a transparent background.
    pub transparent_background: bool,
}

/// Failure reported by a transform backend.
///
/// The core treats every variant the same way: the operation fails, the
/// message is surfaced to the user, and the pre-operation image is kept.
#[derive(Debug)]
pub enum TransformError {
    /// The backend rejected or could not complete the request.
    Service(String),
    /// The backend responded, but not with a usable image.
    BadOutput(String),
}

impl std::fmt::Display for TransformError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransformError::Service(msg) => write!(f, "{}", msg),
            TransformError::BadOutput(msg) => write!(f, "unusable response: {}", msg),
        }
    }
}

/// The five generative operations the editor delegates.
///
/// Implementations run to completion or failure; the core imposes no timeout
/// and never cancels an in-flight call.
pub trait TransformService {
    /// Localized edit: apply `instruction` at `hotspot`.  `scale_percent`
    /// (100 = native size) lets the backend work on an up- or downscaled
    /// rendition of the region.
    fn edit_by_hotspot(
        &self,
        image: &RgbaImage,
        instruction: &str,
        hotspot: Hotspot,
        scale_percent: u32,
        options: &TransformOptions,
    ) -> Result<RgbaImage, TransformError>;

    /// Apply a stylistic filter described by `style` to the whole image.
    fn filter(
        &self,
        image: &RgbaImage,
        style: &str,
        options: &TransformOptions,
    ) -> Result<RgbaImage, TransformError>;

    /// Global adjustment described by `instruction`, optionally steered by a
    /// secondary reference image.
    fn adjust(
        &self,
        image: &RgbaImage,
        instruction: &str,
        reference: Option<&RgbaImage>,
        options: &TransformOptions,
    ) -> Result<RgbaImage, TransformError>;

    /// Replace the face in `source` with the face from `target_face`.
    fn face_swap(
        &self,
        source: &RgbaImage,
        target_face: &RgbaImage,
        options: &TransformOptions,
    ) -> Result<RgbaImage, TransformError>;

    /// Remove the background, keeping the subject.
    fn remove_background(
        &self,
        image: &RgbaImage,
        options: &TransformOptions,
    ) -> Result<RgbaImage, TransformError>;
}
