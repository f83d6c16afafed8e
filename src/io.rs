// ============================================================================
// RASTER I/O — image bytes in, image bytes out, plus .phf project files
// ============================================================================

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::canvas::{Layer, LayerStack};

/// Maximum supported image dimension in pixels (per axis).
/// Prevents memory exhaustion from crafted files.
const MAX_IMAGE_DIM: u32 = 32_768;
/// Maximum number of layers in a project file.
const MAX_LAYERS: usize = 256;

pub const DEFAULT_JPEG_QUALITY: u8 = 90;

// ============================================================================
// DECODE / ENCODE
// ============================================================================

/// Errors from raster decode/encode.
#[derive(Debug)]
pub enum RasterError {
    Decode(String),
    Encode(String),
}

impl std::fmt::Display for RasterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RasterError::Decode(e) => write!(f, "Could not decode image: {}", e),
            RasterError::Encode(e) => write!(f, "Could not encode image: {}", e),
        }
    }
}

/// Output encodings for composite export.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    Png,
    Jpeg,
}

impl ExportFormat {
    pub fn label(&self) -> &'static str {
        match self {
            ExportFormat::Png => "PNG",
            ExportFormat::Jpeg => "JPEG",
        }
    }

    pub fn all() -> &'static [ExportFormat] {
        &[ExportFormat::Png, ExportFormat::Jpeg]
    }
}

/// Decode any supported image format (PNG, JPEG, WEBP, BMP, …) to RGBA.
pub fn decode_image(bytes: &[u8]) -> Result<RgbaImage, RasterError> {
    let img = image::load_from_memory(bytes).map_err(|e| RasterError::Decode(e.to_string()))?;
    let rgba = img.to_rgba8();
    let (w, h) = rgba.dimensions();
    if w == 0 || h == 0 || w > MAX_IMAGE_DIM || h > MAX_IMAGE_DIM {
        return Err(RasterError::Decode(format!(
            "unsupported dimensions {}×{}",
            w, h
        )));
    }
    Ok(rgba)
}

/// Encode an image to bytes.  `quality` (1–100) applies to JPEG only; JPEG
/// output drops the alpha channel.
pub fn encode_image(
    image: &RgbaImage,
    format: ExportFormat,
    quality: u8,
) -> Result<Vec<u8>, RasterError> {
    let mut out: Vec<u8> = Vec::new();
    match format {
        ExportFormat::Png => {
            let encoder = PngEncoder::new(&mut out);
            #[allow(deprecated)]
            encoder
                .encode(
                    image.as_raw(),
                    image.width(),
                    image.height(),
                    image::ColorType::Rgba8,
                )
                .map_err(|e| RasterError::Encode(e.to_string()))?;
        }
        ExportFormat::Jpeg => {
            let rgb = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
            let mut encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
            encoder
                .encode(
                    rgb.as_raw(),
                    rgb.width(),
                    rgb.height(),
                    image::ColorType::Rgb8,
                )
                .map_err(|e| RasterError::Encode(e.to_string()))?;
        }
    }
    Ok(out)
}

// ============================================================================
// PROJECT FILES (.phf) — layers preserved
// ============================================================================

const PROJECT_MAGIC_V1: &str = "PHF1";

/// Error type for project file operations.
#[derive(Debug)]
pub enum ProjectError {
    Io(std::io::Error),
    Serialize(String),
    InvalidFormat(String),
}

impl std::fmt::Display for ProjectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProjectError::Io(e) => write!(f, "I/O error: {}", e),
            ProjectError::Serialize(e) => write!(f, "Serialization error: {}", e),
            ProjectError::InvalidFormat(e) => write!(f, "Invalid format: {}", e),
        }
    }
}

impl From<std::io::Error> for ProjectError {
    fn from(e: std::io::Error) -> Self {
        ProjectError::Io(e)
    }
}

impl From<Box<bincode::ErrorKind>> for ProjectError {
    fn from(e: Box<bincode::ErrorKind>) -> Self {
        ProjectError::Serialize(e.to_string())
    }
}

/// V1 project container.  History is intentionally not persisted; a loaded
/// project starts a fresh history at its first snapshot.
#[derive(Serialize, Deserialize)]
struct ProjectFileV1 {
    magic: String,
    active_index: u32,
    layers: Vec<LayerDataV1>,
}

/// V1 serializable layer data — flat RGBA pixels.
#[derive(Serialize, Deserialize)]
struct LayerDataV1 {
    name: String,
    visible: bool,
    opacity: u8,
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

/// Save the live layer stack as a .phf project file.
pub fn save_project(stack: &LayerStack, path: &Path) -> Result<(), ProjectError> {
    let layers: Vec<LayerDataV1> = stack
        .layers()
        .iter()
        .map(|layer| {
            let (width, height) = layer.dimensions();
            LayerDataV1 {
                name: layer.name.clone(),
                visible: layer.visible,
                opacity: layer.opacity(),
                width,
                height,
                pixels: layer.image().as_raw().clone(),
            }
        })
        .collect();

    let project = ProjectFileV1 {
        magic: PROJECT_MAGIC_V1.to_string(),
        active_index: stack.active_index().unwrap_or(0) as u32,
        layers,
    };

    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    bincode::serialize_into(writer, &project)?;
    Ok(())
}

/// Load a .phf project file into a layer stack.
pub fn load_project(path: &Path) -> Result<LayerStack, ProjectError> {
    let raw = std::fs::read(path)?;
    if raw.len() < 12 {
        return Err(ProjectError::InvalidFormat("File too small".into()));
    }

    // bincode encodes a String as an 8-byte length prefix + UTF-8 data, so
    // the 4-char magic sits at bytes 8..12.
    let magic = std::str::from_utf8(&raw[8..12]).unwrap_or("");
    if magic != PROJECT_MAGIC_V1 {
        return Err(ProjectError::InvalidFormat(format!(
            "Unknown magic '{}'",
            magic
        )));
    }

    let project: ProjectFileV1 = bincode::deserialize(&raw)?;
    if project.layers.is_empty() || project.layers.len() > MAX_LAYERS {
        return Err(ProjectError::InvalidFormat(format!(
            "Unsupported layer count {}",
            project.layers.len()
        )));
    }

    let mut layers: Vec<Layer> = Vec::with_capacity(project.layers.len());
    for data in project.layers {
        if data.width == 0
            || data.height == 0
            || data.width > MAX_IMAGE_DIM
            || data.height > MAX_IMAGE_DIM
        {
            return Err(ProjectError::InvalidFormat(format!(
                "Unsupported layer dimensions {}×{}",
                data.width, data.height
            )));
        }
        let expected = data.width as usize * data.height as usize * 4;
        if data.pixels.len() != expected {
            return Err(ProjectError::InvalidFormat(format!(
                "Layer '{}' has {} pixel bytes, expected {}",
                data.name,
                data.pixels.len(),
                expected
            )));
        }
        let image = RgbaImage::from_raw(data.width, data.height, data.pixels).ok_or_else(|| {
            ProjectError::InvalidFormat(format!("Layer '{}' pixel buffer rejected", data.name))
        })?;
        let mut layer = Layer::new(data.name, image);
        layer.visible = data.visible;
        layer.set_opacity(data.opacity);
        layers.push(layer);
    }

    Ok(LayerStack::from_layers(layers, project.active_index as usize))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn solid(w: u32, h: u32, px: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba(px))
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode_image(b"definitely not an image").is_err());
    }

    #[test]
    fn png_encode_decode_round_trip() {
        let original = solid(6, 4, [12, 200, 90, 180]);
        let bytes = encode_image(&original, ExportFormat::Png, DEFAULT_JPEG_QUALITY).unwrap();
        let decoded = decode_image(&bytes).unwrap();
        assert_eq!(decoded.as_raw(), original.as_raw());
    }

    #[test]
    fn jpeg_output_is_decodable() {
        let original = solid(16, 16, [255, 128, 0, 255]);
        let bytes = encode_image(&original, ExportFormat::Jpeg, 80).unwrap();
        let decoded = decode_image(&bytes).unwrap();
        // JPEG is lossy; only shape is guaranteed
        assert_eq!(decoded.dimensions(), (16, 16));
    }

    #[test]
    fn project_round_trip_preserves_layers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.phf");

        let mut stack = LayerStack::new();
        stack.push(Layer::new("Background", solid(8, 8, [10, 20, 30, 255])));
        let top = stack.push(Layer::new("Overlay", solid(8, 8, [200, 0, 0, 128])));
        stack.set_opacity(top, 40);
        stack.set_visibility(top, false);

        save_project(&stack, &path).unwrap();
        let loaded = load_project(&path).unwrap();

        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.layers()[0].name, "Background");
        assert_eq!(loaded.layers()[1].name, "Overlay");
        assert_eq!(loaded.layers()[1].opacity(), 40);
        assert!(!loaded.layers()[1].visible);
        assert_eq!(
            loaded.layers()[0].image().as_raw(),
            stack.layers()[0].image().as_raw()
        );
        assert_eq!(loaded.active_index(), Some(1));
    }

    #[test]
    fn load_rejects_unknown_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.phf");
        // 8-byte length prefix + bogus magic
        let mut raw = vec![4u8, 0, 0, 0, 0, 0, 0, 0];
        raw.extend_from_slice(b"NOPE");
        raw.extend_from_slice(&[0u8; 16]);
        std::fs::write(&path, raw).unwrap();

        match load_project(&path) {
            Err(ProjectError::InvalidFormat(msg)) => assert!(msg.contains("NOPE")),
            other => panic!("expected InvalidFormat, got {:?}", other.err()),
        }
    }

    #[test]
    fn load_rejects_truncated_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.phf");
        std::fs::write(&path, b"tiny").unwrap();
        assert!(matches!(
            load_project(&path),
            Err(ProjectError::InvalidFormat(_))
        ));
    }

    #[test]
    fn load_rejects_mismatched_pixel_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.phf");

        let project = ProjectFileV1 {
            magic: PROJECT_MAGIC_V1.to_string(),
            active_index: 0,
            layers: vec![LayerDataV1 {
                name: "Broken".into(),
                visible: true,
                opacity: 100,
                width: 4,
                height: 4,
                pixels: vec![0u8; 7],
            }],
        };
        let file = File::create(&path).unwrap();
        bincode::serialize_into(BufWriter::new(file), &project).unwrap();

        assert!(matches!(
            load_project(&path),
            Err(ProjectError::InvalidFormat(_))
        ));
    }
}
