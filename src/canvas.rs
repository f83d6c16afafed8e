// ============================================================================
// LAYER MODEL & COMPOSITOR
// ============================================================================

use std::sync::Arc;

use image::{RgbaImage, imageops};
use rayon::prelude::*;
use uuid::Uuid;

/// Layer opacity is an integer percentage, 0–100.
pub const MAX_OPACITY: u8 = 100;

/// One named, orderable, opacity- and visibility-controlled image
/// contributing to the composite.
///
/// The pixel buffer is shared (`Arc`) so that history snapshots capture
/// layers by reference-count bump instead of copying rasters.  `image_id`
/// tags one immutable buffer: replacing the pixels always mints a fresh id,
/// which is what the render cache keys its derived resources by.
#[derive(Clone)]
pub struct Layer {
    id: Uuid,
    image: Arc<RgbaImage>,
    image_id: Uuid,
    pub name: String,
    pub visible: bool,
    opacity: u8,
}

impl Layer {
    pub fn new(name: impl Into<String>, image: RgbaImage) -> Self {
        Self {
            id: Uuid::new_v4(),
            image: Arc::new(image),
            image_id: Uuid::new_v4(),
            name: name.into(),
            visible: true,
            opacity: MAX_OPACITY,
        }
    }

    /// Stable identity of this layer within its layer set.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Identity of the current pixel buffer (changes on every image swap).
    pub fn image_id(&self) -> Uuid {
        self.image_id
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn image_arc(&self) -> Arc<RgbaImage> {
        Arc::clone(&self.image)
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn opacity(&self) -> u8 {
        self.opacity
    }

    /// Set opacity, clamped to 0–100.
    pub fn set_opacity(&mut self, opacity: u8) {
        self.opacity = opacity.min(MAX_OPACITY);
    }

    /// Swap in a new pixel buffer, minting a fresh image identity.
    pub fn replace_image(&mut self, image: RgbaImage) {
        self.image = Arc::new(image);
        self.image_id = Uuid::new_v4();
    }

    /// Approximate heap footprint of the pixel buffer.
    pub fn memory_bytes(&self) -> usize {
        let (w, h) = self.image.dimensions();
        w as usize * h as usize * 4
    }
}

// ============================================================================
// LAYER STACK — ordered layers plus active-layer tracking
// ============================================================================

/// The live layer set.  Index 0 is the bottom of the stack; the last layer
/// renders on top.
#[derive(Clone, Default)]
pub struct LayerStack {
    layers: Vec<Layer>,
    active_index: usize,
}

impl LayerStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_layers(layers: Vec<Layer>, active_index: usize) -> Self {
        let active_index = if layers.is_empty() {
            0
        } else {
            active_index.min(layers.len() - 1)
        };
        Self {
            layers,
            active_index,
        }
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer(&self, id: Uuid) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id() == id)
    }

    fn index_of(&self, id: Uuid) -> Option<usize> {
        self.layers.iter().position(|l| l.id() == id)
    }

    pub fn active_index(&self) -> Option<usize> {
        if self.layers.is_empty() {
            None
        } else {
            Some(self.active_index)
        }
    }

    pub fn active_layer(&self) -> Option<&Layer> {
        self.layers.get(self.active_index)
    }

    pub fn active_layer_mut(&mut self) -> Option<&mut Layer> {
        self.layers.get_mut(self.active_index)
    }

    /// Append a layer on top of the stack and make it active.
    pub fn push(&mut self, layer: Layer) -> Uuid {
        let id = layer.id();
        self.layers.push(layer);
        self.active_index = self.layers.len() - 1;
        id
    }

    /// Make the given layer active.  Returns false for unknown ids.
    pub fn select(&mut self, id: Uuid) -> bool {
        match self.index_of(id) {
            Some(idx) => {
                self.active_index = idx;
                true
            }
            None => false,
        }
    }

    /// Remove a layer.  The topmost remaining layer becomes active.
    pub fn remove(&mut self, id: Uuid) -> Option<Layer> {
        let idx = self.index_of(id)?;
        let layer = self.layers.remove(idx);
        if !self.layers.is_empty() {
            self.active_index = self.layers.len() - 1;
        } else {
            self.active_index = 0;
        }
        Some(layer)
    }

    /// Rearrange the stack to match `order` (bottom first).  Rejected — with
    /// the stack untouched — unless `order` is exactly a permutation of the
    /// current layer ids.  The active layer keeps its identity across the
    /// move.
    pub fn reorder(&mut self, order: &[Uuid]) -> bool {
        if order.len() != self.layers.len() {
            return false;
        }
        let mut indices: Vec<usize> = Vec::with_capacity(order.len());
        for &id in order {
            match self.index_of(id) {
                Some(idx) if !indices.contains(&idx) => indices.push(idx),
                _ => return false, // unknown or duplicated id
            }
        }
        let active_id = self.active_layer().map(Layer::id);
        // Layer clones are cheap (Arc bump + metadata)
        self.layers = indices.iter().map(|&i| self.layers[i].clone()).collect();
        if let Some(id) = active_id
            && let Some(idx) = self.index_of(id)
        {
            self.active_index = idx;
        }
        true
    }

    /// Live (non-committing) opacity change.  Returns false for unknown ids.
    pub fn set_opacity(&mut self, id: Uuid, opacity: u8) -> bool {
        match self.index_of(id) {
            Some(idx) => {
                self.layers[idx].set_opacity(opacity);
                true
            }
            None => false,
        }
    }

    pub fn set_visibility(&mut self, id: Uuid, visible: bool) -> bool {
        match self.index_of(id) {
            Some(idx) => {
                self.layers[idx].visible = visible;
                true
            }
            None => false,
        }
    }

    /// Drop everything, including the active-layer reference.
    pub fn clear(&mut self) {
        self.layers.clear();
        self.active_index = 0;
    }

    /// Approximate heap footprint of all layer pixel buffers.
    pub fn memory_bytes(&self) -> usize {
        self.layers.iter().map(Layer::memory_bytes).sum()
    }

    pub fn flatten(&self) -> Option<RgbaImage> {
        flatten(&self.layers)
    }
}

// ============================================================================
// COMPOSITOR
// ============================================================================

/// Flatten visible layers, bottom-to-top, into one raster.
///
/// Returns `None` when nothing is visible.  Canvas dimensions are fixed to
/// the first visible layer; layers with a different native size are
/// stretched (Triangle filter) to match.  Each layer's pixel alpha is scaled
/// by `opacity / 100` and blended source-over.  Invisible layers are skipped
/// outright.  The output is byte-for-byte deterministic for a given layer
/// set; rows are independent, so rayon parallelism cannot reorder writes.
pub fn flatten(layers: &[Layer]) -> Option<RgbaImage> {
    let first_visible = layers.iter().find(|l| l.visible)?;
    let (width, height) = first_visible.dimensions();
    if width == 0 || height == 0 {
        return None;
    }

    // Pre-scale mismatched layers so the blend loop reads uniform rows.
    let prepared: Vec<(Arc<RgbaImage>, f32)> = layers
        .iter()
        .filter(|l| l.visible)
        .map(|l| {
            let img = if l.dimensions() == (width, height) {
                l.image_arc()
            } else {
                Arc::new(imageops::resize(
                    l.image(),
                    width,
                    height,
                    imageops::FilterType::Triangle,
                ))
            };
            (img, f32::from(l.opacity()) / f32::from(MAX_OPACITY))
        })
        .collect();

    let mut out = RgbaImage::new(width, height);
    let stride = width as usize * 4;
    out.as_mut()
        .par_chunks_mut(stride)
        .enumerate()
        .for_each(|(y, row)| {
            for (img, opacity) in &prepared {
                let src_row = &img.as_raw()[y * stride..(y + 1) * stride];
                for x in 0..width as usize {
                    let o = x * 4;
                    blend_over(&mut row[o..o + 4], &src_row[o..o + 4], *opacity);
                }
            }
        });

    Some(out)
}

/// Straight-alpha source-over blend of one pixel, with the source alpha
/// scaled by `opacity` (0.0–1.0).
#[inline]
fn blend_over(dst: &mut [u8], src: &[u8], opacity: f32) {
    let sa = (src[3] as f32 / 255.0) * opacity;
    if sa <= 0.0 {
        return;
    }
    let da = dst[3] as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    if out_a <= 0.0 {
        return;
    }
    for c in 0..3 {
        let blended = (src[c] as f32 * sa + dst[c] as f32 * da * (1.0 - sa)) / out_a;
        dst[c] = blended.round().clamp(0.0, 255.0) as u8;
    }
    dst[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
}
