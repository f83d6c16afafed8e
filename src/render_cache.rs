// ============================================================================
// RENDER CACHE — refcounted derived-display resources, keyed by image identity
// ============================================================================
//
// Every pixel buffer in the document carries an immutable image identity
// (see `Layer::image_id`).  Derived display resources — downscaled preview
// rasters for thumbnails and zoomed-out rendering — live here, and their
// lifetime is explicit: each history snapshot that references an image
// retains its identity once, and releases it when the snapshot is discarded.
// An entry is dropped the moment its retain count reaches zero.  The live
// layer set never needs its own retain: it always mirrors the snapshot at
// the history cursor, which is itself retained.

use std::collections::HashMap;
use std::sync::Arc;

use image::{RgbaImage, imageops};
use uuid::Uuid;

/// Maximum longest-edge dimension for cached preview rasters.
const PREVIEW_MAX_EDGE: u32 = 1024;

struct Entry {
    refs: usize,
    preview: Option<Arc<RgbaImage>>,
}

/// Reference-counted arena of derived preview images.
pub struct RenderCache {
    entries: HashMap<Uuid, Entry>,
    max_edge: u32,
}

impl Default for RenderCache {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderCache {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            max_edge: PREVIEW_MAX_EDGE,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_max_edge(max_edge: u32) -> Self {
        Self {
            entries: HashMap::new(),
            max_edge: max_edge.max(1),
        }
    }

    /// Bump the retain count for an image identity, creating the entry on
    /// first retain.  The preview itself is built lazily on first use.
    pub fn retain(&mut self, image_id: Uuid) {
        self.entries
            .entry(image_id)
            .or_insert(Entry {
                refs: 0,
                preview: None,
            })
            .refs += 1;
    }

    /// Drop one retain.  The entry (and its preview) is freed at zero.
    /// Releasing an id that was never retained is logged and ignored; a
    /// missed pairing leaks one bounded preview, never a dangling handle.
    pub fn release(&mut self, image_id: Uuid) {
        match self.entries.get_mut(&image_id) {
            Some(entry) => {
                entry.refs -= 1;
                if entry.refs == 0 {
                    self.entries.remove(&image_id);
                }
            }
            None => {
                crate::log_warn!("render cache: release of unknown image {}", image_id);
            }
        }
    }

    /// Current retain count for an image identity (0 if absent).
    pub fn retained(&self, image_id: Uuid) -> usize {
        self.entries.get(&image_id).map_or(0, |e| e.refs)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Preview raster for an image, at most `PREVIEW_MAX_EDGE` on its longest
    /// side.  Cached in the entry for retained ids; computed one-off (and not
    /// cached) for unretained ids so transient callers cannot pin memory.
    pub fn preview(&mut self, image_id: Uuid, source: &RgbaImage) -> Arc<RgbaImage> {
        let max_edge = self.max_edge;
        match self.entries.get_mut(&image_id) {
            Some(entry) => {
                if let Some(ref cached) = entry.preview {
                    return Arc::clone(cached);
                }
                let built = Arc::new(build_preview(source, max_edge));
                entry.preview = Some(Arc::clone(&built));
                built
            }
            None => Arc::new(build_preview(source, max_edge)),
        }
    }

    /// Drop every entry regardless of retain counts.  Used when the whole
    /// document is torn down.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

fn build_preview(source: &RgbaImage, max_edge: u32) -> RgbaImage {
    let (w, h) = source.dimensions();
    let longest = w.max(h);
    if longest <= max_edge {
        return source.clone();
    }
    let scale = max_edge as f32 / longest as f32;
    let nw = ((w as f32 * scale).round() as u32).max(1);
    let nh = ((h as f32 * scale).round() as u32).max(1);
    imageops::resize(source, nw, nh, imageops::FilterType::Triangle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn img(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba([7, 7, 7, 255]))
    }

    #[test]
    fn retain_release_frees_at_zero() {
        let mut cache = RenderCache::new();
        let id = Uuid::new_v4();

        cache.retain(id);
        cache.retain(id);
        assert_eq!(cache.retained(id), 2);

        cache.release(id);
        assert_eq!(cache.retained(id), 1);
        assert_eq!(cache.len(), 1);

        cache.release(id);
        assert_eq!(cache.retained(id), 0);
        assert!(cache.is_empty());
    }

    #[test]
    fn preview_is_cached_only_for_retained_ids() {
        let mut cache = RenderCache::with_max_edge(8);
        let retained = Uuid::new_v4();
        let transient = Uuid::new_v4();
        cache.retain(retained);

        let a = cache.preview(retained, &img(32, 16));
        let b = cache.preview(retained, &img(32, 16));
        assert!(Arc::ptr_eq(&a, &b));

        let c = cache.preview(transient, &img(32, 16));
        let d = cache.preview(transient, &img(32, 16));
        assert!(!Arc::ptr_eq(&c, &d));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn preview_downscales_to_max_edge() {
        let mut cache = RenderCache::with_max_edge(8);
        let id = Uuid::new_v4();
        cache.retain(id);

        let preview = cache.preview(id, &img(32, 16));
        assert_eq!(preview.dimensions(), (8, 4));

        // Small images pass through at native size
        let small = cache.preview(Uuid::new_v4(), &img(4, 4));
        assert_eq!(small.dimensions(), (4, 4));
    }

    #[test]
    fn release_of_unknown_id_is_ignored() {
        let mut cache = RenderCache::new();
        cache.release(Uuid::new_v4());
        assert!(cache.is_empty());
    }
}
