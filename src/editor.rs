// ============================================================================
// EDITOR SESSION — document state + edit dispatcher
// ============================================================================
//
// One session owns the live layer stack, the snapshot history, the render
// cache, and the transient inputs of the edit panel (prompts, hotspot,
// reference image, scale).  Generative edits run through a two-phase
// dispatch: `begin_*` validates preconditions and flips the busy gate,
// `complete_edit` lands the backend's outcome.  The `apply_*` helpers do
// both around a blocking service call.

use std::path::Path;
use std::sync::Arc;

use image::RgbaImage;
use uuid::Uuid;

use crate::canvas::{Layer, LayerStack};
use crate::history::{HistoryManager, Snapshot};
use crate::io::{self, ExportFormat};
use crate::ops::crop::{self, CropSelection};
use crate::ops::{EditError, EditOp, EditTicket, OpPhase, TicketInput};
use crate::render_cache::RenderCache;
use crate::service::{Hotspot, TransformError, TransformOptions, TransformService};
use crate::settings::Preferences;

pub struct EditorSession {
    stack: LayerStack,
    history: HistoryManager,
    render_cache: RenderCache,
    prefs: Preferences,
    phase: OpPhase,

    // Transient edit-panel inputs.  All of these are cleared on every
    // history commit; the hotspot additionally clears when the active
    // layer changes.
    retouch_prompt: String,
    filter_prompt: String,
    adjust_prompt: String,
    auxiliary_prompt: String,
    hotspot: Option<Hotspot>,
    reference_image: Option<Arc<RgbaImage>>,
    scale_percent: u32,
}

impl Default for EditorSession {
    fn default() -> Self {
        Self::with_preferences(Preferences::default())
    }
}

impl EditorSession {
    /// New session with preferences loaded from disk.
    pub fn new() -> Self {
        Self::with_preferences(Preferences::load())
    }

    /// New session with explicit preferences (hosts and tests).
    pub fn with_preferences(prefs: Preferences) -> Self {
        Self {
            stack: LayerStack::new(),
            history: HistoryManager::default(),
            render_cache: RenderCache::new(),
            prefs,
            phase: OpPhase::Idle,
            retouch_prompt: String::new(),
            filter_prompt: String::new(),
            adjust_prompt: String::new(),
            auxiliary_prompt: String::new(),
            hotspot: None,
            reference_image: None,
            scale_percent: 100,
        }
    }

    // ---- document lifecycle -------------------------------------------------

    /// Replace the document with a single layer holding `image`, and start a
    /// fresh history at that state.
    pub fn open_image(&mut self, image: RgbaImage) -> Result<Uuid, EditError> {
        self.ensure_idle()?;
        self.reset_document();
        let id = self.stack.push(Layer::new("Background", image));
        self.commit_current();
        crate::log_info!("Opened image as new document");
        Ok(id)
    }

    /// Decode `bytes` and open them as a new document.
    pub fn open_image_bytes(&mut self, bytes: &[u8]) -> Result<Uuid, EditError> {
        self.ensure_idle()?;
        let image = io::decode_image(bytes).map_err(|e| EditError::Resource(e.to_string()))?;
        self.open_image(image)
    }

    /// Load a .phf project as the new document.
    pub fn open_project(&mut self, path: &Path) -> Result<(), EditError> {
        self.ensure_idle()?;
        let stack = io::load_project(path).map_err(|e| EditError::Resource(e.to_string()))?;
        self.reset_document();
        self.stack = stack;
        self.commit_current();
        crate::log_info!("Opened project {:?}", path);
        Ok(())
    }

    /// Save the live layer stack as a .phf project.
    pub fn save_project(&self, path: &Path) -> Result<(), EditError> {
        if self.stack.is_empty() {
            return Err(EditError::NoActiveLayer);
        }
        io::save_project(&self.stack, path).map_err(|e| EditError::Resource(e.to_string()))
    }

    fn reset_document(&mut self) {
        self.history.clear(&mut self.render_cache);
        self.render_cache.clear();
        self.stack.clear();
        self.clear_transients();
    }

    // ---- layer store --------------------------------------------------------

    /// Add a layer on top of the stack and commit.  The first layer of a
    /// document is named "Background"; later ones "Layer N" unless a name
    /// is given.
    pub fn add_layer(&mut self, image: RgbaImage, name: Option<String>) -> Result<Uuid, EditError> {
        self.ensure_idle()?;
        let name = name.unwrap_or_else(|| {
            if self.stack.is_empty() {
                "Background".to_string()
            } else {
                format!("Layer {}", self.stack.len() + 1)
            }
        });
        let id = self.stack.push(Layer::new(name, image));
        self.commit_current();
        Ok(id)
    }

    /// Remove a layer and commit.  Removing the last remaining layer resets
    /// the whole document — layer set, history, and active-layer reference
    /// all become empty.
    pub fn remove_layer(&mut self, id: Uuid) -> Result<(), EditError> {
        self.ensure_idle()?;
        if self.stack.layer(id).is_none() {
            return Err(EditError::UnknownLayer);
        }
        if self.stack.len() == 1 {
            self.reset_document();
            crate::log_info!("Last layer removed — document reset");
            return Ok(());
        }
        self.stack.remove(id);
        self.commit_current();
        Ok(())
    }

    /// Rearrange the stack (bottom first) and commit.
    pub fn reorder_layers(&mut self, order: &[Uuid]) -> Result<(), EditError> {
        self.ensure_idle()?;
        if !self.stack.reorder(order) {
            return Err(EditError::InvalidLayerOrder);
        }
        self.commit_current();
        Ok(())
    }

    /// Live opacity change (slider drag).  Does NOT commit — call
    /// [`commit_opacity`](Self::commit_opacity) on release so scrubbing
    /// doesn't flood the undo stack.
    pub fn set_layer_opacity(&mut self, id: Uuid, opacity: u8) -> Result<(), EditError> {
        self.ensure_idle()?;
        if !self.stack.set_opacity(id, opacity) {
            return Err(EditError::UnknownLayer);
        }
        Ok(())
    }

    /// Commit the current state after an opacity drag ends.
    pub fn commit_opacity(&mut self) -> Result<(), EditError> {
        self.ensure_idle()?;
        if self.stack.is_empty() {
            return Err(EditError::NoActiveLayer);
        }
        self.commit_current();
        Ok(())
    }

    /// Toggle layer visibility and commit.
    pub fn set_layer_visibility(&mut self, id: Uuid, visible: bool) -> Result<(), EditError> {
        self.ensure_idle()?;
        if !self.stack.set_visibility(id, visible) {
            return Err(EditError::UnknownLayer);
        }
        self.commit_current();
        Ok(())
    }

    /// Change the active layer.  The hotspot is tied to the previous active
    /// layer's pixels, so it is cleared.
    pub fn select_layer(&mut self, id: Uuid) -> Result<(), EditError> {
        self.ensure_idle()?;
        if !self.stack.select(id) {
            return Err(EditError::UnknownLayer);
        }
        self.hotspot = None;
        Ok(())
    }

    // ---- history ------------------------------------------------------------

    /// Step back one snapshot.  Returns false when already at the oldest.
    pub fn undo(&mut self) -> Result<bool, EditError> {
        self.ensure_idle()?;
        match self.history.undo() {
            Some(snapshot) => {
                self.stack = snapshot.restore();
                self.clear_transients();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Step forward one snapshot.  Returns false when already at the newest.
    pub fn redo(&mut self) -> Result<bool, EditError> {
        self.ensure_idle()?;
        match self.history.redo() {
            Some(snapshot) => {
                self.stack = snapshot.restore();
                self.clear_transients();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn history_cursor(&self) -> Option<usize> {
        self.history.cursor()
    }

    // ---- transient inputs ---------------------------------------------------
    //
    // Setters are no-ops while a transform is in flight, mirroring disabled
    // edit controls.

    pub fn set_retouch_prompt(&mut self, text: impl Into<String>) {
        if !self.phase.is_busy() {
            self.retouch_prompt = text.into();
        }
    }

    pub fn set_filter_prompt(&mut self, text: impl Into<String>) {
        if !self.phase.is_busy() {
            self.filter_prompt = text.into();
        }
    }

    pub fn set_adjust_prompt(&mut self, text: impl Into<String>) {
        if !self.phase.is_busy() {
            self.adjust_prompt = text.into();
        }
    }

    pub fn set_auxiliary_prompt(&mut self, text: impl Into<String>) {
        if !self.phase.is_busy() {
            self.auxiliary_prompt = text.into();
        }
    }

    pub fn set_hotspot(&mut self, hotspot: Option<Hotspot>) {
        if !self.phase.is_busy() {
            self.hotspot = hotspot;
        }
    }

    pub fn set_reference_image(&mut self, image: Option<RgbaImage>) {
        if !self.phase.is_busy() {
            self.reference_image = image.map(Arc::new);
        }
    }

    pub fn set_scale_percent(&mut self, percent: u32) {
        if !self.phase.is_busy() {
            self.scale_percent = percent.max(1);
        }
    }

    pub fn hotspot(&self) -> Option<Hotspot> {
        self.hotspot
    }

    pub fn scale_percent(&self) -> u32 {
        self.scale_percent
    }

    pub fn retouch_prompt(&self) -> &str {
        &self.retouch_prompt
    }

    /// Toggle the transparency preference; written back to disk immediately.
    pub fn set_prefer_transparent(&mut self, value: bool) {
        if self.phase.is_busy() || self.prefs.prefer_transparent == value {
            return;
        }
        self.prefs.prefer_transparent = value;
        self.prefs.save();
    }

    pub fn preferences(&self) -> Preferences {
        self.prefs
    }

    // ---- generative edits ---------------------------------------------------

    pub fn begin_retouch(&mut self) -> Result<EditTicket, EditError> {
        self.ensure_idle()?;
        let layer = self.stack.active_layer().ok_or(EditError::NoActiveLayer)?;
        let instruction = self.retouch_prompt.trim();
        if instruction.is_empty() {
            return Err(EditError::EmptyInstruction(EditOp::Retouch));
        }
        let hotspot = self.hotspot.ok_or(EditError::MissingHotspot)?;
        let ticket = EditTicket {
            op: EditOp::Retouch,
            input: TicketInput::Hotspot {
                image: layer.image_arc(),
                instruction: instruction.to_string(),
                hotspot,
                scale_percent: self.scale_percent,
            },
            options: self.transform_options(),
        };
        self.phase = OpPhase::Dispatched(EditOp::Retouch);
        Ok(ticket)
    }

    pub fn begin_filter(&mut self) -> Result<EditTicket, EditError> {
        self.ensure_idle()?;
        let layer = self.stack.active_layer().ok_or(EditError::NoActiveLayer)?;
        let style = self.filter_prompt.trim();
        if style.is_empty() {
            return Err(EditError::EmptyInstruction(EditOp::Filter));
        }
        let ticket = EditTicket {
            op: EditOp::Filter,
            input: TicketInput::Filter {
                image: layer.image_arc(),
                style: style.to_string(),
            },
            options: self.transform_options(),
        };
        self.phase = OpPhase::Dispatched(EditOp::Filter);
        Ok(ticket)
    }

    pub fn begin_adjustment(&mut self) -> Result<EditTicket, EditError> {
        self.ensure_idle()?;
        let layer = self.stack.active_layer().ok_or(EditError::NoActiveLayer)?;
        let instruction = self.adjust_prompt.trim();
        if instruction.is_empty() {
            return Err(EditError::EmptyInstruction(EditOp::Adjust));
        }
        let ticket = EditTicket {
            op: EditOp::Adjust,
            input: TicketInput::Adjust {
                image: layer.image_arc(),
                instruction: instruction.to_string(),
                reference: self.reference_image.clone(),
            },
            options: self.transform_options(),
        };
        self.phase = OpPhase::Dispatched(EditOp::Adjust);
        Ok(ticket)
    }

    pub fn begin_face_swap(&mut self) -> Result<EditTicket, EditError> {
        self.ensure_idle()?;
        let layer = self.stack.active_layer().ok_or(EditError::NoActiveLayer)?;
        let target_face = self
            .reference_image
            .clone()
            .ok_or(EditError::MissingReferenceImage)?;
        let ticket = EditTicket {
            op: EditOp::FaceSwap,
            input: TicketInput::FaceSwap {
                source: layer.image_arc(),
                target_face,
            },
            options: self.transform_options(),
        };
        self.phase = OpPhase::Dispatched(EditOp::FaceSwap);
        Ok(ticket)
    }

    pub fn begin_remove_background(&mut self) -> Result<EditTicket, EditError> {
        self.ensure_idle()?;
        let layer = self.stack.active_layer().ok_or(EditError::NoActiveLayer)?;
        let ticket = EditTicket {
            op: EditOp::RemoveBackground,
            input: TicketInput::RemoveBackground {
                image: layer.image_arc(),
            },
            options: self.transform_options(),
        };
        self.phase = OpPhase::Dispatched(EditOp::RemoveBackground);
        Ok(ticket)
    }

    /// Land the outcome of an in-flight edit.
    ///
    /// On success the result image replaces the active layer's pixels and a
    /// snapshot is committed; on failure the document is untouched and the
    /// error is surfaced with the operation's name.  Either way the busy
    /// gate reopens.
    pub fn complete_edit(
        &mut self,
        ticket: EditTicket,
        result: Result<RgbaImage, TransformError>,
    ) -> Result<(), EditError> {
        match self.phase {
            OpPhase::Dispatched(op) if op == ticket.op() => {}
            _ => {
                return Err(EditError::Resource(
                    "No matching operation in flight".into(),
                ));
            }
        }
        self.phase = OpPhase::Idle;

        match result {
            Ok(image) => {
                if image.width() == 0 || image.height() == 0 {
                    let err = EditError::Transform {
                        op: ticket.op(),
                        message: "backend returned an empty image".into(),
                    };
                    crate::log_err!("{}", err);
                    return Err(err);
                }
                let Some(layer) = self.stack.active_layer_mut() else {
                    return Err(EditError::Resource(
                        "Active layer disappeared mid-edit".into(),
                    ));
                };
                layer.replace_image(image);
                self.commit_current();
                crate::log_info!("{} committed", ticket.op().label());
                Ok(())
            }
            Err(e) => {
                let err = EditError::Transform {
                    op: ticket.op(),
                    message: e.to_string(),
                };
                crate::log_err!("{}", err);
                Err(err)
            }
        }
    }

    // Blocking convenience wrappers: begin, call the service, complete.

    pub fn apply_retouch(&mut self, service: &dyn TransformService) -> Result<(), EditError> {
        let ticket = self.begin_retouch()?;
        let result = ticket.invoke(service);
        self.complete_edit(ticket, result)
    }

    pub fn apply_filter(&mut self, service: &dyn TransformService) -> Result<(), EditError> {
        let ticket = self.begin_filter()?;
        let result = ticket.invoke(service);
        self.complete_edit(ticket, result)
    }

    pub fn apply_adjustment(&mut self, service: &dyn TransformService) -> Result<(), EditError> {
        let ticket = self.begin_adjustment()?;
        let result = ticket.invoke(service);
        self.complete_edit(ticket, result)
    }

    pub fn apply_face_swap(&mut self, service: &dyn TransformService) -> Result<(), EditError> {
        let ticket = self.begin_face_swap()?;
        let result = ticket.invoke(service);
        self.complete_edit(ticket, result)
    }

    pub fn apply_remove_background(
        &mut self,
        service: &dyn TransformService,
    ) -> Result<(), EditError> {
        let ticket = self.begin_remove_background()?;
        let result = ticket.invoke(service);
        self.complete_edit(ticket, result)
    }

    /// Crop the flattened composite to `selection` and replace the whole
    /// document with the result as a single "Cropped Image" layer.  Local —
    /// no backend involved.
    pub fn apply_crop(&mut self, selection: CropSelection) -> Result<(), EditError> {
        self.ensure_idle()?;
        let composite = self.stack.flatten().ok_or(EditError::NoActiveLayer)?;
        let (native_w, native_h) = composite.dimensions();
        let (x, y, w, h) =
            crop::native_region(&selection, native_w, native_h).ok_or(EditError::EmptySelection)?;
        let cropped = crop::crop_image(&composite, x, y, w, h);
        self.stack.clear();
        self.stack.push(Layer::new("Cropped Image", cropped));
        self.commit_current();
        crate::log_info!("Crop committed ({}×{})", w, h);
        Ok(())
    }

    // ---- output -------------------------------------------------------------

    pub fn layers(&self) -> &[Layer] {
        self.stack.layers()
    }

    pub fn active_layer(&self) -> Option<&Layer> {
        self.stack.active_layer()
    }

    pub fn layer_stack(&self) -> &LayerStack {
        &self.stack
    }

    /// Flatten the current document (see [`crate::canvas::flatten`]).
    pub fn flatten(&self) -> Option<RgbaImage> {
        self.stack.flatten()
    }

    /// Encode the flattened composite for download.
    pub fn export_composite(
        &self,
        format: ExportFormat,
        quality: u8,
    ) -> Result<Vec<u8>, EditError> {
        let composite = self.stack.flatten().ok_or(EditError::NoActiveLayer)?;
        io::encode_image(&composite, format, quality).map_err(|e| EditError::Resource(e.to_string()))
    }

    /// Downscaled preview raster for a layer (thumbnails, zoomed-out views).
    pub fn layer_preview(&mut self, id: Uuid) -> Option<Arc<RgbaImage>> {
        let (image_id, image) = {
            let layer = self.stack.layer(id)?;
            (layer.image_id(), layer.image_arc())
        };
        Some(self.render_cache.preview(image_id, &image))
    }

    pub fn is_busy(&self) -> bool {
        self.phase.is_busy()
    }

    // ---- internals ----------------------------------------------------------

    fn ensure_idle(&self) -> Result<(), EditError> {
        if self.phase.is_busy() {
            Err(EditError::Busy)
        } else {
            Ok(())
        }
    }

    fn transform_options(&self) -> TransformOptions {
        let auxiliary = self.auxiliary_prompt.trim();
        TransformOptions {
            auxiliary: if auxiliary.is_empty() {
                None
            } else {
                Some(auxiliary.to_string())
            },
            transparent_background: self.prefs.prefer_transparent,
        }
    }

    /// Record the live stack as the new current snapshot and reset the edit
    /// panel's transient inputs.
    fn commit_current(&mut self) {
        let snapshot = Snapshot::capture(&self.stack);
        self.history.commit(snapshot, &mut self.render_cache);
        self.clear_transients();
    }

    fn clear_transients(&mut self) {
        self.retouch_prompt.clear();
        self.filter_prompt.clear();
        self.adjust_prompt.clear();
        self.auxiliary_prompt.clear();
        self.hotspot = None;
        self.reference_image = None;
        self.scale_percent = 100;
    }
}
