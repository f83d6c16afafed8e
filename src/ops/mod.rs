// ============================================================================
// EDIT OPERATIONS — kinds, dispatch phases, tickets, errors
// ============================================================================

pub mod crop;

use std::sync::Arc;

use image::RgbaImage;

use crate::service::{Hotspot, TransformError, TransformOptions, TransformService};

/// The editing operations the dispatcher knows about.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EditOp {
    Retouch,
    Filter,
    Adjust,
    FaceSwap,
    RemoveBackground,
    Crop,
}

impl EditOp {
    pub fn label(&self) -> &'static str {
        match self {
            EditOp::Retouch => "Retouch",
            EditOp::Filter => "Filter",
            EditOp::Adjust => "Adjustment",
            EditOp::FaceSwap => "Face swap",
            EditOp::RemoveBackground => "Background removal",
            EditOp::Crop => "Crop",
        }
    }
}

/// Dispatch phase of the editor session.  At most one generative operation
/// is in flight at a time; while one is, every mutating entry point is
/// rejected with [`EditError::Busy`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum OpPhase {
    #[default]
    Idle,
    Dispatched(EditOp),
}

impl OpPhase {
    pub fn is_busy(&self) -> bool {
        matches!(self, OpPhase::Dispatched(_))
    }
}

// ============================================================================
// ERRORS
// ============================================================================

/// Everything that can go wrong inside the edit dispatcher.
///
/// Validation variants are produced before any external call and leave all
/// state untouched; `Transform` and `Resource` wrap downstream failures with
/// the pre-operation image intact.  Every variant renders as a user-facing
/// message.
#[derive(Debug)]
pub enum EditError {
    NoActiveLayer,
    EmptyInstruction(EditOp),
    MissingHotspot,
    MissingReferenceImage,
    EmptySelection,
    UnknownLayer,
    InvalidLayerOrder,
    Busy,
    /// The external transform collaborator failed.
    Transform { op: EditOp, message: String },
    /// Decode/encode or other local resource failure.
    Resource(String),
}

impl std::fmt::Display for EditError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EditError::NoActiveLayer => write!(f, "No image loaded — upload an image first"),
            EditError::EmptyInstruction(op) => {
                write!(f, "{} requires an instruction describing the edit", op.label())
            }
            EditError::MissingHotspot => {
                write!(f, "Select a point on the image to retouch first")
            }
            EditError::MissingReferenceImage => {
                write!(f, "Face swap requires a reference image")
            }
            EditError::EmptySelection => write!(f, "Crop selection has no area"),
            EditError::UnknownLayer => write!(f, "No such layer"),
            EditError::InvalidLayerOrder => {
                write!(f, "Layer order must list every existing layer exactly once")
            }
            EditError::Busy => write!(f, "Another operation is still running"),
            EditError::Transform { op, message } => {
                write!(f, "{} failed: {}", op.label(), message)
            }
            EditError::Resource(msg) => write!(f, "{}", msg),
        }
    }
}

impl EditError {
    /// True for precondition failures rejected before any external call.
    pub fn is_validation(&self) -> bool {
        !matches!(
            self,
            EditError::Transform { .. } | EditError::Resource(_) | EditError::Busy
        )
    }
}

// ============================================================================
// EDIT TICKETS
// ============================================================================

/// A validated, in-flight generative edit.
///
/// `begin_*` on the editor session validates preconditions, flips the busy
/// gate, and hands out a ticket carrying everything the transform backend
/// needs.  The caller invokes the backend (directly or on whatever executor
/// it likes) and feeds the outcome back through `complete_edit`.
pub struct EditTicket {
    pub(crate) op: EditOp,
    pub(crate) input: TicketInput,
    pub(crate) options: TransformOptions,
}

pub(crate) enum TicketInput {
    Hotspot {
        image: Arc<RgbaImage>,
        instruction: String,
        hotspot: Hotspot,
        scale_percent: u32,
    },
    Filter {
        image: Arc<RgbaImage>,
        style: String,
    },
    Adjust {
        image: Arc<RgbaImage>,
        instruction: String,
        reference: Option<Arc<RgbaImage>>,
    },
    FaceSwap {
        source: Arc<RgbaImage>,
        target_face: Arc<RgbaImage>,
    },
    RemoveBackground {
        image: Arc<RgbaImage>,
    },
}

impl EditTicket {
    pub fn op(&self) -> EditOp {
        self.op
    }

    /// Run the backing transform for this ticket.
    pub fn invoke(&self, service: &dyn TransformService) -> Result<RgbaImage, TransformError> {
        match &self.input {
            TicketInput::Hotspot {
                image,
                instruction,
                hotspot,
                scale_percent,
            } => service.edit_by_hotspot(image, instruction, *hotspot, *scale_percent, &self.options),
            TicketInput::Filter { image, style } => service.filter(image, style, &self.options),
            TicketInput::Adjust {
                image,
                instruction,
                reference,
            } => service.adjust(image, instruction, reference.as_deref(), &self.options),
            TicketInput::FaceSwap { source, target_face } => {
                service.face_swap(source, target_face, &self.options)
            }
            TicketInput::RemoveBackground { image } => {
                service.remove_background(image, &self.options)
            }
        }
    }
}
