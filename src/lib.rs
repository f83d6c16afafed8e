//! PhotoFE — editing core for an AI-assisted photo editor.
//!
//! The crate owns the layered document model, the snapshot undo history,
//! the compositor, and the per-operation edit dispatch; the actual
//! generative transformations (retouch, filter, adjust, face swap,
//! background removal) are delegated to whatever backend implements
//! [`service::TransformService`].  There is no UI in here: a host binds
//! controls to an [`editor::EditorSession`] and renders its layers and
//! previews however it likes.

pub mod canvas;
pub mod editor;
pub mod history;
pub mod io;
pub mod logger;
pub mod ops;
pub mod render_cache;
pub mod service;
pub mod settings;

pub use canvas::{Layer, LayerStack, flatten};
pub use editor::EditorSession;
pub use history::{HistoryManager, Snapshot};
pub use io::{ExportFormat, load_project, save_project};
pub use ops::crop::{CropRect, CropSelection};
pub use ops::{EditError, EditOp, EditTicket};
pub use service::{Hotspot, TransformError, TransformOptions, TransformService};
pub use settings::Preferences;
