// End-to-end editing flows against a stub transform backend.

use std::cell::Cell;

use image::{Rgba, RgbaImage};
use photofe::{
    CropRect, CropSelection, EditError, EditorSession, Hotspot, TransformError, TransformOptions,
    TransformService,
};

fn solid(w: u32, h: u32, px: [u8; 4]) -> RgbaImage {
    RgbaImage::from_pixel(w, h, Rgba(px))
}

/// Stub backend: counts calls, records the last hotspot, and either fails
/// with a fixed message or returns a solid image of the input's size.
struct StubTransform {
    output: [u8; 4],
    fail: Option<String>,
    calls: Cell<usize>,
    last_hotspot: Cell<Option<(u32, u32)>>,
}

impl StubTransform {
    fn returning(output: [u8; 4]) -> Self {
        Self {
            output,
            fail: None,
            calls: Cell::new(0),
            last_hotspot: Cell::new(None),
        }
    }

    fn failing(message: &str) -> Self {
        Self {
            output: [0; 4],
            fail: Some(message.to_string()),
            calls: Cell::new(0),
            last_hotspot: Cell::new(None),
        }
    }

    fn respond(&self, input: &RgbaImage) -> Result<RgbaImage, TransformError> {
        self.calls.set(self.calls.get() + 1);
        match &self.fail {
            Some(msg) => Err(TransformError::Service(msg.clone())),
            None => Ok(solid(input.width(), input.height(), self.output)),
        }
    }
}

impl TransformService for StubTransform {
    fn edit_by_hotspot(
        &self,
        image: &RgbaImage,
        _instruction: &str,
        hotspot: Hotspot,
        _scale_percent: u32,
        _options: &TransformOptions,
    ) -> Result<RgbaImage, TransformError> {
        self.last_hotspot.set(Some((hotspot.x, hotspot.y)));
        self.respond(image)
    }

    fn filter(
        &self,
        image: &RgbaImage,
        _style: &str,
        _options: &TransformOptions,
    ) -> Result<RgbaImage, TransformError> {
        self.respond(image)
    }

    fn adjust(
        &self,
        image: &RgbaImage,
        _instruction: &str,
        _reference: Option<&RgbaImage>,
        _options: &TransformOptions,
    ) -> Result<RgbaImage, TransformError> {
        self.respond(image)
    }

    fn face_swap(
        &self,
        source: &RgbaImage,
        _target_face: &RgbaImage,
        _options: &TransformOptions,
    ) -> Result<RgbaImage, TransformError> {
        self.respond(source)
    }

    fn remove_background(
        &self,
        image: &RgbaImage,
        _options: &TransformOptions,
    ) -> Result<RgbaImage, TransformError> {
        self.respond(image)
    }
}

fn session_with_image(image: RgbaImage) -> EditorSession {
    let mut session = EditorSession::default();
    session.open_image(image).unwrap();
    session
}

#[test]
fn n_undos_return_the_uploaded_image() {
    let original = solid(16, 16, [10, 20, 30, 255]);
    let mut session = session_with_image(original.clone());
    let service = StubTransform::returning([200, 0, 0, 255]);

    for i in 0..3 {
        session.set_filter_prompt(format!("style {}", i));
        session.apply_filter(&service).unwrap();
    }
    assert_eq!(session.history_len(), 4);
    assert_ne!(
        session.active_layer().unwrap().image().as_raw(),
        original.as_raw()
    );

    for _ in 0..3 {
        assert!(session.undo().unwrap());
    }
    assert_eq!(
        session.active_layer().unwrap().image().as_raw(),
        original.as_raw()
    );
    assert!(!session.undo().unwrap());
}

#[test]
fn commit_after_undo_discards_redo() {
    let mut session = session_with_image(solid(8, 8, [0, 0, 0, 255]));
    let service = StubTransform::returning([50, 50, 50, 255]);

    session.set_filter_prompt("noir");
    session.apply_filter(&service).unwrap();
    session.undo().unwrap();
    assert!(session.can_redo());

    session.set_filter_prompt("sepia");
    session.apply_filter(&service).unwrap();
    assert!(!session.can_redo());
    assert!(!session.redo().unwrap());
}

#[test]
fn retouch_scenario_commits_then_undoes() {
    let original = solid(200, 150, [90, 120, 60, 255]);
    let mut session = session_with_image(original.clone());

    let background = session.active_layer().unwrap();
    assert_eq!(background.name, "Background");
    assert_eq!(background.opacity(), 100);
    assert!(background.visible);

    let service = StubTransform::returning([1, 2, 3, 255]);
    session.set_retouch_prompt("remove object");
    session.set_hotspot(Some(Hotspot { x: 120, y: 80 }));
    session.apply_retouch(&service).unwrap();

    assert_eq!(service.last_hotspot.get(), Some((120, 80)));
    assert_eq!(session.history_len(), 2);
    assert_eq!(session.history_cursor(), Some(1));

    assert!(session.undo().unwrap());
    assert_eq!(
        session.active_layer().unwrap().image().as_raw(),
        original.as_raw()
    );
}

#[test]
fn empty_retouch_instruction_never_reaches_the_backend() {
    let original = solid(8, 8, [5, 5, 5, 255]);
    let mut session = session_with_image(original.clone());
    let service = StubTransform::returning([255, 255, 255, 255]);

    session.set_hotspot(Some(Hotspot { x: 1, y: 1 }));
    let err = session.apply_retouch(&service).unwrap_err();

    assert!(matches!(err, EditError::EmptyInstruction(_)));
    assert!(err.is_validation());
    assert!(!err.to_string().is_empty());
    assert_eq!(service.calls.get(), 0);
    assert_eq!(
        session.active_layer().unwrap().image().as_raw(),
        original.as_raw()
    );
    assert_eq!(session.history_len(), 1);
}

#[test]
fn missing_hotspot_rejects_retouch() {
    let mut session = session_with_image(solid(8, 8, [5, 5, 5, 255]));
    let service = StubTransform::returning([255, 255, 255, 255]);

    session.set_retouch_prompt("remove the mark");
    assert!(matches!(
        session.apply_retouch(&service),
        Err(EditError::MissingHotspot)
    ));
    assert_eq!(service.calls.get(), 0);
}

#[test]
fn face_swap_requires_a_reference_image() {
    let mut session = session_with_image(solid(8, 8, [5, 5, 5, 255]));
    let service = StubTransform::returning([9, 9, 9, 255]);

    assert!(matches!(
        session.apply_face_swap(&service),
        Err(EditError::MissingReferenceImage)
    ));
    assert_eq!(service.calls.get(), 0);

    session.set_reference_image(Some(solid(4, 4, [1, 1, 1, 255])));
    session.apply_face_swap(&service).unwrap();
    assert_eq!(service.calls.get(), 1);
    assert_eq!(session.history_len(), 2);
}

#[test]
fn deleting_the_only_layer_resets_everything() {
    let mut session = session_with_image(solid(8, 8, [7, 7, 7, 255]));
    let id = session.active_layer().unwrap().id();

    session.remove_layer(id).unwrap();
    assert!(session.layers().is_empty());
    assert!(session.active_layer().is_none());
    assert_eq!(session.history_len(), 0);
    assert!(!session.can_undo());
}

#[test]
fn deleting_a_non_last_layer_selects_the_topmost() {
    let mut session = session_with_image(solid(8, 8, [7, 7, 7, 255]));
    let middle = session.add_layer(solid(8, 8, [1, 1, 1, 255]), None).unwrap();
    let top = session.add_layer(solid(8, 8, [2, 2, 2, 255]), None).unwrap();

    session.remove_layer(middle).unwrap();
    assert_eq!(session.layers().len(), 2);
    assert_eq!(session.active_layer().unwrap().id(), top);
    assert_eq!(session.history_len(), 4);
}

#[test]
fn zero_width_crop_is_rejected_without_touching_history() {
    let mut session = session_with_image(solid(100, 100, [40, 40, 40, 255]));

    let result = session.apply_crop(CropSelection {
        rect: CropRect {
            x: 10.0,
            y: 10.0,
            width: 0.0,
            height: 30.0,
        },
        display_width: 100.0,
        display_height: 100.0,
    });
    assert!(matches!(result, Err(EditError::EmptySelection)));
    assert_eq!(session.history_len(), 1);
    assert_eq!(session.layers().len(), 1);
}

#[test]
fn crop_replaces_the_document_with_one_layer() {
    let mut session = session_with_image(solid(100, 100, [40, 40, 40, 255]));
    session.add_layer(solid(100, 100, [90, 90, 90, 128]), None).unwrap();

    session
        .apply_crop(CropSelection {
            rect: CropRect {
                x: 10.0,
                y: 10.0,
                width: 20.0,
                height: 20.0,
            },
            display_width: 50.0,
            display_height: 50.0,
        })
        .unwrap();

    assert_eq!(session.layers().len(), 1);
    let cropped = session.active_layer().unwrap();
    assert_eq!(cropped.name, "Cropped Image");
    assert_eq!(cropped.dimensions(), (40, 40));

    // Undo restores the pre-crop, two-layer document
    assert!(session.undo().unwrap());
    assert_eq!(session.layers().len(), 2);
}

#[test]
fn transform_failure_preserves_the_image() {
    let original = solid(8, 8, [1, 2, 3, 255]);
    let mut session = session_with_image(original.clone());
    let service = StubTransform::failing("model overloaded");

    session.set_filter_prompt("dreamy haze");
    let err = session.apply_filter(&service).unwrap_err();

    match &err {
        EditError::Transform { message, .. } => assert_eq!(message, "model overloaded"),
        other => panic!("expected Transform error, got {:?}", other),
    }
    assert!(err.to_string().contains("Filter failed"));
    assert_eq!(
        session.active_layer().unwrap().image().as_raw(),
        original.as_raw()
    );
    assert_eq!(session.history_len(), 1);
    assert!(!session.is_busy());
}

#[test]
fn busy_gate_rejects_everything_until_completion() {
    let mut session = session_with_image(solid(8, 8, [0, 0, 0, 255]));
    let layer_id = session.active_layer().unwrap().id();

    session.set_filter_prompt("posterize");
    let ticket = session.begin_filter().unwrap();
    assert!(session.is_busy());

    assert!(matches!(session.begin_retouch(), Err(EditError::Busy)));
    assert!(matches!(session.undo(), Err(EditError::Busy)));
    assert!(matches!(
        session.remove_layer(layer_id),
        Err(EditError::Busy)
    ));
    assert!(matches!(
        session.open_image(solid(2, 2, [0, 0, 0, 255])),
        Err(EditError::Busy)
    ));
    assert_eq!(session.history_len(), 1);

    session
        .complete_edit(ticket, Ok(solid(8, 8, [3, 3, 3, 255])))
        .unwrap();
    assert!(!session.is_busy());
    assert_eq!(session.history_len(), 2);
    session.undo().unwrap();
}

#[test]
fn opacity_drag_commits_once_on_release() {
    let mut session = session_with_image(solid(8, 8, [0, 0, 0, 255]));
    let id = session.active_layer().unwrap().id();

    for value in [90, 70, 45] {
        session.set_layer_opacity(id, value).unwrap();
    }
    assert_eq!(session.history_len(), 1);
    assert_eq!(session.active_layer().unwrap().opacity(), 45);

    session.commit_opacity().unwrap();
    assert_eq!(session.history_len(), 2);

    // Undo restores the pre-drag opacity
    session.undo().unwrap();
    assert_eq!(session.active_layer().unwrap().opacity(), 100);
}

#[test]
fn reorder_commits_immediately() {
    let mut session = session_with_image(solid(8, 8, [0, 0, 0, 255]));
    let bottom = session.active_layer().unwrap().id();
    let top = session.add_layer(solid(8, 8, [1, 1, 1, 255]), None).unwrap();
    let before = session.history_len();

    session.reorder_layers(&[top, bottom]).unwrap();
    assert_eq!(session.history_len(), before + 1);
    assert_eq!(session.layers()[0].id(), top);
    assert_eq!(session.layers()[1].id(), bottom);

    assert!(matches!(
        session.reorder_layers(&[top]),
        Err(EditError::InvalidLayerOrder)
    ));
}

#[test]
fn successful_edit_resets_the_edit_panel() {
    let mut session = session_with_image(solid(8, 8, [0, 0, 0, 255]));
    let service = StubTransform::returning([200, 200, 200, 255]);

    session.set_retouch_prompt("brighten the corner");
    session.set_auxiliary_prompt("subtle");
    session.set_hotspot(Some(Hotspot { x: 2, y: 2 }));
    session.set_scale_percent(200);
    session.apply_retouch(&service).unwrap();

    assert_eq!(session.retouch_prompt(), "");
    assert_eq!(session.hotspot(), None);
    assert_eq!(session.scale_percent(), 100);
}
