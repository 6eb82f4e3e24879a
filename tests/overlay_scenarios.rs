use std::time::{Duration, Instant};

use formula_overlay::editor::Segment;
use formula_overlay::prelude::*;

const NOTES: &str = include_str!("fixtures/notes.md");

fn settle_threaded(engine: &mut MathOverlay<EditorBuffer, ThreadedRenderer>) {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        engine.pump(Instant::now());
        if engine.renderer().is_idle() {
            return;
        }
        assert!(Instant::now() < deadline, "renderer never went idle");
        engine.renderer_mut().wait_idle(Duration::from_millis(100));
    }
}

fn threaded(buffer: EditorBuffer) -> MathOverlay<EditorBuffer, ThreadedRenderer> {
    let renderer = ThreadedRenderer::spawn(PlainTypesetter).unwrap();
    MathOverlay::initialize(buffer, renderer, &OverlayConfig::default())
}

#[test]
fn test_threaded_renderer_renders_every_formula() {
    let mut engine = threaded(EditorBuffer::from_text(NOTES));
    engine.render_all();
    settle_threaded(&mut engine);

    assert_eq!(engine.regions().count(), 8);
    assert!(
        engine
            .regions()
            .all(|region| region.state() == RegionState::Rendered)
    );
    assert_eq!(engine.buffer().replacement_count(), 8);
    assert_eq!(engine.pending_placements(), 0);
}

#[test]
fn test_threaded_cursor_inside_keeps_source_visible() {
    let mut buffer = EditorBuffer::from_text(NOTES);
    buffer.move_to(2, 6);
    let mut engine = threaded(buffer);
    engine.render_all();
    settle_threaded(&mut engine);

    let suppressed = engine.suppressed().unwrap();
    assert_eq!(engine.region(suppressed).unwrap().source(), "$x^2$");
    assert_eq!(engine.buffer().replacement_count(), 7);

    engine.buffer_mut().move_to(0, 0);
    settle_threaded(&mut engine);
    assert_eq!(engine.suppressed(), None);
    assert_eq!(engine.buffer().replacement_count(), 8);
}

#[test]
fn test_typing_into_formula_rerenders_it() {
    let mut engine = MathOverlay::initialize(
        EditorBuffer::from_text("Let $x^2$ be given."),
        FifoRenderer::new(),
        &OverlayConfig::default(),
    );
    engine.render_all();
    engine.renderer_mut().resolve_all();
    engine.process_completions();

    // Step into the formula, type, then step back out.
    engine.buffer_mut().move_to(0, 8);
    engine.process_events();
    engine.buffer_mut().insert_str("+1");
    engine.process_events();
    engine.renderer_mut().resolve_all();
    engine.process_completions();
    assert!(engine.suppressed().is_some(), "cursor is still inside the edited formula");

    engine.buffer_mut().move_to_end();
    engine.process_events();
    engine.renderer_mut().resolve_all();
    engine.process_completions();

    assert_eq!(engine.suppressed(), None);
    let segments = engine.buffer().display_line(0);
    let rendered: Vec<&str> = segments
        .iter()
        .filter_map(|segment| match segment {
            Segment::Formula(formula) => Some(formula.text.as_str()),
            Segment::Text(_) => None,
        })
        .collect();
    assert_eq!(rendered, vec!["x²+1"]);
    assert_eq!(engine.buffer().text(), "Let $x^2+1$ be given.");
}

#[test]
fn test_shutdown_returns_collaborators() {
    let mut engine = MathOverlay::initialize(
        EditorBuffer::from_text("$a$"),
        FifoRenderer::new(),
        &OverlayConfig::default(),
    );
    engine.render_all();
    let (buffer, renderer) = engine.shutdown();
    assert_eq!(renderer.submitted(), 1);
    assert_eq!(buffer.mark_count(), 1, "tracking mark stays with the buffer");
}
