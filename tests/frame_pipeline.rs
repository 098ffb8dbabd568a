use std::cell::RefCell;
use std::rc::Rc;

use paintbox::{
    Canvas, Color, PolySegment, PresentTarget, Rect, Renderer, Surface, Tab, VoidTarget,
};

/// Present target that records every presented rect batch.
struct RecordingTarget {
    width: i32,
    height: i32,
    presented: Rc<RefCell<Vec<Vec<Rect>>>>,
}

impl PresentTarget for RecordingTarget {
    fn size_in_pixels(&self) -> (i32, i32) {
        (self.width, self.height)
    }

    fn present(&mut self, _surface: &Surface, rects: &[Rect]) {
        self.presented.borrow_mut().push(rects.to_vec());
    }
}

fn recording_renderer(width: i32, height: i32) -> (Renderer, Rc<RefCell<Vec<Vec<Rect>>>>) {
    let presented = Rc::new(RefCell::new(Vec::new()));
    let target = RecordingTarget {
        width,
        height,
        presented: presented.clone(),
    };
    (Renderer::new(Box::new(target)).unwrap(), presented)
}

fn pixel(renderer: &Renderer, x: i32, y: i32) -> Vec<u8> {
    renderer.to_canvas(x, y, 1, 1).unwrap().get_pixels(0, 0, 1, 1)
}

#[test]
fn empty_frame_presents_nothing() {
    let (mut renderer, presented) = recording_renderer(200, 100);
    renderer.begin_frame();
    renderer.end_frame();
    assert!(presented.borrow().is_empty());
}

#[test]
fn single_rect_presents_its_cell_and_paints_exact_pixels() {
    let (mut renderer, presented) = recording_renderer(200, 100);
    renderer.begin_frame();
    renderer.draw_rect(20.0, 30.0, 10.0, 10.0, Color::rgb(255, 0, 0));
    renderer.end_frame();

    assert_eq!(presented.borrow().as_slice(), &[vec![Rect::new(0, 0, 60, 60)]]);
    assert_eq!(pixel(&renderer, 20, 30), vec![255, 0, 0, 255]);
    assert_eq!(pixel(&renderer, 29, 39), vec![255, 0, 0, 255]);
    assert_eq!(pixel(&renderer, 30, 40), vec![0, 0, 0, 0]);
    assert_eq!(pixel(&renderer, 19, 30), vec![0, 0, 0, 0]);
}

#[test]
fn repeating_a_frame_presents_nothing() {
    let (mut renderer, presented) = recording_renderer(200, 100);
    for _ in 0..2 {
        renderer.begin_frame();
        renderer.draw_rect(20.0, 30.0, 10.0, 10.0, Color::rgb(255, 0, 0));
        renderer.end_frame();
    }
    assert_eq!(presented.borrow().len(), 1);
}

#[test]
fn changed_command_redraws_only_its_cells() {
    let (mut renderer, presented) = recording_renderer(400, 200);
    renderer.begin_frame();
    renderer.draw_rect(0.0, 0.0, 10.0, 10.0, Color::rgb(1, 1, 1));
    renderer.draw_rect(300.0, 100.0, 10.0, 10.0, Color::rgb(2, 2, 2));
    renderer.end_frame();
    presented.borrow_mut().clear();

    renderer.begin_frame();
    renderer.draw_rect(0.0, 0.0, 10.0, 10.0, Color::rgb(1, 1, 1));
    renderer.draw_rect(300.0, 100.0, 10.0, 10.0, Color::rgb(3, 3, 3));
    renderer.end_frame();

    let batches = presented.borrow();
    assert_eq!(batches.len(), 1);
    // only the cell containing the changed rect was presented
    assert_eq!(batches[0], vec![Rect::new(300, 60, 60, 60)]);
}

#[test]
fn clip_excludes_draw() {
    let (mut renderer, _) = recording_renderer(200, 100);
    renderer.begin_frame();
    renderer.set_clip_rect(0.0, 0.0, 5.0, 5.0);
    renderer.draw_rect(20.0, 30.0, 10.0, 10.0, Color::rgb(255, 0, 0));
    renderer.end_frame();
    assert_eq!(pixel(&renderer, 20, 30), vec![0, 0, 0, 0]);
}

#[test]
fn clip_applies_inside_redraw() {
    let (mut renderer, _) = recording_renderer(200, 100);
    renderer.begin_frame();
    renderer.set_clip_rect(0.0, 0.0, 25.0, 35.0);
    // overlaps the clip: only the covered part may change
    renderer.draw_rect(20.0, 30.0, 10.0, 10.0, Color::rgb(255, 0, 0));
    renderer.end_frame();
    assert_eq!(pixel(&renderer, 24, 34), vec![255, 0, 0, 255]);
    assert_eq!(pixel(&renderer, 26, 34), vec![0, 0, 0, 0]);
}

#[test]
fn draw_poly_reports_control_box() {
    let (mut renderer, _) = recording_renderer(200, 100);
    renderer.begin_frame();
    let bbox = renderer
        .draw_poly(
            &[
                PolySegment::Point { x: 10.0, y: 10.0 },
                PolySegment::Point { x: 30.0, y: 10.0 },
                PolySegment::Point { x: 30.0, y: 40.0 },
            ],
            Color::rgb(0, 255, 0),
        )
        .unwrap();
    renderer.end_frame();
    assert_eq!(bbox, Rect::new(10, 10, 20, 30));
    // a point inside the triangle got painted
    assert_eq!(pixel(&renderer, 28, 20), vec![0, 255, 0, 0]);
}

#[test]
fn draw_poly_rejects_oversized_runs() {
    let (mut renderer, _) = recording_renderer(200, 100);
    renderer.begin_frame();
    let segments: Vec<PolySegment> = (0..2000)
        .map(|i| PolySegment::Point { x: i as f32, y: 0.0 })
        .collect();
    assert!(renderer.draw_poly(&segments, Color::white()).is_err());
    renderer.end_frame();
}

#[test]
fn canvas_blit_honors_recording_time_contents() {
    let (mut renderer, _) = recording_renderer(200, 100);
    let mut canvas = Canvas::new(50, 50, Color::rgb(255, 0, 0), true).unwrap();

    renderer.begin_frame();
    renderer.draw_canvas(&canvas, 0, 0);
    // mutate the canvas while the command still references it
    let blue = [0u8, 0, 255, 255].repeat(50 * 50);
    canvas.set_pixels(&blue, 0, 0, 50, 50).unwrap();
    renderer.end_frame();

    // the blit shows the canvas as it was when recorded
    assert_eq!(pixel(&renderer, 10, 10), vec![255, 0, 0, 255]);
    // the canvas itself took the mutation
    assert_eq!(canvas.get_pixels(10, 10, 1, 1), vec![0, 0, 255, 255]);
}

#[test]
fn canvas_render_detaches_while_pinned() {
    let (mut renderer, _) = recording_renderer(200, 100);
    let mut canvas = Canvas::new(50, 50, Color::rgb(255, 0, 0), true).unwrap();

    renderer.begin_frame();
    renderer.draw_canvas(&canvas, 0, 0);
    canvas.draw_rect(0, 0, 50, 50, Color::rgb(0, 0, 255));
    canvas.render();
    renderer.end_frame();

    assert_eq!(pixel(&renderer, 10, 10), vec![255, 0, 0, 255]);
    assert_eq!(canvas.get_pixels(10, 10, 1, 1), vec![0, 0, 255, 255]);
}

#[test]
fn canvas_mutation_invalidates_destination_next_frame() {
    let (mut renderer, presented) = recording_renderer(200, 100);
    let mut canvas = Canvas::new(50, 50, Color::rgb(255, 0, 0), true).unwrap();

    for _ in 0..2 {
        renderer.begin_frame();
        renderer.draw_canvas(&canvas, 0, 0);
        renderer.end_frame();
    }
    assert_eq!(presented.borrow().len(), 1);

    canvas.set_pixels(&[0, 255, 0, 255].repeat(50 * 50), 0, 0, 50, 50).unwrap();
    renderer.begin_frame();
    renderer.draw_canvas(&canvas, 0, 0);
    renderer.end_frame();
    assert_eq!(presented.borrow().len(), 2);
    assert_eq!(pixel(&renderer, 10, 10), vec![0, 255, 0, 255]);
}

#[test]
fn presented_rects_scale_to_pixels() {
    struct ScaledTarget {
        presented: Rc<RefCell<Vec<Vec<Rect>>>>,
    }
    impl PresentTarget for ScaledTarget {
        fn size_in_pixels(&self) -> (i32, i32) {
            (400, 200)
        }
        fn scale(&self) -> (f64, f64) {
            (2.0, 2.0)
        }
        fn present(&mut self, _surface: &Surface, rects: &[Rect]) {
            self.presented.borrow_mut().push(rects.to_vec());
        }
    }

    let presented = Rc::new(RefCell::new(Vec::new()));
    let mut renderer = Renderer::new(Box::new(ScaledTarget { presented: presented.clone() })).unwrap();
    assert_eq!(renderer.get_size(), (200, 100));

    renderer.begin_frame();
    renderer.draw_rect(10.0, 10.0, 10.0, 10.0, Color::rgb(255, 0, 0));
    renderer.end_frame();

    assert_eq!(presented.borrow().as_slice(), &[vec![Rect::new(0, 0, 120, 120)]]);
}

#[test]
fn resize_forces_full_repaint() {
    struct GrowingTarget {
        size: Rc<RefCell<(i32, i32)>>,
        presented: Rc<RefCell<Vec<Vec<Rect>>>>,
    }
    impl PresentTarget for GrowingTarget {
        fn size_in_pixels(&self) -> (i32, i32) {
            *self.size.borrow()
        }
        fn present(&mut self, _surface: &Surface, rects: &[Rect]) {
            self.presented.borrow_mut().push(rects.to_vec());
        }
    }

    let size = Rc::new(RefCell::new((200, 100)));
    let presented = Rc::new(RefCell::new(Vec::new()));
    let mut renderer = Renderer::new(Box::new(GrowingTarget {
        size: size.clone(),
        presented: presented.clone(),
    }))
    .unwrap();

    renderer.begin_frame();
    renderer.end_frame();
    assert!(presented.borrow().is_empty());

    *size.borrow_mut() = (260, 100);
    renderer.resize().unwrap();
    renderer.begin_frame();
    renderer.end_frame();
    // the grown screen repainted even though no commands were issued
    assert_eq!(presented.borrow().len(), 1);
}

#[test]
fn empty_tab_type_defaults_to_relative_stops() {
    assert_eq!(Tab::default().offset, None);
}

#[test]
#[should_panic(expected = "begin_frame while another frame is recording")]
fn nested_begin_frame_panics() {
    let mut a = Renderer::new(Box::new(VoidTarget::new(100, 100))).unwrap();
    let mut b = Renderer::new(Box::new(VoidTarget::new(100, 100))).unwrap();
    a.begin_frame();
    b.begin_frame();
}

#[test]
#[should_panic(expected = "drawing call outside begin_frame/end_frame")]
fn drawing_outside_a_frame_panics() {
    let mut renderer = Renderer::new(Box::new(VoidTarget::new(100, 100))).unwrap();
    renderer.draw_rect(0.0, 0.0, 10.0, 10.0, Color::white());
}

#[test]
fn persist_and_restore_round_trip() {
    assert!(Renderer::restore().is_none());
    let renderer = Renderer::new(Box::new(VoidTarget::new(100, 100))).unwrap();
    renderer.persist();
    let restored = Renderer::restore().expect("persisted window comes back");
    assert_eq!(restored.get_size(), (100, 100));
    assert!(Renderer::restore().is_none());
}
