use hitcanvas::renderer::Void;
use hitcanvas::{Context, HitTestFlags, LineCap, Winding};

fn context() -> Context<Void> {
    let mut ctx = Context::new(Void);
    ctx.begin_frame(100.0, 100.0, 1.0);
    ctx
}

#[test]
fn fill_region_hit_and_miss() {
    let mut ctx = context();

    ctx.begin_path();
    ctx.rect(0.0, 0.0, 10.0, 10.0);
    ctx.fill();
    ctx.fill_hit_region(7);

    assert_eq!(ctx.hit_test(5.0, 5.0, HitTestFlags::TEST_FILL), Some(7));
    assert_eq!(ctx.hit_test(15.0, 5.0, HitTestFlags::TEST_FILL), None);

    // A fill region is not a stroke region.
    assert_eq!(ctx.hit_test(5.0, 5.0, HitTestFlags::TEST_STROKE), None);
    assert_eq!(ctx.hit_test(5.0, 5.0, HitTestFlags::all_kinds()), Some(7));
}

#[test]
fn stroke_region_round_caps() {
    let mut ctx = context();

    ctx.begin_path();
    ctx.move_to(0.0, 0.0);
    ctx.line_to(100.0, 0.0);
    ctx.set_stroke_width(4.0);
    ctx.set_line_cap(LineCap::Round);
    ctx.stroke_hit_region(3);

    // Inside the round cap disc before the start point.
    assert_eq!(ctx.hit_test(-1.0, 0.0, HitTestFlags::TEST_STROKE), Some(3));
    // Beyond the cap radius.
    assert_eq!(ctx.hit_test(-3.0, 0.0, HitTestFlags::TEST_STROKE), None);
    // On the segment.
    assert_eq!(ctx.hit_test(50.0, 1.5, HitTestFlags::TEST_STROKE), Some(3));
    assert_eq!(ctx.hit_test(50.0, 2.5, HitTestFlags::TEST_STROKE), None);
}

#[test]
fn butt_caps_do_not_extend_containment() {
    let mut ctx = context();

    ctx.begin_path();
    ctx.move_to(10.0, 10.0);
    ctx.line_to(90.0, 10.0);
    ctx.set_stroke_width(10.0);
    ctx.set_line_cap(LineCap::Butt);

    assert!(ctx.in_stroke(50.0, 13.0));
    assert!(!ctx.in_stroke(50.0, 16.0));
    // Outside the endpoints a butt stroke covers nothing.
    assert!(!ctx.in_stroke(9.0, 10.0));
    assert!(!ctx.in_stroke(92.0, 10.0));
}

#[test]
fn square_caps_extend_containment() {
    let mut ctx = context();

    ctx.begin_path();
    ctx.move_to(10.0, 10.0);
    ctx.line_to(90.0, 10.0);
    ctx.set_stroke_width(10.0);
    ctx.set_line_cap(LineCap::Square);

    assert!(ctx.in_stroke(7.0, 12.0));
    assert!(ctx.in_stroke(94.0, 8.0));
    assert!(!ctx.in_stroke(96.0, 10.0));
}

#[test]
fn hole_winding_cancels_fill() {
    let mut ctx = context();

    ctx.begin_path();
    ctx.rect(0.0, 0.0, 10.0, 10.0);
    ctx.move_to(2.0, 2.0);
    ctx.line_to(8.0, 2.0);
    ctx.line_to(8.0, 8.0);
    ctx.line_to(2.0, 8.0);
    ctx.close_path();
    ctx.path_winding(Winding::HOLE);
    ctx.fill();
    ctx.fill_hit_region(1);

    assert!(!ctx.in_fill(5.0, 5.0));
    assert!(ctx.in_fill(1.0, 1.0));

    assert_eq!(ctx.hit_test(5.0, 5.0, HitTestFlags::TEST_FILL), None);
    assert_eq!(ctx.hit_test(1.0, 1.0, HitTestFlags::TEST_FILL), Some(1));
}

#[test]
fn circle_fill_containment() {
    let mut ctx = context();

    ctx.begin_path();
    ctx.circle(50.0, 50.0, 10.0);

    assert!(ctx.in_fill(50.0, 50.0));
    assert!(ctx.in_fill(43.0, 50.0));
    assert!(!ctx.in_fill(70.0, 50.0));
    // Just outside the rim, inside the bounding box.
    assert!(!ctx.in_fill(57.2, 57.2));
}

#[test]
fn bezier_stroke_containment() {
    let mut ctx = context();

    ctx.begin_path();
    ctx.move_to(10.0, 50.0);
    ctx.bezier_to(30.0, 10.0, 70.0, 10.0, 90.0, 50.0);
    ctx.set_stroke_width(6.0);

    // On the curve near its apex (y = 20 at t = 0.5).
    assert!(ctx.in_stroke(50.0, 20.0));
    assert!(ctx.in_stroke(50.0, 22.0));
    assert!(!ctx.in_stroke(50.0, 32.0));
    assert!(!ctx.in_stroke(50.0, 50.0));
}

#[test]
fn topmost_registration_wins() {
    let mut ctx = context();

    ctx.begin_path();
    ctx.rect(0.0, 0.0, 50.0, 50.0);
    ctx.fill_hit_region(1);

    ctx.begin_path();
    ctx.rect(25.0, 25.0, 50.0, 50.0);
    ctx.fill_hit_region(2);

    // Overlap: the later registration is on top.
    assert_eq!(ctx.hit_test(40.0, 40.0, HitTestFlags::TEST_FILL), Some(2));
    assert_eq!(ctx.hit_test_all(40.0, 40.0, HitTestFlags::TEST_FILL, 8), vec![2, 1]);

    // Non-overlapping corners.
    assert_eq!(ctx.hit_test(10.0, 10.0, HitTestFlags::TEST_FILL), Some(1));
    assert_eq!(ctx.hit_test(70.0, 70.0, HitTestFlags::TEST_FILL), Some(2));

    // Repeated queries are deterministic.
    for _ in 0..8 {
        assert_eq!(ctx.hit_test(40.0, 40.0, HitTestFlags::TEST_FILL), Some(2));
    }
}

#[test]
fn transformed_paths_pick_in_device_space() {
    let mut ctx = context();

    ctx.translate(40.0, 40.0);
    ctx.begin_path();
    ctx.rect(0.0, 0.0, 10.0, 10.0);
    ctx.fill_hit_region(5);

    assert_eq!(ctx.hit_test(45.0, 45.0, HitTestFlags::TEST_FILL), Some(5));
    assert_eq!(ctx.hit_test(5.0, 5.0, HitTestFlags::TEST_FILL), None);
}

#[test]
fn scissor_clips_hit_regions() {
    let mut ctx = context();

    ctx.scissor(0.0, 0.0, 5.0, 10.0);
    ctx.begin_path();
    ctx.rect(0.0, 0.0, 10.0, 10.0);
    ctx.fill_hit_region(9);

    assert_eq!(ctx.hit_test(2.0, 2.0, HitTestFlags::TEST_FILL), Some(9));
    // Inside the rect but outside the scissor.
    assert_eq!(ctx.hit_test(7.0, 2.0, HitTestFlags::TEST_FILL), None);
}

#[test]
fn regions_reset_at_begin_frame() {
    let mut ctx = context();

    ctx.begin_path();
    ctx.rect(0.0, 0.0, 10.0, 10.0);
    ctx.fill_hit_region(7);
    assert_eq!(ctx.hit_test(5.0, 5.0, HitTestFlags::TEST_FILL), Some(7));

    ctx.begin_frame(100.0, 100.0, 1.0);
    assert_eq!(ctx.hit_test(5.0, 5.0, HitTestFlags::TEST_FILL), None);
}

#[test]
fn in_fill_leaves_registered_regions_intact() {
    let mut ctx = context();

    ctx.begin_path();
    ctx.rect(0.0, 0.0, 10.0, 10.0);
    ctx.fill_hit_region(7);

    // Temporary queries roll the scene back.
    ctx.begin_path();
    ctx.rect(20.0, 20.0, 10.0, 10.0);
    assert!(ctx.in_fill(25.0, 25.0));
    assert!(!ctx.in_stroke(40.0, 40.0));

    assert_eq!(ctx.hit_test(5.0, 5.0, HitTestFlags::TEST_FILL), Some(7));
    assert_eq!(ctx.hit_test(25.0, 25.0, HitTestFlags::TEST_FILL), None);
}
