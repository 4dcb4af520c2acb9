use std::f32::consts::PI;

use hitcanvas::renderer::Void;
use hitcanvas::{Bounds, Color, Context, LineCap, Paint, Winding};

mod recorder;
use recorder::Recorder;

fn void_context() -> Context<Void> {
    let mut ctx = Context::new(Void);
    ctx.begin_frame(800.0, 600.0, 1.0);
    ctx
}

#[test]
fn path_with_one_move_to_does_not_panic() {
    let mut ctx = void_context();

    ctx.begin_path();
    ctx.move_to(10.0, 10.0);
    ctx.fill();
    ctx.stroke();
}

#[test]
fn path_with_two_lines_to_does_not_panic() {
    let mut ctx = void_context();

    ctx.begin_path();
    ctx.line_to(10.0, 10.0);
    ctx.line_to(10.0, 10.0);
    ctx.fill();
    ctx.stroke();
}

#[test]
fn path_with_close_points() {
    let mut ctx = void_context();

    ctx.begin_path();
    ctx.move_to(10.0, 10.0);
    ctx.line_to(10.0001, 10.0);
    ctx.line_to(10.0001, 10.000001);
    ctx.fill();
    ctx.stroke();
}

#[test]
fn path_with_points_at_limits() {
    let mut ctx = void_context();

    ctx.begin_path();
    ctx.move_to(10.0, 10.0);
    ctx.line_to(f32::MAX, f32::MAX);
    ctx.quad_to(10.0, 10.0, -f32::MAX, f32::MAX);
    ctx.bezier_to(10.0, 10.0, f32::MAX, 5000.0, -f32::MAX, -f32::MAX);
    ctx.rounded_rect_varying(-f32::MAX, -f32::MAX, f32::MAX, f32::MAX, f32::MAX, f32::MAX, f32::MAX, f32::MAX);
    ctx.close_path();

    ctx.fill();
    ctx.stroke();
}

#[test]
fn degenerate_arc_to_falls_back_to_line() {
    let mut ctx = void_context();

    ctx.begin_path();
    ctx.move_to(0.0, 0.0);
    // Co-located corner point
    ctx.arc_to(0.0, 0.0, 10.0, 10.0, 5.0);
    // Zero radius
    ctx.arc_to(20.0, 0.0, 20.0, 20.0, 0.0);
    ctx.stroke();
}

#[test]
fn save_restore_round_trip() {
    let mut ctx = void_context();

    ctx.set_stroke_width(7.0);
    ctx.save();
    ctx.set_stroke_width(1.0);
    ctx.translate(100.0, 100.0);
    ctx.restore();

    // Deep over-saving is dropped, deep over-restoring is ignored; neither
    // may corrupt the stack.
    for _ in 0..100 {
        ctx.save();
    }
    for _ in 0..200 {
        ctx.restore();
    }

    ctx.begin_path();
    ctx.rect(0.0, 0.0, 10.0, 10.0);
    ctx.fill();
}

#[test]
fn filled_rect_produces_quad_and_fringe() {
    let mut ctx = Context::new(Recorder::default());
    ctx.begin_frame(800.0, 600.0, 1.0);

    ctx.begin_path();
    ctx.rect(10.0, 10.0, 100.0, 50.0);
    ctx.set_fill_paint(Paint::color(Color::rgb(255, 0, 0)));
    ctx.fill();

    let fills = ctx.renderer().fills.clone();
    assert_eq!(fills.len(), 1);

    let fill = &fills[0];
    assert_eq!(fill.contours.len(), 1);

    // Four interior vertices and a looped fringe ribbon.
    assert_eq!(fill.contours[0].0, 4);
    assert_eq!(fill.contours[0].1, 10);

    let Bounds { minx, miny, maxx, maxy } = fill.bounds;
    assert_eq!((minx, miny, maxx, maxy), (10.0, 10.0, 110.0, 60.0));
}

#[test]
fn stroked_line_is_a_capped_ribbon() {
    let mut ctx = Context::new(Recorder::default());
    ctx.begin_frame(800.0, 600.0, 1.0);

    ctx.begin_path();
    ctx.move_to(0.0, 0.0);
    ctx.line_to(100.0, 0.0);
    ctx.set_stroke_width(10.0);
    ctx.set_line_cap(LineCap::Butt);
    ctx.stroke();

    let strokes = ctx.renderer().strokes.clone();
    assert_eq!(strokes.len(), 1);
    assert_eq!(strokes[0].stroke_width, 10.0);

    // Two butt caps, four vertices each, no joins in between.
    assert_eq!(strokes[0].contours, vec![8]);

    let verts = &strokes[0].verts;
    let maxy = verts.iter().map(|v| v.y).fold(f32::MIN, f32::max);
    let miny = verts.iter().map(|v| v.y).fold(f32::MAX, f32::min);
    assert!((maxy - 5.5).abs() < 1e-4);
    assert!((miny + 5.5).abs() < 1e-4);

    // Fringe rows fade out, centerline-edge rows stay solid.
    assert!(verts.iter().any(|v| v.v == 0.0));
    assert!(verts.iter().any(|v| v.v == 1.0));
    assert!(verts.iter().any(|v| v.u == 0.0));
    assert!(verts.iter().any(|v| v.u == 1.0));
}

#[test]
fn filled_semicircle_is_finely_flattened() {
    let mut ctx = Context::new(Recorder::default());
    ctx.begin_frame(800.0, 600.0, 1.0);

    ctx.begin_path();
    ctx.arc(0.0, 0.0, 50.0, 0.0, PI, Winding::CCW);
    ctx.close_path();
    ctx.fill();

    let fills = ctx.renderer().fills.clone();
    assert_eq!(fills.len(), 1);
    assert_eq!(fills[0].contours.len(), 1);

    // The arc must flatten densely at this radius.
    assert!(fills[0].contours[0].0 >= 20);

    // Enforced CCW winding: positive signed area.
    let verts = &fills[0].fill_verts;
    let mut area = 0.0;
    for i in 0..verts.len() {
        let (x0, y0) = (verts[i].x, verts[i].y);
        let (x1, y1) = {
            let v = &verts[(i + 1) % verts.len()];
            (v.x, v.y)
        };
        area += x0 * y1 - x1 * y0;
    }
    assert!(area * 0.5 > 0.0);
}

#[test]
fn transform_applies_at_record_time() {
    let mut ctx = Context::new(Recorder::default());
    ctx.begin_frame(800.0, 600.0, 1.0);

    ctx.translate(100.0, 0.0);
    ctx.begin_path();
    ctx.rect(0.0, 0.0, 10.0, 10.0);

    // Changing the transform after recording must not move the path.
    ctx.translate(1000.0, 1000.0);
    ctx.fill();

    let fills = ctx.renderer().fills.clone();
    let b = fills[0].bounds;
    assert_eq!((b.minx, b.miny, b.maxx, b.maxy), (100.0, 0.0, 110.0, 10.0));
}

#[test]
fn hairline_strokes_trade_width_for_alpha() {
    let mut ctx = Context::new(Recorder::default());
    ctx.begin_frame(800.0, 600.0, 1.0);

    ctx.begin_path();
    ctx.move_to(0.0, 0.0);
    ctx.line_to(10.0, 0.0);
    ctx.set_stroke_paint(Paint::color(Color::rgbaf(1.0, 1.0, 1.0, 1.0)));
    ctx.set_stroke_width(0.5);
    ctx.stroke();

    let strokes = ctx.renderer().strokes.clone();
    // Width is clamped up to one fringe and coverage moves into alpha.
    assert_eq!(strokes[0].stroke_width, 1.0);
    assert!((strokes[0].paint_alpha - 0.25).abs() < 1e-6);
}

#[test]
fn scissor_intersection_shrinks() {
    let mut ctx = Context::new(Recorder::default());
    ctx.begin_frame(800.0, 600.0, 1.0);

    ctx.scissor(0.0, 0.0, 100.0, 100.0);
    ctx.intersect_scissor(50.0, 25.0, 100.0, 100.0);

    ctx.begin_path();
    ctx.rect(0.0, 0.0, 10.0, 10.0);
    ctx.fill();

    let scissor = ctx.renderer().fills[0].scissor;

    // 50..100 x 25..100 in both: center (75, 62.5), half extent (25, 37.5).
    assert_eq!(scissor.transform[4], 75.0);
    assert_eq!(scissor.transform[5], 62.5);
    assert_eq!(scissor.extent, [25.0, 37.5]);
}
