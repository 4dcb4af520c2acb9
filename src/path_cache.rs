use std::f32::consts::PI;

use bitflags::bitflags;
use itertools::Itertools;

use crate::geometry::{self, Bounds};
use crate::renderer::Vertex;
use crate::{Command, LineCap, LineJoin, Winding};

bitflags! {
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
    struct PointFlags: u8 {
        const CORNER        = 0x01;
        const LEFT          = 0x02;
        const BEVEL         = 0x04;
        const INNERBEVEL    = 0x08;
    }
}

#[derive(Copy, Clone, Debug, Default)]
struct Point {
    x: f32,
    y: f32,
    dx: f32,
    dy: f32,
    len: f32,
    dmx: f32,
    dmy: f32,
    flags: PointFlags,
}

impl Point {
    fn poly_area(points: &[Point]) -> f32 {
        let mut area = 0.0;

        for i in 2..points.len() {
            let p0 = points[0];
            let p1 = points[i - 1];
            let p2 = points[i];

            area += geometry::triarea2(p0.x, p0.y, p1.x, p1.y, p2.x, p2.y);
        }

        area * 0.5
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum Convexity {
    #[default]
    Unknown,
    Concave,
    Convex,
}

/// One flattened subpath plus the triangle strips generated for it.
#[derive(Clone, Debug, Default)]
pub struct Contour {
    first: usize,
    count: usize,
    closed: bool,
    bevel: usize,
    fill: Vec<Vertex>,
    stroke: Vec<Vertex>,
    winding: Winding,
    convexity: Convexity,
}

impl Contour {
    /// Interior fill strip. The back-end stencils these with a fan convention,
    /// or draws them directly for convex paths.
    pub fn fill_verts(&self) -> &[Vertex] {
        &self.fill
    }

    /// Stroke strip, or the antialiasing fringe ribbon of a fill.
    pub fn stroke_verts(&self) -> &[Vertex] {
        &self.stroke
    }

    pub fn convexity(&self) -> Convexity {
        self.convexity
    }

    fn point_pairs<'a>(&self, points: &'a [Point]) -> PointPairsIter<'a> {
        PointPairsIter {
            curr: 0,
            points: &points[self.first..self.first + self.count],
        }
    }
}

/// Yields (previous, current) pairs around a closed point loop, starting with
/// (last, first).
struct PointPairsIter<'a> {
    curr: usize,
    points: &'a [Point],
}

impl<'a> Iterator for PointPairsIter<'a> {
    type Item = (&'a Point, &'a Point);

    fn next(&mut self) -> Option<Self::Item> {
        let curr = self.points.get(self.curr)?;

        let prev = if self.curr == 0 {
            self.points.last()?
        } else {
            self.points.get(self.curr - 1)?
        };

        self.curr += 1;

        Some((prev, curr))
    }
}

/// Per-frame cache of flattened subpaths and their expanded geometry.
///
/// Cleared at `begin_path`/`begin_frame`; flattening is idempotent within a
/// frame so `fill` followed by `stroke` reuses the point set.
#[derive(Default)]
pub struct PathCache {
    points: Vec<Point>,
    contours: Vec<Contour>,
    bounds: Bounds,
}

impl PathCache {
    pub fn clear(&mut self) {
        self.points.clear();
        self.contours.clear();
    }

    pub fn is_flattened(&self) -> bool {
        !self.contours.is_empty()
    }

    pub fn contours(&self) -> &[Contour] {
        &self.contours
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    fn add_contour(&mut self) {
        self.contours.push(Contour {
            first: self.points.len(),
            ..Default::default()
        });
    }

    fn add_point(&mut self, x: f32, y: f32, flags: PointFlags, dist_tol: f32) {
        let Some(contour) = self.contours.last_mut() else {
            return;
        };

        if contour.count > 0 {
            if let Some(point) = self.points.last_mut() {
                if geometry::pt_equals(point.x, point.y, x, y, dist_tol) {
                    point.flags |= flags;
                    return;
                }
            }
        }

        self.points.push(Point {
            x,
            y,
            flags,
            ..Default::default()
        });

        contour.count += 1;
    }

    #[allow(clippy::too_many_arguments)]
    fn tessellate_bezier(
        &mut self,
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        x3: f32,
        y3: f32,
        x4: f32,
        y4: f32,
        level: usize,
        flags: PointFlags,
        tess_tol: f32,
        dist_tol: f32,
    ) {
        if level > 10 {
            return;
        }

        let x12 = (x1 + x2) * 0.5;
        let y12 = (y1 + y2) * 0.5;
        let x23 = (x2 + x3) * 0.5;
        let y23 = (y2 + y3) * 0.5;
        let x34 = (x3 + x4) * 0.5;
        let y34 = (y3 + y4) * 0.5;
        let x123 = (x12 + x23) * 0.5;
        let y123 = (y12 + y23) * 0.5;

        let dx = x4 - x1;
        let dy = y4 - y1;
        let d2 = ((x2 - x4) * dy - (y2 - y4) * dx).abs();
        let d3 = ((x3 - x4) * dy - (y3 - y4) * dx).abs();

        if (d2 + d3) * (d2 + d3) < tess_tol * (dx * dx + dy * dy) {
            self.add_point(x4, y4, flags, dist_tol);
            return;
        }

        let x234 = (x23 + x34) * 0.5;
        let y234 = (y23 + y34) * 0.5;
        let x1234 = (x123 + x234) * 0.5;
        let y1234 = (y123 + y234) * 0.5;

        self.tessellate_bezier(x1, y1, x12, y12, x123, y123, x1234, y1234, level + 1, PointFlags::empty(), tess_tol, dist_tol);
        self.tessellate_bezier(x1234, y1234, x234, y234, x34, y34, x4, y4, level + 1, flags, tess_tol, dist_tol);
    }

    /// Converts the recorded commands into per-contour point polylines,
    /// enforces winding and precomputes edge directions and bounds.
    pub fn flatten(&mut self, commands: &[Command], tess_tol: f32, dist_tol: f32) {
        for cmd in commands {
            match *cmd {
                Command::MoveTo(x, y) => {
                    self.add_contour();
                    self.add_point(x, y, PointFlags::CORNER, dist_tol);
                }
                Command::LineTo(x, y) => {
                    self.add_point(x, y, PointFlags::CORNER, dist_tol);
                }
                Command::BezierTo(c1x, c1y, c2x, c2y, x, y) => {
                    if let Some(last) = self.points.last().copied() {
                        self.tessellate_bezier(last.x, last.y, c1x, c1y, c2x, c2y, x, y, 0, PointFlags::CORNER, tess_tol, dist_tol);
                    }
                }
                Command::Close => {
                    if let Some(contour) = self.contours.last_mut() {
                        contour.closed = true;
                    }
                }
                Command::Winding(winding) => {
                    if let Some(contour) = self.contours.last_mut() {
                        contour.winding = winding;
                    }
                }
            }
        }

        self.bounds = Bounds::default();

        for contour in &mut self.contours {
            let mut points = &mut self.points[contour.first..contour.first + contour.count];

            if points.is_empty() {
                continue;
            }

            // If the first and last points are the same, remove the last and mark as closed.
            let p0 = *points.last().unwrap();
            let p1 = *points.first().unwrap();

            if geometry::pt_equals(p0.x, p0.y, p1.x, p1.y, dist_tol) {
                contour.count -= 1;
                contour.closed = true;
                points = &mut self.points[contour.first..contour.first + contour.count];
            }

            // Enforce winding.
            if contour.count > 2 {
                let area = Point::poly_area(points);

                if contour.winding == Winding::CCW && area < 0.0 {
                    points.reverse();
                }

                if contour.winding == Winding::CW && area > 0.0 {
                    points.reverse();
                }
            }

            for i in 0..contour.count {
                let p1 = points[i];

                let p0 = if i == 0 {
                    points.last_mut().unwrap()
                } else {
                    &mut points[i - 1]
                };

                p0.dx = p1.x - p0.x;
                p0.dy = p1.y - p0.y;
                p0.len = geometry::normalize(&mut p0.dx, &mut p0.dy);

                self.bounds.expand(p0.x, p0.y);
            }
        }
    }

    fn calculate_joins(&mut self, w: f32, line_join: LineJoin, miter_limit: f32) {
        let iw = if w > 0.0 { 1.0 / w } else { 0.0 };

        for contour in &mut self.contours {
            let points = &mut self.points[contour.first..contour.first + contour.count];
            let mut nleft = 0;

            contour.bevel = 0;

            for i in 0..points.len() {
                let p0 = if i == 0 {
                    points[points.len() - 1]
                } else {
                    points[i - 1]
                };

                let p1 = &mut points[i];

                let dlx0 = p0.dy;
                let dly0 = -p0.dx;
                let dlx1 = p1.dy;
                let dly1 = -p1.dx;

                // Calculate extrusions
                p1.dmx = (dlx0 + dlx1) * 0.5;
                p1.dmy = (dly0 + dly1) * 0.5;
                let dmr2 = p1.dmx * p1.dmx + p1.dmy * p1.dmy;

                if dmr2 > 0.000001 {
                    let scale = (1.0 / dmr2).min(600.0);

                    p1.dmx *= scale;
                    p1.dmy *= scale;
                }

                // Clear flags, but keep the corner.
                p1.flags &= PointFlags::CORNER;

                // Keep track of left turns.
                let cross = p1.dx * p0.dy - p0.dx * p1.dy;

                if cross > 0.0 {
                    nleft += 1;
                    p1.flags |= PointFlags::LEFT;
                }

                // Calculate if we should use bevel or miter for inner join.
                let limit = (p0.len.min(p1.len) * iw).max(1.01);

                if (dmr2 * limit * limit) < 1.0 {
                    p1.flags |= PointFlags::INNERBEVEL;
                }

                // Check to see if the corner needs to be beveled.
                if p1.flags.contains(PointFlags::CORNER)
                    && ((dmr2 * miter_limit * miter_limit) < 1.0 || line_join == LineJoin::Bevel || line_join == LineJoin::Round)
                {
                    p1.flags |= PointFlags::BEVEL;
                }

                if p1.flags.intersects(PointFlags::BEVEL | PointFlags::INNERBEVEL) {
                    contour.bevel += 1;
                }
            }

            contour.convexity = if nleft == points.len() {
                Convexity::Convex
            } else {
                Convexity::Concave
            };
        }
    }

    /// Produces the interior fill strip and, when `w > 0`, the antialiasing
    /// fringe ribbon for each contour.
    pub fn expand_fill(&mut self, w: f32, line_join: LineJoin, miter_limit: f32, fringe_width: f32) {
        let has_fringe = w > 0.0;
        let aa = fringe_width;
        let woff = 0.5 * aa;

        self.calculate_joins(w, line_join, miter_limit);

        // A single convex contour can be rendered without stenciling.
        let convex = self.contours.len() == 1 && self.contours[0].convexity == Convexity::Convex;

        for contour in &mut self.contours {
            let points = &self.points[contour.first..contour.first + contour.count];

            contour.fill.clear();
            contour.stroke.clear();

            if points.is_empty() {
                continue;
            }

            if has_fringe {
                for (p0, p1) in contour.point_pairs(&self.points) {
                    if p1.flags.contains(PointFlags::BEVEL) {
                        if p1.flags.contains(PointFlags::LEFT) {
                            let lx = p1.x + p1.dmx * woff;
                            let ly = p1.y + p1.dmy * woff;
                            contour.fill.push(Vertex::new(lx, ly, 0.5, 1.0));
                        } else {
                            let lx0 = p1.x + p0.dy * woff;
                            let ly0 = p1.y - p0.dx * woff;
                            let lx1 = p1.x + p1.dy * woff;
                            let ly1 = p1.y - p1.dx * woff;
                            contour.fill.push(Vertex::new(lx0, ly0, 0.5, 1.0));
                            contour.fill.push(Vertex::new(lx1, ly1, 0.5, 1.0));
                        }
                    } else {
                        contour.fill.push(Vertex::new(p1.x + p1.dmx * woff, p1.y + p1.dmy * woff, 0.5, 1.0));
                    }
                }
            } else {
                for point in points {
                    contour.fill.push(Vertex::new(point.x, point.y, 0.5, 1.0));
                }
            }

            if has_fringe {
                let mut lw = w + woff;
                let rw = w - woff;
                let mut lu = 0.0;
                let ru = 1.0;

                // Create only half a fringe for convex shapes so that
                // the shape can be rendered without stenciling.
                if convex {
                    lw = woff; // This should generate the same vertex as fill inset above.
                    lu = 0.5; // Set outline fade at middle.
                }

                for (p0, p1) in contour.point_pairs(&self.points) {
                    if p1.flags.intersects(PointFlags::BEVEL | PointFlags::INNERBEVEL) {
                        bevel_join(&mut contour.stroke, p0, p1, lw, rw, lu, ru);
                    } else {
                        contour.stroke.push(Vertex::new(p1.x + p1.dmx * lw, p1.y + p1.dmy * lw, lu, 1.0));
                        contour.stroke.push(Vertex::new(p1.x - p1.dmx * rw, p1.y - p1.dmy * rw, ru, 1.0));
                    }
                }

                // Loop it
                let v0 = contour.stroke[0];
                let v1 = contour.stroke[1];
                contour.stroke.push(Vertex::new(v0.x, v0.y, lu, 1.0));
                contour.stroke.push(Vertex::new(v1.x, v1.y, ru, 1.0));
            }
        }
    }

    /// Produces the stroke triangle strip for each contour: opening cap,
    /// per-vertex join geometry, closing cap or loop-back.
    pub fn expand_stroke(&mut self, w: f32, fringe: f32, line_cap: LineCap, line_join: LineJoin, miter_limit: f32, tess_tol: f32) {
        let aa = fringe;
        let mut u0 = 0.0;
        let mut u1 = 1.0;
        let ncap = curve_divisions(w, PI, tess_tol) as usize;

        let w = w + aa * 0.5;

        // Disable the gradient used for antialiasing when antialiasing is not used.
        if aa == 0.0 {
            u0 = 0.5;
            u1 = 0.5;
        }

        self.calculate_joins(w, line_join, miter_limit);

        for contour in &mut self.contours {
            let points = &self.points[contour.first..contour.first + contour.count];

            contour.fill.clear();
            contour.stroke.clear();

            if points.len() < 2 {
                continue;
            }

            if contour.closed {
                for (p0, p1) in contour.point_pairs(&self.points) {
                    if p1.flags.intersects(PointFlags::BEVEL | PointFlags::INNERBEVEL) {
                        if line_join == LineJoin::Round {
                            round_join(&mut contour.stroke, p0, p1, w, w, u0, u1, ncap);
                        } else {
                            bevel_join(&mut contour.stroke, p0, p1, w, w, u0, u1);
                        }
                    } else {
                        contour.stroke.push(Vertex::new(p1.x + p1.dmx * w, p1.y + p1.dmy * w, u0, 1.0));
                        contour.stroke.push(Vertex::new(p1.x - p1.dmx * w, p1.y - p1.dmy * w, u1, 1.0));
                    }
                }

                // Loop it
                let v0 = contour.stroke[0];
                let v1 = contour.stroke[1];
                contour.stroke.push(Vertex::new(v0.x, v0.y, u0, 1.0));
                contour.stroke.push(Vertex::new(v1.x, v1.y, u1, 1.0));
            } else {
                // Add start cap
                let p0 = points[0];
                let p1 = points[1];

                let mut dx = p1.x - p0.x;
                let mut dy = p1.y - p0.y;
                geometry::normalize(&mut dx, &mut dy);

                match line_cap {
                    LineCap::Butt => butt_cap_start(&mut contour.stroke, &p0, dx, dy, w, -aa * 0.5, aa, u0, u1),
                    LineCap::Square => butt_cap_start(&mut contour.stroke, &p0, dx, dy, w, w - aa, aa, u0, u1),
                    LineCap::Round => round_cap_start(&mut contour.stroke, &p0, dx, dy, w, ncap, u0, u1),
                }

                for (p0, p1) in points[..points.len() - 1].iter().tuple_windows() {
                    if p1.flags.intersects(PointFlags::BEVEL | PointFlags::INNERBEVEL) {
                        if line_join == LineJoin::Round {
                            round_join(&mut contour.stroke, p0, p1, w, w, u0, u1, ncap);
                        } else {
                            bevel_join(&mut contour.stroke, p0, p1, w, w, u0, u1);
                        }
                    } else {
                        contour.stroke.push(Vertex::new(p1.x + p1.dmx * w, p1.y + p1.dmy * w, u0, 1.0));
                        contour.stroke.push(Vertex::new(p1.x - p1.dmx * w, p1.y - p1.dmy * w, u1, 1.0));
                    }
                }

                // Add end cap
                let p0 = points[points.len() - 2];
                let p1 = points[points.len() - 1];

                let mut dx = p1.x - p0.x;
                let mut dy = p1.y - p0.y;
                geometry::normalize(&mut dx, &mut dy);

                match line_cap {
                    LineCap::Butt => butt_cap_end(&mut contour.stroke, &p1, dx, dy, w, -aa * 0.5, aa, u0, u1),
                    LineCap::Square => butt_cap_end(&mut contour.stroke, &p1, dx, dy, w, w - aa, aa, u0, u1),
                    LineCap::Round => round_cap_end(&mut contour.stroke, &p1, dx, dy, w, ncap, u0, u1),
                }
            }
        }
    }

    /// Dumps the flattened contours via `log::debug!`.
    #[cfg(feature = "debug_inspector")]
    pub fn debug_dump(&self) {
        log::debug!("path cache: {} contours", self.contours.len());

        for (i, contour) in self.contours.iter().enumerate() {
            log::debug!(
                " - contour {}: {} points, closed: {}, convexity: {:?}, {} fill verts, {} stroke verts",
                i,
                contour.count,
                contour.closed,
                contour.convexity,
                contour.fill.len(),
                contour.stroke.len()
            );

            for point in &self.points[contour.first..contour.first + contour.count] {
                log::debug!("   {} {} [{:?}]", point.x, point.y, point.flags);
            }
        }
    }
}

fn curve_divisions(radius: f32, arc: f32, tol: f32) -> u32 {
    let da = (radius / (radius + tol)).acos() * 2.0;

    ((arc / da).ceil() as u32).max(2)
}

#[allow(clippy::too_many_arguments)]
fn butt_cap_start(verts: &mut Vec<Vertex>, point: &Point, dx: f32, dy: f32, w: f32, d: f32, aa: f32, u0: f32, u1: f32) {
    let px = point.x - dx * d;
    let py = point.y - dy * d;
    let dlx = dy;
    let dly = -dx;

    verts.push(Vertex::new(px + dlx * w - dx * aa, py + dly * w - dy * aa, u0, 0.0));
    verts.push(Vertex::new(px - dlx * w - dx * aa, py - dly * w - dy * aa, u1, 0.0));
    verts.push(Vertex::new(px + dlx * w, py + dly * w, u0, 1.0));
    verts.push(Vertex::new(px - dlx * w, py - dly * w, u1, 1.0));
}

#[allow(clippy::too_many_arguments)]
fn butt_cap_end(verts: &mut Vec<Vertex>, point: &Point, dx: f32, dy: f32, w: f32, d: f32, aa: f32, u0: f32, u1: f32) {
    let px = point.x + dx * d;
    let py = point.y + dy * d;
    let dlx = dy;
    let dly = -dx;

    verts.push(Vertex::new(px + dlx * w, py + dly * w, u0, 1.0));
    verts.push(Vertex::new(px - dlx * w, py - dly * w, u1, 1.0));
    verts.push(Vertex::new(px + dlx * w + dx * aa, py + dly * w + dy * aa, u0, 0.0));
    verts.push(Vertex::new(px - dlx * w + dx * aa, py - dly * w + dy * aa, u1, 0.0));
}

#[allow(clippy::too_many_arguments)]
fn round_cap_start(verts: &mut Vec<Vertex>, point: &Point, dx: f32, dy: f32, w: f32, ncap: usize, u0: f32, u1: f32) {
    let px = point.x;
    let py = point.y;
    let dlx = dy;
    let dly = -dx;

    for i in 0..ncap {
        let a = i as f32 / (ncap as f32 - 1.0) * PI;
        let ax = a.cos() * w;
        let ay = a.sin() * w;

        verts.push(Vertex::new(px - dlx * ax - dx * ay, py - dly * ax - dy * ay, u0, 1.0));
        verts.push(Vertex::new(px, py, 0.5, 1.0));
    }

    verts.push(Vertex::new(px + dlx * w, py + dly * w, u0, 1.0));
    verts.push(Vertex::new(px - dlx * w, py - dly * w, u1, 1.0));
}

#[allow(clippy::too_many_arguments)]
fn round_cap_end(verts: &mut Vec<Vertex>, point: &Point, dx: f32, dy: f32, w: f32, ncap: usize, u0: f32, u1: f32) {
    let px = point.x;
    let py = point.y;
    let dlx = dy;
    let dly = -dx;

    verts.push(Vertex::new(px + dlx * w, py + dly * w, u0, 1.0));
    verts.push(Vertex::new(px - dlx * w, py - dly * w, u1, 1.0));

    for i in 0..ncap {
        let a = i as f32 / (ncap as f32 - 1.0) * PI;
        let ax = a.cos() * w;
        let ay = a.sin() * w;

        verts.push(Vertex::new(px, py, 0.5, 1.0));
        verts.push(Vertex::new(px - dlx * ax + dx * ay, py - dly * ax + dy * ay, u0, 1.0));
    }
}

/// Picks the extrusion points on the inner side of a join: the two edge
/// normals for inner bevels, the miter vector otherwise.
fn choose_bevel(bevel: bool, p0: &Point, p1: &Point, w: f32) -> (f32, f32, f32, f32) {
    if bevel {
        (p1.x + p0.dy * w, p1.y - p0.dx * w, p1.x + p1.dy * w, p1.y - p1.dx * w)
    } else {
        (p1.x + p1.dmx * w, p1.y + p1.dmy * w, p1.x + p1.dmx * w, p1.y + p1.dmy * w)
    }
}

#[allow(clippy::too_many_arguments)]
fn round_join(verts: &mut Vec<Vertex>, p0: &Point, p1: &Point, lw: f32, rw: f32, lu: f32, ru: f32, ncap: usize) {
    let dlx0 = p0.dy;
    let dly0 = -p0.dx;
    let dlx1 = p1.dy;
    let dly1 = -p1.dx;

    if p1.flags.contains(PointFlags::LEFT) {
        let (lx0, ly0, lx1, ly1) = choose_bevel(p1.flags.contains(PointFlags::INNERBEVEL), p0, p1, lw);
        let a0 = (-dly0).atan2(-dlx0);
        let mut a1 = (-dly1).atan2(-dlx1);

        if a1 > a0 {
            a1 -= PI * 2.0;
        }

        verts.push(Vertex::new(lx0, ly0, lu, 1.0));
        verts.push(Vertex::new(p1.x - dlx0 * rw, p1.y - dly0 * rw, ru, 1.0));

        let n = ((((a0 - a1) / PI) * ncap as f32).ceil() as usize).clamp(2, ncap);

        for i in 0..n {
            let u = i as f32 / (n - 1) as f32;
            let a = a0 + u * (a1 - a0);
            let rx = p1.x + a.cos() * rw;
            let ry = p1.y + a.sin() * rw;

            verts.push(Vertex::new(p1.x, p1.y, 0.5, 1.0));
            verts.push(Vertex::new(rx, ry, ru, 1.0));
        }

        verts.push(Vertex::new(lx1, ly1, lu, 1.0));
        verts.push(Vertex::new(p1.x - dlx1 * rw, p1.y - dly1 * rw, ru, 1.0));
    } else {
        let (rx0, ry0, rx1, ry1) = choose_bevel(p1.flags.contains(PointFlags::INNERBEVEL), p0, p1, -rw);
        let a0 = dly0.atan2(dlx0);
        let mut a1 = dly1.atan2(dlx1);

        if a1 < a0 {
            a1 += PI * 2.0;
        }

        verts.push(Vertex::new(p1.x + dlx0 * rw, p1.y + dly0 * rw, lu, 1.0));
        verts.push(Vertex::new(rx0, ry0, ru, 1.0));

        let n = ((((a1 - a0) / PI) * ncap as f32).ceil() as usize).clamp(2, ncap);

        for i in 0..n {
            let u = i as f32 / (n - 1) as f32;
            let a = a0 + u * (a1 - a0);
            let lx = p1.x + a.cos() * lw;
            let ly = p1.y + a.sin() * lw;

            verts.push(Vertex::new(lx, ly, lu, 1.0));
            verts.push(Vertex::new(p1.x, p1.y, 0.5, 1.0));
        }

        verts.push(Vertex::new(p1.x + dlx1 * rw, p1.y + dly1 * rw, lu, 1.0));
        verts.push(Vertex::new(rx1, ry1, ru, 1.0));
    }
}

fn bevel_join(verts: &mut Vec<Vertex>, p0: &Point, p1: &Point, lw: f32, rw: f32, lu: f32, ru: f32) {
    let dlx0 = p0.dy;
    let dly0 = -p0.dx;
    let dlx1 = p1.dy;
    let dly1 = -p1.dx;

    if p1.flags.contains(PointFlags::LEFT) {
        let (lx0, ly0, lx1, ly1) = choose_bevel(p1.flags.contains(PointFlags::INNERBEVEL), p0, p1, lw);

        verts.push(Vertex::new(lx0, ly0, lu, 1.0));
        verts.push(Vertex::new(p1.x - dlx0 * rw, p1.y - dly0 * rw, ru, 1.0));

        if p1.flags.contains(PointFlags::BEVEL) {
            verts.push(Vertex::new(lx0, ly0, lu, 1.0));
            verts.push(Vertex::new(p1.x - dlx0 * rw, p1.y - dly0 * rw, ru, 1.0));

            verts.push(Vertex::new(lx1, ly1, lu, 1.0));
            verts.push(Vertex::new(p1.x - dlx1 * rw, p1.y - dly1 * rw, ru, 1.0));
        } else {
            let rx0 = p1.x - p1.dmx * rw;
            let ry0 = p1.y - p1.dmy * rw;

            verts.push(Vertex::new(p1.x, p1.y, 0.5, 1.0));
            verts.push(Vertex::new(p1.x - dlx0 * rw, p1.y - dly0 * rw, ru, 1.0));

            verts.push(Vertex::new(rx0, ry0, ru, 1.0));
            verts.push(Vertex::new(rx0, ry0, ru, 1.0));

            verts.push(Vertex::new(p1.x, p1.y, 0.5, 1.0));
            verts.push(Vertex::new(p1.x - dlx1 * rw, p1.y - dly1 * rw, ru, 1.0));
        }

        verts.push(Vertex::new(lx1, ly1, lu, 1.0));
        verts.push(Vertex::new(p1.x - dlx1 * rw, p1.y - dly1 * rw, ru, 1.0));
    } else {
        let (rx0, ry0, rx1, ry1) = choose_bevel(p1.flags.contains(PointFlags::INNERBEVEL), p0, p1, -rw);

        verts.push(Vertex::new(p1.x + dlx0 * lw, p1.y + dly0 * lw, lu, 1.0));
        verts.push(Vertex::new(rx0, ry0, ru, 1.0));

        if p1.flags.contains(PointFlags::BEVEL) {
            verts.push(Vertex::new(p1.x + dlx0 * lw, p1.y + dly0 * lw, lu, 1.0));
            verts.push(Vertex::new(rx0, ry0, ru, 1.0));

            verts.push(Vertex::new(p1.x + dlx1 * lw, p1.y + dly1 * lw, lu, 1.0));
            verts.push(Vertex::new(rx1, ry1, ru, 1.0));
        } else {
            let lx0 = p1.x + p1.dmx * lw;
            let ly0 = p1.y + p1.dmy * lw;

            verts.push(Vertex::new(p1.x + dlx0 * lw, p1.y + dly0 * lw, lu, 1.0));
            verts.push(Vertex::new(p1.x, p1.y, 0.5, 1.0));

            verts.push(Vertex::new(lx0, ly0, lu, 1.0));
            verts.push(Vertex::new(lx0, ly0, lu, 1.0));

            verts.push(Vertex::new(p1.x + dlx1 * lw, p1.y + dly1 * lw, lu, 1.0));
            verts.push(Vertex::new(p1.x, p1.y, 0.5, 1.0));
        }

        verts.push(Vertex::new(p1.x + dlx1 * lw, p1.y + dly1 * lw, lu, 1.0));
        verts.push(Vertex::new(rx1, ry1, ru, 1.0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect_commands(x: f32, y: f32, w: f32, h: f32) -> Vec<Command> {
        vec![
            Command::MoveTo(x, y),
            Command::LineTo(x, y + h),
            Command::LineTo(x + w, y + h),
            Command::LineTo(x + w, y),
            Command::Close,
        ]
    }

    #[test]
    fn rect_flattens_to_four_corner_points() {
        let mut cache = PathCache::default();
        cache.flatten(&rect_commands(10.0, 10.0, 100.0, 50.0), 0.25, 0.01);

        assert_eq!(cache.contours.len(), 1);
        assert_eq!(cache.contours[0].count, 4);
        assert!(cache.contours[0].closed);

        let bounds = cache.bounds();
        assert_eq!((bounds.minx, bounds.miny, bounds.maxx, bounds.maxy), (10.0, 10.0, 110.0, 60.0));
    }

    #[test]
    fn rect_fill_has_interior_quad_and_fringe() {
        let mut cache = PathCache::default();
        cache.flatten(&rect_commands(10.0, 10.0, 100.0, 50.0), 0.25, 0.01);
        cache.expand_fill(1.0, LineJoin::Miter, 2.4, 1.0);

        let contour = &cache.contours[0];
        assert_eq!(contour.fill.len(), 4);
        // Perimeter ribbon: a pair per point plus the loop-back pair.
        assert_eq!(contour.stroke.len(), 10);
    }

    #[test]
    fn ccw_winding_yields_positive_area() {
        // Recorded clockwise; the requested CCW winding must reverse it.
        let commands = vec![
            Command::MoveTo(0.0, 0.0),
            Command::LineTo(10.0, 0.0),
            Command::LineTo(10.0, 10.0),
            Command::LineTo(0.0, 10.0),
            Command::Close,
        ];

        let mut cache = PathCache::default();
        cache.flatten(&commands, 0.25, 0.01);

        let contour = &cache.contours[0];
        let points = &cache.points[contour.first..contour.first + contour.count];
        assert!(Point::poly_area(points) >= 0.0);
    }

    #[test]
    fn hole_winding_yields_negative_area() {
        let commands = vec![
            Command::MoveTo(0.0, 0.0),
            Command::LineTo(0.0, 10.0),
            Command::LineTo(10.0, 10.0),
            Command::LineTo(10.0, 0.0),
            Command::Close,
            Command::Winding(Winding::CW),
        ];

        let mut cache = PathCache::default();
        cache.flatten(&commands, 0.25, 0.01);

        let contour = &cache.contours[0];
        let points = &cache.points[contour.first..contour.first + contour.count];
        assert!(Point::poly_area(points) <= 0.0);
    }

    #[test]
    fn tessellated_bezier_stays_within_tolerance() {
        let tess_tol = 0.25;
        let (x1, y1) = (0.0, 0.0);
        let (x2, y2) = (30.0, 80.0);
        let (x3, y3) = (70.0, 80.0);
        let (x4, y4) = (100.0, 0.0);

        let commands = vec![Command::MoveTo(x1, y1), Command::BezierTo(x2, y2, x3, y3, x4, y4)];

        let mut cache = PathCache::default();
        cache.flatten(&commands, tess_tol, 0.01);

        let contour = &cache.contours[0];
        assert!(contour.count > 2);

        // Every emitted point must lie on the curve: compare against a dense
        // evaluation of the cubic.
        let eval = |t: f32| {
            let omt = 1.0 - t;
            let b0 = omt * omt * omt;
            let b1 = 3.0 * omt * omt * t;
            let b2 = 3.0 * omt * t * t;
            let b3 = t * t * t;
            (x1 * b0 + x2 * b1 + x3 * b2 + x4 * b3, y1 * b0 + y2 * b1 + y3 * b2 + y4 * b3)
        };

        let points = &cache.points[contour.first..contour.first + contour.count];
        for point in points {
            let mut best = f32::MAX;
            for i in 0..=1000 {
                let (ex, ey) = eval(i as f32 / 1000.0);
                let d = (ex - point.x) * (ex - point.x) + (ey - point.y) * (ey - point.y);
                best = best.min(d);
            }
            assert!(best.sqrt() < 0.5, "flattened point too far off the curve: {}", best.sqrt());
        }
    }

    #[test]
    fn self_intersecting_polygon_is_concave() {
        // star
        let commands = vec![
            Command::MoveTo(50.0, 0.0),
            Command::LineTo(21.0, 90.0),
            Command::LineTo(98.0, 35.0),
            Command::LineTo(2.0, 35.0),
            Command::LineTo(79.0, 90.0),
            Command::Close,
        ];

        let mut cache = PathCache::default();
        cache.flatten(&commands, 0.25, 0.01);
        cache.expand_fill(1.0, LineJoin::Miter, 10.0, 1.0);

        assert_eq!(cache.contours[0].convexity, Convexity::Concave);
    }

    #[test]
    fn convex_rect_enables_fast_path() {
        let mut cache = PathCache::default();
        cache.flatten(&rect_commands(0.0, 0.0, 20.0, 20.0), 0.25, 0.01);
        cache.expand_fill(1.0, LineJoin::Miter, 2.4, 1.0);

        assert_eq!(cache.contours[0].convexity, Convexity::Convex);
        // Convex fast path collapses the outer fringe u to the middle.
        assert_eq!(cache.contours[0].stroke[0].u, 0.5);
    }

    #[test]
    fn butt_stroke_of_horizontal_line_is_a_rectangle() {
        let commands = vec![Command::MoveTo(0.0, 0.0), Command::LineTo(100.0, 0.0)];

        let mut cache = PathCache::default();
        cache.flatten(&commands, 0.25, 0.01);
        cache.expand_stroke(5.0, 1.0, LineCap::Butt, LineJoin::Miter, 10.0, 0.25);

        let stroke = &cache.contours[0].stroke;
        // Two butt caps, four vertices each.
        assert_eq!(stroke.len(), 8);

        // Extremes: half width plus half a fringe each side of the centerline.
        let maxy = stroke.iter().map(|v| v.y).fold(f32::MIN, f32::max);
        let miny = stroke.iter().map(|v| v.y).fold(f32::MAX, f32::min);
        assert!((maxy - 5.5).abs() < 1e-4);
        assert!((miny + 5.5).abs() < 1e-4);

        // Fringe vertices fade out (v = 0), edge vertices are solid (v = 1).
        assert!(stroke.iter().any(|v| v.v == 0.0));
        assert!(stroke.iter().any(|v| v.v == 1.0));
    }

    #[test]
    fn square_cap_extends_past_the_endpoint() {
        let commands = vec![Command::MoveTo(0.0, 0.0), Command::LineTo(100.0, 0.0)];

        let mut cache = PathCache::default();
        cache.flatten(&commands, 0.25, 0.01);
        cache.expand_stroke(5.0, 1.0, LineCap::Square, LineJoin::Miter, 10.0, 0.25);

        let stroke = &cache.contours[0].stroke;
        let minx = stroke.iter().map(|v| v.x).fold(f32::MAX, f32::min);
        let maxx = stroke.iter().map(|v| v.x).fold(f32::MIN, f32::max);

        // Square caps shift out by w - aa before the fringe extension.
        assert!(minx < -4.0);
        assert!(maxx > 104.0);
    }

    #[test]
    fn closed_stroke_loops_back() {
        let mut cache = PathCache::default();
        cache.flatten(&rect_commands(0.0, 0.0, 50.0, 50.0), 0.25, 0.01);
        cache.expand_stroke(2.0, 1.0, LineCap::Butt, LineJoin::Miter, 10.0, 0.25);

        let stroke = &cache.contours[0].stroke;
        let n = stroke.len();
        assert!(n >= 4);
        assert_eq!((stroke[0].x, stroke[0].y), (stroke[n - 2].x, stroke[n - 2].y));
        assert_eq!((stroke[1].x, stroke[1].y), (stroke[n - 1].x, stroke[n - 1].y));
    }
}
