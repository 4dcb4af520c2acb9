//! Analytical hit-testing over the paths registered during a frame.
//!
//! Registered paths are split into x/y-monotone segments so a horizontal ray
//! crosses each segment at most once and closest-point searches converge.
//! Paths live in a 5-level implicit quadtree keyed off the frame viewport;
//! queries walk one cell per level along the query point's cell chain.

use bitflags::bitflags;
use itertools::Itertools;

use crate::geometry::{self, Bounds};
use crate::renderer::Renderer;
use crate::{Command, Context, LineCap, LineJoin, Scissor, Winding};

const PICK_EPS: f32 = 0.0001;

const QUADTREE_LEVELS: usize = 5;
// Offset of each level's first cell in the flat cell array; level l is a
// (1 << l) x (1 << l) grid.
const LEVEL_OFFSETS: [usize; QUADTREE_LEVELS] = [0, 1, 5, 21, 85];
const TOTAL_CELLS: usize = 341;

bitflags! {
    /// What a hit-test query should consider.
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    pub struct HitTestFlags: u8 {
        const TEST_FILL = 1 << 0;
        const TEST_STROKE = 1 << 1;
    }
}

impl HitTestFlags {
    pub fn all_kinds() -> Self {
        Self::TEST_FILL | Self::TEST_STROKE
    }
}

bitflags! {
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
    struct SegmentFlags: u8 {
        const CORNER        = 1 << 0;
        const BEVEL         = 1 << 1;
        const INNERBEVEL    = 1 << 2;
        const CAP           = 1 << 3;
        const ENDCAP        = 1 << 4;
    }
}

bitflags! {
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
    struct PickPathFlags: u8 {
        const FILL      = 1 << 0;
        const STROKE    = 1 << 1;
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum SegmentKind {
    Line,
    Bezier,
}

/// One x/y-monotone piece of a subpath.
#[derive(Copy, Clone, Debug)]
struct Segment {
    /// Index of the segment's start anchor in the scene point pool. A line
    /// spans 2 points from here, a bezier 4.
    first_point: usize,
    kind: SegmentKind,
    /// Flags describe the corner between the previous segment and this one.
    flags: SegmentFlags,
    bounds: Bounds,
    start_dir: [f32; 2],
    end_dir: [f32; 2],
    miter_dir: [f32; 2],
}

#[derive(Copy, Clone, Debug)]
struct PickSubPath {
    winding: Winding,
    closed: bool,
    first_segment: usize,
    nsegments: usize,
    bounds: Bounds,
    next: Option<usize>,
}

#[derive(Clone, Debug)]
struct PickPath {
    id: i32,
    flags: PickPathFlags,
    /// Insertion index; queries treat it as draw depth, topmost wins.
    order: usize,
    stroke_width: f32,
    miter_limit: f32,
    line_cap: LineCap,
    line_join: LineJoin,
    bounds: Bounds,
    scissor: Option<Scissor>,
    sub_paths: Option<usize>,
    next: Option<usize>,
    cell_next: Option<usize>,
}

/// Support vectors recorded while building stroke hulls, for visual debugging.
#[cfg(feature = "debug_inspector")]
#[derive(Default)]
pub struct PickDebug {
    pub bounds: Vec<Bounds>,
    /// (origin, origin + direction) pairs.
    pub vectors: Vec<[f32; 4]>,
}

/// The per-frame spatial index of pickable paths.
///
/// All storage is arena-style: paths, subpaths, segments and points live in
/// flat vectors and refer to each other by index, never by pointer. Clearing
/// at `begin_frame` retains the allocations for the next frame.
pub(crate) struct PickScene {
    /// Count of inserted paths this frame; doubles as the next `order`.
    npaths: usize,

    paths: Vec<PickPath>,
    sub_paths: Vec<PickSubPath>,
    points: Vec<[f32; 2]>,
    segments: Vec<Segment>,

    /// Head of the inserted-path list, most recent first.
    first_path: Option<usize>,

    xdim: f32,
    ydim: f32,

    /// Flat quadtree; each cell holds the head of a path chain linked through
    /// `PickPath::cell_next`.
    cells: Vec<Option<usize>>,

    #[cfg(feature = "debug_inspector")]
    pub debug: Option<PickDebug>,
}

impl Default for PickScene {
    fn default() -> Self {
        Self {
            npaths: 0,
            paths: Vec::new(),
            sub_paths: Vec::new(),
            points: Vec::new(),
            segments: Vec::new(),
            first_path: None,
            xdim: 1.0,
            ydim: 1.0,
            cells: vec![None; TOTAL_CELLS],
            #[cfg(feature = "debug_inspector")]
            debug: None,
        }
    }
}

struct SceneCheckpoint {
    npoints: usize,
    nsegments: usize,
    npaths: usize,
    nsub_paths: usize,
}

impl PickScene {
    pub fn begin_frame(&mut self, width: f32, height: f32) {
        self.npaths = 0;
        self.paths.clear();
        self.sub_paths.clear();
        self.points.clear();
        self.segments.clear();
        self.first_path = None;

        let lowest_sub_div = (1 << (QUADTREE_LEVELS - 1)) as f32;
        self.xdim = width / lowest_sub_div;
        self.ydim = height / lowest_sub_div;

        self.cells.fill(None);

        #[cfg(feature = "debug_inspector")]
        if let Some(debug) = &mut self.debug {
            debug.bounds.clear();
            debug.vectors.clear();
        }
    }

    fn checkpoint(&self) -> SceneCheckpoint {
        SceneCheckpoint {
            npoints: self.points.len(),
            nsegments: self.segments.len(),
            npaths: self.paths.len(),
            nsub_paths: self.sub_paths.len(),
        }
    }

    fn rollback(&mut self, checkpoint: SceneCheckpoint) {
        self.points.truncate(checkpoint.npoints);
        self.segments.truncate(checkpoint.nsegments);
        self.paths.truncate(checkpoint.npaths);
        self.sub_paths.truncate(checkpoint.nsub_paths);
    }

    fn add_points(&mut self, pts: &[[f32; 2]]) -> usize {
        let first = self.points.len();
        self.points.extend_from_slice(pts);
        first
    }

    fn segment_dir(&self, first_point: usize, kind: SegmentKind, t: f32) -> [f32; 2] {
        let points = &self.points;
        let [x0, y0] = points[first_point];
        let [x1, y1] = points[first_point + 1];

        let mut d = match kind {
            SegmentKind::Line => [x1 - x0, y1 - y0],
            SegmentKind::Bezier => {
                let [x2, y2] = points[first_point + 2];
                let [x3, y3] = points[first_point + 3];

                let omt = 1.0 - t;
                let omt2 = omt * omt;
                let t2 = t * t;

                [
                    3.0 * omt2 * (x1 - x0) + 6.0 * omt * t * (x2 - x1) + 3.0 * t2 * (x3 - x2),
                    3.0 * omt2 * (y1 - y0) + 6.0 * omt * t * (y2 - y1) + 3.0 * t2 * (y3 - y2),
                ]
            }
        };

        {
            let (d0, d1) = d.split_at_mut(1);
            geometry::normalize(&mut d0[0], &mut d1[0]);
        }
        d
    }

    fn add_segment(&mut self, sub_path: usize, first_point: usize, kind: SegmentKind, flags: SegmentFlags) {
        let start_dir = self.segment_dir(first_point, kind, 0.0);
        let end_dir = self.segment_dir(first_point, kind, 1.0);

        let index = self.segments.len();
        self.segments.push(Segment {
            first_point,
            kind,
            flags,
            bounds: Bounds::default(),
            start_dir,
            end_dir,
            miter_dir: [0.0, 0.0],
        });

        let sp = &mut self.sub_paths[sub_path];
        if sp.nsegments == 0 {
            sp.first_segment = index;
        }
        sp.nsegments += 1;
    }

    /// Clones the recorded commands into a pickable path. Cubics are split at
    /// their dx/dt = 0 and dy/dt = 0 roots so every stored segment is x- and
    /// y-monotone: a horizontal ray then intersects each at most once, and
    /// the closest-point Newton search converges reliably.
    #[allow(clippy::too_many_arguments)]
    fn add_path(
        &mut self,
        commands: &[Command],
        id: i32,
        flags: PickPathFlags,
        stroke_width: f32,
        miter_limit: f32,
        line_cap: LineCap,
        line_join: LineJoin,
        scissor: Option<Scissor>,
    ) -> usize {
        let mut start = [0.0f32; 2];
        let mut sub_path: Option<usize> = None;
        let mut prev: Option<usize> = None;

        for cmd in commands {
            match *cmd {
                Command::MoveTo(x, y) => {
                    start = [x, y];

                    // Start a new sub path for each move-to so sub paths that
                    // intersect other sub paths are handled independently.
                    prev = sub_path;
                    sub_path = Some(self.sub_paths.len());
                    self.sub_paths.push(PickSubPath {
                        winding: Winding::SOLID,
                        closed: false,
                        first_segment: 0,
                        nsegments: 0,
                        bounds: Bounds::default(),
                        next: prev,
                    });

                    self.add_points(&[start]);
                }
                Command::LineTo(x, y) => {
                    let Some(sp) = sub_path else { continue };

                    let first_point = self.add_points(&[[x, y]]);
                    self.add_segment(sp, first_point - 1, SegmentKind::Line, SegmentFlags::CORNER);
                }
                Command::BezierTo(c1x, c1y, c2x, c2y, x, y) => {
                    let Some(sp) = sub_path else { continue };

                    let last = *self.points.last().unwrap();
                    let mut pts = [last, [c1x, c1y], [c2x, c2y], [x, y]];

                    let mut inflections = [0.0f32; 4];
                    let mut ninflections = 0;
                    bezier_inflections(&pts, 1, &mut inflections, &mut ninflections);
                    bezier_inflections(&pts, 0, &mut inflections, &mut ninflections);

                    if ninflections > 0 {
                        inflections[..ninflections].sort_unstable_by(|a, b| a.partial_cmp(b).unwrap());

                        let mut prev_infl = 0.0;

                        for (index, &infl) in inflections[..ninflections].iter().enumerate() {
                            if (infl - prev_infl).abs() < PICK_EPS {
                                continue;
                            }

                            let t = (infl - prev_infl) * (1.0 / (1.0 - prev_infl));
                            prev_infl = infl;

                            let (a, b) = split_bezier(&pts, t);

                            let first_point = self.add_points(&a[1..]);
                            let flags = if index == 0 { SegmentFlags::CORNER } else { SegmentFlags::empty() };
                            self.add_segment(sp, first_point - 1, SegmentKind::Bezier, flags);

                            pts = b;
                        }

                        let first_point = self.add_points(&pts[1..]);
                        self.add_segment(sp, first_point - 1, SegmentKind::Bezier, SegmentFlags::empty());
                    } else {
                        let first_point = self.add_points(&pts[1..]);
                        self.add_segment(sp, first_point - 1, SegmentKind::Bezier, SegmentFlags::CORNER);
                    }
                }
                Command::Close => {
                    let Some(sp) = sub_path else { continue };

                    if *self.points.last().unwrap() != start {
                        let first_point = self.add_points(&[start]);
                        self.add_segment(sp, first_point - 1, SegmentKind::Line, SegmentFlags::CORNER);
                    }

                    self.sub_paths[sp].closed = true;
                }
                Command::Winding(winding) => {
                    if let Some(sp) = sub_path {
                        self.sub_paths[sp].winding = winding;
                    }
                }
            }
        }

        let mut total_bounds = Bounds::default();

        let mut current = sub_path;
        while let Some(sp) = current {
            if flags.contains(PickPathFlags::STROKE) {
                self.add_stroke_supports(sp, stroke_width, line_cap, line_join, miter_limit);
            } else {
                self.add_fill_supports(sp);
            }

            let (first_segment, nsegments) = {
                let s = &self.sub_paths[sp];
                (s.first_segment, s.nsegments)
            };

            let mut bounds = Bounds::default();
            for seg in &self.segments[first_segment..first_segment + nsegments] {
                bounds.union(&seg.bounds);

                #[cfg(feature = "debug_inspector")]
                if let Some(debug) = &mut self.debug {
                    debug.bounds.push(seg.bounds);
                }
            }

            self.sub_paths[sp].bounds = bounds;
            total_bounds.union(&bounds);

            current = self.sub_paths[sp].next;
        }

        let index = self.paths.len();
        self.paths.push(PickPath {
            id,
            flags,
            order: 0,
            stroke_width,
            miter_limit,
            line_cap,
            line_join,
            bounds: total_bounds,
            scissor,
            sub_paths: sub_path,
            next: None,
            cell_next: None,
        });

        index
    }

    /// Per-segment bounds for fill testing: exact for lines, analytic for
    /// cubics (endpoints plus derivative-root evaluations).
    fn add_fill_supports(&mut self, sub_path: usize) {
        let sp = self.sub_paths[sub_path];

        for seg in &mut self.segments[sp.first_segment..sp.first_segment + sp.nsegments] {
            match seg.kind {
                SegmentKind::Line => {
                    let mut bounds = Bounds::default();
                    let [x0, y0] = self.points[seg.first_point];
                    let [x1, y1] = self.points[seg.first_point + 1];
                    bounds.expand(x0, y0);
                    bounds.expand(x1, y1);
                    seg.bounds = bounds;
                }
                SegmentKind::Bezier => {
                    let pts = [
                        self.points[seg.first_point],
                        self.points[seg.first_point + 1],
                        self.points[seg.first_point + 2],
                        self.points[seg.first_point + 3],
                    ];
                    seg.bounds = bezier_bounds(&pts);
                }
            }
        }
    }

    /// Per-segment overestimating hulls for stroke testing: offset endpoints
    /// along the start/end normals, corner and miter supports, and extra cap
    /// supports for square and round caps.
    fn add_stroke_supports(&mut self, sub_path: usize, stroke_width: f32, line_cap: LineCap, line_join: LineJoin, miter_limit: f32) {
        let sp = self.sub_paths[sub_path];

        if sp.nsegments == 0 {
            return;
        }

        let first = sp.first_segment;
        let last = first + sp.nsegments - 1;

        if !sp.closed {
            self.segments[first].flags |= SegmentFlags::CAP;
            self.segments[last].flags |= SegmentFlags::ENDCAP;
        }

        let mut prev_seg: Option<Segment> = sp.closed.then(|| self.segments[last]);

        for s in first..=last {
            // Support points overestimate the region the stroked segment covers.
            let mut supports = [[0.0f32; 2]; 16];
            let mut ns = 0;

            let seg = self.segments[s];
            let first_point = self.points[seg.first_point];
            let last_point = self.points[seg.first_point + if seg.kind == SegmentKind::Line { 1 } else { 3 }];

            // Either side of the start point
            supports[ns] = [
                first_point[0] - seg.start_dir[1] * stroke_width,
                first_point[1] + seg.start_dir[0] * stroke_width,
            ];
            ns += 1;
            supports[ns] = [
                first_point[0] + seg.start_dir[1] * stroke_width,
                first_point[1] - seg.start_dir[0] * stroke_width,
            ];
            ns += 1;

            // Either side of the end point
            supports[ns] = [
                last_point[0] - seg.end_dir[1] * stroke_width,
                last_point[1] + seg.end_dir[0] * stroke_width,
            ];
            ns += 1;
            supports[ns] = [
                last_point[0] + seg.end_dir[1] * stroke_width,
                last_point[1] - seg.end_dir[0] * stroke_width,
            ];
            ns += 1;

            let mut flags = seg.flags;
            let mut miter_dir = seg.miter_dir;

            if flags.contains(SegmentFlags::CORNER) {
                if let Some(prev) = prev_seg {
                    miter_dir = [
                        0.5 * (-prev.end_dir[1] - seg.start_dir[1]),
                        0.5 * (prev.end_dir[0] + seg.start_dir[0]),
                    ];

                    let m2 = miter_dir[0] * miter_dir[0] + miter_dir[1] * miter_dir[1];

                    if m2 > 0.000001 {
                        let scale = (1.0 / m2).min(600.0);
                        miter_dir[0] *= scale;
                        miter_dir[1] *= scale;
                    }

                    #[cfg(feature = "debug_inspector")]
                    if let Some(debug) = &mut self.debug {
                        debug.vectors.push([
                            first_point[0],
                            first_point[1],
                            first_point[0] + miter_dir[0] * 10.0,
                            first_point[1] + miter_dir[1] * 10.0,
                        ]);
                    }

                    // An additional support at the corner on the other line
                    supports[ns] = [
                        first_point[0] - prev.end_dir[1] * stroke_width,
                        first_point[1] + prev.end_dir[0] * stroke_width,
                    ];
                    ns += 1;

                    match line_join {
                        LineJoin::Miter | LineJoin::Bevel => {
                            // The corner is beveled when the join type says so or
                            // when the miter limit is hit.
                            if line_join == LineJoin::Bevel || (m2 * miter_limit * miter_limit) < 1.0 {
                                flags |= SegmentFlags::BEVEL;
                            } else {
                                // Corner is mitered - add the miter point as a support
                                supports[ns] = [
                                    first_point[0] + miter_dir[0] * stroke_width,
                                    first_point[1] + miter_dir[1] * stroke_width,
                                ];
                                ns += 1;
                            }
                        }
                        LineJoin::Round => {
                            // ... and at the midpoint of the corner arc
                            let mut vertex_n = [-seg.start_dir[0] + prev.end_dir[0], -seg.start_dir[1] + prev.end_dir[1]];
                            {
                                let (vn0, vn1) = vertex_n.split_at_mut(1);
                                geometry::normalize(&mut vn0[0], &mut vn1[0]);
                            }

                            supports[ns] = [
                                first_point[0] + vertex_n[0] * stroke_width,
                                first_point[1] + vertex_n[1] * stroke_width,
                            ];
                            ns += 1;
                        }
                    }
                }
            }

            if flags.contains(SegmentFlags::CAP) {
                match line_cap {
                    LineCap::Butt => {
                        // Supports for butt already added.
                    }
                    LineCap::Square => {
                        // Square cap supports are the start supports moved out along the direction
                        supports[ns] = [
                            supports[0][0] - seg.start_dir[0] * stroke_width,
                            supports[0][1] - seg.start_dir[1] * stroke_width,
                        ];
                        ns += 1;
                        supports[ns] = [
                            supports[1][0] - seg.start_dir[0] * stroke_width,
                            supports[1][1] - seg.start_dir[1] * stroke_width,
                        ];
                        ns += 1;
                    }
                    LineCap::Round => {
                        // One additional support for the round cap along the direction
                        supports[ns] = [
                            first_point[0] - seg.start_dir[0] * stroke_width,
                            first_point[1] - seg.start_dir[1] * stroke_width,
                        ];
                        ns += 1;
                    }
                }
            }

            if flags.contains(SegmentFlags::ENDCAP) {
                match line_cap {
                    LineCap::Butt => {
                        // Supports for butt already added.
                    }
                    LineCap::Square => {
                        supports[ns] = [
                            supports[2][0] + seg.end_dir[0] * stroke_width,
                            supports[2][1] + seg.end_dir[1] * stroke_width,
                        ];
                        ns += 1;
                        supports[ns] = [
                            supports[3][0] + seg.end_dir[0] * stroke_width,
                            supports[3][1] + seg.end_dir[1] * stroke_width,
                        ];
                        ns += 1;
                    }
                    LineCap::Round => {
                        supports[ns] = [
                            last_point[0] + seg.end_dir[0] * stroke_width,
                            last_point[1] + seg.end_dir[1] * stroke_width,
                        ];
                        ns += 1;
                    }
                }
            }

            let mut bounds = Bounds::default();
            for support in &supports[..ns] {
                bounds.expand(support[0], support[1]);
            }

            let seg = &mut self.segments[s];
            seg.bounds = bounds;
            seg.flags = flags;
            seg.miter_dir = miter_dir;

            prev_seg = Some(*seg);
        }
    }

    /// Inserts a path into the quadtree at the deepest level whose cells
    /// fully contain its bounds, found from the XOR of the min/max cell
    /// coordinates.
    fn insert(&mut self, path_index: usize) {
        let bounds = self.paths[path_index].bounds;
        let base = QUADTREE_LEVELS as i32 - 1;

        // Bounds of the path in cells at the lowest level
        let cell_minx = (bounds.minx / self.xdim) as i32;
        let cell_miny = (bounds.miny / self.ydim) as i32;
        let cell_maxx = (bounds.maxx / self.xdim) as i32;
        let cell_maxy = (bounds.maxy / self.ydim) as i32;

        // The highest differing bit between the min/max coordinates gives the
        // level at which the bounds fit in a single cell.
        let xor_x = cell_minx ^ cell_maxx;
        let xor_y = cell_miny ^ cell_maxy;

        let level = (base - bits_used(xor_x)).min(base - bits_used(xor_y)).max(0) as usize;

        // Find the correct cell in the chosen level, clamping to the edges.
        let level_width = 1i32 << level;
        let level_shift = (QUADTREE_LEVELS - level) - 1;
        let level_x = (cell_maxx >> level_shift).clamp(0, level_width - 1) as usize;
        let level_y = (cell_maxy >> level_shift).clamp(0, level_width - 1) as usize;

        let cell = LEVEL_OFFSETS[level] + level_y * level_width as usize + level_x;

        self.paths[path_index].cell_next = self.cells[cell];
        self.cells[cell] = Some(path_index);

        self.paths[path_index].next = self.first_path;
        self.first_path = Some(path_index);

        // Store the order (depth) of the path for picking ops.
        self.paths[path_index].order = self.npaths;
        self.npaths += 1;
    }

    /// Even-odd ray cast of one subpath. Returns +1 when (x,y) is inside and
    /// the subpath is solid, -1 when inside a hole, 0 outside.
    fn pick_sub_path(&self, sp: &PickSubPath, x: f32, y: f32) -> i32 {
        if !sp.bounds.contains(x, y) {
            return 0;
        }

        // Trace a line from (x,y) out along the positive x axis and count the
        // number of intersections.
        let mut nintersections = 0;

        for seg in &self.segments[sp.first_segment..sp.first_segment + sp.nsegments] {
            if (seg.bounds.miny - PICK_EPS) < y && (seg.bounds.maxy - PICK_EPS) > y && seg.bounds.maxx > x {
                // The ray hits the segment's box.
                if seg.bounds.minx > x {
                    // The segment is entirely to the right: monotone segments
                    // spanning y cross the ray exactly once.
                    nintersections += 1;
                } else {
                    nintersections += match seg.kind {
                        SegmentKind::Line => intersect_line(&self.points[seg.first_point..], x, y),
                        SegmentKind::Bezier => intersect_bezier(&self.points[seg.first_point..], x, y),
                    };
                }
            }
        }

        if nintersections % 2 == 1 {
            if sp.winding == Winding::SOLID {
                1
            } else {
                -1
            }
        } else {
            0
        }
    }

    /// Whether (x,y) lies within `stroke_width` of one subpath, honoring cap
    /// and join semantics at parameter extremes.
    fn pick_sub_path_stroke(&self, sp: &PickSubPath, x: f32, y: f32, stroke_width: f32, line_cap: LineCap, line_join: LineJoin) -> bool {
        if !sp.bounds.contains(x, y) {
            return false;
        }

        let nsegments = sp.nsegments;
        let stroke_width_sqd = stroke_width * stroke_width;

        let mut prev_index = sp.closed.then(|| sp.first_segment + nsegments - 1);

        for s in sp.first_segment..sp.first_segment + nsegments {
            let seg = &self.segments[s];

            if seg.bounds.contains(x, y) {
                // Closest point on the segment to the query.
                let (closest, t) = match seg.kind {
                    SegmentKind::Line => closest_line(&self.points[seg.first_point..], x, y),
                    SegmentKind::Bezier => closest_bezier(&self.points[seg.first_point..], x, y),
                };

                let d = [x - closest[0], y - closest[1]];

                if (t >= PICK_EPS && t <= 1.0 - PICK_EPS)
                    || !seg.flags.intersects(SegmentFlags::CORNER | SegmentFlags::CAP | SegmentFlags::ENDCAP)
                    || line_join == LineJoin::Round
                {
                    // Closest point is in the middle of the segment, at a
                    // rounded join/cap or at a smooth join.
                    let dist_sqd = d[0] * d[0] + d[1] * d[1];
                    if dist_sqd < stroke_width_sqd {
                        return true;
                    }
                } else if (t > (1.0 - PICK_EPS) && seg.flags.contains(SegmentFlags::ENDCAP))
                    || (t < PICK_EPS && seg.flags.contains(SegmentFlags::CAP))
                {
                    match line_cap {
                        LineCap::Butt => {
                            // Inside the stroke and strictly on the inner side
                            // of the cap plane; butt caps extend no further.
                            let dist_sqd = d[0] * d[0] + d[1] * d[1];
                            let dir_d = if t < PICK_EPS {
                                -(d[0] * seg.start_dir[0] + d[1] * seg.start_dir[1])
                            } else {
                                d[0] * seg.end_dir[0] + d[1] * seg.end_dir[1]
                            };

                            if dir_d < -PICK_EPS && dist_sqd < stroke_width_sqd {
                                return true;
                            }
                        }
                        LineCap::Square => {
                            if d[0].abs() < stroke_width && d[1].abs() < stroke_width {
                                return true;
                            }
                        }
                        LineCap::Round => {
                            let dist_sqd = d[0] * d[0] + d[1] * d[1];
                            if dist_sqd < stroke_width_sqd {
                                return true;
                            }
                        }
                    }
                } else if seg.flags.contains(SegmentFlags::CORNER) {
                    // Closest point is at a corner between two segments.
                    let (seg0, seg1) = if t < PICK_EPS {
                        let Some(prev) = prev_index else { continue };
                        (&self.segments[prev], seg)
                    } else {
                        let next = if s == sp.first_segment + nsegments - 1 {
                            sp.first_segment
                        } else {
                            s + 1
                        };
                        (seg, &self.segments[next])
                    };

                    if !seg1.flags.contains(SegmentFlags::BEVEL) {
                        // Miter or inner corner: two perpendicular half-slab
                        // tests against the adjacent segment directions.
                        let prev_n_dist = -seg0.end_dir[1] * d[0] + seg0.end_dir[0] * d[1];
                        let cur_n_dist = seg1.start_dir[1] * d[0] - seg1.start_dir[0] * d[1];

                        if prev_n_dist.abs() < stroke_width && cur_n_dist.abs() < stroke_width {
                            return true;
                        }
                    } else {
                        // Beveled corner: the half-plane behind the miter direction.
                        let dx = d[0] - -seg1.start_dir[1] * stroke_width;
                        let dy = d[1] - seg1.start_dir[0] * stroke_width;

                        if seg1.miter_dir[0] * dx + seg1.miter_dir[1] * dy < 0.0 {
                            return true;
                        }
                    }
                }
            }

            prev_index = Some(s);
        }

        false
    }

    /// Nonzero-style fill test: subpath contributions cancel between solid
    /// and hole windings.
    fn pick_path(&self, path: &PickPath, x: f32, y: f32) -> bool {
        let mut pick_count = 0;
        let mut sub_path = path.sub_paths;

        while let Some(sp) = sub_path {
            let sp = &self.sub_paths[sp];
            pick_count += self.pick_sub_path(sp, x, y);
            sub_path = sp.next;
        }

        pick_count != 0
    }

    fn pick_path_stroke(&self, path: &PickPath, x: f32, y: f32) -> bool {
        let mut sub_path = path.sub_paths;

        while let Some(sp) = sub_path {
            let sp = &self.sub_paths[sp];

            if self.pick_sub_path_stroke(sp, x, y, path.stroke_width, path.line_cap, path.line_join) {
                return true;
            }

            sub_path = sp.next;
        }

        false
    }

    fn test_bounds(&self, path: &PickPath, x: f32, y: f32) -> bool {
        if !path.bounds.contains(x, y) {
            return false;
        }

        if let Some(scissor) = &path.scissor {
            let t = scissor.transform;
            let rx = x - t[4];
            let ry = y - t[5];

            if (t[0] * rx + t[1] * ry).abs() > scissor.extent[0] || (t[2] * rx + t[3] * ry).abs() > scissor.extent[1] {
                return false;
            }
        }

        true
    }

    fn test_path(&self, path: &PickPath, x: f32, y: f32, flags: HitTestFlags) -> bool {
        if flags.contains(HitTestFlags::TEST_STROKE) && path.flags.contains(PickPathFlags::STROKE) && self.pick_path_stroke(path, x, y) {
            return true;
        }

        flags.contains(HitTestFlags::TEST_FILL) && path.flags.contains(PickPathFlags::FILL) && self.pick_path(path, x, y)
    }

    /// Visits every path whose quadtree cell chain covers (x,y), topmost
    /// level first.
    fn for_each_candidate<F: FnMut(&PickPath)>(&self, x: f32, y: f32, mut f: F) {
        let level_width = 1i32 << (QUADTREE_LEVELS - 1);
        let mut cell_x = ((x / self.xdim) as i32).clamp(0, level_width - 1);
        let mut cell_y = ((y / self.ydim) as i32).clamp(0, level_width - 1);

        for level in (0..QUADTREE_LEVELS).rev() {
            let width = 1usize << level;
            let mut path = self.cells[LEVEL_OFFSETS[level] + cell_y as usize * width + cell_x as usize];

            while let Some(index) = path {
                let p = &self.paths[index];
                f(p);
                path = p.cell_next;
            }

            cell_x >>= 1;
            cell_y >>= 1;
        }
    }

    fn hit_test(&self, x: f32, y: f32, flags: HitTestFlags) -> Option<i32> {
        let mut best: Option<(usize, i32)> = None;

        self.for_each_candidate(x, y, |path| {
            if self.test_bounds(path, x, y) && self.test_path(path, x, y, flags) && best.map_or(true, |(order, _)| path.order > order) {
                best = Some((path.order, path.id));
            }
        });

        best.map(|(_, id)| id)
    }

    fn hit_test_all(&self, x: f32, y: f32, flags: HitTestFlags, max_ids: usize) -> Vec<i32> {
        let mut picked: Vec<(usize, i32)> = Vec::new();

        self.for_each_candidate(x, y, |path| {
            if self.test_bounds(path, x, y) && self.test_path(path, x, y, flags) {
                picked.push((path.order, path.id));
            }
        });

        picked
            .into_iter()
            .sorted_by(|a, b| b.0.cmp(&a.0))
            .take(max_ids)
            .map(|(_, id)| id)
            .collect()
    }
}

fn bits_used(v: i32) -> i32 {
    32 - v.leading_zeros() as i32
}

/// Appends the roots of d(coord)/dt in the open interval (0, 1) to
/// `inflections`.
fn bezier_inflections(points: &[[f32; 2]; 4], coord: usize, inflections: &mut [f32; 4], ninflections: &mut usize) {
    let v0 = points[0][coord];
    let v1 = points[1][coord];
    let v2 = points[2][coord];
    let v3 = points[3][coord];

    let a = 3.0 * (-v0 + 3.0 * v1 - 3.0 * v2 + v3);
    let b = 6.0 * (v0 - 2.0 * v1 + v2);
    let c = 3.0 * (v1 - v0);

    let mut nvalid = *ninflections;

    let mut push = |t: f32, nvalid: &mut usize| {
        if t > PICK_EPS && t < 1.0 - PICK_EPS && *nvalid < inflections.len() {
            inflections[*nvalid] = t;
            *nvalid += 1;
        }
    };

    if a.abs() < PICK_EPS {
        // The derivative degenerates to a line with a single root.
        if b.abs() > PICK_EPS {
            push(-c / b, &mut nvalid);
        }
    } else {
        let d = b * b - 4.0 * a * c;

        if d.abs() < PICK_EPS {
            // One (double) root
            push(-b / (2.0 * a), &mut nvalid);
        } else if d > PICK_EPS {
            // Two roots
            let d = d.sqrt();
            push((-b + d) / (2.0 * a), &mut nvalid);
            push((-b - d) / (2.0 * a), &mut nvalid);
        }
    }

    *ninflections = nvalid;
}

/// Evaluates a cubic bezier at t.
fn bezier_eval(points: &[[f32; 2]; 4], t: f32) -> [f32; 2] {
    let omt = 1.0 - t;
    let omt3 = omt * omt * omt;
    let omt2 = omt * omt;
    let t3 = t * t * t;
    let t2 = t * t;

    [
        points[0][0] * omt3 + points[1][0] * 3.0 * omt2 * t + points[2][0] * 3.0 * omt * t2 + points[3][0] * t3,
        points[0][1] * omt3 + points[1][1] * 3.0 * omt2 * t + points[2][1] * 3.0 * omt * t2 + points[3][1] * t3,
    ]
}

/// Splits a cubic bezier at t with de Casteljau's algorithm.
fn split_bezier(points: &[[f32; 2]; 4], t: f32) -> ([[f32; 2]; 4], [[f32; 2]; 4]) {
    let lerp = |a: [f32; 2], b: [f32; 2]| [(b[0] - a[0]) * t + a[0], (b[1] - a[1]) * t + a[1]];

    let lvl1 = [lerp(points[0], points[1]), lerp(points[1], points[2]), lerp(points[2], points[3])];
    let lvl2 = [lerp(lvl1[0], lvl1[1]), lerp(lvl1[1], lvl1[2])];
    let lvl3 = lerp(lvl2[0], lvl2[1]);

    (
        [points[0], lvl1[0], lvl2[0], lvl3],
        [lvl3, lvl2[1], lvl1[2], points[3]],
    )
}

/// Analytic bounds of a cubic bezier: endpoints plus evaluations at every
/// derivative root.
fn bezier_bounds(points: &[[f32; 2]; 4]) -> Bounds {
    let mut bounds = Bounds::default();
    bounds.expand(points[0][0], points[0][1]);
    bounds.expand(points[3][0], points[3][1]);

    let mut inflections = [0.0f32; 4];
    let mut ninflections = 0;
    bezier_inflections(points, 0, &mut inflections, &mut ninflections);
    bezier_inflections(points, 1, &mut inflections, &mut ninflections);

    for &t in &inflections[..ninflections] {
        let p = bezier_eval(points, t);
        bounds.expand(p[0], p[1]);
    }

    bounds
}

/// Whether a ray from (x,y) along +x crosses the line
/// (points[0]) -> (points[1]). Horizontal lines are never hit.
fn intersect_line(points: &[[f32; 2]], x: f32, y: f32) -> i32 {
    let [x1, y1] = points[0];
    let [x2, y2] = points[1];

    let d = y2 - y1;

    if d > PICK_EPS || d < -PICK_EPS {
        let s = (x2 - x1) / d;
        let line_x = x1 + (y - y1) * s;
        (line_x > x) as i32
    } else {
        0
    }
}

/// Whether a ray from (x,y) along +x crosses the given y-monotone cubic.
/// Newton-refines the crossing parameter from a linear first guess.
fn intersect_bezier(points: &[[f32; 2]], x: f32, y: f32) -> i32 {
    let [x0, y0] = points[0];
    let [x1, y1] = points[1];
    let [x2, y2] = points[2];
    let [x3, y3] = points[3];

    if y0 == y1 && y1 == y2 && y2 == y3 {
        return 0;
    }

    // Initial t guess
    let mut t = if y3 != y0 {
        (y - y0) / (y3 - y0)
    } else if x3 != x0 {
        (x - x0) / (x3 - x0)
    } else {
        0.5
    };

    // A few Newton iterations
    for _ in 0..6 {
        let omt = 1.0 - t;
        let omt2 = omt * omt;
        let t2 = t * t;
        let omt3 = omt2 * omt;
        let t3 = t2 * t;

        let ty = y0 * omt3 + y1 * 3.0 * omt2 * t + y2 * 3.0 * omt * t2 + y3 * t3;

        let dty = 3.0 * omt2 * (y1 - y0) + 6.0 * omt * t * (y2 - y1) + 3.0 * t2 * (y3 - y2);

        // dty is never zero: either omt2 or t2 is nonzero and the curve is
        // y-monotone and non-degenerate (checked above).
        t -= (ty - y) / dty;
    }

    let omt = 1.0 - t;
    let omt2 = omt * omt;
    let t2 = t * t;
    let omt3 = omt2 * omt;
    let t3 = t2 * t;

    let tx = x0 * omt3 + x1 * 3.0 * omt2 * t + x2 * 3.0 * omt * t2 + x3 * t3;

    (tx > x) as i32
}

/// Closest point on a line segment, with its clamped parameter.
fn closest_line(points: &[[f32; 2]], x: f32, y: f32) -> ([f32; 2], f32) {
    let [x1, y1] = points[0];
    let [x2, y2] = points[1];

    let pqx = x2 - x1;
    let pqy = y2 - y1;
    let dx = x - x1;
    let dy = y - y1;
    let d = pqx * pqx + pqy * pqy;
    let mut t = pqx * dx + pqy * dy;

    if d > 0.0 {
        t /= d;
    }

    t = t.clamp(0.0, 1.0);

    ([x1 + t * pqx, y1 + t * pqy], t)
}

/// Closest point on an x/y-monotone cubic, found by Newton iteration on the
/// perpendicularity condition (p(t) - q) . p'(t) = 0.
fn closest_bezier(points: &[[f32; 2]], x: f32, y: f32) -> ([f32; 2], f32) {
    let [x0, y0] = points[0];
    let [x1, y1] = points[1];
    let [x2, y2] = points[2];
    let [x3, y3] = points[3];

    let mut t = 0.5;

    for _ in 0..6 {
        let omt = 1.0 - t;
        let omt2 = omt * omt;
        let t2 = t * t;
        let omt3 = omt2 * omt;
        let t3 = t2 * t;

        let ty = y0 * omt3 + y1 * 3.0 * omt2 * t + y2 * 3.0 * omt * t2 + y3 * t3;
        let tx = x0 * omt3 + x1 * 3.0 * omt2 * t + x2 * 3.0 * omt * t2 + x3 * t3;

        let dty = 3.0 * omt2 * (y1 - y0) + 6.0 * omt * t * (y2 - y1) + 3.0 * t2 * (y3 - y2);
        let ddty = 6.0 * omt * (y2 - 2.0 * y1 + y0) + 6.0 * t * (y3 - 2.0 * y2 + y1);
        let dtx = 3.0 * omt2 * (x1 - x0) + 6.0 * omt * t * (x2 - x1) + 3.0 * t2 * (x3 - x2);
        let ddtx = 6.0 * omt * (x2 - 2.0 * x1 + x0) + 6.0 * t * (x3 - 2.0 * x2 + x1);

        let errorx = tx - x;
        let errory = ty - y;

        let n = errorx * dtx + errory * dty;
        if n == 0.0 {
            break;
        }

        let d = dtx * dtx + dty * dty + errorx * ddtx + errory * ddty;
        if d != 0.0 {
            t -= n / d;
        } else {
            break;
        }
    }

    t = t.clamp(0.0, 1.0);

    let omt = 1.0 - t;
    let omt2 = omt * omt;
    let t2 = t * t;
    let omt3 = omt2 * omt;
    let t3 = t2 * t;

    let ty = y0 * omt3 + y1 * 3.0 * omt2 * t + y2 * 3.0 * omt * t2 + y3 * t3;
    let tx = x0 * omt3 + x1 * 3.0 * omt2 * t + x2 * 3.0 * omt * t2 + x3 * t3;

    ([tx, ty], t)
}

impl<R: Renderer> Context<R> {
    /// Marks the fill of the current path as pickable with the specified id.
    pub fn fill_hit_region(&mut self, id: i32) {
        let (stroke_width, miter_limit, line_cap, line_join, scissor) = self.pick_state();

        let index = self
            .pick_scene
            .add_path(&self.commands, id, PickPathFlags::FILL, stroke_width, miter_limit, line_cap, line_join, scissor);

        self.pick_scene.insert(index);
    }

    /// Marks the stroke of the current path as pickable with the specified id.
    pub fn stroke_hit_region(&mut self, id: i32) {
        let (stroke_width, miter_limit, line_cap, line_join, scissor) = self.pick_state();

        let index = self
            .pick_scene
            .add_path(&self.commands, id, PickPathFlags::STROKE, stroke_width, miter_limit, line_cap, line_join, scissor);

        self.pick_scene.insert(index);
    }

    /// Tests whether (x,y), in device space, is inside the fill of the
    /// current (unregistered) path.
    pub fn in_fill(&mut self, x: f32, y: f32) -> bool {
        let (stroke_width, miter_limit, line_cap, line_join, scissor) = self.pick_state();

        let checkpoint = self.pick_scene.checkpoint();

        let index = self
            .pick_scene
            .add_path(&self.commands, 1, PickPathFlags::FILL, stroke_width, miter_limit, line_cap, line_join, scissor);

        let path = self.pick_scene.paths[index].clone();
        let hit = path.bounds.contains(x, y) && self.pick_scene.pick_path(&path, x, y);

        self.pick_scene.rollback(checkpoint);

        hit
    }

    /// Tests whether (x,y), in device space, is inside the stroke of the
    /// current (unregistered) path.
    pub fn in_stroke(&mut self, x: f32, y: f32) -> bool {
        let (stroke_width, miter_limit, line_cap, line_join, scissor) = self.pick_state();

        let checkpoint = self.pick_scene.checkpoint();

        let index = self
            .pick_scene
            .add_path(&self.commands, 1, PickPathFlags::STROKE, stroke_width, miter_limit, line_cap, line_join, scissor);

        let path = self.pick_scene.paths[index].clone();
        let hit = path.bounds.contains(x, y) && self.pick_scene.pick_path_stroke(&path, x, y);

        self.pick_scene.rollback(checkpoint);

        hit
    }

    /// Returns the id of the topmost registered path containing (x,y), or
    /// `None` when nothing is hit.
    pub fn hit_test(&self, x: f32, y: f32, flags: HitTestFlags) -> Option<i32> {
        self.pick_scene.hit_test(x, y, flags)
    }

    /// Returns the ids of up to `max_ids` topmost registered paths
    /// containing (x,y), topmost first.
    pub fn hit_test_all(&self, x: f32, y: f32, flags: HitTestFlags, max_ids: usize) -> Vec<i32> {
        self.pick_scene.hit_test_all(x, y, flags, max_ids)
    }

    fn pick_state(&self) -> (f32, f32, LineCap, LineJoin, Option<Scissor>) {
        let state = self.state();

        let scissor = (state.scissor.extent[0] >= 0.0).then_some(state.scissor);

        (
            state.stroke_width * 0.5,
            state.miter_limit,
            state.line_cap,
            state.line_join,
            scissor,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_bezier_preserves_endpoints() {
        let pts = [[0.0, 0.0], [10.0, 20.0], [30.0, 20.0], [40.0, 0.0]];
        let (a, b) = split_bezier(&pts, 0.3);

        assert_eq!(a[0], pts[0]);
        assert_eq!(b[3], pts[3]);
        assert_eq!(a[3], b[0]);

        let mid = bezier_eval(&pts, 0.3);
        assert!((a[3][0] - mid[0]).abs() < 1e-5);
        assert!((a[3][1] - mid[1]).abs() < 1e-5);
    }

    #[test]
    fn inflections_of_an_s_curve() {
        // y'(t) = 0 twice for this S shape.
        let pts = [[0.0, 0.0], [0.0, 100.0], [100.0, -100.0], [100.0, 0.0]];

        let mut inflections = [0.0f32; 4];
        let mut n = 0;
        bezier_inflections(&pts, 1, &mut inflections, &mut n);

        assert_eq!(n, 2);
        for &t in &inflections[..n] {
            assert!(t > 0.0 && t < 1.0);
        }
    }

    #[test]
    fn bezier_bounds_cover_extrema() {
        let pts = [[0.0, 0.0], [0.0, 40.0], [100.0, 40.0], [100.0, 0.0]];
        let bounds = bezier_bounds(&pts);

        assert_eq!(bounds.minx, 0.0);
        assert_eq!(bounds.maxx, 100.0);
        assert_eq!(bounds.miny, 0.0);
        // The curve's apex is at y = 30 for these control points.
        assert!((bounds.maxy - 30.0).abs() < 1e-3);
    }

    #[test]
    fn ray_crosses_line_to_the_right_only() {
        let points = [[10.0, -10.0], [10.0, 10.0]];

        assert_eq!(intersect_line(&points, 0.0, 0.0), 1);
        assert_eq!(intersect_line(&points, 20.0, 0.0), 0);

        // Horizontal lines are never hit.
        let horizontal = [[0.0, 0.0], [10.0, 0.0]];
        assert_eq!(intersect_line(&horizontal, -5.0, 0.0), 0);
    }

    #[test]
    fn closest_point_on_line_clamps() {
        let points = [[0.0, 0.0], [10.0, 0.0]];

        let (p, t) = closest_line(&points, 5.0, 3.0);
        assert_eq!(p, [5.0, 0.0]);
        assert!((t - 0.5).abs() < 1e-6);

        let (p, t) = closest_line(&points, -5.0, 0.0);
        assert_eq!(p, [0.0, 0.0]);
        assert_eq!(t, 0.0);
    }

    #[test]
    fn quadtree_levels_by_bounds_size() {
        let mut scene = PickScene::default();
        scene.begin_frame(512.0, 512.0);

        // Tiny path: deepest level. Huge path: root level.
        let commands_small = [
            Command::MoveTo(4.0, 4.0),
            Command::LineTo(8.0, 4.0),
            Command::LineTo(8.0, 8.0),
            Command::Close,
        ];
        let commands_big = [
            Command::MoveTo(10.0, 10.0),
            Command::LineTo(500.0, 10.0),
            Command::LineTo(500.0, 500.0),
            Command::Close,
        ];

        let small = scene.add_path(&commands_small, 1, PickPathFlags::FILL, 0.5, 10.0, LineCap::Butt, LineJoin::Miter, None);
        scene.insert(small);
        let big = scene.add_path(&commands_big, 2, PickPathFlags::FILL, 0.5, 10.0, LineCap::Butt, LineJoin::Miter, None);
        scene.insert(big);

        // The small path lands in a deep-level cell, which only the matching
        // cell chain visits.
        assert_eq!(scene.hit_test(6.0, 5.0, HitTestFlags::TEST_FILL), Some(1));
        assert_eq!(scene.hit_test(400.0, 400.0, HitTestFlags::TEST_FILL), Some(2));
        assert_eq!(scene.hit_test(510.0, 5.0, HitTestFlags::TEST_FILL), None);
    }

    #[test]
    fn later_registration_wins() {
        let mut scene = PickScene::default();
        scene.begin_frame(100.0, 100.0);

        let commands = [
            Command::MoveTo(0.0, 0.0),
            Command::LineTo(50.0, 0.0),
            Command::LineTo(50.0, 50.0),
            Command::LineTo(0.0, 50.0),
            Command::Close,
        ];

        for id in 10..13 {
            let index = scene.add_path(&commands, id, PickPathFlags::FILL, 0.5, 10.0, LineCap::Butt, LineJoin::Miter, None);
            scene.insert(index);
        }

        assert_eq!(scene.hit_test(25.0, 25.0, HitTestFlags::TEST_FILL), Some(12));
        assert_eq!(scene.hit_test_all(25.0, 25.0, HitTestFlags::TEST_FILL, 10), vec![12, 11, 10]);
        assert_eq!(scene.hit_test_all(25.0, 25.0, HitTestFlags::TEST_FILL, 2), vec![12, 11]);
    }
}
