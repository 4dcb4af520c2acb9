//! Antialiased, immediate-mode 2D vector drawing core with analytical
//! hit-testing.
//!
//! The [`Context`] records path commands and paint state frame by frame and
//! expands them into antialiased triangle strips that a [`Renderer`]
//! back-end consumes. Paths can additionally be registered as hit regions
//! and queried analytically through [`Context::hit_test`] without touching
//! the produced geometry.
//!
//! The context renders nothing itself: rasterization lives behind the
//! [`Renderer`] trait and glyph rasterization behind [`GlyphAtlas`].

use std::f32::consts::PI;
use std::{error::Error, fmt};

mod color;
pub use color::Color;

mod composite;
pub use composite::{BlendFactor, CompositeOperation, CompositeOperationState};

pub mod geometry;
pub use geometry::{Bounds, Rect, Transform2D};
use geometry::{dist_pt_segment, normalize, pt_equals, quantize};

mod image;
pub use image::{ImageFlags, ImageId, ImageInfo, ImageSource, TextureKind};
use image::ImageStore;

mod paint;
pub use paint::Paint;

mod path_cache;
pub use path_cache::{Contour, Convexity};
use path_cache::PathCache;

mod pick;
pub use pick::HitTestFlags;
#[cfg(feature = "debug_inspector")]
pub use pick::PickDebug;
use pick::PickScene;

pub mod renderer;
pub use renderer::{Renderer, Vertex};

mod text;
pub use text::{
    Align, FontId, FontStyle, GlyphAtlas, GlyphEvent, GlyphPosition, GlyphQuad, TextCursor, TextMetrics, TextRow,
};
use text::MAX_FONT_IMAGES;

// Length proportional to radius of a cubic bezier handle for 90deg arcs.
const KAPPA90: f32 = 0.5522847493;

const MAX_STATES: usize = 32;

/// Winding direction of a subpath. In fills, CCW subpaths are solid and CW
/// subpaths punch holes.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum Winding {
    #[default]
    CCW,
    CW,
}

impl Winding {
    pub const SOLID: Winding = Winding::CCW;
    pub const HOLE: Winding = Winding::CW;
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum LineCap {
    #[default]
    Butt,
    Round,
    Square,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum LineJoin {
    #[default]
    Miter,
    Round,
    Bevel,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub(crate) enum Command {
    MoveTo(f32, f32),
    LineTo(f32, f32),
    BezierTo(f32, f32, f32, f32, f32, f32),
    Close,
    Winding(Winding),
}

/// An axis-aligned clip rectangle in the user space it was set in; carries
/// its own transform so later state changes do not move it.
#[derive(Copy, Clone, Debug, PartialEq, PartialOrd)]
pub struct Scissor {
    pub transform: Transform2D,
    /// Half extents. A negative extent means no scissor.
    pub extent: [f32; 2],
}

impl Default for Scissor {
    fn default() -> Self {
        Self {
            transform: Transform2D::identity(),
            extent: [-1.0, -1.0],
        }
    }
}

/// Enum with all errors that could occur.
#[derive(Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The back-end rejected a texture allocation.
    TextureCreationFailed,
    ImageIdNotFound,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::TextureCreationFailed => write!(f, "texture creation failed"),
            Self::ImageIdNotFound => write!(f, "image id not found"),
        }
    }
}

impl Error for ErrorKind {}

#[derive(Copy, Clone)]
pub(crate) struct State {
    pub(crate) composite_operation: CompositeOperationState,
    pub(crate) shape_anti_alias: bool,
    pub(crate) fill: Paint,
    pub(crate) stroke: Paint,
    pub(crate) stroke_width: f32,
    pub(crate) miter_limit: f32,
    pub(crate) line_cap: LineCap,
    pub(crate) line_join: LineJoin,
    pub(crate) alpha: f32,
    pub(crate) transform: Transform2D,
    pub(crate) scissor: Scissor,
    pub(crate) font_size: f32,
    pub(crate) letter_spacing: f32,
    pub(crate) line_height: f32,
    pub(crate) font_blur: f32,
    pub(crate) text_align: Align,
    pub(crate) font_id: Option<FontId>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            composite_operation: CompositeOperationState::default(),
            shape_anti_alias: true,
            fill: Paint::color(Color::white()),
            stroke: Paint::color(Color::black()),
            stroke_width: 1.0,
            miter_limit: 10.0,
            line_cap: LineCap::Butt,
            line_join: LineJoin::Miter,
            alpha: 1.0,
            transform: Transform2D::identity(),
            scissor: Scissor::default(),
            font_size: 16.0,
            letter_spacing: 0.0,
            line_height: 1.0,
            font_blur: 0.0,
            text_align: Align::default(),
            font_id: None,
        }
    }
}

/// The drawing context.
///
/// Owns all buffers: the command log, the per-frame path cache, the pick
/// scene and the texture handle store. The back-end only sees finished
/// vertex arrays and paint state.
pub struct Context<R: Renderer> {
    pub(crate) renderer: R,
    pub(crate) images: ImageStore,
    pub(crate) states: Vec<State>,
    pub(crate) commands: Vec<Command>,
    cache: PathCache,
    pub(crate) pick_scene: PickScene,
    pub(crate) glyph_atlas: Option<Box<dyn GlyphAtlas>>,
    pub(crate) font_images: [Option<ImageId>; MAX_FONT_IMAGES],
    pub(crate) font_image_idx: usize,
    // Pen position in user space, before the current transform.
    command_x: f32,
    command_y: f32,
    tess_tol: f32,
    dist_tol: f32,
    fringe_width: f32,
    device_px_ratio: f32,
}

impl<R: Renderer> Context<R> {
    /// Creates a context without text support.
    pub fn new(renderer: R) -> Self {
        let mut context = Self {
            renderer,
            images: ImageStore::default(),
            states: Vec::with_capacity(MAX_STATES),
            commands: Vec::new(),
            cache: PathCache::default(),
            pick_scene: PickScene::default(),
            glyph_atlas: None,
            font_images: [None; MAX_FONT_IMAGES],
            font_image_idx: 0,
            command_x: 0.0,
            command_y: 0.0,
            tess_tol: 0.0,
            dist_tol: 0.0,
            fringe_width: 0.0,
            device_px_ratio: 0.0,
        };

        context.save();
        context.reset();
        context.set_device_pixel_ratio(1.0);

        context
    }

    /// Creates a context that draws text through the given glyph atlas.
    /// Fails when the back-end rejects the initial atlas texture.
    pub fn with_glyph_atlas(renderer: R, glyph_atlas: Box<dyn GlyphAtlas>) -> Result<Self, ErrorKind> {
        let mut context = Self::new(renderer);

        let size = text::INIT_FONT_IMAGE_SIZE;
        let id = context.images.alloc(ImageInfo::new(ImageFlags::empty(), size, size, TextureKind::Alpha));

        if !context.renderer.create_texture(id, TextureKind::Alpha, size, size, ImageFlags::empty(), None) {
            context.images.remove(id);
            return Err(ErrorKind::TextureCreationFailed);
        }

        context.font_images[0] = Some(id);
        context.glyph_atlas = Some(glyph_atlas);
        context.glyph_atlas.as_mut().unwrap().reset(size, size);

        Ok(context)
    }

    /// The back-end this context draws through.
    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    // Frame lifecycle

    /// Begins a new frame: resets the state stack, the path command log, the
    /// path cache and the pick scene, and forwards the viewport to the
    /// back-end.
    pub fn begin_frame(&mut self, window_width: f32, window_height: f32, device_px_ratio: f32) {
        self.states.clear();
        self.save();
        self.reset();

        self.commands.clear();
        self.cache.clear();

        self.set_device_pixel_ratio(device_px_ratio);

        self.renderer.viewport(window_width, window_height, device_px_ratio);

        self.pick_scene.begin_frame(window_width, window_height);
    }

    /// Tells the back-end to discard the frame's queued work.
    pub fn cancel_frame(&mut self) {
        self.renderer.cancel();
    }

    /// Flushes the back-end and rotates the glyph atlas generations: the
    /// current (largest) generation becomes generation zero and smaller
    /// prior generations are deleted.
    pub fn end_frame(&mut self) {
        self.renderer.flush();

        if self.font_image_idx != 0 {
            let Some(font_image) = self.font_images[self.font_image_idx].take() else {
                return;
            };

            let Some((iw, ih)) = self.image_size(font_image) else {
                return;
            };

            let mut survivors: [Option<ImageId>; MAX_FONT_IMAGES] = [None; MAX_FONT_IMAGES];
            let mut nsurvivors = 0;

            for i in 0..self.font_image_idx {
                if let Some(id) = self.font_images[i].take() {
                    let Some((nw, nh)) = self.image_size(id) else {
                        continue;
                    };

                    if nw < iw || nh < ih {
                        self.delete_image(id);
                    } else {
                        survivors[nsurvivors] = Some(id);
                        nsurvivors += 1;
                    }
                }
            }

            // Current generation first, surviving (equal-sized) ones after it.
            self.font_images = [None; MAX_FONT_IMAGES];
            self.font_images[0] = Some(font_image);
            self.font_images[1..1 + nsurvivors].copy_from_slice(&survivors[..nsurvivors]);
            self.font_image_idx = 0;
        }
    }

    // State handling

    /// Pushes and saves the current render state into a state stack.
    ///
    /// A matching restore() must be used to restore the state. Saves past
    /// the stack limit are dropped.
    pub fn save(&mut self) {
        if self.states.len() >= MAX_STATES {
            log::debug!("state stack limit ({}) reached, save dropped", MAX_STATES);
            return;
        }

        let state = self.states.last().copied().unwrap_or_default();
        self.states.push(state);
    }

    /// Restores the previous render state. Restoring past the bottom of the
    /// stack is ignored.
    pub fn restore(&mut self) {
        if self.states.len() > 1 {
            self.states.pop();
        }
    }

    /// Resets current render state to default values. Does not affect the render state stack.
    pub fn reset(&mut self) {
        *self.state_mut() = State::default();
    }

    pub(crate) fn state(&self) -> &State {
        self.states.last().unwrap()
    }

    pub(crate) fn state_mut(&mut self) -> &mut State {
        self.states.last_mut().unwrap()
    }

    // Render styles

    /// Sets whether shapes are drawn with edge antialiasing. Enabled by
    /// default; disabling collapses the fringe UVs so the coverage ramp in
    /// the back-end's shader has no effect.
    pub fn set_shape_anti_alias(&mut self, enabled: bool) {
        self.state_mut().shape_anti_alias = enabled;
    }

    /// Sets the width of the stroke style.
    pub fn set_stroke_width(&mut self, width: f32) {
        self.state_mut().stroke_width = width;
    }

    /// Sets the miter limit of the stroke style.
    ///
    /// Miter limit controls when a sharp corner is beveled.
    pub fn set_miter_limit(&mut self, limit: f32) {
        self.state_mut().miter_limit = limit;
    }

    /// Sets how the end of the line (cap) is drawn.
    pub fn set_line_cap(&mut self, cap: LineCap) {
        self.state_mut().line_cap = cap;
    }

    /// Sets how sharp path corners are drawn.
    pub fn set_line_join(&mut self, join: LineJoin) {
        self.state_mut().line_join = join;
    }

    /// Sets the transparency applied to all rendered shapes.
    ///
    /// Already transparent paths will get proportionally more transparent as well.
    pub fn set_global_alpha(&mut self, alpha: f32) {
        self.state_mut().alpha = alpha;
    }

    /// Sets the composite operation.
    pub fn set_global_composite_operation(&mut self, op: CompositeOperation) {
        self.state_mut().composite_operation = op.into();
    }

    /// Sets the composite operation with custom blend factors.
    pub fn set_global_composite_blend_func(&mut self, src_factor: BlendFactor, dst_factor: BlendFactor) {
        self.state_mut().composite_operation = CompositeOperationState::new(src_factor, dst_factor);
    }

    /// Sets the composite operation with custom blend factors, separately
    /// for RGB and alpha.
    pub fn set_global_composite_blend_func_separate(
        &mut self,
        src_rgb: BlendFactor,
        dst_rgb: BlendFactor,
        src_alpha: BlendFactor,
        dst_alpha: BlendFactor,
    ) {
        self.state_mut().composite_operation = CompositeOperationState::with_separate_alpha(src_rgb, dst_rgb, src_alpha, dst_alpha);
    }

    /// Sets the paint used by [`Context::fill`]. The paint's transform is
    /// multiplied by the current transform at set time.
    pub fn set_fill_paint(&mut self, paint: Paint) {
        let state = self.state_mut();
        state.fill = paint;

        let mut transform = state.fill.transform();
        transform.multiply(&state.transform);
        state.fill.set_transform(transform);
    }

    /// Sets the fill style to a solid color.
    pub fn set_fill_color(&mut self, color: Color) {
        self.state_mut().fill = Paint::color(color);
    }

    /// Sets the paint used by [`Context::stroke`]. The paint's transform is
    /// multiplied by the current transform at set time.
    pub fn set_stroke_paint(&mut self, paint: Paint) {
        let state = self.state_mut();
        state.stroke = paint;

        let mut transform = state.stroke.transform();
        transform.multiply(&state.transform);
        state.stroke.set_transform(transform);
    }

    /// Sets the stroke style to a solid color.
    pub fn set_stroke_color(&mut self, color: Color) {
        self.state_mut().stroke = Paint::color(color);
    }

    // Text styles

    /// Sets the font size of the current text style.
    pub fn set_font_size(&mut self, size: f32) {
        self.state_mut().font_size = size;
    }

    /// Sets the blur of the current text style.
    pub fn set_font_blur(&mut self, blur: f32) {
        self.state_mut().font_blur = blur;
    }

    /// Sets the letter spacing of the current text style.
    pub fn set_text_letter_spacing(&mut self, spacing: f32) {
        self.state_mut().letter_spacing = spacing;
    }

    /// Sets the proportional line height of the current text style.
    pub fn set_text_line_height(&mut self, line_height: f32) {
        self.state_mut().line_height = line_height;
    }

    /// Sets the text alignment of the current text style.
    pub fn set_text_align(&mut self, align: Align) {
        self.state_mut().text_align = align;
    }

    /// Sets the font of the current text style.
    pub fn set_font(&mut self, font: FontId) {
        self.state_mut().font_id = Some(font);
    }

    // Transforms

    /// Resets current transform to a identity matrix.
    pub fn reset_transform(&mut self) {
        self.state_mut().transform = Transform2D::identity();
    }

    /// Premultiplies current coordinate system by specified matrix.
    /// The parameters are interpreted as matrix as follows:
    ///   [a c e]
    ///   [b d f]
    ///   [0 0 1]
    pub fn transform(&mut self, a: f32, b: f32, c: f32, d: f32, e: f32, f: f32) {
        let transform = Transform2D([a, b, c, d, e, f]);
        self.state_mut().transform.premultiply(&transform);
    }

    /// Translates the current coordinate system.
    pub fn translate(&mut self, x: f32, y: f32) {
        let mut t = Transform2D::identity();
        t.translate(x, y);
        self.state_mut().transform.premultiply(&t);
    }

    /// Rotates the current coordinate system. Angle is specified in radians.
    pub fn rotate(&mut self, angle: f32) {
        let mut t = Transform2D::identity();
        t.rotate(angle);
        self.state_mut().transform.premultiply(&t);
    }

    /// Skews the current coordinate system along X axis. Angle is specified in radians.
    pub fn skew_x(&mut self, angle: f32) {
        let mut t = Transform2D::identity();
        t.skew_x(angle);
        self.state_mut().transform.premultiply(&t);
    }

    /// Skews the current coordinate system along Y axis. Angle is specified in radians.
    pub fn skew_y(&mut self, angle: f32) {
        let mut t = Transform2D::identity();
        t.skew_y(angle);
        self.state_mut().transform.premultiply(&t);
    }

    /// Scales the current coordinate system.
    pub fn scale(&mut self, x: f32, y: f32) {
        let mut t = Transform2D::identity();
        t.scale(x, y);
        self.state_mut().transform.premultiply(&t);
    }

    /// Returns the current transformation matrix.
    pub fn current_transform(&self) -> Transform2D {
        self.state().transform
    }

    // Images

    /// Creates a texture from an already-decoded pixel buffer.
    pub fn create_image(&mut self, src: ImageSource, flags: ImageFlags) -> Result<ImageId, ErrorKind> {
        let (width, height) = src.dimensions();
        let id = self.images.alloc(ImageInfo::new(flags, width, height, src.kind()));

        let data = src.packed_bytes();

        if !self.renderer.create_texture(id, src.kind(), width, height, flags, Some(&data)) {
            log::warn!("back-end rejected {}x{} texture", width, height);
            self.images.remove(id);
            return Err(ErrorKind::TextureCreationFailed);
        }

        Ok(id)
    }

    /// Uploads new pixel data into the sub-rectangle of an image at (x, y).
    pub fn update_image(&mut self, id: ImageId, src: ImageSource, x: usize, y: usize) -> Result<(), ErrorKind> {
        if self.images.get(id).is_none() {
            return Err(ErrorKind::ImageIdNotFound);
        }

        let (width, height) = src.dimensions();
        let data = src.packed_bytes();

        self.renderer.update_texture(id, x, y, width, height, &data);

        Ok(())
    }

    /// Returns the dimensions of a created image.
    pub fn image_size(&self, id: ImageId) -> Option<(usize, usize)> {
        self.images.get(id).map(|info| (info.width(), info.height()))
    }

    /// Deletes a created image.
    pub fn delete_image(&mut self, id: ImageId) {
        if self.images.remove(id).is_some() {
            self.renderer.delete_texture(id);
        }
    }

    // Scissoring

    /// Sets the current scissor rectangle.
    ///
    /// The scissor rectangle is transformed by the current transform.
    pub fn scissor(&mut self, x: f32, y: f32, w: f32, h: f32) {
        let state = self.state_mut();

        let w = w.max(0.0);
        let h = h.max(0.0);

        state.scissor.transform = Transform2D::identity();
        state.scissor.transform[4] = x + w * 0.5;
        state.scissor.transform[5] = y + h * 0.5;
        state.scissor.transform.premultiply(&state.transform);

        state.scissor.extent[0] = w * 0.5;
        state.scissor.extent[1] = h * 0.5;
    }

    /// Intersects current scissor rectangle with the specified rectangle.
    ///
    /// The scissor rectangle is transformed by the current transform.
    /// Note: in case the rotation of previous scissor rect differs from
    /// the current one, the intersection will be done between the specified
    /// rectangle and the previous scissor rectangle transformed in the current
    /// transform space. The resulting shape is always rectangle.
    pub fn intersect_scissor(&mut self, x: f32, y: f32, w: f32, h: f32) {
        let state = self.state();

        // If no previous scissor has been set, set the scissor as current scissor.
        if state.scissor.extent[0] < 0.0 {
            self.scissor(x, y, w, h);
            return;
        }

        // Transform the current scissor rect into current transform space.
        // If there is difference in rotation, this will be approximation.
        let mut pxform = state.scissor.transform;
        let invxform = state.transform.inversed();
        pxform.multiply(&invxform);

        let ex = state.scissor.extent[0];
        let ey = state.scissor.extent[1];

        let tex = ex * pxform[0].abs() + ey * pxform[2].abs();
        let tey = ex * pxform[1].abs() + ey * pxform[3].abs();

        let prev = Rect::new(pxform[4] - tex, pxform[5] - tey, tex * 2.0, tey * 2.0);
        let res = prev.intersect(Rect::new(x, y, w, h));

        self.scissor(res.x, res.y, res.w, res.h);
    }

    /// Resets and disables scissoring.
    pub fn reset_scissor(&mut self) {
        self.state_mut().scissor = Scissor::default();
    }

    // Paths

    /// Clears the current path and sub-paths.
    pub fn begin_path(&mut self) {
        self.commands.clear();
        self.cache.clear();
    }

    /// Starts new sub-path with specified point as first point.
    pub fn move_to(&mut self, x: f32, y: f32) {
        self.append_commands(&mut [Command::MoveTo(x, y)]);
    }

    /// Adds line segment from the last point in the path to the specified point.
    pub fn line_to(&mut self, x: f32, y: f32) {
        self.append_commands(&mut [Command::LineTo(x, y)]);
    }

    /// Adds cubic bezier segment from last point in the path via two control points to the specified point.
    pub fn bezier_to(&mut self, c1x: f32, c1y: f32, c2x: f32, c2y: f32, x: f32, y: f32) {
        self.append_commands(&mut [Command::BezierTo(c1x, c1y, c2x, c2y, x, y)]);
    }

    /// Adds quadratic bezier segment from last point in the path via a control point to the specified point.
    pub fn quad_to(&mut self, cx: f32, cy: f32, x: f32, y: f32) {
        let x0 = self.command_x;
        let y0 = self.command_y;

        // Elevate the quadratic to a cubic.
        self.append_commands(&mut [Command::BezierTo(
            x0 + 2.0 / 3.0 * (cx - x0),
            y0 + 2.0 / 3.0 * (cy - y0),
            x + 2.0 / 3.0 * (cx - x),
            y + 2.0 / 3.0 * (cy - y),
            x,
            y,
        )]);
    }

    /// Closes current sub-path with a line segment.
    pub fn close_path(&mut self) {
        self.append_commands(&mut [Command::Close]);
    }

    /// Sets the winding of the current sub-path.
    pub fn path_winding(&mut self, winding: Winding) {
        self.append_commands(&mut [Command::Winding(winding)]);
    }

    /// Creates new circle arc shaped sub-path. The arc center is at cx,cy, the arc radius is r,
    /// and the arc is drawn from angle a0 to a1, and swept in direction dir (Winding)
    /// Angles are specified in radians.
    pub fn arc(&mut self, cx: f32, cy: f32, r: f32, a0: f32, a1: f32, dir: Winding) {
        let mut commands = Vec::new();

        let mut da = a1 - a0;

        if dir == Winding::CW {
            if da.abs() >= PI * 2.0 {
                da = PI * 2.0;
            } else {
                while da < 0.0 {
                    da += PI * 2.0;
                }
            }
        } else if da.abs() >= PI * 2.0 {
            da = -PI * 2.0;
        } else {
            while da > 0.0 {
                da -= PI * 2.0;
            }
        }

        // Split arc into max 90 degree segments.
        let ndivs = ((da.abs() / (PI * 0.5) + 0.5) as i32).clamp(1, 5);
        let hda = (da / ndivs as f32) / 2.0;
        let mut kappa = (4.0 / 3.0 * (1.0 - hda.cos()) / hda.sin()).abs();

        if dir == Winding::CCW {
            kappa = -kappa;
        }

        let (mut px, mut py, mut ptanx, mut ptany) = (0f32, 0f32, 0f32, 0f32);

        for i in 0..=ndivs {
            let a = a0 + da * (i as f32 / ndivs as f32);
            let dx = a.cos();
            let dy = a.sin();
            let x = cx + dx * r;
            let y = cy + dy * r;
            let tanx = -dy * r * kappa;
            let tany = dx * r * kappa;

            if i == 0 {
                let first_move = if !self.commands.is_empty() {
                    Command::LineTo(x, y)
                } else {
                    Command::MoveTo(x, y)
                };
                commands.push(first_move);
            } else {
                commands.push(Command::BezierTo(px + ptanx, py + ptany, x - tanx, y - tany, x, y));
            }

            px = x;
            py = y;
            ptanx = tanx;
            ptany = tany;
        }

        self.append_commands(&mut commands);
    }

    /// Adds an arc segment at the corner defined by the last path point, and two specified points.
    pub fn arc_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, radius: f32) {
        if self.commands.is_empty() {
            return;
        }

        let x0 = self.command_x;
        let y0 = self.command_y;

        // Handle degenerate cases.
        if pt_equals(x0, y0, x1, y1, self.dist_tol)
            || pt_equals(x1, y1, x2, y2, self.dist_tol)
            || dist_pt_segment(x1, y1, x0, y0, x2, y2) < self.dist_tol * self.dist_tol
            || radius < self.dist_tol
        {
            self.line_to(x1, y1);
            return;
        }

        // Calculate tangential circle to lines (x0,y0)-(x1,y1) and (x1,y1)-(x2,y2).
        let mut dx0 = x0 - x1;
        let mut dy0 = y0 - y1;
        let mut dx1 = x2 - x1;
        let mut dy1 = y2 - y1;

        normalize(&mut dx0, &mut dy0);
        normalize(&mut dx1, &mut dy1);

        let a = (dx0 * dx1 + dy0 * dy1).acos();
        let d = radius / (a / 2.0).tan();

        if d > 10000.0 {
            self.line_to(x1, y1);
            return;
        }

        let (cx, cy, a0, a1, dir);

        if geometry::cross(dx0, dy0, dx1, dy1) > 0.0 {
            cx = x1 + dx0 * d + dy0 * radius;
            cy = y1 + dy0 * d + -dx0 * radius;
            a0 = dx0.atan2(-dy0);
            a1 = -dx1.atan2(dy1);
            dir = Winding::CW;
        } else {
            cx = x1 + dx0 * d + -dy0 * radius;
            cy = y1 + dy0 * d + dx0 * radius;
            a0 = -dx0.atan2(dy0);
            a1 = dx1.atan2(-dy1);
            dir = Winding::CCW;
        }

        self.arc(cx, cy, radius, a0, a1, dir);
    }

    /// Creates new rectangle shaped sub-path.
    pub fn rect(&mut self, x: f32, y: f32, w: f32, h: f32) {
        self.append_commands(&mut [
            Command::MoveTo(x, y),
            Command::LineTo(x, y + h),
            Command::LineTo(x + w, y + h),
            Command::LineTo(x + w, y),
            Command::Close,
        ]);
    }

    /// Creates new rounded rectangle shaped sub-path.
    pub fn rounded_rect(&mut self, x: f32, y: f32, w: f32, h: f32, r: f32) {
        self.rounded_rect_varying(x, y, w, h, r, r, r, r);
    }

    /// Creates new rounded rectangle shaped sub-path with varying radii for each corner.
    #[allow(clippy::too_many_arguments)]
    pub fn rounded_rect_varying(
        &mut self,
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        rad_top_left: f32,
        rad_top_right: f32,
        rad_bottom_right: f32,
        rad_bottom_left: f32,
    ) {
        if rad_top_left < 0.1 && rad_top_right < 0.1 && rad_bottom_right < 0.1 && rad_bottom_left < 0.1 {
            self.rect(x, y, w, h);
        } else {
            let halfw = w.abs() * 0.5;
            let halfh = h.abs() * 0.5;

            let rx_bl = rad_bottom_left.min(halfw) * w.signum();
            let ry_bl = rad_bottom_left.min(halfh) * h.signum();

            let rx_br = rad_bottom_right.min(halfw) * w.signum();
            let ry_br = rad_bottom_right.min(halfh) * h.signum();

            let rx_tr = rad_top_right.min(halfw) * w.signum();
            let ry_tr = rad_top_right.min(halfh) * h.signum();

            let rx_tl = rad_top_left.min(halfw) * w.signum();
            let ry_tl = rad_top_left.min(halfh) * h.signum();

            self.append_commands(&mut [
                Command::MoveTo(x, y + ry_tl),
                Command::LineTo(x, y + h - ry_bl),
                Command::BezierTo(x, y + h - ry_bl * (1.0 - KAPPA90), x + rx_bl * (1.0 - KAPPA90), y + h, x + rx_bl, y + h),
                Command::LineTo(x + w - rx_br, y + h),
                Command::BezierTo(
                    x + w - rx_br * (1.0 - KAPPA90),
                    y + h,
                    x + w,
                    y + h - ry_br * (1.0 - KAPPA90),
                    x + w,
                    y + h - ry_br,
                ),
                Command::LineTo(x + w, y + ry_tr),
                Command::BezierTo(x + w, y + ry_tr * (1.0 - KAPPA90), x + w - rx_tr * (1.0 - KAPPA90), y, x + w - rx_tr, y),
                Command::LineTo(x + rx_tl, y),
                Command::BezierTo(x + rx_tl * (1.0 - KAPPA90), y, x, y + ry_tl * (1.0 - KAPPA90), x, y + ry_tl),
                Command::Close,
            ]);
        }
    }

    /// Creates new ellipse shaped sub-path.
    pub fn ellipse(&mut self, cx: f32, cy: f32, rx: f32, ry: f32) {
        self.append_commands(&mut [
            Command::MoveTo(cx - rx, cy),
            Command::BezierTo(cx - rx, cy + ry * KAPPA90, cx - rx * KAPPA90, cy + ry, cx, cy + ry),
            Command::BezierTo(cx + rx * KAPPA90, cy + ry, cx + rx, cy + ry * KAPPA90, cx + rx, cy),
            Command::BezierTo(cx + rx, cy - ry * KAPPA90, cx + rx * KAPPA90, cy - ry, cx, cy - ry),
            Command::BezierTo(cx - rx * KAPPA90, cy - ry, cx - rx, cy - ry * KAPPA90, cx - rx, cy),
            Command::Close,
        ]);
    }

    /// Creates new circle shaped sub-path.
    pub fn circle(&mut self, cx: f32, cy: f32, r: f32) {
        self.ellipse(cx, cy, r, r);
    }

    /// Fills the current path with the current fill paint.
    pub fn fill(&mut self) {
        let state = *self.state();
        let mut fill_paint = state.fill;

        self.flatten_paths();

        if self.renderer.edge_antialiasing() && state.shape_anti_alias {
            self.cache.expand_fill(self.fringe_width, LineJoin::Miter, 2.4, self.fringe_width);
        } else {
            self.cache.expand_fill(0.0, LineJoin::Miter, 2.4, self.fringe_width);
        }

        // Apply global alpha
        fill_paint.mul_alpha(state.alpha);

        self.renderer.fill(
            &fill_paint,
            state.composite_operation,
            &state.scissor,
            self.fringe_width,
            self.cache.bounds(),
            self.cache.contours(),
        );
    }

    /// Strokes the current path with the current stroke paint.
    pub fn stroke(&mut self) {
        let state = *self.state();
        let scale = state.transform.average_scale();
        let mut stroke_width = (state.stroke_width * scale).clamp(0.0, 200.0);
        let mut stroke_paint = state.stroke;

        if stroke_width < self.fringe_width {
            // If the stroke width is less than pixel size, use alpha to emulate coverage.
            // Since coverage is area, scale by alpha*alpha.
            let alpha = (stroke_width / self.fringe_width).clamp(0.0, 1.0);
            stroke_paint.mul_alpha(alpha * alpha);
            stroke_width = self.fringe_width;
        }

        // Apply global alpha
        stroke_paint.mul_alpha(state.alpha);

        self.flatten_paths();

        if self.renderer.edge_antialiasing() && state.shape_anti_alias {
            self.cache
                .expand_stroke(stroke_width * 0.5, self.fringe_width, state.line_cap, state.line_join, state.miter_limit, self.tess_tol);
        } else {
            self.cache
                .expand_stroke(stroke_width * 0.5, 0.0, state.line_cap, state.line_join, state.miter_limit, self.tess_tol);
        }

        self.renderer.stroke(
            &stroke_paint,
            state.composite_operation,
            &state.scissor,
            self.fringe_width,
            stroke_width,
            self.cache.contours(),
        );
    }

    /// Dumps the flattened path cache via `log::debug!`.
    #[cfg(feature = "debug_inspector")]
    pub fn debug_dump_path_cache(&self) {
        self.cache.debug_dump();
    }

    /// Starts or stops recording of pick-scene support geometry.
    #[cfg(feature = "debug_inspector")]
    pub fn set_pick_debug(&mut self, enabled: bool) {
        self.pick_scene.debug = enabled.then(PickDebug::default);
    }

    #[cfg(feature = "debug_inspector")]
    pub fn pick_debug(&self) -> Option<&PickDebug> {
        self.pick_scene.debug.as_ref()
    }

    // Internals

    pub(crate) fn font_scale(&self) -> f32 {
        quantize(self.state().transform.average_scale(), 0.01).min(4.0)
    }

    pub(crate) fn device_px_ratio(&self) -> f32 {
        self.device_px_ratio
    }

    fn set_device_pixel_ratio(&mut self, ratio: f32) {
        self.tess_tol = 0.25 / ratio;
        self.dist_tol = 0.01 / ratio;
        self.fringe_width = 1.0 / ratio;
        self.device_px_ratio = ratio;
    }

    fn append_commands(&mut self, commands: &mut [Command]) {
        let transform = self.state().transform;

        // The pen stays in user space, before the transform.
        if let Some(last) = commands.last() {
            match *last {
                Command::MoveTo(x, y) | Command::LineTo(x, y) | Command::BezierTo(_, _, _, _, x, y) => {
                    self.command_x = x;
                    self.command_y = y;
                }
                _ => (),
            }
        }

        // Recorded coordinates are pre-multiplied by the current transform.
        for cmd in commands.iter_mut() {
            match cmd {
                Command::MoveTo(x, y) | Command::LineTo(x, y) => {
                    (*x, *y) = transform.transform_point(*x, *y);
                }
                Command::BezierTo(c1x, c1y, c2x, c2y, x, y) => {
                    (*c1x, *c1y) = transform.transform_point(*c1x, *c1y);
                    (*c2x, *c2y) = transform.transform_point(*c2x, *c2y);
                    (*x, *y) = transform.transform_point(*x, *y);
                }
                _ => (),
            }
        }

        self.commands.extend_from_slice(commands);
    }

    fn flatten_paths(&mut self) {
        if self.cache.is_flattened() {
            return;
        }

        self.cache.flatten(&self.commands, self.tess_tol, self.dist_tol);
    }
}
