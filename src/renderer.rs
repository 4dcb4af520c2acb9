use bytemuck::{Pod, Zeroable};

use crate::composite::CompositeOperationState;
use crate::geometry::Bounds;
use crate::image::{ImageFlags, ImageId, TextureKind};
use crate::path_cache::Contour;
use crate::{Paint, Scissor};

mod void;
pub use void::Void;

/// A single vertex of the generated geometry.
///
/// `(x, y)` is the position in device-ish space. `(u, v)` drive the edge
/// antialiasing in the back-end's shader: `v` is 1 on the geometric edge and
/// 0 on the outer edge of the one-pixel fringe, `u` distinguishes the two
/// sides of a stroke (collapsed to 0.5 when antialiasing is disabled).
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub x: f32,
    pub y: f32,
    pub u: f32,
    pub v: f32,
}

impl Vertex {
    pub fn new(x: f32, y: f32, u: f32, v: f32) -> Self {
        Self { x, y, u, v }
    }
}

/// The back-end contract. The context produces geometry and paint state;
/// implementations of this trait own rasterization, textures and GPU state.
///
/// All calls happen synchronously on the thread driving the context, in
/// command order. A back-end that batches internally must replay submissions
/// in the order received.
pub trait Renderer {
    /// Whether fills and strokes should carry an antialiasing fringe.
    fn edge_antialiasing(&self) -> bool {
        true
    }

    fn viewport(&mut self, width: f32, height: f32, device_px_ratio: f32);

    /// Creates a texture for `id`. Returns false when the back-end rejects
    /// the allocation, in which case the context forgets the handle.
    fn create_texture(&mut self, id: ImageId, kind: TextureKind, width: usize, height: usize, flags: ImageFlags, data: Option<&[u8]>) -> bool;

    /// Uploads the tightly packed `data` into the sub-rectangle of `id`.
    fn update_texture(&mut self, id: ImageId, x: usize, y: usize, width: usize, height: usize, data: &[u8]);

    fn delete_texture(&mut self, id: ImageId);

    /// Submits a filled path. Each contour carries an interior fill strip and
    /// a fringe strip; concave paths are expected to go through the back-end's
    /// stencil-then-cover pass, convex ones may be drawn directly.
    fn fill(&mut self, paint: &Paint, composite: CompositeOperationState, scissor: &Scissor, fringe: f32, bounds: Bounds, paths: &[Contour]);

    /// Submits a stroked path as per-contour triangle strips.
    fn stroke(&mut self, paint: &Paint, composite: CompositeOperationState, scissor: &Scissor, fringe: f32, stroke_width: f32, paths: &[Contour]);

    /// Submits raw triangles. Used for text quads.
    fn triangles(&mut self, paint: &Paint, composite: CompositeOperationState, scissor: &Scissor, verts: &[Vertex]);

    /// Renders any queued work for the current frame.
    fn flush(&mut self);

    /// Discards any queued work for the current frame.
    fn cancel(&mut self);
}
