#![allow(unused_variables)]

use crate::composite::CompositeOperationState;
use crate::geometry::Bounds;
use crate::image::{ImageFlags, ImageId, TextureKind};
use crate::path_cache::Contour;
use crate::{Paint, Scissor};

use super::{Renderer, Vertex};

/// Void renderer. Intended for testing and documentation.
#[derive(Default)]
pub struct Void;

impl Renderer for Void {
    fn viewport(&mut self, width: f32, height: f32, device_px_ratio: f32) {}

    fn create_texture(&mut self, id: ImageId, kind: TextureKind, width: usize, height: usize, flags: ImageFlags, data: Option<&[u8]>) -> bool {
        true
    }

    fn update_texture(&mut self, id: ImageId, x: usize, y: usize, width: usize, height: usize, data: &[u8]) {}

    fn delete_texture(&mut self, id: ImageId) {}

    fn fill(&mut self, paint: &Paint, composite: CompositeOperationState, scissor: &Scissor, fringe: f32, bounds: Bounds, paths: &[Contour]) {}

    fn stroke(&mut self, paint: &Paint, composite: CompositeOperationState, scissor: &Scissor, fringe: f32, stroke_width: f32, paths: &[Contour]) {}

    fn triangles(&mut self, paint: &Paint, composite: CompositeOperationState, scissor: &Scissor, verts: &[Vertex]) {}

    fn flush(&mut self) {}

    fn cancel(&mut self) {}
}
