#![allow(dead_code)]

use hitcanvas::renderer::{Renderer, Vertex};
use hitcanvas::{Bounds, CompositeOperationState, Contour, ImageFlags, ImageId, Paint, Scissor, TextureKind};

#[derive(Clone)]
pub struct FillRecord {
    /// (fill vertex count, fringe vertex count) per contour.
    pub contours: Vec<(usize, usize)>,
    pub fill_verts: Vec<Vertex>,
    pub bounds: Bounds,
    pub scissor: Scissor,
}

#[derive(Clone)]
pub struct StrokeRecord {
    pub contours: Vec<usize>,
    pub verts: Vec<Vertex>,
    pub stroke_width: f32,
    pub paint_alpha: f32,
}

/// Renderer that records every submission for assertions.
#[derive(Default)]
pub struct Recorder {
    pub fills: Vec<FillRecord>,
    pub strokes: Vec<StrokeRecord>,
    pub triangle_calls: Vec<usize>,
    pub textures: Vec<(ImageId, TextureKind, usize, usize)>,
    pub texture_updates: usize,
    pub flushed: usize,
    pub cancelled: usize,
}

impl Renderer for Recorder {
    fn viewport(&mut self, _width: f32, _height: f32, _device_px_ratio: f32) {}

    fn create_texture(&mut self, id: ImageId, kind: TextureKind, width: usize, height: usize, _flags: ImageFlags, _data: Option<&[u8]>) -> bool {
        self.textures.push((id, kind, width, height));
        true
    }

    fn update_texture(&mut self, _id: ImageId, _x: usize, _y: usize, _width: usize, _height: usize, _data: &[u8]) {
        self.texture_updates += 1;
    }

    fn delete_texture(&mut self, id: ImageId) {
        self.textures.retain(|(t, ..)| *t != id);
    }

    fn fill(&mut self, _paint: &Paint, _composite: CompositeOperationState, scissor: &Scissor, _fringe: f32, bounds: Bounds, paths: &[Contour]) {
        self.fills.push(FillRecord {
            contours: paths.iter().map(|c| (c.fill_verts().len(), c.stroke_verts().len())).collect(),
            fill_verts: paths.iter().flat_map(|c| c.fill_verts().iter().copied()).collect(),
            bounds,
            scissor: *scissor,
        });
    }

    fn stroke(&mut self, paint: &Paint, _composite: CompositeOperationState, _scissor: &Scissor, _fringe: f32, stroke_width: f32, paths: &[Contour]) {
        self.strokes.push(StrokeRecord {
            contours: paths.iter().map(|c| c.stroke_verts().len()).collect(),
            verts: paths.iter().flat_map(|c| c.stroke_verts().iter().copied()).collect(),
            stroke_width,
            paint_alpha: paint.inner_color().a,
        });
    }

    fn triangles(&mut self, _paint: &Paint, _composite: CompositeOperationState, _scissor: &Scissor, verts: &[Vertex]) {
        self.triangle_calls.push(verts.len());
    }

    fn flush(&mut self) {
        self.flushed += 1;
    }

    fn cancel(&mut self) {
        self.cancelled += 1;
    }
}
