use crate::geometry::Transform2D;
use crate::image::ImageId;
use crate::Color;

/// Describes how a fill or stroke is colored.
///
/// Solid colors, all gradients and image patterns are encoded uniformly:
/// a paint-space transform, an extent, a radius, a feather and two colors.
/// The back-end's shader evaluates the gradient from these without knowing
/// which constructor produced them.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Paint {
    transform: Transform2D,
    extent: [f32; 2],
    radius: f32,
    feather: f32,
    inner_color: Color,
    outer_color: Color,
    image: Option<ImageId>,
}

impl Default for Paint {
    fn default() -> Self {
        Self {
            transform: Transform2D::identity(),
            extent: [0.0, 0.0],
            radius: 0.0,
            feather: 1.0,
            inner_color: Color::white(),
            outer_color: Color::white(),
            image: None,
        }
    }
}

impl Paint {
    /// Creates a solid color paint.
    pub fn color(color: Color) -> Self {
        let mut new = Self::default();
        new.set_color(color);
        new
    }

    /// Creates and returns an image pattern.
    ///
    /// Parameters (cx,cy) specify the left-top location of the image pattern, (w,h) the size of one image,
    /// angle rotation around the top-left corner, id is handle to the image to render.
    pub fn image_pattern(id: ImageId, cx: f32, cy: f32, w: f32, h: f32, angle: f32, alpha: f32) -> Self {
        let mut paint = Self::default();

        paint.transform.rotate(angle);
        paint.transform[4] = cx;
        paint.transform[5] = cy;

        paint.extent[0] = w;
        paint.extent[1] = h;

        paint.image = Some(id);

        paint.inner_color = Color::rgbaf(1.0, 1.0, 1.0, alpha);
        paint.outer_color = Color::rgbaf(1.0, 1.0, 1.0, alpha);

        paint
    }

    /// Creates and returns a linear gradient paint.
    ///
    /// The gradient is transformed by the current transform when it is used for filling or stroking.
    pub fn linear_gradient(start_x: f32, start_y: f32, end_x: f32, end_y: f32, start_color: Color, end_color: Color) -> Self {
        let mut paint = Self::default();

        let large = 1e5f32;
        let mut dx = end_x - start_x;
        let mut dy = end_y - start_y;
        let d = (dx * dx + dy * dy).sqrt();

        if d > 0.0001 {
            dx /= d;
            dy /= d;
        } else {
            dx = 0.0;
            dy = 1.0;
        }

        paint.transform = Transform2D([dy, -dx, dx, dy, start_x - dx * large, start_y - dy * large]);

        paint.extent[0] = large;
        paint.extent[1] = large + d * 0.5;
        paint.radius = 0.0;
        paint.feather = 1.0f32.max(d);

        paint.inner_color = start_color;
        paint.outer_color = end_color;

        paint
    }

    /// Creates and returns a box gradient.
    ///
    /// Box gradient is a feathered rounded rectangle, it is useful for rendering
    /// drop shadows or highlights for boxes. Parameters (x,y) define the top-left corner of the rectangle,
    /// (w,h) define the size of the rectangle, r defines the corner radius, and f feather. Feather defines how blurry
    /// the border of the rectangle is.
    pub fn box_gradient(x: f32, y: f32, w: f32, h: f32, r: f32, f: f32, inner_color: Color, outer_color: Color) -> Self {
        let mut paint = Self::default();

        paint.transform[4] = x + w * 0.5;
        paint.transform[5] = y + h * 0.5;

        paint.extent[0] = w * 0.5;
        paint.extent[1] = h * 0.5;

        paint.radius = r;
        paint.feather = 1.0f32.max(f);

        paint.inner_color = inner_color;
        paint.outer_color = outer_color;

        paint
    }

    /// Creates and returns a radial gradient.
    ///
    /// Parameters (cx,cy) specify the center, inr and outr specify
    /// the inner and outer radius of the gradient, inner_color specifies the start color and outer_color the end color.
    pub fn radial_gradient(cx: f32, cy: f32, inr: f32, outr: f32, inner_color: Color, outer_color: Color) -> Self {
        let mut paint = Self::default();

        let r = (inr + outr) * 0.5;
        let f = outr - inr;

        paint.transform[4] = cx;
        paint.transform[5] = cy;

        paint.extent[0] = r;
        paint.extent[1] = r;

        paint.radius = r;
        paint.feather = 1.0f32.max(f);

        paint.inner_color = inner_color;
        paint.outer_color = outer_color;

        paint
    }

    pub fn transform(&self) -> Transform2D {
        self.transform
    }

    pub fn set_transform(&mut self, transform: Transform2D) {
        self.transform = transform;
    }

    pub fn extent(&self) -> [f32; 2] {
        self.extent
    }

    pub fn set_extent(&mut self, extent: [f32; 2]) {
        self.extent = extent;
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn set_radius(&mut self, radius: f32) {
        self.radius = radius;
    }

    pub fn feather(&self) -> f32 {
        self.feather
    }

    pub fn set_feather(&mut self, feather: f32) {
        self.feather = feather;
    }

    pub fn inner_color(&self) -> Color {
        self.inner_color
    }

    pub fn set_inner_color(&mut self, color: Color) {
        self.inner_color = color;
    }

    pub fn outer_color(&self) -> Color {
        self.outer_color
    }

    pub fn set_outer_color(&mut self, color: Color) {
        self.outer_color = color;
    }

    pub fn image(&self) -> Option<ImageId> {
        self.image
    }

    pub fn set_image(&mut self, image: Option<ImageId>) {
        self.image = image;
    }

    pub fn set_color(&mut self, color: Color) {
        self.transform = Transform2D::identity();
        self.radius = 0.0;
        self.feather = 1.0;
        self.inner_color = color;
        self.outer_color = color;
    }

    /// Scales the alpha of both gradient colors. Used for global alpha and
    /// the coverage emulation of hairline strokes.
    pub(crate) fn mul_alpha(&mut self, a: f32) {
        self.inner_color.a *= a;
        self.outer_color.a *= a;
    }
}
