use std::borrow::Cow;

use bitflags::bitflags;
use imgref::ImgRef;
use rgb::alt::GRAY8;
use rgb::{ComponentBytes, RGBA8};
use slotmap::SlotMap;

slotmap::new_key_type! {
    /// Handle to a texture owned by the back-end. Handles are allocated and
    /// recycled by the context; the back-end only ever sees them as opaque keys.
    pub struct ImageId;
}

bitflags! {
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    pub struct ImageFlags: u32 {
        const GENERATE_MIPMAPS = 1 << 0; // Generate mipmaps during creation of the image.
        const REPEAT_X = 1 << 1;         // Repeat image in X direction.
        const REPEAT_Y = 1 << 2;         // Repeat image in Y direction.
        const FLIP_Y = 1 << 3;           // Flips (inverses) image in Y direction when rendered.
        const PREMULTIPLIED = 1 << 4;    // Image data has premultiplied alpha.
        const NEAREST = 1 << 5;          // Image interpolation is Nearest instead Linear
    }
}

impl Default for ImageFlags {
    fn default() -> Self {
        Self::empty()
    }
}

/// Texel layout of a back-end texture.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TextureKind {
    /// Single channel, used for the font atlas.
    Alpha,
    /// 8-bit RGBA.
    Rgba,
}

#[derive(Copy, Clone, Debug)]
pub struct ImageInfo {
    flags: ImageFlags,
    width: usize,
    height: usize,
    kind: TextureKind,
}

impl ImageInfo {
    pub fn new(flags: ImageFlags, width: usize, height: usize, kind: TextureKind) -> Self {
        Self {
            flags,
            width,
            height,
            kind,
        }
    }

    pub fn flags(&self) -> ImageFlags {
        self.flags
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn kind(&self) -> TextureKind {
        self.kind
    }
}

/// A borrowed, already-decoded pixel buffer. Decoding file formats is the
/// caller's concern; the context only accepts prepared texel data.
#[derive(Copy, Clone)]
pub enum ImageSource<'a> {
    Rgba(ImgRef<'a, RGBA8>),
    Gray(ImgRef<'a, GRAY8>),
}

impl ImageSource<'_> {
    pub fn dimensions(&self) -> (usize, usize) {
        match self {
            Self::Rgba(img) => (img.width(), img.height()),
            Self::Gray(img) => (img.width(), img.height()),
        }
    }

    pub fn kind(&self) -> TextureKind {
        match self {
            Self::Rgba(_) => TextureKind::Rgba,
            Self::Gray(_) => TextureKind::Alpha,
        }
    }

    /// Texel bytes with row padding stripped. Borrows when the buffer is
    /// already tightly packed.
    pub(crate) fn packed_bytes(&self) -> Cow<'_, [u8]> {
        match self {
            Self::Rgba(img) => packed(*img),
            Self::Gray(img) => packed(*img),
        }
    }
}

impl<'a> From<ImgRef<'a, RGBA8>> for ImageSource<'a> {
    fn from(img: ImgRef<'a, RGBA8>) -> Self {
        Self::Rgba(img)
    }
}

impl<'a> From<ImgRef<'a, GRAY8>> for ImageSource<'a> {
    fn from(img: ImgRef<'a, GRAY8>) -> Self {
        Self::Gray(img)
    }
}

fn packed<'a, T: Copy>(img: ImgRef<'a, T>) -> Cow<'a, [u8]>
where
    [T]: ComponentBytes<u8>,
{
    let (width, height) = (img.width(), img.height());

    if img.stride() == width {
        Cow::Borrowed(img.into_buf()[..width * height].as_bytes())
    } else {
        let mut out = Vec::with_capacity(width * height * std::mem::size_of::<T>());
        for row in img.rows() {
            out.extend_from_slice(row.as_bytes());
        }
        Cow::Owned(out)
    }
}

/// Context-side record of the textures alive in the back-end, so size and
/// format queries never round-trip through the renderer.
#[derive(Default)]
pub(crate) struct ImageStore(SlotMap<ImageId, ImageInfo>);

impl ImageStore {
    pub fn alloc(&mut self, info: ImageInfo) -> ImageId {
        self.0.insert(info)
    }

    pub fn get(&self, id: ImageId) -> Option<&ImageInfo> {
        self.0.get(id)
    }

    pub fn remove(&mut self, id: ImageId) -> Option<ImageInfo> {
        self.0.remove(id)
    }
}
