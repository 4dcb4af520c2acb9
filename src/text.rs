use bitflags::bitflags;

use crate::geometry::Bounds;
use crate::image::{ImageFlags, ImageInfo, TextureKind};
use crate::renderer::{Renderer, Vertex};
use crate::Context;

pub(crate) const MAX_FONT_IMAGES: usize = 4;
pub(crate) const INIT_FONT_IMAGE_SIZE: usize = 512;
const MAX_FONT_IMAGE_SIZE: usize = 2048;

/// Handle to a font registered with the glyph atlas.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct FontId(pub usize);

bitflags! {
    /// Text alignment: one horizontal flag OR-combined with one vertical flag.
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    pub struct Align: u32 {
        // Horizontal
        const LEFT      = 1 << 0;
        const CENTER    = 1 << 1;
        const RIGHT     = 1 << 2;
        // Vertical
        const TOP       = 1 << 3;
        const MIDDLE    = 1 << 4;
        const BOTTOM    = 1 << 5;
        const BASELINE  = 1 << 6;
    }
}

impl Default for Align {
    fn default() -> Self {
        Self::LEFT | Self::BASELINE
    }
}

/// Font parameters handed to the atlas before iteration. All sizes are
/// pre-scaled to atlas space by the context.
#[derive(Copy, Clone, Debug)]
pub struct FontStyle {
    pub font: FontId,
    pub size: f32,
    pub blur: f32,
    pub letter_spacing: f32,
    pub align: Align,
}

/// Scaled vertical font metrics.
#[derive(Copy, Clone, Debug, Default)]
pub struct TextMetrics {
    pub ascender: f32,
    pub descender: f32,
    pub line_height: f32,
}

/// One glyph quad in atlas space: screen corners plus atlas UVs.
#[derive(Copy, Clone, Debug, Default)]
pub struct GlyphQuad {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
    pub s0: f32,
    pub t0: f32,
    pub s1: f32,
    pub t1: f32,
}

/// Iteration state over the glyphs of a string. `Copy`, so the context can
/// snapshot it before each glyph and rewind after growing the atlas.
#[derive(Copy, Clone, Debug)]
pub struct TextCursor {
    /// Pen position before the current glyph.
    pub x: f32,
    pub y: f32,
    /// Pen position after the current glyph.
    pub next_x: f32,
    pub next_y: f32,
    /// Byte offset of the current glyph in the input string.
    pub start: usize,
    /// Byte offset of the glyph after the current one.
    pub next: usize,
    pub codepoint: char,
    /// Whether iteration needs rasterized bitmaps or only metrics.
    pub bitmap_required: bool,
}

impl Default for TextCursor {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            next_x: 0.0,
            next_y: 0.0,
            start: 0,
            next: 0,
            codepoint: '\0',
            bitmap_required: false,
        }
    }
}

/// Outcome of advancing a [`TextCursor`] by one glyph.
pub enum GlyphEvent {
    /// The glyph is in the atlas; its quad is ready to emit.
    Quad(GlyphQuad),
    /// The glyph did not fit the current atlas generation. The cursor has
    /// advanced past it; rewind and retry after growing the atlas.
    Missing,
    /// End of string.
    Done,
}

/// The narrow interface to an external glyph atlas, in the shape of a
/// fontstash: the atlas owns font data, rasterization, kerning and packing;
/// the context owns the atlas texture and all geometry.
pub trait GlyphAtlas {
    fn find_font(&self, name: &str) -> Option<FontId>;

    fn set_style(&mut self, style: &FontStyle);

    /// Vertical metrics for the current style.
    fn vertical_metrics(&mut self) -> TextMetrics;

    /// The (ymin, ymax) extent of a text row at baseline `y`.
    fn line_bounds(&mut self, y: f32) -> (f32, f32);

    /// Measures `text` without emitting quads. Returns the horizontal advance
    /// and the bounding box.
    fn text_bounds(&mut self, x: f32, y: f32, text: &str) -> (f32, Bounds);

    /// Starts glyph iteration at pen position (x, y), applying the current
    /// style's alignment.
    fn iter_begin(&mut self, text: &str, x: f32, y: f32, bitmap_required: bool) -> TextCursor;

    /// Advances the cursor by one glyph.
    fn iter_next(&mut self, text: &str, cursor: &mut TextCursor) -> GlyphEvent;

    /// Returns and clears the dirty region of the atlas texture, if any.
    fn take_dirty_rect(&mut self) -> Option<[usize; 4]>;

    fn texture_size(&self) -> (usize, usize);

    /// The full single-channel atlas texture, tightly packed.
    fn texture_data(&self) -> &[u8];

    /// Discards all packed glyphs and restarts with a texture of the given size.
    fn reset(&mut self, width: usize, height: usize);
}

/// A line of text produced by [`Context::text_break_lines`]. Indices are byte
/// offsets into the input string.
#[derive(Copy, Clone, Debug)]
pub struct TextRow {
    /// First byte of the row.
    pub start: usize,
    /// One past the last byte of the row.
    pub end: usize,
    /// First byte of the next row.
    pub next: usize,
    /// Logical width of the row.
    pub width: f32,
    /// Actual left extent of the row glyphs relative to the row origin.
    pub minx: f32,
    /// Actual right extent of the row glyphs relative to the row origin.
    pub maxx: f32,
}

/// Glyph position produced by [`Context::text_glyph_positions`].
#[derive(Copy, Clone, Debug)]
pub struct GlyphPosition {
    /// Byte offset of the glyph in the input string.
    pub byte_index: usize,
    /// Logical pen x of the glyph.
    pub x: f32,
    /// Left extent of the glyph shape.
    pub minx: f32,
    /// Right extent of the glyph shape.
    pub maxx: f32,
}

#[derive(Copy, Clone, Eq, PartialEq)]
enum CodepointType {
    Space,
    Newline,
    Char,
    CjkChar,
}

fn codepoint_type(codepoint: char, prev_codepoint: char) -> CodepointType {
    match codepoint {
        '\t' | '\u{b}' | '\u{c}' | ' ' | '\u{a0}' => CodepointType::Space,
        '\n' => {
            if prev_codepoint == '\r' {
                CodepointType::Space
            } else {
                CodepointType::Newline
            }
        }
        '\r' => {
            if prev_codepoint == '\n' {
                CodepointType::Space
            } else {
                CodepointType::Newline
            }
        }
        '\u{85}' => CodepointType::Newline,
        c => {
            let c = c as u32;

            // Breaks are permitted on both sides of CJK characters.
            if (0x4E00..=0x9FFF).contains(&c)    // CJK Unified Ideographs
                || (0x3000..=0x30FF).contains(&c) // CJK punctuation, Hiragana, Katakana
                || (0xFF00..=0xFFEF).contains(&c) // Halfwidth and Fullwidth Forms
                || (0x1100..=0x11FF).contains(&c) // Hangul Jamo
                || (0x3130..=0x318F).contains(&c) // Hangul Compatibility Jamo
                || (0xAC00..=0xD7AF).contains(&c)
            // Hangul Syllables
            {
                CodepointType::CjkChar
            } else {
                CodepointType::Char
            }
        }
    }
}

impl<R: Renderer> Context<R> {
    /// Looks up a font registered with the glyph atlas by name.
    pub fn find_font(&self, name: &str) -> Option<FontId> {
        self.glyph_atlas.as_ref()?.find_font(name)
    }

    /// Draws `text` at (x, y) with the current fill paint and font state.
    /// Returns the horizontal advance in user space.
    pub fn fill_text(&mut self, x: f32, y: f32, text: &str) -> f32 {
        let scale = self.font_scale() * self.device_px_ratio();
        let invscale = 1.0 / scale;

        let Some(style) = self.current_font_style(scale) else {
            return x;
        };
        let transform = self.state().transform;

        let Some(atlas) = self.glyph_atlas.as_mut() else {
            return x;
        };
        atlas.set_style(&style);

        // Conservative scratch estimate, reserved in 256-vertex blocks.
        let cverts = (text.len().max(2) * 6 + 0xff) & !0xff;
        let mut verts: Vec<Vertex> = Vec::with_capacity(cverts);

        let mut cursor = atlas.iter_begin(text, x * scale, y * scale, true);
        let mut prev_cursor = cursor;
        let mut retried = false;

        loop {
            let atlas = self.glyph_atlas.as_mut().unwrap();

            match atlas.iter_next(text, &mut cursor) {
                GlyphEvent::Done => break,
                GlyphEvent::Missing => {
                    if retried {
                        break;
                    }

                    // Flush what we have, grow the atlas and retry the glyph
                    // once at its pre-advance position.
                    if !verts.is_empty() {
                        self.render_text(&verts);
                        verts.clear();
                    }

                    if !self.alloc_text_atlas() {
                        break;
                    }

                    cursor = prev_cursor;
                    retried = true;
                }
                GlyphEvent::Quad(q) => {
                    retried = false;
                    prev_cursor = cursor;

                    let (x0, y0) = transform.transform_point(q.x0 * invscale, q.y0 * invscale);
                    let (x1, y1) = transform.transform_point(q.x1 * invscale, q.y0 * invscale);
                    let (x2, y2) = transform.transform_point(q.x1 * invscale, q.y1 * invscale);
                    let (x3, y3) = transform.transform_point(q.x0 * invscale, q.y1 * invscale);

                    verts.push(Vertex::new(x0, y0, q.s0, q.t0));
                    verts.push(Vertex::new(x2, y2, q.s1, q.t1));
                    verts.push(Vertex::new(x1, y1, q.s1, q.t0));
                    verts.push(Vertex::new(x0, y0, q.s0, q.t0));
                    verts.push(Vertex::new(x3, y3, q.s0, q.t1));
                    verts.push(Vertex::new(x2, y2, q.s1, q.t1));
                }
            }
        }

        self.flush_text_texture();
        self.render_text(&verts);

        cursor.next_x / scale
    }

    /// Draws multi-line text, breaking rows at `break_row_width` and honoring
    /// the horizontal part of the current text alignment.
    pub fn text_box(&mut self, x: f32, y: f32, break_row_width: f32, text: &str) {
        if self.state().font_id.is_none() || self.glyph_atlas.is_none() {
            return;
        }

        let old_align = self.state().text_align;
        let halign = old_align & (Align::LEFT | Align::CENTER | Align::RIGHT);
        let valign = old_align & (Align::TOP | Align::MIDDLE | Align::BOTTOM | Align::BASELINE);

        let line_height = self.state().line_height;
        let Some(metrics) = self.text_metrics() else {
            return;
        };

        self.state_mut().text_align = Align::LEFT | valign;

        let rows = self.text_break_lines(text, break_row_width);
        let mut y = y;

        for row in rows {
            let row_text = &text[row.start..row.end];

            if halign.contains(Align::LEFT) {
                self.fill_text(x, y, row_text);
            } else if halign.contains(Align::CENTER) {
                self.fill_text(x + break_row_width * 0.5 - row.width * 0.5, y, row_text);
            } else if halign.contains(Align::RIGHT) {
                self.fill_text(x + break_row_width - row.width, y, row_text);
            }

            y += metrics.line_height * line_height;
        }

        self.state_mut().text_align = old_align;
    }

    /// Breaks `text` into rows no wider than `break_row_width`.
    ///
    /// Rows break at word boundaries or mandatory newlines; words longer than
    /// a row are force-broken. White space is trimmed from row starts and
    /// `\r\n`/`\n\r` pairs collapse to a single newline.
    pub fn text_break_lines(&mut self, text: &str, break_row_width: f32) -> Vec<TextRow> {
        let scale = self.font_scale() * self.device_px_ratio();
        let invscale = 1.0 / scale;

        let mut rows = Vec::new();

        let Some(style) = self.current_font_style(scale) else {
            return rows;
        };

        if text.is_empty() || self.glyph_atlas.is_none() {
            return rows;
        }

        let atlas = self.glyph_atlas.as_mut().unwrap();
        atlas.set_style(&style);

        let break_row_width = break_row_width * scale;

        let mut row_start_x = 0.0;
        let mut row_width = 0.0;
        let mut row_min_x = 0.0;
        let mut row_max_x = 0.0;
        let mut row_start: Option<usize> = None;
        let mut row_end = 0;
        let mut word_start = 0;
        let mut word_start_x = 0.0;
        let mut word_min_x = 0.0;
        let mut break_end = 0;
        let mut break_width = 0.0;
        let mut break_max_x = 0.0;
        let mut ptype = CodepointType::Space;
        let mut pcodepoint = '\0';

        let mut cursor = atlas.iter_begin(text, 0.0, 0.0, false);
        let mut prev_cursor = cursor;

        loop {
            let atlas = self.glyph_atlas.as_mut().unwrap();

            let q = match atlas.iter_next(text, &mut cursor) {
                GlyphEvent::Done => break,
                GlyphEvent::Missing => {
                    if self.alloc_text_atlas() {
                        cursor = prev_cursor;
                    }
                    continue;
                }
                GlyphEvent::Quad(q) => q,
            };

            prev_cursor = cursor;

            let ctype = codepoint_type(cursor.codepoint, pcodepoint);

            if ctype == CodepointType::Newline {
                // Always handle new lines.
                rows.push(TextRow {
                    start: row_start.unwrap_or(cursor.start),
                    end: if row_start.is_some() { row_end } else { cursor.start },
                    width: row_width * invscale,
                    minx: row_min_x * invscale,
                    maxx: row_max_x * invscale,
                    next: cursor.next,
                });

                // Set null break point and skip white space until the
                // beginning of the next row.
                break_end = cursor.start;
                break_width = 0.0;
                break_max_x = 0.0;
                row_start = None;
                row_width = 0.0;
                row_min_x = 0.0;
                row_max_x = 0.0;
            } else if row_start.is_none() {
                if ctype == CodepointType::Char || ctype == CodepointType::CjkChar {
                    // The current char is the row so far.
                    row_start_x = cursor.x;
                    row_start = Some(cursor.start);
                    row_end = cursor.next;
                    row_width = cursor.next_x - row_start_x;
                    row_min_x = q.x0 - row_start_x;
                    row_max_x = q.x1 - row_start_x;
                    word_start = cursor.start;
                    word_start_x = cursor.x;
                    word_min_x = q.x0 - row_start_x;
                    // Set null break point
                    break_end = cursor.start;
                    break_width = 0.0;
                    break_max_x = 0.0;
                }
            } else {
                let next_width = cursor.next_x - row_start_x;

                // Track last non-white space character.
                if ctype == CodepointType::Char || ctype == CodepointType::CjkChar {
                    row_end = cursor.next;
                    row_width = cursor.next_x - row_start_x;
                    row_max_x = q.x1 - row_start_x;
                }

                // Track last end of a word.
                if ((ptype == CodepointType::Char || ptype == CodepointType::CjkChar) && ctype == CodepointType::Space)
                    || ctype == CodepointType::CjkChar
                {
                    break_end = cursor.start;
                    break_width = row_width;
                    break_max_x = row_max_x;
                }

                // Track last beginning of a word.
                if (ptype == CodepointType::Space && (ctype == CodepointType::Char || ctype == CodepointType::CjkChar))
                    || ctype == CodepointType::CjkChar
                {
                    word_start = cursor.start;
                    word_start_x = cursor.x;
                    word_min_x = q.x0 - row_start_x;
                }

                // Break to a new line when a character is beyond break width.
                if (ctype == CodepointType::Char || ctype == CodepointType::CjkChar) && next_width > break_row_width {
                    let start = row_start.unwrap();

                    if break_end == start {
                        // The current word is longer than the row length, just break it from here.
                        rows.push(TextRow {
                            start,
                            end: cursor.start,
                            width: row_width * invscale,
                            minx: row_min_x * invscale,
                            maxx: row_max_x * invscale,
                            next: cursor.start,
                        });

                        row_start_x = cursor.x;
                        row_start = Some(cursor.start);
                        row_end = cursor.next;
                        row_width = cursor.next_x - row_start_x;
                        row_min_x = q.x0 - row_start_x;
                        row_max_x = q.x1 - row_start_x;
                        word_start = cursor.start;
                        word_start_x = cursor.x;
                        word_min_x = q.x0 - row_start_x;
                    } else {
                        // Break the line from the end of the last word, and start new line from the beginning of the new.
                        rows.push(TextRow {
                            start,
                            end: break_end,
                            width: break_width * invscale,
                            minx: row_min_x * invscale,
                            maxx: break_max_x * invscale,
                            next: word_start,
                        });

                        row_start_x = word_start_x;
                        row_start = Some(word_start);
                        row_end = cursor.next;
                        row_width = cursor.next_x - row_start_x;
                        row_min_x = word_min_x;
                        row_max_x = q.x1 - row_start_x;
                        // No change to the word start
                    }

                    // Set null break point
                    break_end = row_start.unwrap();
                    break_width = 0.0;
                    break_max_x = 0.0;
                }
            }

            pcodepoint = cursor.codepoint;
            ptype = ctype;
        }

        // Emit the remainder.
        if let Some(start) = row_start {
            rows.push(TextRow {
                start,
                end: row_end,
                width: row_width * invscale,
                minx: row_min_x * invscale,
                maxx: row_max_x * invscale,
                next: text.len(),
            });
        }

        rows
    }

    /// Measures `text` drawn at (x, y). Returns the horizontal advance and
    /// the bounding box in user space.
    pub fn text_bounds(&mut self, x: f32, y: f32, text: &str) -> (f32, Bounds) {
        let scale = self.font_scale() * self.device_px_ratio();
        let invscale = 1.0 / scale;

        let Some(style) = self.current_font_style(scale) else {
            return (0.0, Bounds::default());
        };

        let Some(atlas) = self.glyph_atlas.as_mut() else {
            return (0.0, Bounds::default());
        };
        atlas.set_style(&style);

        let (advance, mut bounds) = atlas.text_bounds(x * scale, y * scale, text);

        // Use line bounds for height.
        let (ymin, ymax) = atlas.line_bounds(y * scale);
        bounds.miny = ymin;
        bounds.maxy = ymax;

        bounds.minx *= invscale;
        bounds.miny *= invscale;
        bounds.maxx *= invscale;
        bounds.maxy *= invscale;

        (advance * invscale, bounds)
    }

    /// Measures multi-line text laid out the way [`Context::text_box`] draws it.
    pub fn text_box_bounds(&mut self, x: f32, y: f32, break_row_width: f32, text: &str) -> Bounds {
        let mut bounds = Bounds::default();

        if self.state().font_id.is_none() || self.glyph_atlas.is_none() {
            return bounds;
        }

        let old_align = self.state().text_align;
        let halign = old_align & (Align::LEFT | Align::CENTER | Align::RIGHT);
        let valign = old_align & (Align::TOP | Align::MIDDLE | Align::BOTTOM | Align::BASELINE);

        let line_height_factor = self.state().line_height;
        let Some(metrics) = self.text_metrics() else {
            return bounds;
        };

        self.state_mut().text_align = Align::LEFT | valign;

        let rows = self.text_break_lines(text, break_row_width);
        let mut y = y;

        for row in rows {
            let row_text = &text[row.start..row.end];

            let rx = if halign.contains(Align::CENTER) {
                x + break_row_width * 0.5 - row.width * 0.5
            } else if halign.contains(Align::RIGHT) {
                x + break_row_width - row.width
            } else {
                x
            };

            let (_, row_bounds) = self.text_bounds(rx, y, row_text);
            bounds.union(&row_bounds);

            y += metrics.line_height * line_height_factor;
        }

        self.state_mut().text_align = old_align;

        bounds
    }

    /// Vertical metrics of the current font state in user space.
    pub fn text_metrics(&mut self) -> Option<TextMetrics> {
        let scale = self.font_scale() * self.device_px_ratio();
        let invscale = 1.0 / scale;

        let style = self.current_font_style(scale)?;
        let atlas = self.glyph_atlas.as_mut()?;
        atlas.set_style(&style);

        let m = atlas.vertical_metrics();

        Some(TextMetrics {
            ascender: m.ascender * invscale,
            descender: m.descender * invscale,
            line_height: m.line_height * invscale,
        })
    }

    /// Pen positions and glyph extents for each glyph of `text` drawn at (x, y).
    pub fn text_glyph_positions(&mut self, x: f32, y: f32, text: &str) -> Vec<GlyphPosition> {
        let scale = self.font_scale() * self.device_px_ratio();
        let invscale = 1.0 / scale;

        let mut positions = Vec::new();

        let Some(style) = self.current_font_style(scale) else {
            return positions;
        };

        if text.is_empty() || self.glyph_atlas.is_none() {
            return positions;
        }

        let atlas = self.glyph_atlas.as_mut().unwrap();
        atlas.set_style(&style);

        let mut cursor = atlas.iter_begin(text, x * scale, y * scale, false);
        let mut prev_cursor = cursor;

        loop {
            let atlas = self.glyph_atlas.as_mut().unwrap();

            match atlas.iter_next(text, &mut cursor) {
                GlyphEvent::Done => break,
                GlyphEvent::Missing => {
                    if self.alloc_text_atlas() {
                        cursor = prev_cursor;
                    }
                    continue;
                }
                GlyphEvent::Quad(q) => {
                    prev_cursor = cursor;

                    positions.push(GlyphPosition {
                        byte_index: cursor.start,
                        x: cursor.x * invscale,
                        minx: cursor.x.min(q.x0) * invscale,
                        maxx: cursor.next_x.max(q.x1) * invscale,
                    });
                }
            }
        }

        positions
    }

    fn current_font_style(&self, scale: f32) -> Option<FontStyle> {
        let state = self.state();

        Some(FontStyle {
            font: state.font_id?,
            size: state.font_size * scale,
            blur: state.font_blur * scale,
            letter_spacing: state.letter_spacing * scale,
            align: state.text_align,
        })
    }

    /// Uploads the atlas texture rows touched since the last flush.
    pub(crate) fn flush_text_texture(&mut self) {
        let Some(atlas) = self.glyph_atlas.as_mut() else {
            return;
        };

        let Some([_, y0, _, y1]) = atlas.take_dirty_rect() else {
            return;
        };

        let Some(image_id) = self.font_images[self.font_image_idx] else {
            return;
        };

        // Update whole rows; the atlas texture is tightly packed so the dirty
        // rows are contiguous.
        let (w, _) = atlas.texture_size();
        let data = atlas.texture_data();

        self.renderer.update_texture(image_id, 0, y0, w, y1 - y0, &data[y0 * w..y1 * w]);
    }

    /// Rotates to the next (larger) atlas generation. Returns false when the
    /// generation or size cap is reached, in which case remaining glyphs of
    /// the frame are dropped.
    pub(crate) fn alloc_text_atlas(&mut self) -> bool {
        self.flush_text_texture();

        if self.font_image_idx >= MAX_FONT_IMAGES - 1 {
            log::warn!("glyph atlas generations exhausted; dropping remaining text");
            return false;
        }

        let (iw, ih) = if let Some(next) = self.font_images[self.font_image_idx + 1] {
            // The next generation already has a texture from an earlier frame.
            let info = self.images.get(next).expect("font image must be registered");
            (info.width(), info.height())
        } else {
            // Double the shorter dimension, up to the cap.
            let current = self.font_images[self.font_image_idx].expect("current font image must exist");
            let info = self.images.get(current).expect("font image must be registered");
            let (mut iw, mut ih) = (info.width(), info.height());

            if iw > ih {
                ih *= 2;
            } else {
                iw *= 2;
            }

            if iw > MAX_FONT_IMAGE_SIZE || ih > MAX_FONT_IMAGE_SIZE {
                iw = MAX_FONT_IMAGE_SIZE;
                ih = MAX_FONT_IMAGE_SIZE;
            }

            let id = self.images.alloc(ImageInfo::new(ImageFlags::empty(), iw, ih, TextureKind::Alpha));

            if !self.renderer.create_texture(id, TextureKind::Alpha, iw, ih, ImageFlags::empty(), None) {
                log::warn!("back-end rejected {}x{} glyph atlas texture", iw, ih);
                self.images.remove(id);
                return false;
            }

            self.font_images[self.font_image_idx + 1] = Some(id);
            (iw, ih)
        };

        self.font_image_idx += 1;

        if let Some(atlas) = self.glyph_atlas.as_mut() {
            atlas.reset(iw, ih);
        }

        true
    }

    fn render_text(&mut self, verts: &[Vertex]) {
        if verts.is_empty() {
            return;
        }

        let state = self.state();
        let mut paint = state.fill;

        paint.set_image(self.font_images[self.font_image_idx]);
        paint.mul_alpha(state.alpha);

        let composite = state.composite_operation;
        let scissor = state.scissor;

        self.renderer.triangles(&paint, composite, &scissor, verts);
    }
}
