use hitcanvas::{
    Bounds, Context, FontId, FontStyle, GlyphAtlas, GlyphEvent, GlyphQuad, TextCursor, TextMetrics,
};

mod recorder;
use recorder::Recorder;

const ADVANCE: f32 = 10.0;

/// Fixed-advance glyph atlas stand-in. Every glyph is 8x10 with a 10 unit
/// advance; glyphs only rasterize once `fits_from_generation` atlas
/// generations exist, which lets tests force the grow-and-retry path.
struct MockAtlas {
    size: (usize, usize),
    data: Vec<u8>,
    dirty: Option<[usize; 4]>,
    fits_from_generation: usize,
    generation: usize,
}

impl MockAtlas {
    fn new(fits_from_generation: usize) -> Self {
        Self {
            size: (512, 512),
            data: vec![0; 512 * 512],
            dirty: None,
            fits_from_generation,
            generation: 0,
        }
    }
}

impl GlyphAtlas for MockAtlas {
    fn find_font(&self, name: &str) -> Option<FontId> {
        (name == "sans").then_some(FontId(0))
    }

    fn set_style(&mut self, _style: &FontStyle) {}

    fn vertical_metrics(&mut self) -> TextMetrics {
        TextMetrics {
            ascender: 8.0,
            descender: -2.0,
            line_height: 12.0,
        }
    }

    fn line_bounds(&mut self, y: f32) -> (f32, f32) {
        (y - 8.0, y + 2.0)
    }

    fn text_bounds(&mut self, x: f32, y: f32, text: &str) -> (f32, Bounds) {
        let w = text.chars().count() as f32 * ADVANCE;

        (
            x + w,
            Bounds {
                minx: x,
                miny: y - 8.0,
                maxx: x + w,
                maxy: y + 2.0,
            },
        )
    }

    fn iter_begin(&mut self, _text: &str, x: f32, y: f32, bitmap_required: bool) -> TextCursor {
        TextCursor {
            x,
            y,
            next_x: x,
            next_y: y,
            start: 0,
            next: 0,
            codepoint: '\0',
            bitmap_required,
        }
    }

    fn iter_next(&mut self, text: &str, cursor: &mut TextCursor) -> GlyphEvent {
        if cursor.next >= text.len() {
            return GlyphEvent::Done;
        }

        let c = text[cursor.next..].chars().next().unwrap();
        cursor.start = cursor.next;
        cursor.next += c.len_utf8();
        cursor.codepoint = c;
        cursor.x = cursor.next_x;

        if cursor.bitmap_required && self.generation < self.fits_from_generation {
            return GlyphEvent::Missing;
        }

        let quad = GlyphQuad {
            x0: cursor.x,
            y0: cursor.y - 8.0,
            x1: cursor.x + 8.0,
            y1: cursor.y + 2.0,
            s0: 0.0,
            t0: 0.0,
            s1: 0.1,
            t1: 0.1,
        };

        self.dirty = Some([0, 0, 16, 16]);
        cursor.next_x = cursor.x + ADVANCE;

        GlyphEvent::Quad(quad)
    }

    fn take_dirty_rect(&mut self) -> Option<[usize; 4]> {
        self.dirty.take()
    }

    fn texture_size(&self) -> (usize, usize) {
        self.size
    }

    fn texture_data(&self) -> &[u8] {
        &self.data
    }

    fn reset(&mut self, width: usize, height: usize) {
        self.size = (width, height);
        self.data = vec![0; width * height];
        self.generation += 1;
    }
}

fn text_context(fits_from_generation: usize) -> Context<Recorder> {
    let mut ctx = Context::with_glyph_atlas(Recorder::default(), Box::new(MockAtlas::new(fits_from_generation))).unwrap();
    ctx.begin_frame(800.0, 600.0, 1.0);

    let font = ctx.find_font("sans").unwrap();
    ctx.set_font(font);

    ctx
}

#[test]
fn fill_text_emits_six_vertices_per_glyph() {
    let mut ctx = text_context(1);

    let advance = ctx.fill_text(10.0, 20.0, "abc");

    assert_eq!(advance, 10.0 + 3.0 * ADVANCE);
    assert_eq!(ctx.renderer().triangle_calls, vec![18]);
    // The dirty atlas rows were uploaded before drawing.
    assert!(ctx.renderer().texture_updates >= 1);
}

#[test]
fn missing_glyphs_grow_the_atlas_and_retry() {
    // Glyphs fit only after one growth past the initial generation.
    let mut ctx = text_context(2);

    let advance = ctx.fill_text(0.0, 0.0, "abc");

    assert_eq!(advance, 3.0 * ADVANCE);

    // All glyphs still came out, across the flush boundary.
    let total: usize = ctx.renderer().triangle_calls.iter().sum();
    assert_eq!(total, 18);

    // The grown generation doubles the shorter dimension.
    assert!(ctx.renderer().textures.iter().any(|&(_, _, w, h)| (w, h) == (1024, 512)));
}

#[test]
fn exhausted_atlas_drops_remaining_text() {
    // Never fits: growth runs out of generations, no panic, no quads.
    let mut ctx = text_context(100);

    ctx.fill_text(0.0, 0.0, "abc");

    assert!(ctx.renderer().triangle_calls.is_empty());
}

#[test]
fn text_without_a_font_is_a_noop() {
    let mut ctx = Context::with_glyph_atlas(Recorder::default(), Box::new(MockAtlas::new(1))).unwrap();
    ctx.begin_frame(800.0, 600.0, 1.0);

    let advance = ctx.fill_text(5.0, 5.0, "abc");

    assert_eq!(advance, 5.0);
    assert!(ctx.renderer().triangle_calls.is_empty());
}

#[test]
fn break_lines_split_words_and_collapse_crlf() {
    let mut ctx = text_context(1);

    let text = "aaa bb\r\ncc";
    let rows = ctx.text_break_lines(text, 45.0);

    assert_eq!(rows.len(), 3);

    assert_eq!(&text[rows[0].start..rows[0].end], "aaa");
    assert_eq!(&text[rows[1].start..rows[1].end], "bb");
    assert_eq!(&text[rows[2].start..rows[2].end], "cc");

    assert_eq!(rows[0].width, 3.0 * ADVANCE);
    assert_eq!(rows[1].width, 2.0 * ADVANCE);

    // The second row resumes at the word, past the separating space.
    assert_eq!(rows[0].next, 4);
}

#[test]
fn break_lines_force_break_overlong_words() {
    let mut ctx = text_context(1);

    let text = "aaaaaaaa";
    let rows = ctx.text_break_lines(text, 35.0);

    // 8 glyphs, 3 per row.
    assert_eq!(rows.len(), 3);
    assert_eq!(&text[rows[0].start..rows[0].end], "aaa");
    assert_eq!(&text[rows[1].start..rows[1].end], "aaa");
    assert_eq!(&text[rows[2].start..rows[2].end], "aa");
}

#[test]
fn text_bounds_use_line_metrics() {
    let mut ctx = text_context(1);

    let (advance, bounds) = ctx.text_bounds(5.0, 10.0, "ab");

    assert_eq!(advance, 25.0);
    assert_eq!(bounds.minx, 5.0);
    assert_eq!(bounds.maxx, 25.0);
    assert_eq!(bounds.miny, 2.0);
    assert_eq!(bounds.maxy, 12.0);
}

#[test]
fn glyph_positions_track_the_pen() {
    let mut ctx = text_context(1);

    let positions = ctx.text_glyph_positions(10.0, 0.0, "abc");

    assert_eq!(positions.len(), 3);
    assert_eq!(positions[0].x, 10.0);
    assert_eq!(positions[1].x, 20.0);
    assert_eq!(positions[2].x, 30.0);
    assert_eq!(positions[2].byte_index, 2);
}

#[test]
fn end_frame_rotates_atlas_generations() {
    let mut ctx = text_context(2);

    ctx.fill_text(0.0, 0.0, "abc");

    // Growth produced a second, larger generation.
    let grown: Vec<_> = ctx.renderer().textures.clone();
    assert_eq!(grown.len(), 2);

    ctx.end_frame();

    // The smaller initial generation is deleted, the large one survives as
    // generation zero.
    let remaining: Vec<_> = ctx.renderer().textures.clone();
    assert_eq!(remaining.len(), 1);
    assert_eq!((remaining[0].2, remaining[0].3), (1024, 512));
}
