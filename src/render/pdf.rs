// Minimal A4 document writer on top of lopdf (standard Helvetica faces, no embedded fonts)

use chrono::{DateTime, Utc};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};

use crate::types::{WorkerError, WorkerResult};

pub const PAGE_WIDTH: f32 = 595.28;
pub const PAGE_HEIGHT: f32 = 841.89;
pub const MARGIN: f32 = 50.0;
pub const CONTENT_WIDTH: f32 = PAGE_WIDTH - 2.0 * MARGIN;
const FOOTER_SPACE: f32 = 40.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    fn operands(self) -> Vec<Object> {
        vec![
            (self.0 as f32 / 255.0).into(),
            (self.1 as f32 / 255.0).into(),
            (self.2 as f32 / 255.0).into(),
        ]
    }
}

pub const PRIMARY: Rgb = Rgb(30, 58, 138);
pub const ACCENT: Rgb = Rgb(59, 130, 246);
pub const TEXT: Rgb = Rgb(31, 41, 55);
pub const MUTED: Rgb = Rgb(107, 114, 128);
pub const PANEL: Rgb = Rgb(243, 244, 246);
pub const RULE: Rgb = Rgb(220, 220, 220);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Font {
    Regular,
    Bold,
    Italic,
}

impl Font {
    const fn resource(self) -> &'static str {
        match self {
            Font::Regular => "F1",
            Font::Bold => "F2",
            Font::Italic => "F3",
        }
    }

    const fn base_font(self) -> &'static str {
        match self {
            Font::Regular => "Helvetica",
            Font::Bold => "Helvetica-Bold",
            Font::Italic => "Helvetica-Oblique",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Right,
}

/// Uncompressed 8-bit RGB pixels.
#[derive(Debug, Clone)]
pub struct RasterImage {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

/// A table column: header text, width in points and alignment.
#[derive(Debug, Clone, Copy)]
pub struct Column<'a> {
    pub header: &'a str,
    pub width: f32,
    pub align: Align,
}

impl<'a> Column<'a> {
    pub const fn left(header: &'a str, width: f32) -> Self {
        Self { header, width, align: Align::Left }
    }

    pub const fn right(header: &'a str, width: f32) -> Self {
        Self { header, width, align: Align::Right }
    }
}

pub struct PdfWriter {
    pages: Vec<Vec<Operation>>,
    current: Vec<Operation>,
    cursor: f32,
    images: Vec<RasterImage>,
    generated_at: DateTime<Utc>,
}

impl PdfWriter {
    pub fn new(generated_at: DateTime<Utc>) -> Self {
        Self {
            pages: Vec::new(),
            current: Vec::new(),
            cursor: MARGIN,
            images: Vec::new(),
            generated_at,
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len() + 1
    }

    /// Organisation name, title, subtitle lines and a rule.
    pub fn header(&mut self, org_name: &str, title: &str, subtitle: &[String]) {
        self.line_of_text(MARGIN, 9.0, Font::Bold, MUTED, &org_name.to_uppercase());
        self.cursor += 4.0;
        self.line_of_text(MARGIN, 18.0, Font::Bold, PRIMARY, title);
        self.cursor += 4.0;
        for line in subtitle {
            self.line_of_text(MARGIN, 10.0, Font::Regular, MUTED, line);
            self.cursor += 2.0;
        }
        self.cursor += 6.0;
        self.rule(ACCENT, 1.5);
        self.cursor += 14.0;
    }

    pub fn heading(&mut self, text: &str) {
        self.ensure_space(40.0);
        self.cursor += 8.0;
        self.line_of_text(MARGIN, 13.0, Font::Bold, PRIMARY, text);
        self.cursor += 4.0;
        self.rule(RULE, 0.5);
        self.cursor += 8.0;
    }

    /// Wrapped body text.
    pub fn paragraph(&mut self, text: &str, font: Font, color: Rgb) {
        let size = 10.0;
        for line in wrap(text, CONTENT_WIDTH, size) {
            self.ensure_space(size + 4.0);
            self.line_of_text(MARGIN, size, font, color, &line);
            self.cursor += 4.0;
        }
    }

    pub fn bullet(&mut self, text: &str) {
        let size = 10.0;
        for (i, line) in wrap(text, CONTENT_WIDTH - 14.0, size).into_iter().enumerate() {
            self.ensure_space(size + 4.0);
            if i == 0 {
                self.text_at(MARGIN + 2.0, self.baseline(size), size, Font::Regular, TEXT, "-");
            }
            self.line_of_text(MARGIN + 14.0, size, Font::Regular, TEXT, &line);
            self.cursor += 4.0;
        }
    }

    pub fn key_value(&mut self, label: &str, value: &str, emphasize: bool) {
        let size = 11.0;
        let font = if emphasize { Font::Bold } else { Font::Regular };
        self.ensure_space(size + 6.0);
        let baseline = self.baseline(size);
        self.text_at(MARGIN, baseline, size, font, TEXT, &fit(label, 200.0, size));
        let value = fit(value, CONTENT_WIDTH - 210.0, size);
        let x = PAGE_WIDTH - MARGIN - text_width(&value, size);
        self.text_at(x, baseline, size, font, TEXT, &value);
        self.cursor += size + 6.0;
    }

    /// Row of summary cards, at most three.
    pub fn cards(&mut self, cards: &[(&str, String)]) {
        let cards = &cards[..cards.len().min(3)];
        if cards.is_empty() {
            return;
        }
        let gap = 10.0;
        let width = (CONTENT_WIDTH - gap * (cards.len() as f32 - 1.0)) / cards.len() as f32;
        let height = 52.0;
        self.ensure_space(height + 12.0);

        let top = self.cursor;
        for (i, (label, value)) in cards.iter().enumerate() {
            let x = MARGIN + i as f32 * (width + gap);
            self.fill_rect(x, top, width, height, PANEL);
            self.fill_rect(x, top, 3.0, height, ACCENT);
            self.text_at(x + 12.0, PAGE_HEIGHT - top - 18.0, 9.0, Font::Regular, MUTED, &fit(label, width - 20.0, 9.0));
            self.text_at(x + 12.0, PAGE_HEIGHT - top - 40.0, 15.0, Font::Bold, PRIMARY, &fit(value, width - 20.0, 15.0));
        }
        self.cursor = top + height + 14.0;
    }

    pub fn table(&mut self, columns: &[Column<'_>], rows: &[Vec<String>]) {
        let size = 9.5;
        let row_height = 18.0;

        self.table_header(columns, size, row_height);
        for row in rows {
            if self.remaining() < row_height {
                self.new_page();
                self.table_header(columns, size, row_height);
            }
            let top = self.cursor;
            let mut x = MARGIN;
            for (column, cell) in columns.iter().zip(row) {
                self.cell(x, top, column, cell, size, Font::Regular);
                x += column.width;
            }
            self.cursor += row_height;
            self.hline(MARGIN, x, self.cursor, RULE, 0.5);
        }
        self.cursor += 10.0;
    }

    /// Colour swatches with labels, two per row.
    pub fn legend(&mut self, entries: &[(Rgb, String)]) {
        let size = 9.0;
        let column_width = CONTENT_WIDTH / 2.0;
        for pair in entries.chunks(2) {
            self.ensure_space(size + 6.0);
            let top = self.cursor;
            for (i, (color, label)) in pair.iter().enumerate() {
                let x = MARGIN + i as f32 * column_width;
                self.fill_rect(x, top + 1.0, 8.0, 8.0, *color);
                let text = fit(label, column_width - 20.0, size);
                self.text_at(x + 13.0, PAGE_HEIGHT - top - size, size, Font::Regular, TEXT, &text);
            }
            self.cursor = top + size + 6.0;
        }
        self.cursor += 6.0;
    }

    /// Embed an image scaled to `display_width` points, keeping its aspect ratio.
    pub fn image(&mut self, image: RasterImage, display_width: f32) {
        if image.width == 0 || image.height == 0 {
            return;
        }
        let display_height = display_width * image.height as f32 / image.width as f32;
        self.ensure_space(display_height + 10.0);

        self.images.push(image);
        let name = format!("Im{}", self.images.len());
        let x = MARGIN + (CONTENT_WIDTH - display_width) / 2.0;
        let y = PAGE_HEIGHT - self.cursor - display_height;

        self.current.push(Operation::new("q", vec![]));
        self.current.push(Operation::new(
            "cm",
            vec![
                display_width.into(),
                0.0f32.into(),
                0.0f32.into(),
                display_height.into(),
                x.into(),
                y.into(),
            ],
        ));
        self.current.push(Operation::new("Do", vec![Object::Name(name.into_bytes())]));
        self.current.push(Operation::new("Q", vec![]));
        self.cursor += display_height + 10.0;
    }

    pub fn spacer(&mut self, height: f32) {
        self.cursor += height;
    }

    pub fn new_page(&mut self) {
        let finished = std::mem::take(&mut self.current);
        self.pages.push(finished);
        self.cursor = MARGIN;
    }

    /// Stamp footers and serialize the document.
    pub fn finish(mut self) -> WorkerResult<Vec<u8>> {
        let finished = std::mem::take(&mut self.current);
        self.pages.push(finished);

        let total = self.pages.len();
        let generated = format!("Generated {}", self.generated_at.format("%d %b %Y"));
        let pages = std::mem::take(&mut self.pages);

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let resources_id = self.add_resources(&mut doc);

        let mut kids: Vec<Object> = Vec::with_capacity(total);
        for (index, mut operations) in pages.into_iter().enumerate() {
            footer(&mut operations, &generated, index + 1, total);
            let content = Content { operations }
                .encode()
                .map_err(|e| WorkerError::Render(format!("failed to encode page: {}", e)))?;
            let content_id = doc.add_object(Stream::new(Dictionary::new(), content));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => resources_id,
                "MediaBox" => vec![0.0f32.into(), 0.0f32.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
            });
            kids.push(page_id.into());
        }

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => total as i64,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.compress();

        let mut out = Vec::new();
        doc.save_to(&mut out)
            .map_err(|e| WorkerError::Render(format!("failed to write document: {}", e)))?;
        Ok(out)
    }

    fn add_resources(&mut self, doc: &mut Document) -> ObjectId {
        let mut fonts = Dictionary::new();
        for font in [Font::Regular, Font::Bold, Font::Italic] {
            let id = doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => font.base_font(),
                "Encoding" => "WinAnsiEncoding",
            });
            fonts.set(font.resource(), id);
        }

        let mut xobjects = Dictionary::new();
        for (i, image) in std::mem::take(&mut self.images).into_iter().enumerate() {
            let dict = dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => image.width as i64,
                "Height" => image.height as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
            };
            let id = doc.add_object(Stream::new(dict, image.rgb));
            xobjects.set(format!("Im{}", i + 1), id);
        }

        doc.add_object(dictionary! {
            "Font" => fonts,
            "XObject" => xobjects,
        })
    }

    fn remaining(&self) -> f32 {
        PAGE_HEIGHT - MARGIN - FOOTER_SPACE - self.cursor
    }

    fn ensure_space(&mut self, height: f32) {
        if self.remaining() < height {
            self.new_page();
        }
    }

    fn baseline(&self, size: f32) -> f32 {
        PAGE_HEIGHT - self.cursor - size
    }

    fn line_of_text(&mut self, x: f32, size: f32, font: Font, color: Rgb, text: &str) {
        let baseline = self.baseline(size);
        self.text_at(x, baseline, size, font, color, text);
        self.cursor += size;
    }

    fn text_at(&mut self, x: f32, y: f32, size: f32, font: Font, color: Rgb, text: &str) {
        push_text(&mut self.current, x, y, size, font, color, text);
    }

    fn table_header(&mut self, columns: &[Column<'_>], size: f32, row_height: f32) {
        self.ensure_space(row_height * 2.0);
        let width: f32 = columns.iter().map(|c| c.width).sum();
        let top = self.cursor;
        self.fill_rect(MARGIN, top, width, row_height, PANEL);
        let mut x = MARGIN;
        for column in columns {
            self.cell(x, top, column, column.header, size, Font::Bold);
            x += column.width;
        }
        self.cursor += row_height;
    }

    fn cell(&mut self, x: f32, top: f32, column: &Column<'_>, text: &str, size: f32, font: Font) {
        let padding = 5.0;
        let text = fit(text, column.width - 2.0 * padding, size);
        let text_x = match column.align {
            Align::Left => x + padding,
            Align::Right => x + column.width - padding - text_width(&text, size),
        };
        let y = PAGE_HEIGHT - top - 12.5;
        self.text_at(text_x, y, size, font, TEXT, &text);
    }

    fn fill_rect(&mut self, x: f32, top: f32, width: f32, height: f32, color: Rgb) {
        let y = PAGE_HEIGHT - top - height;
        self.current.push(Operation::new("rg", color.operands()));
        self.current.push(Operation::new(
            "re",
            vec![x.into(), y.into(), width.into(), height.into()],
        ));
        self.current.push(Operation::new("f", vec![]));
    }

    fn rule(&mut self, color: Rgb, width: f32) {
        let y = self.cursor;
        self.hline(MARGIN, PAGE_WIDTH - MARGIN, y, color, width);
    }

    fn hline(&mut self, x1: f32, x2: f32, top: f32, color: Rgb, width: f32) {
        push_hline(&mut self.current, x1, x2, PAGE_HEIGHT - top, color, width);
    }
}

fn footer(operations: &mut Vec<Operation>, generated: &str, page: usize, total: usize) {
    let y = MARGIN - 10.0;
    push_hline(operations, MARGIN, PAGE_WIDTH - MARGIN, y + 14.0, RULE, 0.5);
    push_text(operations, MARGIN, y, 8.0, Font::Italic, MUTED, generated);
    let label = format!("Page {} of {}", page, total);
    let x = PAGE_WIDTH - MARGIN - text_width(&label, 8.0);
    push_text(operations, x, y, 8.0, Font::Italic, MUTED, &label);
}

fn push_text(ops: &mut Vec<Operation>, x: f32, y: f32, size: f32, font: Font, color: Rgb, text: &str) {
    ops.push(Operation::new("BT", vec![]));
    ops.push(Operation::new("rg", color.operands()));
    ops.push(Operation::new(
        "Tf",
        vec![Object::Name(font.resource().as_bytes().to_vec()), size.into()],
    ));
    ops.push(Operation::new("Td", vec![x.into(), y.into()]));
    ops.push(Operation::new(
        "Tj",
        vec![Object::String(encode_text(text), StringFormat::Literal)],
    ));
    ops.push(Operation::new("ET", vec![]));
}

fn push_hline(ops: &mut Vec<Operation>, x1: f32, x2: f32, y: f32, color: Rgb, width: f32) {
    ops.push(Operation::new("RG", color.operands()));
    ops.push(Operation::new("w", vec![width.into()]));
    ops.push(Operation::new("m", vec![x1.into(), y.into()]));
    ops.push(Operation::new("l", vec![x2.into(), y.into()]));
    ops.push(Operation::new("S", vec![]));
}

/// Latin-1 subset of WinAnsi; anything else becomes `?`.
fn encode_text(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c as u32 {
            0x20..=0x7e | 0xa0..=0xff => c as u32 as u8,
            _ if c.is_whitespace() => b' ',
            _ => b'?',
        })
        .collect()
}

/// Approximate Helvetica advance width.
pub fn text_width(text: &str, size: f32) -> f32 {
    text.chars()
        .map(|c| match c {
            'i' | 'j' | 'l' | '.' | ',' | ':' | ';' | '\'' | '!' | '|' | ' ' => 0.28,
            'm' | 'w' | 'M' | 'W' => 0.83,
            'A'..='Z' | '0'..='9' => 0.64,
            _ => 0.52,
        })
        .sum::<f32>()
        * size
}

/// Truncate with an ellipsis so the text fits within `width`.
pub fn fit(text: &str, width: f32, size: f32) -> String {
    if text_width(text, size) <= width {
        return text.to_string();
    }
    let budget = width - text_width("...", size);
    let mut out = String::new();
    for c in text.chars() {
        let mut candidate = out.clone();
        candidate.push(c);
        if text_width(&candidate, size) > budget {
            break;
        }
        out = candidate;
    }
    out.push_str("...");
    out
}

/// Greedy word wrap. Words longer than a line are truncated.
pub fn wrap(text: &str, width: f32, size: f32) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.lines() {
        let mut line = String::new();
        for word in paragraph.split_whitespace() {
            let candidate = if line.is_empty() {
                word.to_string()
            } else {
                format!("{} {}", line, word)
            };
            if text_width(&candidate, size) <= width {
                line = candidate;
            } else {
                if !line.is_empty() {
                    lines.push(std::mem::take(&mut line));
                }
                line = fit(word, width, size);
            }
        }
        lines.push(line);
    }
    lines
}
