use std::fs::File;
use std::path::Path;

use anyhow::{bail, Context};
use image::DynamicImage;
use memmap2::Mmap;
use pdfium_render::prelude::{
    PdfFontWeight, PdfPage, PdfRect, PdfRenderConfig, Pdfium,
};
use plsfix::fix_text;
use tracing::instrument;
use url::Url;
use uuid::Uuid;

use crate::entities::{BBox, BoxNode, Page};

use super::TreeProvider;

/// Renders a PDF document with pdfium. All pages in the configured range are
/// stacked vertically into a single box tree; every extracted text line
/// becomes one text box.
#[derive(Debug, Clone)]
pub struct PdfTreeProvider {
    zoom: f32,
    include_screenshot: bool,
    first_page: usize,
    last_page: usize,
}

impl PdfTreeProvider {
    pub fn new(zoom: f32) -> Self {
        Self {
            zoom,
            include_screenshot: false,
            first_page: 0,
            last_page: usize::MAX,
        }
    }

    pub fn with_screenshot(mut self, include_screenshot: bool) -> Self {
        self.include_screenshot = include_screenshot;
        self
    }

    /// Limits rendering to pages `[first, last]` (zero-based, inclusive).
    pub fn with_page_range(mut self, first: usize, last: usize) -> Self {
        self.first_page = first;
        self.last_page = last;
        self
    }

    /// Renders a document already loaded into memory.
    pub fn render_bytes(&self, data: &[u8], source_url: &Url, doc_name: &str) -> anyhow::Result<Page> {
        let pdfium = Pdfium::new(
            Pdfium::bind_to_system_library().context("can't bind to the pdfium library")?,
        );
        let document = pdfium
            .load_pdf_from_byte_slice(data, None)
            .context("can't open PDF document")?;

        let mut boxes: Vec<BoxNode> = Vec::new();
        let mut rasters: Vec<DynamicImage> = Vec::new();
        let mut page_width = 0f32;
        let mut y_offset = 0f32;

        for (page_idx, page) in document.pages().iter().enumerate() {
            if page_idx < self.first_page || page_idx > self.last_page {
                continue;
            }
            let (raster, page_boxes, rendered_height) =
                self.render_page(&page, boxes.len() + 1, y_offset)?;
            page_width = page_width.max(raster.width() as f32);
            y_offset += rendered_height;
            boxes.extend(page_boxes);
            if self.include_screenshot {
                rasters.push(raster);
            }
        }
        if y_offset == 0f32 {
            bail!("PDF document has no pages in range");
        }

        let screenshot = if self.include_screenshot {
            Some(stack_rasters(&rasters, page_width as u32, y_offset as u32))
        } else {
            None
        };

        let mut root = BoxNode::new_element(0, "document", BBox::new(0f32, 0f32, page_width, y_offset));
        root.children = boxes;

        let params = serde_json::json!({
            "zoom": self.zoom,
            "firstPage": self.first_page,
            "lastPage": if self.last_page == usize::MAX { None } else { Some(self.last_page) },
        });
        Ok(Page {
            source_url: source_url.to_string(),
            title: doc_name.to_owned(),
            width: page_width,
            height: y_offset,
            screenshot,
            root,
            iri: None,
            parent_iri: None,
            creator: Some(self.id().to_owned()),
            creator_params: Some(params),
        })
    }

    fn render_page(
        &self,
        page: &PdfPage,
        next_box_id: usize,
        y_offset: f32,
    ) -> anyhow::Result<(DynamicImage, Vec<BoxNode>, f32)> {
        let page_height = page.height().value;
        let raster = page
            .render_with_config(&PdfRenderConfig::default().scale_page_by_factor(self.zoom))
            .map(|bitmap| bitmap.as_image())
            .context("can't rasterize PDF page")?;

        let mut chars = Vec::new();
        for char in page.text().context("can't read PDF page text")?.chars().iter() {
            let bounds = char.tight_bounds().context("can't read character bounds")?;
            chars.push(RawChar {
                ch: char.unicode_char().unwrap_or_default(),
                bbox: bbox_from_pdfrect(bounds, page_height),
                font_name: char.font_name(),
                font_size: char.unscaled_font_size().value,
                font_weight: normalize_font_weight(char.font_weight()),
                rotation: char.get_rotation_clockwise_degrees(),
            });
        }

        let lines = lines_from_spans(spans_from_chars(chars));
        let boxes = lines
            .into_iter()
            .enumerate()
            .map(|(i, line)| {
                let bbox = BBox::new(
                    line.bbox.x0 * self.zoom,
                    line.bbox.y0 * self.zoom + y_offset,
                    line.bbox.x1 * self.zoom,
                    line.bbox.y1 * self.zoom + y_offset,
                );
                BoxNode::new_text(
                    next_box_id + i,
                    bbox,
                    line.text.trim_end(),
                    line.font_size * self.zoom,
                    line.font_weight,
                )
            })
            .collect();

        let rendered_height = raster.height() as f32;
        Ok((raster, boxes, rendered_height))
    }
}

impl TreeProvider for PdfTreeProvider {
    fn id(&self) -> &'static str {
        "pagelens.pdf"
    }

    #[instrument(skip(self))]
    fn render(&self, url: &Url) -> anyhow::Result<Page> {
        if url.scheme() != "file" {
            bail!("the PDF backend only renders file:// URLs, got {url}");
        }
        let path = url
            .to_file_path()
            .map_err(|_| anyhow::anyhow!("can't map {url} to a local path"))?;
        let file = File::open(&path).with_context(|| format!("can't open {}", path.display()))?;
        let mmap = unsafe { Mmap::map(&file) }
            .with_context(|| format!("can't map {}", path.display()))?;
        let doc_name = doc_name_from_path(&path);
        self.render_bytes(&mmap, url, &doc_name)
    }
}

fn doc_name_from_path(path: &Path) -> String {
    path.file_name()
        .and_then(|name| name.to_str())
        .and_then(|name| name.split('.').next().map(|s| s.to_owned()))
        .unwrap_or(Uuid::new_v4().to_string())
}

/// Pdf coordinates grow upwards; the box model grows downwards.
fn bbox_from_pdfrect(rect: PdfRect, page_height: f32) -> BBox {
    BBox {
        x0: rect.left.value,
        y0: page_height - rect.top.value,
        x1: rect.right.value,
        y1: page_height - rect.bottom.value,
    }
}

fn normalize_font_weight(weight: Option<PdfFontWeight>) -> f32 {
    let numeric = match weight {
        Some(PdfFontWeight::Weight100) => 100,
        Some(PdfFontWeight::Weight200) => 200,
        Some(PdfFontWeight::Weight300) => 300,
        Some(PdfFontWeight::Weight400Normal) => 400,
        Some(PdfFontWeight::Weight500) => 500,
        Some(PdfFontWeight::Weight600) => 600,
        Some(PdfFontWeight::Weight700Bold) => 700,
        Some(PdfFontWeight::Weight800) => 800,
        Some(PdfFontWeight::Weight900) => 900,
        Some(PdfFontWeight::Custom(value)) => value as i32,
        None => 400,
    };
    (numeric as f32 / 900f32).clamp(0f32, 1f32)
}

fn stack_rasters(rasters: &[DynamicImage], width: u32, height: u32) -> DynamicImage {
    let mut canvas =
        image::RgbaImage::from_pixel(width.max(1), height.max(1), image::Rgba([255, 255, 255, 255]));
    let mut y = 0i64;
    for raster in rasters {
        image::imageops::overlay(&mut canvas, &raster.to_rgba8(), 0, y);
        y += raster.height() as i64;
    }
    DynamicImage::ImageRgba8(canvas)
}

#[derive(Debug, Clone)]
struct RawChar {
    ch: char,
    bbox: BBox,
    font_name: String,
    font_size: f32,
    font_weight: f32,
    rotation: f32,
}

#[derive(Debug)]
struct CharSpan {
    bbox: BBox,
    text: String,
    rotation: f32,
    font_name: String,
    font_size: f32,
    font_weight: f32,
}

impl CharSpan {
    fn new_from_char(c: &RawChar) -> Self {
        Self {
            bbox: c.bbox.clone(),
            text: c.ch.to_string(),
            rotation: c.rotation,
            font_name: c.font_name.clone(),
            font_size: c.font_size,
            font_weight: c.font_weight,
        }
    }

    /// Appends the char when it continues this span's style; signals a style
    /// break otherwise.
    fn append(&mut self, c: &RawChar) -> bool {
        if c.font_size != self.font_size
            || c.font_name != self.font_name
            || c.font_weight != self.font_weight
            || c.rotation != self.rotation
        {
            return false;
        }
        self.text.push(c.ch);
        self.bbox.merge(&c.bbox);
        true
    }
}

#[derive(Debug)]
struct TextLine {
    bbox: BBox,
    text: String,
    rotation: f32,
    font_size: f32,
    font_weight: f32,
}

impl TextLine {
    fn new_from_span(span: CharSpan) -> Self {
        Self {
            bbox: span.bbox.clone(),
            text: span.text,
            rotation: span.rotation,
            font_size: span.font_size,
            font_weight: span.font_weight,
        }
    }

    fn append(&mut self, span: CharSpan) -> Result<(), CharSpan> {
        // pdfium does not always inject a line break, so also break on the
        // span starting below this line.
        if span.rotation != self.rotation
            || span.bbox.y0 > self.bbox.y1
            || span.text.ends_with('\n')
            || span.text.ends_with('\x02')
        {
            self.text = fix_text(&self.text, None);
            Err(span)
        } else {
            self.bbox.merge(&span.bbox);
            self.text.push_str(&span.text);
            self.font_size = self.font_size.max(span.font_size);
            self.font_weight = self.font_weight.max(span.font_weight);
            Ok(())
        }
    }
}

fn spans_from_chars(chars: Vec<RawChar>) -> Vec<CharSpan> {
    let mut spans: Vec<CharSpan> = Vec::new();
    for c in chars {
        let appended = matches!(spans.last_mut(), Some(span) if span.append(&c));
        if !appended {
            spans.push(CharSpan::new_from_char(&c));
        }
    }
    spans
}

fn lines_from_spans(spans: Vec<CharSpan>) -> Vec<TextLine> {
    let mut lines: Vec<TextLine> = Vec::new();
    for span in spans {
        match lines.last_mut() {
            None => lines.push(TextLine::new_from_span(span)),
            Some(line) => {
                if let Err(span) = line.append(span) {
                    lines.push(TextLine::new_from_span(span));
                }
            }
        }
    }
    if let Some(last) = lines.last_mut() {
        last.text = fix_text(&last.text, None);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_char(ch: char, x0: f32, y0: f32, font_size: f32) -> RawChar {
        RawChar {
            ch,
            bbox: BBox::new(x0, y0, x0 + 5.0, y0 + 10.0),
            font_name: "Helvetica".into(),
            font_size,
            font_weight: 0.44,
            rotation: 0.0,
        }
    }

    #[test]
    fn test_spans_split_on_style_change() {
        let chars = vec![
            raw_char('a', 0.0, 0.0, 12.0),
            raw_char('b', 5.0, 0.0, 12.0),
            raw_char('c', 10.0, 0.0, 18.0),
        ];
        let spans = spans_from_chars(chars);
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].text, "ab");
        assert_eq!(spans[1].text, "c");
    }

    #[test]
    fn test_lines_break_on_newline_and_position() {
        let mut below = raw_char('x', 0.0, 20.0, 12.0);
        below.bbox = BBox::new(0.0, 20.0, 5.0, 30.0);
        let chars = vec![raw_char('a', 0.0, 0.0, 12.0), below];
        let lines = lines_from_spans(spans_from_chars(chars));
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "a");
        assert_eq!(lines[1].text, "x");
    }

    #[test]
    fn test_line_merges_spans_and_tracks_style() {
        let chars = vec![
            raw_char('a', 0.0, 0.0, 12.0),
            raw_char('B', 5.0, 0.0, 18.0),
        ];
        let lines = lines_from_spans(spans_from_chars(chars));
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "aB");
        assert_eq!(lines[0].font_size, 18.0);
        assert_eq!(lines[0].bbox, BBox::new(0.0, 0.0, 10.0, 10.0));
    }

    #[test]
    fn test_pdfrect_y_flip() {
        let rect = PdfRect::new_from_values(700.0, 10.0, 720.0, 110.0);
        let bbox = bbox_from_pdfrect(rect, 800.0);
        assert_eq!(bbox, BBox::new(10.0, 80.0, 110.0, 100.0));
    }

    #[test]
    fn test_font_weight_mapping() {
        assert!(normalize_font_weight(Some(PdfFontWeight::Weight700Bold)) > 0.75);
        assert!(normalize_font_weight(Some(PdfFontWeight::Weight400Normal)) < 0.75);
        assert!(normalize_font_weight(None) < 0.75);
    }
}
