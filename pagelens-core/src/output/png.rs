use std::io::{Seek, Write};

use anyhow::{bail, Context};
use image::{ImageBuffer, ImageFormat, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

use crate::entities::{Area, AreaTree, BoxNode, BoxType, Page};

const TEXT_BOX_COLOR: [u8; 4] = [255, 0, 0, 255];
const REPLACED_BOX_COLOR: [u8; 4] = [0, 0, 255, 255];
const AREA_COLOR: [u8; 4] = [17, 138, 1, 255];
const GROUP_AREA_COLOR: [u8; 4] = [209, 139, 0, 255];
const MODEL_TEXT_FILL: [u8; 4] = [224, 224, 255, 255];
const MODEL_REPLACED_FILL: [u8; 4] = [224, 255, 224, 255];
const MODEL_AREA_FILL: [u8; 4] = [255, 244, 214, 255];
const BACKGROUND: [u8; 4] = [255, 255, 255, 255];

fn to_rect(bbox: &crate::entities::BBox) -> Rect {
    let width = (bbox.width() as i32).max(1) as u32;
    let height = (bbox.height() as i32).max(1) as u32;
    Rect::at(bbox.x0 as i32, bbox.y0 as i32).of_size(width, height)
}

fn blank_canvas(page: &Page) -> RgbaImage {
    ImageBuffer::from_pixel(
        (page.width as u32).max(1),
        (page.height as u32).max(1),
        Rgba(BACKGROUND),
    )
}

fn box_outline_color(kind: BoxType) -> Rgba<u8> {
    match kind {
        BoxType::ReplacedContent => Rgba(REPLACED_BOX_COLOR),
        _ => Rgba(TEXT_BOX_COLOR),
    }
}

fn draw_box_outlines(img: &mut RgbaImage, b: &BoxNode) {
    for content in b.content_boxes() {
        draw_hollow_rect_mut(img, to_rect(&content.bbox), box_outline_color(content.kind));
    }
}

fn draw_box_model(img: &mut RgbaImage, b: &BoxNode) {
    for content in b.content_boxes() {
        let fill = match content.kind {
            BoxType::ReplacedContent => Rgba(MODEL_REPLACED_FILL),
            _ => Rgba(MODEL_TEXT_FILL),
        };
        let rect = to_rect(&content.bbox);
        draw_filled_rect_mut(img, rect, fill);
        draw_hollow_rect_mut(img, rect, box_outline_color(content.kind));
    }
}

fn draw_area_outlines(img: &mut RgbaImage, a: &Area, fill: bool) {
    let color = if a.is_leaf() {
        Rgba(AREA_COLOR)
    } else {
        Rgba(GROUP_AREA_COLOR)
    };
    let rect = to_rect(&a.bbox);
    if fill && a.is_leaf() {
        draw_filled_rect_mut(img, rect, Rgba(MODEL_AREA_FILL));
    }
    draw_hollow_rect_mut(img, rect, color);
    for child in &a.children {
        draw_area_outlines(img, child, fill);
    }
}

/// Page screenshot with content-box outlines drawn over it. Fails when the
/// page was rendered without a screenshot.
pub fn page_overlay(page: &Page) -> anyhow::Result<RgbaImage> {
    let Some(screenshot) = &page.screenshot else {
        bail!("the page was rendered without a screenshot");
    };
    let mut img = screenshot.to_rgba8();
    draw_box_outlines(&mut img, &page.root);
    Ok(img)
}

/// Internal model of the page: content boxes drawn on a blank canvas.
pub fn page_model(page: &Page) -> RgbaImage {
    let mut img = blank_canvas(page);
    draw_box_model(&mut img, &page.root);
    img
}

/// Page screenshot with the segmented areas drawn over it.
pub fn area_overlay(tree: &AreaTree, page: &Page) -> anyhow::Result<RgbaImage> {
    let Some(screenshot) = &page.screenshot else {
        bail!("the page was rendered without a screenshot");
    };
    let mut img = screenshot.to_rgba8();
    draw_area_outlines(&mut img, &tree.root, false);
    Ok(img)
}

/// Internal model of the segmented page on a blank canvas.
pub fn area_model(tree: &AreaTree, page: &Page) -> RgbaImage {
    let mut img = blank_canvas(page);
    draw_area_outlines(&mut img, &tree.root, true);
    img
}

/// Encodes the image as PNG into the given sink.
pub fn write_png<W: Write + Seek>(img: &RgbaImage, out: &mut W) -> anyhow::Result<()> {
    img.write_to(out, ImageFormat::Png)
        .context("can't encode PNG output")
}
