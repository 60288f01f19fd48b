use anyhow::{anyhow, Context};
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::types::Bounds;
use headless_chrome::{Browser, LaunchOptions};
use image::DynamicImage;
use serde::Deserialize;
use tracing::instrument;
use url::Url;

use crate::entities::{BBox, BoxNode, Page};

use super::TreeProvider;

/// Walks the DOM and reports one record per visible text node and image,
/// together with the page title and document size. Returned as a JSON string
/// so the whole snapshot crosses the CDP boundary in one evaluate call.
const EXTRACT_SCRIPT: &str = r#"
(() => {
    const boxes = [];
    const walker = document.createTreeWalker(document.body, NodeFilter.SHOW_TEXT);
    let node;
    while ((node = walker.nextNode())) {
        const text = node.textContent.trim();
        if (!text || !node.parentElement) continue;
        const range = document.createRange();
        range.selectNodeContents(node);
        const rect = range.getBoundingClientRect();
        if (rect.width === 0 || rect.height === 0) continue;
        const style = window.getComputedStyle(node.parentElement);
        boxes.push({
            kind: "text",
            tag: node.parentElement.tagName.toLowerCase(),
            text: text,
            x: rect.x + window.scrollX,
            y: rect.y + window.scrollY,
            width: rect.width,
            height: rect.height,
            font_size: parseFloat(style.fontSize) || 0,
            font_weight: parseInt(style.fontWeight, 10) || 400,
        });
    }
    for (const img of document.images) {
        const rect = img.getBoundingClientRect();
        if (rect.width === 0 || rect.height === 0) continue;
        boxes.push({
            kind: "image",
            tag: "img",
            text: "",
            x: rect.x + window.scrollX,
            y: rect.y + window.scrollY,
            width: rect.width,
            height: rect.height,
            font_size: 0,
            font_weight: 400,
        });
    }
    return JSON.stringify({
        title: document.title,
        width: document.documentElement.scrollWidth,
        height: document.documentElement.scrollHeight,
        boxes: boxes,
    });
})()
"#;

#[derive(Debug, Deserialize)]
struct Snapshot {
    title: String,
    width: f32,
    height: f32,
    boxes: Vec<SnapshotBox>,
}

#[derive(Debug, Deserialize)]
struct SnapshotBox {
    kind: String,
    tag: String,
    text: String,
    x: f32,
    y: f32,
    width: f32,
    height: f32,
    font_size: f32,
    /// CSS numeric weight (100..900).
    font_weight: f32,
}

/// Renders a web page with headless Chromium and extracts its box tree
/// through an injected snapshot script.
#[derive(Debug, Clone)]
pub struct ChromeTreeProvider {
    width: u32,
    height: u32,
    include_screenshot: bool,
}

impl ChromeTreeProvider {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            include_screenshot: false,
        }
    }

    pub fn with_screenshot(mut self, include_screenshot: bool) -> Self {
        self.include_screenshot = include_screenshot;
        self
    }
}

impl TreeProvider for ChromeTreeProvider {
    fn id(&self) -> &'static str {
        "pagelens.chrome"
    }

    #[instrument(skip(self), fields(width = self.width, height = self.height))]
    fn render(&self, url: &Url) -> anyhow::Result<Page> {
        let options = LaunchOptions::default_builder()
            .headless(true)
            .window_size(Some((self.width, self.height)))
            .build()
            .map_err(|e| anyhow!("can't build browser launch options: {e}"))?;
        let browser = Browser::new(options).context("can't launch headless Chromium")?;
        let tab = browser.new_tab().context("can't open browser tab")?;

        tab.navigate_to(url.as_str())
            .and_then(|t| t.wait_until_navigated())
            .with_context(|| format!("navigation to {url} failed"))?;

        let result = tab
            .evaluate(EXTRACT_SCRIPT, false)
            .context("box extraction script failed")?;
        let raw = result
            .value
            .as_ref()
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow!("box extraction script returned no value"))?;
        let snapshot: Snapshot =
            serde_json::from_str(raw).context("can't decode page snapshot")?;
        tracing::debug!(url = %url, boxes = snapshot.boxes.len(), "extracted box tree");

        let screenshot = if self.include_screenshot {
            // the headless window matches the viewport; grow it to the
            // document size so the capture includes content below the fold
            tab.set_bounds(full_page_bounds(&snapshot))
                .context("can't resize the browser window")?;
            let png = tab
                .capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true)
                .context("can't capture page screenshot")?;
            Some(image::load_from_memory(&png).context("can't decode page screenshot")?)
        } else {
            None
        };

        let params = serde_json::json!({ "width": self.width, "height": self.height });
        Ok(page_from_snapshot(
            snapshot,
            url,
            screenshot,
            self.id(),
            params,
        ))
    }
}

/// Window bounds covering the whole document reported by the snapshot.
fn full_page_bounds(snapshot: &Snapshot) -> Bounds {
    Bounds::Normal {
        left: None,
        top: None,
        width: Some(snapshot.width.max(1f32) as f64),
        height: Some(snapshot.height.max(1f32) as f64),
    }
}

fn page_from_snapshot(
    snapshot: Snapshot,
    url: &Url,
    screenshot: Option<DynamicImage>,
    creator: &str,
    creator_params: serde_json::Value,
) -> Page {
    let width = snapshot.width.max(1f32);
    let height = snapshot.height.max(1f32);
    let mut root = BoxNode::new_element(0, "body", BBox::new(0f32, 0f32, width, height));
    for (idx, b) in snapshot.boxes.iter().enumerate() {
        let id = idx + 1;
        let bbox = BBox::new(b.x, b.y, b.x + b.width, b.y + b.height);
        let node = if b.kind == "image" {
            BoxNode::new_replaced(id, b.tag.clone(), bbox)
        } else {
            let mut node = BoxNode::new_text(
                id,
                bbox,
                b.text.clone(),
                b.font_size,
                normalize_font_weight(b.font_weight),
            );
            node.tag = b.tag.clone();
            node
        };
        root.children.push(node);
    }
    Page {
        source_url: url.to_string(),
        title: snapshot.title,
        width,
        height,
        screenshot,
        root,
        iri: None,
        parent_iri: None,
        creator: Some(creator.to_owned()),
        creator_params: Some(creator_params),
    }
}

/// Maps a CSS weight (100..900) to the 0..1 scale of the box model, so that
/// 700 ("bold") lands above the 0.75 bold threshold.
fn normalize_font_weight(css_weight: f32) -> f32 {
    (css_weight / 900f32).clamp(0f32, 1f32)
}
