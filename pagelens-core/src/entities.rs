use std::fmt;

use image::DynamicImage;
use serde::{Deserialize, Serialize};

pub type BoxID = usize;

/// Axis-aligned bounding box in rendered-page pixel coordinates.
/// The origin is the top-left corner of the page.
#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
pub struct BBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BBox {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    #[inline(always)]
    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    #[inline(always)]
    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    #[inline(always)]
    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    #[inline(always)]
    pub fn center(&self) -> (f32, f32) {
        (
            self.x0 + self.width() / 2f32,
            self.y0 + self.height() / 2f32,
        )
    }

    #[inline(always)]
    pub fn merge(&mut self, other: &Self) {
        self.x0 = self.x0.min(other.x0);
        self.y0 = self.y0.min(other.y0);
        self.x1 = self.x1.max(other.x1);
        self.y1 = self.y1.max(other.y1);
    }

    #[inline(always)]
    fn overlap_x(&self, other: &Self) -> f32 {
        f32::max(
            0f32,
            f32::min(self.x1, other.x1) - f32::max(self.x0, other.x0),
        )
    }

    #[inline(always)]
    fn overlap_y(&self, other: &Self) -> f32 {
        f32::max(
            0f32,
            f32::min(self.y1, other.y1) - f32::max(self.y0, other.y0),
        )
    }

    #[inline(always)]
    pub fn intersection(&self, other: &Self) -> f32 {
        self.overlap_x(other) * self.overlap_y(other)
    }

    #[inline(always)]
    pub fn contains(&self, other: &Self) -> bool {
        other.x0 >= self.x0 && other.y0 >= self.y0 && other.x1 <= self.x1 && other.y1 <= self.y1
    }

    /// Vertical overlap as a ratio of the smaller height. 1.0 means one box
    /// fully spans the other vertically; used for line detection.
    pub fn y_overlap_ratio(&self, other: &Self) -> f32 {
        let min_height = self.height().min(other.height());
        if min_height <= 0f32 {
            return 0f32;
        }
        self.overlap_y(other) / min_height
    }

    /// Weighted squared center distance. Horizontal and vertical weights let
    /// the grouping segmenter prefer one reading direction.
    #[inline(always)]
    pub(crate) fn distance(&self, other: &Self, x_weight: f32, y_weight: f32) -> f32 {
        let point_a = self.center();
        let point_b = other.center();

        (point_a.0 - point_b.0).powi(2) * x_weight + (point_a.1 - point_b.1).powi(2) * y_weight
    }
}

/// A unique identifier assigned to a stored artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct Iri(String);

impl Iri {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Iri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "box_type")]
pub enum BoxType {
    /// A container originating from a document element.
    Element,
    /// A leaf carrying rendered text.
    TextContent,
    /// A leaf carrying non-text content (an image).
    ReplacedContent,
}

/// One node of the rendered box tree.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BoxNode {
    pub id: BoxID,
    pub kind: BoxType,
    pub bbox: BBox,
    /// Source element tag ("body", "p", "img", ...); empty for PDF content.
    pub tag: String,
    pub text: String,
    pub font_size: f32,
    /// Normalized font weight in 0..1; 0.0 is regular, values above 0.75
    /// render as bold.
    pub font_weight: f32,
    pub children: Vec<BoxNode>,
}

impl BoxNode {
    pub fn new_element(id: BoxID, tag: impl Into<String>, bbox: BBox) -> Self {
        Self {
            id,
            kind: BoxType::Element,
            bbox,
            tag: tag.into(),
            text: String::new(),
            font_size: 0f32,
            font_weight: 0f32,
            children: Vec::new(),
        }
    }

    pub fn new_text(
        id: BoxID,
        bbox: BBox,
        text: impl Into<String>,
        font_size: f32,
        font_weight: f32,
    ) -> Self {
        Self {
            id,
            kind: BoxType::TextContent,
            bbox,
            tag: String::new(),
            text: text.into(),
            font_size,
            font_weight,
            children: Vec::new(),
        }
    }

    pub fn new_replaced(id: BoxID, tag: impl Into<String>, bbox: BBox) -> Self {
        Self {
            id,
            kind: BoxType::ReplacedContent,
            bbox,
            tag: tag.into(),
            text: String::new(),
            font_size: 0f32,
            font_weight: 0f32,
            children: Vec::new(),
        }
    }

    pub fn is_content(&self) -> bool {
        matches!(self.kind, BoxType::TextContent | BoxType::ReplacedContent)
    }

    /// Collects the content leaves of the subtree in document order.
    pub fn content_boxes(&self) -> Vec<&BoxNode> {
        let mut out = Vec::new();
        self.collect_content(&mut out);
        out
    }

    fn collect_content<'a>(&'a self, out: &mut Vec<&'a BoxNode>) {
        if self.is_content() {
            out.push(self);
        } else {
            for child in &self.children {
                child.collect_content(out);
            }
        }
    }
}

/// A rendered page: the box tree plus page-level metadata and an optional
/// screenshot taken by the rendering backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Page {
    pub source_url: String,
    pub title: String,
    pub width: f32,
    pub height: f32,
    #[serde(skip_serializing, skip_deserializing)]
    pub screenshot: Option<DynamicImage>,
    pub root: BoxNode,
    pub iri: Option<Iri>,
    pub parent_iri: Option<Iri>,
    pub creator: Option<String>,
    pub creator_params: Option<serde_json::Value>,
}

impl Page {
    pub fn content_boxes(&self) -> Vec<&BoxNode> {
        self.root.content_boxes()
    }
}

/// One visually coherent region of a segmented page.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Area {
    pub name: String,
    pub bbox: BBox,
    pub text: String,
    pub font_size: f32,
    pub font_weight: f32,
    pub children: Vec<Area>,
}

impl Area {
    pub fn from_box(b: &BoxNode) -> Self {
        Self {
            name: if b.text.is_empty() {
                b.tag.clone()
            } else {
                b.text.clone()
            },
            bbox: b.bbox.clone(),
            text: b.text.clone(),
            font_size: b.font_size,
            font_weight: b.font_weight,
            children: Vec::new(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Recomputes this area's bounds and aggregate text style from its
    /// children. A no-op for leaves.
    pub fn refresh_from_children(&mut self) {
        if self.children.is_empty() {
            return;
        }
        let mut bbox = self.children[0].bbox.clone();
        let mut text = String::new();
        let mut font_size_sum = 0f32;
        let mut font_weight_sum = 0f32;
        for child in &self.children {
            bbox.merge(&child.bbox);
            if !child.text.is_empty() {
                if !text.is_empty() {
                    text.push(' ');
                }
                text.push_str(&child.text);
            }
            font_size_sum += child.font_size;
            font_weight_sum += child.font_weight;
        }
        let n = self.children.len() as f32;
        self.bbox = bbox;
        self.text = text;
        self.font_size = font_size_sum / n;
        self.font_weight = font_weight_sum / n;
    }

    /// Collects the leaf areas of the subtree in pre-order.
    pub fn leaves(&self) -> Vec<&Area> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a Area>) {
        if self.is_leaf() {
            out.push(self);
        } else {
            for child in &self.children {
                child.collect_leaves(out);
            }
        }
    }
}

/// Hierarchical segmentation of a rendered page into visual areas.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AreaTree {
    pub root: Area,
    /// IRI of the page this tree was derived from, when known.
    pub page_iri: Option<Iri>,
    pub iri: Option<Iri>,
    pub parent_iri: Option<Iri>,
    pub creator: Option<String>,
    pub creator_params: Option<serde_json::Value>,
}

/// A named result object that can be stored in an artifact repository.
#[derive(Debug, Clone)]
pub enum Artifact {
    Page(Page),
    AreaTree(AreaTree),
}

impl Artifact {
    pub fn artifact_type(&self) -> &'static str {
        match self {
            Artifact::Page(_) => "Page",
            Artifact::AreaTree(_) => "AreaTree",
        }
    }

    pub fn iri(&self) -> Option<&Iri> {
        match self {
            Artifact::Page(p) => p.iri.as_ref(),
            Artifact::AreaTree(t) => t.iri.as_ref(),
        }
    }

    pub fn set_iri(&mut self, iri: Iri) {
        match self {
            Artifact::Page(p) => p.iri = Some(iri),
            Artifact::AreaTree(t) => t.iri = Some(iri),
        }
    }

    pub fn parent_iri(&self) -> Option<&Iri> {
        match self {
            Artifact::Page(p) => p.parent_iri.as_ref(),
            Artifact::AreaTree(t) => t.parent_iri.as_ref(),
        }
    }

    pub fn creator(&self) -> Option<&str> {
        match self {
            Artifact::Page(p) => p.creator.as_deref(),
            Artifact::AreaTree(t) => t.creator.as_deref(),
        }
    }

    pub fn creator_params(&self) -> Option<&serde_json::Value> {
        match self {
            Artifact::Page(p) => p.creator_params.as_ref(),
            Artifact::AreaTree(t) => t.creator_params.as_ref(),
        }
    }

    pub fn as_page(&self) -> Option<&Page> {
        match self {
            Artifact::Page(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_area_tree(&self) -> Option<&AreaTree> {
        match self {
            Artifact::AreaTree(t) => Some(t),
            _ => None,
        }
    }
}

/// Catalog entry describing a stored artifact.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArtifactInfo {
    pub iri: Iri,
    pub parent_iri: Option<Iri>,
    pub artifact_type: String,
    pub creator: Option<String>,
    pub creator_params: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(x0: f32, y0: f32, x1: f32, y1: f32) -> BBox {
        BBox::new(x0, y0, x1, y1)
    }

    #[test]
    fn test_intersection() {
        let a = bbox(0.0, 0.0, 2.0, 2.0);
        let b = bbox(1.0, 1.0, 3.0, 3.0);
        let disjoint = bbox(3.0, 3.0, 5.0, 5.0);
        let inside = bbox(0.5, 0.5, 1.5, 1.5);

        assert_eq!(a.intersection(&b), 1.0);
        assert_eq!(a.intersection(&disjoint), 0.0);
        assert_eq!(a.intersection(&inside), inside.area());
        assert_eq!(a.intersection(&a), a.area());
    }

    #[test]
    fn test_merge_extends_bounds() {
        let mut a = bbox(0.0, 0.0, 2.0, 2.0);
        a.merge(&bbox(1.0, -1.0, 3.0, 1.0));
        assert_eq!(a, bbox(0.0, -1.0, 3.0, 2.0));
    }

    #[test]
    fn test_y_overlap_ratio() {
        let a = bbox(0.0, 0.0, 10.0, 10.0);
        let same_line = bbox(12.0, 1.0, 20.0, 11.0);
        let next_line = bbox(0.0, 12.0, 10.0, 22.0);

        assert!(a.y_overlap_ratio(&same_line) >= 0.9);
        assert_eq!(a.y_overlap_ratio(&next_line), 0.0);
        assert_eq!(a.y_overlap_ratio(&a), 1.0);
    }

    #[test]
    fn test_content_boxes_in_document_order() {
        let mut root = BoxNode::new_element(0, "body", bbox(0.0, 0.0, 100.0, 100.0));
        let mut div = BoxNode::new_element(1, "div", bbox(0.0, 0.0, 100.0, 50.0));
        div.children
            .push(BoxNode::new_text(2, bbox(0.0, 0.0, 50.0, 10.0), "first", 12.0, 0.0));
        root.children.push(div);
        root.children
            .push(BoxNode::new_text(3, bbox(0.0, 50.0, 50.0, 60.0), "second", 12.0, 0.0));

        let content = root.content_boxes();
        let texts: Vec<_> = content.iter().map(|b| b.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second"]);
    }

    #[test]
    fn test_area_refresh_from_children() {
        let mut parent = Area::default();
        parent.children.push(Area {
            name: "a".into(),
            bbox: bbox(0.0, 0.0, 10.0, 10.0),
            text: "hello".into(),
            font_size: 10.0,
            font_weight: 0.0,
            children: Vec::new(),
        });
        parent.children.push(Area {
            name: "b".into(),
            bbox: bbox(10.0, 0.0, 30.0, 12.0),
            text: "world".into(),
            font_size: 14.0,
            font_weight: 1.0,
            children: Vec::new(),
        });
        parent.refresh_from_children();

        assert_eq!(parent.bbox, bbox(0.0, 0.0, 30.0, 12.0));
        assert_eq!(parent.text, "hello world");
        assert_eq!(parent.font_size, 12.0);
        assert_eq!(parent.font_weight, 0.5);
    }
}
