use tracing::instrument;

use crate::entities::{Area, AreaTree, BoxNode, Page};

pub mod ops;

/// An algorithm that groups the boxes of a rendered page into a hierarchy of
/// visually coherent areas.
pub trait SegmProvider {
    fn id(&self) -> &'static str;

    fn create_area_tree(&self, page: &Page) -> anyhow::Result<AreaTree>;
}

fn root_area(page: &Page) -> Area {
    Area {
        name: "root".to_owned(),
        bbox: crate::entities::BBox::new(0f32, 0f32, page.width, page.height),
        ..Default::default()
    }
}

fn area_tree(page: &Page, root: Area, creator: &str, params: serde_json::Value) -> AreaTree {
    AreaTree {
        root,
        page_iri: page.iri.clone(),
        iri: None,
        parent_iri: page.iri.clone(),
        creator: Some(creator.to_owned()),
        creator_params: Some(params),
    }
}

/// Basic area-tree construction: every content box becomes one leaf area
/// under the root, preserving document order.
#[derive(Debug, Clone)]
pub struct BasicSegmProvider {
    /// Keep areas for auxiliary (non-text) content such as images.
    preserve_aux_areas: bool,
}

impl BasicSegmProvider {
    pub fn new(preserve_aux_areas: bool) -> Self {
        Self { preserve_aux_areas }
    }

    fn selected_boxes<'a>(&self, page: &'a Page) -> Vec<&'a BoxNode> {
        page.content_boxes()
            .into_iter()
            .filter(|b| self.preserve_aux_areas || !b.text.is_empty())
            .collect()
    }
}

impl SegmProvider for BasicSegmProvider {
    fn id(&self) -> &'static str {
        "pagelens.basic-areas"
    }

    #[instrument(skip_all)]
    fn create_area_tree(&self, page: &Page) -> anyhow::Result<AreaTree> {
        let mut root = root_area(page);
        root.children = self
            .selected_boxes(page)
            .into_iter()
            .map(Area::from_box)
            .collect();
        let params = serde_json::json!({ "preserveAuxAreas": self.preserve_aux_areas });
        Ok(area_tree(page, root, self.id(), params))
    }
}

/// Proximity-based segmentation: content boxes whose bounds lie within
/// `proximity` em of each other end up in the same area. A coarse stand-in
/// for externally supplied segmentation algorithms, behind the same trait.
#[derive(Debug, Clone)]
pub struct GroupingSegmProvider {
    /// Maximum gap between grouped boxes, in multiples of the font size.
    proximity: f32,
}

impl Default for GroupingSegmProvider {
    fn default() -> Self {
        Self { proximity: 1.0 }
    }
}

impl GroupingSegmProvider {
    pub fn new(proximity: f32) -> Self {
        Self { proximity }
    }

    fn margin(&self, b: &BoxNode) -> f32 {
        // Images carry no font size; fall back to a fixed gap.
        let em = if b.font_size > 0f32 { b.font_size } else { 16f32 };
        em * self.proximity
    }
}

impl SegmProvider for GroupingSegmProvider {
    fn id(&self) -> &'static str {
        "pagelens.grouping"
    }

    #[instrument(skip_all, fields(proximity = self.proximity))]
    fn create_area_tree(&self, page: &Page) -> anyhow::Result<AreaTree> {
        let boxes = page.content_boxes();

        // Greedy clustering: a box joins the first cluster it touches when
        // expanded by its margin; clusters that end up touching are merged
        // afterwards until a fixed point.
        let mut clusters: Vec<(crate::entities::BBox, Vec<&BoxNode>)> = Vec::new();
        for b in boxes {
            let margin = self.margin(b);
            let expanded = crate::entities::BBox::new(
                b.bbox.x0 - margin,
                b.bbox.y0 - margin,
                b.bbox.x1 + margin,
                b.bbox.y1 + margin,
            );
            match clusters
                .iter_mut()
                .find(|(bbox, _)| bbox.intersection(&expanded) > 0f32)
            {
                Some((bbox, members)) => {
                    bbox.merge(&b.bbox);
                    members.push(b);
                }
                None => clusters.push((b.bbox.clone(), vec![b])),
            }
        }
        loop {
            let mut merged_any = false;
            let mut merged: Vec<(crate::entities::BBox, Vec<&BoxNode>)> = Vec::new();
            for (bbox, members) in clusters {
                match merged
                    .iter_mut()
                    .find(|(other, _)| other.intersection(&bbox) > 0f32)
                {
                    Some((other, other_members)) => {
                        other.merge(&bbox);
                        other_members.extend(members);
                        merged_any = true;
                    }
                    None => merged.push((bbox, members)),
                }
            }
            clusters = merged;
            if !merged_any {
                break;
            }
        }

        let mut root = root_area(page);
        for (_, members) in &clusters {
            let mut group = Area {
                name: "group".to_owned(),
                ..Default::default()
            };
            group.children = members.iter().map(|b| Area::from_box(b)).collect();
            group.refresh_from_children();
            root.children.push(group);
        }
        root.children.sort_by(|a, b| {
            (a.bbox.y0, a.bbox.x0)
                .partial_cmp(&(b.bbox.y0, b.bbox.x0))
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let params = serde_json::json!({ "proximity": self.proximity });
        Ok(area_tree(page, root, self.id(), params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::BBox;

    fn test_page(boxes: Vec<BoxNode>) -> Page {
        let mut root = BoxNode::new_element(0, "body", BBox::new(0.0, 0.0, 1200.0, 800.0));
        root.children = boxes;
        Page {
            source_url: "http://example.com/".into(),
            title: "test".into(),
            width: 1200.0,
            height: 800.0,
            screenshot: None,
            root,
            iri: None,
            parent_iri: None,
            creator: None,
            creator_params: None,
        }
    }

    fn text_box(id: usize, x: f32, y: f32, text: &str) -> BoxNode {
        BoxNode::new_text(id, BBox::new(x, y, x + 100.0, y + 12.0), text, 12.0, 0.0)
    }

    #[test]
    fn test_basic_one_leaf_per_content_box() {
        let page = test_page(vec![
            text_box(1, 0.0, 0.0, "a"),
            text_box(2, 0.0, 20.0, "b"),
            text_box(3, 0.0, 40.0, "c"),
        ]);
        let tree = BasicSegmProvider::new(true).create_area_tree(&page).unwrap();
        assert_eq!(tree.root.leaves().len(), 3);
        assert!(tree.root.children.iter().all(|a| a.is_leaf()));
    }

    #[test]
    fn test_basic_skips_aux_content_when_disabled() {
        let page = test_page(vec![
            text_box(1, 0.0, 0.0, "a"),
            BoxNode::new_replaced(2, "img", BBox::new(0.0, 100.0, 50.0, 150.0)),
        ]);
        let with_aux = BasicSegmProvider::new(true).create_area_tree(&page).unwrap();
        let without_aux = BasicSegmProvider::new(false).create_area_tree(&page).unwrap();
        assert_eq!(with_aux.root.children.len(), 2);
        assert_eq!(without_aux.root.children.len(), 1);
    }

    #[test]
    fn test_grouping_separates_distant_blocks() {
        // Two tight columns of text far apart on the page.
        let page = test_page(vec![
            text_box(1, 0.0, 0.0, "a1"),
            text_box(2, 0.0, 14.0, "a2"),
            text_box(3, 600.0, 500.0, "b1"),
            text_box(4, 600.0, 514.0, "b2"),
        ]);
        let tree = GroupingSegmProvider::default().create_area_tree(&page).unwrap();
        assert_eq!(tree.root.children.len(), 2);
        assert_eq!(tree.root.children[0].children.len(), 2);
        assert_eq!(tree.root.children[0].text, "a1 a2");
        assert_eq!(tree.root.children[1].text, "b1 b2");
    }

    #[test]
    fn test_grouping_tree_carries_page_link() {
        let mut page = test_page(vec![text_box(1, 0.0, 0.0, "a")]);
        page.iri = Some(crate::entities::Iri::new("http://pagelens.dev/resource/art1"));
        let tree = GroupingSegmProvider::default().create_area_tree(&page).unwrap();
        assert_eq!(tree.page_iri, page.iri);
        assert_eq!(tree.parent_iri, page.iri);
    }
}
