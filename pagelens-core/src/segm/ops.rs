use crate::entities::{Area, AreaTree};

/// Post-processing step applied to an area tree in place.
pub trait AreaTreeOperator {
    fn id(&self) -> &'static str;

    fn apply(&self, tree: &mut AreaTree);
}

/// Orders sibling areas by their page position (top to bottom, then left to
/// right), recursively.
#[derive(Debug, Default, Clone)]
pub struct SortByPositionOperator;

impl SortByPositionOperator {
    fn sort_area(area: &mut Area) {
        area.children.sort_by(|a, b| {
            (a.bbox.y0, a.bbox.x0)
                .partial_cmp(&(b.bbox.y0, b.bbox.x0))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        for child in &mut area.children {
            Self::sort_area(child);
        }
    }
}

impl AreaTreeOperator for SortByPositionOperator {
    fn id(&self) -> &'static str {
        "pagelens.sort-by-position"
    }

    fn apply(&self, tree: &mut AreaTree) {
        Self::sort_area(&mut tree.root);
    }
}

/// Joins sibling leaf areas that lie on the same text line into one line
/// area. Two areas belong to the same line when their vertical overlap is at
/// least `overlap_threshold` of the smaller height.
#[derive(Debug, Clone)]
pub struct FindLineOperator {
    pub overlap_threshold: f32,
}

impl FindLineOperator {
    pub fn new(overlap_threshold: f32) -> Self {
        Self { overlap_threshold }
    }

    fn find_lines(&self, area: &mut Area) {
        for child in &mut area.children {
            self.find_lines(child);
        }
        if area.children.len() < 2 || !area.children.iter().all(|c| c.is_leaf()) {
            return;
        }

        let children = std::mem::take(&mut area.children);
        let mut lines: Vec<Vec<Area>> = Vec::new();
        for child in children {
            match lines.last_mut() {
                Some(line)
                    if line
                        .iter()
                        .any(|a| a.bbox.y_overlap_ratio(&child.bbox) >= self.overlap_threshold) =>
                {
                    line.push(child)
                }
                _ => lines.push(vec![child]),
            }
        }

        area.children = lines
            .into_iter()
            .map(|mut line| {
                if line.len() == 1 {
                    line.pop().unwrap()
                } else {
                    line.sort_by(|a, b| {
                        a.bbox
                            .x0
                            .partial_cmp(&b.bbox.x0)
                            .unwrap_or(std::cmp::Ordering::Equal)
                    });
                    let mut joined = Area {
                        name: "line".to_owned(),
                        children: line,
                        ..Default::default()
                    };
                    joined.refresh_from_children();
                    joined
                }
            })
            .collect();
    }
}

impl AreaTreeOperator for FindLineOperator {
    fn id(&self) -> &'static str {
        "pagelens.find-lines"
    }

    fn apply(&self, tree: &mut AreaTree) {
        self.find_lines(&mut tree.root);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::BBox;

    fn leaf(name: &str, x0: f32, y0: f32, x1: f32, y1: f32) -> Area {
        Area {
            name: name.to_owned(),
            bbox: BBox::new(x0, y0, x1, y1),
            text: name.to_owned(),
            font_size: 12.0,
            ..Default::default()
        }
    }

    fn tree_with_children(children: Vec<Area>) -> AreaTree {
        AreaTree {
            root: Area {
                name: "root".into(),
                bbox: BBox::new(0.0, 0.0, 1000.0, 1000.0),
                children,
                ..Default::default()
            },
            page_iri: None,
            iri: None,
            parent_iri: None,
            creator: None,
            creator_params: None,
        }
    }

    #[test]
    fn test_sort_by_position() {
        let mut tree = tree_with_children(vec![
            leaf("c", 0.0, 50.0, 10.0, 60.0),
            leaf("b", 90.0, 10.0, 100.0, 20.0),
            leaf("a", 0.0, 10.0, 10.0, 20.0),
        ]);
        SortByPositionOperator.apply(&mut tree);
        let names: Vec<_> = tree.root.children.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_find_lines_joins_same_row() {
        let mut tree = tree_with_children(vec![
            leaf("left", 0.0, 10.0, 50.0, 22.0),
            leaf("right", 60.0, 11.0, 120.0, 23.0),
            leaf("below", 0.0, 40.0, 50.0, 52.0),
        ]);
        FindLineOperator::new(0.9).apply(&mut tree);

        assert_eq!(tree.root.children.len(), 2);
        let line = &tree.root.children[0];
        assert_eq!(line.name, "line");
        assert_eq!(line.children.len(), 2);
        assert_eq!(line.text, "left right");
        assert!(tree.root.children[1].is_leaf());
    }

    #[test]
    fn test_find_lines_leaves_partial_overlap_apart() {
        // 60% vertical overlap, as between a line and a superscript;
        // well below the 0.9 bar, so the areas stay separate
        let mut tree = tree_with_children(vec![
            leaf("base", 0.0, 0.0, 50.0, 12.0),
            leaf("raised", 60.0, 4.8, 120.0, 16.8),
        ]);
        FindLineOperator::new(0.9).apply(&mut tree);
        assert_eq!(tree.root.children.len(), 2);
        assert!(tree.root.children.iter().all(|a| a.is_leaf()));
    }

    #[test]
    fn test_find_lines_keeps_singletons_flat() {
        let mut tree = tree_with_children(vec![
            leaf("a", 0.0, 0.0, 10.0, 10.0),
            leaf("b", 0.0, 30.0, 10.0, 40.0),
        ]);
        FindLineOperator::new(0.9).apply(&mut tree);
        assert!(tree.root.children.iter().all(|a| a.is_leaf()));
        assert_eq!(tree.root.children.len(), 2);
    }
}
