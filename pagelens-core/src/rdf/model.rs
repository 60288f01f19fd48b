use std::io::Write;

use anyhow::Context;
use oxigraph::io::{RdfFormat, RdfSerializer};
use oxigraph::model::vocab::rdf;
use oxigraph::model::{Literal, NamedNode, Triple};

use crate::entities::{Area, AreaTree, BoxType, Iri, Page};

use super::{vocab, IriFactory};

fn named(iri: &Iri) -> anyhow::Result<NamedNode> {
    NamedNode::new(iri.as_str()).with_context(|| format!("invalid IRI: {iri}"))
}

/// Builds the RDF graph describing a rendered page and its content boxes.
/// `page_iri` must already be assigned.
pub fn build_box_model(
    page: &Page,
    page_iri: &Iri,
    factory: &IriFactory,
) -> anyhow::Result<Vec<Triple>> {
    let page_node = named(page_iri)?;
    let mut triples = vec![
        Triple::new(page_node.clone(), rdf::TYPE, vocab::render("Page")),
        Triple::new(
            page_node.clone(),
            vocab::render("sourceUrl"),
            Literal::from(page.source_url.as_str()),
        ),
        Triple::new(
            page_node.clone(),
            vocab::render("title"),
            Literal::from(page.title.as_str()),
        ),
        Triple::new(
            page_node.clone(),
            vocab::render("width"),
            Literal::from(page.width),
        ),
        Triple::new(
            page_node.clone(),
            vocab::render("height"),
            Literal::from(page.height),
        ),
    ];

    for (order, b) in page.content_boxes().into_iter().enumerate() {
        let box_node = named(&factory.create_box_iri(page_iri, order))?;
        triples.push(Triple::new(box_node.clone(), rdf::TYPE, vocab::render("Box")));
        triples.push(Triple::new(
            box_node.clone(),
            vocab::render("belongsTo"),
            page_node.clone(),
        ));
        triples.push(Triple::new(
            box_node.clone(),
            vocab::render("positionX"),
            Literal::from(b.bbox.x0),
        ));
        triples.push(Triple::new(
            box_node.clone(),
            vocab::render("positionY"),
            Literal::from(b.bbox.y0),
        ));
        triples.push(Triple::new(
            box_node.clone(),
            vocab::render("width"),
            Literal::from(b.bbox.width()),
        ));
        triples.push(Triple::new(
            box_node.clone(),
            vocab::render("height"),
            Literal::from(b.bbox.height()),
        ));
        if b.kind == BoxType::TextContent {
            triples.push(Triple::new(
                box_node.clone(),
                vocab::render("fontSize"),
                Literal::from(b.font_size),
            ));
            triples.push(Triple::new(
                box_node.clone(),
                vocab::render("fontWeight"),
                Literal::from(b.font_weight),
            ));
            triples.push(Triple::new(
                box_node,
                vocab::render("text"),
                Literal::from(b.text.as_str()),
            ));
        }
    }
    Ok(triples)
}

/// Builds the RDF graph describing a segmented area tree. `tree_iri` must
/// already be assigned.
pub fn build_area_model(
    tree: &AreaTree,
    tree_iri: &Iri,
    factory: &IriFactory,
) -> anyhow::Result<Vec<Triple>> {
    let tree_node = named(tree_iri)?;
    let mut triples = vec![Triple::new(
        tree_node.clone(),
        rdf::TYPE,
        vocab::segm("AreaTree"),
    )];
    if let Some(page_iri) = &tree.page_iri {
        triples.push(Triple::new(
            tree_node.clone(),
            vocab::segm("hasSourcePage"),
            named(page_iri)?,
        ));
    }

    let mut order = 0usize;
    write_area_triples(
        &tree.root,
        None,
        tree_iri,
        &tree_node,
        factory,
        &mut order,
        &mut triples,
    )?;
    Ok(triples)
}

fn write_area_triples(
    area: &Area,
    parent: Option<&NamedNode>,
    tree_iri: &Iri,
    tree_node: &NamedNode,
    factory: &IriFactory,
    order: &mut usize,
    triples: &mut Vec<Triple>,
) -> anyhow::Result<()> {
    let area_node = named(&factory.create_area_iri(tree_iri, *order))?;
    *order += 1;

    triples.push(Triple::new(area_node.clone(), rdf::TYPE, vocab::segm("Area")));
    triples.push(Triple::new(
        area_node.clone(),
        vocab::segm("belongsTo"),
        tree_node.clone(),
    ));
    triples.push(Triple::new(
        area_node.clone(),
        vocab::segm("name"),
        Literal::from(area.name.as_str()),
    ));
    triples.push(Triple::new(
        area_node.clone(),
        vocab::render("positionX"),
        Literal::from(area.bbox.x0),
    ));
    triples.push(Triple::new(
        area_node.clone(),
        vocab::render("positionY"),
        Literal::from(area.bbox.y0),
    ));
    triples.push(Triple::new(
        area_node.clone(),
        vocab::render("width"),
        Literal::from(area.bbox.width()),
    ));
    triples.push(Triple::new(
        area_node.clone(),
        vocab::render("height"),
        Literal::from(area.bbox.height()),
    ));
    if !area.text.is_empty() {
        triples.push(Triple::new(
            area_node.clone(),
            vocab::render("fontSize"),
            Literal::from(area.font_size),
        ));
        triples.push(Triple::new(
            area_node.clone(),
            vocab::render("fontWeight"),
            Literal::from(area.font_weight),
        ));
        triples.push(Triple::new(
            area_node.clone(),
            vocab::render("text"),
            Literal::from(area.text.as_str()),
        ));
    }
    if let Some(parent) = parent {
        triples.push(Triple::new(
            area_node.clone(),
            vocab::segm("isChildOf"),
            parent.clone(),
        ));
    }
    for child in &area.children {
        write_area_triples(
            child,
            Some(&area_node),
            tree_iri,
            tree_node,
            factory,
            order,
            triples,
        )?;
    }
    Ok(())
}

/// Serializes triples as Turtle with the toolkit prefixes.
pub fn write_turtle<W: Write>(triples: &[Triple], out: W) -> anyhow::Result<()> {
    let mut writer = RdfSerializer::from_format(RdfFormat::Turtle)
        .with_prefix("box", vocab::RENDER_NS)
        .context("invalid render prefix")?
        .with_prefix("segm", vocab::SEGM_NS)
        .context("invalid segmentation prefix")?
        .with_prefix("rdf", "http://www.w3.org/1999/02/22-rdf-syntax-ns#")
        .context("invalid rdf prefix")?
        .for_writer(out);
    for triple in triples {
        writer.serialize_triple(triple).context("can't write triple")?;
    }
    writer.finish().context("can't finish Turtle output")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{BBox, BoxNode};
    use oxigraph::model::Term;

    fn demo_page() -> (Page, Iri) {
        let mut root = BoxNode::new_element(0, "body", BBox::new(0.0, 0.0, 100.0, 50.0));
        root.children.push(BoxNode::new_text(
            1,
            BBox::new(0.0, 0.0, 40.0, 12.0),
            "hello",
            12.0,
            0.0,
        ));
        root.children
            .push(BoxNode::new_replaced(2, "img", BBox::new(0.0, 20.0, 30.0, 40.0)));
        let page = Page {
            source_url: "http://example.com/".into(),
            title: "demo".into(),
            width: 100.0,
            height: 50.0,
            screenshot: None,
            root,
            iri: None,
            parent_iri: None,
            creator: None,
            creator_params: None,
        };
        (page, IriFactory::default().create_artifact_iri(1))
    }

    #[test]
    fn test_box_model_text_properties_only_on_text_boxes() {
        let (page, iri) = demo_page();
        let triples = build_box_model(&page, &iri, &IriFactory::default()).unwrap();

        let text_prop = vocab::render("text");
        let text_triples: Vec<_> = triples.iter().filter(|t| t.predicate == text_prop).collect();
        assert_eq!(text_triples.len(), 1);

        let box_type = Term::from(vocab::render("Box"));
        let boxes = triples
            .iter()
            .filter(|t| t.predicate == rdf::TYPE && t.object == box_type)
            .count();
        assert_eq!(boxes, 2);
    }

    #[test]
    fn test_turtle_output_carries_prefixes() {
        let (page, iri) = demo_page();
        let triples = build_box_model(&page, &iri, &IriFactory::default()).unwrap();
        let mut buf = Vec::new();
        write_turtle(&triples, &mut buf).unwrap();
        let ttl = String::from_utf8(buf).unwrap();
        assert!(ttl.contains("@prefix box:"));
        assert!(ttl.contains("hello"));
    }

    #[test]
    fn test_area_model_links_children_to_parents() {
        let (mut page, page_iri) = demo_page();
        page.iri = Some(page_iri);
        let tree = crate::segm::SegmProvider::create_area_tree(
            &crate::segm::BasicSegmProvider::new(true),
            &page,
        )
        .unwrap();
        let tree_iri = IriFactory::default().create_artifact_iri(2);
        let triples = build_area_model(&tree, &tree_iri, &IriFactory::default()).unwrap();

        let child_prop = vocab::segm("isChildOf");
        let links = triples.iter().filter(|t| t.predicate == child_prop).count();
        // two leaves, each linked to the root area
        assert_eq!(links, 2);

        let source_prop = vocab::segm("hasSourcePage");
        assert!(triples.iter().any(|t| t.predicate == source_prop));
    }
}
