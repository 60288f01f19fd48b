use std::fmt::Write;

use crate::entities::{Area, AreaTree, BoxNode, BoxType, Page};

const XML_HEADER: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

fn indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str("  ");
    }
}

/// Serializes a rendered page, box tree included.
pub fn page_to_xml(page: &Page) -> String {
    let mut out = String::from(XML_HEADER);
    let _ = writeln!(
        out,
        "<page url=\"{}\" title=\"{}\" width=\"{}\" height=\"{}\">",
        escape(&page.source_url),
        escape(&page.title),
        page.width,
        page.height
    );
    write_box(&mut out, &page.root, 1);
    out.push_str("</page>\n");
    out
}

fn write_box(out: &mut String, b: &BoxNode, depth: usize) {
    let kind = match b.kind {
        BoxType::Element => "element",
        BoxType::TextContent => "text",
        BoxType::ReplacedContent => "replaced",
    };
    indent(out, depth);
    let _ = write!(
        out,
        "<box id=\"{}\" type=\"{}\" x1=\"{}\" y1=\"{}\" x2=\"{}\" y2=\"{}\"",
        b.id, kind, b.bbox.x0, b.bbox.y0, b.bbox.x1, b.bbox.y1
    );
    if b.kind == BoxType::TextContent {
        let _ = write!(
            out,
            " fontSize=\"{}\" fontWeight=\"{}\"",
            b.font_size, b.font_weight
        );
    }
    if !b.tag.is_empty() {
        let _ = write!(out, " tag=\"{}\"", escape(&b.tag));
    }
    if b.children.is_empty() && b.text.is_empty() {
        out.push_str("/>\n");
    } else if b.children.is_empty() {
        let _ = writeln!(out, ">{}</box>", escape(&b.text));
    } else {
        out.push_str(">\n");
        for child in &b.children {
            write_box(out, child, depth + 1);
        }
        indent(out, depth);
        out.push_str("</box>\n");
    }
}

/// Serializes an area tree. The header line is optional so the output can be
/// embedded in a larger document or dumped to a console.
pub fn area_tree_to_xml(tree: &AreaTree, produce_header: bool) -> String {
    let mut out = String::new();
    if produce_header {
        out.push_str(XML_HEADER);
    }
    match &tree.page_iri {
        Some(iri) => {
            let _ = writeln!(out, "<areaTree pageIri=\"{}\">", escape(iri.as_str()));
        }
        None => out.push_str("<areaTree>\n"),
    }
    write_area(&mut out, &tree.root, 1);
    out.push_str("</areaTree>\n");
    out
}

fn write_area(out: &mut String, a: &Area, depth: usize) {
    indent(out, depth);
    let _ = write!(
        out,
        "<area name=\"{}\" x1=\"{}\" y1=\"{}\" x2=\"{}\" y2=\"{}\" fontSize=\"{}\" fontWeight=\"{}\"",
        escape(&a.name),
        a.bbox.x0,
        a.bbox.y0,
        a.bbox.x1,
        a.bbox.y1,
        a.font_size,
        a.font_weight
    );
    if a.is_leaf() {
        if a.text.is_empty() {
            out.push_str("/>\n");
        } else {
            let _ = writeln!(out, ">{}</area>", escape(&a.text));
        }
    } else {
        out.push_str(">\n");
        for child in &a.children {
            write_area(out, child, depth + 1);
        }
        indent(out, depth);
        out.push_str("</area>\n");
    }
}
