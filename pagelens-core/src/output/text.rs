use std::io::{self, Write};

use crate::entities::{Area, BoxNode, BoxType};

/// Prints every text box of the subtree as `[x:y] text (Npx font)`.
pub fn print_text_boxes<W: Write>(b: &BoxNode, out: &mut W) -> io::Result<()> {
    match b.kind {
        BoxType::TextContent => {
            writeln!(
                out,
                "[{}:{}] {} ({}px font)",
                b.bbox.x0 as i32, b.bbox.y0 as i32, b.text, b.font_size
            )
        }
        BoxType::Element => {
            for child in &b.children {
                print_text_boxes(child, out)?;
            }
            Ok(())
        }
        BoxType::ReplacedContent => Ok(()),
    }
}

const FIELD_SEPARATOR: &str = " | ";

/// Formats leaf areas as rows of data fields: coordinate jumps turn into
/// line breaks and field separators, so tabular page content comes out
/// roughly aligned with its visual structure.
pub struct AreaFieldPrinter<W: Write> {
    out: W,
    last_x: f32,
    last_y: f32,
}

impl<W: Write> AreaFieldPrinter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            last_x: 0f32,
            last_y: 0f32,
        }
    }

    /// Prints the leaf areas of the subtree in pre-order.
    pub fn print_leaves(&mut self, root: &Area) -> io::Result<()> {
        if root.is_leaf() {
            self.print_area(root)
        } else {
            for child in &root.children {
                self.print_leaves(child)?;
            }
            Ok(())
        }
    }

    pub fn print_area(&mut self, a: &Area) -> io::Result<()> {
        let em = a.font_size;
        // end the line when the Y coordinate changes significantly
        let dif_y = a.bbox.y0 - self.last_y;
        if dif_y > 0.25 * a.bbox.height() {
            writeln!(self.out)?;
            self.last_x = 0f32;
        }
        // field separator on a large X jump, plain space on a small one
        let dif_x = a.bbox.x0 - self.last_x;
        if dif_x > 1.0 * em {
            write!(self.out, "{FIELD_SEPARATOR}")?;
        } else if dif_x > 0.3 * em {
            write!(self.out, " ")?;
        }
        if a.font_weight > 0.75 {
            write!(self.out, "*{}*", a.text)?;
        } else {
            write!(self.out, "{}", a.text)?;
        }
        self.last_x = a.bbox.x1;
        self.last_y = a.bbox.y0;
        Ok(())
    }

    pub fn finish(mut self) -> io::Result<W> {
        writeln!(self.out)?;
        Ok(self.out)
    }
}
