use anyhow::Context;
use url::Url;

use crate::entities::Page;

pub mod chrome;
pub mod pdf;

/// Default browser viewport used by the demos and the batch renderer.
pub const DEFAULT_VIEWPORT_WIDTH: u32 = 1200;
pub const DEFAULT_VIEWPORT_HEIGHT: u32 = 800;

/// An external rendering backend that turns a URL into a page box tree.
pub trait TreeProvider: Send + Sync {
    fn id(&self) -> &'static str;

    /// Renders the document behind `url`. Blocks until the page is fully
    /// rendered.
    fn render(&self, url: &Url) -> anyhow::Result<Page>;
}

/// Prefixes a bare filesystem path with `file://`. Inputs that already carry
/// a scheme separator pass through unchanged.
pub fn coerce_to_url(input: &str) -> String {
    if input.contains("://") {
        input.to_owned()
    } else {
        format!("file://{input}")
    }
}

/// Parses a URL string, reporting malformed input as an error.
pub fn parse_url(input: &str) -> anyhow::Result<Url> {
    Url::parse(input).with_context(|| format!("malformed URL: {input}"))
}
