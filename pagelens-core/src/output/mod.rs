//! Output writers for rendered pages and area trees: plain-text listings,
//! XML serialization and PNG rendering.

pub mod png;
pub mod text;
pub mod xml;
