//! HTML parsers for the rendered aggregator page
//!
//! The renderer hands over the live DOM as HTML; everything here works on
//! that snapshot.

pub mod page;

pub use page::{FormatSummary, has_direct_button, parse_anchors, parse_formats};
