//! Coordinate sequence reversal
//!
//! Every `LineString` in the tree, at any depth, has the tuple order of its
//! `coordinates` reversed. Fields inside a tuple are left alone.

use crate::markup::{Element, KmlDocument};
use crate::track::CoordinateSequence;

pub fn output_name(file_name: &str) -> String {
    format!("reversed_{file_name}")
}

/// Reverse every line geometry in `document`, returning how many were reversed
pub fn reverse_document(document: &mut KmlDocument) -> usize {
    #[cfg(feature = "profiling")]
    profiling::scope!("reverse::document");

    reverse_element(&mut document.root)
}

/// Reverse every line geometry at or below `element`
pub fn reverse_element(element: &mut Element) -> usize {
    if element.is("LineString") {
        let Some(coordinates) = element.child_mut("coordinates") else {
            return 0;
        };
        let sequence = CoordinateSequence::parse(&coordinates.text());
        if sequence.is_empty() {
            return 0;
        }
        coordinates.set_text(sequence.reversed().to_string());
        return 1;
    }
    element.elements_mut().map(reverse_element).sum()
}
