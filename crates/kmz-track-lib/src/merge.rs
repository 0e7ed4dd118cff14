//! Merge strategies
//!
//! - **Structural**: the first document is kept as-is and the top-level `Placemark` and
//!   `Folder` nodes of every later document are appended to its feature container.
//!   Nothing is deduplicated or reordered. Style definitions the seed does not know yet
//!   are carried over so style references in appended placemarks keep resolving.
//! - **Flattened**: the coordinates of the selected tracks are fused, in selection
//!   order, into one line. Waypoints follow as separate point placemarks.

use crate::markup::{Element, KmlDocument, Node};
use crate::selection::TrackItem;
use crate::track::{CoordinateSequence, Waypoint};
use crate::{KmzError, Result};
use std::collections::HashSet;

/// Minimum number of files a structural merge accepts
pub const MIN_STRUCTURAL_INPUTS: usize = 2;

/// Top-level feature nodes moved between documents by a structural merge
const FEATURE_TAGS: [&str; 2] = ["Placemark", "Folder"];

/// Shared style definitions carried over by a structural merge
const STYLE_TAGS: [&str; 2] = ["Style", "StyleMap"];

pub fn structural_output_name(extension: &str) -> String {
    format!("merged.{extension}")
}

pub fn flattened_output_name(extension: &str) -> String {
    format!("merged_advanced.{extension}")
}

fn is_feature(element: &Element) -> bool {
    FEATURE_TAGS.iter().any(|tag| element.is(tag))
}

fn is_style(element: &Element) -> bool {
    STYLE_TAGS.iter().any(|tag| element.is(tag))
}

/// Append the features of `others` to `seed`, in order
pub fn merge_structural(
    mut seed: KmlDocument,
    others: impl IntoIterator<Item = KmlDocument>,
) -> KmlDocument {
    #[cfg(feature = "profiling")]
    profiling::scope!("merge::structural");

    seed.with_feature_container(|container| {
        let mut style_ids: HashSet<String> = container
            .elements()
            .filter(|e| is_style(e))
            .filter_map(|e| e.attribute("id").map(String::from))
            .collect();

        for mut other in others {
            let mut features = Vec::new();
            let mut styles = Vec::new();
            other.with_feature_container(|source| {
                for node in source.children.drain(..) {
                    let Node::Element(element) = node else {
                        continue;
                    };
                    if is_feature(&element) {
                        features.push(element);
                    } else if is_style(&element) {
                        // Styles without an id can't be referenced, so they're dropped
                        if let Some(id) = element.attribute("id") {
                            if style_ids.insert(id.to_string()) {
                                styles.push(element);
                            }
                        }
                    }
                }
            });

            tracing::debug!(
                "Structural merge: appending {} features and {} styles",
                features.len(),
                styles.len()
            );
            insert_styles(container, styles);
            for feature in features {
                container.push_child(feature);
            }
        }
    });
    seed
}

/// Insert style definitions before the first feature of `container`
fn insert_styles(container: &mut Element, styles: Vec<Element>) {
    if styles.is_empty() {
        return;
    }
    let position = container
        .children
        .iter()
        .position(|node| matches!(node, Node::Element(e) if is_feature(e)))
        .unwrap_or(container.children.len());
    container
        .children
        .splice(position..position, styles.into_iter().map(Node::Element));
}

/// Fuse the coordinates of `tracks` into a single line followed by `waypoints`
///
/// Fails with [`KmzError::NoTracksSelected`] when `tracks` is empty.
pub fn merge_flattened<'a>(
    tracks: impl IntoIterator<Item = &'a TrackItem>,
    waypoints: &[Waypoint],
    track_name: &str,
) -> Result<KmlDocument> {
    #[cfg(feature = "profiling")]
    profiling::scope!("merge::flattened");

    let mut coordinates = CoordinateSequence::default();
    let mut track_count = 0usize;
    for track in tracks {
        coordinates.extend_from(&track.coordinates);
        track_count += 1;
    }
    if track_count == 0 {
        return Err(KmzError::NoTracksSelected);
    }
    tracing::debug!(
        "Flattened merge: {} tracks, {} points, {} waypoints",
        track_count,
        coordinates.len(),
        waypoints.len()
    );

    let line = Element::new("Placemark")
        .with_child(Element::new("name").with_text(track_name))
        .with_child(
            Element::new("LineString")
                .with_child(Element::new("tessellate").with_text("1"))
                .with_child(Element::new("coordinates").with_text(coordinates.to_string())),
        );

    let mut document = Element::new("Document").with_child(line);
    for waypoint in waypoints {
        document.push_child(
            Element::new("Placemark")
                .with_child(Element::new("name").with_text(waypoint.name.as_str()))
                .with_child(
                    Element::new("Point").with_child(
                        Element::new("coordinates").with_text(waypoint.coordinate.as_str()),
                    ),
                ),
        );
    }

    let mut output = KmlDocument::new_kml();
    output.root.push_child(document);
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::extract;
    use crate::track::{CoordinateTuple, Track};

    fn create_test_document(placemarks: &[&str]) -> KmlDocument {
        let body: String = placemarks
            .iter()
            .map(|name| {
                format!(
                    "<Placemark><name>{name}</name><styleUrl>#line</styleUrl>\
                     <LineString><coordinates>{name},0 {name},1</coordinates></LineString></Placemark>"
                )
            })
            .collect();
        KmlDocument::parse(&format!(
            r#"<kml xmlns="http://www.opengis.net/kml/2.2"><Document><name>doc</name>{body}</Document></kml>"#
        ))
        .unwrap()
    }

    fn create_test_item(file_index: usize, track_index: usize, coordinates: &str) -> TrackItem {
        let track = Track {
            name: format!("T{file_index}{track_index}"),
            coordinates: CoordinateSequence::parse(coordinates),
            source_file_index: file_index,
            source_track_index: track_index,
        };
        TrackItem::from_track(&track, &format!("f{file_index}.kmz"))
    }

    fn placemark_names(document: &KmlDocument) -> Vec<String> {
        document
            .feature_container()
            .children_named("Placemark")
            .filter_map(|p| p.child_text("name"))
            .collect()
    }

    #[test]
    fn test_structural_merge_preserves_file_order() {
        let a = create_test_document(&["A1", "A2"]);
        let b = create_test_document(&["B1"]);
        let c = create_test_document(&["C1", "C2"]);

        let merged = merge_structural(a, vec![b, c]);
        assert_eq!(placemark_names(&merged), vec!["A1", "A2", "B1", "C1", "C2"]);
        // The seed's own metadata stays in place
        assert_eq!(
            merged.feature_container().child_text("name").as_deref(),
            Some("doc")
        );
    }

    #[test]
    fn test_structural_merge_does_not_deduplicate() {
        let a = create_test_document(&["Same"]);
        let b = create_test_document(&["Same"]);
        let merged = merge_structural(a, vec![b]);
        assert_eq!(placemark_names(&merged), vec!["Same", "Same"]);
    }

    #[test]
    fn test_structural_merge_appends_folders() {
        let a = create_test_document(&["A1"]);
        let b = KmlDocument::parse(
            "<kml><Document><Folder><name>F</name><Placemark><name>B1</name></Placemark></Folder></Document></kml>",
        )
        .unwrap();
        let merged = merge_structural(a, vec![b]);
        let folder = merged.feature_container().child("Folder").unwrap();
        assert_eq!(folder.child_text("name").as_deref(), Some("F"));
    }

    #[test]
    fn test_structural_merge_without_document_element() {
        let a = KmlDocument::parse("<kml><Placemark><name>A</name></Placemark></kml>").unwrap();
        let b = create_test_document(&["B"]);
        let merged = merge_structural(a, vec![b]);
        let names: Vec<_> = merged
            .root
            .children_named("Placemark")
            .filter_map(|p| p.child_text("name"))
            .collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn test_structural_merge_carries_new_styles() {
        let a = KmlDocument::parse(
            r#"<kml><Document><Style id="line"/><Placemark><name>A</name></Placemark></Document></kml>"#,
        )
        .unwrap();
        let b = KmlDocument::parse(
            r#"<kml><Document><Style id="line"/><StyleMap id="hover"/><Style/><Placemark><name>B</name></Placemark></Document></kml>"#,
        )
        .unwrap();

        let merged = merge_structural(a, vec![b]);
        let container = merged.feature_container();
        let ids: Vec<_> = container
            .elements()
            .filter(|e| is_style(e))
            .map(|e| e.attribute("id").unwrap_or_default())
            .collect();
        assert_eq!(ids, vec!["line", "hover"]);

        let tags: Vec<_> = container.elements().map(|e| e.name.as_str()).collect();
        assert_eq!(tags, vec!["Style", "StyleMap", "Placemark", "Placemark"]);
    }

    #[test]
    fn test_structural_merge_track_sequence() {
        let a = create_test_document(&["A1", "A2"]);
        let b = create_test_document(&["B1"]);
        let c = create_test_document(&["C1"]);
        let expected: Vec<_> = [&a, &b, &c]
            .iter()
            .flat_map(|doc| extract(doc, 0).tracks)
            .map(|t| t.coordinates)
            .collect();

        let merged = merge_structural(a, vec![b, c]);
        let actual: Vec<_> = extract(&merged, 0)
            .tracks
            .into_iter()
            .map(|t| t.coordinates)
            .collect();
        assert_eq!(actual, expected);
        assert_eq!(actual.len(), 4);
    }

    #[test]
    fn test_flattened_merge_concatenates_in_live_order() {
        let items = vec![
            create_test_item(0, 0, "1,1 2,2"),
            create_test_item(0, 1, "3,3"),
            create_test_item(1, 0, "4,4 5,5 6,6"),
        ];
        let merged = merge_flattened(&items, &[], "Merged Track").unwrap();

        let extraction = extract(&merged, 0);
        assert_eq!(extraction.tracks.len(), 1);
        let track = &extraction.tracks[0];
        assert_eq!(track.name, "Merged Track");
        assert_eq!(track.coordinates.to_string(), "1,1 2,2 3,3 4,4 5,5 6,6");

        let total: usize = items.iter().map(|i| i.coordinates.len()).sum();
        assert_eq!(track.coordinates.len(), total);
    }

    #[test]
    fn test_flattened_merge_follows_reordering() {
        let items = vec![
            create_test_item(1, 0, "4,4"),
            create_test_item(0, 0, "1,1"),
        ];
        let merged = merge_flattened(&items, &[], "M").unwrap();
        let line = merged
            .feature_container()
            .child("Placemark")
            .and_then(|p| p.child("LineString"))
            .unwrap();
        assert_eq!(line.child_text("tessellate").as_deref(), Some("1"));
        assert_eq!(line.child_text("coordinates").as_deref(), Some("4,4 1,1"));
    }

    #[test]
    fn test_flattened_merge_emits_waypoints() {
        let items = vec![create_test_item(0, 0, "1,1 2,2")];
        let waypoints = vec![
            Waypoint {
                name: "Start".to_string(),
                coordinate: CoordinateTuple::new("1,1,0"),
                source_file_index: 0,
            },
            Waypoint {
                name: "Summit".to_string(),
                coordinate: CoordinateTuple::new("9,9,100"),
                source_file_index: 1,
            },
        ];
        let merged = merge_flattened(&items, &waypoints, "Merged Track").unwrap();
        assert_eq!(
            placemark_names(&merged),
            vec!["Merged Track", "Start", "Summit"]
        );

        let extraction = extract(&merged, 0);
        assert_eq!(extraction.waypoints.len(), 2);
        assert_eq!(extraction.waypoints[1].coordinate.as_str(), "9,9,100");
    }

    #[test]
    fn test_flattened_merge_requires_tracks() {
        let none: Vec<TrackItem> = Vec::new();
        let err = merge_flattened(&none, &[], "Merged Track").unwrap_err();
        assert!(matches!(err, KmzError::NoTracksSelected));
    }

    #[test]
    fn test_output_names() {
        assert_eq!(structural_output_name("kmz"), "merged.kmz");
        assert_eq!(flattened_output_name("kmz"), "merged_advanced.kmz");
    }
}
