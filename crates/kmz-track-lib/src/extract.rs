//! Track and waypoint extraction
//!
//! The whole tree is walked depth-first, not only `Placemark` elements, because some
//! producers nest geometry directly under a `Document` or `Folder`. For every element:
//!
//! - each direct `LineString` child with coordinates becomes a candidate track named
//!   after the element (rank 1 if named, 3 otherwise);
//! - each `MultiGeometry` child is consumed as a group: its line members, nested groups
//!   included, become candidates of rank 2 (named) or 4 (unnamed) and its point members
//!   become waypoints, all named after the element; it is not visited again, so the same
//!   geometry is never counted twice;
//! - each direct `Point` child with a coordinate becomes a waypoint;
//! - every other child is visited recursively.
//!
//! Candidates are then stably ordered by rank and accepted one at a time. A candidate
//! whose coordinate sequence equals an accepted track's, or that shares both its first
//! and its last tuple with one, is a duplicate and is dropped. The endpoint rule also
//! drops genuinely different tracks that start and end at the same places, such as
//! two variants of an out-and-back route.

use crate::markup::{Element, KmlDocument};
use crate::track::{CoordinateSequence, CoordinateTuple, Track, Waypoint};

/// Name given to tracks whose owning element has no `name`
pub const DEFAULT_UNNAMED_TRACK: &str = "Unnamed Track";

/// Name given to waypoints whose owning element has no `name`
pub const DEFAULT_UNNAMED_WAYPOINT: &str = "Unnamed Waypoint";

const RANK_NAMED_LINE: u8 = 1;
const RANK_NAMED_GROUP: u8 = 2;
const RANK_UNNAMED_LINE: u8 = 3;
const RANK_UNNAMED_GROUP: u8 = 4;

/// Tracks and waypoints found in one document
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Extraction {
    pub tracks: Vec<Track>,
    pub waypoints: Vec<Waypoint>,
}

impl Extraction {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty() && self.waypoints.is_empty()
    }
}

/// A track found during the walk, before ranking and deduplication
#[derive(Debug)]
struct Candidate {
    name: String,
    coordinates: CoordinateSequence,
    rank: u8,
}

impl Candidate {
    fn duplicates(&self, other: &Candidate) -> bool {
        self.coordinates == other.coordinates || self.coordinates.same_endpoints(&other.coordinates)
    }
}

#[derive(Default)]
struct Walk {
    candidates: Vec<Candidate>,
    waypoints: Vec<(String, CoordinateTuple)>,
}

/// Extractor with configurable placeholder names
#[derive(Clone, Debug)]
pub struct Extractor {
    pub unnamed_track: String,
    pub unnamed_waypoint: String,
}

impl Default for Extractor {
    fn default() -> Self {
        Self {
            unnamed_track: DEFAULT_UNNAMED_TRACK.to_string(),
            unnamed_waypoint: DEFAULT_UNNAMED_WAYPOINT.to_string(),
        }
    }
}

/// Extract tracks and waypoints with the default placeholder names
pub fn extract(document: &KmlDocument, file_index: usize) -> Extraction {
    Extractor::default().extract(document, file_index)
}

fn line_coordinates(line: &Element) -> Option<CoordinateSequence> {
    let coordinates = CoordinateSequence::parse(&line.child("coordinates")?.text());
    (!coordinates.is_empty()).then_some(coordinates)
}

fn point_coordinate(point: &Element) -> Option<CoordinateTuple> {
    let text = point.child("coordinates")?.text();
    text.split_whitespace().next().map(CoordinateTuple::new)
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl Extractor {
    /// Walk the document and return its deduplicated tracks and all of its waypoints
    ///
    /// A document without recognizable geometry yields an empty [`Extraction`].
    pub fn extract(&self, document: &KmlDocument, file_index: usize) -> Extraction {
        #[cfg(feature = "profiling")]
        profiling::scope!("extract::extract");

        let mut walk = Walk::default();
        self.visit(&document.root, &mut walk);

        let mut candidates = walk.candidates;
        // Stable: equal ranks keep document order
        candidates.sort_by_key(|c| c.rank);

        let mut accepted: Vec<Candidate> = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if accepted.iter().any(|a| a.duplicates(&candidate)) {
                tracing::debug!(
                    "Dropping duplicate geometry '{}' ({} points)",
                    candidate.name,
                    candidate.coordinates.len()
                );
                continue;
            }
            accepted.push(candidate);
        }

        let tracks = accepted
            .into_iter()
            .enumerate()
            .map(|(source_track_index, c)| Track {
                name: c.name,
                coordinates: c.coordinates,
                source_file_index: file_index,
                source_track_index,
            })
            .collect();

        let waypoints = walk
            .waypoints
            .into_iter()
            .map(|(name, coordinate)| Waypoint {
                name,
                coordinate,
                source_file_index: file_index,
            })
            .collect();

        Extraction { tracks, waypoints }
    }

    fn visit(&self, element: &Element, walk: &mut Walk) {
        let name = element.child_text("name");

        for child in element.elements() {
            if child.is("LineString") {
                self.collect_line(child, name.as_deref(), false, walk);
            } else if child.is("Point") {
                self.collect_point(child, name.as_deref(), walk);
            } else if child.is("MultiGeometry") {
                self.visit_group(child, name.as_deref(), walk);
            } else {
                self.visit(child, walk);
            }
        }
    }

    /// Members of a group, nested groups included, belong to the element owning it
    fn visit_group(&self, group: &Element, name: Option<&str>, walk: &mut Walk) {
        for member in group.elements() {
            if member.is("LineString") {
                self.collect_line(member, name, true, walk);
            } else if member.is("Point") {
                self.collect_point(member, name, walk);
            } else if member.is("MultiGeometry") {
                self.visit_group(member, name, walk);
            }
        }
    }

    fn collect_line(&self, line: &Element, name: Option<&str>, grouped: bool, walk: &mut Walk) {
        let Some(coordinates) = line_coordinates(line) else {
            return;
        };
        let rank = match (name.is_some(), grouped) {
            (true, false) => RANK_NAMED_LINE,
            (true, true) => RANK_NAMED_GROUP,
            (false, false) => RANK_UNNAMED_LINE,
            (false, true) => RANK_UNNAMED_GROUP,
        };
        walk.candidates.push(Candidate {
            name: name.map_or_else(|| self.unnamed_track.clone(), str::to_string),
            coordinates,
            rank,
        });
    }

    fn collect_point(&self, point: &Element, name: Option<&str>, walk: &mut Walk) {
        if let Some(coordinate) = point_coordinate(point) {
            let name = name.map_or_else(|| self.unnamed_waypoint.clone(), str::to_string);
            walk.waypoints.push((name, coordinate));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_document(body: &str) -> KmlDocument {
        KmlDocument::parse(&format!(
            r#"<kml xmlns="http://www.opengis.net/kml/2.2"><Document>{body}</Document></kml>"#
        ))
        .unwrap()
    }

    fn placemark(name: Option<&str>, coordinates: &str) -> String {
        let name = name.map(|n| format!("<name>{n}</name>")).unwrap_or_default();
        format!(
            "<Placemark>{name}<LineString><coordinates>{coordinates}</coordinates></LineString></Placemark>"
        )
    }

    fn names(extraction: &Extraction) -> Vec<&str> {
        extraction.tracks.iter().map(|t| t.name.as_str()).collect()
    }

    #[test]
    fn test_extract_named_placemarks_in_order() {
        let doc = create_test_document(&format!(
            "{}{}",
            placemark(Some("T1"), "1,1 2,2"),
            placemark(Some("T2"), "3,3 4,4")
        ));
        let extraction = extract(&doc, 7);
        assert_eq!(names(&extraction), vec!["T1", "T2"]);
        assert_eq!(extraction.tracks[1].source_file_index, 7);
        assert_eq!(extraction.tracks[1].source_track_index, 1);
        assert_eq!(extraction.tracks[0].coordinates.to_string(), "1,1 2,2");
    }

    #[test]
    fn test_extract_geometry_without_placemark() {
        let doc = create_test_document(
            "<name>Bare</name><LineString><coordinates>1,1 2,2</coordinates></LineString>",
        );
        let extraction = extract(&doc, 0);
        assert_eq!(names(&extraction), vec!["Bare"]);
    }

    #[test]
    fn test_extract_nested_folders() {
        let doc = create_test_document(&format!(
            "<Folder><name>F</name><Folder>{}</Folder></Folder>",
            placemark(Some("Deep"), "5,5 6,6")
        ));
        assert_eq!(names(&extract(&doc, 0)), vec!["Deep"]);
    }

    #[test]
    fn test_unnamed_fallback() {
        let doc = create_test_document(&placemark(None, "1,1 2,2"));
        let extraction = extract(&doc, 0);
        assert_eq!(names(&extraction), vec![DEFAULT_UNNAMED_TRACK]);

        let custom = Extractor {
            unnamed_track: "Track".to_string(),
            ..Extractor::default()
        };
        assert_eq!(custom.extract(&doc, 0).tracks[0].name, "Track");
    }

    #[test]
    fn test_grouped_geometry_counted_once() {
        let doc = create_test_document(
            "<Placemark><name>Tour</name><MultiGeometry>\
             <LineString><coordinates>1,1 2,2</coordinates></LineString>\
             <LineString><coordinates>3,3 4,4</coordinates></LineString>\
             </MultiGeometry></Placemark>",
        );
        let extraction = extract(&doc, 0);
        assert_eq!(extraction.tracks.len(), 2);
        assert!(extraction.tracks.iter().all(|t| t.name == "Tour"));
    }

    #[test]
    fn test_grouped_points_take_owner_name() {
        let doc = create_test_document(
            "<Placemark><name>Huts</name><MultiGeometry>\
             <Point><coordinates>1,1</coordinates></Point>\
             <MultiGeometry><Point><coordinates>2,2</coordinates></Point></MultiGeometry>\
             </MultiGeometry></Placemark>",
        );
        let extraction = extract(&doc, 0);
        assert!(extraction.tracks.is_empty());
        let waypoints: Vec<(&str, &str)> = extraction
            .waypoints
            .iter()
            .map(|w| (w.name.as_str(), w.coordinate.as_str()))
            .collect();
        assert_eq!(waypoints, vec![("Huts", "1,1"), ("Huts", "2,2")]);
    }

    #[test]
    fn test_nested_group_lines_rank_as_grouped() {
        let doc = create_test_document(&format!(
            "<Placemark><name>Outer</name><MultiGeometry><MultiGeometry>\
             <LineString><coordinates>5,5 6,6</coordinates></LineString>\
             </MultiGeometry></MultiGeometry></Placemark>{}",
            placemark(None, "1,1 2,2")
        ));
        let extraction = extract(&doc, 0);
        assert_eq!(names(&extraction), vec!["Outer", DEFAULT_UNNAMED_TRACK]);
        assert_eq!(extraction.tracks[0].coordinates.to_string(), "5,5 6,6");
    }

    #[test]
    fn test_exact_duplicate_dropped() {
        let doc = create_test_document(&format!(
            "{}{}",
            placemark(Some("A"), "1,1 2,2 3,3"),
            placemark(Some("B"), "1,1\n2,2   3,3")
        ));
        assert_eq!(names(&extract(&doc, 0)), vec!["A"]);
    }

    #[test]
    fn test_endpoint_duplicate_keeps_direct_named_line() {
        // The grouped copy comes first in the document but ranks lower
        let doc = create_test_document(&format!(
            "<Placemark><name>Grouped</name><MultiGeometry>\
             <LineString><coordinates>1,1 1.5,1.5 3,3</coordinates></LineString>\
             </MultiGeometry></Placemark>{}",
            placemark(Some("Direct"), "1,1 2,2 3,3")
        ));
        let extraction = extract(&doc, 0);
        assert_eq!(names(&extraction), vec!["Direct"]);
        assert_eq!(extraction.tracks[0].coordinates.to_string(), "1,1 2,2 3,3");
    }

    #[test]
    fn test_out_and_back_variants_collapse() {
        // Known false positive of the endpoint rule
        let doc = create_test_document(&format!(
            "{}{}",
            placemark(Some("North loop"), "0,0 0,1 0,0"),
            placemark(Some("South loop"), "0,0 0,-1 0,0")
        ));
        assert_eq!(names(&extract(&doc, 0)), vec!["North loop"]);
    }

    #[test]
    fn test_rank_orders_distinct_tracks() {
        let doc = create_test_document(&format!(
            "{}<Placemark><MultiGeometry><LineString><coordinates>7,7 8,8</coordinates></LineString></MultiGeometry></Placemark>{}",
            placemark(None, "1,1 2,2"),
            placemark(Some("Named"), "3,3 4,4")
        ));
        let extraction = extract(&doc, 0);
        let coords: Vec<String> = extraction
            .tracks
            .iter()
            .map(|t| t.coordinates.to_string())
            .collect();
        assert_eq!(coords, vec!["3,3 4,4", "1,1 2,2", "7,7 8,8"]);
        let indices: Vec<usize> = extraction.tracks.iter().map(|t| t.source_track_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_waypoints_are_not_deduplicated() {
        let doc = create_test_document(
            "<Placemark><name>Hut</name><Point><coordinates>9,9,100</coordinates></Point></Placemark>\
             <Placemark><Point><coordinates>9,9,100</coordinates></Point></Placemark>",
        );
        let extraction = extract(&doc, 2);
        assert!(extraction.tracks.is_empty());
        assert_eq!(extraction.waypoints.len(), 2);
        assert_eq!(extraction.waypoints[0].name, "Hut");
        assert_eq!(extraction.waypoints[1].name, DEFAULT_UNNAMED_WAYPOINT);
        assert_eq!(extraction.waypoints[0].coordinate.as_str(), "9,9,100");
        assert_eq!(extraction.waypoints[1].source_file_index, 2);
    }

    #[test]
    fn test_empty_document() {
        let doc = create_test_document("<name>Nothing here</name>");
        assert!(extract(&doc, 0).is_empty());
    }

    #[test]
    fn test_empty_coordinates_ignored() {
        let doc = create_test_document(&placemark(Some("Empty"), "   "));
        assert!(extract(&doc, 0).tracks.is_empty());
    }
}
