//! Track and waypoint storage module
//!
//! Coordinates are kept as the raw `lon,lat[,alt]` text found in the document so that
//! reversal and merging never change the precision or layout of a tuple. Numeric views
//! are parsed on demand for metadata like bounding boxes and distances.

use crate::utils;
use geo::{Point, Rect};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single `lon,lat[,alt]` coordinate tuple, stored verbatim
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct CoordinateTuple(String);

impl CoordinateTuple {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse the tuple into `(longitude, latitude, altitude)`
    ///
    /// Returns `None` when longitude or latitude is missing or not a number. A
    /// missing or malformed altitude is reported as `None` in the third field.
    pub fn lon_lat_alt(&self) -> Option<(f64, f64, Option<f64>)> {
        let mut fields = self.0.split(',').map(str::trim);
        let lon = fields.next()?.parse::<f64>().ok()?;
        let lat = fields.next()?.parse::<f64>().ok()?;
        let alt = fields.next().and_then(|a| a.parse::<f64>().ok());
        Some((lon, lat, alt))
    }

    /// Longitude/latitude as a `geo::Point` (x = longitude, y = latitude)
    #[inline]
    pub fn point(&self) -> Option<Point<f64>> {
        self.lon_lat_alt().map(|(lon, lat, _)| Point::new(lon, lat))
    }
}

impl fmt::Display for CoordinateTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ordered sequence of coordinate tuples, serialized as whitespace separated text
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct CoordinateSequence(Vec<CoordinateTuple>);

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl CoordinateSequence {
    /// Split a KML `coordinates` string on any whitespace (spaces, tabs, newlines)
    pub fn parse(text: &str) -> Self {
        Self(text.split_whitespace().map(CoordinateTuple::new).collect())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn tuples(&self) -> &[CoordinateTuple] {
        &self.0
    }

    #[inline]
    pub fn first(&self) -> Option<&CoordinateTuple> {
        self.0.first()
    }

    #[inline]
    pub fn last(&self) -> Option<&CoordinateTuple> {
        self.0.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CoordinateTuple> {
        self.0.iter()
    }

    /// Copy of this sequence in reverse order (tuple contents are untouched)
    pub fn reversed(&self) -> Self {
        Self(self.0.iter().rev().cloned().collect())
    }

    /// Append every tuple of `other` after the tuples of `self`
    pub fn extend_from(&mut self, other: &CoordinateSequence) {
        self.0.extend(other.0.iter().cloned());
    }

    /// Whether both sequences start at the same tuple and end at the same tuple
    pub fn same_endpoints(&self, other: &CoordinateSequence) -> bool {
        match (self.first(), self.last(), other.first(), other.last()) {
            (Some(a_first), Some(a_last), Some(b_first), Some(b_last)) => {
                a_first == b_first && a_last == b_last
            }
            _ => false,
        }
    }

    /// All tuples that parse as numbers, as `geo::Point`s
    pub fn points(&self) -> Vec<Point<f64>> {
        self.0.iter().filter_map(CoordinateTuple::point).collect()
    }

    /// Bounding box in degrees (x = longitude, y = latitude)
    pub fn bounding_box(&self) -> Option<Rect<f64>> {
        utils::bounding_box(&self.points())
    }

    /// Length along the sequence in meters
    pub fn length_meters(&self) -> f64 {
        utils::path_length_meters(&self.points())
    }
}

impl fmt::Display for CoordinateSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, tuple) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            f.write_str(tuple.as_str())?;
        }
        Ok(())
    }
}

impl FromIterator<CoordinateTuple> for CoordinateSequence {
    fn from_iter<I: IntoIterator<Item = CoordinateTuple>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a CoordinateSequence {
    type Item = &'a CoordinateTuple;
    type IntoIter = std::slice::Iter<'a, CoordinateTuple>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// A named path extracted from a document
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Track {
    /// Name of the owning element, or the configured placeholder
    pub name: String,
    pub coordinates: CoordinateSequence,
    /// Which uploaded file this track came from
    pub source_file_index: usize,
    /// Extraction order within that file
    pub source_track_index: usize,
}

/// A named point extracted from a document
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Waypoint {
    pub name: String,
    pub coordinate: CoordinateTuple,
    pub source_file_index: usize,
}

/// Extraction result of one uploaded file
#[derive(Clone, Debug, Default)]
pub struct FileTracks {
    pub file_index: usize,
    pub file_name: String,
    pub tracks: Vec<Track>,
    pub waypoints: Vec<Waypoint>,
}

impl FileTracks {
    /// Whether the file contributed neither tracks nor waypoints
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty() && self.waypoints.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_sequence() -> CoordinateSequence {
        // A few points around London
        CoordinateSequence::parse("-0.1278,51.5074,10 -0.1276,51.5076,11 -0.1274,51.5078,12")
    }

    #[test]
    fn test_parse_splits_on_any_whitespace() {
        let seq = CoordinateSequence::parse("  1,1,0\n\t2,2,0   3,3,0\n");
        assert_eq!(seq.len(), 3);
        assert_eq!(seq.first().unwrap().as_str(), "1,1,0");
        assert_eq!(seq.last().unwrap().as_str(), "3,3,0");
    }

    #[test]
    fn test_display_joins_with_single_spaces() {
        let seq = CoordinateSequence::parse("1,1\n\n2,2    3,3");
        assert_eq!(seq.to_string(), "1,1 2,2 3,3");
    }

    #[test]
    fn test_reversed_keeps_tuple_layout() {
        let seq = CoordinateSequence::parse("1,2,3 4,5,6");
        assert_eq!(seq.reversed().to_string(), "4,5,6 1,2,3");
    }

    #[test]
    fn test_tuple_parsing() {
        let tuple = CoordinateTuple::new("8.5417,47.3769,408.2");
        assert_eq!(tuple.lon_lat_alt(), Some((8.5417, 47.3769, Some(408.2))));

        let no_alt = CoordinateTuple::new("8.5,47.3");
        assert_eq!(no_alt.lon_lat_alt(), Some((8.5, 47.3, None)));

        assert!(CoordinateTuple::new("not-a-number").lon_lat_alt().is_none());
    }

    #[test]
    fn test_same_endpoints() {
        let a = CoordinateSequence::parse("1,1 2,2 3,3");
        let b = CoordinateSequence::parse("1,1 9,9 3,3");
        let c = CoordinateSequence::parse("1,1 2,2 4,4");
        assert!(a.same_endpoints(&b));
        assert!(!a.same_endpoints(&c));
        assert!(!a.same_endpoints(&CoordinateSequence::default()));
    }

    #[test]
    fn test_bounding_box_and_length() {
        let seq = create_test_sequence();
        let bbox = seq.bounding_box().unwrap();
        assert!(bbox.width() > 0.0);
        assert!(bbox.height() > 0.0);

        // The test points are very close together
        let distance = seq.length_meters();
        assert!(distance > 0.0);
        assert!(distance < 1000.0);
    }

    #[test]
    fn test_extend_from() {
        let mut a = CoordinateSequence::parse("1,1 2,2");
        a.extend_from(&CoordinateSequence::parse("3,3"));
        assert_eq!(a.to_string(), "1,1 2,2 3,3");
    }
}
