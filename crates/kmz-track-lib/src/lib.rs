//! KMZ Track Library - Core engine for KMZ track manipulation
//!
//! This library opens zipped KML containers, extracts the tracks and waypoints they
//! describe, keeps a user-editable ordering of those tracks, and produces derived
//! containers: a direction-reversed copy of each input, or a merge of several inputs.
//!
//! # Architecture
//!
//! - **[`container`]**: Reading and writing the zip container and its single KML member
//! - **[`markup`]**: Ordered, attributed element tree for the KML document
//! - **[`extract`]**: Depth-first geometry search with priority ranking and deduplication
//! - **[`SelectionState`]**: Stable track identities, reorder and delete bookkeeping
//! - **[`merge`]**: Structural and flattened merge strategies
//! - **[`reverse`]**: Recursive coordinate sequence reversal
//! - **[`Session`]**: Orchestration of the above for a list of uploaded files
//!
//! # Example
//!
//! ```rust
//! use kmz_track_lib::{Config, InputFile, NoopReporter, Session};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let kml = r#"<kml><Document><Placemark><name>Loop</name>
//!     <LineString><coordinates>1,1 2,2 3,3</coordinates></LineString>
//! </Placemark></Document></kml>"#;
//! let blob = kmz_track_lib::container::write_container(kml, "doc.kml")?;
//!
//! let mut session = Session::new(Config::default());
//! session.add_files(vec![InputFile::new("loop.kmz", blob)], &NoopReporter);
//!
//! let outputs = session.reverse(&NoopReporter)?;
//! assert_eq!(outputs[0].name, "reversed_loop.kmz");
//! # Ok(())
//! # }
//! ```

pub mod container;
pub mod extract;
pub mod markup;
pub mod merge;
pub mod reverse;
mod selection;
mod session;
mod track;
pub mod utils;

// Public API exports
pub use extract::{Extraction, extract};
pub use markup::{Element, KmlDocument, Node};
pub use selection::{DeleteOutcome, SelectionState, TrackItem};
pub use session::{
    Config, InputFile, Notice, NoticeLevel, NoopReporter, OutputBlob, Reporter, Session,
    TrackSummary,
};
pub use track::{CoordinateSequence, CoordinateTuple, FileTracks, Track, Waypoint};

/// Error types for the engine
#[derive(Debug, thiserror::Error)]
pub enum KmzError {
    #[error("Failed to parse {file}: {reason}")]
    ParseFailure { file: String, reason: String },

    #[error("No KML document found in {file}")]
    MissingMarkup { file: String },

    #[error("No tracks or waypoints found in {file}")]
    NoGeometryFound { file: String },

    #[error("No tracks selected to merge")]
    NoTracksSelected,

    #[error("At least {required} files are required, got {provided}")]
    InsufficientInputs { required: usize, provided: usize },

    #[error("Unknown track id: {0}")]
    UnknownTrack(String),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("XML error: {0}")]
    Xml(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl KmzError {
    /// Attach a file name to an error raised while decoding that file.
    ///
    /// Errors that already carry a file name are returned unchanged.
    pub fn for_file(self, file: &str) -> Self {
        match self {
            KmzError::Xml(reason) => KmzError::ParseFailure {
                file: file.to_string(),
                reason,
            },
            KmzError::Archive(e) => KmzError::ParseFailure {
                file: file.to_string(),
                reason: e.to_string(),
            },
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, KmzError>;
