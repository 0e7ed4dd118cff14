//! Session orchestration
//!
//! A [`Session`] owns the uploaded files, the extraction-mode flag, the per-file
//! extraction snapshot and the selection state. Tracks are only extracted in advanced
//! mode, where they drive the flattened merge. Every change to the file list or the
//! mode flag re-extracts all files and replays previous deletions and reorders.
//!
//! Per-file work (extraction, reversal, parsing for a structural merge) fans out over
//! rayon. Results are collected in file order before anything is reported or combined,
//! so notices and outputs are deterministic regardless of scheduling.

use crate::container;
use crate::extract::{DEFAULT_UNNAMED_TRACK, DEFAULT_UNNAMED_WAYPOINT, Extractor};
use crate::markup::KmlDocument;
use crate::merge;
use crate::reverse;
use crate::selection::{DeleteOutcome, SelectionState, TrackItem};
use crate::track::{FileTracks, Waypoint};
use crate::{KmzError, Result};
use rayon::prelude::*;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Configuration for a session
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Config {
    /// Name of the single markup member written into output containers
    pub markup_member_name: String,
    /// File extension of accepted inputs and produced outputs, without the dot
    pub container_extension: String,
    /// Name given to tracks without a `name`
    pub unnamed_track: String,
    /// Name given to waypoints without a `name`
    pub unnamed_waypoint: String,
    /// Name of the fused line produced by the flattened merge
    pub merged_track_name: String,
    /// Produce no container for files where nothing was reversed
    pub skip_empty_reversals: bool,
    /// Fan per-file work out over the rayon thread pool
    pub parallel: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            markup_member_name: container::DEFAULT_MARKUP_MEMBER.to_string(),
            container_extension: "kmz".to_string(),
            unnamed_track: DEFAULT_UNNAMED_TRACK.to_string(),
            unnamed_waypoint: DEFAULT_UNNAMED_WAYPOINT.to_string(),
            merged_track_name: "Merged Track".to_string(),
            skip_empty_reversals: false,
            parallel: true,
        }
    }
}

/// A named blob uploaded by the user
#[derive(Debug, Clone)]
pub struct InputFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl InputFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

/// A named container produced by an operation
#[derive(Debug, Clone)]
pub struct OutputBlob {
    pub name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum NoticeLevel {
    Success,
    Warning,
    Error,
}

/// A user-visible event, usually naming the affected file
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Notice {
    pub level: NoticeLevel,
    pub file: Option<String>,
    pub message: String,
}

impl Notice {
    pub fn success(file: Option<&str>, message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Success, file, message)
    }

    pub fn warning(file: Option<&str>, message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Warning, file, message)
    }

    pub fn error(file: Option<&str>, message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Error, file, message)
    }

    fn new(level: NoticeLevel, file: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            level,
            file: file.map(String::from),
            message: message.into(),
        }
    }
}

/// Receiver of progress and notice events
///
/// `on_progress` may be called from worker threads.
pub trait Reporter: Send + Sync {
    /// Overall progress of the running operation, 0 to 100
    fn on_progress(&self, _percent: u8) {}

    fn on_notice(&self, _notice: &Notice) {}
}

/// Reporter that ignores every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReporter;

impl Reporter for NoopReporter {}

/// Display metadata of a live track
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrackSummary {
    pub id: String,
    pub name: String,
    pub file_name: String,
    pub points: usize,
    /// (min_lon, min_lat, max_lon, max_lat)
    pub bounding_box: Option<(f64, f64, f64, f64)>,
    pub length_meters: f64,
}

impl TrackSummary {
    fn from_item(item: &TrackItem) -> Self {
        let bounding_box = item
            .coordinates
            .bounding_box()
            .map(|rect| (rect.min().x, rect.min().y, rect.max().x, rect.max().y));
        Self {
            id: item.id.clone(),
            name: item.name.clone(),
            file_name: item.file_name.clone(),
            points: item.coordinates.len(),
            bounding_box,
            length_meters: item.coordinates.length_meters(),
        }
    }
}

/// Thread-safe completion counter feeding a [`Reporter`]
struct Progress<'a> {
    reporter: &'a dyn Reporter,
    done: AtomicUsize,
    total: usize,
}

impl<'a> Progress<'a> {
    fn start(reporter: &'a dyn Reporter, total: usize) -> Self {
        reporter.on_progress(0);
        Self {
            reporter,
            done: AtomicUsize::new(0),
            total,
        }
    }

    fn step(&self) {
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        let percent = (done * 100 / self.total.max(1)).min(100) as u8;
        self.reporter.on_progress(percent);
    }

    fn finish(&self) {
        self.reporter.on_progress(100);
    }
}

/// Outcome of extracting one file
enum Extracted {
    Tracks(FileTracks),
    Failed(FileTracks, KmzError),
}

impl Extracted {
    fn into_tracks(self) -> FileTracks {
        match self {
            Extracted::Tracks(tracks) | Extracted::Failed(tracks, _) => tracks,
        }
    }
}

/// Uploaded files plus the track selection derived from them
pub struct Session {
    config: Config,
    files: Vec<InputFile>,
    advanced: bool,
    extracted: Vec<FileTracks>,
    selection: SelectionState,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl Session {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            files: Vec::new(),
            advanced: false,
            extracted: Vec::new(),
            selection: SelectionState::new(),
        }
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn file_names(&self) -> Vec<&str> {
        self.files.iter().map(|f| f.name.as_str()).collect()
    }

    #[inline]
    pub fn is_advanced(&self) -> bool {
        self.advanced
    }

    #[inline]
    pub fn selection(&self) -> &SelectionState {
        &self.selection
    }

    /// Per-file extraction results, in file order
    #[inline]
    pub fn file_tracks(&self) -> &[FileTracks] {
        &self.extracted
    }

    fn accepts(&self, name: &str) -> bool {
        std::path::Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(&self.config.container_extension))
    }

    /// Append files to the session, then re-extract
    ///
    /// Files without the container extension are ignored. Files whose name is already
    /// in the session are skipped with a warning. Returns the number of files added.
    pub fn add_files(&mut self, files: Vec<InputFile>, reporter: &dyn Reporter) -> usize {
        let mut known: HashSet<String> = self.files.iter().map(|f| f.name.clone()).collect();
        let mut added = 0;
        for file in files {
            if !self.accepts(&file.name) {
                tracing::warn!("Ignoring {}: not a .{} file", file.name, self.config.container_extension);
                continue;
            }
            if !known.insert(file.name.clone()) {
                reporter.on_notice(&Notice::warning(
                    Some(&file.name),
                    format!("{} has already been uploaded", file.name),
                ));
                continue;
            }
            self.files.push(file);
            added += 1;
        }

        if added > 0 {
            tracing::info!("Added {} files ({} total)", added, self.files.len());
            self.refresh(reporter);
        }
        added
    }

    /// Remove one file by name, then re-extract. Returns whether it was present.
    pub fn remove_file(&mut self, name: &str, reporter: &dyn Reporter) -> bool {
        let Some(index) = self.files.iter().position(|f| f.name == name) else {
            return false;
        };
        self.files.remove(index);
        if self.files.is_empty() {
            self.clear_files();
        } else {
            self.refresh(reporter);
        }
        true
    }

    /// Drop every file, track, reorder and deletion
    pub fn clear_files(&mut self) {
        self.files.clear();
        self.extracted.clear();
        self.selection.clear();
    }

    /// Switch between structural (`false`) and flattened (`true`) merging
    pub fn set_advanced_mode(&mut self, advanced: bool, reporter: &dyn Reporter) {
        if self.advanced != advanced {
            self.advanced = advanced;
            self.refresh(reporter);
        }
    }

    /// Run `f` over every file, in parallel when configured, collecting in file order
    fn map_files<T, F>(&self, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize, &InputFile) -> T + Send + Sync,
    {
        if self.config.parallel {
            self.files
                .par_iter()
                .enumerate()
                .map(|(index, file)| f(index, file))
                .collect()
        } else {
            self.files
                .iter()
                .enumerate()
                .map(|(index, file)| f(index, file))
                .collect()
        }
    }

    /// Re-extract every file and rebuild the selection
    ///
    /// Outside advanced mode nothing is extracted and the selection is emptied.
    /// Deletions are kept either way.
    pub fn refresh(&mut self, reporter: &dyn Reporter) {
        #[cfg(feature = "profiling")]
        profiling::scope!("session::refresh");

        if !self.advanced {
            self.extracted.clear();
            self.selection.rebuild(&self.extracted);
            return;
        }

        let extractor = Extractor {
            unnamed_track: self.config.unnamed_track.clone(),
            unnamed_waypoint: self.config.unnamed_waypoint.clone(),
        };
        let progress = Progress::start(reporter, self.files.len());
        let results = self.map_files(|index, file| {
            let mut tracks = FileTracks {
                file_index: index,
                file_name: file.name.clone(),
                ..Default::default()
            };
            let extracted = match container::read_document(&file.name, &file.bytes) {
                Ok(document) => {
                    let extraction = extractor.extract(&document, index);
                    tracks.tracks = extraction.tracks;
                    tracks.waypoints = extraction.waypoints;
                    if tracks.is_empty() {
                        Extracted::Failed(
                            tracks,
                            KmzError::NoGeometryFound {
                                file: file.name.clone(),
                            },
                        )
                    } else {
                        Extracted::Tracks(tracks)
                    }
                }
                Err(e) => Extracted::Failed(tracks, e),
            };
            progress.step();
            extracted
        });
        progress.finish();

        self.extracted = results
            .into_iter()
            .map(|result| {
                if let Extracted::Failed(tracks, e) = &result {
                    report_file_error(reporter, &tracks.file_name, e);
                }
                result.into_tracks()
            })
            .collect();

        let emptied = self.selection.rebuild(&self.extracted);
        if !emptied.is_empty() {
            self.drop_files(&emptied, reporter);
        }
        tracing::debug!(
            "Extracted {} live tracks from {} files",
            self.selection.len(),
            self.files.len()
        );
    }

    /// Remove files whose tracks were all deleted, keeping the extraction snapshot
    fn drop_files(&mut self, names: &[String], reporter: &dyn Reporter) {
        for name in names {
            reporter.on_notice(&Notice::warning(
                Some(name),
                format!("Removed {name}: all of its tracks were deleted"),
            ));
        }
        self.files.retain(|f| !names.contains(&f.name));
        if self.files.is_empty() {
            self.clear_files();
            return;
        }

        self.extracted.retain(|f| !names.contains(&f.file_name));
        for (index, file) in self.extracted.iter_mut().enumerate() {
            file.file_index = index;
            for track in &mut file.tracks {
                track.source_file_index = index;
            }
            for waypoint in &mut file.waypoints {
                waypoint.source_file_index = index;
            }
        }
        self.selection.rebuild(&self.extracted);
    }

    /// Live tracks, in selection order
    pub fn live_tracks(&self) -> Vec<&TrackItem> {
        self.selection.live().collect()
    }

    /// Every waypoint of every file, in file order
    pub fn waypoints(&self) -> Vec<Waypoint> {
        self.extracted
            .iter()
            .flat_map(|file| file.waypoints.iter().cloned())
            .collect()
    }

    pub fn summaries(&self) -> Vec<TrackSummary> {
        self.selection.live().map(TrackSummary::from_item).collect()
    }

    pub fn move_track(&mut self, moved_id: &str, target_position: usize) -> Result<()> {
        self.selection.move_track(moved_id, target_position)
    }

    /// Delete a live track
    ///
    /// When it was the last live track of its file the file is removed from the
    /// session too. Removing the only file resets the session.
    pub fn delete_track(&mut self, track_id: &str, reporter: &dyn Reporter) -> Result<DeleteOutcome> {
        let outcome = self.selection.delete_track(track_id)?;
        if outcome.file_emptied {
            self.drop_files(std::slice::from_ref(&outcome.track.file_name), reporter);
        }
        Ok(outcome)
    }

    /// Merge the session's files with the strategy chosen by the mode flag
    pub fn merge(&self, reporter: &dyn Reporter) -> Result<OutputBlob> {
        let blob = if self.advanced {
            self.merge_flattened(reporter)?
        } else {
            self.merge_structural(reporter)?
        };
        reporter.on_notice(&Notice::success(
            None,
            format!("Files merged into {}", blob.name),
        ));
        tracing::info!("Merged {} files into {}", self.files.len(), blob.name);
        Ok(blob)
    }

    fn merge_flattened(&self, reporter: &dyn Reporter) -> Result<OutputBlob> {
        let progress = Progress::start(reporter, 1);
        let document = merge::merge_flattened(
            self.selection.live(),
            &self.waypoints(),
            &self.config.merged_track_name,
        )?;
        let bytes = container::write_document(&document, &self.config.markup_member_name)?;
        progress.finish();
        Ok(OutputBlob {
            name: merge::flattened_output_name(&self.config.container_extension),
            bytes,
        })
    }

    fn merge_structural(&self, reporter: &dyn Reporter) -> Result<OutputBlob> {
        if self.files.len() < merge::MIN_STRUCTURAL_INPUTS {
            return Err(KmzError::InsufficientInputs {
                required: merge::MIN_STRUCTURAL_INPUTS,
                provided: self.files.len(),
            });
        }

        let progress = Progress::start(reporter, self.files.len() + 1);
        let parsed = self.map_files(|_, file| {
            let document = container::read_document(&file.name, &file.bytes);
            progress.step();
            document
        });

        let mut documents: Vec<KmlDocument> = Vec::with_capacity(parsed.len());
        for (file, result) in self.files.iter().zip(parsed) {
            match result {
                Ok(document) => documents.push(document),
                Err(e) => report_file_error(reporter, &file.name, &e),
            }
        }

        let mut documents = documents.into_iter();
        let seed = documents.next().ok_or_else(|| KmzError::NoGeometryFound {
            file: self.file_names().join(", "),
        })?;
        let merged = merge::merge_structural(seed, documents);
        let bytes = container::write_document(&merged, &self.config.markup_member_name)?;
        progress.finish();
        Ok(OutputBlob {
            name: merge::structural_output_name(&self.config.container_extension),
            bytes,
        })
    }

    /// Produce one direction-reversed container per file
    ///
    /// Files that fail are reported and skipped. Fails only when there are no files.
    pub fn reverse(&self, reporter: &dyn Reporter) -> Result<Vec<OutputBlob>> {
        #[cfg(feature = "profiling")]
        profiling::scope!("session::reverse");

        if self.files.is_empty() {
            return Err(KmzError::InsufficientInputs {
                required: 1,
                provided: 0,
            });
        }

        let progress = Progress::start(reporter, self.files.len());
        let results = self.map_files(|_, file| {
            let result = self.reverse_file(file);
            progress.step();
            result
        });
        progress.finish();

        let mut outputs = Vec::new();
        for (file, result) in self.files.iter().zip(results) {
            match result {
                Ok((0, blob)) => {
                    tracing::warn!("No LineString coordinates found to reverse in {}", file.name);
                    reporter.on_notice(&Notice::warning(
                        Some(&file.name),
                        format!("No tracks found to reverse in {}", file.name),
                    ));
                    if !self.config.skip_empty_reversals {
                        outputs.push(blob);
                    }
                }
                Ok((count, blob)) => {
                    tracing::info!("Reversed {} track(s) in {}", count, file.name);
                    outputs.push(blob);
                }
                Err(e) => report_file_error(reporter, &file.name, &e),
            }
        }

        if !outputs.is_empty() {
            reporter.on_notice(&Notice::success(
                None,
                format!("Reversed {} of {} files", outputs.len(), self.files.len()),
            ));
        }
        Ok(outputs)
    }

    fn reverse_file(&self, file: &InputFile) -> Result<(usize, OutputBlob)> {
        let mut document = container::read_document(&file.name, &file.bytes)?;
        let count = reverse::reverse_document(&mut document);
        let bytes = container::write_document(&document, &self.config.markup_member_name)?;
        Ok((
            count,
            OutputBlob {
                name: reverse::output_name(&file.name),
                bytes,
            },
        ))
    }
}

fn report_file_error(reporter: &dyn Reporter, file: &str, error: &KmzError) {
    let notice = match error {
        KmzError::NoGeometryFound { .. } => Notice::warning(Some(file), error.to_string()),
        _ => Notice::error(Some(file), error.to_string()),
    };
    tracing::warn!("{}", error);
    reporter.on_notice(&notice);
}
