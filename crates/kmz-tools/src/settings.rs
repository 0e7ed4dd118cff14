use clap::{Args, Parser, Subcommand};
use kmz_track_lib::Config;
use kmz_track_lib::extract::{DEFAULT_UNNAMED_TRACK, DEFAULT_UNNAMED_WAYPOINT};
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
/// KMZ Tools - Reverse and merge KMZ track containers
pub struct Settings {
    #[clap(subcommand)]
    pub command: Command,

    /// Process files one after the other instead of in parallel
    #[clap(long, global = true, default_value = "false")]
    pub sequential: bool,

    /// Name given to tracks without a name
    #[clap(long, global = true, default_value = DEFAULT_UNNAMED_TRACK)]
    pub unnamed_track: String,

    /// Name given to waypoints without a name
    #[clap(long, global = true, default_value = DEFAULT_UNNAMED_WAYPOINT)]
    pub unnamed_waypoint: String,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Reverse the direction of every track, writing one reversed_<name> per input
    Reverse {
        /// KMZ files to reverse
        #[clap(required = true, value_name = "FILE")]
        files: Vec<PathBuf>,

        /// Directory the reversed files are written to
        #[clap(short, long, value_name = "DIR", default_value = ".")]
        output_dir: PathBuf,

        /// Don't write files in which nothing was reversed
        #[clap(long, default_value = "false")]
        skip_empty: bool,
    },
    /// Merge several files into merged.kmz, or merged_advanced.kmz with --advanced
    Merge {
        /// KMZ files to merge, in order
        #[clap(required = true, value_name = "FILE")]
        files: Vec<PathBuf>,

        /// Directory the merged file is written to
        #[clap(short, long, value_name = "DIR", default_value = ".")]
        output_dir: PathBuf,

        /// Fuse the selected tracks into one line instead of concatenating documents
        #[clap(long, default_value = "false")]
        advanced: bool,

        /// Name of the fused track in advanced mode
        #[clap(long, default_value = "Merged Track")]
        track_name: String,

        #[clap(flatten)]
        edits: SelectionEdits,
    },
    /// List the tracks that an advanced merge would use
    Tracks {
        /// KMZ files to inspect
        #[clap(required = true, value_name = "FILE")]
        files: Vec<PathBuf>,

        /// Print JSON instead of a table
        #[clap(long, default_value = "false")]
        json: bool,

        #[clap(flatten)]
        edits: SelectionEdits,
    },
}

/// Reorder and delete intents, applied deletes first, each in the order given
///
/// Track ids are `<file index>-<track index>` as printed by the `tracks` command.
/// Removing the last track of a file removes the file, which renumbers later files.
#[derive(Args, Debug, Clone, Default)]
pub struct SelectionEdits {
    /// Delete a track by id
    #[clap(long = "delete", value_name = "ID")]
    pub deletes: Vec<String>,

    /// Move a track to a 0-based position in the live sequence
    #[clap(long = "move", value_name = "ID:POSITION", value_parser = parse_track_move)]
    pub moves: Vec<TrackMove>,
}

impl SelectionEdits {
    pub fn is_empty(&self) -> bool {
        self.deletes.is_empty() && self.moves.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackMove {
    pub id: String,
    pub position: usize,
}

fn parse_track_move(value: &str) -> Result<TrackMove, String> {
    let (id, position) = value
        .rsplit_once(':')
        .ok_or_else(|| format!("expected ID:POSITION, got {value:?}"))?;
    if id.is_empty() {
        return Err(format!("missing track id in {value:?}"));
    }
    let position = position
        .parse()
        .map_err(|e| format!("invalid position in {value:?}: {e}"))?;
    Ok(TrackMove {
        id: id.to_string(),
        position,
    })
}

impl Settings {
    /// Engine configuration for these settings
    pub fn config(&self) -> Config {
        let mut config = Config {
            unnamed_track: self.unnamed_track.clone(),
            unnamed_waypoint: self.unnamed_waypoint.clone(),
            parallel: !self.sequential,
            ..Config::default()
        };
        match &self.command {
            Command::Reverse { skip_empty, .. } => config.skip_empty_reversals = *skip_empty,
            Command::Merge { track_name, .. } => config.merged_track_name = track_name.clone(),
            Command::Tracks { .. } => {}
        }
        config
    }
}
