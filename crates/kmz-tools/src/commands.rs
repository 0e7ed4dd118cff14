use crate::reporter::ConsoleReporter;
use crate::settings::{Command, SelectionEdits, Settings};
use anyhow::{Context, Result, bail};
use kmz_track_lib::utils::format_distance;
use kmz_track_lib::{Config, InputFile, OutputBlob, Session, TrackSummary};
use std::path::{Path, PathBuf};

pub fn run(settings: &Settings) -> Result<()> {
    let reporter = ConsoleReporter::default();
    let config = settings.config();

    match &settings.command {
        Command::Reverse {
            files, output_dir, ..
        } => {
            let session = load_session(files, config, false, &reporter)?;
            let outputs = session.reverse(&reporter)?;
            if outputs.is_empty() && reporter.error_count() > 0 {
                bail!("None of the {} files could be reversed", files.len());
            }
            write_outputs(output_dir, &outputs)
        }
        Command::Merge {
            files,
            output_dir,
            advanced,
            edits,
            ..
        } => {
            if !advanced && !edits.is_empty() {
                bail!("--delete and --move only apply with --advanced");
            }
            let mut session = load_session(files, config, *advanced, &reporter)?;
            apply_edits(&mut session, edits, &reporter)?;
            let output = session.merge(&reporter)?;
            write_outputs(output_dir, std::slice::from_ref(&output))
        }
        Command::Tracks { files, json, edits } => {
            let mut session = load_session(files, config, true, &reporter)?;
            apply_edits(&mut session, edits, &reporter)?;
            print_tracks(&session.summaries(), *json)
        }
    }
}

fn load_session(
    paths: &[PathBuf],
    config: Config,
    advanced: bool,
    reporter: &ConsoleReporter,
) -> Result<Session> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("Invalid file name {:?}", path))?;
        let bytes = std::fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;
        files.push(InputFile::new(name, bytes));
    }

    let extension = config.container_extension.clone();
    let mut session = Session::new(config);
    session.set_advanced_mode(advanced, reporter);
    if session.add_files(files, reporter) == 0 {
        bail!("No .{} files to process", extension);
    }
    Ok(session)
}

fn apply_edits(
    session: &mut Session,
    edits: &SelectionEdits,
    reporter: &ConsoleReporter,
) -> Result<()> {
    for id in &edits.deletes {
        let outcome = session
            .delete_track(id, reporter)
            .with_context(|| format!("Cannot delete track {id}"))?;
        tracing::info!("Deleted track {} ({})", outcome.track.id, outcome.track.name);
    }
    for track_move in &edits.moves {
        session
            .move_track(&track_move.id, track_move.position)
            .with_context(|| format!("Cannot move track {}", track_move.id))?;
    }
    Ok(())
}

fn write_outputs(output_dir: &Path, outputs: &[OutputBlob]) -> Result<()> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {:?}", output_dir))?;
    for output in outputs {
        let path = output_dir.join(&output.name);
        std::fs::write(&path, &output.bytes)
            .with_context(|| format!("Failed to write {:?}", path))?;
        println!("{}", path.display());
    }
    Ok(())
}

fn print_tracks(summaries: &[TrackSummary], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summaries)?);
        return Ok(());
    }

    println!("{:<8} {:<32} {:<24} {:>8} {:>10}", "ID", "NAME", "FILE", "POINTS", "LENGTH");
    for summary in summaries {
        println!(
            "{:<8} {:<32} {:<24} {:>8} {:>10}",
            summary.id,
            summary.name,
            summary.file_name,
            summary.points,
            format_distance(summary.length_meters)
        );
    }
    Ok(())
}
