//! Container codec for KMZ archives
//!
//! A KMZ container is a zip archive holding one KML document plus any number of other
//! members (icons, overlays) that are ignored here. On read, the markup member is the
//! first member in archive order whose name ends with `.kml`. On write, exactly one
//! DEFLATE-compressed member is created.

use crate::markup::KmlDocument;
use crate::{KmzError, Result};
use std::io::{Cursor, Read, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Name of the markup member written into every output container
pub const DEFAULT_MARKUP_MEMBER: &str = "doc.kml";

/// Extension that identifies the markup member inside a container
pub const MARKUP_EXTENSION: &str = "kml";

/// The markup member found in a container
#[derive(Debug, Clone)]
pub struct MarkupMember {
    /// Member path inside the archive
    pub name: String,
    pub text: String,
}

/// Whether a member name carries the markup extension (case-insensitive)
pub fn is_markup_member(name: &str) -> bool {
    std::path::Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(MARKUP_EXTENSION))
}

/// Locate and read the markup member of a container
///
/// Returns `Ok(None)` when the archive is valid but holds no markup member.
pub fn read_markup(bytes: &[u8]) -> Result<Option<MarkupMember>> {
    #[cfg(feature = "profiling")]
    profiling::scope!("container::read_markup");

    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    for index in 0..archive.len() {
        let mut member = archive.by_index(index)?;
        if member.is_dir() || !is_markup_member(member.name()) {
            continue;
        }

        let name = member.name().to_string();
        let mut raw = Vec::new();
        member.read_to_end(&mut raw)?;
        let text = String::from_utf8(raw)
            .map_err(|e| KmzError::Xml(format!("{name} is not valid UTF-8: {e}")))?;
        return Ok(Some(MarkupMember { name, text }));
    }
    Ok(None)
}

/// Create a container holding `markup` as its single member
pub fn write_container(markup: &str, member_name: &str) -> Result<Vec<u8>> {
    #[cfg(feature = "profiling")]
    profiling::scope!("container::write_container");

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    writer.start_file(member_name, options)?;
    writer.write_all(markup.as_bytes())?;
    let cursor = writer.finish()?;
    Ok(cursor.into_inner())
}

/// Open a container and parse its markup member
///
/// Every failure is reported against `file_name`: a missing member as
/// [`KmzError::MissingMarkup`], a broken archive or document as
/// [`KmzError::ParseFailure`].
pub fn read_document(file_name: &str, bytes: &[u8]) -> Result<KmlDocument> {
    let member = read_markup(bytes)
        .map_err(|e| e.for_file(file_name))?
        .ok_or_else(|| KmzError::MissingMarkup {
            file: file_name.to_string(),
        })?;
    tracing::debug!("Found markup member {} in {}", member.name, file_name);
    KmlDocument::parse(&member.text).map_err(|e| e.for_file(file_name))
}

/// Serialize a document and wrap it in a new container
pub fn write_document(document: &KmlDocument, member_name: &str) -> Result<Vec<u8>> {
    let markup = document.to_xml()?;
    write_container(&markup, member_name)
}
