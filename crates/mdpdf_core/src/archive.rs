//! crates/mdpdf_core/src/archive.rs
//!
//! ZIP import and export.
//!
//! Import never writes to disk: it validates every member name, keeps exactly
//! one document and the allow-listed images, and hands the result back to the
//! caller. Export is equally pure and only packs in-memory bytes.

use std::collections::BTreeMap;
use std::io::{self, Cursor, Read, Write};

use tracing::debug;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::domain::{ImportedArchive, DOCUMENT_FILENAME, IMAGES_SUBDIR};
use crate::error::{StorageError, StorageResult};
use crate::images::{is_allowed_image, is_document_name};
use crate::security::{is_safe_basename, read_limited};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Bytes left undefined by windows-1252; their presence means "not cp1252".
const CP1252_UNDEFINED: &[u8] = &[0x81, 0x8D, 0x8F, 0x90, 0x9D];

//=========================================================================================
// Import
//=========================================================================================

/// Unpacks an untrusted archive into a document and its images.
///
/// `max_uncompressed` caps the total decompressed size of the members that
/// are actually read, so a small archive cannot inflate without bound.
pub fn import_archive(bytes: &[u8], max_uncompressed: u64) -> StorageResult<ImportedArchive> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| StorageError::InvalidArchive(e.to_string()))?;

    let mut budget = max_uncompressed;
    let mut document: Option<Vec<u8>> = None;
    let mut document_count = 0usize;
    let mut images = BTreeMap::new();

    for index in 0..archive.len() {
        let mut member = archive
            .by_index(index)
            .map_err(|e| StorageError::InvalidArchive(e.to_string()))?;
        if member.is_dir() {
            continue;
        }

        let name = member.name().to_string();
        if is_unsafe_member_name(&name) {
            return Err(StorageError::UnsafeMember);
        }
        let basename = name.rsplit(['/', '\\']).next().unwrap_or("");

        if is_document_name(basename) {
            // Counted here, judged after every member has been screened.
            document_count += 1;
            if document.is_none() {
                document = Some(read_member(&mut member, &mut budget, max_uncompressed)?);
            }
        } else if is_allowed_image(basename) {
            if !is_safe_basename(basename) {
                return Err(StorageError::UnsafeMember);
            }
            if images.contains_key(basename) {
                return Err(StorageError::DuplicateMember(basename.to_string()));
            }
            let data = read_member(&mut member, &mut budget, max_uncompressed)?;
            images.insert(basename.to_string(), data);
        } else {
            debug!(member = %basename, "Ignoring archive member with unsupported type.");
        }
    }

    let document = match (document, document_count) {
        (Some(document), 1) => document,
        _ => {
            return Err(StorageError::MalformedArchive(
                "ZIP must contain exactly one markdown file".to_string(),
            ))
        }
    };

    Ok(ImportedArchive {
        document: decode_document_text(&document),
        images,
    })
}

/// Zip Slip screen, applied to both `/` and `\` separated names.
fn is_unsafe_member_name(name: &str) -> bool {
    name.trim().is_empty()
        || name.starts_with(['/', '\\'])
        || name.contains([':', '\0'])
        || name.split(['/', '\\']).any(|part| part == "..")
}

fn read_member<R: Read>(member: R, budget: &mut u64, ceiling: u64) -> StorageResult<Vec<u8>> {
    match read_limited(member, *budget) {
        Ok(data) => {
            *budget -= data.len() as u64;
            Ok(Vec::from(data))
        }
        Err(StorageError::TooLarge { .. }) => Err(StorageError::TooLarge { limit: ceiling }),
        // Decompression and CRC failures surface as io errors.
        Err(StorageError::Io(e)) => Err(StorageError::InvalidArchive(e.to_string())),
        Err(other) => Err(other),
    }
}

//=========================================================================================
// Document text decoding
//=========================================================================================

type Decoder = fn(&[u8]) -> Option<String>;

const DECODERS: &[Decoder] = &[
    decode_utf8_strict,
    decode_utf8_with_bom,
    decode_windows_1252,
    decode_latin1,
];

/// Decodes document bytes, trying each encoding in order.
///
/// If every decoder refuses, invalid sequences are replaced rather than
/// rejecting the whole archive.
pub fn decode_document_text(raw: &[u8]) -> String {
    DECODERS
        .iter()
        .find_map(|decode| decode(raw))
        .unwrap_or_else(|| String::from_utf8_lossy(raw).into_owned())
}

fn decode_utf8_strict(raw: &[u8]) -> Option<String> {
    if raw.starts_with(UTF8_BOM) {
        return None;
    }
    std::str::from_utf8(raw).ok().map(str::to_string)
}

fn decode_utf8_with_bom(raw: &[u8]) -> Option<String> {
    let body = raw.strip_prefix(UTF8_BOM)?;
    std::str::from_utf8(body).ok().map(str::to_string)
}

fn decode_windows_1252(raw: &[u8]) -> Option<String> {
    if raw.iter().any(|b| CP1252_UNDEFINED.contains(b)) {
        return None;
    }
    encoding_rs::WINDOWS_1252
        .decode_without_bom_handling_and_without_replacement(raw)
        .map(|text| text.into_owned())
}

fn decode_latin1(raw: &[u8]) -> Option<String> {
    Some(raw.iter().map(|&b| char::from(b)).collect())
}

//=========================================================================================
// Export
//=========================================================================================

/// Packs `document.md` plus `images/<basename>` entries into a ZIP.
///
/// Images whose name is unsafe or outside the allow-list are skipped.
pub fn export_archive(document: &str, images: &BTreeMap<String, Vec<u8>>) -> StorageResult<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    writer.start_file(DOCUMENT_FILENAME, options).map_err(zip_io)?;
    writer.write_all(document.as_bytes())?;

    for (basename, data) in images {
        if !is_safe_basename(basename) || !is_allowed_image(basename) {
            debug!(image = %basename, "Skipping image outside the allow-list on export.");
            continue;
        }
        writer
            .start_file(format!("{IMAGES_SUBDIR}/{basename}"), options)
            .map_err(zip_io)?;
        writer.write_all(data)?;
    }

    let cursor = writer.finish().map_err(zip_io)?;
    Ok(cursor.into_inner())
}

fn zip_io(err: zip::result::ZipError) -> StorageError {
    StorageError::Io(io::Error::new(io::ErrorKind::Other, err))
}
