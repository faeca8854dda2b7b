//! Zip packing and unpacking of artifact directory trees.
//!
//! Pipeline artifacts are plain zip files: a central directory plus one
//! deflate-compressed payload per entry. [`extract_archive`] reproduces the
//! full entry tree under a target directory, and [`create_archive`] packs a
//! directory's contents (not the directory itself) with relative,
//! `/`-separated entry names.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use sitegen_shared::{Result, SitegenError};

/// Permissions recorded for entries when the platform has none to offer.
const DEFAULT_FILE_MODE: u32 = 0o644;
const DEFAULT_DIR_MODE: u32 = 0o755;

/// Counts from packing a directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PackSummary {
    pub files: usize,
    pub directories: usize,
}

// ---------------------------------------------------------------------------
// Unpack
// ---------------------------------------------------------------------------

/// Extract every entry of the zip at `archive` into `dest`.
///
/// Nested directories are created as needed and relative paths preserved.
/// Returns the number of entries in the archive.
#[instrument(skip_all, fields(archive = %archive.display(), dest = %dest.display()))]
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<usize> {
    let file = File::open(archive).map_err(|e| SitegenError::io(archive, e))?;

    let mut zip = ZipArchive::new(BufReader::new(file))
        .map_err(|e| SitegenError::archive(format!("{}: {e}", archive.display())))?;
    let entries = zip.len();

    zip.extract(dest).map_err(|e| {
        SitegenError::archive(format!(
            "failed to extract {} into {}: {e}",
            archive.display(),
            dest.display()
        ))
    })?;

    info!(entries, "archive extracted");
    Ok(entries)
}

// ---------------------------------------------------------------------------
// Pack
// ---------------------------------------------------------------------------

/// Zip the full contents of `src_dir` into a new file at `archive`.
///
/// Hidden entries and empty directories are included; symlinks are followed.
#[instrument(skip_all, fields(src = %src_dir.display(), archive = %archive.display()))]
pub fn create_archive(src_dir: &Path, archive: &Path) -> Result<PackSummary> {
    let file = File::create(archive).map_err(|e| SitegenError::io(archive, e))?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let mut summary = PackSummary::default();

    let walker = WalkDir::new(src_dir)
        .min_depth(1)
        .follow_links(true)
        .sort_by_file_name();

    for entry in walker {
        let entry = entry.map_err(|e| walk_error(src_dir, e))?;
        let path = entry.path();
        let name = entry_name(src_dir, path)?;
        let metadata = entry.metadata().map_err(|e| walk_error(src_dir, e))?;

        if metadata.is_dir() {
            let options = entry_options(unix_mode(&metadata).unwrap_or(DEFAULT_DIR_MODE));
            zip.add_directory(name.clone(), options)
                .map_err(|e| SitegenError::archive(format!("{name}: {e}")))?;
            summary.directories += 1;
        } else {
            let options = entry_options(unix_mode(&metadata).unwrap_or(DEFAULT_FILE_MODE));
            zip.start_file(name.clone(), options)
                .map_err(|e| SitegenError::archive(format!("{name}: {e}")))?;
            let mut input = File::open(path).map_err(|e| SitegenError::io(path, e))?;
            std::io::copy(&mut input, &mut zip).map_err(|e| SitegenError::io(path, e))?;
            summary.files += 1;
        }
        debug!(entry = %name, "added to archive");
    }

    zip.finish()
        .map_err(|e| SitegenError::archive(format!("{}: {e}", archive.display())))?;

    info!(
        files = summary.files,
        directories = summary.directories,
        "archive created"
    );
    Ok(summary)
}

fn entry_options(mode: u32) -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(mode)
}

/// Relative `/`-separated entry name for `path` under `root`.
fn entry_name(root: &Path, path: &Path) -> Result<String> {
    let rel = path.strip_prefix(root).map_err(|_| {
        SitegenError::archive(format!(
            "{} is outside {}",
            path.display(),
            root.display()
        ))
    })?;
    Ok(rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/"))
}

fn walk_error(root: &Path, err: walkdir::Error) -> SitegenError {
    let path: PathBuf = err.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
    match err.into_io_error() {
        Some(io) => SitegenError::io(path, io),
        None => SitegenError::archive(format!("filesystem loop at {}", path.display())),
    }
}

#[cfg(unix)]
fn unix_mode(metadata: &std::fs::Metadata) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    Some(metadata.permissions().mode())
}

#[cfg(not(unix))]
fn unix_mode(_metadata: &std::fs::Metadata) -> Option<u32> {
    None
}
