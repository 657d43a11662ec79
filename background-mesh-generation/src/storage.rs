//! Write-after-success file handling.
//!
//! Stage outputs are written to a `.partial` sibling and renamed over the
//! destination only once the write completed, so a failing stage never
//! leaves a truncated artefact behind.

use crate::error::{PipelineError, PipelineResult};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Sibling path used while an artefact is being written.
/// Keeps the extension so format detection by suffix still works.
pub fn partial_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string();
    let name = match path.extension() {
        Some(ext) => format!("{}.partial.{}", stem, ext.to_string_lossy()),
        None => format!("{}.partial", stem),
    };
    path.with_file_name(name)
}

/// Runs `save` against a temporary path, then renames it over `path`.
/// For encoders that insist on opening the file themselves.
pub fn save_atomically<F>(path: &Path, save: F) -> PipelineResult<()>
where
    F: FnOnce(&Path) -> PipelineResult<()>,
{
    let partial = partial_path(path);
    match save(&partial) {
        Ok(()) => {
            fs::rename(&partial, path)?;
            Ok(())
        }
        Err(err) => {
            let _ = fs::remove_file(&partial);
            Err(err)
        }
    }
}

/// Like [`save_atomically`] for a group of files that belong together.
/// `save` receives one partial path per destination; nothing is renamed
/// unless every file was written.
pub fn save_all_atomically<F>(paths: &[&Path], save: F) -> PipelineResult<()>
where
    F: FnOnce(&[PathBuf]) -> PipelineResult<()>,
{
    let partials: Vec<PathBuf> = paths.iter().map(|path| partial_path(path)).collect();
    if let Err(err) = save(&partials) {
        for partial in &partials {
            let _ = fs::remove_file(partial);
        }
        return Err(err);
    }
    for (partial, path) in partials.iter().zip(paths) {
        fs::rename(partial, path)?;
    }
    Ok(())
}

/// Buffered writer over `path`, flushed once `write` returns.
pub fn write_buffered<F>(path: &Path, write: F) -> PipelineResult<()>
where
    F: FnOnce(&mut BufWriter<File>) -> PipelineResult<()>,
{
    let mut writer = BufWriter::new(File::create(path)?);
    write(&mut writer)?;
    writer.flush()?;
    Ok(())
}

/// Streams content into a buffered temporary file, then renames it over `path`.
pub fn write_atomically<F>(path: &Path, write: F) -> PipelineResult<()>
where
    F: FnOnce(&mut BufWriter<File>) -> PipelineResult<()>,
{
    save_atomically(path, |partial| write_buffered(partial, write))
}

/// Fails with `MissingInputFile` when an upstream artefact is absent.
pub fn require_input(path: &Path, stage: &'static str) -> PipelineResult<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(PipelineError::MissingInputFile {
            path: path.to_path_buf(),
            stage,
        })
    }
}
