//! Atomic per-image output writes.
//!
//! All three outputs of an image are encoded in memory first, staged as
//! `.partial` files next to their destinations, then renamed into place.
//! A failure at any step removes whatever this image already put on disk,
//! so an image has either all three outputs or none of the new ones.
//!
//! Renames replace outputs one at a time. If a later rename fails, the
//! outputs already renamed are removed, and the previous files they
//! replaced are gone with them: an image being overwritten can end up
//! with none of its outputs, old or new.

use std::io;
use std::path::{Path, PathBuf};

use mipmerge_pipeline::ResultRecord;

use crate::error::{ImageError, WriteError};
use crate::layout::OutputPaths;

/// Suffix of staged files before they are renamed into place.
pub const PARTIAL_SUFFIX: &str = "partial";

/// Encode and write the three outputs of `record`.
///
/// # Errors
///
/// Returns [`ImageError::Write`] naming the output that could not be
/// encoded, staged or renamed. After a failed rename none of the three
/// outputs exist, including ones that existed before the call.
pub fn write_record(record: &ResultRecord, paths: &OutputPaths) -> Result<(), ImageError> {
    let encoded = [
        (&paths.fluorescence, mipmerge_tiff::encode_plane(&record.fluorescence)),
        (&paths.phase, mipmerge_tiff::encode_plane(&record.phase)),
        (&paths.composite, mipmerge_tiff::encode_composite(&record.composite)),
    ];

    let mut files = Vec::with_capacity(encoded.len());
    for (path, bytes) in encoded {
        let bytes = bytes.map_err(|e| write_error(path, WriteError::Encode(e)))?;
        files.push((path.as_path(), bytes));
    }

    // Stage.
    let mut staged: Vec<PathBuf> = Vec::with_capacity(files.len());
    for (path, bytes) in &files {
        let partial = partial_path(path);
        if let Err(e) = std::fs::write(&partial, bytes) {
            staged.push(partial);
            remove_all(&staged);
            return Err(write_error(path, WriteError::Io(e)));
        }
        staged.push(partial);
    }

    // Commit.
    let mut committed: Vec<&Path> = Vec::with_capacity(files.len());
    for (index, ((path, _), partial)) in files.iter().zip(&staged).enumerate() {
        if let Err(e) = std::fs::rename(partial, path) {
            remove_all(&staged[index..]);
            remove_all(&committed);
            return Err(write_error(path, WriteError::Io(e)));
        }
        committed.push(path);
    }

    log::debug!(
        "wrote {} outputs for {}",
        committed.len(),
        record.identifier
    );
    Ok(())
}

/// `<name>.tif` becomes `<name>.tif.partial`.
#[must_use]
pub fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(PARTIAL_SUFFIX);
    path.with_file_name(name)
}

fn write_error(path: &Path, source: WriteError) -> ImageError {
    ImageError::Write {
        path: path.to_path_buf(),
        source,
    }
}

/// Best-effort cleanup; files that were never created are ignored.
fn remove_all<P: AsRef<Path>>(paths: &[P]) {
    for path in paths {
        let path = path.as_ref();
        match std::fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("could not remove {}: {e}", path.display()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::layout::OutputLayout;
    use mipmerge_pipeline::composite::composite;
    use mipmerge_pipeline::{BitDepth, CompositeMode, Plane};

    fn record(identifier: &str) -> ResultRecord {
        let phase = Plane::from_fn(6, 4, BitDepth::Sixteen, |x, y| {
            u16::try_from(x * 10 + y).unwrap()
        });
        let fluorescence = Plane::from_fn(6, 4, BitDepth::Sixteen, |x, _| {
            u16::try_from(x * 100).unwrap()
        });
        let composite = composite(&phase, &fluorescence, CompositeMode::MultiChannel).unwrap();
        ResultRecord {
            identifier: identifier.to_owned(),
            fluorescence,
            phase,
            composite,
        }
    }

    fn files_in(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn partial_path_appends_suffix() {
        assert_eq!(
            partial_path(Path::new("/out/Green/cells.tif")),
            Path::new("/out/Green/cells.tif.partial")
        );
    }

    #[test]
    fn writes_all_three_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let layout = OutputLayout::new(dir.path(), "run");
        layout.create().unwrap();
        let paths = layout.paths_for("cells");

        write_record(&record("cells"), &paths).unwrap();

        assert!(paths.all_exist());
        for path in paths.all() {
            let parent = path.parent().unwrap();
            assert_eq!(files_in(parent), vec!["cells.tif".to_owned()]);
        }
        let reread =
            mipmerge_tiff::decode_hyperstack(&std::fs::read(&paths.composite).unwrap()).unwrap();
        assert_eq!(reread.channel_count(), 2);
    }

    #[test]
    fn failed_stage_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let layout = OutputLayout::new(dir.path(), "run");
        layout.create().unwrap();
        let paths = layout.paths_for("cells");
        // The composite directory vanishes, so its staging write fails.
        std::fs::remove_dir(paths.composite.parent().unwrap()).unwrap();

        let Err(ImageError::Write { path, source }) = write_record(&record("cells"), &paths)
        else {
            panic!("expected a write error");
        };
        assert_eq!(path, paths.composite);
        assert!(matches!(source, WriteError::Io(_)));

        assert!(files_in(paths.fluorescence.parent().unwrap()).is_empty());
        assert!(files_in(paths.phase.parent().unwrap()).is_empty());
    }

    #[test]
    fn failed_rename_removes_replaced_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let layout = OutputLayout::new(dir.path(), "run");
        layout.create().unwrap();
        let paths = layout.paths_for("cells");
        std::fs::write(&paths.fluorescence, b"old").unwrap();
        std::fs::write(&paths.phase, b"old").unwrap();
        // A non-empty directory where the composite goes makes its rename fail.
        std::fs::create_dir(&paths.composite).unwrap();
        std::fs::write(paths.composite.join("keep"), b"").unwrap();

        let Err(ImageError::Write { path, .. }) = write_record(&record("cells"), &paths) else {
            panic!("expected a write error");
        };
        assert_eq!(path, paths.composite);

        assert!(files_in(paths.fluorescence.parent().unwrap()).is_empty());
        assert!(files_in(paths.phase.parent().unwrap()).is_empty());
        assert_eq!(
            files_in(paths.composite.parent().unwrap()),
            vec!["cells.tif".to_owned()]
        );
    }

    #[test]
    fn overwrites_previous_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let layout = OutputLayout::new(dir.path(), "run");
        layout.create().unwrap();
        let paths = layout.paths_for("cells");
        std::fs::write(&paths.phase, b"stale").unwrap();

        write_record(&record("cells"), &paths).unwrap();

        let phase = std::fs::read(&paths.phase).unwrap();
        assert_ne!(phase, b"stale");
        assert!(mipmerge_tiff::decode_hyperstack(&phase).is_ok());
    }
}
