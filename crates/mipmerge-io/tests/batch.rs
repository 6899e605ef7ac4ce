//! Integration tests: whole batches over temporary directories.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::path::{Path, PathBuf};

use mipmerge_io::{
    AcquisitionReader, BatchConfig, CancelFlag, ConfigError, ImageError, OverwritePolicy,
    ReadError, TiffHyperstackReader, run_batch,
};
use mipmerge_pipeline::{
    BitDepth, CompositeMode, ImageStack, MultichannelImage, PipelineError, Plane,
};

/// Three 24×20 fluorescence planes with a spot, plus a phase plane, and
/// optionally a stray third channel.
fn acquisition(channels: usize) -> MultichannelImage {
    let stack = |channel: usize| {
        let planes = (0..3)
            .map(|z| {
                Plane::from_fn(24, 20, BitDepth::Sixteen, |x, y| {
                    let spot = x.abs_diff(8 + z) < 2 && y.abs_diff(10) < 2;
                    u16::try_from(if spot { 900 } else { 40 + x + y }).unwrap()
                })
            })
            .collect();
        ImageStack::new(channel, planes).unwrap()
    };
    MultichannelImage::new((0..channels).map(stack).collect()).unwrap()
}

fn write_acquisition(dir: &Path, name: &str, channels: usize) -> PathBuf {
    let path = dir.join(name);
    let bytes = mipmerge_tiff::encode_multichannel(&acquisition(channels)).unwrap();
    std::fs::write(&path, bytes).unwrap();
    path
}

struct Dirs {
    _root: tempfile::TempDir,
    source: PathBuf,
    destination: PathBuf,
}

fn dirs() -> Dirs {
    let root = tempfile::tempdir().unwrap();
    let source = root.path().join("in");
    let destination = root.path().join("out");
    std::fs::create_dir(&source).unwrap();
    std::fs::create_dir(&destination).unwrap();
    Dirs {
        _root: root,
        source,
        destination,
    }
}

/// Every file under `dir`, relative to it, sorted.
fn tree(dir: &Path) -> Vec<String> {
    fn walk(base: &Path, dir: &Path, out: &mut Vec<String>) {
        for entry in std::fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                walk(base, &path, out);
            } else {
                let relative = path.strip_prefix(base).unwrap();
                out.push(relative.to_string_lossy().replace('\\', "/"));
            }
        }
    }
    let mut out = Vec::new();
    walk(dir, dir, &mut out);
    out.sort();
    out
}

#[test]
fn corrupt_file_fails_alone() {
    let dirs = dirs();
    write_acquisition(&dirs.source, "good.tif", 2);
    std::fs::write(dirs.source.join("corrupt.tif"), b"not a tiff at all").unwrap();
    std::fs::write(dirs.source.join("readme.txt"), b"ignored").unwrap();

    let config = BatchConfig::new(&dirs.source, &dirs.destination, "2024-05-01");
    let report = run_batch(&config, &TiffHyperstackReader, &CancelFlag::new()).unwrap();

    assert_eq!(report.output_root, dirs.destination.join("2024-05-01_output"));
    assert_eq!(report.processed.len(), 1);
    assert_eq!(report.processed[0].identifier, "good");
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].source, dirs.source.join("corrupt.tif"));
    assert!(matches!(
        &report.failures[0].error,
        ImageError::FileOpen {
            source: ReadError::Decode(_),
            ..
        }
    ));
    assert!(!report.is_success());

    assert_eq!(
        tree(&report.output_root),
        vec!["BF/good.tif", "Green/good.tif", "merge/good.tif"]
    );

    let fluorescence = std::fs::read(&report.processed[0].outputs.fluorescence).unwrap();
    let reread = mipmerge_tiff::decode_hyperstack(&fluorescence).unwrap();
    let plane = reread.channels()[0].first();
    assert_eq!((plane.width(), plane.height()), (24, 20));
    assert_eq!(plane.depth(), BitDepth::Sixteen);
}

#[test]
fn three_channels_rejected_without_outputs() {
    let dirs = dirs();
    write_acquisition(&dirs.source, "three.tif", 3);

    let config = BatchConfig::new(&dirs.source, &dirs.destination, "run");
    let report = run_batch(&config, &TiffHyperstackReader, &CancelFlag::new()).unwrap();

    assert!(report.processed.is_empty());
    assert!(matches!(
        report.failures[0].error,
        ImageError::Pipeline(PipelineError::ChannelCountMismatch {
            expected: 2,
            found: 3
        })
    ));
    assert!(tree(&report.output_root).is_empty());
}

#[test]
fn skip_policy_leaves_existing_outputs() {
    let dirs = dirs();
    write_acquisition(&dirs.source, "cells.tif", 2);
    let mut config = BatchConfig::new(&dirs.source, &dirs.destination, "run");

    let first = run_batch(&config, &TiffHyperstackReader, &CancelFlag::new()).unwrap();
    assert_eq!(first.processed.len(), 1);
    let outputs = first.processed[0].outputs.clone();
    std::fs::write(&outputs.phase, b"marker").unwrap();

    config.overwrite = OverwritePolicy::Skip;
    let second = run_batch(&config, &TiffHyperstackReader, &CancelFlag::new()).unwrap();
    assert!(second.processed.is_empty());
    assert_eq!(second.skipped, vec![dirs.source.join("cells.tif")]);
    assert!(second.is_success());
    assert_eq!(std::fs::read(&outputs.phase).unwrap(), b"marker");

    config.overwrite = OverwritePolicy::Overwrite;
    let third = run_batch(&config, &TiffHyperstackReader, &CancelFlag::new()).unwrap();
    assert_eq!(third.processed.len(), 1);
    assert_ne!(std::fs::read(&outputs.phase).unwrap(), b"marker");
}

#[test]
fn skip_policy_reprocesses_incomplete_outputs() {
    let dirs = dirs();
    write_acquisition(&dirs.source, "cells.tif", 2);
    let mut config = BatchConfig::new(&dirs.source, &dirs.destination, "run");
    let first = run_batch(&config, &TiffHyperstackReader, &CancelFlag::new()).unwrap();
    std::fs::remove_file(&first.processed[0].outputs.composite).unwrap();

    config.overwrite = OverwritePolicy::Skip;
    let second = run_batch(&config, &TiffHyperstackReader, &CancelFlag::new()).unwrap();
    assert_eq!(second.processed.len(), 1);
    assert!(second.processed[0].outputs.all_exist());
}

/// Raises the cancel flag as soon as the first image is read.
struct CancellingReader {
    flag: CancelFlag,
}

impl AcquisitionReader for CancellingReader {
    fn accepts(&self, path: &Path) -> bool {
        TiffHyperstackReader.accepts(path)
    }

    fn read(&self, path: &Path) -> Result<MultichannelImage, ReadError> {
        self.flag.cancel();
        TiffHyperstackReader.read(path)
    }
}

#[test]
fn cancellation_stops_between_images() {
    let dirs = dirs();
    for name in ["a.tif", "b.tif", "c.tif"] {
        write_acquisition(&dirs.source, name, 2);
    }
    let flag = CancelFlag::new();
    let reader = CancellingReader { flag: flag.clone() };

    let config = BatchConfig::new(&dirs.source, &dirs.destination, "run");
    let report = run_batch(&config, &reader, &flag).unwrap();

    assert!(report.cancelled);
    // The image in flight when the flag went up still completes.
    assert_eq!(report.processed.len(), 1);
    assert_eq!(report.processed[0].identifier, "a");
    assert_eq!(
        tree(&report.output_root),
        vec!["BF/a.tif", "Green/a.tif", "merge/a.tif"]
    );
}

#[test]
fn cancelled_before_start_processes_nothing() {
    let dirs = dirs();
    write_acquisition(&dirs.source, "a.tif", 2);
    let flag = CancelFlag::new();
    flag.cancel();

    let config = BatchConfig::new(&dirs.source, &dirs.destination, "run");
    let report = run_batch(&config, &TiffHyperstackReader, &flag).unwrap();
    assert!(report.cancelled);
    assert!(report.processed.is_empty());
    assert!(tree(&report.output_root).is_empty());
}

#[test]
fn duplicate_identifiers_share_outputs() {
    let dirs = dirs();
    write_acquisition(&dirs.source, "cells.1.tif", 2);
    write_acquisition(&dirs.source, "cells.2.tif", 2);

    let config = BatchConfig::new(&dirs.source, &dirs.destination, "run");
    let report = run_batch(&config, &TiffHyperstackReader, &CancelFlag::new()).unwrap();

    assert_eq!(report.processed.len(), 2);
    assert!(report.processed.iter().all(|p| p.identifier == "cells"));
    assert_eq!(
        tree(&report.output_root),
        vec!["BF/cells.tif", "Green/cells.tif", "merge/cells.tif"]
    );
}

#[test]
fn later_duplicate_wins_under_skip_policy() {
    let dirs = dirs();
    write_acquisition(&dirs.source, "cells.1.tif", 2);
    write_acquisition(&dirs.source, "cells.2.tif", 2);

    let mut config = BatchConfig::new(&dirs.source, &dirs.destination, "run");
    config.overwrite = OverwritePolicy::Skip;
    let report = run_batch(&config, &TiffHyperstackReader, &CancelFlag::new()).unwrap();

    assert!(report.skipped.is_empty());
    let sources: Vec<_> = report.processed.iter().map(|p| p.source.clone()).collect();
    assert_eq!(
        sources,
        vec![dirs.source.join("cells.1.tif"), dirs.source.join("cells.2.tif")]
    );

    // A second run skips the first claimant; the later one still wins.
    let again = run_batch(&config, &TiffHyperstackReader, &CancelFlag::new()).unwrap();
    assert_eq!(again.skipped, vec![dirs.source.join("cells.1.tif")]);
    assert_eq!(again.processed.len(), 1);
    assert_eq!(again.processed[0].source, dirs.source.join("cells.2.tif"));
}

#[test]
fn rgb_composites_written() {
    let dirs = dirs();
    write_acquisition(&dirs.source, "cells.tif", 2);
    let mut config = BatchConfig::new(&dirs.source, &dirs.destination, "run");
    config.params.composite_mode = CompositeMode::Rgb;

    let report = run_batch(&config, &TiffHyperstackReader, &CancelFlag::new()).unwrap();
    assert!(report.is_success());
    let merged = std::fs::read(&report.processed[0].outputs.composite).unwrap();
    assert!(&merged[..4] == b"II*\0" || &merged[..4] == b"MM\0*");
}

#[test]
fn configuration_errors_stop_before_output() {
    let dirs = dirs();
    write_acquisition(&dirs.source, "cells.tif", 2);

    let missing = BatchConfig::new(dirs.source.join("nope"), &dirs.destination, "run");
    assert!(matches!(
        run_batch(&missing, &TiffHyperstackReader, &CancelFlag::new()),
        Err(ConfigError::MissingSource(_))
    ));

    let no_destination = BatchConfig::new(&dirs.source, dirs.destination.join("nope"), "run");
    assert!(matches!(
        run_batch(&no_destination, &TiffHyperstackReader, &CancelFlag::new()),
        Err(ConfigError::MissingDestination(_))
    ));

    let bad_label = BatchConfig::new(&dirs.source, &dirs.destination, "../escape");
    assert!(matches!(
        run_batch(&bad_label, &TiffHyperstackReader, &CancelFlag::new()),
        Err(ConfigError::InvalidLabel { .. })
    ));

    let mut bad_params = BatchConfig::new(&dirs.source, &dirs.destination, "run");
    bad_params.params.blur_accuracy = 1.5;
    assert!(matches!(
        run_batch(&bad_params, &TiffHyperstackReader, &CancelFlag::new()),
        Err(ConfigError::InvalidParams(PipelineError::InvalidConfig(_)))
    ));

    assert_eq!(std::fs::read_dir(&dirs.destination).unwrap().count(), 0);
}
