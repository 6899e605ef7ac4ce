//! mipmerge: batch-convert two-channel z-stacks into composites.
//!
//! Reads every `.tif`/`.tiff` acquisition in a source directory and writes,
//! per acquisition, the processed fluorescence projection, the phase
//! projection and their composite under `<DESTINATION>/<LABEL>_output/`.
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin mipmerge -- [OPTIONS] --label <LABEL> <SOURCE> <DESTINATION>
//! ```
//!
//! Logging goes to stderr at `info` by default; set `RUST_LOG` to change it.
//! Ctrl-C stops the batch once the image in progress has been written.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use mipmerge_io::{BatchConfig, CancelFlag, OverwritePolicy, TiffHyperstackReader};
use mipmerge_pipeline::{BackgroundParams, CompositeMode, ProcessingParams};

/// Batch-convert two-channel microscope z-stacks.
///
/// Channel 1 (fluorescence) is background-subtracted, max-projected,
/// smoothed and contrast-enhanced; channel 2 (phase) is max-projected.
/// Phase goes to cyan and fluorescence to magenta in the composite.
#[derive(Parser)]
#[command(name = "mipmerge", version)]
struct Cli {
    /// Directory containing the acquisitions.
    source: PathBuf,

    /// Existing directory that receives `<LABEL>_output`.
    destination: PathBuf,

    /// Run label naming the output directory, typically the acquisition date.
    #[arg(long)]
    label: String,

    /// Rolling-ball radius in pixels.
    #[arg(long, default_value_t = BackgroundParams::DEFAULT_RADIUS)]
    radius: f64,

    /// Gaussian blur sigma in pixels.
    #[arg(long, default_value_t = ProcessingParams::DEFAULT_BLUR_SIGMA)]
    sigma: f64,

    /// Gaussian kernel accuracy, in (0, 1).
    #[arg(long, default_value_t = ProcessingParams::DEFAULT_BLUR_ACCURACY)]
    accuracy: f64,

    /// Percentage of pixels saturated by contrast enhancement.
    #[arg(long, default_value_t = ProcessingParams::DEFAULT_SATURATED_PERCENT)]
    saturated: f64,

    /// Use a sliding paraboloid instead of a rolling ball.
    #[arg(long)]
    paraboloid: bool,

    /// Objects are darker than the background.
    #[arg(long)]
    light_background: bool,

    /// Smooth with a 3x3 mean before estimating the background.
    #[arg(long)]
    presmooth: bool,

    /// Correct corner estimates (paraboloid only).
    #[arg(long)]
    correct_corners: bool,

    /// Write the estimated background instead of the subtracted image.
    #[arg(long)]
    create_background: bool,

    /// Flatten the composite to 8-bit RGB instead of keeping channels.
    #[arg(long)]
    rgb: bool,

    /// Leave images alone whose three outputs already exist.
    #[arg(long)]
    skip_existing: bool,

    /// Full processing parameters as a JSON string.
    ///
    /// When provided, all other processing parameter flags are ignored.
    /// The JSON must be a valid `ProcessingParams` serialization; missing
    /// fields take their defaults.
    #[arg(long)]
    config_json: Option<String>,

    /// Print the batch report as JSON instead of a human-readable summary.
    #[arg(long)]
    json: bool,
}

/// Build [`ProcessingParams`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and the
/// individual parameter flags are ignored.
fn params_from_cli(cli: &Cli) -> Result<ProcessingParams, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    Ok(ProcessingParams {
        background: BackgroundParams {
            radius: cli.radius,
            create_background: cli.create_background,
            light_background: cli.light_background,
            use_paraboloid: cli.paraboloid,
            presmooth: cli.presmooth,
            correct_corners: cli.correct_corners,
        },
        blur_sigma: cli.sigma,
        blur_accuracy: cli.accuracy,
        saturated_percent: cli.saturated,
        composite_mode: if cli.rgb {
            CompositeMode::Rgb
        } else {
            CompositeMode::MultiChannel
        },
    })
}

fn config_from_cli(cli: &Cli) -> Result<BatchConfig, String> {
    let mut config = BatchConfig::new(&cli.source, &cli.destination, cli.label.clone());
    config.params = params_from_cli(cli)?;
    if cli.skip_existing {
        config.overwrite = OverwritePolicy::Skip;
    }
    Ok(config)
}

/// Handler that cancels the batch before its next image.
fn interrupt_handler(cancel: CancelFlag) -> impl FnMut() + Send + 'static {
    move || {
        log::warn!("interrupt received, stopping after the current image");
        cancel.cancel();
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };
    log::debug!("config: {config:?}");

    let cancel = CancelFlag::new();
    if let Err(e) = ctrlc::set_handler(interrupt_handler(cancel.clone())) {
        log::warn!("could not install interrupt handler: {e}");
    }

    let report = match mipmerge_io::run_batch(&config, &TiffHyperstackReader, &cancel) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    if cli.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Error serializing report: {e}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        println!("{}: {}", report.output_root.display(), report.summary());
        for failure in &report.failures {
            eprintln!("  {}: {}", failure.source.display(), failure.error);
        }
    }

    if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["mipmerge", "/in", "/out", "--label", "2024-05-01"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn defaults_match_processing_params() {
        let config = config_from_cli(&parse(&[])).unwrap();
        assert_eq!(config.params, ProcessingParams::default());
        assert_eq!(config.overwrite, OverwritePolicy::Overwrite);
        assert_eq!(config.run_label, "2024-05-01");
        assert_eq!(config.source_dir, PathBuf::from("/in"));
    }

    #[test]
    fn flags_set_params() {
        let config = config_from_cli(&parse(&[
            "--radius",
            "50",
            "--sigma",
            "1.5",
            "--paraboloid",
            "--light-background",
            "--rgb",
            "--skip-existing",
        ]))
        .unwrap();
        assert!((config.params.background.radius - 50.0).abs() < f64::EPSILON);
        assert!((config.params.blur_sigma - 1.5).abs() < f64::EPSILON);
        assert!(config.params.background.use_paraboloid);
        assert!(config.params.background.light_background);
        assert!(!config.params.background.presmooth);
        assert_eq!(config.params.composite_mode, CompositeMode::Rgb);
        assert_eq!(config.overwrite, OverwritePolicy::Skip);
    }

    #[test]
    fn config_json_overrides_flags() {
        let params = params_from_cli(&parse(&[
            "--radius",
            "50",
            "--config-json",
            r#"{"blur_sigma": 2.0}"#,
        ]))
        .unwrap();
        assert!((params.blur_sigma - 2.0).abs() < f64::EPSILON);
        assert!((params.background.radius - BackgroundParams::DEFAULT_RADIUS).abs() < f64::EPSILON);
    }

    #[test]
    fn bad_config_json_is_reported() {
        let err = params_from_cli(&parse(&["--config-json", "{"])).unwrap_err();
        assert!(err.starts_with("Error parsing --config-json"));
    }

    #[test]
    fn interrupt_cancels_shared_flag() {
        let cancel = CancelFlag::new();
        let mut handler = interrupt_handler(cancel.clone());
        assert!(!cancel.is_cancelled());
        handler();
        assert!(cancel.is_cancelled());
    }

    #[test]
    fn label_is_required() {
        assert!(Cli::try_parse_from(["mipmerge", "/in", "/out"]).is_err());
    }
}
