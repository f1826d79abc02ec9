use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use tracing::{debug, error, info, Level};

use toplabel_core::backend::{OrtEngine, SessionConfig};
use toplabel_core::classifier::{Classifier, InferenceDiagnostics};
use toplabel_core::config::{load_config, ClassifierConfig};
use toplabel_core::image_source::decode_image;
use toplabel_core::labels::load_labels;
use toplabel_core::logging::{self, LoggingInitOptions, DEFAULT_LOG_FILTER};
use toplabel_core::selector::LabeledScore;

#[derive(Parser, Debug)]
#[command(
    name = "toplabel",
    about = "Classify an image with an ONNX model and print the top label as JSON"
)]
struct Cli {
    #[arg(long, value_name = "PATH", help = "Path to the ONNX model file")]
    model: Option<PathBuf>,

    #[arg(long, value_name = "PATH", help = "Path to the label file (one label per line)")]
    label: Option<PathBuf>,

    #[arg(long, value_name = "PATH", help = "Path to the image to classify (PNG or JPEG)")]
    image: Option<PathBuf>,

    #[arg(
        long,
        value_name = "PATH",
        help = "TOML config file (defaults to $TOPLABEL_CONFIG)"
    )]
    config: Option<PathBuf>,

    #[arg(long, value_name = "N", help = "Inference engine intra-op threads")]
    threads: Option<usize>,

    #[arg(long, value_name = "SCORE", help = "Discard scores below this value")]
    min_confidence: Option<f64>,

    #[arg(long, value_name = "N", help = "Maximum results to print (0 prints all)")]
    top_k: Option<usize>,

    #[arg(
        long,
        value_name = "MODE",
        help = "uint8 input encoding: literal or quantized"
    )]
    byte_encoding: Option<String>,

    #[arg(
        long,
        value_name = "FILTER",
        help = "Resize filter: bicubic, bilinear, nearest or lanczos3"
    )]
    resize_filter: Option<String>,

    #[arg(
        short = 'v',
        long = "verbose",
        action = ArgAction::Count,
        help = "Increase log verbosity (-v: debug, -vv: trace)"
    )]
    verbose: u8,

    #[arg(
        long = "log-filter",
        value_name = "FILTER",
        help = "Explicit tracing filter (overrides RUST_LOG and -v)"
    )]
    log_filter: Option<String>,
}

pub fn run_from_env() -> Result<()> {
    let started = Instant::now();
    let cli = Cli::parse();

    toplabel_core::runtime::setup_runtime_libs();
    init_logging(cli.verbose, cli.log_filter.as_deref());
    toplabel_core::runtime::log_runtime_lib_status();

    let config = resolve_config(&cli)?;
    let results = classify(&config)?;

    let mut stdout = io::stdout().lock();
    for result in &results {
        writeln!(stdout, "{}", result.to_json_line()).context("failed to write result")?;
    }

    info!(elapsed_ms = started.elapsed().as_millis() as u64, "main took");
    Ok(())
}

/// Report a fatal error, falling back to stderr when the active filter
/// drops the error level.
pub fn report_fatal(err: &anyhow::Error) {
    if error_level_enabled() {
        error!("{err:#}");
    } else {
        eprintln!("toplabel: {err:#}");
    }
}

fn error_level_enabled() -> bool {
    tracing::enabled!(Level::ERROR)
}

fn init_logging(verbose: u8, cli_log_filter: Option<&str>) {
    let options = LoggingInitOptions {
        verbose,
        cli_log_filter: cli_log_filter.map(ToString::to_string),
        rust_log_env: std::env::var("RUST_LOG").ok(),
        ..Default::default()
    };
    let filter = logging::select_log_filter(&options);

    let env_filter = tracing_subscriber::EnvFilter::try_new(&filter).unwrap_or_else(|error| {
        eprintln!(
            "Invalid log filter '{filter}': {error}. Falling back to '{DEFAULT_LOG_FILTER}'."
        );
        tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER)
    });

    let subscriber = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(env_filter)
        .finish();

    if let Err(error) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!(
            "Failed to initialize tracing subscriber: {error}. Continuing without structured tracing."
        );
    }
}

/// Merge the config file with command-line overrides. Flags win.
fn resolve_config(cli: &Cli) -> Result<ClassifierConfig> {
    if let Some(path) = &cli.config {
        debug!(config_path = %path.display(), "Loading config file");
    }
    let mut config = load_config(cli.config.as_deref())?;

    if let Some(model) = &cli.model {
        config.paths.model = model.clone();
    }
    if let Some(label) = &cli.label {
        config.paths.label = label.clone();
    }
    if let Some(image) = &cli.image {
        config.paths.image = image.clone();
    }
    if let Some(threads) = cli.threads {
        config.engine.num_threads = threads;
    }
    if let Some(min_confidence) = cli.min_confidence {
        config.selection.min_confidence = min_confidence;
    }
    if let Some(top_k) = cli.top_k {
        config.selection.top_k = top_k;
    }
    if let Some(byte_encoding) = &cli.byte_encoding {
        config.preprocess.byte_encoding = byte_encoding.clone();
    }
    if let Some(resize_filter) = &cli.resize_filter {
        config.preprocess.resize_filter = resize_filter.clone();
    }

    Ok(config)
}

fn classify(config: &ClassifierConfig) -> Result<Vec<LabeledScore>> {
    let image = decode_image(&config.paths.image)?;
    debug!(
        image = %config.paths.image.display(),
        width = image.width(),
        height = image.height(),
        "Image decoded"
    );

    let labels = load_labels(&config.paths.label)?;
    debug!(count = labels.len(), "Labels loaded");

    let engine = OrtEngine::from_config(&SessionConfig {
        model_path: &config.paths.model,
        num_threads: config.engine.num_threads,
    })
    .context("cannot create inference engine")?;

    let options = config.classifier_options();
    debug!(
        resize_filter = %options.encoder.filter,
        byte_encoding = %options.encoder.byte_encoding,
        min_confidence = options.policy.min_confidence,
        top_k = options.policy.top_k,
        "Classifier options"
    );

    let mut classifier = Classifier::new(engine, options);
    let classification = classifier.classify(&image, &labels)?;
    log_diagnostics(&classification.diagnostics);

    Ok(classification.results)
}

fn log_diagnostics(diagnostics: &InferenceDiagnostics) {
    info!(
        width = diagnostics.input_width,
        height = diagnostics.input_height,
        channels = diagnostics.input_channels,
        input_type = %diagnostics.input_type,
        scale = diagnostics.quant_scale,
        zero_point = diagnostics.quant_zero_point,
        "Input tensor"
    );
    info!(
        input_tensor_count = diagnostics.input_tensor_count,
        output_tensor_count = diagnostics.output_tensor_count,
        class_count = diagnostics.class_count,
        "Tensor counts"
    );
    if let Some((min, max)) = diagnostics.score_range {
        debug!(min, max, "Output score range");
    }
    info!(
        encode_ms = diagnostics.encode_elapsed.as_secs_f64() * 1000.0,
        invoke_ms = diagnostics.invoke_elapsed.as_secs_f64() * 1000.0,
        "Inference timing"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["toplabel"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).expect("arguments should parse")
    }

    fn blank_config() -> (tempfile::TempDir, String) {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("toplabel.toml");
        fs::write(&path, "").expect("write config");
        let path = path.to_str().expect("utf-8 temp path").to_string();
        (dir, path)
    }

    #[test]
    fn defaults_without_flags_or_config() {
        let (_dir, path) = blank_config();
        let cli = parse(&["--config", path.as_str()]);
        let config = resolve_config(&cli).expect("resolve config");
        assert_eq!(config, ClassifierConfig::default());
    }

    #[test]
    fn missing_explicit_config_is_fatal() {
        let cli = parse(&["--config", "/nonexistent/toplabel.toml"]);
        let err = resolve_config(&cli).err().expect("should fail");
        assert!(err.to_string().contains("config file not found"));
    }

    #[test]
    fn flags_override_defaults() {
        let (_dir, path) = blank_config();
        let cli = parse(&[
            "--config",
            path.as_str(),
            "--model",
            "m.onnx",
            "--label",
            "l.txt",
            "--image",
            "i.jpg",
            "--threads",
            "2",
            "--min-confidence",
            "0.5",
            "--top-k",
            "3",
            "--byte-encoding",
            "quantized",
            "--resize-filter",
            "nearest",
        ]);
        let config = resolve_config(&cli).expect("resolve config");

        assert_eq!(config.paths.model, PathBuf::from("m.onnx"));
        assert_eq!(config.paths.label, PathBuf::from("l.txt"));
        assert_eq!(config.paths.image, PathBuf::from("i.jpg"));
        assert_eq!(config.engine.num_threads, 2);
        assert_eq!(config.selection.min_confidence, 0.5);
        assert_eq!(config.selection.top_k, 3);
        assert_eq!(config.preprocess.byte_encoding, "quantized");
        assert_eq!(config.preprocess.resize_filter, "nearest");
    }

    #[test]
    fn flags_override_config_file() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("toplabel.toml");
        fs::write(
            &path,
            "[paths]\nmodel = \"from_file.onnx\"\n\n[selection]\ntop_k = 5\nmin_confidence = 0.1\n",
        )
        .expect("write config");

        let cli = parse(&[
            "--config",
            path.to_str().expect("utf-8 temp path"),
            "--top-k",
            "2",
        ]);
        let config = resolve_config(&cli).expect("resolve config");

        assert_eq!(config.paths.model, PathBuf::from("from_file.onnx"));
        assert_eq!(config.selection.top_k, 2);
        assert_eq!(config.selection.min_confidence, 0.1);
    }

    #[test]
    fn malformed_config_is_fatal() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("toplabel.toml");
        fs::write(&path, "top_k = [").expect("write config");

        let cli = parse(&["--config", path.to_str().expect("utf-8 temp path")]);
        assert!(resolve_config(&cli).is_err());
    }

    #[test]
    fn error_level_follows_active_filter() {
        let silenced = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new("off"))
            .with_writer(std::io::sink)
            .finish();
        tracing::subscriber::with_default(silenced, || {
            assert!(!error_level_enabled());
        });

        let default = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER))
            .with_writer(std::io::sink)
            .finish();
        tracing::subscriber::with_default(default, || {
            assert!(error_level_enabled());
        });
    }

    #[test]
    fn verbose_flag_counts() {
        let cli = parse(&["-vv"]);
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn classify_missing_image_fails_before_model_load() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let mut config = ClassifierConfig::default();
        config.paths.image = dir.path().join("missing.png");
        config.paths.model = dir.path().join("missing.onnx");

        let err = classify(&config).err().expect("should fail");
        assert!(format!("{err:#}").contains("failed to open image file"));
    }
}
