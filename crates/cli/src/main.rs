//! GeoContext CLI - environmental context reports for an area of interest

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use geocontext_core::AreaOfInterest;
use geocontext_pipeline::{
    ContextAggregator, ContextConfig, ExecutionMode, ProgressEvent, ProgressStream,
};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "geocontext")]
#[command(
    author,
    version,
    about = "Elevation, temperature, NDVI and land cover for a polygon",
    long_about = None
)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (TOML)
    #[arg(short, long, global = true, env = "GEOCONTEXT_CONFIG")]
    config: Option<PathBuf>,

    /// STAC catalog: pc, es, or an API URL
    #[arg(long, global = true, env = "GEOCONTEXT_CATALOG")]
    catalog: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute the context summary and print it as JSON
    Generate {
        /// GeoJSON Feature or Polygon file, or - for stdin
        input: String,
        /// Also write the summary to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Run the four sources one after the other
        #[arg(long)]
        sequential: bool,
    },
    /// Print progress events and the summary as JSON lines
    Stream {
        /// GeoJSON Feature or Polygon file, or - for stdin
        input: String,
    },
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn load_config(path: Option<&Path>, catalog: Option<&str>) -> Result<ContextConfig> {
    let mut config = match path {
        Some(path) => ContextConfig::from_file(path)?,
        None => ContextConfig::default(),
    };
    if let Some(catalog) = catalog {
        config.catalog.url = catalog.to_string();
    }
    Ok(config)
}

fn build_aggregator(config: &ContextConfig) -> Result<ContextAggregator> {
    ContextAggregator::from_config(config).context("Failed to set up data access")
}

fn read_input(input: &str) -> Result<String> {
    if input == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read GeoJSON from stdin")?;
        return Ok(buf);
    }
    std::fs::read_to_string(input).with_context(|| format!("Failed to read {input}"))
}

fn parse_aoi(text: &str) -> Result<AreaOfInterest> {
    let value: serde_json::Value = serde_json::from_str(text).context("Input is not valid JSON")?;
    AreaOfInterest::from_geojson(&value).context("Invalid area of interest")
}

fn write_summary(event: &ProgressEvent, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(event)?;
    std::fs::write(path, json + "\n").with_context(|| format!("Failed to write {}", path.display()))
}

// ─── Commands ───────────────────────────────────────────────────────────

async fn generate(
    aggregator: Arc<ContextAggregator>,
    aoi: AreaOfInterest,
    capacity: usize,
    output: Option<PathBuf>,
) -> Result<()> {
    let start = Instant::now();
    let pb = spinner("Starting...");
    let mut stream = ProgressStream::start(aggregator, aoi, capacity);

    let mut last = None;
    while let Some(event) = stream.next().await {
        match event {
            ProgressEvent::Status(stage) => pb.set_message(stage.label()),
            other => last = Some(other),
        }
    }
    pb.finish_and_clear();

    let event = match last {
        Some(event @ ProgressEvent::Summary(_)) => event,
        Some(ProgressEvent::Failed(message)) => bail!("Request rejected: {message}"),
        _ => bail!("Context generation stopped before producing a summary"),
    };

    println!("{}", serde_json::to_string_pretty(&event)?);
    if let Some(path) = output {
        write_summary(&event, &path)?;
        info!("Summary saved to: {}", path.display());
    }
    info!("Processing time: {:.2?}", start.elapsed());
    Ok(())
}

async fn stream(
    aggregator: Arc<ContextAggregator>,
    aoi: AreaOfInterest,
    capacity: usize,
) -> Result<()> {
    let mut stream = ProgressStream::start(aggregator, aoi, capacity);
    let stdout = std::io::stdout();
    let mut failed = None;

    while let Some(event) = stream.next().await {
        let line = serde_json::to_string(&event)?;
        let mut out = stdout.lock();
        writeln!(out, "{line}")?;
        out.flush()?;
        if let ProgressEvent::Failed(message) = event {
            failed = Some(message);
        }
    }

    match failed {
        Some(message) => bail!("Request rejected: {message}"),
        None => Ok(()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let mut config = load_config(cli.config.as_deref(), cli.catalog.as_deref())?;

    match cli.command {
        Commands::Generate {
            input,
            output,
            sequential,
        } => {
            if sequential {
                config.execution.mode = ExecutionMode::Sequential;
            }
            let aoi = parse_aoi(&read_input(&input)?)?;
            let aggregator = build_aggregator(&config)?;
            generate(Arc::new(aggregator), aoi, config.execution.channel_capacity, output).await
        }
        Commands::Stream { input } => {
            let aoi = parse_aoi(&read_input(&input)?)?;
            let aggregator = build_aggregator(&config)?;
            stream(Arc::new(aggregator), aoi, config.execution.channel_capacity).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geocontext_pipeline::ContextSummary;

    const FEATURE: &str = r#"{
        "type": "Feature",
        "properties": {},
        "geometry": {
            "type": "Polygon",
            "coordinates": [[[9.1, 45.4], [9.3, 45.4], [9.3, 45.5], [9.1, 45.5], [9.1, 45.4]]]
        }
    }"#;

    #[test]
    fn parses_feature_input() {
        let aoi = parse_aoi(FEATURE).unwrap();
        assert_eq!(aoi.bounds().to_array(), [9.1, 45.4, 9.3, 45.5]);
    }

    #[test]
    fn rejects_multipolygon_and_garbage() {
        let multi = r#"{"type": "MultiPolygon", "coordinates": [[[[0,0],[1,0],[1,1],[0,0]]]]}"#;
        let err = parse_aoi(multi).unwrap_err();
        assert!(format!("{err:#}").contains("MultiPolygon"));
        assert!(parse_aoi("not json").is_err());
    }

    #[test]
    fn reads_input_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aoi.geojson");
        std::fs::write(&path, FEATURE).unwrap();
        let text = read_input(path.to_str().unwrap()).unwrap();
        assert!(parse_aoi(&text).is_ok());
        assert!(read_input(dir.path().join("missing.geojson").to_str().unwrap()).is_err());
    }

    #[test]
    fn catalog_flag_overrides_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("geocontext.toml");
        std::fs::write(&path, "[catalog]\nurl = \"es\"\ntimeout_secs = 30\n").unwrap();

        let config = load_config(Some(&path), None).unwrap();
        assert_eq!(config.catalog.url, "es");
        let config = load_config(Some(&path), Some("https://stac.example.org/v1")).unwrap();
        assert_eq!(config.catalog.url, "https://stac.example.org/v1");
        assert_eq!(config.catalog.timeout_secs, 30);
    }

    #[test]
    fn summary_file_has_summary_wrapper() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        write_summary(&ProgressEvent::Summary(ContextSummary::default()), &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let written: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(written["summary"]["landcover"], serde_json::json!({}));
        assert_eq!(written["summary"].as_object().unwrap().len(), 4);
    }
}
