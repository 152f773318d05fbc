use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use pulsewatch::config::{AppConfig, DetectorConfig, ServerConfig};
use pulsewatch::detect::{EnsembleRule, ExceedPolicy};
use pulsewatch::replay::{self, ReplayOptions, ReplayRow};

#[derive(Parser)]
#[command(
    name = "pulsewatch",
    about = "Streaming host telemetry with ensemble anomaly detection",
    version,
    long_about = None
)]
struct Cli {
    /// Config file (default: $PULSEWATCH_CONFIG, then /etc/pulsewatch/pulsewatch.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "PULSEWATCH_JSON_LOGS")]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the streaming server (WebSocket + HTTP API)
    Serve {
        #[command(flatten)]
        server: ServerArgs,

        #[command(flatten)]
        detector: DetectorArgs,
    },

    /// Replay a recorded metrics CSV through the detector
    Replay {
        /// Input CSV; first column is the timestamp
        #[arg(long)]
        input: PathBuf,

        /// Write per-sample results to this CSV
        #[arg(long)]
        out: Option<PathBuf>,

        /// Seconds to wait between rows
        #[arg(long, default_value = "0")]
        interval: f64,

        /// Comma-separated feature columns (default: all but the timestamp)
        #[arg(long, value_delimiter = ',')]
        features: Option<Vec<String>>,

        #[command(flatten)]
        detector: DetectorArgs,
    },

    /// Print the resolved configuration as TOML
    Config {
        #[command(flatten)]
        server: ServerArgs,

        #[command(flatten)]
        detector: DetectorArgs,
    },
}

#[derive(Args)]
struct ServerArgs {
    /// Bind address
    #[arg(long, env = "PULSEWATCH_BIND")]
    bind: Option<String>,

    /// Seconds between samples in each session
    #[arg(long, env = "PULSEWATCH_SAMPLE_INTERVAL")]
    sample_interval: Option<f64>,

    /// Allowed CORS origins (comma-separated)
    #[arg(long, env = "PULSEWATCH_CORS_ORIGINS", value_delimiter = ',')]
    cors_origins: Option<Vec<String>>,
}

impl ServerArgs {
    fn apply(self, cfg: &mut ServerConfig) {
        if let Some(bind) = self.bind {
            cfg.bind = bind;
        }
        if let Some(interval) = self.sample_interval {
            cfg.sample_interval = interval;
        }
        if let Some(origins) = self.cors_origins {
            cfg.cors_origins = origins;
        }
    }
}

#[derive(Args)]
struct DetectorArgs {
    /// Stream raw metrics only, without detection scores
    #[arg(long, env = "PULSEWATCH_NO_SCORES")]
    no_scores: bool,

    /// Samples per sliding window
    #[arg(long, env = "PULSEWATCH_WINDOW")]
    window: Option<usize>,

    /// Ensemble scores kept for the adaptive threshold
    #[arg(long, env = "PULSEWATCH_BASELINE")]
    baseline: Option<usize>,

    /// Percentile of the baseline used as the threshold
    #[arg(long, env = "PULSEWATCH_THRESHOLD_PCT")]
    threshold_pct: Option<f64>,

    /// Exceeds required within the sustain window to raise the alarm
    #[arg(long, env = "PULSEWATCH_SUSTAIN")]
    sustain: Option<usize>,

    /// Lookback length of the sustain alarm
    #[arg(long, env = "PULSEWATCH_SUSTAIN_WINDOW")]
    sustain_window: Option<usize>,

    /// Ensemble rule: max or mean
    #[arg(long, env = "PULSEWATCH_ENSEMBLE")]
    ensemble: Option<EnsembleRule>,

    /// Exceed comparison: strict (>) or inclusive (>=)
    #[arg(long, env = "PULSEWATCH_EXCEED")]
    exceed: Option<ExceedPolicy>,
}

impl DetectorArgs {
    fn apply(self, cfg: &mut DetectorConfig) {
        if self.no_scores {
            cfg.enabled = false;
        }
        if let Some(v) = self.window {
            cfg.window = v;
        }
        if let Some(v) = self.baseline {
            cfg.baseline = v;
        }
        if let Some(v) = self.threshold_pct {
            cfg.threshold_pct = v;
        }
        if let Some(v) = self.sustain {
            cfg.sustain = v;
        }
        if let Some(v) = self.sustain_window {
            cfg.sustain_window = v;
        }
        if let Some(v) = self.ensemble {
            cfg.ensemble = v;
        }
        if let Some(v) = self.exceed {
            cfg.exceed = v;
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn print_row(row: &ReplayRow) {
    let r = &row.result;
    let marker = if r.alarm {
        "ALARM"
    } else if r.exceed {
        "exceed"
    } else {
        ""
    };
    println!(
        "{:<26} ecod={:.4} iforest={:.4} ens={:.4} thr={:.4} {}",
        row.ts, r.score_ecod, r.score_iforest, r.score_ens, r.threshold, marker
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let mut config = AppConfig::resolve(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { server, detector } => {
            server.apply(&mut config.server);
            detector.apply(&mut config.detector);
            tracing::info!(
                bind = %config.server.bind,
                detection = config.detector.enabled,
                "Starting Pulsewatch"
            );
            pulsewatch::serve(config).await?;
        }
        Commands::Replay {
            input,
            out,
            interval,
            features,
            detector,
        } => {
            detector.apply(&mut config.detector);
            config.validate().context("invalid configuration")?;
            if !interval.is_finite() || interval < 0.0 {
                anyhow::bail!("--interval must be a non-negative number of seconds");
            }

            let options = ReplayOptions {
                input,
                output: out,
                interval: Duration::from_secs_f64(interval),
                features,
            };
            let summary = replay::replay(&options, &config.detector, print_row).await?;

            println!("\n=== Replay Summary ===");
            println!("Rows:         {}", summary.rows);
            println!("Scored:       {}", summary.results);
            println!("Inconclusive: {}", summary.inconclusive);
            println!("Exceeded:     {}", summary.exceeded);
            println!("Alarms:       {}", summary.alarms);
            if let Some(path) = &options.output {
                println!("Results:      {}", path.display());
            }
        }
        Commands::Config { server, detector } => {
            server.apply(&mut config.server);
            detector.apply(&mut config.detector);
            config.validate().context("invalid configuration")?;
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
