// src/main.rs - engraver command line
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};

use laser_engraver::communication::available_ports;
use laser_engraver::config::{self, Config};
use laser_engraver::engrave_job::{DeviceTarget, EngraveJob, ProgressEvent, RunOutcome};
use laser_engraver::file_manager;
use laser_engraver::raster::{image_input, RasterConverter};
use laser_engraver::script::{estimate, format_hms, Estimate, MotionScript};

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

const DEFAULT_CONFIG: &str = "engraver.toml";
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Two-axis laser engraver controller
#[derive(Parser, Debug)]
#[command(
    name = "engraver",
    version,
    about = "Convert images to motion scripts and run them on a laser engraver."
)]
struct Cli {
    /// Path to a TOML config file (defaults to ./engraver.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Convert an image into a motion script
    Convert {
        image: PathBuf,
        /// Output script path (defaults to the image name with a .txt extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        max_width: Option<u32>,
        #[arg(long)]
        max_height: Option<u32>,
    },
    /// Show point count, size and duration of a motion script
    Estimate {
        script: PathBuf,
        #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..))]
        multiplier: Option<u32>,
        /// Drop blank and comment lines instead of stopping at them
        #[arg(long)]
        strip_comments: bool,
        #[arg(long)]
        json: bool,
    },
    /// Run a motion script on the device ("0" as port simulates)
    Run {
        script: PathBuf,
        #[arg(short, long)]
        port: Option<String>,
        #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..))]
        multiplier: Option<u32>,
        #[arg(long)]
        strip_comments: bool,
    },
    /// List serial ports
    Ports,
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let cli = Cli::parse();

    let level = if cli.quiet {
        tracing::Level::WARN
    } else {
        match cli.verbose {
            0 => tracing::Level::INFO,
            1 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Convert { image, output, max_width, max_height } => {
            convert(&config, &image, output, max_width, max_height).await
        }
        Commands::Estimate { script, multiplier, strip_comments, json } => {
            let multiplier = multiplier.unwrap_or(config.run.multiplier);
            let script = read_script(&script, strip_comments).await?;
            let est = estimate(&script, multiplier)?;
            if json {
                let (width_mm, height_mm) = est.physical_size(config.estimate.mm_per_step);
                let report = serde_json::json!({
                    "estimate": est,
                    "width_mm": width_mm,
                    "height_mm": height_mm,
                    "duration_secs": config.timing_model().duration(&est).as_secs(),
                });
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_estimate(&config, &est);
            }
            Ok(())
        }
        Commands::Run { script, port, multiplier, strip_comments } => {
            let mut options = config.run_options();
            if let Some(multiplier) = multiplier {
                options.multiplier = multiplier;
            }
            let target = match port {
                Some(port) => DeviceTarget::from_port_id(&port, config.device.baud),
                None => config.device_target(),
            };
            let script = read_script(&script, strip_comments).await?;
            run(&config, script, options, target).await
        }
        Commands::Ports => {
            let ports = available_ports();
            if ports.is_empty() {
                println!("No ports");
            }
            for port in ports {
                println!("{}", port);
            }
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config, BoxError> {
    match path {
        Some(path) => {
            let path = path.to_str().ok_or("config path is not valid UTF-8")?;
            tracing::info!("Loading configuration from: {}", path);
            Ok(config::load_config(path)?)
        }
        None if Path::new(DEFAULT_CONFIG).exists() => {
            tracing::info!("Loading configuration from: {}", DEFAULT_CONFIG);
            Ok(config::load_config(DEFAULT_CONFIG)?)
        }
        None => Ok(Config::default()),
    }
}

async fn read_script(path: &Path, strip_comments: bool) -> Result<MotionScript, BoxError> {
    let script = if strip_comments {
        file_manager::read_script_filtered(path).await?
    } else {
        file_manager::read_script(path).await?
    };
    Ok(script)
}

fn print_estimate(config: &Config, est: &Estimate) {
    if est.is_empty() {
        println!("Script is empty, nothing to engrave");
        return;
    }
    let (width_mm, height_mm) = est.physical_size(config.estimate.mm_per_step);
    println!("Points:        {}", est.point_count);
    println!("Steps:         {}", est.total_steps);
    println!(
        "Size:          {} x {} ({:.3}mm by {:.3}mm)",
        est.width, est.height, width_mm, height_mm
    );
    println!("Time estimate: {}", format_hms(config.timing_model().duration(est)));
}

async fn convert(
    config: &Config,
    image: &Path,
    output: Option<PathBuf>,
    max_width: Option<u32>,
    max_height: Option<u32>,
) -> Result<(), BoxError> {
    let max_size = config.convert.max_size(max_width, max_height)?;
    let bitmap = image_input::load_bitmap(image, max_size, config.convert.alpha_cutoff)?;
    let script = RasterConverter::new(config.convert.threshold).convert(&bitmap);
    if script.is_empty() {
        tracing::warn!("No foreground pixels in {}", image.display());
    }
    // Nothing is written unless the whole script is runnable.
    let est = estimate(&script, 1)?;

    let output = output.unwrap_or_else(|| image.with_extension("txt"));
    file_manager::write_script(&output, &script).await?;
    println!("Wrote {} ({} points)", output.display(), script.len());

    print_estimate(config, &est);
    Ok(())
}

async fn run(
    config: &Config,
    script: MotionScript,
    options: laser_engraver::RunOptions,
    target: DeviceTarget,
) -> Result<(), BoxError> {
    // Refuse to start on a script that would abort part way.
    let est = estimate(&script, options.multiplier)?;
    if est.is_empty() {
        println!("Script is empty, nothing to run");
        return Ok(());
    }
    print_estimate(config, &est);

    let mut job = EngraveJob::start(script, options, target)?;
    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut cancel_requested = false;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let finished = job.is_finished();
                for event in job.drain_progress() {
                    report(&event);
                }
                if finished {
                    break;
                }
            }
            _ = &mut ctrl_c, if !cancel_requested => {
                cancel_requested = true;
                tracing::info!("Interrupted, stopping after the current point");
                job.cancel();
            }
        }
    }
    println!();

    let summary = job.wait().await?;
    match summary.outcome {
        RunOutcome::Completed => println!("Completed {} points", summary.lines_processed),
        RunOutcome::Cancelled => println!("Cancelled after {} points", summary.lines_processed),
    }
    if summary.failures > 0 {
        tracing::warn!("{} points were not acknowledged by the device", summary.failures);
    }
    Ok(())
}

fn report(event: &ProgressEvent) {
    if !event.ok {
        tracing::warn!("Line {} ({}, {}) failed", event.line, event.point.x, event.point.y);
    }
    print!("\rPercent complete: {:.3}%", event.percent_complete);
    use std::io::Write as _;
    let _ = std::io::stdout().flush();
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn test_zero_multiplier_is_refused() {
        for command in ["estimate", "run"] {
            let parsed = Cli::try_parse_from(["engraver", command, "script.txt", "-m", "0"]);
            assert!(parsed.is_err(), "{} accepted multiplier 0", command);
        }
        assert!(Cli::try_parse_from(["engraver", "estimate", "script.txt", "-m", "2"]).is_ok());
    }

    #[tokio::test]
    async fn test_convert_refuses_size_beyond_axis_range() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("wide.png");
        let output = dir.path().join("wide.txt");
        RgbaImage::from_pixel(3400, 1, Rgba([0, 0, 0, 255])).save(&image).unwrap();

        let config = Config::default();
        let result = convert(&config, &image, Some(output.clone()), Some(4000), None).await;
        assert!(result.is_err());
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_convert_writes_script_within_range() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("dot.png");
        let output = dir.path().join("dot.txt");
        RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 255])).save(&image).unwrap();

        convert(&Config::default(), &image, Some(output.clone()), None, None).await.unwrap();
        let script = file_manager::read_script(&output).await.unwrap();
        assert_eq!(script.len(), 4);
    }
}
