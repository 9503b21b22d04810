use clap::{Parser, Subcommand};
use imager::cache::CacheStores;
use imager::config;
use imager::generate::CancellationToken;
use imager::imaging::RustCodec;
use imager::output;
use imager::utility::{UtilityFacade, UtilityResponse};
use imager::volumes::{FsVolumes, NoRemoteFetcher};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "imager")]
#[command(about = "Pre-generate image transforms and manage their caches")]
#[command(long_about = "\
Pre-generate image transforms and manage their caches

Volumes are named collections of source images (a local directory and/or
remote URLs). Transforms are named presets: target size, aspect ratio,
crop mode, output format and an ordered list of effects.

Configuration is read from imager.toml in --config-dir:

  [volumes.photos]
  path = \"photos\"
  transforms = [\"thumb\"]

  [transforms.thumb]
  width = 300
  ratio = 1.0
  mode = \"crop\"

Run 'imager gen-config' to print a documented imager.toml.

Log verbosity follows RUST_LOG (default: info).")]
#[command(version)]
struct Cli {
    /// Directory containing imager.toml
    #[arg(long, default_value = ".", global = true)]
    config_dir: PathBuf,

    /// Print the response as JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate transforms for the selected volumes
    Generate {
        /// Volume to generate (repeatable)
        #[arg(long = "volume", value_name = "ID")]
        volumes: Vec<String>,
        /// Use each volume's configured presets
        #[arg(long)]
        configured: bool,
        /// Preset to generate for every volume (repeatable)
        #[arg(long = "transform", value_name = "NAME")]
        transforms: Vec<String>,
    },
    /// Clear cached files: all, transforms or runtime
    ClearCache {
        kind: String,
    },
    /// Show the file count of each cache tier
    Status,
    /// Print a stock imager.toml with all options documented
    GenConfig,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode, Box<dyn std::error::Error>> {
    if matches!(cli.command, Command::GenConfig) {
        return Ok(print_stock_config());
    }

    let config = config::load_config(&cli.config_dir)?;
    tracing::debug!(config_dir = %cli.config_dir.display(), "configuration loaded");

    let codec = RustCodec::new();
    let volumes = FsVolumes::new(&config);
    let fetcher = NoRemoteFetcher;
    let stores = CacheStores::from_config(&config.cache);
    let facade = UtilityFacade::new(&config, &volumes, &codec, &fetcher, &stores);

    let (response, headline) = match cli.command {
        Command::Generate {
            volumes: volume_ids,
            configured,
            transforms,
        } => {
            init_thread_pool(&config.processing);

            let token = CancellationToken::new();
            let handler_token = token.clone();
            ctrlc::set_handler(move || {
                tracing::warn!("interrupt received, finishing in-flight items");
                handler_token.cancel();
            })?;

            let (tx, rx) = std::sync::mpsc::channel();
            let quiet = cli.json;
            let printer = std::thread::spawn(move || {
                for event in rx {
                    if quiet {
                        continue;
                    }
                    for line in output::format_generate_event(&event) {
                        println!("{}", line);
                    }
                }
            });
            let response = facade
                .with_cancellation(token)
                .with_events(tx)
                .generate_transforms(&volume_ids, configured, &transforms);
            // The facade owned the last sender, so the printer drains and exits.
            if printer.join().is_err() {
                tracing::warn!("progress printer panicked");
            }
            (response, "Generated transforms.")
        }
        Command::ClearCache { kind } => (facade.clear_cache(&kind), "Cache cleared."),
        Command::Status => {
            let counts = facade.cache_counts()?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&counts)?);
            } else {
                output::print_counts(&counts);
            }
            return Ok(ExitCode::SUCCESS);
        }
        Command::GenConfig => return Ok(print_stock_config()),
    };

    report(&response, headline, cli.json)?;
    Ok(if response.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_stock_config() -> ExitCode {
    print!("{}", config::stock_config_toml());
    ExitCode::SUCCESS
}

fn report(response: &UtilityResponse, headline: &str, json: bool) -> Result<(), serde_json::Error> {
    if json {
        println!("{}", serde_json::to_string_pretty(response)?);
    } else {
        output::print_response(response, headline);
    }
    Ok(())
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores; the user can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
