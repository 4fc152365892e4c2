// SPDX-License-Identifier: GPL-3.0-only

use clap::{Args, Parser, Subcommand};
use invariance::config::Config;
use invariance::invariant::SharedParameters;
use invariance::session::{RenderBackend, Session};
use std::fs::File;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::warn;

mod cli;

#[derive(Parser)]
#[command(name = "invariance")]
#[command(about = "Illumination-invariant camera viewer")]
#[command(version = env!("GIT_VERSION"))]
#[command(subcommand_required = false)]
struct Cli {
    /// Config file (default: <config dir>/invariance/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Flags shared by commands that render
#[derive(Args, Clone, Default)]
struct RenderArgs {
    /// Sensor alpha in [0, 1]
    #[arg(short, long)]
    alpha: Option<f32>,

    /// Copy the source unchanged instead of transforming it
    #[arg(long)]
    passthrough: bool,

    /// Use the CPU reference pipeline instead of the GPU
    #[arg(long)]
    cpu: bool,
}

impl RenderArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(alpha) = self.alpha {
            config.alpha = alpha;
        }
        if self.passthrough {
            config.invariance_enabled = false;
        }
    }

    fn backend(&self) -> RenderBackend {
        if self.cpu {
            RenderBackend::Cpu
        } else {
            RenderBackend::Gpu
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the terminal viewer (default)
    View {
        #[command(flatten)]
        render: RenderArgs,

        /// Capture device, e.g. /dev/video0
        #[arg(short, long)]
        device: Option<String>,

        /// Image shown in static mode
        #[arg(short, long)]
        image: Option<PathBuf>,

        /// Start with the camera instead of the still image
        #[arg(long, conflicts_with = "still")]
        live: bool,

        /// Start with the still image even if the config says camera
        #[arg(long)]
        still: bool,

        /// Write logs here; the screen is in use while viewing
        #[arg(long)]
        log_file: Option<PathBuf>,
    },

    /// List capture devices
    List,

    /// Transform one image and save it as PNG
    Process {
        /// Image to transform
        input: PathBuf,

        /// Output file path (default: <input>_<variant>.png)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        render: RenderArgs,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let command = cli.command.unwrap_or(Commands::View {
        render: RenderArgs::default(),
        device: None,
        image: None,
        live: false,
        still: false,
        log_file: None,
    });

    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=invariance=debug, RUST_LOG=info
    let log_file = match &command {
        Commands::View { log_file, .. } => log_file.clone(),
        _ => None,
    };
    init_logging(&command, log_file)?;

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load().unwrap_or_else(|e| {
            warn!(error = %e, "Ignoring unreadable config");
            Config::default()
        }),
    };

    match command {
        Commands::List => cli::list_cameras(),
        Commands::Process {
            input,
            output,
            render,
        } => {
            render.apply(&mut config);
            let config = config.sanitized();
            cli::process_image(
                &input,
                output,
                config.transform_parameters(),
                render.backend(),
            )
        }
        Commands::View {
            render,
            device,
            image,
            live,
            still,
            ..
        } => {
            render.apply(&mut config);
            if let Some(device) = device {
                config.camera_device = device;
            }
            if image.is_some() {
                config.fallback_image = image;
            }
            if live {
                config.start_live = true;
            }
            if still {
                config.start_live = false;
            }
            run_viewer(config.sanitized(), render.backend())
        }
    }
}

fn init_logging(
    command: &Commands,
    log_file: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
    };

    match (command, log_file) {
        (Commands::View { .. }, Some(path)) => {
            let file = File::create(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter())
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_target(true)
                .init();
        }
        // Anything on stderr would corrupt the viewer's screen
        (Commands::View { .. }, None) => {}
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(filter())
                .with_target(true)
                .with_level(true)
                .init();
        }
    }
    Ok(())
}

fn run_viewer(config: Config, backend: RenderBackend) -> Result<(), Box<dyn std::error::Error>> {
    let params = SharedParameters::new(config.transform_parameters());
    let mut session = Session::new(
        backend,
        params,
        config.alias_capacity,
        config.capture_request(),
    )?;

    if let Some(path) = &config.fallback_image
        && let Err(e) = session.load_still(path)
    {
        warn!(path = %path.display(), error = %e, "Still image unavailable, using placeholder");
    }

    invariance::terminal::run(session, config.start_live)?;
    Ok(())
}
