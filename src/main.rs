use std::error::Error;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing::{error, info};

use tycam::apps::{self, AppEnv, point3d::OfflineOptions};
use tycam::input::StdinKeys;
use tycam::{CameraBackend, Config, DeviceSelector, SimBackend, StopSignal};

#[derive(Parser)]
#[command(name = "tyview")]
#[command(about = "Capture, view and export frames from TY depth cameras")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct CommonArgs {
    /// Open the device at this IP address
    #[arg(long, global = true, conflicts_with = "id")]
    ip: Option<String>,

    /// Open the device with this id
    #[arg(long, global = true)]
    id: Option<String>,

    /// Use the simulated camera instead of the SDK
    #[arg(long, global = true)]
    sim: bool,

    /// Stop after this many frames
    #[arg(long, global = true)]
    frames: Option<u64>,

    /// Output directory for dumps, saved images and viewer windows
    #[arg(long, global = true)]
    out: Option<PathBuf>,

    /// JSON config file; flags override its values
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the library version and the connected devices
    List {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Depth, IR and color on a capture thread; `s` saves a raw dump
    Callback,

    /// Overlay the point cloud projected into the color camera; `s` saves depth.png/color.png
    Registration,

    /// Show the point cloud, live or from a dump file
    Point3d {
        /// Stereo dump to load instead of opening a device
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Export the points of the dump as text
        #[arg(short = 't')]
        export_points: bool,

        /// Export the IR images of the dump as JPEG
        #[arg(long)]
        ir: bool,
    },

    /// Color histogram and background change detection
    RgbAnalysis,
}

fn main() -> ExitCode {
    // Set RUST_LOG to change the level, e.g. RUST_LOG=tycam=debug
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let config = load_config(&cli.common)?;
    let sim = cli.common.sim;

    let capture: fn(AppEnv) -> tycam::Result<u64> = match cli.command {
        Commands::List { json } => {
            apps::list::run(backend(sim, &config), json, &mut io::stdout().lock())?;
            return Ok(());
        }
        Commands::Point3d {
            file: Some(file),
            export_points,
            ir,
        } => {
            let stop = StopSignal::new();
            stop.install_ctrlc()?;
            let mut viewer = apps::make_viewer(&config)?;
            let options = OfflineOptions {
                export_ir: ir,
                export_points,
            };
            info!("close the Point3D window or press Ctrl-C to exit");
            apps::point3d::run_offline(&file, options, viewer.as_mut(), &stop)?;
            return Ok(());
        }
        Commands::Point3d { file: None, .. } => apps::point3d::run,
        Commands::Callback => apps::callback::run,
        Commands::Registration => apps::registration::run,
        Commands::RgbAnalysis => apps::rgb_analysis::run,
    };

    let stop = StopSignal::new();
    stop.install_ctrlc()?;
    let env = AppEnv {
        backend: backend(sim, &config),
        viewer: apps::make_viewer(&config)?,
        keys: Box::new(StdinKeys::spawn()),
        stop,
        config,
    };
    info!("type q + Enter to quit, s + Enter to save");
    capture(env)?;
    Ok(())
}

fn load_config(args: &CommonArgs) -> Result<Config, Box<dyn Error>> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(ip) = &args.ip {
        config.device = DeviceSelector::Ip(ip.clone());
    }
    if let Some(id) = &args.id {
        config.device = DeviceSelector::Id(id.clone());
    }
    if args.frames.is_some() {
        config.max_frames = args.frames;
    }
    if let Some(out) = &args.out {
        config.output_dir = out.clone();
    }
    config.validate()?;
    Ok(config)
}

#[cfg(feature = "native")]
fn backend(sim: bool, config: &Config) -> Box<dyn CameraBackend> {
    if sim {
        info!("using the simulated camera");
        Box::new(SimBackend::new(config.sim.clone()))
    } else {
        Box::new(tycam::NativeBackend::new())
    }
}

#[cfg(not(feature = "native"))]
fn backend(sim: bool, config: &Config) -> Box<dyn CameraBackend> {
    if !sim {
        info!("built without the `native` feature, using the simulated camera");
    }
    Box::new(SimBackend::new(config.sim.clone()))
}
