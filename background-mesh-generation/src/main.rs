/// Background mesh generation entry point
use background_mesh_generation::{BackgroundPipeline, PipelineConfig, PipelineResult, PrecomputedDepth};
use clap::{Parser, Subcommand, ValueEnum};
use constants::files;
use log::{error, info};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(
    name = "background-mesh",
    version,
    about = "Reconstruct a gravity-aligned textured background mesh from a single image"
)]
struct Cli {
    /// Working directory holding every stage's artefacts.
    #[arg(long, value_name = "DIR", default_value = ".")]
    workdir: PathBuf,
    /// Path to TOML configuration file.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Colour image (defaults to background.webp in the working directory).
    #[arg(long, value_name = "FILE")]
    image: Option<PathBuf>,
    /// Log verbosity level.
    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest an externally estimated depth map.
    Depth(DepthArgs),
    /// Back-project depth into the point map and point cloud.
    Points,
    /// Triangulate the point map into a textured mesh.
    Mesh,
    /// Align the mesh to gravity and fit it under the scene objects.
    Refine(SceneArgs),
    /// Run every stage.
    Run {
        #[command(flatten)]
        depth: DepthArgs,
        #[command(flatten)]
        scene: SceneArgs,
    },
    /// Write the default configuration to a file.
    InitConfig {
        #[arg(value_name = "FILE", default_value = "background_mesh.toml")]
        output: PathBuf,
    },
}

#[derive(clap::Args, Debug)]
struct DepthArgs {
    /// Single channel OpenEXR depth map in metres.
    #[arg(long, value_name = "FILE")]
    depth: PathBuf,
    /// Focal length in pixels reported by the depth model.
    #[arg(long, value_name = "PX")]
    focal_length: f64,
}

#[derive(clap::Args, Debug)]
struct SceneArgs {
    /// Object placement JSON (defaults to scene_generated.json in the working directory).
    #[arg(long, value_name = "FILE")]
    scene: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

fn init_logger(level: LogLevel) {
    let mut builder = env_logger::Builder::new();
    builder.target(env_logger::Target::Stderr);
    builder.filter_level(level.as_filter());
    builder.format(|buf, record| {
        use std::io::Write;
        let module = record.module_path().unwrap_or(record.target());
        writeln!(
            buf,
            "{} [{}] {}: {}",
            buf.timestamp_millis(),
            record.level(),
            module,
            record.args()
        )
    });
    let _ = builder.try_init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logger(cli.log_level);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> PipelineResult<()> {
    if let Command::InitConfig { output } = &cli.command {
        PipelineConfig::default().save(output)?;
        info!("Default configuration written to {}", output.display());
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };

    let mut pipeline = BackgroundPipeline::new(&cli.workdir, config)?;
    if let Some(image) = cli.image {
        pipeline = pipeline.with_image(image);
    }

    match cli.command {
        Command::Depth(args) => {
            let estimator = PrecomputedDepth::new(args.depth, args.focal_length);
            pipeline.depth(&estimator)?;
        }
        Command::Points => {
            pipeline.points()?;
        }
        Command::Mesh => {
            pipeline.mesh()?;
        }
        Command::Refine(args) => {
            if let Some(scene) = args.scene {
                pipeline = pipeline.with_scene(scene);
            }
            pipeline.refine()?;
        }
        Command::Run { depth, scene } => {
            if let Some(scene) = scene.scene {
                pipeline = pipeline.with_scene(scene);
            }
            let estimator = PrecomputedDepth::new(depth.depth, depth.focal_length);
            pipeline.run(&estimator)?;
            info!("Manifest written to {}", files::MANIFEST);
        }
        Command::InitConfig { .. } => {}
    }

    Ok(())
}
