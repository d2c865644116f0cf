//! `hwdec` — hardware decode harness CLI.
//!
//! Decodes a framed elementary stream to raw NV12 through the shared
//! surface export path, and carries a couple of small maintenance
//! commands (implementation listing, plugin GUID lookup, sample stream
//! synthesis).

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use backend_sim::{stream, SimDevice, SimProvider};
use decode_core::{
    Bitstream, BitstreamFeeder, Codec, ConstraintSet, DecodeLoop, ExportDescriptor,
    ExportFlags, ExportOptions, FrameExportPipeline, LoopOptions, SessionConfigurator,
    SessionProvider, SurfaceType,
};
use plugin_ids::PluginRegistry;

/// Bitstream staging buffer size, sized for a few seconds of
/// high-bitrate input between refills.
const BITSTREAM_BUFFER_SIZE: usize = 2_000_000;

const MAJOR_API_VERSION_REQUIRED: u16 = 2;
const MINOR_API_VERSION_REQUIRED: u16 = 9;

#[derive(Parser)]
#[command(name = "hwdec", about = "Hardware decode harness", version)]
struct Cli {
    /// Verbose logging (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode an elementary stream to raw NV12 frames
    Decode {
        /// Input elementary stream
        input: PathBuf,

        /// Raw NV12 output file
        #[arg(short, long, default_value = "out.raw")]
        output: PathBuf,

        /// Input codec (hevc, avc, av1)
        #[arg(short, long, default_value = "hevc")]
        codec: Codec,

        /// Per-poll synchronize timeout in milliseconds
        #[arg(long, default_value_t = 100)]
        sync_timeout_ms: u64,

        /// Abandon a frame after this many still-running polls
        /// (unbounded when omitted)
        #[arg(long)]
        max_sync_attempts: Option<u32>,

        /// Back-off between submissions while the device is busy,
        /// in milliseconds
        #[arg(long, default_value_t = 10)]
        busy_wait_ms: u64,
    },

    /// List available decoder implementations and their properties
    Impls,

    /// Resolve a plugin name or hex string to its GUID
    PluginId {
        /// Symbolic name (e.g. hevcd_hw) or 32-character hex GUID
        name: String,
    },

    /// Write a synthetic elementary stream for testing the decode path
    Synth {
        /// Output stream file
        output: PathBuf,

        #[arg(long, default_value_t = 320)]
        width: u16,

        #[arg(long, default_value_t = 240)]
        height: u16,

        #[arg(long, default_value_t = 30)]
        frames: u32,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    if let Err(e) = run(cli.command) {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Decode {
            input,
            output,
            codec,
            sync_timeout_ms,
            max_sync_attempts,
            busy_wait_ms,
        } => decode_command(
            &input,
            &output,
            codec,
            Duration::from_millis(sync_timeout_ms),
            max_sync_attempts,
            Duration::from_millis(busy_wait_ms),
        ),
        Commands::Impls => impls_command(),
        Commands::PluginId { name } => plugin_id_command(&name),
        Commands::Synth {
            output,
            width,
            height,
            frames,
        } => synth_command(&output, width, height, frames),
    }
}

/// Providers visible to this build. The simulated backend advertises
/// one hardware implementation per codec.
fn providers() -> Vec<Box<dyn SessionProvider>> {
    vec![
        Box::new(SimProvider::new(Codec::Hevc)),
        Box::new(SimProvider::new(Codec::Avc)),
        Box::new(SimProvider::new(Codec::Av1)),
    ]
}

fn selection_constraints(codec: Codec) -> ConstraintSet {
    let mut constraints = ConstraintSet::new();
    constraints
        .hardware_impl()
        .decoder_codec(codec)
        .min_api_version(MAJOR_API_VERSION_REQUIRED, MINOR_API_VERSION_REQUIRED)
        .acceleration_mode("opencl")
        .surface_sharing(SurfaceType::OpenClImage2d);
    constraints
}

fn decode_command(
    input: &PathBuf,
    output: &PathBuf,
    codec: Codec,
    sync_timeout: Duration,
    max_sync_attempts: Option<u32>,
    busy_wait: Duration,
) -> Result<()> {
    let providers = providers();
    let configurator = SessionConfigurator::new(selection_constraints(codec));
    let provider = configurator.resolve(&providers)?;

    println!(
        "{}",
        serde_json::to_string_pretty(provider.info())
            .context("serializing implementation description")?
    );

    let device = SimDevice::new();
    let session = provider.create_session(&device)?;

    let source = BufReader::new(
        File::open(input).with_context(|| format!("opening {}", input.display()))?,
    );
    // The sink is written per frame and consumed by the loop, so no
    // buffering layer that could swallow a late flush error.
    let sink =
        File::create(output).with_context(|| format!("creating {}", output.display()))?;

    let pipeline = FrameExportPipeline::new(
        sink,
        ExportOptions {
            sync_timeout,
            max_sync_attempts,
            descriptor: ExportDescriptor {
                surface_type: SurfaceType::OpenClImage2d,
                flags: ExportFlags::Shared,
            },
        },
    );

    let summary = DecodeLoop::new(
        session,
        BitstreamFeeder::new(source),
        Bitstream::with_capacity(BITSTREAM_BUFFER_SIZE, codec),
        pipeline,
        LoopOptions { busy_wait },
    )
    .run()?;

    info!(frames = summary.frames, output = %output.display(), "decode finished");
    println!("Decoded {} frames to {}", summary.frames, output.display());
    println!(
        "To view: ffplay -f rawvideo -pixel_format nv12 -video_size <width>x<height> {}",
        output.display()
    );
    Ok(())
}

fn impls_command() -> Result<()> {
    let providers = providers();
    let infos: Vec<_> = providers.iter().map(|p| p.info()).collect();
    println!(
        "{}",
        serde_json::to_string_pretty(&infos)
            .context("serializing implementation descriptions")?
    );
    Ok(())
}

fn plugin_id_command(name: &str) -> Result<()> {
    let registry = PluginRegistry::builtin();
    match registry.resolve(name) {
        Ok(id) => {
            println!("{id}");
            Ok(())
        }
        Err(e) => {
            let known: Vec<_> = registry.names().collect();
            bail!("{e}; known names: {}", known.join(", "));
        }
    }
}

fn synth_command(output: &PathBuf, width: u16, height: u16, frames: u32) -> Result<()> {
    if width == 0 || height == 0 || frames == 0 {
        bail!("width, height and frame count must all be non-zero");
    }
    let mut file =
        File::create(output).with_context(|| format!("creating {}", output.display()))?;
    stream::write_sample_stream(&mut file, width, height, frames)
        .with_context(|| format!("writing {}", output.display()))?;
    println!(
        "Wrote {frames} frames of {width}x{height} NV12 to {}",
        output.display()
    );
    Ok(())
}
