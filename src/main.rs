use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{error, info};

use parkwatch::annotate::{DirectorySink, FrameSink, NullSink};
use parkwatch::config::ParkwatchConfig;
use parkwatch::pipeline::{DetectionPipeline, PipelineOptions};
use parkwatch::session::DetectionSession;
use parkwatch::slots::{SlotLayout, SlotPicker, SlotStore};
use parkwatch::source::{FrameSource, ImageSequenceSource, StillImageSource};

#[derive(Parser)]
#[command(name = "parkwatch")]
#[command(about = "Parking slot occupancy detection")]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Classify every slot on each frame and write annotated frames
    Detect {
        /// Directory of extracted video frames, processed in name order
        #[arg(long, conflicts_with_all = ["image", "camera"])]
        frames: Option<PathBuf>,

        /// A single image, evaluated `--repeat` times
        #[arg(long, conflicts_with = "camera")]
        image: Option<PathBuf>,

        /// How many times to evaluate `--image`
        #[arg(long, default_value = "1")]
        repeat: u64,

        /// Camera device index (requires the `camera` feature)
        #[arg(long)]
        camera: Option<u32>,

        /// Override the configured output directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Do not write annotated frames
        #[arg(long)]
        no_output: bool,
    },

    /// Manage the persisted slot layout
    #[command(subcommand)]
    Slots(SlotsCommand),
}

#[derive(Subcommand)]
enum SlotsCommand {
    /// Append a slot whose top-left corner is (X, Y)
    Add {
        x: u32,
        y: u32,
        /// Reference image the slot is drawn on
        #[arg(short, long)]
        reference: PathBuf,
    },
    /// Remove the most recently added slot
    Undo,
    /// Remove every slot
    Clear,
    /// Print the active layout
    List,
    /// Set the slot size shared by all slots
    Size { width: u32, height: u32 },
    /// Replace the layout with rectangles from a drawing-canvas JSON export
    FromCanvas {
        json: PathBuf,
        #[arg(short, long)]
        reference: PathBuf,
    },
    /// Draw the active layout over a reference image
    Preview {
        #[arg(short, long)]
        reference: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Write the active layout to a transfer file
    Export { file: PathBuf },
    /// Replace the active layout with a transfer file
    Import { file: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { "debug" } else { "info" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(format!("parkwatch={}", log_level))
        .try_init();

    let config = ParkwatchConfig::load(&args.config).await?;
    info!("Configuration loaded from {}", args.config);

    let store = SlotStore::new(
        &config.slots.store_path,
        config.slots.default_width,
        config.slots.default_height,
    );

    match args.command {
        Command::Detect {
            frames,
            image,
            repeat,
            camera,
            output,
            no_output,
        } => {
            let mut source = open_source(frames, image, repeat, camera)?;
            let output_dir = output.or_else(|| {
                if config.render.output_dir.is_empty() {
                    None
                } else {
                    Some(PathBuf::from(&config.render.output_dir))
                }
            });
            let mut sink: Box<dyn FrameSink> = match output_dir {
                Some(dir) if !no_output => Box::new(DirectorySink::create(dir)?),
                _ => Box::new(NullSink),
            };

            let session = DetectionSession::new(store.load(), &config)?;
            let mut pipeline = DetectionPipeline::new(session, PipelineOptions::from(&config.render));
            match pipeline.run(source.as_mut(), sink.as_mut()).await {
                Ok(stats) => info!(
                    "Processed {} frames, free slots: {}/{}",
                    stats.frames, stats.last_free, stats.last_total
                ),
                Err(e) => {
                    error!("Detection failed: {}", e);
                    return Err(e);
                }
            }
        }
        Command::Slots(cmd) => run_slots_command(cmd, &store)?,
    }

    Ok(())
}

fn open_source(
    frames: Option<PathBuf>,
    image: Option<PathBuf>,
    repeat: u64,
    camera: Option<u32>,
) -> Result<Box<dyn FrameSource>> {
    if let Some(dir) = frames {
        return Ok(Box::new(ImageSequenceSource::open(dir)?));
    }
    if let Some(path) = image {
        return Ok(Box::new(StillImageSource::open(path, repeat)?));
    }
    if let Some(index) = camera {
        #[cfg(feature = "camera")]
        {
            return Ok(Box::new(parkwatch::source::CameraSource::open(index)?));
        }
        #[cfg(not(feature = "camera"))]
        {
            bail!("camera {} requested but parkwatch was built without the `camera` feature", index);
        }
    }
    bail!("one of --frames, --image or --camera is required")
}

fn reference_dimensions(path: &Path) -> Result<(u32, u32)> {
    image::image_dimensions(path)
        .with_context(|| format!("{} is not a valid image file", path.display()))
}

fn run_slots_command(cmd: SlotsCommand, store: &SlotStore) -> Result<()> {
    match cmd {
        SlotsCommand::Add { x, y, reference } => {
            let dims = reference_dimensions(&reference)?;
            let layout = store.load();
            if layout.has_reference_dimensions() && (layout.image_width, layout.image_height) != dims {
                bail!(
                    "active layout was drawn on a {}x{} image but {} is {}x{}; clear it first",
                    layout.image_width,
                    layout.image_height,
                    reference.display(),
                    dims.0,
                    dims.1
                );
            }
            let mut picker = SlotPicker::resume(&layout, dims)?;
            picker.add(x, y)?;
            store.save(&picker.into_layout())?;
        }
        SlotsCommand::Undo => {
            let mut layout = store.load();
            match layout.slots.pop() {
                Some(slot) => {
                    info!("Removed slot at ({}, {})", slot.x, slot.y);
                    store.save(&layout)?;
                }
                None => info!("No slots to remove"),
            }
        }
        SlotsCommand::Clear => {
            let layout = store.load();
            store.save(&SlotLayout::empty(layout.slot_width, layout.slot_height))?;
        }
        SlotsCommand::List => {
            let layout = store.load();
            println!(
                "{} slots of {}x{} (reference image {}x{})",
                layout.len(),
                layout.slot_width,
                layout.slot_height,
                layout.image_width,
                layout.image_height
            );
            for (i, slot) in layout.slots.iter().enumerate() {
                println!("  {:>3}: ({}, {})", i + 1, slot.x, slot.y);
            }
        }
        SlotsCommand::Size { width, height } => {
            let mut layout = store.load();
            layout.slot_width = width;
            layout.slot_height = height;
            store.save(&layout)?;
        }
        SlotsCommand::FromCanvas { json, reference } => {
            let dims = reference_dimensions(&reference)?;
            let layout = store.load();
            let content = std::fs::read_to_string(&json)
                .with_context(|| format!("Failed to read {}", json.display()))?;
            let picker =
                SlotPicker::from_canvas_json(&content, dims, layout.slot_width, layout.slot_height)?;
            store.save(&picker.into_layout())?;
        }
        SlotsCommand::Preview { reference, output } => {
            let image = image::open(&reference)
                .with_context(|| format!("{} is not a valid image file", reference.display()))?
                .to_rgb8();
            let layout = store.load();
            layout
                .preview(&image)
                .save(&output)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            info!("Wrote slot preview to {}", output.display());
        }
        SlotsCommand::Export { file } => {
            store.export(&file)?;
        }
        SlotsCommand::Import { file } => {
            store.import(&file)?;
        }
    }
    Ok(())
}
