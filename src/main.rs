use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::{Arc, mpsc};
use std::thread;

use anyhow::{Context, Result, bail};
use chrono::Local;
use clap::{Parser, Subcommand};
use colored::Colorize;
use log::{error, info};
use opencv::core::Mat;
use opencv::imgcodecs;
use opencv::prelude::*;

use battle_scout::artifacts::{ArtifactWriter, timestamp};
use battle_scout::capture::{FrameSource, scan_devices};
use battle_scout::config::Config;
use battle_scout::display::print_event;
use battle_scout::icon::{ContourCropper, icon_fingerprint};
use battle_scout::pipeline::{LoopSettings, RecognitionLoop, Recognizer};
use battle_scout::reference::{ReferenceDb, ReferenceStore};
use battle_scout::region::RegionExtractor;
use battle_scout::text::TesseractRecognizer;
use battle_scout::type_chart::{self, TypeChart};

#[derive(Parser, Debug)]
#[command(version, about = "Live opponent and team recognition from a capture card")]
pub struct Args {
    /// Path to the config JSON file, created with defaults if missing
    #[arg(long, global = true, value_name = "CONFIG_FILE", default_value = "battle_scout.json")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Capture from the camera and print recognized opponents and teams
    Run,
    /// Print the fingerprint of an icon image
    Hash {
        #[arg(value_name = "IMAGE")]
        image: PathBuf,
    },
    /// Store the fingerprint of an icon image for a reference key
    Register {
        key: String,
        #[arg(value_name = "IMAGE")]
        image: PathBuf,
    },
    /// List capture device indices that deliver frames
    Scan {
        #[arg(long, default_value_t = 10)]
        limit: i32,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if let Err(e) = dispatch(args) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn dispatch(args: Args) -> Result<()> {
    let config = Config::load_or_create(&args.config)
        .with_context(|| format!("loading config {}", args.config.display()))?;

    match args.command {
        Command::Run => run(&config),
        Command::Hash { image } => hash(&config, &image),
        Command::Register { key, image } => register(&config, &key, &image),
        Command::Scan { limit } => scan(&config, limit),
    }
}

fn cropper(config: &Config) -> ContourCropper {
    ContourCropper::new(config.contour_threshold, config.contour_retry_threshold)
}

fn load_icon(path: &Path) -> Result<Mat> {
    let image = imgcodecs::imread(&path.to_string_lossy(), imgcodecs::IMREAD_COLOR)?;
    if image.empty() {
        bail!("could not read image {}", path.display());
    }
    Ok(image)
}

fn hash(config: &Config, image: &Path) -> Result<()> {
    let fingerprint = icon_fingerprint(&cropper(config), &load_icon(image)?)?;
    println!("{}", fingerprint);
    Ok(())
}

fn register(config: &Config, key: &str, image: &Path) -> Result<()> {
    let db = ReferenceDb::open(&config.reference_db)
        .with_context(|| format!("opening reference data {}", config.reference_db.display()))?;
    let fingerprint = icon_fingerprint(&cropper(config), &load_icon(image)?)?;
    db.update_fingerprint(key, fingerprint)?;

    let name = db.get_record(key).map(|r| r.name).unwrap_or_default();
    println!("{} {} {}", key, name, fingerprint.to_string().dimmed());
    Ok(())
}

fn scan(config: &Config, limit: i32) -> Result<()> {
    let found = scan_devices(limit, config.camera.width, config.camera.height);
    if found.is_empty() {
        bail!("no capture device delivered a frame among indices 0..{}", limit);
    }
    for device in found {
        println!("{} {}x{}", device.index, device.width, device.height);
    }
    Ok(())
}

fn run(config: &Config) -> Result<()> {
    let db: Arc<dyn ReferenceStore> = Arc::new(
        ReferenceDb::open(&config.reference_db)
            .with_context(|| format!("opening reference data {}", config.reference_db.display()))?,
    );

    let camera = &config.camera;
    let mut source = FrameSource::open_camera(camera.index, camera.width, camera.height, camera.fps)?;
    let (width, height) = source.resolution();
    info!("capturing {}x{} from device {}", width, height, camera.index);

    let chart = match &config.type_chart {
        Some(path) => type_chart::load_from_file(path)
            .with_context(|| format!("loading type chart {}", path.display()))?,
        None => TypeChart::standard(),
    };

    let artifacts = ArtifactWriter::new(&config.output_dir);
    let recognizer = Recognizer::new(
        RegionExtractor::new(&config.regions, width, height),
        Box::new(TesseractRecognizer::new(config.tessdata_dir.clone())),
        db,
        LoopSettings::from(config),
    )
    .with_cropper(cropper(config))
    .with_artifacts(artifacts.clone())
    .with_type_chart(chart);

    source.start()?;
    let (sender, receiver) = mpsc::channel();
    let mut recognition = RecognitionLoop::start(recognizer, source.slot(), sender)?;

    let printer = thread::Builder::new()
        .name("event-printer".to_string())
        .spawn(move || {
            for event in receiver {
                print_event(&event);
            }
        })?;

    println!("{}", "s + Enter: screenshot, Enter: quit".dimmed());
    for line in std::io::stdin().lock().lines() {
        match line?.trim() {
            "s" => {
                let path = artifacts.screenshot_path(&timestamp(Local::now()));
                if let Err(e) = source.save_current_frame(&path) {
                    error!("screenshot failed: {}", e);
                }
            }
            "" => break,
            other => println!("unknown command {:?}", other),
        }
    }

    recognition.stop();
    if printer.join().is_err() {
        error!("event printer panicked");
    }
    source.release()?;
    Ok(())
}
