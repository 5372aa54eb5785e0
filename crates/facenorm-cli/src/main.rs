use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facenorm_core::{norm_crop_batch, DetectedFace, ALIGNED_SIZE};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod config;
mod input;
mod response;

use config::Config;
use input::EmbeddingInput;
use response::Reply;

#[derive(Parser)]
#[command(name = "facenorm", about = "Face alignment and embedding comparison")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the transform taking five landmarks onto the reference layout
    Estimate {
        /// Landmarks as x1,y1,...,x5,y5 (eyes, nose, mouth corners)
        #[arg(short, long, allow_hyphen_values = true)]
        landmarks: String,
        /// Output crop size
        #[arg(long, default_value_t = ALIGNED_SIZE)]
        size: u32,
    },
    /// Align every face of an image into canonical crops
    Align {
        /// Source image
        #[arg(short, long)]
        image: PathBuf,
        /// JSON array of detected faces with landmarks
        #[arg(short, long)]
        faces: PathBuf,
        /// Directory for the aligned crops (default: $FACENORM_OUTPUT_DIR)
        #[arg(short, long)]
        out_dir: Option<PathBuf>,
        /// Output crop size
        #[arg(long, default_value_t = ALIGNED_SIZE)]
        size: u32,
    },
    /// Compare two embeddings
    Compare {
        /// JSON embedding array, or JSON array of faces
        #[arg(long)]
        left: PathBuf,
        /// JSON embedding array, or JSON array of faces
        #[arg(long)]
        right: PathBuf,
        /// cosine_norm, cosine_raw or euclidean (default: $FACENORM_METRIC)
        #[arg(short, long)]
        metric: Option<String>,
        /// Index of the face to compare in each file
        #[arg(long, default_value_t = 0)]
        face_index: usize,
    },
}

fn print_reply(reply: &Reply) -> Result<ExitCode> {
    println!("{}", serde_json::to_string_pretty(&reply.body)?);
    Ok(reply.exit_code())
}

fn run_estimate(landmarks: &str, size: u32) -> Result<ExitCode> {
    let landmarks = input::parse_landmarks(landmarks)?;
    print_reply(&response::estimate(&landmarks, size)?)
}

fn run_align(config: &Config, image: PathBuf, faces: PathBuf, out_dir: Option<PathBuf>, size: u32) -> Result<ExitCode> {
    let out_dir = out_dir.unwrap_or_else(|| config.output_dir.clone());
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("creating {}", out_dir.display()))?;

    let img = image::open(&image)
        .with_context(|| format!("decoding {}", image.display()))?
        .to_rgb8();
    let faces: Vec<DetectedFace> = input::read_json(&faces)?;

    let (indices, landmarks) = response::landmark_jobs(&faces);
    let results = indices.into_iter().zip(norm_crop_batch(&img, &landmarks, size));
    let entries = response::align_entries(faces.len(), results, &out_dir);

    tracing::info!(
        image = %image.display(),
        faces = faces.len(),
        aligned = entries.iter().filter(|e| e.error.is_none()).count(),
        "alignment finished"
    );
    println!("{}", serde_json::to_string_pretty(&entries)?);
    Ok(ExitCode::SUCCESS)
}

fn run_compare(
    config: &Config,
    left: PathBuf,
    right: PathBuf,
    metric: Option<String>,
    face_index: usize,
) -> Result<ExitCode> {
    let left: EmbeddingInput = input::read_json(&left)?;
    let right: EmbeddingInput = input::read_json(&right)?;
    let reply = response::compare_inputs(
        &left,
        &right,
        metric.as_deref(),
        config.default_metric,
        face_index,
    )?;
    print_reply(&reply)
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    if config.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(config.threads)
            .build_global()
            .context("configuring worker threads")?;
    }

    match cli.command {
        Commands::Estimate { landmarks, size } => run_estimate(&landmarks, size),
        Commands::Align {
            image,
            faces,
            out_dir,
            size,
        } => run_align(&config, image, faces, out_dir, size),
        Commands::Compare {
            left,
            right,
            metric,
            face_index,
        } => run_compare(&config, left, right, metric, face_index),
    }
}
