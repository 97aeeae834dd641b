use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use facebot_core::gallery::discover_celebrity_images;
use facebot_core::pipeline::load_image;
use facebot_core::render::{self, Labels, PlotPoint, PlotStyle};
use facebot_core::{
    project_2d, CelebrityGallery, Config, Embedding, FacePipeline, Labeled, ModelPaths,
    PipelineError,
};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "facebot", about = "facebot offline tools")]
struct Cli {
    /// Directory holding det_10g.onnx and w600k_r50.onnx
    #[arg(long, global = true, env = "FACEBOT_MODEL_DIR")]
    model_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Which of two photos looks more like a reference photo
    Compare {
        reference: PathBuf,
        a: PathBuf,
        b: PathBuf,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Draw a t-SNE map of the celebrity gallery
    Plot {
        #[arg(long, env = "FACEBOT_CELEBS_DIR")]
        celebs_dir: Option<PathBuf>,
        #[arg(short, long, default_value = "tsne.png")]
        output: PathBuf,
        #[arg(long)]
        perplexity: Option<f32>,
        #[arg(long)]
        epochs: Option<usize>,
    },
    /// Print the effective configuration (token masked)
    Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum Side {
    A,
    B,
}

#[derive(Debug, Serialize)]
struct Comparison {
    reference: PathBuf,
    a: PathBuf,
    b: PathBuf,
    likeness_a: f32,
    likeness_b: f32,
    more_similar: Side,
}

impl Comparison {
    fn new(reference: PathBuf, a: PathBuf, b: PathBuf, likeness_a: f32, likeness_b: f32) -> Self {
        // Ties go to b.
        let more_similar = if likeness_a > likeness_b { Side::A } else { Side::B };
        Self { reference, a, b, likeness_a, likeness_b, more_similar }
    }

    fn winner(&self) -> &Path {
        match self.more_similar {
            Side::A => &self.a,
            Side::B => &self.b,
        }
    }

    fn report(&self) -> String {
        format!(
            "likeness(reference, a) = {:.4}\n\
             likeness(reference, b) = {:.4}\n\
             {} is more similar to {}",
            self.likeness_a,
            self.likeness_b,
            self.winner().display(),
            self.reference.display()
        )
    }
}

fn main() -> Result<()> {
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = dotenv {
        if !e.not_found() {
            tracing::warn!(error = %e, "ignoring unreadable .env");
        }
    }

    let cli = Cli::parse();
    let mut config = Config::from_env();
    if let Some(dir) = cli.model_dir {
        config.model_dir = dir;
    }

    match cli.command {
        Commands::Compare { reference, a, b, json } => {
            let mut pipeline = load_pipeline(&config.model_paths())?;
            let reference_emb = encode_one(&mut pipeline, &reference)?;
            let a_emb = encode_one(&mut pipeline, &a)?;
            let b_emb = encode_one(&mut pipeline, &b)?;

            let cmp = Comparison::new(
                reference,
                a,
                b,
                reference_emb.likeness(&a_emb),
                reference_emb.likeness(&b_emb),
            );
            if json {
                println!("{}", serde_json::to_string_pretty(&cmp)?);
            } else {
                println!("{}", cmp.report());
            }
        }
        Commands::Plot { celebs_dir, output, perplexity, epochs } => {
            if let Some(dir) = celebs_dir {
                config.celebs_dir = dir;
            }
            if let Some(p) = perplexity {
                config.tsne_perplexity = p;
            }
            if let Some(e) = epochs {
                config.tsne_epochs = e;
            }
            plot_celebrities(&config, &output)?;
            println!("Wrote {}", output.display());
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

fn load_pipeline(paths: &ModelPaths) -> Result<FacePipeline> {
    FacePipeline::load(paths).with_context(|| {
        format!(
            "loading models from {} and {}",
            paths.detector.display(),
            paths.recognizer.display()
        )
    })
}

fn encode_one(pipeline: &mut FacePipeline, path: &Path) -> Result<Embedding> {
    let image = load_image(path)?;
    match pipeline.encode_first(&image)? {
        Some(embedding) => Ok(embedding),
        None => bail!("no face found in {}", path.display()),
    }
}

fn plot_celebrities(config: &Config, output: &Path) -> Result<()> {
    let mut pipeline = load_pipeline(&config.model_paths())?;
    let images = discover_celebrity_images(&config.celebs_dir)?;
    let encode = |path: &Path| -> Result<Option<Embedding>, PipelineError> {
        let image = load_image(path)?;
        pipeline.encode_first(&image)
    };
    let gallery = CelebrityGallery::build_non_empty(&config.celebs_dir, images, encode)?;

    let params = config.projection();
    let embeddings: Vec<&Embedding> = gallery.entries().iter().map(|c| c.embedding()).collect();
    tracing::debug!(
        points = embeddings.len(),
        dim = embeddings.first().map(|e| e.dim()).unwrap_or(0),
        perplexity = params.effective_perplexity(embeddings.len()),
        epochs = params.epochs,
        "running t-SNE"
    );
    let coords = project_2d(&embeddings, &params)?;
    tracing::debug!(?coords, "t-SNE done");

    let style = PlotStyle::default();
    let points: Vec<PlotPoint> = gallery
        .entries()
        .iter()
        .zip(coords)
        .map(|(celeb, (x, y))| PlotPoint {
            x,
            y,
            label: celeb.name.clone(),
            thumbnail: load_image(&celeb.image_path)
                .map(|img| render::square_thumbnail(&img, style.thumb_size))
                .map_err(|error| {
                    tracing::warn!(celebrity = %celeb.name, %error, "thumbnail unavailable")
                })
                .ok(),
        })
        .collect();

    let labels = Labels::load(&config.font_path);
    let png = render::encode_png(&render::plot_embeddings(&points, &style, &labels))?;
    std::fs::write(output, png).with_context(|| format!("writing {}", output.display()))?;
    tracing::info!(output = %output.display(), celebrities = points.len(), "plot written");
    Ok(())
}
