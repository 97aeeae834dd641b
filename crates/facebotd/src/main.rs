use anyhow::{Context, Result};
use facebot_core::render::Labels;
use facebot_core::{CelebrityGallery, Config};
use std::sync::Arc;
use teloxide::Bot;
use tracing_subscriber::EnvFilter;

mod actions;
mod bot;
mod dialogue;
mod engine;

#[tokio::main]
async fn main() -> Result<()> {
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    match dotenv {
        Ok(path) => tracing::info!(path = %path.display(), "loaded .env"),
        Err(e) if e.not_found() => tracing::debug!("no .env file"),
        Err(e) => tracing::warn!(error = %e, "ignoring unreadable .env"),
    }

    let config = Config::from_env();
    tracing::info!(?config, "facebotd starting");
    let token = config.require_token()?.to_string();

    let engine = engine::spawn_engine(&config.model_paths())
        .context("starting vision engine")?;

    let celebrities = match engine.load_celebrities(config.celebs_dir.clone()).await {
        Ok(gallery) => gallery,
        Err(error) => {
            tracing::warn!(
                dir = %config.celebs_dir.display(),
                %error,
                "celebrity gallery unavailable; lookalike will be disabled"
            );
            CelebrityGallery::default()
        }
    };
    if celebrities.is_empty() {
        tracing::warn!(dir = %config.celebs_dir.display(), "no celebrity encodings loaded");
    }

    let celebrities = Arc::new(celebrities);
    let celeb_thumbs = actions::load_celebrity_thumbnails(Arc::clone(&celebrities))
        .await
        .context("building celebrity thumbnails")?;

    let labels = Labels::load(&config.font_path);
    let app = Arc::new(bot::App::new(config, engine, celebrities, celeb_thumbs, labels));

    tracing::info!("facebotd ready, polling for updates");
    bot::run(Bot::new(token), app).await;
    tracing::info!("facebotd shutting down");

    Ok(())
}
