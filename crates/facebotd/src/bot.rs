//! Telegram glue: turns updates into dialogue events and results into replies.

use crate::actions::{self, VisualizeError, THUMB_SIZE};
use crate::dialogue::{self, Dialogue, PendingFace, PhotoAction, TextReply};
use crate::engine::{EngineError, EngineHandle};
use facebot_core::gallery::{CelebrityGallery, GalleryError, KnownFaces};
use facebot_core::projection::ProjectionError;
use facebot_core::render::{self, Labels, RenderError};
use facebot_core::{Config, EuclideanMatcher, PipelineError};
use image::RgbImage;
use std::collections::HashMap;
use std::sync::Arc;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{ChatAction, FileId, InputFile, KeyboardButton, KeyboardMarkup};
use thiserror::Error;
use tokio::sync::Mutex;

const SORRY: &str = "Sorry, something went wrong with that photo. Please try again.";
const NOT_A_PHOTO: &str = "Send a photo, or choose an option.";

#[derive(Error, Debug)]
pub enum BotError {
    #[error("telegram: {0}")]
    Request(#[from] teloxide::RequestError),
    #[error("download: {0}")]
    Download(#[from] teloxide::DownloadError),
    #[error("engine: {0}")]
    Engine(#[from] EngineError),
    #[error("pipeline: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("gallery: {0}")]
    Gallery(#[from] GalleryError),
    #[error("render: {0}")]
    Render(#[from] RenderError),
    #[error("visualize: {0}")]
    Visualize(#[from] VisualizeError),
    #[error("blocking task: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Shared bot state. Everything lives for the life of the process.
pub struct App {
    config: Config,
    engine: EngineHandle,
    matcher: EuclideanMatcher,
    sessions: Mutex<HashMap<ChatId, Dialogue>>,
    known: Mutex<KnownFaces>,
    celebrities: Arc<CelebrityGallery>,
    celeb_thumbs: Arc<Vec<Option<RgbImage>>>,
    labels: Arc<Labels>,
}

impl App {
    pub fn new(
        config: Config,
        engine: EngineHandle,
        celebrities: Arc<CelebrityGallery>,
        celeb_thumbs: Vec<Option<RgbImage>>,
        labels: Labels,
    ) -> Self {
        Self {
            matcher: EuclideanMatcher { max_distance: config.match_distance },
            config,
            engine,
            sessions: Mutex::new(HashMap::new()),
            known: Mutex::new(KnownFaces::new()),
            celebrities,
            celeb_thumbs: Arc::new(celeb_thumbs),
            labels: Arc::new(labels),
        }
    }
}

fn menu_keyboard() -> KeyboardMarkup {
    let rows = dialogue::MENU_ROWS.iter().map(|row| {
        row.iter()
            .map(|label| KeyboardButton::new(*label))
            .collect::<Vec<_>>()
    });
    KeyboardMarkup::new(rows).resize_keyboard()
}

/// Run the long-polling dispatcher until Ctrl-C.
pub async fn run(bot: Bot, app: Arc<App>) {
    let handler = Update::filter_message().endpoint(handle_message);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![app])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

async fn handle_message(bot: Bot, msg: Message, app: Arc<App>) -> ResponseResult<()> {
    let chat = msg.chat.id;
    if let Err(error) = route(&bot, &msg, &app).await {
        tracing::error!(chat = chat.0, %error, "message handling failed");
        bot.send_message(chat, SORRY).await?;
    }
    Ok(())
}

async fn route(bot: &Bot, msg: &Message, app: &App) -> Result<(), BotError> {
    let chat = msg.chat.id;
    if let Some(text) = msg.text() {
        return on_text(bot, chat, text, app).await;
    }
    if let Some(file_id) = image_file_id(msg) {
        return on_photo(bot, chat, file_id, app).await;
    }
    bot.send_message(chat, NOT_A_PHOTO)
        .reply_markup(menu_keyboard())
        .await?;
    Ok(())
}

/// Largest photo size, or a document sent with an `image/*` MIME type.
fn image_file_id(msg: &Message) -> Option<FileId> {
    if let Some(sizes) = msg.photo() {
        return sizes
            .iter()
            .max_by_key(|p| u64::from(p.width) * u64::from(p.height))
            .map(|p| p.file.id.clone());
    }
    msg.document()
        .filter(|doc| {
            doc.mime_type
                .as_ref()
                .is_some_and(|m| m.essence_str().starts_with("image/"))
        })
        .map(|doc| doc.file.id.clone())
}

async fn on_text(bot: &Bot, chat: ChatId, text: &str, app: &App) -> Result<(), BotError> {
    let reply = app.sessions.lock().await.entry(chat).or_default().on_text(text);

    match reply {
        TextReply::Menu(text) => {
            bot.send_message(chat, text)
                .reply_markup(menu_keyboard())
                .await?;
        }
        TextReply::Prompt(text) => {
            bot.send_message(chat, text).await?;
        }
        TextReply::ListFaces => {
            let names = app.known.lock().await.names().join(", ");
            let text = if names.is_empty() {
                "I don't know anyone yet.".to_string()
            } else {
                format!("Known faces: {names}")
            };
            bot.send_message(chat, text).await?;
        }
        TextReply::ClearFaces => {
            let removed = app.known.lock().await.clear();
            bot.send_message(chat, format!("Forgot {removed} face(s)."))
                .reply_markup(menu_keyboard())
                .await?;
        }
        TextReply::SaveFace { name, face } => {
            let total = app
                .known
                .lock()
                .await
                .add(&name, face.embedding, face.thumbnail)?;
            bot.send_message(chat, format!("Saved {name}. I now know {total} face(s)."))
                .reply_markup(menu_keyboard())
                .await?;
        }
    }
    Ok(())
}

async fn download_image(bot: &Bot, file_id: FileId) -> Result<RgbImage, BotError> {
    let file = bot.get_file(file_id).await?;
    let mut buf = Vec::with_capacity(file.size as usize);
    bot.download_file(&file.path, &mut buf).await?;
    tracing::debug!(bytes = buf.len(), "photo downloaded");
    Ok(facebot_core::pipeline::decode_image(&buf)?)
}

async fn on_photo(bot: &Bot, chat: ChatId, file_id: FileId, app: &App) -> Result<(), BotError> {
    let armed = app.sessions.lock().await.entry(chat).or_default().on_photo();
    let Some(armed) = armed else {
        bot.send_message(chat, dialogue::CHOOSE_FIRST)
            .reply_markup(menu_keyboard())
            .await?;
        return Ok(());
    };
    let action = armed.action;

    bot.send_chat_action(chat, ChatAction::Typing).await?;
    let photo = download_image(bot, file_id).await?;
    let faces = app.engine.analyze(photo.clone()).await?;
    tracing::info!(chat = chat.0, ?action, faces = faces.len(), "photo analyzed");

    if faces.is_empty() {
        let text = app.sessions.lock().await.entry(chat).or_default().no_face(armed);
        bot.send_message(chat, text).await?;
        return Ok(());
    }

    match action {
        PhotoAction::AddFace => {
            let face = &faces[0];
            let pending = PendingFace {
                embedding: face.embedding.clone(),
                thumbnail: render::crop_thumbnail(&photo, &face.bbox, THUMB_SIZE),
            };
            let captured = app
                .sessions
                .lock()
                .await
                .entry(chat)
                .or_default()
                .face_captured(armed, pending);
            if captured {
                let text = if faces.len() > 1 {
                    format!(
                        "I see {} faces and took the most prominent one.\n{}",
                        faces.len(),
                        dialogue::ASK_NAME
                    )
                } else {
                    dialogue::ASK_NAME.to_string()
                };
                bot.send_message(chat, text).await?;
            }
            return Ok(());
        }
        PhotoAction::Recognize => {
            let known = app.known.lock().await.clone();
            let matcher = app.matcher;
            let labels = Arc::clone(&app.labels);
            let rendered = tokio::task::spawn_blocking(move || {
                actions::recognize(&photo, &faces, &known, &matcher, &labels)
            })
            .await??;
            send_png(bot, chat, rendered.png, "recognized.png", rendered.caption).await?;
        }
        PhotoAction::Lookalike => {
            let celebrities = Arc::clone(&app.celebrities);
            let labels = Arc::clone(&app.labels);
            let result = tokio::task::spawn_blocking(move || {
                actions::lookalike(&photo, &faces, &celebrities, &labels)
            })
            .await??;
            let rendered = result.rendered;
            send_png(bot, chat, rendered.png, "lookalike.png", rendered.caption).await?;
            if let Some(best) = result.best {
                let caption = format!(
                    "Your closest celebrity: {} (likeness {:.2})",
                    best.name, best.likeness
                );
                bot.send_photo(chat, InputFile::file(&best.image_path))
                    .caption(caption)
                    .await?;
            }
        }
        PhotoAction::Visualize => {
            let known = app.known.lock().await.clone();
            let celebrities = Arc::clone(&app.celebrities);
            let thumbs = Arc::clone(&app.celeb_thumbs);
            let labels = Arc::clone(&app.labels);
            let params = app.config.projection();
            let result = tokio::task::spawn_blocking(move || {
                actions::visualize(&photo, &faces, &known, &celebrities, &thumbs, &params, &labels)
            })
            .await?;
            match result {
                Ok(rendered) => {
                    send_png(bot, chat, rendered.png, "faces_tsne.png", rendered.caption).await?
                }
                Err(VisualizeError::Projection(ProjectionError::TooFewPoints(n))) => {
                    let text = format!(
                        "I need at least {} faces in total to draw a map, but only have {n}. \
                         Add some faces first.",
                        facebot_core::projection::MIN_POINTS
                    );
                    bot.send_message(chat, text).await?;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    app.sessions.lock().await.entry(chat).or_default().complete(armed);
    bot.send_message(chat, dialogue::CHOOSE_OPTION)
        .reply_markup(menu_keyboard())
        .await?;
    Ok(())
}

async fn send_png(
    bot: &Bot,
    chat: ChatId,
    png: Vec<u8>,
    file_name: &str,
    caption: String,
) -> Result<(), BotError> {
    bot.send_photo(chat, InputFile::memory(png).file_name(file_name.to_string()))
        .caption(caption)
        .await?;
    Ok(())
}
