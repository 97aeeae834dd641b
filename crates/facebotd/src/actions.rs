//! What each photo action produces, independent of the chat transport.

use facebot_core::gallery::{Celebrity, CelebrityGallery, KnownFaces};
use facebot_core::projection::{project_2d, ProjectionError, ProjectionParams};
use facebot_core::render::{self, Annotation, Labels, PlotPoint, PlotStyle, RenderError};
use facebot_core::{DetectedFace, Embedding, EuclideanMatcher, Labeled};
use image::RgbImage;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinError;

pub const THUMB_SIZE: u32 = 40;
const UNKNOWN_LABEL: &str = "Unknown";

#[derive(Error, Debug)]
pub enum VisualizeError {
    #[error("projection: {0}")]
    Projection(#[from] ProjectionError),
    #[error("render: {0}")]
    Render(#[from] RenderError),
}

/// A rendered image ready to send.
#[derive(Debug)]
pub struct Rendered {
    pub png: Vec<u8>,
    pub caption: String,
}

/// Best celebrity match over all faces in a photo.
#[derive(Debug, Clone)]
pub struct BestLookalike {
    pub name: String,
    pub image_path: PathBuf,
    pub likeness: f32,
}

#[derive(Debug)]
pub struct LookalikeResult {
    pub rendered: Rendered,
    pub best: Option<BestLookalike>,
}

/// Reference thumbnails of the celebrities, in gallery order.
pub fn celebrity_thumbnails(gallery: &CelebrityGallery) -> Vec<Option<RgbImage>> {
    gallery
        .entries()
        .iter()
        .map(|c| match facebot_core::pipeline::load_image(&c.image_path) {
            Ok(img) => Some(render::square_thumbnail(&img, THUMB_SIZE)),
            Err(error) => {
                tracing::warn!(celebrity = %c.name, %error, "thumbnail unavailable");
                None
            }
        })
        .collect()
}

/// [`celebrity_thumbnails`] on the blocking pool, since it decodes every reference image.
pub async fn load_celebrity_thumbnails(
    gallery: Arc<CelebrityGallery>,
) -> Result<Vec<Option<RgbImage>>, JoinError> {
    tokio::task::spawn_blocking(move || celebrity_thumbnails(&gallery)).await
}

/// Mark every face with the nearest known name within the match distance.
pub fn recognize(
    photo: &RgbImage,
    faces: &[DetectedFace],
    known: &KnownFaces,
    matcher: &EuclideanMatcher,
    labels: &Labels,
) -> Result<Rendered, RenderError> {
    let mut annotations = Vec::with_capacity(faces.len());
    let mut names = Vec::with_capacity(faces.len());

    for face in faces {
        let (label, is_known) = match known.identify(&face.embedding, matcher) {
            Some(hit) => (format!("{} ({:.2})", hit.entry.name, hit.likeness()), true),
            None => (UNKNOWN_LABEL.to_string(), false),
        };
        names.push(label.clone());
        annotations.push(Annotation {
            bbox: face.bbox.clone(),
            label,
            known: is_known,
        });
    }

    let mut caption = format!("Found {} face(s): {}", faces.len(), names.join(", "));
    if known.is_empty() {
        caption.push_str("\nNo known faces yet. Use \"Add face\" to teach me some.");
    }

    let annotated = render::annotate_faces(photo, &annotations, labels);
    Ok(Rendered { png: render::encode_png(&annotated)?, caption })
}

/// Mark every face with its closest celebrity.
pub fn lookalike(
    photo: &RgbImage,
    faces: &[DetectedFace],
    celebrities: &CelebrityGallery,
    labels: &Labels,
) -> Result<LookalikeResult, RenderError> {
    let mut annotations = Vec::with_capacity(faces.len());
    let mut lines = Vec::with_capacity(faces.len());
    let mut best: Option<BestLookalike> = None;

    for (i, face) in faces.iter().enumerate() {
        let Some(hit) = celebrities.nearest(&face.embedding) else {
            annotations.push(Annotation {
                bbox: face.bbox.clone(),
                label: String::new(),
                known: false,
            });
            continue;
        };
        let celeb: &Celebrity = hit.entry;
        let likeness = hit.likeness();
        lines.push(format!("Face #{}: {} ({likeness:.2})", i + 1, celeb.name));
        annotations.push(Annotation {
            bbox: face.bbox.clone(),
            label: format!("{} ({likeness:.2})", celeb.name),
            known: true,
        });
        if best.as_ref().map_or(true, |b| likeness > b.likeness) {
            best = Some(BestLookalike {
                name: celeb.name.clone(),
                image_path: celeb.image_path.clone(),
                likeness,
            });
        }
    }

    let caption = if celebrities.is_empty() {
        "No celebrity gallery is loaded, so I can't compare.".to_string()
    } else {
        lines.join("\n")
    };

    let annotated = render::annotate_faces(photo, &annotations, labels);
    Ok(LookalikeResult {
        rendered: Rendered { png: render::encode_png(&annotated)?, caption },
        best,
    })
}

/// t-SNE map of the photo's faces next to the known and celebrity faces.
#[allow(clippy::too_many_arguments)]
pub fn visualize(
    photo: &RgbImage,
    faces: &[DetectedFace],
    known: &KnownFaces,
    celebrities: &CelebrityGallery,
    celeb_thumbs: &[Option<RgbImage>],
    params: &ProjectionParams,
    labels: &Labels,
) -> Result<Rendered, VisualizeError> {
    let mut embeddings: Vec<&Embedding> = Vec::new();
    let mut meta: Vec<(String, Option<RgbImage>)> = Vec::new();

    for (i, face) in faces.iter().enumerate() {
        embeddings.push(&face.embedding);
        let thumbnail = render::crop_thumbnail(photo, &face.bbox, THUMB_SIZE);
        meta.push((format!("You #{}", i + 1), Some(thumbnail)));
    }
    for k in known.entries() {
        embeddings.push(k.embedding());
        meta.push((k.name.clone(), Some(k.thumbnail.clone())));
    }
    for (i, c) in celebrities.entries().iter().enumerate() {
        embeddings.push(c.embedding());
        meta.push((c.name.clone(), celeb_thumbs.get(i).cloned().flatten()));
    }

    let coords = project_2d(&embeddings, params)?;
    let points: Vec<PlotPoint> = coords
        .into_iter()
        .zip(meta)
        .map(|((x, y), (label, thumbnail))| PlotPoint { x, y, label, thumbnail })
        .collect();

    let style = PlotStyle {
        title: "t-SNE of your faces".to_string(),
        ..PlotStyle::default()
    };
    let plot = render::plot_embeddings(&points, &style, labels);

    let caption = format!(
        "{} face(s) from your photo, {} known, {} celebrities",
        faces.len(),
        known.len(),
        celebrities.len()
    );
    Ok(Rendered { png: render::encode_png(&plot)?, caption })
}
