//! In-memory face galleries.
//!
//! `KnownFaces` is the user-built list of named faces; it only grows until
//! cleared. `CelebrityGallery` is built once at startup from a directory tree
//! with one sub-directory per celebrity.

use crate::types::{nearest, Embedding, Labeled, Matcher, Nearest};
use image::RgbImage;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use thiserror::Error;

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("face name must not be empty")]
    EmptyName,
    #[error("no celebrity encodings found in {0}")]
    NoEncodings(String),
    #[error("reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// A named face added by a user.
#[derive(Debug, Clone)]
pub struct KnownFace {
    pub name: String,
    pub embedding: Embedding,
    /// Crop of the face as it was enrolled.
    pub thumbnail: RgbImage,
}

impl Labeled for KnownFace {
    fn label(&self) -> &str {
        &self.name
    }
    fn embedding(&self) -> &Embedding {
        &self.embedding
    }
}

/// Unbounded list of user-named faces. Duplicate names are kept as separate entries.
#[derive(Debug, Default, Clone)]
pub struct KnownFaces {
    faces: Vec<KnownFace>,
}

impl KnownFaces {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a face under `name` (trimmed). Returns the new gallery size.
    pub fn add(
        &mut self,
        name: &str,
        embedding: Embedding,
        thumbnail: RgbImage,
    ) -> Result<usize, GalleryError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(GalleryError::EmptyName);
        }
        self.faces.push(KnownFace { name: name.to_string(), embedding, thumbnail });
        tracing::info!(name, total = self.faces.len(), "known face added");
        Ok(self.faces.len())
    }

    pub fn len(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.faces.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn entries(&self) -> &[KnownFace] {
        &self.faces
    }

    /// Drop every known face. Returns how many were removed.
    pub fn clear(&mut self) -> usize {
        let removed = self.faces.len();
        self.faces.clear();
        tracing::info!(removed, "known faces cleared");
        removed
    }

    pub fn identify<M: Matcher>(
        &self,
        probe: &Embedding,
        matcher: &M,
    ) -> Option<Nearest<'_, KnownFace>> {
        matcher.identify(probe, &self.faces)
    }
}

/// A celebrity reference image found on disk, not yet encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CelebrityImage {
    pub name: String,
    pub path: PathBuf,
}

/// One encoded celebrity.
#[derive(Debug, Clone)]
pub struct Celebrity {
    pub name: String,
    pub image_path: PathBuf,
    pub embedding: Embedding,
}

impl Labeled for Celebrity {
    fn label(&self) -> &str {
        &self.name
    }
    fn embedding(&self) -> &Embedding {
        &self.embedding
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.iter().any(|ext| e.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, GalleryError> {
    let io_err = |source: std::io::Error| GalleryError::Io {
        path: dir.display().to_string(),
        source,
    };
    let mut paths = std::fs::read_dir(dir)
        .map_err(io_err)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(io_err)?;
    paths.sort();
    Ok(paths)
}

/// List one reference image per celebrity under `dir`.
///
/// Each sub-directory is a celebrity named after the directory. Only its first
/// image file (sorted by name) is taken, whether or not it later yields a face.
pub fn discover_celebrity_images(dir: &Path) -> Result<Vec<CelebrityImage>, GalleryError> {
    let mut found = Vec::new();

    for celeb_dir in sorted_entries(dir)? {
        if !celeb_dir.is_dir() {
            continue;
        }
        let Some(name) = celeb_dir.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            continue;
        };

        let first = sorted_entries(&celeb_dir)?
            .into_iter()
            .find(|p| p.is_file() && has_image_extension(p));
        match first {
            Some(path) => found.push(CelebrityImage { name, path }),
            None => tracing::debug!(celebrity = %name, "no reference image"),
        }
    }

    Ok(found)
}

/// Celebrity encodings loaded at startup.
#[derive(Debug, Default, Clone)]
pub struct CelebrityGallery {
    celebrities: Vec<Celebrity>,
}

impl CelebrityGallery {
    /// Encode each image with `encode`. Failures are logged and skipped, as are
    /// images without a face.
    pub fn build<F, E>(images: Vec<CelebrityImage>, mut encode: F) -> Self
    where
        F: FnMut(&Path) -> Result<Option<Embedding>, E>,
        E: Display,
    {
        let mut celebrities = Vec::with_capacity(images.len());
        for CelebrityImage { name, path } in images {
            match encode(&path) {
                Ok(Some(embedding)) => {
                    celebrities.push(Celebrity { name, image_path: path, embedding })
                }
                Ok(None) => tracing::debug!(
                    celebrity = %name,
                    path = %path.display(),
                    "no face in reference image"
                ),
                Err(e) => tracing::warn!(
                    celebrity = %name,
                    path = %path.display(),
                    error = %e,
                    "failed to encode reference image"
                ),
            }
        }
        tracing::info!(count = celebrities.len(), "celebrity gallery ready");
        Self { celebrities }
    }

    /// Like [`build`](Self::build) but an empty result is an error.
    pub fn build_non_empty<F, E>(
        dir: &Path,
        images: Vec<CelebrityImage>,
        encode: F,
    ) -> Result<Self, GalleryError>
    where
        F: FnMut(&Path) -> Result<Option<Embedding>, E>,
        E: Display,
    {
        let gallery = Self::build(images, encode);
        if gallery.is_empty() {
            return Err(GalleryError::NoEncodings(dir.display().to_string()));
        }
        Ok(gallery)
    }

    pub fn len(&self) -> usize {
        self.celebrities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.celebrities.is_empty()
    }

    pub fn entries(&self) -> &[Celebrity] {
        &self.celebrities
    }

    /// Closest celebrity, however far away.
    pub fn nearest(&self, probe: &Embedding) -> Option<Nearest<'_, Celebrity>> {
        nearest(probe, &self.celebrities)
    }
}
