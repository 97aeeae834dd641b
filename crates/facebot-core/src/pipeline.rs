//! Detection + recognition in one place, plus image loading helpers.

use crate::detector::{DetectorError, FaceDetector};
use crate::gallery::{CelebrityGallery, GalleryError};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::{DetectedFace, Embedding};
use image::{DynamicImage, ImageDecoder, ImageError, ImageReader, RgbImage};
use std::io::{BufRead, Cursor, Seek};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
pub const RECOGNIZER_MODEL_FILE: &str = "w600k_r50.onnx";

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("gallery: {0}")]
    Gallery(#[from] GalleryError),
    #[error("image {path}: {source}")]
    Image {
        path: String,
        #[source]
        source: image::ImageError,
    },
}

/// Location of the two ONNX models.
#[derive(Debug, Clone)]
pub struct ModelPaths {
    pub detector: PathBuf,
    pub recognizer: PathBuf,
}

impl ModelPaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            detector: dir.join(DETECTOR_MODEL_FILE),
            recognizer: dir.join(RECOGNIZER_MODEL_FILE),
        }
    }
}

/// `$XDG_DATA_HOME/facebot/models`, or `~/.local/share/facebot/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facebot")
        .join("models")
}

/// Load an image file as 8-bit RGB, upright according to its EXIF orientation.
pub fn load_image(path: &Path) -> Result<RgbImage, PipelineError> {
    let image_err = |source| PipelineError::Image { path: path.display().to_string(), source };
    let reader = ImageReader::open(path)
        .and_then(ImageReader::with_guessed_format)
        .map_err(|e| image_err(ImageError::IoError(e)))?;
    decode_oriented(reader).map_err(image_err)
}

/// Decode an in-memory image (e.g. a downloaded photo) as 8-bit RGB.
///
/// Phone cameras store rotation as an EXIF tag instead of rotating pixels, so
/// the tag is applied here before any detection runs.
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, PipelineError> {
    let image_err = |source| PipelineError::Image { path: "<memory>".to_string(), source };
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| image_err(ImageError::IoError(e)))?;
    decode_oriented(reader).map_err(image_err)
}

fn decode_oriented<R: BufRead + Seek>(reader: ImageReader<R>) -> Result<RgbImage, ImageError> {
    let mut decoder = reader.into_decoder()?;
    let orientation = decoder.orientation()?;
    let mut image = DynamicImage::from_decoder(decoder)?;
    image.apply_orientation(orientation);
    Ok(image.to_rgb8())
}

/// SCRFD detector and ArcFace recognizer loaded together.
pub struct FacePipeline {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl FacePipeline {
    pub fn load(paths: &ModelPaths) -> Result<Self, PipelineError> {
        let detector = FaceDetector::load(&paths.detector)?;
        let recognizer = FaceRecognizer::load(&paths.recognizer)?;
        Ok(Self { detector, recognizer })
    }

    /// Every face in the image with its embedding, most confident first.
    pub fn analyze(&mut self, image: &RgbImage) -> Result<Vec<DetectedFace>, PipelineError> {
        let boxes = self.detector.detect(image)?;
        let mut faces = Vec::with_capacity(boxes.len());
        for bbox in boxes {
            let embedding = self.recognizer.extract(image, &bbox)?;
            faces.push(DetectedFace { bbox, embedding });
        }
        tracing::debug!(
            faces = faces.len(),
            width = image.width(),
            height = image.height(),
            "image analyzed"
        );
        Ok(faces)
    }

    /// Embedding of the most confident face only, `None` if there is no face.
    pub fn encode_first(&mut self, image: &RgbImage) -> Result<Option<Embedding>, PipelineError> {
        let boxes = self.detector.detect(image)?;
        match boxes.first() {
            Some(bbox) => Ok(Some(self.recognizer.extract(image, bbox)?)),
            None => Ok(None),
        }
    }

    /// Scan `dir` and encode one reference image per celebrity.
    pub fn load_celebrities(&mut self, dir: &Path) -> Result<CelebrityGallery, PipelineError> {
        let images = crate::gallery::discover_celebrity_images(dir)?;
        tracing::info!(
            dir = %dir.display(),
            candidates = images.len(),
            "encoding celebrity gallery"
        );
        let encode = |path: &Path| -> Result<Option<Embedding>, PipelineError> {
            let image = load_image(path)?;
            self.encode_first(&image)
        };
        Ok(CelebrityGallery::build(images, encode))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_paths_in_dir() {
        let paths = ModelPaths::in_dir(Path::new("/opt/models"));
        assert_eq!(paths.detector, PathBuf::from("/opt/models/det_10g.onnx"));
        assert_eq!(paths.recognizer, PathBuf::from("/opt/models/w600k_r50.onnx"));
    }

    #[test]
    fn test_default_model_dir_suffix() {
        assert!(default_model_dir().ends_with("facebot/models"));
    }

    #[test]
    fn test_decode_image_rejects_garbage() {
        let err = decode_image(b"definitely not a png").unwrap_err();
        assert!(matches!(err, PipelineError::Image { .. }));
    }

    #[test]
    fn test_decode_image_png() {
        let img = RgbImage::from_pixel(3, 2, image::Rgb([1, 2, 3]));
        let png = crate::render::encode_png(&img).expect("encode");
        let decoded = decode_image(&png).expect("decode");
        assert_eq!(decoded.dimensions(), (3, 2));
        assert_eq!(decoded.get_pixel(0, 0), &image::Rgb([1, 2, 3]));
    }

    /// JPEG with an APP1 EXIF segment carrying only the orientation tag.
    fn jpeg_with_orientation(img: &RgbImage, orientation: u8) -> Vec<u8> {
        let mut jpeg = Vec::new();
        image::codecs::jpeg::JpegEncoder::new(&mut jpeg).encode_image(img).expect("encode jpeg");

        let mut app1 = vec![0xFF, 0xE1, 0x00, 0x22];
        app1.extend_from_slice(b"Exif\0\0");
        app1.extend_from_slice(&[0x4D, 0x4D, 0x00, 0x2A, 0x00, 0x00, 0x00, 0x08]);
        app1.extend_from_slice(&[0x00, 0x01]);
        // Tag 0x0112 (orientation), SHORT, count 1.
        app1.extend_from_slice(&[0x01, 0x12, 0x00, 0x03, 0x00, 0x00, 0x00, 0x01]);
        app1.extend_from_slice(&[0x00, orientation, 0x00, 0x00]);
        app1.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);

        // Right after SOI.
        jpeg.splice(2..2, app1);
        jpeg
    }

    #[test]
    fn test_decode_image_applies_exif_rotation() {
        let img = RgbImage::from_pixel(8, 4, image::Rgb([200, 10, 10]));
        let decoded = decode_image(&jpeg_with_orientation(&img, 6)).expect("decode");
        assert_eq!(decoded.dimensions(), (4, 8));
    }

    #[test]
    fn test_decode_image_without_rotation_keeps_shape() {
        let img = RgbImage::from_pixel(8, 4, image::Rgb([200, 10, 10]));
        let decoded = decode_image(&jpeg_with_orientation(&img, 1)).expect("decode");
        assert_eq!(decoded.dimensions(), (8, 4));
    }

    #[test]
    fn test_load_missing_models() {
        let err = FacePipeline::load(&ModelPaths::in_dir(Path::new("/nonexistent")))
            .err()
            .expect("missing models");
        assert!(matches!(err, PipelineError::Detector(DetectorError::ModelNotFound(_))));
    }
}
