//! facebot-core: face detection, recognition and the galleries behind the bot.
//!
//! SCRFD finds faces and ArcFace turns them into embeddings, both through ONNX
//! Runtime on the CPU. Galleries are plain in-memory lists scanned linearly.

pub mod alignment;
pub mod config;
pub mod detector;
pub mod gallery;
pub mod pipeline;
pub mod projection;
pub mod recognizer;
pub mod render;
pub mod types;

pub use config::Config;
pub use detector::FaceDetector;
pub use gallery::{Celebrity, CelebrityGallery, KnownFace, KnownFaces};
pub use pipeline::{default_model_dir, FacePipeline, ModelPaths, PipelineError};
pub use projection::{project_2d, ProjectionParams};
pub use recognizer::FaceRecognizer;
pub use types::{BoundingBox, DetectedFace, Embedding, EuclideanMatcher, Labeled, Matcher, Nearest};
