//! Annotated photos and embedding scatter plots.

use crate::types::BoundingBox;
use ab_glyph::{FontVec, PxScale};
use image::imageops::{self, FilterType};
use image::{ImageFormat, Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size,
};
use imageproc::rect::Rect;
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;

const KNOWN_COLOR: Rgb<u8> = Rgb([0, 200, 0]);
const UNKNOWN_COLOR: Rgb<u8> = Rgb([220, 0, 0]);
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const PLOT_BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const PLOT_INK: Rgb<u8> = Rgb([0, 0, 0]);
const BOX_THICKNESS: i32 = 2;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("font {0}: invalid font data")]
    InvalidFont(String),
    #[error("encode: {0}")]
    Encode(#[from] image::ImageError),
}

/// Font used for text on rendered images. Without a font, text is skipped.
#[derive(Default)]
pub struct Labels {
    font: Option<FontVec>,
}

impl Labels {
    pub fn none() -> Self {
        Self { font: None }
    }

    pub fn from_bytes(name: &str, bytes: Vec<u8>) -> Result<Self, RenderError> {
        let font = FontVec::try_from_vec(bytes)
            .map_err(|_| RenderError::InvalidFont(name.to_string()))?;
        Ok(Self { font: Some(font) })
    }

    /// Load a TrueType font; on failure log and fall back to unlabelled output.
    pub fn load(path: &Path) -> Self {
        let name = path.display().to_string();
        let loaded = std::fs::read(path)
            .map_err(|e| e.to_string())
            .and_then(|bytes| Self::from_bytes(&name, bytes).map_err(|e| e.to_string()));
        match loaded {
            Ok(labels) => {
                tracing::info!(path = %path.display(), "label font loaded");
                labels
            }
            Err(error) => {
                tracing::warn!(
                    path = %path.display(),
                    %error,
                    "label font unavailable; images will have no text"
                );
                Self::none()
            }
        }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    fn measure(&self, scale: f32, text: &str) -> (u32, u32) {
        match &self.font {
            Some(font) => text_size(PxScale::from(scale), font, text),
            None => (0, 0),
        }
    }

    fn draw(&self, canvas: &mut RgbImage, color: Rgb<u8>, x: i32, y: i32, scale: f32, text: &str) {
        if let Some(font) = &self.font {
            draw_text_mut(canvas, color, x, y, PxScale::from(scale), font, text);
        }
    }
}

/// One face box to draw on a photo.
#[derive(Debug, Clone)]
pub struct Annotation {
    pub bbox: BoundingBox,
    pub label: String,
    pub known: bool,
}

/// Draw a box and label for every annotation on a copy of `image`.
pub fn annotate_faces(image: &RgbImage, annotations: &[Annotation], labels: &Labels) -> RgbImage {
    let mut canvas = image.clone();
    let text_scale = (image.height().max(image.width()) as f32 / 40.0).clamp(14.0, 48.0);

    for ann in annotations {
        let Some((x, y, w, h)) = ann.bbox.to_pixel_rect(image.width(), image.height()) else {
            continue;
        };
        let color = if ann.known { KNOWN_COLOR } else { UNKNOWN_COLOR };

        for t in 0..BOX_THICKNESS {
            let (tw, th) = (w as i32 - 2 * t, h as i32 - 2 * t);
            if tw <= 0 || th <= 0 {
                break;
            }
            let rect = Rect::at(x as i32 + t, y as i32 + t).of_size(tw as u32, th as u32);
            draw_hollow_rect_mut(&mut canvas, rect, color);
        }

        if labels.has_font() && !ann.label.is_empty() {
            let (tw, th) = labels.measure(text_scale, &ann.label);
            let pad = 2;
            // Above the box when there is room, otherwise inside its top edge.
            let ty = if y as i32 >= th as i32 + 2 * pad {
                y as i32 - th as i32 - 2 * pad
            } else {
                y as i32
            };
            let background =
                Rect::at(x as i32, ty).of_size(tw + 2 * pad as u32, th + 2 * pad as u32);
            draw_filled_rect_mut(&mut canvas, background, color);
            labels.draw(&mut canvas, TEXT_COLOR, x as i32 + pad, ty + pad, text_scale, &ann.label);
        }
    }

    canvas
}

/// Square thumbnail of the face region, clamped to the image.
pub fn crop_thumbnail(image: &RgbImage, bbox: &BoundingBox, size: u32) -> RgbImage {
    match bbox.to_pixel_rect(image.width(), image.height()) {
        Some((x, y, w, h)) => {
            let crop = imageops::crop_imm(image, x, y, w, h).to_image();
            imageops::resize(&crop, size, size, FilterType::Triangle)
        }
        None => imageops::resize(image, size, size, FilterType::Triangle),
    }
}

/// Center square crop of the whole image, resized to `size`.
pub fn square_thumbnail(image: &RgbImage, size: u32) -> RgbImage {
    let side = image.width().min(image.height());
    let x = (image.width() - side) / 2;
    let y = (image.height() - side) / 2;
    let crop = imageops::crop_imm(image, x, y, side, side).to_image();
    imageops::resize(&crop, size, size, FilterType::Triangle)
}

/// One point of a scatter plot.
#[derive(Debug, Clone)]
pub struct PlotPoint {
    pub x: f32,
    pub y: f32,
    pub label: String,
    pub thumbnail: Option<RgbImage>,
}

#[derive(Debug, Clone)]
pub struct PlotStyle {
    pub width: u32,
    pub height: u32,
    pub thumb_size: u32,
    /// Fraction of each side left empty around the data.
    pub margin: f32,
    pub title: String,
}

impl Default for PlotStyle {
    fn default() -> Self {
        Self {
            width: 1000,
            height: 1000,
            thumb_size: 40,
            margin: 0.1,
            title: "t-SNE of Celeb Faces".to_string(),
        }
    }
}

/// Maps data coordinates onto canvas pixels, y pointing up.
struct Viewport {
    min: (f32, f32),
    span: (f32, f32),
    origin: (f32, f32),
    extent: (f32, f32),
}

impl Viewport {
    fn fit(points: &[PlotPoint], style: &PlotStyle) -> Self {
        let (mut min_x, mut min_y) = (f32::INFINITY, f32::INFINITY);
        let (mut max_x, mut max_y) = (f32::NEG_INFINITY, f32::NEG_INFINITY);
        for p in points {
            min_x = min_x.min(p.x);
            max_x = max_x.max(p.x);
            min_y = min_y.min(p.y);
            max_y = max_y.max(p.y);
        }
        if points.is_empty() {
            (min_x, max_x, min_y, max_y) = (0.0, 0.0, 0.0, 0.0);
        }

        let (w, h) = (style.width as f32, style.height as f32);
        Self {
            min: (min_x, min_y),
            span: (max_x - min_x, max_y - min_y),
            origin: (w * style.margin, h * style.margin),
            extent: (w * (1.0 - 2.0 * style.margin), h * (1.0 - 2.0 * style.margin)),
        }
    }

    fn to_pixel(&self, x: f32, y: f32) -> (i32, i32) {
        let fx = if self.span.0 > 0.0 { (x - self.min.0) / self.span.0 } else { 0.5 };
        let fy = if self.span.1 > 0.0 { (y - self.min.1) / self.span.1 } else { 0.5 };
        (
            (self.origin.0 + fx * self.extent.0).round() as i32,
            (self.origin.1 + (1.0 - fy) * self.extent.1).round() as i32,
        )
    }
}

/// Scatter plot with a thumbnail above each point and its label underneath.
pub fn plot_embeddings(points: &[PlotPoint], style: &PlotStyle, labels: &Labels) -> RgbImage {
    let mut canvas = RgbImage::from_pixel(style.width, style.height, PLOT_BACKGROUND);
    let viewport = Viewport::fit(points, style);
    let label_scale = 12.0;
    let half = (style.thumb_size / 2) as i32;

    for p in points {
        let (px, py) = viewport.to_pixel(p.x, p.y);
        match &p.thumbnail {
            Some(thumb) => {
                let thumb = if thumb.dimensions() == (style.thumb_size, style.thumb_size) {
                    thumb.clone()
                } else {
                    let size = style.thumb_size;
                    imageops::resize(thumb, size, size, FilterType::Triangle)
                };
                imageops::overlay(&mut canvas, &thumb, (px - half) as i64, (py - 2 * half) as i64);
            }
            None => draw_filled_circle_mut(&mut canvas, (px, py), 4, UNKNOWN_COLOR),
        }

        let (tw, _) = labels.measure(label_scale, &p.label);
        labels.draw(&mut canvas, PLOT_INK, px - tw as i32 / 2, py + 3, label_scale, &p.label);
    }

    let title_scale = 24.0;
    let (tw, _) = labels.measure(title_scale, &style.title);
    let title_x = (style.width as i32 - tw as i32) / 2;
    labels.draw(&mut canvas, PLOT_INK, title_x, 12, title_scale, &style.title);

    canvas
}

pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>, RenderError> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, ImageFormat::Png)?;
    Ok(buf.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(x: f32, y: f32, w: f32, h: f32) -> BoundingBox {
        BoundingBox { x, y, width: w, height: h, confidence: 0.9, landmarks: None }
    }

    #[test]
    fn test_annotate_draws_colored_boxes() {
        let photo = RgbImage::from_pixel(100, 100, Rgb([50, 50, 50]));
        let anns = vec![
            Annotation {
                bbox: bbox(10.0, 10.0, 30.0, 30.0),
                label: "Ada".into(),
                known: true,
            },
            Annotation {
                bbox: bbox(60.0, 60.0, 30.0, 30.0),
                label: "Unknown".into(),
                known: false,
            },
        ];
        let out = annotate_faces(&photo, &anns, &Labels::none());

        assert_eq!(out.get_pixel(10, 20), &KNOWN_COLOR);
        assert_eq!(out.get_pixel(11, 20), &KNOWN_COLOR);
        assert_eq!(out.get_pixel(60, 70), &UNKNOWN_COLOR);
        // interior untouched
        assert_eq!(out.get_pixel(25, 25), &Rgb([50, 50, 50]));
        // source photo is not modified
        assert_eq!(photo.get_pixel(10, 20), &Rgb([50, 50, 50]));
    }

    #[test]
    fn test_annotate_skips_boxes_outside_image() {
        let photo = RgbImage::from_pixel(20, 20, Rgb([1, 2, 3]));
        let anns = vec![Annotation {
            bbox: bbox(50.0, 50.0, 5.0, 5.0),
            label: "x".into(),
            known: true,
        }];
        let out = annotate_faces(&photo, &anns, &Labels::none());
        assert_eq!(out, photo);
    }

    #[test]
    fn test_crop_thumbnail_size_and_content() {
        let mut photo = RgbImage::from_pixel(100, 100, Rgb([0, 0, 0]));
        for y in 20..40 {
            for x in 20..40 {
                photo.put_pixel(x, y, Rgb([255, 255, 255]));
            }
        }
        let thumb = crop_thumbnail(&photo, &bbox(20.0, 20.0, 20.0, 20.0), 40);
        assert_eq!(thumb.dimensions(), (40, 40));
        assert_eq!(thumb.get_pixel(20, 20), &Rgb([255, 255, 255]));
    }

    #[test]
    fn test_square_thumbnail_crops_center() {
        let mut photo = RgbImage::from_pixel(300, 100, Rgb([255, 0, 0]));
        for y in 0..100 {
            for x in 100..200 {
                photo.put_pixel(x, y, Rgb([0, 255, 0]));
            }
        }
        let thumb = square_thumbnail(&photo, 40);
        assert_eq!(thumb.dimensions(), (40, 40));
        assert!(thumb.pixels().all(|p| *p == Rgb([0, 255, 0])));
    }

    #[test]
    fn test_plot_places_thumbnails_inside_margins() {
        let thumb = RgbImage::from_pixel(40, 40, Rgb([0, 0, 255]));
        let points = vec![
            PlotPoint { x: -3.0, y: -3.0, label: "a".into(), thumbnail: Some(thumb.clone()) },
            PlotPoint { x: 3.0, y: 3.0, label: "b".into(), thumbnail: Some(thumb) },
            PlotPoint { x: 0.0, y: 0.0, label: "c".into(), thumbnail: None },
        ];
        let style = PlotStyle::default();
        let out = plot_embeddings(&points, &style, &Labels::none());
        assert_eq!(out.dimensions(), (1000, 1000));

        // (-3, -3) maps to the bottom-left corner of the data area: (100, 900).
        assert_eq!(out.get_pixel(100, 880), &Rgb([0, 0, 255]));
        // (3, 3) maps to the top-right corner: (900, 100); thumbnail sits above it.
        assert_eq!(out.get_pixel(900, 80), &Rgb([0, 0, 255]));
        // point without thumbnail is a dot at the center
        assert_eq!(out.get_pixel(500, 500), &UNKNOWN_COLOR);
        // far corner stays background
        assert_eq!(out.get_pixel(5, 995), &PLOT_BACKGROUND);
    }

    #[test]
    fn test_plot_single_point_is_centered() {
        let points = vec![PlotPoint { x: 7.0, y: 7.0, label: "solo".into(), thumbnail: None }];
        let out = plot_embeddings(&points, &PlotStyle::default(), &Labels::none());
        assert_eq!(out.get_pixel(500, 500), &UNKNOWN_COLOR);
    }

    #[test]
    fn test_invalid_font_bytes() {
        let err = Labels::from_bytes("junk.ttf", vec![0u8; 16]).err().expect("junk font must fail");
        assert!(matches!(err, RenderError::InvalidFont(_)));
        assert!(!Labels::load(Path::new("/nonexistent/font.ttf")).has_font());
    }

    #[test]
    fn test_encode_png_signature() {
        let png = encode_png(&RgbImage::new(2, 2)).expect("encode");
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }
}
