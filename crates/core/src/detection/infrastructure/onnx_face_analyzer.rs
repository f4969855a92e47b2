//! Face analysis backed by three ONNX Runtime sessions.
//!
//! A YOLO-style detector localizes faces on a letterboxed frame. Each face is
//! then cropped to a square and run through a 68-point landmark regressor and
//! a FER+ expression classifier.

use ort::session::Session;

use crate::detection::domain::detection_result::{BoundingBox, DetectionResult};
use crate::detection::domain::expression::{Expression, ExpressionScores};
use crate::detection::domain::face_detector::FaceDetector;
use crate::detection::domain::face_landmarks::{FaceLandmarks, Point};
use crate::shared::frame::Frame;

use super::math::{nms, softmax};
use super::onnx_session::input_square_size;

/// Fallback detector input resolution when the model doesn't fix one.
const DEFAULT_DETECTOR_INPUT: u32 = 640;
const DEFAULT_LANDMARK_INPUT: u32 = 112;
const DEFAULT_EXPRESSION_INPUT: u32 = 64;

const NMS_IOU_THRESH: f64 = 0.45;

/// Crop grows by this fraction of the box side so the jaw and brows fit.
const CROP_MARGIN: f64 = 0.2;

/// FER+ output order. Contempt has no counterpart and is dropped.
const FERPLUS_LABELS: [Option<Expression>; 8] = [
    Some(Expression::Neutral),
    Some(Expression::Happy),
    Some(Expression::Surprised),
    Some(Expression::Sad),
    Some(Expression::Angry),
    Some(Expression::Disgusted),
    Some(Expression::Fearful),
    None,
];

pub struct OnnxFaceAnalyzer {
    detector: Session,
    landmarks: Session,
    expressions: Session,
    confidence: f64,
    detector_input: u32,
    landmark_input: u32,
    expression_input: u32,
}

impl OnnxFaceAnalyzer {
    /// `confidence` is the minimum detector score in `[0, 1]`.
    pub fn new(
        detector: Session,
        landmarks: Session,
        expressions: Session,
        confidence: f64,
    ) -> Self {
        let detector_input = input_square_size(&detector).unwrap_or(DEFAULT_DETECTOR_INPUT);
        let landmark_input = input_square_size(&landmarks).unwrap_or(DEFAULT_LANDMARK_INPUT);
        let expression_input =
            input_square_size(&expressions).unwrap_or(DEFAULT_EXPRESSION_INPUT);
        log::debug!(
            "Model inputs: detector {detector_input}, landmarks {landmark_input}, expressions {expression_input}"
        );
        Self {
            detector,
            landmarks,
            expressions,
            confidence,
            detector_input,
            landmark_input,
            expression_input,
        }
    }
}

impl FaceDetector for OnnxFaceAnalyzer {
    fn detect(
        &mut self,
        frame: &Frame,
    ) -> Result<Vec<DetectionResult>, Box<dyn std::error::Error>> {
        if frame.channels() < 3 {
            return Err("expected an RGB frame".into());
        }

        let boxes = run_detector(&mut self.detector, frame, self.detector_input, self.confidence)?;

        let mut results = Vec::with_capacity(boxes.len());
        for bbox in boxes {
            let Some(crop) = face_crop(&bbox, frame.width(), frame.height(), CROP_MARGIN) else {
                results.push(DetectionResult {
                    bbox: Some(bbox),
                    ..DetectionResult::default()
                });
                continue;
            };
            let landmarks = run_landmarks(&mut self.landmarks, frame, crop, self.landmark_input)?;
            let expressions =
                run_expressions(&mut self.expressions, frame, crop, self.expression_input)?;
            results.push(DetectionResult {
                bbox: Some(bbox),
                landmarks: Some(landmarks),
                expressions: Some(expressions),
            });
        }
        Ok(results)
    }
}

// ---------------------------------------------------------------------------
// Inference
// ---------------------------------------------------------------------------

fn run_detector(
    session: &mut Session,
    frame: &Frame,
    input_size: u32,
    confidence: f64,
) -> Result<Vec<BoundingBox>, Box<dyn std::error::Error>> {
    let (tensor, lb) = letterbox(frame, input_size);
    let input = ort::value::Tensor::from_array(tensor)?;
    let outputs = session.run(ort::inputs![input])?;
    if outputs.len() == 0 {
        return Err("face detector produced no outputs".into());
    }
    let array = outputs[0].try_extract_array::<f32>()?;
    let data = array.as_slice().ok_or("Cannot get tensor slice")?;
    let boxes = decode_detections(
        data,
        array.shape(),
        confidence,
        &lb,
        frame.width(),
        frame.height(),
    )?;
    Ok(nms(boxes, NMS_IOU_THRESH))
}

fn run_landmarks(
    session: &mut Session,
    frame: &Frame,
    crop: FaceCrop,
    input_size: u32,
) -> Result<FaceLandmarks, Box<dyn std::error::Error>> {
    let input = ort::value::Tensor::from_array(sample_rgb(frame, crop, input_size))?;
    let outputs = session.run(ort::inputs![input])?;
    if outputs.len() == 0 {
        return Err("landmark model produced no outputs".into());
    }
    let array = outputs[0].try_extract_array::<f32>()?;
    let data = array.as_slice().ok_or("Cannot get tensor slice")?;
    Ok(landmarks_from_output(data, crop))
}

fn run_expressions(
    session: &mut Session,
    frame: &Frame,
    crop: FaceCrop,
    input_size: u32,
) -> Result<ExpressionScores, Box<dyn std::error::Error>> {
    let input = ort::value::Tensor::from_array(sample_gray(frame, crop, input_size))?;
    let outputs = session.run(ort::inputs![input])?;
    if outputs.len() == 0 {
        return Err("expression model produced no outputs".into());
    }
    let array = outputs[0].try_extract_array::<f32>()?;
    let data = array.as_slice().ok_or("Cannot get tensor slice")?;
    Ok(expressions_from_logits(data))
}

// ---------------------------------------------------------------------------
// Detector pre/post-processing
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq)]
struct Letterbox {
    scale: f64,
    pad_x: u32,
    pad_y: u32,
}

/// Letterbox-resize a frame to `target_size` × `target_size` (NCHW, [0, 1]).
fn letterbox(frame: &Frame, target_size: u32) -> (ndarray::Array4<f32>, Letterbox) {
    let fw = frame.width() as f64;
    let fh = frame.height() as f64;
    let target = target_size as f64;

    let scale = (target / fw).min(target / fh);
    let new_w = ((fw * scale).round() as u32).min(target_size);
    let new_h = ((fh * scale).round() as u32).min(target_size);
    let pad_x = (target_size - new_w) / 2;
    let pad_y = (target_size - new_h) / 2;

    // 114/255 gray padding, YOLO convention
    let gray = 114.0f32 / 255.0;
    let mut tensor =
        ndarray::Array4::<f32>::from_elem((1, 3, target_size as usize, target_size as usize), gray);

    let src = frame.as_ndarray();
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;

    for y in 0..new_h as usize {
        let src_y = ((y as f64 / scale) as usize).min(src_h - 1);
        for x in 0..new_w as usize {
            let src_x = ((x as f64 / scale) as usize).min(src_w - 1);
            let ty = pad_y as usize + y;
            let tx = pad_x as usize + x;
            for c in 0..3 {
                tensor[[0, c, ty, tx]] = src[[src_y, src_x, c]] as f32 / 255.0;
            }
        }
    }

    (tensor, Letterbox { scale, pad_x, pad_y })
}

/// Parses YOLO rows `[cx, cy, w, h, conf, ...]` back into frame coordinates.
///
/// Accepts `[1, features, detections]` (transposed) and
/// `[1, detections, features]` layouts.
fn decode_detections(
    data: &[f32],
    shape: &[usize],
    confidence: f64,
    lb: &Letterbox,
    frame_w: u32,
    frame_h: u32,
) -> Result<Vec<BoundingBox>, String> {
    if shape.len() != 3 {
        return Err(format!("Unexpected detector output shape: {shape:?}"));
    }
    let transposed = shape[1] < shape[2];
    let (num_dets, num_feats) = if transposed {
        (shape[2], shape[1])
    } else {
        (shape[1], shape[2])
    };
    if num_feats < 5 || data.len() < num_dets * num_feats {
        return Err(format!("Unexpected detector output shape: {shape:?}"));
    }

    let at = |det: usize, feat: usize| -> f64 {
        if transposed {
            data[feat * num_dets + det] as f64
        } else {
            data[det * num_feats + feat] as f64
        }
    };

    let (fw, fh) = (frame_w as f64, frame_h as f64);
    let unpad_x = |v: f64| ((v - lb.pad_x as f64) / lb.scale).clamp(0.0, fw);
    let unpad_y = |v: f64| ((v - lb.pad_y as f64) / lb.scale).clamp(0.0, fh);

    let mut boxes = Vec::new();
    for i in 0..num_dets {
        let score = at(i, 4);
        if score < confidence {
            continue;
        }
        let (cx, cy, w, h) = (at(i, 0), at(i, 1), at(i, 2), at(i, 3));
        boxes.push(BoundingBox {
            x1: unpad_x(cx - w / 2.0),
            y1: unpad_y(cy - h / 2.0),
            x2: unpad_x(cx + w / 2.0),
            y2: unpad_y(cy + h / 2.0),
            score,
        });
    }
    Ok(boxes)
}

// ---------------------------------------------------------------------------
// Per-face crops
// ---------------------------------------------------------------------------

/// Square frame region around a face, clamped to the frame.
#[derive(Clone, Copy, Debug, PartialEq)]
struct FaceCrop {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

fn face_crop(bbox: &BoundingBox, frame_w: u32, frame_h: u32, margin: f64) -> Option<FaceCrop> {
    let side = bbox.width().max(bbox.height()) * (1.0 + margin);
    let cx = (bbox.x1 + bbox.x2) / 2.0;
    let cy = (bbox.y1 + bbox.y2) / 2.0;

    let x0 = (cx - side / 2.0).max(0.0).floor() as u32;
    let y0 = (cy - side / 2.0).max(0.0).floor() as u32;
    let x1 = ((cx + side / 2.0).ceil() as u32).min(frame_w);
    let y1 = ((cy + side / 2.0).ceil() as u32).min(frame_h);

    if x1 < x0 + 2 || y1 < y0 + 2 {
        return None;
    }
    Some(FaceCrop {
        x: x0,
        y: y0,
        width: x1 - x0,
        height: y1 - y0,
    })
}

/// Nearest-neighbor source pixel for output cell `i` of `size`.
fn source_coord(origin: u32, extent: u32, i: usize, size: u32) -> usize {
    let offset = ((i as f64 + 0.5) * extent as f64 / size as f64) as u32;
    (origin + offset.min(extent - 1)) as usize
}

/// RGB crop resized to `size` × `size`, NCHW in [0, 1].
fn sample_rgb(frame: &Frame, crop: FaceCrop, size: u32) -> ndarray::Array4<f32> {
    let src = frame.as_ndarray();
    let s = size as usize;
    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, s, s));
    for y in 0..s {
        let sy = source_coord(crop.y, crop.height, y, size);
        for x in 0..s {
            let sx = source_coord(crop.x, crop.width, x, size);
            for c in 0..3 {
                tensor[[0, c, y, x]] = src[[sy, sx, c]] as f32 / 255.0;
            }
        }
    }
    tensor
}

/// Grayscale crop resized to `size` × `size`, raw 0–255 luma (FER+ input).
fn sample_gray(frame: &Frame, crop: FaceCrop, size: u32) -> ndarray::Array4<f32> {
    let s = size as usize;
    let mut tensor = ndarray::Array4::<f32>::zeros((1, 1, s, s));
    for y in 0..s {
        let sy = source_coord(crop.y, crop.height, y, size);
        for x in 0..s {
            let sx = source_coord(crop.x, crop.width, x, size);
            tensor[[0, 0, y, x]] = frame.luma(sx, sy);
        }
    }
    tensor
}

/// Maps crop-normalized `(x, y)` pairs back to frame pixels.
fn landmarks_from_output(values: &[f32], crop: FaceCrop) -> FaceLandmarks {
    let points = values
        .chunks_exact(2)
        .map(|p| {
            Point::new(
                crop.x as f64 + p[0] as f64 * crop.width as f64,
                crop.y as f64 + p[1] as f64 * crop.height as f64,
            )
        })
        .collect();
    FaceLandmarks::new(points)
}

fn expressions_from_logits(logits: &[f32]) -> ExpressionScores {
    softmax(logits)
        .into_iter()
        .zip(FERPLUS_LABELS)
        .filter_map(|(p, label)| label.map(|e| (e, p)))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
