//! Shared math for the inference backends: box overlap, suppression and
//! score normalization.

use crate::detection::domain::detection_result::BoundingBox;

/// Intersection over union of two boxes.
pub fn bbox_iou(a: &BoundingBox, b: &BoundingBox) -> f64 {
    let x1 = a.x1.max(b.x1);
    let y1 = a.y1.max(b.y1);
    let x2 = a.x2.min(b.x2);
    let y2 = a.y2.min(b.y2);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if inter == 0.0 {
        return 0.0;
    }
    let area_a = a.width() * a.height();
    let area_b = b.width() * b.height();
    inter / (area_a + area_b - inter)
}

/// Greedy NMS: sort by score descending, suppress boxes overlapping a kept
/// one by more than `iou_thresh`.
pub fn nms(mut boxes: Vec<BoundingBox>, iou_thresh: f64) -> Vec<BoundingBox> {
    boxes.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut keep: Vec<BoundingBox> = Vec::with_capacity(boxes.len());
    for candidate in boxes {
        if keep
            .iter()
            .all(|kept| bbox_iou(kept, &candidate) <= iou_thresh)
        {
            keep.push(candidate);
        }
    }
    keep
}

/// Numerically stable softmax.
pub fn softmax(logits: &[f32]) -> Vec<f64> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f64> = logits.iter().map(|&v| ((v - max) as f64).exp()).collect();
    let sum: f64 = exps.iter().sum();
    if sum == 0.0 || !sum.is_finite() {
        return vec![0.0; logits.len()];
    }
    exps.into_iter().map(|e| e / sum).collect()
}
