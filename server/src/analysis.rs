//! Decision fusion and result assembly: merges the three neural task
//! outputs with the classical shift score into one wire-ready report.

use std::path::Path;
use std::time::Instant;

use shared::{AnalysisReport, ResponseMessage};

use crate::geometry;
use crate::model::HeadOutputs;
use crate::{ServiceContext, round2};

/// Runs one request through the full pipeline. Every failure is folded
/// into an error reply here; callers never see an `Err`.
pub fn analyze(ctx: &ServiceContext, image_path: &str) -> ResponseMessage {
    let Some(classifier) = ctx.classifier.as_deref() else {
        return ResponseMessage::error("Model not loaded");
    };
    if !Path::new(image_path).exists() {
        return ResponseMessage::error(format!("File not found: {}", image_path));
    }

    let started = Instant::now();
    match classifier.run(image_path) {
        Ok(heads) => {
            let duration_ms = round2(started.elapsed().as_secs_f64() * 1000.0);
            let report =
                assemble_report(&heads, image_path, duration_ms, classifier.device_label());
            ResponseMessage::Report(Box::new(report))
        }
        Err(e) => {
            log::error!("Error processing image {}: {}", image_path, e);
            ResponseMessage::error(e.to_string())
        }
    }
}

/// Pure field composition; the only conditional logic is the
/// neural-gated geometric corroboration of the midline decision.
fn assemble_report(
    heads: &HeadOutputs,
    image_path: &str,
    duration_ms: f64,
    device: String,
) -> AnalysisReport {
    let prediction = if heads.hemorrhage.is_abnormal() {
        "Hemorrhage"
    } else {
        "Normal"
    };

    let midline_shift = heads.midline.is_abnormal();
    let (shift_score, midline_detail) = if midline_shift {
        let score = geometry::estimate_shift(image_path).magnitude_mm();
        let detail = format!(
            "Midline shift detected (confidence: {:.1}%), estimated displacement {}mm",
            heads.midline.abnormal_prob * 100.0,
            score
        );
        (score, detail)
    } else {
        (0.0, "Midline structures centered".to_string())
    };

    let ventricle_issue = heads.ventricle.is_abnormal();
    let ventricle_detail = if ventricle_issue {
        format!(
            "Ventricular density/morphology abnormal (confidence: {:.1}%)",
            heads.ventricle.abnormal_prob * 100.0
        )
    } else {
        "Ventricular system morphology normal".to_string()
    };

    AnalysisReport {
        prediction: prediction.to_string(),
        confidence_level: format!("{:.2}%", heads.hemorrhage.confidence_pct()),
        hemorrhage_probability: heads.hemorrhage.abnormal_prob,
        no_hemorrhage_probability: heads.hemorrhage.normal_prob,
        analysis_duration: duration_ms,
        device,
        midline_shift,
        shift_score,
        midline_detail,
        ventricle_issue,
        ventricle_detail,
    }
}
