//! Image classification against a provisioned model
//!
//! [`classify`] never fails: every exit is a well-formed
//! [`ClassificationResult`]. A not-ready handle short-circuits to the
//! "model unavailable" result without touching the image, and any fault
//! while decoding or running the model becomes "could not analyze image".

use crate::model::ImageModel;
use crate::preprocess;
use crate::provisioner::ModelHandle;
use candle_core::DType;
use chillibot_core::{ClassCatalog, ClassificationResult, Error, Result, CHILLI_CATALOG};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Classify one image file against the chilli disease catalog
pub fn classify(image_path: &Path, handle: &ModelHandle) -> ClassificationResult {
    classify_with_catalog(image_path, handle, &CHILLI_CATALOG)
}

/// Classify one image file, resolving labels against `catalog`
pub fn classify_with_catalog(
    image_path: &Path,
    handle: &ModelHandle,
    catalog: &ClassCatalog,
) -> ClassificationResult {
    let start = Instant::now();

    let Some(model) = handle.model() else {
        debug!(reason = ?handle.unavailable_reason(), "Model not ready, skipping inference");
        let result = ClassificationResult::unavailable();
        record(&result);
        return result;
    };

    let result = match predict(model.as_ref(), image_path) {
        Ok((class_id, probability)) => {
            ClassificationResult::prediction(catalog, class_id, probability)
        }
        Err(e) => {
            warn!(path = ?image_path, error = %e, "Image classification failed");
            ClassificationResult::analysis_failed()
        }
    }
    .with_latency(start.elapsed().as_micros() as u64);

    if result.ok {
        info!(
            class_id = result.class_id,
            label = %result.disease_name,
            confidence = result.confidence,
            latency_us = result.latency_us,
            "Image classified"
        );
    }
    record(&result);
    result
}

/// Run [`classify`] on the blocking pool
///
/// A cancelled task is reported as an analysis failure. So is a panicked
/// one where panics unwind; release builds abort the process instead.
pub async fn classify_blocking(image_path: PathBuf, handle: ModelHandle) -> ClassificationResult {
    match tokio::task::spawn_blocking(move || classify(&image_path, &handle)).await {
        Ok(result) => result,
        Err(e) => {
            warn!(error = %e, "Classification task did not complete");
            ClassificationResult::analysis_failed()
        }
    }
}

/// Preprocess, run one forward pass and pick the top class
fn predict(model: &dyn ImageModel, image_path: &Path) -> Result<(usize, f32)> {
    let batch = preprocess::prepare(image_path, model.input_size(), model.device())?;
    let probabilities: Vec<f32> = model
        .forward(&batch)
        .and_then(|t| t.squeeze(0))
        .and_then(|t| t.to_dtype(DType::F32))
        .and_then(|t| t.to_vec1())
        .map_err(|e| Error::inference(format!("Forward pass failed: {}", e)))?;
    argmax(&probabilities)
}

/// Index and value of the largest entry
///
/// Empty or non-finite outputs are rejected.
pub fn argmax(values: &[f32]) -> Result<(usize, f32)> {
    if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
        return Err(Error::inference(format!("Model produced non-finite output {}", bad)));
    }
    values
        .iter()
        .copied()
        .enumerate()
        .fold(None, |best: Option<(usize, f32)>, (idx, v)| match best {
            Some((_, best_v)) if best_v >= v => best,
            _ => Some((idx, v)),
        })
        .ok_or_else(|| Error::inference("Model produced an empty output"))
}

fn record(result: &ClassificationResult) {
    metrics::counter!("chillibot_classifications_total", "outcome" => result.outcome())
        .increment(1);
    if result.ok {
        metrics::histogram!("chillibot_inference_latency_us").record(result.latency_us as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argmax_picks_first_maximum() {
        assert_eq!(argmax(&[0.1, 0.7, 0.2]).unwrap(), (1, 0.7));
        assert_eq!(argmax(&[0.5, 0.5]).unwrap(), (0, 0.5));
    }

    #[test]
    fn test_argmax_rejects_bad_output() {
        assert!(argmax(&[]).is_err());
        assert!(argmax(&[0.2, f32::NAN]).is_err());
        assert!(argmax(&[f32::INFINITY]).is_err());
    }
}
