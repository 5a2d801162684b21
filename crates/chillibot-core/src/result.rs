//! Classification result handed from the vision pipeline to the reply layer

use crate::catalog::ClassCatalog;
use serde::{Deserialize, Serialize};

/// Label reported while the model handle is not ready
pub const MODEL_UNAVAILABLE: &str = "model unavailable";

/// Label reported when the image could not be decoded or run
pub const ANALYSIS_FAILED: &str = "could not analyze image";

/// Outcome of one `classify` call
///
/// When `ok` is false, `class_id` and `confidence` are zero and carry no
/// meaning; only the label and advice are useful to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// Whether a real prediction was produced
    pub ok: bool,

    /// Predicted class index
    pub class_id: usize,

    /// Probability mass on the predicted class, as a percentage (0-100)
    pub confidence: f32,

    /// Human-readable label
    pub disease_name: String,

    /// Descriptive text
    pub description: String,

    /// Advisory text
    pub advice: String,

    /// Illustrative image, relative to the public static asset root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,

    /// Further reading
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_url: Option<String>,

    /// Inference latency in microseconds
    #[serde(default)]
    pub latency_us: u64,
}

impl ClassificationResult {
    /// Result returned while the model is not provisioned
    pub fn unavailable() -> Self {
        Self::failure(
            MODEL_UNAVAILABLE,
            "The disease detection model is not available right now.",
            "Please contact the bot operator, or try again later.",
        )
    }

    /// Result returned when preprocessing or the forward pass faults
    pub fn analysis_failed() -> Self {
        Self::failure(
            ANALYSIS_FAILED,
            "The photo could not be analyzed.",
            "Please retry with a clearer, well-lit photo of a single leaf or fruit.",
        )
    }

    fn failure(label: &str, description: &str, advice: &str) -> Self {
        Self {
            ok: false,
            class_id: 0,
            confidence: 0.0,
            disease_name: label.to_string(),
            description: description.to_string(),
            advice: advice.to_string(),
            image_url: None,
            reference_url: None,
            latency_us: 0,
        }
    }

    /// Successful prediction resolved against a catalog
    ///
    /// `probability` is the raw softmax value in [0, 1]; it is converted to
    /// a percentage and clamped here so callers only ever see 0-100.
    pub fn prediction(catalog: &ClassCatalog, class_id: usize, probability: f32) -> Self {
        let entry = catalog.lookup(class_id);
        Self {
            ok: true,
            class_id,
            confidence: (probability * 100.0).clamp(0.0, 100.0),
            disease_name: entry.name.to_string(),
            description: entry.description.to_string(),
            advice: entry.advice.to_string(),
            image_url: entry.image.map(str::to_string),
            reference_url: entry.reference_url.map(str::to_string),
            latency_us: 0,
        }
    }

    /// Attach measured latency
    pub fn with_latency(mut self, latency_us: u64) -> Self {
        self.latency_us = latency_us;
        self
    }

    /// Short outcome tag used for logs and metrics labels
    pub fn outcome(&self) -> &'static str {
        match (self.ok, self.disease_name.as_str()) {
            (true, _) => "success",
            (false, MODEL_UNAVAILABLE) => "unavailable",
            (false, _) => "failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CHILLI_CATALOG, UNKNOWN_CLASS};

    #[test]
    fn test_unavailable_shape() {
        let result = ClassificationResult::unavailable();
        assert!(!result.ok);
        assert_eq!(result.disease_name, MODEL_UNAVAILABLE);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.class_id, 0);
        assert_eq!(result.outcome(), "unavailable");
    }

    #[test]
    fn test_analysis_failed_shape() {
        let result = ClassificationResult::analysis_failed();
        assert!(!result.ok);
        assert_eq!(result.disease_name, ANALYSIS_FAILED);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.outcome(), "failed");
    }

    #[test]
    fn test_prediction_scales_and_clamps() {
        let result = ClassificationResult::prediction(&CHILLI_CATALOG, 1, 0.875);
        assert!(result.ok);
        assert_eq!(result.disease_name, "Anthracnose");
        assert!((result.confidence - 87.5).abs() < 1e-4);

        let over = ClassificationResult::prediction(&CHILLI_CATALOG, 1, 1.2);
        assert_eq!(over.confidence, 100.0);
        let under = ClassificationResult::prediction(&CHILLI_CATALOG, 1, -0.1);
        assert_eq!(under.confidence, 0.0);
    }

    #[test]
    fn test_prediction_unknown_class() {
        let result = ClassificationResult::prediction(&CHILLI_CATALOG, 42, 0.5);
        assert!(result.ok);
        assert_eq!(result.class_id, 42);
        assert_eq!(result.disease_name, UNKNOWN_CLASS.name);
        assert!(result.image_url.is_none());
    }

    #[test]
    fn test_json_omits_missing_links() {
        let json = serde_json::to_value(ClassificationResult::unavailable()).unwrap();
        assert!(json.get("image_url").is_none());
        assert_eq!(json["ok"], false);
    }
}
