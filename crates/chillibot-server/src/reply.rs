//! Turning classification results into LINE reply messages

use crate::line::{Message, MAX_REPLY_MESSAGES};
use chillibot_core::ClassificationResult;
use std::path::PathBuf;
use url::Url;

/// Builds reply messages for a classification result
#[derive(Debug, Clone)]
pub struct ReplyComposer {
    /// Public HTTPS origin; image messages are only sent when set
    public_base_url: Option<Url>,
    /// Directory served under `/static`
    static_dir: PathBuf,
}

impl ReplyComposer {
    pub fn new(public_base_url: Option<Url>, static_dir: impl Into<PathBuf>) -> Self {
        Self {
            public_base_url,
            static_dir: static_dir.into(),
        }
    }

    /// Messages for one result
    ///
    /// A prediction gives a summary, a description with advice and, when the
    /// illustration can be served, an image. A failure gives a single text.
    pub fn compose(&self, result: &ClassificationResult) -> Vec<Message> {
        if !result.ok {
            return vec![Message::text(format!(
                "{}\n{}",
                result.description, result.advice
            ))];
        }

        let mut messages = vec![Message::text(format!(
            "Result: {}\nConfidence: {:.2}%",
            result.disease_name, result.confidence
        ))];

        let mut details = format!("{}\n\nAdvice: {}", result.description, result.advice);
        if let Some(link) = &result.reference_url {
            details.push_str("\n\nMore: ");
            details.push_str(link);
        }
        messages.push(Message::text(details));

        if let Some(url) = result.image_url.as_deref().and_then(|path| self.asset_url(path)) {
            messages.push(Message::image(url.to_string()));
        }

        messages.truncate(MAX_REPLY_MESSAGES);
        messages
    }

    /// Public URL of a static asset, if it exists and can be linked
    pub fn asset_url(&self, relative: &str) -> Option<Url> {
        let base = self.public_base_url.as_ref()?;
        if relative.split('/').any(|part| part == ".." || part.is_empty()) {
            return None;
        }
        if !self.static_dir.join(relative).is_file() {
            return None;
        }
        base.join(&format!("static/{}", relative)).ok()
    }
}
