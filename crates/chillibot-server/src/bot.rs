//! Shared state and webhook event dispatch

use anyhow::Result;
use chillibot_core::ClassificationResult;
use chillibot_vision::{classify_blocking, ModelHandle};
use futures_util::future::join_all;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::BotConfig;
use crate::line::{LineClient, Message};
use crate::reply::ReplyComposer;
use crate::responder::TextResponder;
use crate::staging::ImageStaging;
use crate::webhook::{Event, MessageContent};

/// Application state shared across all requests
#[derive(Clone)]
pub struct AppState {
    /// Loaded configuration
    pub config: Arc<BotConfig>,

    /// LINE Messaging API client
    pub line: LineClient,

    /// Provisioned (or degraded) model
    pub model: ModelHandle,

    /// Canned text replies
    pub responder: Arc<TextResponder>,

    /// Classification result rendering
    pub composer: Arc<ReplyComposer>,

    /// Inbound image storage
    pub staging: ImageStaging,

    /// Prometheus metrics handle for rendering
    pub metrics_handle: PrometheusHandle,
}

impl AppState {
    /// Build state around an already provisioned model handle
    pub fn new(config: BotConfig, model: ModelHandle, metrics_handle: PrometheusHandle) -> Result<Self> {
        let line = LineClient::new(&config.line)?;
        let responder = TextResponder::new(&config.responder);
        let public_base_url = config
            .server
            .public_base_url
            .as_deref()
            .map(public_origin)
            .transpose()?;
        let composer = ReplyComposer::new(public_base_url, config.server.static_dir.clone());
        let staging = ImageStaging::new(&config.staging_dir).map_err(|e| {
            anyhow::anyhow!("Failed to create staging dir {:?}: {}", config.staging_dir, e)
        })?;

        Ok(Self {
            config: Arc::new(config),
            line,
            model,
            responder: Arc::new(responder),
            composer: Arc::new(composer),
            staging,
            metrics_handle,
        })
    }
}

/// Parse the public origin, making sure relative joins append to its path
fn public_origin(base: &str) -> Result<Url> {
    let mut url = Url::parse(base)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Handle every event in one webhook delivery
///
/// Events are handled concurrently. Failures are logged per event and
/// never abort the others.
pub async fn dispatch(state: &AppState, events: Vec<Event>) {
    join_all(events.into_iter().map(|event| handle_event(state, event))).await;
}

async fn handle_event(state: &AppState, event: Event) {
    let Event::Message(event) = event else {
        metrics::counter!("chillibot_webhook_events_total", "kind" => "unsupported").increment(1);
        debug!("Ignoring non-message event");
        return;
    };

    let kind = event.message.kind();
    metrics::counter!("chillibot_webhook_events_total", "kind" => kind).increment(1);
    let user = event
        .source
        .as_ref()
        .and_then(|s| s.user_id.as_deref())
        .unwrap_or("-");
    debug!(kind, user, "Message event received");

    let Some(reply_token) = event.reply_token.as_deref() else {
        debug!(kind, "Event has no reply token, not replying");
        return;
    };

    let messages = match &event.message {
        MessageContent::Text { text, .. } => vec![Message::text(state.responder.respond(text))],
        MessageContent::Image { id } => {
            let result = diagnose_image(state, id).await;
            state.composer.compose(&result)
        }
        MessageContent::Unsupported => {
            debug!("Ignoring unsupported message type");
            return;
        }
    };

    send_reply(state, reply_token, messages).await;
}

/// Download, stage and classify one image message
///
/// The staged file is removed when this returns, whatever the outcome.
pub async fn diagnose_image(state: &AppState, message_id: &str) -> ClassificationResult {
    if !state.model.is_ready() {
        return ClassificationResult::unavailable();
    }

    let staged = match state.staging.create() {
        Ok(staged) => staged,
        Err(e) => {
            warn!(error = %e, "Failed to stage inbound image");
            return ClassificationResult::analysis_failed();
        }
    };

    let downloaded = match staged.writer() {
        Ok(mut out) => state.line.download_content(message_id, &mut out).await,
        Err(e) => Err(e.into()),
    };
    if let Err(e) = downloaded {
        warn!(message_id, error = %e, "Failed to download image content");
        return ClassificationResult::analysis_failed();
    }

    let result = classify_blocking(staged.path().to_path_buf(), state.model.clone()).await;
    info!(
        message_id,
        outcome = result.outcome(),
        label = %result.disease_name,
        confidence = result.confidence,
        "Image diagnosed"
    );
    drop(staged);
    result
}

async fn send_reply(state: &AppState, reply_token: &str, messages: Vec<Message>) {
    match state.line.reply(reply_token, messages).await {
        Ok(()) => {
            metrics::counter!("chillibot_replies_total", "outcome" => "sent").increment(1);
        }
        Err(e) => {
            metrics::counter!("chillibot_replies_total", "outcome" => "failed").increment(1);
            warn!(error = %e, "Failed to send reply");
        }
    }
}
