//! Remote artifact download
//!
//! Downloads are streamed into a temporary file next to the destination and
//! renamed into place only once the full body has arrived, so an interrupted
//! or truncated transfer never leaves a file that looks complete.

use chillibot_core::{Error, Result};
use futures_util::StreamExt;
use hf_hub::{api::sync::Api, Repo, RepoType};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use url::Url;

/// Most redirect hops followed for one request
pub const MAX_REDIRECTS: usize = 10;

/// Decides whether a download may contact a URL
///
/// Checked for the source URL, every redirect hop and any confirmation URL
/// scraped from an interstitial page.
pub type UrlGuard = Arc<dyn Fn(&Url) -> Result<()> + Send + Sync>;

/// Guard that accepts every URL
pub fn allow_all() -> UrlGuard {
    Arc::new(|_: &Url| -> Result<()> { Ok(()) })
}

/// HTTP client whose redirects are checked against `guard`
pub fn download_client(timeout: Duration, guard: UrlGuard) -> Result<reqwest::Client> {
    let policy = reqwest::redirect::Policy::custom(move |attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            return attempt.error(format!("more than {} redirects", MAX_REDIRECTS));
        }
        let verdict = guard(attempt.url());
        match verdict {
            Ok(()) => attempt.follow(),
            Err(e) => attempt.error(e),
        }
    });

    reqwest::Client::builder()
        .timeout(timeout)
        .redirect(policy)
        .build()
        .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))
}

/// Download `url` to `dest`, following a large-file confirmation page if the
/// host serves one
pub async fn fetch_url(
    client: &reqwest::Client,
    guard: &UrlGuard,
    url: &str,
    dest: &Path,
) -> Result<u64> {
    let parsed =
        Url::parse(url).map_err(|e| Error::provision(format!("Invalid model URL {}: {}", url, e)))?;
    guard(&parsed)?;

    let response = get_checked(client, url).await?;

    let response = if is_html(&response) {
        let page = response
            .text()
            .await
            .map_err(|e| Error::provision(format!("Failed to read response from {}: {}", url, e)))?;
        let confirm = confirmation_url(url, &page).ok_or_else(|| {
            Error::provision(format!(
                "{} returned an HTML page instead of the model artifact",
                url
            ))
        })?;

        guard(&confirm)?;
        info!(url = %confirm, "Following large-file download confirmation");
        let confirmed = get_checked(client, confirm.as_str()).await?;
        if is_html(&confirmed) {
            return Err(Error::provision(format!(
                "Download confirmation for {} did not yield the model artifact",
                url
            )));
        }
        confirmed
    } else {
        response
    };

    write_atomically(response, dest).await
}

async fn get_checked(client: &reqwest::Client, url: &str) -> Result<reqwest::Response> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| Error::provision(format!("Request to {} failed: {}", url, e)))?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::provision(format!("HTTP {} from {}", status, url)));
    }
    Ok(response)
}

fn is_html(response: &reqwest::Response) -> bool {
    response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("text/html"))
        .unwrap_or(false)
}

/// Stream the body into a temp file and rename it onto `dest`
async fn write_atomically(response: reqwest::Response, dest: &Path) -> Result<u64> {
    let expected = response.content_length();
    let staging = staging_file(dest)?;
    let mut out = tokio::fs::File::from_std(staging.as_file().try_clone()?);

    let mut written: u64 = 0;
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk =
            chunk.map_err(|e| Error::provision(format!("Download interrupted: {}", e)))?;
        out.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    out.flush().await?;
    out.sync_all().await?;
    drop(out);

    if written == 0 {
        return Err(Error::provision("Remote returned an empty body"));
    }
    if let Some(expected) = expected {
        if expected != written {
            return Err(Error::provision(format!(
                "Download truncated: expected {} bytes, got {}",
                expected, written
            )));
        }
    }

    persist(staging, dest)?;
    debug!(path = ?dest, bytes = written, "Artifact written");
    Ok(written)
}

/// Fetch `filename` from a Hugging Face repo and copy it onto `dest`
///
/// hf-hub's sync API blocks, so this runs on the blocking pool.
pub async fn fetch_hf(
    repo_id: &str,
    filename: &str,
    revision: Option<&str>,
    dest: &Path,
) -> Result<u64> {
    let repo = Repo::with_revision(
        repo_id.to_string(),
        RepoType::Model,
        revision.unwrap_or("main").to_string(),
    );
    let filename = filename.to_string();
    let dest: PathBuf = dest.to_path_buf();

    tokio::task::spawn_blocking(move || -> Result<u64> {
        let api = Api::new()
            .map_err(|e| Error::provision(format!("Failed to initialize HF API: {}", e)))?;
        let cached = api
            .repo(repo)
            .get(&filename)
            .map_err(|e| Error::provision(format!("Failed to download model from HF: {}", e)))?;

        let staging = staging_file(&dest)?;
        let bytes = std::fs::copy(&cached, staging.path())?;
        persist(staging, &dest)?;
        Ok(bytes)
    })
    .await
    .map_err(|e| Error::internal(format!("HF download task failed: {}", e)))?
}

fn staging_file(dest: &Path) -> Result<NamedTempFile> {
    let dir = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;
    Ok(tempfile::Builder::new()
        .prefix(".chillibot-")
        .suffix(".part")
        .tempfile_in(dir)?)
}

fn persist(staging: NamedTempFile, dest: &Path) -> Result<()> {
    staging.persist(dest).map_err(|e| {
        warn!(path = ?dest, error = %e.error, "Failed to move artifact into place");
        Error::Io(e.error)
    })?;
    Ok(())
}

fn form_action_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"<form[^>]*\baction="([^"]+)""#).expect("valid form action regex")
    })
}

fn hidden_input_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"<input[^>]*\bname="([^"]+)"[^>]*\bvalue="([^"]*)""#)
            .expect("valid hidden input regex")
    })
}

fn confirm_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"confirm=([0-9A-Za-z_\-]+)").expect("valid confirm regex"))
}

/// Work out the follow-up URL from a large-file warning page
///
/// Handles the form-based interstitial (action URL plus hidden inputs) and
/// the older variant that embeds a `confirm=<token>` link.
pub fn confirmation_url(original: &str, page: &str) -> Option<Url> {
    let base = Url::parse(original).ok()?;

    if let Some(action) = form_action_re().captures(page).map(|c| c[1].replace("&amp;", "&")) {
        let mut url = base.join(&action).ok()?;
        {
            let mut query = url.query_pairs_mut();
            for input in hidden_input_re().captures_iter(page) {
                query.append_pair(&input[1], &input[2]);
            }
        }
        return Some(url);
    }

    let token = confirm_token_re().captures(page)?[1].to_string();
    let mut url = base;
    let retained: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != "confirm")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(retained)
        .append_pair("confirm", &token);
    Some(url)
}
