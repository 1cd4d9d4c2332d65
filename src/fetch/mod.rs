//! Artifact acquisition
//!
//! [`ArtifactFetcher`] retrieves one raw artifact (an image or a markup page)
//! from one source. Every attempt runs inside its own session:
//!
//! 1. purge stale processes and temporary files
//! 2. acquire a session, open the page, wait for it to settle
//! 3. search the top-level document, then every frame in document order
//! 4. release the session and purge again, whatever the outcome
//!
//! Failed attempts are retried with a fixed backoff. Exhausting the attempt
//! budget yields [`FetchError::Exhausted`], which callers treat as "no update
//! available now".

pub mod resources;
pub mod session;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, info, warn};

use self::resources::{AutomationResources, SessionIdentity};
use self::session::{PageSession, Scope};
use crate::utils::error::FetchError;
use crate::utils::retry::{with_retry, RetryConfig};
use crate::utils::{fingerprint, format_bytes};

/// Raw artifact retrieved from a source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    /// Encoded image bytes
    Image { bytes: Bytes, source_url: String },
    /// Decoded markup of a page
    Markup { html: String, source_url: String },
}

impl Artifact {
    pub fn image(bytes: impl Into<Bytes>, source_url: impl Into<String>) -> Self {
        Self::Image {
            bytes: bytes.into(),
            source_url: source_url.into(),
        }
    }

    pub fn markup(html: impl Into<String>, source_url: impl Into<String>) -> Self {
        Self::Markup {
            html: html.into(),
            source_url: source_url.into(),
        }
    }

    /// "image" or "markup"
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Image { .. } => "image",
            Self::Markup { .. } => "markup",
        }
    }

    pub fn source_url(&self) -> &str {
        match self {
            Self::Image { source_url, .. } | Self::Markup { source_url, .. } => source_url,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Image { bytes, .. } => bytes,
            Self::Markup { html, .. } => html.as_bytes(),
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }

    /// Short SHA-256 fingerprint of the artifact bytes
    pub fn fingerprint(&self) -> String {
        fingerprint(self.as_bytes())
    }
}

/// Source-specific heuristic for picking the schedule image
///
/// A candidate matches when it contains any marker and no exclude token,
/// compared case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactMatcher {
    markers: Vec<String>,
    exclude: Vec<String>,
}

impl ArtifactMatcher {
    pub fn new(markers: &[String], exclude: &[String]) -> Self {
        Self {
            markers: markers.iter().map(|m| m.to_lowercase()).collect(),
            exclude: exclude.iter().map(|e| e.to_lowercase()).collect(),
        }
    }

    pub fn matches(&self, candidate: &str) -> bool {
        let candidate = candidate.to_lowercase();

        self.markers.iter().any(|m| candidate.contains(m.as_str()))
            && !self.exclude.iter().any(|e| candidate.contains(e.as_str()))
    }

    /// First matching candidate, in order
    pub fn first_match<'a>(&self, candidates: &'a [String]) -> Option<&'a str> {
        candidates
            .iter()
            .map(String::as_str)
            .find(|c| self.matches(c))
    }
}

/// What a source publishes and how to recognise it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactKind {
    /// An embedded image picked by a matcher
    Image(ArtifactMatcher),
    /// Server-rendered text; the first document containing any of the tokens
    /// (or the top-level document, when there are none) is the artifact
    Markup { required_text: Vec<String> },
}

/// Retrieves the raw artifact of one source
pub struct ArtifactFetcher {
    url: String,
    kind: ArtifactKind,
    resources: Arc<dyn AutomationResources>,
    retry: RetryConfig,
    attempt_timeout: Duration,
    settle: Duration,
    headless: bool,
    user_agent: Option<String>,
}

impl ArtifactFetcher {
    /// Create a fetcher with the default attempt budget (3 attempts, 60s
    /// fixed backoff, 90s per attempt)
    pub fn new(
        url: impl Into<String>,
        kind: ArtifactKind,
        resources: Arc<dyn AutomationResources>,
    ) -> Self {
        Self {
            url: url.into(),
            kind,
            resources,
            retry: RetryConfig::default(),
            attempt_timeout: Duration::from_secs(90),
            settle: Duration::ZERO,
            headless: true,
            user_agent: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Wait after opening the page, for scripts that inject the artifact
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn with_user_agent(mut self, user_agent: Option<String>) -> Self {
        self.user_agent = user_agent;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch the artifact, retrying failed attempts
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Exhausted` once every attempt has failed
    pub async fn fetch(&self) -> Result<Artifact, FetchError> {
        match with_retry(&self.retry, |attempt| self.attempt(attempt)).await {
            Ok(artifact) => {
                info!(
                    url = %self.url,
                    kind = artifact.kind_name(),
                    source = artifact.source_url(),
                    bytes = artifact.len(),
                    size = %format_bytes(artifact.len() as u64),
                    fingerprint = %artifact.fingerprint(),
                    "Artifact fetched"
                );
                Ok(artifact)
            }
            Err(errors) => {
                let last = errors.last().map(ToString::to_string).unwrap_or_default();
                warn!(url = %self.url, attempts = errors.len(), last_error = %last, "Fetch failed");
                Err(FetchError::Exhausted {
                    attempts: errors.len() as u32,
                    last,
                })
            }
        }
    }

    async fn attempt(&self, attempt: u32) -> Result<Artifact, FetchError> {
        debug!(url = %self.url, attempt = attempt, "Starting fetch attempt");

        self.resources.purge_stale_processes().await;
        self.resources.clear_temp_artifacts().await;

        let identity = SessionIdentity::resolve(self.user_agent.as_deref());
        let outcome = match self.resources.acquire_session(self.headless, &identity).await {
            Ok(mut session) => {
                let outcome =
                    tokio::time::timeout(self.attempt_timeout, self.retrieve(session.as_mut()))
                        .await
                        .unwrap_or(Err(FetchError::Timeout(self.attempt_timeout.as_secs())));
                self.resources.release(session).await;
                outcome
            }
            Err(e) => Err(e),
        };

        self.resources.purge_stale_processes().await;
        self.resources.clear_temp_artifacts().await;

        outcome
    }

    async fn retrieve(&self, session: &mut dyn PageSession) -> Result<Artifact, FetchError> {
        session.open(&self.url).await?;

        if !self.settle.is_zero() {
            tokio::time::sleep(self.settle).await;
        }

        match &self.kind {
            ArtifactKind::Image(matcher) => {
                let image_url = self.locate_image(session, matcher).await?;
                debug!(url = %image_url, "Schedule image located");
                let bytes = session.download(&image_url).await?;
                Ok(Artifact::image(bytes, image_url))
            }
            ArtifactKind::Markup { required_text } => {
                self.locate_markup(session, required_text).await
            }
        }
    }

    async fn locate_image(
        &self,
        session: &mut dyn PageSession,
        matcher: &ArtifactMatcher,
    ) -> Result<String, FetchError> {
        let candidates = session.image_candidates(Scope::Top).await?;
        if let Some(found) = matcher.first_match(&candidates) {
            return Ok(found.to_string());
        }

        let frames = session.frame_count().await?;
        for index in 0..frames {
            match session.image_candidates(Scope::Frame(index)).await {
                Ok(candidates) => {
                    if let Some(found) = matcher.first_match(&candidates) {
                        debug!(frame = index, "Schedule image found inside frame");
                        return Ok(found.to_string());
                    }
                }
                Err(e) => warn!(frame = index, error = %e, "Skipping unreadable frame"),
            }
        }

        Err(FetchError::ArtifactNotFound(self.url.clone()))
    }

    async fn locate_markup(
        &self,
        session: &mut dyn PageSession,
        required_text: &[String],
    ) -> Result<Artifact, FetchError> {
        let required: Vec<String> = required_text.iter().map(|t| t.to_lowercase()).collect();
        let accepts = |html: &str| {
            if required.is_empty() {
                return true;
            }
            let html = html.to_lowercase();
            required.iter().any(|t| html.contains(t.as_str()))
        };

        let top = session.page_source(Scope::Top).await?;
        if accepts(&top) {
            return Ok(Artifact::markup(top, self.url.clone()));
        }

        let frames = session.frame_count().await?;
        for index in 0..frames {
            match session.page_source(Scope::Frame(index)).await {
                Ok(doc) if accepts(&doc) => {
                    debug!(frame = index, "Schedule text found inside frame");
                    return Ok(Artifact::markup(doc, format!("{}#frame{index}", self.url)));
                }
                Ok(_) => {}
                Err(e) => warn!(frame = index, error = %e, "Skipping unreadable frame"),
            }
        }

        Err(FetchError::ArtifactNotFound(self.url.clone()))
    }
}
