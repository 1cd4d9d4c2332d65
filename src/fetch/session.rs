//! Page sessions
//!
//! A [`PageSession`] is one browser-like view of a page: open a URL, list the
//! image candidates of the top-level document or of one of its frames, read
//! the markup, download a resource. [`HttpPageSession`] implements it over a
//! cookie-keeping reqwest client; frames are loaded lazily on first access.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, USER_AGENT},
    Client,
};
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

use super::resources::SessionIdentity;
use crate::utils::decode_markup;
use crate::utils::error::FetchError;

/// Which document of the open page an operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// The top-level document
    Top,
    /// The n-th frame of the top-level document, in document order
    Frame(usize),
}

/// Browser-like access to one page
#[async_trait]
pub trait PageSession: Send {
    /// Navigate to `url`, replacing any open page
    async fn open(&mut self, url: &str) -> Result<(), FetchError>;

    /// Number of frames embedded in the top-level document
    async fn frame_count(&mut self) -> Result<usize, FetchError>;

    /// Absolute URLs of candidate elements in `scope`, in document order
    ///
    /// The top-level document lists `<img src>` then `<a href>`; frames list
    /// `<img src>` only.
    async fn image_candidates(&mut self, scope: Scope) -> Result<Vec<String>, FetchError>;

    /// Markup of the document in `scope`
    async fn page_source(&mut self, scope: Scope) -> Result<String, FetchError>;

    /// Download a resource with the session's identity and cookies
    async fn download(&mut self, url: &str) -> Result<Bytes, FetchError>;
}

struct LoadedPage {
    url: Url,
    html: String,
    frames: Vec<Url>,
    frame_docs: HashMap<usize, String>,
}

/// Page session over plain HTTP
pub struct HttpPageSession {
    client: Client,
    page: Option<LoadedPage>,
}

impl HttpPageSession {
    /// Create a session presenting `identity`, with a per-request timeout
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Http` if the HTTP client cannot be created
    pub fn new(identity: &SessionIdentity, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .gzip(true)
            .cookie_store(true)
            .default_headers(build_headers(identity))
            .build()?;

        Ok(Self { client, page: None })
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, FetchError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Session(format!("request to {url} timed out"))
            } else {
                FetchError::Http(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::ServerError {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(response)
    }

    async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        let response = self.get(url).await?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
            .unwrap_or_default();

        let bytes = response.bytes().await?;
        decode_markup(&bytes, &content_type)
    }

    fn page(&self) -> Result<&LoadedPage, FetchError> {
        self.page.as_ref().ok_or(FetchError::NoPage)
    }

    async fn frame_document(&mut self, index: usize) -> Result<(Url, String), FetchError> {
        let page = self.page()?;
        let frame_url = page
            .frames
            .get(index)
            .cloned()
            .ok_or(FetchError::FrameOutOfRange(index))?;

        if let Some(doc) = page.frame_docs.get(&index) {
            return Ok((frame_url, doc.clone()));
        }

        debug!(frame = index, url = %frame_url, "Loading frame document");
        let doc = self.get_text(frame_url.as_str()).await?;

        if let Some(page) = self.page.as_mut() {
            page.frame_docs.insert(index, doc.clone());
        }

        Ok((frame_url, doc))
    }
}

#[async_trait]
impl PageSession for HttpPageSession {
    async fn open(&mut self, url: &str) -> Result<(), FetchError> {
        let base = Url::parse(url).map_err(|e| FetchError::InvalidUrl(format!("{url}: {e}")))?;
        let html = self.get_text(url).await?;
        let frames = resolve_attr(&html, &base, "iframe[src], frame[src]", "src");

        debug!(url = %base, bytes = html.len(), frames = frames.len(), "Page opened");

        self.page = Some(LoadedPage {
            frames: frames
                .iter()
                .filter_map(|f| Url::parse(f).ok())
                .collect(),
            url: base,
            html,
            frame_docs: HashMap::new(),
        });

        Ok(())
    }

    async fn frame_count(&mut self) -> Result<usize, FetchError> {
        Ok(self.page()?.frames.len())
    }

    async fn image_candidates(&mut self, scope: Scope) -> Result<Vec<String>, FetchError> {
        match scope {
            Scope::Top => {
                let page = self.page()?;
                let mut candidates = resolve_attr(&page.html, &page.url, "img[src]", "src");
                candidates.extend(resolve_attr(&page.html, &page.url, "a[href]", "href"));
                Ok(candidates)
            }
            Scope::Frame(index) => {
                let (frame_url, doc) = self.frame_document(index).await?;
                Ok(resolve_attr(&doc, &frame_url, "img[src]", "src"))
            }
        }
    }

    async fn page_source(&mut self, scope: Scope) -> Result<String, FetchError> {
        match scope {
            Scope::Top => Ok(self.page()?.html.clone()),
            Scope::Frame(index) => Ok(self.frame_document(index).await?.1),
        }
    }

    async fn download(&mut self, url: &str) -> Result<Bytes, FetchError> {
        let response = self.get(url).await?;
        Ok(response.bytes().await?)
    }
}

/// Collect `attr` of every element matching `selector`, resolved against `base`
fn resolve_attr(html: &str, base: &Url, selector: &str, attr: &str) -> Vec<String> {
    let Ok(selector) = Selector::parse(selector) else {
        return Vec::new();
    };

    let document = Html::parse_document(html);
    document
        .select(&selector)
        .filter_map(|el| el.value().attr(attr))
        .map(str::trim)
        .filter(|value| !value.is_empty() && !value.starts_with("data:"))
        .filter_map(|value| base.join(value).ok())
        .map(|url| url.to_string())
        .collect()
}

fn build_headers(identity: &SessionIdentity) -> HeaderMap {
    let mut headers = HeaderMap::new();

    if let Ok(value) = HeaderValue::from_str(&identity.user_agent) {
        headers.insert(USER_AGENT, value);
    }
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        ),
    );
    if let Ok(value) = HeaderValue::from_str(&identity.accept_language) {
        headers.insert(ACCEPT_LANGUAGE, value);
    }

    headers
}
