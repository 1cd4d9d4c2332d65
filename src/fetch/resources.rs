//! Automation resources around page sessions
//!
//! The fetcher never builds sessions itself. It asks an
//! [`AutomationResources`] implementation for one per attempt and hands it
//! back afterwards, purging stale processes and temporary files around every
//! attempt.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use tracing::{debug, warn};

use super::session::{HttpPageSession, PageSession};
use crate::utils::error::FetchError;

/// Pool of realistic desktop User-Agent strings
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/144.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/144.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/144.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:135.0) Gecko/20100101 Firefox/135.0",
];

const ACCEPT_LANGUAGE: &str = "uk-UA,uk;q=0.9,en-US;q=0.8,en;q=0.7";

/// How a session presents itself to the source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    pub user_agent: String,
    pub accept_language: String,
}

impl SessionIdentity {
    /// Identity with a user agent drawn from the built-in pool
    pub fn random() -> Self {
        let mut rng = rand::thread_rng();
        let user_agent = USER_AGENTS.choose(&mut rng).unwrap_or(&USER_AGENTS[0]);
        Self::with_user_agent(*user_agent)
    }

    pub fn with_user_agent(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            accept_language: ACCEPT_LANGUAGE.to_string(),
        }
    }

    /// Configured user agent if any, otherwise a random one
    pub fn resolve(configured: Option<&str>) -> Self {
        match configured {
            Some(ua) if !ua.trim().is_empty() => Self::with_user_agent(ua),
            _ => Self::random(),
        }
    }
}

/// Manager of the heavyweight resources a fetch attempt needs
#[async_trait]
pub trait AutomationResources: Send + Sync {
    /// Start a session presenting `identity`
    async fn acquire_session(
        &self,
        headless: bool,
        identity: &SessionIdentity,
    ) -> Result<Box<dyn PageSession>, FetchError>;

    /// Tear a session down
    async fn release(&self, session: Box<dyn PageSession>);

    /// Kill automation processes left behind by earlier attempts
    async fn purge_stale_processes(&self);

    /// Remove temporary files left behind by earlier attempts
    async fn clear_temp_artifacts(&self);
}

/// Resources for [`HttpPageSession`]
///
/// No external processes are involved; purging is a no-op. Temporary
/// artifacts are whatever files live in the optional scratch directory.
#[derive(Debug, Clone)]
pub struct HttpResources {
    request_timeout: Duration,
    scratch_dir: Option<PathBuf>,
}

impl HttpResources {
    pub fn new(request_timeout: Duration) -> Self {
        Self {
            request_timeout,
            scratch_dir: None,
        }
    }

    /// Directory whose files are removed around every attempt
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }
}

impl Default for HttpResources {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl AutomationResources for HttpResources {
    async fn acquire_session(
        &self,
        headless: bool,
        identity: &SessionIdentity,
    ) -> Result<Box<dyn PageSession>, FetchError> {
        debug!(headless = headless, user_agent = %identity.user_agent, "Acquiring HTTP session");
        let session = HttpPageSession::new(identity, self.request_timeout)?;
        Ok(Box::new(session))
    }

    async fn release(&self, session: Box<dyn PageSession>) {
        drop(session);
    }

    async fn purge_stale_processes(&self) {}

    async fn clear_temp_artifacts(&self) {
        let Some(dir) = &self.scratch_dir else {
            return;
        };

        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Cannot read scratch directory");
                return;
            }
        };

        let mut removed = 0usize;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
            if is_file {
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => removed += 1,
                    Err(e) => warn!(path = %path.display(), error = %e, "Cannot remove scratch file"),
                }
            }
        }

        if removed > 0 {
            debug!(dir = %dir.display(), removed = removed, "Scratch directory cleared");
        }
    }
}
