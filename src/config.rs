//! Engine settings, injected into every [`Crud`](crate::Crud) at construction.

use std::env;
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use serde::Deserialize;
use serde_with::{DurationMilliSeconds, serde_as};

/// Upper bound on `size`, and the default page size when an entity does not set one.
pub const DEFAULT_MAX_PAGE_SIZE: u64 = 100;

/// How many results are post-processed concurrently.
pub const DEFAULT_POST_PROCESSING_BATCH_SIZE: usize = 50;

/// Immutable engine settings.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CrudSettings {
    /// Global cap for page sizes (default: 100).
    pub max_page_size: u64,

    /// Chunk size of the post-processing pipeline (default: 50).
    pub post_processing_batch_size: usize,

    /// Deadline for one query execution. `None` waits indefinitely.
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    #[serde(rename = "query_timeout_ms")]
    pub query_timeout: Option<Duration>,

    /// Deadline for one post-processing call. `None` waits indefinitely.
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    #[serde(rename = "post_process_timeout_ms")]
    pub post_process_timeout: Option<Duration>,
}

impl Default for CrudSettings {
    fn default() -> Self {
        Self {
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
            post_processing_batch_size: DEFAULT_POST_PROCESSING_BATCH_SIZE,
            query_timeout: None,
            post_process_timeout: None,
        }
    }
}

impl CrudSettings {
    /// Load settings from `CRUD_*` environment variables, falling back to defaults.
    ///
    /// # Errors
    ///
    /// Fails when a variable is set but does not parse, or when a size is zero.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`CrudSettings::from_env`] with an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Fails when a variable is set but does not parse, or when a size is zero.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let max_page_size = match lookup("CRUD_MAX_PAGE_SIZE") {
            Some(raw) => raw
                .trim()
                .parse()
                .context("CRUD_MAX_PAGE_SIZE must be a valid u64")?,
            None => defaults.max_page_size,
        };
        ensure!(max_page_size > 0, "CRUD_MAX_PAGE_SIZE must be positive");

        let post_processing_batch_size = match lookup("CRUD_POST_PROCESSING_BATCH_SIZE") {
            Some(raw) => raw
                .trim()
                .parse()
                .context("CRUD_POST_PROCESSING_BATCH_SIZE must be a valid usize")?,
            None => defaults.post_processing_batch_size,
        };
        ensure!(
            post_processing_batch_size > 0,
            "CRUD_POST_PROCESSING_BATCH_SIZE must be positive"
        );

        let query_timeout = lookup("CRUD_QUERY_TIMEOUT_MS")
            .map(|raw| parse_millis(&raw).context("CRUD_QUERY_TIMEOUT_MS must be milliseconds"))
            .transpose()?;

        let post_process_timeout = lookup("CRUD_POST_PROCESS_TIMEOUT_MS")
            .map(|raw| {
                parse_millis(&raw).context("CRUD_POST_PROCESS_TIMEOUT_MS must be milliseconds")
            })
            .transpose()?;

        Ok(Self {
            max_page_size,
            post_processing_batch_size,
            query_timeout,
            post_process_timeout,
        })
    }

    #[must_use]
    pub fn with_max_page_size(mut self, max_page_size: u64) -> Self {
        self.max_page_size = max_page_size.max(1);
        self
    }

    #[must_use]
    pub fn with_post_processing_batch_size(mut self, batch_size: usize) -> Self {
        self.post_processing_batch_size = batch_size.max(1);
        self
    }

    #[must_use]
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_post_process_timeout(mut self, timeout: Duration) -> Self {
        self.post_process_timeout = Some(timeout);
        self
    }
}

fn parse_millis(raw: &str) -> Result<Duration> {
    let millis: u64 = raw.trim().parse()?;
    Ok(Duration::from_millis(millis))
}
