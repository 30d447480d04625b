use std::future::Future;
use std::time::Duration;

use futures::future::try_join_all;

use crate::errors::CrudError;

/// Run `f` over `items` in chunks of `chunk_size`.
///
/// Items of one chunk run concurrently; the next chunk starts once the whole chunk is done, so
/// at most `chunk_size` calls are in flight. Output order matches input order. Each call gets
/// its own `timeout`.
///
/// # Errors
///
/// The first error of a chunk aborts the pipeline. An expired deadline becomes
/// [`CrudError::UpstreamTimeout`].
pub async fn process_in_chunks<T, U, F, Fut>(
    items: Vec<T>,
    chunk_size: usize,
    timeout: Option<Duration>,
    f: F,
) -> Result<Vec<U>, CrudError>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<U, CrudError>>,
{
    let chunk_size = chunk_size.max(1);
    let mut processed = Vec::with_capacity(items.len());
    let mut items = items.into_iter().peekable();

    while items.peek().is_some() {
        let chunk = items
            .by_ref()
            .take(chunk_size)
            .map(|item| with_deadline(timeout, "post-processing", f(item)));
        processed.extend(try_join_all(chunk).await?);
    }
    Ok(processed)
}

pub(crate) async fn with_deadline<T>(
    timeout: Option<Duration>,
    operation: &str,
    future: impl Future<Output = Result<T, CrudError>>,
) -> Result<T, CrudError> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, future)
            .await
            .map_err(|_| CrudError::upstream_timeout(operation))?,
        None => future.await,
    }
}
