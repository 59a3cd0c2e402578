//! Continuation-token pagination
//!
//! Every collaborator lists in pages of `(items, next_token)`. [`paginate`]
//! turns such a page function into a lazy stream that fetches the next page
//! only once the buffered items are consumed.

use bridge_traits::error::{BridgeError, Result};
use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, TryStreamExt};
use std::collections::VecDeque;
use tracing::trace;

/// One page of results plus the token for the next page
pub type PageFuture<'a, T> = BoxFuture<'a, Result<(Vec<T>, Option<String>)>>;

struct PageState<F, T> {
    fetch: F,
    token: Option<String>,
    buffer: VecDeque<T>,
    done: bool,
    pages: u32,
}

/// Lazily walk every page produced by `fetch`.
///
/// `fetch` receives `None` for the first page and the previous page's token
/// afterwards. A missing or empty token ends the sequence. Items are yielded
/// in source order.
pub fn paginate<'a, T, F>(fetch: F) -> BoxStream<'a, Result<T>>
where
    T: Send + 'a,
    F: FnMut(Option<String>) -> PageFuture<'a, T> + Send + 'a,
{
    let initial_state = PageState {
        fetch,
        token: None,
        buffer: VecDeque::new(),
        done: false,
        pages: 0,
    };

    let stream = stream::try_unfold(initial_state, |mut state| async move {
        loop {
            if let Some(item) = state.buffer.pop_front() {
                return Ok::<_, BridgeError>(Some((item, state)));
            }

            if state.done {
                return Ok(None);
            }

            let (items, next) = (state.fetch)(state.token.take()).await?;
            state.pages += 1;
            trace!(page = state.pages, items = items.len(), "Fetched page");

            state.buffer = VecDeque::from(items);
            match next {
                Some(token) if !token.is_empty() => state.token = Some(token),
                _ => state.done = true,
            }
        }
    });

    Box::pin(stream)
}

/// Drain every page into a vector
pub async fn collect_all<'a, T, F>(fetch: F) -> Result<Vec<T>>
where
    T: Send + 'a,
    F: FnMut(Option<String>) -> PageFuture<'a, T> + Send + 'a,
{
    paginate(fetch).try_collect().await
}
