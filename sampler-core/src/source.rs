use crate::error::CoreError;
use crate::types::{RawItem, SearchPage};
use async_trait::async_trait;

/// Paginated search backend queried by the fetch loop.
///
/// Implementations report rate limiting as
/// [`RedditApiError::RateLimitExceeded`](crate::RedditApiError::RateLimitExceeded)
/// and rejected credentials as
/// [`RedditApiError::InvalidToken`](crate::RedditApiError::InvalidToken) so the
/// caller can tell throttling, transient and fatal failures apart.
#[async_trait]
pub trait SearchApi: Send {
    /// One page of posts in `community` matching `query`, newest first.
    async fn search(
        &mut self,
        community: &str,
        query: &str,
        after: Option<&str>,
    ) -> Result<SearchPage, CoreError>;

    /// Top-level comments of a post, at most `limit`.
    async fn comments(
        &mut self,
        community: &str,
        post_id: &str,
        limit: usize,
    ) -> Result<Vec<RawItem>, CoreError>;

    /// Drop the current credentials and acquire fresh ones.
    async fn reauthenticate(&mut self) -> Result<(), CoreError>;
}
