use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, Response, StatusCode};
use sampler_core::{ConfigError, CoreError, ItemKind, RawItem, RedditApiError, SearchPage};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error, warn};
use url::Url;

const REDDIT_API_BASE: &str = "https://oauth.reddit.com";

/// Reddit's maximum listing page size.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Deserialize)]
pub struct RedditListing<T> {
    pub data: RedditListingData<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedditListingData<T> {
    pub children: Vec<RedditListingChild<T>>,
    pub after: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedditListingChild<T> {
    pub kind: String,
    pub data: T,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedditPostData {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub selftext: String,
    #[serde(default)]
    pub subreddit: String,
    #[serde(default)]
    pub created_utc: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedditCommentData {
    pub id: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub subreddit: String,
    #[serde(default)]
    pub created_utc: f64,
}

fn created_at(created_utc: f64) -> Option<DateTime<Utc>> {
    if created_utc <= 0.0 {
        return None;
    }
    Utc.timestamp_opt(created_utc as i64, 0).single()
}

impl RedditPostData {
    /// Title and body, the text sampled for a post.
    pub fn text(&self) -> String {
        if self.selftext.trim().is_empty() {
            self.title.clone()
        } else {
            format!("{}\n{}", self.title, self.selftext)
        }
    }

    /// `None` for posts without a creation time.
    pub fn into_raw_item(self) -> Option<RawItem> {
        let created_at = created_at(self.created_utc)?;
        Some(RawItem {
            text: self.text(),
            id: self.id,
            kind: ItemKind::Post,
            created_at,
            community: self.subreddit,
        })
    }
}

impl RedditCommentData {
    pub fn into_raw_item(self) -> Option<RawItem> {
        let created_at = created_at(self.created_utc)?;
        Some(RawItem {
            id: self.id,
            kind: ItemKind::Comment,
            text: self.body,
            created_at,
            community: self.subreddit,
        })
    }
}

impl From<RedditListing<RedditPostData>> for SearchPage {
    fn from(listing: RedditListing<RedditPostData>) -> Self {
        let items = listing
            .data
            .children
            .into_iter()
            .filter(|child| child.kind == "t3")
            .filter_map(|child| child.data.into_raw_item())
            .collect();

        SearchPage {
            items,
            next_cursor: listing.data.after.filter(|after| !after.is_empty()),
        }
    }
}

/// Maps a non-success status to the error the fetch loop acts on.
pub fn classify_status(
    status: StatusCode,
    headers: &HeaderMap,
    endpoint: &str,
) -> Option<RedditApiError> {
    if status.is_success() {
        return None;
    }

    let error = match status.as_u16() {
        429 => RedditApiError::RateLimitExceeded {
            retry_after: retry_after_hint(headers),
        },
        401 => RedditApiError::InvalidToken,
        403 => RedditApiError::Forbidden {
            resource: endpoint.to_string(),
        },
        404 => not_found(endpoint),
        code if status.is_server_error() => RedditApiError::ServerError { status_code: code },
        code => RedditApiError::UnexpectedStatus {
            status_code: code,
            endpoint: endpoint.to_string(),
        },
    };
    Some(error)
}

/// `Retry-After`, falling back to Reddit's `x-ratelimit-reset` (seconds).
fn retry_after_hint(headers: &HeaderMap) -> Option<u64> {
    [RETRY_AFTER.as_str(), "x-ratelimit-reset"]
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.trim().parse::<f64>().ok())
        .map(|seconds| seconds.max(0.0).ceil() as u64)
        .next()
}

fn not_found(endpoint: &str) -> RedditApiError {
    let mut segments = endpoint.trim_start_matches('/').split('/');
    match (segments.next(), segments.next()) {
        (Some("r"), Some(subreddit)) => RedditApiError::SubredditNotFound {
            subreddit: subreddit.to_string(),
        },
        (Some("comments"), Some(post_id)) => RedditApiError::PostNotFound {
            post_id: post_id.to_string(),
        },
        _ => RedditApiError::InvalidResponse {
            details: format!("Resource not found: {}", endpoint),
        },
    }
}

/// Top-level `t1` comments from a `/comments/{id}` response, which is a
/// two-element array of the post listing and the comment listing.
pub fn parse_comment_listing(body: &str, limit: usize) -> Result<Vec<RedditCommentData>, CoreError> {
    let listings: Vec<RedditListing<serde_json::Value>> =
        serde_json::from_str(body).map_err(|e| {
            CoreError::RedditApi(RedditApiError::InvalidResponse {
                details: format!("Failed to parse comment listing: {e}"),
            })
        })?;

    let Some(comment_listing) = listings.into_iter().nth(1) else {
        return Ok(Vec::new());
    };

    let comments = comment_listing
        .data
        .children
        .into_iter()
        .filter(|child| child.kind == "t1")
        .filter_map(|child| match serde_json::from_value::<RedditCommentData>(child.data) {
            Ok(comment) => Some(comment),
            Err(e) => {
                debug!("Skipping malformed comment: {}", e);
                None
            }
        })
        .take(limit)
        .collect();
    Ok(comments)
}

#[derive(Debug)]
pub struct RedditApiClient {
    http_client: Client,
    base_url: Url,
    user_agent: String,
    page_size: u32,
}

impl RedditApiClient {
    pub fn new(user_agent: String) -> Result<Self, CoreError> {
        Self::with_base_url(user_agent, REDDIT_API_BASE)
    }

    pub fn with_base_url(user_agent: String, base_url: &str) -> Result<Self, CoreError> {
        let base_url = Url::parse(base_url).map_err(|e| ConfigError::InvalidValue {
            field: "api base url".to_string(),
            value: format!("{base_url} ({e})"),
        })?;

        let http_client = Client::builder()
            .user_agent(&user_agent)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http_client,
            base_url,
            user_agent,
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.clamp(1, DEFAULT_PAGE_SIZE);
        self
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub async fn make_request(
        &self,
        endpoint: &str,
        access_token: &str,
        query_params: &[(&str, String)],
    ) -> Result<Response, CoreError> {
        let url = self.base_url.join(endpoint).map_err(|e| {
            CoreError::Internal {
                message: format!("invalid endpoint {endpoint}: {e}"),
            }
        })?;

        debug!("Making Reddit API request: GET {}", endpoint);
        let response = self
            .http_client
            .get(url)
            .bearer_auth(access_token)
            .query(query_params)
            .send()
            .await
            .map_err(|e| {
                error!("Network error for GET {}: {}", endpoint, e);
                if e.is_timeout() {
                    CoreError::RedditApi(RedditApiError::RequestTimeout)
                } else {
                    CoreError::Network(e)
                }
            })?;

        if let Some(remaining) = response
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
        {
            debug!("Reddit rate limit remaining: {}", remaining);
        }

        if let Some(api_error) = classify_status(response.status(), response.headers(), endpoint) {
            warn!("Request failed with status {} for {}", response.status(), endpoint);
            return Err(CoreError::RedditApi(api_error));
        }

        Ok(response)
    }

    async fn decode<T: DeserializeOwned>(response: Response, what: &str) -> Result<T, CoreError> {
        response.json::<T>().await.map_err(|e| {
            error!("Failed to parse {}: {}", what, e);
            CoreError::RedditApi(RedditApiError::InvalidResponse {
                details: format!("Failed to parse {what}"),
            })
        })
    }

    /// Newest-first search restricted to one subreddit.
    pub async fn search_posts(
        &self,
        access_token: &str,
        subreddit: &str,
        query: &str,
        after: Option<&str>,
    ) -> Result<RedditListing<RedditPostData>, CoreError> {
        let endpoint = format!("/r/{}/search", subreddit);
        let mut params = vec![
            ("q", query.to_string()),
            ("restrict_sr", "1".to_string()),
            ("sort", "new".to_string()),
            ("t", "all".to_string()),
            ("limit", self.page_size.to_string()),
            ("raw_json", "1".to_string()),
        ];
        if let Some(after) = after {
            params.push(("after", after.to_string()));
        }

        let response = self.make_request(&endpoint, access_token, &params).await?;
        let listing: RedditListing<RedditPostData> =
            Self::decode(response, &format!("search results for r/{subreddit}")).await?;

        debug!(
            "Retrieved {} posts from r/{} for '{}'",
            listing.data.children.len(),
            subreddit,
            query
        );
        Ok(listing)
    }

    pub async fn get_comments(
        &self,
        access_token: &str,
        post_id: &str,
        limit: usize,
    ) -> Result<Vec<RedditCommentData>, CoreError> {
        let endpoint = format!("/comments/{}", post_id);
        let params = [
            ("limit", limit.to_string()),
            ("depth", "1".to_string()),
            ("sort", "top".to_string()),
            ("raw_json", "1".to_string()),
        ];

        let response = self.make_request(&endpoint, access_token, &params).await?;
        let body = response.text().await?;
        let comments = parse_comment_listing(&body, limit)?;
        debug!("Retrieved {} comments for post {}", comments.len(), post_id);
        Ok(comments)
    }
}
