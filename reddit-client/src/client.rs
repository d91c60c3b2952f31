use crate::api::RedditApiClient;
use crate::auth::{Authenticator, RedditCredentials, RedditToken};
use async_trait::async_trait;
use sampler_core::{CoreError, RawItem, SearchApi, SearchPage};
use tracing::{debug, info};

/// Authenticated Reddit search backend.
///
/// A token is acquired once and reused; it is refreshed only when close to
/// expiry or when the caller asks for re-authentication after a 401.
#[derive(Debug)]
pub struct RedditClient {
    api: RedditApiClient,
    authenticator: Authenticator,
    token: Option<RedditToken>,
}

impl RedditClient {
    pub fn new(credentials: RedditCredentials) -> Result<Self, CoreError> {
        let api = RedditApiClient::new(credentials.user_agent.clone())?;
        let authenticator = Authenticator::new(credentials)?;
        Ok(Self::from_parts(api, authenticator))
    }

    pub fn from_parts(api: RedditApiClient, authenticator: Authenticator) -> Self {
        Self {
            api,
            authenticator,
            token: None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.as_ref().is_some_and(|token| !token.is_expired())
    }

    pub fn needs_refresh(&self) -> bool {
        self.token.as_ref().map_or(true, RedditToken::needs_refresh)
    }

    pub async fn authenticate(&mut self) -> Result<(), CoreError> {
        let token = self.authenticator.request_token().await?;
        self.token = Some(token);
        Ok(())
    }

    async fn access_token(&mut self) -> Result<String, CoreError> {
        if self.needs_refresh() {
            debug!("Access token missing or near expiry; requesting a new one");
            self.authenticate().await?;
        }
        match &self.token {
            Some(token) => Ok(token.access_token.clone()),
            None => Err(CoreError::Internal {
                message: "authentication produced no token".to_string(),
            }),
        }
    }
}

#[async_trait]
impl SearchApi for RedditClient {
    async fn search(
        &mut self,
        community: &str,
        query: &str,
        after: Option<&str>,
    ) -> Result<SearchPage, CoreError> {
        let token = self.access_token().await?;
        let listing = self.api.search_posts(&token, community, query, after).await?;
        Ok(SearchPage::from(listing))
    }

    async fn comments(
        &mut self,
        _community: &str,
        post_id: &str,
        limit: usize,
    ) -> Result<Vec<RawItem>, CoreError> {
        let token = self.access_token().await?;
        let comments = self.api.get_comments(&token, post_id, limit).await?;
        Ok(comments
            .into_iter()
            .filter_map(|comment| comment.into_raw_item())
            .collect())
    }

    async fn reauthenticate(&mut self) -> Result<(), CoreError> {
        info!("Re-authenticating with Reddit");
        self.token = None;
        self.authenticate().await
    }
}
