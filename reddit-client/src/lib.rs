pub mod api;
pub mod auth;
pub mod client;

pub use api::{RedditApiClient, DEFAULT_PAGE_SIZE};
pub use auth::{Authenticator, GrantType, RedditCredentials, RedditToken, DEFAULT_USER_AGENT};
pub use client::RedditClient;
