use crate::api::classify_status;
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use sampler_core::{ConfigError, CoreError, RedditApiError};
use serde::Deserialize;
use std::fmt;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};
use url::Url;

const REDDIT_AUTH_BASE: &str = "https://www.reddit.com";
const TOKEN_ENDPOINT: &str = "/api/v1/access_token";

pub const DEFAULT_USER_AGENT: &str = "methodical-sample by u/your_username";

/// Tokens this close to expiry are refreshed before the next request.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Script-app credentials. The password grant is used when a username and
/// password are present, the client-credentials grant otherwise.
#[derive(Clone)]
pub struct RedditCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub user_agent: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantType {
    Password,
    ClientCredentials,
}

impl RedditCredentials {
    pub fn new(client_id: String, client_secret: String, user_agent: String) -> Self {
        Self {
            client_id,
            client_secret,
            user_agent,
            username: None,
            password: None,
        }
    }

    pub fn with_password(mut self, username: String, password: String) -> Self {
        self.username = Some(username);
        self.password = Some(password);
        self
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads `CLIENT_ID`/`REDDIT_CLIENT_ID`, `CLIENT_SECRET`/`REDDIT_CLIENT_SECRET`,
    /// `USER_AGENT`/`REDDIT_USER_AGENT`, `REDDIT_USERNAME` and `REDDIT_PASSWORD`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let first_set = |keys: &[&str]| {
            keys.iter()
                .filter_map(|key| lookup(key))
                .map(|value| value.trim().to_string())
                .find(|value| !value.is_empty())
        };

        let client_id = first_set(&["CLIENT_ID", "REDDIT_CLIENT_ID"]).ok_or_else(|| {
            ConfigError::MissingEnvironmentVariable {
                var_name: "CLIENT_ID".to_string(),
            }
        })?;
        let client_secret =
            first_set(&["CLIENT_SECRET", "REDDIT_CLIENT_SECRET"]).ok_or_else(|| {
                ConfigError::MissingEnvironmentVariable {
                    var_name: "CLIENT_SECRET".to_string(),
                }
            })?;
        let user_agent = first_set(&["USER_AGENT", "REDDIT_USER_AGENT"])
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());

        let credentials = Self::new(client_id, client_secret, user_agent);
        match (first_set(&["REDDIT_USERNAME"]), first_set(&["REDDIT_PASSWORD"])) {
            (Some(username), Some(password)) => Ok(credentials.with_password(username, password)),
            (Some(_), None) => {
                warn!("REDDIT_USERNAME is set without REDDIT_PASSWORD; using app-only auth");
                Ok(credentials)
            }
            _ => Ok(credentials),
        }
    }

    pub fn grant(&self) -> GrantType {
        if self.username.is_some() && self.password.is_some() {
            GrantType::Password
        } else {
            GrantType::ClientCredentials
        }
    }
}

impl fmt::Debug for RedditCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedditCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("user_agent", &self.user_agent)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct RedditToken {
    pub access_token: String,
    pub expires_at: SystemTime,
    pub scope: Vec<String>,
}

impl RedditToken {
    pub fn is_expired(&self) -> bool {
        SystemTime::now() >= self.expires_at
    }

    pub fn needs_refresh(&self) -> bool {
        SystemTime::now() + REFRESH_MARGIN >= self.expires_at
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TokenEndpointResponse {
    Token {
        access_token: String,
        expires_in: u64,
        #[serde(default)]
        scope: String,
    },
    Error {
        error: String,
        #[serde(default)]
        message: Option<String>,
    },
}

/// Acquires bearer tokens from Reddit's token endpoint.
#[derive(Debug)]
pub struct Authenticator {
    http_client: Client,
    token_url: Url,
    credentials: RedditCredentials,
}

impl Authenticator {
    pub fn new(credentials: RedditCredentials) -> Result<Self, CoreError> {
        Self::with_base_url(credentials, REDDIT_AUTH_BASE)
    }

    pub fn with_base_url(credentials: RedditCredentials, base_url: &str) -> Result<Self, CoreError> {
        let token_url = Url::parse(base_url)
            .and_then(|base| base.join(TOKEN_ENDPOINT))
            .map_err(|e| ConfigError::InvalidValue {
                field: "auth base url".to_string(),
                value: format!("{base_url} ({e})"),
            })?;

        let http_client = Client::builder()
            .user_agent(&credentials.user_agent)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http_client,
            token_url,
            credentials,
        })
    }

    pub fn credentials(&self) -> &RedditCredentials {
        &self.credentials
    }

    pub async fn request_token(&self) -> Result<RedditToken, CoreError> {
        let grant = self.credentials.grant();
        let mut form: Vec<(&str, &str)> = Vec::with_capacity(3);
        match grant {
            GrantType::Password => {
                form.push(("grant_type", "password"));
                form.push(("username", self.credentials.username.as_deref().unwrap_or_default()));
                form.push(("password", self.credentials.password.as_deref().unwrap_or_default()));
            }
            GrantType::ClientCredentials => form.push(("grant_type", "client_credentials")),
        }

        debug!("Requesting Reddit access token using {:?} grant", grant);
        let response = self
            .http_client
            .post(self.token_url.clone())
            .basic_auth(&self.credentials.client_id, Some(&self.credentials.client_secret))
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CoreError::RedditApi(RedditApiError::RequestTimeout)
                } else {
                    CoreError::Network(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!("Token endpoint returned {}", status);
            return Err(CoreError::RedditApi(token_status_error(
                status,
                response.headers(),
            )));
        }

        let body = response.text().await?;
        let token = parse_token_response(&body, SystemTime::now())?;
        info!(
            "Authenticated with Reddit ({:?} grant, scope: {})",
            grant,
            token.scope.join(" ")
        );
        Ok(token)
    }
}

/// Throttling and server trouble on the token endpoint are retried like any
/// other request. Every other refusal means the credentials were rejected.
fn token_status_error(status: StatusCode, headers: &HeaderMap) -> RedditApiError {
    match classify_status(status, headers, TOKEN_ENDPOINT) {
        Some(error @ (RedditApiError::RateLimitExceeded { .. } | RedditApiError::ServerError { .. })) => {
            error
        }
        _ => RedditApiError::AuthenticationFailed {
            reason: format!("token endpoint returned {}", status),
        },
    }
}

/// Reddit answers bad credentials with `200 {"error": "invalid_grant"}`, so the
/// body decides success.
pub fn parse_token_response(body: &str, now: SystemTime) -> Result<RedditToken, CoreError> {
    let parsed: TokenEndpointResponse = serde_json::from_str(body).map_err(|e| {
        CoreError::RedditApi(RedditApiError::InvalidResponse {
            details: format!("unreadable token response: {e}"),
        })
    })?;

    match parsed {
        TokenEndpointResponse::Token {
            access_token,
            expires_in,
            scope,
        } => Ok(RedditToken {
            access_token,
            expires_at: now + Duration::from_secs(expires_in),
            scope: scope.split_whitespace().map(str::to_string).collect(),
        }),
        TokenEndpointResponse::Error { error, message } => {
            Err(CoreError::RedditApi(RedditApiError::AuthenticationFailed {
                reason: match message {
                    Some(message) => format!("{error}: {message}"),
                    None => error,
                },
            }))
        }
    }
}
