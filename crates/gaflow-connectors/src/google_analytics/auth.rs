//! OAuth2 access tokens for the Google Analytics APIs.

use async_trait::async_trait;
use yup_oauth2::authenticator::DefaultAuthenticator;
use yup_oauth2::authorized_user::AuthorizedUserSecret;
use yup_oauth2::{AuthorizedUserAuthenticator, ServiceAccountAuthenticator};

use crate::error::ConnectorError;

use super::config::Credentials;

/// Read-only Analytics scope.
pub const ANALYTICS_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/analytics.readonly";

/// Source of bearer tokens.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Returns a valid access token, refreshing it when needed.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::AuthenticationFailed` when the credentials
    /// are rejected, or `ConnectorError::ConnectionFailed` when the token
    /// endpoint cannot be reached.
    async fn access_token(&self) -> Result<String, ConnectorError>;
}

/// [`TokenProvider`] backed by `yup-oauth2`, caching tokens in memory.
pub struct OAuthTokenProvider {
    authenticator: DefaultAuthenticator,
}

impl OAuthTokenProvider {
    /// Builds an authenticator for the given credentials.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::ConfigurationError` if a service-account key
    /// cannot be parsed, or `ConnectorError::ConnectionFailed` if the HTTP
    /// client cannot be built.
    pub async fn from_credentials(credentials: &Credentials) -> Result<Self, ConnectorError> {
        let authenticator = match credentials {
            Credentials::ServiceAccount { json_key } => {
                let key = yup_oauth2::parse_service_account_key(json_key).map_err(|e| {
                    ConnectorError::ConfigurationError(format!("invalid service-account key: {e}"))
                })?;
                ServiceAccountAuthenticator::builder(key).build().await
            }
            Credentials::RefreshToken {
                client_id,
                client_secret,
                refresh_token,
            } => {
                let secret = AuthorizedUserSecret {
                    client_id: client_id.clone(),
                    client_secret: client_secret.clone(),
                    refresh_token: refresh_token.clone(),
                    key_type: "authorized_user".to_string(),
                };
                AuthorizedUserAuthenticator::builder(secret).build().await
            }
        }
        .map_err(|e| ConnectorError::ConnectionFailed(format!("oauth client: {e}")))?;

        Ok(Self { authenticator })
    }
}

#[async_trait]
impl TokenProvider for OAuthTokenProvider {
    async fn access_token(&self) -> Result<String, ConnectorError> {
        let token = self
            .authenticator
            .token(&[ANALYTICS_READONLY_SCOPE])
            .await
            .map_err(classify_oauth_error)?;
        token
            .token()
            .map(str::to_string)
            .ok_or_else(|| ConnectorError::AuthenticationFailed("no access token issued".into()))
    }
}

impl std::fmt::Debug for OAuthTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthTokenProvider").finish_non_exhaustive()
    }
}

/// Rejections from the token endpoint (invalid grant, revoked key) are
/// credential problems; everything else is treated as a transport failure.
fn classify_oauth_error(err: yup_oauth2::Error) -> ConnectorError {
    match err {
        yup_oauth2::Error::AuthError(e) => ConnectorError::AuthenticationFailed(e.to_string()),
        other => ConnectorError::ConnectionFailed(format!("oauth token endpoint: {other}")),
    }
}
