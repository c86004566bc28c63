mod header;
mod transport;

pub use header::{basic_auth_header, bearer_auth_header, Authorize};
pub use transport::{ReqwestTransport, TokenRequest, TokenTransport};

use crate::challenge::ChallengeContext;
use crate::error::{AuthError, TransportError};
use crate::record::{CliAuth, CliCredentials, CredentialRecord};
use crate::secrets::SecretStore;
use reqwest::header::HeaderValue;
use reqwest::Method;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

/// Realms containing this path are served by a JWT endpoint that takes
/// `service` and `scope` as query parameters
const JWT_REALM_MARKER: &str = "/jwt/auth";

/// Methods tried, in order, against a password-grant token endpoint
const PASSWORD_GRANT_METHODS: [Method; 2] = [Method::POST, Method::GET];

/// How a request gets authorized, decided once from the challenge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStrategy<'a> {
    /// No challenge: send basic credentials directly
    Basic,
    /// Exchange basic credentials for a token with a single GET
    JwtExchange(&'a ChallengeContext),
    /// OAuth password grant, POST with GET fallback
    PasswordGrant(&'a ChallengeContext),
}

impl<'a> AuthStrategy<'a> {
    /// Any realm containing `/jwt/auth` anywhere in its URL selects the JWT exchange.
    pub fn select(challenge: Option<&'a ChallengeContext>) -> Self {
        match challenge {
            None => AuthStrategy::Basic,
            Some(ctx) if ctx.realm.as_str().contains(JWT_REALM_MARKER) => {
                AuthStrategy::JwtExchange(ctx)
            }
            Some(ctx) => AuthStrategy::PasswordGrant(ctx),
        }
    }
}

/// Tunables for [`CredentialResolver`]
#[derive(Debug, Clone)]
pub struct ResolverSettings {
    /// Number of methods tried against a password-grant endpoint (1 or 2)
    pub password_grant_attempts: usize,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            password_grant_attempts: PASSWORD_GRANT_METHODS.len(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
}

/// Computes registry `Authorization` headers and container CLI credentials
///
/// Holds no per-call state; share it behind an `Arc` and call it concurrently.
/// Secrets and tokens are fetched fresh on every call and never cached or logged.
pub struct CredentialResolver {
    secrets: Arc<dyn SecretStore>,
    transport: Arc<dyn TokenTransport>,
    settings: ResolverSettings,
}

impl CredentialResolver {
    pub fn new(secrets: Arc<dyn SecretStore>, transport: Arc<dyn TokenTransport>) -> Self {
        Self::with_settings(secrets, transport, ResolverSettings::default())
    }

    pub fn with_settings(
        secrets: Arc<dyn SecretStore>,
        transport: Arc<dyn TokenTransport>,
        settings: ResolverSettings,
    ) -> Self {
        Self {
            secrets,
            transport,
            settings,
        }
    }

    /// Attach an `Authorization` header for `record` to `request`
    ///
    /// Without a challenge this is basic auth and makes no network call.
    /// With a challenge the basic credentials are exchanged for a bearer token first.
    pub async fn sign<R: Authorize + Send>(
        &self,
        record: &CredentialRecord,
        request: &mut R,
        challenge: Option<&ChallengeContext>,
    ) -> Result<(), AuthError> {
        let value = self.authorization(record, challenge).await?;
        request.set_authorization(value);
        Ok(())
    }

    /// Compute the `Authorization` header value for `record`
    pub async fn authorization(
        &self,
        record: &CredentialRecord,
        challenge: Option<&ChallengeContext>,
    ) -> Result<HeaderValue, AuthError> {
        let secret = self.secrets.get_secret(record).await?;
        let basic = basic_auth_header(record.username(), secret.expose())?;

        match AuthStrategy::select(challenge) {
            AuthStrategy::Basic => {
                debug!("Using basic auth for {}", record.normalized_url());
                Ok(basic)
            }
            AuthStrategy::JwtExchange(ctx) => {
                let token = self.jwt_exchange(ctx, basic).await?;
                bearer_auth_header(&token)
            }
            AuthStrategy::PasswordGrant(ctx) => {
                let token = self.password_grant(ctx, basic).await?;
                bearer_auth_header(&token)
            }
        }
    }

    /// Credentials for logging a container CLI into the registry
    ///
    /// The secret store is only consulted when the record has a username.
    pub async fn cli_credentials(
        &self,
        record: &CredentialRecord,
    ) -> Result<CliCredentials, AuthError> {
        let auth = match &record.username {
            Some(username) if !username.is_empty() => Some(CliAuth {
                username: username.clone(),
                password: self.secrets.get_secret(record).await?,
            }),
            _ => None,
        };

        Ok(CliCredentials {
            registry_path: record.url.clone(),
            auth,
        })
    }

    async fn jwt_exchange(
        &self,
        ctx: &ChallengeContext,
        authorization: HeaderValue,
    ) -> Result<String, AuthError> {
        let request = TokenRequest {
            method: Method::GET,
            url: jwt_token_url(ctx),
            authorization,
            form: None,
        };

        info!(
            "Requesting JWT from {} (service: {}, scope: {})",
            ctx.realm, ctx.service, ctx.scope
        );

        let body = self
            .transport
            .send(&request)
            .await
            .map_err(|e| exchange_failed(ctx, &request.method, e))?;

        parse_token(ctx, &request.method, &body)
    }

    async fn password_grant(
        &self,
        ctx: &ChallengeContext,
        authorization: HeaderValue,
    ) -> Result<String, AuthError> {
        let attempts = self
            .settings
            .password_grant_attempts
            .clamp(1, PASSWORD_GRANT_METHODS.len());

        let mut request = TokenRequest {
            method: Method::POST,
            url: ctx.realm.clone(),
            authorization,
            form: Some(vec![
                ("grant_type", "password".to_string()),
                ("service", ctx.service.clone()),
                ("scope", ctx.scope.clone()),
            ]),
        };

        info!(
            "Requesting token from {} via password grant (service: {}, scope: {})",
            ctx.realm, ctx.service, ctx.scope
        );

        let mut attempt = 0;
        let body = loop {
            request.method = PASSWORD_GRANT_METHODS[attempt].clone();

            match self.transport.send(&request).await {
                Ok(body) => break body,
                Err(e) => {
                    attempt += 1;
                    if attempt >= attempts {
                        return Err(exchange_failed(ctx, &request.method, e));
                    }
                    warn!(
                        "Token request {} {} failed, retrying with {}: {}",
                        request.method, ctx.realm, PASSWORD_GRANT_METHODS[attempt], e
                    );
                }
            }
        };

        parse_token(ctx, &request.method, &body)
    }
}

/// Realm URL with `service` and `scope` query parameters set, replacing
/// any existing values and keeping other parameters
fn jwt_token_url(ctx: &ChallengeContext) -> Url {
    let mut url = ctx.realm.clone();
    let retained: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != "service" && key != "scope")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    url.query_pairs_mut()
        .clear()
        .extend_pairs(retained)
        .append_pair("service", &ctx.service)
        .append_pair("scope", &ctx.scope);
    url
}

fn parse_token(ctx: &ChallengeContext, method: &Method, body: &[u8]) -> Result<String, AuthError> {
    let response: TokenResponse = serde_json::from_slice(body).map_err(|e| AuthError::TokenExchangeFailed {
        realm: ctx.realm.to_string(),
        method: method.clone(),
        reason: format!("invalid token response: {}", e),
    })?;

    match response.token {
        Some(token) if !token.is_empty() => Ok(token),
        _ => Err(AuthError::TokenExchangeFailed {
            realm: ctx.realm.to_string(),
            method: method.clone(),
            reason: "response has no token".to_string(),
        }),
    }
}

fn exchange_failed(ctx: &ChallengeContext, method: &Method, error: TransportError) -> AuthError {
    AuthError::TokenExchangeFailed {
        realm: ctx.realm.to_string(),
        method: method.clone(),
        reason: error.to_string(),
    }
}
