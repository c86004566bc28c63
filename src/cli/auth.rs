use anyhow::{bail, Context, Result};
use reqwest::header::WWW_AUTHENTICATE;
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

use regcred::config::Config;
use regcred::{ChallengeContext, CredentialRecord, CredentialResolver, ReqwestTransport};

use super::login;

/// Where the challenge for `header` comes from
#[derive(Debug, Default)]
pub struct ChallengeArgs {
    pub realm: Option<String>,
    pub service: Option<String>,
    pub scope: Option<String>,
    pub probe: Option<String>,
}

fn build_resolver(config: &Config) -> Result<CredentialResolver> {
    let transport = ReqwestTransport::with_timeout(config.http_timeout())
        .context("Failed to build HTTP client")?;
    let store = config.secret_store()?;
    Ok(CredentialResolver::with_settings(
        Arc::new(store),
        Arc::new(transport),
        config.resolver_settings(),
    ))
}

fn lookup<'a>(config: &'a Config, url: &str) -> Result<&'a CredentialRecord> {
    config.find_registry(url).with_context(|| {
        format!(
            "Registry '{}' is not registered (use 'regcred registry add')",
            url
        )
    })
}

/// Issue an unauthenticated GET and parse the bearer challenge from a 401
pub async fn probe_challenge(http_client: &Client, url: &str) -> Result<Option<ChallengeContext>> {
    debug!("Probing {} for an authentication challenge", url);

    let response = http_client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to probe {}", url))?;

    if response.status() != StatusCode::UNAUTHORIZED {
        info!("{} answered {} without a challenge", url, response.status());
        return Ok(None);
    }

    let Some(header) = response.headers().get(WWW_AUTHENTICATE) else {
        return Ok(None);
    };
    let header = header
        .to_str()
        .context("WWW-Authenticate header is not valid UTF-8")?;

    Ok(ChallengeContext::from_www_authenticate(header))
}

async fn challenge_from_args(config: &Config, args: ChallengeArgs) -> Result<Option<ChallengeContext>> {
    if let Some(probe_url) = args.probe {
        let http_client = Client::builder()
            .timeout(config.http_timeout())
            .build()
            .context("Failed to build HTTP client")?;
        return probe_challenge(&http_client, &probe_url).await;
    }

    let Some(realm) = args.realm else {
        if args.service.is_some() || args.scope.is_some() {
            bail!("--service and --scope require --realm");
        }
        return Ok(None);
    };

    let realm = Url::parse(&realm).with_context(|| format!("Invalid realm URL '{}'", realm))?;
    Ok(Some(ChallengeContext::new(
        realm,
        args.service.unwrap_or_default(),
        args.scope.unwrap_or_default(),
    )))
}

/// Print the Authorization header value for a registry request
pub async fn print_header(config: &Config, url: &str, args: ChallengeArgs) -> Result<()> {
    let record = lookup(config, url)?;
    if !record.has_username() {
        bail!(
            "Registry '{}' is registered without a username; it has no credentials to sign requests with",
            record.normalized_url()
        );
    }
    let challenge = challenge_from_args(config, args).await?;
    let resolver = build_resolver(config)?;

    let value = resolver
        .authorization(record, challenge.as_ref())
        .await
        .context("Failed to resolve Authorization header")?;

    println!(
        "{}",
        value
            .to_str()
            .context("Authorization header is not printable")?
    );
    Ok(())
}

/// Print the container CLI credential bundle as JSON
pub async fn print_credentials(config: &Config, url: &str) -> Result<()> {
    let record = lookup(config, url)?;
    let credentials = build_resolver(config)?
        .cli_credentials(record)
        .await
        .context("Failed to resolve registry credentials")?;

    println!(
        "{}",
        serde_json::to_string_pretty(&credentials).context("Failed to serialize credentials")?
    );
    Ok(())
}

/// Log the configured container CLI into a registry
pub async fn login_registry(config: &Config, url: &str, container_cli: Option<&str>) -> Result<()> {
    let record = lookup(config, url)?;
    let credentials = build_resolver(config)?
        .cli_credentials(record)
        .await
        .context("Failed to resolve registry credentials")?;

    let container_cli = container_cli
        .map(str::to_string)
        .unwrap_or_else(|| config.get_container_cli());
    login::docker_login(&container_cli, &credentials)
}
