use anyhow::{bail, Context, Result};
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Attribute, Cell, Table};
use std::io::{BufRead, IsTerminal, Write};

use regcred::config::Config;
use regcred::{AuthError, CredentialRecord, Secret, SecretStore};

/// Read a password line from `reader`, without the trailing newline
fn read_password(reader: &mut impl BufRead, registry: &str) -> Result<Secret> {
    if std::io::stdin().is_terminal() {
        eprint!("Password for {}: ", registry);
        std::io::stderr().flush().ok();
    }

    let mut line = String::new();
    reader
        .read_line(&mut line)
        .context("Failed to read password from stdin")?;

    let password = line.trim_end_matches(['\r', '\n']);
    if password.is_empty() {
        bail!("Password must not be empty");
    }
    Ok(Secret::new(password))
}

/// Register a registry, reading its password from stdin
pub async fn add_registry(config: &mut Config, url: &str, username: Option<String>) -> Result<()> {
    add_registry_from(config, url, username, &mut std::io::stdin().lock()).await
}

async fn add_registry_from(
    config: &mut Config,
    url: &str,
    username: Option<String>,
    reader: &mut impl BufRead,
) -> Result<()> {
    let record = CredentialRecord::new(url, username);

    // Nothing is touched until the new password is in hand
    let secret = if record.has_username() {
        Some(read_password(reader, record.normalized_url())?)
    } else {
        None
    };

    register(config, record, secret.as_ref()).await
}

/// Store the new secret, save the config, then drop the previous secret
async fn register(config: &mut Config, record: CredentialRecord, secret: Option<&Secret>) -> Result<()> {
    let store = config.secret_store()?;

    if let Some(secret) = secret {
        store
            .set_secret(&record, secret)
            .await
            .context("Failed to store registry secret")?;
    }

    let previous = config
        .find_registry(&record.url)
        .filter(|existing| existing.secret_key() != record.secret_key())
        .cloned();

    println!(
        "Registered {}{}",
        record.normalized_url(),
        if record.has_username() {
            format!(" as {}", record.username())
        } else {
            " (anonymous)".to_string()
        }
    );

    config.upsert_registry(record);
    config.save()?;

    if let Some(previous) = previous {
        store
            .delete_secret(&previous)
            .await
            .context("Failed to remove previous secret")?;
    }

    Ok(())
}

/// Forget a registry and delete its stored password
pub async fn remove_registry(config: &mut Config, url: &str) -> Result<()> {
    let Some(record) = config.remove_registry(url) else {
        bail!("Registry '{}' is not registered", url);
    };

    config
        .secret_store()?
        .delete_secret(&record)
        .await
        .context("Failed to delete registry secret")?;
    config.save()?;

    println!("Removed {}", record.normalized_url());
    Ok(())
}

/// List registered registries and whether a secret is stored for each
pub async fn list_registries(config: &Config) -> Result<()> {
    if config.registries.is_empty() {
        println!("No registries registered.");
        return Ok(());
    }

    let store = config.secret_store()?;

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("URL").add_attribute(Attribute::Bold),
            Cell::new("USERNAME").add_attribute(Attribute::Bold),
            Cell::new("SECRET").add_attribute(Attribute::Bold),
        ]);

    for record in &config.registries {
        let secret_state = if !record.has_username() {
            "-"
        } else {
            match store.get_secret(record).await {
                Ok(_) => "stored",
                Err(AuthError::SecretNotFound { .. }) => "missing",
                Err(e) => return Err(e).context("Failed to read secret store"),
            }
        };

        table.add_row(vec![
            Cell::new(record.normalized_url()),
            Cell::new(record.username.as_deref().unwrap_or("-")),
            Cell::new(secret_state),
        ]);
    }

    println!("{}", table);
    Ok(())
}
