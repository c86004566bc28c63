// Container CLI login using resolved registry credentials

use anyhow::{bail, Context, Result};
use std::process::{Command, Stdio};
use tracing::{debug, info};

use regcred::record::registry_host_of;
use regcred::CliCredentials;

/// Arguments for `<cli> login`, password supplied separately on stdin
fn login_args(registry: &str, username: &str) -> Vec<String> {
    vec![
        "login".to_string(),
        registry.to_string(),
        "--username".to_string(),
        username.to_string(),
        "--password-stdin".to_string(),
    ]
}

/// Log the container CLI into the registry described by `credentials`
pub fn docker_login(container_cli: &str, credentials: &CliCredentials) -> Result<()> {
    let registry = registry_host_of(&credentials.registry_path);

    let Some(auth) = &credentials.auth else {
        info!(
            "No username configured for {}, skipping {} login",
            registry, container_cli
        );
        return Ok(());
    };

    let args = login_args(registry, &auth.username);
    debug!("Executing: {} {}", container_cli, args.join(" "));

    let status = Command::new(container_cli)
        .args(&args)
        .stdin(Stdio::piped())
        .spawn()
        .and_then(|mut child| {
            use std::io::Write;
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(auth.password.expose().as_bytes())?;
            }
            child.wait()
        })
        .with_context(|| format!("Failed to execute {} login", container_cli))?;

    if !status.success() {
        bail!("{} login failed with status: {}", container_cli, status);
    }

    info!("Logged {} into {}", container_cli, registry);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_args_never_contain_password() {
        let args = login_args("reg.example.com", "u");
        assert_eq!(
            args,
            vec!["login", "reg.example.com", "--username", "u", "--password-stdin"]
        );
    }

    #[test]
    fn test_login_without_auth_is_a_no_op() {
        let credentials = CliCredentials {
            registry_path: "https://public.example.com".to_string(),
            auth: None,
        };
        // The binary is never spawned when there is nothing to log in with
        docker_login("definitely-not-a-container-cli", &credentials).unwrap();
    }
}
