//! Credential loading for local runs.
//!
//! Sources, merged in order:
//! - a YAML/JSON file holding a list of credentials (or `{credentials: [...]}`)
//! - `BLUEPRINT_CREDENTIAL_<PLATFORM>=<secret>` environment variables

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use blueprint_engine::{Credential, StaticCredentialResolver};

const ENV_PREFIX: &str = "BLUEPRINT_CREDENTIAL_";

#[derive(Deserialize)]
#[serde(untagged)]
enum CredentialsFile {
    List(Vec<Credential>),
    Wrapped { credentials: Vec<Credential> },
}

/// Build a resolver from the optional file and the process environment.
pub fn load(path: Option<&Path>) -> Result<StaticCredentialResolver> {
    let mut credentials = match path {
        Some(path) => read_file(path)?,
        None => Vec::new(),
    };
    credentials.extend(from_env(std::env::vars_os().filter_map(|(key, value)| {
        Some((key.into_string().ok()?, value.into_string().ok()?))
    })));

    tracing::info!(count = credentials.len(), "Credentials loaded");
    Ok(StaticCredentialResolver::with_credentials(credentials))
}

fn read_file(path: &Path) -> Result<Vec<Credential>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read credentials file {}", path.display()))?;
    let file: CredentialsFile = serde_yaml::from_str(&content)
        .with_context(|| format!("Invalid credentials file {}", path.display()))?;

    Ok(match file {
        CredentialsFile::List(credentials) => credentials,
        CredentialsFile::Wrapped { credentials } => credentials,
    })
}

fn from_env(vars: impl IntoIterator<Item = (String, String)>) -> Vec<Credential> {
    vars.into_iter()
        .filter_map(|(key, secret)| {
            let platform = key.strip_prefix(ENV_PREFIX)?.to_ascii_lowercase();
            if platform.is_empty() {
                return None;
            }
            Some(Credential::new(format!("env-{}", platform), platform, secret))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_from_env() {
        let credentials = from_env(vec![
            ("BLUEPRINT_CREDENTIAL_SLACK".to_string(), "xoxb".to_string()),
            ("BLUEPRINT_CREDENTIAL_".to_string(), "ignored".to_string()),
            ("HOME".to_string(), "/root".to_string()),
        ]);

        assert_eq!(credentials.len(), 1);
        assert_eq!(credentials[0].id, "env-slack");
        assert_eq!(credentials[0].platform, "slack");
        assert_eq!(credentials[0].secret, "xoxb");
    }

    #[test]
    fn test_read_list_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "- id: gh\n  platform: github\n  secret: t0k3n\n- id: old\n  platform: slack\n  secret: x\n  active: false"
        )
        .unwrap();

        let credentials = read_file(file.path()).unwrap();
        assert_eq!(credentials.len(), 2);
        assert_eq!(credentials[0].secret, "t0k3n");
        assert!(credentials[0].active);
        assert!(!credentials[1].active);
    }

    #[test]
    fn test_read_wrapped_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"credentials": [{{"id": "s", "platform": "slack", "secret": "x", "automation_id": "auto-1"}}]}}"#
        )
        .unwrap();

        let credentials = read_file(file.path()).unwrap();
        assert_eq!(credentials[0].automation_id.as_deref(), Some("auto-1"));
    }

    #[test]
    fn test_missing_file() {
        assert!(read_file(Path::new("/nonexistent/creds.yaml")).is_err());
    }
}
