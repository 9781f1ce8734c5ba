use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use clusterflow_core::{CredentialStore, Secret};
use colored::Colorize;
use std::io::Write;

pub async fn handle_list<W: Write>(out: &mut W, secrets: &CredentialStore) -> anyhow::Result<()> {
    let ids = secrets.list().await?;
    if ids.is_empty() {
        writeln!(out, "{}", "No secrets".dimmed())?;
        return Ok(());
    }
    for id in ids {
        writeln!(out, "{}", id)?;
    }
    Ok(())
}

pub async fn handle_get<W: Write>(
    out: &mut W,
    secrets: &CredentialStore,
    id: &str,
) -> anyhow::Result<()> {
    let secret = secrets.get(id).await?;
    writeln!(out, "{}", printable(&secret))?;
    Ok(())
}

/// Prints the secret for `id`, generating it first if needed
pub async fn handle_create<W: Write>(
    out: &mut W,
    secrets: &CredentialStore,
    id: &str,
) -> anyhow::Result<bool> {
    let (secret, created) = secrets.get_or_create(id).await?;
    if created {
        eprintln!("{}", format!("✓ Created secret {}", id).green());
    } else {
        eprintln!("{}", format!("Secret {} already exists", id).dimmed());
    }
    writeln!(out, "{}", printable(&secret))?;
    Ok(created)
}

/// UTF-8 secrets print as-is, anything else as base64
fn printable(secret: &Secret) -> String {
    match secret.as_str() {
        Some(s) => s.to_string(),
        None => STANDARD.encode(&secret.data),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clusterflow_core::{MemoryPathStore, VfsStateStore};
    use std::sync::Arc;

    fn store() -> CredentialStore {
        VfsStateStore::new(Arc::new(MemoryPathStore::new()), "c1")
            .unwrap()
            .secrets()
    }

    #[tokio::test]
    async fn test_create_then_get_prints_same_value() {
        let secrets = store();

        let mut created = Vec::new();
        assert!(handle_create(&mut created, &secrets, "kube").await.unwrap());

        let mut again = Vec::new();
        assert!(!handle_create(&mut again, &secrets, "kube").await.unwrap());
        assert_eq!(created, again);

        let mut fetched = Vec::new();
        handle_get(&mut fetched, &secrets, "kube").await.unwrap();
        assert_eq!(created, fetched);
    }

    #[tokio::test]
    async fn test_list() {
        let secrets = store();
        let mut out = Vec::new();
        handle_list(&mut out, &secrets).await.unwrap();
        assert!(String::from_utf8(out).unwrap().contains("No secrets"));

        secrets.get_or_create("b").await.unwrap();
        secrets.get_or_create("a").await.unwrap();

        let mut out = Vec::new();
        handle_list(&mut out, &secrets).await.unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "a\nb\n");
    }

    #[tokio::test]
    async fn test_get_missing() {
        let mut out = Vec::new();
        assert!(handle_get(&mut out, &store(), "nope").await.is_err());
    }

    #[test]
    fn test_binary_secret_prints_base64() {
        assert_eq!(printable(&Secret::new(vec![0xff, 0x00])), "/wA=");
        assert_eq!(printable(&Secret::new("token")), "token");
    }
}
