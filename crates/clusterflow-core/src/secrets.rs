//! Idempotent secret store
//!
//! Secrets live at `<base>/<id>` in a [`PathStore`] and are immutable once
//! written. Concurrent creators of the same id converge on a single value
//! through the store's exclusive create.

use crate::error::{ClusterError, Result};
use crate::vfs::{self, PathStore};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::sync::Arc;

/// Length of generated tokens
const TOKEN_LENGTH: usize = 32;

/// Opaque credential material
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    #[serde(serialize_with = "encode_data", deserialize_with = "decode_data")]
    pub data: Vec<u8>,
}

impl Secret {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }

    /// Random alphanumeric token
    pub fn generate() -> Self {
        let data: Vec<u8> = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(TOKEN_LENGTH)
            .collect();
        Self { data }
    }

    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.data).ok()
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secret")
            .field("data", &format_args!("<{} bytes>", self.data.len()))
            .finish()
    }
}

fn encode_data<S: Serializer>(data: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&STANDARD.encode(data))
}

fn decode_data<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Vec<u8>, D::Error> {
    let encoded = String::deserialize(deserializer)?;
    STANDARD
        .decode(encoded.as_bytes())
        .map_err(serde::de::Error::custom)
}

/// Secret store rooted at a directory of a [`PathStore`]
#[derive(Clone)]
pub struct CredentialStore {
    store: Arc<dyn PathStore>,
    base: String,
}

impl CredentialStore {
    pub fn new(store: Arc<dyn PathStore>, base: impl Into<String>) -> Self {
        Self {
            store,
            base: base.into(),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    fn secret_path(&self, id: &str) -> Result<String> {
        if id.is_empty() || id.contains('/') || id.starts_with('.') {
            return Err(ClusterError::config(format!("invalid secret id: {:?}", id)));
        }
        Ok(vfs::join(&self.base, id))
    }

    /// Looks up a secret; a missing secret is `Ok(None)`
    pub async fn find(&self, id: &str) -> Result<Option<Secret>> {
        let path = self.secret_path(id)?;
        self.load(&path).await
    }

    /// Looks up a secret that must exist
    pub async fn get(&self, id: &str) -> Result<Secret> {
        self.find(id)
            .await?
            .ok_or_else(|| ClusterError::NotFound(format!("secret {:?}", id)))
    }

    pub async fn list(&self) -> Result<Vec<String>> {
        self.store.read_dir(&self.base).await
    }

    /// Returns the secret for `id`, generating a random token if missing.
    ///
    /// The boolean is true when this call created the secret.
    pub async fn get_or_create(&self, id: &str) -> Result<(Secret, bool)> {
        self.get_or_create_with(id, || Ok(Secret::generate())).await
    }

    /// Like [`get_or_create`](Self::get_or_create) with caller-supplied
    /// material. `generate` is only invoked when the secret is missing.
    pub async fn get_or_create_with<F>(&self, id: &str, mut generate: F) -> Result<(Secret, bool)>
    where
        F: FnMut() -> Result<Secret> + Send,
    {
        let path = self.secret_path(id)?;

        // One retry: a lost race is expected once, a second collision is not.
        for attempt in 0..2 {
            if let Some(existing) = self.load(&path).await? {
                return Ok((existing, false));
            }

            let secret = generate()?;
            let data = serde_json::to_vec(&secret)?;

            match self.store.create_file(&path, &data).await {
                Ok(()) => {
                    self.verify_round_trip(&path, &secret).await?;
                    tracing::debug!("Created secret {}", id);
                    return Ok((secret, true));
                }
                Err(ClusterError::AlreadyExists(_)) if attempt == 0 => {
                    tracing::info!(
                        "Got already-exists error when writing secret {}; likely due to concurrent creation. Will retry",
                        id
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Err(ClusterError::AlreadyExists(path))
    }

    async fn load(&self, path: &str) -> Result<Option<Secret>> {
        let data = match self.store.read_file(path).await {
            Ok(data) => data,
            Err(ClusterError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        let secret = serde_json::from_slice(&data).map_err(|e| {
            ClusterError::Serialization(format!("error parsing secret from {:?}: {}", path, e))
        })?;
        Ok(Some(secret))
    }

    /// Re-reads a freshly created secret and checks it matches what was written
    async fn verify_round_trip(&self, path: &str, expected: &Secret) -> Result<()> {
        let corrupt = |message: String| ClusterError::CorruptData {
            path: path.to_string(),
            message,
        };

        let loaded = match self.load(path).await {
            Ok(Some(secret)) => secret,
            Ok(None) => return Err(corrupt("secret missing immediately after creation".into())),
            Err(e) => return Err(corrupt(format!("unable to load secret after creation: {}", e))),
        };

        if &loaded != expected {
            tracing::error!("Secret at {} does not round-trip", path);
            return Err(corrupt("stored secret differs from generated value".into()));
        }

        Ok(())
    }
}
