//! Object storage: upload URL signing and object writes.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::debug;
use url::Url;

use super::ObjectStorage;
use crate::error::ClientError;

/// Signs `(key, expiry)` pairs with a shared secret.
///
/// The signature is `hex(sha256(secret ":" key ":" expires))`; the storage
/// side recomputes it and rejects uploads past `expires`.
#[derive(Clone)]
pub struct UrlSigner {
    secret: String,
}

impl UrlSigner {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    pub fn sign(&self, key: &str, expires: i64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.secret.as_bytes());
        hasher.update(b":");
        hasher.update(key.as_bytes());
        hasher.update(b":");
        hasher.update(expires.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn verify(&self, key: &str, expires: i64, signature: &str) -> bool {
        expires >= Utc::now().timestamp() && self.sign(key, expires) == signature
    }

    /// `{base}/{key}?expires=..&signature=..`
    pub fn presign(&self, base: &Url, key: &str, ttl: Duration) -> Result<String, ClientError> {
        let expires = Utc::now().timestamp() + ttl.as_secs() as i64;
        let mut url = object_url(base, key)?;
        url.query_pairs_mut()
            .append_pair("expires", &expires.to_string())
            .append_pair("signature", &self.sign(key, expires));
        Ok(url.to_string())
    }
}

fn object_url(base: &Url, key: &str) -> Result<Url, ClientError> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    Ok(base.join(key)?)
}

// ============================================================================
// HTTP
// ============================================================================

pub struct HttpObjectStorage {
    client: Client,
    base: Url,
    signer: UrlSigner,
}

impl HttpObjectStorage {
    pub fn new(base: Url, signer: UrlSigner) -> Self {
        Self {
            client: Client::new(),
            base,
            signer,
        }
    }
}

#[async_trait]
impl ObjectStorage for HttpObjectStorage {
    async fn presign_upload(&self, key: &str, ttl: Duration) -> Result<String, ClientError> {
        self.signer.presign(&self.base, key, ttl)
    }

    async fn put_object(&self, key: &str, body: Vec<u8>) -> Result<(), ClientError> {
        let url = object_url(&self.base, key)?;
        debug!(%url, bytes = body.len(), "Writing object");
        let response = self.client.put(url).body(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status {
                service: "object storage",
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// MEMORY
// ============================================================================

/// Keeps objects in a map; presigned URLs point at a local base.
pub struct MemoryObjectStorage {
    base: Url,
    signer: UrlSigner,
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryObjectStorage {
    pub fn new(base: Url, signer: UrlSigner) -> Self {
        Self {
            base,
            signer,
            objects: RwLock::new(HashMap::new()),
        }
    }

    pub async fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.read().await.get(key).cloned()
    }
}

#[async_trait]
impl ObjectStorage for MemoryObjectStorage {
    async fn presign_upload(&self, key: &str, ttl: Duration) -> Result<String, ClientError> {
        self.signer.presign(&self.base, key, ttl)
    }

    async fn put_object(&self, key: &str, body: Vec<u8>) -> Result<(), ClientError> {
        self.objects.write().await.insert(key.to_string(), body);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_depends_on_key_and_expiry() {
        let signer = UrlSigner::new("s3cret");
        let a = signer.sign("temp/a.zip", 100);
        assert_eq!(a.len(), 64);
        assert_ne!(a, signer.sign("temp/b.zip", 100));
        assert_ne!(a, signer.sign("temp/a.zip", 101));
        assert_ne!(a, UrlSigner::new("other").sign("temp/a.zip", 100));
    }

    #[test]
    fn test_presigned_url_verifies() {
        let signer = UrlSigner::new("s3cret");
        let base = Url::parse("https://objects.example/bucket").unwrap();
        let url = signer
            .presign(&base, "temp/abc.zip", Duration::from_secs(900))
            .unwrap();
        let parsed = Url::parse(&url).unwrap();
        assert_eq!(parsed.path(), "/bucket/temp/abc.zip");

        let pairs: HashMap<_, _> = parsed.query_pairs().into_owned().collect();
        let expires: i64 = pairs["expires"].parse().unwrap();
        assert!(signer.verify("temp/abc.zip", expires, &pairs["signature"]));
        assert!(!signer.verify("temp/other.zip", expires, &pairs["signature"]));
    }

    #[tokio::test]
    async fn test_memory_storage_keeps_objects() {
        let storage = MemoryObjectStorage::new(
            Url::parse("http://objects.local/").unwrap(),
            UrlSigner::new("local-secret"),
        );
        storage
            .put_object("tenants/t/ServiceDiscovery.env", b"A=1\n".to_vec())
            .await
            .unwrap();
        assert_eq!(
            storage.object("tenants/t/ServiceDiscovery.env").await,
            Some(b"A=1\n".to_vec())
        );
    }
}
