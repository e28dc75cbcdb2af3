//! Webhook collaborators
//!
//! Secrets are derived from the caller's internal repository id with an
//! application signing key, so a secret can be recomputed when a delivery
//! arrives instead of being stored next to the hook.

use crate::error::{Error, Result};
use hmac::{Hmac, Mac};
use reqwest::Url;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

/// Derives the signing secret for a repository's webhook
pub trait HookSecretDeriver: Send + Sync {
    fn derive(&self, repository_id: &str) -> Result<SecretString>;
}

/// Resolves the public callback URL deliveries for a repository are posted to
pub trait CallbackUrlResolver: Send + Sync {
    fn webhook_url(&self, repository_id: &str) -> Result<String>;
}

/// HMAC-SHA256 of the internal repository id under an application key, hex encoded
pub struct HmacSecretDeriver {
    signing_key: SecretString,
}

impl HmacSecretDeriver {
    pub fn new(signing_key: SecretString) -> Result<Self> {
        if signing_key.expose_secret().is_empty() {
            return Err(Error::Config("Webhook signing key must not be empty".to_string()));
        }
        Ok(Self { signing_key })
    }
}

impl HookSecretDeriver for HmacSecretDeriver {
    fn derive(&self, repository_id: &str) -> Result<SecretString> {
        let mut mac = HmacSha256::new_from_slice(self.signing_key.expose_secret().as_bytes())
            .map_err(|e| Error::Config(format!("Invalid webhook signing key: {}", e)))?;
        mac.update(repository_id.as_bytes());
        Ok(SecretString::new(hex::encode(mac.finalize().into_bytes())))
    }
}

/// Callback URLs of the form `{base}/project/webhook/{repository}`
pub struct RouteResolver {
    base_url: Url,
}

impl RouteResolver {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::Config(format!("Invalid callback base URL {}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Config(format!(
                "Callback base URL {} cannot be a base",
                base_url
            )));
        }
        Ok(Self { base_url })
    }
}

impl CallbackUrlResolver for RouteResolver {
    fn webhook_url(&self, repository_id: &str) -> Result<String> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("Callback base URL {} cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(["project", "webhook", repository_id]);
        Ok(url.to_string())
    }
}

/// Verify a `sha256=<hex>` HMAC signature over `payload`
pub fn verify_hmac_signature(secret: &SecretString, payload: &[u8], signature: &str) -> Result<()> {
    let signature = signature.strip_prefix("sha256=").ok_or_else(|| {
        warn!("Signature doesn't start with 'sha256='");
        Error::InvalidSignature("signature does not start with sha256=".to_string())
    })?;

    let expected = hex::decode(signature)
        .map_err(|e| Error::InvalidSignature(format!("invalid hex in signature: {}", e)))?;

    let mut mac = HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
        .map_err(|e| Error::InvalidSignature(format!("HMAC key error: {}", e)))?;
    mac.update(payload);

    mac.verify_slice(&expected)
        .map_err(|_| Error::InvalidSignature("HMAC signature mismatch".to_string()))
}

/// Compute the `sha256=<hex>` signature a provider sends for `payload`
pub fn sign_payload(secret: &SecretString, payload: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
        .map_err(|e| Error::Config(format!("HMAC key error: {}", e)))?;
    mac.update(payload);
    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

/// Compare a shared-token header against the secret
///
/// Digests are compared rather than the raw strings.
pub fn verify_shared_token(secret: &SecretString, token: &str) -> Result<()> {
    let expected = Sha256::digest(secret.expose_secret().as_bytes());
    let actual = Sha256::digest(token.as_bytes());
    if expected == actual {
        Ok(())
    } else {
        Err(Error::InvalidSignature("webhook token mismatch".to_string()))
    }
}
