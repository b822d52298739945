//! # Cloud Configuration
//!
//! Retrieves, decrypts, and parses the encrypted configuration bundle the
//! platform publishes for services running outside the data center. The
//! bundle is AES-256-CBC encrypted and fetched once per process; the parsed
//! result is cached in a static.

use aes::Aes256;
use base64::{engine::general_purpose, Engine as _};
use cbc::Decryptor;
use cipher::{block_padding::Pkcs7, BlockDecryptMut, KeyIvInit};
use reqwest::blocking::Client;
use serde_json::Value;
use static_init::dynamic;
use std::env;
use thiserror::Error;

/// Errors that can occur during the cloud configuration lifecycle.
#[derive(Debug, Error, Clone)]
pub enum CloudConfigError {
    #[error("Environment variable error: {0}")]
    VarError(#[from] env::VarError),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Decryption error: {0}")]
    DecryptionError(String),

    #[error("JSON parse error: {0}")]
    JsonError(String),

    /// Structural problems in the retrieved bundle (missing IV or ciphertext).
    #[error("Invalid data format: {0}")]
    InvalidData(String),
}

/// Global static storage for the cloud configuration, initialized exactly
/// once upon first access.
#[dynamic]
static CLOUD_CONFIG: Result<Value, CloudConfigError> = load_cloud_config(None, None);

/// Retrieves and decrypts the configuration bundle from a remote URL.
///
/// `url` defaults to `SWX_CLOUD_CONFIG_URL` and `key` to `SWX_AES_KEY`
/// (hex-encoded, 32 bytes). The bundle format is two lines: a Base64 IV
/// followed by the Base64 ciphertext.
pub fn load_cloud_config(
    url: Option<String>,
    key: Option<String>,
) -> Result<Value, CloudConfigError> {
    let key = key
        .or_else(|| env::var("SWX_AES_KEY").ok())
        .ok_or_else(|| CloudConfigError::MissingEnvVar("SWX_AES_KEY".to_string()))?;

    let url = url
        .or_else(|| env::var("SWX_CLOUD_CONFIG_URL").ok())
        .ok_or_else(|| CloudConfigError::MissingEnvVar("SWX_CLOUD_CONFIG_URL".to_string()))?;

    let client = Client::new();
    let response = client
        .get(&url)
        .send()
        .map_err(|e: reqwest::Error| CloudConfigError::NetworkError(e.to_string()))?;

    if !response.status().is_success() {
        return Err(CloudConfigError::NetworkError(format!(
            "HTTP request failed with status: {}",
            response.status()
        )));
    }

    let content = response
        .text()
        .map_err(|e: reqwest::Error| CloudConfigError::NetworkError(e.to_string()))?;

    decrypt_bundle(&content, key.trim())
}

/// Decrypts a two-line IV/ciphertext bundle and parses the plaintext as JSON.
pub fn decrypt_bundle(content: &str, key_hex: &str) -> Result<Value, CloudConfigError> {
    let lines: Vec<&str> = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    if lines.len() < 2 {
        return Err(CloudConfigError::InvalidData(format!(
            "File format error: expected at least 2 lines, found {}",
            lines.len()
        )));
    }

    let iv = general_purpose::STANDARD
        .decode(lines[0])
        .map_err(|e| CloudConfigError::InvalidData(format!("Invalid Base64 IV: {e}")))?;

    let ciphertext = general_purpose::STANDARD
        .decode(lines[1])
        .map_err(|e| CloudConfigError::InvalidData(format!("Invalid Base64 Ciphertext: {e}")))?;

    let key_vec = hex::decode(key_hex)
        .map_err(|e| CloudConfigError::DecryptionError(format!("Invalid Key Hex: {e}")))?;

    let key_arr: [u8; 32] = key_vec.try_into().map_err(|v: Vec<u8>| {
        CloudConfigError::DecryptionError(format!("Key must be 32 bytes, found {}", v.len()))
    })?;
    let iv_arr: [u8; 16] = iv
        .as_slice()
        .try_into()
        .map_err(|_| CloudConfigError::InvalidData(format!("Invalid IV length: {}", iv.len())))?;

    if ciphertext.is_empty() {
        return Err(CloudConfigError::DecryptionError(
            "Ciphertext is empty".to_string(),
        ));
    }

    let decryptor = Decryptor::<Aes256>::new(&key_arr.into(), &iv_arr.into());
    let mut buf = ciphertext;
    let decrypted_data = decryptor
        .decrypt_padded_mut::<Pkcs7>(&mut buf)
        .map_err(|e| {
            CloudConfigError::DecryptionError(format!(
                "Decryption failed: {e:?}. Verify the decryption key."
            ))
        })?;

    serde_json::from_slice(decrypted_data).map_err(|e| CloudConfigError::JsonError(e.to_string()))
}

/// Provides access to the globally cached cloud configuration.
pub fn get_cloud_config() -> Result<Value, CloudConfigError> {
    match &*CLOUD_CONFIG {
        Ok(val) => Ok(val.clone()),
        Err(e) => Err(e.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_HEX: &str = "000102030405060708090a0b0c0d0e0f000102030405060708090a0b0c0d0e0f";

    #[test]
    fn bundle_with_too_few_lines_is_rejected() {
        let err = decrypt_bundle("b25lLWxpbmU=\n", KEY_HEX).unwrap_err();
        assert!(matches!(err, CloudConfigError::InvalidData(_)));
    }

    #[test]
    fn malformed_base64_iv_is_rejected() {
        let err = decrypt_bundle("!!!not-base64!!!\nAAAA\n", KEY_HEX).unwrap_err();
        assert!(matches!(err, CloudConfigError::InvalidData(_)));
    }

    #[test]
    fn short_key_is_rejected() {
        // 16-byte IV, 16-byte ciphertext block, 8-byte key
        let content = format!(
            "{}\n{}\n",
            general_purpose::STANDARD.encode([0u8; 16]),
            general_purpose::STANDARD.encode([0u8; 16])
        );
        let err = decrypt_bundle(&content, "0001020304050607").unwrap_err();
        assert!(err.to_string().contains("32 bytes"));
    }

    #[test]
    fn wrong_iv_length_is_rejected() {
        let content = format!(
            "{}\n{}\n",
            general_purpose::STANDARD.encode([0u8; 8]),
            general_purpose::STANDARD.encode([0u8; 16])
        );
        let err = decrypt_bundle(&content, KEY_HEX).unwrap_err();
        assert!(matches!(err, CloudConfigError::InvalidData(_)));
    }

    #[test]
    fn missing_key_is_reported_before_any_network_access() {
        if env::var("SWX_AES_KEY").is_ok() {
            return;
        }
        let err = load_cloud_config(Some("http://unused".into()), None).unwrap_err();
        assert!(matches!(err, CloudConfigError::MissingEnvVar(_)));
    }
}
