//! The key service boundary: wraps/unwraps the per-attribute data key.
//! Grounded on the teacher's `ScopedZeroKmsCipher` — an injected cipher
//! object the sealer calls into rather than talking to the key management
//! service directly — so the executor and the derive-generated `Model`
//! impls never depend on `aws-sdk-kms` directly, only on this trait.

use async_trait::async_trait;
use aws_sdk_kms::primitives::Blob;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeyServiceError {
    #[error("key service request failed: {0}")]
    Request(String),
    #[error("key service returned a malformed response")]
    MalformedResponse,
}

/// A 32-byte AES-256 data key in both forms a caller needs: the plaintext
/// bytes to encrypt with, and the provider's opaque ciphertext blob to
/// store alongside the ciphertext for later unwrapping.
pub struct DataKey {
    pub plaintext: Vec<u8>,
    pub ciphertext_blob: Vec<u8>,
}

#[async_trait]
pub trait KeyService: Send + Sync {
    async fn generate_data_key(&self, key_id: &str) -> Result<DataKey, KeyServiceError>;

    async fn decrypt_data_key(
        &self,
        key_id: &str,
        ciphertext_blob: &[u8],
    ) -> Result<Vec<u8>, KeyServiceError>;
}

/// AWS KMS-backed key service: `GenerateDataKey` for encryption,
/// `Decrypt` to unwrap on read.
pub struct KmsKeyService {
    client: aws_sdk_kms::Client,
}

impl KmsKeyService {
    pub fn new(client: aws_sdk_kms::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl KeyService for KmsKeyService {
    async fn generate_data_key(&self, key_id: &str) -> Result<DataKey, KeyServiceError> {
        let out = self
            .client
            .generate_data_key()
            .key_id(key_id)
            .key_spec(aws_sdk_kms::types::DataKeySpec::Aes256)
            .send()
            .await
            .map_err(|e| KeyServiceError::Request(format!("{e:?}")))?;

        let plaintext = out
            .plaintext()
            .ok_or(KeyServiceError::MalformedResponse)?
            .as_ref()
            .to_vec();
        let ciphertext_blob = out
            .ciphertext_blob()
            .ok_or(KeyServiceError::MalformedResponse)?
            .as_ref()
            .to_vec();

        Ok(DataKey { plaintext, ciphertext_blob })
    }

    async fn decrypt_data_key(
        &self,
        key_id: &str,
        ciphertext_blob: &[u8],
    ) -> Result<Vec<u8>, KeyServiceError> {
        let out = self
            .client
            .decrypt()
            .key_id(key_id)
            .ciphertext_blob(Blob::new(ciphertext_blob.to_vec()))
            .send()
            .await
            .map_err(|e| KeyServiceError::Request(format!("{e:?}")))?;

        Ok(out
            .plaintext()
            .ok_or(KeyServiceError::MalformedResponse)?
            .as_ref()
            .to_vec())
    }
}

/// In-memory key service for tests: generates a random data key per call
/// and "wraps" it by XOR-ing with a fixed process key, so unit tests never
/// need real KMS credentials. Not for production use.
pub struct FakeKeyService {
    fixed_key: [u8; 32],
}

impl FakeKeyService {
    pub fn new() -> Self {
        use rand::RngCore;
        let mut fixed_key = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut fixed_key);
        Self { fixed_key }
    }

    fn wrap(&self, plaintext: &[u8]) -> Vec<u8> {
        plaintext
            .iter()
            .zip(self.fixed_key.iter().cycle())
            .map(|(a, b)| a ^ b)
            .collect()
    }
}

impl Default for FakeKeyService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyService for FakeKeyService {
    async fn generate_data_key(&self, _key_id: &str) -> Result<DataKey, KeyServiceError> {
        use rand::RngCore;
        let mut plaintext = vec![0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut plaintext);
        let ciphertext_blob = self.wrap(&plaintext);
        Ok(DataKey { plaintext, ciphertext_blob })
    }

    async fn decrypt_data_key(
        &self,
        _key_id: &str,
        ciphertext_blob: &[u8],
    ) -> Result<Vec<u8>, KeyServiceError> {
        Ok(self.wrap(ciphertext_blob))
    }
}
