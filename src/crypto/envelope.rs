//! The envelope itself (spec §4.6): `{v:1, edk, nonce, ct}`, AES-256-GCM
//! with AAD bound to the attribute name so an envelope cannot be replayed
//! under a different attribute name.

use super::keyservice::KeyService;
use crate::error::CryptoError;
use crate::value::AttributeValue;
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::RngCore;
use std::collections::HashMap;

const NONCE_LEN: usize = 12;
const MIN_CIPHERTEXT_LEN: usize = 16; // GCM tag length; shorter can't be genuine.

fn aad_for(attr_name: &str) -> Vec<u8> {
    format!("theorydb:encrypted:v1|attr={attr_name}").into_bytes()
}

/// Wire representation of an encrypted attribute. Stored as an `M` so it
/// round-trips through the same `AttributeValue` machinery as every other
/// field; `v` guards the envelope format itself against silent drift.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub v: u8,
    pub edk: Vec<u8>,
    pub nonce: Vec<u8>,
    pub ct: Vec<u8>,
}

impl Envelope {
    pub fn into_attribute_value(self) -> AttributeValue {
        let mut m = HashMap::new();
        m.insert("v".to_string(), AttributeValue::n(self.v));
        m.insert("edk".to_string(), AttributeValue::B(self.edk));
        m.insert("nonce".to_string(), AttributeValue::B(self.nonce));
        m.insert("ct".to_string(), AttributeValue::B(self.ct));
        AttributeValue::M(m)
    }

    pub fn from_attribute_value(value: &AttributeValue) -> Result<Self, CryptoError> {
        let m = value.as_m().ok_or(CryptoError::InvalidEnvelope)?;
        let v = m
            .get("v")
            .and_then(|v| v.as_n())
            .and_then(|n| n.parse::<u8>().ok())
            .ok_or(CryptoError::InvalidEnvelope)?;
        let edk = match m.get("edk") {
            Some(AttributeValue::B(b)) => b.clone(),
            _ => return Err(CryptoError::InvalidEnvelope),
        };
        let nonce = match m.get("nonce") {
            Some(AttributeValue::B(b)) => b.clone(),
            _ => return Err(CryptoError::InvalidEnvelope),
        };
        let ct = match m.get("ct") {
            Some(AttributeValue::B(b)) => b.clone(),
            _ => return Err(CryptoError::InvalidEnvelope),
        };

        if v != 1 || ct.len() < MIN_CIPHERTEXT_LEN || nonce.len() != NONCE_LEN {
            return Err(CryptoError::InvalidEnvelope);
        }

        Ok(Self { v, edk, nonce, ct })
    }
}

/// Canonical payload for a single attribute value, per spec §4.6: the same
/// `{t,...}` shape as [`crate::value::AttributeValue::to_canonical_json`],
/// serialized to bytes so the ciphertext is independent of wire-level map
/// key ordering.
fn canonical_payload(value: &AttributeValue) -> Vec<u8> {
    serde_json::to_vec(&value.to_canonical_json()).expect("canonical json never fails")
}

fn parse_payload(bytes: &[u8]) -> Result<AttributeValue, CryptoError> {
    let json: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|_| CryptoError::InvalidEnvelope)?;
    from_canonical_json(&json).ok_or(CryptoError::InvalidEnvelope)
}

fn from_canonical_json(json: &serde_json::Value) -> Option<AttributeValue> {
    let t = json.get("t")?.as_str()?;
    let v = json.get("v");
    Some(match t {
        "s" => AttributeValue::S(v?.as_str()?.to_string()),
        "n" => AttributeValue::N(v?.as_str()?.to_string()),
        "b" => {
            use base64::{engine::general_purpose::STANDARD, Engine};
            AttributeValue::B(STANDARD.decode(v?.as_str()?).ok()?)
        }
        "bool" => AttributeValue::Bool(v?.as_bool()?),
        "null" => AttributeValue::Null,
        "ss" => AttributeValue::Ss(
            v?.as_array()?
                .iter()
                .filter_map(|x| x.as_str().map(str::to_string))
                .collect(),
        ),
        "ns" => AttributeValue::Ns(
            v?.as_array()?
                .iter()
                .filter_map(|x| x.as_str().map(str::to_string))
                .collect(),
        ),
        "bs" => {
            use base64::{engine::general_purpose::STANDARD, Engine};
            AttributeValue::Bs(
                v?.as_array()?
                    .iter()
                    .filter_map(|x| x.as_str().and_then(|s| STANDARD.decode(s).ok()))
                    .collect(),
            )
        }
        "l" => AttributeValue::L(
            v?.as_array()?
                .iter()
                .filter_map(from_canonical_json)
                .collect(),
        ),
        "m" => {
            let obj = v?.as_object()?;
            let mut m = std::collections::HashMap::new();
            for (k, val) in obj {
                m.insert(k.clone(), from_canonical_json(val)?);
            }
            AttributeValue::M(m)
        }
        _ => return None,
    })
}

/// Encrypt one attribute for storage. `attr_name` is bound as AAD so an
/// envelope cannot be moved to a differently-named attribute undetected.
pub async fn encrypt_attribute(
    plaintext: &AttributeValue,
    attr_name: &str,
    key_id: &str,
    key_service: &dyn KeyService,
) -> Result<Envelope, CryptoError> {
    let data_key = key_service
        .generate_data_key(key_id)
        .await
        .map_err(|_| CryptoError::KeyService)?;

    let cipher = Aes256Gcm::new_from_slice(&data_key.plaintext).map_err(|_| CryptoError::KeyService)?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let payload = canonical_payload(plaintext);
    let ct = cipher
        .encrypt(
            nonce,
            Payload {
                msg: &payload,
                aad: &aad_for(attr_name),
            },
        )
        .map_err(|_| CryptoError::KeyService)?;

    Ok(Envelope {
        v: 1,
        edk: data_key.ciphertext_blob,
        nonce: nonce_bytes.to_vec(),
        ct,
    })
}

/// Decrypt an attribute previously produced by [`encrypt_attribute`].
pub async fn decrypt_attribute(
    envelope: &Envelope,
    attr_name: &str,
    key_id: &str,
    key_service: &dyn KeyService,
) -> Result<AttributeValue, CryptoError> {
    let plaintext_key = key_service
        .decrypt_data_key(key_id, &envelope.edk)
        .await
        .map_err(|_| CryptoError::KeyService)?;

    let cipher = Aes256Gcm::new_from_slice(&plaintext_key).map_err(|_| CryptoError::KeyService)?;
    let nonce = Nonce::from_slice(&envelope.nonce);

    let payload = cipher
        .decrypt(
            nonce,
            Payload {
                msg: &envelope.ct,
                aad: &aad_for(attr_name),
            },
        )
        .map_err(|_| CryptoError::AuthenticationFailed)?;

    parse_payload(&payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keyservice::FakeKeyService;

    #[tokio::test]
    async fn round_trips_through_encrypt_decrypt() {
        let ks = FakeKeyService::new();
        let plaintext = AttributeValue::S("sensitive".to_string());
        let envelope = encrypt_attribute(&plaintext, "ssn", "fake-key", &ks).await.unwrap();
        let decrypted = decrypt_attribute(&envelope, "ssn", "fake-key", &ks).await.unwrap();
        assert_eq!(plaintext, decrypted);
    }

    #[tokio::test]
    async fn wrong_attribute_name_fails_authentication() {
        let ks = FakeKeyService::new();
        let plaintext = AttributeValue::n(7);
        let envelope = encrypt_attribute(&plaintext, "balance", "fake-key", &ks).await.unwrap();
        let err = decrypt_attribute(&envelope, "other", "fake-key", &ks).await.unwrap_err();
        assert!(matches!(err, CryptoError::AuthenticationFailed));
    }

    #[test]
    fn rejects_short_ciphertext() {
        let mut m = HashMap::new();
        m.insert("v".to_string(), AttributeValue::n(1));
        m.insert("edk".to_string(), AttributeValue::B(vec![1]));
        m.insert("nonce".to_string(), AttributeValue::B(vec![0; NONCE_LEN]));
        m.insert("ct".to_string(), AttributeValue::B(vec![1, 2, 3]));
        let err = Envelope::from_attribute_value(&AttributeValue::M(m)).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidEnvelope));
    }

    #[test]
    fn rejects_wrong_version() {
        let mut m = HashMap::new();
        m.insert("v".to_string(), AttributeValue::n(2));
        m.insert("edk".to_string(), AttributeValue::B(vec![1]));
        m.insert("nonce".to_string(), AttributeValue::B(vec![0; NONCE_LEN]));
        m.insert("ct".to_string(), AttributeValue::B(vec![0; 20]));
        let err = Envelope::from_attribute_value(&AttributeValue::M(m)).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidEnvelope));
    }
}
