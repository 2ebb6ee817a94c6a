//! C5 — envelope encryption (spec §4.6).
//!
//! Grounded on the teacher's `crypto/sealer.rs`/`crypto/unsealed.rs`
//! builder-pair split (a `Sealer` that turns plaintext attributes into
//! wire-ready ciphertext, an `Unsealed` that holds the plaintext side) and
//! its `crypto/b64_encode.rs` use of the `base64` `Engine` trait. The
//! teacher encrypts to searchable ORE index terms via ZeroKMS; this crate
//! has no search surface, so the replacement is plain per-attribute
//! AES-256-GCM with a KMS-wrapped data key, one key service call per
//! attribute-at-rest rather than per compound index.

pub mod envelope;
pub mod keyservice;

pub use envelope::{decrypt_attribute, encrypt_attribute, Envelope};
pub use keyservice::{FakeKeyService, KeyService, KmsKeyService};
