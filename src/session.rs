//! C8 — the credential/session manager (spec §4.7).
//!
//! Grounded on the same trait-boundary pattern [`crate::crypto::KeyService`]
//! uses to keep `aws-sdk-kms` out of callers that only need the behavior:
//! here an [`AssumeRoleProvider`] wraps `aws-sdk-sts`'s `AssumeRole` call so
//! the cache and single-flight logic underneath are testable without real
//! STS credentials, the same reason the teacher injects a `Credentials`
//! implementation instead of calling out to an ambient global.

use crate::error::SessionError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// The default window before expiry at which `partner` treats a cached
/// session as stale and assumes a fresh one (spec §4.7).
pub const DEFAULT_REFRESH_WINDOW: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
pub struct TemporaryCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expires_at: Instant,
}

/// What a tenant's cached session is assumed under: the role to assume,
/// an optional external id, the region to operate in, and how long the
/// assumed session should last.
#[derive(Debug, Clone)]
pub struct TenantConfig {
    pub role_arn: String,
    pub external_id: Option<String>,
    pub region: String,
    pub session_duration: Duration,
}

#[async_trait]
pub trait AssumeRoleProvider: Send + Sync {
    async fn assume_role(
        &self,
        role_arn: &str,
        external_id: Option<&str>,
        session_duration: Duration,
    ) -> Result<TemporaryCredentials, SessionError>;
}

/// `aws-sdk-sts`-backed provider used in production.
pub struct StsAssumeRoleProvider {
    client: aws_sdk_sts::Client,
    session_name: String,
}

impl StsAssumeRoleProvider {
    pub fn new(client: aws_sdk_sts::Client, session_name: impl Into<String>) -> Self {
        Self { client, session_name: session_name.into() }
    }
}

#[async_trait]
impl AssumeRoleProvider for StsAssumeRoleProvider {
    async fn assume_role(
        &self,
        role_arn: &str,
        external_id: Option<&str>,
        session_duration: Duration,
    ) -> Result<TemporaryCredentials, SessionError> {
        let out = self
            .client
            .assume_role()
            .role_arn(role_arn)
            .role_session_name(&self.session_name)
            .set_external_id(external_id.map(str::to_string))
            .duration_seconds(session_duration.as_secs() as i32)
            .send()
            .await
            .map_err(|e| SessionError::AssumeRoleFailed { tenant: role_arn.to_string(), message: format!("{e:?}") })?;

        let creds = out.credentials().ok_or_else(|| SessionError::AssumeRoleFailed {
            tenant: role_arn.to_string(),
            message: "AssumeRole response carried no credentials".to_string(),
        })?;

        Ok(TemporaryCredentials {
            access_key_id: creds.access_key_id().to_string(),
            secret_access_key: creds.secret_access_key().to_string(),
            session_token: creds.session_token().to_string(),
            expires_at: Instant::now() + session_duration,
        })
    }
}

struct CacheEntry {
    creds: TemporaryCredentials,
}

/// Holds the base session's role-assumption provider and a concurrent
/// cache of per-tenant assumed-role sessions. Tenant misses that arrive
/// concurrently for the same id collapse into a single `AssumeRole` call
/// (spec §4.7, §5 "Credential refresh is single-flighted per tenant").
pub struct SessionManager {
    provider: Arc<dyn AssumeRoleProvider>,
    tenants: HashMap<String, TenantConfig>,
    refresh_window: Duration,
    cache: Mutex<HashMap<String, Arc<Mutex<Option<CacheEntry>>>>>,
}

impl SessionManager {
    pub fn new(provider: Arc<dyn AssumeRoleProvider>, tenants: HashMap<String, TenantConfig>) -> Self {
        Self { provider, tenants, refresh_window: DEFAULT_REFRESH_WINDOW, cache: Mutex::new(HashMap::new()) }
    }

    pub fn with_refresh_window(mut self, window: Duration) -> Self {
        self.refresh_window = window;
        self
    }

    /// Return the tenant's current session, refreshing it if the cached
    /// entry is within the refresh window of expiry (or missing/invalid).
    pub async fn partner(&self, id: &str) -> Result<TemporaryCredentials, SessionError> {
        let config = self.tenants.get(id).ok_or(SessionError::NoBaseCredentials)?;

        let slot = {
            let mut cache = self.cache.lock().await;
            cache.entry(id.to_string()).or_insert_with(|| Arc::new(Mutex::new(None))).clone()
        };

        // Holding this tenant's slot lock for the whole read-or-refresh
        // is what collapses concurrent misses into one `AssumeRole` call;
        // other tenants' slots are unaffected.
        let mut guard = slot.lock().await;

        if let Some(entry) = guard.as_ref() {
            let fresh_enough = entry
                .creds
                .expires_at
                .checked_duration_since(Instant::now())
                .map(|remaining| remaining > self.refresh_window)
                .unwrap_or(false);
            if fresh_enough {
                return Ok(entry.creds.clone());
            }
        } else {
            log::debug!("session cache miss for tenant `{}`, assuming role", sanitize_tenant_id(id));
        }

        let creds = self
            .provider
            .assume_role(&config.role_arn, config.external_id.as_deref(), config.session_duration)
            .await;

        match creds {
            Ok(creds) => {
                *guard = Some(CacheEntry { creds: creds.clone() });
                Ok(creds)
            }
            Err(e) => {
                log::warn!("assume-role failed for tenant `{}`: {e}", sanitize_tenant_id(id));
                Err(e)
            }
        }
    }
}

/// Sanitize a tenant identifier before it reaches a log line or metric
/// label (spec §6).
pub fn sanitize_tenant_id(id: &str) -> String {
    if id.is_empty() {
        return "[empty]".to_string();
    }
    if looks_like_role_arn(id) {
        return "[masked_arn]".to_string();
    }
    if id.len() == 12 && id.bytes().all(|b| b.is_ascii_digit()) {
        return format!("{}****{}", &id[..4], &id[8..]);
    }
    id.chars().filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-').collect()
}

fn looks_like_role_arn(id: &str) -> bool {
    id.starts_with("arn:") && id.contains(":role/")
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubProvider {
        calls: std::sync::atomic::AtomicUsize,
        ttl: Duration,
    }

    #[async_trait]
    impl AssumeRoleProvider for StubProvider {
        async fn assume_role(
            &self,
            _role_arn: &str,
            _external_id: Option<&str>,
            _session_duration: Duration,
        ) -> Result<TemporaryCredentials, SessionError> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(TemporaryCredentials {
                access_key_id: "AKIA".to_string(),
                secret_access_key: "secret".to_string(),
                session_token: "token".to_string(),
                expires_at: Instant::now() + self.ttl,
            })
        }
    }

    fn manager(ttl: Duration) -> (Arc<StubProvider>, SessionManager) {
        let provider = Arc::new(StubProvider { calls: std::sync::atomic::AtomicUsize::new(0), ttl });
        let mut tenants = HashMap::new();
        tenants.insert(
            "tenant-a".to_string(),
            TenantConfig {
                role_arn: "arn:aws:iam::111111111111:role/tenant-a".to_string(),
                external_id: None,
                region: "us-east-1".to_string(),
                session_duration: Duration::from_secs(3600),
            },
        );
        (provider.clone(), SessionManager::new(provider, tenants))
    }

    #[tokio::test]
    async fn caches_a_fresh_session() {
        let (provider, mgr) = manager(Duration::from_secs(3600));
        mgr.partner("tenant-a").await.unwrap();
        mgr.partner("tenant-a").await.unwrap();
        assert_eq!(provider.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refreshes_once_inside_the_refresh_window() {
        let (provider, mgr) = manager(Duration::from_secs(60));
        let mgr = mgr.with_refresh_window(Duration::from_secs(300));
        mgr.partner("tenant-a").await.unwrap();
        // The cached session's TTL (60s) is already inside the 300s
        // refresh window, so the next call re-assumes.
        mgr.partner("tenant-a").await.unwrap();
        assert_eq!(provider.calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unknown_tenant_fails_without_calling_the_provider() {
        let (provider, mgr) = manager(Duration::from_secs(3600));
        let err = mgr.partner("nope").await.unwrap_err();
        assert!(matches!(err, SessionError::NoBaseCredentials));
        assert_eq!(provider.calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[test]
    fn sanitizes_empty_id() {
        assert_eq!(sanitize_tenant_id(""), "[empty]");
    }

    #[test]
    fn sanitizes_role_arn() {
        assert_eq!(sanitize_tenant_id("arn:aws:iam::123456789012:role/some-role"), "[masked_arn]");
    }

    #[test]
    fn masks_twelve_digit_numeric_id() {
        assert_eq!(sanitize_tenant_id("123456789012"), "1234****9012");
    }

    #[test]
    fn strips_unsafe_characters() {
        assert_eq!(sanitize_tenant_id("tenant <script>42!"), "tenantscript42");
    }
}
