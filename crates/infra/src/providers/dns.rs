//! DNS provider: subdomain records for provisioned organizations.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::info;

use super::ProviderError;

/// Create, verify, and delete the DNS record for an organization's slug.
///
/// All three operations are idempotent: creating an existing record or
/// deleting a missing one succeeds, so activity retries and compensations
/// with "nothing to undo" are safe by construction.
pub trait DnsProvider: Send + Sync {
    fn create_record(&self, slug: &str) -> Result<(), ProviderError>;

    /// Check that the record resolves. Returns `Ok(false)` while propagation
    /// is pending; errors are reserved for calls that actually failed.
    fn verify_record(&self, slug: &str) -> Result<bool, ProviderError>;

    fn delete_record(&self, slug: &str) -> Result<(), ProviderError>;
}

/// Log-only no-op: every call succeeds, records always verify.
#[derive(Debug, Default)]
pub struct LoggingDnsProvider;

impl DnsProvider for LoggingDnsProvider {
    fn create_record(&self, slug: &str) -> Result<(), ProviderError> {
        info!(slug, "dns: create record");
        Ok(())
    }

    fn verify_record(&self, slug: &str) -> Result<bool, ProviderError> {
        info!(slug, "dns: verify record");
        Ok(true)
    }

    fn delete_record(&self, slug: &str) -> Result<(), ProviderError> {
        info!(slug, "dns: delete record");
        Ok(())
    }
}

/// Scriptable in-memory fake.
///
/// Records become verifiable after a configurable number of verify calls,
/// which is how tests exercise the verification retry schedule.
#[derive(Debug, Default)]
pub struct InMemoryDnsProvider {
    inner: Mutex<DnsState>,
}

#[derive(Debug, Default)]
struct DnsState {
    /// slug -> number of verify calls still returning "not yet propagated".
    records: HashMap<String, u32>,
    verifies_until_propagated: u32,
    fail_creates: bool,
}

impl InMemoryDnsProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `verify_record` report propagation only after `n` calls per slug.
    pub fn propagate_after(self, n: u32) -> Self {
        if let Ok(mut state) = self.inner.lock() {
            state.verifies_until_propagated = n;
        }
        self
    }

    /// Make every `create_record` call fail transiently.
    pub fn failing_creates(self) -> Self {
        if let Ok(mut state) = self.inner.lock() {
            state.fail_creates = true;
        }
        self
    }

    pub fn has_record(&self, slug: &str) -> bool {
        self.inner
            .lock()
            .map(|s| s.records.contains_key(slug))
            .unwrap_or(false)
    }
}

impl DnsProvider for InMemoryDnsProvider {
    fn create_record(&self, slug: &str) -> Result<(), ProviderError> {
        let mut state = self
            .inner
            .lock()
            .map_err(|_| ProviderError::permanent("dns state poisoned"))?;
        if state.fail_creates {
            return Err(ProviderError::transient("dns api unavailable"));
        }
        let pending = state.verifies_until_propagated;
        state.records.entry(slug.to_string()).or_insert(pending);
        Ok(())
    }

    fn verify_record(&self, slug: &str) -> Result<bool, ProviderError> {
        let mut state = self
            .inner
            .lock()
            .map_err(|_| ProviderError::permanent("dns state poisoned"))?;
        match state.records.get_mut(slug) {
            Some(0) => Ok(true),
            Some(pending) => {
                *pending -= 1;
                Ok(false)
            }
            None => Ok(false),
        }
    }

    fn delete_record(&self, slug: &str) -> Result<(), ProviderError> {
        let mut state = self
            .inner
            .lock()
            .map_err(|_| ProviderError::permanent("dns state poisoned"))?;
        state.records.remove(slug);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_propagates_after_configured_verifies() {
        let dns = InMemoryDnsProvider::new().propagate_after(2);
        dns.create_record("acme").unwrap();

        assert!(!dns.verify_record("acme").unwrap());
        assert!(!dns.verify_record("acme").unwrap());
        assert!(dns.verify_record("acme").unwrap());
    }

    #[test]
    fn create_and_delete_are_idempotent() {
        let dns = InMemoryDnsProvider::new();
        dns.create_record("acme").unwrap();
        dns.create_record("acme").unwrap();
        assert!(dns.has_record("acme"));

        dns.delete_record("acme").unwrap();
        dns.delete_record("acme").unwrap();
        assert!(!dns.has_record("acme"));
    }

    #[test]
    fn missing_record_never_verifies() {
        let dns = InMemoryDnsProvider::new();
        assert!(!dns.verify_record("ghost").unwrap());
    }
}
