//! Periodic pruning of the revocation ledger

use super::error::AuthError;
use super::service::AuthService;
use crate::audit::{audit_log, AuditEvent};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

/// Drops ledger records older than the refresh token lifetime
#[derive(Clone)]
pub struct RevocationPruner {
    auth: AuthService,
    interval: Duration,
}

impl std::fmt::Debug for RevocationPruner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RevocationPruner")
            .field("interval", &self.interval)
            .finish()
    }
}

impl RevocationPruner {
    /// `None` when the interval is zero, which disables pruning
    pub fn new(auth: AuthService, interval_secs: u64) -> Option<Self> {
        (interval_secs > 0).then(|| Self {
            auth,
            interval: Duration::from_secs(interval_secs),
        })
    }

    /// Runs one pruning cycle and returns the number of records removed
    pub async fn run_once(&self) -> Result<u64, AuthError> {
        let removed = self.auth.prune_revoked().await?;
        if removed > 0 {
            audit_log(&AuditEvent::RevocationPruned { removed });
        }
        Ok(removed)
    }

    /// Prune on a fixed interval until the task is aborted
    ///
    /// The first cycle runs one interval after start. A failed cycle is
    /// logged and retried on the next tick.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            info!(interval_secs = self.interval.as_secs(), "Revocation pruning started");
            loop {
                ticker.tick().await;
                if let Err(e) = self.run_once().await {
                    error!(error = %e, "Revocation pruning failed");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{
        CredentialHasher, MemoryRevocationLedger, PasswordConfig, RevocationLedger, TokenCodec,
        TokenIssuer,
    };
    use chrono::{Duration as ChronoDuration, Utc};
    use roster_core::{AuthConfig, MemoryUserStore};
    use std::sync::Arc;

    fn service(ledger: Arc<MemoryRevocationLedger>) -> AuthService {
        let config = AuthConfig::default();
        let codec = Arc::new(TokenCodec::new(&config).unwrap());
        AuthService::new(
            Arc::new(MemoryUserStore::new()),
            ledger,
            TokenIssuer::new(codec, &config),
            CredentialHasher::new(PasswordConfig::light()).unwrap(),
            &config,
        )
    }

    #[test]
    fn test_zero_interval_disables() {
        let ledger = Arc::new(MemoryRevocationLedger::new());
        assert!(RevocationPruner::new(service(ledger), 0).is_none());
    }

    #[tokio::test]
    async fn test_run_once_prunes_expired_records() {
        let ledger = Arc::new(MemoryRevocationLedger::new());
        ledger
            .record("stale", Utc::now() - ChronoDuration::days(30))
            .await
            .unwrap();
        ledger.record("live", Utc::now()).await.unwrap();

        let pruner = RevocationPruner::new(service(ledger.clone()), 60).unwrap();
        assert_eq!(pruner.run_once().await.unwrap(), 1);
        assert_eq!(ledger.len().await, 1);
    }
}
