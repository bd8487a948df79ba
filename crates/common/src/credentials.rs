//! Single-use bearer credentials.
//!
//! Every credential is redeemable exactly once. Redemption looks the token up,
//! checks expiry and binding, and removes it inside one critical section, so
//! two concurrent redemptions of the same token can never both succeed.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::clock::SharedClock;
use crate::tasks::TaskId;
use crate::token::Token;

/// Which storage mode an upload credential grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UploadMode {
    /// Each upload gets its own task and blob, burned on delivery.
    #[default]
    PerTask,
    /// Uploads overwrite the single reserved latest slot.
    LatestSlot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CredentialKind {
    Upload(UploadMode),
    Download(TaskId),
}

#[derive(Debug, Clone, Copy)]
struct Claim {
    kind: CredentialKind,
    /// `None` when the ttl reaches past what an `Instant` can hold
    expires_at: Option<Instant>,
}

impl Claim {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Why a redemption failed. Callers collapse all of these into a single
/// unauthorized signal; the distinction is only kept for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RedeemError {
    #[error("credential unknown or already redeemed")]
    Unknown,
    #[error("credential expired")]
    Expired,
    #[error("credential is not valid for this operation")]
    WrongKind,
    #[error("credential is bound to a different task")]
    Mismatch,
}

pub struct CredentialRegistry {
    clock: SharedClock,
    claims: Mutex<HashMap<Token, Claim>>,
}

impl CredentialRegistry {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            clock,
            claims: Mutex::new(HashMap::new()),
        }
    }

    fn issue(&self, kind: CredentialKind, ttl: Duration) -> Token {
        let token = Token::generate();
        let claim = Claim {
            kind,
            expires_at: self.clock.now().checked_add(ttl),
        };
        self.claims.lock().insert(token.clone(), claim);
        token
    }

    /// Issue an unbound credential good for exactly one upload.
    pub fn issue_upload(&self, ttl: Duration, mode: UploadMode) -> Token {
        self.issue(CredentialKind::Upload(mode), ttl)
    }

    /// Issue a credential good for exactly one download of `task_id`.
    pub fn issue_download(&self, task_id: TaskId, ttl: Duration) -> Token {
        self.issue(CredentialKind::Download(task_id), ttl)
    }

    /// Look up, check and remove `token` atomically.
    ///
    /// Expired entries are removed as a side effect. A claim that fails the
    /// `accept` check (wrong kind, wrong task) is left in place for its
    /// rightful use.
    fn redeem<T>(
        &self,
        token: &Token,
        accept: impl FnOnce(CredentialKind) -> Result<T, RedeemError>,
    ) -> Result<T, RedeemError> {
        let now = self.clock.now();
        let mut claims = self.claims.lock();

        let claim = *claims.get(token).ok_or(RedeemError::Unknown)?;
        if claim.is_expired(now) {
            claims.remove(token);
            return Err(RedeemError::Expired);
        }

        let value = accept(claim.kind)?;
        claims.remove(token);
        Ok(value)
    }

    /// Redeem an upload credential, returning the mode it grants.
    pub fn redeem_upload(&self, token: &Token) -> Result<UploadMode, RedeemError> {
        self.redeem(token, |kind| match kind {
            CredentialKind::Upload(mode) => Ok(mode),
            CredentialKind::Download(_) => Err(RedeemError::WrongKind),
        })
    }

    /// Redeem a download credential, returning the task it is bound to.
    ///
    /// When `expected` is given the credential must be bound to that task.
    pub fn redeem_download(
        &self,
        token: &Token,
        expected: Option<TaskId>,
    ) -> Result<TaskId, RedeemError> {
        self.redeem(token, |kind| match kind {
            CredentialKind::Download(bound) => match expected {
                Some(expected) if expected != bound => Err(RedeemError::Mismatch),
                _ => Ok(bound),
            },
            CredentialKind::Upload(_) => Err(RedeemError::WrongKind),
        })
    }

    /// Drop every download credential bound to `task_id`. Returns how many
    /// were removed.
    pub fn revoke_task(&self, task_id: TaskId) -> usize {
        let mut claims = self.claims.lock();
        let before = claims.len();
        claims.retain(|_, claim| claim.kind != CredentialKind::Download(task_id));
        before - claims.len()
    }

    /// Remove all expired credentials. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut claims = self.claims.lock();
        let before = claims.len();
        claims.retain(|_, claim| !claim.is_expired(now));
        before - claims.len()
    }

    pub fn len(&self) -> usize {
        self.claims.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for CredentialRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialRegistry")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::clock::ManualClock;

    const TTL: Duration = Duration::from_secs(60);

    fn setup() -> (CredentialRegistry, ManualClock) {
        let clock = ManualClock::new();
        (CredentialRegistry::new(Arc::new(clock.clone())), clock)
    }

    #[test]
    fn test_upload_credential_is_single_use() {
        let (registry, _) = setup();
        let token = registry.issue_upload(TTL, UploadMode::PerTask);

        assert_eq!(registry.redeem_upload(&token), Ok(UploadMode::PerTask));
        assert_eq!(registry.redeem_upload(&token), Err(RedeemError::Unknown));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unrepresentable_ttl_never_expires() {
        let (registry, clock) = setup();
        let forever = Duration::from_secs(u64::MAX);
        let upload = registry.issue_upload(forever, UploadMode::PerTask);
        let download = registry.issue_download(TaskId::new(), forever);

        clock.advance(Duration::from_secs(365 * 24 * 3600));
        assert_eq!(registry.sweep_expired(), 0);
        assert_eq!(registry.redeem_upload(&upload), Ok(UploadMode::PerTask));
        assert!(registry.redeem_download(&download, None).is_ok());
    }

    #[test]
    fn test_upload_credential_carries_mode() {
        let (registry, _) = setup();
        let token = registry.issue_upload(TTL, UploadMode::LatestSlot);
        assert_eq!(registry.redeem_upload(&token), Ok(UploadMode::LatestSlot));
    }

    #[test]
    fn test_download_credential_binding() {
        let (registry, _) = setup();
        let task = TaskId::new();
        let other = TaskId::new();
        let token = registry.issue_download(task, TTL);

        // mismatch fails but doesn't consume the credential
        assert_eq!(
            registry.redeem_download(&token, Some(other)),
            Err(RedeemError::Mismatch)
        );
        assert_eq!(registry.redeem_download(&token, Some(task)), Ok(task));
        assert_eq!(
            registry.redeem_download(&token, Some(task)),
            Err(RedeemError::Unknown)
        );
    }

    #[test]
    fn test_download_credential_derives_task() {
        let (registry, _) = setup();
        let task = TaskId::new();
        let token = registry.issue_download(task, TTL);
        assert_eq!(registry.redeem_download(&token, None), Ok(task));
    }

    #[test]
    fn test_kinds_are_not_interchangeable() {
        let (registry, _) = setup();
        let upload = registry.issue_upload(TTL, UploadMode::PerTask);
        let download = registry.issue_download(TaskId::new(), TTL);

        assert_eq!(
            registry.redeem_download(&upload, None),
            Err(RedeemError::WrongKind)
        );
        assert_eq!(
            registry.redeem_upload(&download),
            Err(RedeemError::WrongKind)
        );
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_expiry_boundary() {
        let (registry, clock) = setup();
        let early = registry.issue_upload(TTL, UploadMode::PerTask);
        let exact = registry.issue_upload(TTL, UploadMode::PerTask);

        clock.advance(TTL - Duration::from_millis(1));
        assert!(registry.redeem_upload(&early).is_ok());

        clock.advance(Duration::from_millis(1));
        // no sweep has run, the expiry check alone rejects it
        assert_eq!(registry.redeem_upload(&exact), Err(RedeemError::Expired));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let (registry, clock) = setup();
        registry.issue_upload(Duration::from_secs(10), UploadMode::PerTask);
        registry.issue_download(TaskId::new(), Duration::from_secs(10));
        let keep = registry.issue_upload(Duration::from_secs(100), UploadMode::PerTask);

        clock.advance(Duration::from_secs(10));
        assert_eq!(registry.sweep_expired(), 2);
        assert_eq!(registry.len(), 1);
        assert!(registry.redeem_upload(&keep).is_ok());
    }

    #[test]
    fn test_revoke_task() {
        let (registry, _) = setup();
        let task = TaskId::new();
        let a = registry.issue_download(task, TTL);
        let b = registry.issue_download(task, TTL);
        let unrelated = registry.issue_download(TaskId::new(), TTL);

        assert_eq!(registry.revoke_task(task), 2);
        assert_eq!(registry.redeem_download(&a, None), Err(RedeemError::Unknown));
        assert_eq!(registry.redeem_download(&b, None), Err(RedeemError::Unknown));
        assert!(registry.redeem_download(&unrelated, None).is_ok());
    }

    #[test]
    fn test_concurrent_redemption_has_one_winner() {
        let (registry, _) = setup();
        let registry = Arc::new(registry);
        let task = TaskId::new();
        let token = registry.issue_download(task, TTL);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = registry.clone();
                let token = token.clone();
                std::thread::spawn(move || registry.redeem_download(&token, Some(task)))
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            results
                .iter()
                .filter(|r| **r == Err(RedeemError::Unknown))
                .count(),
            15
        );
    }
}
