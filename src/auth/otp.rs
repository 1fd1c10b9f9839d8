//! Short-lived OTP challenges keyed by email.
//!
//! Two flows share the store: registration (the user does not exist yet, so
//! the challenge carries the pending password and display name) and login
//! recovery (no payload). At most one live challenge exists per email and
//! kind; a new `put` overwrites the previous one.

use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use rand::{rngs::OsRng, Rng};
use time::{Duration, OffsetDateTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OtpKind {
    Registration,
    LoginRecovery,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OtpPayload {
    Registration {
        password: String,
        display_name: String,
    },
    LoginRecovery,
}

impl OtpPayload {
    pub fn kind(&self) -> OtpKind {
        match self {
            OtpPayload::Registration { .. } => OtpKind::Registration,
            OtpPayload::LoginRecovery => OtpKind::LoginRecovery,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Challenge {
    pub email: String,
    pub code: String,
    pub expires_at: OffsetDateTime,
    pub payload: OtpPayload,
}

impl Challenge {
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }
}

/// Result of looking a challenge up.
#[derive(Debug, Clone)]
pub enum ChallengeLookup {
    Missing,
    /// Found but past its expiry; the record has been removed.
    Expired,
    Live(Challenge),
}

/// Outcome of presenting a code for a challenge.
#[derive(Debug, Clone)]
pub enum CodeCheck {
    Missing,
    /// Past its expiry; the record has been removed.
    Expired,
    /// Wrong code; the challenge stays for another attempt.
    Mismatch,
    /// Matching code, with the challenge it unlocked.
    Accepted(Challenge),
}

/// Storage for pending OTP challenges.
///
/// Operations on one `(email, kind)` pair are atomic; different emails are
/// independent.
#[async_trait]
pub trait OtpStore: Send + Sync {
    /// Store a fresh challenge for `email`, replacing any previous one of the
    /// same kind, and return the generated code.
    async fn put(&self, email: &str, payload: OtpPayload) -> anyhow::Result<String>;

    async fn get(&self, email: &str, kind: OtpKind) -> anyhow::Result<ChallengeLookup>;

    /// Issue a new code and expiry for an existing challenge, keeping its
    /// payload. Returns `None` if nothing is pending for `email`.
    async fn refresh(&self, email: &str, kind: OtpKind) -> anyhow::Result<Option<String>>;

    async fn consume(&self, email: &str, kind: OtpKind) -> anyhow::Result<()>;

    /// Check `code` and remove the challenge on a match, as one step. Of any
    /// number of concurrent callers presenting the right code, only one is
    /// `Accepted`.
    async fn take_matching(&self, email: &str, kind: OtpKind, code: &str)
        -> anyhow::Result<CodeCheck>;
}

/// Uniform 6-digit code, zero padded.
pub fn generate_code() -> String {
    let n: u32 = OsRng.gen_range(0..1_000_000);
    format!("{:06}", n)
}

/// Process-local challenge store. Everything is lost on restart.
pub struct MemoryOtpStore {
    ttl: Duration,
    challenges: DashMap<(OtpKind, String), Challenge>,
}

impl MemoryOtpStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            challenges: DashMap::new(),
        }
    }
}

#[async_trait]
impl OtpStore for MemoryOtpStore {
    async fn put(&self, email: &str, payload: OtpPayload) -> anyhow::Result<String> {
        let code = generate_code();
        let challenge = Challenge {
            email: email.to_string(),
            code: code.clone(),
            expires_at: OffsetDateTime::now_utc() + self.ttl,
            payload,
        };
        self.challenges
            .insert((challenge.payload.kind(), email.to_string()), challenge);
        Ok(code)
    }

    async fn get(&self, email: &str, kind: OtpKind) -> anyhow::Result<ChallengeLookup> {
        // The entry holds the shard lock, so check-and-remove is one step.
        let lookup = match self.challenges.entry((kind, email.to_string())) {
            Entry::Vacant(_) => ChallengeLookup::Missing,
            Entry::Occupied(entry) => {
                if entry.get().is_expired(OffsetDateTime::now_utc()) {
                    entry.remove();
                    ChallengeLookup::Expired
                } else {
                    ChallengeLookup::Live(entry.get().clone())
                }
            }
        };
        Ok(lookup)
    }

    async fn refresh(&self, email: &str, kind: OtpKind) -> anyhow::Result<Option<String>> {
        let Some(mut challenge) = self.challenges.get_mut(&(kind, email.to_string())) else {
            return Ok(None);
        };
        let code = generate_code();
        challenge.code = code.clone();
        challenge.expires_at = OffsetDateTime::now_utc() + self.ttl;
        Ok(Some(code))
    }

    async fn consume(&self, email: &str, kind: OtpKind) -> anyhow::Result<()> {
        self.challenges.remove(&(kind, email.to_string()));
        Ok(())
    }

    async fn take_matching(
        &self,
        email: &str,
        kind: OtpKind,
        code: &str,
    ) -> anyhow::Result<CodeCheck> {
        let check = match self.challenges.entry((kind, email.to_string())) {
            Entry::Vacant(_) => CodeCheck::Missing,
            Entry::Occupied(entry) => {
                if entry.get().is_expired(OffsetDateTime::now_utc()) {
                    entry.remove();
                    CodeCheck::Expired
                } else if entry.get().code != code {
                    CodeCheck::Mismatch
                } else {
                    CodeCheck::Accepted(entry.remove())
                }
            }
        };
        Ok(check)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration() -> OtpPayload {
        OtpPayload::Registration {
            password: "pw".into(),
            display_name: "Ann".into(),
        }
    }

    #[test]
    fn codes_are_six_ascii_digits() {
        for _ in 0..500 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.bytes().all(|b| b.is_ascii_digit()));
        }
    }

    #[tokio::test]
    async fn put_then_get_returns_live_challenge() {
        let store = MemoryOtpStore::new(Duration::minutes(5));
        let code = store.put("a@uni.edu", registration()).await.unwrap();

        match store.get("a@uni.edu", OtpKind::Registration).await.unwrap() {
            ChallengeLookup::Live(c) => {
                assert_eq!(c.code, code);
                assert_eq!(c.payload, registration());
                assert!(c.expires_at > OffsetDateTime::now_utc() + Duration::minutes(4));
            }
            other => panic!("expected live challenge, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn kinds_do_not_share_records() {
        let store = MemoryOtpStore::new(Duration::minutes(5));
        store.put("a@uni.edu", registration()).await.unwrap();

        let lookup = store.get("a@uni.edu", OtpKind::LoginRecovery).await.unwrap();
        assert!(matches!(lookup, ChallengeLookup::Missing));
    }

    #[tokio::test]
    async fn put_overwrites_previous_challenge() {
        let store = MemoryOtpStore::new(Duration::minutes(5));
        store.put("a@uni.edu", registration()).await.unwrap();
        let second = OtpPayload::Registration {
            password: "other".into(),
            display_name: "Bob".into(),
        };
        let code = store.put("a@uni.edu", second.clone()).await.unwrap();

        let ChallengeLookup::Live(c) = store.get("a@uni.edu", OtpKind::Registration).await.unwrap()
        else {
            panic!("expected live challenge");
        };
        assert_eq!(c.code, code);
        assert_eq!(c.payload, second);
        assert_eq!(store.challenges.len(), 1);
    }

    #[tokio::test]
    async fn expired_lookup_removes_record() {
        let store = MemoryOtpStore::new(Duration::ZERO);
        store.put("a@uni.edu", registration()).await.unwrap();

        let first = store.get("a@uni.edu", OtpKind::Registration).await.unwrap();
        assert!(matches!(first, ChallengeLookup::Expired));
        let second = store.get("a@uni.edu", OtpKind::Registration).await.unwrap();
        assert!(matches!(second, ChallengeLookup::Missing));
    }

    #[tokio::test]
    async fn refresh_keeps_payload_and_extends_expiry() {
        let store = MemoryOtpStore::new(Duration::minutes(5));
        store.put("a@uni.edu", registration()).await.unwrap();
        store
            .challenges
            .get_mut(&(OtpKind::Registration, "a@uni.edu".to_string()))
            .unwrap()
            .expires_at = OffsetDateTime::now_utc() - Duration::seconds(1);

        let code = store
            .refresh("a@uni.edu", OtpKind::Registration)
            .await
            .unwrap()
            .expect("pending challenge");

        let ChallengeLookup::Live(c) = store.get("a@uni.edu", OtpKind::Registration).await.unwrap()
        else {
            panic!("refreshed challenge should be live");
        };
        assert_eq!(c.code, code);
        assert_eq!(c.payload, registration());
    }

    #[tokio::test]
    async fn refresh_without_pending_challenge_is_none() {
        let store = MemoryOtpStore::new(Duration::minutes(5));
        let code = store.refresh("nobody@uni.edu", OtpKind::Registration).await.unwrap();
        assert!(code.is_none());
    }

    #[tokio::test]
    async fn consume_removes_only_that_kind() {
        let store = MemoryOtpStore::new(Duration::minutes(5));
        store.put("a@uni.edu", registration()).await.unwrap();
        store.put("a@uni.edu", OtpPayload::LoginRecovery).await.unwrap();

        store.consume("a@uni.edu", OtpKind::Registration).await.unwrap();

        let reg = store.get("a@uni.edu", OtpKind::Registration).await.unwrap();
        assert!(matches!(reg, ChallengeLookup::Missing));
        let login = store.get("a@uni.edu", OtpKind::LoginRecovery).await.unwrap();
        assert!(matches!(login, ChallengeLookup::Live(_)));
    }

    #[tokio::test]
    async fn take_matching_accepts_once() {
        let store = MemoryOtpStore::new(Duration::minutes(5));
        let code = store.put("a@uni.edu", OtpPayload::LoginRecovery).await.unwrap();
        let wrong = if code == "000000" { "000001" } else { "000000" };

        let miss = store.take_matching("a@uni.edu", OtpKind::LoginRecovery, wrong).await.unwrap();
        assert!(matches!(miss, CodeCheck::Mismatch));

        let hit = store.take_matching("a@uni.edu", OtpKind::LoginRecovery, &code).await.unwrap();
        assert!(matches!(hit, CodeCheck::Accepted(c) if c.payload == OtpPayload::LoginRecovery));

        let again = store.take_matching("a@uni.edu", OtpKind::LoginRecovery, &code).await.unwrap();
        assert!(matches!(again, CodeCheck::Missing));
    }

    #[tokio::test]
    async fn take_matching_expired_clears_record() {
        let store = MemoryOtpStore::new(Duration::ZERO);
        let code = store.put("a@uni.edu", OtpPayload::LoginRecovery).await.unwrap();

        let first = store.take_matching("a@uni.edu", OtpKind::LoginRecovery, &code).await.unwrap();
        assert!(matches!(first, CodeCheck::Expired));
        assert!(store.challenges.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_takes_accept_exactly_one() {
        let store = std::sync::Arc::new(MemoryOtpStore::new(Duration::minutes(5)));
        let code = store.put("a@uni.edu", OtpPayload::LoginRecovery).await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let code = code.clone();
                tokio::spawn(async move {
                    store.take_matching("a@uni.edu", OtpKind::LoginRecovery, &code).await
                })
            })
            .collect();

        let mut accepted = 0;
        for h in handles {
            if let CodeCheck::Accepted(_) = h.await.unwrap().unwrap() {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 1);
    }
}
