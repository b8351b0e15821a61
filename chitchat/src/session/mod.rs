//! Single-device session lifecycle.
//!
//! Each account holds at most one live session. Creating a session against a
//! live one fails with the existing session's metadata so the caller can show
//! which device holds the slot; an expired session is purged lazily on the
//! next login attempt and never blocks it.

use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::warn;

use crate::auth::{AuthError, AuthResult, Session, SessionInfo, UserId};
use crate::db::SessionRepository;

/// Session lifetime. The JWT carried inside the session gets the same
/// lifetime, so the two expire together.
pub const SESSION_TTL_HOURS: i64 = 24;

/// Coordinates session persistence with the single-device policy.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<dyn SessionRepository>,
}

impl SessionStore {
    pub fn new(sessions: Arc<dyn SessionRepository>) -> Self {
        Self { sessions }
    }

    /// Create a session for an account.
    ///
    /// A live existing session wins and is reported back via
    /// [`AuthError::AlreadyLoggedIn`]. An expired one is deleted first, then
    /// the insert proceeds. The storage layer's unique constraint is the
    /// arbiter under concurrency: of two racing logins exactly one insert
    /// lands, the other surfaces as a conflict.
    pub async fn create_session(
        &self,
        user_id: UserId,
        jwt: &str,
        user_agent: &str,
        ip: Option<&str>,
    ) -> AuthResult<Session> {
        if let Some(existing) = self.sessions.find_by_user(user_id).await? {
            if existing.expires_at > Utc::now() {
                return Err(AuthError::AlreadyLoggedIn(SessionInfo::from(&existing)));
            }
            self.sessions.delete_by_user(user_id).await?;
        }

        let expires_at = Utc::now() + Duration::hours(SESSION_TTL_HOURS);
        self.sessions
            .insert(user_id, jwt, user_agent, ip, expires_at)
            .await
    }

    /// Remove an account's session. Errors when there was none.
    pub async fn remove_session(&self, user_id: UserId) -> AuthResult<()> {
        let removed = self.sessions.delete_by_user(user_id).await?;
        if removed == 0 {
            return Err(AuthError::NotFound("Session not found".to_string()));
        }
        Ok(())
    }

    /// Whether the account currently holds a live session. Expired rows are
    /// treated as absent but left in place for the login path to purge.
    pub async fn is_logged_in(&self, user_id: UserId) -> AuthResult<Option<SessionInfo>> {
        let session = self.sessions.find_by_user(user_id).await?;
        Ok(session
            .filter(|s| s.expires_at > Utc::now())
            .map(|s| SessionInfo::from(&s)))
    }

    /// Find a session by id and owner, without requiring a pending OTP.
    pub async fn find_session(&self, session_id: i64, user_id: UserId) -> AuthResult<Session> {
        self.sessions
            .find_by_id_and_user(session_id, user_id)
            .await?
            .ok_or_else(|| AuthError::NotFound("No session found".to_string()))
    }

    /// Find a session by id and owner that has a pending OTP challenge.
    pub async fn find_session_with_otp(
        &self,
        session_id: i64,
        user_id: UserId,
    ) -> AuthResult<Session> {
        self.sessions
            .find_by_id_and_user(session_id, user_id)
            .await?
            .filter(|s| s.otp.is_some())
            .ok_or_else(|| AuthError::NotFound("No session found.".to_string()))
    }

    /// Attach a removal OTP challenge to a session.
    pub async fn attach_otp_challenge(
        &self,
        session_id: i64,
        user_id: UserId,
        otp_hash: &str,
        expires_at: chrono::DateTime<Utc>,
    ) -> AuthResult<()> {
        let updated = self
            .sessions
            .set_otp(session_id, user_id, otp_hash, expires_at)
            .await?;
        if !updated {
            // The session row was deleted between lookup and update. The
            // diagnostic stays in the log; the client sees only a generic 500.
            warn!(session_id, user_id, "session vanished while attaching OTP");
            return Err(AuthError::Internal("Internal server error".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::mock::MockSessionRepository;

    fn store() -> (SessionStore, Arc<MockSessionRepository>) {
        let repo = Arc::new(MockSessionRepository::new());
        (SessionStore::new(repo.clone()), repo)
    }

    #[tokio::test]
    async fn create_session_sets_24h_expiry() {
        let (store, _) = store();
        let before = Utc::now() + Duration::hours(SESSION_TTL_HOURS);
        let session = store.create_session(1, "jwt", "ua", None).await.unwrap();
        let after = Utc::now() + Duration::hours(SESSION_TTL_HOURS);
        assert!(session.expires_at >= before && session.expires_at <= after);
    }

    #[tokio::test]
    async fn live_session_blocks_second_login_with_info() {
        let (store, _) = store();
        store
            .create_session(1, "jwt1", "Firefox", Some("10.0.0.1"))
            .await
            .unwrap();

        let err = store
            .create_session(1, "jwt2", "Chrome", None)
            .await
            .unwrap_err();
        match err {
            AuthError::AlreadyLoggedIn(info) => {
                assert_eq!(info.user_agent, "Firefox");
                assert_eq!(info.ip.as_deref(), Some("10.0.0.1"));
            }
            other => panic!("expected AlreadyLoggedIn, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn expired_session_is_purged_and_replaced() {
        let (store, repo) = store();
        let first = store.create_session(1, "jwt1", "ua", None).await.unwrap();
        repo.with_session_mut(1, |s| s.expires_at = Utc::now() - Duration::hours(1));

        let second = store.create_session(1, "jwt2", "ua", None).await.unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(second.jwt, "jwt2");
    }

    #[tokio::test]
    async fn concurrent_logins_admit_exactly_one() {
        let (store, _) = store();
        let a = store.create_session(7, "jwt-a", "ua", None);
        let b = store.create_session(7, "jwt-b", "ua", None);
        let (ra, rb) = tokio::join!(a, b);
        let oks = [&ra, &rb].iter().filter(|r| r.is_ok()).count();
        assert_eq!(oks, 1);
        // The loser is turned away either by the pre-check or by the
        // storage-level uniqueness arbiter, depending on interleaving.
        let err = if ra.is_err() { ra.unwrap_err() } else { rb.unwrap_err() };
        assert!(matches!(
            err,
            AuthError::Conflict(_) | AuthError::AlreadyLoggedIn(_)
        ));
    }

    #[tokio::test]
    async fn remove_session_errors_when_absent() {
        let (store, _) = store();
        let err = store.remove_session(99).await.unwrap_err();
        assert!(matches!(err, AuthError::NotFound(_)));
    }

    #[tokio::test]
    async fn is_logged_in_ignores_expired_sessions() {
        let (store, repo) = store();
        store.create_session(1, "jwt", "ua", None).await.unwrap();
        assert!(store.is_logged_in(1).await.unwrap().is_some());

        repo.with_session_mut(1, |s| s.expires_at = Utc::now() - Duration::minutes(1));
        assert!(store.is_logged_in(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn vanished_session_otp_attach_is_a_sanitized_500() {
        let (store, _) = store();
        let err = store
            .attach_otp_challenge(1, 1, "$argon2id$x", Utc::now() + Duration::minutes(5))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Internal(_)));
        assert_eq!(err.client_message(), "Internal server error");
    }

    #[tokio::test]
    async fn find_session_with_otp_requires_pending_challenge() {
        let (store, _) = store();
        let session = store.create_session(1, "jwt", "ua", None).await.unwrap();

        // Plain lookup succeeds without a challenge.
        store.find_session(session.id, 1).await.unwrap();
        let err = store.find_session_with_otp(session.id, 1).await.unwrap_err();
        assert!(matches!(err, AuthError::NotFound(_)));

        store
            .attach_otp_challenge(session.id, 1, "$argon2id$x", Utc::now() + Duration::minutes(5))
            .await
            .unwrap();
        let found = store.find_session_with_otp(session.id, 1).await.unwrap();
        assert_eq!(found.otp.as_deref(), Some("$argon2id$x"));
    }
}
