//! Repository trait definitions for testability and dependency injection.
//!
//! This module provides trait-based abstractions over database operations,
//! enabling better testing through mock implementations and dependency
//! injection. The workflow engine only ever sees these traits; the `Pg*`
//! implementations below are wired in at server startup.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::auth::{AuthError, AuthResult, NewUser, Role, Session, User, UserId};
use crate::chat::Message;

use super::timeouts::{TimeoutError, with_default_timeout};

/// Trait for account directory operations
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create a new unverified account with its initial OTP challenge.
    /// A duplicate email surfaces as [`AuthError::Conflict`].
    async fn create(&self, new_user: &NewUser) -> AuthResult<User>;

    /// Find user by email
    async fn find_by_email(&self, email: &str) -> AuthResult<Option<User>>;

    /// Find user by ID
    async fn find_by_id(&self, user_id: UserId) -> AuthResult<Option<User>>;

    /// List every account. Dev-only surface.
    async fn list(&self) -> AuthResult<Vec<User>>;

    /// Mark the account verified and clear its OTP fields in one step.
    async fn mark_verified(&self, email: &str) -> AuthResult<()>;

    /// Store a fresh OTP challenge (hash, expiry, last-requested timestamp).
    async fn set_otp(
        &self,
        email: &str,
        otp_hash: &str,
        otp_expires_at: DateTime<Utc>,
        requested_at: DateTime<Utc>,
    ) -> AuthResult<()>;

    /// Store the password hash and flip `has_password`.
    async fn set_password(&self, user_id: UserId, password_hash: &str) -> AuthResult<()>;

    /// Replace the password hash and clear OTP fields (reset flow).
    async fn reset_password(&self, email: &str, password_hash: &str) -> AuthResult<()>;

    /// Set the enrichment profile fields.
    async fn update_profile(
        &self,
        user_id: UserId,
        gender: Option<&str>,
        university: Option<&str>,
        date_of_birth: Option<NaiveDate>,
    ) -> AuthResult<()>;
}

/// Trait for session persistence, keyed by account id (unique) or by the
/// (session id, account id) pair.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Insert a session row. The storage layer's unique constraint on the
    /// account id is the authoritative single-device arbiter; a violation
    /// surfaces as [`AuthError::Conflict`].
    async fn insert(
        &self,
        user_id: UserId,
        jwt: &str,
        user_agent: &str,
        ip: Option<&str>,
        expires_at: DateTime<Utc>,
    ) -> AuthResult<Session>;

    /// Find the session for an account, if any.
    async fn find_by_user(&self, user_id: UserId) -> AuthResult<Option<Session>>;

    /// Find a session by its id together with its owning account id.
    async fn find_by_id_and_user(
        &self,
        session_id: i64,
        user_id: UserId,
    ) -> AuthResult<Option<Session>>;

    /// Delete the session for an account, returning the number of rows removed.
    async fn delete_by_user(&self, user_id: UserId) -> AuthResult<u64>;

    /// Attach an OTP challenge to the matching session row. Returns `false`
    /// when the (session id, account id) pair matches no row.
    async fn set_otp(
        &self,
        session_id: i64,
        user_id: UserId,
        otp_hash: &str,
        otp_expires_at: DateTime<Utc>,
    ) -> AuthResult<bool>;
}

/// Trait for chat message persistence.
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Persist a message.
    async fn insert(
        &self,
        sender_id: UserId,
        receiver_id: UserId,
        content: &str,
    ) -> AuthResult<Message>;

    /// All messages where the account is sender or receiver, oldest first.
    async fn for_user(&self, user_id: UserId) -> AuthResult<Vec<Message>>;
}

/// Translate a unique-constraint violation into a Conflict naming the
/// violated fields; everything else passes through as a database error.
fn map_unique_violation(err: sqlx::Error, fields: &str) -> AuthError {
    let is_unique = err
        .as_database_error()
        .is_some_and(|db| db.is_unique_violation());
    if is_unique {
        AuthError::Conflict(fields.to_string())
    } else {
        AuthError::Database(err)
    }
}

const USER_COLUMNS: &str = "id, email, name, role, password, has_password, is_verified, otp, \
     otp_expires_at, last_otp_requested_at, gender, university, date_of_birth, created_at";

fn user_from_row(row: &PgRow) -> AuthResult<User> {
    let role: String = row.get("role");
    let role = Role::parse(&role)
        .ok_or_else(|| AuthError::Internal(format!("unknown role in users table: {role}")))?;

    Ok(User {
        id: row.get("id"),
        email: row.get("email"),
        name: row.get("name"),
        role,
        password: row.get("password"),
        has_password: row.get("has_password"),
        is_verified: row.get("is_verified"),
        otp: row.get("otp"),
        otp_expires_at: row
            .get::<Option<chrono::NaiveDateTime>, _>("otp_expires_at")
            .map(|dt| dt.and_utc()),
        last_otp_requested_at: row
            .get::<Option<chrono::NaiveDateTime>, _>("last_otp_requested_at")
            .map(|dt| dt.and_utc()),
        gender: row.get("gender"),
        university: row.get("university"),
        date_of_birth: row.get("date_of_birth"),
        created_at: row.get::<chrono::NaiveDateTime, _>("created_at").and_utc(),
    })
}

const SESSION_COLUMNS: &str =
    "id, user_id, jwt, user_agent, ip, otp, otp_expires_at, created_at, expires_at";

fn session_from_row(row: &PgRow) -> Session {
    Session {
        id: row.get("id"),
        user_id: row.get("user_id"),
        jwt: row.get("jwt"),
        user_agent: row.get("user_agent"),
        ip: row.get("ip"),
        otp: row.get("otp"),
        otp_expires_at: row
            .get::<Option<chrono::NaiveDateTime>, _>("otp_expires_at")
            .map(|dt| dt.and_utc()),
        created_at: row.get::<chrono::NaiveDateTime, _>("created_at").and_utc(),
        expires_at: row.get::<chrono::NaiveDateTime, _>("expires_at").and_utc(),
    }
}

/// PostgreSQL implementation of [`UserRepository`]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create(&self, new_user: &NewUser) -> AuthResult<User> {
        let query = format!(
            "INSERT INTO users (email, name, role, otp, otp_expires_at, last_otp_requested_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {USER_COLUMNS}"
        );
        let row = with_default_timeout(
            sqlx::query(&query)
                .bind(&new_user.email)
                .bind(&new_user.name)
                .bind(new_user.role.as_str())
                .bind(&new_user.otp_hash)
                .bind(new_user.otp_expires_at.naive_utc())
                .bind(new_user.last_otp_requested_at.naive_utc())
                .fetch_one(&self.pool),
        )
        .await
        .map_err(|e| match e {
            TimeoutError::Database(db) => map_unique_violation(db, "email"),
            other => other.into(),
        })?;

        user_from_row(&row)
    }

    async fn find_by_email(&self, email: &str) -> AuthResult<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let row = with_default_timeout(sqlx::query(&query).bind(email).fetch_optional(&self.pool))
            .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_by_id(&self, user_id: UserId) -> AuthResult<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row =
            with_default_timeout(sqlx::query(&query).bind(user_id).fetch_optional(&self.pool))
                .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn list(&self) -> AuthResult<Vec<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users ORDER BY id");
        let rows = with_default_timeout(sqlx::query(&query).fetch_all(&self.pool)).await?;
        rows.iter().map(user_from_row).collect()
    }

    async fn mark_verified(&self, email: &str) -> AuthResult<()> {
        with_default_timeout(
            sqlx::query(
                "UPDATE users SET is_verified = TRUE, otp = NULL, otp_expires_at = NULL
                 WHERE email = $1",
            )
            .bind(email)
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn set_otp(
        &self,
        email: &str,
        otp_hash: &str,
        otp_expires_at: DateTime<Utc>,
        requested_at: DateTime<Utc>,
    ) -> AuthResult<()> {
        with_default_timeout(
            sqlx::query(
                "UPDATE users SET otp = $2, otp_expires_at = $3, last_otp_requested_at = $4
                 WHERE email = $1",
            )
            .bind(email)
            .bind(otp_hash)
            .bind(otp_expires_at.naive_utc())
            .bind(requested_at.naive_utc())
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn set_password(&self, user_id: UserId, password_hash: &str) -> AuthResult<()> {
        with_default_timeout(
            sqlx::query("UPDATE users SET password = $2, has_password = TRUE WHERE id = $1")
                .bind(user_id)
                .bind(password_hash)
                .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn reset_password(&self, email: &str, password_hash: &str) -> AuthResult<()> {
        with_default_timeout(
            sqlx::query(
                "UPDATE users SET password = $2, otp = NULL, otp_expires_at = NULL WHERE email = $1",
            )
            .bind(email)
            .bind(password_hash)
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn update_profile(
        &self,
        user_id: UserId,
        gender: Option<&str>,
        university: Option<&str>,
        date_of_birth: Option<NaiveDate>,
    ) -> AuthResult<()> {
        with_default_timeout(
            sqlx::query(
                "UPDATE users SET gender = $2, university = $3, date_of_birth = $4 WHERE id = $1",
            )
            .bind(user_id)
            .bind(gender)
            .bind(university)
            .bind(date_of_birth)
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }
}

/// PostgreSQL implementation of [`SessionRepository`]
pub struct PgSessionRepository {
    pool: PgPool,
}

impl PgSessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionRepository for PgSessionRepository {
    async fn insert(
        &self,
        user_id: UserId,
        jwt: &str,
        user_agent: &str,
        ip: Option<&str>,
        expires_at: DateTime<Utc>,
    ) -> AuthResult<Session> {
        let query = format!(
            "INSERT INTO sessions (user_id, jwt, user_agent, ip, expires_at)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {SESSION_COLUMNS}"
        );
        let row = with_default_timeout(
            sqlx::query(&query)
                .bind(user_id)
                .bind(jwt)
                .bind(user_agent)
                .bind(ip)
                .bind(expires_at.naive_utc())
                .fetch_one(&self.pool),
        )
        .await
        .map_err(|e| match e {
            TimeoutError::Database(db) => map_unique_violation(db, "session"),
            other => other.into(),
        })?;

        Ok(session_from_row(&row))
    }

    async fn find_by_user(&self, user_id: UserId) -> AuthResult<Option<Session>> {
        let query = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE user_id = $1");
        let row =
            with_default_timeout(sqlx::query(&query).bind(user_id).fetch_optional(&self.pool))
                .await?;
        Ok(row.as_ref().map(session_from_row))
    }

    async fn find_by_id_and_user(
        &self,
        session_id: i64,
        user_id: UserId,
    ) -> AuthResult<Option<Session>> {
        let query = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = $1 AND user_id = $2");
        let row = with_default_timeout(
            sqlx::query(&query)
                .bind(session_id)
                .bind(user_id)
                .fetch_optional(&self.pool),
        )
        .await?;
        Ok(row.as_ref().map(session_from_row))
    }

    async fn delete_by_user(&self, user_id: UserId) -> AuthResult<u64> {
        let result = with_default_timeout(
            sqlx::query("DELETE FROM sessions WHERE user_id = $1")
                .bind(user_id)
                .execute(&self.pool),
        )
        .await?;
        Ok(result.rows_affected())
    }

    async fn set_otp(
        &self,
        session_id: i64,
        user_id: UserId,
        otp_hash: &str,
        otp_expires_at: DateTime<Utc>,
    ) -> AuthResult<bool> {
        let result = with_default_timeout(
            sqlx::query(
                "UPDATE sessions SET otp = $3, otp_expires_at = $4 WHERE id = $1 AND user_id = $2",
            )
            .bind(session_id)
            .bind(user_id)
            .bind(otp_hash)
            .bind(otp_expires_at.naive_utc())
            .execute(&self.pool),
        )
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// PostgreSQL implementation of [`MessageRepository`]
pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn message_from_row(row: &PgRow) -> Message {
    Message {
        id: row.get("id"),
        sender_id: row.get("sender_id"),
        receiver_id: row.get("receiver_id"),
        content: row.get("content"),
        created_at: row.get::<chrono::NaiveDateTime, _>("created_at").and_utc(),
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn insert(
        &self,
        sender_id: UserId,
        receiver_id: UserId,
        content: &str,
    ) -> AuthResult<Message> {
        let row = with_default_timeout(
            sqlx::query(
                "INSERT INTO messages (sender_id, receiver_id, content)
                 VALUES ($1, $2, $3)
                 RETURNING id, sender_id, receiver_id, content, created_at",
            )
            .bind(sender_id)
            .bind(receiver_id)
            .bind(content)
            .fetch_one(&self.pool),
        )
        .await?;

        Ok(message_from_row(&row))
    }

    async fn for_user(&self, user_id: UserId) -> AuthResult<Vec<Message>> {
        let rows = with_default_timeout(
            sqlx::query(
                "SELECT id, sender_id, receiver_id, content, created_at
                 FROM messages
                 WHERE sender_id = $1 OR receiver_id = $1
                 ORDER BY id",
            )
            .bind(user_id)
            .fetch_all(&self.pool),
        )
        .await?;

        Ok(rows.iter().map(message_from_row).collect())
    }
}
