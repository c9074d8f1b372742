//! Rate-limited creation of mentorship requests.
//!
//! A student may send one request to a given mentor per [`COOLDOWN`]. The
//! window check and the insert run in one `BEGIN IMMEDIATE` transaction, so two
//! handles racing on the same pair serialize on SQLite's write lock and the
//! loser sees the winner's row.

use chrono::{DateTime, TimeDelta, Utc};
use mentorlink_types::api::Envelope;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use tracing::{debug, info};

use crate::derived::{format_timestamp, human_timestamp, parse_timestamp};
use crate::{Database, DbError};

/// Minimum spacing between two requests from one student to one mentor.
pub const COOLDOWN: TimeDelta = TimeDelta::days(2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    Created {
        id: i64,
    },
    RateLimited {
        retry_at: DateTime<Utc>,
        retry_after_seconds: i64,
    },
}

impl From<RequestOutcome> for Envelope {
    fn from(outcome: RequestOutcome) -> Self {
        match outcome {
            RequestOutcome::Created { id } => Envelope::created(id),
            RequestOutcome::RateLimited {
                retry_at,
                retry_after_seconds,
            } => Envelope::rate_limited(human_timestamp(retry_at), retry_after_seconds),
        }
    }
}

impl Database {
    pub fn create_mentorship_request(
        &self,
        student_id: i64,
        mentor_id: i64,
        message: &str,
    ) -> Result<RequestOutcome, DbError> {
        self.create_mentorship_request_at(student_id, mentor_id, message, Utc::now())
    }

    /// Same as [`Database::create_mentorship_request`] with an explicit clock.
    pub fn create_mentorship_request_at(
        &self,
        student_id: i64,
        mentor_id: i64,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<RequestOutcome, DbError> {
        if student_id == mentor_id {
            return Err(DbError::validation(
                "You cannot send a mentorship request to yourself",
            ));
        }
        // Evolve first so the pair index exists before the window query.
        self.columns();

        let message = Some(message.trim()).filter(|m| !m.is_empty());
        let outcome = self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            if !profile_exists(&tx, "students", student_id)? {
                return Err(DbError::validation("Student profile not found"));
            }
            if !profile_exists(&tx, "mentors", mentor_id)? {
                return Err(DbError::validation("Mentor profile not found"));
            }

            let window_start = format_timestamp(now - COOLDOWN);
            let latest: Option<String> = tx
                .query_row(
                    "SELECT created_at FROM mentorship_requests
                     WHERE student_id = ?1 AND mentor_id = ?2 AND created_at > ?3
                     ORDER BY created_at DESC, id DESC
                     LIMIT 1",
                    params![student_id, mentor_id, window_start],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(latest) = latest {
                tx.rollback()?;
                // An unreadable stamp still sits inside the window; count from now.
                let last = parse_timestamp(&latest).unwrap_or(now);
                let retry_at = last + COOLDOWN;
                let retry_after_seconds = (retry_at - now).num_seconds().max(1);
                return Ok(RequestOutcome::RateLimited {
                    retry_at,
                    retry_after_seconds,
                });
            }

            tx.execute(
                "INSERT INTO mentorship_requests (student_id, mentor_id, status, message, created_at)
                 VALUES (?1, ?2, 'pending', ?3, ?4)",
                params![student_id, mentor_id, message, format_timestamp(now)],
            )?;
            let id = tx.last_insert_rowid();
            tx.commit()?;
            Ok(RequestOutcome::Created { id })
        })?;

        match &outcome {
            RequestOutcome::Created { id } => {
                info!("Mentorship request {} created ({} -> {})", id, student_id, mentor_id)
            }
            RequestOutcome::RateLimited {
                retry_after_seconds,
                ..
            } => debug!(
                "Mentorship request {} -> {} throttled for {}s",
                student_id, mentor_id, retry_after_seconds
            ),
        }
        Ok(outcome)
    }
}

fn profile_exists(conn: &Connection, table: &str, user_id: i64) -> Result<bool, DbError> {
    let sql = format!("SELECT EXISTS (SELECT 1 FROM {} WHERE user_id = ?1)", table);
    Ok(conn.query_row(&sql, [user_id], |row| row.get(0))?)
}
