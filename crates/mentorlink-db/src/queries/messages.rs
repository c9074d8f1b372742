use mentorlink_types::models::RequestStatus;
use rusqlite::{OptionalExtension, Row, params};
use tracing::debug;

use crate::models::MessageRow;
use crate::queries::{clamp_limit, opt_text_enum, text_enum};
use crate::{Database, DbError};

impl Database {
    /// Post a message on an approved mentorship. The receiver is whichever
    /// participant did not send it. Messages cannot be edited or deleted.
    pub fn send_message(&self, request_id: i64, sender_id: i64, body: &str) -> Result<i64, DbError> {
        if body.trim().is_empty() {
            return Err(DbError::validation("Message cannot be empty"));
        }
        let cols = *self.columns();

        let id = self.with_tx(|tx| {
            let request: Option<(i64, i64, RequestStatus)> = tx
                .query_row(
                    "SELECT student_id, mentor_id, status FROM mentorship_requests WHERE id = ?1",
                    [request_id],
                    |row| Ok((row.get(0)?, row.get(1)?, text_enum(row, "status")?)),
                )
                .optional()?;
            let Some((student_id, mentor_id, status)) = request else {
                return Err(DbError::validation("Mentorship request not found"));
            };
            if status != RequestStatus::Approved {
                return Err(DbError::validation(
                    "Messages can only be exchanged on an approved mentorship",
                ));
            }
            let receiver_id = if sender_id == student_id {
                mentor_id
            } else if sender_id == mentor_id {
                student_id
            } else {
                return Err(DbError::validation("You are not part of this mentorship"));
            };

            if cols.message_sender_role {
                tx.execute(
                    "INSERT INTO messages (request_id, sender_id, receiver_id, message, sender_role)
                     VALUES (?1, ?2, ?3, ?4, (SELECT role FROM users WHERE id = ?2))",
                    params![request_id, sender_id, receiver_id, body],
                )?;
            } else {
                tx.execute(
                    "INSERT INTO messages (request_id, sender_id, receiver_id, message)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![request_id, sender_id, receiver_id, body],
                )?;
            }
            Ok(tx.last_insert_rowid())
        })?;

        debug!("Message {} on request {} from user {}", id, request_id, sender_id);
        Ok(id)
    }

    /// Conversation on one request, oldest first.
    pub fn list_messages(&self, request_id: i64, limit: Option<u32>) -> Vec<MessageRow> {
        let cols = *self.columns();
        let sql = format!(
            "SELECT m.id, m.request_id, m.sender_id, u.name AS sender_name, {},
                    m.receiver_id, m.message, m.created_at
             FROM messages m
             LEFT JOIN users u ON u.id = m.sender_id
             WHERE m.request_id = ?1
             ORDER BY m.created_at ASC, m.id ASC
             LIMIT ?2",
            cols.sender_role_projection("m")
        );
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![request_id, clamp_limit(limit)], map_message)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .unwrap_or_default()
    }
}

fn map_message(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get("id")?,
        request_id: row.get("request_id")?,
        sender_id: row.get("sender_id")?,
        sender_name: row.get("sender_name")?,
        sender_role: opt_text_enum(row, "sender_role")?,
        receiver_id: row.get("receiver_id")?,
        message: row.get("message")?,
        created_at: row.get("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RequestOutcome;
    use crate::test_support::{add_mentor, add_student, fresh_db, legacy_db};
    use mentorlink_types::models::{Actor, Role};

    fn approved_request(db: &Database) -> (i64, i64, i64) {
        let student = add_student(db, "Sam Student", "CS-001");
        let mentor = add_mentor(db, "Maya Mentor");
        let RequestOutcome::Created { id } =
            db.create_mentorship_request(student, mentor, "Hi").unwrap()
        else {
            panic!("request was throttled");
        };
        db.update_mentorship_request_status(&Actor::new(mentor, Role::Mentor), id, RequestStatus::Approved)
            .unwrap();
        (student, mentor, id)
    }

    #[test]
    fn participants_exchange_messages() {
        let (_dir, db) = fresh_db();
        let (student, mentor, request) = approved_request(&db);

        db.send_message(request, student, "When are you free?").unwrap();
        db.send_message(request, mentor, "Thursday works.").unwrap();

        let thread = db.list_messages(request, None);
        assert_eq!(thread.len(), 2);
        assert_eq!(thread[0].receiver_id, mentor);
        assert_eq!(thread[0].sender_role, Some(Role::Student));
        assert_eq!(thread[1].receiver_id, student);
        assert_eq!(thread[1].sender_role, Some(Role::Mentor));
        assert_eq!(thread[1].sender_name.as_deref(), Some("Maya Mentor"));
    }

    #[test]
    fn outsiders_and_pending_requests_are_refused() {
        let (_dir, db) = fresh_db();
        let student = add_student(&db, "Sam Student", "CS-001");
        let mentor = add_mentor(&db, "Maya Mentor");
        let RequestOutcome::Created { id } =
            db.create_mentorship_request(student, mentor, "Hi").unwrap()
        else {
            panic!("request was throttled");
        };

        let err = db.send_message(id, student, "Too early").unwrap_err();
        assert!(matches!(err, DbError::Validation(_)));

        db.update_mentorship_request_status(&Actor::new(mentor, Role::Mentor), id, RequestStatus::Approved)
            .unwrap();
        let outsider = add_student(&db, "Olive Other", "CS-002");
        let err = db.send_message(id, outsider, "Hello?").unwrap_err();
        assert_eq!(err.to_string(), "You are not part of this mentorship");
        assert!(db.send_message(999, student, "Lost").is_err());
        assert!(db.list_messages(id, None).is_empty());
    }

    #[test]
    fn sender_role_reads_null_on_legacy_schema() {
        let (_dir, db) = legacy_db();
        let (student, _, request) = approved_request(&db);

        db.send_message(request, student, "Hello").unwrap();
        let thread = db.list_messages(request, None);
        assert_eq!(thread.len(), 1);
        assert_eq!(thread[0].sender_role, None);
    }
}
