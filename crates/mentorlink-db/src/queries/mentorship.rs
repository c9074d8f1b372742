use chrono::{DateTime, Utc};
use mentorlink_types::models::{Actor, RequestStatus};
use rusqlite::{OptionalExtension, Row};
use tracing::info;

use crate::derived::relative_time_str;
use crate::models::{MentorshipRequestRow, RequestFilter};
use crate::queries::{Conditions, clamp_limit, text_enum};
use crate::{Database, DbError};

const SELECT_REQUESTS: &str = "
    SELECT r.id, r.student_id, s.name AS student_name, r.mentor_id, m.name AS mentor_name,
           r.status, r.message, r.created_at
    FROM mentorship_requests r
    LEFT JOIN users s ON s.id = r.student_id
    LEFT JOIN users m ON m.id = r.mentor_id";

impl Database {
    pub fn get_mentorship_request(&self, id: i64) -> Option<MentorshipRequestRow> {
        let sql = format!("{} WHERE r.id = ?1", SELECT_REQUESTS);
        let now = Utc::now();
        self.with_conn(|conn| {
            let row = conn
                .query_row(&sql, [id], |row| map_request(row, now))
                .optional()?;
            Ok(row)
        })
        .unwrap_or_default()
    }

    pub fn list_mentorship_requests(&self, filter: &RequestFilter) -> Vec<MentorshipRequestRow> {
        let mut cond = Conditions::new();
        if let Some(student_id) = filter.student_id {
            cond.push("r.student_id = {}", student_id);
        }
        if let Some(mentor_id) = filter.mentor_id {
            cond.push("r.mentor_id = {}", mentor_id);
        }
        if let Some(status) = filter.status {
            cond.push("r.status = {}", status.as_str());
        }
        let limit = cond.bind(clamp_limit(filter.limit));
        let sql = format!(
            "{} {} ORDER BY r.created_at DESC, r.id DESC LIMIT {}",
            SELECT_REQUESTS,
            cond.where_sql(),
            limit
        );

        let now = Utc::now();
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(cond.params().as_slice(), |row| map_request(row, now))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .unwrap_or_default()
    }

    /// Move a request forward in its lifecycle.
    ///
    /// Admins may move any request; everyone else only requests addressed to
    /// them, which is enforced by the WHERE clause. `Ok(false)` means no row
    /// matched: wrong id, not the caller's request, or an illegal source state.
    pub fn update_mentorship_request_status(
        &self,
        actor: &Actor,
        id: i64,
        status: RequestStatus,
    ) -> Result<bool, DbError> {
        let sources = status.allowed_sources();
        if sources.is_empty() {
            return Err(DbError::validation("A request cannot be moved back to pending"));
        }

        let mut cond = Conditions::new();
        let new_status = cond.bind(status.as_str());
        cond.push("id = {}", id);
        let allowed: Vec<String> = sources.iter().map(|s| cond.bind(s.as_str())).collect();
        cond.push_raw(&format!("status IN ({})", allowed.join(", ")));
        if !actor.is_admin() {
            cond.push("mentor_id = {}", actor.user_id);
        }

        let sql = format!(
            "UPDATE mentorship_requests SET status = {} {}",
            new_status,
            cond.where_sql()
        );
        let updated =
            self.with_conn(|conn| Ok(conn.execute(&sql, cond.params().as_slice())? > 0))?;

        if updated {
            info!("Mentorship request {} -> {} by user {}", id, status, actor.user_id);
        }
        Ok(updated)
    }

    /// Admin-only removal. The newest row for a pair is what gates the next
    /// request, so the requesting parties can never delete it themselves.
    pub fn delete_mentorship_request(&self, actor: &Actor, id: i64) -> Result<bool, DbError> {
        if !actor.is_admin() {
            return Ok(false);
        }
        let deleted = self.with_conn(|conn| {
            Ok(conn.execute("DELETE FROM mentorship_requests WHERE id = ?1", [id])? > 0)
        })?;
        if deleted {
            info!("Mentorship request {} deleted by admin {}", id, actor.user_id);
        }
        Ok(deleted)
    }
}

fn map_request(row: &Row<'_>, now: DateTime<Utc>) -> rusqlite::Result<MentorshipRequestRow> {
    let created_at: String = row.get("created_at")?;
    Ok(MentorshipRequestRow {
        id: row.get("id")?,
        student_id: row.get("student_id")?,
        student_name: row.get("student_name")?,
        mentor_id: row.get("mentor_id")?,
        mentor_name: row.get("mentor_name")?,
        status: text_enum(row, "status")?,
        message: row.get("message")?,
        created_ago: relative_time_str(&created_at, now),
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RequestOutcome;
    use crate::test_support::{add_admin, add_mentor, add_student, fresh_db};
    use mentorlink_types::models::Role;

    fn requested(db: &Database) -> (i64, i64, i64) {
        let student = add_student(db, "Sam Student", "CS-001");
        let mentor = add_mentor(db, "Maya Mentor");
        let id = match db.create_mentorship_request(student, mentor, "Need guidance").unwrap() {
            RequestOutcome::Created { id } => id,
            other => panic!("unexpected {:?}", other),
        };
        (student, mentor, id)
    }

    #[test]
    fn addressed_mentor_can_approve_then_complete() {
        let (_dir, db) = fresh_db();
        let (_, mentor, id) = requested(&db);
        let as_mentor = Actor::new(mentor, Role::Mentor);

        assert!(db.update_mentorship_request_status(&as_mentor, id, RequestStatus::Approved).unwrap());
        assert!(db.update_mentorship_request_status(&as_mentor, id, RequestStatus::Completed).unwrap());
        assert_eq!(db.get_mentorship_request(id).unwrap().status, RequestStatus::Completed);
    }

    #[test]
    fn other_mentor_affects_zero_rows() {
        let (_dir, db) = fresh_db();
        let (_, _, id) = requested(&db);
        let stranger = add_mentor(&db, "Other Mentor");
        let as_stranger = Actor::new(stranger, Role::Mentor);

        let updated = db
            .update_mentorship_request_status(&as_stranger, id, RequestStatus::Approved)
            .unwrap();
        assert!(!updated);
        assert_eq!(db.get_mentorship_request(id).unwrap().status, RequestStatus::Pending);
    }

    #[test]
    fn transitions_never_reverse() {
        let (_dir, db) = fresh_db();
        let (_, mentor, id) = requested(&db);
        let as_mentor = Actor::new(mentor, Role::Mentor);

        assert!(db.update_mentorship_request_status(&as_mentor, id, RequestStatus::Rejected).unwrap());
        assert!(!db.update_mentorship_request_status(&as_mentor, id, RequestStatus::Approved).unwrap());
        assert!(!db.update_mentorship_request_status(&as_mentor, id, RequestStatus::Completed).unwrap());
        assert!(db.update_mentorship_request_status(&as_mentor, id, RequestStatus::Pending).is_err());
        assert_eq!(db.get_mentorship_request(id).unwrap().status, RequestStatus::Rejected);
    }

    #[test]
    fn admin_can_moderate_any_request() {
        let (_dir, db) = fresh_db();
        let admin = add_admin(&db);
        let (_, _, id) = requested(&db);
        assert!(db.update_mentorship_request_status(&admin, id, RequestStatus::Approved).unwrap());
    }

    #[test]
    fn listing_joins_participant_names() {
        let (_dir, db) = fresh_db();
        let (student, mentor, id) = requested(&db);

        let mine = db.list_mentorship_requests(&RequestFilter {
            student_id: Some(student),
            ..Default::default()
        });
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id, id);
        assert_eq!(mine[0].mentor_name.as_deref(), Some("Maya Mentor"));
        assert_eq!(mine[0].mentor_id, mentor);

        let approved = db.list_mentorship_requests(&RequestFilter {
            mentor_id: Some(mentor),
            status: Some(RequestStatus::Approved),
            ..Default::default()
        });
        assert!(approved.is_empty());
    }

    #[test]
    fn only_admins_delete_requests() {
        let (_dir, db) = fresh_db();
        let admin = add_admin(&db);
        let (student, mentor, id) = requested(&db);

        let as_student = Actor::new(student, Role::Student);
        assert!(!db.delete_mentorship_request(&as_student, id).unwrap());
        let as_mentor = Actor::new(mentor, Role::Mentor);
        assert!(!db.delete_mentorship_request(&as_mentor, id).unwrap());
        assert!(db.get_mentorship_request(id).is_some());

        assert!(db.delete_mentorship_request(&admin, id).unwrap());
        assert!(db.get_mentorship_request(id).is_none());
        assert!(!db.delete_mentorship_request(&admin, id).unwrap());
    }
}
