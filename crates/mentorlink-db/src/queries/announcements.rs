use chrono::{DateTime, Utc};
use mentorlink_types::models::Actor;
use rusqlite::{OptionalExtension, Row, params};
use tracing::info;

use crate::derived::relative_time_str;
use crate::models::AnnouncementRow;
use crate::queries::{Assignments, as_params, clamp_limit};
use crate::{Database, DbError};

const SELECT_ANNOUNCEMENTS: &str = "
    SELECT a.id, a.title, a.content, a.created_by, u.name AS author_name, a.created_at
    FROM announcements a
    LEFT JOIN users u ON u.id = a.created_by";

impl Database {
    pub fn create_announcement(
        &self,
        actor: &Actor,
        title: &str,
        content: &str,
    ) -> Result<i64, DbError> {
        if !actor.is_admin() {
            return Err(DbError::validation("Only administrators can post announcements"));
        }
        if title.trim().is_empty() || content.trim().is_empty() {
            return Err(DbError::validation("Title and content are required"));
        }
        let id = self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO announcements (title, content, created_by) VALUES (?1, ?2, ?3)",
                params![title.trim(), content, actor.user_id],
            )?;
            Ok(conn.last_insert_rowid())
        })?;
        info!("Announcement {} posted by admin {}", id, actor.user_id);
        Ok(id)
    }

    pub fn get_announcement(&self, id: i64) -> Option<AnnouncementRow> {
        let sql = format!("{} WHERE a.id = ?1", SELECT_ANNOUNCEMENTS);
        let now = Utc::now();
        self.with_conn(|conn| {
            Ok(conn
                .query_row(&sql, [id], |row| map_announcement(row, now))
                .optional()?)
        })
        .unwrap_or_default()
    }

    /// Newest first.
    pub fn list_announcements(&self, limit: Option<u32>) -> Vec<AnnouncementRow> {
        let sql = format!(
            "{} ORDER BY a.created_at DESC, a.id DESC LIMIT ?1",
            SELECT_ANNOUNCEMENTS
        );
        let now = Utc::now();
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([clamp_limit(limit)], |row| map_announcement(row, now))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .unwrap_or_default()
    }

    pub fn update_announcement(
        &self,
        id: i64,
        title: Option<String>,
        content: Option<String>,
    ) -> Result<bool, DbError> {
        if title.is_none() && content.is_none() {
            return Ok(self.get_announcement(id).is_some());
        }
        let mut set = Assignments::new();
        set.set_opt("title", title);
        set.set_opt("content", content);

        let (sql, params) = set.update_by_id("announcements", id);
        self.with_conn(|conn| Ok(conn.execute(&sql, as_params(&params).as_slice())? > 0))
    }

    pub fn delete_announcement(&self, id: i64) -> Result<bool, DbError> {
        self.with_conn(|conn| {
            Ok(conn.execute("DELETE FROM announcements WHERE id = ?1", [id])? > 0)
        })
    }
}

fn map_announcement(row: &Row<'_>, now: DateTime<Utc>) -> rusqlite::Result<AnnouncementRow> {
    let created_at: String = row.get("created_at")?;
    Ok(AnnouncementRow {
        id: row.get("id")?,
        title: row.get("title")?,
        content: row.get("content")?,
        created_by: row.get("created_by")?,
        author_name: row.get("author_name")?,
        created_ago: relative_time_str(&created_at, now),
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{add_admin, add_mentor, fresh_db};
    use mentorlink_types::models::Role;

    #[test]
    fn admins_post_and_everyone_reads() {
        let (_dir, db) = fresh_db();
        let admin = add_admin(&db);
        let first = db.create_announcement(&admin, "Welcome", "Semester kickoff").unwrap();
        let second = db.create_announcement(&admin, "Reminder", "Office hours").unwrap();

        let all = db.list_announcements(None);
        assert_eq!(all.iter().map(|a| a.id).collect::<Vec<_>>(), vec![second, first]);
        assert_eq!(all[0].author_name.as_deref(), Some("Ada Admin"));
        assert_eq!(db.list_announcements(Some(1)).len(), 1);
    }

    #[test]
    fn non_admins_cannot_post() {
        let (_dir, db) = fresh_db();
        let mentor = add_mentor(&db, "Maya Mentor");
        let err = db
            .create_announcement(&Actor::new(mentor, Role::Mentor), "Hi", "There")
            .unwrap_err();
        assert!(matches!(err, DbError::Validation(_)));
        assert!(db.list_announcements(None).is_empty());
    }

    #[test]
    fn edit_and_delete() {
        let (_dir, db) = fresh_db();
        let admin = add_admin(&db);
        let id = db.create_announcement(&admin, "Welcome", "Draft").unwrap();

        assert!(db.update_announcement(id, None, Some("Final".to_string())).unwrap());
        let row = db.get_announcement(id).unwrap();
        assert_eq!(row.title, "Welcome");
        assert_eq!(row.content, "Final");

        assert!(db.delete_announcement(id).unwrap());
        assert!(!db.update_announcement(id, None, None).unwrap());
        assert!(db.get_announcement(id).is_none());
    }
}
