use chrono::{DateTime, Utc};
use mentorlink_types::models::{Actor, Role};
use rusqlite::{OptionalExtension, Row, params};
use tracing::info;

use crate::derived::relative_time_str;
use crate::models::{AnswerRow, QuestionFilter, QuestionRow};
use crate::queries::{Assignments, Conditions, as_params, clamp_limit, opt_text_enum};
use crate::{Database, DbError};

const SELECT_QUESTIONS: &str = "
    SELECT q.id, q.title, q.content, q.author_id, u.name AS author_name, q.views, q.created_at,
           (SELECT COUNT(*) FROM answers a WHERE a.question_id = q.id) AS answers_count,
           EXISTS (SELECT 1 FROM answers a WHERE a.question_id = q.id AND a.is_verified = 1)
               AS has_verified_answer
    FROM questions q
    LEFT JOIN users u ON u.id = q.author_id";

impl Database {
    // -- Questions --

    pub fn create_question(&self, author_id: i64, title: &str, content: &str) -> Result<i64, DbError> {
        if title.trim().is_empty() || content.trim().is_empty() {
            return Err(DbError::validation("Title and content are required"));
        }
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO questions (title, content, author_id) VALUES (?1, ?2, ?3)",
                params![title.trim(), content, author_id],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_question(&self, id: i64) -> Option<QuestionRow> {
        let sql = format!("{} WHERE q.id = ?1", SELECT_QUESTIONS);
        let now = Utc::now();
        self.with_conn(|conn| {
            let row = conn
                .query_row(&sql, [id], |row| map_question(row, now))
                .optional()?;
            Ok(row)
        })
        .unwrap_or_default()
    }

    pub fn list_questions(&self, filter: &QuestionFilter) -> Vec<QuestionRow> {
        let mut cond = Conditions::new();
        if let Some(author_id) = filter.author_id {
            cond.push("q.author_id = {}", author_id);
        }
        if filter.unanswered_only {
            cond.push_raw("NOT EXISTS (SELECT 1 FROM answers a WHERE a.question_id = q.id)");
        }
        let limit = cond.bind(clamp_limit(filter.limit));
        let sql = format!(
            "{} {} ORDER BY q.created_at DESC, q.id DESC LIMIT {}",
            SELECT_QUESTIONS,
            cond.where_sql(),
            limit
        );

        let now = Utc::now();
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(cond.params().as_slice(), |row| map_question(row, now))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .unwrap_or_default()
    }

    pub fn update_question(
        &self,
        id: i64,
        title: Option<String>,
        content: Option<String>,
    ) -> Result<bool, DbError> {
        if title.is_none() && content.is_none() {
            return Ok(self.get_question(id).is_some());
        }
        let mut set = Assignments::new();
        set.set_opt("title", title);
        set.set_opt("content", content);

        let (sql, params) = set.update_by_id("questions", id);
        self.with_conn(|conn| Ok(conn.execute(&sql, as_params(&params).as_slice())? > 0))
    }

    /// Deletes the question and, by cascade, its answers.
    pub fn delete_question(&self, id: i64) -> Result<bool, DbError> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM questions WHERE id = ?1", [id])? > 0))
    }

    pub fn increment_question_views(&self, id: i64) -> Result<bool, DbError> {
        self.with_conn(|conn| {
            Ok(conn.execute("UPDATE questions SET views = views + 1 WHERE id = ?1", [id])? > 0)
        })
    }

    // -- Answers --

    pub fn create_answer(&self, question_id: i64, author_id: i64, content: &str) -> Result<i64, DbError> {
        if content.trim().is_empty() {
            return Err(DbError::validation("Answer cannot be empty"));
        }
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO answers (question_id, author_id, content) VALUES (?1, ?2, ?3)",
                params![question_id, author_id, content],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Verified answers first, then oldest first.
    pub fn list_answers(&self, question_id: i64) -> Vec<AnswerRow> {
        let now = Utc::now();
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT a.id, a.question_id, a.author_id, u.name AS author_name, u.role AS author_role,
                        a.content, a.is_verified, a.created_at
                 FROM answers a
                 LEFT JOIN users u ON u.id = a.author_id
                 WHERE a.question_id = ?1
                 ORDER BY a.is_verified DESC, a.created_at ASC, a.id ASC",
            )?;
            let rows = stmt
                .query_map([question_id], |row| map_answer(row, now))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .unwrap_or_default()
    }

    pub fn update_answer(&self, id: i64, content: &str) -> Result<bool, DbError> {
        if content.trim().is_empty() {
            return Err(DbError::validation("Answer cannot be empty"));
        }
        self.with_conn(|conn| {
            Ok(conn.execute("UPDATE answers SET content = ?1 WHERE id = ?2", params![content, id])? > 0)
        })
    }

    pub fn delete_answer(&self, id: i64) -> Result<bool, DbError> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM answers WHERE id = ?1", [id])? > 0))
    }

    /// Mark an answer as verified (or not). Mentors and admins moderate answers.
    pub fn set_answer_verified(&self, actor: &Actor, id: i64, verified: bool) -> Result<bool, DbError> {
        if !matches!(actor.role, Role::Admin | Role::Mentor) {
            return Err(DbError::validation("Only mentors and administrators can verify answers"));
        }
        let updated = self.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE answers SET is_verified = ?1 WHERE id = ?2",
                params![verified, id],
            )? > 0)
        })?;
        if updated {
            info!("Answer {} verified={} by user {}", id, verified, actor.user_id);
        }
        Ok(updated)
    }
}

fn map_question(row: &Row<'_>, now: DateTime<Utc>) -> rusqlite::Result<QuestionRow> {
    let created_at: String = row.get("created_at")?;
    Ok(QuestionRow {
        id: row.get("id")?,
        title: row.get("title")?,
        content: row.get("content")?,
        author_id: row.get("author_id")?,
        author_name: row.get("author_name")?,
        views: row.get("views")?,
        answers_count: row.get("answers_count")?,
        has_verified_answer: row.get("has_verified_answer")?,
        created_ago: relative_time_str(&created_at, now),
        created_at,
    })
}

fn map_answer(row: &Row<'_>, now: DateTime<Utc>) -> rusqlite::Result<AnswerRow> {
    let created_at: String = row.get("created_at")?;
    Ok(AnswerRow {
        id: row.get("id")?,
        question_id: row.get("question_id")?,
        author_id: row.get("author_id")?,
        author_name: row.get("author_name")?,
        author_role: opt_text_enum(row, "author_role")?,
        content: row.get("content")?,
        is_verified: row.get("is_verified")?,
        created_ago: relative_time_str(&created_at, now),
        created_at,
    })
}
