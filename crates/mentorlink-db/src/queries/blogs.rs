use chrono::{DateTime, Utc};
use mentorlink_types::models::{Actor, BlogStatus};
use rusqlite::{OptionalExtension, Row, params};
use tracing::info;

use crate::columns::ColumnSet;
use crate::derived::{excerpt, format_timestamp, read_time_minutes, relative_time_str};
use crate::models::{BlogFilter, BlogRow, BlogUpdate, NewBlog};
use crate::queries::{Assignments, Conditions, as_params, clamp_limit, text_enum};
use crate::{Database, DbError};

const EXCERPT_CHARS: usize = 200;

impl Database {
    /// New posts start out `pending` until an admin publishes them.
    pub fn create_blog(&self, blog: &NewBlog) -> Result<i64, DbError> {
        if blog.title.trim().is_empty() || blog.content.trim().is_empty() {
            return Err(DbError::validation("Title and content are required"));
        }
        let summary = blog
            .excerpt
            .clone()
            .filter(|e| !e.trim().is_empty())
            .unwrap_or_else(|| excerpt(&blog.content, EXCERPT_CHARS));

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO blogs (title, content, excerpt, category, author_id)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![blog.title.trim(), blog.content, summary, blog.category, blog.author_id],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_blog(&self, id: i64) -> Option<BlogRow> {
        let cols = *self.columns();
        let sql = format!("{} WHERE b.id = ?1", select_blogs(&cols));
        let now = Utc::now();
        self.with_conn(|conn| {
            let row = conn
                .query_row(&sql, [id], |row| map_blog(row, now))
                .optional()?;
            Ok(row)
        })
        .unwrap_or_default()
    }

    pub fn list_blogs(&self, filter: &BlogFilter) -> Vec<BlogRow> {
        let cols = *self.columns();
        let mut cond = Conditions::new();
        if let Some(status) = filter.status {
            cond.push("b.status = {}", status.as_str());
        }
        if let Some(author_id) = filter.author_id {
            cond.push("b.author_id = {}", author_id);
        }
        if let Some(category) = &filter.category {
            cond.push("b.category = {}", category.clone());
        }
        let limit = cond.bind(clamp_limit(filter.limit));
        let sql = format!(
            "{} {} ORDER BY b.created_at DESC, b.id DESC LIMIT {}",
            select_blogs(&cols),
            cond.where_sql(),
            limit
        );

        let now = Utc::now();
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(cond.params().as_slice(), |row| map_blog(row, now))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .unwrap_or_default()
    }

    /// Edit a post. Changing the content without a new excerpt regenerates
    /// the excerpt. Moderation status is untouched.
    pub fn update_blog(&self, id: i64, update: &BlogUpdate) -> Result<bool, DbError> {
        let mut set = Assignments::new();
        set.set_opt("title", update.title.clone());
        set.set_opt("category", update.category.clone());
        if let Some(content) = &update.content {
            set.set("content", content.clone());
            if update.excerpt.is_none() {
                set.set("excerpt", excerpt(content, EXCERPT_CHARS));
            }
        }
        set.set_opt("excerpt", update.excerpt.clone());
        set.set_raw("updated_at = datetime('now')");

        let (sql, params) = set.update_by_id("blogs", id);
        self.with_conn(|conn| Ok(conn.execute(&sql, as_params(&params).as_slice())? > 0))
    }

    pub fn delete_blog(&self, id: i64) -> Result<bool, DbError> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM blogs WHERE id = ?1", [id])? > 0))
    }

    pub fn increment_blog_views(&self, id: i64) -> Result<bool, DbError> {
        self.with_conn(|conn| {
            Ok(conn.execute("UPDATE blogs SET views = views + 1 WHERE id = ?1", [id])? > 0)
        })
    }

    /// Admin moderation. Publishing stamps approval metadata, any other
    /// status clears it; both only where the schema has those columns.
    pub fn set_blog_status(
        &self,
        actor: &Actor,
        id: i64,
        status: BlogStatus,
    ) -> Result<bool, DbError> {
        if !actor.is_admin() {
            return Err(DbError::validation("Only administrators can moderate blogs"));
        }
        let cols = *self.columns();

        let mut set = Assignments::new();
        set.set("status", status.as_str());
        if status == BlogStatus::Published {
            if cols.blog_approved_at {
                set.set("approved_at", format_timestamp(Utc::now()));
            }
            if cols.blog_approved_by {
                set.set("approved_by", actor.user_id);
            }
        } else {
            if cols.blog_approved_at {
                set.set_raw("approved_at = NULL");
            }
            if cols.blog_approved_by {
                set.set_raw("approved_by = NULL");
            }
        }
        set.set_raw("updated_at = datetime('now')");

        let (sql, params) = set.update_by_id("blogs", id);
        let updated =
            self.with_conn(|conn| Ok(conn.execute(&sql, as_params(&params).as_slice())? > 0))?;
        if updated {
            info!("Blog {} set to {} by admin {}", id, status, actor.user_id);
        }
        Ok(updated)
    }
}

fn select_blogs(cols: &ColumnSet) -> String {
    format!(
        "SELECT {}, u.name AS author_name FROM blogs b LEFT JOIN users u ON u.id = b.author_id",
        cols.blog_projection("b")
    )
}

fn map_blog(row: &Row<'_>, now: DateTime<Utc>) -> rusqlite::Result<BlogRow> {
    let content: String = row.get("content")?;
    let created_at: String = row.get("created_at")?;
    Ok(BlogRow {
        id: row.get("id")?,
        title: row.get("title")?,
        read_time_minutes: read_time_minutes(&content),
        content,
        excerpt: row.get("excerpt")?,
        category: row.get("category")?,
        author_id: row.get("author_id")?,
        author_name: row.get("author_name")?,
        status: text_enum(row, "status")?,
        views: row.get("views")?,
        approved_at: row.get("approved_at")?,
        approved_by: row.get("approved_by")?,
        created_ago: relative_time_str(&created_at, now),
        created_at,
        updated_at: row.get("updated_at")?,
    })
}
