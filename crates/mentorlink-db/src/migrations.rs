use rusqlite::Connection;
use tracing::info;

use crate::DbError;

/// Baseline schema. Columns that only newer deployments carry (user contact
/// fields, blog approval metadata, message sender role) are not created here;
/// they are feature-detected and added by [`crate::evolution`].
pub fn run(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            name                TEXT NOT NULL,
            email               TEXT NOT NULL UNIQUE COLLATE NOCASE,
            password_hash       TEXT NOT NULL,
            role                TEXT NOT NULL CHECK (role IN ('student', 'mentor', 'admin')),
            status              TEXT NOT NULL DEFAULT 'inactive'
                                CHECK (status IN ('active', 'inactive')),
            is_email_verified   INTEGER NOT NULL DEFAULT 0,
            verification_status TEXT NOT NULL DEFAULT 'pending'
                                CHECK (verification_status IN ('pending', 'approved', 'rejected')),
            avatar              TEXT,
            bio                 TEXT,
            created_at          TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at          TEXT
        );

        CREATE TABLE IF NOT EXISTS students (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id         INTEGER NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE,
            roll_number     TEXT NOT NULL UNIQUE,
            branch          TEXT,
            year            INTEGER,
            college_id_path TEXT
        );

        CREATE TABLE IF NOT EXISTS mentors (
            id                INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id           INTEGER NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE,
            company           TEXT,
            position          TEXT,
            expertise         TEXT,
            job_id_path       TEXT,
            verified_by_admin INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS blogs (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            title       TEXT NOT NULL,
            content     TEXT NOT NULL,
            excerpt     TEXT,
            category    TEXT,
            author_id   INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            status      TEXT NOT NULL DEFAULT 'pending'
                        CHECK (status IN ('pending', 'published', 'rejected')),
            views       INTEGER NOT NULL DEFAULT 0,
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at  TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_blogs_status
            ON blogs(status, created_at);

        CREATE TABLE IF NOT EXISTS questions (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            title       TEXT NOT NULL,
            content     TEXT NOT NULL,
            author_id   INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            views       INTEGER NOT NULL DEFAULT 0,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS answers (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            question_id INTEGER NOT NULL REFERENCES questions(id) ON DELETE CASCADE,
            author_id   INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            content     TEXT NOT NULL,
            is_verified INTEGER NOT NULL DEFAULT 0,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_answers_question
            ON answers(question_id);

        CREATE TABLE IF NOT EXISTS mentorship_requests (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            student_id  INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            mentor_id   INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            status      TEXT NOT NULL DEFAULT 'pending'
                        CHECK (status IN ('pending', 'approved', 'rejected', 'completed')),
            message     TEXT,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS announcements (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            title       TEXT NOT NULL,
            content     TEXT NOT NULL,
            created_by  INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS messages (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            request_id  INTEGER NOT NULL REFERENCES mentorship_requests(id) ON DELETE CASCADE,
            sender_id   INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            receiver_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            message     TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_messages_request
            ON messages(request_id, created_at);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
