//! User identity rows.
//!
//! Identity is owned elsewhere; the core only needs a stable id, a display
//! handle and the active flag that feeds the daily attendance creator.

use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension, Row};

const UPSERT_USER: &str = "INSERT INTO users (id, username, is_active) VALUES (?1, ?2, ?3) \
    ON CONFLICT(id) DO UPDATE SET username = excluded.username, is_active = excluded.is_active";
const SELECT_USER: &str = "SELECT id, username, is_active FROM users WHERE id = ?1";
const SELECT_ACTIVE: &str = "SELECT id, username, is_active FROM users WHERE is_active = 1 ORDER BY id";

#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub username: String,
    pub is_active: bool,
}

fn row_to_user(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get("id")?,
        username: row.get("username")?,
        is_active: row.get("is_active")?,
    })
}

pub fn upsert(conn: &Connection, user: &User) -> Result<()> {
    conn.execute(UPSERT_USER, params![user.id, user.username, user.is_active])?;
    Ok(())
}

pub fn fetch(conn: &Connection, id: &str) -> Result<Option<User>> {
    let user = conn.query_row(SELECT_USER, params![id], row_to_user).optional()?;
    Ok(user)
}

pub fn list_active(conn: &Connection) -> Result<Vec<User>> {
    let mut stmt = conn.prepare(SELECT_ACTIVE)?;
    let users = stmt.query_map([], row_to_user)?.collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(users)
}
