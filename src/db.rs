use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{params, Connection};

use crate::hearings::committee::{Committee, CommitteeRegistry, Subcommittee};

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS committees (
            thomas_id    TEXT PRIMARY KEY,
            name         TEXT NOT NULL,
            url          TEXT,
            minority_url TEXT,
            imported_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS subcommittees (
            id           INTEGER PRIMARY KEY,
            committee_id TEXT NOT NULL REFERENCES committees(thomas_id) ON DELETE CASCADE,
            thomas_id    TEXT NOT NULL,
            name         TEXT NOT NULL,
            UNIQUE(committee_id, thomas_id)
        );
        CREATE INDEX IF NOT EXISTS idx_subcommittees_committee ON subcommittees(committee_id);

        CREATE TABLE IF NOT EXISTS imports (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            committees  INTEGER NOT NULL,
            imported_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        ",
    )?;
    Ok(())
}

// ── Import ──

/// JSON array of committees as published by the congress-legislators project.
pub fn load_committees_file(path: &Path) -> Result<Vec<Committee>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a JSON array of committees", path.display()))
}

/// Replace the registry contents with `committees`. Returns subcommittees written.
pub fn import_committees(conn: &Connection, committees: &[Committee]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut subcommittee_count = 0;
    {
        tx.execute("DELETE FROM subcommittees", [])?;
        tx.execute("DELETE FROM committees", [])?;

        let mut c_stmt = tx.prepare(
            "INSERT OR REPLACE INTO committees (thomas_id, name, url, minority_url)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        let mut s_stmt = tx.prepare(
            "INSERT OR IGNORE INTO subcommittees (committee_id, thomas_id, name)
             VALUES (?1, ?2, ?3)",
        )?;
        for c in committees {
            c_stmt.execute(params![c.thomas_id, c.name, c.url, c.minority_url])?;
            for s in &c.subcommittees {
                subcommittee_count += s_stmt.execute(params![c.thomas_id, s.thomas_id, s.name])?;
            }
        }
        tx.execute("INSERT INTO imports (committees) VALUES (?1)", [committees.len()])?;
    }
    tx.commit()?;
    Ok(subcommittee_count)
}

// ── Lookup ──

pub struct SqliteRegistry {
    conn: Connection,
}

impl SqliteRegistry {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    fn subcommittees_of(&self, committee_id: &str) -> Result<Vec<Subcommittee>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, thomas_id FROM subcommittees WHERE committee_id = ?1 ORDER BY id")?;
        let rows = stmt
            .query_map([committee_id], |row| {
                Ok(Subcommittee {
                    name: row.get(0)?,
                    thomas_id: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

impl CommitteeRegistry for SqliteRegistry {
    /// Committee count and the id of the latest import; every import bumps the id.
    fn snapshot(&self) -> Result<String> {
        let (count, import): (usize, Option<i64>) = self.conn.query_row(
            "SELECT (SELECT COUNT(*) FROM committees), (SELECT MAX(id) FROM imports)",
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;
        Ok(format!("{}@{}", count, import.unwrap_or(0)))
    }

    fn committees(&self, thomas_id: Option<&str>) -> Result<Vec<Committee>> {
        let mut stmt = self.conn.prepare(
            "SELECT thomas_id, name, url, minority_url FROM committees
             WHERE ?1 IS NULL OR thomas_id = ?1
             ORDER BY rowid",
        )?;
        let mut committees = stmt
            .query_map([thomas_id], |row| {
                Ok(Committee {
                    thomas_id: row.get(0)?,
                    name: row.get(1)?,
                    url: row.get(2)?,
                    minority_url: row.get(3)?,
                    subcommittees: Vec::new(),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for committee in &mut committees {
            committee.subcommittees = self.subcommittees_of(&committee.thomas_id)?;
        }
        Ok(committees)
    }
}

// ── Stats ──

pub struct Stats {
    pub committees: usize,
    pub subcommittees: usize,
    pub last_import: Option<String>,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let committees: usize = conn.query_row("SELECT COUNT(*) FROM committees", [], |r| r.get(0))?;
    let subcommittees: usize =
        conn.query_row("SELECT COUNT(*) FROM subcommittees", [], |r| r.get(0))?;
    let last_import: Option<String> =
        conn.query_row("SELECT MAX(imported_at) FROM imports", [], |r| r.get(0))?;
    Ok(Stats {
        committees,
        subcommittees,
        last_import,
    })
}
