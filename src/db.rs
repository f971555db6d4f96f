use std::collections::HashSet;
use std::path::Path;

use anyhow::Result;
use rusqlite::{Connection, OptionalExtension};
use tracing::{info, warn};

pub const DEFAULT_CATEGORY: &str = "Uncategorized";

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)?;
        }
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS products (
            url            TEXT PRIMARY KEY,
            title          TEXT NOT NULL,
            description    TEXT NOT NULL DEFAULT '',
            specs          TEXT NOT NULL DEFAULT '',
            price          TEXT NOT NULL DEFAULT '',
            category       TEXT NOT NULL DEFAULT 'Uncategorized',
            generated_body TEXT,
            scraped_at     TEXT NOT NULL DEFAULT '',
            updated_at     TEXT NOT NULL DEFAULT (datetime('now')),
            promoted       INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_products_category ON products(category);
        CREATE INDEX IF NOT EXISTS idx_products_promoted ON products(promoted);
        ",
    )?;
    migrate_columns(conn)?;
    Ok(())
}

// Columns added since the first release. Databases created by older
// builds gain them in place; ALTER TABLE only allows constant defaults.
const EXPECTED_COLUMNS: &[(&str, &str)] = &[
    ("specs", "TEXT NOT NULL DEFAULT ''"),
    ("price", "TEXT NOT NULL DEFAULT ''"),
    ("category", "TEXT NOT NULL DEFAULT 'Uncategorized'"),
    ("generated_body", "TEXT"),
    ("scraped_at", "TEXT NOT NULL DEFAULT ''"),
    ("updated_at", "TEXT NOT NULL DEFAULT ''"),
    ("promoted", "INTEGER NOT NULL DEFAULT 0"),
];

/// Bring an existing products table up to the current column set.
/// Returns how many columns were added.
pub fn migrate_columns(conn: &Connection) -> Result<usize> {
    let mut stmt = conn.prepare("PRAGMA table_info(products)")?;
    let existing: HashSet<String> = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<_, _>>()?;

    let mut added = 0;
    for (name, decl) in EXPECTED_COLUMNS {
        if !existing.contains(*name) {
            conn.execute_batch(&format!("ALTER TABLE products ADD COLUMN {} {}", name, decl))?;
            info!("schema migration: added column {}", name);
            added += 1;
        }
    }
    Ok(added)
}

// ── Catalog writes ──

#[derive(Debug, Clone, PartialEq)]
pub struct CleanRecord {
    pub url: String,
    pub title: String,
    pub description: String,
    pub specs: String,
    pub price: String,
    pub category: String,
    pub scraped_at: String,
}

/// Insert or refresh scraped rows in one transaction. Re-scraping a url
/// updates its scraped fields but never touches generated_body or
/// promoted, so enrichment survives.
pub fn upsert(conn: &Connection, records: &[CleanRecord]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO products
                 (url, title, description, specs, price, category, scraped_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, datetime('now'))
             ON CONFLICT(url) DO UPDATE SET
                 title       = excluded.title,
                 description = excluded.description,
                 specs       = excluded.specs,
                 price       = excluded.price,
                 category    = excluded.category,
                 scraped_at  = excluded.scraped_at,
                 updated_at  = datetime('now')",
        )?;
        for r in records {
            count += stmt.execute(rusqlite::params![
                r.url, r.title, r.description, r.specs, r.price, r.category, r.scraped_at,
            ])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

/// Attach a generated article to a row. Unknown urls are a logged no-op.
pub fn write_body(conn: &Connection, url: &str, body: &str) -> Result<bool> {
    let n = conn.execute(
        "UPDATE products SET generated_body = ?1, updated_at = datetime('now') WHERE url = ?2",
        rusqlite::params![body, url],
    )?;
    if n == 0 {
        warn!("write_body: no row for {}", url);
    }
    Ok(n > 0)
}

/// Minimal row backing a keyword-driven article, keyed by a synthetic
/// url. Re-running the same keyword updates the title in place.
pub fn upsert_stub(
    conn: &Connection,
    url: &str,
    title: &str,
    category: &str,
    scraped_at: &str,
) -> Result<()> {
    conn.execute(
        "INSERT INTO products (url, title, category, scraped_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, datetime('now'))
         ON CONFLICT(url) DO UPDATE SET
             title      = excluded.title,
             updated_at = datetime('now')",
        rusqlite::params![url, title, category, scraped_at],
    )?;
    Ok(())
}

// ── Generation queue ──

#[derive(Debug, Clone)]
pub struct PendingRow {
    pub url: String,
    pub title: String,
    pub description: String,
    pub specs: String,
    pub price: String,
    pub category: String,
}

/// Rows still waiting for an article, newest scrape first. A priority
/// category, when given, is served before everything else.
pub fn fetch_pending(
    conn: &Connection,
    limit: usize,
    priority_category: Option<&str>,
) -> Result<Vec<PendingRow>> {
    let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
    let order = match priority_category {
        Some(cat) => {
            params.push(Box::new(cat.to_string()));
            "CASE WHEN category = ?1 THEN 0 ELSE 1 END, scraped_at DESC"
        }
        None => "scraped_at DESC",
    };
    let sql = format!(
        "SELECT url, title, description, specs, price, category
         FROM products
         WHERE generated_body IS NULL OR generated_body = ''
         ORDER BY {} LIMIT {}",
        order, limit
    );

    let mut stmt = conn.prepare(&sql)?;
    let param_refs: Vec<&dyn rusqlite::types::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let rows = stmt
        .query_map(param_refs.as_slice(), |row| {
            Ok(PendingRow {
                url: row.get(0)?,
                title: row.get(1)?,
                description: row.get(2)?,
                specs: row.get(3)?,
                price: row.get(4)?,
                category: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Promotion queue ──

#[derive(Debug)]
pub struct CandidateRow {
    pub url: String,
    pub title: String,
    pub category: String,
}

/// Oldest enriched row that has not been promoted yet.
pub fn fetch_candidate(conn: &Connection) -> Result<Option<CandidateRow>> {
    let row = conn
        .query_row(
            "SELECT url, title, category FROM products
             WHERE generated_body IS NOT NULL AND generated_body != '' AND promoted = 0
             ORDER BY scraped_at ASC LIMIT 1",
            [],
            |row| {
                Ok(CandidateRow {
                    url: row.get(0)?,
                    title: row.get(1)?,
                    category: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

pub fn mark_promoted(conn: &Connection, url: &str) -> Result<bool> {
    let n = conn.execute(
        "UPDATE products SET promoted = 1, updated_at = datetime('now') WHERE url = ?1",
        [url],
    )?;
    Ok(n > 0)
}

// ── Inspection ──

#[derive(Debug)]
pub struct ArticleRow {
    pub url: String,
    pub title: String,
    pub category: String,
    pub body: String,
    pub updated_at: String,
}

/// One enriched article: the given url, or the most recently updated.
pub fn fetch_article(conn: &Connection, url: Option<&str>) -> Result<Option<ArticleRow>> {
    let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
    let mut sql = String::from(
        "SELECT url, title, category, generated_body, updated_at FROM products
         WHERE generated_body IS NOT NULL AND generated_body != ''",
    );
    if let Some(u) = url {
        sql.push_str(" AND url = ?1");
        params.push(Box::new(u.to_string()));
    }
    sql.push_str(" ORDER BY updated_at DESC LIMIT 1");

    let param_refs: Vec<&dyn rusqlite::types::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let row = conn
        .query_row(&sql, param_refs.as_slice(), |row| {
            Ok(ArticleRow {
                url: row.get(0)?,
                title: row.get(1)?,
                category: row.get(2)?,
                body: row.get(3)?,
                updated_at: row.get(4)?,
            })
        })
        .optional()?;
    Ok(row)
}

// ── Stats ──

pub struct Stats {
    pub total: usize,
    pub pending: usize,
    pub enriched: usize,
    pub promoted: usize,
    pub by_category: Vec<(String, usize)>,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let total: usize = conn.query_row("SELECT COUNT(*) FROM products", [], |r| r.get(0))?;
    let pending: usize = conn.query_row(
        "SELECT COUNT(*) FROM products WHERE generated_body IS NULL OR generated_body = ''",
        [],
        |r| r.get(0),
    )?;
    let promoted: usize = conn.query_row(
        "SELECT COUNT(*) FROM products WHERE promoted = 1",
        [],
        |r| r.get(0),
    )?;

    let mut stmt = conn.prepare(
        "SELECT category, COUNT(*) FROM products GROUP BY category ORDER BY COUNT(*) DESC, category",
    )?;
    let by_category = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Stats {
        total,
        pending,
        enriched: total - pending,
        promoted,
        by_category,
    })
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn rec(url: &str, title: &str, category: &str, scraped_at: &str) -> CleanRecord {
        CleanRecord {
            url: url.into(),
            title: title.into(),
            description: "desc".into(),
            specs: "specs".into(),
            price: "$10".into(),
            category: category.into(),
            scraped_at: scraped_at.into(),
        }
    }

    #[test]
    fn upsert_inserts_then_updates() {
        let conn = test_conn();
        let n = upsert(&conn, &[rec("u1", "First", "AI Tool", "2024-01-01T00:00:00Z")]).unwrap();
        assert_eq!(n, 1);

        upsert(&conn, &[rec("u1", "Renamed", "AI Tool", "2024-02-01T00:00:00Z")]).unwrap();
        let total: usize = conn
            .query_row("SELECT COUNT(*) FROM products", [], |r| r.get(0))
            .unwrap();
        assert_eq!(total, 1);
        let title: String = conn
            .query_row("SELECT title FROM products WHERE url = 'u1'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(title, "Renamed");
    }

    #[test]
    fn upsert_preserves_enrichment() {
        let conn = test_conn();
        upsert(&conn, &[rec("u1", "Tool", "AI Tool", "2024-01-01T00:00:00Z")]).unwrap();
        write_body(&conn, "u1", "## Overview\nGreat tool.").unwrap();
        mark_promoted(&conn, "u1").unwrap();

        upsert(&conn, &[rec("u1", "Tool v2", "AI Tool", "2024-03-01T00:00:00Z")]).unwrap();

        let (title, body, promoted): (String, Option<String>, i64) = conn
            .query_row(
                "SELECT title, generated_body, promoted FROM products WHERE url = 'u1'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .unwrap();
        assert_eq!(title, "Tool v2");
        assert_eq!(body.as_deref(), Some("## Overview\nGreat tool."));
        assert_eq!(promoted, 1);
    }

    #[test]
    fn upsert_duplicate_in_batch_keeps_last() {
        let conn = test_conn();
        let n = upsert(
            &conn,
            &[
                rec("u1", "First", "AI Tool", "2024-01-01T00:00:00Z"),
                rec("u1", "Second", "AI Tool", "2024-01-02T00:00:00Z"),
            ],
        )
        .unwrap();
        assert_eq!(n, 2);
        let title: String = conn
            .query_row("SELECT title FROM products WHERE url = 'u1'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(title, "Second");
    }

    #[test]
    fn pending_excludes_enriched_but_not_empty_bodies() {
        let conn = test_conn();
        upsert(
            &conn,
            &[
                rec("u1", "A", "AI Tool", "2024-01-01T00:00:00Z"),
                rec("u2", "B", "Gadget", "2024-01-02T00:00:00Z"),
                rec("u3", "C", "Gadget", "2024-01-03T00:00:00Z"),
            ],
        )
        .unwrap();
        write_body(&conn, "u2", "article").unwrap();
        // An empty body does not count as enriched.
        write_body(&conn, "u3", "").unwrap();

        let pending = fetch_pending(&conn, 10, None).unwrap();
        let urls: Vec<&str> = pending.iter().map(|p| p.url.as_str()).collect();
        assert_eq!(urls, vec!["u3", "u1"]);
    }

    #[test]
    fn pending_priority_category_first_then_newest() {
        let conn = test_conn();
        upsert(
            &conn,
            &[
                rec("a-old", "A1", "AI Tool", "2024-01-01T00:00:00Z"),
                rec("g-new", "G1", "Gadget", "2024-06-01T00:00:00Z"),
                rec("a-mid", "A2", "AI Tool", "2024-03-01T00:00:00Z"),
            ],
        )
        .unwrap();

        let rows = fetch_pending(&conn, 10, Some("AI Tool")).unwrap();
        let urls: Vec<&str> = rows.iter().map(|p| p.url.as_str()).collect();
        assert_eq!(urls, vec!["a-mid", "a-old", "g-new"]);

        let rows = fetch_pending(&conn, 10, None).unwrap();
        let urls: Vec<&str> = rows.iter().map(|p| p.url.as_str()).collect();
        assert_eq!(urls, vec!["g-new", "a-mid", "a-old"]);
    }

    #[test]
    fn pending_respects_limit() {
        let conn = test_conn();
        upsert(
            &conn,
            &[
                rec("u1", "A", "AI Tool", "2024-01-01T00:00:00Z"),
                rec("u2", "B", "AI Tool", "2024-01-02T00:00:00Z"),
                rec("u3", "C", "AI Tool", "2024-01-03T00:00:00Z"),
            ],
        )
        .unwrap();
        assert_eq!(fetch_pending(&conn, 2, None).unwrap().len(), 2);
    }

    #[test]
    fn write_body_unknown_url_is_noop() {
        let conn = test_conn();
        assert!(!write_body(&conn, "nope", "body").unwrap());
        let total: usize = conn
            .query_row("SELECT COUNT(*) FROM products", [], |r| r.get(0))
            .unwrap();
        assert_eq!(total, 0);
    }

    #[test]
    fn candidate_is_oldest_enriched_unpromoted() {
        let conn = test_conn();
        upsert(
            &conn,
            &[
                rec("old", "Old", "AI Tool", "2024-01-01T00:00:00Z"),
                rec("new", "New", "AI Tool", "2024-06-01T00:00:00Z"),
                rec("pending", "Pending", "AI Tool", "2023-01-01T00:00:00Z"),
            ],
        )
        .unwrap();
        write_body(&conn, "old", "a").unwrap();
        write_body(&conn, "new", "b").unwrap();

        let c = fetch_candidate(&conn).unwrap().unwrap();
        assert_eq!(c.url, "old");

        assert!(mark_promoted(&conn, "old").unwrap());
        let c = fetch_candidate(&conn).unwrap().unwrap();
        assert_eq!(c.url, "new");

        mark_promoted(&conn, "new").unwrap();
        assert!(fetch_candidate(&conn).unwrap().is_none());
    }

    #[test]
    fn article_by_url_and_latest() {
        let conn = test_conn();
        upsert(
            &conn,
            &[
                rec("u1", "A", "AI Tool", "2024-01-01T00:00:00Z"),
                rec("u2", "B", "Gadget", "2024-01-02T00:00:00Z"),
            ],
        )
        .unwrap();
        write_body(&conn, "u1", "body one").unwrap();

        let a = fetch_article(&conn, Some("u1")).unwrap().unwrap();
        assert_eq!(a.body, "body one");
        // u2 has no body yet
        assert!(fetch_article(&conn, Some("u2")).unwrap().is_none());
        let latest = fetch_article(&conn, None).unwrap().unwrap();
        assert_eq!(latest.url, "u1");
    }

    #[test]
    fn migration_adds_missing_columns() {
        let conn = Connection::open_in_memory().unwrap();
        // A first-release table: url, title, description, scraped_at only.
        conn.execute_batch(
            "CREATE TABLE products (
                url         TEXT PRIMARY KEY,
                title       TEXT NOT NULL,
                description TEXT,
                scraped_at  TEXT
            );
            INSERT INTO products (url, title, description, scraped_at)
            VALUES ('u1', 'Legacy', 'old row', '2023-01-01T00:00:00Z');",
        )
        .unwrap();

        // Missing: specs, price, category, generated_body, updated_at, promoted.
        let added = migrate_columns(&conn).unwrap();
        assert_eq!(added, 6);

        // Old row picked up the defaults and the full API works on it.
        let cat: String = conn
            .query_row("SELECT category FROM products WHERE url = 'u1'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(cat, DEFAULT_CATEGORY);

        upsert(&conn, &[rec("u2", "New", "Gadget", "2024-01-01T00:00:00Z")]).unwrap();
        write_body(&conn, "u1", "migrated body").unwrap();
        assert_eq!(get_stats(&conn).unwrap().total, 2);

        // Second pass is a no-op.
        assert_eq!(migrate_columns(&conn).unwrap(), 0);
    }

    #[test]
    fn connect_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/data/catalog.sqlite");
        let conn = connect(&path).unwrap();
        init_schema(&conn).unwrap();
        upsert(&conn, &[rec("u1", "A", "Gadget", "2024-01-01T00:00:00Z")]).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn stats_counts() {
        let conn = test_conn();
        upsert(
            &conn,
            &[
                rec("u1", "A", "AI Tool", "2024-01-01T00:00:00Z"),
                rec("u2", "B", "AI Tool", "2024-01-02T00:00:00Z"),
                rec("u3", "C", "Gadget", "2024-01-03T00:00:00Z"),
            ],
        )
        .unwrap();
        write_body(&conn, "u1", "body").unwrap();
        mark_promoted(&conn, "u1").unwrap();

        let s = get_stats(&conn).unwrap();
        assert_eq!(s.total, 3);
        assert_eq!(s.pending, 2);
        assert_eq!(s.enriched, 1);
        assert_eq!(s.promoted, 1);
        assert_eq!(s.by_category[0], ("AI Tool".to_string(), 2));
    }
}
