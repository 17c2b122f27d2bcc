use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

#[derive(Debug, Clone)]
pub struct Account {
    pub id: i64,
    pub reddit_id: String,
    pub username: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub account_id: i64,
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub scope: Vec<String>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Default, Clone)]
pub struct Options {
    pub path: Option<PathBuf>,
    /// Keep everything in memory; nothing outlives the process.
    pub in_memory: bool,
}

impl Store {
    pub fn open(opts: Options) -> Result<Self> {
        let conn = if opts.in_memory {
            Connection::open_in_memory().context("storage: open in-memory database")?
        } else {
            let path = match opts.path {
                Some(path) => path,
                None => default_path().context("storage: resolve default path")?,
            };
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("storage: create directory {}", parent.display()))?;
            }
            let conn = Connection::open(&path)
                .with_context(|| format!("storage: open database at {}", path.display()))?;
            conn.pragma_update(None, "journal_mode", "WAL")
                .context("storage: set WAL")?;
            conn.pragma_update(None, "busy_timeout", 5000)
                .context("storage: set busy timeout")?;
            debug!(path = %path.display(), "opened state database");
            conn
        };
        conn.pragma_update(None, "foreign_keys", "ON")
            .context("storage: enable foreign keys")?;
        migrate(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn close(self) -> Result<()> {
        let conn = Arc::try_unwrap(self.conn)
            .map_err(|_| anyhow!("storage: connection still in use"))?
            .into_inner();
        conn.close()
            .map_err(|(_, err)| err)
            .context("storage: close connection")
    }

    pub fn upsert_account(&self, mut account: Account) -> Result<i64> {
        if account.reddit_id.is_empty() {
            bail!("storage: reddit id required");
        }
        let now = Utc::now();
        if account.created_at.timestamp() == 0 {
            account.created_at = now;
        }
        account.updated_at = now;

        let conn = self.conn.lock();
        let id: i64 = conn.query_row(
            r#"
INSERT INTO accounts (reddit_id, username, display_name, created_at, updated_at)
VALUES (?1, ?2, ?3, ?4, ?5)
ON CONFLICT(reddit_id) DO UPDATE SET
  username = excluded.username,
  display_name = excluded.display_name,
  updated_at = excluded.updated_at
RETURNING id
"#,
            params![
                account.reddit_id,
                account.username,
                account.display_name,
                account.created_at.timestamp(),
                account.updated_at.timestamp(),
            ],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// Accounts, most recently used first.
    pub fn list_accounts(&self) -> Result<Vec<Account>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            r#"
SELECT id, reddit_id, username, display_name, created_at, updated_at
FROM accounts
ORDER BY updated_at DESC, id DESC
"#,
        )?;
        let rows = stmt
            .query_map([], account_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Removes an account; its token goes with it.
    pub fn delete_account(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM accounts WHERE id = ?1", params![id])
            .context("storage: delete account")?;
        Ok(())
    }

    /// Forgets every account and token.
    pub fn clear_auth(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute_batch("DELETE FROM tokens; DELETE FROM accounts;")
            .context("storage: clear auth")?;
        Ok(())
    }

    pub fn upsert_token(&self, token: Token) -> Result<()> {
        if token.account_id == 0 {
            bail!("storage: account id required for token");
        }
        let scope = token.scope.join(" ");
        let conn = self.conn.lock();
        conn.execute(
            r#"
INSERT INTO tokens (account_id, access_token, refresh_token, token_type, scope, expires_at)
VALUES (?1, ?2, ?3, ?4, ?5, ?6)
ON CONFLICT(account_id) DO UPDATE SET
  access_token = excluded.access_token,
  refresh_token = excluded.refresh_token,
  token_type = excluded.token_type,
  scope = excluded.scope,
  expires_at = excluded.expires_at
"#,
            params![
                token.account_id,
                token.access_token,
                token.refresh_token,
                token.token_type,
                scope,
                token.expires_at.timestamp(),
            ],
        )?;
        Ok(())
    }

    pub fn get_token(&self, account_id: i64) -> Result<Option<Token>> {
        let conn = self.conn.lock();
        conn.query_row(
            r#"
SELECT account_id, access_token, refresh_token, token_type, scope, expires_at
FROM tokens
WHERE account_id = ?1
"#,
            params![account_id],
            |row| {
                let expires: i64 = row.get(5)?;
                let scope: String = row.get(4)?;
                Ok(Token {
                    account_id: row.get(0)?,
                    access_token: row.get(1)?,
                    refresh_token: row.get(2)?,
                    token_type: row.get(3)?,
                    scope: scope.split_whitespace().map(str::to_owned).collect(),
                    expires_at: timestamp(expires),
                })
            },
        )
        .optional()
        .context("storage: query token")
    }

    /// Records a visited link and drops the oldest entries beyond `keep`.
    pub fn add_history(&self, url: &str, keep: usize) -> Result<()> {
        if url.is_empty() {
            return Ok(());
        }
        let conn = self.conn.lock();
        // REPLACE reinserts, so rowid order is visit order
        conn.execute(
            "INSERT OR REPLACE INTO history (url, visited_at) VALUES (?1, ?2)",
            params![url, Utc::now().timestamp()],
        )
        .context("storage: record history")?;
        conn.execute(
            r#"
DELETE FROM history WHERE url NOT IN (
  SELECT url FROM history ORDER BY rowid DESC LIMIT ?1
)
"#,
            params![keep as i64],
        )
        .context("storage: prune history")?;
        Ok(())
    }

    pub fn in_history(&self, url: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM history WHERE url = ?1",
                params![url],
                |row| row.get(0),
            )
            .optional()
            .context("storage: query history")?;
        Ok(found.is_some())
    }
}

fn timestamp(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_else(Utc::now)
}

fn account_from_row(row: &Row<'_>) -> rusqlite::Result<Account> {
    let created: i64 = row.get(4)?;
    let updated: i64 = row.get(5)?;
    Ok(Account {
        id: row.get(0)?,
        reddit_id: row.get(1)?,
        username: row.get(2)?,
        display_name: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        created_at: timestamp(created),
        updated_at: timestamp(updated),
    })
}

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY,
  applied_at INTEGER NOT NULL
)
"#,
        [],
    )?;

    let current: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    for (idx, sql) in migrations().iter().enumerate() {
        let version = (idx + 1) as i64;
        if version <= current {
            continue;
        }
        conn.execute_batch(sql)
            .with_context(|| format!("storage: apply migration {}", version))?;
        conn.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            params![
                version,
                SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or(Duration::from_secs(0))
                    .as_secs() as i64,
            ],
        )?;
    }
    Ok(())
}

fn migrations() -> Vec<&'static str> {
    vec![
        r#"
CREATE TABLE IF NOT EXISTS accounts (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  reddit_id TEXT NOT NULL UNIQUE,
  username TEXT NOT NULL,
  display_name TEXT,
  created_at INTEGER NOT NULL,
  updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS tokens (
  account_id INTEGER PRIMARY KEY,
  access_token TEXT NOT NULL,
  refresh_token TEXT NOT NULL,
  token_type TEXT NOT NULL,
  scope TEXT NOT NULL,
  expires_at INTEGER NOT NULL,
  FOREIGN KEY(account_id) REFERENCES accounts(id) ON DELETE CASCADE
);
"#,
        r#"
CREATE TABLE IF NOT EXISTS history (
  url TEXT PRIMARY KEY,
  visited_at INTEGER NOT NULL
);
"#,
    ]
}

pub fn default_path() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("rtv").join("state.db"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn memory() -> Store {
        Store::open(Options {
            in_memory: true,
            ..Options::default()
        })
        .unwrap()
    }

    fn account(reddit_id: &str) -> Account {
        Account {
            id: 0,
            reddit_id: reddit_id.into(),
            username: format!("user_{}", reddit_id),
            display_name: String::new(),
            created_at: timestamp(0),
            updated_at: timestamp(0),
        }
    }

    fn token(account_id: i64) -> Token {
        Token {
            account_id,
            access_token: "access".into(),
            refresh_token: "refresh".into(),
            token_type: "bearer".into(),
            scope: vec!["read".into(), "vote".into()],
            expires_at: Utc::now(),
        }
    }

    #[test]
    fn open_on_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("state.db");
        let store = Store::open(Options {
            path: Some(path.clone()),
            in_memory: false,
        })
        .unwrap();
        assert!(path.exists());
        store.close().unwrap();

        // migrations are idempotent
        let reopened = Store::open(Options {
            path: Some(path),
            in_memory: false,
        })
        .unwrap();
        assert!(reopened.list_accounts().unwrap().is_empty());
    }

    #[test]
    fn accounts_and_tokens_round_trip() {
        let store = memory();
        let id = store.upsert_account(account("abc")).unwrap();
        assert_eq!(store.upsert_account(account("abc")).unwrap(), id);
        store.upsert_token(token(id)).unwrap();
        let saved = store.get_token(id).unwrap().unwrap();
        assert_eq!(saved.scope, vec!["read".to_string(), "vote".to_string()]);
        let accounts = store.list_accounts().unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].username, "user_abc");
    }

    #[test]
    fn deleting_account_drops_token() {
        let store = memory();
        let id = store.upsert_account(account("abc")).unwrap();
        store.upsert_token(token(id)).unwrap();
        store.delete_account(id).unwrap();
        assert!(store.get_token(id).unwrap().is_none());
    }

    #[test]
    fn clear_auth_forgets_everyone() {
        let store = memory();
        for reddit_id in ["a", "b"] {
            let id = store.upsert_account(account(reddit_id)).unwrap();
            store.upsert_token(token(id)).unwrap();
        }
        store.clear_auth().unwrap();
        assert!(store.list_accounts().unwrap().is_empty());
    }

    #[test]
    fn history_keeps_newest_entries() {
        let store = memory();
        for url in ["a", "b", "c", "a", "d"] {
            store.add_history(url, 3).unwrap();
        }
        // revisiting "a" moved it ahead of "b", which was pruned instead
        for url in ["a", "c", "d"] {
            assert!(store.in_history(url).unwrap(), "{url} kept");
        }
        assert!(!store.in_history("b").unwrap());
    }

    #[test]
    fn token_requires_account() {
        let store = memory();
        assert!(store.upsert_token(token(0)).is_err());
    }
}
