//! SQLite implementation of [`CacheStore`].

use std::collections::BTreeSet;

use async_trait::async_trait;
use bytes::Bytes;
use tokio_rusqlite::{params, rusqlite};

use super::connection::CacheDb;
use super::hash::body_digest;
use super::store::{CacheEntry, CacheStore};
use crate::Error;
use crate::http::{RequestKey, Response, ResponseType};
use crate::version::CacheName;

fn ensure_cache(conn: &rusqlite::Connection, name: &str) -> Result<(), Error> {
    conn.execute(
        "INSERT OR IGNORE INTO caches (name, created_at) VALUES (?1, ?2)",
        params![name, chrono::Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

fn upsert_entry(conn: &rusqlite::Connection, name: &str, key: &RequestKey, response: &Response) -> Result<(), Error> {
    let headers_json = serde_json::to_string(&response.headers)
        .map_err(|e| Error::InvalidInput(format!("failed to encode headers: {e}")))?;

    conn.execute(
        "INSERT INTO entries (
            cache_name, method, url, status, status_text, response_type,
            headers_json, body, body_sha256, stored_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        ON CONFLICT(cache_name, method, url) DO UPDATE SET
            status = excluded.status,
            status_text = excluded.status_text,
            response_type = excluded.response_type,
            headers_json = excluded.headers_json,
            body = excluded.body,
            body_sha256 = excluded.body_sha256,
            stored_at = excluded.stored_at",
        params![
            name,
            &key.method,
            &key.url,
            response.status,
            &response.status_text,
            response.response_type.as_str(),
            headers_json,
            &response.body[..],
            body_digest(&response.body),
            chrono::Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

struct EntryRow {
    status: u16,
    status_text: String,
    response_type: String,
    headers_json: String,
    body: Vec<u8>,
    digest: String,
    stored_at: String,
}

impl EntryRow {
    fn into_entry(self, key: RequestKey) -> Result<CacheEntry, Error> {
        if body_digest(&self.body) != self.digest {
            return Err(Error::CorruptEntry(format!("body digest mismatch for {key}")));
        }

        let headers: Vec<(String, String)> = serde_json::from_str(&self.headers_json)
            .map_err(|e| Error::CorruptEntry(format!("bad headers for {key}: {e}")))?;

        let response = Response {
            status: self.status,
            status_text: self.status_text,
            response_type: ResponseType::parse(&self.response_type)?,
            headers,
            body: Bytes::from(self.body),
        };

        Ok(CacheEntry { key, response, digest: self.digest, stored_at: self.stored_at })
    }
}

#[async_trait]
impl CacheStore for CacheDb {
    async fn open(&self, name: &CacheName) -> Result<(), Error> {
        let name = name.as_str().to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> { ensure_cache(conn, &name) })
            .await
            .map_err(Error::from)
    }

    async fn match_entry(&self, name: &CacheName, key: &RequestKey) -> Result<Option<CacheEntry>, Error> {
        let name = name.as_str().to_string();
        let key = key.clone();
        self.conn
            .call(move |conn| -> Result<Option<CacheEntry>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT status, status_text, response_type, headers_json, body, body_sha256, stored_at
                     FROM entries WHERE cache_name = ?1 AND method = ?2 AND url = ?3",
                )?;

                let result = stmt.query_row(params![name, &key.method, &key.url], |row| {
                    Ok(EntryRow {
                        status: row.get(0)?,
                        status_text: row.get(1)?,
                        response_type: row.get(2)?,
                        headers_json: row.get(3)?,
                        body: row.get(4)?,
                        digest: row.get(5)?,
                        stored_at: row.get(6)?,
                    })
                });

                match result {
                    Ok(row) => row.into_entry(key).map(Some),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    async fn put(&self, name: &CacheName, key: &RequestKey, response: &Response) -> Result<(), Error> {
        let name = name.as_str().to_string();
        let key = key.clone();
        let response = response.clone();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                ensure_cache(&tx, &name)?;
                upsert_entry(&tx, &name, &key, &response)?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn put_all(&self, name: &CacheName, entries: &[(RequestKey, Response)]) -> Result<(), Error> {
        let name = name.as_str().to_string();
        let entries = entries.to_vec();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                ensure_cache(&tx, &name)?;
                for (key, response) in &entries {
                    upsert_entry(&tx, &name, key, response)?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn delete(&self, name: &CacheName) -> Result<bool, Error> {
        let name = name.as_str().to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute("DELETE FROM caches WHERE name = ?1", params![name])?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    async fn list_names(&self) -> Result<BTreeSet<CacheName>, Error> {
        self.conn
            .call(|conn| -> Result<BTreeSet<CacheName>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM caches")?;
                let names = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(names.into_iter().map(CacheName::from_raw).collect())
            })
            .await
            .map_err(Error::from)
    }

    async fn keys(&self, name: &CacheName) -> Result<Vec<RequestKey>, Error> {
        let name = name.as_str().to_string();
        self.conn
            .call(move |conn| -> Result<Vec<RequestKey>, Error> {
                let mut stmt = conn.prepare("SELECT method, url FROM entries WHERE cache_name = ?1 ORDER BY url, method")?;
                let keys = stmt
                    .query_map(params![name], |row| Ok(RequestKey { method: row.get(0)?, url: row.get(1)? }))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(keys)
            })
            .await
            .map_err(Error::from)
    }
}
