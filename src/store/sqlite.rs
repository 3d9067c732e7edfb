//! SQLite-backed metadata store.
//!
//! Owns the `fileinfo`, `filemetadata` and `shorturl` tables. Listing
//! queries are assembled with `sqlx::QueryBuilder`; metadata predicates
//! compile to correlated `EXISTS` subqueries over the metadata rows.

use crate::models::{FileRecord, Metadata, ShortUrlParams};
use crate::query::FilesQuery;
use crate::store::{MetadataStore, ShortUrlStore, StoreError, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, SqlitePool, sqlite::Sqlite};
use std::sync::Arc;
use tracing::debug;

/// Page size applied when a listing request does not name one.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

const MAX_PAGE_SIZE: u32 = 1000;

const RECORD_COLUMNS: &str =
    "account, identifier AS file_identifier, size, checksum, mime, extension, added, updated";

#[derive(Clone)]
pub struct SqliteMetadataStore {
    db: Arc<SqlitePool>,
}

impl SqliteMetadataStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn insert_record(
        &self,
        account: &str,
        identifier: &str,
        record: &FileRecord,
    ) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO fileinfo (account, identifier, size, checksum, mime, extension, added, updated)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(account, identifier) DO UPDATE SET updated = excluded.updated",
        )
        .bind(account)
        .bind(identifier)
        .bind(record.size)
        .bind(&record.checksum)
        .bind(&record.mime)
        .bind(&record.extension)
        .bind(record.added)
        .bind(record.updated)
        .execute(&*self.db)
        .await?;

        debug!(account, identifier, "upserted file record");
        Ok(())
    }

    async fn delete_record(&self, account: &str, identifier: &str) -> StoreResult<()> {
        let mut tx = self.db.begin().await?;

        let result = sqlx::query("DELETE FROM fileinfo WHERE account = ? AND identifier = ?")
            .bind(account)
            .bind(identifier)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        // The metadata set is owned by the record and goes with it.
        sqlx::query("DELETE FROM filemetadata WHERE account = ? AND identifier = ?")
            .bind(account)
            .bind(identifier)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn record_exists(&self, account: &str, identifier: &str) -> StoreResult<bool> {
        let exists: i64 = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM fileinfo WHERE account = ? AND identifier = ?)",
        )
        .bind(account)
        .bind(identifier)
        .fetch_one(&*self.db)
        .await?;

        Ok(exists == 1)
    }

    async fn load_record(
        &self,
        account: &str,
        identifier: &str,
    ) -> StoreResult<Option<FileRecord>> {
        let record = sqlx::query_as::<_, FileRecord>(&format!(
            "SELECT {RECORD_COLUMNS} FROM fileinfo WHERE account = ? AND identifier = ?"
        ))
        .bind(account)
        .bind(identifier)
        .fetch_optional(&*self.db)
        .await?;

        Ok(record)
    }

    async fn update_metadata(
        &self,
        account: &str,
        identifier: &str,
        metadata: &Metadata,
    ) -> StoreResult<()> {
        let mut tx = self.db.begin().await?;

        let result =
            sqlx::query("UPDATE fileinfo SET updated = ? WHERE account = ? AND identifier = ?")
                .bind(Utc::now())
                .bind(account)
                .bind(identifier)
                .execute(&mut *tx)
                .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        sqlx::query("DELETE FROM filemetadata WHERE account = ? AND identifier = ?")
            .bind(account)
            .bind(identifier)
            .execute(&mut *tx)
            .await?;

        // Insertion order is preserved through rowid.
        for (name, value) in metadata {
            sqlx::query(
                "INSERT INTO filemetadata (account, identifier, tag_name, tag_value)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(account)
            .bind(identifier)
            .bind(name)
            .bind(value.to_string())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn load_metadata(&self, account: &str, identifier: &str) -> StoreResult<Metadata> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT tag_name, tag_value FROM filemetadata
             WHERE account = ? AND identifier = ? ORDER BY rowid",
        )
        .bind(account)
        .bind(identifier)
        .fetch_all(&*self.db)
        .await?;

        let mut metadata = Metadata::new();
        for (name, value) in rows {
            let value = serde_json::from_str(&value)
                .map_err(|err| StoreError::backend(format!("corrupt metadata value: {err}")))?;
            metadata.insert(name, value);
        }

        Ok(metadata)
    }

    async fn delete_metadata(&self, account: &str, identifier: &str) -> StoreResult<()> {
        self.update_metadata(account, identifier, &Metadata::new())
            .await
    }

    async fn list_records(
        &self,
        account: &str,
        query: &FilesQuery,
    ) -> StoreResult<Vec<FileRecord>> {
        let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let offset = (i64::from(query.page.max(1)) - 1) * i64::from(limit);

        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {RECORD_COLUMNS} FROM fileinfo WHERE account = "
        ));
        builder.push_bind(account);

        if let Some(from) = query.from {
            builder.push(" AND added >= ");
            builder.push_bind(from);
        }

        if let Some(to) = query.to {
            builder.push(" AND added <= ");
            builder.push_bind(to);
        }

        if !query.identifiers.is_empty() {
            builder.push(" AND identifier IN (");
            let mut separated = builder.separated(", ");
            for identifier in &query.identifiers {
                separated.push_bind(identifier.as_str());
            }
            separated.push_unseparated(")");
        }

        if let Some(predicate) = &query.predicate {
            push_predicate(&mut builder, predicate)?;
        }

        builder.push(" ORDER BY ");
        builder.push(query.sort.field.column());
        builder.push(if query.sort.descending { " DESC" } else { " ASC" });
        builder.push(" LIMIT ");
        builder.push_bind(i64::from(limit));
        builder.push(" OFFSET ");
        builder.push_bind(offset);

        let mut records: Vec<FileRecord> =
            builder.build_query_as().fetch_all(&*self.db).await?;

        if query.include_metadata {
            for record in &mut records {
                record.metadata = Some(
                    self.load_metadata(account, &record.file_identifier)
                        .await?,
                );
            }
        }

        Ok(records)
    }

    async fn last_modified(
        &self,
        account: &str,
        identifier: Option<&str>,
    ) -> StoreResult<DateTime<Utc>> {
        match identifier {
            Some(identifier) => {
                let updated: Option<DateTime<Utc>> = sqlx::query_scalar(
                    "SELECT updated FROM fileinfo WHERE account = ? AND identifier = ?",
                )
                .bind(account)
                .bind(identifier)
                .fetch_optional(&*self.db)
                .await?;

                updated.ok_or(StoreError::NotFound)
            }
            None => {
                let updated: Option<DateTime<Utc>> =
                    sqlx::query_scalar("SELECT MAX(updated) FROM fileinfo WHERE account = ?")
                        .bind(account)
                        .fetch_one(&*self.db)
                        .await?;

                // An account with no records reports the current time.
                Ok(updated.unwrap_or_else(Utc::now))
            }
        }
    }

    async fn mime_type(&self, account: &str, identifier: &str) -> StoreResult<String> {
        let mime: Option<String> =
            sqlx::query_scalar("SELECT mime FROM fileinfo WHERE account = ? AND identifier = ?")
                .bind(account)
                .bind(identifier)
                .fetch_optional(&*self.db)
                .await?;

        mime.ok_or(StoreError::NotFound)
    }
}

#[async_trait]
impl ShortUrlStore for SqliteMetadataStore {
    async fn insert_short_url(
        &self,
        short_url_id: &str,
        params: &ShortUrlParams,
    ) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO shorturl (short_url_id, account, identifier, extension, query)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(short_url_id)
        .bind(&params.account)
        .bind(&params.file_identifier)
        .bind(params.extension.as_deref())
        .bind(params.normalized_query())
        .execute(&*self.db)
        .await?;

        Ok(())
    }

    async fn short_url_id(&self, params: &ShortUrlParams) -> StoreResult<Option<String>> {
        let id: Option<String> = sqlx::query_scalar(
            "SELECT short_url_id FROM shorturl
             WHERE account = ? AND identifier = ? AND extension IS ? AND query = ?",
        )
        .bind(&params.account)
        .bind(&params.file_identifier)
        .bind(params.extension.as_deref())
        .bind(params.normalized_query())
        .fetch_optional(&*self.db)
        .await?;

        Ok(id)
    }

    async fn short_url_params(&self, short_url_id: &str) -> StoreResult<Option<ShortUrlParams>> {
        let row: Option<(String, String, Option<String>, String)> = sqlx::query_as(
            "SELECT account, identifier, extension, query FROM shorturl WHERE short_url_id = ?",
        )
        .bind(short_url_id)
        .fetch_optional(&*self.db)
        .await?;

        Ok(row.map(|(account, identifier, extension, query)| ShortUrlParams {
            account,
            file_identifier: identifier,
            extension,
            query: ShortUrlParams::parse_query(&query),
        }))
    }

    async fn delete_short_urls(&self, account: &str, identifier: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM shorturl WHERE account = ? AND identifier = ?")
            .bind(account)
            .bind(identifier)
            .execute(&*self.db)
            .await?;

        Ok(())
    }
}

/// Compile a metadata predicate into correlated EXISTS terms.
///
/// Supported shapes: `{"key": scalar}` for structural equality and
/// `{"key": {"$gt"|"$gte"|"$lt"|"$lte": number}}` for numeric ranges.
/// Everything else is refused.
fn push_predicate(
    builder: &mut QueryBuilder<'_, Sqlite>,
    predicate: &serde_json::Value,
) -> Result<(), StoreError> {
    let terms = predicate
        .as_object()
        .ok_or_else(|| StoreError::UnsupportedQuery("predicate must be an object".into()))?;

    for (name, expected) in terms {
        match expected {
            serde_json::Value::Object(ops) => {
                if ops.is_empty() {
                    return Err(StoreError::UnsupportedQuery(format!(
                        "empty operator set for `{name}`"
                    )));
                }

                builder.push(
                    " AND EXISTS (SELECT 1 FROM filemetadata
                       WHERE filemetadata.account = fileinfo.account
                       AND filemetadata.identifier = fileinfo.identifier
                       AND filemetadata.tag_name = ",
                );
                builder.push_bind(name.clone());

                for (op, bound) in ops {
                    let comparison = match op.as_str() {
                        "$gt" => " > ",
                        "$gte" => " >= ",
                        "$lt" => " < ",
                        "$lte" => " <= ",
                        other => {
                            return Err(StoreError::UnsupportedQuery(format!(
                                "unknown operator `{other}`"
                            )));
                        }
                    };
                    let bound = bound.as_f64().ok_or_else(|| {
                        StoreError::UnsupportedQuery(format!(
                            "range bound for `{name}` must be a number"
                        ))
                    })?;

                    builder.push(" AND CAST(filemetadata.tag_value AS REAL)");
                    builder.push(comparison);
                    builder.push_bind(bound);
                }

                builder.push(")");
            }
            serde_json::Value::Array(_) => {
                return Err(StoreError::UnsupportedQuery(format!(
                    "array match for `{name}` is not supported"
                )));
            }
            scalar => {
                builder.push(
                    " AND EXISTS (SELECT 1 FROM filemetadata
                       WHERE filemetadata.account = fileinfo.account
                       AND filemetadata.identifier = fileinfo.identifier
                       AND filemetadata.tag_name = ",
                );
                builder.push_bind(name.clone());
                builder.push(" AND filemetadata.tag_value = ");
                builder.push_bind(scalar.to_string());
                builder.push(")");
            }
        }
    }

    Ok(())
}
