use std::path::Path;

use anyhow::Result;
use sqlx::{migrate::MigrateDatabase, Executor, Pool, Sqlite, SqlitePool};
use tracing::debug;

pub mod match_store;

pub use match_store::{CategoryMapRecord, ForcedMatchRecord, ProgramMatchRecord};

/// Connection to the persistent match store. The schema lives in an opaque
/// DDL script executed verbatim on open; every table uses `CREATE TABLE IF
/// NOT EXISTS`, so reopening an existing store is harmless.
#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    pub async fn new(database_file: &Path, create_schema_file: &Path) -> Result<Self> {
        let url = format!("sqlite://{}", database_file.display());

        if !Sqlite::database_exists(&url).await? {
            Sqlite::create_database(&url).await?;
        }

        let pool = SqlitePool::connect(&url).await?;
        debug!("Opened connection to match store at {}", database_file.display());

        let schema = std::fs::read_to_string(create_schema_file)?;
        pool.execute(schema.as_str()).await?;

        Ok(Self { pool })
    }

    /// In-memory store for tests.
    pub async fn open_in_memory(schema: &str) -> Result<Self> {
        let pool = SqlitePool::connect("sqlite::memory:").await?;
        pool.execute(schema).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
