//! SQLite-backed key-resolution store.
//!
//! Holds per-guild publishing-channel bindings and the two-tier source keys
//! (user override over guild default) consumed at publish time.

pub mod error;
pub mod store;

pub use {
    error::{Error, Result},
    store::SqliteStore,
};

/// Run database migrations for the store.
///
/// Creates the publishing-channel and source-key tables. Call at application
/// startup when constructing the store from a shared pool.
pub async fn run_migrations(pool: &sqlx::SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .set_ignore_missing(true)
        .run(pool)
        .await?;
    Ok(())
}
