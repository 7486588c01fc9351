//! Disposable Postgres databases for integration suites.
//!
//! Suites point `FILEGATE_TEST_DATABASE_URL` at a server they may create
//! databases on; each [`TestDatabase`] gets a fresh database that is dropped
//! with the handle.

use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, anyhow};
use postgres::NoTls;
use url::Url;

/// Environment variable naming the server used by integration suites.
pub const TEST_DATABASE_URL_ENV: &str = "FILEGATE_TEST_DATABASE_URL";

/// A database created for one test, dropped on `Drop`.
#[derive(Debug)]
pub struct TestDatabase {
    connection_string: String,
    admin_url: String,
    name: String,
}

impl TestDatabase {
    /// Connection string for `sqlx` or other Postgres clients.
    #[must_use]
    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }
}

impl Drop for TestDatabase {
    fn drop(&mut self) {
        let statement = format!("DROP DATABASE IF EXISTS \"{}\" WITH (FORCE)", self.name);
        let _ = run_admin(&self.admin_url, statement);
    }
}

/// Create a fresh database, or `Ok(None)` when no server is configured.
///
/// # Errors
///
/// Returns an error when the configured URL is invalid or the server refuses
/// `CREATE DATABASE`.
pub fn provision() -> Result<Option<TestDatabase>> {
    match std::env::var(TEST_DATABASE_URL_ENV) {
        Ok(url) if !url.trim().is_empty() => provision_from(url.trim()).map(Some),
        _ => Ok(None),
    }
}

fn provision_from(base_url: &str) -> Result<TestDatabase> {
    let base = Url::parse(base_url).context("invalid postgres connection url")?;
    let name = database_name();

    let mut admin = base.clone();
    admin.set_path("/postgres");
    let admin_url = admin.to_string();
    run_admin(&admin_url, format!("CREATE DATABASE \"{name}\""))?;

    let mut target = base;
    target.set_path(&format!("/{name}"));
    Ok(TestDatabase {
        connection_string: target.to_string(),
        admin_url,
        name,
    })
}

// The blocking client must not run on an async test runtime thread.
fn run_admin(admin_url: &str, statement: String) -> Result<()> {
    let admin_url = admin_url.to_string();
    std::thread::spawn(move || -> Result<()> {
        let mut client = postgres::Config::from_str(&admin_url)?.connect(NoTls)?;
        client
            .simple_query(&statement)
            .map(|_| ())
            .with_context(|| format!("failed to run `{statement}`"))
    })
    .join()
    .unwrap_or_else(|_| Err(anyhow!("postgres admin thread panicked")))
}

fn database_name() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("filegate_test_{}_{nanos}", std::process::id())
}
