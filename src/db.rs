//! Connection-per-call access to the MySQL exam registry.
//!
//! Every tool invocation runs the same lifecycle: open a brand-new
//! connection, ensure the `exams` table exists, execute the caller's SQL
//! verbatim inside a transaction, commit, and close the connection on every
//! exit path. Nothing is pooled or shared between calls.
//!
//! Failures stop here. Connection errors are classified and logged,
//! execution errors are logged, and the caller only ever sees a boolean (or
//! no rows). See [`ExamStore`].

use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlDatabaseError, MySqlRow, MySqlSslMode};
use sqlx::{ConnectOptions, Connection};

/// Statement issued before every operation. Idempotent; MySQL commits DDL
/// implicitly.
const CREATE_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS exams (
    exam_id INT PRIMARY KEY AUTO_INCREMENT,
    patient_name VARCHAR(100) NOT NULL,
    age INT NOT NULL,
    result VARCHAR(100) NOT NULL
)";

/// MySQL error number for ER_ACCESS_DENIED_ERROR.
const ER_ACCESS_DENIED_ERROR: u16 = 1045;
/// MySQL error number for ER_BAD_DB_ERROR.
const ER_BAD_DB_ERROR: u16 = 1049;

/// Connection parameters for the exam database.
///
/// The defaults are fixed; the CLI may override individual fields. There is
/// no environment-variable fallback.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// MySQL server host.
    pub host: String,
    /// MySQL server port.
    pub port: u16,
    /// User name.
    pub user: String,
    /// Password.
    pub password: String,
    /// Database (schema) name.
    pub database: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.3".to_string(),
            port: 3306,
            user: "root".to_string(),
            password: "pass123".to_string(),
            database: "hbr_demo_db".to_string(),
        }
    }
}

impl DbConfig {
    fn connect_options(&self) -> MySqlConnectOptions {
        MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.database)
            .ssl_mode(MySqlSslMode::Disabled)
    }
}

/// Recognized kinds of connection-establishment failure.
#[derive(Debug, PartialEq, Eq)]
enum ConnectFailure {
    AccessDenied,
    UnknownDatabase,
    Other,
}

fn classify_error_number(number: Option<u16>) -> ConnectFailure {
    match number {
        Some(ER_ACCESS_DENIED_ERROR) => ConnectFailure::AccessDenied,
        Some(ER_BAD_DB_ERROR) => ConnectFailure::UnknownDatabase,
        _ => ConnectFailure::Other,
    }
}

fn classify_connect_error(err: &sqlx::Error) -> ConnectFailure {
    let number = err
        .as_database_error()
        .and_then(|e| e.try_downcast_ref::<MySqlDatabaseError>())
        .map(|e| e.number());
    classify_error_number(number)
}

/// Open a fresh connection and ensure the exam table exists.
///
/// Returns `None` after logging a diagnostic when the connection cannot be
/// established (access denied and unknown database get dedicated messages)
/// or when the schema statement fails.
async fn init_db(config: &DbConfig) -> Option<MySqlConnection> {
    let mut conn = match config.connect_options().connect().await {
        Ok(conn) => conn,
        Err(err) => {
            match classify_connect_error(&err) {
                ConnectFailure::AccessDenied => {
                    tracing::error!("access denied: user or password is incorrect");
                }
                ConnectFailure::UnknownDatabase => {
                    tracing::error!("database '{}' does not exist", config.database);
                }
                ConnectFailure::Other => {
                    tracing::error!("{}", err);
                }
            }
            return None;
        }
    };

    if let Err(err) = sqlx::query(CREATE_TABLE_SQL).execute(&mut conn).await {
        tracing::error!("failed to ensure exam table exists: {}", err);
        close_connection(conn).await;
        return None;
    }

    Some(conn)
}

/// Close gracefully; a close failure is logged and otherwise ignored since
/// the call already has its outcome.
async fn close_connection(conn: MySqlConnection) {
    if let Err(err) = conn.close().await {
        tracing::warn!("error while closing connection: {}", err);
    }
}

/// Handle to the exam registry.
///
/// Holds connection parameters only, never a live connection. Each method
/// performs the full acquire/execute/commit/release cycle and swallows
/// database errors into its return value, so callers cannot distinguish bad
/// SQL from an unreachable server.
pub struct ExamStore {
    config: DbConfig,
}

impl ExamStore {
    /// Create a store for the given connection parameters.
    pub fn new(config: DbConfig) -> Self {
        Self { config }
    }

    /// Run a caller-supplied statement verbatim and commit.
    ///
    /// This is the raw passthrough boundary: `sql` reaches the server
    /// exactly as received, as one prepared statement with nothing bound
    /// and nothing validated. Returns `true` only when the statement
    /// executed and committed.
    pub async fn execute_statement(&self, sql: &str) -> bool {
        let Some(mut conn) = init_db(&self.config).await else {
            return false;
        };
        let result = execute_and_commit(&mut conn, sql).await;
        close_connection(conn).await;

        match result {
            Ok(done) => {
                tracing::debug!(rows = done.rows_affected(), "statement committed");
                true
            }
            Err(err) => {
                tracing::error!("failed to execute statement: {}", err);
                false
            }
        }
    }

    /// Run a caller-supplied query verbatim, commit, and return the rows.
    ///
    /// Same passthrough boundary as [`ExamStore::execute_statement`].
    /// Returns `None` when the query cannot be executed.
    pub async fn fetch_rows(&self, sql: &str) -> Option<Vec<MySqlRow>> {
        let Some(mut conn) = init_db(&self.config).await else {
            return None;
        };
        let result = fetch_and_commit(&mut conn, sql).await;
        close_connection(conn).await;

        match result {
            Ok(rows) => {
                tracing::debug!(rows = rows.len(), "query committed");
                Some(rows)
            }
            Err(err) => {
                tracing::error!("failed to run query: {}", err);
                None
            }
        }
    }
}

/// Execute inside an explicit transaction. An error before `commit` drops
/// the transaction, which rolls back, so no partial commit reaches the
/// table.
async fn execute_and_commit(
    conn: &mut MySqlConnection,
    sql: &str,
) -> sqlx::Result<sqlx::mysql::MySqlQueryResult> {
    let mut tx = conn.begin().await?;
    let done = sqlx::query(sql).execute(&mut *tx).await?;
    tx.commit().await?;
    Ok(done)
}

/// Fetch inside an explicit transaction; the commit is a no-op for reads
/// but is performed unconditionally.
async fn fetch_and_commit(conn: &mut MySqlConnection, sql: &str) -> sqlx::Result<Vec<MySqlRow>> {
    let mut tx = conn.begin().await?;
    let rows = sqlx::query(sql).fetch_all(&mut *tx).await?;
    tx.commit().await?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = DbConfig::default();
        assert_eq!(cfg.host, "127.0.0.3");
        assert_eq!(cfg.port, 3306);
        assert_eq!(cfg.user, "root");
        assert_eq!(cfg.database, "hbr_demo_db");
    }

    #[test]
    fn test_connect_error_classification() {
        assert_eq!(
            classify_error_number(Some(1045)),
            ConnectFailure::AccessDenied
        );
        assert_eq!(
            classify_error_number(Some(1049)),
            ConnectFailure::UnknownDatabase
        );
        assert_eq!(classify_error_number(Some(2002)), ConnectFailure::Other);
        assert_eq!(classify_error_number(None), ConnectFailure::Other);
    }

    #[test]
    fn test_schema_statement_is_idempotent_create() {
        assert!(CREATE_TABLE_SQL.starts_with("CREATE TABLE IF NOT EXISTS exams"));
        for column in ["exam_id", "patient_name", "age", "result"] {
            assert!(CREATE_TABLE_SQL.contains(column), "missing {}", column);
        }
        assert!(CREATE_TABLE_SQL.contains("AUTO_INCREMENT"));
    }
}
