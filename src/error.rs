/// Errors from the database access layer.
///
/// Every `DbClient` operation returns one of these instead of logging and
/// handing back an empty result, so callers can distinguish "no rows" from
/// "the operation failed".
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("failed to connect to database: {0}")]
    Connect(#[source] sqlx::Error),
    #[error("query failed: {0}")]
    Query(#[from] sqlx::Error),
    #[error("invalid SQL identifier: {0:?}")]
    InvalidIdentifier(String),
    #[error("unsupported database URL scheme: {0:?}")]
    UnsupportedScheme(String),
    #[error("insert requires at least one column")]
    EmptyInsert,
}

/// Errors from the seeding path.
#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("cannot reach database host {host}:{port}: {cause}")]
    Unreachable {
        host: String,
        port: u16,
        cause: String,
    },
    #[error("seed data validation failed: {0}")]
    Validation(String),
    #[error("failed to load seed data: {0}")]
    Load(String),
    #[error(transparent)]
    Db(#[from] DbError),
}
