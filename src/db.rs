use std::sync::Once;

use sqlx::any::AnyRow;
use sqlx::migrate::MigrateDatabase;
use sqlx::{AnyPool, Column, Row, Sqlite};
use tracing::info;

use crate::error::DbError;

static DRIVERS: Once = Once::new();

/// Which backend a `DbClient` is talking to, derived from the URL scheme.
/// Needed only where SQL diverges between the two (table listing).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbKind {
    Sqlite,
    MySql,
}

impl DbKind {
    /// Name of the backend's double-precision type, for casts.
    pub fn double_type(self) -> &'static str {
        match self {
            DbKind::Sqlite => "REAL",
            DbKind::MySql => "DOUBLE",
        }
    }

    fn from_url(url: &str) -> Result<Self, DbError> {
        if url.starts_with("sqlite:") {
            Ok(DbKind::Sqlite)
        } else if url.starts_with("mysql:") {
            Ok(DbKind::MySql)
        } else {
            Err(DbError::UnsupportedScheme(url.to_string()))
        }
    }
}

/// A value bound into a parameterized statement, or decoded from a row.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Int(i64),
    Float(f64),
    Text(String),
    Null,
}

impl SqlValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric accessor that tolerates integer-affinity storage: SQLite keeps
    /// a round DECIMAL value (e.g. 500.00) as an integer.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SqlValue::Int(v) => Some(*v as f64),
            SqlValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

/// One decoded row: column name to value, in select order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record(Vec<(String, SqlValue)>);

impl Record {
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.0
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn get_i64(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(SqlValue::as_i64)
    }

    pub fn get_f64(&self, column: &str) -> Option<f64> {
        self.get(column).and_then(SqlValue::as_f64)
    }

    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(SqlValue::as_str)
    }

    /// Decode an `AnyRow` column by column, trying integer, float, then text.
    pub fn from_any_row(row: &AnyRow) -> Result<Self, DbError> {
        let mut fields = Vec::with_capacity(row.columns().len());
        for (i, column) in row.columns().iter().enumerate() {
            let value = if let Ok(v) = row.try_get::<Option<i64>, _>(i) {
                v.map_or(SqlValue::Null, SqlValue::Int)
            } else if let Ok(v) = row.try_get::<Option<f64>, _>(i) {
                v.map_or(SqlValue::Null, SqlValue::Float)
            } else {
                row.try_get::<Option<String>, _>(i)?
                    .map_or(SqlValue::Null, SqlValue::Text)
            };
            fields.push((column.name().to_string(), value));
        }
        Ok(Record(fields))
    }
}

/// Comparison operator for a structured predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cmp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Cmp {
    fn as_sql(self) -> &'static str {
        match self {
            Cmp::Eq => "=",
            Cmp::Ne => "<>",
            Cmp::Lt => "<",
            Cmp::Le => "<=",
            Cmp::Gt => ">",
            Cmp::Ge => ">=",
        }
    }
}

/// A single-column predicate whose value is always bound as a parameter.
/// Raw `WHERE` strings are deliberately not accepted anywhere.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    column: String,
    cmp: Cmp,
    value: SqlValue,
}

impl Filter {
    pub fn new(column: impl Into<String>, cmp: Cmp, value: impl Into<SqlValue>) -> Self {
        Self {
            column: column.into(),
            cmp,
            value: value.into(),
        }
    }

    pub fn eq(column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Self::new(column, Cmp::Eq, value)
    }
}

/// A projected column. `Double` renders as a cast to the backend's
/// double-precision type: MySQL reports DECIMAL columns as a type the Any
/// driver cannot decode, so fixed-precision values must leave the server
/// as doubles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectColumn<'a> {
    Plain(&'a str),
    Double(&'a str),
}

impl<'a> SelectColumn<'a> {
    fn name(self) -> &'a str {
        match self {
            SelectColumn::Plain(name) | SelectColumn::Double(name) => name,
        }
    }

    fn render(self, kind: DbKind) -> String {
        match self {
            SelectColumn::Plain(name) => name.to_string(),
            SelectColumn::Double(name) => {
                format!("CAST({name} AS {}) AS {name}", kind.double_type())
            }
        }
    }
}

fn valid_ident(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn check_ident(name: &str) -> Result<(), DbError> {
    if valid_ident(name) {
        Ok(())
    } else {
        Err(DbError::InvalidIdentifier(name.to_string()))
    }
}

fn bind<'q>(
    query: sqlx::query::Query<'q, sqlx::Any, sqlx::any::AnyArguments<'q>>,
    value: &SqlValue,
) -> sqlx::query::Query<'q, sqlx::Any, sqlx::any::AnyArguments<'q>> {
    match value {
        SqlValue::Int(v) => query.bind(*v),
        SqlValue::Float(v) => query.bind(*v),
        SqlValue::Text(v) => query.bind(v.clone()),
        SqlValue::Null => query.bind(None::<i64>),
    }
}

/// DbClient provides connection-scoped access to the relational store.
#[derive(Clone)]
pub struct DbClient {
    pool: AnyPool,
    kind: DbKind,
}

impl DbClient {
    /// Connect one pool against a `sqlite:` or `mysql:` database URL.
    /// A missing SQLite database file is created first, so a fresh
    /// deployment can seed into an empty file.
    pub async fn connect(url: &str) -> Result<Self, DbError> {
        DRIVERS.call_once(sqlx::any::install_default_drivers);
        let kind = DbKind::from_url(url)?;

        if kind == DbKind::Sqlite && !Sqlite::database_exists(url).await.unwrap_or(false) {
            Sqlite::create_database(url).await.map_err(DbError::Connect)?;
        }

        let pool = AnyPool::connect(url).await.map_err(DbError::Connect)?;
        Ok(Self { pool, kind })
    }

    /// Connect to a fresh shared-cache in-memory database with a unique
    /// name, so tests never observe each other's rows.
    #[cfg(test)]
    pub(crate) async fn connect_test() -> Self {
        let test_id = uuid::Uuid::new_v4().to_string();
        let url = format!("sqlite:file:memdb_{}?mode=memory&cache=shared", test_id);
        Self::connect(&url)
            .await
            .expect("Failed to create test database")
    }

    /// The underlying pool, for statements this client does not model
    /// (e.g. aggregate joins).
    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub fn kind(&self) -> DbKind {
        self.kind
    }

    /// Conditional create; succeeds when the table already exists.
    /// `columns` pairs a column name with its type-and-constraint SQL.
    pub async fn create_table(
        &self,
        table: &str,
        columns: &[(&str, &str)],
    ) -> Result<(), DbError> {
        check_ident(table)?;
        for (name, _) in columns {
            check_ident(name)?;
        }
        let defs = columns
            .iter()
            .map(|(name, def)| format!("{name} {def}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("CREATE TABLE IF NOT EXISTS {table} ({defs})");
        sqlx::query(&sql).execute(&self.pool).await?;
        info!("table {} checked/created", table);
        Ok(())
    }

    /// Conditional drop; succeeds when the table does not exist.
    pub async fn drop_table(&self, table: &str) -> Result<(), DbError> {
        check_ident(table)?;
        let sql = format!("DROP TABLE IF EXISTS {table}");
        sqlx::query(&sql).execute(&self.pool).await?;
        info!("table {} dropped if it existed", table);
        Ok(())
    }

    /// Single parameterized insert. Values are bound positionally, never
    /// interpolated into the statement text.
    pub async fn insert_row(
        &self,
        table: &str,
        record: &[(&str, SqlValue)],
    ) -> Result<(), DbError> {
        check_ident(table)?;
        if record.is_empty() {
            return Err(DbError::EmptyInsert);
        }
        for (name, _) in record {
            check_ident(name)?;
        }
        let columns = record
            .iter()
            .map(|(name, _)| *name)
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = vec!["?"; record.len()].join(", ");
        let sql = format!("INSERT INTO {table} ({columns}) VALUES ({placeholders})");

        let mut query = sqlx::query(&sql);
        for (_, value) in record {
            query = bind(query, value);
        }
        query.execute(&self.pool).await?;
        Ok(())
    }

    /// All table names in the current database.
    pub async fn list_tables(&self) -> Result<Vec<String>, DbError> {
        let sql = match self.kind {
            DbKind::Sqlite => {
                "SELECT name FROM sqlite_master \
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name"
            }
            DbKind::MySql => {
                "SELECT table_name AS name FROM information_schema.tables \
                 WHERE table_schema = DATABASE() ORDER BY table_name"
            }
        };
        let rows = sqlx::query(sql).fetch_all(&self.pool).await?;
        let mut tables = Vec::with_capacity(rows.len());
        for row in &rows {
            tables.push(row.try_get::<String, _>(0)?);
        }
        Ok(tables)
    }

    /// SELECT with an optional structured predicate. An empty `columns`
    /// slice selects `*`; tables with DECIMAL columns must list them
    /// explicitly as [`SelectColumn::Double`], since `*` hands the raw
    /// column type to the Any driver.
    pub async fn select_rows(
        &self,
        table: &str,
        columns: &[SelectColumn<'_>],
        filter: Option<&Filter>,
    ) -> Result<Vec<Record>, DbError> {
        check_ident(table)?;
        for column in columns {
            check_ident(column.name())?;
        }
        let projection = if columns.is_empty() {
            "*".to_string()
        } else {
            columns
                .iter()
                .map(|c| c.render(self.kind))
                .collect::<Vec<_>>()
                .join(", ")
        };
        let mut sql = format!("SELECT {projection} FROM {table}");
        if let Some(f) = filter {
            check_ident(&f.column)?;
            sql.push_str(&format!(" WHERE {} {} ?", f.column, f.cmp.as_sql()));
        }

        let mut query = sqlx::query(&sql);
        if let Some(f) = filter {
            query = bind(query, &f.value);
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(Record::from_any_row).collect()
    }

    /// Close the pool. Safe to call when already closed.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Each test gets its own shared-cache in-memory database.
    async fn setup_test() -> DbClient {
        DbClient::connect_test().await
    }

    async fn create_pets(db: &DbClient) {
        db.create_table(
            "pets",
            &[
                ("pet_id", "INT PRIMARY KEY"),
                ("name", "VARCHAR(50)"),
                ("weight", "DECIMAL(15, 2)"),
            ],
        )
        .await
        .expect("Failed to create table");
    }

    #[tokio::test]
    async fn test_create_table_is_idempotent() {
        let db = setup_test().await;
        create_pets(&db).await;
        // Re-running the conditional create must succeed.
        create_pets(&db).await;

        let tables = db.list_tables().await.expect("Failed to list tables");
        assert_eq!(tables, vec!["pets".to_string()]);
    }

    #[tokio::test]
    async fn test_insert_and_select_with_filter() {
        let db = setup_test().await;
        create_pets(&db).await;

        db.insert_row(
            "pets",
            &[
                ("pet_id", SqlValue::Int(1)),
                ("name", SqlValue::from("Rex")),
                ("weight", SqlValue::Float(12.5)),
            ],
        )
        .await
        .expect("Failed to insert");
        db.insert_row(
            "pets",
            &[
                ("pet_id", SqlValue::Int(2)),
                ("name", SqlValue::from("Whiskers")),
                ("weight", SqlValue::Float(4.2)),
            ],
        )
        .await
        .expect("Failed to insert");

        let rows = db
            .select_rows("pets", &[], Some(&Filter::eq("pet_id", 1_i64)))
            .await
            .expect("Failed to select");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_i64("pet_id"), Some(1));
        assert_eq!(rows[0].get_str("name"), Some("Rex"));
        assert_eq!(rows[0].get_f64("weight"), Some(12.5));

        let all = db
            .select_rows("pets", &[SelectColumn::Plain("pet_id")], None)
            .await
            .expect("Failed to select");
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_double_projection_keeps_decimal_columns_float() {
        let db = setup_test().await;
        create_pets(&db).await;

        // SQLite's numeric affinity stores a round DECIMAL value as an
        // integer; a cast projection must bring it back as a float, the
        // same shape MySQL requires to get DECIMAL past the Any driver.
        db.insert_row(
            "pets",
            &[
                ("pet_id", SqlValue::Int(1)),
                ("name", SqlValue::from("Rex")),
                ("weight", SqlValue::Float(4.0)),
            ],
        )
        .await
        .expect("Failed to insert");

        let plain = db
            .select_rows("pets", &[SelectColumn::Plain("weight")], None)
            .await
            .expect("Failed to select");
        assert_eq!(plain[0].get("weight"), Some(&SqlValue::Int(4)));

        let cast = db
            .select_rows("pets", &[SelectColumn::Double("weight")], None)
            .await
            .expect("Failed to select");
        assert_eq!(cast[0].get("weight"), Some(&SqlValue::Float(4.0)));

        // The cast projection is still identifier-checked.
        let err = db
            .select_rows("pets", &[SelectColumn::Double("weight) --")], None)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidIdentifier(_)));
    }

    #[tokio::test]
    async fn test_duplicate_primary_key_is_an_error() {
        let db = setup_test().await;
        create_pets(&db).await;

        let row = [
            ("pet_id", SqlValue::Int(1)),
            ("name", SqlValue::from("Rex")),
            ("weight", SqlValue::Float(12.5)),
        ];
        db.insert_row("pets", &row).await.expect("Failed to insert");

        let duplicate = db.insert_row("pets", &row).await;
        assert!(matches!(duplicate, Err(DbError::Query(_))));

        // Exactly one copy remains.
        let rows = db
            .select_rows("pets", &[], Some(&Filter::eq("pet_id", 1_i64)))
            .await
            .expect("Failed to select");
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn test_select_empty_table_returns_no_rows() {
        let db = setup_test().await;
        create_pets(&db).await;

        let rows = db
            .select_rows("pets", &[], None)
            .await
            .expect("Failed to select");
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_drop_table() {
        let db = setup_test().await;
        create_pets(&db).await;

        db.drop_table("pets").await.expect("Failed to drop");
        assert!(db.list_tables().await.expect("Failed to list").is_empty());

        // Dropping again is fine.
        db.drop_table("pets").await.expect("Failed to re-drop");
    }

    #[tokio::test]
    async fn test_identifiers_are_validated() {
        let db = setup_test().await;
        create_pets(&db).await;

        let err = db
            .select_rows("pets; DROP TABLE pets", &[], None)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidIdentifier(_)));

        let err = db
            .select_rows(
                "pets",
                &[SelectColumn::Plain("name, weight FROM sqlite_master --")],
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidIdentifier(_)));

        let err = db
            .insert_row("pets", &[("name = 'x' --", SqlValue::Int(1))])
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidIdentifier(_)));
    }

    #[tokio::test]
    async fn test_filter_value_is_bound_not_interpolated() {
        let db = setup_test().await;
        create_pets(&db).await;
        db.insert_row(
            "pets",
            &[
                ("pet_id", SqlValue::Int(1)),
                ("name", SqlValue::from("Rex")),
                ("weight", SqlValue::Float(12.5)),
            ],
        )
        .await
        .expect("Failed to insert");

        // A hostile value matches nothing instead of altering the query.
        let rows = db
            .select_rows(
                "pets",
                &[],
                Some(&Filter::eq("name", "' OR '1'='1")),
            )
            .await
            .expect("Failed to select");
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_insert_requires_columns() {
        let db = setup_test().await;
        create_pets(&db).await;

        let err = db.insert_row("pets", &[]).await.unwrap_err();
        assert!(matches!(err, DbError::EmptyInsert));
    }

    #[tokio::test]
    async fn test_close_is_safe_to_repeat() {
        let db = setup_test().await;
        db.close().await;
        db.close().await;

        // Operations after close fail loudly rather than silently.
        let err = db.list_tables().await;
        assert!(err.is_err());
    }
}
