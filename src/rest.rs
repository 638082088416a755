use axum::{
    extract::{Path, State},
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::db::{DbClient, DbKind, Filter, Record, SelectColumn};
use crate::error::DbError;
use crate::seed::{Account, ACCOUNTS_TABLE};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: DbClient,
}

impl AppState {
    pub fn new(db: DbClient) -> Self {
        Self { db }
    }
}

#[derive(Serialize)]
struct OkBody<T: Serialize> {
    status: &'static str,
    data: T,
}

#[derive(Serialize)]
struct ErrorBody {
    status: &'static str,
    message: String,
}

fn ok<T: Serialize>(data: T) -> Response {
    (
        StatusCode::OK,
        Json(OkBody {
            status: "ok",
            data,
        }),
    )
        .into_response()
}

fn err(code: StatusCode, message: &str) -> Response {
    (
        code,
        Json(ErrorBody {
            status: "error",
            message: message.to_string(),
        }),
    )
        .into_response()
}

/// Accounts belonging to one customer, plus the bare identifier list the
/// UI consumes.
#[derive(Serialize)]
pub struct AccountsData {
    pub account_ids: Vec<i64>,
    pub accounts: Vec<Account>,
}

#[derive(Serialize)]
pub struct TransactionSummary {
    pub transaction_count: i64,
    pub total_amount: f64,
}

// Account columns are listed explicitly so the DECIMAL balance reaches
// the client as a double; `SELECT *` would hand MySQL's DECIMAL type to
// the Any driver, which cannot decode it.
const ACCOUNT_COLUMNS: [SelectColumn<'static>; 4] = [
    SelectColumn::Plain("account_id"),
    SelectColumn::Plain("customer_id"),
    SelectColumn::Plain("account_type"),
    SelectColumn::Double("balance"),
];

/// Count and sum across a customer's accounts in one statement. The
/// coalesce keeps the sum at zero when no rows match, and the cast keeps
/// the DECIMAL sum decodable (see `ACCOUNT_COLUMNS`).
fn summary_sql(kind: DbKind) -> String {
    format!(
        "SELECT COUNT(*) AS transaction_count, \
         CAST(COALESCE(SUM(t.amount), 0) AS {}) AS total_amount \
         FROM Transactions t \
         INNER JOIN Accounts a ON t.account_id = a.account_id \
         WHERE a.customer_id = ?",
        kind.double_type()
    )
}

/// The path parameter must be integer-convertible; anything else is a
/// client error answered before any database access.
fn parse_customer_id(raw: &str) -> Result<i64, Response> {
    raw.trim().parse::<i64>().map_err(|_| {
        err(
            StatusCode::BAD_REQUEST,
            "customerId path parameter must be an integer",
        )
    })
}

fn account_from_record(record: &Record) -> Option<Account> {
    Some(Account {
        account_id: record.get_i64("account_id")?,
        customer_id: record.get_i64("customer_id")?,
        account_type: record.get_str("account_type")?.to_string(),
        balance: record.get_f64("balance")?,
    })
}

/// Handler for GET /customers/:customer_id/accounts
pub async fn get_customer_accounts(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
) -> Response {
    info!("GET /customers/{}/accounts", customer_id);
    let customer_id = match parse_customer_id(&customer_id) {
        Ok(id) => id,
        Err(response) => return response,
    };

    let rows = match state
        .db
        .select_rows(
            ACCOUNTS_TABLE,
            &ACCOUNT_COLUMNS,
            Some(&Filter::eq("customer_id", customer_id)),
        )
        .await
    {
        Ok(rows) => rows,
        Err(e) => {
            error!("Error querying accounts for customer {}: {}", customer_id, e);
            return err(StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong");
        }
    };

    let accounts: Option<Vec<Account>> = rows.iter().map(account_from_record).collect();
    match accounts {
        Some(accounts) => {
            let account_ids = accounts.iter().map(|a| a.account_id).collect();
            ok(AccountsData {
                account_ids,
                accounts,
            })
        }
        None => {
            error!("Malformed account row for customer {}", customer_id);
            err(StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong")
        }
    }
}

async fn fetch_summary(db: &DbClient, customer_id: i64) -> Result<TransactionSummary, DbError> {
    let sql = summary_sql(db.kind());
    let row = sqlx::query(&sql)
        .bind(customer_id)
        .fetch_one(db.pool())
        .await?;
    let record = Record::from_any_row(&row)?;
    Ok(TransactionSummary {
        transaction_count: record.get_i64("transaction_count").unwrap_or(0),
        total_amount: record.get_f64("total_amount").unwrap_or(0.0),
    })
}

/// Handler for GET /customers/:customer_id/transactions/summary
pub async fn get_transaction_summary(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
) -> Response {
    info!("GET /customers/{}/transactions/summary", customer_id);
    let customer_id = match parse_customer_id(&customer_id) {
        Ok(id) => id,
        Err(response) => return response,
    };

    match fetch_summary(&state.db, customer_id).await {
        Ok(summary) => ok(summary),
        Err(e) => {
            error!(
                "Error summarizing transactions for customer {}: {}",
                customer_id, e
            );
            err(StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong")
        }
    }
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Build the application router with a CORS policy fixed to the UI origin.
pub fn router(state: AppState, ui_origin: HeaderValue) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(ui_origin)
        .allow_methods([Method::GET])
        .allow_headers(Any);

    Router::new()
        .route("/customers/:customer_id/accounts", get(get_customer_accounts))
        .route(
            "/customers/:customer_id/transactions/summary",
            get(get_transaction_summary),
        )
        .route("/health", get(health))
        .layer(cors)
        .with_state(state)
}
