use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tracing::{info, warn};

use crate::config::Settings;
use crate::db::{DbClient, SqlValue};
use crate::error::SeedError;

pub const CUSTOMERS_TABLE: &str = "Customers";
pub const ACCOUNTS_TABLE: &str = "Accounts";
pub const TRANSACTIONS_TABLE: &str = "Transactions";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub customer_id: i64,
    pub name: String,
    pub email: String,
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub account_id: i64,
    pub customer_id: i64,
    pub account_type: String,
    pub balance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: i64,
    pub account_id: i64,
    /// Signed amount: negative is a debit, positive a credit.
    pub amount: f64,
    pub description: String,
}

/// A seedable dataset. Injectable from JSON so deployments are not tied to
/// the built-in demo rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedData {
    pub customers: Vec<Customer>,
    pub accounts: Vec<Account>,
    pub transactions: Vec<Transaction>,
}

impl SeedData {
    /// The fixed demo dataset: 3 customers, 4 accounts, 5 transactions.
    pub fn builtin() -> Self {
        let customer = |customer_id, name: &str, email: &str, phone: &str| Customer {
            customer_id,
            name: name.to_string(),
            email: email.to_string(),
            phone: phone.to_string(),
        };
        let account = |account_id, customer_id, account_type: &str, balance| Account {
            account_id,
            customer_id,
            account_type: account_type.to_string(),
            balance,
        };
        let tx = |transaction_id, account_id, amount, description: &str| Transaction {
            transaction_id,
            account_id,
            amount,
            description: description.to_string(),
        };

        Self {
            customers: vec![
                customer(1, "Alice Smith", "alice@example.com", "123-456-7890"),
                customer(2, "Bob Johnson", "bob@example.com", "234-567-8901"),
                customer(3, "Charlie Lee", "charlie@example.com", "345-678-9012"),
            ],
            accounts: vec![
                account(101, 1, "savings", 1200.50),
                account(102, 1, "checking", 500.00),
                account(103, 2, "savings", 750.75),
                account(104, 3, "checking", 300.25),
            ],
            transactions: vec![
                tx(1001, 101, -100.00, "ATM Withdrawal"),
                tx(1002, 101, 250.00, "Salary Deposit"),
                tx(1003, 102, -50.00, "Grocery Store"),
                tx(1004, 103, -200.00, "Online Purchase"),
                tx(1005, 104, 150.00, "Check Deposit"),
            ],
        }
    }

    pub fn from_json_file(path: &Path) -> Result<Self, SeedError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| SeedError::Load(format!("{}: {e}", path.display())))?;
        let data: SeedData =
            serde_json::from_str(&raw).map_err(|e| SeedError::Load(e.to_string()))?;
        data.validate()?;
        Ok(data)
    }

    /// Referential-integrity and key-uniqueness check, applied before any
    /// database work. The schema alone cannot guarantee this everywhere
    /// (SQLite leaves foreign keys off by default).
    pub fn validate(&self) -> Result<(), SeedError> {
        let mut customer_ids = HashSet::new();
        for c in &self.customers {
            if !customer_ids.insert(c.customer_id) {
                return Err(SeedError::Validation(format!(
                    "duplicate customer_id {}",
                    c.customer_id
                )));
            }
        }

        let mut account_ids = HashSet::new();
        for a in &self.accounts {
            if !account_ids.insert(a.account_id) {
                return Err(SeedError::Validation(format!(
                    "duplicate account_id {}",
                    a.account_id
                )));
            }
            if !customer_ids.contains(&a.customer_id) {
                return Err(SeedError::Validation(format!(
                    "account {} references unknown customer {}",
                    a.account_id, a.customer_id
                )));
            }
        }

        let mut transaction_ids = HashSet::new();
        for t in &self.transactions {
            if !transaction_ids.insert(t.transaction_id) {
                return Err(SeedError::Validation(format!(
                    "duplicate transaction_id {}",
                    t.transaction_id
                )));
            }
            if !account_ids.contains(&t.account_id) {
                return Err(SeedError::Validation(format!(
                    "transaction {} references unknown account {}",
                    t.transaction_id, t.account_id
                )));
            }
        }

        Ok(())
    }

    fn len(&self) -> usize {
        self.customers.len() + self.accounts.len() + self.transactions.len()
    }
}

/// Outcome of a seeding run. `skipped` counts rows rejected by the
/// database, typically primary-key conflicts on a re-run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedReport {
    pub inserted: usize,
    pub skipped: usize,
}

/// Check that the database host accepts TCP connections before touching
/// schema or data. Bounded by `timeout`.
pub async fn probe(host: &str, port: u16, timeout: Duration) -> Result<(), SeedError> {
    let unreachable = |cause: String| SeedError::Unreachable {
        host: host.to_string(),
        port,
        cause,
    };
    match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => Err(unreachable(e.to_string())),
        Err(_) => Err(unreachable(format!("timed out after {timeout:?}"))),
    }
}

/// Full seeding entry point: validate, probe, connect, create tables,
/// insert rows. An unreachable host aborts before any mutation.
pub async fn run(settings: &Settings, data: &SeedData) -> Result<SeedReport, SeedError> {
    data.validate()?;

    if let Some((host, port)) = settings.probe_target() {
        probe(&host, port, settings.probe_timeout).await?;
    }

    let client = DbClient::connect(&settings.database_url).await?;
    let report = seed_into(&client, data).await;
    client.close().await;
    report
}

/// Create the three tables (conditionally) and insert the dataset in
/// dependency order. Per-row failures are logged and counted; the loop
/// continues, so re-seeding leaves already-present rows untouched.
pub async fn seed_into(client: &DbClient, data: &SeedData) -> Result<SeedReport, SeedError> {
    data.validate()?;

    client
        .create_table(
            CUSTOMERS_TABLE,
            &[
                ("customer_id", "INT PRIMARY KEY"),
                ("name", "VARCHAR(100)"),
                ("email", "VARCHAR(100)"),
                ("phone", "VARCHAR(20)"),
            ],
        )
        .await?;
    client
        .create_table(
            ACCOUNTS_TABLE,
            &[
                ("account_id", "INT PRIMARY KEY"),
                ("customer_id", "INT REFERENCES Customers(customer_id)"),
                ("account_type", "VARCHAR(50)"),
                ("balance", "DECIMAL(15, 2)"),
            ],
        )
        .await?;
    client
        .create_table(
            TRANSACTIONS_TABLE,
            &[
                ("transaction_id", "INT PRIMARY KEY"),
                ("account_id", "INT REFERENCES Accounts(account_id)"),
                ("amount", "DECIMAL(15, 2)"),
                ("description", "VARCHAR(255)"),
            ],
        )
        .await?;

    let mut report = SeedReport {
        inserted: 0,
        skipped: 0,
    };

    for c in &data.customers {
        let row = [
            ("customer_id", SqlValue::Int(c.customer_id)),
            ("name", SqlValue::from(c.name.as_str())),
            ("email", SqlValue::from(c.email.as_str())),
            ("phone", SqlValue::from(c.phone.as_str())),
        ];
        insert_counted(client, CUSTOMERS_TABLE, &row, &mut report).await;
    }
    for a in &data.accounts {
        let row = [
            ("account_id", SqlValue::Int(a.account_id)),
            ("customer_id", SqlValue::Int(a.customer_id)),
            ("account_type", SqlValue::from(a.account_type.as_str())),
            ("balance", SqlValue::Float(a.balance)),
        ];
        insert_counted(client, ACCOUNTS_TABLE, &row, &mut report).await;
    }
    for t in &data.transactions {
        let row = [
            ("transaction_id", SqlValue::Int(t.transaction_id)),
            ("account_id", SqlValue::Int(t.account_id)),
            ("amount", SqlValue::Float(t.amount)),
            ("description", SqlValue::from(t.description.as_str())),
        ];
        insert_counted(client, TRANSACTIONS_TABLE, &row, &mut report).await;
    }

    info!(
        "seeding finished: {} of {} rows inserted, {} skipped",
        report.inserted,
        data.len(),
        report.skipped
    );
    Ok(report)
}

async fn insert_counted(
    client: &DbClient,
    table: &str,
    row: &[(&str, SqlValue)],
    report: &mut SeedReport,
) {
    match client.insert_row(table, row).await {
        Ok(()) => report.inserted += 1,
        Err(e) => {
            warn!("insert into {} skipped: {}", table, e);
            report.skipped += 1;
        }
    }
}
