//! SQL smoke checks against a running cluster
//!
//! Connections are opened through [`SqlConnector`] so the checks can run
//! against a fake in unit tests. [`PostgresConnector`] speaks the wire
//! protocol with `tokio-postgres` and only supports insecure clusters;
//! secure clusters need a connector that loads the client certificates.

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_postgres::{NoTls, SimpleQueryMessage};
use tracing::{debug, info, warn};

use crdb_common::crd::CrdbCluster;
use crdb_common::naming::member_address;
use crdb_common::Error;

/// User the checks connect as
pub const ROOT_USER: &str = "root";
/// Database every cluster has
pub const SYSTEM_DATABASE: &str = "system";

const SMOKE_DATABASE: &str = "test_db";
const EXPECTED_ACCOUNTS: u64 = 2;

/// Where and how to connect
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionSpec {
    /// Member DNS name
    pub host: String,
    /// SQL port
    pub port: u16,
    /// SQL user
    pub user: String,
    /// Initial database
    pub database: String,
    /// Whether the server requires TLS
    pub tls: bool,
}

impl ConnectionSpec {
    /// Connect to member 0 of `cluster` as root
    pub fn for_cluster(cluster: &CrdbCluster, namespace: &str) -> Result<Self, Error> {
        let port = cluster.spec.sql_port();
        let port = u16::try_from(port)
            .map_err(|_| Error::config(format!("SQL port {port} is out of range")))?;
        Ok(Self {
            host: member_address(&cluster.stateful_set_name(), 0, namespace),
            port,
            user: ROOT_USER.to_string(),
            database: SYSTEM_DATABASE.to_string(),
            tls: cluster.spec.tls_enabled,
        })
    }
}

/// Rows returned by a query, every value in text form
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RowSet {
    columns: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

impl RowSet {
    /// Build a row set; every row must have one value per column
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Self {
        Self { columns, rows }
    }

    /// Column names in result order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the query returned no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Value at `row` in the named column; `None` for NULL or unknown names
    pub fn get(&self, row: usize, column: &str) -> Option<&str> {
        let index = self.columns.iter().position(|c| c == column)?;
        self.rows.get(row)?.get(index)?.as_deref()
    }

    /// First value of the first row
    pub fn scalar(&self) -> Option<&str> {
        self.rows.first()?.first()?.as_deref()
    }
}

/// An open SQL session
#[async_trait]
pub trait SqlConnection: Send {
    /// Run a statement that returns no rows
    async fn execute(&mut self, statement: &str) -> Result<(), Error>;

    /// Run a query and collect its rows
    async fn query(&mut self, statement: &str) -> Result<RowSet, Error>;

    /// End the session
    fn close(self: Box<Self>);
}

/// Opens SQL sessions
#[async_trait]
pub trait SqlConnector: Send + Sync {
    /// Open a session described by `spec`
    async fn connect(&self, spec: &ConnectionSpec) -> Result<Box<dyn SqlConnection>, Error>;
}

/// [`SqlConnector`] over plaintext `tokio-postgres` connections
#[derive(Clone, Copy, Debug, Default)]
pub struct PostgresConnector;

#[async_trait]
impl SqlConnector for PostgresConnector {
    async fn connect(&self, spec: &ConnectionSpec) -> Result<Box<dyn SqlConnection>, Error> {
        if spec.tls {
            return Err(Error::config(format!(
                "{}: TLS connections are not supported by the plaintext connector",
                spec.host
            )));
        }

        let conn_str = format!(
            "host={} port={} user={} dbname={}",
            spec.host, spec.port, spec.user, spec.database
        );
        debug!(host = %spec.host, port = spec.port, database = %spec.database, "Connecting");

        let (client, connection) = tokio_postgres::connect(&conn_str, NoTls)
            .await
            .map_err(|e| Error::database(format!("connecting to {}:{}: {e}", spec.host, spec.port)))?;

        let driver = tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!(error = %e, "SQL connection error");
            }
        });

        Ok(Box::new(PostgresConnection { client, driver }))
    }
}

struct PostgresConnection {
    client: tokio_postgres::Client,
    driver: JoinHandle<()>,
}

#[async_trait]
impl SqlConnection for PostgresConnection {
    async fn execute(&mut self, statement: &str) -> Result<(), Error> {
        self.client
            .batch_execute(statement)
            .await
            .map_err(|e| Error::database(format!("{statement}: {e}")))
    }

    async fn query(&mut self, statement: &str) -> Result<RowSet, Error> {
        let messages = self
            .client
            .simple_query(statement)
            .await
            .map_err(|e| Error::database(format!("{statement}: {e}")))?;

        let mut columns = Vec::new();
        let mut rows = Vec::new();
        for message in messages {
            if let SimpleQueryMessage::Row(row) = message {
                if columns.is_empty() {
                    columns = row.columns().iter().map(|c| c.name().to_string()).collect();
                }
                rows.push(
                    (0..row.len())
                        .map(|i| row.get(i).map(str::to_string))
                        .collect(),
                );
            }
        }
        Ok(RowSet::new(columns, rows))
    }

    fn close(self: Box<Self>) {
        drop(self.client);
        self.driver.abort();
    }
}

/// Create a table, write two rows and read them back
///
/// Fails on the first statement error, or if the row count read back is not
/// exactly two. Leaves `test_db` behind, so it runs once per cluster.
pub async fn verify_database_functions(conn: &mut dyn SqlConnection) -> Result<(), Error> {
    conn.execute(&format!("CREATE DATABASE {SMOKE_DATABASE}")).await?;
    conn.execute(&format!("USE {SMOKE_DATABASE}")).await?;
    conn.execute("CREATE TABLE IF NOT EXISTS accounts (id INT PRIMARY KEY, balance INT)")
        .await?;
    conn.execute("INSERT INTO accounts (id, balance) VALUES (1, 1000), (2, 250)")
        .await?;

    let balances = conn.query("SELECT id, balance FROM accounts").await?;
    for row in 0..balances.len() {
        debug!(
            id = balances.get(row, "id").unwrap_or("NULL"),
            balance = balances.get(row, "balance").unwrap_or("NULL"),
            "Account balance"
        );
    }

    let counted = conn.query("SELECT COUNT(*) AS count FROM accounts").await?;
    let count: u64 = counted
        .scalar()
        .ok_or_else(|| Error::database("row count query returned no value"))?
        .parse()
        .map_err(|e| Error::database(format!("row count is not a number: {e}")))?;

    if count != EXPECTED_ACCOUNTS {
        return Err(Error::unexpected_state_in(
            "database-functions",
            format!("found {count} rows in accounts, want {EXPECTED_ACCOUNTS}"),
        ));
    }

    info!("Database read/write check passed");
    Ok(())
}

/// The downgrade guard setting is pinned to `version`
pub async fn verify_downgrade_option(conn: &mut dyn SqlConnection, version: &str) -> Result<(), Error> {
    let setting = conn
        .query("SHOW CLUSTER SETTING cluster.preserve_downgrade_option")
        .await?;
    let value = setting.scalar().unwrap_or_default();

    if value.is_empty() {
        return Err(Error::unexpected_state_in(
            "downgrade-option",
            format!("preserve_downgrade_option is empty, want {version}"),
        ));
    }
    if value != version {
        return Err(Error::unexpected_state_in(
            "downgrade-option",
            format!("preserve_downgrade_option is {value}, want {version}"),
        ));
    }
    Ok(())
}
