use std::future::Future;
use std::pin::Pin;

use scylla::prepared_statement::PreparedStatement;
use scylla::{Session, SessionBuilder};
use tokio::sync::OnceCell;

use sluice_api::error::SinkError;
use sluice_api::record::UserRecord;
use sluice_api::sink::RecordSink;

/// Cassandra/ScyllaDB implementation of the sink seam.
///
/// CQL INSERT is an upsert keyed by the primary key — exactly the
/// last-write-wins semantics the engine relies on when a batch is
/// redelivered after a crash.
pub struct CassandraSink {
    session: Session,
    keyspace: String,
    table: String,
    replication_factor: u16,
    insert: OnceCell<PreparedStatement>,
}

impl CassandraSink {
    /// Connect to the cluster. Fails when no contact node is reachable.
    pub async fn connect(
        nodes: &[String],
        keyspace: impl Into<String>,
        table: impl Into<String>,
        replication_factor: u16,
    ) -> Result<Self, SinkError> {
        let session = SessionBuilder::new()
            .known_nodes(nodes)
            .build()
            .await
            .map_err(|e| SinkError::Connect(e.to_string()))?;

        Ok(Self {
            session,
            keyspace: keyspace.into(),
            table: table.into(),
            replication_factor,
            insert: OnceCell::new(),
        })
    }

    async fn insert_statement(&self) -> Result<&PreparedStatement, SinkError> {
        self.insert
            .get_or_try_init(|| async {
                self.session
                    .prepare(insert_cql(&self.keyspace, &self.table))
                    .await
                    .map_err(|e| SinkError::Write(e.to_string()))
            })
            .await
    }
}

impl RecordSink for CassandraSink {
    fn ensure_schema(&self) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + '_>> {
        Box::pin(async move {
            self.session
                .query_unpaged(
                    create_keyspace_cql(&self.keyspace, self.replication_factor),
                    (),
                )
                .await
                .map_err(|e| SinkError::Provision(e.to_string()))?;
            tracing::info!(keyspace = %self.keyspace, "keyspace ready");

            self.session
                .query_unpaged(create_table_cql(&self.keyspace, &self.table), ())
                .await
                .map_err(|e| SinkError::Provision(e.to_string()))?;
            tracing::info!(keyspace = %self.keyspace, table = %self.table, "table ready");

            Ok(())
        })
    }

    fn write(
        &self,
        records: &[UserRecord],
    ) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + '_>> {
        let records = records.to_vec();
        Box::pin(async move {
            if records.is_empty() {
                return Ok(());
            }

            let insert = self.insert_statement().await?;
            for r in &records {
                self.session
                    .execute_unpaged(
                        insert,
                        (
                            r.id,
                            r.first_name.as_deref(),
                            r.last_name.as_deref(),
                            r.gender.as_deref(),
                            r.address.as_deref(),
                            r.post_code.as_deref(),
                            r.email.as_deref(),
                            r.username.as_deref(),
                            r.dob.as_deref(),
                            r.registered_date.as_deref(),
                            r.phone.as_deref(),
                            r.picture.as_deref(),
                        ),
                    )
                    .await
                    .map_err(|e| SinkError::Write(e.to_string()))?;
            }
            Ok(())
        })
    }
}

fn create_keyspace_cql(keyspace: &str, replication_factor: u16) -> String {
    format!(
        "CREATE KEYSPACE IF NOT EXISTS {keyspace} WITH REPLICATION = \
         {{'class': 'SimpleStrategy', 'replication_factor': {replication_factor}}}"
    )
}

fn create_table_cql(keyspace: &str, table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {keyspace}.{table} (\
         id uuid PRIMARY KEY, \
         first_name text, \
         last_name text, \
         gender text, \
         address text, \
         post_code text, \
         email text, \
         username text, \
         dob text, \
         registered_date text, \
         phone text, \
         picture text)"
    )
}

fn insert_cql(keyspace: &str, table: &str) -> String {
    format!(
        "INSERT INTO {keyspace}.{table} \
         (id, first_name, last_name, gender, address, post_code, \
         email, username, dob, registered_date, phone, picture) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    )
}
