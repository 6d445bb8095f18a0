use std::pin::Pin;

use bb8::Pool;
use bb8_postgres::PostgresConnectionManager;
use bytes::Bytes;
use futures::SinkExt;
use tokio_postgres::{CopyInSink, NoTls};
use tracing::{debug, info};

use crate::error::SinkError;
use crate::records::{RecordBatch, RecordKind};
use crate::sink::RecordSink;

pub type PgPool = Pool<PostgresConnectionManager<NoTls>>;

const SCHEMA: &str = "
    DROP TABLE IF EXISTS spends;
    DROP TABLE IF EXISTS input_output_refs;
    DROP TABLE IF EXISTS tx_inputs;
    DROP TABLE IF EXISTS inputs;
    DROP TABLE IF EXISTS tx_outputs;
    DROP TABLE IF EXISTS outputs;
    DROP TABLE IF EXISTS tx_blocks;
    DROP TABLE IF EXISTS transactions;
    DROP TABLE IF EXISTS block_links;
    DROP TABLE IF EXISTS blocks;

    CREATE TABLE IF NOT EXISTS blocks (
        height BIGINT PRIMARY KEY,
        hash VARCHAR(64),
        timestamp BIGINT
    );

    CREATE TABLE IF NOT EXISTS block_links (
        height BIGINT REFERENCES blocks(height),
        previous_height BIGINT REFERENCES blocks(height)
    );

    CREATE TABLE IF NOT EXISTS transactions (
        tx_id TEXT PRIMARY KEY,
        hash VARCHAR(64),
        fee NUMERIC(20, 0),
        coinbase BOOLEAN
    );

    CREATE TABLE IF NOT EXISTS tx_blocks (
        tx_id TEXT REFERENCES transactions(tx_id),
        height BIGINT REFERENCES blocks(height)
    );

    CREATE TABLE IF NOT EXISTS outputs (
        output_id TEXT PRIMARY KEY,
        amount NUMERIC(20, 0),
        output_index BIGINT
    );

    CREATE TABLE IF NOT EXISTS tx_outputs (
        tx_id TEXT REFERENCES transactions(tx_id),
        output_id TEXT REFERENCES outputs(output_id)
    );

    CREATE TABLE IF NOT EXISTS inputs (
        input_id TEXT PRIMARY KEY,
        amount NUMERIC(20, 0),
        mixin BIGINT,
        size_anon BIGINT
    );

    CREATE TABLE IF NOT EXISTS tx_inputs (
        tx_id TEXT REFERENCES transactions(tx_id),
        input_id TEXT REFERENCES inputs(input_id)
    );

    CREATE TABLE IF NOT EXISTS input_output_refs (
        input_id TEXT REFERENCES inputs(input_id),
        output_id TEXT REFERENCES outputs(output_id)
    );

    CREATE TABLE IF NOT EXISTS spends (
        input_id TEXT REFERENCES inputs(input_id),
        output_id TEXT REFERENCES outputs(output_id),
        iteration INTEGER
    );

    CREATE INDEX IF NOT EXISTS blocks_hash_idx ON blocks (hash);
    CREATE INDEX IF NOT EXISTS transactions_hash_idx ON transactions (hash);
    CREATE INDEX IF NOT EXISTS outputs_amount_index_idx ON outputs (amount, output_index);
    CREATE INDEX IF NOT EXISTS inputs_amount_idx ON inputs (amount);
    CREATE INDEX IF NOT EXISTS inputs_mixin_idx ON inputs (mixin);
    CREATE INDEX IF NOT EXISTS input_output_refs_output_idx ON input_output_refs (output_id);
    CREATE INDEX IF NOT EXISTS spends_output_idx ON spends (output_id);
";

/// Drops and recreates the export tables.
pub async fn setup_database(pool: &PgPool) -> Result<(), SinkError> {
    let conn = pool.get().await.map_err(|e| SinkError::Pool(e.to_string()))?;
    conn.batch_execute(SCHEMA).await?;
    Ok(())
}

/// Loads every block's records with `COPY`, one database transaction per block.
pub struct PostgresSink {
    pool: PgPool,
    rows: u64,
}

impl PostgresSink {
    pub async fn connect(database_url: &str) -> Result<Self, SinkError> {
        let config = database_url.parse::<tokio_postgres::Config>()?;
        let manager = PostgresConnectionManager::new(config, NoTls);
        let pool = Pool::builder().build(manager).await?;
        info!("Connected to the database.");

        setup_database(&pool).await?;
        info!("Database schema setup complete.");

        Ok(Self { pool, rows: 0 })
    }
}

impl RecordSink for PostgresSink {
    async fn append(&mut self, batch: &RecordBatch) -> Result<(), SinkError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| SinkError::Pool(e.to_string()))?;
        let transaction = conn.transaction().await?;

        // Parent tables come first in RecordKind::ALL, so references resolve.
        for kind in RecordKind::ALL {
            let lines = batch.lines(kind);
            if lines.is_empty() {
                continue;
            }

            let statement = format!(
                "COPY {} ({}) FROM STDIN WITH DELIMITER ',' CSV",
                kind.table_name(),
                kind.columns()
            );
            let mut sink: Pin<Box<CopyInSink<Bytes>>> =
                Box::pin(transaction.copy_in(statement.as_str()).await?);
            for line in lines {
                sink.as_mut().send(Bytes::from(line)).await?;
            }
            self.rows += sink.as_mut().finish().await?;
        }

        transaction.commit().await?;
        debug!("Committed block {} ({} rows so far)", batch.height, self.rows);
        Ok(())
    }

    async fn finish(&mut self) -> Result<(), SinkError> {
        info!("Loaded {} rows into the database", self.rows);
        Ok(())
    }
}
