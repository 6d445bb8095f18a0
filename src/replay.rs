//! Sequential replay of the ledger into relational records.
//!
//! Blocks are applied strictly by ascending height. Within a block the coinbase
//! comes first, then the ordinary transactions in source order. Each transaction
//! is applied in two phases: all of its inputs are resolved against the registry
//! before any of its outputs is assigned, so a ring can never contain an output
//! of its own transaction.

use std::collections::HashMap;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use tracing::{debug, info};

use crate::analysis::{check_spends, RingGraph};
use crate::assigner::assign_output;
use crate::error::{ReplayError, ReplayResult};
use crate::models::{BlockHeader, LedgerTransaction};
use crate::records::{BlockLink, BlockRecord, RecordBatch, TransactionRecord, TxBlockLink};
use crate::registry::{DenominationRegistry, IdCounters};
use crate::resolver::resolve_input;
use crate::sink::RecordSink;
use crate::source::LedgerSource;

/// A block with its ordinary transactions in the order the block lists them.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedBlock {
    pub header: BlockHeader,
    pub transactions: Vec<LedgerTransaction>,
}

/// Fetches the block at `height` and its transactions in one batched call.
pub async fn fetch_block<S: LedgerSource>(source: &S, height: u64) -> ReplayResult<FetchedBlock> {
    let header = source.get_block_header(height).await?;
    if header.tx_hashes.is_empty() {
        return Ok(FetchedBlock {
            header,
            transactions: Vec::new(),
        });
    }

    let mut by_hash: HashMap<String, LedgerTransaction> = source
        .get_transactions(&header.tx_hashes)
        .await?
        .into_iter()
        .map(|tx| (tx.hash.clone(), tx))
        .collect();

    let transactions = header
        .tx_hashes
        .iter()
        .map(|hash| {
            by_hash
                .remove(hash)
                .ok_or_else(|| ReplayError::UnknownReference(hash.clone()))
        })
        .collect::<ReplayResult<Vec<_>>>()?;

    Ok(FetchedBlock {
        header,
        transactions,
    })
}

/// Counts of everything emitted so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplaySummary {
    pub blocks: u64,
    pub transactions: u64,
    pub inputs: u64,
    pub outputs: u64,
    pub denominations: usize,
}

#[derive(Debug, Clone)]
pub struct ReplayOptions {
    /// Last height to replay, inclusive.
    pub max_height: u64,
    /// Blocks fetched ahead of the one being applied.
    pub prefetch: usize,
    /// Log progress every this many blocks; 0 disables it.
    pub progress_interval: u64,
    /// Deduce spends from the rings once the last block is applied.
    pub analyze_spends: bool,
}

/// Replay state. Owns the amount registry and the identity counters, which are
/// only valid for a replay that started at height 0.
#[derive(Debug)]
pub struct Replay {
    registry: DenominationRegistry,
    ids: IdCounters,
    next_height: u64,
}

impl Default for Replay {
    fn default() -> Self {
        Self::new()
    }
}

impl Replay {
    pub fn new() -> Self {
        Self {
            registry: DenominationRegistry::new(),
            ids: IdCounters::new(),
            next_height: 0,
        }
    }

    pub fn next_height(&self) -> u64 {
        self.next_height
    }

    /// Applies one block and returns its records.
    ///
    /// On error the batch is dropped. Registry counters already advanced by
    /// this block are not rolled back, so the replay cannot continue.
    pub fn apply_block(&mut self, block: &FetchedBlock) -> ReplayResult<RecordBatch> {
        let header = &block.header;
        if header.height != self.next_height {
            return Err(ReplayError::UnexpectedHeight {
                expected: self.next_height,
                found: header.height,
            });
        }

        let mut batch = RecordBatch::new(header.height);
        batch.blocks.push(BlockRecord {
            height: header.height,
            hash: header.hash.clone(),
            timestamp: header.timestamp,
        });
        if header.height > 0 {
            batch.block_links.push(BlockLink {
                height: header.height,
                previous: header.height - 1,
            });
        }

        self.apply_transaction(&mut batch, &header.coinbase, true)?;
        for tx in &block.transactions {
            self.apply_transaction(&mut batch, tx, false)?;
        }

        debug!(
            "Applied block {}: {} transactions, {} inputs, {} outputs",
            header.height,
            batch.transactions.len(),
            batch.inputs.len(),
            batch.outputs.len()
        );

        self.next_height += 1;
        Ok(batch)
    }

    fn apply_transaction(
        &mut self,
        batch: &mut RecordBatch,
        tx: &LedgerTransaction,
        coinbase: bool,
    ) -> ReplayResult<()> {
        let id = self.ids.next_tx();
        batch.transactions.push(TransactionRecord {
            id,
            hash: tx.hash.clone(),
            fee: if coinbase { 0 } else { tx.fee },
            coinbase,
        });
        batch.tx_blocks.push(TxBlockLink {
            tx: id,
            height: batch.height,
        });

        // Inputs first: the registry must not yet contain this transaction's outputs.
        for input in &tx.inputs {
            let resolved = resolve_input(&self.registry, &mut self.ids, input, id)?;
            batch.inputs.push(resolved.record);
            batch.tx_inputs.push(resolved.link);
            batch.input_output_refs.extend(resolved.references);
        }

        for output in &tx.outputs {
            let (record, link) = assign_output(&mut self.registry, output, id);
            batch.outputs.push(record);
            batch.tx_outputs.push(link);
        }

        Ok(())
    }

    pub fn summary(&self) -> ReplaySummary {
        ReplaySummary {
            blocks: self.next_height,
            transactions: self.ids.transactions(),
            inputs: self.ids.inputs(),
            outputs: self.registry.total_outputs(),
            denominations: self.registry.denominations(),
        }
    }
}

/// Replays from the next expected height through `options.max_height`.
///
/// Fetches run up to `options.prefetch` blocks ahead; application and sink
/// writes stay on this task in height order. Each block's batch is appended to
/// the sink before the next block is applied. With `options.analyze_spends`
/// the deduced spends follow as one last batch.
pub async fn run<S, K>(
    source: &S,
    sink: &mut K,
    replay: &mut Replay,
    options: &ReplayOptions,
) -> ReplayResult<ReplaySummary>
where
    S: LedgerSource,
    K: RecordSink,
{
    let start = replay.next_height();
    info!("Replaying heights {} to {}", start, options.max_height);

    let mut blocks = stream::iter(start..=options.max_height)
        .map(|height| fetch_block(source, height))
        .buffered(options.prefetch.max(1));

    let mut rings = options.analyze_spends.then(RingGraph::new);
    let mut window_start = Instant::now();
    while let Some(fetched) = blocks.next().await {
        let fetched = fetched?;
        let batch = replay.apply_block(&fetched)?;
        sink.append(&batch).await?;
        if let Some(rings) = rings.as_mut() {
            rings.observe(&batch);
        }

        let height = fetched.header.height;
        if options.progress_interval > 0 && (height + 1) % options.progress_interval == 0 {
            let time = chrono::DateTime::from_timestamp(fetched.header.timestamp, 0)
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_default();
            info!(
                "Processed {} blocks in {:?}, at height {} ({})",
                options.progress_interval,
                window_start.elapsed(),
                height,
                time
            );
            window_start = Instant::now();
        }
    }

    if let Some(rings) = rings {
        info!("Analyzing the rings of {} inputs", rings.inputs());
        let mut batch = RecordBatch::new(replay.next_height().saturating_sub(1));
        batch.spends = rings.solve();
        check_spends(&batch.spends)?;
        sink.append(&batch).await?;
    }

    sink.finish().await?;
    Ok(replay.summary())
}
