//! Relational records emitted by the replay and their CSV rendering.

use std::fmt;

/// Transaction identity, rendered as `t<n>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TxId(pub u64);

/// Input identity, rendered as `i<n>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InputId(pub u64);

/// Output identity: amount plus the amount-scoped global output index.
///
/// Unique within an amount only. Rendered as `<amount>-<index>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OutputId {
    pub amount: u64,
    pub index: u64,
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

impl fmt::Display for InputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "i{}", self.0)
    }
}

impl fmt::Display for OutputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.amount, self.index)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockRecord {
    pub height: u64,
    pub hash: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockLink {
    pub height: u64,
    pub previous: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRecord {
    pub id: TxId,
    pub hash: String,
    pub fee: u64,
    pub coinbase: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TxBlockLink {
    pub tx: TxId,
    pub height: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputRecord {
    pub id: OutputId,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TxOutputLink {
    pub tx: TxId,
    pub output: OutputId,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputRecord {
    pub id: InputId,
    pub amount: u64,
    pub mixin: u64,
    /// Outputs of this amount that existed when the input was resolved.
    pub size_anon: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TxInputLink {
    pub tx: TxId,
    pub input: InputId,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputOutputRef {
    pub input: InputId,
    pub output: OutputId,
}

/// An input together with the ring member it was deduced to spend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpendRecord {
    pub input: InputId,
    pub output: OutputId,
    /// Deduction round that revealed the spend; zero-mixin inputs are round 1.
    pub iteration: u32,
}

/// The record streams written by every sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Blocks,
    BlockLinks,
    Transactions,
    TxBlocks,
    Outputs,
    TxOutputs,
    Inputs,
    TxInputs,
    InputOutputRefs,
    Spends,
}

impl RecordKind {
    pub const ALL: [RecordKind; 10] = [
        RecordKind::Blocks,
        RecordKind::BlockLinks,
        RecordKind::Transactions,
        RecordKind::TxBlocks,
        RecordKind::Outputs,
        RecordKind::TxOutputs,
        RecordKind::Inputs,
        RecordKind::TxInputs,
        RecordKind::InputOutputRefs,
        RecordKind::Spends,
    ];

    /// Stream name, used as the CSV file stem.
    pub fn stream_name(&self) -> &'static str {
        match self {
            RecordKind::Blocks => "blocks",
            RecordKind::BlockLinks => "blocks-rels",
            RecordKind::Transactions => "transactions",
            RecordKind::TxBlocks => "tx-blocks",
            RecordKind::Outputs => "outputs",
            RecordKind::TxOutputs => "output-rels",
            RecordKind::Inputs => "inputs",
            RecordKind::TxInputs => "input-rels",
            RecordKind::InputOutputRefs => "input-output-refs",
            RecordKind::Spends => "spends",
        }
    }

    pub fn table_name(&self) -> &'static str {
        match self {
            RecordKind::Blocks => "blocks",
            RecordKind::BlockLinks => "block_links",
            RecordKind::Transactions => "transactions",
            RecordKind::TxBlocks => "tx_blocks",
            RecordKind::Outputs => "outputs",
            RecordKind::TxOutputs => "tx_outputs",
            RecordKind::Inputs => "inputs",
            RecordKind::TxInputs => "tx_inputs",
            RecordKind::InputOutputRefs => "input_output_refs",
            RecordKind::Spends => "spends",
        }
    }

    /// Column list in row order.
    pub fn columns(&self) -> &'static str {
        match self {
            RecordKind::Blocks => "height, hash, timestamp",
            RecordKind::BlockLinks => "height, previous_height",
            RecordKind::Transactions => "tx_id, hash, fee, coinbase",
            RecordKind::TxBlocks => "tx_id, height",
            RecordKind::Outputs => "output_id, amount, output_index",
            RecordKind::TxOutputs => "tx_id, output_id",
            RecordKind::Inputs => "input_id, amount, mixin, size_anon",
            RecordKind::TxInputs => "tx_id, input_id",
            RecordKind::InputOutputRefs => "input_id, output_id",
            RecordKind::Spends => "input_id, output_id, iteration",
        }
    }
}

/// Every record produced by one completed block, in emission order per stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordBatch {
    pub height: u64,
    pub blocks: Vec<BlockRecord>,
    pub block_links: Vec<BlockLink>,
    pub transactions: Vec<TransactionRecord>,
    pub tx_blocks: Vec<TxBlockLink>,
    pub outputs: Vec<OutputRecord>,
    pub tx_outputs: Vec<TxOutputLink>,
    pub inputs: Vec<InputRecord>,
    pub tx_inputs: Vec<TxInputLink>,
    pub input_output_refs: Vec<InputOutputRef>,
    pub spends: Vec<SpendRecord>,
}

impl RecordBatch {
    pub fn new(height: u64) -> Self {
        Self {
            height,
            ..Default::default()
        }
    }

    /// Renders the rows of one stream as newline-terminated CSV lines.
    pub fn lines(&self, kind: RecordKind) -> Vec<String> {
        match kind {
            RecordKind::Blocks => self
                .blocks
                .iter()
                .map(|b| format!("{},{},{}\n", b.height, b.hash, b.timestamp))
                .collect(),
            RecordKind::BlockLinks => self
                .block_links
                .iter()
                .map(|l| format!("{},{}\n", l.height, l.previous))
                .collect(),
            RecordKind::Transactions => self
                .transactions
                .iter()
                .map(|t| format!("{},{},{},{}\n", t.id, t.hash, t.fee, t.coinbase))
                .collect(),
            RecordKind::TxBlocks => self
                .tx_blocks
                .iter()
                .map(|l| format!("{},{}\n", l.tx, l.height))
                .collect(),
            RecordKind::Outputs => self
                .outputs
                .iter()
                .map(|o| format!("{},{},{}\n", o.id, o.id.amount, o.id.index))
                .collect(),
            RecordKind::TxOutputs => self
                .tx_outputs
                .iter()
                .map(|l| format!("{},{}\n", l.tx, l.output))
                .collect(),
            RecordKind::Inputs => self
                .inputs
                .iter()
                .map(|i| format!("{},{},{},{}\n", i.id, i.amount, i.mixin, i.size_anon))
                .collect(),
            RecordKind::TxInputs => self
                .tx_inputs
                .iter()
                .map(|l| format!("{},{}\n", l.tx, l.input))
                .collect(),
            RecordKind::InputOutputRefs => self
                .input_output_refs
                .iter()
                .map(|r| format!("{},{}\n", r.input, r.output))
                .collect(),
            RecordKind::Spends => self
                .spends
                .iter()
                .map(|s| format!("{},{},{}\n", s.input, s.output, s.iteration))
                .collect(),
        }
    }
}
