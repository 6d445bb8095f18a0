use crate::models::LedgerOutput;
use crate::records::{OutputId, OutputRecord, TxId, TxOutputLink};
use crate::registry::DenominationRegistry;

/// Gives `output` the next global index for its amount and links it to `tx`.
pub fn assign_output(
    registry: &mut DenominationRegistry,
    output: &LedgerOutput,
    tx: TxId,
) -> (OutputRecord, TxOutputLink) {
    let id = OutputId {
        amount: output.amount,
        index: registry.allocate(output.amount),
    };
    (OutputRecord { id }, TxOutputLink { tx, output: id })
}
