//! Conversion of relative ring offsets into absolute output identities.

use crate::error::{ReplayError, ReplayResult};
use crate::models::LedgerInput;
use crate::records::{InputOutputRef, InputRecord, OutputId, TxId, TxInputLink};
use crate::registry::{DenominationRegistry, IdCounters};

/// An input together with its ownership edge and ring references.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedInput {
    pub record: InputRecord,
    pub link: TxInputLink,
    pub references: Vec<InputOutputRef>,
}

/// Resolves the ring of `input`, owned by transaction `tx`.
///
/// Must run before any output of the same transaction is assigned, so that
/// `size_anon` and the bound check only see earlier outputs. Nothing is
/// allocated when the ring is rejected.
pub fn resolve_input(
    registry: &DenominationRegistry,
    ids: &mut IdCounters,
    input: &LedgerInput,
    tx: TxId,
) -> ReplayResult<ResolvedInput> {
    let ring = absolute_ring(registry, input)?;
    let size_anon = registry.current_count(input.amount);

    let id = ids.next_input();
    let references = ring
        .into_iter()
        .map(|output| InputOutputRef { input: id, output })
        .collect();

    Ok(ResolvedInput {
        record: InputRecord {
            id,
            amount: input.amount,
            mixin: input.key_offsets.len() as u64 - 1,
            size_anon,
        },
        link: TxInputLink { tx, input: id },
        references,
    })
}

/// Accumulates offsets from index 0, rejecting members not yet allocated.
fn absolute_ring(
    registry: &DenominationRegistry,
    input: &LedgerInput,
) -> ReplayResult<Vec<OutputId>> {
    if input.key_offsets.is_empty() {
        return Err(ReplayError::EmptyRing {
            amount: input.amount,
        });
    }

    let size_anon = registry.current_count(input.amount);
    let mut absolute: u64 = 0;
    let mut ring = Vec::with_capacity(input.key_offsets.len());

    for offset in &input.key_offsets {
        absolute = absolute
            .checked_add(*offset)
            .ok_or(ReplayError::ReplayOrderingViolation {
                amount: input.amount,
                index: u64::MAX,
                size_anon,
            })?;
        if absolute >= size_anon {
            return Err(ReplayError::ReplayOrderingViolation {
                amount: input.amount,
                index: absolute,
                size_anon,
            });
        }
        ring.push(OutputId {
            amount: input.amount,
            index: absolute,
        });
    }

    Ok(ring)
}
