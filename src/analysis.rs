//! Spend deduction over the emitted ring references.
//!
//! A zero-mixin input reveals the output it spends. Once an output is known to
//! be spent, it can be ruled out as a decoy in every other ring that contains
//! it, which may leave a single candidate in those rings. The deduction repeats
//! until no ring narrows down any further.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use tracing::{debug, info};

use crate::error::{ReplayError, ReplayResult};
use crate::records::{InputId, OutputId, RecordBatch, SpendRecord};

/// Rings of every input seen so far, indexed both ways.
#[derive(Debug, Default)]
pub struct RingGraph {
    rings: BTreeMap<InputId, Vec<OutputId>>,
    zero_mixin: Vec<InputId>,
    referenced_by: HashMap<OutputId, Vec<InputId>>,
}

impl RingGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the inputs and ring references of one block.
    pub fn observe(&mut self, batch: &RecordBatch) {
        for reference in &batch.input_output_refs {
            let ring = self.rings.entry(reference.input).or_default();
            if !ring.contains(&reference.output) {
                ring.push(reference.output);
                self.referenced_by
                    .entry(reference.output)
                    .or_default()
                    .push(reference.input);
            }
        }
        self.zero_mixin.extend(
            batch
                .inputs
                .iter()
                .filter(|input| input.mixin == 0)
                .map(|input| input.id),
        );
    }

    pub fn inputs(&self) -> usize {
        self.rings.len()
    }

    fn ring(&self, input: InputId) -> &[OutputId] {
        self.rings.get(&input).map(Vec::as_slice).unwrap_or_default()
    }

    fn referencing(&self, output: OutputId) -> &[InputId] {
        self.referenced_by
            .get(&output)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Deduces every spend the rings reveal.
    ///
    /// Ring members of zero-mixin inputs are spent at iteration 1. An input
    /// whose ring has exactly one member not yet known to be spent spends that
    /// member, at one past the highest iteration among its other members.
    pub fn solve(&self) -> Vec<SpendRecord> {
        let mut spent: HashMap<OutputId, u32> = HashMap::new();
        let mut solved: HashSet<InputId> = HashSet::new();
        let mut spends = Vec::new();
        let mut queue: VecDeque<InputId> = VecDeque::new();

        for &input in &self.zero_mixin {
            for &output in self.ring(input) {
                spent.insert(output, 1);
                spends.push(SpendRecord {
                    input,
                    output,
                    iteration: 1,
                });
                queue.extend(self.referencing(output));
            }
            solved.insert(input);
        }
        debug!("{} zero-mixin inputs reveal their spends", solved.len());

        // Rings that repeat one member have a single candidate from the start.
        queue.extend(
            self.rings
                .iter()
                .filter(|(_, ring)| ring.len() == 1)
                .map(|(input, _)| *input),
        );

        while let Some(input) = queue.pop_front() {
            if solved.contains(&input) {
                continue;
            }
            let ring = self.ring(input);
            let mut candidates = ring.iter().filter(|output| !spent.contains_key(*output));
            let (Some(&output), None) = (candidates.next(), candidates.next()) else {
                continue;
            };

            let iteration = ring
                .iter()
                .filter_map(|member| spent.get(member))
                .max()
                .copied()
                .unwrap_or(0)
                + 1;
            spent.insert(output, iteration);
            solved.insert(input);
            spends.push(SpendRecord {
                input,
                output,
                iteration,
            });
            queue.extend(
                self.referencing(output)
                    .iter()
                    .filter(|other| !solved.contains(*other)),
            );
        }

        info!(
            "Deduced {} spends for {} of {} inputs",
            spends.len(),
            solved.len(),
            self.inputs()
        );
        spends
    }
}

/// Fails if any input was found to spend more than one output.
pub fn check_spends(spends: &[SpendRecord]) -> ReplayResult<()> {
    let mut outputs_per_input: HashMap<InputId, usize> = HashMap::new();
    for spend in spends {
        *outputs_per_input.entry(spend.input).or_default() += 1;
    }

    match outputs_per_input
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .min()
    {
        Some((input, count)) => Err(ReplayError::InconsistentSpends {
            input: input.to_string(),
            count,
        }),
        None => Ok(()),
    }
}
