//! CF-003: Rule registry — which cell produces each variable.
//!
//! Every registration creates one [`Cell`] in an arena. Each declared output
//! maps to the cell's index, so sibling outputs of one body share a single
//! dependency state: a fingerprint recorded through one output is seen by all
//! of them.

use super::error::FlowError;
use super::types::{Body, Fingerprint};
use indexmap::IndexMap;

/// Arena index of a registered cell.
///
/// Only valid until the next `register`: dropping orphaned cells renumbers
/// the ones after them. Look cells up by variable name to hold on to them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellId(usize);

/// One registration: inputs with their last-seen fingerprints, the
/// co-produced outputs, and the body.
#[derive(Debug, Clone)]
pub struct Cell {
    /// Input name → fingerprint when the cell last ran (`None`: never ran,
    /// or the input was unbound/unfingerprintable at that time).
    pub inputs: IndexMap<String, Option<Fingerprint>>,
    pub outputs: Vec<String>,
    pub body: Body,
}

impl Cell {
    pub fn last_fingerprint(&self, input: &str) -> Option<&Fingerprint> {
        self.inputs.get(input).and_then(Option::as_ref)
    }

    pub fn input_names(&self) -> impl Iterator<Item = &str> {
        self.inputs.keys().map(String::as_str)
    }
}

/// Output variable → producing cell.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    cells: Vec<Cell>,
    rules: IndexMap<String, CellId>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a cell. Every output's previous rule is replaced.
    /// Cycles and collisions are not checked here.
    ///
    /// Returns `None` when `outputs` is empty: nothing is registered.
    pub fn register<I, O, S, T>(&mut self, inputs: I, outputs: O, body: Body) -> Option<CellId>
    where
        I: IntoIterator<Item = S>,
        O: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        let inputs: IndexMap<String, Option<Fingerprint>> =
            inputs.into_iter().map(|i| (i.into(), None)).collect();
        let mut deduped: Vec<String> = Vec::new();
        for o in outputs {
            let o = o.into();
            if !deduped.contains(&o) {
                deduped.push(o);
            }
        }

        if deduped.is_empty() {
            return None;
        }

        let id = CellId(self.cells.len());
        for name in &deduped {
            self.rules.insert(name.clone(), id);
        }
        self.cells.push(Cell {
            inputs,
            outputs: deduped,
            body,
        });
        self.collect_orphans();
        // The new cell is live and last, so compaction leaves it at the end
        Some(CellId(self.cells.len() - 1))
    }

    pub fn has_rule(&self, name: &str) -> bool {
        self.rules.contains_key(name)
    }

    /// The cell producing `name`.
    pub fn rule(&self, name: &str) -> Result<&Cell, FlowError> {
        let id = self.cell_id(name)?;
        Ok(&self.cells[id.0])
    }

    pub fn rule_mut(&mut self, name: &str) -> Result<&mut Cell, FlowError> {
        let id = self.cell_id(name)?;
        Ok(&mut self.cells[id.0])
    }

    pub fn cell_id(&self, name: &str) -> Result<CellId, FlowError> {
        self.rules
            .get(name)
            .copied()
            .ok_or_else(|| FlowError::UnknownVariable(name.to_string()))
    }

    /// Number of variables with a rule.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Registered output names, in first-registration order.
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    /// Drop cells no output points at any more, remapping indices.
    fn collect_orphans(&mut self) {
        let mut live = vec![false; self.cells.len()];
        for id in self.rules.values() {
            live[id.0] = true;
        }
        if live.iter().all(|&l| l) {
            return;
        }

        let mut remap = vec![0usize; self.cells.len()];
        let mut next = 0;
        for (old, &is_live) in live.iter().enumerate() {
            if is_live {
                remap[old] = next;
                next += 1;
            }
        }
        let mut index = 0;
        self.cells.retain(|_| {
            let keep = live[index];
            index += 1;
            keep
        });
        for id in self.rules.values_mut() {
            id.0 = remap[id.0];
        }
    }
}
