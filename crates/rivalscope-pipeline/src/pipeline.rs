//! Per-target pipeline: ordered work units with dependency edges

use rivalscope_core::{UnitOutput, WorkUnit};
use rivalscope_worker::UnitInputs;
use std::collections::{BTreeMap, HashSet};

/// Outputs produced so far in one pipeline run, keyed by unit id.
pub type CompletedOutputs = BTreeMap<String, UnitOutput>;

/// Ordered units for one target. Order is topological: every unit appears
/// after all of its dependencies.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pipeline {
    target: String,
    units: Vec<WorkUnit>,
}

impl Pipeline {
    pub fn new(target: impl Into<String>, units: Vec<WorkUnit>) -> Self {
        Self {
            target: target.into(),
            units,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn units(&self) -> &[WorkUnit] {
        &self.units
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn unit(&self, id: &str) -> Option<&WorkUnit> {
        self.units.iter().find(|u| u.id == id)
    }

    pub fn unit_ids(&self) -> Vec<&str> {
        self.units.iter().map(|u| u.id.as_str()).collect()
    }

    /// The last unit; its output is the target's report.
    pub fn terminal(&self) -> Option<&WorkUnit> {
        self.units.last()
    }

    /// Units whose dependencies are all in `completed` and that have not been
    /// started yet, in pipeline order.
    pub fn ready<'a>(
        &'a self,
        completed: &CompletedOutputs,
        started: &HashSet<String>,
    ) -> Vec<&'a WorkUnit> {
        self.units
            .iter()
            .filter(|u| !started.contains(&u.id))
            .filter(|u| u.depends_on.iter().all(|dep| completed.contains_key(dep)))
            .collect()
    }

    /// Dependency outputs for `unit`, keyed by unit id.
    pub fn inputs_for(&self, unit: &WorkUnit, completed: &CompletedOutputs) -> UnitInputs {
        unit.depends_on
            .iter()
            .filter_map(|dep| completed.get(dep).map(|out| (dep.clone(), out.clone())))
            .collect()
    }
}
