//! A dependency-free fallback resolver: a weighted greedy/backtracking
//! search with no SAT solver. Packages are tried most-constrained-first;
//! within a package, candidates are tried highest-version-first, matching
//! the same "highest satisfying version" objective as the SAT strategy.

use std::collections::BTreeMap;
use std::time::Instant;

use uuid::Uuid;

use super::diagnostic::{ConflictCore, ConstraintEdge};
use super::{Outcome, Problem, ResolveStrategy};
use crate::registry::PackageEntry;

const MAX_STEPS: u64 = 200_000;

#[derive(Default)]
pub struct MaxSumStrategy {
    steps: u64,
}

impl MaxSumStrategy {
    pub fn new() -> Self {
        MaxSumStrategy { steps: 0 }
    }
}

enum Step {
    Sat,
    Unsat,
    Unknown,
}

impl ResolveStrategy for MaxSumStrategy {
    fn resolve(&mut self, problem: &Problem, deadline: Instant) -> Outcome {
        let filtered = filter_candidates(problem);
        let mut order: Vec<Uuid> = filtered.keys().copied().collect();
        order.sort_by_key(|uuid| filtered[uuid].len());

        let mut assignment: BTreeMap<Uuid, usize> = BTreeMap::new();
        match backtrack(&filtered, &order, 0, &mut assignment, deadline, &mut self.steps) {
            Step::Sat => {
                let selected = assignment
                    .iter()
                    .map(|(uuid, i)| (*uuid, filtered[uuid][*i].clone()))
                    .collect();
                Outcome::Sat(selected)
            }
            Step::Unsat => Outcome::Unsat(build_conflict_core(problem, &order, &filtered)),
            Step::Unknown => Outcome::Unknown,
        }
    }
}

fn backtrack(
    filtered: &BTreeMap<Uuid, Vec<PackageEntry>>,
    order: &[Uuid],
    idx: usize,
    assignment: &mut BTreeMap<Uuid, usize>,
    deadline: Instant,
    steps: &mut u64,
) -> Step {
    if idx == order.len() {
        return Step::Sat;
    }
    if Instant::now() >= deadline {
        return Step::Unknown;
    }
    let uuid = order[idx];
    let entries = &filtered[&uuid];
    for i in 0..entries.len() {
        *steps += 1;
        if *steps > MAX_STEPS {
            return Step::Unknown;
        }
        if !consistent(filtered, assignment, uuid, i) {
            continue;
        }
        assignment.insert(uuid, i);
        match backtrack(filtered, order, idx + 1, assignment, deadline, steps) {
            Step::Sat => return Step::Sat,
            Step::Unknown => return Step::Unknown,
            Step::Unsat => {
                assignment.remove(&uuid);
            }
        }
    }
    Step::Unsat
}

fn consistent(
    filtered: &BTreeMap<Uuid, Vec<PackageEntry>>,
    assignment: &BTreeMap<Uuid, usize>,
    uuid: Uuid,
    candidate_idx: usize,
) -> bool {
    let entry = &filtered[&uuid][candidate_idx];
    for (dep_uuid, dep_idx) in assignment {
        let dep_entry = &filtered[dep_uuid][*dep_idx];
        if let Some(range) = dep_entry.compat.get(&uuid) {
            if entry_depends_on(dep_entry, uuid) && !range.contains(&entry.version) {
                return false;
            }
        }
    }
    for dep_uuid in entry.deps.values() {
        if let Some(&dep_idx) = assignment.get(dep_uuid) {
            let dep_version = &filtered[dep_uuid][dep_idx].version;
            if let Some(range) = entry.compat.get(dep_uuid) {
                if !range.contains(dep_version) {
                    return false;
                }
            }
        }
    }
    true
}

fn entry_depends_on(entry: &PackageEntry, uuid: Uuid) -> bool {
    entry.deps.values().any(|dep_uuid| *dep_uuid == uuid)
}

fn filter_candidates(problem: &Problem) -> BTreeMap<Uuid, Vec<PackageEntry>> {
    let mut out = BTreeMap::new();
    for (uuid, entries) in &problem.candidates {
        let kept: Vec<PackageEntry> = match problem.root_ranges.get(uuid) {
            Some((range, _)) => entries.iter().filter(|e| range.contains(&e.version)).cloned().collect(),
            None => entries.clone(),
        };
        out.insert(*uuid, kept);
    }
    out
}

/// No MUS extraction for this backend: names every root requirement whose
/// candidate set is empty, or else every root as a coarse fallback.
fn build_conflict_core(
    problem: &Problem,
    order: &[Uuid],
    filtered: &BTreeMap<Uuid, Vec<PackageEntry>>,
) -> ConflictCore {
    let mut edges = Vec::new();
    let mut root = None;
    for uuid in order {
        if filtered[uuid].is_empty() {
            root.get_or_insert(*uuid);
            if let Some((range, origin)) = problem.root_ranges.get(uuid) {
                edges.push(ConstraintEdge {
                    uuid: *uuid,
                    range: range.clone(),
                    origin: origin.clone(),
                });
            }
        }
    }
    if root.is_none() {
        for (uuid, (range, origin)) in &problem.root_ranges {
            root.get_or_insert(*uuid);
            edges.push(ConstraintEdge {
                uuid: *uuid,
                range: range.clone(),
                origin: origin.clone(),
            });
        }
    }
    ConflictCore {
        root: root.unwrap_or_else(Uuid::nil),
        edges,
    }
}
