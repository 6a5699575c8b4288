//! SAT-based resolution via `varisat`. Root requirements are gated behind
//! selector literals so that an UNSAT result can name the minimal subset
//! of requirements the solver actually needed to fail on.

use std::collections::{BTreeMap, HashSet};
use std::time::Instant;

use uuid::Uuid;
use varisat::{CnfFormula, ExtendFormula, Lit, Solver};

use super::diagnostic::{ConflictCore, ConstraintEdge};
use super::{Outcome, Problem, ResolveStrategy};
use crate::registry::PackageEntry;

#[derive(Default)]
pub struct SatStrategy;

impl SatStrategy {
    pub fn new() -> Self {
        SatStrategy
    }
}

impl ResolveStrategy for SatStrategy {
    fn resolve(&mut self, problem: &Problem, deadline: Instant) -> Outcome {
        if Instant::now() >= deadline {
            return Outcome::Unknown;
        }

        let filtered = filter_candidates(problem);
        let mut formula = CnfFormula::new();
        let mut var_of: BTreeMap<(Uuid, usize), Lit> = BTreeMap::new();
        for (uuid, entries) in &filtered {
            for i in 0..entries.len() {
                var_of.insert((*uuid, i), formula.new_lit());
            }
        }

        // At most one version of a package may be selected.
        for (uuid, entries) in &filtered {
            for i in 0..entries.len() {
                for j in (i + 1)..entries.len() {
                    let a = var_of[&(*uuid, i)];
                    let b = var_of[&(*uuid, j)];
                    formula.add_clause(&[!a, !b]);
                }
            }
        }

        // Selecting (uuid, v) requires some candidate of every dependency
        // whose version falls inside the compat range recorded for it.
        for (uuid, entries) in &filtered {
            for (i, entry) in entries.iter().enumerate() {
                let me = var_of[&(*uuid, i)];
                for dep_uuid in entry.deps.values() {
                    let range = entry.compat.get(dep_uuid);
                    let mut clause = vec![!me];
                    if let Some(dep_entries) = filtered.get(dep_uuid) {
                        for (j, dep_entry) in dep_entries.iter().enumerate() {
                            let allowed = range.map(|r| r.contains(&dep_entry.version)).unwrap_or(true);
                            if allowed {
                                clause.push(var_of[&(*dep_uuid, j)]);
                            }
                        }
                    }
                    formula.add_clause(&clause);
                }
            }
        }

        // One selector literal per root requirement, so `failed_core` can
        // tell us which roots were actually needed for the UNSAT result.
        let mut selectors: Vec<(Lit, Uuid)> = Vec::new();
        for uuid in &problem.required {
            let selector = formula.new_lit();
            let mut clause = vec![!selector];
            if let Some(entries) = filtered.get(uuid) {
                for i in 0..entries.len() {
                    clause.push(var_of[&(*uuid, i)]);
                }
            }
            formula.add_clause(&clause);
            selectors.push((selector, *uuid));
        }
        let assumptions: Vec<Lit> = selectors.iter().map(|(lit, _)| *lit).collect();

        let mut solver = Solver::new();
        solver.add_formula(&formula);
        solver.assume(&assumptions);
        match solver.solve() {
            Ok(true) => {}
            Ok(false) => {
                let core = solver
                    .failed_core()
                    .map(|lits| lits.to_vec())
                    .unwrap_or_default();
                return Outcome::Unsat(build_conflict_core(problem, &selectors, &core));
            }
            Err(_) => return Outcome::Unknown,
        }

        // Greedily maximize each package's version in a stable order:
        // highest satisfying version wins per package.
        let mut committed = assumptions;
        let mut chosen: BTreeMap<Uuid, usize> = BTreeMap::new();
        for (uuid, entries) in &filtered {
            if Instant::now() >= deadline {
                return Outcome::Unknown;
            }
            let mut picked = None;
            for i in 0..entries.len() {
                let lit = var_of[&(*uuid, i)];
                let mut attempt = committed.clone();
                attempt.push(lit);
                solver.assume(&attempt);
                match solver.solve() {
                    Ok(true) => {
                        picked = Some((i, lit));
                        break;
                    }
                    Ok(false) => continue,
                    Err(_) => return Outcome::Unknown,
                }
            }
            if let Some((i, lit)) = picked {
                committed.push(lit);
                chosen.insert(*uuid, i);
            }
        }

        let mut selected = BTreeMap::new();
        for (uuid, i) in chosen {
            selected.insert(uuid, filtered[&uuid][i].clone());
        }
        Outcome::Sat(selected)
    }
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

fn build_conflict_core(problem: &Problem, selectors: &[(Lit, Uuid)], core: &[Lit]) -> ConflictCore {
    let failed: HashSet<Lit> = core.iter().copied().collect();
    let mut edges = Vec::new();
    let mut root = None;
    for (selector, uuid) in selectors {
        if failed.contains(selector) {
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
    ConflictCore {
        root: root.unwrap_or_else(Uuid::nil),
        edges,
    }
}
