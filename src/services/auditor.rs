use crate::services::scanner::MarkupScanner;
use crate::services::store::TextLibrary;
use crate::types::{ParserConfig, RecordId};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DanglingReference {
    pub source: RecordId,
    pub target: RecordId,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AuditReport {
    pub texts_checked: usize,
    pub references_checked: usize,
    pub dangling: Vec<DanglingReference>,
    /// Each cycle starts at its smallest record id.
    pub cycles: Vec<Vec<RecordId>>,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.dangling.is_empty() && self.cycles.is_empty()
    }
}

/// Checks the reference graph of a text library.
pub struct LibraryAuditor {
    scanner: MarkupScanner,
}

impl LibraryAuditor {
    pub fn new(config: &ParserConfig) -> Self {
        Self {
            scanner: MarkupScanner::new(config),
        }
    }

    pub fn audit(&self, library: &TextLibrary) -> AuditReport {
        info!("Auditing {} texts", library.len());

        let mut report = AuditReport {
            texts_checked: library.len(),
            ..AuditReport::default()
        };
        let mut graph: BTreeMap<RecordId, Vec<RecordId>> = BTreeMap::new();

        for text in library.texts() {
            let mut targets = self.scanner.referenced_ids(&text.body);
            targets.sort_unstable();
            targets.dedup();
            report.references_checked += targets.len();

            let mut edges = Vec::new();
            for target in targets {
                if library.get(target).is_some() {
                    edges.push(target);
                } else {
                    warn!("RID={} references missing RID={}", text.rid, target);
                    report.dangling.push(DanglingReference {
                        source: text.rid,
                        target,
                    });
                }
            }
            graph.insert(text.rid, edges);
        }

        report.cycles = find_cycles(&graph);
        for cycle in &report.cycles {
            warn!("Reference cycle: {:?}", cycle);
        }
        debug!(
            "Audit finished: {} dangling, {} cycles",
            report.dangling.len(),
            report.cycles.len()
        );

        report
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Active,
    Done,
}

/// Iterative DFS; reports the cycle closed by every back edge.
fn find_cycles(graph: &BTreeMap<RecordId, Vec<RecordId>>) -> Vec<Vec<RecordId>> {
    let mut marks: HashMap<RecordId, Mark> = HashMap::new();
    let mut cycles = BTreeSet::new();

    for &root in graph.keys() {
        if marks.contains_key(&root) {
            continue;
        }

        let mut path = vec![root];
        let mut cursors = vec![0usize];
        marks.insert(root, Mark::Active);

        loop {
            let Some(&node) = path.last() else { break };
            let Some(cursor) = cursors.last_mut() else { break };
            let edges = graph.get(&node).map(Vec::as_slice).unwrap_or(&[]);

            match edges.get(*cursor) {
                Some(&next) => {
                    *cursor += 1;
                    match marks.get(&next) {
                        None => {
                            marks.insert(next, Mark::Active);
                            path.push(next);
                            cursors.push(0);
                        }
                        Some(Mark::Active) => {
                            let start = path.iter().position(|&n| n == next).unwrap_or(0);
                            cycles.insert(canonical_cycle(&path[start..]));
                        }
                        Some(Mark::Done) => {}
                    }
                }
                None => {
                    marks.insert(node, Mark::Done);
                    path.pop();
                    cursors.pop();
                }
            }
        }
    }

    cycles.into_iter().collect()
}

fn canonical_cycle(cycle: &[RecordId]) -> Vec<RecordId> {
    let start = cycle
        .iter()
        .enumerate()
        .min_by_key(|(_, rid)| **rid)
        .map_or(0, |(i, _)| i);
    cycle[start..].iter().chain(&cycle[..start]).copied().collect()
}
