//! Budgeted breadth-first context expansion from externally retrieved seeds.
use crate::chunk::ChunkId;
use crate::error::Warning;
use crate::generation::Generation;
use crate::graph::resolver::Link;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, warn};

/// Which edges expansion follows from a frontier chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// What the chunk calls or imports.
    #[default]
    Outgoing,
    /// What calls or imports the chunk.
    Incoming,
    Both,
}

impl Direction {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "outgoing" => Some(Direction::Outgoing),
            "incoming" => Some(Direction::Incoming),
            "both" => Some(Direction::Both),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleEntry {
    pub chunk_id: ChunkId,
    /// 0 for seeds.
    pub hop: usize,
    /// Seeds this entry was reached from, best ranked first.
    pub reached_by: Vec<ChunkId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextBundle {
    pub generation_id: u64,
    pub entries: Vec<BundleEntry>,
    pub warnings: Vec<Warning>,
}

#[derive(Default)]
struct Candidate {
    seeds: BTreeSet<usize>,
    in_degree: usize,
}

/// Expand along outgoing edges.
pub fn expand(
    generation: &Generation,
    seeds: &[ChunkId],
    max_chunks: usize,
    max_hops: usize,
) -> ContextBundle {
    expand_with(generation, seeds, max_chunks, max_hops, Direction::Outgoing)
}

/// Seeds come first in their given order. Each further hop ranks newly
/// reachable chunks by best seed rank, then by how many frontier chunks
/// link to them, then by (path, start), and admits them until
/// `max_chunks` non-seed entries are in the bundle.
pub fn expand_with(
    generation: &Generation,
    seeds: &[ChunkId],
    max_chunks: usize,
    max_hops: usize,
    direction: Direction,
) -> ContextBundle {
    let mut entries: Vec<BundleEntry> = Vec::new();
    let mut warnings = Vec::new();
    let mut in_bundle: HashSet<ChunkId> = HashSet::new();
    // Seed ranks reaching each admitted chunk, by ChunkId.
    let mut origin: HashMap<ChunkId, BTreeSet<usize>> = HashMap::new();

    let mut frontier: Vec<ChunkId> = Vec::new();
    for (rank, seed) in seeds.iter().enumerate() {
        if !generation.contains(seed) {
            warn!(chunk_id = %seed, generation = generation.id, "seed not in live generation");
            warnings.push(Warning::MissingChunk {
                chunk_id: seed.clone(),
            });
            continue;
        }
        if !in_bundle.insert(seed.clone()) {
            continue;
        }
        origin.insert(seed.clone(), BTreeSet::from([rank]));
        frontier.push(seed.clone());
        entries.push(BundleEntry {
            chunk_id: seed.clone(),
            hop: 0,
            reached_by: vec![seed.clone()],
        });
    }

    let mut admitted = 0;
    for hop in 1..=max_hops {
        if admitted >= max_chunks || frontier.is_empty() {
            break;
        }

        let mut candidates: HashMap<ChunkId, Candidate> = HashMap::new();
        for source in &frontier {
            let source_seeds = origin.get(source).cloned().unwrap_or_default();
            let linked: BTreeSet<&ChunkId> = neighbours(generation, source, direction)
                .filter(|id| !in_bundle.contains(*id) && generation.contains(id))
                .collect();
            for id in linked {
                let candidate = candidates.entry(id.clone()).or_default();
                candidate.in_degree += 1;
                candidate.seeds.extend(source_seeds.iter().copied());
            }
        }

        let mut ranked: Vec<(ChunkId, Candidate)> = candidates.into_iter().collect();
        ranked.sort_by_cached_key(|(id, c)| {
            let position = generation
                .get(id)
                .map(|chunk| (chunk.path.clone(), chunk.span.start_byte));
            (
                c.seeds.first().copied().unwrap_or(usize::MAX),
                Reverse(c.in_degree),
                position,
            )
        });

        let mut next = Vec::new();
        for (id, candidate) in ranked {
            if admitted >= max_chunks {
                break;
            }
            in_bundle.insert(id.clone());
            entries.push(BundleEntry {
                chunk_id: id.clone(),
                hop,
                reached_by: candidate.seeds.iter().map(|&r| seeds[r].clone()).collect(),
            });
            origin.insert(id.clone(), candidate.seeds);
            next.push(id);
            admitted += 1;
        }
        frontier = next;
    }

    debug!(
        generation = generation.id,
        entries = entries.len(),
        warnings = warnings.len(),
        "Expanded context"
    );

    ContextBundle {
        generation_id: generation.id,
        entries,
        warnings,
    }
}

fn neighbours<'g>(
    generation: &'g Generation,
    id: &ChunkId,
    direction: Direction,
) -> impl Iterator<Item = &'g ChunkId> {
    let relations = generation.relations();
    let outgoing: &[Link] = match direction {
        Direction::Outgoing | Direction::Both => relations.outgoing(id),
        Direction::Incoming => &[],
    };
    let incoming: &[Link] = match direction {
        Direction::Incoming | Direction::Both => relations.incoming(id),
        Direction::Outgoing => &[],
    };
    outgoing.iter().chain(incoming).map(|link| &link.chunk)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::SourceFile;
    use crate::config::IngestConfig;
    use crate::indexer::strategy::StrategyTable;

    fn generation(files: &[(&str, &str)]) -> Generation {
        let table = StrategyTable::new().unwrap();
        let chunks = files
            .iter()
            .flat_map(|(path, text)| {
                table
                    .extract(&SourceFile::new(*path, *text), &IngestConfig::default())
                    .unwrap()
                    .chunks
            })
            .collect();
        Generation::build(7, chunks, Vec::new())
    }

    fn ids(bundle: &ContextBundle) -> Vec<(&str, usize)> {
        bundle
            .entries
            .iter()
            .map(|e| (e.chunk_id.as_str(), e.hop))
            .collect()
    }

    const CHAIN: &str = "def a():\n    b()\n\ndef b():\n    c()\n\ndef c():\n    d()\n\ndef d():\n    pass\n";

    #[test]
    fn test_helper_is_pulled_in() {
        let g = generation(&[(
            "foo.py",
            "def helper():\n    return 1\n\ndef bar():\n    return helper()\n",
        )]);
        let bundle = expand(&g, &[ChunkId::from("foo.py:1")], 5, 1);
        assert_eq!(ids(&bundle), vec![("foo.py:1", 0), ("foo.py:0", 1)]);
        assert_eq!(bundle.entries[1].reached_by, vec![ChunkId::from("foo.py:1")]);
        assert_eq!(bundle.generation_id, 7);
        assert!(bundle.warnings.is_empty());
    }

    #[test]
    fn test_hops_are_bounded() {
        let g = generation(&[("chain.py", CHAIN)]);
        let bundle = expand(&g, &[ChunkId::from("chain.py:0")], 10, 2);
        assert_eq!(
            ids(&bundle),
            vec![("chain.py:0", 0), ("chain.py:1", 1), ("chain.py:2", 2)]
        );
    }

    #[test]
    fn test_budget_is_bounded() {
        let g = generation(&[("chain.py", CHAIN)]);
        let bundle = expand(&g, &[ChunkId::from("chain.py:0")], 1, 5);
        assert_eq!(ids(&bundle), vec![("chain.py:0", 0), ("chain.py:1", 1)]);

        let seeds_only = expand(&g, &[ChunkId::from("chain.py:0")], 0, 5);
        assert_eq!(seeds_only.entries.len(), 1);
    }

    #[test]
    fn test_in_degree_orders_candidates() {
        // x and y both reach shared; only x reaches lone.
        let g = generation(&[(
            "m.py",
            "def lone():\n    pass\n\ndef shared():\n    pass\n\ndef x():\n    lone()\n    shared()\n\ndef y():\n    shared()\n",
        )]);
        let bundle = expand(&g, &[ChunkId::from("m.py:2"), ChunkId::from("m.py:3")], 1, 1);
        // Both candidates carry seed rank 0 via x; shared wins on in-degree.
        assert_eq!(ids(&bundle)[2], ("m.py:1", 1));
        assert_eq!(
            bundle.entries[2].reached_by,
            vec![ChunkId::from("m.py:2"), ChunkId::from("m.py:3")]
        );
    }

    #[test]
    fn test_seed_rank_beats_position() {
        let g = generation(&[(
            "m.py",
            "def first_target():\n    pass\n\ndef second_target():\n    pass\n\ndef x():\n    second_target()\n\ndef y():\n    first_target()\n",
        )]);
        let bundle = expand(&g, &[ChunkId::from("m.py:2"), ChunkId::from("m.py:3")], 2, 1);
        assert_eq!(
            ids(&bundle),
            vec![("m.py:2", 0), ("m.py:3", 0), ("m.py:1", 1), ("m.py:0", 1)]
        );
    }

    #[test]
    fn test_missing_and_duplicate_seeds() {
        let g = generation(&[("chain.py", CHAIN)]);
        let seeds = [
            ChunkId::from("gone.py:3"),
            ChunkId::from("chain.py:3"),
            ChunkId::from("chain.py:3"),
        ];
        let bundle = expand(&g, &seeds, 5, 2);
        assert_eq!(ids(&bundle), vec![("chain.py:3", 0)]);
        assert_eq!(
            bundle.warnings,
            vec![Warning::MissingChunk {
                chunk_id: ChunkId::from("gone.py:3")
            }]
        );
    }

    #[test]
    fn test_incoming_direction() {
        let g = generation(&[("chain.py", CHAIN)]);
        let bundle = expand_with(&g, &[ChunkId::from("chain.py:3")], 5, 1, Direction::Incoming);
        assert_eq!(ids(&bundle), vec![("chain.py:3", 0), ("chain.py:2", 1)]);

        let both = expand_with(&g, &[ChunkId::from("chain.py:1")], 5, 1, Direction::Both);
        assert_eq!(
            ids(&both),
            vec![("chain.py:1", 0), ("chain.py:0", 1), ("chain.py:2", 1)]
        );
    }

    #[test]
    fn test_no_duplicates_on_cycles() {
        let g = generation(&[("loop.py", "def a():\n    b()\n\ndef b():\n    a()\n")]);
        let bundle = expand(&g, &[ChunkId::from("loop.py:0")], 10, 5);
        assert_eq!(ids(&bundle), vec![("loop.py:0", 0), ("loop.py:1", 1)]);
    }

    #[test]
    fn test_expansion_is_deterministic() {
        let g = generation(&[("chain.py", CHAIN)]);
        let seeds = [ChunkId::from("chain.py:1"), ChunkId::from("chain.py:0")];
        assert_eq!(
            expand_with(&g, &seeds, 3, 3, Direction::Both),
            expand_with(&g, &seeds, 3, 3, Direction::Both)
        );
    }
}
