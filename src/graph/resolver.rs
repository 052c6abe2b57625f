//! Second pass: resolve each chunk's raw references against the frozen
//! definition index.
use super::definitions::DefinitionIndex;
use crate::chunk::{Chunk, ChunkId, Reference, RelationType};
use crate::error::Warning;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

/// A resolved relation between two chunks of the same generation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub source: ChunkId,
    pub target: ChunkId,
    pub kind: RelationType,
}

/// One end of an edge as seen from the other end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub chunk: ChunkId,
    pub kind: RelationType,
}

/// Forward and reverse adjacency over a deduplicated edge set.
#[derive(Debug, Clone, Default)]
pub struct RelationshipIndex {
    edges: Vec<Edge>,
    outgoing: HashMap<ChunkId, Vec<Link>>,
    incoming: HashMap<ChunkId, Vec<Link>>,
    unresolved: Vec<Warning>,
}

impl RelationshipIndex {
    pub fn from_edges(mut edges: Vec<Edge>, unresolved: Vec<Warning>) -> Self {
        edges.sort();
        edges.dedup();

        let mut outgoing: HashMap<ChunkId, Vec<Link>> = HashMap::new();
        let mut incoming: HashMap<ChunkId, Vec<Link>> = HashMap::new();
        for edge in &edges {
            outgoing.entry(edge.source.clone()).or_default().push(Link {
                chunk: edge.target.clone(),
                kind: edge.kind,
            });
            incoming.entry(edge.target.clone()).or_default().push(Link {
                chunk: edge.source.clone(),
                kind: edge.kind,
            });
        }

        Self {
            edges,
            outgoing,
            incoming,
            unresolved,
        }
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn outgoing(&self, id: &ChunkId) -> &[Link] {
        self.outgoing.get(id).map_or(&[], Vec::as_slice)
    }

    pub fn incoming(&self, id: &ChunkId) -> &[Link] {
        self.incoming.get(id).map_or(&[], Vec::as_slice)
    }

    /// `UnresolvedReference` warnings, in chunk order.
    pub fn unresolved(&self) -> &[Warning] {
        &self.unresolved
    }
}

/// Resolve every chunk's references; the first matching rule wins:
///
/// 1. exact qualified name
/// 2. local name declared in the same file
/// 3. local name declared in the same directory
/// 4. local name declared anywhere, first in (path, start) order
///
/// Calls only resolve to functions and classes. A reference that matches
/// nothing yields an `UnresolvedReference` warning and no edge.
pub fn resolve(chunks: &[Chunk], definitions: &DefinitionIndex) -> RelationshipIndex {
    let by_id: HashMap<&ChunkId, &Chunk> = chunks.iter().map(|c| (&c.id, c)).collect();

    let per_chunk: Vec<(Vec<Edge>, Vec<Warning>)> = chunks
        .par_iter()
        .map(|chunk| resolve_chunk(chunk, definitions, &by_id))
        .collect();

    let mut edges = Vec::new();
    let mut unresolved = Vec::new();
    for (e, w) in per_chunk {
        edges.extend(e);
        unresolved.extend(w);
    }

    let index = RelationshipIndex::from_edges(edges, unresolved);
    info!(
        edges = index.edges.len(),
        unresolved = index.unresolved.len(),
        "Resolved references"
    );
    index
}

fn resolve_chunk(
    chunk: &Chunk,
    definitions: &DefinitionIndex,
    by_id: &HashMap<&ChunkId, &Chunk>,
) -> (Vec<Edge>, Vec<Warning>) {
    let mut edges = Vec::new();
    let mut warnings = Vec::new();

    for reference in &chunk.references {
        match resolve_reference(chunk, reference, definitions, by_id) {
            Some(target) if target.id == chunk.id => {}
            Some(target) => edges.push(Edge {
                source: chunk.id.clone(),
                target: target.id.clone(),
                kind: reference.kind,
            }),
            None => warnings.push(Warning::UnresolvedReference {
                chunk_id: chunk.id.clone(),
                name: reference.name.clone(),
            }),
        }
    }

    (edges, warnings)
}

fn resolve_reference<'c>(
    chunk: &Chunk,
    reference: &Reference,
    definitions: &DefinitionIndex,
    by_id: &HashMap<&ChunkId, &'c Chunk>,
) -> Option<&'c Chunk> {
    let eligible = |ids: &[ChunkId]| -> Vec<&'c Chunk> {
        ids.iter()
            .filter_map(|id| by_id.get(id).copied())
            .filter(|c| reference.kind != RelationType::Calls || c.kind.is_callable())
            .collect()
    };

    if let Some(exact) = eligible(definitions.by_qualified(&reference.name)).first() {
        return Some(exact);
    }

    let candidates = eligible(definitions.by_local(reference.unqualified()));
    candidates
        .iter()
        .find(|c| c.path == chunk.path)
        .or_else(|| candidates.iter().find(|c| c.directory() == chunk.directory()))
        .or_else(|| candidates.first())
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::SourceFile;
    use crate::config::IngestConfig;
    use crate::indexer::strategy::StrategyTable;

    fn chunks(files: &[(&str, &str)]) -> Vec<Chunk> {
        let table = StrategyTable::new().unwrap();
        let mut out: Vec<Chunk> = files
            .iter()
            .flat_map(|(path, text)| {
                table
                    .extract(&SourceFile::new(*path, *text), &IngestConfig::default())
                    .unwrap()
                    .chunks
            })
            .collect();
        out.sort_by(|a, b| a.position_key().cmp(&b.position_key()));
        out
    }

    fn targets(index: &RelationshipIndex, source: &str) -> Vec<String> {
        index
            .outgoing(&ChunkId::from(source))
            .iter()
            .map(|l| l.chunk.to_string())
            .collect()
    }

    fn run(files: &[(&str, &str)]) -> RelationshipIndex {
        let set = chunks(files);
        resolve(&set, &DefinitionIndex::build(&set))
    }

    #[test]
    fn test_same_file_beats_other_files() {
        let index = run(&[
            ("a/other.py", "def helper():\n    pass\n"),
            ("b/foo.py", "def helper():\n    pass\n\ndef bar():\n    helper()\n"),
        ]);
        assert_eq!(targets(&index, "b/foo.py:1"), vec!["b/foo.py:0"]);
        assert_eq!(index.incoming(&ChunkId::from("b/foo.py:0")).len(), 1);
    }

    #[test]
    fn test_same_directory_beats_anywhere() {
        let index = run(&[
            ("a/util.py", "def helper():\n    pass\n"),
            ("b/util.py", "def helper():\n    pass\n"),
            ("b/main.py", "def run():\n    helper()\n"),
        ]);
        assert_eq!(targets(&index, "b/main.py:0"), vec!["b/util.py:0"]);
    }

    #[test]
    fn test_anywhere_breaks_ties_by_position() {
        let index = run(&[
            ("z/util.py", "def helper():\n    pass\n"),
            ("m/util.py", "def helper():\n    pass\n"),
            ("main.py", "def run():\n    helper()\n"),
        ]);
        assert_eq!(targets(&index, "main.py:0"), vec!["m/util.py:0"]);
    }

    #[test]
    fn test_qualified_match_wins() {
        let index = run(&[
            ("pkg/tools.py", "def helper():\n    pass\n"),
            (
                "main.py",
                "from pkg.tools import helper\n\n\ndef helper():\n    pass\n\ndef run():\n    helper()\n",
            ),
        ]);
        // The call stays local; the import names the other module's definition.
        assert_eq!(targets(&index, "main.py:2"), vec!["main.py:1"]);
        assert!(targets(&index, "main.py:0").contains(&"pkg/tools.py:0".to_string()));
    }

    #[test]
    fn test_unresolved_reference_warns() {
        let index = run(&[("foo.py", "def bar():\n    unknown_fn()\n")]);
        assert!(index.edges().is_empty());
        assert_eq!(
            index.unresolved(),
            &[Warning::UnresolvedReference {
                chunk_id: ChunkId::from("foo.py:0"),
                name: "unknown_fn".to_string(),
            }]
        );
    }

    #[test]
    fn test_recursion_is_not_an_edge() {
        let index = run(&[("fact.py", "def fact(n):\n    return n * fact(n - 1)\n")]);
        assert!(index.edges().is_empty());
        assert!(index.unresolved().is_empty());
    }

    #[test]
    fn test_calls_skip_module_headers() {
        let index = run(&[
            ("helper.py", "X = 1\n"),
            ("main.py", "def run():\n    helper()\n"),
        ]);
        assert!(index.edges().is_empty());
        assert_eq!(index.unresolved().len(), 1);
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let files = [
            ("a.py", "def f():\n    g()\n\ndef g():\n    f()\n"),
            ("b.py", "def h():\n    f()\n    g()\n"),
        ];
        assert_eq!(run(&files).edges(), run(&files).edges());
    }
}
