use crate::chunk::{Chunk, ChunkId, last_segment};
use std::collections::{BTreeMap, HashMap};

/// Every declared name in a chunk set, looked up by qualified or local name.
///
/// Lists keep every declaring chunk in ascending (path, start) order;
/// a repeated name never overwrites an earlier one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefinitionIndex {
    qualified: BTreeMap<String, Vec<ChunkId>>,
    local: BTreeMap<String, Vec<ChunkId>>,
}

impl DefinitionIndex {
    pub fn build(chunks: &[Chunk]) -> Self {
        let mut ordered: Vec<&Chunk> = chunks.iter().collect();
        ordered.sort_by(|a, b| a.position_key().cmp(&b.position_key()));

        let mut index = Self::default();
        for chunk in ordered {
            if chunk.qualified_name.is_empty() {
                continue;
            }
            index.insert(&chunk.qualified_name, chunk.local_name(), &chunk.id);
            for member in &chunk.members {
                let qualified = format!("{}.{member}", chunk.qualified_name);
                index.insert(&qualified, member, &chunk.id);
            }
        }
        index
    }

    /// Rebuild from persisted `(qualified_name, chunk_id)` pairs.
    ///
    /// Local names are the last segment of each qualified name; `chunks`
    /// supplies the positions that order the local lists.
    pub fn from_entries(entries: Vec<(String, ChunkId)>, chunks: &[Chunk]) -> Self {
        let positions: HashMap<&ChunkId, (&str, usize)> =
            chunks.iter().map(|c| (&c.id, c.position_key())).collect();

        let mut index = Self::default();
        for (qualified, id) in &entries {
            index.insert(qualified, last_segment(qualified), id);
        }
        for ids in index.local.values_mut() {
            ids.sort_by_key(|id| positions.get(id).copied());
            ids.dedup();
        }
        index
    }

    fn insert(&mut self, qualified: &str, local: &str, id: &ChunkId) {
        push_unique(self.qualified.entry(qualified.to_string()).or_default(), id);
        push_unique(self.local.entry(local.to_string()).or_default(), id);
    }

    pub fn by_qualified(&self, name: &str) -> &[ChunkId] {
        self.qualified.get(name).map_or(&[], Vec::as_slice)
    }

    pub fn by_local(&self, name: &str) -> &[ChunkId] {
        self.local.get(name).map_or(&[], Vec::as_slice)
    }

    /// Number of distinct qualified names.
    pub fn len(&self) -> usize {
        self.qualified.len()
    }

    pub fn is_empty(&self) -> bool {
        self.qualified.is_empty()
    }

    /// `(qualified_name, chunk_id)` pairs in name order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &ChunkId)> {
        self.qualified
            .iter()
            .flat_map(|(name, ids)| ids.iter().map(move |id| (name.as_str(), id)))
    }
}

// A class and one of its members may share a local name.
fn push_unique(ids: &mut Vec<ChunkId>, id: &ChunkId) {
    if ids.last() != Some(id) {
        ids.push(id.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::SourceFile;
    use crate::config::IngestConfig;
    use crate::indexer::strategy::StrategyTable;

    fn chunks(files: &[(&str, &str)]) -> Vec<Chunk> {
        let table = StrategyTable::new().unwrap();
        files
            .iter()
            .flat_map(|(path, text)| {
                table
                    .extract(&SourceFile::new(*path, *text), &IngestConfig::default())
                    .unwrap()
                    .chunks
            })
            .collect()
    }

    #[test]
    fn test_qualified_and_local_lookup() {
        let set = chunks(&[("pkg/foo.py", "def helper():\n    pass\n")]);
        let index = DefinitionIndex::build(&set);

        assert_eq!(index.by_qualified("pkg.foo.helper"), &[set[0].id.clone()]);
        assert_eq!(index.by_local("helper"), &[set[0].id.clone()]);
        assert!(index.by_local("missing").is_empty());
    }

    #[test]
    fn test_duplicates_kept_in_position_order() {
        let mut set = chunks(&[
            ("b.py", "def helper():\n    pass\n"),
            ("a.py", "def helper():\n    pass\n"),
        ]);
        let index = DefinitionIndex::build(&set);
        let ids: Vec<&str> = index.by_local("helper").iter().map(|i| i.as_str()).collect();
        assert_eq!(ids, vec!["a.py:0", "b.py:0"]);

        set.reverse();
        assert_eq!(DefinitionIndex::build(&set), index);
    }

    #[test]
    fn test_members_are_indexed() {
        let set = chunks(&[(
            "shapes.py",
            "class Square:\n    def area(self):\n        return 4\n",
        )]);
        let index = DefinitionIndex::build(&set);
        assert_eq!(index.by_local("area"), &[set[0].id.clone()]);
        assert_eq!(index.by_qualified("shapes.Square.area"), &[set[0].id.clone()]);
    }

    #[test]
    fn test_rebuild_from_entries() {
        let set = chunks(&[
            ("b.py", "def helper():\n    pass\n"),
            ("a.py", "class Box:\n    def helper(self):\n        pass\n"),
        ]);
        let index = DefinitionIndex::build(&set);
        let entries: Vec<(String, ChunkId)> = index
            .entries()
            .map(|(name, id)| (name.to_string(), id.clone()))
            .collect();
        assert_eq!(DefinitionIndex::from_entries(entries, &set), index);
    }

    #[test]
    fn test_line_blocks_declare_nothing() {
        let set = chunks(&[("notes.txt", "helper()\n")]);
        assert!(DefinitionIndex::build(&set).is_empty());
    }
}
