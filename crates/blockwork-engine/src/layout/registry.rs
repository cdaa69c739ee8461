use indexmap::IndexMap;

use super::block::Block;

/// Owner of all [`Block`] instances for one render pass, keyed by id.
///
/// Iteration follows insertion order, so a fixed configuration sequence
/// always walks blocks the same way.
#[derive(Debug, Default)]
pub struct BlockRegistry {
    blocks: IndexMap<String, Block>,
}

impl BlockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a block, overwriting any previous block under the same id.
    pub fn set(&mut self, id: impl Into<String>, block: Block) {
        self.blocks.insert(id.into(), block);
    }

    pub fn get(&self, id: &str) -> Option<&Block> {
        self.blocks.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Block> {
        self.blocks.get_mut(id)
    }

    pub fn get_or_insert_with(
        &mut self,
        id: &str,
        create: impl FnOnce() -> Block,
    ) -> &mut Block {
        self.blocks.entry(id.to_string()).or_insert_with(create)
    }

    pub fn has(&self, id: &str) -> bool {
        self.blocks.contains_key(id)
    }

    /// True when the block existed.
    pub fn remove(&mut self, id: &str) -> bool {
        self.blocks.shift_remove(id).is_some()
    }

    /// First block, in registry order, whose displayed list contains `id`.
    pub fn get_parent(&self, id: &str) -> Option<&Block> {
        self.blocks.values().find(|block| block.displays(id))
    }

    /// Apply `f` to every (block, id) pair in registry order.
    pub fn each(&self, mut f: impl FnMut(&Block, &str)) {
        for (id, block) in &self.blocks {
            f(block, id);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Block)> {
        self.blocks.iter().map(|(id, block)| (id.as_str(), block))
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.blocks.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}
