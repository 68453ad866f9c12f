//! Item slot records

use serde::{Deserialize, Serialize};

/// One item entry within a vault, addressed by its slot index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemSlot {
    /// Position of the item inside the vault
    pub slot: u16,
    /// Item type identifier
    pub id: i32,
    /// Metadata / damage value
    pub meta: i32,
    /// Stack size
    pub count: u8,
    /// Opaque auxiliary tag data (enchantments, custom names, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aux_tag: Option<Vec<u8>>,
}

impl ItemSlot {
    /// Create a slot without auxiliary data
    pub fn new(slot: u16, id: i32, meta: i32, count: u8) -> Self {
        Self {
            slot,
            id,
            meta,
            count,
            aux_tag: None,
        }
    }

    /// Attach an auxiliary tag blob
    pub fn with_aux_tag(mut self, aux_tag: impl Into<Vec<u8>>) -> Self {
        self.aux_tag = Some(aux_tag.into());
        self
    }

    /// Empty stacks and air (id 0) occupy no slot when stored
    pub fn is_empty(&self) -> bool {
        self.count == 0 || self.id == 0
    }
}
