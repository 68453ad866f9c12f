//! Vault identity and in-memory vault contents

use crate::core::error::{Error, Result};
use crate::types::ItemSlot;
use crate::vault::LockToken;
use std::collections::BTreeMap;
use std::fmt;

/// Number of slots in a vault unless configured otherwise (a double chest)
pub const DEFAULT_VAULT_CAPACITY: u16 = 54;

/// Longest accepted player identity
pub const MAX_PLAYER_NAME_LEN: usize = 64;

/// Identifies one vault: a case-normalized player identity plus a vault number.
///
/// The player identity doubles as a file name for the document backends, so
/// construction rejects anything that could escape the vault directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VaultKey {
    player: String,
    number: u32,
}

impl VaultKey {
    /// Build a key, lower-casing and trimming the player identity
    pub fn new(player: impl AsRef<str>, number: u32) -> Result<Self> {
        let player = player.as_ref().trim().to_lowercase();
        Self::validate_player(&player)?;
        if number == 0 {
            return Err(Error::invalid_input("vault numbers start at 1"));
        }
        Ok(Self { player, number })
    }

    fn validate_player(player: &str) -> Result<()> {
        if player.is_empty() {
            return Err(Error::invalid_input("player identity is empty"));
        }
        if player.chars().count() > MAX_PLAYER_NAME_LEN {
            return Err(Error::invalid_input(format!(
                "player identity longer than {} characters",
                MAX_PLAYER_NAME_LEN
            )));
        }
        if player == "." || player == ".." {
            return Err(Error::invalid_input("player identity may not be a relative path"));
        }
        if player
            .chars()
            .any(|c| c == '/' || c == '\\' || c.is_control())
        {
            return Err(Error::invalid_input(format!(
                "player identity {:?} contains a path separator or control character",
                player
            )));
        }
        Ok(())
    }

    /// Normalized player identity
    pub fn player(&self) -> &str {
        &self.player
    }

    /// Vault number (1-based)
    pub fn number(&self) -> u32 {
        self.number
    }
}

impl fmt::Display for VaultKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.player, self.number)
    }
}

/// A vault's contents as materialized by `open`.
///
/// The record remembers the lock token it was opened under; `save` uses it to
/// prove the caller still owns the key.
#[derive(Debug, Clone, PartialEq)]
pub struct VaultRecord {
    key: VaultKey,
    viewer: String,
    title: String,
    capacity: u16,
    slots: BTreeMap<u16, ItemSlot>,
    lock: Option<LockToken>,
}

impl VaultRecord {
    /// Create an empty, unlocked record
    pub fn new(key: VaultKey, capacity: u16) -> Self {
        let viewer = key.player().to_string();
        Self {
            key,
            viewer,
            title: String::new(),
            capacity,
            slots: BTreeMap::new(),
            lock: None,
        }
    }

    /// Fill the record from decoded slots.
    ///
    /// Slots outside the capacity and repeated indices are dropped; the number
    /// of dropped slots is returned.
    pub(crate) fn load(&mut self, slots: Vec<ItemSlot>) -> usize {
        let mut dropped = 0;
        for item in slots {
            if item.slot >= self.capacity || self.slots.contains_key(&item.slot) {
                dropped += 1;
                continue;
            }
            self.slots.insert(item.slot, item);
        }
        dropped
    }

    pub(crate) fn with_viewer(mut self, viewer: impl Into<String>) -> Self {
        self.viewer = viewer.into();
        self
    }

    pub(crate) fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub(crate) fn with_lock(mut self, token: LockToken) -> Self {
        self.lock = Some(token);
        self
    }

    /// Vault this record belongs to
    pub fn key(&self) -> &VaultKey {
        &self.key
    }

    /// Identity of whoever is looking at the vault
    pub fn viewer(&self) -> &str {
        &self.viewer
    }

    /// Display title rendered from the configured template
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Maximum number of slots
    pub fn capacity(&self) -> u16 {
        self.capacity
    }

    /// Lock token the record was opened under, if any
    pub fn lock_token(&self) -> Option<&LockToken> {
        self.lock.as_ref()
    }

    /// Item in `slot`, if occupied
    pub fn get(&self, slot: u16) -> Option<&ItemSlot> {
        self.slots.get(&slot)
    }

    /// Put an item into its slot, returning the previous occupant.
    ///
    /// Setting an empty item clears the slot.
    pub fn set(&mut self, item: ItemSlot) -> Result<Option<ItemSlot>> {
        if item.slot >= self.capacity {
            return Err(Error::invalid_input(format!(
                "slot {} is outside vault capacity {}",
                item.slot, self.capacity
            )));
        }
        if item.is_empty() {
            return Ok(self.slots.remove(&item.slot));
        }
        Ok(self.slots.insert(item.slot, item))
    }

    /// Clear one slot
    pub fn remove(&mut self, slot: u16) -> Option<ItemSlot> {
        self.slots.remove(&slot)
    }

    /// Replace every slot at once
    pub fn set_contents(&mut self, items: impl IntoIterator<Item = ItemSlot>) -> Result<()> {
        let mut next = BTreeMap::new();
        for item in items {
            if item.slot >= self.capacity {
                return Err(Error::invalid_input(format!(
                    "slot {} is outside vault capacity {}",
                    item.slot, self.capacity
                )));
            }
            if next.contains_key(&item.slot) {
                return Err(Error::invalid_input(format!("slot {} given twice", item.slot)));
            }
            if !item.is_empty() {
                next.insert(item.slot, item);
            }
        }
        self.slots = next;
        Ok(())
    }

    /// Remove every item
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Occupied slots in slot order
    pub fn slots(&self) -> impl Iterator<Item = &ItemSlot> {
        self.slots.values()
    }

    /// Owned copy of the occupied slots in slot order
    pub fn contents(&self) -> Vec<ItemSlot> {
        self.slots.values().cloned().collect()
    }

    /// Number of occupied slots
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True if no slot is occupied
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
