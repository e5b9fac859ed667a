use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;

use vc_class::hash::HashMap;

use crate::{ConfigError, ContextId, NodeKind};

// -----------------------------------------------------------------------------
// SlotId

/// Index of a [`ForwardingSlot`] in its [`ReferenceTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(u32);

impl SlotId {
    #[inline]
    const fn index(self) -> usize {
        self.0 as usize
    }
}

// -----------------------------------------------------------------------------
// ForwardingSlot

/// A placeholder for a node that may still be under construction.
///
/// The slot exists as soon as its id is mentioned, so reference steps can point
/// at it before, while, or after the referenced node is built. The target
/// context is patched in once the referenced node has finished building.
#[derive(Debug)]
pub struct ForwardingSlot {
    id: Arc<str>,
    kind: Option<NodeKind>,
    referenced: bool,
    target: Option<ContextId>,
}

impl ForwardingSlot {
    /// The reference id.
    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The kind of the registered node, `None` while unregistered.
    #[inline]
    pub fn kind(&self) -> Option<NodeKind> {
        self.kind
    }

    /// The context the slot forwards to, once fulfilled.
    #[inline]
    pub fn target(&self) -> Option<ContextId> {
        self.target
    }
}

// -----------------------------------------------------------------------------
// ReferenceTable

/// Registry of reference ids, used to build cyclic mappings.
///
/// Compiling a node with an id [`register`]s it *before* its children are
/// compiled, and [`fulfil`]s the slot once the node is complete. A reference
/// met in between, typically one pointing back at an ancestor, only records
/// the slot and never recurses into the node it names.
///
/// [`register`]: Self::register
/// [`fulfil`]: Self::fulfil
#[derive(Debug, Default)]
pub struct ReferenceTable {
    slots: Vec<ForwardingSlot>,
    index: HashMap<Arc<str>, SlotId>,
}

impl ReferenceTable {
    /// Creates an empty table.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot_of(&mut self, id: &str) -> SlotId {
        if let Some(slot) = self.index.get(id) {
            return *slot;
        }
        let id: Arc<str> = Arc::from(id);
        let slot = SlotId(self.slots.len() as u32);
        self.slots.push(ForwardingSlot {
            id: id.clone(),
            kind: None,
            referenced: false,
            target: None,
        });
        self.index.insert(id, slot);
        slot
    }

    /// Registers the node of `kind` under `id`, returning its forwarding slot.
    pub fn register(&mut self, id: &str, kind: NodeKind) -> Result<SlotId, ConfigError> {
        let slot = self.slot_of(id);
        let entry = &mut self.slots[slot.index()];
        if entry.kind.is_some() {
            return Err(ConfigError::DuplicateReference(id.to_string()));
        }
        entry.kind = Some(kind);
        Ok(slot)
    }

    /// Records a reference to `id`, which may be registered later.
    pub(crate) fn demand(&mut self, id: &str) -> SlotId {
        let slot = self.slot_of(id);
        self.slots[slot.index()].referenced = true;
        slot
    }

    /// Returns the slot registered under `id`.
    pub fn resolve(&self, id: &str) -> Result<SlotId, ConfigError> {
        match self.index.get(id) {
            Some(slot) if self.slots[slot.index()].kind.is_some() => Ok(*slot),
            _ => Err(ConfigError::UnresolvedReference(id.to_string())),
        }
    }

    /// Points `slot` at its finished node.
    pub fn fulfil(&mut self, slot: SlotId, target: ContextId) {
        let entry = &mut self.slots[slot.index()];
        debug_assert!(entry.target.is_none(), "slot `{}` fulfilled twice", entry.id);
        entry.target = Some(target);
    }

    /// Checks that every referenced id resolves to a fulfilled, non-attribute slot.
    pub fn verify(&self) -> Result<(), ConfigError> {
        for slot in self.slots.iter().filter(|s| s.referenced) {
            let id = || String::from(&*slot.id);
            match slot.kind {
                None => return Err(ConfigError::UnresolvedReference(id())),
                Some(kind) if kind.is_attribute() => {
                    return Err(ConfigError::ReferenceToAttribute(id()));
                }
                Some(_) if slot.target.is_none() => {
                    return Err(ConfigError::UnfulfilledReference(id()));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Returns the slot at `slot`.
    #[inline]
    pub fn get(&self, slot: SlotId) -> &ForwardingSlot {
        &self.slots[slot.index()]
    }

    /// Returns the number of slots, referenced or registered.
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if no id was ever mentioned.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
