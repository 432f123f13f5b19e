//! Arena of runtime records mirroring the last rendered element tree.

use std::rc::Rc;

use crate::applier::NodeId;
use crate::element::Element;
use crate::instance::ComponentInstance;

/// Generational handle to a [`Record`]. Handles to removed records never
/// resolve again, even after the slot is reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId {
    index: u32,
    generation: u32,
}

/// What the reconciler remembers about one rendered element.
pub(crate) struct Record {
    /// Element this record was last rendered from.
    pub(crate) element: Element,
    pub(crate) native: Option<NodeId>,
    pub(crate) children: Vec<Option<RecordId>>,
    pub(crate) instance: Option<Rc<ComponentInstance>>,
    pub(crate) parent: Option<RecordId>,
    /// Native node the record's top-level natives live under.
    pub(crate) parent_native: NodeId,
    pub(crate) depth: usize,
    pub(crate) svg: bool,
}

impl Record {
    pub(crate) fn new(
        element: Element,
        parent: Option<RecordId>,
        parent_native: NodeId,
        depth: usize,
        svg: bool,
    ) -> Self {
        Self {
            element,
            native: None,
            children: Vec::new(),
            instance: None,
            parent,
            parent_native,
            depth,
            svg,
        }
    }
}

struct Slot {
    generation: u32,
    record: Option<Record>,
}

#[derive(Default)]
pub(crate) struct Tree {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl Tree {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, record: Record) -> RecordId {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.generation = slot.generation.wrapping_add(1);
            slot.record = Some(record);
            return RecordId {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            record: Some(record),
        });
        RecordId { index, generation: 0 }
    }

    pub(crate) fn get(&self, id: RecordId) -> Option<&Record> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.record.as_ref())
    }

    pub(crate) fn get_mut(&mut self, id: RecordId) -> Option<&mut Record> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.record.as_mut())
    }

    pub(crate) fn remove(&mut self, id: RecordId) -> Option<Record> {
        let slot = self
            .slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)?;
        let record = slot.record.take()?;
        self.free.push(id.index);
        self.live -= 1;
        Some(record)
    }

    pub(crate) fn len(&self) -> usize {
        self.live
    }

    /// Native nodes of `id`'s subtree that sit directly under its parent
    /// native, in document order.
    pub(crate) fn top_natives(&self, id: RecordId) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_top_natives(id, &mut out);
        out
    }

    fn collect_top_natives(&self, id: RecordId, out: &mut Vec<NodeId>) {
        let Some(record) = self.get(id) else {
            return;
        };
        if let Some(native) = record.native {
            out.push(native);
            return;
        }
        for child in record.children.iter().flatten() {
            self.collect_top_natives(*child, out);
        }
    }

    pub(crate) fn first_native(&self, id: RecordId) -> Option<NodeId> {
        let record = self.get(id)?;
        if record.native.is_some() {
            return record.native;
        }
        record
            .children
            .iter()
            .flatten()
            .find_map(|child| self.first_native(*child))
    }

    /// First native node rendered after `id`'s subtree under the same
    /// native parent.
    pub(crate) fn next_native_sibling(&self, id: RecordId) -> Option<NodeId> {
        let mut current = id;
        loop {
            let parent_id = self.get(current)?.parent?;
            let parent = self.get(parent_id)?;
            let position = parent
                .children
                .iter()
                .position(|child| *child == Some(current))?;
            let found = parent.children[position + 1..]
                .iter()
                .flatten()
                .find_map(|sibling| self.first_native(*sibling));
            if found.is_some() {
                return found;
            }
            if parent.native.is_some() {
                return None;
            }
            current = parent_id;
        }
    }
}
