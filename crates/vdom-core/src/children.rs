//! Child list reconciliation and native placement.

use hashbrown::HashMap;

use crate::applier::NodeId;
use crate::diff::{Frame, NativeScope, Reconciler};
use crate::element::{Element, Key, NodeRef, RefValue};
use crate::error::{NodeError, RenderError};
use crate::tree::RecordId;

type RefChange = (Option<NodeRef>, Option<NodeRef>, NodeId);

impl Reconciler<'_> {
    /// Reconciles `new_children` against the children recorded under
    /// `parent`. Old records are matched by key, or by position when
    /// neither side is keyed; each old record is reused at most once.
    /// Records left unmatched are unmounted after the whole list is done.
    pub(crate) fn diff_children(
        &mut self,
        scope: &mut NativeScope,
        frame: &Frame,
        parent: RecordId,
        new_children: &[Option<Element>],
    ) -> Result<(), RenderError> {
        let Some(record) = self.tree.get_mut(parent) else {
            return Ok(());
        };
        let old_children = std::mem::take(&mut record.children);
        let (matches, used) = self.match_children(&old_children, new_children);

        let unmatched: Vec<RecordId> = old_children
            .iter()
            .zip(&used)
            .filter_map(|(slot, used)| if *used { None } else { *slot })
            .collect();
        let mut doomed = Vec::new();
        for id in &unmatched {
            for node in self.tree.top_natives(*id) {
                self.doomed.insert(node);
                doomed.push(node);
            }
        }

        let mut next = Vec::with_capacity(new_children.len());
        let mut reused = vec![false; old_children.len()];
        let mut refs: Vec<RefChange> = Vec::new();
        let mut failure = None;
        for (index, slot) in new_children.iter().enumerate() {
            let Some(element) = slot else {
                next.push(None);
                continue;
            };
            let old = matches[index].and_then(|j| {
                reused[j] = true;
                old_children[j]
            });
            let old_ref = old
                .and_then(|id| self.tree.get(id))
                .filter(|record| record.native.is_some())
                .and_then(|record| record.element.get_ref().cloned());
            let id = self.claim_record(frame, old, element, scope.parent);
            next.push(Some(id));
            if let Err(err) = self.diff(scope, frame, id, element) {
                failure = Some(err);
                break;
            }
            if element.kind().is_native() && old_ref.as_ref() != element.get_ref() {
                if let Some(node) = self.tree.get(id).and_then(|record| record.native) {
                    refs.push((old_ref, element.get_ref().cloned(), node));
                }
            }
        }

        if let Some(err) = failure {
            // Keep every record reachable; nothing is unmounted mid-failure.
            next.extend(
                old_children
                    .iter()
                    .zip(&reused)
                    .filter_map(|(slot, reused)| if *reused { None } else { slot.map(Some) }),
            );
            self.set_children(parent, next);
            for node in doomed {
                self.doomed.remove(&node);
            }
            return Err(err);
        }

        self.set_children(parent, next);
        for id in unmatched {
            self.unmount(id, false)?;
        }
        for node in doomed {
            self.doomed.remove(&node);
        }
        for (old_ref, new_ref, node) in refs {
            if let Some(old_ref) = old_ref {
                old_ref.set(None);
            }
            if let Some(new_ref) = new_ref {
                new_ref.set(Some(RefValue::Node(node)));
            }
        }
        Ok(())
    }

    fn set_children(&mut self, parent: RecordId, children: Vec<Option<RecordId>>) {
        if let Some(record) = self.tree.get_mut(parent) {
            record.children = children;
        }
    }

    /// For each new child, the index of the old child it reuses, plus a
    /// flag per old child telling whether it was claimed.
    fn match_children(
        &self,
        old: &[Option<RecordId>],
        new: &[Option<Element>],
    ) -> (Vec<Option<usize>>, Vec<bool>) {
        let old_elements: Vec<Option<&Element>> = old
            .iter()
            .map(|slot| slot.and_then(|id| self.tree.get(id)).map(|record| &record.element))
            .collect();
        let mut keyed: HashMap<&Key, usize> = HashMap::new();
        for (index, element) in old_elements.iter().enumerate() {
            if let Some(key) = element.and_then(Element::get_key) {
                keyed.entry(key).or_insert(index);
            }
        }

        let mut used = vec![false; old.len()];
        let matches = new
            .iter()
            .enumerate()
            .map(|(index, slot)| {
                let element = slot.as_ref()?;
                let candidate = match element.get_key() {
                    Some(key) => keyed.get(key).copied()?,
                    None => {
                        let positional = old_elements.get(index).copied().flatten()?;
                        if positional.get_key().is_some() {
                            return None;
                        }
                        index
                    }
                };
                let previous = old_elements[candidate]?;
                if used[candidate] || !previous.kind().same_type(element.kind()) {
                    return None;
                }
                used[candidate] = true;
                Some(candidate)
            })
            .collect();
        (matches, used)
    }

    /// Moves `node` to the cursor unless it already sits there.
    pub(crate) fn place(&mut self, scope: &mut NativeScope, node: NodeId) -> Result<(), NodeError> {
        self.skip_doomed(scope);
        if scope.cursor == Some(node) {
            scope.cursor = self.applier.next_sibling(node);
            return Ok(());
        }
        self.applier.insert_before(scope.parent, node, scope.cursor)
    }

    /// Places the existing top-level natives of a subtree that was not
    /// re-rendered.
    pub(crate) fn place_subtree(&mut self, scope: &mut NativeScope, id: RecordId) -> Result<(), NodeError> {
        for node in self.tree.top_natives(id) {
            self.place(scope, node)?;
        }
        Ok(())
    }

    fn skip_doomed(&self, scope: &mut NativeScope) {
        while let Some(cursor) = scope.cursor {
            if !self.doomed.contains(&cursor) {
                break;
            }
            scope.cursor = self.applier.next_sibling(cursor);
        }
    }
}
