//! Single-element reconciliation.
//!
//! A [`Reconciler`] compares one element against the record produced by
//! the previous render and issues the minimal set of native mutations.
//! Native placement is cursor based: every native node that belongs under
//! a parent is either already at the cursor (the cursor advances) or gets
//! inserted before it. Components and fragments share the cursor of the
//! native parent they render into.

use std::cell::RefCell;
use std::rc::Rc;

use hashbrown::HashSet;

use crate::applier::{Applier, NativeKind, NodeId};
use crate::component::ComponentType;
use crate::context::ContextMap;
use crate::element::{Children, Element, ElementKind, PropValue, Props};
use crate::error::{NodeError, RenderError};
use crate::hooks::enter_render;
use crate::instance::{route_error, ComponentInstance, RenderPhase};
use crate::runtime::Runtime;
use crate::tree::{Record, RecordId, Tree};

/// Prop holding raw markup that replaces an element's children.
pub const INNER_HTML: &str = "dangerouslySetInnerHTML";

/// Props re-checked against the live node after children are in place.
const CONTROLLED_PROPS: [&str; 2] = ["value", "checked"];

/// Placement state for one native parent.
pub(crate) struct NativeScope {
    pub(crate) parent: NodeId,
    /// Next existing node that has not been claimed in this pass.
    pub(crate) cursor: Option<NodeId>,
    /// Pre-existing nodes that may be adopted instead of created.
    pub(crate) excess: Option<Vec<Option<NodeId>>>,
}

impl NativeScope {
    pub(crate) fn new(parent: NodeId, cursor: Option<NodeId>) -> Self {
        Self {
            parent,
            cursor,
            excess: None,
        }
    }
}

/// Inherited state for the children of one record.
#[derive(Clone)]
pub(crate) struct Frame {
    pub(crate) parent: Option<RecordId>,
    /// Nearest enclosing component, where raised errors start routing.
    pub(crate) owner: Option<Rc<ComponentInstance>>,
    pub(crate) context: ContextMap,
    pub(crate) svg: bool,
    pub(crate) depth: usize,
}

impl Frame {
    pub(crate) fn root() -> Self {
        Self {
            parent: None,
            owner: None,
            context: ContextMap::default(),
            svg: false,
            depth: 0,
        }
    }

    fn nested(&self, parent: RecordId) -> Self {
        Self {
            parent: Some(parent),
            depth: self.depth + 1,
            ..self.clone()
        }
    }
}

pub(crate) struct Reconciler<'a> {
    pub(crate) applier: &'a mut dyn Applier,
    pub(crate) tree: &'a mut Tree,
    pub(crate) runtime: &'a Runtime,
    pub(crate) commit_queue: Vec<Rc<ComponentInstance>>,
    /// Nodes of records that will be unmounted once their list is done.
    pub(crate) doomed: HashSet<NodeId>,
}

impl<'a> Reconciler<'a> {
    pub(crate) fn new(applier: &'a mut dyn Applier, tree: &'a mut Tree, runtime: &'a Runtime) -> Self {
        Self {
            applier,
            tree,
            runtime,
            commit_queue: Vec::new(),
            doomed: HashSet::new(),
        }
    }

    /// Instances with callbacks to run at commit, in completion order.
    pub(crate) fn finish(self) -> Vec<Rc<ComponentInstance>> {
        self.commit_queue
    }

    /// Reuses `old` when it still exists, otherwise allocates a fresh
    /// record for `element`.
    pub(crate) fn claim_record(
        &mut self,
        frame: &Frame,
        old: Option<RecordId>,
        element: &Element,
        parent_native: NodeId,
    ) -> RecordId {
        if let Some(id) = old {
            if let Some(record) = self.tree.get_mut(id) {
                record.parent = frame.parent;
                record.parent_native = parent_native;
                record.depth = frame.depth;
                return id;
            }
        }
        self.tree.insert(Record::new(
            element.clone(),
            frame.parent,
            parent_native,
            frame.depth,
            frame.svg,
        ))
    }

    pub(crate) fn diff(
        &mut self,
        scope: &mut NativeScope,
        frame: &Frame,
        id: RecordId,
        element: &Element,
    ) -> Result<(), RenderError> {
        if let Some(observer) = self.runtime.observer(|o| o.before_diff.clone()) {
            observer(element);
        }
        match element.kind() {
            ElementKind::Component(component) => self.diff_component(scope, frame, id, element, component)?,
            ElementKind::Fragment => self.diff_fragment(scope, frame, id, element)?,
            ElementKind::Text(data) => self.diff_text(scope, id, element, data)?,
            ElementKind::Tag(tag) => self.diff_native(scope, frame, id, element, tag)?,
        }
        if let Some(observer) = self.runtime.observer(|o| o.after_diff.clone()) {
            observer(element);
        }
        Ok(())
    }

    fn set_element(&mut self, id: RecordId, element: &Element) {
        if let Some(record) = self.tree.get_mut(id) {
            record.element = element.clone();
        }
    }

    fn diff_fragment(
        &mut self,
        scope: &mut NativeScope,
        frame: &Frame,
        id: RecordId,
        element: &Element,
    ) -> Result<(), RenderError> {
        self.set_element(id, element);
        self.diff_children(scope, &frame.nested(id), id, element.child_slots())
    }

    fn diff_text(
        &mut self,
        scope: &mut NativeScope,
        id: RecordId,
        element: &Element,
        data: &str,
    ) -> Result<(), RenderError> {
        let Some(record) = self.tree.get(id) else {
            return Ok(());
        };
        let (existing, unchanged) = (record.native, record.element.text() == Some(data));
        let node = match existing {
            Some(node) => {
                if !unchanged {
                    self.applier.set_text(node, data)?;
                }
                node
            }
            None => match self.adopt(scope, |kind| matches!(kind, NativeKind::Text(_))) {
                Some(node) => {
                    let same = matches!(self.applier.native_kind(node), Some(NativeKind::Text(current)) if current == data);
                    if !same {
                        self.applier.set_text(node, data)?;
                    }
                    node
                }
                None => self.applier.create_text(data),
            },
        };
        if let Some(record) = self.tree.get_mut(id) {
            record.native = Some(node);
            record.element = element.clone();
        }
        self.place(scope, node)?;
        Ok(())
    }

    fn diff_native(
        &mut self,
        scope: &mut NativeScope,
        frame: &Frame,
        id: RecordId,
        element: &Element,
        tag: &str,
    ) -> Result<(), RenderError> {
        let svg = frame.svg || tag == "svg";
        let Some(record) = self.tree.get(id) else {
            return Ok(());
        };
        let existing = record.native;
        let previous = record.element.get_props().clone();
        let (node, old_props, hydrating) = match existing {
            Some(node) => (node, previous, false),
            None => match self.adopt(scope, |kind| matches!(kind, NativeKind::Element(name) if name == tag)) {
                Some(node) => (node, Props::default(), true),
                None => (self.applier.create_element(tag, svg), Props::default(), false),
            },
        };
        if let Some(record) = self.tree.get_mut(id) {
            record.native = Some(node);
            record.svg = svg;
        }

        let new_props = element.get_props();
        self.diff_props(node, &old_props, new_props, svg, hydrating)?;

        let old_html = old_props.get_str(INNER_HTML);
        match new_props.get_str(INNER_HTML) {
            Some(html) => {
                if old_html != Some(html) {
                    let children = self
                        .tree
                        .get_mut(id)
                        .map(|record| std::mem::take(&mut record.children))
                        .unwrap_or_default();
                    for child in children.into_iter().flatten() {
                        self.unmount(child, true)?;
                    }
                    self.applier.set_inner_html(node, Some(html))?;
                }
            }
            None => {
                if old_html.is_some() {
                    self.applier.set_inner_html(node, None)?;
                }
                let mut child_scope = NativeScope::new(node, self.applier.first_child(node));
                if hydrating {
                    child_scope.excess = Some(child_nodes(&*self.applier, node));
                }
                let child_frame = Frame {
                    svg: svg && tag != "foreignObject",
                    ..frame.nested(id)
                };
                self.diff_children(&mut child_scope, &child_frame, id, element.child_slots())?;
                self.remove_excess(&mut child_scope)?;
            }
        }

        self.sync_controlled(node, &old_props, new_props, svg)?;
        self.set_element(id, element);
        self.place(scope, node)?;
        Ok(())
    }

    fn diff_props(
        &mut self,
        node: NodeId,
        old: &Props,
        new: &Props,
        svg: bool,
        hydrating: bool,
    ) -> Result<(), NodeError> {
        let null = PropValue::Null;
        for (name, value) in old.iter() {
            if name != INNER_HTML && !new.contains(name) {
                self.applier.apply_property(node, name, &null, value, svg)?;
            }
        }
        for (name, value) in new.iter() {
            if name == INNER_HTML || CONTROLLED_PROPS.contains(&name) {
                continue;
            }
            // Pre-rendered markup already carries the attributes.
            if hydrating && !matches!(value, PropValue::Handler(_)) {
                continue;
            }
            let old_value = old.get(name).unwrap_or(&null);
            if old_value != value {
                self.applier.apply_property(node, name, value, old_value, svg)?;
            }
        }
        Ok(())
    }

    /// Compares controlled props with the live node, which the user may
    /// have changed since the last render.
    fn sync_controlled(&mut self, node: NodeId, old: &Props, new: &Props, svg: bool) -> Result<(), NodeError> {
        for name in CONTROLLED_PROPS {
            let Some(value) = new.get(name) else {
                continue;
            };
            let live = self
                .applier
                .read_property(node, name)
                .or_else(|| old.get(name).cloned())
                .unwrap_or(PropValue::Null);
            if *value != live {
                self.applier.apply_property(node, name, value, &live, svg)?;
            }
        }
        Ok(())
    }

    fn diff_component(
        &mut self,
        scope: &mut NativeScope,
        frame: &Frame,
        id: RecordId,
        element: &Element,
        component: &ComponentType,
    ) -> Result<(), RenderError> {
        let props = element.get_props().with_forwarded_ref(element.get_ref());
        let Some(record) = self.tree.get(id) else {
            return Ok(());
        };
        let existing = record.instance.clone();
        let unchanged_element = record.element.ptr_eq(element);
        let (instance, is_new) = match existing {
            Some(instance) => (instance, false),
            None => {
                let instance = ComponentInstance::new(
                    self.runtime.next_instance_id(),
                    component.clone(),
                    props.clone(),
                    self.runtime.handle(),
                );
                if let Some(record) = self.tree.get_mut(id) {
                    record.instance = Some(Rc::clone(&instance));
                }
                (instance, true)
            }
        };
        instance.attach(id, frame.owner.as_ref(), frame.depth);

        let outcome = if !is_new && unchanged_element && !instance.is_dirty() && !instance.is_forced() {
            // Same element, no pending state: the output cannot change.
            instance.set_phase(RenderPhase::Bailed);
            Ok(None)
        } else {
            self.render_instance(frame, &instance, props, is_new)
        };
        self.set_element(id, element);

        match outcome {
            Ok(Some((output, context))) => {
                let slots = unwrap_top_fragment(output);
                let child_frame = Frame {
                    owner: Some(Rc::clone(&instance)),
                    context,
                    ..frame.nested(id)
                };
                self.diff_children(scope, &child_frame, id, &slots)?;
                self.queue_commit(&instance);
                instance.finish_render();
                if instance.has_pending_effects() {
                    instance.runtime().queue_passive(Rc::clone(&instance));
                }
            }
            Ok(None) => {
                self.place_subtree(scope, id)?;
                self.queue_commit(&instance);
            }
            Err(err) => {
                instance.abort_render();
                route_error(frame.owner.clone(), err)?;
                // A boundary took over; the previous output stays in place.
                self.place_subtree(scope, id)?;
            }
        }
        Ok(())
    }

    /// Queues the instance for the commit pass, or settles it back to idle
    /// when it has nothing to run there.
    fn queue_commit(&mut self, instance: &Rc<ComponentInstance>) {
        if instance.has_render_callbacks() {
            self.commit_queue.push(Rc::clone(instance));
        } else {
            instance.set_phase(RenderPhase::Idle);
        }
    }

    /// Runs the component body. `Ok(None)` means the update was skipped.
    fn render_instance(
        &mut self,
        frame: &Frame,
        instance: &Rc<ComponentInstance>,
        props: Props,
        is_new: bool,
    ) -> Result<Option<(Children, ContextMap)>, RenderError> {
        instance.prepare_state(&props);
        if !is_new {
            instance.begin_error_recovery();
            if !instance.is_forced() && !instance.should_update(&props) {
                instance.set_props(props);
                instance.commit_state();
                instance.set_context(frame.context.clone());
                instance.clear_dirty();
                instance.set_phase(RenderPhase::Bailed);
                return Ok(None);
            }
        }

        let prev_props = instance.props();
        let prev_state = instance.capture_state();
        let snapshot = Rc::new(RefCell::new(None));
        if is_new {
            instance.queue_did_mount();
        } else {
            instance.queue_did_update(prev_props.clone(), prev_state.clone(), Rc::clone(&snapshot));
        }
        instance.set_props(props);
        instance.commit_state();
        instance.set_context(frame.context.clone());

        if let Some(observer) = self.runtime.observer(|o| o.before_render.clone()) {
            observer(instance);
        }
        // Effects left over from a render that was never presented.
        instance.flush_passive()?;
        instance.clear_dirty();

        instance.set_phase(RenderPhase::Rendering);
        let output = {
            let _frame = enter_render(instance);
            instance.evaluate()
        };
        instance.set_phase(RenderPhase::Rendered);
        let output = output?;

        let context = match instance.child_context() {
            Some(child) => frame.context.extend(child),
            None => frame.context.clone(),
        };
        if !is_new {
            *snapshot.borrow_mut() = instance.snapshot(&prev_props, prev_state.as_ref());
        }
        Ok(Some((output, context)))
    }

    /// Unmounts `id` and its subtree. Native nodes below a removed native
    /// node are released with it and are not removed one by one.
    pub(crate) fn unmount(&mut self, id: RecordId, skip_remove: bool) -> Result<(), RenderError> {
        let Some(record) = self.tree.remove(id) else {
            return Ok(());
        };
        if let Some(observer) = self.runtime.observer(|o| o.unmount.clone()) {
            observer(&record.element);
        }
        if let Some(instance) = &record.instance {
            instance.unmount();
        }
        if record.native.is_some() {
            if let Some(node_ref) = record.element.get_ref() {
                node_ref.set(None);
            }
        }
        let is_native = record.native.is_some();
        for child in record.children.iter().flatten() {
            self.unmount(*child, skip_remove || is_native)?;
        }
        if let Some(node) = record.native {
            if !skip_remove {
                self.applier.remove(node)?;
            }
        }
        Ok(())
    }

    /// Takes the first unclaimed pre-existing node accepted by `accept`.
    fn adopt(&mut self, scope: &mut NativeScope, accept: impl Fn(NativeKind<'_>) -> bool) -> Option<NodeId> {
        let excess = scope.excess.as_mut()?;
        let applier = &*self.applier;
        let slot = excess.iter_mut().find(|slot| match **slot {
            Some(node) => applier.native_kind(node).is_some_and(&accept),
            None => false,
        })?;
        slot.take()
    }

    /// Removes pre-existing nodes nothing adopted.
    pub(crate) fn remove_excess(&mut self, scope: &mut NativeScope) -> Result<(), NodeError> {
        let Some(excess) = scope.excess.take() else {
            return Ok(());
        };
        for node in excess.into_iter().flatten() {
            if scope.cursor == Some(node) {
                scope.cursor = self.applier.next_sibling(node);
            }
            self.applier.remove(node)?;
        }
        Ok(())
    }
}

/// Current children of `parent`, as adoption candidates.
pub(crate) fn child_nodes(applier: &dyn Applier, parent: NodeId) -> Vec<Option<NodeId>> {
    let mut nodes = Vec::new();
    let mut next = applier.first_child(parent);
    while let Some(node) = next {
        nodes.push(Some(node));
        next = applier.next_sibling(node);
    }
    nodes
}

/// A keyless fragment returned at the top of a render is transparent.
fn unwrap_top_fragment(output: Children) -> Vec<Option<Element>> {
    let slots = output.into_vec();
    if let [Some(single)] = slots.as_slice() {
        if matches!(single.kind(), ElementKind::Fragment) && single.get_key().is_none() {
            return single.child_slots().to_vec();
        }
    }
    slots
}

#[cfg(test)]
#[path = "tests/reconcile_tests.rs"]
mod tests;
