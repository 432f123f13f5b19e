//! Runtime state of one mounted component.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::component::{ComponentKind, ComponentType, ErasedClass, RenderResult, Snapshot};
use crate::context::{ChildContext, ContextMap, ProviderCell};
use crate::element::Props;
use crate::error::RenderError;
use crate::hooks::{EffectSlot, ErrorBoundarySlot, HookState};
use crate::runtime::RuntimeHandle;
use crate::tree::RecordId;

pub type InstanceId = u64;

/// Where an instance is in its render cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPhase {
    Idle,
    Rendering,
    /// Skipped by `should_update`; its subtree was kept as is.
    Bailed,
    Rendered,
    Committing,
}

/// Work queued during a render and run once when the tree commits.
pub(crate) enum RenderCallback {
    Layout(Rc<EffectSlot>),
    Lifecycle(Box<dyn FnOnce() -> Result<(), RenderError>>),
}

enum ComponentBody {
    Function(Rc<dyn crate::component::FunctionComponent>),
    Class(RefCell<Box<dyn ErasedClass>>),
}

/// A mounted component: its hook slots, class state, pending callbacks
/// and scheduling flags.
pub struct ComponentInstance {
    id: InstanceId,
    component: ComponentType,
    runtime: RuntimeHandle,
    record: Cell<Option<RecordId>>,
    parent: RefCell<Weak<ComponentInstance>>,
    depth: Cell<usize>,
    phase: Cell<RenderPhase>,
    dirty: Cell<bool>,
    force_update: Cell<bool>,
    pending_error: Cell<bool>,
    processing_error: Cell<bool>,
    props: RefCell<Props>,
    context: RefCell<ContextMap>,
    pub(crate) hooks: RefCell<HookState>,
    render_callbacks: RefCell<Vec<RenderCallback>>,
    body: ComponentBody,
    boundary: RefCell<Option<Rc<ErrorBoundarySlot>>>,
    subscriptions: RefCell<Vec<Rc<ProviderCell>>>,
}

impl ComponentInstance {
    pub(crate) fn new(
        id: InstanceId,
        component: ComponentType,
        props: Props,
        runtime: RuntimeHandle,
    ) -> Rc<Self> {
        let body = match component.kind() {
            ComponentKind::Function(render) => ComponentBody::Function(Rc::clone(render)),
            ComponentKind::Class(factory) => ComponentBody::Class(RefCell::new(factory.create(&props))),
        };
        Rc::new(Self {
            id,
            component,
            runtime,
            record: Cell::new(None),
            parent: RefCell::new(Weak::new()),
            depth: Cell::new(0),
            phase: Cell::new(RenderPhase::Idle),
            dirty: Cell::new(false),
            force_update: Cell::new(false),
            pending_error: Cell::new(false),
            processing_error: Cell::new(false),
            props: RefCell::new(props),
            context: RefCell::new(ContextMap::default()),
            hooks: RefCell::new(HookState::default()),
            render_callbacks: RefCell::new(Vec::new()),
            body,
            boundary: RefCell::new(None),
            subscriptions: RefCell::new(Vec::new()),
        })
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.component.name()
    }

    pub fn component(&self) -> &ComponentType {
        &self.component
    }

    pub fn depth(&self) -> usize {
        self.depth.get()
    }

    pub fn phase(&self) -> RenderPhase {
        self.phase.get()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.get()
    }

    /// Whether the instance is still part of a rendered tree.
    pub fn is_attached(&self) -> bool {
        self.record.get().is_some()
    }

    pub fn props(&self) -> Props {
        self.props.borrow().clone()
    }

    /// Number of hook slots allocated so far.
    pub fn hook_count(&self) -> usize {
        self.hooks.borrow().len()
    }

    /// Requests a re-render. Repeated requests before the next render
    /// pass coalesce into one.
    pub fn enqueue_render(self: &Rc<Self>) {
        if self.dirty.replace(true) {
            return;
        }
        self.runtime.enqueue_render(Rc::clone(self));
    }

    /// Re-renders even when `should_update` would skip the update.
    pub fn force_update(self: &Rc<Self>) {
        self.force_update.set(true);
        self.enqueue_render();
    }

    pub(crate) fn runtime(&self) -> &RuntimeHandle {
        &self.runtime
    }

    pub(crate) fn record(&self) -> Option<RecordId> {
        self.record.get()
    }

    pub(crate) fn attach(&self, record: RecordId, parent: Option<&Rc<ComponentInstance>>, depth: usize) {
        self.record.set(Some(record));
        *self.parent.borrow_mut() = parent.map(Rc::downgrade).unwrap_or_default();
        self.depth.set(depth);
    }

    /// Nearest enclosing component.
    pub(crate) fn parent(&self) -> Option<Rc<ComponentInstance>> {
        self.parent.borrow().upgrade()
    }

    pub(crate) fn set_phase(&self, phase: RenderPhase) {
        self.phase.set(phase);
    }

    pub(crate) fn clear_dirty(&self) {
        self.dirty.set(false);
    }

    pub(crate) fn is_forced(&self) -> bool {
        self.force_update.get()
    }

    pub(crate) fn context(&self) -> ContextMap {
        self.context.borrow().clone()
    }

    pub(crate) fn set_context(&self, context: ContextMap) {
        *self.context.borrow_mut() = context;
    }

    pub(crate) fn set_props(&self, props: Props) {
        *self.props.borrow_mut() = props;
    }

    pub(crate) fn push_render_callback(&self, callback: RenderCallback) {
        self.render_callbacks.borrow_mut().push(callback);
    }

    pub(crate) fn has_render_callbacks(&self) -> bool {
        !self.render_callbacks.borrow().is_empty()
    }

    pub(crate) fn has_pending_effects(&self) -> bool {
        self.hooks.borrow().has_pending()
    }

    pub(crate) fn discard_pending_effects(&self) {
        self.hooks.borrow_mut().take_pending();
    }

    pub(crate) fn subscribe(&self, provider: Rc<ProviderCell>) {
        self.subscriptions.borrow_mut().push(provider);
    }

    pub(crate) fn install_boundary(&self, slot: &Rc<ErrorBoundarySlot>) {
        let mut boundary = self.boundary.borrow_mut();
        if boundary.is_none() {
            *boundary = Some(Rc::clone(slot));
        }
    }

    /// Carries a caught error into the next render so errors raised while
    /// rendering the fallback skip this boundary.
    pub(crate) fn begin_error_recovery(&self) {
        self.processing_error.set(self.pending_error.replace(false));
    }

    pub(crate) fn finish_render(&self) {
        self.force_update.set(false);
        self.processing_error.set(false);
    }

    /// Class: derive the next state for `props`. No-op for functions.
    pub(crate) fn prepare_state(&self, props: &Props) {
        if let ComponentBody::Class(class) = &self.body {
            class.borrow_mut().prepare(props);
        }
    }

    pub(crate) fn should_update(self: &Rc<Self>, next_props: &Props) -> bool {
        match &self.body {
            ComponentBody::Class(class) => {
                let props = self.props();
                class.borrow_mut().should_update(&props, next_props, self)
            }
            ComponentBody::Function(_) => true,
        }
    }

    pub(crate) fn commit_state(&self) {
        if let ComponentBody::Class(class) = &self.body {
            class.borrow_mut().commit_state();
        }
    }

    pub(crate) fn capture_state(&self) -> Option<Rc<dyn Any>> {
        match &self.body {
            ComponentBody::Class(class) => Some(class.borrow().capture_state()),
            ComponentBody::Function(_) => None,
        }
    }

    pub(crate) fn evaluate(self: &Rc<Self>) -> RenderResult {
        let props = self.props();
        match &self.body {
            ComponentBody::Function(render) => render.render(&props),
            ComponentBody::Class(class) => class.borrow_mut().render(&props, self),
        }
    }

    pub(crate) fn child_context(self: &Rc<Self>) -> Option<ChildContext> {
        match &self.body {
            ComponentBody::Class(class) => {
                let props = self.props();
                class.borrow_mut().child_context(&props, self)
            }
            ComponentBody::Function(_) => None,
        }
    }

    pub(crate) fn snapshot(
        self: &Rc<Self>,
        prev_props: &Props,
        prev_state: Option<&Rc<dyn Any>>,
    ) -> Option<Snapshot> {
        match (&self.body, prev_state) {
            (ComponentBody::Class(class), Some(prev_state)) => {
                class.borrow_mut().snapshot(prev_props, &**prev_state, self)
            }
            _ => None,
        }
    }

    /// Queues the mount callback of a class component.
    pub(crate) fn queue_did_mount(self: &Rc<Self>) {
        if !matches!(self.body, ComponentBody::Class(_)) {
            return;
        }
        let weak = Rc::downgrade(self);
        self.push_render_callback(RenderCallback::Lifecycle(Box::new(move || {
            let Some(instance) = weak.upgrade() else {
                return Ok(());
            };
            match &instance.body {
                ComponentBody::Class(class) => class.borrow_mut().did_mount(&instance),
                ComponentBody::Function(_) => Ok(()),
            }
        })));
    }

    /// Queues the update callback of a class component. The snapshot is
    /// filled in after the render completes.
    pub(crate) fn queue_did_update(
        self: &Rc<Self>,
        prev_props: Props,
        prev_state: Option<Rc<dyn Any>>,
        snapshot: Rc<RefCell<Option<Snapshot>>>,
    ) {
        let Some(prev_state) = prev_state else {
            return;
        };
        let weak = Rc::downgrade(self);
        self.push_render_callback(RenderCallback::Lifecycle(Box::new(move || {
            let Some(instance) = weak.upgrade() else {
                return Ok(());
            };
            let snapshot = snapshot.borrow_mut().take();
            match &instance.body {
                ComponentBody::Class(class) => {
                    class
                        .borrow_mut()
                        .did_update(&instance, &prev_props, &*prev_state, snapshot)
                }
                ComponentBody::Function(_) => Ok(()),
            }
        })));
    }

    /// Drops everything a failed render queued. Effects it armed are reset
    /// so the next render arms them again.
    pub(crate) fn abort_render(&self) {
        let pending = self.hooks.borrow_mut().take_pending();
        for effect in &pending {
            effect.disarm();
        }
        let callbacks = std::mem::take(&mut *self.render_callbacks.borrow_mut());
        for callback in callbacks {
            if let RenderCallback::Layout(effect) = callback {
                effect.disarm();
            }
        }
        self.phase.set(RenderPhase::Idle);
    }

    /// Runs the passive effects recorded by the last render: every cleanup
    /// first, then every effect body.
    pub(crate) fn flush_passive(&self) -> Result<(), RenderError> {
        let pending = self.hooks.borrow_mut().take_pending();
        for effect in &pending {
            effect.run_cleanup();
        }
        for effect in &pending {
            effect.run_effect()?;
        }
        Ok(())
    }

    /// Runs the callbacks queued for this instance during the last render.
    /// The first error stops the remaining callbacks of this instance.
    pub(crate) fn run_render_callbacks(&self) -> Result<(), RenderError> {
        self.phase.set(RenderPhase::Committing);
        let callbacks = std::mem::take(&mut *self.render_callbacks.borrow_mut());
        let result = run_callbacks(callbacks);
        self.phase.set(RenderPhase::Idle);
        result
    }

    /// Tries to handle `error` at this instance. Returns whether it did.
    pub(crate) fn catch(self: &Rc<Self>, error: &RenderError) -> bool {
        let boundary = self.boundary.borrow().clone();
        if let Some(boundary) = boundary {
            boundary.capture(error);
            return true;
        }
        match &self.body {
            ComponentBody::Class(class) => {
                class.borrow_mut().did_catch(error, self);
                self.dirty.get()
            }
            ComponentBody::Function(_) => false,
        }
    }

    /// Runs every hook cleanup and the class unmount callback, then drops
    /// the instance's subscriptions and marks it detached.
    pub(crate) fn unmount(&self) {
        let effects = {
            let mut hooks = self.hooks.borrow_mut();
            hooks.take_pending();
            hooks.effect_slots()
        };
        for effect in effects {
            effect.run_cleanup();
        }
        self.render_callbacks.borrow_mut().clear();
        if let ComponentBody::Class(class) = &self.body {
            class.borrow_mut().will_unmount();
        }
        for provider in self.subscriptions.borrow_mut().drain(..) {
            provider.unsubscribe(self);
        }
        self.boundary.borrow_mut().take();
        self.record.set(None);
        self.phase.set(RenderPhase::Idle);
    }
}

fn run_callbacks(callbacks: Vec<RenderCallback>) -> Result<(), RenderError> {
    let mut layouts = Vec::new();
    let mut lifecycles = Vec::new();
    for callback in callbacks {
        match callback {
            RenderCallback::Layout(effect) => layouts.push(effect),
            RenderCallback::Lifecycle(callback) => lifecycles.push(callback),
        }
    }
    for effect in &layouts {
        effect.run_cleanup();
    }
    for effect in &layouts {
        effect.run_effect()?;
    }
    for callback in lifecycles {
        callback()?;
    }
    Ok(())
}

impl fmt::Debug for ComponentInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentInstance")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("depth", &self.depth.get())
            .field("phase", &self.phase.get())
            .field("dirty", &self.dirty.get())
            .finish()
    }
}

/// Walks from `start` towards the root looking for an instance that
/// handles `error`. Boundaries already recovering from an error are
/// skipped. Fatal errors are never routed.
pub(crate) fn route_error(
    start: Option<Rc<ComponentInstance>>,
    error: RenderError,
) -> Result<(), RenderError> {
    if error.is_fatal() {
        return Err(error);
    }
    let mut current = start;
    while let Some(instance) = current {
        if instance.is_attached() && !instance.processing_error.get() && instance.catch(&error) {
            log::debug!("`{}` caught: {error}", instance.name());
            instance.pending_error.set(true);
            return Ok(());
        }
        current = instance.parent();
    }
    Err(error)
}
