//! Component definitions: function components, class components and the
//! type identity the reconciler compares.

use std::any::{type_name, Any, TypeId};
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::context::ChildContext;
use crate::element::{Children, Element, Props};
use crate::error::RenderError;
use crate::instance::ComponentInstance;

/// Output of a component body.
pub type RenderResult = Result<Children, RenderError>;

/// Value captured right before an update is applied and handed to
/// [`ClassComponent::did_update`].
pub type Snapshot = Rc<dyn Any>;

/// A component rendered by a plain function of its props. Hooks may be
/// called from [`FunctionComponent::render`].
pub trait FunctionComponent: 'static {
    fn name(&self) -> &'static str;

    fn render(&self, props: &Props) -> RenderResult;

    fn element(self) -> Element
    where
        Self: Sized,
    {
        Element::component(ComponentType::function(self))
    }
}

struct FnComponent<F> {
    name: &'static str,
    render: F,
}

impl<F> FunctionComponent for FnComponent<F>
where
    F: Fn(&Props) -> RenderResult + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn render(&self, props: &Props) -> RenderResult {
        (self.render)(props)
    }
}

/// Wraps a closure as a component type.
///
/// Each call yields a new component identity, even for the same closure
/// expression, because the closure may capture different values. Build the
/// type once and clone it to keep an instance mounted across renders.
pub fn component_fn<F>(name: &'static str, render: F) -> ComponentType
where
    F: Fn(&Props) -> RenderResult + 'static,
{
    let render: Rc<dyn FunctionComponent> = Rc::new(FnComponent { name, render });
    ComponentType {
        id: Identity::Value(Rc::as_ptr(&render) as *const () as usize),
        name,
        kind: ComponentKind::Function(render),
    }
}

/// Stateful component with lifecycle callbacks.
///
/// State lives outside the component value so that updates scheduled
/// through [`StateUpdater`] can be applied while a callback is running.
/// Updates are merged into a pending state and become current when the
/// component next renders.
pub trait ClassComponent: Sized + 'static {
    type State: Clone + 'static;

    fn name() -> &'static str {
        let full = type_name::<Self>();
        let base = full.split('<').next().unwrap_or(full);
        base.rsplit("::").next().unwrap_or(base)
    }

    fn create(props: &Props) -> (Self, Self::State);

    fn render(&mut self, cx: &ClassContext<'_, Self>) -> RenderResult;

    /// State derived from props, applied before every render.
    fn derived_state(_props: &Props, _state: &Self::State) -> Option<Self::State> {
        None
    }

    /// Returning `false` keeps the current output without re-rendering.
    /// Not consulted for forced updates or the first render.
    fn should_update(
        &mut self,
        _cx: &ClassContext<'_, Self>,
        _next_props: &Props,
        _next_state: &Self::State,
    ) -> bool {
        true
    }

    fn did_mount(&mut self, _cx: &ClassContext<'_, Self>) -> Result<(), RenderError> {
        Ok(())
    }

    /// Called after rendering and before the tree is committed.
    fn snapshot_before_update(
        &mut self,
        _cx: &ClassContext<'_, Self>,
        _prev_props: &Props,
        _prev_state: &Self::State,
    ) -> Option<Snapshot> {
        None
    }

    fn did_update(
        &mut self,
        _cx: &ClassContext<'_, Self>,
        _prev_props: &Props,
        _prev_state: &Self::State,
        _snapshot: Option<Snapshot>,
    ) -> Result<(), RenderError> {
        Ok(())
    }

    fn will_unmount(&mut self) {}

    fn child_context(&mut self, _cx: &ClassContext<'_, Self>) -> Option<ChildContext> {
        None
    }

    /// Receives errors raised below this component. The error counts as
    /// handled when the callback schedules an update.
    fn did_catch(&mut self, _error: &RenderError, _cx: &ClassContext<'_, Self>) {}
}

/// View of a class instance passed to its callbacks.
pub struct ClassContext<'a, C: ClassComponent> {
    props: &'a Props,
    state: &'a C::State,
    updater: StateUpdater<C::State>,
    instance: &'a Rc<ComponentInstance>,
}

impl<C: ClassComponent> ClassContext<'_, C> {
    pub fn props(&self) -> &Props {
        self.props
    }

    pub fn state(&self) -> &C::State {
        self.state
    }

    pub fn updater(&self) -> StateUpdater<C::State> {
        self.updater.clone()
    }

    pub fn set_state(&self, update: impl FnOnce(&C::State) -> C::State) {
        self.updater.set_state(update);
    }

    pub fn force_update(&self) {
        self.instance.force_update();
    }

    pub fn instance(&self) -> &Rc<ComponentInstance> {
        self.instance
    }
}

pub(crate) struct ClassState<S> {
    current: RefCell<S>,
    next: RefCell<Option<S>>,
}

impl<S: Clone> ClassState<S> {
    /// Pending state if an update is queued, the current one otherwise.
    fn latest(&self) -> S {
        let next = self.next.borrow();
        match &*next {
            Some(next) => next.clone(),
            None => self.current.borrow().clone(),
        }
    }
}

/// Schedules state changes on a class component from anywhere, including
/// event handlers and effects.
pub struct StateUpdater<S> {
    state: Weak<ClassState<S>>,
    instance: Weak<ComponentInstance>,
}

impl<S> Clone for StateUpdater<S> {
    fn clone(&self) -> Self {
        Self {
            state: Weak::clone(&self.state),
            instance: Weak::clone(&self.instance),
        }
    }
}

impl<S: Clone + 'static> StateUpdater<S> {
    /// Queues `update` against the latest state and schedules a render.
    pub fn set_state(&self, update: impl FnOnce(&S) -> S) {
        let Some(state) = self.state.upgrade() else {
            return;
        };
        let next = update(&state.latest());
        state.next.replace(Some(next));
        if let Some(instance) = self.instance.upgrade() {
            instance.enqueue_render();
        }
    }

    pub fn replace_state(&self, value: S) {
        self.set_state(move |_| value);
    }

    pub fn force_update(&self) {
        if let Some(instance) = self.instance.upgrade() {
            instance.force_update();
        }
    }
}

impl<S> fmt::Debug for StateUpdater<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateUpdater")
            .field("live", &(self.instance.strong_count() > 0))
            .finish()
    }
}

/// Object-safe face of a class component used by the instance.
pub(crate) trait ErasedClass {
    fn prepare(&mut self, props: &Props);
    fn should_update(&mut self, props: &Props, next_props: &Props, instance: &Rc<ComponentInstance>) -> bool;
    fn commit_state(&mut self);
    fn capture_state(&self) -> Rc<dyn Any>;
    fn render(&mut self, props: &Props, instance: &Rc<ComponentInstance>) -> RenderResult;
    fn child_context(&mut self, props: &Props, instance: &Rc<ComponentInstance>) -> Option<ChildContext>;
    fn snapshot(
        &mut self,
        prev_props: &Props,
        prev_state: &dyn Any,
        instance: &Rc<ComponentInstance>,
    ) -> Option<Snapshot>;
    fn did_mount(&mut self, instance: &Rc<ComponentInstance>) -> Result<(), RenderError>;
    fn did_update(
        &mut self,
        instance: &Rc<ComponentInstance>,
        prev_props: &Props,
        prev_state: &dyn Any,
        snapshot: Option<Snapshot>,
    ) -> Result<(), RenderError>;
    fn will_unmount(&mut self);
    fn did_catch(&mut self, error: &RenderError, instance: &Rc<ComponentInstance>);
}

struct ClassCell<C: ClassComponent> {
    component: C,
    state: Rc<ClassState<C::State>>,
}

impl<C: ClassComponent> ClassCell<C> {
    fn updater(&self, instance: &Rc<ComponentInstance>) -> StateUpdater<C::State> {
        StateUpdater {
            state: Rc::downgrade(&self.state),
            instance: Rc::downgrade(instance),
        }
    }

    /// Calls `f` with a context over the current props and state.
    fn with_cx<R>(
        &mut self,
        props: &Props,
        instance: &Rc<ComponentInstance>,
        f: impl FnOnce(&mut C, &ClassContext<'_, C>) -> R,
    ) -> R {
        let updater = self.updater(instance);
        let state = self.state.current.borrow();
        let cx = ClassContext {
            props,
            state: &*state,
            updater,
            instance,
        };
        f(&mut self.component, &cx)
    }
}

impl<C: ClassComponent> ErasedClass for ClassCell<C> {
    fn prepare(&mut self, props: &Props) {
        let base = self.state.latest();
        let next = C::derived_state(props, &base).unwrap_or(base);
        self.state.next.replace(Some(next));
    }

    fn should_update(&mut self, props: &Props, next_props: &Props, instance: &Rc<ComponentInstance>) -> bool {
        let next_state = self.state.latest();
        self.with_cx(props, instance, |component, cx| {
            component.should_update(cx, next_props, &next_state)
        })
    }

    fn commit_state(&mut self) {
        let next = self.state.next.borrow_mut().take();
        if let Some(next) = next {
            self.state.current.replace(next);
        }
    }

    fn capture_state(&self) -> Rc<dyn Any> {
        Rc::new(self.state.current.borrow().clone())
    }

    fn render(&mut self, props: &Props, instance: &Rc<ComponentInstance>) -> RenderResult {
        self.with_cx(props, instance, |component, cx| component.render(cx))
    }

    fn child_context(&mut self, props: &Props, instance: &Rc<ComponentInstance>) -> Option<ChildContext> {
        self.with_cx(props, instance, |component, cx| component.child_context(cx))
    }

    fn snapshot(
        &mut self,
        prev_props: &Props,
        prev_state: &dyn Any,
        instance: &Rc<ComponentInstance>,
    ) -> Option<Snapshot> {
        let prev_state = prev_state.downcast_ref::<C::State>()?;
        let props = instance.props();
        self.with_cx(&props, instance, |component, cx| {
            component.snapshot_before_update(cx, prev_props, prev_state)
        })
    }

    fn did_mount(&mut self, instance: &Rc<ComponentInstance>) -> Result<(), RenderError> {
        let props = instance.props();
        self.with_cx(&props, instance, |component, cx| component.did_mount(cx))
    }

    fn did_update(
        &mut self,
        instance: &Rc<ComponentInstance>,
        prev_props: &Props,
        prev_state: &dyn Any,
        snapshot: Option<Snapshot>,
    ) -> Result<(), RenderError> {
        let Some(prev_state) = prev_state.downcast_ref::<C::State>() else {
            return Ok(());
        };
        let props = instance.props();
        self.with_cx(&props, instance, |component, cx| {
            component.did_update(cx, prev_props, prev_state, snapshot)
        })
    }

    fn will_unmount(&mut self) {
        self.component.will_unmount();
    }

    fn did_catch(&mut self, error: &RenderError, instance: &Rc<ComponentInstance>) {
        let props = instance.props();
        self.with_cx(&props, instance, |component, cx| component.did_catch(error, cx));
    }
}

fn construct<C: ClassComponent>(props: &Props) -> Box<dyn ErasedClass> {
    let (component, state) = C::create(props);
    Box::new(ClassCell {
        component,
        state: Rc::new(ClassState {
            current: RefCell::new(state),
            next: RefCell::new(None),
        }),
    })
}

#[derive(Clone, Copy)]
pub(crate) struct ClassFactory(fn(&Props) -> Box<dyn ErasedClass>);

impl ClassFactory {
    pub(crate) fn create(&self, props: &Props) -> Box<dyn ErasedClass> {
        (self.0)(props)
    }
}

#[derive(Clone)]
pub(crate) enum ComponentKind {
    Function(Rc<dyn FunctionComponent>),
    Class(ClassFactory),
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Identity {
    Type(TypeId),
    /// Address of a shared closure body, alive for as long as any clone.
    Value(usize),
}

/// Identity of a component. Types built from a Rust type compare by that
/// type. Types built by [`component_fn`] compare by value, so only clones
/// of the same call are equal.
#[derive(Clone)]
pub struct ComponentType {
    id: Identity,
    name: &'static str,
    kind: ComponentKind,
}

impl ComponentType {
    pub fn function<C: FunctionComponent>(component: C) -> Self {
        Self {
            id: Identity::Type(TypeId::of::<C>()),
            name: component.name(),
            kind: ComponentKind::Function(Rc::new(component)),
        }
    }

    pub fn class<C: ClassComponent>() -> Self {
        Self {
            id: Identity::Type(TypeId::of::<C>()),
            name: C::name(),
            kind: ComponentKind::Class(ClassFactory(construct::<C>)),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_class(&self) -> bool {
        matches!(self.kind, ComponentKind::Class(_))
    }

    /// Element rendering this component with no props.
    pub fn element(&self) -> Element {
        Element::component(self.clone())
    }

    pub(crate) fn kind(&self) -> &ComponentKind {
        &self.kind
    }
}

impl PartialEq for ComponentType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ComponentType {}

impl fmt::Debug for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentType")
            .field("name", &self.name)
            .field("class", &self.is_class())
            .finish()
    }
}
