//! Context objects and the provider component that publishes them.

use std::any::Any;
use std::cell::RefCell;
use std::marker::PhantomData;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use hashbrown::HashMap;

use crate::component::{ClassComponent, ClassContext, ComponentType, RenderResult};
use crate::element::{Children, Element, PropValue, Props};
use crate::instance::ComponentInstance;

pub type ContextId = u64;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

const CONTEXT_PROP: &str = "context";
const VALUE_PROP: &str = "value";

/// Typed channel for passing a value down the tree without props.
pub struct Context<T> {
    id: ContextId,
    default: Rc<T>,
}

impl<T> Clone for Context<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            default: Rc::clone(&self.default),
        }
    }
}

pub fn create_context<T: Clone + PartialEq + 'static>(default: T) -> Context<T> {
    Context {
        id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
        default: Rc::new(default),
    }
}

impl<T: Clone + PartialEq + 'static> Context<T> {
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Value seen by consumers with no provider above them.
    pub fn default_value(&self) -> T {
        (*self.default).clone()
    }

    /// Element providing `value` to every consumer in `children`.
    pub fn provider(&self, value: T, children: impl Into<Children>) -> Element {
        Element::component(ComponentType::class::<ContextProvider<T>>())
            .prop(CONTEXT_PROP, self.id as i64)
            .prop(VALUE_PROP, PropValue::any(value))
            .child(children)
    }
}

/// Shared cell holding the current value of one provider.
pub(crate) struct ProviderCell {
    id: ContextId,
    value: RefCell<Rc<dyn Any>>,
    subscribers: RefCell<Vec<Weak<ComponentInstance>>>,
}

impl ProviderCell {
    pub(crate) fn new(id: ContextId, value: Rc<dyn Any>) -> Rc<Self> {
        Rc::new(Self {
            id,
            value: RefCell::new(value),
            subscribers: RefCell::new(Vec::new()),
        })
    }

    pub(crate) fn value<T: Clone + 'static>(&self) -> Option<T> {
        self.value.borrow().downcast_ref::<T>().cloned()
    }

    fn replace(&self, value: Rc<dyn Any>) {
        *self.value.borrow_mut() = value;
    }

    pub(crate) fn subscribe(&self, instance: &Rc<ComponentInstance>) {
        self.subscribers.borrow_mut().push(Rc::downgrade(instance));
    }

    pub(crate) fn unsubscribe(&self, instance: &ComponentInstance) {
        self.subscribers
            .borrow_mut()
            .retain(|weak| weak.strong_count() > 0 && !std::ptr::eq(weak.as_ptr(), instance));
    }

    /// Schedules every live subscriber for a re-render.
    fn notify(&self) {
        let subscribers: Vec<_> = self
            .subscribers
            .borrow()
            .iter()
            .filter_map(Weak::upgrade)
            .collect();
        log::debug!("context {} changed, {} subscribers", self.id, subscribers.len());
        for subscriber in subscribers {
            subscriber.enqueue_render();
        }
    }
}

/// Providers visible to a component, keyed by context id.
#[derive(Clone, Default)]
pub(crate) struct ContextMap(Rc<HashMap<ContextId, Rc<ProviderCell>>>);

impl ContextMap {
    pub(crate) fn get(&self, id: ContextId) -> Option<Rc<ProviderCell>> {
        self.0.get(&id).cloned()
    }

    /// Copy of `self` with `child`'s entries layered on top.
    pub(crate) fn extend(&self, child: ChildContext) -> ContextMap {
        if child.entries.is_empty() {
            return self.clone();
        }
        let mut map = (*self.0).clone();
        for (id, cell) in child.entries {
            map.insert(id, cell);
        }
        ContextMap(Rc::new(map))
    }
}

/// Context values a class component publishes to its subtree.
#[derive(Default)]
pub struct ChildContext {
    entries: Vec<(ContextId, Rc<ProviderCell>)>,
}

impl ChildContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes `value` for `context`. Consumers read it but are not
    /// re-rendered when a later render publishes a different value.
    pub fn provide<T: Clone + PartialEq + 'static>(mut self, context: &Context<T>, value: T) -> Self {
        self.entries
            .push((context.id(), ProviderCell::new(context.id(), Rc::new(value))));
        self
    }

    fn with_cell(cell: Rc<ProviderCell>) -> Self {
        Self {
            entries: vec![(cell.id, cell)],
        }
    }
}

/// Class behind [`Context::provider`].
struct ContextProvider<T> {
    cell: Rc<ProviderCell>,
    _value: PhantomData<T>,
}

impl<T> ContextProvider<T> {
    fn value_of(props: &Props) -> Rc<dyn Any> {
        match props.get(VALUE_PROP) {
            Some(PropValue::Any(value)) => Rc::clone(value),
            _ => Rc::new(()),
        }
    }
}

impl<T: Clone + PartialEq + 'static> ClassComponent for ContextProvider<T> {
    type State = ();

    fn name() -> &'static str {
        "ContextProvider"
    }

    fn create(props: &Props) -> (Self, ()) {
        let id = props.get_int(CONTEXT_PROP).unwrap_or_default() as ContextId;
        let provider = Self {
            cell: ProviderCell::new(id, Self::value_of(props)),
            _value: PhantomData,
        };
        (provider, ())
    }

    fn should_update(&mut self, _cx: &ClassContext<'_, Self>, next_props: &Props, _next_state: &()) -> bool {
        let next = Self::value_of(next_props);
        let changed = {
            let current = self.cell.value.borrow();
            current.downcast_ref::<T>() != next.downcast_ref::<T>()
        };
        if changed {
            self.cell.replace(next);
            self.cell.notify();
        }
        true
    }

    fn render(&mut self, cx: &ClassContext<'_, Self>) -> RenderResult {
        self.cell.replace(Self::value_of(cx.props()));
        Ok(cx.props().children_list())
    }

    fn child_context(&mut self, _cx: &ClassContext<'_, Self>) -> Option<ChildContext> {
        Some(ChildContext::with_cell(Rc::clone(&self.cell)))
    }
}

#[cfg(test)]
#[path = "tests/context_tests.rs"]
mod tests;
