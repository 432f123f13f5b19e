//! Hook slots for function and class components.
//!
//! Hooks identify their storage by call order: the n-th hook call during a
//! render always resolves to slot n of the rendering instance. The
//! rendering instance is installed in a thread-local frame stack for the
//! duration of the component body only; calling a hook anywhere else
//! returns [`HookError::InvalidHookCall`].

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::rc::{Rc, Weak};

use crate::context::{Context, ContextId};
use crate::element::{NodeRef, RefValue};
use crate::error::{HookError, RenderError};
use crate::instance::{ComponentInstance, RenderCallback, RenderPhase};
use crate::options::HookKind;

struct RenderFrame {
    instance: Rc<ComponentInstance>,
    index: usize,
}

thread_local! {
    static FRAMES: RefCell<Vec<RenderFrame>> = const { RefCell::new(Vec::new()) };
}

/// Keeps `instance` installed as the rendering component until dropped.
pub(crate) struct FrameGuard {
    _not_send: PhantomData<*const ()>,
}

pub(crate) fn enter_render(instance: &Rc<ComponentInstance>) -> FrameGuard {
    FRAMES.with(|frames| {
        frames.borrow_mut().push(RenderFrame {
            instance: Rc::clone(instance),
            index: 0,
        })
    });
    FrameGuard {
        _not_send: PhantomData,
    }
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        FRAMES.with(|frames| {
            frames.borrow_mut().pop();
        });
    }
}

fn current_instance() -> Result<Rc<ComponentInstance>, HookError> {
    FRAMES.with(|frames| {
        let frames = frames.borrow();
        let frame = frames.last().ok_or(HookError::InvalidHookCall)?;
        if frame.instance.phase() != RenderPhase::Rendering {
            return Err(HookError::InvalidHookCall);
        }
        Ok(Rc::clone(&frame.instance))
    })
}

fn next_slot(kind: HookKind) -> Result<(Rc<ComponentInstance>, usize), HookError> {
    let (instance, index) = FRAMES.with(|frames| {
        let mut frames = frames.borrow_mut();
        let frame = frames.last_mut().ok_or(HookError::InvalidHookCall)?;
        if frame.instance.phase() != RenderPhase::Rendering {
            return Err(HookError::InvalidHookCall);
        }
        let index = frame.index;
        frame.index += 1;
        Ok((Rc::clone(&frame.instance), index))
    })?;
    if let Some(observer) = instance.runtime().observer(|o| o.hook.clone()) {
        observer(&instance, index, kind);
    }
    Ok((instance, index))
}

/// Runs `f` on slot `index`, allocating vacant slots up to it.
fn with_slot<R>(instance: &ComponentInstance, index: usize, f: impl FnOnce(&mut HookSlot) -> R) -> R {
    let mut hooks = instance.hooks.borrow_mut();
    if hooks.slots.len() <= index {
        hooks.slots.resize_with(index + 1, || HookSlot::Vacant);
    }
    f(&mut hooks.slots[index])
}

fn mismatch(index: usize, expected: &'static str, found: &HookSlot) -> HookError {
    HookError::HookKindMismatch {
        index,
        expected,
        found: found.kind_name(),
    }
}

/// Dependencies are unchanged only when both sides are present and equal.
fn deps_changed<D: PartialEq + 'static>(previous: Option<&dyn Any>, next: Option<&D>) -> bool {
    match (previous, next) {
        (Some(previous), Some(next)) => previous.downcast_ref::<D>() != Some(next),
        _ => true,
    }
}

#[derive(Default)]
pub(crate) struct HookState {
    slots: Vec<HookSlot>,
    pending_effects: Vec<Rc<EffectSlot>>,
}

impl HookState {
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn has_pending(&self) -> bool {
        !self.pending_effects.is_empty()
    }

    pub(crate) fn take_pending(&mut self) -> Vec<Rc<EffectSlot>> {
        std::mem::take(&mut self.pending_effects)
    }

    pub(crate) fn effect_slots(&self) -> Vec<Rc<EffectSlot>> {
        self.slots
            .iter()
            .filter_map(|slot| match slot {
                HookSlot::Effect(effect) => Some(Rc::clone(effect)),
                _ => None,
            })
            .collect()
    }
}

enum HookSlot {
    Vacant,
    State(Rc<dyn Any>),
    Effect(Rc<EffectSlot>),
    Memo(MemoSlot),
    Context(ContextSlot),
    ErrorBoundary(Rc<ErrorBoundarySlot>),
}

impl HookSlot {
    fn kind_name(&self) -> &'static str {
        match self {
            HookSlot::Vacant => "vacant",
            HookSlot::State(_) => "state",
            HookSlot::Effect(_) => "effect",
            HookSlot::Memo(_) => "memo",
            HookSlot::Context(_) => "context",
            HookSlot::ErrorBoundary(_) => "error boundary",
        }
    }
}

struct MemoSlot {
    value: Rc<dyn Any>,
    deps: Option<Box<dyn Any>>,
}

struct ContextSlot {
    context: ContextId,
    subscribed: bool,
}

// ---------------------------------------------------------------------------
// State

struct StateSlot<S, A> {
    value: RefCell<S>,
    reducer: RefCell<Rc<dyn Fn(&S, A) -> S>>,
    instance: Weak<ComponentInstance>,
}

/// Sends actions to a reducer slot. Stays valid across renders; actions
/// sent after the component unmounted are ignored.
pub struct Dispatch<S, A> {
    slot: Weak<StateSlot<S, A>>,
}

impl<S, A> Clone for Dispatch<S, A> {
    fn clone(&self) -> Self {
        Self {
            slot: Weak::clone(&self.slot),
        }
    }
}

impl<S, A> PartialEq for Dispatch<S, A> {
    fn eq(&self, other: &Self) -> bool {
        Weak::ptr_eq(&self.slot, &other.slot)
    }
}

impl<S, A> fmt::Debug for Dispatch<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatch")
            .field("live", &(self.slot.strong_count() > 0))
            .finish()
    }
}

impl<S: PartialEq + 'static, A: 'static> Dispatch<S, A> {
    /// Reduces `action` against the current value. The component is
    /// scheduled for a re-render only when the value changed.
    pub fn dispatch(&self, action: A) {
        let Some(slot) = self.slot.upgrade() else {
            return;
        };
        let reducer = Rc::clone(&slot.reducer.borrow());
        let next = reducer(&slot.value.borrow(), action);
        if *slot.value.borrow() == next {
            return;
        }
        slot.value.replace(next);
        if let Some(instance) = slot.instance.upgrade() {
            instance.enqueue_render();
        }
    }
}

/// Action accepted by a [`StateSetter`].
pub enum SetState<T> {
    Replace(T),
    Update(Box<dyn FnOnce(&T) -> T>),
}

pub type StateSetter<T> = Dispatch<T, SetState<T>>;

impl<T: PartialEq + 'static> Dispatch<T, SetState<T>> {
    pub fn set(&self, value: T) {
        self.dispatch(SetState::Replace(value));
    }

    /// Computes the next value from the latest one, including updates not
    /// yet rendered.
    pub fn update(&self, f: impl FnOnce(&T) -> T + 'static) {
        self.dispatch(SetState::Update(Box::new(f)));
    }
}

fn apply_set_state<T>(current: &T, action: SetState<T>) -> T {
    match action {
        SetState::Replace(value) => value,
        SetState::Update(f) => f(current),
    }
}

fn state_slot<S, A>(
    kind: HookKind,
    reducer: Rc<dyn Fn(&S, A) -> S>,
    initial: impl FnOnce() -> S,
) -> Result<(S, Dispatch<S, A>), HookError>
where
    S: Clone + PartialEq + 'static,
    A: 'static,
{
    let (instance, index) = next_slot(kind)?;
    let existing = with_slot(&instance, index, |slot| match slot {
        HookSlot::State(cell) => Ok(Some(Rc::clone(cell))),
        HookSlot::Vacant => Ok(None),
        other => Err(mismatch(index, "state", other)),
    })?;
    let cell = match existing {
        Some(cell) => cell
            .downcast::<StateSlot<S, A>>()
            .map_err(|_| HookError::HookKindMismatch {
                index,
                expected: "state",
                found: "state of another type",
            })?,
        None => {
            let cell = Rc::new(StateSlot {
                value: RefCell::new(initial()),
                reducer: RefCell::new(Rc::clone(&reducer)),
                instance: Rc::downgrade(&instance),
            });
            let erased: Rc<dyn Any> = cell.clone();
            with_slot(&instance, index, |slot| *slot = HookSlot::State(erased));
            cell
        }
    };
    *cell.reducer.borrow_mut() = reducer;
    let value = cell.value.borrow().clone();
    Ok((
        value,
        Dispatch {
            slot: Rc::downgrade(&cell),
        },
    ))
}

/// Local state. `initial` runs on the first render only.
pub fn use_state<T>(initial: impl FnOnce() -> T) -> Result<(T, StateSetter<T>), HookError>
where
    T: Clone + PartialEq + 'static,
{
    state_slot(HookKind::State, Rc::new(apply_set_state::<T>), initial)
}

/// Local state driven by `reducer`. The reducer is refreshed on every
/// render, so it may capture the latest props.
pub fn use_reducer<S, A>(
    reducer: impl Fn(&S, A) -> S + 'static,
    initial: impl FnOnce() -> S,
) -> Result<(S, Dispatch<S, A>), HookError>
where
    S: Clone + PartialEq + 'static,
    A: 'static,
{
    state_slot(HookKind::Reducer, Rc::new(reducer), initial)
}

// ---------------------------------------------------------------------------
// Effects

/// Cleanup returned by an effect body.
#[derive(Default)]
pub struct Teardown(Option<Box<dyn FnOnce()>>);

impl Teardown {
    pub fn new(cleanup: impl FnOnce() + 'static) -> Self {
        Self(Some(Box::new(cleanup)))
    }

    pub fn none() -> Self {
        Self(None)
    }

    pub fn is_none(&self) -> bool {
        self.0.is_none()
    }

    fn run(self) {
        if let Some(cleanup) = self.0 {
            cleanup();
        }
    }
}

impl fmt::Debug for Teardown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.0.is_some() { "Teardown(Some)" } else { "Teardown(None)" })
    }
}

/// Values an effect body may return.
pub trait IntoTeardown {
    fn into_teardown(self) -> Result<Teardown, RenderError>;
}

impl IntoTeardown for () {
    fn into_teardown(self) -> Result<Teardown, RenderError> {
        Ok(Teardown::none())
    }
}

impl IntoTeardown for Teardown {
    fn into_teardown(self) -> Result<Teardown, RenderError> {
        Ok(self)
    }
}

impl IntoTeardown for Result<(), RenderError> {
    fn into_teardown(self) -> Result<Teardown, RenderError> {
        self.map(|()| Teardown::none())
    }
}

impl IntoTeardown for Result<Teardown, RenderError> {
    fn into_teardown(self) -> Result<Teardown, RenderError> {
        self
    }
}

type EffectCallback = Box<dyn FnOnce() -> Result<Teardown, RenderError>>;

pub(crate) struct EffectSlot {
    callback: RefCell<Option<EffectCallback>>,
    deps: RefCell<Option<Box<dyn Any>>>,
    cleanup: RefCell<Option<Teardown>>,
}

impl EffectSlot {
    fn new() -> Self {
        Self {
            callback: RefCell::new(None),
            deps: RefCell::new(None),
            cleanup: RefCell::new(None),
        }
    }

    fn changed<D: PartialEq + 'static>(&self, next: Option<&D>) -> bool {
        deps_changed(self.deps.borrow().as_deref(), next)
    }

    fn arm(&self, callback: EffectCallback, deps: Option<Box<dyn Any>>) {
        *self.callback.borrow_mut() = Some(callback);
        *self.deps.borrow_mut() = deps;
    }

    pub(crate) fn disarm(&self) {
        self.callback.borrow_mut().take();
        self.deps.borrow_mut().take();
    }

    pub(crate) fn run_cleanup(&self) {
        let cleanup = self.cleanup.borrow_mut().take();
        if let Some(cleanup) = cleanup {
            cleanup.run();
        }
    }

    pub(crate) fn run_effect(&self) -> Result<(), RenderError> {
        let callback = self.callback.borrow_mut().take();
        if let Some(callback) = callback {
            let teardown = callback()?;
            if !teardown.is_none() {
                *self.cleanup.borrow_mut() = Some(teardown);
            }
        }
        Ok(())
    }
}

fn record_effect<F, R, D>(kind: HookKind, effect: F, deps: Option<D>) -> Result<(), HookError>
where
    F: FnOnce() -> R + 'static,
    R: IntoTeardown,
    D: PartialEq + 'static,
{
    let (instance, index) = next_slot(kind)?;
    let slot = with_slot(&instance, index, |slot| match slot {
        HookSlot::Effect(effect) => Ok(Rc::clone(effect)),
        HookSlot::Vacant => {
            let effect = Rc::new(EffectSlot::new());
            *slot = HookSlot::Effect(Rc::clone(&effect));
            Ok(effect)
        }
        other => Err(mismatch(index, "effect", other)),
    })?;
    if instance.runtime().skip_effects() || !slot.changed(deps.as_ref()) {
        return Ok(());
    }
    slot.arm(
        Box::new(move || effect().into_teardown()),
        deps.map(|deps| Box::new(deps) as Box<dyn Any>),
    );
    if kind == HookKind::Effect {
        instance.hooks.borrow_mut().pending_effects.push(slot);
    } else {
        instance.push_render_callback(RenderCallback::Layout(slot));
    }
    Ok(())
}

/// Passive effect run after every render, once the frame is presented.
pub fn use_effect<F, R>(effect: F) -> Result<(), HookError>
where
    F: FnOnce() -> R + 'static,
    R: IntoTeardown,
{
    record_effect(HookKind::Effect, effect, None::<()>)
}

/// Passive effect run when `deps` differ from the previous render's.
pub fn use_effect_with<F, R, D>(effect: F, deps: D) -> Result<(), HookError>
where
    F: FnOnce() -> R + 'static,
    R: IntoTeardown,
    D: PartialEq + 'static,
{
    record_effect(HookKind::Effect, effect, Some(deps))
}

/// Effect run synchronously during commit, before passive effects.
pub fn use_layout_effect<F, R>(effect: F) -> Result<(), HookError>
where
    F: FnOnce() -> R + 'static,
    R: IntoTeardown,
{
    record_effect(HookKind::LayoutEffect, effect, None::<()>)
}

pub fn use_layout_effect_with<F, R, D>(effect: F, deps: D) -> Result<(), HookError>
where
    F: FnOnce() -> R + 'static,
    R: IntoTeardown,
    D: PartialEq + 'static,
{
    record_effect(HookKind::LayoutEffect, effect, Some(deps))
}

/// Exposes a value created by `create` through `node_ref`, typically the
/// ref forwarded to this component. Recreated when `deps` or the ref
/// change, or on every render when `deps` is `None`.
pub fn use_imperative_handle<T, D>(
    node_ref: Option<&NodeRef>,
    create: impl FnOnce() -> T + 'static,
    deps: Option<D>,
) -> Result<(), HookError>
where
    T: 'static,
    D: PartialEq + 'static,
{
    let target = node_ref.cloned();
    let deps = deps.map(|deps| (deps, target.clone()));
    record_effect(
        HookKind::ImperativeHandle,
        move || {
            if let Some(target) = target {
                target.set(Some(RefValue::Value(Rc::new(create()))));
            }
        },
        deps,
    )
}

// ---------------------------------------------------------------------------
// Memoization

fn memo_slot<T, D>(kind: HookKind, factory: impl FnOnce() -> T, deps: D) -> Result<T, HookError>
where
    T: Clone + 'static,
    D: PartialEq + 'static,
{
    let (instance, index) = next_slot(kind)?;
    let cached = with_slot(&instance, index, |slot| match slot {
        HookSlot::Memo(memo) if !deps_changed(memo.deps.as_deref(), Some(&deps)) => {
            Ok(Some(Rc::clone(&memo.value)))
        }
        HookSlot::Memo(_) | HookSlot::Vacant => Ok(None),
        other => Err(mismatch(index, "memo", other)),
    })?;
    if let Some(value) = cached {
        return value
            .downcast_ref::<T>()
            .cloned()
            .ok_or(HookError::HookKindMismatch {
                index,
                expected: "memo",
                found: "memo of another type",
            });
    }
    let value = factory();
    let stored: Rc<dyn Any> = Rc::new(value.clone());
    with_slot(&instance, index, |slot| {
        *slot = HookSlot::Memo(MemoSlot {
            value: stored,
            deps: Some(Box::new(deps)),
        })
    });
    Ok(value)
}

/// Caches `factory()` until `deps` change.
pub fn use_memo<T, D>(factory: impl FnOnce() -> T, deps: D) -> Result<T, HookError>
where
    T: Clone + 'static,
    D: PartialEq + 'static,
{
    memo_slot(HookKind::Memo, factory, deps)
}

/// Keeps the same callback value until `deps` change.
pub fn use_callback<F, D>(callback: F, deps: D) -> Result<F, HookError>
where
    F: Clone + 'static,
    D: PartialEq + 'static,
{
    memo_slot(HookKind::Callback, move || callback, deps)
}

/// Mutable box that lives as long as the component.
pub struct MutableRef<T>(Rc<RefCell<T>>);

impl<T> MutableRef<T> {
    pub fn borrow(&self) -> std::cell::Ref<'_, T> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> std::cell::RefMut<'_, T> {
        self.0.borrow_mut()
    }

    pub fn set(&self, value: T) {
        *self.0.borrow_mut() = value;
    }
}

impl<T: Clone> MutableRef<T> {
    pub fn current(&self) -> T {
        self.0.borrow().clone()
    }
}

impl<T> Clone for MutableRef<T> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<T> PartialEq for MutableRef<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl<T: fmt::Debug> fmt::Debug for MutableRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MutableRef").field(&self.0.borrow()).finish()
    }
}

pub fn use_ref<T: 'static>(initial: impl FnOnce() -> T) -> Result<MutableRef<T>, HookError> {
    memo_slot(
        HookKind::Ref,
        || MutableRef(Rc::new(RefCell::new(initial()))),
        (),
    )
}

// ---------------------------------------------------------------------------
// Context

/// Reads the nearest provided value of `context`, or its default. The
/// component re-renders whenever that provider's value changes.
pub fn use_context<T>(context: &Context<T>) -> Result<T, HookError>
where
    T: Clone + PartialEq + 'static,
{
    let (instance, index) = next_slot(HookKind::Context)?;
    let subscribed = with_slot(&instance, index, |slot| match slot {
        HookSlot::Context(existing) if existing.context == context.id() => Ok(existing.subscribed),
        HookSlot::Vacant => {
            *slot = HookSlot::Context(ContextSlot {
                context: context.id(),
                subscribed: false,
            });
            Ok(false)
        }
        other => Err(mismatch(index, "context", other)),
    })?;
    let Some(provider) = instance.context().get(context.id()) else {
        return Ok(context.default_value());
    };
    if !subscribed {
        provider.subscribe(&instance);
        instance.subscribe(Rc::clone(&provider));
        with_slot(&instance, index, |slot| {
            if let HookSlot::Context(existing) = slot {
                existing.subscribed = true;
            }
        });
    }
    Ok(provider.value::<T>().unwrap_or_else(|| context.default_value()))
}

// ---------------------------------------------------------------------------
// Error boundaries

pub(crate) struct ErrorBoundarySlot {
    handler: RefCell<Option<Rc<dyn Fn(&RenderError)>>>,
    error: RefCell<Option<RenderError>>,
    instance: Weak<ComponentInstance>,
}

impl ErrorBoundarySlot {
    pub(crate) fn capture(&self, error: &RenderError) {
        let handler = self.handler.borrow().clone();
        if let Some(handler) = handler {
            handler(error);
        }
        self.error.replace(Some(error.clone()));
        if let Some(instance) = self.instance.upgrade() {
            instance.enqueue_render();
        }
    }
}

/// Clears the error captured by [`use_error_boundary`].
#[derive(Clone)]
pub struct ResetError {
    slot: Weak<ErrorBoundarySlot>,
}

impl ResetError {
    /// Clears the captured error and re-renders the boundary. No-op when
    /// nothing was captured.
    pub fn reset(&self) {
        let Some(slot) = self.slot.upgrade() else {
            return;
        };
        let had_error = slot.error.borrow_mut().take().is_some();
        if had_error {
            if let Some(instance) = slot.instance.upgrade() {
                instance.enqueue_render();
            }
        }
    }
}

impl fmt::Debug for ResetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ResetError")
    }
}

fn boundary_slot(
    handler: Option<Rc<dyn Fn(&RenderError)>>,
) -> Result<(Option<RenderError>, ResetError), HookError> {
    let (instance, index) = next_slot(HookKind::ErrorBoundary)?;
    let slot = with_slot(&instance, index, |slot| match slot {
        HookSlot::ErrorBoundary(boundary) => Ok(Rc::clone(boundary)),
        HookSlot::Vacant => {
            let boundary = Rc::new(ErrorBoundarySlot {
                handler: RefCell::new(None),
                error: RefCell::new(None),
                instance: Rc::downgrade(&instance),
            });
            *slot = HookSlot::ErrorBoundary(Rc::clone(&boundary));
            Ok(boundary)
        }
        other => Err(mismatch(index, "error boundary", other)),
    })?;
    slot.handler.replace(handler);
    instance.install_boundary(&slot);
    let error = slot.error.borrow().clone();
    Ok((
        error,
        ResetError {
            slot: Rc::downgrade(&slot),
        },
    ))
}

/// Turns the component into an error boundary. Returns the error caught
/// from a descendant, if any, and a handle that clears it.
pub fn use_error_boundary() -> Result<(Option<RenderError>, ResetError), HookError> {
    boundary_slot(None)
}

/// Like [`use_error_boundary`], calling `handler` whenever an error is
/// caught.
pub fn use_error_boundary_with(
    handler: impl Fn(&RenderError) + 'static,
) -> Result<(Option<RenderError>, ResetError), HookError> {
    boundary_slot(Some(Rc::new(handler)))
}

// ---------------------------------------------------------------------------
// Debugging

/// Reports a label for devtools through the debug value observer. Does
/// not allocate a slot.
pub fn use_debug_value<T: fmt::Debug>(value: &T) -> Result<(), HookError> {
    use_debug_value_with(value, |value| format!("{value:?}"))
}

pub fn use_debug_value_with<T>(value: &T, format: impl FnOnce(&T) -> String) -> Result<(), HookError> {
    let instance = current_instance()?;
    if let Some(observer) = instance.runtime().observer(|o| o.debug_value.clone()) {
        observer(&instance, &format(value));
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/hooks_tests.rs"]
mod tests;
