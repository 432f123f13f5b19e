use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::error::RenderError;
use crate::instance::{route_error, ComponentInstance};
use crate::options::{Observers, RendererOptions};
use crate::platform::{PresentTask, RuntimeScheduler};

struct RuntimeInner {
    scheduler: Rc<dyn RuntimeScheduler>,
    options: RendererOptions,
    observers: RefCell<Observers>,
    render_queue: RefCell<Vec<Rc<ComponentInstance>>>,
    render_requested: Cell<bool>,
    passive_queue: RefCell<Vec<Rc<ComponentInstance>>>,
    present_requested: Cell<bool>,
    next_instance_id: Cell<u64>,
    reconciling: Cell<bool>,
}

impl RuntimeInner {
    fn new(scheduler: Rc<dyn RuntimeScheduler>, options: RendererOptions) -> Self {
        Self {
            scheduler,
            options,
            observers: RefCell::new(Observers::default()),
            render_queue: RefCell::new(Vec::new()),
            render_requested: Cell::new(false),
            passive_queue: RefCell::new(Vec::new()),
            present_requested: Cell::new(false),
            next_instance_id: Cell::new(1),
            reconciling: Cell::new(false),
        }
    }

    fn enqueue_render(&self, instance: Rc<ComponentInstance>) {
        self.render_queue.borrow_mut().push(instance);
        if !self.render_requested.replace(true) {
            log::debug!("requesting render pass");
            self.scheduler.schedule_render();
        }
    }

    fn take_render_queue(&self) -> Vec<Rc<ComponentInstance>> {
        self.render_requested.set(false);
        std::mem::take(&mut *self.render_queue.borrow_mut())
    }

    fn queue_passive(&self, instance: Rc<ComponentInstance>, handle: RuntimeHandle) {
        self.passive_queue.borrow_mut().push(instance);
        if self.present_requested.replace(true) {
            return;
        }
        log::debug!("scheduling passive effect flush");
        let task: PresentTask = Box::new(move || {
            if let Err(err) = handle.flush_passive_effects() {
                log::error!("passive effect flush failed: {err}");
            }
        });
        self.scheduler
            .schedule_after_present(task, self.options.passive_effect_timeout());
    }

    fn flush_passive_effects(&self) -> Result<(), RenderError> {
        let pending = std::mem::take(&mut *self.passive_queue.borrow_mut());
        // Effects queued while flushing belong to a new batch.
        self.present_requested.set(false);
        let mut unhandled = None;
        for instance in pending {
            if !instance.is_attached() {
                log::warn!(
                    "skipping passive effects of unmounted component `{}`",
                    instance.name()
                );
                instance.discard_pending_effects();
                continue;
            }
            if let Err(err) = instance.flush_passive() {
                if let Err(err) = route_error(instance.parent(), err) {
                    unhandled.get_or_insert(err);
                }
            }
        }
        unhandled.map_or(Ok(()), Err)
    }
}

/// Shared scheduling state for one or more renderers.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

impl Runtime {
    pub fn new(scheduler: Rc<dyn RuntimeScheduler>) -> Self {
        Self::with_options(scheduler, RendererOptions::default())
    }

    pub fn with_options(scheduler: Rc<dyn RuntimeScheduler>, options: RendererOptions) -> Self {
        Self {
            inner: Rc::new(RuntimeInner::new(scheduler, options)),
        }
    }

    pub fn handle(&self) -> RuntimeHandle {
        RuntimeHandle(Rc::downgrade(&self.inner))
    }

    pub fn options(&self) -> &RendererOptions {
        &self.inner.options
    }

    pub fn set_observers(&self, observers: Observers) {
        self.inner.observers.replace(observers);
    }

    /// Whether re-renders are queued.
    pub fn has_pending_renders(&self) -> bool {
        !self.inner.render_queue.borrow().is_empty()
    }

    /// Whether passive effects are waiting for a presentation signal.
    pub fn has_pending_effects(&self) -> bool {
        !self.inner.passive_queue.borrow().is_empty()
    }

    /// Runs every pending passive effect now. Unmounted components are
    /// skipped. Returns the first error no boundary handled.
    pub fn flush_passive_effects(&self) -> Result<(), RenderError> {
        self.inner.flush_passive_effects()
    }

    pub(crate) fn take_render_queue(&self) -> Vec<Rc<ComponentInstance>> {
        self.inner.take_render_queue()
    }

    /// Puts back instances that a failed pass could not reach.
    pub(crate) fn restore_render_queue(&self, instances: Vec<Rc<ComponentInstance>>) {
        for instance in instances {
            if instance.is_dirty() {
                self.inner.enqueue_render(instance);
            }
        }
    }

    pub(crate) fn next_instance_id(&self) -> u64 {
        let id = self.inner.next_instance_id.get();
        self.inner.next_instance_id.set(id + 1);
        id
    }

    pub(crate) fn observer<T>(&self, pick: impl FnOnce(&Observers) -> Option<T>) -> Option<T> {
        pick(&self.inner.observers.borrow())
    }

    pub(crate) fn begin_reconcile(&self) -> Result<ReconcileGuard, RenderError> {
        if self.inner.reconciling.replace(true) {
            log::warn!("render requested while another pass is reconciling");
            return Err(RenderError::ReentrantRender);
        }
        Ok(ReconcileGuard {
            runtime: Rc::clone(&self.inner),
        })
    }
}

/// Marks the runtime busy for the duration of one reconciliation.
pub(crate) struct ReconcileGuard {
    runtime: Rc<RuntimeInner>,
}

impl Drop for ReconcileGuard {
    fn drop(&mut self) {
        self.runtime.reconciling.set(false);
    }
}

/// Weak handle used by component instances and scheduled tasks.
#[derive(Clone)]
pub struct RuntimeHandle(Weak<RuntimeInner>);

impl RuntimeHandle {
    pub fn upgrade(&self) -> Option<Runtime> {
        self.0.upgrade().map(|inner| Runtime { inner })
    }

    pub fn flush_passive_effects(&self) -> Result<(), RenderError> {
        match self.0.upgrade() {
            Some(inner) => inner.flush_passive_effects(),
            None => Ok(()),
        }
    }

    pub(crate) fn enqueue_render(&self, instance: Rc<ComponentInstance>) {
        if let Some(inner) = self.0.upgrade() {
            inner.enqueue_render(instance);
        }
    }

    pub(crate) fn queue_passive(&self, instance: Rc<ComponentInstance>) {
        if let Some(inner) = self.0.upgrade() {
            inner.queue_passive(instance, self.clone());
        }
    }

    pub(crate) fn skip_effects(&self) -> bool {
        self.0
            .upgrade()
            .is_some_and(|inner| inner.options.skip_effects())
    }

    pub(crate) fn observer<T>(&self, pick: impl FnOnce(&Observers) -> Option<T>) -> Option<T> {
        let inner = self.0.upgrade()?;
        let observers = inner.observers.borrow();
        pick(&observers)
    }
}

/// Scheduler that ignores every request. Hosts using it drive
/// [`Renderer::process_render_queue`](crate::Renderer::process_render_queue)
/// and [`Runtime::flush_passive_effects`] themselves.
#[derive(Debug, Default)]
pub struct DefaultScheduler;

impl RuntimeScheduler for DefaultScheduler {
    fn schedule_render(&self) {}

    fn schedule_after_present(&self, _task: PresentTask, _timeout: std::time::Duration) {}
}

#[cfg(test)]
#[derive(Default)]
pub(crate) struct TestScheduler {
    pub(crate) render_requests: Cell<usize>,
    tasks: RefCell<Vec<(PresentTask, std::time::Duration)>>,
}

#[cfg(test)]
impl TestScheduler {
    pub(crate) fn pending_tasks(&self) -> usize {
        self.tasks.borrow().len()
    }

    pub(crate) fn last_timeout(&self) -> Option<std::time::Duration> {
        self.tasks.borrow().last().map(|(_, timeout)| *timeout)
    }

    /// Simulates a presentation signal.
    pub(crate) fn present(&self) -> usize {
        let tasks = std::mem::take(&mut *self.tasks.borrow_mut());
        let count = tasks.len();
        for (task, _) in tasks {
            task();
        }
        count
    }
}

#[cfg(test)]
impl RuntimeScheduler for TestScheduler {
    fn schedule_render(&self) {
        self.render_requests.set(self.render_requests.get() + 1);
    }

    fn schedule_after_present(&self, task: PresentTask, timeout: std::time::Duration) {
        self.tasks.borrow_mut().push((task, timeout));
    }
}
