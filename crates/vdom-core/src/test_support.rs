use std::cell::RefCell;
use std::rc::Rc;

use crate::applier::{ApplierOp, MemoryApplier, NodeId};
use crate::element::Element;
use crate::error::RenderError;
use crate::options::{Observers, RendererOptions};
use crate::renderer::Renderer;
use crate::runtime::{Runtime, TestScheduler};

/// Renderer over a [`MemoryApplier`] with a manually driven scheduler.
pub(crate) struct Harness {
    pub(crate) renderer: Renderer<MemoryApplier>,
    pub(crate) scheduler: Rc<TestScheduler>,
    pub(crate) root: NodeId,
}

impl Harness {
    pub(crate) fn new() -> Self {
        Self::with_options(RendererOptions::default())
    }

    pub(crate) fn with_options(options: RendererOptions) -> Self {
        let scheduler = Rc::new(TestScheduler::default());
        let runtime = Runtime::with_options(scheduler.clone(), options);
        let mut applier = MemoryApplier::new();
        let root = applier.create_root("root");
        Self {
            renderer: Renderer::with_runtime(applier, runtime),
            scheduler,
            root,
        }
    }

    pub(crate) fn observe(&self, observers: Observers) {
        self.renderer.runtime().set_observers(observers);
    }

    pub(crate) fn render(&mut self, element: Element) -> Result<(), RenderError> {
        self.renderer.render(element, self.root)
    }

    pub(crate) fn markup(&self) -> String {
        self.renderer.applier().inner_markup(self.root)
    }

    pub(crate) fn children(&self) -> Vec<NodeId> {
        self.renderer.applier().children(self.root)
    }

    pub(crate) fn take_ops(&mut self) -> Vec<ApplierOp> {
        self.renderer.applier_mut().take_ops()
    }

    /// Signals a presented frame; runs scheduled passive effect flushes.
    pub(crate) fn present(&self) -> usize {
        self.scheduler.present()
    }

    pub(crate) fn rerender(&mut self) -> Result<usize, RenderError> {
        self.renderer.process_render_queue()
    }

    /// Alternates re-renders and presents until nothing is pending.
    pub(crate) fn settle(&mut self) -> Result<(), RenderError> {
        for _ in 0..100 {
            let rendered = self.rerender()?;
            let flushed = self.present();
            if rendered == 0 && flushed == 0 {
                return Ok(());
            }
        }
        panic!("harness did not settle");
    }
}

/// Shared event log for asserting callback order.
#[derive(Clone, Default)]
pub(crate) struct Log(Rc<RefCell<Vec<String>>>);

impl Log {
    pub(crate) fn push(&self, entry: impl Into<String>) {
        self.0.borrow_mut().push(entry.into());
    }

    pub(crate) fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.borrow_mut())
    }
}
