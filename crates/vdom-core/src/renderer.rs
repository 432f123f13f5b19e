//! Entry point: renders element trees into native containers and drives
//! queued re-renders.

use std::rc::Rc;

use hashbrown::HashMap;

use crate::applier::{Applier, NodeId};
use crate::commit::commit_root;
use crate::diff::{child_nodes, Frame, NativeScope, Reconciler};
use crate::element::{fragment, Element};
use crate::error::RenderError;
use crate::instance::ComponentInstance;
use crate::runtime::{DefaultScheduler, Runtime, RuntimeHandle};
use crate::tree::{RecordId, Tree};

/// Owns a native tree and the records of everything rendered into it.
pub struct Renderer<A: Applier> {
    applier: A,
    runtime: Runtime,
    tree: Tree,
    roots: HashMap<NodeId, RecordId>, // FUTURE(no_std): store roots in the record arena.
}

impl<A: Applier> Renderer<A> {
    pub fn new(applier: A) -> Self {
        Self::with_runtime(applier, Runtime::new(Rc::new(DefaultScheduler)))
    }

    pub fn with_runtime(applier: A, runtime: Runtime) -> Self {
        Self {
            applier,
            runtime,
            tree: Tree::new(),
            roots: HashMap::new(),
        }
    }

    /// Renders `element` into `parent`. The first render into a container
    /// adopts any nodes already present in it; later renders diff against
    /// the previous output.
    pub fn render(&mut self, element: Element, parent: NodeId) -> Result<(), RenderError> {
        self.render_with_anchor(element, parent, None)
    }

    /// Like [`Renderer::render`], but starts at `replace`: the new output
    /// is placed where `replace` sits, and `replace` is adopted when it
    /// matches or removed otherwise.
    pub fn render_replacing(
        &mut self,
        element: Element,
        parent: NodeId,
        replace: NodeId,
    ) -> Result<(), RenderError> {
        self.render_with_anchor(element, parent, Some(replace))
    }

    fn render_with_anchor(
        &mut self,
        element: Element,
        parent: NodeId,
        replace: Option<NodeId>,
    ) -> Result<(), RenderError> {
        let guard = self.runtime.begin_reconcile()?;
        let root = fragment(element);
        let old = self.roots.get(&parent).copied();

        let cursor = match (replace, old) {
            (Some(replace), _) => Some(replace),
            (None, Some(old)) => self
                .tree
                .first_native(old)
                .or_else(|| self.tree.next_native_sibling(old)),
            (None, None) => self.applier.first_child(parent),
        };
        let mut scope = NativeScope::new(parent, cursor);
        scope.excess = match (replace, old) {
            (Some(replace), _) => Some(vec![Some(replace)]),
            (None, Some(_)) => None,
            (None, None) => {
                let nodes = child_nodes(&self.applier, parent);
                (!nodes.is_empty()).then_some(nodes)
            }
        };
        if scope.excess.is_some() {
            log::debug!("adopting existing nodes under {parent}");
        }

        let frame = Frame::root();
        let mut reconciler = Reconciler::new(&mut self.applier, &mut self.tree, &self.runtime);
        let id = reconciler.claim_record(&frame, old, &root, parent);
        self.roots.insert(parent, id);
        let mut result = reconciler.diff(&mut scope, &frame, id, &root);
        if result.is_ok() {
            result = reconciler.remove_excess(&mut scope).map_err(RenderError::from);
        }
        let queue = reconciler.finish();
        drop(guard);

        result?;
        commit_root(&self.runtime, queue, &root)
    }

    /// Unmounts whatever was rendered into `parent`. Returns whether
    /// anything was mounted there.
    pub fn unmount(&mut self, parent: NodeId) -> Result<bool, RenderError> {
        let Some(id) = self.roots.remove(&parent) else {
            return Ok(false);
        };
        let _guard = self.runtime.begin_reconcile()?;
        let mut reconciler = Reconciler::new(&mut self.applier, &mut self.tree, &self.runtime);
        reconciler.unmount(id, false)?;
        Ok(true)
    }

    /// Re-renders every component that requested an update, shallowest
    /// first, until no requests remain. Each re-rendered component is
    /// committed on its own. Returns how many components were re-rendered.
    pub fn process_render_queue(&mut self) -> Result<usize, RenderError> {
        let max_passes = self.runtime.options().max_queue_passes();
        let mut rendered = 0;
        let mut passes = 0;
        loop {
            let mut queue = self.runtime.take_render_queue();
            if queue.is_empty() {
                return Ok(rendered);
            }
            if passes == max_passes {
                log::error!("render queue still busy after {passes} passes; dropping {} updates", queue.len());
                for instance in &queue {
                    instance.clear_dirty();
                }
                return Err(RenderError::RenderLoop { passes });
            }
            passes += 1;
            queue.sort_by_key(|instance| instance.depth());
            let mut pending = queue.into_iter();
            while let Some(instance) = pending.next() {
                if !instance.is_dirty() {
                    continue;
                }
                if !instance.is_attached() {
                    instance.clear_dirty();
                    continue;
                }
                if let Err(err) = self.rerender(&instance) {
                    self.runtime.restore_render_queue(pending.collect());
                    return Err(err);
                }
                rendered += 1;
            }
        }
    }

    fn rerender(&mut self, instance: &Rc<ComponentInstance>) -> Result<(), RenderError> {
        let Some(id) = instance.record() else {
            return Ok(());
        };
        let Some(record) = self.tree.get(id) else {
            return Ok(());
        };
        let element = record.element.clone();
        let frame = Frame {
            parent: record.parent,
            owner: instance.parent(),
            context: instance.context(),
            svg: record.svg,
            depth: record.depth,
        };
        let cursor = self
            .tree
            .first_native(id)
            .or_else(|| self.tree.next_native_sibling(id));
        let mut scope = NativeScope::new(record.parent_native, cursor);
        log::trace!("re-rendering `{}` at depth {}", instance.name(), record.depth);

        let guard = self.runtime.begin_reconcile()?;
        let mut reconciler = Reconciler::new(&mut self.applier, &mut self.tree, &self.runtime);
        let result = reconciler.diff(&mut scope, &frame, id, &element);
        let queue = reconciler.finish();
        drop(guard);

        result?;
        commit_root(&self.runtime, queue, &element)
    }

    /// Whether any component is waiting to re-render.
    pub fn needs_render(&self) -> bool {
        self.runtime.has_pending_renders()
    }

    pub fn flush_passive_effects(&self) -> Result<(), RenderError> {
        self.runtime.flush_passive_effects()
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn runtime_handle(&self) -> RuntimeHandle {
        self.runtime.handle()
    }

    pub fn applier(&self) -> &A {
        &self.applier
    }

    pub fn applier_mut(&mut self) -> &mut A {
        &mut self.applier
    }

    /// Number of live runtime records, for leak checks.
    pub fn record_count(&self) -> usize {
        self.tree.len()
    }
}

#[cfg(test)]
#[path = "tests/renderer_tests.rs"]
mod tests;
