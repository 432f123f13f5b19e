//! Commit phase: runs the callbacks queued while a tree was diffed.

use std::rc::Rc;

use crate::element::Element;
use crate::error::RenderError;
use crate::instance::{route_error, ComponentInstance};
use crate::runtime::Runtime;

/// Runs every queued instance's layout effects and lifecycle callbacks in
/// queue order. A failing instance stops only its own callbacks; the
/// error is routed from its parent and the remaining instances still run.
/// Returns the first error no boundary handled.
pub(crate) fn commit_root(
    runtime: &Runtime,
    queue: Vec<Rc<ComponentInstance>>,
    root: &Element,
) -> Result<(), RenderError> {
    log::trace!("committing {} instances", queue.len());
    if let Some(observer) = runtime.observer(|o| o.commit.clone()) {
        observer(root, queue.len());
    }
    let mut unhandled = None;
    for instance in queue {
        if !instance.is_attached() {
            continue;
        }
        if let Err(err) = instance.run_render_callbacks() {
            log::debug!("commit callback of `{}` failed: {err}", instance.name());
            if let Err(err) = route_error(instance.parent(), err) {
                unhandled.get_or_insert(err);
            }
        }
    }
    unhandled.map_or(Ok(()), Err)
}
