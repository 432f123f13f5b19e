//! Native apply layer.
//!
//! The reconciler never touches a platform tree directly. Every mutation
//! goes through an [`Applier`], which owns the native nodes and hands out
//! opaque [`NodeId`] handles. [`MemoryApplier`] is a complete in-memory
//! implementation used by tests, benches and headless hosts.

use std::fmt::Write as _;

use indexmap::IndexMap;

use crate::element::{Event, EventHandler, PropValue, Style};
use crate::error::NodeError;

pub type NodeId = usize;

/// Shape of an existing native node, used when adopting pre-rendered markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeKind<'a> {
    Text(&'a str),
    Element(&'a str),
}

/// Mutations and queries the reconciler needs from a native tree.
pub trait Applier {
    fn create_element(&mut self, tag: &str, svg: bool) -> NodeId;
    fn create_text(&mut self, data: &str) -> NodeId;
    fn set_text(&mut self, node: NodeId, data: &str) -> Result<(), NodeError>;

    /// Applies one property change. `old` is [`PropValue::Null`] when the
    /// property was absent and `new` is `Null` when it is being removed.
    fn apply_property(
        &mut self,
        node: NodeId,
        name: &str,
        new: &PropValue,
        old: &PropValue,
        svg: bool,
    ) -> Result<(), NodeError>;

    /// Replaces the node's content with raw markup, or clears it for `None`.
    fn set_inner_html(&mut self, node: NodeId, html: Option<&str>) -> Result<(), NodeError>;

    /// Inserts or moves `child` under `parent`, before `before` or at the end.
    fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        before: Option<NodeId>,
    ) -> Result<(), NodeError>;

    /// Detaches `node` from its parent and releases it with its subtree.
    fn remove(&mut self, node: NodeId) -> Result<(), NodeError>;

    fn first_child(&self, node: NodeId) -> Option<NodeId>;
    fn next_sibling(&self, node: NodeId) -> Option<NodeId>;
    fn native_kind(&self, node: NodeId) -> Option<NativeKind<'_>>;

    /// Live value of a property that users can change behind the
    /// reconciler's back (`value`, `checked`).
    fn read_property(&self, _node: NodeId, _name: &str) -> Option<PropValue> {
        None
    }
}

/// Operation recorded by [`MemoryApplier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplierOp {
    CreateElement { id: NodeId, tag: String },
    CreateText { id: NodeId, data: String },
    SetText { id: NodeId, data: String },
    SetProperty { id: NodeId, name: String },
    RemoveProperty { id: NodeId, name: String },
    SetStyle { id: NodeId, name: String },
    AttachListener { id: NodeId, event: String },
    DetachListener { id: NodeId, event: String },
    SetInnerHtml { id: NodeId },
    Insert { parent: NodeId, child: NodeId, before: Option<NodeId> },
    Remove { id: NodeId },
}

#[derive(Debug, Clone)]
pub enum MemoryNodeKind {
    Element { tag: String, svg: bool },
    Text(String),
}

pub struct MemoryNode {
    kind: MemoryNodeKind,
    attributes: IndexMap<String, PropValue>,
    style: IndexMap<String, String>,
    listeners: IndexMap<String, EventHandler>,
    inner_html: Option<String>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl MemoryNode {
    fn new(kind: MemoryNodeKind) -> Self {
        Self {
            kind,
            attributes: IndexMap::new(),
            style: IndexMap::new(),
            listeners: IndexMap::new(),
            inner_html: None,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn kind(&self) -> &MemoryNodeKind {
        &self.kind
    }

    pub fn attribute(&self, name: &str) -> Option<&PropValue> {
        self.attributes.get(name)
    }

    pub fn style(&self, name: &str) -> Option<&str> {
        self.style.get(name).map(String::as_str)
    }

    pub fn has_listener(&self, event: &str) -> bool {
        self.listeners.contains_key(event)
    }

    pub fn inner_html(&self) -> Option<&str> {
        self.inner_html.as_deref()
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

/// Arena backed native tree that records every mutation it receives.
#[derive(Default)]
pub struct MemoryApplier {
    nodes: Vec<Option<MemoryNode>>,
    ops: Vec<ApplierOp>,
}

impl MemoryApplier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a detached element to serve as a render container.
    pub fn create_root(&mut self, tag: &str) -> NodeId {
        self.alloc(MemoryNodeKind::Element {
            tag: tag.to_string(),
            svg: false,
        })
    }

    pub fn node(&self, id: NodeId) -> Result<&MemoryNode, NodeError> {
        self.nodes
            .get(id)
            .and_then(Option::as_ref)
            .ok_or(NodeError::Missing { id })
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut MemoryNode, NodeError> {
        self.nodes
            .get_mut(id)
            .and_then(Option::as_mut)
            .ok_or(NodeError::Missing { id })
    }

    pub fn contains(&self, id: NodeId) -> bool {
        matches!(self.nodes.get(id), Some(Some(_)))
    }

    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.node(id)
            .map(|node| node.children.clone())
            .unwrap_or_default()
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        match &self.node(id).ok()?.kind {
            MemoryNodeKind::Text(data) => Some(data),
            MemoryNodeKind::Element { .. } => None,
        }
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        match &self.node(id).ok()?.kind {
            MemoryNodeKind::Element { tag, .. } => Some(tag),
            MemoryNodeKind::Text(_) => None,
        }
    }

    pub fn ops(&self) -> &[ApplierOp] {
        &self.ops
    }

    pub fn take_ops(&mut self) -> Vec<ApplierOp> {
        std::mem::take(&mut self.ops)
    }

    pub fn clear_ops(&mut self) {
        self.ops.clear();
    }

    /// Invokes the handler registered for `event` on `target`. Returns
    /// whether a handler was found.
    pub fn dispatch_event(&self, target: NodeId, event: &str) -> bool {
        self.dispatch(Event::new(event, target))
    }

    pub fn dispatch(&self, event: Event) -> bool {
        let handler = self
            .node(event.target())
            .ok()
            .and_then(|node| node.listeners.get(event.name()).cloned());
        match handler {
            Some(handler) => {
                handler.call(&event);
                true
            }
            None => false,
        }
    }

    /// Builds an arena node without recording an operation. Useful for
    /// seeding markup before hydration.
    pub fn seed_element(&mut self, parent: NodeId, tag: &str) -> Result<NodeId, NodeError> {
        let id = self.alloc(MemoryNodeKind::Element {
            tag: tag.to_string(),
            svg: false,
        });
        self.link(parent, id, None)?;
        Ok(id)
    }

    pub fn seed_text(&mut self, parent: NodeId, data: &str) -> Result<NodeId, NodeError> {
        let id = self.alloc(MemoryNodeKind::Text(data.to_string()));
        self.link(parent, id, None)?;
        Ok(id)
    }

    /// Serializes the children of `id` as markup.
    pub fn inner_markup(&self, id: NodeId) -> String {
        let mut out = String::new();
        if let Ok(node) = self.node(id) {
            if let Some(html) = &node.inner_html {
                out.push_str(html);
            }
            for child in &node.children {
                self.write_markup(&mut out, *child);
            }
        }
        out
    }

    /// Serializes `id` and its subtree as markup.
    pub fn markup(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_markup(&mut out, id);
        out
    }

    fn write_markup(&self, out: &mut String, id: NodeId) {
        let Ok(node) = self.node(id) else {
            return;
        };
        match &node.kind {
            MemoryNodeKind::Text(data) => out.push_str(data),
            MemoryNodeKind::Element { tag, .. } => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in &node.attributes {
                    match value {
                        PropValue::Bool(true) => {
                            let _ = write!(out, " {name}");
                        }
                        PropValue::Str(value) => {
                            let _ = write!(out, " {name}=\"{value}\"");
                        }
                        PropValue::Int(value) => {
                            let _ = write!(out, " {name}=\"{value}\"");
                        }
                        PropValue::Float(value) => {
                            let _ = write!(out, " {name}=\"{value}\"");
                        }
                        _ => {}
                    }
                }
                if !node.style.is_empty() {
                    out.push_str(" style=\"");
                    for (name, value) in &node.style {
                        let _ = write!(out, "{name}:{value};");
                    }
                    out.push('"');
                }
                out.push('>');
                if let Some(html) = &node.inner_html {
                    out.push_str(html);
                }
                for child in &node.children {
                    self.write_markup(out, *child);
                }
                let _ = write!(out, "</{tag}>");
            }
        }
    }

    fn alloc(&mut self, kind: MemoryNodeKind) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Some(MemoryNode::new(kind)));
        id
    }

    fn unlink(&mut self, child: NodeId) -> Result<(), NodeError> {
        let parent = self.node(child)?.parent;
        if let Some(parent) = parent {
            let siblings = &mut self.node_mut(parent)?.children;
            let index = siblings
                .iter()
                .position(|id| *id == child)
                .ok_or(NodeError::NotAChild { parent, child })?;
            siblings.remove(index);
            self.node_mut(child)?.parent = None;
        }
        Ok(())
    }

    fn link(&mut self, parent: NodeId, child: NodeId, before: Option<NodeId>) -> Result<(), NodeError> {
        if !matches!(self.node(parent)?.kind, MemoryNodeKind::Element { .. }) {
            return Err(NodeError::NotAnElement { id: parent });
        }
        self.node(child)?;
        self.unlink(child)?;
        let siblings = &mut self.node_mut(parent)?.children;
        let index = match before {
            Some(anchor) => siblings
                .iter()
                .position(|id| *id == anchor)
                .ok_or(NodeError::NotAChild {
                    parent,
                    child: anchor,
                })?,
            None => siblings.len(),
        };
        siblings.insert(index, child);
        self.node_mut(child)?.parent = Some(parent);
        Ok(())
    }

    fn release(&mut self, id: NodeId) {
        let children = match self.nodes.get_mut(id).and_then(Option::take) {
            Some(node) => node.children,
            None => return,
        };
        for child in children {
            self.release(child);
        }
    }

    fn apply_style(&mut self, id: NodeId, new: &PropValue, old: &PropValue) -> Result<(), NodeError> {
        let node = self.node_mut(id)?;
        let mut touched = Vec::new();
        match new {
            PropValue::Style(style) => {
                if let PropValue::Str(_) = old {
                    node.attributes.shift_remove("style");
                }
                let previous: Option<&Style> = old.as_style();
                if let Some(previous) = previous {
                    for name in previous.keys() {
                        if !style.contains_key(name) {
                            node.style.shift_remove(&**name);
                            touched.push(name.to_string());
                        }
                    }
                } else {
                    node.style.clear();
                }
                for (name, value) in style.iter() {
                    if previous.and_then(|p| p.get(name)) != Some(value) {
                        node.style.insert(name.to_string(), value.to_string());
                        touched.push(name.to_string());
                    }
                }
            }
            PropValue::Str(css) => {
                node.style.clear();
                node.attributes
                    .insert("style".to_string(), PropValue::Str(css.clone()));
                touched.push("style".to_string());
            }
            _ => {
                node.style.clear();
                node.attributes.shift_remove("style");
                touched.push("style".to_string());
            }
        }
        self.ops
            .extend(touched.into_iter().map(|name| ApplierOp::SetStyle { id, name }));
        Ok(())
    }
}

fn attribute_name(name: &str, svg: bool) -> String {
    if name == "className" {
        return "class".to_string();
    }
    if svg {
        if let Some(rest) = name.strip_prefix("xlink:") {
            return rest.to_string();
        }
        if let Some(rest) = name.strip_prefix("xlinkH") {
            return format!("h{rest}");
        }
    }
    name.to_string()
}

impl Applier for MemoryApplier {
    fn create_element(&mut self, tag: &str, svg: bool) -> NodeId {
        let id = self.alloc(MemoryNodeKind::Element {
            tag: tag.to_string(),
            svg,
        });
        self.ops.push(ApplierOp::CreateElement {
            id,
            tag: tag.to_string(),
        });
        id
    }

    fn create_text(&mut self, data: &str) -> NodeId {
        let id = self.alloc(MemoryNodeKind::Text(data.to_string()));
        self.ops.push(ApplierOp::CreateText {
            id,
            data: data.to_string(),
        });
        id
    }

    fn set_text(&mut self, node: NodeId, data: &str) -> Result<(), NodeError> {
        match &mut self.node_mut(node)?.kind {
            MemoryNodeKind::Text(current) => {
                current.clear();
                current.push_str(data);
            }
            MemoryNodeKind::Element { .. } => return Err(NodeError::NotAnElement { id: node }),
        }
        self.ops.push(ApplierOp::SetText {
            id: node,
            data: data.to_string(),
        });
        Ok(())
    }

    fn apply_property(
        &mut self,
        node: NodeId,
        name: &str,
        new: &PropValue,
        old: &PropValue,
        svg: bool,
    ) -> Result<(), NodeError> {
        if name == "style" {
            return self.apply_style(node, new, old);
        }
        if let Some(event) = name.strip_prefix("on") {
            let event = event.to_ascii_lowercase();
            let target = self.node_mut(node)?;
            match new {
                PropValue::Handler(handler) => {
                    // One proxy per event name; swapping handlers does not
                    // re-register it.
                    let attached = target
                        .listeners
                        .insert(event.clone(), handler.clone())
                        .is_none();
                    if attached {
                        self.ops.push(ApplierOp::AttachListener { id: node, event });
                    }
                }
                _ => {
                    if target.listeners.shift_remove(&event).is_some() {
                        self.ops.push(ApplierOp::DetachListener { id: node, event });
                    }
                }
            }
            return Ok(());
        }
        let name = attribute_name(name, svg);
        let target = self.node_mut(node)?;
        match new {
            PropValue::Null | PropValue::Bool(false)
                if name != "value" && name != "checked" =>
            {
                target.attributes.shift_remove(&name);
                self.ops.push(ApplierOp::RemoveProperty { id: node, name });
            }
            value => {
                target.attributes.insert(name.clone(), value.clone());
                self.ops.push(ApplierOp::SetProperty { id: node, name });
            }
        }
        Ok(())
    }

    fn set_inner_html(&mut self, node: NodeId, html: Option<&str>) -> Result<(), NodeError> {
        let children = {
            let target = self.node_mut(node)?;
            if !matches!(target.kind, MemoryNodeKind::Element { .. }) {
                return Err(NodeError::NotAnElement { id: node });
            }
            target.inner_html = html.map(str::to_string);
            std::mem::take(&mut target.children)
        };
        for child in children {
            self.release(child);
        }
        self.ops.push(ApplierOp::SetInnerHtml { id: node });
        Ok(())
    }

    fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        before: Option<NodeId>,
    ) -> Result<(), NodeError> {
        self.link(parent, child, before)?;
        self.ops.push(ApplierOp::Insert {
            parent,
            child,
            before,
        });
        Ok(())
    }

    fn remove(&mut self, node: NodeId) -> Result<(), NodeError> {
        self.node(node)?;
        self.unlink(node)?;
        self.release(node);
        self.ops.push(ApplierOp::Remove { id: node });
        Ok(())
    }

    fn first_child(&self, node: NodeId) -> Option<NodeId> {
        self.node(node).ok()?.children.first().copied()
    }

    fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        let parent = self.node(node).ok()?.parent?;
        let siblings = &self.node(parent).ok()?.children;
        let index = siblings.iter().position(|id| *id == node)?;
        siblings.get(index + 1).copied()
    }

    fn native_kind(&self, node: NodeId) -> Option<NativeKind<'_>> {
        Some(match &self.node(node).ok()?.kind {
            MemoryNodeKind::Text(data) => NativeKind::Text(data),
            MemoryNodeKind::Element { tag, .. } => NativeKind::Element(tag),
        })
    }

    fn read_property(&self, node: NodeId, name: &str) -> Option<PropValue> {
        self.node(node).ok()?.attributes.get(name).cloned()
    }
}
