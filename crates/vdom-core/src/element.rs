//! Immutable node descriptions and the values they carry.
//!
//! An [`Element`] is a cheap, reference counted description of one node:
//! a text payload, a native tag, a component or a fragment, together with
//! its props, key, ref and children. Builder methods consume the element
//! and return an updated copy, so a description never changes once it has
//! been handed to the reconciler.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::applier::NodeId;
use crate::component::ComponentType;

/// Explicit identity of a child inside its parent's child list.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Key {
    Str(Rc<str>),
    Int(i64),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Str(value) => f.write_str(value),
            Key::Int(value) => write!(f, "{value}"),
        }
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key::Str(Rc::from(value))
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key::Str(Rc::from(value))
    }
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Key::Int(value)
    }
}

impl From<i32> for Key {
    fn from(value: i32) -> Self {
        Key::Int(i64::from(value))
    }
}

impl From<u32> for Key {
    fn from(value: u32) -> Self {
        Key::Int(i64::from(value))
    }
}

impl From<usize> for Key {
    fn from(value: usize) -> Self {
        Key::Int(value as i64)
    }
}

/// Ordered inline style declarations.
pub type Style = IndexMap<Rc<str>, Rc<str>>;

/// Event delivered to an [`EventHandler`] by the native layer.
#[derive(Clone, Debug)]
pub struct Event {
    name: Rc<str>,
    target: NodeId,
    detail: PropValue,
}

impl Event {
    pub fn new(name: impl Into<Rc<str>>, target: NodeId) -> Self {
        Self {
            name: name.into(),
            target,
            detail: PropValue::Null,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<PropValue>) -> Self {
        self.detail = detail.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target(&self) -> NodeId {
        self.target
    }

    pub fn detail(&self) -> &PropValue {
        &self.detail
    }
}

/// Shared event callback. Two handlers are equal only when they are the
/// same allocation.
#[derive(Clone)]
pub struct EventHandler(Rc<dyn Fn(&Event)>);

impl EventHandler {
    pub fn new(handler: impl Fn(&Event) + 'static) -> Self {
        Self(Rc::new(handler))
    }

    pub fn call(&self, event: &Event) {
        (self.0)(event)
    }
}

impl PartialEq for EventHandler {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventHandler({:p})", Rc::as_ptr(&self.0) as *const ())
    }
}

/// Value of a single property.
#[derive(Clone)]
pub enum PropValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Style(Rc<Style>),
    Handler(EventHandler),
    /// Opaque payload, compared by identity.
    Any(Rc<dyn Any>),
}

impl PropValue {
    pub fn any<T: 'static>(value: T) -> Self {
        PropValue::Any(Rc::new(value))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, PropValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropValue::Str(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            PropValue::Float(value) => Some(*value),
            PropValue::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_style(&self) -> Option<&Style> {
        match self {
            PropValue::Style(style) => Some(style),
            _ => None,
        }
    }

    pub fn as_handler(&self) -> Option<&EventHandler> {
        match self {
            PropValue::Handler(handler) => Some(handler),
            _ => None,
        }
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        match self {
            PropValue::Any(value) => value.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Returns the shared payload of an `Any` value.
    pub fn downcast_rc<T: 'static>(&self) -> Option<Rc<T>> {
        match self {
            PropValue::Any(value) => Rc::clone(value).downcast::<T>().ok(),
            _ => None,
        }
    }
}

impl PartialEq for PropValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (PropValue::Null, PropValue::Null) => true,
            (PropValue::Bool(a), PropValue::Bool(b)) => a == b,
            (PropValue::Int(a), PropValue::Int(b)) => a == b,
            (PropValue::Float(a), PropValue::Float(b)) => a == b,
            (PropValue::Str(a), PropValue::Str(b)) => a == b,
            (PropValue::Style(a), PropValue::Style(b)) => Rc::ptr_eq(a, b) || a == b,
            (PropValue::Handler(a), PropValue::Handler(b)) => a == b,
            (PropValue::Any(a), PropValue::Any(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropValue::Null => f.write_str("Null"),
            PropValue::Bool(value) => write!(f, "Bool({value})"),
            PropValue::Int(value) => write!(f, "Int({value})"),
            PropValue::Float(value) => write!(f, "Float({value})"),
            PropValue::Str(value) => write!(f, "Str({value:?})"),
            PropValue::Style(style) => f.debug_tuple("Style").field(style).finish(),
            PropValue::Handler(handler) => fmt::Debug::fmt(handler, f),
            PropValue::Any(_) => f.write_str("Any(..)"),
        }
    }
}

impl From<bool> for PropValue {
    fn from(value: bool) -> Self {
        PropValue::Bool(value)
    }
}

impl From<i32> for PropValue {
    fn from(value: i32) -> Self {
        PropValue::Int(i64::from(value))
    }
}

impl From<i64> for PropValue {
    fn from(value: i64) -> Self {
        PropValue::Int(value)
    }
}

impl From<usize> for PropValue {
    fn from(value: usize) -> Self {
        PropValue::Int(value as i64)
    }
}

impl From<f64> for PropValue {
    fn from(value: f64) -> Self {
        PropValue::Float(value)
    }
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        PropValue::Str(Rc::from(value))
    }
}

impl From<String> for PropValue {
    fn from(value: String) -> Self {
        PropValue::Str(Rc::from(value))
    }
}

impl From<Rc<str>> for PropValue {
    fn from(value: Rc<str>) -> Self {
        PropValue::Str(value)
    }
}

impl From<Style> for PropValue {
    fn from(value: Style) -> Self {
        PropValue::Style(Rc::new(value))
    }
}

impl From<EventHandler> for PropValue {
    fn from(value: EventHandler) -> Self {
        PropValue::Handler(value)
    }
}

impl<T: Into<PropValue>> From<Option<T>> for PropValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(PropValue::Null, Into::into)
    }
}

/// Builds a style map from `(name, value)` pairs.
pub fn style<'a>(declarations: impl IntoIterator<Item = (&'a str, &'a str)>) -> Style {
    declarations
        .into_iter()
        .map(|(name, value)| (Rc::from(name), Rc::from(value)))
        .collect()
}

/// Value delivered to a [`NodeRef`].
#[derive(Clone)]
pub enum RefValue {
    Node(NodeId),
    Value(Rc<dyn Any>),
}

impl RefValue {
    pub fn node(&self) -> Option<NodeId> {
        match self {
            RefValue::Node(id) => Some(*id),
            RefValue::Value(_) => None,
        }
    }

    pub fn downcast<T: 'static>(&self) -> Option<Rc<T>> {
        match self {
            RefValue::Value(value) => Rc::clone(value).downcast::<T>().ok(),
            RefValue::Node(_) => None,
        }
    }
}

impl fmt::Debug for RefValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefValue::Node(id) => write!(f, "Node({id})"),
            RefValue::Value(_) => f.write_str("Value(..)"),
        }
    }
}

enum RefTarget {
    Callback(Box<dyn Fn(Option<RefValue>)>),
    Cell(RefCell<Option<RefValue>>),
}

/// Handle receiving a native node or an imperative value.
///
/// Box refs store the value for later reads; callback refs are invoked
/// with the new value and with `None` when it is released. Equality is
/// identity.
#[derive(Clone)]
pub struct NodeRef(Rc<RefTarget>);

impl NodeRef {
    pub fn new() -> Self {
        Self(Rc::new(RefTarget::Cell(RefCell::new(None))))
    }

    pub fn callback(callback: impl Fn(Option<RefValue>) + 'static) -> Self {
        Self(Rc::new(RefTarget::Callback(Box::new(callback))))
    }

    /// Current value of a box ref. Callback refs always report `None`.
    pub fn get(&self) -> Option<RefValue> {
        match &*self.0 {
            RefTarget::Cell(cell) => cell.borrow().clone(),
            RefTarget::Callback(_) => None,
        }
    }

    pub fn node(&self) -> Option<NodeId> {
        self.get().and_then(|value| value.node())
    }

    pub(crate) fn set(&self, value: Option<RefValue>) {
        match &*self.0 {
            RefTarget::Cell(cell) => {
                cell.replace(value);
            }
            RefTarget::Callback(callback) => callback(value),
        }
    }
}

impl Default for NodeRef {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for NodeRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeRef({:p})", Rc::as_ptr(&self.0))
    }
}

/// Ordered child list of an element or a component's output.
///
/// Holes (`None`) keep their position so unkeyed siblings stay aligned
/// when something is rendered conditionally.
#[derive(Clone, Default)]
pub struct Children(Vec<Option<Element>>);

impl Children {
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, child: impl Into<Children>) {
        self.0.extend(child.into().0);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[Option<Element>] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<Option<Element>> {
        self.0
    }
}

impl From<Element> for Children {
    fn from(value: Element) -> Self {
        Self(vec![Some(value)])
    }
}

impl From<Option<Element>> for Children {
    fn from(value: Option<Element>) -> Self {
        Self(vec![value])
    }
}

impl From<Vec<Element>> for Children {
    fn from(value: Vec<Element>) -> Self {
        Self(value.into_iter().map(Some).collect())
    }
}

impl From<Vec<Option<Element>>> for Children {
    fn from(value: Vec<Option<Element>>) -> Self {
        Self(value)
    }
}

impl From<&str> for Children {
    fn from(value: &str) -> Self {
        Self::from(text(value))
    }
}

impl From<String> for Children {
    fn from(value: String) -> Self {
        Self::from(text(value))
    }
}

impl From<()> for Children {
    fn from(_: ()) -> Self {
        Self::empty()
    }
}

impl FromIterator<Element> for Children {
    fn from_iter<I: IntoIterator<Item = Element>>(iter: I) -> Self {
        Self(iter.into_iter().map(Some).collect())
    }
}

/// Props of an element: named values plus the child list.
#[derive(Clone, Default)]
pub struct Props {
    values: Rc<IndexMap<Rc<str>, PropValue>>,
    children: Rc<Vec<Option<Element>>>,
    forwarded_ref: Option<NodeRef>,
}

impl Props {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<Rc<str>>, value: impl Into<PropValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<Rc<str>>, value: impl Into<PropValue>) {
        Rc::make_mut(&mut self.values).insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&PropValue> {
        self.values.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(PropValue::as_str)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(PropValue::as_bool)
    }

    pub fn get_int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(PropValue::as_int)
    }

    pub fn get_handler(&self, name: &str) -> Option<&EventHandler> {
        self.get(name).and_then(PropValue::as_handler)
    }

    pub fn get_any<T: 'static>(&self, name: &str) -> Option<&T> {
        self.get(name).and_then(PropValue::downcast_ref::<T>)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropValue)> {
        self.values.iter().map(|(name, value)| (&**name, value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn children(&self) -> &[Option<Element>] {
        &self.children
    }

    /// Non-empty children, in order.
    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().flatten()
    }

    /// Copies the children into a fresh [`Children`] list.
    pub fn children_list(&self) -> Children {
        Children(self.children.to_vec())
    }

    /// Ref attached to the component element these props were rendered from.
    pub fn forwarded_ref(&self) -> Option<&NodeRef> {
        self.forwarded_ref.as_ref()
    }

    /// Same values and identical child elements.
    pub fn shallow_eq(&self, other: &Props) -> bool {
        if !(Rc::ptr_eq(&self.values, &other.values) || self.values == other.values) {
            return false;
        }
        if self.forwarded_ref != other.forwarded_ref {
            return false;
        }
        Rc::ptr_eq(&self.children, &other.children)
            || (self.children.len() == other.children.len()
                && self
                    .children
                    .iter()
                    .zip(other.children.iter())
                    .all(|(a, b)| match (a, b) {
                        (Some(a), Some(b)) => a.ptr_eq(b),
                        (None, None) => true,
                        _ => false,
                    }))
    }

    pub(crate) fn set_children(&mut self, children: Children) {
        self.children = Rc::new(children.0);
    }

    pub(crate) fn push_children(&mut self, children: Children) {
        Rc::make_mut(&mut self.children).extend(children.0);
    }

    pub(crate) fn with_forwarded_ref(&self, node_ref: Option<&NodeRef>) -> Props {
        let mut props = self.clone();
        props.forwarded_ref = node_ref.cloned();
        props
    }
}

impl fmt::Debug for Props {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.values.iter()).finish()
    }
}

/// What an element describes.
#[derive(Clone)]
pub enum ElementKind {
    Text(Rc<str>),
    Tag(Rc<str>),
    Component(ComponentType),
    Fragment,
}

impl ElementKind {
    /// Whether a runtime record created for `self` can be reused for `other`.
    pub fn same_type(&self, other: &ElementKind) -> bool {
        match (self, other) {
            (ElementKind::Text(_), ElementKind::Text(_)) => true,
            (ElementKind::Tag(a), ElementKind::Tag(b)) => a == b,
            (ElementKind::Component(a), ElementKind::Component(b)) => a == b,
            (ElementKind::Fragment, ElementKind::Fragment) => true,
            _ => false,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ElementKind::Text(_) => "#text",
            ElementKind::Tag(tag) => tag,
            ElementKind::Component(component) => component.name(),
            ElementKind::Fragment => "Fragment",
        }
    }

    pub fn is_native(&self) -> bool {
        matches!(self, ElementKind::Text(_) | ElementKind::Tag(_))
    }
}

#[derive(Clone)]
struct ElementInner {
    kind: ElementKind,
    props: Props,
    key: Option<Key>,
    node_ref: Option<NodeRef>,
}

/// Immutable description of one UI node.
#[derive(Clone)]
pub struct Element(Rc<ElementInner>);

impl Element {
    fn from_kind(kind: ElementKind) -> Self {
        Self(Rc::new(ElementInner {
            kind,
            props: Props::default(),
            key: None,
            node_ref: None,
        }))
    }

    pub fn component(component: ComponentType) -> Self {
        Self::from_kind(ElementKind::Component(component))
    }

    pub fn prop(mut self, name: impl Into<Rc<str>>, value: impl Into<PropValue>) -> Self {
        Rc::make_mut(&mut self.0).props.set(name, value);
        self
    }

    /// Replaces all props, keeping the children already attached.
    pub fn props(mut self, props: Props) -> Self {
        let inner = Rc::make_mut(&mut self.0);
        let children = Rc::clone(&inner.props.children);
        inner.props = props;
        inner.props.children = children;
        self
    }

    pub fn key(mut self, key: impl Into<Key>) -> Self {
        Rc::make_mut(&mut self.0).key = Some(key.into());
        self
    }

    pub fn node_ref(mut self, node_ref: &NodeRef) -> Self {
        Rc::make_mut(&mut self.0).node_ref = Some(node_ref.clone());
        self
    }

    pub fn child(mut self, child: impl Into<Children>) -> Self {
        Rc::make_mut(&mut self.0).props.push_children(child.into());
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = Element>) -> Self {
        let children: Children = children.into_iter().collect();
        Rc::make_mut(&mut self.0).props.push_children(children);
        self
    }

    pub fn kind(&self) -> &ElementKind {
        &self.0.kind
    }

    pub fn get_props(&self) -> &Props {
        &self.0.props
    }

    pub fn get_key(&self) -> Option<&Key> {
        self.0.key.as_ref()
    }

    pub fn get_ref(&self) -> Option<&NodeRef> {
        self.0.node_ref.as_ref()
    }

    pub fn child_slots(&self) -> &[Option<Element>] {
        self.0.props.children()
    }

    pub fn text(&self) -> Option<&str> {
        match &self.0.kind {
            ElementKind::Text(data) => Some(data),
            _ => None,
        }
    }

    pub fn tag(&self) -> Option<&str> {
        match &self.0.kind {
            ElementKind::Tag(tag) => Some(tag),
            _ => None,
        }
    }

    pub fn ptr_eq(&self, other: &Element) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("Element");
        out.field("kind", &self.0.kind.name());
        if let Some(data) = self.text() {
            out.field("text", &data);
        }
        if let Some(key) = &self.0.key {
            out.field("key", key);
        }
        out.finish()
    }
}

impl From<&str> for Element {
    fn from(value: &str) -> Self {
        text(value)
    }
}

impl From<String> for Element {
    fn from(value: String) -> Self {
        text(value)
    }
}

/// Native element with the given tag.
pub fn h(tag: impl Into<Rc<str>>) -> Element {
    Element::from_kind(ElementKind::Tag(tag.into()))
}

/// Text node description.
pub fn text(data: impl Into<Rc<str>>) -> Element {
    Element::from_kind(ElementKind::Text(data.into()))
}

/// Groups children without introducing a native node.
pub fn fragment(children: impl Into<Children>) -> Element {
    Element::from_kind(ElementKind::Fragment).child(children)
}

/// Builds an element from its parts.
pub fn create_element(
    kind: ElementKind,
    props: Props,
    key: Option<Key>,
    node_ref: Option<NodeRef>,
    children: impl Into<Children>,
) -> Element {
    let mut props = props;
    props.push_children(children.into());
    Element(Rc::new(ElementInner {
        kind,
        props,
        key,
        node_ref,
    }))
}

/// Overrides applied by [`clone_element`].
#[derive(Default)]
pub struct Overrides {
    props: Vec<(Rc<str>, PropValue)>,
    key: Option<Key>,
    node_ref: Option<NodeRef>,
    children: Option<Children>,
}

impl Overrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prop(mut self, name: impl Into<Rc<str>>, value: impl Into<PropValue>) -> Self {
        self.props.push((name.into(), value.into()));
        self
    }

    pub fn key(mut self, key: impl Into<Key>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn node_ref(mut self, node_ref: &NodeRef) -> Self {
        self.node_ref = Some(node_ref.clone());
        self
    }

    pub fn children(mut self, children: impl Into<Children>) -> Self {
        self.children = Some(children.into());
        self
    }
}

/// Copies `element`, merging the overridden props on top of the existing
/// ones. Key and ref survive unless overridden; children are replaced only
/// when new children are supplied.
pub fn clone_element(element: &Element, overrides: Overrides) -> Element {
    let mut inner = (*element.0).clone();
    for (name, value) in overrides.props {
        inner.props.set(name, value);
    }
    if let Some(key) = overrides.key {
        inner.key = Some(key);
    }
    if let Some(node_ref) = overrides.node_ref {
        inner.node_ref = Some(node_ref);
    }
    if let Some(children) = overrides.children {
        inner.props.set_children(children);
    }
    Element(Rc::new(inner))
}
