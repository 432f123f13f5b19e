use super::*;
use crate::applier::{ApplierOp, MemoryNodeKind};
use crate::component::{component_fn, ClassComponent, ClassContext, RenderResult, Snapshot};
use crate::element::{fragment, h, text, EventHandler, NodeRef};
use crate::hooks::{use_effect, use_state, Teardown};
use crate::instance::{ComponentInstance, RenderPhase};
use crate::test_support::{Harness, Log};

fn keyed_list(keys: &[&str]) -> Element {
    h("ul").children(keys.iter().map(|key| h("li").key(*key).child(*key)))
}

fn is_svg(harness: &Harness, node: NodeId) -> bool {
    let applier = harness.renderer.applier();
    matches!(
        applier.node(node).map(|node| node.kind().clone()),
        Ok(MemoryNodeKind::Element { svg: true, .. })
    )
}

#[test]
fn keyed_rotation_moves_a_single_node() {
    let mut harness = Harness::new();
    harness.render(keyed_list(&["a", "b", "c"])).unwrap();
    let ul = harness.children()[0];
    let before = harness.renderer.applier().children(ul);
    harness.take_ops();

    harness.render(keyed_list(&["c", "a", "b"])).unwrap();

    assert_eq!(
        harness.take_ops(),
        vec![ApplierOp::Insert {
            parent: ul,
            child: before[2],
            before: Some(before[0]),
        }]
    );
    assert_eq!(
        harness.renderer.applier().children(ul),
        vec![before[2], before[0], before[1]]
    );
    assert_eq!(
        harness.markup(),
        "<ul><li>c</li><li>a</li><li>b</li></ul>"
    );
}

#[test]
fn removed_keyed_child_is_the_only_removal() {
    let mut harness = Harness::new();
    harness.render(keyed_list(&["a", "b", "c"])).unwrap();
    let ul = harness.children()[0];
    let before = harness.renderer.applier().children(ul);
    harness.take_ops();

    harness.render(keyed_list(&["a", "c"])).unwrap();

    assert_eq!(harness.take_ops(), vec![ApplierOp::Remove { id: before[1] }]);
    assert_eq!(harness.markup(), "<ul><li>a</li><li>c</li></ul>");
}

#[test]
fn keyed_children_keep_component_state() {
    let item = component_fn("Item", |props| {
        let label = props.get_str("label").unwrap_or_default().to_string();
        let (first_label, _) = use_state(|| label.clone())?;
        Ok(format!("{first_label}:{label} ").into())
    });
    let list = |labels: &[&str]| {
        fragment(
            labels
                .iter()
                .map(|label| item.element().key(*label).prop("label", *label))
                .collect::<Vec<_>>(),
        )
    };

    let mut harness = Harness::new();
    harness.render(list(&["x", "y"])).unwrap();
    harness.render(list(&["y", "x"])).unwrap();
    assert_eq!(harness.markup(), "y:y x:x ");
}

#[test]
fn text_changes_update_the_node_in_place() {
    let mut harness = Harness::new();
    harness.render(h("p").child("hi")).unwrap();
    let p = harness.children()[0];
    let label = harness.renderer.applier().children(p)[0];
    harness.take_ops();

    harness.render(h("p").child("bye")).unwrap();
    assert_eq!(
        harness.take_ops(),
        vec![ApplierOp::SetText {
            id: label,
            data: "bye".into(),
        }]
    );

    harness.render(h("p").child("bye")).unwrap();
    assert!(harness.take_ops().is_empty());
}

#[test]
fn changing_the_tag_replaces_the_node() {
    let mut harness = Harness::new();
    harness.render(h("div").child("x")).unwrap();
    let div = harness.children()[0];
    harness.render(h("span").child("x")).unwrap();

    let span = harness.children()[0];
    assert_ne!(div, span);
    assert!(!harness.renderer.applier().contains(div));
    assert_eq!(harness.markup(), "<span>x</span>");
}

#[test]
fn props_are_diffed_against_the_previous_render() {
    let mut harness = Harness::new();
    harness
        .render(h("div").prop("className", "a").prop("title", "t"))
        .unwrap();
    let div = harness.children()[0];
    harness.take_ops();

    harness.render(h("div").prop("className", "b")).unwrap();
    assert_eq!(
        harness.take_ops(),
        vec![
            ApplierOp::RemoveProperty {
                id: div,
                name: "title".into(),
            },
            ApplierOp::SetProperty {
                id: div,
                name: "class".into(),
            },
        ]
    );
    assert_eq!(harness.markup(), "<div class=\"b\"></div>");
}

#[test]
fn swapping_handlers_keeps_one_listener() {
    let log = Log::default();
    let button = |label: &'static str| {
        let log = log.clone();
        h("button").prop("onClick", EventHandler::new(move |_event| log.push(label)))
    };

    let mut harness = Harness::new();
    harness.render(button("first")).unwrap();
    let node = harness.children()[0];
    harness.render(button("second")).unwrap();

    let attaches = harness
        .take_ops()
        .into_iter()
        .filter(|op| matches!(op, ApplierOp::AttachListener { .. }))
        .count();
    assert_eq!(attaches, 1);
    assert!(harness.renderer.applier().dispatch_event(node, "click"));
    assert_eq!(log.take(), ["second"]);

    harness.render(h("button")).unwrap();
    assert!(!harness.renderer.applier().dispatch_event(node, "click"));
}

#[test]
fn holes_keep_their_position() {
    let mut harness = Harness::new();
    harness
        .render(h("div").child(vec![Some(text("a")), None, Some(text("c"))]))
        .unwrap();
    assert_eq!(harness.markup(), "<div>ac</div>");
    let div = harness.children()[0];
    let before = harness.renderer.applier().children(div);

    harness
        .render(h("div").child(vec![Some(text("a")), Some(text("b")), Some(text("c"))]))
        .unwrap();
    let after = harness.renderer.applier().children(div);
    assert_eq!(harness.markup(), "<div>abc</div>");
    assert_eq!((after[0], after[2]), (before[0], before[1]));
}

#[test]
fn fragments_flatten_into_the_native_parent() {
    let pair = component_fn("Pair", |_props| Ok(fragment(vec![text("b"), text("c")]).into()));
    let mut harness = Harness::new();
    harness
        .render(h("div").child(vec![
            fragment(vec![text("a")]),
            pair.element(),
            text("d"),
        ]))
        .unwrap();
    assert_eq!(harness.markup(), "<div>abcd</div>");
    let div = harness.children()[0];
    assert_eq!(harness.renderer.applier().children(div).len(), 4);

    harness
        .render(h("div").child(vec![text("d"), pair.element()]))
        .unwrap();
    assert_eq!(harness.markup(), "<div>dbc</div>");
}

#[test]
fn svg_namespace_stops_at_foreign_object() {
    let mut harness = Harness::new();
    harness
        .render(
            h("svg")
                .child(h("circle").prop("className", "dot"))
                .child(h("foreignObject").child(h("div"))),
        )
        .unwrap();
    let svg = harness.children()[0];
    let kids = harness.renderer.applier().children(svg);
    let inner = harness.renderer.applier().children(kids[1])[0];

    assert!(is_svg(&harness, svg));
    assert!(is_svg(&harness, kids[0]));
    assert!(is_svg(&harness, kids[1]));
    assert!(!is_svg(&harness, inner));
    assert_eq!(
        harness.markup(),
        "<svg><circle class=\"dot\"></circle><foreignObject><div></div></foreignObject></svg>"
    );
}

#[test]
fn inner_html_replaces_children() {
    let log = Log::default();
    let child = component_fn("Child", {
        let log = log.clone();
        move |_props| {
            let log = log.clone();
            use_effect(move || Teardown::new(move || log.push("child cleanup")))?;
            Ok("child".into())
        }
    });

    let mut harness = Harness::new();
    harness.render(h("div").child(child.element())).unwrap();
    harness.present();

    harness
        .render(h("div").prop(INNER_HTML, "<b>raw</b>"))
        .unwrap();
    assert_eq!(harness.markup(), "<div><b>raw</b></div>");
    assert_eq!(log.take(), ["child cleanup"]);

    harness.render(h("div").child("plain")).unwrap();
    assert_eq!(harness.markup(), "<div>plain</div>");
}

#[test]
fn controlled_value_is_restored_from_the_live_node() {
    let mut harness = Harness::new();
    harness.render(h("input").prop("value", "a")).unwrap();
    let input = harness.children()[0];

    harness
        .renderer
        .applier_mut()
        .apply_property(input, "value", &PropValue::from("typed"), &PropValue::Null, false)
        .unwrap();
    harness.take_ops();

    harness.render(h("input").prop("value", "a")).unwrap();
    assert_eq!(
        harness.take_ops(),
        vec![ApplierOp::SetProperty {
            id: input,
            name: "value".into(),
        }]
    );
    assert_eq!(harness.renderer.applier().read_property(input, "value"), Some(PropValue::from("a")));
}

#[test]
fn refs_follow_their_nodes() {
    let first = NodeRef::new();
    let second = NodeRef::new();
    let mut harness = Harness::new();

    harness.render(h("div").node_ref(&first)).unwrap();
    let div = harness.children()[0];
    assert_eq!(first.node(), Some(div));

    harness.render(h("div").node_ref(&second)).unwrap();
    assert_eq!(first.node(), None);
    assert_eq!(second.node(), Some(div));

    harness.render(h("p")).unwrap();
    assert_eq!(second.node(), None);
}

// ---------------------------------------------------------------------------
// Class components

struct Tracked {
    log: Log,
}

impl ClassComponent for Tracked {
    type State = i64;

    fn create(props: &Props) -> (Self, i64) {
        let log = props.get_any::<Log>("log").cloned().unwrap_or_default();
        (Tracked { log }, 0)
    }

    fn derived_state(props: &Props, _state: &i64) -> Option<i64> {
        props.get_int("n")
    }

    fn render(&mut self, cx: &ClassContext<'_, Self>) -> RenderResult {
        let name = cx.props().get_str("name").unwrap_or_default();
        self.log.push(format!("{name} render {}", cx.state()));
        Ok(cx.props().children_list())
    }

    fn did_mount(&mut self, cx: &ClassContext<'_, Self>) -> Result<(), RenderError> {
        let name = cx.props().get_str("name").unwrap_or_default();
        self.log.push(format!("{name} mount"));
        Ok(())
    }

    fn snapshot_before_update(
        &mut self,
        _cx: &ClassContext<'_, Self>,
        _prev_props: &Props,
        prev_state: &i64,
    ) -> Option<Snapshot> {
        Some(Rc::new(*prev_state * 100))
    }

    fn did_update(
        &mut self,
        cx: &ClassContext<'_, Self>,
        _prev_props: &Props,
        prev_state: &i64,
        snapshot: Option<Snapshot>,
    ) -> Result<(), RenderError> {
        let name = cx.props().get_str("name").unwrap_or_default();
        let snapshot = snapshot.and_then(|value| value.downcast_ref::<i64>().copied());
        self.log.push(format!(
            "{name} update {prev_state}->{} snapshot {snapshot:?}",
            cx.state()
        ));
        Ok(())
    }

    fn will_unmount(&mut self) {
        self.log.push("unmount");
    }
}

fn tracked(log: &Log, name: &str, n: i64) -> Element {
    ComponentType::class::<Tracked>()
        .element()
        .prop("log", PropValue::any(log.clone()))
        .prop("name", name)
        .prop("n", n)
}

#[test]
fn class_lifecycle_runs_children_first() {
    let log = Log::default();
    let mut harness = Harness::new();

    harness
        .render(tracked(&log, "outer", 1).child(tracked(&log, "inner", 1)))
        .unwrap();
    assert_eq!(
        log.take(),
        ["outer render 1", "inner render 1", "inner mount", "outer mount"]
    );

    harness
        .render(tracked(&log, "outer", 2).child(tracked(&log, "inner", 3)))
        .unwrap();
    assert_eq!(
        log.take(),
        [
            "outer render 2",
            "inner render 3",
            "inner update 1->3 snapshot Some(100)",
            "outer update 1->2 snapshot Some(100)",
        ]
    );

    harness.render(fragment(Children::empty())).unwrap();
    assert_eq!(log.take(), ["unmount", "unmount"]);
}

type InstanceSlot = Rc<RefCell<Option<Rc<ComponentInstance>>>>;

struct Pinned {
    renders: Log,
    instance: InstanceSlot,
}

impl ClassComponent for Pinned {
    type State = ();

    fn create(props: &Props) -> (Self, ()) {
        let pinned = Pinned {
            renders: props.get_any::<Log>("log").cloned().unwrap_or_default(),
            instance: props.get_any::<InstanceSlot>("slot").cloned().unwrap_or_default(),
        };
        (pinned, ())
    }

    fn render(&mut self, cx: &ClassContext<'_, Self>) -> RenderResult {
        let label = cx.props().get_str("label").unwrap_or_default().to_string();
        self.renders.push(label.clone());
        self.instance.replace(Some(Rc::clone(cx.instance())));
        Ok(label.into())
    }

    fn should_update(&mut self, _cx: &ClassContext<'_, Self>, _next_props: &Props, _next_state: &()) -> bool {
        false
    }
}

#[test]
fn should_update_false_keeps_the_output_until_forced() {
    let log = Log::default();
    let slot = InstanceSlot::default();
    let pinned = |label: &str| {
        ComponentType::class::<Pinned>()
            .element()
            .prop("log", PropValue::any(log.clone()))
            .prop("slot", PropValue::any(slot.clone()))
            .prop("label", label)
    };

    let mut harness = Harness::new();
    harness.render(pinned("one")).unwrap();
    harness.take_ops();

    harness.render(pinned("two")).unwrap();
    assert!(harness.take_ops().is_empty());
    assert_eq!(harness.markup(), "one");

    let instance = slot.borrow().clone().unwrap();
    assert_eq!(instance.props().get_str("label"), Some("two"));
    assert_eq!(instance.phase(), RenderPhase::Idle);
    instance.force_update();
    assert_eq!(harness.rerender().unwrap(), 1);
    assert_eq!(harness.markup(), "two");
    assert_eq!(log.take(), ["one", "two"]);
}

#[test]
fn unwrapping_top_fragment_only_applies_to_unkeyed_singletons() {
    let plain = unwrap_top_fragment(fragment(vec![text("a"), text("b")]).into());
    assert_eq!(plain.len(), 2);

    let keyed = unwrap_top_fragment(fragment(vec![text("a"), text("b")]).key("k").into());
    assert_eq!(keyed.len(), 1);
}
