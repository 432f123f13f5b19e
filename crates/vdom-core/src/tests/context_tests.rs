use super::*;
use crate::component::component_fn;
use crate::hooks::use_context;
use crate::test_support::Harness;
use std::cell::Cell;

/// Class that never re-renders after mounting.
struct Frozen;

impl ClassComponent for Frozen {
    type State = ();

    fn create(_props: &Props) -> (Self, ()) {
        (Frozen, ())
    }

    fn render(&mut self, cx: &ClassContext<'_, Self>) -> RenderResult {
        Ok(cx.props().children_list())
    }

    fn should_update(&mut self, _cx: &ClassContext<'_, Self>, _next_props: &Props, _next_state: &()) -> bool {
        false
    }
}

/// Class publishing a theme through its child context.
struct Themed;

impl ClassComponent for Themed {
    type State = ();

    fn create(_props: &Props) -> (Self, ()) {
        (Themed, ())
    }

    fn render(&mut self, cx: &ClassContext<'_, Self>) -> RenderResult {
        Ok(cx.props().children_list())
    }

    fn child_context(&mut self, cx: &ClassContext<'_, Self>) -> Option<ChildContext> {
        let theme = cx.props().get_any::<Context<&'static str>>("theme")?;
        Some(ChildContext::new().provide(theme, "dark"))
    }
}

fn consumer(context: &Context<&'static str>, renders: Rc<Cell<usize>>) -> ComponentType {
    let context = context.clone();
    component_fn("Consumer", move |_props| {
        renders.set(renders.get() + 1);
        Ok(use_context(&context)?.into())
    })
}

#[test]
fn consumers_without_provider_read_the_default() {
    let theme = create_context("light");
    let mut harness = Harness::new();
    harness
        .render(consumer(&theme, Rc::default()).element())
        .unwrap();
    assert_eq!(harness.markup(), "light");
}

#[test]
fn nearest_provider_wins() {
    let theme = create_context("light");
    let reader = consumer(&theme, Rc::default());
    let mut harness = Harness::new();
    harness
        .render(theme.provider(
            "a",
            vec![reader.element(), theme.provider("b", reader.element())],
        ))
        .unwrap();
    assert_eq!(harness.markup(), "ab");
}

#[test]
fn provider_changes_reach_consumers_below_a_skipped_subtree() {
    let theme = create_context("light");
    let renders = Rc::new(Cell::new(0));
    let reader = consumer(&theme, renders.clone());
    let frozen = ComponentType::class::<Frozen>();
    let tree = |value| theme.provider(value, frozen.element().child(reader.element()));

    let mut harness = Harness::new();
    harness.render(tree("a")).unwrap();
    assert_eq!(harness.markup(), "a");

    harness.render(tree("b")).unwrap();
    assert_eq!(harness.markup(), "a");
    assert!(harness.renderer.needs_render());
    assert_eq!(harness.rerender().unwrap(), 1);
    assert_eq!(harness.markup(), "b");
    assert_eq!(renders.get(), 2);

    harness.render(tree("b")).unwrap();
    assert!(!harness.renderer.needs_render());
    assert_eq!(renders.get(), 2);
}

#[test]
fn unmounted_consumers_stop_listening() {
    let theme = create_context("light");
    let renders = Rc::new(Cell::new(0));
    let reader = consumer(&theme, renders.clone());

    let mut harness = Harness::new();
    harness.render(theme.provider("a", reader.element())).unwrap();
    harness
        .render(theme.provider("b", Children::empty()))
        .unwrap();
    assert_eq!(harness.rerender().unwrap(), 0);
    assert_eq!(renders.get(), 1);
    assert_eq!(harness.markup(), "");
}

#[test]
fn class_child_context_is_visible_to_descendants() {
    let theme = create_context("light");
    let themed = ComponentType::class::<Themed>();
    let reader = consumer(&theme, Rc::default());

    let mut harness = Harness::new();
    harness
        .render(
            themed
                .element()
                .prop("theme", PropValue::any(theme.clone()))
                .child(reader.element()),
        )
        .unwrap();
    assert_eq!(harness.markup(), "dark");
}

#[test]
fn context_maps_extend_without_touching_the_parent() {
    let first = create_context(1);
    let second = create_context(2);
    let root = ContextMap::default();
    let child = root.extend(ChildContext::new().provide(&first, 10));
    let grandchild = child.extend(ChildContext::new().provide(&second, 20));

    assert!(root.get(first.id()).is_none());
    assert_eq!(child.get(first.id()).and_then(|cell| cell.value::<i32>()), Some(10));
    assert!(child.get(second.id()).is_none());
    assert_eq!(grandchild.get(first.id()).and_then(|cell| cell.value::<i32>()), Some(10));
    assert_eq!(grandchild.get(second.id()).and_then(|cell| cell.value::<i32>()), Some(20));
}
