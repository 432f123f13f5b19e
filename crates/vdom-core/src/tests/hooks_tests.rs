use super::*;
use crate::component::component_fn;
use crate::element::{h, Children, NodeRef};
use crate::options::{HookKind, Observers, RendererOptions, DEFAULT_PASSIVE_EFFECT_TIMEOUT};
use crate::test_support::{Harness, Log};
use std::cell::Cell;

type SetterCell<T> = Rc<RefCell<Option<StateSetter<T>>>>;

fn counter(setter: SetterCell<i32>, renders: Rc<Cell<usize>>) -> crate::ComponentType {
    component_fn("Counter", move |_props| {
        renders.set(renders.get() + 1);
        let (count, set_count) = use_state(|| 0)?;
        setter.replace(Some(set_count));
        Ok(count.to_string().into())
    })
}

fn setter(cell: &SetterCell<i32>) -> StateSetter<i32> {
    cell.borrow().clone().expect("component rendered")
}

#[test]
fn hooks_outside_render_are_rejected() {
    assert_eq!(use_state(|| 1).unwrap_err(), HookError::InvalidHookCall);
    assert_eq!(use_effect(|| ()).unwrap_err(), HookError::InvalidHookCall);
    assert_eq!(use_debug_value(&3).unwrap_err(), HookError::InvalidHookCall);
}

#[test]
fn slots_follow_call_order_across_renders() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let mut harness = Harness::new();
    harness.observe(Observers::new().with_hook({
        let seen = seen.clone();
        move |_instance, index, kind| seen.borrow_mut().push((index, kind))
    }));
    let component = component_fn("Slots", |_props| {
        let (value, _) = use_state(|| 7)?;
        let doubled = use_memo(|| value * 2, value)?;
        let cache = use_ref(|| 0)?;
        use_effect(|| ())?;
        Ok(format!("{value}/{doubled}/{}", cache.current()).into())
    });

    harness.render(component.element()).unwrap();
    harness.render(component.element().prop("again", true)).unwrap();

    let expected = [
        (0, HookKind::State),
        (1, HookKind::Memo),
        (2, HookKind::Ref),
        (3, HookKind::Effect),
    ];
    let seen = seen.borrow();
    assert_eq!(seen.len(), 8);
    assert_eq!(&seen[..4], &expected);
    assert_eq!(&seen[4..], &expected);
    assert_eq!(harness.markup(), "7/14/0");
}

#[test]
fn setting_an_equal_value_schedules_nothing() {
    let cell: SetterCell<i32> = Rc::default();
    let renders = Rc::new(Cell::new(0));
    let mut harness = Harness::new();
    harness
        .render(counter(cell.clone(), renders.clone()).element())
        .unwrap();

    setter(&cell).set(0);
    assert!(!harness.renderer.needs_render());
    assert_eq!(harness.scheduler.render_requests.get(), 0);

    setter(&cell).set(5);
    assert!(harness.renderer.needs_render());
    assert_eq!(harness.rerender().unwrap(), 1);
    assert_eq!(harness.markup(), "5");
    assert_eq!(renders.get(), 2);
}

#[test]
fn updates_in_one_batch_render_once() {
    let cell: SetterCell<i32> = Rc::default();
    let renders = Rc::new(Cell::new(0));
    let mut harness = Harness::new();
    harness
        .render(counter(cell.clone(), renders.clone()).element())
        .unwrap();

    let set_count = setter(&cell);
    set_count.update(|n| n + 1);
    set_count.update(|n| n + 1);
    set_count.update(|n| n + 1);

    assert_eq!(harness.scheduler.render_requests.get(), 1);
    assert_eq!(harness.rerender().unwrap(), 1);
    assert_eq!(harness.markup(), "3");
    assert_eq!(renders.get(), 2);
}

#[test]
fn setters_of_unmounted_components_are_ignored() {
    let cell: SetterCell<i32> = Rc::default();
    let mut harness = Harness::new();
    harness
        .render(counter(cell.clone(), Rc::default()).element())
        .unwrap();
    let set_count = setter(&cell);
    harness.renderer.unmount(harness.root).unwrap();

    set_count.set(9);
    assert_eq!(harness.rerender().unwrap(), 0);
    assert_eq!(harness.markup(), "");
}

#[test]
fn reducer_uses_the_latest_reducer() {
    let dispatch: Rc<RefCell<Option<Dispatch<i32, i32>>>> = Rc::default();
    let mut harness = Harness::new();
    let component = component_fn("Stepper", {
        let dispatch = dispatch.clone();
        move |props| {
            let step = props.get_int("step").unwrap_or(1) as i32;
            let (total, send) = use_reducer(move |total: &i32, times: i32| total + step * times, || 0)?;
            dispatch.replace(Some(send));
            Ok(total.to_string().into())
        }
    });

    harness.render(component.element().prop("step", 2)).unwrap();
    dispatch.borrow().clone().unwrap().dispatch(3);
    harness.rerender().unwrap();
    assert_eq!(harness.markup(), "6");

    harness.render(component.element().prop("step", 10)).unwrap();
    dispatch.borrow().clone().unwrap().dispatch(1);
    harness.rerender().unwrap();
    assert_eq!(harness.markup(), "16");
}

#[test]
fn effect_with_unit_deps_runs_once() {
    let log = Log::default();
    let mut harness = Harness::new();
    let component = component_fn("Once", {
        let log = log.clone();
        move |_props| {
            let log = log.clone();
            use_effect_with(
                move || {
                    log.push("run");
                    let log = log.clone();
                    Teardown::new(move || log.push("cleanup"))
                },
                (),
            )?;
            Ok(Children::empty())
        }
    });

    for pass in 0..3 {
        harness.render(component.element().prop("pass", pass)).unwrap();
        harness.present();
    }
    assert_eq!(log.take(), ["run"]);

    harness.renderer.unmount(harness.root).unwrap();
    assert_eq!(log.take(), ["cleanup"]);
}

#[test]
fn cleanup_runs_before_the_next_effect() {
    let log = Log::default();
    let mut harness = Harness::new();
    let component = component_fn("Tracker", {
        let log = log.clone();
        move |props| {
            let id = props.get_int("id").unwrap_or_default();
            let log = log.clone();
            use_effect_with(
                move || {
                    log.push(format!("run {id}"));
                    let log = log.clone();
                    Teardown::new(move || log.push(format!("cleanup {id}")))
                },
                id,
            )?;
            Ok(Children::empty())
        }
    });

    harness.render(component.element().prop("id", 1)).unwrap();
    assert!(log.take().is_empty());
    harness.present();
    assert_eq!(log.take(), ["run 1"]);

    harness.render(component.element().prop("id", 1)).unwrap();
    harness.present();
    assert!(log.take().is_empty());

    harness.render(component.element().prop("id", 2)).unwrap();
    harness.present();
    assert_eq!(log.take(), ["cleanup 1", "run 2"]);
}

#[test]
fn unmount_runs_cleanups_but_no_pending_effects() {
    let log = Log::default();
    let mut harness = Harness::new();
    let component = component_fn("Pending", {
        let log = log.clone();
        move |props| {
            let id = props.get_int("id").unwrap_or_default();
            let log = log.clone();
            use_effect_with(
                move || {
                    log.push(format!("run {id}"));
                    let log = log.clone();
                    Teardown::new(move || log.push(format!("cleanup {id}")))
                },
                id,
            )?;
            Ok(Children::empty())
        }
    });

    harness.render(component.element().prop("id", 1)).unwrap();
    harness.present();
    harness.render(component.element().prop("id", 2)).unwrap();
    harness.render(h("p")).unwrap();
    harness.present();

    assert_eq!(log.take(), ["run 1", "cleanup 1"]);
}

#[test]
fn layout_effects_run_at_commit_and_passive_effects_after_present() {
    let log = Log::default();
    let mut harness = Harness::new();
    let component = component_fn("Ordered", {
        let log = log.clone();
        move |_props| {
            let passive = log.clone();
            use_effect(move || passive.push("passive"))?;
            let layout = log.clone();
            use_layout_effect(move || layout.push("layout"))?;
            Ok(Children::empty())
        }
    });

    harness.render(component.element()).unwrap();
    assert_eq!(log.take(), ["layout"]);
    assert_eq!(harness.scheduler.last_timeout(), Some(DEFAULT_PASSIVE_EFFECT_TIMEOUT));
    assert_eq!(harness.present(), 1);
    assert_eq!(log.take(), ["passive"]);
}

#[test]
fn passive_flushes_coalesce_into_one_request() {
    let mut harness = Harness::new();
    let item = component_fn("Item", |_props| {
        use_effect(|| ())?;
        Ok(Children::empty())
    });
    harness
        .render(h("ul").children((0..4).map(|i| item.element().key(i))))
        .unwrap();
    assert_eq!(harness.scheduler.pending_tasks(), 1);
    assert!(harness.renderer.runtime().has_pending_effects());
    harness.present();
    assert!(!harness.renderer.runtime().has_pending_effects());
}

#[test]
fn leftover_passive_effects_run_before_the_next_render() {
    let log = Log::default();
    let cell: SetterCell<i32> = Rc::default();
    let mut harness = Harness::new();
    let component = component_fn("Eager", {
        let log = log.clone();
        let cell = cell.clone();
        move |_props| {
            let (count, set_count) = use_state(|| 0)?;
            cell.replace(Some(set_count));
            log.push(format!("render {count}"));
            let log = log.clone();
            use_effect(move || log.push(format!("effect {count}")))?;
            Ok(Children::empty())
        }
    });

    harness.render(component.element()).unwrap();
    setter(&cell).set(1);
    harness.rerender().unwrap();
    harness.present();

    assert_eq!(log.take(), ["render 0", "effect 0", "render 1", "effect 1"]);
}

#[test]
fn memo_recomputes_only_when_deps_change() {
    let calls = Rc::new(Cell::new(0));
    let mut harness = Harness::new();
    let component = component_fn("Memo", {
        let calls = calls.clone();
        move |props| {
            let n = props.get_int("n").unwrap_or_default();
            let calls = calls.clone();
            let squared = use_memo(
                move || {
                    calls.set(calls.get() + 1);
                    n * n
                },
                n,
            )?;
            Ok(squared.to_string().into())
        }
    });

    harness.render(component.element().prop("n", 3)).unwrap();
    harness.render(component.element().prop("n", 3)).unwrap();
    assert_eq!(calls.get(), 1);
    harness.render(component.element().prop("n", 4)).unwrap();
    assert_eq!(calls.get(), 2);
    assert_eq!(harness.markup(), "16");
}

#[test]
fn callbacks_keep_identity_while_deps_hold() {
    let seen: Rc<RefCell<Vec<Rc<dyn Fn() -> i64>>>> = Rc::default();
    let mut harness = Harness::new();
    let component = component_fn("Callback", {
        let seen = seen.clone();
        move |props| {
            let n = props.get_int("n").unwrap_or_default();
            let callback: Rc<dyn Fn() -> i64> = use_callback(Rc::new(move || n) as Rc<dyn Fn() -> i64>, n)?;
            seen.borrow_mut().push(callback);
            Ok(Children::empty())
        }
    });

    harness.render(component.element().prop("n", 1)).unwrap();
    harness.render(component.element().prop("n", 1)).unwrap();
    harness.render(component.element().prop("n", 2)).unwrap();
    let seen = seen.borrow();
    assert!(Rc::ptr_eq(&seen[0], &seen[1]));
    assert!(!Rc::ptr_eq(&seen[1], &seen[2]));
    assert_eq!((seen[2])(), 2);
}

#[test]
fn ref_boxes_survive_renders() {
    let mut harness = Harness::new();
    let component = component_fn("Renders", |_props| {
        let renders = use_ref(|| 0)?;
        *renders.borrow_mut() += 1;
        Ok(renders.current().to_string().into())
    });
    for _ in 0..3 {
        harness.render(component.element().prop("tick", true)).unwrap();
    }
    assert_eq!(harness.markup(), "3");
}

#[test]
fn changing_hook_order_is_reported() {
    let mut harness = Harness::new();
    let component = component_fn("Shifty", |props| {
        if props.get_bool("memo").unwrap_or(false) {
            use_memo(|| 1, ())?;
        } else {
            use_state(|| 1)?;
        }
        Ok(Children::empty())
    });

    harness.render(component.element()).unwrap();
    let err = harness
        .render(component.element().prop("memo", true))
        .unwrap_err();
    assert!(matches!(
        err,
        RenderError::Hook(HookError::HookKindMismatch {
            index: 0,
            expected: "memo",
            found: "state",
        })
    ));
}

#[test]
fn skip_effects_records_nothing() {
    let log = Log::default();
    let mut harness = Harness::with_options(RendererOptions::default().with_skip_effects(true));
    let component = component_fn("Quiet", {
        let log = log.clone();
        move |_props| {
            let passive = log.clone();
            use_effect(move || passive.push("passive"))?;
            let layout = log.clone();
            use_layout_effect(move || layout.push("layout"))?;
            Ok(Children::empty())
        }
    });
    harness.render(component.element()).unwrap();
    harness.present();
    assert!(log.take().is_empty());
    assert_eq!(harness.scheduler.pending_tasks(), 0);
}

#[test]
fn imperative_handle_reaches_the_forwarded_ref() {
    let handle = NodeRef::new();
    let mut harness = Harness::new();
    let component = component_fn("Fancy", |props| {
        let label = props.get_str("label").unwrap_or_default().to_string();
        use_imperative_handle(props.forwarded_ref(), move || label, Some(()))?;
        Ok(Children::empty())
    });

    harness
        .render(component.element().prop("label", "focus me").node_ref(&handle))
        .unwrap();
    let value = handle.get().and_then(|value| value.downcast::<String>());
    assert_eq!(value.as_deref().map(String::as_str), Some("focus me"));
}

#[test]
fn imperative_handle_without_deps_is_recreated_every_render() {
    let handle = NodeRef::new();
    let created = Rc::new(Cell::new(0_usize));
    let mut harness = Harness::new();
    let component = component_fn("Live", {
        let created = created.clone();
        move |props| {
            let created = created.clone();
            use_imperative_handle(
                props.forwarded_ref(),
                move || {
                    created.set(created.get() + 1);
                    created.get()
                },
                None::<()>,
            )?;
            Ok(Children::empty())
        }
    });

    harness.render(component.element().node_ref(&handle)).unwrap();
    harness.render(component.element().node_ref(&handle)).unwrap();
    harness.render(component.element().node_ref(&handle)).unwrap();
    assert_eq!(created.get(), 3);
    let value = handle.get().and_then(|value| value.downcast::<usize>());
    assert_eq!(value.as_deref(), Some(&3));
}

#[test]
fn debug_values_reach_the_observer() {
    let labels = Log::default();
    let mut harness = Harness::new();
    harness.observe(Observers::new().with_debug_value({
        let labels = labels.clone();
        move |instance, label| labels.push(format!("{}: {label}", instance.name()))
    }));
    let component = component_fn("Debugged", |_props| {
        let (count, _) = use_state(|| 4)?;
        use_debug_value(&count)?;
        use_debug_value_with(&count, |n| format!("count is {n}"))?;
        Ok(Children::empty())
    });
    harness.render(component.element()).unwrap();
    assert_eq!(labels.take(), ["Debugged: 4", "Debugged: count is 4"]);
}

#[test]
fn error_boundary_shows_fallback_until_reset() {
    let explode = Rc::new(Cell::new(true));
    let caught = Log::default();
    let reset: Rc<RefCell<Option<ResetError>>> = Rc::default();
    let bomb = component_fn("Bomb", {
        let explode = explode.clone();
        move |_props| {
            if explode.get() {
                return Err(RenderError::msg("boom"));
            }
            Ok("ok".into())
        }
    });
    let boundary = component_fn("Boundary", {
        let caught = caught.clone();
        let reset = reset.clone();
        move |_props| {
            let caught = caught.clone();
            let (error, reset_error) = use_error_boundary_with(move |err| caught.push(err.to_string()))?;
            reset.replace(Some(reset_error));
            Ok(match error {
                Some(err) => format!("failed: {err}").into(),
                None => bomb.element().into(),
            })
        }
    });

    let mut harness = Harness::new();
    harness.render(boundary.element()).unwrap();
    assert_eq!(caught.take(), ["boom"]);
    assert!(harness.renderer.needs_render());
    harness.settle().unwrap();
    assert_eq!(harness.markup(), "failed: boom");

    explode.set(false);
    reset.borrow().clone().unwrap().reset();
    harness.settle().unwrap();
    assert_eq!(harness.markup(), "ok");
    assert!(caught.take().is_empty());
}

#[test]
fn errors_skip_boundaries_that_are_recovering() {
    let bomb = component_fn("AlwaysBomb", |_props| Err(RenderError::msg("again")));
    let boundary = component_fn("Stubborn", move |_props| {
        use_error_boundary()?;
        Ok(bomb.element().into())
    });

    let mut harness = Harness::new();
    harness.render(boundary.element()).unwrap();
    let err = harness.settle().unwrap_err();
    assert_eq!(err.to_string(), "again");
}
