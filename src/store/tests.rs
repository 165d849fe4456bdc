use std::{cell::RefCell, collections::VecDeque, fmt::Debug, future::ready, rc::Rc};

use assert_call::{call, CallRecorder};
use futures::{
    channel::{mpsc, oneshot},
    stream, StreamExt,
};
use rt_local::{runtime::core::test, spawn_local, wait_for_idle};
use serde_json::{json, Value};

use crate::{
    dispatch,
    utils::test_helpers::{call_on_drop, error, init_log},
    Activation, DepFn, Outcome, Store, Subscription,
};

fn subscribe<S, A, D>(store: &Store<S, A, D>) -> Subscription
where
    S: Clone + PartialEq + Debug + 'static,
    A: Clone + 'static,
    D: Clone + PartialEq + 'static,
{
    store.subscribe(|s| call!("{s:?}"), |e| call!("error: {e}"))
}

fn counter() -> Store<i32, &'static str> {
    Store::<i32, &str>::new(|state, action, _, _| {
        let state = state.unwrap_or(0);
        match action {
            Some("inc") => Ok((state + 1).into()),
            Some("fail") => Err(error("bad")),
            _ => Ok(state.into()),
        }
    })
}

#[test]
fn startup_runs_at_build() {
    let store = counter();
    assert_eq!(store.state(), Some(0));
}

#[test]
fn dispatch_updates_state() {
    let mut cr = CallRecorder::new();
    let store = counter();
    let _s = subscribe(&store);
    cr.verify("Some(0)");

    store.dispatch("inc");
    assert_eq!(store.state(), Some(1));
    store.dispatch("inc");
    assert_eq!(store.state(), Some(2));
    cr.verify(["Some(1)", "Some(2)"]);
}

#[test]
fn subscriber_before_startup_sees_unset_first() {
    let mut cr = CallRecorder::new();
    let store = Store::<i32, &str>::builder(|state, action, _, _| {
        let state = state.unwrap_or(0);
        Ok(if action == Some("inc") { state + 1 } else { state }.into())
    })
    .activation(Activation::OnSubscribe)
    .build();
    assert_eq!(store.state(), None);

    let _s = subscribe(&store);
    store.dispatch("inc");
    store.dispatch("inc");
    cr.verify(["None", "Some(0)", "Some(1)", "Some(2)"]);
}

#[test]
fn equal_state_is_not_notified() {
    let mut cr = CallRecorder::new();
    let store = Store::<i32, ()>::new(|_, _, _, _| {
        call!("invoke");
        Ok(1.into())
    });
    let _s = subscribe(&store);
    cr.verify(["invoke", "Some(1)"]);

    store.dispatch(());
    store.dispatch(());
    cr.verify(["invoke", "invoke"]);
}

#[test]
fn filtered_subscriber_sees_distinct_slices() {
    let mut cr = CallRecorder::new();
    let store = Store::<Value, Value>::new(|_, action, _, _| {
        Ok(action.unwrap_or_else(|| json!({ "a": 0 })).into())
    });
    let _s = store.subscribe_with(
        |a| call!("a = {a:?}"),
        |e| call!("error: {e}"),
        |state: &Option<Value>| state.as_ref().and_then(|s| s["a"].as_i64()),
    );
    cr.verify("a = Some(0)");

    store.dispatch(json!({ "a": 0, "b": 1 }));
    cr.verify(());
    store.dispatch(json!({ "a": 0, "b": 2 }));
    cr.verify(());
    store.dispatch(json!({ "a": 1, "b": 2 }));
    cr.verify("a = Some(1)");
}

#[test]
fn late_subscriber_gets_last_state() {
    let mut cr = CallRecorder::new();
    let store = counter();
    store.dispatch("inc");
    store.dispatch("inc");
    let _s = subscribe(&store);
    cr.verify("Some(2)");
}

#[test]
fn unsubscribe_and_resubscribe() {
    let mut cr = CallRecorder::new();
    let store = counter();
    let s = subscribe(&store);
    cr.verify("Some(0)");
    assert_eq!(store.subscriber_count(), 1);

    s.unsubscribe();
    s.unsubscribe();
    assert_eq!(store.subscriber_count(), 0);
    store.dispatch("inc");
    cr.verify(());

    let f = subscribe(&store).into_fn();
    cr.verify("Some(1)");
    f();
    f();
    store.dispatch("inc");
    cr.verify(());
    assert_eq!(store.subscriber_count(), 0);

    let _s = subscribe(&store);
    cr.verify("Some(2)");
}

#[test]
fn drop_subscription_unsubscribes() {
    let mut cr = CallRecorder::new();
    let store = counter();
    {
        let _s = subscribe(&store);
        cr.verify("Some(0)");
    }
    store.dispatch("inc");
    cr.verify(());
    assert_eq!(store.subscriber_count(), 0);
}

#[test]
fn subscription_outlives_store() {
    let mut cr = CallRecorder::new();
    let store = counter();
    let s = subscribe(&store);
    cr.verify("Some(0)");
    drop(store);
    s.unsubscribe();
}

#[test]
fn multiple_values_are_one_action() {
    let store = Store::<Value, Value>::new(|_, action, _, _| Ok(action.unwrap_or(Value::Null).into()));
    assert_eq!(store.state(), Some(Value::Null));

    store.dispatch_many([json!("a"), json!("b")]);
    assert_eq!(store.state(), Some(json!(["a", "b"])));

    store.dispatch_many([json!("a")]);
    assert_eq!(store.state(), Some(json!("a")));

    dispatch!(store, json!(1), json!(2), json!(3));
    assert_eq!(store.state(), Some(json!([1, 2, 3])));

    dispatch!(store, json!([1, 2]));
    assert_eq!(store.state(), Some(json!([1, 2])));

    dispatch!(store);
    assert_eq!(store.state(), Some(Value::Null));
}

#[test]
fn falsy_action_is_not_absent() {
    let mut cr = CallRecorder::new();
    let store = Store::<i32, Value>::new(|_, action, _, _| {
        call!("{action:?}");
        Ok(0.into())
    });
    cr.verify("None");
    store.dispatch(json!(false));
    store.dispatch(Value::Null);
    cr.verify(["Some(Bool(false))", "Some(Null)"]);
}

#[test]
fn set_state_bypasses_store_fn() {
    let mut cr = CallRecorder::new();
    let store = counter();
    let _s = subscribe(&store);
    cr.verify("Some(0)");

    store.set_state(5);
    cr.verify("Some(5)");
    store.set_state(5);
    cr.verify(());

    store.dispatch("inc");
    cr.verify("Some(6)");
}

#[test]
fn set_dependencies_invokes_with_absent_action() {
    let mut cr = CallRecorder::new();
    let store = Store::<i32, &str, i32>::builder(|_, action, deps, _| {
        let sum = deps.iter().map(|(_, v)| v).sum::<i32>();
        call!("{action:?} {sum}");
        Ok(sum.into())
    })
    .defaults([("a", 1), ("b", 2)])
    .dependencies([("b", 3)])
    .build();
    cr.verify("None 4");
    assert_eq!(store.dependencies().get("b"), Some(&3));

    store.set_dependencies([("b", 3)]);
    cr.verify(());

    store.set_dependencies([("a", 10)]);
    cr.verify("None 12");
    assert_eq!(store.state(), Some(12));

    store.dispatch("x");
    cr.verify("Some(\"x\") 12");

    store.set_dependencies::<&str>([]);
    cr.verify("None 3");
}

#[test]
fn with_dependencies() {
    let store = Store::<String, (), &str>::with_dependencies(
        |_, _, deps, _| Ok(deps.get("name").copied().unwrap_or("?").to_string().into()),
        [("name", "abc")],
    );
    assert_eq!(store.state(), Some("abc".to_string()));
}

#[test]
fn callable_dependency_compares_by_identity() {
    let mut cr = CallRecorder::new();
    let double = DepFn::new(|x: i32| x * 2);
    let store = Store::<i32, i32, DepFn<i32, i32>>::with_dependencies(
        |_, action, deps, _| {
            call!("invoke");
            let f = deps.get("f").ok_or_else(|| error("missing `f`"))?;
            Ok(f.call(action.unwrap_or(1)).into())
        },
        [("f", double.clone())],
    );
    cr.verify("invoke");
    assert_eq!(store.state(), Some(2));

    store.set_dependencies([("f", double.clone())]);
    cr.verify(());

    store.set_dependencies([("f", DepFn::new(|x: i32| x * 3))]);
    cr.verify("invoke");
    assert_eq!(store.state(), Some(3));
}

#[test]
fn error_does_not_halt() {
    let mut cr = CallRecorder::new();
    let store = counter();
    let _s = subscribe(&store);
    cr.verify("Some(0)");

    store.dispatch("fail");
    cr.verify("error: store function failed: bad");
    assert_eq!(store.state(), Some(0));

    store.dispatch("inc");
    cr.verify("Some(1)");
}

#[test]
fn error_is_delivered_to_all_subscribers() {
    let mut cr = CallRecorder::new();
    let store = counter();
    let _s0 = store.subscribe(|_| {}, |e| call!("0: {e}"));
    let _s1 = store.subscribe(|_| {}, |e| call!("1: {e}"));
    store.dispatch("fail");
    cr.verify(["0: store function failed: bad", "1: store function failed: bad"]);
}

#[test]
fn error_without_subscribers_is_dropped() {
    init_log();
    let store = counter();
    store.dispatch("fail");
    store.dispatch("inc");
    assert_eq!(store.state(), Some(1));
}

#[test]
fn sequence_state_is_one_value() {
    let mut cr = CallRecorder::new();
    let store = Store::<Vec<i32>, ()>::new(|_, _, _, _| Ok(vec![1, 2].into()));
    let _s = subscribe(&store);
    cr.verify("Some([1, 2])");
}

#[test]
fn resolve_then_value_emits_both() {
    let mut cr = CallRecorder::new();
    let store = Store::<i32, ()>::builder(|_, _, _, resolve| {
        resolve.resolve(1);
        Ok(2.into())
    })
    .activation(Activation::OnSubscribe)
    .build();
    let _s = subscribe(&store);
    cr.verify(["None", "Some(1)", "Some(2)"]);
}

#[test]
fn dispatch_from_on_next_runs_after_it() {
    let mut cr = CallRecorder::new();
    let store = counter();
    let _s = store.subscribe(
        {
            let store = store.clone();
            move |state| {
                call!("begin {state:?}");
                if state < Some(3) {
                    store.dispatch("inc");
                }
                call!("end {state:?}");
            }
        },
        |_| {},
    );
    cr.verify([
        "begin Some(0)",
        "end Some(0)",
        "begin Some(1)",
        "end Some(1)",
        "begin Some(2)",
        "end Some(2)",
        "begin Some(3)",
        "end Some(3)",
    ]);
    assert_eq!(store.state(), Some(3));
}

#[test]
fn action_and_dependency_change_from_on_next_keep_call_order() {
    let mut cr = CallRecorder::new();
    let store = Store::<i32, &str, i32>::new(|state, action, deps, _| {
        call!("{action:?} dep={:?}", deps.get("k"));
        let state = state.unwrap_or(0);
        Ok(if action == Some("go") { state + 1 } else { state }.into())
    });
    cr.verify("None dep=None");
    let _s = store.subscribe(
        {
            let store = store.clone();
            move |state| {
                if state == Some(1) {
                    store.dispatch("first");
                    store.set_dependencies([("k", 7)]);
                }
            }
        },
        |_| {},
    );
    store.dispatch("go");
    cr.verify([
        "Some(\"go\") dep=None",
        "Some(\"first\") dep=None",
        "None dep=Some(7)",
    ]);
}

#[test]
fn queued_triggers_see_state_of_earlier_triggers() {
    let mut cr = CallRecorder::new();
    let store = counter();
    let _s = store.subscribe(
        {
            let store = store.clone();
            move |state| {
                call!("{state:?}");
                if state == Some(1) {
                    store.dispatch("inc");
                    store.dispatch("inc");
                }
            }
        },
        |_| {},
    );
    cr.verify("Some(0)");
    store.dispatch("inc");
    cr.verify(["Some(1)", "Some(2)", "Some(3)"]);
}

#[test]
fn debug_shows_state() {
    let store = counter();
    assert_eq!(format!("{store:?}"), "Store(Some(0))");
}

#[test]
fn clones_share_instance() {
    let store = counter();
    let store2 = store.clone();
    store.dispatch("inc");
    assert_eq!(store2.state(), Some(1));
}

#[test]
fn on_subscribe_drops_triggers_while_detached() {
    let mut cr = CallRecorder::new();
    let store = Store::<i32, &str>::builder(|state, action, _, _| {
        call!("invoke {action:?}");
        let state = state.unwrap_or(0);
        Ok(if action == Some("inc") { state + 1 } else { state }.into())
    })
    .activation(Activation::OnSubscribe)
    .build();
    store.dispatch("inc");
    cr.verify(());

    let s = subscribe(&store);
    cr.verify(["None", "invoke None", "Some(0)"]);
    store.dispatch("inc");
    cr.verify(["invoke Some(\"inc\")", "Some(1)"]);

    drop(s);
    store.dispatch("inc");
    cr.verify(());

    let _s = subscribe(&store);
    cr.verify(["Some(1)", "invoke None"]);
    assert_eq!(store.state(), Some(1));
}

#[test]
async fn deferred_emits_placeholder_first() {
    let mut cr = CallRecorder::new();
    let store = Store::<i32, ()>::new(|_, _, _, _| Ok(Outcome::deferred(async { 42 })));
    let _s = subscribe(&store);
    assert!(store.is_pending());
    cr.verify("None");

    wait_for_idle().await;
    cr.verify("Some(42)");
    assert!(!store.is_pending());
}

#[test]
async fn resolve_before_deferred() {
    let mut cr = CallRecorder::new();
    let store = Store::<i32, ()>::new(|_, _, _, resolve| {
        resolve.resolve(1);
        resolve.resolve(2);
        resolve.resolve(3);
        Ok(Outcome::deferred(async { 4 }))
    });
    let _s = subscribe(&store);
    cr.verify("Some(3)");
    wait_for_idle().await;
    cr.verify("Some(4)");
}

#[test]
async fn late_resolve_is_ignored() {
    let mut cr = CallRecorder::new();
    let store = Store::<i32, ()>::new(|_, _, _, resolve| {
        let resolve = resolve.clone();
        Ok(Outcome::deferred(async move {
            resolve.resolve(1);
            2
        }))
    });
    let _s = subscribe(&store);
    cr.verify("None");
    wait_for_idle().await;
    cr.verify("Some(2)");
}

#[test]
async fn newer_trigger_supersedes_deferred() {
    let mut cr = CallRecorder::new();
    let senders = Rc::new(RefCell::new(VecDeque::new()));
    let store = Store::<i32, i32>::new({
        let senders = senders.clone();
        move |_, action, _, _| {
            let Some(n) = action else {
                return Ok(0.into());
            };
            let (tx, rx) = oneshot::channel::<i32>();
            senders.borrow_mut().push_back(tx);
            let guard = (n == 1).then(|| call_on_drop("drop 1"));
            Ok(Outcome::try_deferred(async move {
                let _guard = guard;
                rx.await
            }))
        }
    });
    let _s = subscribe(&store);
    cr.verify("Some(0)");

    store.dispatch(1);
    cr.verify("None");
    wait_for_idle().await;
    cr.verify(());

    store.dispatch(2);
    wait_for_idle().await;
    cr.verify("drop 1");

    let tx1 = senders.borrow_mut().pop_front().unwrap();
    let _ = tx1.send(10);
    wait_for_idle().await;
    cr.verify(());

    let tx2 = senders.borrow_mut().pop_front().unwrap();
    tx2.send(20).unwrap();
    wait_for_idle().await;
    cr.verify("Some(20)");
}

#[test]
async fn deferred_failure_keeps_placeholder() {
    let mut cr = CallRecorder::new();
    let store = Store::<i32, ()>::new(|_, _, _, resolve| {
        resolve.resolve(5);
        Ok(Outcome::try_deferred(async { Err::<i32, _>(error("x")) }))
    });
    let _s = subscribe(&store);
    cr.verify("Some(5)");
    wait_for_idle().await;
    cr.verify("error: deferred computation failed: x");
    assert_eq!(store.state(), Some(5));
}

#[test]
async fn stream_items_are_states() {
    let mut cr = CallRecorder::new();
    let store = Store::<i32, ()>::builder(|_, _, _, resolve| {
        resolve.resolve(0);
        Ok(Outcome::stream(stream::iter([1, 2, 3])))
    })
    .activation(Activation::OnSubscribe)
    .build();
    let _s = subscribe(&store);
    cr.verify(["None", "Some(0)"]);
    wait_for_idle().await;
    cr.verify(["Some(1)", "Some(2)", "Some(3)"]);
    assert!(!store.is_pending());
}

#[test]
async fn stream_failure_ends_stream() {
    let mut cr = CallRecorder::new();
    let store = Store::<i32, ()>::new(|_, _, _, _| {
        Ok(Outcome::try_stream(stream::iter([
            Ok(1),
            Err(error("x")),
            Ok(3),
        ])))
    });
    let _s = subscribe(&store);
    cr.verify("None");
    wait_for_idle().await;
    cr.verify(["Some(1)", "error: stream failed: x"]);
}

#[test]
async fn newer_trigger_supersedes_stream() {
    let mut cr = CallRecorder::new();
    let (tx, rx) = mpsc::unbounded::<i32>();
    let rx = RefCell::new(Some(rx));
    let store = Store::<i32, ()>::new(move |_, action, _, _| match action {
        None => Ok(Outcome::stream(rx.borrow_mut().take().unwrap())),
        Some(()) => Ok(100.into()),
    });
    let _s = subscribe(&store);
    cr.verify("None");

    tx.unbounded_send(1).unwrap();
    wait_for_idle().await;
    cr.verify("Some(1)");

    store.dispatch(());
    cr.verify("Some(100)");

    let _ = tx.unbounded_send(2);
    wait_for_idle().await;
    cr.verify(());
    assert_eq!(store.state(), Some(100));
}

#[test]
async fn set_state_keeps_pending_deferred() {
    let mut cr = CallRecorder::new();
    let store = Store::<i32, ()>::new(|_, _, _, _| Ok(Outcome::deferred(async { 42 })));
    let _s = subscribe(&store);
    cr.verify("None");

    store.set_state(1);
    cr.verify("Some(1)");
    wait_for_idle().await;
    cr.verify("Some(42)");
}

#[test]
async fn last_unsubscribe_cancels_invocation() {
    let mut cr = CallRecorder::new();
    let (_tx, rx) = oneshot::channel::<i32>();
    let rx = RefCell::new(Some(rx));
    let store = Store::<i32, ()>::builder(move |_, _, _, _| {
        let guard = call_on_drop("drop");
        let rx = rx.borrow_mut().take();
        Ok(Outcome::try_deferred(async move {
            let _guard = guard;
            match rx {
                Some(rx) => rx.await,
                None => Ok(0),
            }
        }))
    })
    .activation(Activation::OnSubscribe)
    .build();
    let s = subscribe(&store);
    cr.verify("None");
    wait_for_idle().await;
    assert!(store.is_pending());

    drop(s);
    assert!(!store.is_pending());
    wait_for_idle().await;
    cr.verify("drop");
}

#[test]
async fn drop_store_cancels_invocation() {
    let mut cr = CallRecorder::new();
    let store = Store::<i32, ()>::new(|_, _, _, _| {
        let guard = call_on_drop("drop");
        Ok(Outcome::deferred(async move {
            let _guard = guard;
            futures::future::pending::<i32>().await
        }))
    });
    wait_for_idle().await;
    cr.verify(());

    drop(store);
    wait_for_idle().await;
    cr.verify("drop");
}

#[test]
async fn to_stream_with_combinators() {
    let mut cr = CallRecorder::new();
    let store = counter();
    let _task = spawn_local(
        store
            .to_stream()
            .filter_map(|item| ready(item.ok().flatten()))
            .map(|x| x * 10)
            .for_each(|x| async move { call!("{x}") }),
    );
    wait_for_idle().await;
    cr.verify("0");

    store.dispatch("inc");
    store.dispatch("inc");
    wait_for_idle().await;
    cr.verify(["10", "20"]);
}

#[test]
async fn to_stream_with_filter_yields_errors() {
    let mut cr = CallRecorder::new();
    let store = counter();
    let _task = spawn_local(
        store
            .to_stream_with(|s: &Option<i32>| s.map(|x| x % 2 == 0))
            .for_each(|item| async move {
                match item {
                    Ok(even) => call!("{even:?}"),
                    Err(e) => call!("error: {e}"),
                }
            }),
    );
    wait_for_idle().await;
    cr.verify("Some(true)");

    store.dispatch("inc");
    store.dispatch("fail");
    store.dispatch("inc");
    store.dispatch("inc");
    wait_for_idle().await;
    cr.verify([
        "Some(false)",
        "error: store function failed: bad",
        "Some(true)",
        "Some(false)",
    ]);
}
