//! Registry behaviour tests: idempotency, ordering, sentinel handling,
//! immediate disposal after close, removal, and error flattening.

use std::cell::RefCell;
use std::rc::Rc;

use rstest::rstest;
use teardown_core::{AggregateTeardownError, Disposable, Teardown, TeardownError};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
struct Calls(Rc<RefCell<Vec<String>>>);

impl Calls {
    fn ok(&self, name: &str) -> Teardown {
        self.step(name, None)
    }

    fn fail(&self, name: &str) -> Teardown {
        self.step(name, Some(name))
    }

    fn step(&self, name: &str, fail: Option<&str>) -> Teardown {
        let calls = self.clone();
        let name = name.to_string();
        let fail = fail.map(str::to_string);
        Teardown::action(move || {
            calls.0.borrow_mut().push(name);
            fail.map_or(Ok(()), |msg| Err(TeardownError::failed(msg)))
        })
    }

    /// A registry whose primary action is recorded (and optionally fails).
    fn registry(&self, name: &str, fail: bool) -> Disposable {
        let calls = self.clone();
        let name = name.to_string();
        Disposable::with_action(move || {
            calls.0.borrow_mut().push(name.clone());
            if fail {
                Err(TeardownError::failed(name))
            } else {
                Ok(())
            }
        })
    }

    fn list(&self) -> Vec<String> {
        self.0.borrow().clone()
    }
}

fn messages(err: &AggregateTeardownError) -> Vec<String> {
    err.errors().iter().map(ToString::to_string).collect()
}

// ---------------------------------------------------------------------------
// 1. Idempotency
// ---------------------------------------------------------------------------

#[test]
fn second_dispose_runs_nothing() {
    let calls = Calls::default();
    let p = calls.registry("p", false);
    p.add(calls.ok("a")).expect("add");
    p.add(calls.registry("b", false)).expect("add");

    p.dispose().expect("first dispose");
    assert_eq!(calls.list(), ["p", "a", "b"]);

    p.dispose().expect("second dispose");
    assert_eq!(calls.list(), ["p", "a", "b"]);
    assert!(p.is_disposed());
}

#[test]
fn failing_child_then_second_dispose_is_a_noop() {
    let calls = Calls::default();
    let p = Disposable::new();
    p.add(calls.fail("a")).expect("add f");
    p.add(calls.ok("g")).expect("add g");

    let err = p.dispose().unwrap_err();
    assert_eq!(messages(&err), ["a"]);
    assert_eq!(calls.list(), ["a", "g"]);

    p.dispose().expect("second dispose reports nothing");
    assert_eq!(calls.list(), ["a", "g"], "f and g must not run twice");
}

#[test]
fn child_disposed_elsewhere_is_not_run_again() {
    let calls = Calls::default();
    let p = Disposable::new();
    let c = calls.registry("c", false);
    p.add(&c).expect("add");

    c.dispose().expect("independent dispose");
    p.dispose().expect("parent dispose");
    assert_eq!(calls.list(), ["c"]);
}

// ---------------------------------------------------------------------------
// 2. Cycle safety and sentinel neutrality
// ---------------------------------------------------------------------------

#[test]
fn adding_self_is_ignored() {
    let p = Disposable::new();
    p.add(&p).expect("add self");
    assert!(!p.has_children());
    p.dispose().expect("dispose terminates");
}

#[rstest]
#[case::sentinel(Teardown::Registry(Disposable::EMPTY))]
#[case::none(Teardown::from(None::<Disposable>))]
#[case::unit(Teardown::from(()))]
#[case::empty(Teardown::Empty)]
fn empty_inputs_leave_children_unchanged(#[case] teardown: Teardown) {
    let p = Disposable::new();
    p.add(teardown).expect("add");
    assert_eq!(p.child_count(), 0);
}

#[test]
fn empty_sentinel_dispose_is_always_a_noop() {
    for _ in 0..3 {
        Disposable::EMPTY.dispose().expect("dispose EMPTY");
    }
    assert!(Disposable::EMPTY.is_disposed());
    assert!(!Disposable::EMPTY.has_children());
}

#[test]
fn already_disposed_candidate_is_not_tracked() {
    let p = Disposable::new();
    let done = Disposable::new();
    done.dispose().expect("dispose");
    p.add(&done).expect("add");
    assert_eq!(p.child_count(), 0);
}

// ---------------------------------------------------------------------------
// 3. Deferred-immediate execution
// ---------------------------------------------------------------------------

#[test]
fn add_after_dispose_disposes_registry_child_immediately() {
    let calls = Calls::default();
    let p = Disposable::new();
    p.dispose().expect("dispose");

    let child = calls.registry("late", false);
    p.add(&child).expect("add");
    assert!(child.is_disposed());
    assert_eq!(calls.list(), ["late"]);
    assert_eq!(p.child_count(), 0);
}

#[test]
fn add_after_dispose_wraps_action_failure_like_a_registry_child() {
    let calls = Calls::default();
    let p = Disposable::new();
    p.dispose().expect("dispose");

    match p.add(calls.fail("late")).unwrap_err() {
        TeardownError::Aggregate(agg) => assert_eq!(messages(&agg), ["late"]),
        other => panic!("expected aggregate, got {other:?}"),
    }
    assert_eq!(calls.list(), ["late"]);
}

#[test]
fn add_after_dispose_surfaces_child_aggregate() {
    let calls = Calls::default();
    let p = Disposable::new();
    p.dispose().expect("dispose");

    let child = Disposable::new();
    child.add(calls.fail("x")).expect("add");
    child.add(calls.fail("y")).expect("add");

    match p.add(&child).unwrap_err() {
        TeardownError::Aggregate(agg) => assert_eq!(messages(&agg), ["x", "y"]),
        other => panic!("expected aggregate, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// 4. Error flattening
// ---------------------------------------------------------------------------

#[test]
fn flattening_law_primary_then_children_in_add_order() {
    let calls = Calls::default();
    let parent = calls.registry("e4", true);

    let a = calls.registry("e1", true);
    let b = Disposable::new();
    b.add(calls.fail("e2")).expect("add");
    b.add(calls.fail("e3")).expect("add");

    parent.add(&a).expect("add a");
    parent.add(&b).expect("add b");

    let err = parent.dispose().unwrap_err();
    assert_eq!(messages(&err), ["e4", "e1", "e2", "e3"]);
    assert!(err
        .errors()
        .iter()
        .all(|e| !matches!(e, TeardownError::Aggregate(_))));
}

#[test]
fn nested_failure_is_not_wrapped() {
    let calls = Calls::default();
    let p = Disposable::new();
    let q = Disposable::new();
    p.add(&q).expect("add q");
    q.add(calls.fail("x")).expect("add g");

    let err = p.dispose().unwrap_err();
    assert_eq!(err.len(), 1);
    assert!(matches!(err.errors()[0], TeardownError::Failed(_)));
    assert_eq!(messages(&err), ["x"]);
}

#[rstest]
#[case(1)]
#[case(3)]
#[case(8)]
fn deep_chain_flattens_to_one_level(#[case] depth: usize) {
    let calls = Calls::default();
    let root = Disposable::new();
    let mut tip = root.clone();
    for _ in 0..depth {
        let next = Disposable::new();
        tip.add(&next).expect("add");
        tip = next;
    }
    tip.add(calls.fail("leaf")).expect("add leaf");

    let err = root.dispose().unwrap_err();
    assert_eq!(messages(&err), ["leaf"]);
}

#[test]
fn every_child_is_attempted_despite_failures() {
    let calls = Calls::default();
    let p = Disposable::new();
    p.add(calls.fail("1")).expect("add");
    p.add(calls.ok("2")).expect("add");
    p.add(calls.fail("3")).expect("add");
    p.add(calls.ok("4")).expect("add");

    let err = p.dispose().unwrap_err();
    assert_eq!(calls.list(), ["1", "2", "3", "4"]);
    assert_eq!(messages(&err), ["1", "3"]);
}

// ---------------------------------------------------------------------------
// 5. Removal
// ---------------------------------------------------------------------------

#[test]
fn removed_child_never_runs() {
    let calls = Calls::default();
    let p = Disposable::new();
    let c1 = calls.registry("c1", false);
    p.add(&c1).expect("add");
    p.remove(&c1);
    p.dispose().expect("dispose");

    assert!(calls.list().is_empty());
    assert!(!c1.is_disposed(), "remove must not dispose the child");
}

#[test]
fn remove_detaches_only_the_first_matching_entry() {
    let p = Disposable::new();
    let a = Disposable::new();
    let b = Disposable::new();
    p.add(&a).expect("add");
    p.add(&b).expect("add");
    p.remove(&a);
    assert_eq!(p.child_count(), 1);
    p.remove(&a);
    assert_eq!(p.child_count(), 1);
}

#[rstest]
#[case::sentinel(Disposable::EMPTY)]
#[case::stranger(Disposable::new())]
fn remove_of_unknown_is_a_noop(#[case] other: Disposable) {
    let p = Disposable::new();
    p.add(Disposable::new()).expect("add");
    p.remove(&other);
    p.remove(&p);
    assert_eq!(p.child_count(), 1);
}

#[test]
fn remove_without_children_or_after_dispose_is_a_noop() {
    let p = Disposable::new();
    let c = Disposable::new();
    p.remove(&c);
    p.dispose().expect("dispose");
    p.remove(&c);
    assert!(!c.is_disposed());
}
