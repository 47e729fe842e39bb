use std::cell::{Cell, RefCell};
use std::rc::Rc;

use js_iteration::{EvalError, Realm, RealmOptions, Value, to_boolean};

// Initialize logger for this integration test binary so `RUST_LOG` is honored.
// Using `ctor` ensures initialization runs before tests start.
#[ctor::ctor]
fn __init_test_logger() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default()).is_test(true).try_init();
}

fn throw(msg: &str) -> EvalError {
    EvalError::Throw(Value::from(msg))
}

/// Counters shared between a test and the iterator it builds.
#[derive(Clone, Default)]
struct Probe {
    next_calls: Rc<Cell<u32>>,
    closes: Rc<Cell<u32>>,
}

/// An iterator over `values` whose `return()` is counted and answers with
/// `on_return`.
fn iterator_with_return(realm: &Realm, values: Vec<Value>, probe: &Probe, on_return: Result<Value, &'static str>) -> Value {
    let it = realm.new_iterator_object();
    let pos = Cell::new(0usize);
    let next_calls = probe.next_calls.clone();
    let next = realm.new_function("next", 0, move |realm, _, _| {
        next_calls.set(next_calls.get() + 1);
        let i = pos.get();
        pos.set(i + 1);
        Ok(match values.get(i) {
            Some(v) => realm.create_iter_result(v.clone(), false),
            None => realm.create_iter_result(Value::Undefined, true),
        })
    });
    realm.set(&it, "next", next).unwrap();
    let closes = probe.closes.clone();
    let ret = realm.new_function("return", 0, move |realm, _, _| {
        closes.set(closes.get() + 1);
        match &on_return {
            Ok(Value::Undefined) => Ok(realm.create_iter_result(Value::Undefined, true)),
            Ok(v) => Ok(v.clone()),
            Err(msg) => Err(throw(msg)),
        }
    });
    realm.set(&it, "return", ret).unwrap();
    it
}

fn closing_iterator(realm: &Realm, values: Vec<Value>, probe: &Probe) -> Value {
    iterator_with_return(realm, values, probe, Ok(Value::Undefined))
}

/// An iterator that keeps yielding `1` far longer than any test consumes.
fn endless_iterator(realm: &Realm, probe: &Probe) -> Value {
    let values = vec![Value::from(1); 64];
    iterator_with_return(realm, values, probe, Ok(Value::Undefined))
}

/// A callback recording every value it sees.
fn recorder(realm: &Realm) -> (Value, Rc<RefCell<Vec<Value>>>) {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    let cb = realm.new_function("record", 1, move |_, _, args| {
        sink.borrow_mut().push(args.first().cloned().unwrap_or(Value::Undefined));
        Ok(Value::Undefined)
    });
    (cb, seen)
}

/// A callback that throws `msg` on call number `fail_on` (1-based).
fn failing_callback(realm: &Realm, fail_on: u32, msg: &'static str) -> (Value, Rc<Cell<u32>>) {
    let calls = Rc::new(Cell::new(0));
    let counter = calls.clone();
    let cb = realm.new_function("cb", 1, move |_, _, _| {
        counter.set(counter.get() + 1);
        if counter.get() == fail_on { Err(throw(msg)) } else { Ok(Value::Undefined) }
    });
    (cb, calls)
}

fn invalidate_protector(realm: &Realm) {
    let proto = Value::Object(realm.intrinsics().array_iterator_prototype.clone());
    let next = realm.get(&proto, "next").unwrap();
    realm.set(&proto, "next", next).unwrap();
    assert!(!realm.iteration_protector_intact());
}

#[cfg(test)]
mod iterable_foreach_tests {
    use super::*;

    #[test]
    fn array_elements_arrive_in_order() {
        let realm = Realm::new();
        let (cb, seen) = recorder(&realm);
        let arr = realm.create_array(vec![1.into(), 2.into(), 3.into()]);
        realm.for_each(&arr, &cb).unwrap();
        assert_eq!(*seen.borrow(), vec![Value::from(1), Value::from(2), Value::from(3)]);
    }

    #[test]
    fn set_elements_arrive_in_insertion_order() {
        let realm = Realm::new();
        let (cb, seen) = recorder(&realm);
        let set = realm.create_set(vec![3.into(), 1.into(), 2.into(), 1.into()]);
        realm.for_each(&set, &cb).unwrap();
        assert_eq!(*seen.borrow(), vec![Value::from(3), Value::from(1), Value::from(2)]);
    }

    #[test]
    fn holes_are_materialized_as_undefined() {
        let realm = Realm::new();
        let arr = realm.create_holey_array(vec![Some(1.into()), None, Some(3.into())]);
        let expected = vec![Value::from(1), Value::Undefined, Value::from(3)];

        let (cb, seen) = recorder(&realm);
        realm.for_each(&arr, &cb).unwrap();
        assert_eq!(*seen.borrow(), expected);

        invalidate_protector(&realm);
        let (cb, seen) = recorder(&realm);
        realm.for_each(&arr, &cb).unwrap();
        assert_eq!(*seen.borrow(), expected);
    }

    #[test]
    fn trailing_holes_are_visited() {
        let realm = Realm::new();
        let arr = realm.create_array(vec![]);
        realm.set(&arr, "length", 2.into()).unwrap();
        let (cb, seen) = recorder(&realm);
        realm.for_each(&arr, &cb).unwrap();
        assert_eq!(*seen.borrow(), vec![Value::Undefined, Value::Undefined]);
    }

    #[test]
    fn generic_iterables_are_driven_through_the_protocol() {
        let realm = Realm::new();
        let probe = Probe::default();
        let it = closing_iterator(&realm, vec!["a".into(), "b".into()], &probe);
        let (cb, seen) = recorder(&realm);
        realm.for_each(&it, &cb).unwrap();
        assert_eq!(*seen.borrow(), vec![Value::from("a"), Value::from("b")]);
        // exhaustion is reported by the iterator itself, so no close
        assert_eq!(probe.closes.get(), 0);
        assert_eq!(probe.next_calls.get(), 3);
    }

    #[test]
    fn throwing_callback_closes_exactly_once() {
        let realm = Realm::new();
        let probe = Probe::default();
        let it = endless_iterator(&realm, &probe);
        let (cb, calls) = failing_callback(&realm, 2, "callback error");
        let err = realm.for_each(&it, &cb).unwrap_err();
        assert_eq!(err.message(), "callback error");
        assert_eq!(calls.get(), 2);
        assert_eq!(probe.closes.get(), 1);
    }

    #[test]
    fn callback_error_wins_over_return_error() {
        let realm = Realm::new();
        let probe = Probe::default();
        let it = iterator_with_return(&realm, vec![1.into(), 2.into()], &probe, Err("return error"));
        let (cb, _) = failing_callback(&realm, 1, "callback error");
        let err = realm.for_each(&it, &cb).unwrap_err();
        assert_eq!(err.message(), "callback error");
        assert_eq!(probe.closes.get(), 1);
    }

    #[test]
    fn non_object_return_is_ignored_while_an_error_is_pending() {
        let realm = Realm::new();
        let probe = Probe::default();
        let it = iterator_with_return(&realm, vec![1.into()], &probe, Ok(Value::from(7)));
        let (cb, _) = failing_callback(&realm, 1, "callback error");
        let err = realm.for_each(&it, &cb).unwrap_err();
        assert!(!err.is_type_error());
        assert_eq!(err.message(), "callback error");
        assert_eq!(probe.closes.get(), 1);
    }

    #[test]
    fn non_callable_return_does_not_mask_the_callback_error() {
        let realm = Realm::new();
        let probe = Probe::default();
        let it = closing_iterator(&realm, vec![1.into()], &probe);
        realm.set(&it, "return", Value::from(5)).unwrap();
        let (cb, _) = failing_callback(&realm, 1, "callback error");
        let err = realm.for_each(&it, &cb).unwrap_err();
        assert_eq!(err.message(), "callback error");
    }

    #[test]
    fn throwing_next_is_not_closed() {
        let realm = Realm::new();
        let probe = Probe::default();
        let it = closing_iterator(&realm, vec![], &probe);
        let next = realm.new_function("next", 0, |_, _, _| Err(throw("next error")));
        realm.set(&it, "next", next).unwrap();
        let (cb, calls) = failing_callback(&realm, 0, "unused");
        let err = realm.for_each(&it, &cb).unwrap_err();
        assert_eq!(err.message(), "next error");
        assert_eq!(calls.get(), 0);
        assert_eq!(probe.closes.get(), 0);
    }

    #[test]
    fn non_object_result_is_a_type_error_without_close() {
        let realm = Realm::new();
        let probe = Probe::default();
        let it = closing_iterator(&realm, vec![], &probe);
        let next = realm.new_function("next", 0, |_, _, _| Ok(Value::from(42)));
        realm.set(&it, "next", next).unwrap();
        let (cb, _) = failing_callback(&realm, 0, "unused");
        let err = realm.for_each(&it, &cb).unwrap_err();
        assert!(err.is_type_error());
        assert!(err.message().contains("is not an object"));
        assert_eq!(probe.closes.get(), 0);
    }

    #[test]
    fn throwing_value_getter_is_not_closed() {
        let realm = Realm::new();
        let probe = Probe::default();
        let it = closing_iterator(&realm, vec![], &probe);
        let next = realm.new_function("next", 0, |realm, _, _| {
            let result = realm.new_object();
            realm.set(&result, "done", false.into())?;
            let getter = realm.new_function("get value", 0, |_, _, _| Err(throw("value error")));
            realm.define_accessor(&result, "value", Some(getter), None)?;
            Ok(result)
        });
        realm.set(&it, "next", next).unwrap();
        let (cb, calls) = failing_callback(&realm, 0, "unused");
        let err = realm.for_each(&it, &cb).unwrap_err();
        assert_eq!(err.message(), "value error");
        assert_eq!(calls.get(), 0);
        assert_eq!(probe.closes.get(), 0);
    }

    #[test]
    fn throwing_done_getter_is_not_closed() {
        let realm = Realm::new();
        let probe = Probe::default();
        let it = closing_iterator(&realm, vec![], &probe);
        let next = realm.new_function("next", 0, |realm, _, _| {
            let result = realm.new_object();
            let getter = realm.new_function("get done", 0, |_, _, _| Err(throw("done error")));
            realm.define_accessor(&result, "done", Some(getter), None)?;
            Ok(result)
        });
        realm.set(&it, "next", next).unwrap();
        let (cb, _) = failing_callback(&realm, 0, "unused");
        let err = realm.for_each(&it, &cb).unwrap_err();
        assert_eq!(err.message(), "done error");
        assert_eq!(probe.closes.get(), 0);
    }

    #[test]
    fn value_is_not_read_once_done() {
        let realm = Realm::new();
        let it = realm.new_iterator_object();
        let next = realm.new_function("next", 0, |realm, _, _| {
            let result = realm.new_object();
            realm.set(&result, "done", true.into())?;
            let getter = realm.new_function("get value", 0, |_, _, _| Err(throw("value read")));
            realm.define_accessor(&result, "value", Some(getter), None)?;
            Ok(result)
        });
        realm.set(&it, "next", next).unwrap();
        let (cb, calls) = failing_callback(&realm, 1, "unused");
        realm.for_each(&it, &cb).unwrap();
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn stack_overflow_in_callback_still_closes() {
        let realm = Realm::with_options(RealmOptions {
            stack_limit: 64,
            ..RealmOptions::default()
        });
        let slot = Rc::new(RefCell::new(Value::Undefined));
        let me = slot.clone();
        let recurse = realm.new_function("recurse", 1, move |realm, _, args| {
            let f = me.borrow().clone();
            realm.call(&f, &Value::Undefined, args)
        });
        *slot.borrow_mut() = recurse.clone();

        let probe = Probe::default();
        let it = closing_iterator(&realm, vec![1.into(), 2.into()], &probe);
        let err = realm.for_each(&it, &recurse).unwrap_err();
        assert!(err.is_range_error());
        assert_eq!(err.message(), "Maximum call stack size exceeded");
        assert_eq!(probe.closes.get(), 1);
        assert_eq!(realm.call_depth(), 0);

        *slot.borrow_mut() = Value::Undefined;
    }

    #[test]
    fn non_iterables_are_type_errors() {
        let realm = Realm::new();
        let (cb, _) = recorder(&realm);
        for value in [Value::Undefined, Value::Null, Value::from(3), realm.new_object()] {
            let err = realm.for_each(&value, &cb).unwrap_err();
            assert!(err.is_type_error(), "{value:?}");
            assert!(err.message().ends_with("is not iterable"));
        }
    }

    #[test]
    fn non_callable_callback_is_a_type_error() {
        let realm = Realm::new();
        let arr = realm.create_array(vec![1.into()]);
        let err = realm.for_each(&arr, &Value::from("nope")).unwrap_err();
        assert!(err.is_type_error());
    }

    #[test]
    fn array_growth_during_iteration_is_observed() {
        for fast in [true, false] {
            let realm = Realm::with_options(RealmOptions {
                fast_iteration: fast,
                ..RealmOptions::default()
            });
            let arr = realm.create_array(vec![1.into()]);
            let target = arr.clone();
            let seen = Rc::new(RefCell::new(Vec::new()));
            let sink = seen.clone();
            let cb = realm.new_function("grow", 1, move |realm, _, args| {
                let v = args.first().cloned().unwrap_or(Value::Undefined);
                sink.borrow_mut().push(v.clone());
                if sink.borrow().len() < 4 {
                    realm.invoke(&target, "push", &[v])?;
                }
                Ok(Value::Undefined)
            });
            realm.for_each(&arr, &cb).unwrap();
            assert_eq!(seen.borrow().len(), 4, "fast path: {fast}");
        }
    }

    #[test]
    fn builtin_iterators_are_consumed() {
        let realm = Realm::new();
        let arr = realm.create_array(vec![1.into(), 2.into(), 3.into()]);
        let it = realm.invoke(&arr, "values", &[]).unwrap();
        realm.invoke(&it, "next", &[]).unwrap();
        let (cb, seen) = recorder(&realm);
        realm.for_each(&it, &cb).unwrap();
        assert_eq!(*seen.borrow(), vec![Value::from(2), Value::from(3)]);
        let result = realm.invoke(&it, "next", &[]).unwrap();
        assert!(to_boolean(&realm.get(&result, "done").unwrap()));
    }

    #[test]
    fn set_iterators_are_consumed() {
        let realm = Realm::new();
        let set = realm.create_set(vec!["x".into(), "y".into()]);
        let it = realm.invoke(&set, "values", &[]).unwrap();
        let (cb, seen) = recorder(&realm);
        realm.for_each(&it, &cb).unwrap();
        assert_eq!(*seen.borrow(), vec![Value::from("x"), Value::from("y")]);
    }

    #[test]
    fn cached_next_is_used_for_the_whole_loop() {
        let realm = Realm::new();
        let probe = Probe::default();
        let it = closing_iterator(&realm, vec![1.into(), 2.into(), 3.into()], &probe);
        let target = it.clone();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let cb = realm.new_function("patch", 1, move |realm, _, args| {
            sink.borrow_mut().push(args.first().cloned().unwrap_or(Value::Undefined));
            let replacement = realm.new_function("next", 0, |_, _, _| Err(throw("replacement called")));
            realm.set(&target, "next", replacement)?;
            Ok(Value::Undefined)
        });
        realm.for_each(&it, &cb).unwrap();
        assert_eq!(seen.borrow().len(), 3);
    }

    #[test]
    fn patched_array_iteration_takes_the_generic_path() {
        let realm = Realm::new();
        let probe = Probe::default();
        let replacement_probe = probe.clone();
        // Array.prototype[Symbol.iterator] now yields doubled values
        let patched = realm.new_function("[Symbol.iterator]", 0, move |realm, this, _| {
            let mut doubled = Vec::new();
            let mut i = 0;
            loop {
                let v = realm.get(this, i.to_string())?;
                if i >= js_iteration::to_number(&realm.get(this, "length")?)? as usize {
                    break;
                }
                doubled.push(Value::from(js_iteration::to_number(&v)? * 2.0));
                i += 1;
            }
            Ok(closing_iterator(realm, doubled, &replacement_probe))
        });
        let array_proto = Value::Object(realm.intrinsics().array_prototype.clone());
        realm.set(&array_proto, realm.symbol_iterator(), patched).unwrap();
        assert!(!realm.iteration_protector_intact());

        let arr = realm.create_array(vec![1.into(), 2.into(), 3.into()]);
        let (cb, seen) = recorder(&realm);
        realm.for_each(&arr, &cb).unwrap();
        assert_eq!(*seen.borrow(), vec![Value::from(2), Value::from(4), Value::from(6)]);

        // close-on-throw holds on the generic path too
        let (cb, _) = failing_callback(&realm, 2, "callback error");
        let err = realm.for_each(&arr, &cb).unwrap_err();
        assert_eq!(err.message(), "callback error");
        assert_eq!(probe.closes.get(), 1);
    }

    #[test]
    fn fast_and_slow_paths_agree() {
        let run = |realm: &Realm| {
            let arr = realm.create_array(vec![1.into(), 2.into(), 3.into()]);
            let (cb, seen) = recorder(realm);
            realm.for_each(&arr, &cb).unwrap();
            let (failing, calls) = failing_callback(realm, 2, "callback error");
            let err = realm.for_each(&arr, &failing).unwrap_err();
            let out = seen.borrow().clone();
            (out, err.message(), calls.get())
        };
        let fast = Realm::new();
        let slow = Realm::new();
        invalidate_protector(&slow);
        assert_eq!(run(&fast), run(&slow));
        assert!(fast.iteration_protector_intact());
    }

    #[test]
    fn protector_never_revalidates() {
        let realm = Realm::new();
        let proto = Value::Object(realm.intrinsics().set_prototype.clone());
        let original = realm.get(&proto, realm.symbol_iterator()).unwrap();
        let replacement = realm.new_function("[Symbol.iterator]", 0, |_, _, _| Ok(Value::Undefined));
        realm.set(&proto, realm.symbol_iterator(), replacement).unwrap();
        realm.set(&proto, realm.symbol_iterator(), original).unwrap();
        assert!(!realm.iteration_protector_intact());

        // the restored hook works through the generic path
        let set = realm.create_set(vec![1.into(), 2.into()]);
        let (cb, seen) = recorder(&realm);
        realm.for_each(&set, &cb).unwrap();
        assert_eq!(*seen.borrow(), vec![Value::from(1), Value::from(2)]);
    }

    fn counting_return(realm: &Realm) -> (Value, Rc<Cell<u32>>) {
        let closes = Rc::new(Cell::new(0));
        let counter = closes.clone();
        let ret = realm.new_function("return", 0, move |realm, _, _| {
            counter.set(counter.get() + 1);
            Ok(realm.create_iter_result(Value::Undefined, true))
        });
        (ret, closes)
    }

    fn realm_with_fast_path(fast: bool) -> Realm {
        Realm::with_options(RealmOptions {
            fast_iteration: fast,
            ..RealmOptions::default()
        })
    }

    #[test]
    fn own_return_on_builtin_iterator_runs_on_both_paths() {
        for fast in [true, false] {
            let realm = realm_with_fast_path(fast);
            let arr = realm.create_array(vec![1.into(), 2.into(), 3.into()]);
            let it = realm.invoke(&arr, "values", &[]).unwrap();
            let (ret, closes) = counting_return(&realm);
            realm.set(&it, "return", ret).unwrap();
            let (cb, _) = failing_callback(&realm, 2, "callback error");
            let err = realm.for_each(&it, &cb).unwrap_err();
            assert_eq!(err.message(), "callback error");
            assert_eq!(closes.get(), 1, "fast path: {fast}");
            assert_eq!(realm.iteration_protector_intact(), fast);
        }
    }

    #[test]
    fn inherited_return_runs_for_arrays_on_both_paths() {
        for fast in [true, false] {
            let realm = realm_with_fast_path(fast);
            let proto = Value::Object(realm.intrinsics().array_iterator_prototype.clone());
            let (ret, closes) = counting_return(&realm);
            realm.set(&proto, "return", ret).unwrap();
            assert_eq!(realm.iteration_protector_intact(), fast);

            let arr = realm.create_array(vec![1.into(), 2.into()]);
            let (cb, _) = failing_callback(&realm, 1, "callback error");
            let err = realm.for_each(&arr, &cb).unwrap_err();
            assert_eq!(err.message(), "callback error");
            assert_eq!(closes.get(), 1, "fast path: {fast}");

            // exhausting normally never closes
            let (cb, _) = recorder(&realm);
            realm.for_each(&arr, &cb).unwrap();
            assert_eq!(closes.get(), 1);
        }
    }

    #[test]
    fn inherited_return_runs_for_sets_on_both_paths() {
        for fast in [true, false] {
            let realm = realm_with_fast_path(fast);
            // installed on %IteratorPrototype%, reached through %SetIteratorPrototype%
            let proto = Value::Object(realm.intrinsics().iterator_prototype.clone());
            let (ret, closes) = counting_return(&realm);
            realm.set(&proto, "return", ret).unwrap();

            let set = realm.create_set(vec!["a".into(), "b".into()]);
            let (cb, _) = failing_callback(&realm, 2, "callback error");
            let err = realm.for_each(&set, &cb).unwrap_err();
            assert_eq!(err.message(), "callback error");
            assert_eq!(closes.get(), 1, "fast path: {fast}");

            let it = realm.invoke(&set, "values", &[]).unwrap();
            let (cb, _) = failing_callback(&realm, 1, "callback error");
            realm.for_each(&it, &cb).unwrap_err();
            assert_eq!(closes.get(), 2, "fast path: {fast}");
        }
    }

    #[test]
    fn callback_error_wins_over_inherited_return_error_on_fast_path() {
        let realm = Realm::new();
        let proto = Value::Object(realm.intrinsics().array_iterator_prototype.clone());
        let ret = realm.new_function("return", 0, |_, _, _| Err(throw("return error")));
        realm.set(&proto, "return", ret).unwrap();
        assert!(realm.iteration_protector_intact());

        let arr = realm.create_array(vec![1.into()]);
        let (cb, _) = failing_callback(&realm, 1, "callback error");
        let err = realm.for_each(&arr, &cb).unwrap_err();
        assert_eq!(err.message(), "callback error");
    }
}
