//! Store Integration Tests
//!
//! End-to-end behaviour of constructed stores: setter synthesis, memoized
//! derivations, batched actions, reactions, and nested fields.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use trove_core::reactive::Transaction;
use trove_core::store::{Accessor, FieldRole};
use trove_core::{
    create_reaction, create_store, json, Cleanup, Definition, Json, Method, Store, StoreError,
};

fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

fn count(counter: &AtomicUsize) -> usize {
    counter.load(Ordering::SeqCst)
}

fn int(store: &Store, field: &str) -> Result<i64, StoreError> {
    Ok(store.get(field)?.as_i64().unwrap_or_default())
}

/// `v`, `updateV(n)` and `doubleV()`, counting evaluations of `doubleV`.
fn v_store(double_calls: &Arc<AtomicUsize>) -> Store {
    let double_calls = double_calls.clone();
    create_store(
        Definition::new()
            .value("v", 2)
            .method("updateV", |store, args| {
                store.set("v", args[0].clone())?;
                Ok(Json::Null)
            })
            .method("doubleV", move |store, _| {
                double_calls.fetch_add(1, Ordering::SeqCst);
                Ok(json!(int(store, "v")? * 2))
            }),
    )
}

/// A reaction reading `doubleV()` that records every value it saw.
fn watch_double(store: &Store) -> Arc<Mutex<Vec<Json>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let (store, seen_clone) = (store.clone(), seen.clone());
    create_reaction(move || -> Result<(), StoreError> {
        let double = store.call("doubleV", &[])?;
        assert_eq!(json!(int(&store, "v")? * 2), double);
        seen_clone.lock().push(double);
        Ok(())
    });
    seen
}

#[test]
fn update_then_derive() {
    let double_calls = counter();
    let store = v_store(&double_calls);
    let seen = watch_double(&store);

    store.call("updateV", &[json!(3)]).unwrap();

    assert_eq!(store.call("doubleV", &[]).unwrap(), json!(6));
    assert_eq!(*seen.lock(), vec![json!(4), json!(6)]);
}

/// Two reactions share `doubleV`, and `octupleV` is derived from it.
#[test]
fn derivations_compute_once_per_change() {
    let double_calls = counter();
    let octuple_calls = counter();
    let (double_clone, octuple_clone) = (double_calls.clone(), octuple_calls.clone());

    let store = create_store(
        Definition::new()
            .value("v", 2)
            .method("updateV", |store, args| {
                store.set("v", args[0].clone())?;
                Ok(Json::Null)
            })
            .method("doubleV", move |store, _| {
                double_clone.fetch_add(1, Ordering::SeqCst);
                Ok(json!(int(store, "v")? * 2))
            })
            .method("octupleV", move |store, _| {
                octuple_clone.fetch_add(1, Ordering::SeqCst);
                let double = store.call("doubleV", &[])?.as_i64().unwrap_or_default();
                Ok(json!(double * 4))
            }),
    );

    let doubles = watch_double(&store);
    let octuples = Arc::new(Mutex::new(Vec::new()));
    let (reader, octuples_clone) = (store.clone(), octuples.clone());
    create_reaction(move || -> Result<(), StoreError> {
        let octuple = reader.call("octupleV", &[])?;
        assert_eq!(json!(int(&reader, "v")? * 8), octuple);
        octuples_clone.lock().push(octuple);
        Ok(())
    });

    store.call("updateV", &[json!(3)]).unwrap();

    assert_eq!(*doubles.lock(), vec![json!(4), json!(6)]);
    assert_eq!(count(&double_calls), 2);
    assert_eq!(*octuples.lock(), vec![json!(16), json!(24)]);
    assert_eq!(count(&octuple_calls), 2);
}

/// A derivation whose inputs change while its result does not leaves its
/// reactions alone.
#[test]
fn unchanged_derivation_does_not_rerun_reactions() {
    let is_even_calls = counter();
    let is_even_clone = is_even_calls.clone();
    let store = create_store(Definition::new().value("v", 2).method("isEven", move |store, _| {
        is_even_clone.fetch_add(1, Ordering::SeqCst);
        Ok(json!(int(store, "v")? % 2 == 0))
    }));

    let seen = Arc::new(Mutex::new(Vec::new()));
    let (reader, seen_clone) = (store.clone(), seen.clone());
    let disposer = create_reaction(move || -> Result<(), StoreError> {
        seen_clone.lock().push(reader.call("isEven", &[])?);
        Ok(())
    });

    store.call("setV", &[json!(4)]).unwrap();
    store.call("setV", &[json!(6)]).unwrap();

    assert_eq!(disposer.run_count(), 1);
    assert_eq!(*seen.lock(), vec![json!(true)]);
    assert_eq!(count(&is_even_calls), 3);

    store.call("setV", &[json!(7)]).unwrap();
    assert_eq!(disposer.run_count(), 2);
    assert_eq!(*seen.lock(), vec![json!(true), json!(false)]);
}

#[test]
fn auto_generated_setters() {
    let store = create_store(Definition::new().value("a", 2));

    assert_eq!(store.get("a").unwrap(), json!(2));
    assert!(store.descriptor().role("setA").is_some_and(|role| role.is_callable()));

    store.call("setA", &[json!(3)]).unwrap();
    assert_eq!(store.get("a").unwrap(), json!(3));
}

#[test]
fn custom_setters_are_respected() {
    let store = create_store(Definition::new().value("a", 2).method("setA", |store, args| {
        let v = args[0].as_i64().unwrap_or_default();
        store.set("a", json!(v * 2))?;
        Ok(Json::Null)
    }));

    assert_eq!(store.get("a").unwrap(), json!(2));
    store.call("setA", &[json!(2)]).unwrap();
    assert_eq!(store.get("a").unwrap(), json!(4));

    assert_eq!(store.descriptor().role("setA"), Some(&FieldRole::Method));
    assert!(!store.has_field("setSetA"));
}

#[test]
fn batched_writes_notify_once() {
    let double_calls = counter();
    let store = v_store(&double_calls);
    let seen = watch_double(&store);

    // A method that performs several writes is one action.
    let runner = create_store(Definition::new().method("setAll", {
        let store = store.clone();
        move |_: &Store, args: &[Json]| {
            for value in args {
                store.call("setV", &[value.clone()])?;
            }
            Ok(Json::Null)
        }
    }));
    runner
        .call("setAll", &[json!(3), json!(4), json!(5)])
        .unwrap();

    assert_eq!(seen.lock().len(), 2);
    assert_eq!(store.call("doubleV", &[]).unwrap(), json!(10));
    assert_eq!(seen.lock().len(), 2);
    assert_eq!(count(&double_calls), 2);

    // Same writes, wrapped explicitly.
    Transaction::run(|| -> Result<(), StoreError> {
        store.call("setV", &[json!(6)])?;
        store.call("setV", &[json!(7)])?;
        store.call("setV", &[json!(8)]).map(drop)
    })
    .unwrap();
    assert_eq!(*seen.lock().last().unwrap(), json!(16));
    assert_eq!(seen.lock().len(), 3);
}

#[test]
fn unbatched_writes_notify_each_time() {
    let store = create_store(Definition::new().value("v", 0));
    let runs = counter();
    let (reader, runs_clone) = (store.clone(), runs.clone());
    create_reaction(move || {
        reader.get("v").ok();
        runs_clone.fetch_add(1, Ordering::SeqCst);
    });

    store.set("v", json!(1)).unwrap();
    store.set("v", json!(2)).unwrap();
    store.set("v", json!(3)).unwrap();

    assert_eq!(count(&runs), 4);
}

#[test]
fn self_reference_pattern() {
    let store = create_store(
        Definition::new()
            .value("c", 2)
            .method("doubleC", |store, _| Ok(json!(int(store, "c")? * 2))),
    );

    assert_eq!(store.call("doubleC", &[]).unwrap(), json!(4));
}

/// A method stored in a field and swapped out through another method.
#[test]
fn box_pattern() {
    let store = create_store(
        Definition::new()
            .method("_z", |_, _| Ok(json!(123)))
            .method("z", |store, _| store.call("_z", &[]))
            .method("setZ", |store, args| {
                let v = args[0].clone();
                store.replace_method("_z", Method::new(move |_, _| Ok(v.clone())))?;
                Ok(Json::Null)
            }),
    );
    let seen = Arc::new(Mutex::new(Vec::new()));
    let (reader, seen_clone) = (store.clone(), seen.clone());
    create_reaction(move || -> Result<(), StoreError> {
        seen_clone.lock().push(reader.call("z", &[])?);
        Ok(())
    });

    assert_eq!(store.call("z", &[]).unwrap(), json!(123));
    store.call("setZ", &[json!(321)]).unwrap();
    assert_eq!(store.call("z", &[]).unwrap(), json!(321));

    assert_eq!(*seen.lock(), vec![json!(123), json!(321)]);
    assert!(store.descriptor().synthesized_setters().next().is_none());
}

#[test]
fn nested_field_updates() {
    let store = create_store(Definition::new().value("a", json!({ "b": 1, "c": 2 })));
    let (b_runs, c_runs) = (counter(), counter());

    let (reader, runs) = (store.clone(), b_runs.clone());
    create_reaction(move || {
        reader.get_path(&["a", "b"]).ok();
        runs.fetch_add(1, Ordering::SeqCst);
    });
    let (reader, runs) = (store.clone(), c_runs.clone());
    create_reaction(move || {
        reader.get_path(&["a", "c"]).ok();
        runs.fetch_add(1, Ordering::SeqCst);
    });

    let increment = |store: &Store| {
        store.update_path(&["a", "b"], |b| json!(b.as_i64().unwrap_or_default() + 1))
    };

    Transaction::run(|| -> Result<(), StoreError> {
        increment(&store)?;
        increment(&store)
    })
    .unwrap();
    assert_eq!(count(&b_runs), 2);
    assert_eq!(count(&c_runs), 1);
    assert_eq!(store.get_path(&["a", "b"]).unwrap(), json!(3));
    assert_eq!(store.get_path(&["a", "c"]).unwrap(), json!(2));

    increment(&store).unwrap();
    increment(&store).unwrap();
    assert_eq!(count(&b_runs), 4);
    assert_eq!(count(&c_runs), 1);
    assert_eq!(store.get_path(&["a", "b"]).unwrap(), json!(5));
}

#[test]
fn getter_without_setter_fails_when_set() {
    let store = create_store(
        Definition::new()
            .value("n", 1)
            .getter("twice", |store| Ok(json!(int(store, "n")? * 2))),
    );

    assert_eq!(store.get("twice").unwrap(), json!(2));
    assert!(store.has_field("setTwice"));

    let error = store.call("setTwice", &[json!(10)]).unwrap_err();
    assert_eq!(error, StoreError::GetterWithoutSetter("twice".into()));
    assert!(error.to_string().contains("twice"));
}

#[test]
fn accessor_setter_is_used_by_synthesized_setter() {
    let store = create_store(
        Definition::new().value("celsius", 0).accessor(
            "fahrenheit",
            Accessor::getter(|store| Ok(json!(int(store, "celsius")? * 9 / 5 + 32))).with_setter(
                |store, value| {
                    let f = value.as_i64().unwrap_or_default();
                    store.set("celsius", json!((f - 32) * 5 / 9))
                },
            ),
        ),
    );

    store.call("setFahrenheit", &[json!(212)]).unwrap();

    assert_eq!(store.get("celsius").unwrap(), json!(100));
    assert_eq!(store.get("fahrenheit").unwrap(), json!(212));
}

#[test]
fn method_errors_propagate_after_partial_writes() {
    let store = create_store(Definition::new().value("v", 0).method("failAfterWrite", |store, _| {
        store.set("v", json!(1))?;
        Err(StoreError::method("nope"))
    }));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let (reader, seen_clone) = (store.clone(), seen.clone());
    create_reaction(move || {
        seen_clone.lock().push(reader.get("v").unwrap_or(Json::Null));
    });

    let result = store.call("failAfterWrite", &[]);

    assert_eq!(result, Err(StoreError::method("nope")));
    assert_eq!(*seen.lock(), vec![json!(0), json!(1)]);
}

#[test]
fn memoization_is_per_argument_tuple() {
    let calls = counter();
    let calls_clone = calls.clone();
    let store = create_store(Definition::new().value("base", 10).method("plus", move |store, args| {
        calls_clone.fetch_add(1, Ordering::SeqCst);
        Ok(json!(int(store, "base")? + args[0].as_i64().unwrap_or_default()))
    }));

    let reader = store.clone();
    create_reaction(move || {
        reader.call("plus", &[json!(1)]).ok();
        reader.call("plus", &[json!(2)]).ok();
        reader.call("plus", &[json!(1)]).ok();
    });
    assert_eq!(count(&calls), 2);

    store.call("setBase", &[json!(20)]).unwrap();
    assert_eq!(count(&calls), 4);
    assert_eq!(store.dispatcher("plus").unwrap().cached_entries(), 2);
}

#[test]
fn reaction_cleanup_and_dispose() {
    let store = create_store(Definition::new().value("v", 0));
    let log = Arc::new(Mutex::new(Vec::new()));
    let (reader, log_clone) = (store.clone(), log.clone());

    let disposer = create_reaction(move || -> Result<Cleanup, StoreError> {
        let v = reader.get("v")?;
        log_clone.lock().push(format!("run {v}"));
        let log = log_clone.clone();
        Ok(Cleanup::new(move || log.lock().push(format!("cleanup {v}"))))
    });

    store.call("setV", &[json!(1)]).unwrap();
    disposer.dispose();
    store.call("setV", &[json!(2)]).unwrap();

    assert_eq!(
        *log.lock(),
        vec!["run 0", "cleanup 0", "run 1", "cleanup 1"]
    );
}

#[test]
fn writes_from_a_reaction_reach_other_reactions() {
    let store = create_store(Definition::new().value("source", 1).value("mirror", 0));

    let writer = store.clone();
    create_reaction(move || -> Result<(), StoreError> {
        let source = writer.get("source")?;
        writer.call("setMirror", &[source])?;
        Ok(())
    });
    let mirrored = Arc::new(Mutex::new(Vec::new()));
    let (reader, mirrored_clone) = (store.clone(), mirrored.clone());
    create_reaction(move || {
        mirrored_clone.lock().push(reader.get("mirror").unwrap_or(Json::Null));
    });

    store.call("setSource", &[json!(7)]).unwrap();

    assert_eq!(store.get("mirror").unwrap(), json!(7));
    assert_eq!(mirrored.lock().last(), Some(&json!(7)));
}

#[test]
fn snapshot_reflects_current_state() {
    let store = create_store(
        Definition::new()
            .value("name", "trove")
            .value("tags", json!(["a"]))
            .value("meta", json!({ "stars": 1 })),
    );

    store.set_path(&["meta", "stars"], json!(2)).unwrap();
    store.call("setTags", &[json!(["a", "b"])]).unwrap();

    assert_eq!(
        store.snapshot(),
        json!({ "name": "trove", "tags": ["a", "b"], "meta": { "stars": 2 } })
    );
}
