mod common;

use std::collections::HashMap;
use std::future::IntoFuture;

use common::{init_test_logging, TableBatch};
use futures::future;
use scoped_dataload::{batch_fn, run, run_with, LoadError, ScopeConfig};

#[derive(Debug, PartialEq, Eq, Clone)]
struct DummyData(String);

fn fish() -> TableBatch<DummyData> {
    TableBatch::new([
        (42, DummyData("one fish".to_owned())),
        (12, DummyData("two fish".to_owned())),
        (5, DummyData("red fish".to_owned())),
        (8, DummyData("blue fish".to_owned())),
    ])
}

#[tokio::test]
async fn basic_load() {
    init_test_logging();
    let batch = fish();

    let value = run(|scope| {
        let batch = batch.clone();
        async move {
            let loader = scope.loader("fish", batch)?;
            loader.load(42).await
        }
    })
    .await;

    assert_eq!(value.unwrap(), Some(DummyData("one fish".to_owned())));
    assert_eq!(batch.calls(), vec![vec![42]]);
}

#[tokio::test]
async fn same_key_shares_one_deferred_and_one_fetch() {
    init_test_logging();
    let batch = TableBatch::new([(1, "x"), (2, "y")]);

    let (a, b, c) = run(|scope| {
        let batch = batch.clone();
        async move {
            let loader = scope.loader("A", batch)?;
            let a = loader.load(1);
            let b = loader.load(1);
            let c = loader.load(2);
            assert!(a.ptr_eq(&b));
            Ok::<_, LoadError>((a.await?, b.await?, c.await?))
        }
    })
    .await
    .unwrap();

    assert_eq!((a, b, c), (Some("x"), Some("x"), Some("y")));
    assert_eq!(batch.calls(), vec![vec![1, 2]]);
}

#[tokio::test]
async fn repeated_load_is_served_from_cache() {
    init_test_logging();
    let batch = fish();

    run(|scope| {
        let batch = batch.clone();
        async move {
            let loader = scope.loader("fish", batch)?;
            let first = loader.load(42);
            assert_eq!(first.clone().await?, Some(DummyData("one fish".to_owned())));

            let again = loader.load(42);
            assert!(again.ptr_eq(&first));
            assert!(again.is_completed());
            assert_eq!(again.await?, Some(DummyData("one fish".to_owned())));
            Ok::<_, LoadError>(())
        }
    })
    .await
    .unwrap();

    assert_eq!(batch.call_count(), 1);
}

#[tokio::test]
async fn missing_key_resolves_to_none() {
    init_test_logging();

    let value = run(|scope| async move {
        let loader = scope.loader("fish", fish())?;
        loader.load(99).await
    })
    .await;

    assert_eq!(value.unwrap(), None);
}

#[tokio::test]
async fn concurrent_loads_coalesce_into_one_batch() {
    init_test_logging();
    let batch = fish();

    let loaded = run(|scope| {
        let batch = batch.clone();
        async move {
            let loader = scope.loader("fish", batch)?;
            let tuple = future::join4(
                loader.load(5).into_future(),
                loader.load_all(vec![5, 42]),
                loader.load(99).into_future(),
                loader.load(12).into_future(),
            )
            .await;
            Ok::<_, LoadError>((tuple.0?, tuple.1?, tuple.2?, tuple.3?))
        }
    })
    .await
    .unwrap();

    assert_eq!(
        loaded,
        (
            Some(DummyData("red fish".to_owned())),
            vec![Some(DummyData("red fish".to_owned())), Some(DummyData("one fish".to_owned()))],
            None,
            Some(DummyData("two fish".to_owned()))
        )
    );
    assert_eq!(batch.calls(), vec![vec![5, 12, 42, 99]]);
}

#[tokio::test]
async fn load_all_keeps_request_order() {
    init_test_logging();

    let values = run(|scope| async move {
        let loader = scope.loader("fish", fish())?;
        loader.load_all(vec![12, 2010, 8, 12]).await
    })
    .await
    .unwrap();

    assert_eq!(
        values,
        vec![
            Some(DummyData("two fish".to_owned())),
            None,
            Some(DummyData("blue fish".to_owned())),
            Some(DummyData("two fish".to_owned()))
        ]
    );
}

#[tokio::test]
async fn load_many_treats_missing_keys_as_empty() {
    init_test_logging();
    let batch = TableBatch::new([(1, vec!["a", "b"]), (2, vec!["c"])]);

    let (one, two, three) = run(|scope| {
        let batch = batch.clone();
        async move {
            let loader = scope.loader("children", batch)?;
            let (one, two, three) =
                future::join3(loader.load_many(1), loader.load_many(2), loader.load_many(3)).await;
            Ok::<_, LoadError>((one?, two?, three?))
        }
    })
    .await
    .unwrap();

    assert_eq!(one, vec!["a", "b"]);
    assert_eq!(two, vec!["c"]);
    assert!(three.is_empty());
    assert_eq!(batch.calls(), vec![vec![1, 2, 3]]);
}

#[tokio::test]
async fn primed_values_skip_the_batch_function() {
    init_test_logging();
    let batch = fish();

    let values = run(|scope| {
        let batch = batch.clone();
        async move {
            let loader = scope.loader("fish", batch)?;
            assert!(loader.prime(7, DummyData("primed fish".to_owned())));
            assert!(!loader.prime(7, DummyData("ignored".to_owned())));
            loader.prime_many(vec![(9, DummyData("nine".to_owned()))]);
            loader.load_all(vec![7, 9]).await
        }
    })
    .await
    .unwrap();

    assert_eq!(
        values,
        vec![Some(DummyData("primed fish".to_owned())), Some(DummyData("nine".to_owned()))]
    );
    assert_eq!(batch.call_count(), 0);
}

#[tokio::test]
async fn cleared_keys_are_fetched_again() {
    init_test_logging();
    let batch = fish();

    run(|scope| {
        let batch = batch.clone();
        async move {
            let loader = scope.loader("fish", batch)?;
            loader.load(8).await?;
            assert!(loader.clear(&8));
            assert!(!loader.clear(&8));
            loader.load(8).await?;
            Ok::<_, LoadError>(())
        }
    })
    .await
    .unwrap();

    assert_eq!(batch.calls(), vec![vec![8], vec![8]]);
}

#[tokio::test]
async fn closure_batch_functions() {
    init_test_logging();

    let names = run(|scope| async move {
        let loader = scope.loader(
            "names",
            batch_fn(|ids: Vec<u64>| async move {
                let names = ids.into_iter().map(|id| (id, format!("user-{}", id)));
                Ok::<_, anyhow::Error>(names.collect::<HashMap<_, _>>())
            }),
        )?;
        loader.load_all(vec![3, 1]).await
    })
    .await
    .unwrap();

    assert_eq!(names, vec![Some("user-3".to_owned()), Some("user-1".to_owned())]);
}

#[tokio::test]
async fn large_windows_are_fetched_in_chunks() {
    init_test_logging();
    let batch = TableBatch::new((1..=5).map(|k| (k, k * 10)));
    let config = ScopeConfig::default().with_max_batch_size(2);

    let stats = run_with(config, |scope| {
        let batch = batch.clone();
        async move {
            let loader = scope.loader("tens", batch)?;
            let values = loader.load_all(1..=5).await?;
            assert_eq!(values, vec![Some(10), Some(20), Some(30), Some(40), Some(50)]);
            Ok::<_, LoadError>(scope.stats())
        }
    })
    .await
    .unwrap();

    let sizes = batch.calls().iter().map(Vec::len).collect::<Vec<_>>();
    assert_eq!(sizes, vec![2, 2, 1]);
    assert_eq!(stats.batches, 1);
    assert_eq!(stats.fetch_calls, 3);
    assert_eq!(stats.keys_fetched, 5);
}
