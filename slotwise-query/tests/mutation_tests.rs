use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde::{Deserialize, Serialize};
use slotwise_query::{
    CacheConfig, MutationOptions, MutationStatus, NetworkMode, QueryClient, QueryError, QueryKey,
    QueryOptions, query_key,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Item {
    id: u32,
    name: String,
}

fn item(id: u32) -> Item {
    Item {
        id,
        name: format!("Item {id}"),
    }
}

fn items_key() -> QueryKey {
    query_key!["items"]
}

fn seeded(config: CacheConfig) -> QueryClient {
    let client = QueryClient::new(config);
    client.set_query_data(&items_key(), &vec![item(1)]).unwrap();
    client
}

fn append(old: Option<Vec<Item>>, new: &Item) -> Vec<Item> {
    let mut list = old.unwrap_or_default();
    list.push(new.clone());
    list
}

fn cached(client: &QueryClient) -> Option<Vec<Item>> {
    client.get_query_data(&items_key()).unwrap()
}

/// Retries enabled, no backoff delay.
fn retrying() -> CacheConfig {
    CacheConfig {
        retry_base_delay_ms: 0,
        retry_max_delay_ms: 0,
        ..CacheConfig::default()
    }
}

// ── Optimistic append ────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn successful_append_keeps_both_rows() {
    let client = seeded(CacheConfig::immediate());
    let mutation = client.mutation(
        MutationOptions::new(|new: Item| async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok::<_, QueryError>(new)
        })
        .optimistic(items_key(), append),
    );

    let task = {
        let mutation = mutation.clone();
        tokio::spawn(async move { mutation.mutate(item(2)).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(cached(&client), Some(vec![item(1), item(2)]));
    assert_eq!(mutation.status(), MutationStatus::Mutating);

    let saved = task.await.unwrap().unwrap();
    assert_eq!(saved, item(2));
    assert_eq!(cached(&client), Some(vec![item(1), item(2)]));
    assert!(mutation.state().is_success());
}

#[tokio::test(start_paused = true)]
async fn failed_append_restores_original_rows() {
    let client = seeded(CacheConfig::immediate());
    let mutation = client.mutation(
        MutationOptions::new(|_: Item| async { Err::<Item, _>(QueryError::new("Failed")) })
            .optimistic(items_key(), append),
    );

    let err = mutation.mutate(item(2)).await.unwrap_err();
    assert_eq!(err.message, "Failed");
    assert_eq!(cached(&client), Some(vec![item(1)]));

    let state = mutation.state();
    assert!(state.is_error());
    assert_eq!(state.error.map(|e| e.message), Some("Failed".to_string()));
    assert_eq!(state.variables, Some(item(2)));
}

#[tokio::test(start_paused = true)]
async fn rollback_happens_before_on_error() {
    let client = seeded(CacheConfig::immediate());
    let seen = Arc::new(Mutex::new(None));
    let mutation = client.mutation(
        MutationOptions::new(|_: Item| async { Err::<Item, _>(QueryError::new("Failed")) })
            .optimistic(items_key(), append)
            .on_error({
                let client = client.clone();
                let seen = Arc::clone(&seen);
                move |_, _, _| {
                    *seen.lock().unwrap() = cached(&client);
                }
            }),
    );

    let _ = mutation.mutate(item(2)).await;
    assert_eq!(*seen.lock().unwrap(), Some(vec![item(1)]));
}

#[tokio::test(start_paused = true)]
async fn panicking_on_error_still_rolls_back() {
    let client = seeded(CacheConfig::immediate());
    let mutation = client.mutation(
        MutationOptions::new(|_: Item| async { Err::<Item, _>(QueryError::new("Failed")) })
            .optimistic(items_key(), append)
            .on_error(|_, _, _| panic!("callback failed")),
    );

    assert!(mutation.mutate(item(2)).await.is_err());
    assert_eq!(cached(&client), Some(vec![item(1)]));
    assert!(mutation.state().is_error());
}

#[tokio::test(start_paused = true)]
async fn rollback_of_absent_entry_removes_it() {
    let client = QueryClient::new(CacheConfig::immediate());
    let mutation = client.mutation(
        MutationOptions::new(|_: Item| async { Err::<Item, _>(QueryError::new("Failed")) })
            .optimistic(items_key(), append),
    );

    let _ = mutation.mutate(item(1)).await;
    assert_eq!(cached(&client), None);
    assert!(client.is_empty());
}

#[tokio::test(start_paused = true)]
async fn dropped_mutation_rolls_back() {
    let client = seeded(CacheConfig::immediate());
    let mutation = client.mutation(
        MutationOptions::new(|new: Item| async move {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok::<_, QueryError>(new)
        })
        .optimistic(items_key(), append),
    );

    let task = {
        let mutation = mutation.clone();
        tokio::spawn(async move { mutation.mutate(item(2)).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(cached(&client).map(|rows| rows.len()), Some(2));

    task.abort();
    let _ = task.await;
    assert_eq!(cached(&client), Some(vec![item(1)]));
}

#[tokio::test(start_paused = true)]
async fn optimistic_write_cancels_fetch_in_flight() {
    let client = QueryClient::new(CacheConfig::immediate());
    let observer = client.watch_query(
        items_key(),
        || async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok::<_, QueryError>(vec![item(9)])
        },
        QueryOptions::default(),
    );
    let mutation = client.mutation(
        MutationOptions::new(|new: Item| async move { Ok::<_, QueryError>(new) })
            .optimistic(items_key(), append),
    );

    mutation.mutate(item(2)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(observer.data(), Some(vec![item(2)]));
}

#[tokio::test(start_paused = true)]
async fn rollback_keeps_invalidation() {
    let client = QueryClient::new(CacheConfig::immediate());
    client
        .fetch_query(items_key(), || async { Ok::<_, QueryError>(vec![item(1)]) }, None)
        .await
        .unwrap();
    client.invalidate_queries(&items_key());
    assert!(client.is_stale(&items_key()));

    let mutation = client.mutation(
        MutationOptions::new(|_: Item| async { Err::<Item, _>(QueryError::new("Failed")) })
            .optimistic(items_key(), append),
    );
    assert!(mutation.mutate(item(2)).await.is_err());

    assert_eq!(cached(&client), Some(vec![item(1)]));
    assert!(client.is_stale(&items_key()));
    assert_eq!(client.refetch_stale(), 1);
}

#[tokio::test(start_paused = true)]
async fn panicking_update_skips_optimism() {
    let client = seeded(CacheConfig::immediate());
    let mutation = client.mutation(
        MutationOptions::new(|new: Item| async move { Ok::<_, QueryError>(new) }).optimistic(
            items_key(),
            |_: Option<Vec<Item>>, _: &Item| -> Vec<Item> { panic!("update failed") },
        ),
    );

    assert_eq!(mutation.mutate(item(2)).await.unwrap(), item(2));
    assert!(mutation.state().is_success());
    assert_eq!(cached(&client), Some(vec![item(1)]));
}

#[tokio::test(start_paused = true)]
async fn update_may_read_other_entries() {
    let client = seeded(CacheConfig::immediate());
    client.set_query_data(&query_key!["extra"], &vec![item(7)]).unwrap();
    let reader = client.clone();
    let mutation = client.mutation(
        MutationOptions::new(|new: Item| async move { Ok::<_, QueryError>(new) }).optimistic(
            items_key(),
            move |old: Option<Vec<Item>>, new: &Item| {
                let mut list = append(old, new);
                let extra: Option<Vec<Item>> = reader.get_query_data(&query_key!["extra"]).unwrap();
                list.extend(extra.unwrap_or_default());
                list
            },
        ),
    );

    mutation.mutate(item(2)).await.unwrap();
    assert_eq!(cached(&client), Some(vec![item(1), item(2), item(7)]));
}

// ── Pipeline order & context ─────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn steps_run_in_pipeline_order() {
    let client = seeded(CacheConfig::immediate());
    let log = Arc::new(Mutex::new(Vec::new()));
    let mutation = client.mutation(
        MutationOptions::new({
            let log = Arc::clone(&log);
            move |new: Item| {
                let log = Arc::clone(&log);
                async move {
                    log.lock().unwrap().push("mutation_fn");
                    Ok::<_, QueryError>(new)
                }
            }
        })
        .on_mutate({
            let log = Arc::clone(&log);
            move |_: Item| {
                let log = Arc::clone(&log);
                async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    log.lock().unwrap().push("on_mutate");
                }
            }
        })
        .on_success({
            let log = Arc::clone(&log);
            move |_, _, _| log.lock().unwrap().push("on_success")
        }),
    );

    mutation.mutate(item(2)).await.unwrap();
    assert_eq!(
        *log.lock().unwrap(),
        vec!["on_mutate", "mutation_fn", "on_success"]
    );
}

#[tokio::test(start_paused = true)]
async fn context_carries_previous_data() {
    let client = seeded(CacheConfig::immediate());
    let previous = Arc::new(Mutex::new(None));
    let mutation = client.mutation(
        MutationOptions::new(|new: Item| async move { Ok::<_, QueryError>(new) })
            .optimistic(items_key(), append)
            .on_success({
                let previous = Arc::clone(&previous);
                move |_, vars: &Item, ctx| {
                    assert_eq!(ctx.variables, *vars);
                    assert_eq!(ctx.optimistic_key(), Some(&items_key()));
                    *previous.lock().unwrap() = ctx.previous::<Vec<Item>>();
                }
            }),
    );

    mutation.mutate(item(2)).await.unwrap();
    assert_eq!(*previous.lock().unwrap(), Some(vec![item(1)]));
}

#[tokio::test(start_paused = true)]
async fn success_invalidates_and_refetches_observed_queries() {
    let client = QueryClient::new(CacheConfig::immediate());
    let fetches = Arc::new(AtomicUsize::new(0));
    let observer = client.watch_query(
        items_key(),
        {
            let fetches = Arc::clone(&fetches);
            move || {
                let n = fetches.fetch_add(1, Ordering::SeqCst) as u32;
                async move { Ok::<_, QueryError>(vec![item(n)]) }
            }
        },
        QueryOptions::default(),
    );
    observer.settled().await;
    client.set_query_data(&query_key!["other"], &1).unwrap();

    let mutation = client.mutation(
        MutationOptions::new(|new: Item| async move { Ok::<_, QueryError>(new) })
            .invalidates(items_key()),
    );
    mutation.mutate(item(5)).await.unwrap();

    assert_eq!(observer.settled().await.data, Some(vec![item(1)]));
    assert_eq!(fetches.load(Ordering::SeqCst), 2);
    assert!(!client.is_stale(&query_key!["other"]));
}

#[tokio::test(start_paused = true)]
async fn invalidation_key_can_depend_on_variables() {
    let client = QueryClient::new(CacheConfig::immediate());
    client.set_query_data(&query_key!["items", 3], &item(3)).unwrap();
    client.set_query_data(&query_key!["items", 4], &item(4)).unwrap();

    let mutation = client.mutation(
        MutationOptions::new(|new: Item| async move { Ok::<_, QueryError>(new) })
            .invalidates_with(|vars: &Item| query_key!["items", vars.id]),
    );
    mutation.mutate(item(3)).await.unwrap();

    assert!(client.is_stale(&query_key!["items", 3]));
    assert!(!client.is_stale(&query_key!["items", 4]));
}

#[tokio::test(start_paused = true)]
async fn reset_returns_to_idle() {
    let client = QueryClient::new(CacheConfig::immediate());
    let mutation = client.mutation(MutationOptions::new(|n: u32| async move { Ok::<_, QueryError>(n) }));

    mutation.mutate(1).await.unwrap();
    assert_eq!(mutation.state().data, Some(1));
    mutation.reset();
    assert!(mutation.state().is_idle());
}

// ── Retry ────────────────────────────────────────────────────────

fn flaky(failures: usize, error: QueryError, calls: &Arc<AtomicUsize>) -> MutationOptions<u32, u32> {
    let calls = Arc::clone(calls);
    MutationOptions::new(move |n: u32| {
        let attempt = calls.fetch_add(1, Ordering::SeqCst);
        let error = error.clone();
        async move { if attempt < failures { Err(error) } else { Ok(n) } }
    })
}

#[tokio::test(start_paused = true)]
async fn network_failure_is_retried_once() {
    let client = QueryClient::new(retrying());
    let calls = Arc::new(AtomicUsize::new(0));
    let mutation = client.mutation(flaky(1, QueryError::network("Network Error"), &calls));

    assert_eq!(mutation.mutate(7).await, Ok(7));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(mutation.state().failure_count, 1);
}

#[tokio::test(start_paused = true)]
async fn second_transient_failure_settles_into_error() {
    let client = QueryClient::new(retrying());
    let calls = Arc::new(AtomicUsize::new(0));
    let mutation = client.mutation(flaky(5, QueryError::http(502, "bad gateway"), &calls));

    assert!(mutation.mutate(7).await.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn client_and_validation_failures_are_not_retried() {
    let client = QueryClient::new(retrying());

    let calls = Arc::new(AtomicUsize::new(0));
    let mutation = client.mutation(flaky(5, QueryError::http(422, "unprocessable"), &calls));
    assert!(mutation.mutate(1).await.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let calls = Arc::new(AtomicUsize::new(0));
    let mutation = client.mutation(flaky(5, QueryError::validation("title is required"), &calls));
    assert!(mutation.mutate(1).await.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn per_mutation_retry_override() {
    let client = QueryClient::new(retrying());
    let calls = Arc::new(AtomicUsize::new(0));
    let mutation = client.mutation(flaky(5, QueryError::network("Network Error"), &calls).retries(0));

    assert!(mutation.mutate(1).await.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

// ── Offline queue ────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn offline_mutations_flush_in_call_order() {
    let client = QueryClient::new(CacheConfig::immediate());
    client.set_online(false);
    let order = Arc::new(Mutex::new(Vec::new()));
    let mutation = client.mutation(MutationOptions::new({
        let order = Arc::clone(&order);
        move |n: u32| {
            let order = Arc::clone(&order);
            async move {
                order.lock().unwrap().push(n);
                Ok::<_, QueryError>(n)
            }
        }
    }));

    let mut tasks = Vec::new();
    for n in 1..=3 {
        let mutation = mutation.clone();
        tasks.push(tokio::spawn(async move { mutation.mutate(n).await }));
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    assert_eq!(client.paused_mutation_count(), 3);
    assert_eq!(mutation.status(), MutationStatus::Paused);
    assert!(order.lock().unwrap().is_empty());

    client.set_online(true);
    assert_eq!(client.resume_paused_mutations().await, 3);
    assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);
    for (n, task) in (1..=3).zip(tasks) {
        assert_eq!(task.await.unwrap(), Ok(n));
    }
    assert_eq!(client.paused_mutation_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn paused_mutation_keeps_optimistic_value() {
    let client = seeded(CacheConfig::immediate());
    client.set_online(false);
    let mutation = client.mutation(
        MutationOptions::new(|new: Item| async move { Ok::<_, QueryError>(new) })
            .optimistic(items_key(), append),
    );

    let task = {
        let mutation = mutation.clone();
        tokio::spawn(async move { mutation.mutate(item(2)).await })
    };
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(cached(&client), Some(vec![item(1), item(2)]));

    client.set_online(true);
    client.resume_paused_mutations().await;
    assert!(task.await.unwrap().is_ok());
    assert_eq!(cached(&client), Some(vec![item(1), item(2)]));
}

#[tokio::test(start_paused = true)]
async fn always_mode_ignores_connectivity() {
    let client = QueryClient::new(CacheConfig::immediate());
    client.set_online(false);
    let mutation = client.mutation(
        MutationOptions::new(|n: u32| async move { Ok::<_, QueryError>(n) })
            .network_mode(NetworkMode::Always),
    );

    assert_eq!(mutation.mutate(4).await, Ok(4));
    assert_eq!(client.paused_mutation_count(), 0);
}

// ── Properties ───────────────────────────────────────────────────

proptest! {
    #[test]
    fn failed_mutation_restores_exact_previous_value(
        old in proptest::collection::vec((any::<u32>(), "[a-z]{0,8}"), 0..8),
        new_id in any::<u32>(),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let old: Vec<Item> = old.into_iter().map(|(id, name)| Item { id, name }).collect();

        let restored = runtime.block_on(async {
            let client = QueryClient::new(CacheConfig::immediate());
            client.set_query_data(&items_key(), &old).unwrap();
            let mutation = client.mutation(
                MutationOptions::new(|_: Item| async { Err::<Item, _>(QueryError::http(500, "down")) })
                    .optimistic(items_key(), append),
            );
            let _ = mutation.mutate(item(new_id)).await;
            cached(&client)
        });

        prop_assert_eq!(restored, Some(old));
    }
}
