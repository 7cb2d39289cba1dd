use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use serde_json::json;

use livetail::{
    CommandOp, ConfigError, DocId, Document, InMemoryOplog, LivetailError, LogPosition, OplogOp,
    OplogTailer, OplogTailerConfig, SequencerError, TriggerPattern, TxOperation,
};

const ADMIN_COMMANDS: &str = "admin.$cmd";

fn insert(id: &str) -> OplogOp {
    OplogOp::Insert {
        document: Document::new(id).with_field("n", json!(1)),
    }
}

fn fast_config() -> OplogTailerConfig {
    OplogTailerConfig {
        tail_idle_timeout: Duration::from_millis(500),
        ..OplogTailerConfig::default()
    }
}

fn start(log: &InMemoryOplog, config: OplogTailerConfig) -> OplogTailer {
    OplogTailer::start(Arc::new(log.clone()), "app", config).unwrap()
}

fn wait_until(deadline: Duration, mut done: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    done()
}

#[test]
fn catch_up_blocks_until_all_entries_fired_in_order() {
    let log = InMemoryOplog::replica_set("rs0");
    let tailer = start(&log, fast_config());

    let seen: Arc<Mutex<Vec<(DocId, LogPosition)>>> = Arc::new(Mutex::new(Vec::new()));
    let _subscription = tailer
        .on_entry(TriggerPattern::collection("tasks"), {
            let seen = Arc::clone(&seen);
            move |trigger| {
                seen.lock()
                    .unwrap()
                    .push((trigger.id.clone().unwrap(), trigger.entry.position));
            }
        })
        .unwrap();

    let total = 50;
    let mut appended = Vec::new();
    for i in 0..total {
        appended.push(log.append("app.tasks", insert(&format!("doc-{i}"))));
    }

    tailer.wait_until_caught_up().unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), total);
    for (i, (id, position)) in seen.iter().enumerate() {
        assert_eq!(id.as_str(), format!("doc-{i}"));
        assert_eq!(*position, appended[i]);
    }
    assert_eq!(tailer.last_processed(), Some(appended[total - 1]));

    tailer.stop();
}

#[test]
fn catch_up_on_an_empty_log_returns_immediately() {
    let log = InMemoryOplog::replica_set("rs0");
    let tailer = start(&log, fast_config());
    tailer.wait_until_caught_up().unwrap();
    tailer.stop();
}

#[test]
fn transaction_fires_each_sub_operation_with_increasing_positions() {
    let log = InMemoryOplog::replica_set("rs0");
    let tailer = start(&log, fast_config());

    let seen: Arc<Mutex<Vec<(DocId, LogPosition)>>> = Arc::new(Mutex::new(Vec::new()));
    let _subscription = tailer
        .on_entry(TriggerPattern::collection("tasks"), {
            let seen = Arc::clone(&seen);
            move |trigger| {
                seen.lock()
                    .unwrap()
                    .push((trigger.id.clone().unwrap(), trigger.entry.position));
            }
        })
        .unwrap();

    let sub_op = |id: &str| TxOperation {
        position: None,
        namespace: "app.tasks".to_string(),
        op: insert(id),
    };
    let parent = log.append(
        ADMIN_COMMANDS,
        OplogOp::Command(CommandOp::ApplyOps {
            operations: vec![sub_op("tx-a"), sub_op("tx-b"), sub_op("tx-c")],
        }),
    );

    tailer.wait_until_caught_up().unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 3);
    assert_eq!(
        seen.iter().map(|(id, _)| id.as_str()).collect::<Vec<_>>(),
        vec!["tx-a", "tx-b", "tx-c"]
    );
    assert_eq!(seen[0].1, parent);
    assert_eq!(seen[1].1, parent.next());
    assert_eq!(seen[2].1, parent.next().next());

    tailer.stop();
}

#[test]
fn backpressure_drops_backlog_and_signals_repoll_once() {
    let log = InMemoryOplog::replica_set("rs0");
    let tailer = start(
        &log,
        OplogTailerConfig {
            too_far_behind: 5,
            ..fast_config()
        },
    );

    let skips = Arc::new(AtomicUsize::new(0));
    let _skip_hook = tailer
        .on_skipped_entries({
            let skips = Arc::clone(&skips);
            move || {
                skips.fetch_add(1, Ordering::SeqCst);
            }
        })
        .unwrap();

    let triggers = Arc::new(AtomicUsize::new(0));
    let first_seen = Arc::new(AtomicUsize::new(0));
    let _subscription = tailer
        .on_entry(TriggerPattern::collection("tasks"), {
            let triggers = Arc::clone(&triggers);
            let first_seen = Arc::clone(&first_seen);
            move |_| {
                if triggers.fetch_add(1, Ordering::SeqCst) == 0 {
                    first_seen.store(1, Ordering::SeqCst);
                    // Stall the drain worker so the reader can pile up a
                    // backlog past the threshold.
                    thread::sleep(Duration::from_millis(300));
                }
            }
        })
        .unwrap();

    let before = tailer.last_processed();

    log.append("app.tasks", insert("first"));
    assert!(wait_until(Duration::from_secs(2), || {
        first_seen.load(Ordering::SeqCst) == 1
    }));

    let mut last = LogPosition::ZERO;
    for i in 0..20 {
        last = log.append("app.tasks", insert(&format!("burst-{i}")));
    }

    tailer.wait_until_caught_up().unwrap();

    assert_eq!(skips.load(Ordering::SeqCst), 1);
    // The first entry fired; the burst was dropped wholesale.
    assert_eq!(triggers.load(Ordering::SeqCst), 1);
    // The processed position still advanced, monotonically, through the
    // dropped backlog.
    assert_eq!(tailer.last_processed(), Some(last));
    assert!(before < tailer.last_processed());

    tailer.stop();
}

#[test]
fn unknown_command_halts_the_tailer_and_fails_waiters() {
    let log = InMemoryOplog::replica_set("rs0");
    let tailer = Arc::new(start(&log, fast_config()));

    let stall = Arc::new(AtomicUsize::new(0));
    let _subscription = tailer
        .on_entry(TriggerPattern::collection("tasks"), {
            let stall = Arc::clone(&stall);
            move |_| {
                stall.store(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(500));
            }
        })
        .unwrap();

    log.append("app.tasks", insert("good"));
    assert!(wait_until(Duration::from_secs(2), || {
        stall.load(Ordering::SeqCst) == 1
    }));
    log.append(
        "app.$cmd",
        OplogOp::Command(CommandOp::Other(json!({"shardCollection": "app.tasks"}))),
    );

    // Insert the catch-up request while the worker is still stalled on
    // the good entry, so it is outstanding when the halt happens.
    let waiter = {
        let tailer = Arc::clone(&tailer);
        thread::spawn(move || tailer.wait_until_caught_up())
    };

    let err = waiter.join().unwrap().unwrap_err();
    assert!(
        err.is_protocol(),
        "expected a protocol error, got {err:?}"
    );

    assert!(wait_until(Duration::from_secs(2), || tailer.is_stopped()));
    assert!(matches!(
        tailer.wait_until_caught_up(),
        Err(LivetailError::Sequencer(SequencerError::Stopped { .. }))
    ));
    assert!(tailer
        .on_entry(TriggerPattern::collection("tasks"), |_| {})
        .is_err());
}

#[test]
fn standalone_source_fails_startup() {
    let log = InMemoryOplog::standalone();
    let err =
        OplogTailer::start(Arc::new(log), "app", OplogTailerConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        LivetailError::Config(ConfigError::NotReplicated)
    ));
}

#[test]
fn conflicting_collection_filters_fail_startup() {
    let log = InMemoryOplog::replica_set("rs0");
    let config = OplogTailerConfig {
        include_collections: vec!["tasks".to_string()],
        exclude_collections: vec!["users".to_string()],
        ..OplogTailerConfig::default()
    };
    let err = OplogTailer::start(Arc::new(log), "app", config).unwrap_err();
    assert!(matches!(
        err,
        LivetailError::Config(ConfigError::ConflictingCollectionFilters)
    ));
}

#[test]
fn include_list_limits_what_the_tailer_sees() {
    let log = InMemoryOplog::replica_set("rs0");
    let tailer = start(
        &log,
        OplogTailerConfig {
            include_collections: vec!["tasks".to_string()],
            ..fast_config()
        },
    );

    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let record = |seen: &Arc<Mutex<Vec<String>>>| {
        let seen = Arc::clone(seen);
        move |trigger: &livetail::OplogTrigger| {
            seen.lock()
                .unwrap()
                .push(trigger.collection.clone().unwrap_or_default());
        }
    };
    let _tasks = tailer
        .on_entry(TriggerPattern::collection("tasks"), record(&seen))
        .unwrap();
    let _users = tailer
        .on_entry(TriggerPattern::collection("users"), record(&seen))
        .unwrap();

    log.append("app.users", insert("u1"));
    log.append("app.tasks", insert("t1"));

    tailer.wait_until_caught_up().unwrap();

    assert_eq!(*seen.lock().unwrap(), vec!["tasks".to_string()]);
    tailer.stop();
}

#[test]
fn per_document_subscription_sees_only_its_document() {
    let log = InMemoryOplog::replica_set("rs0");
    let tailer = start(&log, fast_config());

    let hits = Arc::new(AtomicUsize::new(0));
    let _subscription = tailer
        .on_entry(TriggerPattern::document("tasks", "watched"), {
            let hits = Arc::clone(&hits);
            move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            }
        })
        .unwrap();

    log.append("app.tasks", insert("other"));
    log.append("app.tasks", insert("watched"));
    log.append("app.tasks", insert("other-2"));

    tailer.wait_until_caught_up().unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    tailer.stop();
}

#[test]
fn drop_commands_fire_drop_triggers() {
    let log = InMemoryOplog::replica_set("rs0");
    let tailer = start(&log, fast_config());

    let collection_drops = Arc::new(AtomicUsize::new(0));
    let database_drops = Arc::new(AtomicUsize::new(0));
    let _collection = tailer
        .on_entry(TriggerPattern::collection_drops("tasks"), {
            let hits = Arc::clone(&collection_drops);
            move |trigger| {
                assert!(trigger.drop_collection);
                hits.fetch_add(1, Ordering::SeqCst);
            }
        })
        .unwrap();
    let _database = tailer
        .on_entry(TriggerPattern::database_drops(), {
            let hits = Arc::clone(&database_drops);
            move |trigger| {
                assert!(trigger.drop_database);
                hits.fetch_add(1, Ordering::SeqCst);
            }
        })
        .unwrap();

    log.append(
        "app.$cmd",
        OplogOp::Command(CommandOp::DropCollection {
            collection: "tasks".to_string(),
        }),
    );
    log.append("app.$cmd", OplogOp::Command(CommandOp::DropDatabase));

    tailer.wait_until_caught_up().unwrap();
    assert_eq!(collection_drops.load(Ordering::SeqCst), 1);
    assert_eq!(database_drops.load(Ordering::SeqCst), 1);
    tailer.stop();
}

#[test]
fn stop_releases_blocked_waiters_and_is_idempotent() {
    let log = InMemoryOplog::replica_set("rs0");
    let tailer = Arc::new(start(&log, fast_config()));

    let stall = Arc::new(AtomicUsize::new(0));
    let _subscription = tailer
        .on_entry(TriggerPattern::collection("tasks"), {
            let stall = Arc::clone(&stall);
            move |_| {
                stall.store(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(400));
            }
        })
        .unwrap();

    log.append("app.tasks", insert("slow"));
    assert!(wait_until(Duration::from_secs(2), || {
        stall.load(Ordering::SeqCst) == 1
    }));

    let waiter = {
        let tailer = Arc::clone(&tailer);
        thread::spawn(move || tailer.wait_until_caught_up())
    };
    // Give the waiter time to register its catch-up request.
    thread::sleep(Duration::from_millis(100));

    tailer.stop();
    tailer.stop();

    let err = waiter.join().unwrap().unwrap_err();
    assert!(
        matches!(
            err,
            LivetailError::Sequencer(SequencerError::CatchUpAborted)
        ),
        "expected CatchUpAborted, got {err:?}"
    );

    assert!(tailer.is_stopped());
    assert!(matches!(
        tailer.wait_until_caught_up(),
        Err(LivetailError::Sequencer(SequencerError::Stopped { .. }))
    ));
}

#[test]
fn stopped_subscription_handle_stops_delivery() {
    let log = InMemoryOplog::replica_set("rs0");
    let tailer = start(&log, fast_config());

    let hits = Arc::new(AtomicUsize::new(0));
    let subscription = tailer
        .on_entry(TriggerPattern::collection("tasks"), {
            let hits = Arc::clone(&hits);
            move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            }
        })
        .unwrap();

    log.append("app.tasks", insert("one"));
    tailer.wait_until_caught_up().unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    subscription.stop();
    log.append("app.tasks", insert("two"));
    tailer.wait_until_caught_up().unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    tailer.stop();
}

#[test]
fn idle_cursor_restart_does_not_lose_or_duplicate_entries() {
    let log = InMemoryOplog::replica_set("rs0");
    let tailer = start(
        &log,
        OplogTailerConfig {
            tail_idle_timeout: Duration::from_millis(300),
            ..OplogTailerConfig::default()
        },
    );

    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let _subscription = tailer
        .on_entry(TriggerPattern::collection("tasks"), {
            let seen = Arc::clone(&seen);
            move |trigger| {
                seen.lock()
                    .unwrap()
                    .push(trigger.id.clone().unwrap().as_str().to_string());
            }
        })
        .unwrap();

    log.append("app.tasks", insert("before-idle"));
    tailer.wait_until_caught_up().unwrap();

    // Sit idle long enough for at least one cursor restart.
    thread::sleep(Duration::from_millis(900));

    log.append("app.tasks", insert("after-idle"));
    tailer.wait_until_caught_up().unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec!["before-idle".to_string(), "after-idle".to_string()]
    );
    tailer.stop();
}
