//! Oplog tailing sequencer.
//!
//! The tailer owns a dedicated reader thread that blocks on a tailing
//! cursor and an on-demand drain worker that normalizes entries, fires
//! them on the crossbar, and advances the processed position. The two
//! share only a FIFO queue, so slow trigger fan-out never stalls cursor
//! I/O. When the queue backlog exceeds the configured threshold the
//! worker drops the whole backlog and tells subscribers to re-poll; that
//! is the backpressure valve trading replay for bounded memory.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, error, warn};

use crate::error::{ConfigError, LivetailError, LivetailResult, ProtocolError, SequencerError};
use crate::oplog::crossbar::{Crossbar, ListenHandle};
use crate::oplog::entry::{LogPosition, OplogEntry};
use crate::oplog::filter::NamespaceFilter;
use crate::oplog::normalize::normalize_entry;
use crate::oplog::source::{LogCursor, LogSource};
use crate::oplog::triggers::{ListenerId, OplogTrigger, TriggerPattern};

const DEFAULT_TOO_FAR_BEHIND: usize = 2000;
const DEFAULT_TAIL_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound on one blocking cursor wait; stop requests and idle
/// accounting are observed at slice boundaries.
const CURSOR_POLL_SLICE: Duration = Duration::from_millis(250);
const CATCH_UP_WARN_AFTER: Duration = Duration::from_secs(10);
const SOURCE_RETRY_DELAY: Duration = Duration::from_millis(100);

const TOO_FAR_BEHIND_ENV: &str = "LIVETAIL_OPLOG_TOO_FAR_BEHIND";
const TAIL_IDLE_TIMEOUT_ENV: &str = "LIVETAIL_OPLOG_TAIL_TIMEOUT_MS";

/// Tailer configuration.
#[derive(Debug, Clone)]
pub struct OplogTailerConfig {
    /// Queue backlog length beyond which the drain worker drops the
    /// backlog and signals subscribers to re-poll.
    pub too_far_behind: usize,
    /// Consecutive cursor idle time after which the tailing query is
    /// restarted from the last read position.
    pub tail_idle_timeout: Duration,
    /// Only tail these collections. Mutually exclusive with
    /// `exclude_collections`.
    pub include_collections: Vec<String>,
    /// Tail everything but these collections. Mutually exclusive with
    /// `include_collections`.
    pub exclude_collections: Vec<String>,
}

impl Default for OplogTailerConfig {
    fn default() -> Self {
        Self {
            too_far_behind: DEFAULT_TOO_FAR_BEHIND,
            tail_idle_timeout: DEFAULT_TAIL_IDLE_TIMEOUT,
            include_collections: Vec::new(),
            exclude_collections: Vec::new(),
        }
    }
}

impl OplogTailerConfig {
    /// Defaults overridden by `LIVETAIL_OPLOG_TOO_FAR_BEHIND` and
    /// `LIVETAIL_OPLOG_TAIL_TIMEOUT_MS` where set and parseable.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(value) = read_env(TOO_FAR_BEHIND_ENV) {
            config.too_far_behind = usize::try_from(value).unwrap_or(usize::MAX);
        }
        if let Some(value) = read_env(TAIL_IDLE_TIMEOUT_ENV) {
            config.tail_idle_timeout = Duration::from_millis(value);
        }
        config
    }
}

fn read_env(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|value| value.parse().ok())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TailerState {
    Initializing,
    Tailing,
    Stopped,
}

/// A caller blocked in `wait_until_caught_up`, keyed by the log position
/// it is waiting for. Stored ascending by target; released exclusively by
/// the drain worker (or by stop, with an error).
struct CatchUpRequest {
    target: LogPosition,
    signal: Sender<LivetailResult<()>>,
}

type SkipCallback = Arc<dyn Fn() + Send + Sync>;

struct TailerShared {
    state: Mutex<TailerState>,
    state_changed: Condvar,
    queue: Mutex<VecDeque<OplogEntry>>,
    worker_active: AtomicBool,
    stop_requested: AtomicBool,
    last_processed: Mutex<Option<LogPosition>>,
    catching_up: Mutex<Vec<CatchUpRequest>>,
    skip_hooks: Arc<Mutex<HashMap<ListenerId, SkipCallback>>>,
    crossbar: Crossbar,
    source: Arc<dyn LogSource>,
    filter: NamespaceFilter,
    db_name: String,
    too_far_behind: usize,
    tail_idle_timeout: Duration,
}

impl TailerShared {
    fn await_tailing(&self, call: &'static str) -> LivetailResult<()> {
        let mut state = lock(&self.state);
        loop {
            match *state {
                TailerState::Tailing => return Ok(()),
                TailerState::Stopped => return Err(SequencerError::Stopped { call }.into()),
                TailerState::Initializing => {
                    state = self
                        .state_changed
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        }
    }

    fn ensure_not_stopped(&self, call: &'static str) -> LivetailResult<()> {
        if *lock(&self.state) == TailerState::Stopped {
            return Err(SequencerError::Stopped { call }.into());
        }
        Ok(())
    }

    fn enter_stopped(&self) {
        let mut state = lock(&self.state);
        *state = TailerState::Stopped;
        self.state_changed.notify_all();
    }

    fn drain(&self) {
        enum Step {
            Skip(OplogEntry),
            Entry(OplogEntry),
            Empty,
        }

        loop {
            while !self.stop_requested.load(Ordering::Acquire) {
                let step = {
                    let mut queue = lock(&self.queue);
                    if queue.len() > self.too_far_behind {
                        let newest = queue.pop_back();
                        queue.clear();
                        newest.map_or(Step::Empty, Step::Skip)
                    } else if let Some(entry) = queue.pop_front() {
                        Step::Entry(entry)
                    } else {
                        Step::Empty
                    }
                };

                match step {
                    Step::Empty => break,
                    Step::Skip(newest) => {
                        warn!(
                            backlog_limit = self.too_far_behind,
                            dropped_through = %newest.position,
                            "oplog consumer too far behind; dropping backlog and signaling re-poll"
                        );
                        self.fire_skip_hooks();
                        self.set_last_processed(newest.position);
                    }
                    Step::Entry(entry) => {
                        let position = entry.position;
                        match normalize_entry(&self.db_name, entry) {
                            Ok(triggers) => {
                                for trigger in &triggers {
                                    self.crossbar.fire(trigger);
                                }
                                self.set_last_processed(position);
                            }
                            Err(protocol_error) => {
                                error!(
                                    position = %position,
                                    error = %protocol_error,
                                    "halting oplog tailer on unrecognized log content"
                                );
                                self.halt(&protocol_error);
                                return;
                            }
                        }
                    }
                }
            }

            self.worker_active.store(false, Ordering::Release);

            // An entry may have been enqueued between the final empty
            // check and the flag reset; reclaim the worker role rather
            // than strand it.
            if !self.stop_requested.load(Ordering::Acquire)
                && !lock(&self.queue).is_empty()
                && self
                    .worker_active
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
            {
                continue;
            }
            return;
        }
    }

    fn fire_skip_hooks(&self) {
        let callbacks: Vec<SkipCallback> = lock(&self.skip_hooks).values().cloned().collect();
        for callback in callbacks {
            callback();
        }
    }

    /// Advances the processed position, then releases every catch-up
    /// request at or before it, in ascending target order. Only the drain
    /// worker calls this, so releases never race each other and never
    /// happen before the position is actually processed.
    fn set_last_processed(&self, position: LogPosition) {
        let mut last = lock(&self.last_processed);
        *last = Some(position);

        let mut pending = lock(&self.catching_up);
        while pending.first().is_some_and(|request| request.target <= position) {
            let request = pending.remove(0);
            let _ = request.signal.send(Ok(()));
        }
    }

    fn abort_catch_ups(&self, make_error: impl Fn() -> LivetailError) {
        let mut pending = lock(&self.catching_up);
        for request in pending.drain(..) {
            let _ = request.signal.send(Err(make_error()));
        }
    }

    fn halt(&self, protocol_error: &ProtocolError) {
        self.stop_requested.store(true, Ordering::Release);
        self.enter_stopped();
        self.abort_catch_ups(|| LivetailError::Protocol(protocol_error.clone()));
    }

    fn reopen_cursor(&self, after: Option<LogPosition>) -> Option<Box<dyn LogCursor>> {
        match self.source.tail(after, &self.filter) {
            Ok(cursor) => Some(cursor),
            Err(err) => {
                warn!(error = %err, "failed to reopen tailing cursor; will retry");
                None
            }
        }
    }
}

fn enqueue(shared: &Arc<TailerShared>, entry: OplogEntry) {
    lock(&shared.queue).push_back(entry);
    maybe_start_worker(shared);
}

/// Schedules the drain worker unless one is already active. The
/// check-and-set keeps the "exactly one drain worker" invariant without a
/// lock around the whole drain.
fn maybe_start_worker(shared: &Arc<TailerShared>) {
    if shared
        .worker_active
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        return;
    }

    let worker = Arc::clone(shared);
    thread::Builder::new()
        .name("livetail-oplog-drain".to_string())
        .spawn(move || worker.drain())
        .expect("failed to spawn livetail drain worker");
}

fn reader_loop(
    shared: &Arc<TailerShared>,
    mut cursor: Box<dyn LogCursor>,
    mut last_seen: Option<LogPosition>,
) {
    let idle_timeout = shared.tail_idle_timeout.max(CURSOR_POLL_SLICE);
    let mut idle = Duration::ZERO;

    while !shared.stop_requested.load(Ordering::Acquire) {
        let slice = CURSOR_POLL_SLICE.min(idle_timeout);
        match cursor.next(slice) {
            Ok(Some(entry)) => {
                idle = Duration::ZERO;
                last_seen = Some(entry.position);
                enqueue(shared, entry);
            }
            Ok(None) => {
                idle += slice;
                if idle >= idle_timeout {
                    // The cursor has been silent past the idle threshold.
                    // Restart the tailing query from the last known
                    // position instead of trusting it forever.
                    debug!(?idle, "tailing cursor idle; restarting from last known position");
                    if let Some(fresh) = shared.reopen_cursor(last_seen) {
                        cursor = fresh;
                        idle = Duration::ZERO;
                    }
                }
            }
            Err(err) => {
                if shared.stop_requested.load(Ordering::Acquire) {
                    break;
                }
                warn!(error = %err, "tailing cursor error; restarting");
                thread::sleep(SOURCE_RETRY_DELAY);
                if let Some(fresh) = shared.reopen_cursor(last_seen) {
                    cursor = fresh;
                    idle = Duration::ZERO;
                }
            }
        }
    }
}

/// The oplog tailing sequencer.
///
/// Consumes an external replication log in commit order, fires normalized
/// write notifications on its crossbar, and exposes a read-your-writes
/// catch-up primitive: after a write, `wait_until_caught_up` blocks until
/// everything visible in the log "now" has been fanned out.
pub struct OplogTailer {
    shared: Arc<TailerShared>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl OplogTailer {
    /// Starts tailing `source`, scoped to `db_name`.
    ///
    /// Verifies the source is a genuine replicated log, records the
    /// current tail position as the starting processed position, opens
    /// the tailing cursor, and spawns the reader. Configuration and
    /// handshake failures are fatal; nothing is retried here.
    ///
    /// # Errors
    ///
    /// `ConfigError` for an unreplicated source or conflicting collection
    /// filters; `SourceError` when the handshake reads fail.
    pub fn start(
        source: Arc<dyn LogSource>,
        db_name: impl Into<String>,
        config: OplogTailerConfig,
    ) -> LivetailResult<Self> {
        let db_name = db_name.into();
        let filter = NamespaceFilter::new(
            &db_name,
            &config.include_collections,
            &config.exclude_collections,
        )?;

        if source.replica_set_name()?.is_none() {
            return Err(ConfigError::NotReplicated.into());
        }

        let start_position = source.last_position(None)?;
        let cursor = source.tail(start_position, &filter)?;

        let shared = Arc::new(TailerShared {
            state: Mutex::new(TailerState::Initializing),
            state_changed: Condvar::new(),
            queue: Mutex::new(VecDeque::new()),
            worker_active: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            last_processed: Mutex::new(start_position),
            catching_up: Mutex::new(Vec::new()),
            skip_hooks: Arc::new(Mutex::new(HashMap::new())),
            crossbar: Crossbar::new(),
            source,
            filter,
            db_name,
            too_far_behind: config.too_far_behind.max(1),
            tail_idle_timeout: config.tail_idle_timeout,
        });

        let reader = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("livetail-oplog-reader".to_string())
                .spawn(move || reader_loop(&shared, cursor, start_position))
                .expect("failed to spawn livetail oplog reader")
        };

        {
            let mut state = lock(&shared.state);
            *state = TailerState::Tailing;
            shared.state_changed.notify_all();
        }

        Ok(Self {
            shared,
            reader: Mutex::new(Some(reader)),
        })
    }

    /// Registers `callback` for log entries matching `pattern`.
    ///
    /// Blocks until the tailer is tailing; keep the returned handle alive
    /// for as long as the subscription should exist.
    ///
    /// # Errors
    ///
    /// `SequencerError::Stopped` once the tailer has stopped.
    pub fn on_entry(
        &self,
        pattern: TriggerPattern,
        callback: impl Fn(&OplogTrigger) + Send + Sync + 'static,
    ) -> LivetailResult<ListenHandle> {
        self.shared.await_tailing("on_entry")?;
        Ok(self.shared.crossbar.listen(pattern, callback))
    }

    /// Registers `callback` to run whenever the backpressure valve drops
    /// the backlog. Subscribers should discard incremental state and
    /// re-fetch authoritative results.
    ///
    /// # Errors
    ///
    /// `SequencerError::Stopped` once the tailer has stopped.
    pub fn on_skipped_entries(
        &self,
        callback: impl Fn() + Send + Sync + 'static,
    ) -> LivetailResult<SkipHandle> {
        self.shared.ensure_not_stopped("on_skipped_entries")?;

        let id = ListenerId::new();
        lock(&self.shared.skip_hooks).insert(id, Arc::new(callback));
        Ok(SkipHandle {
            hooks: Arc::clone(&self.shared.skip_hooks),
            id,
            stopped: AtomicBool::new(false),
        })
    }

    /// Blocks until every entry visible in the log right now has been
    /// processed and fanned out.
    ///
    /// Reads the log's current tail position directly (a point-in-time
    /// snapshot, not the tailing cursor) and waits for the processed
    /// position to reach it. Returns immediately when already caught up.
    ///
    /// # Errors
    ///
    /// `SequencerError::Stopped` when called after stop;
    /// `SequencerError::CatchUpAborted` or the halting protocol error
    /// when the tailer stops mid-wait.
    pub fn wait_until_caught_up(&self) -> LivetailResult<()> {
        self.shared.await_tailing("wait_until_caught_up")?;

        let target = loop {
            if self.shared.stop_requested.load(Ordering::Acquire) {
                return Err(SequencerError::Stopped {
                    call: "wait_until_caught_up",
                }
                .into());
            }
            match self.shared.source.last_position(Some(&self.shared.filter)) {
                Ok(position) => break position,
                Err(err) => {
                    warn!(error = %err, "failed to read last oplog position; retrying");
                    thread::sleep(SOURCE_RETRY_DELAY);
                }
            }
        };
        let Some(target) = target else {
            // Empty log: nothing to wait for.
            return Ok(());
        };

        let receiver = {
            // Lock order (processed position, then requests) matches the
            // drain worker, so the caught-up check and the request
            // insertion are atomic with respect to releases.
            let last = lock(&self.shared.last_processed);
            if last.is_some_and(|position| target <= position) {
                return Ok(());
            }

            let mut pending = lock(&self.shared.catching_up);
            if self.shared.stop_requested.load(Ordering::Acquire) {
                return Err(SequencerError::Stopped {
                    call: "wait_until_caught_up",
                }
                .into());
            }
            let (sender, receiver) = bounded::<LivetailResult<()>>(1);
            let insert_at = pending
                .iter()
                .position(|request| request.target > target)
                .unwrap_or(pending.len());
            pending.insert(
                insert_at,
                CatchUpRequest {
                    target,
                    signal: sender,
                },
            );
            receiver
        };

        wait_for_release(&receiver, target)
    }

    /// The position of the last fully processed entry, as a snapshot.
    #[must_use]
    pub fn last_processed(&self) -> Option<LogPosition> {
        *lock(&self.shared.last_processed)
    }

    /// The database this tailer is scoped to.
    #[must_use]
    pub fn db_name(&self) -> &str {
        &self.shared.db_name
    }

    /// Whether the tailer has stopped (explicitly or by halting).
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        *lock(&self.shared.state) == TailerState::Stopped
    }

    /// Stops the tailer: closes down the reader, rejects future calls,
    /// and releases outstanding catch-up requests with an error.
    /// Idempotent.
    pub fn stop(&self) {
        if self.shared.stop_requested.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shared.enter_stopped();
        self.shared
            .abort_catch_ups(|| SequencerError::CatchUpAborted.into());

        if let Some(handle) = lock(&self.reader).take() {
            let _ = handle.join();
        }
    }
}

impl Drop for OplogTailer {
    fn drop(&mut self) {
        // Signal shutdown but do not join: the reader may be mid-wait on
        // cursor I/O and exits on its own at the next slice boundary.
        if !self.shared.stop_requested.swap(true, Ordering::AcqRel) {
            self.shared.enter_stopped();
            self.shared
                .abort_catch_ups(|| SequencerError::CatchUpAborted.into());
        }
        if let Ok(mut guard) = self.reader.lock() {
            guard.take();
        }
    }
}

impl std::fmt::Debug for OplogTailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OplogTailer")
            .field("db_name", &self.shared.db_name)
            .field("state", &*lock(&self.shared.state))
            .field("last_processed", &self.last_processed())
            .finish_non_exhaustive()
    }
}

fn wait_for_release(
    receiver: &Receiver<LivetailResult<()>>,
    target: LogPosition,
) -> LivetailResult<()> {
    let mut warned = false;
    loop {
        match receiver.recv_timeout(CATCH_UP_WARN_AFTER) {
            Ok(result) => return result,
            Err(RecvTimeoutError::Timeout) => {
                if !warned {
                    warn!(target_position = %target, "oplog catch-up is taking a long time");
                    warned = true;
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(SequencerError::CatchUpAborted.into());
            }
        }
    }
}

/// Registration handle returned by [`OplogTailer::on_skipped_entries`].
///
/// Dropping the handle deregisters the callback.
pub struct SkipHandle {
    hooks: Arc<Mutex<HashMap<ListenerId, SkipCallback>>>,
    id: ListenerId,
    stopped: AtomicBool,
}

impl SkipHandle {
    /// Deregisters the callback. Idempotent.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        lock(&self.hooks).remove(&self.id);
    }
}

impl Drop for SkipHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for SkipHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SkipHandle").field("id", &self.id).finish()
    }
}
