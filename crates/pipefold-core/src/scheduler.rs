//! Pipeline scheduler
//!
//! Drives every lane (one `(data type, view)` slot and its stage list) to
//! completion as a single lock-step wavefront:
//!
//! ```text
//!  step:        0            1            2
//!  blog/single  [a] ───────▶ [b] ───────▶ ·
//!  blog/archive [c, d] ────▶ ·            ·
//!  images       [e] ───────▶ [f] ───────▶ ·   ◀── every lane quiescent: done
//!               └─ barrier ──┘└─ barrier ──┘
//! ```
//!
//! At step `i` every plugin of every lane that has a non-empty `i`-th step is
//! spawned at once. Each receives its own copy of its slot as it stood when
//! the step was dispatched, plus a snapshot of the whole tree. Replacements
//! are written back as plugins settle, so later steps see them and siblings
//! in the same step never do. The run ends at the first step where no lane
//! has anything to do.
//!
//! The first plugin failure raises the [`CancelFlag`] and is returned; the
//! rest of that step keeps running in the background and whatever it yields
//! is dropped.

use futures::stream::{FuturesUnordered, StreamExt};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::{Config, StageList};
use crate::error::{Error, Result};
use crate::file::FileCollection;
use crate::plugin::{Plugin, PluginContext};
use crate::state::{BuildState, SlotKey};

/// Shared cancellation signal, checked before every dispatch
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// A flag that is not raised
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag; every clone observes it
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether the flag has been raised
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One slot and the steps that run against it
#[derive(Debug, Clone)]
pub struct Lane {
    /// Slot this lane owns
    pub key: SlotKey,
    /// Steps, in order
    pub stages: StageList,
}

impl Lane {
    /// Create a lane
    pub fn new(key: SlotKey, stages: StageList) -> Self {
        Self { key, stages }
    }
}

/// A plugin that finished without error
struct Settled {
    key: SlotKey,
    plugin: String,
    replacement: Option<FileCollection>,
}

/// Runs lanes over a build-state tree
#[derive(Debug, Clone)]
pub struct Scheduler {
    config: Arc<Config>,
}

impl Scheduler {
    /// Scheduler whose plugins see `config` in their context
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// Run every lane to completion and return the final tree.
    pub async fn run(
        &self,
        mut state: BuildState,
        lanes: &[Lane],
        cancel: &CancelFlag,
    ) -> Result<BuildState> {
        let mut step = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let snapshot = Arc::new(state.clone());
            let mut in_flight = FuturesUnordered::new();

            for lane in lanes {
                let Some(group) = lane.stages.get(step).filter(|group| !group.is_empty()) else {
                    continue;
                };
                let files = snapshot.get_slot(&lane.key).cloned().unwrap_or_default();

                for plugin in group {
                    if cancel.is_cancelled() {
                        return Err(Error::Cancelled);
                    }
                    let ctx = PluginContext {
                        data_type: lane.key.data_type.clone(),
                        view: lane.key.view.clone(),
                        state: Arc::clone(&snapshot),
                        config: Arc::clone(&self.config),
                    };
                    in_flight.push(dispatch(
                        lane.key.clone(),
                        Arc::clone(plugin),
                        files.clone(),
                        ctx,
                    ));
                }
            }

            if in_flight.is_empty() {
                tracing::debug!("All lanes quiescent after {} step(s)", step);
                return Ok(state);
            }

            tracing::debug!(step, plugins = in_flight.len(), "Dispatched step");

            while let Some(outcome) = in_flight.next().await {
                match outcome {
                    Ok(settled) => {
                        tracing::debug!(
                            data_type = %settled.key.data_type,
                            view = %settled.key.view,
                            replaced = settled.replacement.is_some(),
                            "Plugin '{}' done",
                            settled.plugin
                        );
                        if let Some(files) = settled.replacement {
                            state.insert(settled.key, files);
                        }
                    }
                    Err(err) => {
                        cancel.cancel();
                        discard_remaining(in_flight);
                        return Err(err);
                    }
                }
            }

            step += 1;
        }
    }
}

/// Spawn one plugin invocation. The task runs to completion even if the
/// returned future is dropped.
fn dispatch(
    key: SlotKey,
    plugin: Arc<dyn Plugin>,
    files: FileCollection,
    ctx: PluginContext,
) -> impl Future<Output = Result<Settled>> + Send + 'static {
    let name = plugin.name().to_string();
    let task = tokio::spawn(async move { plugin.run(files, &ctx).await });

    async move {
        match task.await {
            Ok(Ok(replacement)) => Ok(Settled {
                key,
                plugin: name,
                replacement,
            }),
            Ok(Err(source)) => Err(Error::Plugin {
                data_type: key.data_type,
                view: key.view,
                plugin: name,
                source,
            }),
            Err(err) => Err(Error::PluginPanicked {
                data_type: key.data_type,
                view: key.view,
                plugin: name,
                message: err.to_string(),
            }),
        }
    }
}

/// Let the rest of a failed step settle, logging and dropping what it yields.
fn discard_remaining<F>(mut in_flight: FuturesUnordered<F>)
where
    F: Future<Output = Result<Settled>> + Send + 'static,
{
    if in_flight.is_empty() {
        return;
    }
    tokio::spawn(async move {
        while let Some(outcome) = in_flight.next().await {
            if let Err(err) = outcome {
                tracing::warn!("Ignoring failure after build was aborted: {err}");
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::FileRecord;
    use crate::plugin::{ViewName, from_fn};
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::time::{Instant, sleep};

    type Log = Arc<Mutex<Vec<&'static str>>>;

    fn scheduler() -> Scheduler {
        Scheduler::new(Arc::new(Config::new().with_dirs("content", "out")))
    }

    fn key(view: &str) -> SlotKey {
        SlotKey::new("blog", ViewName::named(view))
    }

    fn seeded(keys: &[SlotKey]) -> BuildState {
        let mut state = BuildState::new();
        for key in keys {
            state.insert(key.clone(), vec![FileRecord::new("a.txt", "a")]);
        }
        state
    }

    /// Records `start`, sleeps, records `end`.
    fn timed(
        name: &'static str,
        log: &Log,
        start: &'static str,
        delay_ms: u64,
        end: &'static str,
    ) -> Arc<dyn Plugin> {
        let log = Arc::clone(log);
        from_fn(name, move |_files, _ctx| {
            let log = Arc::clone(&log);
            async move {
                log.lock().unwrap().push(start);
                sleep(Duration::from_millis(delay_ms)).await;
                log.lock().unwrap().push(end);
                Ok(None)
            }
        })
    }

    fn counting(name: &'static str, calls: &Arc<AtomicUsize>) -> Arc<dyn Plugin> {
        let calls = Arc::clone(calls);
        from_fn(name, move |_files, _ctx| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok(None) }
        })
    }

    fn failing(name: &'static str, delay_ms: u64) -> Arc<dyn Plugin> {
        from_fn(name, move |_files, _ctx| async move {
            sleep(Duration::from_millis(delay_ms)).await;
            Err(format!("{name} failed").into())
        })
    }

    fn text(files: &FileCollection) -> Vec<&str> {
        files.iter().map(|f| f.content.as_text().unwrap()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_steps_run_in_sequence() {
        let log: Log = Default::default();
        let lanes = vec![Lane::new(
            key("single"),
            vec![
                vec![timed("a", &log, "a:start", 20, "a:end")],
                vec![timed("b", &log, "b:start", 1, "b:end")],
            ],
        )];

        scheduler()
            .run(seeded(&[key("single")]), &lanes, &CancelFlag::new())
            .await
            .unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["a:start", "a:end", "b:start", "b:end"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_step_plugins_run_concurrently() {
        let log: Log = Default::default();
        let lanes = vec![Lane::new(
            key("single"),
            vec![vec![
                timed("slow", &log, "slow:start", 20, "slow:end"),
                timed("fast", &log, "fast:start", 10, "fast:end"),
            ]],
        )];

        let started = Instant::now();
        scheduler()
            .run(seeded(&[key("single")]), &lanes, &CancelFlag::new())
            .await
            .unwrap();
        let elapsed = started.elapsed();

        assert!(elapsed >= Duration::from_millis(20));
        assert!(elapsed < Duration::from_millis(30), "took {elapsed:?}");
        assert_eq!(log.lock().unwrap()[2], "fast:end");
    }

    #[tokio::test(start_paused = true)]
    async fn test_views_advance_in_lock_step() {
        let log: Log = Default::default();
        let lanes = vec![
            Lane::new(
                key("single"),
                vec![
                    vec![timed("x", &log, "x:start", 20, "x:end")],
                    vec![timed("y", &log, "y:start", 10, "y:end")],
                ],
            ),
            Lane::new(
                key("archive"),
                vec![vec![timed("z", &log, "z:start", 30, "z:end")]],
            ),
        ];

        scheduler()
            .run(
                seeded(&[key("single"), key("archive")]),
                &lanes,
                &CancelFlag::new(),
            )
            .await
            .unwrap();

        let log = log.lock().unwrap();
        let mut first_two = log[..2].to_vec();
        first_two.sort_unstable();
        assert_eq!(first_two, vec!["x:start", "z:start"]);
        assert_eq!(&log[2..], &["x:end", "z:end", "y:start", "y:end"]);
    }

    #[tokio::test]
    async fn test_replacement_visible_next_step_only() {
        let replace = from_fn("replace", |_files, _ctx| async move {
            Ok(Some(vec![FileRecord::new("x.txt", "X")]))
        });
        let sibling = from_fn("sibling", |files, ctx| async move {
            assert_eq!(text(&files), vec!["a"]);
            let snapshot = ctx.state.get(&ctx.data_type, &ctx.view).unwrap();
            assert_eq!(text(snapshot), vec!["a"]);
            Ok(None)
        });
        let next = from_fn("next", |files, ctx| async move {
            assert_eq!(text(&files), vec!["X"]);
            assert_eq!(text(ctx.state.get(&ctx.data_type, &ctx.view).unwrap()), vec!["X"]);
            Ok(None)
        });
        let lanes = vec![Lane::new(
            key("single"),
            vec![vec![replace, sibling], vec![next]],
        )];

        let state = scheduler()
            .run(seeded(&[key("single")]), &lanes, &CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(text(state.get_slot(&key("single")).unwrap()), vec!["X"]);
    }

    #[tokio::test]
    async fn test_in_place_mutation_is_not_shared() {
        let mutate = from_fn("mutate", |mut files, _ctx| async move {
            files[0].content = "mutated".into();
            Ok(None)
        });
        let lanes = vec![Lane::new(key("single"), vec![vec![mutate]])];

        let state = scheduler()
            .run(seeded(&[key("single")]), &lanes, &CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(text(state.get_slot(&key("single")).unwrap()), vec!["a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_stops_later_steps_everywhere() {
        let calls = Arc::new(AtomicUsize::new(0));
        let lanes = vec![
            Lane::new(
                key("single"),
                vec![vec![failing("boom", 5)], vec![counting("after", &calls)]],
            ),
            Lane::new(
                key("archive"),
                vec![
                    vec![counting("sibling", &calls)],
                    vec![counting("after-sibling", &calls)],
                ],
            ),
        ];
        let cancel = CancelFlag::new();

        let err = scheduler()
            .run(seeded(&[key("single"), key("archive")]), &lanes, &cancel)
            .await
            .unwrap_err();

        match err {
            Error::Plugin { plugin, view, .. } => {
                assert_eq!(plugin, "boom");
                assert_eq!(view, ViewName::named("single"));
            }
            other => panic!("Expected plugin error, got {other:?}"),
        }
        // Only the step-0 sibling ran.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cancel.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_error_wins() {
        let lanes = vec![Lane::new(
            key("single"),
            vec![vec![failing("slow", 30), failing("fast", 10)]],
        )];

        let err = scheduler()
            .run(seeded(&[key("single")]), &lanes, &CancelFlag::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Plugin { ref plugin, .. } if plugin == "fast"));

        // Let the slow plugin settle; its failure is swallowed.
        sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn test_cancelled_before_dispatch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let lanes = vec![Lane::new(key("single"), vec![vec![counting("a", &calls)]])];
        let cancel = CancelFlag::new();
        cancel.cancel();

        let err = scheduler()
            .run(seeded(&[key("single")]), &lanes, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_uneven_lanes_all_finish() {
        let calls = Arc::new(AtomicUsize::new(0));
        let lanes = vec![
            Lane::new(
                key("long"),
                vec![
                    vec![counting("1", &calls)],
                    vec![counting("2", &calls)],
                    vec![counting("3", &calls)],
                ],
            ),
            Lane::new(key("short"), vec![vec![counting("4", &calls)]]),
            Lane::new(key("idle"), Vec::new()),
        ];

        scheduler()
            .run(
                seeded(&[key("long"), key("short"), key("idle")]),
                &lanes,
                &CancelFlag::new(),
            )
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_empty_step_ends_wavefront_when_everyone_is_quiet() {
        let calls = Arc::new(AtomicUsize::new(0));
        let lanes = vec![Lane::new(
            key("single"),
            vec![
                vec![counting("a", &calls)],
                Vec::new(),
                vec![counting("b", &calls)],
            ],
        )];

        scheduler()
            .run(seeded(&[key("single")]), &lanes, &CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panicking_plugin_is_reported() {
        let panics = from_fn("panics", |_files, _ctx| async move {
            if true {
                panic!("plugin bug");
            }
            Ok(None)
        });
        let lanes = vec![Lane::new(key("single"), vec![vec![panics]])];

        let err = scheduler()
            .run(seeded(&[key("single")]), &lanes, &CancelFlag::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PluginPanicked { ref plugin, .. } if plugin == "panics"));
    }

    #[tokio::test]
    async fn test_context_sees_other_slots() {
        let peek = from_fn("peek", |_files, ctx| async move {
            let other = ctx.state.get("blog", &ViewName::named("archive"));
            assert!(other.is_some());
            assert_eq!(ctx.config.dirs.out_dir, std::path::PathBuf::from("out"));
            Ok(None)
        });
        let lanes = vec![Lane::new(key("single"), vec![vec![peek]])];

        scheduler()
            .run(
                seeded(&[key("single"), key("archive")]),
                &lanes,
                &CancelFlag::new(),
            )
            .await
            .unwrap();
    }
}
