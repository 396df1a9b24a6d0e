use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use notify::RecursiveMode;
use notify_debouncer_full::new_debouncer;
use sugar_path::SugarPath;

use crate::{Bundle, BundleOptions, BundleOutput, Diagnostic, Graph, ModuleId};

/// One completed rebuild, published to every subscriber. Sequence numbers
/// are strictly increasing; a consumer holding `seq` can tell whether the
/// event it just received supersedes what it last saw.
#[derive(Debug, Clone)]
pub struct RebuildEvent {
    pub seq: u64,
    pub changed: Vec<ModuleId>,
    pub output: Option<BundleOutput>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Fan-out point between the rebuild loop and consumers (dev server,
/// tests). Late subscribers get the latest event immediately; stale
/// publishes are dropped, so the newest rebuild always wins.
#[derive(Debug, Default)]
pub struct EventStream {
    seq: AtomicU64,
    latest: Mutex<Option<RebuildEvent>>,
    subscribers: Mutex<Vec<std::sync::mpsc::Sender<RebuildEvent>>>,
}

impl EventStream {
    pub fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn latest(&self) -> Option<RebuildEvent> {
        self.latest.lock().ok().and_then(|guard| guard.clone())
    }

    /// Subscribe to rebuilds. The current latest event, if any, is delivered
    /// first so a late consumer never starts blind.
    pub fn subscribe(&self) -> std::sync::mpsc::Receiver<RebuildEvent> {
        let (tx, rx) = std::sync::mpsc::channel();
        if let Some(event) = self.latest() {
            let _ = tx.send(event);
        }
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.push(tx);
        }
        rx
    }

    /// Publish an event unless a newer one is already out. Returns whether
    /// the event was accepted.
    pub fn publish(&self, event: RebuildEvent) -> bool {
        {
            let Ok(mut latest) = self.latest.lock() else {
                return false;
            };
            if let Some(current) = latest.as_ref() {
                if event.seq <= current.seq {
                    tracing::debug!(seq = event.seq, latest = current.seq, "stale event dropped");
                    return false;
                }
            }
            *latest = Some(event.clone());
        }
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        }
        true
    }
}

/// The watch loop: debounced filesystem events feed incremental graph
/// updates, each producing a fresh bundle published on the [`EventStream`].
pub struct WatchEngine {
    graph: Graph,
    options: Arc<BundleOptions>,
    events: Arc<EventStream>,
}

impl WatchEngine {
    pub fn new(graph: Graph, options: Arc<BundleOptions>) -> Self {
        Self {
            graph,
            options,
            events: Arc::new(EventStream::default()),
        }
    }

    pub fn events(&self) -> Arc<EventStream> {
        self.events.clone()
    }

    /// Apply one batch of touched files: update the graph, regenerate the
    /// bundle and publish. Batches whose fingerprints all match produce no
    /// event at all.
    pub fn rebuild(&mut self, touched: &[ModuleId]) -> Option<RebuildEvent> {
        let delta = self.graph.update(touched);
        if delta.is_empty() && delta.diagnostics.is_empty() {
            tracing::debug!("no effective change, rebuild skipped");
            return None;
        }
        let output = match Bundle::new(self.options.clone(), &self.graph).generate() {
            Ok(output) => Some(output),
            Err(err) => {
                tracing::error!("bundle generation failed: {err}");
                None
            }
        };
        let event = RebuildEvent {
            seq: self.events.next_seq(),
            changed: delta.changed,
            output,
            diagnostics: delta.diagnostics,
        };
        if self.events.publish(event.clone()) {
            Some(event)
        } else {
            None
        }
    }

    /// Block on the filesystem, rebuilding per debounced batch. Runs until
    /// the watcher channel closes.
    pub fn run(mut self) -> anyhow::Result<()> {
        let root = self.graph.resolver.root().to_path_buf();
        let (tx, rx) = std::sync::mpsc::channel();
        let mut debouncer = new_debouncer(Duration::from_millis(250), None, tx)?;
        debouncer.watch(&root, RecursiveMode::Recursive)?;
        tracing::info!(root = %root.display(), "watching for changes");

        while let Ok(batch) = rx.recv() {
            let events = match batch {
                Ok(events) => events,
                Err(errors) => {
                    for err in errors {
                        tracing::error!("watch error: {err}");
                    }
                    continue;
                }
            };
            let mut touched: HashSet<ModuleId> = HashSet::new();
            for event in &events {
                if !matches!(
                    event.event.kind,
                    notify::EventKind::Create(_)
                        | notify::EventKind::Modify(_)
                        | notify::EventKind::Remove(_)
                ) {
                    continue;
                }
                for path in &event.event.paths {
                    touched.insert(ModuleId::new(&normalize(path)));
                }
            }
            if touched.is_empty() {
                continue;
            }
            let mut touched: Vec<ModuleId> = touched.into_iter().collect();
            touched.sort();
            self.rebuild(&touched);
        }
        Ok(())
    }
}

fn normalize(path: &Path) -> std::path::PathBuf {
    path.normalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(seq: u64) -> RebuildEvent {
        RebuildEvent {
            seq,
            changed: Vec::new(),
            output: None,
            diagnostics: Vec::new(),
        }
    }

    #[test]
    fn stale_publish_is_dropped() {
        let stream = EventStream::default();
        assert!(stream.publish(event(2)));
        assert!(!stream.publish(event(1)));
        assert!(!stream.publish(event(2)));
        assert_eq!(stream.latest().map(|e| e.seq), Some(2));
    }

    #[test]
    fn late_subscriber_receives_latest_first() {
        let stream = EventStream::default();
        stream.publish(event(1));
        stream.publish(event(3));
        let rx = stream.subscribe();
        assert_eq!(rx.try_recv().map(|e| e.seq), Ok(3));
    }

    #[test]
    fn subscribers_see_every_accepted_event() {
        let stream = EventStream::default();
        let rx = stream.subscribe();
        stream.publish(event(1));
        stream.publish(event(2));
        let seqs: Vec<u64> = rx.try_iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![1, 2]);
    }

    #[test]
    fn sequence_numbers_strictly_increase() {
        let stream = EventStream::default();
        let a = stream.next_seq();
        let b = stream.next_seq();
        assert!(b > a);
    }
}
