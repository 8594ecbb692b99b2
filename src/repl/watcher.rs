use crossbeam_channel::Sender;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};

/// Watches sequence files; events arrive on the channel passed to `new`
/// from notify's own thread.
pub struct FileWatcher {
    watcher: RecommendedWatcher,
    paths: Vec<PathBuf>,
}

impl FileWatcher {
    pub fn new(tx: Sender<notify::Result<Event>>) -> notify::Result<Self> {
        let watcher = notify::recommended_watcher(move |res| {
            // The REPL has exited if the receiver is gone
            let _ = tx.send(res);
        })?;

        Ok(Self {
            watcher,
            paths: Vec::new(),
        })
    }

    pub fn watch<P: AsRef<Path>>(&mut self, path: P) -> notify::Result<()> {
        let path = path.as_ref();
        self.watcher.watch(path, RecursiveMode::NonRecursive)?;
        if !self.paths.iter().any(|p| p == path) {
            self.paths.push(path.to_path_buf());
        }
        Ok(())
    }

    pub fn unwatch<P: AsRef<Path>>(&mut self, path: P) -> notify::Result<()> {
        let path = path.as_ref();
        self.paths.retain(|p| p != path);
        self.watcher.unwatch(path)
    }

    pub fn watched(&self) -> &[PathBuf] {
        &self.paths
    }
}

/// Paths in `event` whose contents changed
pub fn changed_paths(event: Event) -> Vec<PathBuf> {
    match event.kind {
        EventKind::Modify(_) | EventKind::Create(_) => event.paths,
        _ => Vec::new(),
    }
}
