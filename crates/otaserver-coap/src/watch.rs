use std::path::Path;

use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};

use tracing::{debug, warn};

use crate::error::Result;

// Filenames of the files which appeared in the directory, either created
// or renamed into it.
fn appeared_filenames(event: &Event) -> Vec<String> {
    if !matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(_))
    ) {
        return Vec::new();
    }

    event
        .paths
        .iter()
        .filter_map(|path| path.file_name()?.to_str().map(str::to_owned))
        .collect()
}

/// A watcher notifying the files deployed in the firmware directory.
pub(crate) struct FirmwareWatcher {
    // Dropping the watcher stops the notifications.
    _watcher: RecommendedWatcher,
    events: UnboundedReceiver<notify::Result<Event>>,
}

impl std::fmt::Debug for FirmwareWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirmwareWatcher").finish_non_exhaustive()
    }
}

impl FirmwareWatcher {
    // Starts watching the given directory.
    pub(crate) fn new(path: &Path) -> Result<Self> {
        let (sender, events) = unbounded_channel();

        let mut watcher = notify::recommended_watcher(move |event: notify::Result<Event>| {
            // The receiver is gone only when the server stops.
            let _ = sender.send(event);
        })?;
        watcher.watch(path, RecursiveMode::NonRecursive)?;

        debug!("Watching firmware directory {}", path.display());

        Ok(Self {
            _watcher: watcher,
            events,
        })
    }

    // Waits for files to appear in the directory and returns their names.
    //
    // Cancel safe: no event is lost when the future is dropped.
    pub(crate) async fn next(&mut self) -> Vec<String> {
        loop {
            match self.events.recv().await {
                Some(Ok(event)) => {
                    let filenames = appeared_filenames(&event);
                    if !filenames.is_empty() {
                        return filenames;
                    }
                }
                Some(Err(e)) => warn!("Firmware directory watch error: {e}"),
                None => return std::future::pending().await,
            }
        }
    }
}
