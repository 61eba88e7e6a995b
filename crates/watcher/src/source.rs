//! OS notification source
//!
//! Bridges the `notify` callback thread into a tokio channel and translates
//! each `notify::Event` into zero or more [`RawChange`]s.

use crate::error::{NotificationStreamError, WatchSetupError};
use crate::tree::WatchBackend;
use cloudsync_core::{ChangeKind, RawChange};
use notify::event::{EventKind, ModifyKind, RenameMode};
use std::collections::VecDeque;
use tokio::sync::mpsc;

/// One item of the notification stream
#[derive(Debug)]
pub enum SourceEvent {
    /// A filesystem change under a watched directory
    Change(RawChange),
    /// An error reported by the OS layer
    Error(NotificationStreamError),
}

/// Create the OS watcher and the stream it feeds
///
/// The stream ends once the returned backend (and every watch it holds) is
/// dropped.
pub fn os_source() -> Result<(Box<dyn WatchBackend>, Notifications), WatchSetupError> {
    let (tx, rx) = mpsc::unbounded_channel();

    let watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        // Receiver gone means the watch loop has shut down
        let _ = tx.send(res);
    })
    .map_err(WatchSetupError::Backend)?;

    Ok((Box::new(watcher), Notifications::new(rx)))
}

/// Unbounded, single-consumer stream of raw notifications
pub struct Notifications {
    rx: mpsc::UnboundedReceiver<notify::Result<notify::Event>>,
    ready: VecDeque<SourceEvent>,
}

impl Notifications {
    /// Wrap a channel of raw `notify` results
    pub fn new(rx: mpsc::UnboundedReceiver<notify::Result<notify::Event>>) -> Self {
        Self {
            rx,
            ready: VecDeque::new(),
        }
    }

    /// Next notification, or `None` once the OS watch is closed
    ///
    /// Cancel safe: translated changes are buffered until handed out.
    pub async fn next(&mut self) -> Option<SourceEvent> {
        loop {
            if let Some(event) = self.ready.pop_front() {
                return Some(event);
            }

            match self.rx.recv().await? {
                Ok(event) => self
                    .ready
                    .extend(translate(&event).into_iter().map(SourceEvent::Change)),
                Err(err) => return Some(SourceEvent::Error(err.into())),
            }
        }
    }
}

/// Translate a `notify` event into raw changes
///
/// Access events, metadata-only modifications and unclassified events are
/// dropped. A rename reported with both names becomes a `Rename` of the old
/// path followed by a `Create` of the new one.
pub fn translate(event: &notify::Event) -> Vec<RawChange> {
    let kind_for_all = match &event.kind {
        EventKind::Create(_) => ChangeKind::Create,
        EventKind::Remove(_) => ChangeKind::Remove,
        EventKind::Modify(ModifyKind::Name(mode)) => {
            return translate_rename(*mode, &event.paths);
        }
        EventKind::Modify(ModifyKind::Metadata(_)) => return Vec::new(),
        EventKind::Modify(_) => ChangeKind::Write,
        // Access, Any, Other
        _ => return Vec::new(),
    };

    event
        .paths
        .iter()
        .map(|path| RawChange::new(path.clone(), kind_for_all))
        .collect()
}

fn translate_rename(mode: RenameMode, paths: &[std::path::PathBuf]) -> Vec<RawChange> {
    match mode {
        RenameMode::To => paths
            .iter()
            .map(|p| RawChange::new(p.clone(), ChangeKind::Create))
            .collect(),
        RenameMode::Both => {
            let mut changes = Vec::with_capacity(paths.len());
            if let Some(from) = paths.first() {
                changes.push(RawChange::new(from.clone(), ChangeKind::Rename));
            }
            if let Some(to) = paths.get(1) {
                changes.push(RawChange::new(to.clone(), ChangeKind::Create));
            }
            changes
        }
        RenameMode::From => paths
            .iter()
            .map(|p| RawChange::new(p.clone(), ChangeKind::Rename))
            .collect(),
        // Any, Other: the backend can't tell which side this is
        _ => paths
            .iter()
            .map(|p| {
                let kind = if p.exists() { ChangeKind::Create } else { ChangeKind::Rename };
                RawChange::new(p.clone(), kind)
            })
            .collect(),
    }
}
