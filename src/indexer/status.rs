//! Progress notifications sent upward to a CLI or UI.

use serde::Serialize;
use std::path::PathBuf;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StatusEvent {
    Indexing { is_indexing: bool, percent: u8 },
    CurrentFiles { files: Vec<PathBuf> },
    Message { text: String },
    Finished { interrupted: bool, files_indexed: u64, errors: u64 },
}

/// Cheap to clone. Sending never blocks and a dropped receiver is ignored.
#[derive(Debug, Clone, Default)]
pub struct StatusSender {
    tx: Option<UnboundedSender<StatusEvent>>,
}

pub fn status_channel() -> (StatusSender, UnboundedReceiver<StatusEvent>) {
    let (tx, rx) = unbounded_channel();
    (StatusSender { tx: Some(tx) }, rx)
}

impl StatusSender {
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn send(&self, event: StatusEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }

    pub fn indexing(&self, is_indexing: bool, percent: u8) {
        self.send(StatusEvent::Indexing {
            is_indexing,
            percent,
        });
    }

    pub fn current_files(&self, files: Vec<PathBuf>) {
        self.send(StatusEvent::CurrentFiles { files });
    }

    pub fn message(&self, text: impl Into<String>) {
        self.send(StatusEvent::Message { text: text.into() });
    }
}

pub fn percent_complete(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    ((done.min(total) * 100) / total) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_is_clamped() {
        assert_eq!(percent_complete(0, 0), 100);
        assert_eq!(percent_complete(1, 3), 33);
        assert_eq!(percent_complete(5, 3), 100);
    }

    #[test]
    fn events_reach_receiver_and_closed_channel_is_ignored() {
        let (tx, mut rx) = status_channel();
        tx.indexing(true, 10);
        tx.message("hello");
        assert_eq!(
            rx.try_recv().unwrap(),
            StatusEvent::Indexing {
                is_indexing: true,
                percent: 10
            }
        );
        assert!(matches!(rx.try_recv().unwrap(), StatusEvent::Message { .. }));
        drop(rx);
        tx.current_files(vec![PathBuf::from("a.rs")]);
        StatusSender::disabled().message("nobody listens");
    }
}
