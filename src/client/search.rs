//! Search box debouncing.
//!
//! Keystrokes go in; a [`SearchRequest`] comes out once the text has been stable
//! for the debounce delay. Each emitted request carries a generation so the feed
//! can ignore anything older than what it already applied.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// A settled search, ready to apply to the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub generation: u64,
    pub text: String,
}

/// Background task that turns keystrokes into settled searches.
pub struct SearchDebouncer {
    input: mpsc::UnboundedSender<String>,
    settled: mpsc::UnboundedReceiver<SearchRequest>,
    task: JoinHandle<()>,
}

impl SearchDebouncer {
    pub fn spawn(delay: Duration) -> Self {
        let (input, keystrokes) = mpsc::unbounded_channel();
        let (emit, settled) = mpsc::unbounded_channel();
        let task = tokio::spawn(debounce_loop(delay, keystrokes, emit));
        Self {
            input,
            settled,
            task,
        }
    }

    /// Record the full text of the search box after a keystroke.
    pub fn keystroke(&self, text: impl Into<String>) {
        if self.input.send(text.into()).is_err() {
            tracing::warn!("Search debouncer stopped; keystroke dropped");
        }
    }

    /// Wait for the next settled search.
    pub async fn settled(&mut self) -> Option<SearchRequest> {
        self.settled.recv().await
    }

    pub fn try_settled(&mut self) -> Option<SearchRequest> {
        self.settled.try_recv().ok()
    }
}

impl Drop for SearchDebouncer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn debounce_loop(
    delay: Duration,
    mut keystrokes: mpsc::UnboundedReceiver<String>,
    emit: mpsc::UnboundedSender<SearchRequest>,
) {
    let mut generation = 0u64;
    let mut pending: Option<String> = None;

    loop {
        let next = if pending.is_some() {
            match timeout(delay, keystrokes.recv()).await {
                Ok(next) => next,
                Err(_) => {
                    if let Some(text) = pending.take() {
                        generation += 1;
                        if emit.send(SearchRequest { generation, text }).is_err() {
                            return;
                        }
                    }
                    continue;
                }
            }
        } else {
            keystrokes.recv().await
        };

        match next {
            Some(text) => pending = Some(text),
            None => {
                if let Some(text) = pending.take() {
                    generation += 1;
                    let _ = emit.send(SearchRequest { generation, text });
                }
                return;
            }
        }
    }
}
