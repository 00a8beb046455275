// Copyright 2024 Zinc Labs Inc.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! The downstream split sink external collaborator (`spec.md` §6). The core
//! only depends on `SplitSink`; this module also ships `ChannelSplitSink`, an
//! in-process reference adapter with real bounded backpressure, used by this
//! crate's own tests the same way `src/job/file_downloader.rs` in the
//! teacher gates a bounded `tokio::sync::mpsc` channel.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::{errors::LoaderError, split_factory::InternalSplit};

/// An eventually-completing handle expressing backpressure (`spec.md` §6,
/// GLOSSARY "Completion signal"). The producer never blocks a thread on it —
/// it's consumed with `.await`.
pub enum CompletionSignal {
    Ready,
    Pending(Arc<Notify>),
}

impl CompletionSignal {
    pub fn is_ready(&self) -> bool {
        matches!(self, CompletionSignal::Ready)
    }

    pub async fn wait(self) {
        if let CompletionSignal::Pending(notify) = self {
            notify.notified().await;
        }
    }
}

#[async_trait]
pub trait SplitSink: Send + Sync {
    async fn add_to_queue(&self, split: InternalSplit) -> CompletionSignal {
        self.add_to_queue_batch(vec![split]).await
    }

    async fn add_to_queue_batch(&self, splits: Vec<InternalSplit>) -> CompletionSignal;

    /// Idempotent terminal marker (`spec.md` §6, §4.6, §8).
    async fn no_more_splits(&self);

    /// Idempotent terminal failure (`spec.md` §6, §7).
    async fn fail(&self, error: LoaderError);
}

#[derive(Debug, Clone, PartialEq)]
pub enum TerminalState {
    NoMoreSplits,
    Failed(String),
}

/// Bounded reference sink: once `capacity` splits are enqueued and
/// unconsumed, further enqueues return a `Pending` signal that resolves only
/// after a consumer calls `poll`. A real production sink is whatever bounded
/// queue feeds the query workers (`spec.md` §1) — out of scope here.
pub struct ChannelSplitSink {
    capacity: usize,
    queue: Mutex<VecDeque<InternalSplit>>,
    in_flight: AtomicUsize,
    notify: Arc<Notify>,
    no_more_splits_calls: AtomicUsize,
    failed: AtomicBool,
    terminal: Mutex<Option<TerminalState>>,
}

impl ChannelSplitSink {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            capacity,
            queue: Mutex::new(VecDeque::new()),
            in_flight: AtomicUsize::new(0),
            notify: Arc::new(Notify::new()),
            no_more_splits_calls: AtomicUsize::new(0),
            failed: AtomicBool::new(false),
            terminal: Mutex::new(None),
        })
    }

    /// Drains every split currently buffered. Simulates a worker consuming
    /// from the bounded queue and freeing capacity for producers.
    pub fn drain(&self) -> Vec<InternalSplit> {
        let drained: Vec<_> = self.queue.lock().unwrap().drain(..).collect();
        if !drained.is_empty() {
            self.in_flight.fetch_sub(drained.len(), Ordering::SeqCst);
            self.notify.notify_waiters();
        }
        drained
    }

    pub fn no_more_splits_call_count(&self) -> usize {
        self.no_more_splits_calls.load(Ordering::SeqCst)
    }

    pub fn terminal_state(&self) -> Option<TerminalState> {
        self.terminal.lock().unwrap().clone()
    }

    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SplitSink for ChannelSplitSink {
    async fn add_to_queue_batch(&self, splits: Vec<InternalSplit>) -> CompletionSignal {
        if self.failed.load(Ordering::SeqCst) || self.terminal.lock().unwrap().is_some() {
            // `spec.md` §7: the sink may reject enqueues after `fail`/terminal.
            return CompletionSignal::Ready;
        }
        let n = splits.len();
        self.queue.lock().unwrap().extend(splits);
        let now_in_flight = self.in_flight.fetch_add(n, Ordering::SeqCst) + n;
        if now_in_flight < self.capacity {
            CompletionSignal::Ready
        } else {
            CompletionSignal::Pending(self.notify.clone())
        }
    }

    async fn no_more_splits(&self) {
        self.no_more_splits_calls.fetch_add(1, Ordering::SeqCst);
        let mut terminal = self.terminal.lock().unwrap();
        if terminal.is_none() {
            *terminal = Some(TerminalState::NoMoreSplits);
        }
    }

    async fn fail(&self, error: LoaderError) {
        self.failed.store(true, Ordering::SeqCst);
        let mut terminal = self.terminal.lock().unwrap();
        if terminal.is_none() {
            *terminal = Some(TerminalState::Failed(error.to_string()));
        }
    }
}
