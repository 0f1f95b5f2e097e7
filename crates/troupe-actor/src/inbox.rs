//! Process inbox with cooperative-exclusive draining
//!
//! The scheduling state machine guarantees at most one drain task per inbox
//! without a mutex on the hot path: a push CASes `idle -> running` and only
//! the winner spawns the drain. After a drain empties the buffer the task
//! CASes `running -> idle`; if a racing push slipped in between the last pop
//! and the transition, the buffer is re-checked and re-scheduled.

use crate::constants::{MESSAGE_BATCH_SIZE_MAX, THROUGHPUT_DEFAULT};
use crate::message::Envelope;
use crate::process::Process;
use crate::ring_buffer::RingBuffer;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

const STATE_STOPPED: u8 = 0;
const STATE_STARTING: u8 = 1;
const STATE_IDLE: u8 = 2;
const STATE_RUNNING: u8 = 3;

/// Mailbox accepting envelopes from any task, drained by at most one
pub struct Inbox {
    buffer: RingBuffer<Envelope>,
    proc: Mutex<Option<Arc<dyn Process>>>,
    status: AtomicU8,
    throughput: usize,
}

impl Inbox {
    /// Create an inbox with the given starting ring capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: RingBuffer::new(capacity),
            proc: Mutex::new(None),
            status: AtomicU8::new(STATE_STOPPED),
            throughput: THROUGHPUT_DEFAULT,
        }
    }

    /// Enqueue an envelope and schedule a drain if none is active
    pub fn push(self: &Arc<Self>, envelope: Envelope) {
        self.buffer.push(envelope);
        self.schedule();
    }

    /// Bind the owning process and begin scheduling
    ///
    /// Transitions through `starting` so the process reference is published
    /// before any drain can observe `idle`. Calling `start` on an already
    /// started inbox is a no-op, which lets restarts share the running inbox.
    pub fn start(self: &Arc<Self>, proc: Arc<dyn Process>) {
        if self
            .status
            .compare_exchange(
                STATE_STOPPED,
                STATE_STARTING,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
        {
            *self.proc.lock().unwrap_or_else(PoisonError::into_inner) = Some(proc);
            self.status.store(STATE_IDLE, Ordering::Release);
            self.schedule();
        }
    }

    /// Stop scheduling and release the process reference
    pub fn stop(&self) {
        self.status.store(STATE_STOPPED, Ordering::Release);
        *self.proc.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Number of buffered envelopes
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether the inbox holds no envelopes
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    fn schedule(self: &Arc<Self>) {
        if self
            .status
            .compare_exchange(
                STATE_IDLE,
                STATE_RUNNING,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
        {
            let inbox = Arc::clone(self);
            tokio::spawn(async move {
                inbox.run().await;
                // An envelope may have been pushed between the final pop and
                // this transition. If so, drain again.
                if inbox
                    .status
                    .compare_exchange(
                        STATE_RUNNING,
                        STATE_IDLE,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_ok()
                    && !inbox.buffer.is_empty()
                {
                    inbox.schedule();
                }
            });
        }
    }

    async fn run(&self) {
        let proc = {
            let guard = self.proc.lock().unwrap_or_else(PoisonError::into_inner);
            match guard.as_ref() {
                Some(proc) => Arc::clone(proc),
                None => return,
            }
        };
        let mut budget = self.throughput;
        while self.status.load(Ordering::Acquire) != STATE_STOPPED {
            if budget == 0 {
                budget = self.throughput;
                tokio::task::yield_now().await;
            }
            let batch = self.buffer.pop_n(MESSAGE_BATCH_SIZE_MAX);
            if batch.is_empty() {
                return;
            }
            budget = budget.saturating_sub(batch.len());
            Arc::clone(&proc).invoke(batch).await;
        }
    }
}
