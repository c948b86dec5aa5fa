//! First-come-first-served reader-writer lock.
//!
//! POSIX-style condition variables make no ordering promise, so a naive
//! readers-writers scheme starves one side or scrambles arrival order.
//! This lock keeps an explicit FIFO of waiting threads and drives all
//! scheduling off it: a waiter runs only when its own token reaches the
//! head of the list *and* has been flipped to the matching pending role by
//! whoever signaled it. Wake-ups are broadcast and every waiter re-checks
//! that head predicate, which defends both against spurious wakes and
//! against the condition variable's own scheduling order.
//!
//! Fairness hinges on one discipline: the signaler increments the count
//! the woken thread will rely on *before* leaving the critical section.
//! A late arrival can therefore never observe a zero count between the
//! signal and the woken thread actually running, and cannot jump the
//! queue. Contiguous readers batch: each woken reader wakes the reader
//! behind it, so a run of readers at the head executes concurrently.
//!
//! Timeouts take a relative duration in ticks (0 polls, `FOREVER` waits
//! indefinitely); the absolute deadline is fixed once and re-applied on
//! every iteration of the wake loop. Priority acquisition inserts at the
//! front of the list, behind any pending token, as a seldom-used escape
//! hatch rather than a general priority class.
//!
//! Invariant violations here mean the synchronization itself is broken,
//! so they abort the process in every build profile.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Instant;

use crate::error::{NetError, Result};
use crate::time::{self, Ticks};

/// Timeout value meaning: do not wait at all.
pub const POLL: Ticks = 0;

/// Timeout value meaning: wait indefinitely.
pub const FOREVER: Ticks = Ticks::MAX;

/// Which side of the lock a thread is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Reader,
    Writer,
}

/// A waitlist token's role. Waiting roles become pending when the thread
/// is selected to run; a pending token holds the head of the queue until
/// its owner actually wakes and removes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Reader,
    Writer,
    Reading,
    Writing,
}

impl Role {
    fn is_pending(self) -> bool {
        matches!(self, Role::Reading | Role::Writing)
    }

    fn letter(self) -> char {
        match self {
            Role::Reader => 'R',
            Role::Writer => 'W',
            Role::Reading => 'r',
            Role::Writing => 'w',
        }
    }
}

impl Side {
    fn waiting(self) -> Role {
        match self {
            Side::Reader => Role::Reader,
            Side::Writer => Role::Writer,
        }
    }

    fn pending(self) -> Role {
        match self {
            Side::Reader => Role::Reading,
            Side::Writer => Role::Writing,
        }
    }
}

/// One suspended thread's entry in the waitlist.
#[derive(Debug)]
struct Waiter {
    token: u64,
    role: Role,
}

#[derive(Debug, Default)]
struct State {
    reading: u32,
    writing: u32,
    waitlist: VecDeque<Waiter>,
}

impl State {
    fn check(&self) {
        assert!(
            self.writing <= 1,
            "reader-writer corrupt: {} writers active",
            self.writing
        );
        assert!(
            !(self.reading > 0 && self.writing > 0),
            "reader-writer corrupt: {} readers alongside a writer",
            self.reading
        );
    }

    /// Index at which a priority token belongs: in front of everything
    /// except pending tokens, which cannot be preempted.
    fn front(&self) -> usize {
        self.waitlist
            .iter()
            .position(|w| !w.role.is_pending())
            .unwrap_or(self.waitlist.len())
    }

    /// True when this thread's token leads the list with the pending role
    /// matching its request.
    fn ready(&self, token: u64, pending: Role) -> bool {
        matches!(self.waitlist.front(), Some(w) if w.token == token && w.role == pending)
    }
}

/// Every thread that ever waits gets a process-unique token identity,
/// created on first use and reclaimed with the thread.
fn thread_token() -> u64 {
    static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);
    thread_local! {
        static TOKEN: u64 = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
    }
    TOKEN.with(|token| *token)
}

/// A fair, FIFO-ordered reader-writer lock with timed and priority
/// acquisition.
#[derive(Default)]
pub struct ReaderWriter {
    state: Mutex<State>,
    readers: Condvar,
    writers: Condvar,
    debugging: AtomicBool,
}

/// Holds shared (read) access; released on drop.
#[must_use = "the read lock is released as soon as the guard drops"]
#[derive(Debug)]
pub struct ReadGuard<'a> {
    lock: &'a ReaderWriter,
}

/// Holds exclusive (write) access; released on drop.
#[must_use = "the write lock is released as soon as the guard drops"]
#[derive(Debug)]
pub struct WriteGuard<'a> {
    lock: &'a ReaderWriter,
}

impl ReaderWriter {
    pub fn new() -> ReaderWriter {
        ReaderWriter::default()
    }

    /// Acquires shared access, waiting as long as it takes.
    pub fn read(&self) -> Result<ReadGuard<'_>> {
        self.read_with(FOREVER, false)
    }

    /// Acquires shared access or gives up after `timeout` ticks. `POLL`
    /// returns immediately and `FOREVER` never gives up; failure is
    /// `TimedOut`.
    pub fn read_timed(&self, timeout: Ticks) -> Result<ReadGuard<'_>> {
        self.read_with(timeout, false)
    }

    /// Acquires shared access, waiting at the front of the line if it must
    /// wait at all.
    pub fn read_priority(&self) -> Result<ReadGuard<'_>> {
        self.read_with(FOREVER, true)
    }

    /// Shared acquisition with explicit timeout and priority.
    pub fn read_with(&self, timeout: Ticks, priority: bool) -> Result<ReadGuard<'_>> {
        self.begin(Side::Reader, timeout, priority)?;
        Ok(ReadGuard { lock: self })
    }

    /// Acquires exclusive access, waiting as long as it takes.
    pub fn write(&self) -> Result<WriteGuard<'_>> {
        self.write_with(FOREVER, false)
    }

    /// Acquires exclusive access or gives up after `timeout` ticks.
    pub fn write_timed(&self, timeout: Ticks) -> Result<WriteGuard<'_>> {
        self.write_with(timeout, false)
    }

    /// Acquires exclusive access, waiting at the front of the line if it
    /// must wait at all.
    pub fn write_priority(&self) -> Result<WriteGuard<'_>> {
        self.write_with(FOREVER, true)
    }

    /// Exclusive acquisition with explicit timeout and priority.
    pub fn write_with(&self, timeout: Ticks, priority: bool) -> Result<WriteGuard<'_>> {
        self.begin(Side::Writer, timeout, priority)?;
        Ok(WriteGuard { lock: self })
    }

    /// Enables or disables per-transition state dumps through the logging
    /// layer and returns the prior setting.
    pub fn set_debug(&self, enable: bool) -> bool {
        self.debugging.swap(enable, Ordering::Relaxed)
    }

    /// Current `(reading, writing, waiting)` occupancy.
    pub fn occupancy(&self) -> (u32, u32, usize) {
        let state = self.lock_state();
        (state.reading, state.writing, state.waitlist.len())
    }

    /// Asserts the lock's invariants, aborting the process if the
    /// synchronization state is corrupt.
    pub fn audit(&self) {
        self.lock_state().check();
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        // A poisoned mutex means a thread died inside the critical section
        // with the state possibly half-updated; continuing would be worse
        // than stopping.
        self.state
            .lock()
            .unwrap_or_else(|_| panic!("reader-writer mutex poisoned"))
    }

    fn begin(&self, side: Side, timeout: Ticks, priority: bool) -> Result<()> {
        if timeout < 0 {
            return Err(NetError::Invalid(format!("negative timeout: {timeout}")));
        }
        let token = thread_token();
        let mut state = self.lock_state();
        state.check();

        let admit = match side {
            Side::Reader => state.writing == 0 && state.waitlist.is_empty(),
            Side::Writer => {
                state.reading == 0 && state.writing == 0 && state.waitlist.is_empty()
            }
        };

        if admit {
            match side {
                Side::Reader => state.reading += 1,
                Side::Writer => state.writing += 1,
            }
        } else if timeout == POLL {
            // A deliberate poll: no logging, just the distinct result.
            return Err(NetError::TimedOut);
        } else {
            let waiter = Waiter {
                token,
                role: side.waiting(),
            };
            if priority {
                let at = state.front();
                state.waitlist.insert(at, waiter);
            } else {
                state.waitlist.push_back(waiter);
            }
            self.dump(&state, side, "waiting");

            // The deadline is fixed once; each pass back through the loop
            // waits only for what remains of it.
            let deadline = if timeout == FOREVER {
                None
            } else {
                Some(Instant::now() + time::ticks_to_duration(timeout))
            };
            let condvar = match side {
                Side::Reader => &self.readers,
                Side::Writer => &self.writers,
            };
            while !state.ready(token, side.pending()) {
                match deadline {
                    None => {
                        state = condvar
                            .wait(state)
                            .unwrap_or_else(|_| panic!("reader-writer mutex poisoned"));
                    }
                    Some(deadline) => {
                        let now = Instant::now();
                        if now >= deadline {
                            return Err(self.timed_out(&mut state, side, token));
                        }
                        state = condvar
                            .wait_timeout(state, deadline - now)
                            .unwrap_or_else(|_| panic!("reader-writer mutex poisoned"))
                            .0;
                    }
                }
            }

            // We are the pending head: remove our token. The count we rely
            // on was already incremented by the thread that selected us.
            let popped = state
                .waitlist
                .pop_front()
                .map(|w| w.token == token)
                .unwrap_or(false);
            assert!(popped, "reader-writer corrupt: pending head was not ours");
        }

        // A reader entering lets the next queued reader enter too; that
        // reader will chain to the one behind it in turn.
        if side == Side::Reader {
            if let Some(Side::Reader) = self.resume(&mut state, Some(Side::Reader)) {
                state.reading += 1;
            }
        }

        self.dump(&state, side, "begin");
        state.check();
        match side {
            Side::Reader => assert!(state.reading > 0 && state.writing == 0),
            Side::Writer => assert!(state.reading == 0 && state.writing == 1),
        }
        Ok(())
    }

    fn end(&self, side: Side) {
        let mut state = self.lock_state();
        match side {
            Side::Reader => {
                assert!(
                    state.reading > 0 && state.writing == 0,
                    "reader end without readers active"
                );
                state.reading -= 1;
                if state.reading == 0 {
                    match self.resume(&mut state, None) {
                        Some(Side::Reader) => {
                            // A reader should never have been left waiting
                            // with readers active; recover, but complain.
                            tracing::error!(
                                target: "netbase::readerwriter",
                                "reader resumed by last reader leaving"
                            );
                            state.reading += 1;
                        }
                        Some(Side::Writer) => state.writing += 1,
                        None => {}
                    }
                }
            }
            Side::Writer => {
                assert!(
                    state.reading == 0 && state.writing == 1,
                    "writer end without the writer active"
                );
                state.writing -= 1;
                match self.resume(&mut state, None) {
                    Some(Side::Reader) => state.reading += 1,
                    Some(Side::Writer) => state.writing += 1,
                    None => {}
                }
            }
        }
        self.dump(&state, side, "end");
        state.check();
    }

    /// Selects the head of the waitlist to run, if its role matches
    /// `want` (`None` accepts either side). The token flips to its
    /// pending role before the broadcast so the woken thread finds it
    /// flipped no matter how fast it runs. A pending head means someone
    /// already selected has not run yet: nobody else may be resumed past
    /// it.
    fn resume(&self, state: &mut State, want: Option<Side>) -> Option<Side> {
        let head = state.waitlist.front_mut()?;
        match (head.role, want) {
            (Role::Reader, None) | (Role::Reader, Some(Side::Reader)) => {
                head.role = Role::Reading;
                self.readers.notify_all();
                Some(Side::Reader)
            }
            (Role::Writer, None) | (Role::Writer, Some(Side::Writer)) => {
                head.role = Role::Writing;
                self.writers.notify_all();
                Some(Side::Writer)
            }
            _ => None,
        }
    }

    /// Timed-out waiter cleanup, run with the mutex held. The token is
    /// detached immediately. If the timeout raced with being selected (the
    /// token is already pending and the count pre-incremented), the grant
    /// is undone so the caller still observes a clean `TimedOut`. Either
    /// way, removing the token may unblock whoever stood behind it.
    fn timed_out(&self, state: &mut MutexGuard<'_, State>, side: Side, token: u64) -> NetError {
        let at = state
            .waitlist
            .iter()
            .position(|w| w.token == token)
            .unwrap_or_else(|| panic!("reader-writer corrupt: timed-out token missing"));
        let role = state.waitlist[at].role;
        state.waitlist.remove(at);
        if role.is_pending() {
            match side {
                Side::Reader => state.reading -= 1,
                Side::Writer => state.writing -= 1,
            }
        }
        self.dispatch_unblocked(state);
        self.dump(state, side, "timedout");
        state.check();
        NetError::TimedOut
    }

    /// After a token vanishes from the list, the new head may be eligible
    /// to run under the current counts: a writer only into an idle lock, a
    /// reader also alongside active readers.
    fn dispatch_unblocked(&self, state: &mut State) {
        if state.writing > 0 {
            return;
        }
        if state.reading == 0 {
            match self.resume(state, None) {
                Some(Side::Reader) => state.reading += 1,
                Some(Side::Writer) => state.writing += 1,
                None => {}
            }
        } else if let Some(Side::Reader) = self.resume(state, Some(Side::Reader)) {
            state.reading += 1;
        }
    }

    fn dump(&self, state: &State, side: Side, edge: &str) {
        if !self.debugging.load(Ordering::Relaxed) {
            return;
        }
        let mut roles = String::with_capacity(state.waitlist.len() * 2);
        for waiter in &state.waitlist {
            roles.push(waiter.role.letter());
            roles.push(' ');
        }
        tracing::debug!(
            target: "netbase::readerwriter",
            "{side:?} {edge}: {}reading {}writing {}waiting {{ {roles}}}",
            state.reading,
            state.writing,
            state.waitlist.len(),
        );
    }
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        self.lock.end(Side::Reader);
    }
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        self.lock.end(Side::Writer);
    }
}

impl std::fmt::Debug for ReaderWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (reading, writing, waiting) = self.occupancy();
        f.debug_struct("ReaderWriter")
            .field("reading", &reading)
            .field("writing", &writing)
            .field("waiting", &waiting)
            .finish()
    }
}
