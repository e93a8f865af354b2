//! Guest threads
//!
//! Each guest thread runs on its own host thread, which owns the register
//! file for the thread's lifetime. Other threads steer it with control
//! events that the task loop consumes before every step: `Pause` parks the
//! loop until `Run` arrives and `Stop` ends it. A guest thread also ends
//! when it returns into a null link register or faults.

use std::cell::Cell;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::JoinHandle;

use cf_core::error::PpuError;
use cf_core::{ppu_debug, ppu_error, ppu_info};
use once_cell::sync::Lazy;
use parking_lot::{Condvar, Mutex};

use crate::backend::CompiledExecutor;
use crate::interpreter::PpuInterpreter;
use crate::thread::{PpuRegisters, PpuThread};

/// Strategy that advances a guest thread
pub trait Executor: Send + Sync {
    fn step(&self, thread: &mut PpuThread) -> Result<(), PpuError>;
}

impl Executor for PpuInterpreter {
    fn step(&self, thread: &mut PpuThread) -> Result<(), PpuError> {
        PpuInterpreter::step(self, thread)
    }
}

impl Executor for CompiledExecutor {
    fn step(&self, thread: &mut PpuThread) -> Result<(), PpuError> {
        CompiledExecutor::step(self, thread)
    }
}

/// Pending control request, consumed at the top of each step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadEvent {
    None,
    Run,
    Pause,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadStatus {
    Running,
    Paused,
    /// Ended by a `Stop` request
    Stopped,
    /// Returned to address 0
    Exited,
    /// Ended by an error from the executor
    Faulted,
}

impl ThreadStatus {
    pub fn is_finished(self) -> bool {
        matches!(self, ThreadStatus::Stopped | ThreadStatus::Exited | ThreadStatus::Faulted)
    }
}

thread_local! {
    static CURRENT: Cell<Option<u32>> = const { Cell::new(None) };
}

/// ID of the guest thread running on the calling host thread
pub fn current_thread_id() -> Option<u32> {
    CURRENT.with(Cell::get)
}

struct Control {
    event: Mutex<ThreadEvent>,
    /// Signalled when an event is posted
    wake: Condvar,
    status: Mutex<ThreadStatus>,
    /// Signalled when the status changes
    changed: Condvar,
}

impl Control {
    fn set_status(&self, status: ThreadStatus) {
        *self.status.lock() = status;
        self.changed.notify_all();
    }

    /// Consume the pending event; false when the loop must end
    fn proceed(&self) -> bool {
        let mut event = self.event.lock();
        loop {
            match *event {
                ThreadEvent::None => return true,
                ThreadEvent::Run => {
                    *event = ThreadEvent::None;
                    self.set_status(ThreadStatus::Running);
                    return true;
                }
                ThreadEvent::Stop => return false,
                ThreadEvent::Pause => {
                    self.set_status(ThreadStatus::Paused);
                    self.wake.wait(&mut event);
                }
            }
        }
    }

    fn post(&self, request: ThreadEvent) {
        let mut event = self.event.lock();
        // Stop is final
        if *event != ThreadEvent::Stop {
            *event = request;
        }
        self.wake.notify_all();
    }
}

/// Handle to a guest thread running on a host thread
pub struct GuestThread {
    id: u32,
    name: String,
    control: Arc<Control>,
    handle: Mutex<Option<JoinHandle<PpuRegisters>>>,
}

impl GuestThread {
    /// Start `thread` on a new host thread driven by `executor`
    pub fn spawn(mut thread: PpuThread, executor: Arc<dyn Executor>) -> Result<Arc<Self>, PpuError> {
        let id = thread.id;
        let name = thread.name.clone();
        let control = Arc::new(Control {
            event: Mutex::new(ThreadEvent::None),
            wake: Condvar::new(),
            status: Mutex::new(ThreadStatus::Running),
            changed: Condvar::new(),
        });

        let task = Arc::clone(&control);
        let handle = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                CURRENT.with(|current| current.set(Some(thread.id)));
                let status = run_task(&task, &mut thread, executor.as_ref());
                task.set_status(status);
                thread.regs
            })
            .map_err(|e| PpuError::Thread(format!("failed to spawn {}: {}", name, e)))?;

        ppu_info!("Started {} (id {})", name, id);
        Ok(Arc::new(Self {
            id,
            name,
            control,
            handle: Mutex::new(Some(handle)),
        }))
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> ThreadStatus {
        *self.control.status.lock()
    }

    pub fn run(&self) {
        self.control.post(ThreadEvent::Run);
    }

    pub fn pause(&self) {
        self.control.post(ThreadEvent::Pause);
    }

    pub fn stop(&self) {
        self.control.post(ThreadEvent::Stop);
    }

    /// Block until the status satisfies `done`
    pub fn wait_for(&self, done: impl Fn(ThreadStatus) -> bool) -> ThreadStatus {
        let mut status = self.control.status.lock();
        while !done(*status) {
            self.control.changed.wait(&mut status);
        }
        *status
    }

    /// Wait for the thread to end and take its final registers
    pub fn join(&self) -> Result<PpuRegisters, PpuError> {
        let handle = self
            .handle
            .lock()
            .take()
            .ok_or_else(|| PpuError::Thread(format!("{} already joined", self.name)))?;
        handle
            .join()
            .map_err(|_| PpuError::Thread(format!("{} panicked", self.name)))
    }
}

fn run_task(control: &Control, thread: &mut PpuThread, executor: &dyn Executor) -> ThreadStatus {
    loop {
        if !control.proceed() {
            ppu_debug!("{} stopped at 0x{:08x}", thread.name, thread.pc());
            return ThreadStatus::Stopped;
        }
        if thread.pc() == 0 {
            ppu_debug!("{} returned", thread.name);
            return ThreadStatus::Exited;
        }
        if let Err(e) = executor.step(thread) {
            ppu_error!("{} faulted at 0x{:08x}: {}", thread.name, thread.pc(), e);
            return ThreadStatus::Faulted;
        }
    }
}

/// Live guest threads by ID
#[derive(Default)]
pub struct ThreadRegistry {
    threads: Mutex<HashMap<u32, Arc<GuestThread>>>,
}

static REGISTRY: Lazy<ThreadRegistry> = Lazy::new(ThreadRegistry::new);

/// The process-wide registry
pub fn registry() -> &'static ThreadRegistry {
    &REGISTRY
}

impl ThreadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `thread` and register it
    ///
    /// Fails without starting anything when the ID is already registered.
    pub fn spawn(&self, thread: PpuThread, executor: Arc<dyn Executor>) -> Result<Arc<GuestThread>, PpuError> {
        let mut threads = self.threads.lock();
        match threads.entry(thread.id) {
            Entry::Occupied(_) => Err(duplicate(thread.id)),
            Entry::Vacant(slot) => {
                let guest = GuestThread::spawn(thread, executor)?;
                slot.insert(Arc::clone(&guest));
                Ok(guest)
            }
        }
    }

    /// Register a running thread; a thread with the same ID must not exist
    pub fn add_thread(&self, thread: Arc<GuestThread>) -> Result<(), PpuError> {
        match self.threads.lock().entry(thread.id()) {
            Entry::Occupied(_) => Err(duplicate(thread.id())),
            Entry::Vacant(slot) => {
                slot.insert(thread);
                Ok(())
            }
        }
    }

    pub fn remove_thread(&self, id: u32) -> Option<Arc<GuestThread>> {
        self.threads.lock().remove(&id)
    }

    pub fn get(&self, id: u32) -> Option<Arc<GuestThread>> {
        self.threads.lock().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.threads.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.lock().is_empty()
    }

    pub fn run(&self) {
        self.threads.lock().values().for_each(|thread| thread.run());
    }

    pub fn pause(&self) {
        self.threads.lock().values().for_each(|thread| thread.pause());
    }

    pub fn stop(&self) {
        self.threads.lock().values().for_each(|thread| thread.stop());
    }

    /// Join and unregister every thread
    pub fn join_all(&self) -> Vec<(u32, Result<PpuRegisters, PpuError>)> {
        let threads: Vec<Arc<GuestThread>> = self.threads.lock().drain().map(|(_, thread)| thread).collect();
        let mut results: Vec<_> = threads.iter().map(|thread| (thread.id(), thread.join())).collect();
        results.sort_by_key(|(id, _)| *id);
        results
    }
}

fn duplicate(id: u32) -> PpuError {
    PpuError::Thread(format!("thread id {} is already registered", id))
}
