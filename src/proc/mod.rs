//! Processes and the threads inside them.

use std::collections::VecDeque;

use array_macro::array;

use crate::file::FcbId;
use crate::param::NOFILE;

mod kernel_ctx;
mod procs;
mod thread;
mod wait_channel;

pub(crate) use kernel_ctx::{kernel_ctx, KernelCtx};
pub(crate) use thread::{init_panic_hook, spawn_kernel_thread, unwind_exit};
pub use procs::Procs;
pub use thread::{Ptcb, Tid};
pub use wait_channel::WaitChannel;

/// A task run by a process's main thread or by a created thread. The byte
/// slice is the kernel-owned copy of the arguments the creator supplied.
pub type Task = fn(&[u8]) -> i32;

/// Process identifier: the PCB's offset in the process table. Pid 0 is the
/// idle process, pid 1 is init.
pub type Pid = usize;

#[derive(Copy, Clone, PartialEq, Debug)]
pub enum Procstate {
    FREE,
    ALIVE,
    ZOMBIE,
}

/// Per-process state.
pub struct Proc {
    pub pstate: Procstate,

    /// Parent process. `None` only for idle and init.
    pub parent: Option<Pid>,

    /// All children, live and zombie, youngest first.
    pub children: VecDeque<Pid>,

    /// Children that exited and wait to be reaped, most recent first. Every
    /// entry here is also in `children`.
    pub exited_children: VecDeque<Pid>,

    /// Open files.
    pub open_files: [Option<FcbId>; NOFILE],

    /// Threads of this process. An exited thread's PTCB is removed by its
    /// last joiner; whatever is left goes away at process exit.
    pub threads: Vec<Ptcb>,

    pub main_thread: Option<Tid>,
    pub main_task: Option<Task>,

    /// Kernel-owned copy of the arguments passed to `exec`.
    pub args: Option<Box<[u8]>>,

    pub exitval: i32,

    /// A child of this process has exited.
    pub child_exit: WaitChannel,

    /// Number of threads that have not yet exited.
    pub thread_count: usize,

    /// Next thread identifier. Never reused within one process incarnation.
    next_tid: Tid,
}

impl Proc {
    pub(crate) fn new() -> Self {
        Self {
            pstate: Procstate::FREE,
            parent: None,
            children: VecDeque::new(),
            exited_children: VecDeque::new(),
            open_files: array![_ => None; NOFILE],
            threads: Vec::new(),
            main_thread: None,
            main_task: None,
            args: None,
            exitval: 0,
            child_exit: WaitChannel::new(),
            thread_count: 0,
            next_tid: 0,
        }
    }

    /// Creates the PTCB for a new thread of this process and hands back its
    /// tid. The caller accounts for it in `thread_count` and spawns it.
    pub(crate) fn alloc_ptcb(&mut self, task: Task, args: &[u8]) -> Tid {
        let tid = self.next_tid;
        self.next_tid += 1;
        self.threads.push(Ptcb::new(tid, task, args));
        tid
    }

    pub(crate) fn ptcb(&self, tid: Tid) -> Option<&Ptcb> {
        self.threads.iter().find(|t| t.tid == tid)
    }

    pub(crate) fn ptcb_mut(&mut self, tid: Tid) -> Option<&mut Ptcb> {
        self.threads.iter_mut().find(|t| t.tid == tid)
    }
}
