use std::sync::{Arc, Mutex, MutexGuard};

use crate::file::FileTable;
use crate::pipe::PipeTable;
use crate::proc::{init_panic_hook, Procs, Procstate, Task, WaitChannel};
use crate::socket::SocketTable;
use crate::{kprintln, ok_or};

/// The kernel: every long-lived kernel record, behind the single kernel
/// mutex. Syscalls run to completion or to a sleep with the mutex held, so
/// no two of them ever interleave inside kernel state.
pub struct Kernel {
    inner: Mutex<KernelInner>,
}

pub(crate) struct KernelInner {
    pub procs: Procs,
    pub ftable: FileTable,
    pub pipes: PipeTable,
    pub sockets: SocketTable,

    /// Woken when init becomes a zombie.
    pub shutdown: WaitChannel,
}

pub(crate) type KernelGuard<'s> = MutexGuard<'s, KernelInner>;

impl KernelInner {
    pub(crate) fn new() -> Self {
        Self {
            procs: Procs::new(),
            ftable: FileTable::new(),
            pipes: PipeTable::new(),
            sockets: SocketTable::new(),
            shutdown: WaitChannel::new(),
        }
    }
}

impl Kernel {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(KernelInner::new()),
        })
    }

    pub(crate) fn lock(&self) -> KernelGuard<'_> {
        ok_or!(self.inner.lock(), panic!("kernel mutex poisoned"))
    }
}

/// Boots a fresh kernel: starts the idle process (pid 0, no thread) and the
/// init process (pid 1) running `task` with `args`, then blocks until init
/// has exited and every one of its descendants has been reaped. Returns
/// init's exit value.
///
/// Each call builds its own kernel, so kernels in different threads do not
/// share any state.
pub fn boot(task: Task, args: &[u8]) -> i32 {
    init_panic_hook();
    let kernel = Kernel::new();

    let mut k = kernel.lock();
    let idle = ok_or!(k.exec(&kernel, None, None, &[]), panic!("no free PCB at boot"));
    assert_eq!(idle, 0, "the scheduler process does not have pid 0");
    let init = ok_or!(
        k.exec(&kernel, None, Some(task), args),
        panic!("no free PCB at boot")
    );
    assert_eq!(init, 1, "the init process does not have pid 1");
    kprintln!("kernel booted; init is pid {}", init);

    while k.procs.get(1).pstate != Procstate::ZOMBIE {
        let ch = k.shutdown.clone();
        k = ch.sleep(k);
    }
    let status = k.procs.get(1).exitval;
    kprintln!("init exited with status {}", status);
    status
}
