//! Process and thread system calls.

use crate::proc::{kernel_ctx, unwind_exit, Pid, Task, Tid};

/// Starts a new process running `task`; the child inherits the caller's
/// open files and gets its own copy of `args`. Returns the new pid.
pub fn exec(task: Task, args: &[u8]) -> Result<Pid, ()> {
    let ctx = kernel_ctx();
    let mut k = ctx.kernel().lock();
    k.exec(ctx.kernel(), Some(ctx.pid()), Some(task), args)
}

/// Terminates the calling process (from its main thread's point of view):
/// records `status`, exits the calling thread, and lets the process die
/// when its last thread is gone. Does not return.
pub fn exit(status: i32) -> ! {
    let ctx = kernel_ctx();
    ctx.do_exit(status);
    unwind_exit()
}

/// Waits for a child to exit and reaps it. `None` waits for any child.
/// Returns the reaped pid with its exit status.
pub fn wait_child(cpid: Option<Pid>) -> Result<(Pid, i32), ()> {
    kernel_ctx().wait_child(cpid)
}

pub fn get_pid() -> Pid {
    kernel_ctx().pid()
}

/// The parent's pid, or 0 for the parentless idle and init processes.
pub fn get_ppid() -> Pid {
    let ctx = kernel_ctx();
    let k = ctx.kernel().lock();
    k.procs.get(ctx.pid()).parent.unwrap_or(0)
}

/// Starts another thread in the calling process, running `task` on a copy
/// of `args`.
pub fn create_thread(task: Task, args: &[u8]) -> Tid {
    kernel_ctx().create_thread(task, args)
}

pub fn thread_self() -> Tid {
    kernel_ctx().tid()
}

/// Waits for the given thread of the calling process to exit and returns
/// its exit value. Fails for unknown tids, the calling thread itself, and
/// detached threads.
pub fn thread_join(tid: Tid) -> Result<i32, ()> {
    kernel_ctx().thread_join(tid)
}

/// Detaches the given thread: pending and future joins on it fail.
pub fn thread_detach(tid: Tid) -> Result<(), ()> {
    kernel_ctx().thread_detach(tid)
}

/// Terminates the calling thread. The process exits once its last thread
/// does. Does not return.
pub fn thread_exit(status: i32) -> ! {
    let ctx = kernel_ctx();
    ctx.do_thread_exit(status);
    unwind_exit()
}
