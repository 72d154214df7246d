use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Once};
use std::thread;

use crate::kernel::Kernel;
use crate::proc::{KernelCtx, Pid, Task, WaitChannel};
use crate::{ok_or, some_or};

/// Thread identifier, local to the owning process.
pub type Tid = usize;

/// Per-thread control block.
pub struct Ptcb {
    pub tid: Tid,
    pub(crate) task: Task,
    pub(crate) args: Box<[u8]>,
    pub exited: bool,
    pub detached: bool,
    pub exitval: i32,

    /// Number of threads blocked in a join on this thread. The PTCB stays
    /// around until this drains.
    pub refcount: usize,

    /// Woken when this thread exits or is detached.
    pub exit_cv: WaitChannel,
}

impl Ptcb {
    pub(crate) fn new(tid: Tid, task: Task, args: &[u8]) -> Self {
        Self {
            tid,
            task,
            args: args.to_vec().into_boxed_slice(),
            exited: false,
            detached: false,
            exitval: 0,
            refcount: 0,
            exit_cv: WaitChannel::new(),
        }
    }
}

/// Payload that unwinds a thread out of user code after its exit
/// bookkeeping already ran.
struct ExitUnwind;

static PANIC_HOOK: Once = Once::new();

/// Silences panic reports for the controlled `ExitUnwind` payload. Installed
/// once per binary, at the first boot.
pub(crate) fn init_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let default = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if info.payload().downcast_ref::<ExitUnwind>().is_none() {
                default(info);
            }
        }));
    });
}

/// Leaves user code for good. Caught by the thread trampoline.
pub(crate) fn unwind_exit() -> ! {
    panic::panic_any(ExitUnwind);
}

/// Starts the scheduler thread behind `(pid, tid)`. The new thread becomes
/// runnable immediately; it serializes with the caller on the kernel mutex.
pub(crate) fn spawn_kernel_thread(kernel: &Arc<Kernel>, pid: Pid, tid: Tid) {
    let kernel = Arc::clone(kernel);
    let builder = thread::Builder::new().name(format!("proc{}.t{}", pid, tid));
    let handle = builder.spawn(move || {
        let ctx = KernelCtx::install(kernel, pid, tid);
        start_thread(ctx);
    });
    drop(ok_or!(handle, panic!("spawn_thread failed")));
}

/// Trampoline for every kernel thread: reads the task and arguments out of
/// the control blocks, runs the task, and routes the outcome through the
/// exit path. The main thread of a process exits the whole process; any
/// other thread exits only itself.
fn start_thread(ctx: KernelCtx) {
    let (task, args, is_main) = {
        let k = ctx.kernel().lock();
        let p = k.procs.get(ctx.pid());
        let is_main = p.main_thread == Some(ctx.tid());
        if is_main {
            let task = some_or!(p.main_task, panic!("main thread without a task"));
            (task, p.args.clone().unwrap_or_default(), true)
        } else {
            let t = some_or!(p.ptcb(ctx.tid()), panic!("running thread without a PTCB"));
            (t.task, t.args.clone(), false)
        }
    };

    let result = panic::catch_unwind(AssertUnwindSafe(|| task(&args)));
    match result {
        Ok(exitval) => {
            if is_main {
                ctx.do_exit(exitval);
            } else {
                ctx.do_thread_exit(exitval);
            }
        }
        Err(payload) => {
            if payload.downcast_ref::<ExitUnwind>().is_none() {
                // A panicking task still has to release its kernel state, or
                // joiners and the parent would block forever.
                if is_main {
                    ctx.do_exit(-1);
                } else {
                    ctx.do_thread_exit(-1);
                }
                panic::resume_unwind(payload);
            }
        }
    }
}

impl KernelCtx {
    pub(crate) fn create_thread(&self, task: Task, args: &[u8]) -> Tid {
        let mut k = self.kernel().lock();
        let p = k.procs.get_mut(self.pid());
        let tid = p.alloc_ptcb(task, args);
        p.thread_count += 1;
        spawn_kernel_thread(self.kernel(), self.pid(), tid);
        tid
    }

    pub(crate) fn thread_join(&self, tid: Tid) -> Result<i32, ()> {
        if tid == self.tid() {
            return Err(());
        }
        let mut k = self.kernel().lock();
        {
            let t = some_or!(k.procs.get_mut(self.pid()).ptcb_mut(tid), return Err(()));
            if t.detached {
                return Err(());
            }
            t.refcount += 1;
        }

        loop {
            let t = some_or!(
                k.procs.get(self.pid()).ptcb(tid),
                panic!("joined PTCB vanished")
            );
            if t.detached || t.exited {
                break;
            }
            let ch = t.exit_cv.clone();
            k = ch.sleep(k);
        }

        let p = k.procs.get_mut(self.pid());
        let t = some_or!(p.ptcb_mut(tid), panic!("joined PTCB vanished"));
        t.refcount -= 1;
        // Detaching overrides joining, even for joiners already waiting.
        if t.detached {
            return Err(());
        }
        let exitval = t.exitval;
        let last = t.refcount == 0;
        if last {
            p.threads.retain(|t| t.tid != tid);
        }
        Ok(exitval)
    }

    pub(crate) fn thread_detach(&self, tid: Tid) -> Result<(), ()> {
        let mut k = self.kernel().lock();
        let t = some_or!(k.procs.get_mut(self.pid()).ptcb_mut(tid), return Err(()));
        if t.exited {
            return Err(());
        }
        t.detached = true;
        // Joiners wake up and observe the new state.
        t.exit_cv.wakeup();
        Ok(())
    }

    /// Thread-exit bookkeeping. When this is the last live thread, the whole
    /// process is finalized too.
    pub(crate) fn do_thread_exit(&self, exitval: i32) {
        let mut k = self.kernel().lock();
        {
            let p = k.procs.get_mut(self.pid());
            let t = some_or!(
                p.ptcb_mut(self.tid()),
                panic!("exiting thread without a PTCB")
            );
            t.exitval = exitval;
            t.exited = true;
            if t.refcount > 0 {
                t.exit_cv.wakeup();
            }
            p.thread_count -= 1;
        }
        if k.procs.get(self.pid()).thread_count == 0 {
            k.exit_process(self.pid());
        }
    }
}
