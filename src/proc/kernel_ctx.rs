use std::cell::RefCell;
use std::sync::Arc;

use crate::kernel::Kernel;
use crate::proc::{Pid, Tid};
use crate::some_or;

thread_local! {
    static CURRENT: RefCell<Option<KernelCtx>> = RefCell::new(None);
}

/// The calling thread's identity inside its kernel: which kernel, which
/// process, which thread. Installed by the thread trampoline before any user
/// code runs.
#[derive(Clone)]
pub(crate) struct KernelCtx {
    kernel: Arc<Kernel>,
    pid: Pid,
    tid: Tid,
}

impl KernelCtx {
    /// Binds the calling thread to `(pid, tid)` of `kernel`.
    pub(crate) fn install(kernel: Arc<Kernel>, pid: Pid, tid: Tid) -> Self {
        let ctx = Self { kernel, pid, tid };
        CURRENT.with(|c| *c.borrow_mut() = Some(ctx.clone()));
        ctx
    }

    pub(crate) fn kernel(&self) -> &Arc<Kernel> {
        &self.kernel
    }

    pub(crate) fn pid(&self) -> Pid {
        self.pid
    }

    pub(crate) fn tid(&self) -> Tid {
        self.tid
    }
}

/// Returns the calling thread's kernel context.
///
/// Panics when called from a thread that is not running kernel code: system
/// calls may only be made from tasks started through `exec` or
/// `create_thread`.
pub(crate) fn kernel_ctx() -> KernelCtx {
    CURRENT.with(|c| {
        some_or!(
            c.borrow().clone(),
            panic!("system call outside kernel context")
        )
    })
}
