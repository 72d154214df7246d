use std::mem;
use std::sync::Arc;

use itertools::izip;

use crate::kernel::{Kernel, KernelInner};
use crate::param::{NOFILE, NPROC};
use crate::proc::{spawn_kernel_thread, KernelCtx, Pid, Proc, Procstate, Task};
use crate::some_or;

/// The process table: a fixed pool of PCBs plus a free-list of their
/// indices. Pids are pool offsets; the free-list starts in ascending order
/// so the first two allocations are pid 0 (idle) and pid 1 (init).
pub struct Procs {
    pool: Vec<Proc>,
    freelist: Vec<Pid>,
}

impl Procs {
    pub(crate) fn new() -> Self {
        Self {
            pool: (0..NPROC).map(|_| Proc::new()).collect(),
            freelist: (0..NPROC).rev().collect(),
        }
    }

    pub(crate) fn get(&self, pid: Pid) -> &Proc {
        &self.pool[pid]
    }

    pub(crate) fn get_mut(&mut self, pid: Pid) -> &mut Proc {
        &mut self.pool[pid]
    }

    /// Looks up a live (ALIVE or ZOMBIE) process.
    pub(crate) fn get_live(&self, pid: Pid) -> Option<&Proc> {
        let p = self.pool.get(pid)?;
        if p.pstate == Procstate::FREE {
            None
        } else {
            Some(p)
        }
    }

    fn acquire(&mut self) -> Option<Pid> {
        let pid = self.freelist.pop()?;
        self.pool[pid].pstate = Procstate::ALIVE;
        Some(pid)
    }

    fn release(&mut self, pid: Pid) {
        self.pool[pid] = Proc::new();
        self.freelist.push(pid);
    }
}

impl KernelInner {
    /// Creates a new process running `task` (no thread at all when `task` is
    /// `None`, which only the idle process uses). Pids 0 and 1 are
    /// parentless; everyone else becomes a child of `parent` and inherits
    /// its descriptor table.
    pub(crate) fn exec(
        &mut self,
        kernel: &Arc<Kernel>,
        parent: Option<Pid>,
        task: Option<Task>,
        args: &[u8],
    ) -> Result<Pid, ()> {
        let pid = some_or!(self.procs.acquire(), return Err(()));

        if pid > 1 {
            let parent = some_or!(parent, panic!("process {} without a parent", pid));
            self.procs.get_mut(pid).parent = Some(parent);
            self.procs.get_mut(parent).children.push_front(pid);

            // Inherit the parent's open files.
            let inherited = self.procs.get(parent).open_files;
            for (slot, f) in izip!(
                self.procs.get_mut(pid).open_files.iter_mut(),
                inherited.iter()
            ) {
                if let Some(fcb) = *f {
                    *slot = Some(fcb);
                    self.ftable.incref(fcb);
                }
            }
        }

        let p = self.procs.get_mut(pid);
        p.main_task = task;
        if !args.is_empty() {
            p.args = Some(args.to_vec().into_boxed_slice());
        }

        // Spawning must come last: once the main thread exists it may run as
        // soon as the kernel mutex is released.
        if let Some(task) = task {
            let tid = p.alloc_ptcb(task, args);
            p.main_thread = Some(tid);
            p.thread_count += 1;
            spawn_kernel_thread(kernel, pid, tid);
        }

        Ok(pid)
    }

    /// Reaps a zombie child: hands back its exit value, unlinks it from its
    /// parent's lists and returns the PCB to the free-list.
    pub(crate) fn cleanup_zombie(&mut self, cpid: Pid) -> i32 {
        assert_eq!(
            self.procs.get(cpid).pstate,
            Procstate::ZOMBIE,
            "reaping a non-zombie"
        );
        let parent = some_or!(
            self.procs.get(cpid).parent,
            panic!("zombie without a parent")
        );
        let status = self.procs.get(cpid).exitval;
        let par = self.procs.get_mut(parent);
        par.children.retain(|&c| c != cpid);
        par.exited_children.retain(|&c| c != cpid);
        self.procs.release(cpid);
        status
    }

    /// Last-thread finalization: reparent children to init, hand over
    /// zombies, notify the parent, release per-process resources and turn
    /// the PCB into a zombie.
    pub(crate) fn exit_process(&mut self, pid: Pid) {
        // Give any children to init.
        let children = mem::take(&mut self.procs.get_mut(pid).children);
        for &child in &children {
            self.procs.get_mut(child).parent = Some(1);
        }
        self.procs.get_mut(1).children.extend(children);

        // Hand over already-exited children; init may be waiting on them.
        let zombies = mem::take(&mut self.procs.get_mut(pid).exited_children);
        if !zombies.is_empty() {
            self.procs.get_mut(1).exited_children.extend(zombies);
            self.procs.get(1).child_exit.wakeup();
        }

        // Park this process on its parent's exited list.
        if pid != 1 {
            let parent = some_or!(
                self.procs.get(pid).parent,
                panic!("exiting process without a parent")
            );
            self.procs.get_mut(parent).exited_children.push_front(pid);
            self.procs.get(parent).child_exit.wakeup();
        }

        let p = self.procs.get_mut(pid);
        assert!(p.children.is_empty() && p.exited_children.is_empty());

        // Free the remaining PTCBs and the argument buffer.
        p.threads.clear();
        p.args = None;
        p.main_thread = None;

        let open_files = mem::replace(&mut p.open_files, [None; NOFILE]);
        p.pstate = Procstate::ZOMBIE;
        for fcb in open_files.iter().filter_map(|f| *f) {
            self.fcb_decref(fcb);
        }

        // Init going zombie is the shutdown signal.
        if pid == 1 {
            self.shutdown.wakeup();
        }
    }
}

impl KernelCtx {
    pub(crate) fn wait_child(&self, cpid: Option<Pid>) -> Result<(Pid, i32), ()> {
        match cpid {
            Some(cpid) => self.wait_for_specific_child(cpid),
            None => self.wait_for_any_child(),
        }
    }

    fn wait_for_specific_child(&self, cpid: Pid) -> Result<(Pid, i32), ()> {
        let mut k = self.kernel().lock();
        loop {
            let child = some_or!(k.procs.get_live(cpid), return Err(()));
            if child.parent != Some(self.pid()) {
                return Err(());
            }
            if child.pstate != Procstate::ALIVE {
                break;
            }
            let ch = k.procs.get(self.pid()).child_exit.clone();
            k = ch.sleep(k);
        }
        let status = k.cleanup_zombie(cpid);
        Ok((cpid, status))
    }

    fn wait_for_any_child(&self) -> Result<(Pid, i32), ()> {
        let mut k = self.kernel().lock();
        loop {
            let p = k.procs.get(self.pid());
            if !p.exited_children.is_empty() {
                break;
            }
            if p.children.is_empty() {
                return Err(());
            }
            let ch = p.child_exit.clone();
            k = ch.sleep(k);
        }
        let cpid = *some_or!(
            k.procs.get(self.pid()).exited_children.front(),
            panic!("empty exited list")
        );
        let status = k.cleanup_zombie(cpid);
        Ok((cpid, status))
    }

    pub(crate) fn do_exit(&self, exitval: i32) {
        {
            let mut k = self.kernel().lock();
            k.procs.get_mut(self.pid()).exitval = exitval;
        }
        // Init must outlive every other process: drain the tree first.
        if self.pid() == 1 {
            while self.wait_child(None).is_ok() {}
        }
        self.do_thread_exit(exitval);
    }
}
