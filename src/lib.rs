//! Concurrency and IPC core of a small cooperative teaching kernel:
//! processes, threads within a process, anonymous pipes and in-kernel
//! stream sockets, sharing one set of sleep/wakeup primitives and one
//! stream abstraction.
//!
//! The whole kernel runs behind a single mutex. A system call either runs
//! to completion with the mutex held or parks on a wait channel (releasing
//! the mutex atomically) until the condition it needs becomes true, so
//! kernel state is never seen half-updated. Kernel threads are plain host
//! threads; the mutex makes them cooperate.
//!
//! A kernel comes to life with [`boot`], which starts the idle process
//! (pid 0) and runs `task` as the init process (pid 1):
//!
//! ```
//! use tos_kernel::{boot, exec, pipe, read, wait_child, write, close};
//!
//! fn child(args: &[u8]) -> i32 {
//!     let mut buf = [0; 2];
//!     read(args[0] as usize, &mut buf).unwrap() as i32
//! }
//!
//! fn main_task(_: &[u8]) -> i32 {
//!     let (r, w) = pipe().unwrap();
//!     let pid = exec(child, &[r as u8]).unwrap();
//!     write(w, b"hi").unwrap();
//!     close(w).unwrap();
//!     let (_, status) = wait_child(Some(pid)).unwrap();
//!     status
//! }
//!
//! assert_eq!(boot(main_task, &[]), 2);
//! ```

#![warn(rust_2018_idioms)]

mod file;
mod kernel;
mod param;
mod pipe;
mod printf;
mod proc;
mod socket;
mod sysfile;
mod sysproc;
mod utils;

pub use crate::file::Fid;
pub use crate::kernel::boot;
pub use crate::param::{NFILE, NOFILE, NPORT, NPROC};
pub use crate::pipe::PIPESIZE;
pub use crate::proc::{Pid, Task, Tid};
pub use crate::socket::{Port, Shutdown, NOPORT};
pub use crate::sysfile::{
    accept, close, connect, listen, pipe, read, shut_down, socket, write,
};
pub use crate::sysproc::{
    create_thread, exec, exit, get_pid, get_ppid, thread_detach, thread_exit, thread_join,
    thread_self, wait_child,
};
