//! System calls on file descriptors.

use std::time::Duration;

use crate::file::{Fid, FileType};
use crate::pipe::PipeError;
use crate::proc::kernel_ctx;
use crate::socket::{Port, Shutdown};
use crate::some_or;

/// Creates a pipe and returns its `(read, write)` descriptor pair.
pub fn pipe() -> Result<(Fid, Fid), ()> {
    let ctx = kernel_ctx();
    let pid = ctx.pid();
    let mut k = ctx.kernel().lock();
    k.pipe(pid)
}

/// Reads up to `buf.len()` bytes from `fid` into `buf`. Blocks while there
/// is nothing to read and the other side may still deliver. Returns the
/// number of bytes transferred; `Ok(0)` is end of stream.
pub fn read(fid: Fid, buf: &mut [u8]) -> Result<usize, ()> {
    let ctx = kernel_ctx();
    let mut k = ctx.kernel().lock();
    loop {
        // Re-resolve after every sleep: the descriptor or the stream behind
        // it may have been closed while we slept.
        let (typ, readable) = {
            let (_, file) = some_or!(k.fcb_of(ctx.pid(), fid), return Err(()));
            (file.typ, file.readable())
        };
        if !readable {
            return Err(());
        }
        let pipe = match typ {
            FileType::Pipe { pipe } => pipe,
            FileType::Socket { sock } => some_or!(k.sockets.read_pipe(sock), return Err(())),
            FileType::None => return Err(()),
        };
        match k.pipes.get_mut(pipe).try_read(buf) {
            Ok(n) => {
                k.pipes.get(pipe).write_waitchannel.wakeup();
                return Ok(n);
            }
            Err(PipeError::WaitForIo) => {
                let ch = k.pipes.get(pipe).read_waitchannel.clone();
                k = ch.sleep(k);
            }
            Err(PipeError::Closed) => return Err(()),
        }
    }
}

/// Writes up to `buf.len()` bytes from `buf` to `fid`. Blocks while the
/// stream is full and the reader may still drain it; a short count is
/// returned when only part of `buf` fits in one go.
pub fn write(fid: Fid, buf: &[u8]) -> Result<usize, ()> {
    let ctx = kernel_ctx();
    let mut k = ctx.kernel().lock();
    loop {
        let (typ, writable) = {
            let (_, file) = some_or!(k.fcb_of(ctx.pid(), fid), return Err(()));
            (file.typ, file.writable())
        };
        if !writable {
            return Err(());
        }
        let pipe = match typ {
            FileType::Pipe { pipe } => pipe,
            FileType::Socket { sock } => some_or!(k.sockets.write_pipe(sock), return Err(())),
            FileType::None => return Err(()),
        };
        match k.pipes.get_mut(pipe).try_write(buf) {
            Ok(n) => {
                k.pipes.get(pipe).read_waitchannel.wakeup();
                return Ok(n);
            }
            Err(PipeError::WaitForIo) => {
                let ch = k.pipes.get(pipe).write_waitchannel.clone();
                k = ch.sleep(k);
            }
            Err(PipeError::Closed) => return Err(()),
        }
    }
}

/// Releases descriptor `fid`. The stream behind it is closed when its last
/// reference, in any process, goes away.
pub fn close(fid: Fid) -> Result<(), ()> {
    let ctx = kernel_ctx();
    let mut k = ctx.kernel().lock();
    let fcb = some_or!(
        k.procs
            .get_mut(ctx.pid())
            .open_files
            .get_mut(fid)
            .and_then(Option::take),
        return Err(())
    );
    k.fcb_decref(fcb);
    Ok(())
}

/// Allocates an unbound socket on `port` (or `NOPORT` for none yet).
pub fn socket(port: Port) -> Result<Fid, ()> {
    kernel_ctx().socket(port)
}

/// Turns an unbound socket into the listener for its port.
pub fn listen(fid: Fid) -> Result<(), ()> {
    kernel_ctx().listen(fid)
}

/// Accepts one queued connection on a listener; blocks until a connection
/// request arrives or the listener is closed. Returns the descriptor of the
/// new peer socket.
pub fn accept(fid: Fid) -> Result<Fid, ()> {
    kernel_ctx().accept(fid)
}

/// Connects an unbound socket to the listener on `port`, waiting at most
/// `timeout` to be admitted.
pub fn connect(fid: Fid, port: Port, timeout: Duration) -> Result<(), ()> {
    kernel_ctx().connect(fid, port, timeout)
}

/// Tears down one or both directions of a peer socket.
pub fn shut_down(fid: Fid, how: Shutdown) -> Result<(), ()> {
    kernel_ctx().shut_down(fid, how)
}
