//! In-kernel stream sockets: a port table, a listen/accept/connect
//! handshake, and full-duplex connections carried by a pair of pipes.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use bitflags::bitflags;

use crate::file::{Fid, FileType};
use crate::kernel::KernelInner;
use crate::param::NPORT;
use crate::pipe::PipeId;
use crate::proc::{KernelCtx, Pid, WaitChannel};
use crate::some_or;

/// Socket port number. Port 0 (`NOPORT`) means "not bound".
pub type Port = usize;

pub const NOPORT: Port = 0;

pub(crate) type SockId = usize;
type ReqId = usize;

bitflags! {
    /// Directions torn down by `shut_down`.
    pub struct Shutdown: u32 {
        const READ = 0x1;
        const WRITE = 0x2;
        const BOTH = Self::READ.bits | Self::WRITE.bits;
    }
}

/// One socket. The record can outlive its descriptor: an in-flight `accept`
/// or `connect` keeps it referenced across sleeps, and the slot is recycled
/// only once `closed` is set and the last reference drains.
pub(crate) struct Socket {
    refcount: usize,
    port: Port,
    closed: bool,
    pub typ: SocketType,
}

pub(crate) enum SocketType {
    Unbound,
    Listener {
        /// Pending connection requests, oldest first.
        queue: VecDeque<ReqId>,
        req_available: WaitChannel,
    },
    Peer {
        /// Back-pointer to the other side; cleared when the peer closes.
        peer: Option<SockId>,
        read_pipe: Option<PipeId>,
        write_pipe: Option<PipeId>,
    },
}

/// A connector's ticket in a listener's queue. Owned by the connecting
/// thread; the queue only borrows the id, so a listener that dies with
/// tickets still queued leaks nothing.
struct Request {
    admitted: bool,
    /// The socket that asked for the connection.
    peer: SockId,
    connected_cv: WaitChannel,
}

pub(crate) struct SocketTable {
    sockets: Vec<Option<Socket>>,
    freelist: Vec<SockId>,
    requests: Vec<Option<Request>>,
    free_requests: Vec<ReqId>,
    /// `ports[p]` is the listener bound to port p, if any.
    ports: [Option<SockId>; NPORT + 1],
}

impl SocketTable {
    pub(crate) fn new() -> Self {
        Self {
            sockets: Vec::new(),
            freelist: Vec::new(),
            requests: Vec::new(),
            free_requests: Vec::new(),
            ports: [None; NPORT + 1],
        }
    }

    fn alloc(&mut self, sock: Socket) -> SockId {
        match self.freelist.pop() {
            Some(id) => {
                self.sockets[id] = Some(sock);
                id
            }
            None => {
                self.sockets.push(Some(sock));
                self.sockets.len() - 1
            }
        }
    }

    fn free(&mut self, id: SockId) {
        self.sockets[id] = None;
        self.freelist.push(id);
    }

    pub(crate) fn get(&self, id: SockId) -> &Socket {
        some_or!(self.sockets[id].as_ref(), panic!("no such socket"))
    }

    pub(crate) fn get_mut(&mut self, id: SockId) -> &mut Socket {
        some_or!(self.sockets[id].as_mut(), panic!("no such socket"))
    }

    fn get_opt(&self, id: SockId) -> Option<&Socket> {
        self.sockets.get(id)?.as_ref()
    }

    fn get_opt_mut(&mut self, id: SockId) -> Option<&mut Socket> {
        self.sockets.get_mut(id)?.as_mut()
    }

    pub(crate) fn port(&self, port: Port) -> Option<SockId> {
        self.ports[port]
    }

    fn set_port(&mut self, port: Port, sock: Option<SockId>) {
        self.ports[port] = sock;
    }

    /// The pipe a peer socket reads from, when that direction is still up.
    pub(crate) fn read_pipe(&self, id: SockId) -> Option<PipeId> {
        match self.get(id).typ {
            SocketType::Peer { read_pipe, .. } => read_pipe,
            _ => None,
        }
    }

    /// The pipe a peer socket writes to, when that direction is still up.
    pub(crate) fn write_pipe(&self, id: SockId) -> Option<PipeId> {
        match self.get(id).typ {
            SocketType::Peer { write_pipe, .. } => write_pipe,
            _ => None,
        }
    }

    fn alloc_request(&mut self, peer: SockId) -> ReqId {
        let req = Request {
            admitted: false,
            peer,
            connected_cv: WaitChannel::new(),
        };
        match self.free_requests.pop() {
            Some(id) => {
                self.requests[id] = Some(req);
                id
            }
            None => {
                self.requests.push(Some(req));
                self.requests.len() - 1
            }
        }
    }

    fn request(&self, id: ReqId) -> &Request {
        some_or!(self.requests[id].as_ref(), panic!("no such request"))
    }

    fn request_mut(&mut self, id: ReqId) -> &mut Request {
        some_or!(self.requests[id].as_mut(), panic!("no such request"))
    }

    fn free_request(&mut self, id: ReqId) {
        self.requests[id] = None;
        self.free_requests.push(id);
    }
}

impl KernelInner {
    /// Reserves a descriptor for `pid` and allocates an UNBOUND socket
    /// behind it.
    pub(crate) fn sock_alloc(&mut self, pid: Pid, port: Port) -> Result<(Fid, SockId), ()> {
        let fids = some_or!(self.fcb_reserve(pid, &[(true, true)]), return Err(()));
        let (fid, fcb) = fids[0];
        let sock = self.sockets.alloc(Socket {
            refcount: 0,
            port,
            closed: false,
            typ: SocketType::Unbound,
        });
        self.ftable.install(fcb, FileType::Socket { sock });
        Ok((fid, sock))
    }

    /// Resolves descriptor `fid` of `pid` to a socket.
    pub(crate) fn sock_of(&self, pid: Pid, fid: Fid) -> Option<SockId> {
        match self.fcb_of(pid, fid)?.1.typ {
            FileType::Socket { sock } => Some(sock),
            _ => None,
        }
    }

    /// Stream close for sockets, run when the owning descriptor goes away.
    pub(crate) fn sock_close(&mut self, id: SockId) {
        enum Side {
            Unbound,
            Listener(WaitChannel),
            Peer {
                peer: Option<SockId>,
                read_pipe: Option<PipeId>,
                write_pipe: Option<PipeId>,
            },
        }

        let (port, side) = {
            let s = self.sockets.get_mut(id);
            s.closed = true;
            let side = match &mut s.typ {
                SocketType::Unbound => Side::Unbound,
                SocketType::Listener { req_available, .. } => {
                    Side::Listener(req_available.clone())
                }
                SocketType::Peer {
                    peer,
                    read_pipe,
                    write_pipe,
                } => Side::Peer {
                    peer: peer.take(),
                    read_pipe: read_pipe.take(),
                    write_pipe: write_pipe.take(),
                },
            };
            (s.port, side)
        };

        match side {
            Side::Unbound => {}
            Side::Listener(req_available) => {
                if self.sockets.port(port) == Some(id) {
                    self.sockets.set_port(port, None);
                }
                // Blocked accepts wake up and observe the deleted port entry.
                req_available.wakeup();
            }
            Side::Peer {
                peer,
                read_pipe,
                write_pipe,
            } => {
                if let Some(p) = read_pipe {
                    self.pipes.close_end(p, false);
                }
                if let Some(p) = write_pipe {
                    self.pipes.close_end(p, true);
                }
                // Break the peer cycle; the other side keeps running against
                // half-closed pipes.
                if let Some(peer) = peer {
                    if let Some(ps) = self.sockets.get_opt_mut(peer) {
                        if let SocketType::Peer { peer: back, .. } = &mut ps.typ {
                            *back = None;
                        }
                    }
                }
            }
        }

        if self.sockets.get(id).refcount == 0 {
            self.sockets.free(id);
        }
    }

    /// Drops a reference taken by an in-flight accept or connect.
    fn sock_decref(&mut self, id: SockId) {
        let s = self.sockets.get_mut(id);
        s.refcount -= 1;
        if s.refcount == 0 && s.closed {
            self.sockets.free(id);
        }
    }
}

impl KernelCtx {
    pub(crate) fn socket(&self, port: Port) -> Result<Fid, ()> {
        if port > NPORT {
            return Err(());
        }
        let mut k = self.kernel().lock();
        let (fid, _) = k.sock_alloc(self.pid(), port)?;
        Ok(fid)
    }

    pub(crate) fn listen(&self, fid: Fid) -> Result<(), ()> {
        let mut k = self.kernel().lock();
        let sock = some_or!(k.sock_of(self.pid(), fid), return Err(()));
        let port = {
            let s = k.sockets.get(sock);
            match s.typ {
                SocketType::Unbound => {}
                _ => return Err(()),
            }
            if s.port == NOPORT {
                return Err(());
            }
            s.port
        };
        if k.sockets.port(port).is_some() {
            return Err(());
        }
        k.sockets.get_mut(sock).typ = SocketType::Listener {
            queue: VecDeque::new(),
            req_available: WaitChannel::new(),
        };
        k.sockets.set_port(port, Some(sock));
        Ok(())
    }

    pub(crate) fn connect(&self, fid: Fid, port: Port, timeout: Duration) -> Result<(), ()> {
        if port == NOPORT || port > NPORT {
            return Err(());
        }
        let mut k = self.kernel().lock();
        let sock = some_or!(k.sock_of(self.pid(), fid), return Err(()));
        match k.sockets.get(sock).typ {
            SocketType::Unbound => {}
            _ => return Err(()),
        }
        let listener = some_or!(k.sockets.port(port), return Err(()));

        // Queue a ticket and tell the listener.
        let req = k.sockets.alloc_request(sock);
        match &mut k.sockets.get_mut(listener).typ {
            SocketType::Listener {
                queue,
                req_available,
            } => {
                queue.push_back(req);
                req_available.wakeup_one();
            }
            _ => panic!("port map entry is not a listener"),
        }
        k.sockets.get_mut(sock).refcount += 1;

        let cv = k.sockets.request(req).connected_cv.clone();
        let deadline = Instant::now() + timeout;
        loop {
            if k.sockets.request(req).admitted {
                break;
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let (guard, _) = cv.sleep_timeout(k, deadline - now);
            k = guard;
        }
        let admitted = k.sockets.request(req).admitted;

        // Pull the ticket back out of the queue; a no-op when the listener
        // already took it, or is gone.
        if let Some(l) = k.sockets.get_opt_mut(listener) {
            if let SocketType::Listener { queue, .. } = &mut l.typ {
                queue.retain(|&r| r != req);
            }
        }
        k.sockets.free_request(req);
        k.sock_decref(sock);

        if admitted {
            Ok(())
        } else {
            Err(())
        }
    }

    pub(crate) fn accept(&self, lfid: Fid) -> Result<Fid, ()> {
        let mut k = self.kernel().lock();
        let listener = some_or!(k.sock_of(self.pid(), lfid), return Err(()));
        let port = {
            let s = k.sockets.get(listener);
            match s.typ {
                SocketType::Listener { .. } => {}
                _ => return Err(()),
            }
            s.port
        };
        if k.sockets.port(port) != Some(listener) {
            return Err(());
        }
        // The peer's descriptor needs a slot; check before committing to the
        // wait.
        if !k
            .procs
            .get(self.pid())
            .open_files
            .iter()
            .any(|f| f.is_none())
        {
            return Err(());
        }

        // Hold the listener across the wait.
        k.sockets.get_mut(listener).refcount += 1;

        loop {
            if k.sockets.port(port) != Some(listener) {
                break;
            }
            let (empty, ch) = match &k.sockets.get(listener).typ {
                SocketType::Listener {
                    queue,
                    req_available,
                } => (queue.is_empty(), req_available.clone()),
                _ => panic!("listener changed type"),
            };
            if !empty {
                break;
            }
            k = ch.sleep(k);
        }

        // The listener may have been closed while we slept.
        if k.sockets.port(port) != Some(listener) {
            k.sock_decref(listener);
            return Err(());
        }

        let req = match &mut k.sockets.get_mut(listener).typ {
            SocketType::Listener { queue, .. } => {
                some_or!(queue.pop_front(), panic!("woke to an empty queue"))
            }
            _ => panic!("listener changed type"),
        };

        // The connector must still be an open, unbound socket.
        let client = k.sockets.request(req).peer;
        let client_port = match k.sockets.get_opt(client) {
            Some(c) if !c.closed && matches!(c.typ, SocketType::Unbound) => c.port,
            _ => {
                k.sock_decref(listener);
                return Err(());
            }
        };

        // Our side of the connection.
        let (peer_fid, peer) = match k.sock_alloc(self.pid(), client_port) {
            Ok(pair) => pair,
            Err(()) => {
                k.sock_decref(listener);
                return Err(());
            }
        };

        // Two pipes, crossed: what one side writes the other reads.
        let p1 = k.pipes.alloc();
        let p2 = k.pipes.alloc();
        k.sockets.get_mut(client).typ = SocketType::Peer {
            peer: Some(peer),
            read_pipe: Some(p2),
            write_pipe: Some(p1),
        };
        k.sockets.get_mut(peer).typ = SocketType::Peer {
            peer: Some(client),
            read_pipe: Some(p1),
            write_pipe: Some(p2),
        };

        let r = k.sockets.request_mut(req);
        r.admitted = true;
        r.connected_cv.wakeup_one();

        k.sock_decref(listener);
        Ok(peer_fid)
    }

    pub(crate) fn shut_down(&self, fid: Fid, how: Shutdown) -> Result<(), ()> {
        if how.is_empty() {
            return Err(());
        }
        let mut k = self.kernel().lock();
        let sock = some_or!(k.sock_of(self.pid(), fid), return Err(()));
        let (read_end, write_end) = match &mut k.sockets.get_mut(sock).typ {
            SocketType::Peer {
                read_pipe,
                write_pipe,
                ..
            } => (
                if how.contains(Shutdown::READ) {
                    Some(read_pipe.take())
                } else {
                    None
                },
                if how.contains(Shutdown::WRITE) {
                    Some(write_pipe.take())
                } else {
                    None
                },
            ),
            _ => return Err(()),
        };

        let mut ok = true;
        match read_end {
            Some(Some(p)) => k.pipes.close_end(p, false),
            Some(None) => ok = false,
            None => {}
        }
        match write_end {
            Some(Some(p)) => k.pipes.close_end(p, true),
            Some(None) => ok = false,
            None => {}
        }
        if ok {
            Ok(())
        } else {
            Err(())
        }
    }
}
