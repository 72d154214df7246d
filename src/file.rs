//! Support for file descriptors and the kernel file table.

use array_macro::array;
use arrayvec::ArrayVec;
use itertools::izip;

use crate::kernel::KernelInner;
use crate::param::NFILE;
use crate::pipe::PipeId;
use crate::proc::Pid;
use crate::socket::SockId;
use crate::some_or;

/// Per-process file descriptor.
pub type Fid = usize;

/// Index of an open file in the kernel file table.
pub(crate) type FcbId = usize;

/// One open stream: a typed stream object plus the direction this
/// descriptor may use. A pipe's two descriptors share one stream object but
/// carry opposite directions, so the wrong-direction operation is refused by
/// dispatch before the stream is ever consulted.
pub(crate) struct File {
    pub typ: FileType,
    readable: bool,
    writable: bool,

    /// Number of descriptor-table slots, across all processes, that refer to
    /// this entry.
    refcount: usize,
}

#[derive(Clone, Copy)]
pub(crate) enum FileType {
    None,
    Pipe { pipe: PipeId },
    Socket { sock: SockId },
}

impl File {
    pub(crate) fn new(typ: FileType, readable: bool, writable: bool) -> Self {
        Self {
            typ,
            readable,
            writable,
            refcount: 1,
        }
    }

    pub(crate) fn readable(&self) -> bool {
        self.readable
    }

    pub(crate) fn writable(&self) -> bool {
        self.writable
    }
}

pub(crate) struct FileTable {
    files: [Option<File>; NFILE],
}

impl FileTable {
    pub(crate) fn new() -> Self {
        Self {
            files: array![_ => None; NFILE],
        }
    }

    /// Allocates the lowest free slot. The new entry starts with one
    /// reference, owned by the caller.
    fn alloc(&mut self, file: File) -> Option<FcbId> {
        let fcb = self.files.iter().position(|f| f.is_none())?;
        self.files[fcb] = Some(file);
        Some(fcb)
    }

    fn free_slots(&self) -> usize {
        self.files.iter().filter(|f| f.is_none()).count()
    }

    pub(crate) fn get(&self, fcb: FcbId) -> Option<&File> {
        self.files.get(fcb)?.as_ref()
    }

    /// Fills in the stream object of a just-reserved entry.
    pub(crate) fn install(&mut self, fcb: FcbId, typ: FileType) {
        some_or!(self.files[fcb].as_mut(), panic!("install on a free file")).typ = typ;
    }

    pub(crate) fn incref(&mut self, fcb: FcbId) {
        some_or!(self.files[fcb].as_mut(), panic!("FCB_incref on a free file")).refcount += 1;
    }
}

impl KernelInner {
    /// Binds fresh file-table entries to the lowest free descriptor slots of
    /// process `pid`, one per `(readable, writable)` mode. All or nothing:
    /// either every entry is reserved or the tables are untouched.
    pub(crate) fn fcb_reserve(
        &mut self,
        pid: Pid,
        modes: &[(bool, bool)],
    ) -> Option<ArrayVec<(Fid, FcbId), 2>> {
        let mut fids = ArrayVec::<Fid, 2>::new();
        for (fid, slot) in self.procs.get(pid).open_files.iter().enumerate() {
            if slot.is_none() {
                fids.push(fid);
                if fids.len() == modes.len() {
                    break;
                }
            }
        }
        if fids.len() < modes.len() || self.ftable.free_slots() < modes.len() {
            return None;
        }

        let mut out = ArrayVec::new();
        for (&fid, &(readable, writable)) in izip!(fids.iter(), modes.iter()) {
            let file = File::new(FileType::None, readable, writable);
            let fcb = some_or!(self.ftable.alloc(file), panic!("file table out of slots"));
            self.procs.get_mut(pid).open_files[fid] = Some(fcb);
            out.push((fid, fcb));
        }
        Some(out)
    }

    /// Looks up descriptor `fid` of process `pid`.
    pub(crate) fn fcb_of(&self, pid: Pid, fid: Fid) -> Option<(FcbId, &File)> {
        let fcb = (*self.procs.get(pid).open_files.get(fid)?)?;
        Some((fcb, self.ftable.get(fcb)?))
    }

    /// Drops one reference to `fcb`. When the count reaches zero the entry is
    /// released and the stream's close runs, exactly once.
    pub(crate) fn fcb_decref(&mut self, fcb: FcbId) {
        let file = some_or!(
            self.ftable.files[fcb].as_mut(),
            panic!("FCB_decref on a free file")
        );
        file.refcount -= 1;
        if file.refcount > 0 {
            return;
        }
        let (typ, writable) = (file.typ, file.writable);
        self.ftable.files[fcb] = None;
        match typ {
            FileType::None => {}
            FileType::Pipe { pipe } => self.pipes.close_end(pipe, writable),
            FileType::Socket { sock } => self.sock_close(sock),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param::NOFILE;

    #[test]
    fn reserve_binds_lowest_descriptors() {
        let mut k = KernelInner::new();
        let pair = k.fcb_reserve(0, &[(true, false), (false, true)]).unwrap();
        assert_eq!(pair[0].0, 0);
        assert_eq!(pair[1].0, 1);

        let one = k.fcb_reserve(0, &[(true, true)]).unwrap();
        assert_eq!(one[0].0, 2);
    }

    #[test]
    fn reserve_skips_occupied_descriptors() {
        let mut k = KernelInner::new();
        let pair = k.fcb_reserve(0, &[(true, true), (true, true)]).unwrap();
        let fid0 = pair[0].0;

        // Free the lower slot; the next reservation must reuse it first.
        let fcb = k.procs.get_mut(0).open_files[fid0].take().unwrap();
        k.fcb_decref(fcb);
        let one = k.fcb_reserve(0, &[(true, true)]).unwrap();
        assert_eq!(one[0].0, fid0);
    }

    #[test]
    fn reserve_fails_when_descriptors_run_out() {
        let mut k = KernelInner::new();
        for _ in 0..NOFILE {
            assert!(k.fcb_reserve(0, &[(true, true)]).is_some());
        }
        assert!(k.fcb_reserve(0, &[(true, true)]).is_none());
    }

    #[test]
    fn decref_releases_the_entry() {
        let mut k = KernelInner::new();
        let one = k.fcb_reserve(0, &[(true, true)]).unwrap();
        let (_fid, fcb) = one[0];
        // Two references: the reservation plus an inherited copy.
        k.ftable.incref(fcb);
        k.fcb_decref(fcb);
        assert!(k.ftable.get(fcb).is_some());
        k.fcb_decref(fcb);
        assert!(k.ftable.get(fcb).is_none());
    }
}
