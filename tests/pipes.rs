//! Pipe behavior, end to end: one kernel per test.

use tos_kernel::{
    boot, close, create_thread, exec, pipe, read, thread_join, wait_child, write, Fid, PIPESIZE,
};

const MSG: &[u8] = b"hello, world!";

fn echo_child(args: &[u8]) -> i32 {
    let r = args[0] as Fid;
    let w = args[1] as Fid;
    // Drop the inherited write end, or this reader would never see EOF.
    close(w).unwrap();
    let mut buf = [0; 64];
    let n = read(r, &mut buf).unwrap();
    assert_eq!(n, MSG.len());
    assert_eq!(read(r, &mut buf).unwrap(), 0);
    buf[..n].iter().map(|&b| i32::from(b)).sum()
}

fn echo_main(_: &[u8]) -> i32 {
    let (r, w) = pipe().unwrap();
    let pid = exec(echo_child, &[r as u8, w as u8]).unwrap();
    assert_eq!(write(w, MSG).unwrap(), MSG.len());
    close(w).unwrap();
    close(r).unwrap();
    let (reaped, status) = wait_child(Some(pid)).unwrap();
    assert_eq!(reaped, pid);
    assert_eq!(status, MSG.iter().map(|&b| i32::from(b)).sum::<i32>());
    0
}

#[test]
fn pipe_echo_across_processes() {
    assert_eq!(boot(echo_main, &[]), 0);
}

fn eof_main(_: &[u8]) -> i32 {
    let (r, w) = pipe().unwrap();
    let payload: Vec<u8> = (0..100).collect();
    assert_eq!(write(w, &payload).unwrap(), payload.len());
    close(w).unwrap();

    let mut buf = [0; 200];
    assert_eq!(read(r, &mut buf).unwrap(), payload.len());
    assert_eq!(&buf[..payload.len()], &payload[..]);
    // End of stream, and it stays that way.
    assert_eq!(read(r, &mut buf).unwrap(), 0);
    assert_eq!(read(r, &mut buf).unwrap(), 0);
    close(r).unwrap();
    0
}

#[test]
fn written_bytes_then_eof() {
    assert_eq!(boot(eof_main, &[]), 0);
}

fn direction_main(_: &[u8]) -> i32 {
    let (r, w) = pipe().unwrap();
    // The wrong direction is refused by the descriptor itself.
    assert!(write(r, b"x").is_err());
    assert!(read(w, &mut [0; 1]).is_err());

    // Once the reader is gone, writes fail.
    close(r).unwrap();
    assert!(write(w, b"x").is_err());

    close(w).unwrap();
    // Closed is closed.
    assert!(close(w).is_err());
    assert!(write(w, b"x").is_err());
    0
}

#[test]
fn pipe_direction_and_close_rules() {
    assert_eq!(boot(direction_main, &[]), 0);
}

fn writer_task(args: &[u8]) -> i32 {
    let w = args[0] as Fid;
    let payload = vec![b'A'; 9000];
    // Only a bufferful fits in one call.
    let first = write(w, &payload).unwrap();
    assert_eq!(first, PIPESIZE);
    // The rest blocks until the reader makes room.
    write(w, &payload[first..]).unwrap() as i32
}

fn bounded_main(_: &[u8]) -> i32 {
    let (r, w) = pipe().unwrap();
    let t = create_thread(writer_task, &[w as u8]);

    let mut buf = vec![0; 800];
    let mut got = 0;
    while got < 800 {
        got += read(r, &mut buf[got..]).unwrap();
    }
    // 800 bytes of reader progress let the writer finish its 9000.
    assert_eq!(thread_join(t).unwrap(), 800);

    let mut total = got;
    let mut big = vec![0; PIPESIZE];
    while total < 9000 {
        let n = read(r, &mut big).unwrap();
        assert!(big[..n].iter().all(|&b| b == b'A'));
        total += n;
    }
    assert_eq!(total, 9000);

    close(w).unwrap();
    assert_eq!(read(r, &mut big).unwrap(), 0);
    close(r).unwrap();
    0
}

#[test]
fn a_full_pipe_blocks_its_writer() {
    assert_eq!(boot(bounded_main, &[]), 0);
}

fn chunked_writer(args: &[u8]) -> i32 {
    let w = args[0] as Fid;
    let mut next: u8 = 0;
    for _ in 0..40 {
        let chunk: Vec<u8> = (0..1000)
            .map(|_| {
                let b = next;
                next = next.wrapping_add(1);
                b
            })
            .collect();
        let mut sent = 0;
        while sent < chunk.len() {
            sent += write(w, &chunk[sent..]).unwrap();
        }
    }
    close(w).unwrap();
    0
}

fn fifo_main(_: &[u8]) -> i32 {
    let (r, w) = pipe().unwrap();
    // The writer thread owns the shared write descriptor and closes it when
    // done; EOF below depends on that.
    let t = create_thread(chunked_writer, &[w as u8]);

    let mut expected: u8 = 0;
    let mut total = 0;
    let mut buf = [0; 700];
    loop {
        let n = read(r, &mut buf).unwrap();
        if n == 0 {
            break;
        }
        for &b in &buf[..n] {
            assert_eq!(b, expected);
            expected = expected.wrapping_add(1);
        }
        total += n;
    }
    assert_eq!(total, 40 * 1000);
    assert_eq!(thread_join(t).unwrap(), 0);
    close(r).unwrap();
    0
}

#[test]
fn bytes_arrive_in_order_and_complete() {
    assert_eq!(boot(fifo_main, &[]), 0);
}
