//! Thread create/join/detach/exit behavior.

use std::time::Duration;

use tos_kernel::{
    boot, create_thread, thread_detach, thread_exit, thread_join, thread_self, Tid,
};

fn seven(_: &[u8]) -> i32 {
    7
}

fn eleven_slow(_: &[u8]) -> i32 {
    std::thread::sleep(Duration::from_millis(150));
    11
}

fn join_detach_main(_: &[u8]) -> i32 {
    let t1 = create_thread(seven, &[]);
    let t2 = create_thread(eleven_slow, &[]);

    assert_eq!(thread_join(t1).unwrap(), 7);
    // Joined and reaped: gone for good.
    assert!(thread_join(t1).is_err());

    thread_detach(t2).unwrap();
    assert!(thread_join(t2).is_err());

    // Self- and unknown-tid joins fail.
    assert!(thread_join(thread_self()).is_err());
    assert!(thread_join(4242 as Tid).is_err());
    0
}

#[test]
fn join_then_detach() {
    assert_eq!(boot(join_detach_main, &[]), 0);
}

fn napper(_: &[u8]) -> i32 {
    std::thread::sleep(Duration::from_millis(200));
    5
}

fn join_racer(args: &[u8]) -> i32 {
    match thread_join(args[0] as Tid) {
        Ok(_) => 1,
        Err(()) => 0,
    }
}

fn pending_join_main(_: &[u8]) -> i32 {
    let t = create_thread(napper, &[]);
    let j = create_thread(join_racer, &[t as u8]);

    // Let the joiner park on the napper, then detach it out from under
    // them: the pending join must come back empty-handed.
    std::thread::sleep(Duration::from_millis(50));
    thread_detach(t).unwrap();
    assert_eq!(thread_join(j).unwrap(), 0);
    0
}

#[test]
fn detach_releases_pending_joiners() {
    assert_eq!(boot(pending_join_main, &[]), 0);
}

fn detach_exited_main(_: &[u8]) -> i32 {
    let t = create_thread(seven, &[]);
    // Give it ample time to finish; an exited thread cannot be detached, but
    // its exit value can still be collected.
    std::thread::sleep(Duration::from_millis(200));
    assert!(thread_detach(t).is_err());
    assert_eq!(thread_join(t).unwrap(), 7);
    0
}

#[test]
fn detach_after_exit_fails() {
    assert_eq!(boot(detach_exited_main, &[]), 0);
}

fn exiter(_: &[u8]) -> i32 {
    thread_exit(42)
}

fn explicit_exit_main(_: &[u8]) -> i32 {
    let t = create_thread(exiter, &[]);
    assert_eq!(thread_join(t).unwrap(), 42);
    0
}

#[test]
fn thread_exit_value_reaches_joiner() {
    assert_eq!(boot(explicit_exit_main, &[]), 0);
}

fn lingerer(_: &[u8]) -> i32 {
    std::thread::sleep(Duration::from_millis(100));
    0
}

fn linger_main(_: &[u8]) -> i32 {
    // No join, no detach: the process stays up until its last thread is
    // done, and the exit value recorded by the main thread survives.
    create_thread(lingerer, &[]);
    33
}

#[test]
fn process_outlives_its_main_thread() {
    assert_eq!(boot(linger_main, &[]), 33);
}
