//! Integration tests for journal streaming
//!
//! A `/bin/sh -c` script stands in for journalctl; the generated journalctl
//! arguments land in `$1..` and are ignored.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use sysd_client::{Journal, JournalConfig, JournalError, Since, Stopped};
use tokio::io::AsyncReadExt;

static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

fn unique_test_dir() -> PathBuf {
    let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
    let dir = PathBuf::from(format!("/tmp/sysd-client-test-{}-{}", std::process::id(), id));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn fake_journal(script: &str) -> Journal {
    Journal::new(JournalConfig {
        program: PathBuf::from("/bin/sh"),
        prefix_args: vec!["-c".into(), script.into(), "journalctl".into()],
        user: false,
    })
}

/// Wait for the fake reader to write its PID
async fn read_pid(path: &Path) -> Pid {
    for _ in 0..500 {
        if let Ok(s) = fs::read_to_string(path) {
            if let Ok(pid) = s.trim().parse() {
                return Pid::from_raw(pid);
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("no pid written to {}", path.display());
}

fn is_running(pid: Pid) -> bool {
    kill(pid, None).is_ok()
}

/// A killed child that was not waited on is reaped in the background
async fn wait_gone(pid: Pid) -> bool {
    for _ in 0..500 {
        if !is_running(pid) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn test_cancel_stops_reader() {
    let dir = unique_test_dir();
    let pid_file = dir.join("pid");
    let journal = fake_journal(&format!(
        "echo $$ > {}; echo started; exec sleep 30",
        pid_file.display()
    ));

    let mut sink = Vec::new();
    let cancel = read_pid(&pid_file);
    let stopped = journal
        .write_logs_to(&mut sink, "foo.service", Since::Now, async {
            cancel.await;
        })
        .await
        .unwrap();

    assert_eq!(stopped, Stopped::Cancelled);
    let pid = read_pid(&pid_file).await;
    assert!(!is_running(pid), "reader {} still running", pid);
}

#[tokio::test]
async fn test_cancel_before_any_output() {
    let journal = fake_journal("exec sleep 30");

    let mut sink = Vec::new();
    let stopped = tokio::time::timeout(
        Duration::from_secs(10),
        journal.write_logs_to(&mut sink, "foo.service", Since::Now, std::future::ready(())),
    )
    .await
    .expect("teardown did not finish")
    .unwrap();

    assert_eq!(stopped, Stopped::Cancelled);
    assert!(sink.is_empty());
}

#[tokio::test]
async fn test_reader_exit_status_is_reported() {
    let dir = unique_test_dir();
    let pid_file = dir.join("pid");
    let bg_file = dir.join("bg");
    // The background sleep holds the pipe open so the exit is seen first
    let journal = fake_journal(&format!(
        "echo $$ > {}; sleep 30 & echo $! > {}; echo started; exit 3",
        pid_file.display(),
        bg_file.display()
    ));

    let mut sink = Vec::new();
    let err = journal
        .write_logs_to(&mut sink, "foo.service", Since::Now, std::future::pending())
        .await
        .unwrap_err();

    match err {
        JournalError::Exited(status) => assert_eq!(status.code(), Some(3)),
        other => panic!("unexpected error: {}", other),
    }
    let pid = read_pid(&pid_file).await;
    assert!(!is_running(pid), "reader {} not reaped", pid);

    let bg = read_pid(&bg_file).await;
    let _ = kill(bg, Signal::SIGKILL);
}

#[tokio::test]
async fn test_output_closed_while_reader_runs() {
    let dir = unique_test_dir();
    let pid_file = dir.join("pid");
    let journal = fake_journal(&format!(
        "echo $$ > {}; echo hello; exec >&-; exec sleep 30",
        pid_file.display()
    ));

    let mut sink = Vec::new();
    let stopped = journal
        .write_logs_to(&mut sink, "foo.service", Since::Now, std::future::pending())
        .await
        .unwrap();

    assert_eq!(stopped, Stopped::Completed);
    assert_eq!(sink, b"hello\n");
    let pid = read_pid(&pid_file).await;
    assert!(!is_running(pid), "reader {} left running", pid);
}

#[tokio::test]
async fn test_sink_error_is_reported() {
    let dir = unique_test_dir();
    let pid_file = dir.join("pid");
    let journal = fake_journal(&format!(
        "echo $$ > {}; echo tick; exec sleep 30",
        pid_file.display()
    ));

    let mut sink = tokio_test::io::Builder::new()
        .write_error(io::Error::new(io::ErrorKind::BrokenPipe, "sink closed"))
        .build();
    let err = journal
        .write_logs_to(&mut sink, "foo.service", Since::Now, std::future::pending())
        .await
        .unwrap_err();

    match err {
        JournalError::Copy(e) => assert_eq!(e.kind(), io::ErrorKind::BrokenPipe),
        other => panic!("unexpected error: {}", other),
    }
    let pid = read_pid(&pid_file).await;
    assert!(!is_running(pid), "reader {} left running", pid);
}

#[tokio::test]
async fn test_stream_yields_reader_output() {
    let dir = unique_test_dir();
    let pid_file = dir.join("pid");
    let journal = fake_journal(&format!(
        "echo $$ > {}; printf 'first line\\nsecond line\\n'; exec sleep 30",
        pid_file.display()
    ));

    let mut stream = journal.stream("foo.service", Since::Now).unwrap();
    assert!(stream.id().is_some());

    let expected = b"first line\nsecond line\n";
    let mut buf = vec![0u8; expected.len()];
    stream.read_exact(&mut buf).await.unwrap();
    assert_eq!(buf, expected);

    let pid = read_pid(&pid_file).await;
    stream.close().await.unwrap();
    assert!(!is_running(pid), "reader {} still running after close", pid);
}

#[tokio::test]
async fn test_dropping_stream_kills_reader() {
    let dir = unique_test_dir();
    let pid_file = dir.join("pid");
    let journal = fake_journal(&format!(
        "echo $$ > {}; echo started; exec sleep 30",
        pid_file.display()
    ));

    let mut stream = journal.stream("foo.service", Since::Now).unwrap();
    let mut buf = [0u8; 8];
    stream.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"started\n");

    let pid = read_pid(&pid_file).await;
    assert!(is_running(pid));
    drop(stream);
    assert!(wait_gone(pid).await, "reader {} still running after drop", pid);
}

#[tokio::test]
async fn test_stream_passes_since_and_unit() {
    let journal = fake_journal("echo \"$@\"");

    let mut stream = journal
        .stream("bar.service", Since::Ago(Duration::from_secs(120)))
        .unwrap();
    let mut out = String::new();
    stream.read_to_string(&mut out).await.unwrap();

    assert_eq!(out, "--since=-120 -f -q --unit bar.service\n");
    stream.close().await.unwrap();
}
