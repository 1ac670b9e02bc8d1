// tests/local_driver.rs

//! End-to-end tests for the local subprocess driver, driving real
//! processes and draining the event queue like an orchestrator would.

use std::time::{Duration, Instant};

use nix::sys::signal::Signal;

use jobdrive::driver::{Driver, JobSpec, LocalDriver};
use jobdrive::events::Event;
use jobdrive_test_utils::{init_tracing, with_timeout};

#[tokio::test]
async fn success_runs_touch_and_reports_clean_exit() {
    init_tracing();

    let workdir = tempfile::tempdir().expect("tempdir");
    let mut driver = LocalDriver::new();
    let mut events = driver.take_event_queue().expect("queue taken once");

    driver
        .submit(
            42,
            JobSpec::new("/usr/bin/env")
                .arg("touch")
                .arg("testfile")
                .runpath(workdir.path()),
        )
        .await
        .expect("submit");

    assert_eq!(with_timeout(events.get()).await, Some(Event::Submitted { iens: 42 }));
    assert_eq!(with_timeout(events.get()).await, Some(Event::Started { iens: 42 }));
    assert_eq!(
        with_timeout(events.get()).await,
        Some(Event::Finished {
            iens: 42,
            returncode: 0,
            aborted: false
        })
    );

    assert!(workdir.path().join("testfile").exists());
}

#[tokio::test]
async fn failing_job_reports_its_exit_code() {
    init_tracing();

    let mut driver = LocalDriver::new();
    let mut events = driver.take_event_queue().expect("queue taken once");

    driver
        .submit(42, JobSpec::new("/usr/bin/env").arg("false"))
        .await
        .expect("submit");

    assert_eq!(with_timeout(events.get()).await, Some(Event::Submitted { iens: 42 }));
    assert_eq!(with_timeout(events.get()).await, Some(Event::Started { iens: 42 }));
    assert_eq!(
        with_timeout(events.get()).await,
        Some(Event::Finished {
            iens: 42,
            returncode: 1,
            aborted: false
        })
    );
}

#[tokio::test]
async fn missing_executable_reports_127_without_started() {
    init_tracing();

    let mut driver = LocalDriver::new();
    let mut events = driver.take_event_queue().expect("queue taken once");

    driver
        .submit(42, JobSpec::new("/file/not/found"))
        .await
        .expect("submit itself succeeds; the failure arrives as an event");

    assert_eq!(
        with_timeout(events.get()).await,
        Some(Event::Finished {
            iens: 42,
            returncode: 127,
            aborted: true
        })
    );
    assert!(events.is_empty());
}

#[tokio::test]
async fn kill_terminates_with_sigterm() {
    init_tracing();

    let mut driver = LocalDriver::new();
    let mut events = driver.take_event_queue().expect("queue taken once");

    driver
        .submit(42, JobSpec::new("/usr/bin/env").arg("sleep").arg("10"))
        .await
        .expect("submit");

    assert_eq!(with_timeout(events.get()).await, Some(Event::Submitted { iens: 42 }));
    assert_eq!(with_timeout(events.get()).await, Some(Event::Started { iens: 42 }));

    driver.kill(42).await;

    assert_eq!(
        with_timeout(events.get()).await,
        Some(Event::Finished {
            iens: 42,
            returncode: -(Signal::SIGTERM as i32),
            aborted: true
        })
    );
}

#[tokio::test]
async fn kill_escalates_to_sigkill_after_the_grace_period() {
    init_tracing();

    let grace = Duration::from_millis(100);
    let workdir = tempfile::tempdir().expect("tempdir");
    let script = workdir.path().join("script");
    std::fs::write(
        &script,
        "trap \"\" 1 2 3 4 5 6 7 8 9 10 11 12 13 14 15\n\
         while true\n\
         do\n\
             echo \"still alive\"\n\
             sleep 10\n\
         done\n",
    )
    .expect("write script");

    let mut driver = LocalDriver::new().with_terminate_timeout(grace);
    let mut events = driver.take_event_queue().expect("queue taken once");

    driver
        .submit(
            42,
            JobSpec::new("/usr/bin/env")
                .arg("bash")
                .arg(script.to_str().expect("utf-8 path")),
        )
        .await
        .expect("submit");

    assert_eq!(with_timeout(events.get()).await, Some(Event::Submitted { iens: 42 }));
    assert_eq!(with_timeout(events.get()).await, Some(Event::Started { iens: 42 }));

    // Give the script time to install its traps.
    tokio::time::sleep(Duration::from_millis(500)).await;

    let killed_at = Instant::now();
    driver.kill(42).await;

    assert_eq!(
        with_timeout(events.get()).await,
        Some(Event::Finished {
            iens: 42,
            returncode: -(Signal::SIGKILL as i32),
            aborted: true
        })
    );
    // The forced kill only happens once the grace period has elapsed.
    assert!(killed_at.elapsed() >= grace);
}

#[tokio::test]
async fn kill_after_natural_exit_keeps_the_natural_outcome() {
    init_tracing();

    let mut driver = LocalDriver::new();
    let mut events = driver.take_event_queue().expect("queue taken once");

    driver
        .submit(42, JobSpec::new("/usr/bin/env").arg("true"))
        .await
        .expect("submit");

    assert_eq!(with_timeout(events.get()).await, Some(Event::Submitted { iens: 42 }));
    assert_eq!(with_timeout(events.get()).await, Some(Event::Started { iens: 42 }));

    // Let the process exit on its own before the kill arrives.
    tokio::time::sleep(Duration::from_millis(500)).await;
    driver.kill(42).await;

    assert_eq!(
        with_timeout(events.get()).await,
        Some(Event::Finished {
            iens: 42,
            returncode: 0,
            aborted: false
        })
    );
    assert!(events.is_empty());
}

#[tokio::test]
async fn killing_a_killed_job_enqueues_nothing_further() {
    init_tracing();

    let mut driver = LocalDriver::new();
    let mut events = driver.take_event_queue().expect("queue taken once");

    driver
        .submit(23, JobSpec::new("/usr/bin/env").arg("sleep").arg("10"))
        .await
        .expect("submit");

    assert_eq!(with_timeout(events.get()).await, Some(Event::Submitted { iens: 23 }));
    assert_eq!(with_timeout(events.get()).await, Some(Event::Started { iens: 23 }));

    driver.kill(23).await;
    assert_eq!(
        with_timeout(events.get()).await,
        Some(Event::Finished {
            iens: 23,
            returncode: -(Signal::SIGTERM as i32),
            aborted: true
        })
    );

    // Killing a dead job must not raise and must not emit anything.
    driver.kill(23).await;
    driver.kill(23).await;
    driver.kill(23).await;
    assert!(events.is_empty());
}

#[tokio::test]
async fn kill_for_an_unknown_job_is_a_silent_noop() {
    init_tracing();

    let mut driver = LocalDriver::new();
    let mut events = driver.take_event_queue().expect("queue taken once");

    driver.kill(999).await;
    assert!(events.is_empty());
}

#[tokio::test]
async fn finish_waits_for_outstanding_jobs() {
    init_tracing();

    let workdir = tempfile::tempdir().expect("tempdir");
    let mut driver = LocalDriver::new();
    let mut events = driver.take_event_queue().expect("queue taken once");
    let monitor = tokio::spawn(driver.poll());

    driver
        .submit(
            7,
            JobSpec::new("/usr/bin/env")
                .arg("touch")
                .arg("done-marker")
                .runpath(workdir.path()),
        )
        .await
        .expect("submit");

    with_timeout(driver.finish()).await;
    with_timeout(monitor).await.expect("monitor task");

    // Everything the job produced is still on the queue.
    assert_eq!(with_timeout(events.get()).await, Some(Event::Submitted { iens: 7 }));
    assert_eq!(with_timeout(events.get()).await, Some(Event::Started { iens: 7 }));
    assert_eq!(
        with_timeout(events.get()).await,
        Some(Event::Finished {
            iens: 7,
            returncode: 0,
            aborted: false
        })
    );
    assert!(workdir.path().join("done-marker").exists());
}
