//! End-to-end pipeline behavior (spec §8): completeness on a clean run,
//! breaker trips with a carried reason, external interruption running
//! cleanup, rate conformance, and conservation through an `Accumulator`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use forge_core::Accumulator;
use forge_engine::{AcquireContext, HookError, PipelineConfig, PipelineError, PipelineHooks, WorkPipeline};

struct TestHooks {
    source: Vec<u32>,
    processed: Arc<Mutex<Vec<u32>>>,
    fail_on: Option<u32>,
    acquire_complete_called: Arc<AtomicUsize>,
    work_complete_called: Arc<AtomicUsize>,
}

impl PipelineHooks for TestHooks {
    type Item = u32;

    fn acquire_work(&self, ctx: &AcquireContext<u32>) -> Result<(), HookError> {
        for &item in &self.source {
            ctx.distribute(item)?;
        }
        Ok(())
    }

    fn on_work(&self, item: u32) -> Result<(), HookError> {
        if Some(item) == self.fail_on {
            return Err(format!("poison item {item}").into());
        }
        self.processed.lock().unwrap().push(item);
        Ok(())
    }

    fn on_acquire_complete(&self) -> Result<(), HookError> {
        self.acquire_complete_called.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn on_work_complete(&self, _worker_index: usize) -> Result<(), HookError> {
        self.work_complete_called.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn counters() -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
    (Arc::new(AtomicUsize::new(0)), Arc::new(AtomicUsize::new(0)))
}

#[test]
fn clean_run_processes_every_item_exactly_once() {
    let processed = Arc::new(Mutex::new(Vec::new()));
    let (acquire_complete, work_complete) = counters();
    let hooks = TestHooks {
        source: (0..500).collect(),
        processed: processed.clone(),
        fail_on: None,
        acquire_complete_called: acquire_complete.clone(),
        work_complete_called: work_complete.clone(),
    };

    let config = PipelineConfig {
        processes: 4,
        threads: 8,
        queue: 16,
        rate: 100_000.0,
    };
    let pipeline = WorkPipeline::new(config, hooks);
    pipeline.run().expect("clean run should not trip the breaker");

    let mut got = processed.lock().unwrap().clone();
    got.sort_unstable();
    let expected: Vec<u32> = (0..500).collect();
    assert_eq!(got, expected);
    assert_eq!(acquire_complete.load(Ordering::SeqCst), 1);
    assert_eq!(work_complete.load(Ordering::SeqCst), 4);
}

#[test]
fn failing_hook_trips_breaker_with_its_reason() {
    let processed = Arc::new(Mutex::new(Vec::new()));
    let (acquire_complete, work_complete) = counters();
    let hooks = TestHooks {
        source: vec![1, 2, 3, 4, 5],
        processed,
        fail_on: Some(3),
        acquire_complete_called: acquire_complete,
        work_complete_called: work_complete,
    };

    let config = PipelineConfig {
        processes: 1,
        threads: 2,
        queue: 8,
        rate: 100_000.0,
    };
    let pipeline = WorkPipeline::new(config, hooks);

    match pipeline.run() {
        Err(PipelineError::BreakerTripped { reason }) => {
            assert!(reason.contains("poison item 3"), "reason was: {reason}");
        }
        other => panic!("expected BreakerTripped, got {other:?}"),
    }
}

#[test]
fn panicking_hook_trips_breaker_too() {
    struct PanicHooks {
        source: Vec<u32>,
        panic_on: u32,
    }

    impl PipelineHooks for PanicHooks {
        type Item = u32;

        fn acquire_work(&self, ctx: &AcquireContext<u32>) -> Result<(), HookError> {
            for &item in &self.source {
                ctx.distribute(item)?;
            }
            Ok(())
        }

        fn on_work(&self, item: u32) -> Result<(), HookError> {
            if item == self.panic_on {
                panic!("poison item {item}");
            }
            Ok(())
        }
    }

    let hooks = PanicHooks {
        source: vec![1, 2, 3, 4, 5],
        panic_on: 3,
    };

    let config = PipelineConfig {
        processes: 1,
        threads: 2,
        queue: 8,
        rate: 100_000.0,
    };
    let pipeline = WorkPipeline::new(config, hooks);

    match pipeline.run() {
        Err(PipelineError::BreakerTripped { reason }) => {
            assert!(reason.contains("poison item 3"), "reason was: {reason}");
        }
        other => panic!("expected BreakerTripped, got {other:?}"),
    }
}

#[test]
fn external_trip_aborts_the_run_and_still_runs_cleanup() {
    struct SlowHooks {
        acquire_complete: Arc<AtomicUsize>,
        work_complete: Arc<AtomicUsize>,
    }

    impl PipelineHooks for SlowHooks {
        type Item = u32;

        fn acquire_work(&self, ctx: &AcquireContext<u32>) -> Result<(), HookError> {
            let mut next = 0u32;
            loop {
                ctx.distribute(next)?;
                next = next.wrapping_add(1);
                thread::sleep(Duration::from_millis(5));
            }
        }

        fn on_work(&self, _item: u32) -> Result<(), HookError> {
            thread::sleep(Duration::from_millis(5));
            Ok(())
        }

        fn on_acquire_complete(&self) -> Result<(), HookError> {
            self.acquire_complete.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn on_work_complete(&self, _worker_index: usize) -> Result<(), HookError> {
            self.work_complete.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    let (acquire_complete, work_complete) = counters();
    let hooks = SlowHooks {
        acquire_complete: acquire_complete.clone(),
        work_complete: work_complete.clone(),
    };

    let config = PipelineConfig {
        processes: 2,
        threads: 2,
        queue: 4,
        rate: 1000.0,
    };
    let pipeline = WorkPipeline::new(config, hooks);
    let breaker = pipeline.breaker();

    let trigger = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        breaker.trip("test interrupt");
    });

    let result = pipeline.run();
    trigger.join().unwrap();

    match result {
        Err(PipelineError::BreakerTripped { reason }) => assert_eq!(reason, "test interrupt"),
        other => panic!("expected BreakerTripped, got {other:?}"),
    }
    assert_eq!(acquire_complete.load(Ordering::SeqCst), 1);
    assert_eq!(work_complete.load(Ordering::SeqCst), 2);
}

#[test]
fn rate_limiter_paces_the_whole_pipeline() {
    let processed = Arc::new(Mutex::new(Vec::new()));
    let (acquire_complete, work_complete) = counters();
    let hooks = TestHooks {
        source: (0..20).collect(),
        processed: processed.clone(),
        fail_on: None,
        acquire_complete_called: acquire_complete,
        work_complete_called: work_complete,
    };

    // One worker at 100/s => 10ms between releases.
    let config = PipelineConfig {
        processes: 1,
        threads: 4,
        queue: 32,
        rate: 100.0,
    };
    let pipeline = WorkPipeline::new(config, hooks);
    let start = Instant::now();
    pipeline.run().unwrap();
    let elapsed = start.elapsed();

    assert_eq!(processed.lock().unwrap().len(), 20);
    // 20 releases from one limiter => at least 19 full delays of spacing.
    assert!(elapsed >= Duration::from_millis(190), "elapsed={elapsed:?}");
}

#[test]
fn accumulator_conserves_every_item_dispatched_through_the_pipeline() {
    struct AccHooks {
        source: Vec<u32>,
        accumulator: Arc<Accumulator<u32>>,
    }

    impl PipelineHooks for AccHooks {
        type Item = u32;

        fn acquire_work(&self, ctx: &AcquireContext<u32>) -> Result<(), HookError> {
            for &item in &self.source {
                ctx.distribute(item)?;
            }
            Ok(())
        }

        fn on_work(&self, item: u32) -> Result<(), HookError> {
            self.accumulator.add(item);
            Ok(())
        }
    }

    let collected = Arc::new(Mutex::new(Vec::new()));
    let collected_cb = collected.clone();
    let accumulator = Arc::new(Accumulator::new(7, false, move |batch: Vec<u32>| {
        collected_cb.lock().unwrap().extend(batch);
    }));

    let source: Vec<u32> = (0..237).collect();
    let hooks = AccHooks {
        source: source.clone(),
        accumulator: accumulator.clone(),
    };

    let config = PipelineConfig {
        processes: 3,
        threads: 6,
        queue: 32,
        rate: 100_000.0,
    };
    let pipeline = WorkPipeline::new(config, hooks);
    pipeline.run().unwrap();
    accumulator.flush();

    let mut got = collected.lock().unwrap().clone();
    got.sort_unstable();
    assert_eq!(got, source);
}
