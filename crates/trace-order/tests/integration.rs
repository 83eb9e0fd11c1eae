use rand::seq::SliceRandom;
use rand::thread_rng;
use std::sync::{mpsc, Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};
use trace_order::{
    AccumulatorConfig, AccumulatorError, Span, SpanAccumulator, SpanIdentity, SpanKind,
    SpanListener, SpanPayload, SpanStatus, INVALID_SPAN_ID,
};
use tracing_subscriber::EnvFilter;

/// Routes accumulator logs to the test harness; `RUST_LOG=trace_order=debug`
/// shows trace creation and wait outcomes.
fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Span ids encode the producer in the top 16 bits.
fn span_id(producer: usize, seq: u64) -> u64 {
    (producer as u64) << 48 | seq
}

/// One trace per producer: a root with `children` direct children.
fn producer_spans(producer: usize, children: u64) -> Vec<Span> {
    let trace_id = producer as u128 + 1;
    let root = span_id(producer, 1);
    let mut spans = vec![Span::new(trace_id, root, INVALID_SPAN_ID, "request", SpanKind::Server)];
    for c in 0..children {
        spans.push(Span::new(
            trace_id,
            span_id(producer, c + 2),
            root,
            format!("child-{}", c),
            SpanKind::Internal,
        ));
    }
    spans
}

#[test]
fn test_concurrent_producers_produce_deterministic_traces() {
    init_logging();
    let acc = Arc::new(SpanAccumulator::<Span>::default());
    let producers = 8;
    let barrier = Arc::new(Barrier::new(producers));

    let handles: Vec<_> = (0..producers)
        .map(|p| {
            let acc = Arc::clone(&acc);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let spans = producer_spans(p, 50);
                barrier.wait();
                for span in &spans {
                    acc.record_start(&span.identity());
                }
                // end in random order, like real worker threads
                let mut ends = spans;
                ends.shuffle(&mut thread_rng());
                for mut span in ends {
                    span.finish(SpanStatus::Ok);
                    acc.record_end(span).unwrap();
                }
            })
        })
        .collect();

    acc.wait_for_traces_timeout(producers, Duration::from_secs(10))
        .unwrap();
    for h in handles {
        h.join().unwrap();
    }

    let traces = acc.get_traces();
    assert_eq!(traces.len(), producers);
    for trace in traces.iter() {
        let producer = (trace.trace_id() - 1) as usize;
        let expected: Vec<u64> = (1..=51).map(|s| span_id(producer, s)).collect();
        assert_eq!(trace.span_ids(), expected, "trace {}", trace.trace_id());
        assert_eq!(trace.get(0).unwrap().payload().name, "request");
    }

    // cross-trace order follows the earliest start
    let mins: Vec<_> = traces.iter().map(|t| t.min_sequence()).collect();
    let mut sorted = mins.clone();
    sorted.sort();
    assert_eq!(mins, sorted);
}

#[test]
fn test_start_handed_off_between_threads_orders_sequences() {
    for _ in 0..100 {
        let acc = Arc::new(SpanAccumulator::<SpanIdentity>::default());
        let (tx, rx) = mpsc::channel();

        let first = {
            let acc = Arc::clone(&acc);
            thread::spawn(move || {
                acc.record_start(&SpanIdentity::root(1, 1));
                tx.send(()).unwrap();
            })
        };
        let second = {
            let acc = Arc::clone(&acc);
            thread::spawn(move || {
                // starts only after the first thread's start returned
                rx.recv().unwrap();
                acc.record_start(&SpanIdentity::root(2, 2));
            })
        };
        first.join().unwrap();
        second.join().unwrap();

        let a = acc.sequences().sequence_of(1).unwrap();
        let b = acc.sequences().sequence_of(2).unwrap();
        assert!(a < b, "{a} handed off before {b}");
    }
}

#[test]
fn test_snapshot_stable_while_producers_run() {
    let acc = Arc::new(SpanAccumulator::<SpanIdentity>::default());
    let root = SpanIdentity::root(1, 1);
    acc.record_start(&root);
    acc.record_end(root).unwrap();
    let held = acc.get_traces();

    let writer = {
        let acc = Arc::clone(&acc);
        thread::spawn(move || {
            for i in 2..2_000u64 {
                let id = SpanIdentity::new(1 + (i % 5) as u128, i, INVALID_SPAN_ID);
                acc.record_start(&id);
                acc.record_end(id).unwrap();
            }
        })
    };

    // iterate the old snapshot and take new ones while spans keep landing
    for _ in 0..200 {
        assert_eq!(held.len(), 1);
        assert_eq!(held[0].span_ids(), vec![1]);
        let fresh = acc.get_traces();
        for trace in fresh.iter() {
            assert!(!trace.is_empty());
        }
    }
    writer.join().unwrap();

    assert_eq!(held[0].len(), 1);
    assert_eq!(acc.span_count(), 1_999);
}

#[test]
fn test_wait_times_out_with_counts() {
    init_logging();
    let acc = SpanAccumulator::<SpanIdentity>::default();
    let complete = SpanIdentity::root(1, 1);
    let orphan = SpanIdentity::new(2, 2, 77);
    for id in [complete, orphan] {
        acc.record_start(&id);
        acc.record_end(id).unwrap();
    }

    let started = Instant::now();
    let err = acc
        .wait_for_traces_timeout(2, Duration::from_millis(100))
        .unwrap_err();

    assert!(started.elapsed() >= Duration::from_millis(100));
    assert!(err.is_recoverable());
    assert!(matches!(
        err,
        AccumulatorError::Timeout { found: 1, total: 2, .. }
    ));
}

#[test]
fn test_waiter_sees_traces_from_many_threads() {
    let acc = Arc::new(SpanAccumulator::<SpanIdentity>::new(AccumulatorConfig::quick()));
    let waiter = {
        let acc = Arc::clone(&acc);
        thread::spawn(move || acc.wait_for_traces_timeout(4, Duration::from_secs(10)))
    };

    let producers: Vec<_> = (0..4u64)
        .map(|p| {
            let acc = Arc::clone(&acc);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10 * p));
                let id = SpanIdentity::root(p as u128 + 1, p + 1);
                acc.record_start(&id);
                acc.record_end(id).unwrap();
            })
        })
        .collect();
    for p in producers {
        p.join().unwrap();
    }

    waiter.join().unwrap().unwrap();
    assert_eq!(acc.completed_count(), 4);
}

#[test]
fn test_clear_between_test_cases() {
    let acc = SpanAccumulator::<SpanIdentity>::default();
    let id = SpanIdentity::root(1, 1);
    acc.record_start(&id);
    acc.record_end(id).unwrap();
    acc.wait_for_traces_timeout(1, Duration::from_millis(10)).unwrap();

    acc.clear();

    // a start recorded before clear is forgotten
    assert!(acc.record_end(SpanIdentity::root(1, 1)).is_err());
    assert_eq!(acc.trace_count(), 0);
    assert!(acc
        .wait_for_traces_timeout(1, Duration::from_millis(20))
        .is_err());

    let id = SpanIdentity::root(3, 3);
    acc.record_start(&id);
    acc.record_end(id).unwrap();
    assert_eq!(acc.get_traces()[0].trace_id(), 3);
}

#[test]
fn test_force_root_truncates_tree() {
    const CUT: u64 = 0x456;
    let acc = SpanAccumulator::<SpanIdentity>::new(AccumulatorConfig::force_root(CUT));

    // the real parent CUT never ends; the sentinel still completes the trace
    let top = SpanIdentity::new(1, 10, CUT);
    let leaf = SpanIdentity::new(1, 11, 10);
    acc.record_start(&top);
    acc.record_start(&leaf);
    acc.record_end(leaf).unwrap();
    acc.record_end(top).unwrap();

    acc.wait_for_traces_timeout(1, Duration::from_millis(50)).unwrap();
    assert_eq!(acc.get_traces()[0].span_ids(), vec![10, 11]);
}

#[test]
fn test_listener_drives_accumulator() {
    init_logging();
    let acc = Arc::new(SpanAccumulator::<Span>::default());
    let listener: Arc<dyn SpanListener<Span>> = acc.clone();

    let handles: Vec<_> = (0..4usize)
        .map(|p| {
            let listener = Arc::clone(&listener);
            thread::spawn(move || {
                for span in producer_spans(p, 3) {
                    listener.on_start(&span.identity());
                    listener.on_end(span).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let sizes = acc
        .assert_traces(
            4,
            Duration::from_secs(5),
            trace_order::exclude_none,
            |traces| traces.iter().map(|t| t.len()).collect::<Vec<_>>(),
        )
        .unwrap();
    assert_eq!(sizes, vec![4; 4]);
    assert_eq!(acc.metrics().spans_started, 16);
}
