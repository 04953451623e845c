//! End-to-end scenarios spanning `Cbq`, `QMux`, and the bridge-queue
//! registry together, as opposed to the per-module unit tests living
//! alongside each source file.

use std::sync::mpsc::channel;
use std::thread;
use std::time::Duration;

use flow_queue::{
    BridgeQueueInfo, Cbq, Interest, PollHandle, QMux, QueueConfig, QueueError, QueueLimits,
    Timeout,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Debug, Clone, PartialEq)]
struct PacketIn {
    dpid: u64,
    port: u16,
}

/// S4: two empty queues with readable-interest handles; a `poll` blocked
/// on both returns as soon as either gets data, reporting only that one
/// as ready.
#[test]
fn s4_qmux_wakes_on_whichever_queue_gets_data() {
    init_logging();
    let q1: Cbq<PacketIn> = Cbq::new(QueueConfig::new(4)).unwrap();
    let q2: Cbq<PacketIn> = Cbq::new(QueueConfig::new(4)).unwrap();
    let h1 = PollHandle::new(Some(q1.clone()), Interest::readable());
    let h2 = PollHandle::new(Some(q2.clone()), Interest::readable());
    let qmux = QMux::new();

    let producer = {
        let q2 = q2.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(40));
            q2.put(PacketIn { dpid: 7, port: 3 }, Timeout::NonBlocking).unwrap();
        })
    };

    let ready = qmux
        .poll(&[&h1, &h2], Timeout::Bounded(Duration::from_secs(2)))
        .unwrap();

    assert_eq!(ready, 1);
    assert_eq!(h2.size(), 1);
    assert_eq!(h1.size(), 0);

    producer.join().unwrap();
}

/// S5: both queues stay empty; repeated `clear()` calls on one of them
/// notify its readable-interest observer, but since nothing ever becomes
/// readable, `poll` still times out at (at least) the requested deadline.
#[test]
fn s5_qmux_times_out_despite_spurious_clears() {
    init_logging();
    let q1: Cbq<i32> = Cbq::new(QueueConfig::new(4)).unwrap();
    let q2: Cbq<i32> = Cbq::new(QueueConfig::new(4)).unwrap();
    let h1 = PollHandle::new(Some(q1.clone()), Interest::readable());
    let h2 = PollHandle::new(Some(q2), Interest::readable());
    let qmux = QMux::new();

    let clearer = {
        let q1 = q1.clone();
        thread::spawn(move || {
            for _ in 0..5 {
                thread::sleep(Duration::from_millis(10));
                q1.clear(false).unwrap();
            }
        })
    };

    let started = std::time::Instant::now();
    let result = qmux.poll(&[&h1, &h2], Timeout::Bounded(Duration::from_millis(100)));
    assert_eq!(result, Err(QueueError::TimedOut));
    assert!(started.elapsed() >= Duration::from_millis(100));

    clearer.join().unwrap();
}

/// P9 (QMUX liveness): a producer putting into a queue bound via a
/// readable-interest handle wakes a thread parked in `poll` within
/// bounded time, even when many unrelated producers are also running.
#[test]
fn p9_qmux_liveness_under_noise() {
    init_logging();
    let target: Cbq<i32> = Cbq::new(QueueConfig::new(4)).unwrap();
    let noise: Vec<Cbq<i32>> = (0..8).map(|_| Cbq::new(QueueConfig::new(4)).unwrap()).collect();

    let target_handle = PollHandle::new(Some(target.clone()), Interest::readable());
    let noise_handles: Vec<_> = noise
        .iter()
        .map(|q| PollHandle::new(Some(q.clone()), Interest::readable()))
        .collect();

    let mut sources: Vec<&dyn flow_queue::PollSource> = vec![&target_handle];
    for h in &noise_handles {
        sources.push(h);
    }

    let qmux = QMux::new();
    let (tx, rx) = channel();
    thread::scope(|scope| {
        scope.spawn(move || {
            tx.send(qmux.poll(&sources, Timeout::Bounded(Duration::from_secs(5))))
                .unwrap();
        });

        thread::sleep(Duration::from_millis(30));
        target.put(99, Timeout::NonBlocking).unwrap();

        let result = rx.recv_timeout(Duration::from_secs(2)).expect("poll did not return in time");
        assert_eq!(result, Ok(1));
    });
}

/// S6: register a bridge, produce into all three of its queues, drain
/// them through the registry's snapshot operations, then unregister.
#[test]
fn s6_registry_round_trip() {
    init_logging();
    let reg: flow_queue::BridgeQueueRegistry<i32, PacketIn> = flow_queue::BridgeQueueRegistry::new();
    let info = BridgeQueueInfo {
        up: QueueLimits::new(16, 16),
        data: QueueLimits::new(16, 16),
        down: QueueLimits::new(16, 16),
    };
    reg.register(1, "br0", info).unwrap();

    let handle = reg.lookup(1).unwrap();
    for i in 0..5 {
        handle.up_q.put(i, Timeout::NonBlocking).unwrap();
    }
    for i in 0..3 {
        handle
            .data_q
            .put(PacketIn { dpid: 1, port: i as u16 }, Timeout::NonBlocking)
            .unwrap();
    }
    for i in 0..2 {
        handle.down_q.put(100 + i, Timeout::NonBlocking).unwrap();
    }
    drop(handle);

    let mut drained_events = 0;
    let mut drained_packets = 0;
    let qmux = QMux::new();
    let n = flow_queue::loops::agent_wait_iteration(
        &reg,
        &qmux,
        Timeout::NonBlocking,
        |dpid, _role, events| {
            assert_eq!(dpid, 1);
            drained_events += events.len();
        },
        |dpid, packets| {
            assert_eq!(dpid, 1);
            drained_packets += packets.len();
        },
    )
    .unwrap();

    assert_eq!(n, 3); // up_q, data_q, and down_q each had something to drain.
    assert_eq!(drained_events, 5 + 2);
    assert_eq!(drained_packets, 3);

    reg.unregister(1).unwrap();
}
