/*!
 * Event Queue Tests
 * FIFO delivery, cross-thread posting, and multi-producer throughput
 */

use evcore::{Event, EventLoop, EventLoopManager, EventReceiver, PumpMode, ThreadEventQueue};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, OnceLock};
use std::thread;
use std::time::Duration;

struct Recorder {
    seen: Mutex<Vec<u64>>,
}

impl Recorder {
    fn new() -> Arc<Self> {
        Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
        })
    }
}

impl EventReceiver for Recorder {
    fn event(&self, event: Event) {
        if let Event::Custom(payload) = event {
            self.seen.lock().unwrap().push(*payload.downcast::<u64>().unwrap());
        }
    }
}

#[test]
fn test_same_thread_delivery_is_fifo() {
    let receiver = Recorder::new();
    let queue = ThreadEventQueue::current();
    for value in 0..10u64 {
        queue.post_event(&receiver, Event::Custom(Box::new(value)));
    }

    assert!(queue.has_pending_events());
    assert_eq!(queue.process(), 10);
    assert_eq!(*receiver.seen.lock().unwrap(), (0..10).collect::<Vec<u64>>());
}

#[test]
fn test_cross_thread_post_wakes_blocked_loop() {
    let (loop_tx, loop_rx) = mpsc::channel();
    let (count_tx, count_rx) = mpsc::channel();

    let handle = thread::spawn(move || {
        let receiver = Recorder::new();
        let event_loop = Arc::new(EventLoopManager::make_implementation());
        loop_tx.send((event_loop.clone(), receiver.clone())).unwrap();

        // Blocks in poll until the cross-thread post arrives.
        let processed = event_loop.pump(PumpMode::WaitForEvents);
        count_tx.send(processed).unwrap();
    });

    let (event_loop, receiver) = loop_rx.recv().unwrap();
    thread::sleep(Duration::from_millis(20));
    event_loop.post_event(&receiver, Event::Custom(Box::new(42u64)));

    // The next full iteration on the target thread must observe the event.
    assert_eq!(count_rx.recv().unwrap(), 1);
    handle.join().unwrap();
    assert_eq!(*receiver.seen.lock().unwrap(), vec![42]);
}

struct ProducerTracker {
    last_seq: Mutex<HashMap<usize, u64>>,
    total: AtomicUsize,
    expected: usize,
    event_loop: OnceLock<Arc<EventLoop>>,
}

impl EventReceiver for ProducerTracker {
    fn event(&self, event: Event) {
        let Event::Custom(payload) = event else {
            return;
        };
        let (producer, seq) = *payload.downcast::<(usize, u64)>().unwrap();

        let mut last_seq = self.last_seq.lock().unwrap();
        let last = last_seq.entry(producer).or_insert(0);
        assert_eq!(seq, *last + 1, "producer {producer} events out of order");
        *last = seq;
        drop(last_seq);

        if self.total.fetch_add(1, Ordering::Relaxed) + 1 == self.expected {
            self.event_loop.get().unwrap().quit(0);
        }
    }
}

#[test]
fn test_multi_producer_posts_are_counted_and_fifo_per_producer() {
    const PRODUCERS: usize = 8;
    const EVENTS_PER_PRODUCER: u64 = 250;

    let (loop_tx, loop_rx) = mpsc::channel();
    let handle = thread::spawn(move || {
        let receiver = Arc::new(ProducerTracker {
            last_seq: Mutex::new(HashMap::new()),
            total: AtomicUsize::new(0),
            expected: PRODUCERS * EVENTS_PER_PRODUCER as usize,
            event_loop: OnceLock::new(),
        });
        let event_loop = Arc::new(EventLoopManager::make_implementation());
        receiver.event_loop.set(event_loop.clone()).ok().unwrap();
        loop_tx.send((event_loop.clone(), receiver.clone())).unwrap();

        let code = event_loop.exec();
        (code, receiver)
    });

    let (event_loop, receiver) = loop_rx.recv().unwrap();
    let mut producers = Vec::new();
    for producer in 0..PRODUCERS {
        let event_loop = event_loop.clone();
        let receiver = receiver.clone();
        producers.push(thread::spawn(move || {
            for seq in 1..=EVENTS_PER_PRODUCER {
                event_loop.post_event(&receiver, Event::Custom(Box::new((producer, seq))));
            }
        }));
    }
    for producer in producers {
        producer.join().unwrap();
    }

    let (code, receiver) = handle.join().unwrap();
    assert_eq!(code, 0);
    assert_eq!(
        receiver.total.load(Ordering::Relaxed),
        PRODUCERS * EVENTS_PER_PRODUCER as usize
    );
}

#[test]
fn test_dead_receiver_event_is_not_counted() {
    let queue = ThreadEventQueue::current();
    let receiver = Recorder::new();
    queue.post_event(&receiver, Event::Custom(Box::new(1u64)));
    drop(receiver);

    assert_eq!(queue.process(), 0);
}
