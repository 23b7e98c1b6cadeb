use std::time;

use super::*;

fn event_of(key: &[u8], val: i64, created: u64, current: u64) -> Event {
    Event {
        key: key.to_vec(),
        value: Value::Numeric(val),
        created,
        current,
    }
}

#[test]
fn test_notifier_basic() {
    let registry = Registry::new();
    let notifier = registry.register(b"k1".to_vec(), CHAN_SIZE);

    registry.publish(event_of(b"k1", 1, 1, 1));
    registry.publish(event_of(b"k1", 2, 2, 2));

    assert_eq!(notifier.recv().unwrap(), event_of(b"k1", 1, 1, 1));
    assert_eq!(notifier.recv().unwrap(), event_of(b"k1", 2, 2, 2));

    // nothing else pending.
    assert!(notifier
        .recv_timeout(time::Duration::from_millis(10))
        .is_none());
}

#[test]
fn test_notifier_fanout() {
    let registry = Registry::new();
    let n1 = registry.register(b"k1".to_vec(), CHAN_SIZE);
    let n2 = registry.register(b"k1".to_vec(), CHAN_SIZE);
    let other = registry.register(b"k2".to_vec(), CHAN_SIZE);

    assert_ne!(n1.to_id(), n2.to_id());

    for i in 1..=10 {
        registry.publish(event_of(b"k1", i, i as u64, i as u64));
    }

    for notifier in [&n1, &n2].iter() {
        for i in 1..=10 {
            assert_eq!(notifier.recv().unwrap(), event_of(b"k1", i, i as u64, i as u64));
        }
    }
    // subscriber of another key sees nothing.
    assert!(other
        .recv_timeout(time::Duration::from_millis(10))
        .is_none());
}

#[test]
fn test_notifier_backlog() {
    // push far beyond the front-channel capacity before consuming,
    // the inner queue grows and nothing is lost or reordered.
    let registry = Registry::new();
    let notifier = registry.register(b"k1".to_vec(), CHAN_SIZE);

    let n = (CHAN_SIZE as i64) * 50;
    for i in 0..n {
        registry.publish(event_of(b"k1", i, i as u64 + 1, n as u64));
    }

    for i in 0..n {
        assert_eq!(
            notifier.recv().unwrap(),
            event_of(b"k1", i, i as u64 + 1, n as u64)
        );
    }
}

#[test]
fn test_notifier_pair_deleted() {
    let registry = Registry::new();
    let notifier = registry.register(b"k1".to_vec(), CHAN_SIZE);

    registry.publish(event_of(b"k1", 1, 1, 1));
    registry.close_key(b"k1");

    // events already queued are delivered, then the sentinel.
    let mut items = notifier.collect::<Vec<Result<Event>>>();
    assert_eq!(items.len(), 2);
    assert_eq!(items.remove(0).unwrap(), event_of(b"k1", 1, 1, 1));
    assert_eq!(items.remove(0).unwrap_err().to_name(), "PairDeleted");

    // a later publish on the same key goes nowhere.
    registry.publish(event_of(b"k1", 2, 2, 2));

    // a fresh subscription starts a new set.
    let notifier = registry.register(b"k1".to_vec(), CHAN_SIZE);
    registry.publish(event_of(b"k1", 3, 3, 3));
    assert_eq!(notifier.recv().unwrap(), event_of(b"k1", 3, 3, 3));
}

#[test]
fn test_notifier_cancel() {
    let registry = Registry::new();
    let mut notifier = registry.register(b"k1".to_vec(), CHAN_SIZE);

    registry.publish(event_of(b"k1", 1, 1, 1));
    notifier.cancel();
    notifier.cancel(); // idempotent

    assert_eq!(notifier.recv().unwrap_err().to_name(), "NotifierCanceled");

    // events after cancel are dropped on the sending side.
    registry.publish(event_of(b"k1", 2, 2, 2));
    assert_eq!(notifier.recv().unwrap_err().to_name(), "NotifierCanceled");
}

#[test]
fn test_notifier_cancel_iterator() {
    let registry = Registry::new();
    let mut notifier = registry.register(b"k1".to_vec(), CHAN_SIZE);
    notifier.cancel();

    let items = notifier.collect::<Vec<Result<Event>>>();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].as_ref().unwrap_err().to_name(), "NotifierCanceled");
}

#[test]
fn test_stream_unregister() {
    let registry = Registry::new();
    let streams = {
        let mut n1 = registry.register(b"k1".to_vec(), CHAN_SIZE);
        let _n2 = registry.register(b"k1".to_vec(), CHAN_SIZE);

        let stream = {
            let streams = registry.streams.read().unwrap();
            Arc::clone(streams.get(&b"k1".to_vec()).unwrap())
        };
        assert_eq!(stream.len(), 2);

        n1.cancel();
        assert_eq!(stream.len(), 1);
        stream
    };
    // dropping a notifier without explicit cancel also unregisters.
    assert_eq!(streams.len(), 0);
}

#[test]
fn test_unregistered_notifier() {
    let (notifier, tx) = Notifier::unregistered(4);
    assert!(tx.send(event_of(b"k", 1, 1, 1)));
    tx.close(canceled());
    assert!(!tx.send(event_of(b"k", 2, 2, 2)));
    tx.close(canceled()); // idempotent

    assert_eq!(notifier.recv().unwrap(), event_of(b"k", 1, 1, 1));
    assert_eq!(notifier.recv().unwrap_err().to_name(), "NotifierCanceled");
}
