//! Module implement the change-notification core.
//!
//! Every watched key maps to a set of subscribers. Each subscriber is
//! handed a [Notifier], a two-stage event queue: committed changes are
//! posted on an unbounded inner queue which a background thread drains
//! into a bounded front channel. The committing writer therefore never
//! blocks on a slow consumer; under sustained backlog the inner queue
//! grows without bound.

use log::debug;

use std::{
    collections::{HashMap, VecDeque},
    sync::{mpsc, Arc, Mutex, MutexGuard, RwLock, Weak},
    time,
};

use crate::{record::Value, util::thread, Error, Result};

/// Default capacity for a notifier's bounded front channel.
pub const CHAN_SIZE: usize = 64;

/// Event type, one committed change to a watched key.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Event {
    /// The touched key.
    pub key: Vec<u8>,
    /// Payload of the version created by the committing batch.
    pub value: Value,
    /// Revision that created this version.
    pub created: u64,
    /// Revision of the database when the batch committed.
    pub current: u64,
}

type Res = Result<Event>;

pub(crate) fn canceled() -> Error {
    Error::NotifierCanceled("notify".to_string(), "notifier is shut down".to_string())
}

pub(crate) fn deleted() -> Error {
    Error::PairDeleted("notify".to_string(), "key/value pair deleted".to_string())
}

fn lock<T>(mu: &Mutex<T>) -> MutexGuard<T> {
    match mu.lock() {
        Ok(guard) => guard,
        Err(poison) => poison.into_inner(),
    }
}

// Sending half of a notifier, registered with a stream or held by a
// range worker. Once sealed, events are silently dropped.
#[derive(Debug)]
pub(crate) struct NotifierTx {
    seal: Arc<Mutex<bool>>,
    tx: thread::Tx<Res>,
}

impl Clone for NotifierTx {
    fn clone(&self) -> NotifierTx {
        NotifierTx {
            seal: Arc::clone(&self.seal),
            tx: self.tx.clone(),
        }
    }
}

impl NotifierTx {
    // Return false when the notifier is shut down, the event is dropped.
    pub(crate) fn send(&self, event: Event) -> bool {
        let sealed = lock(&self.seal);
        if *sealed {
            false
        } else {
            self.tx.post(Ok(event)).is_ok()
        }
    }

    // Push the terminal sentinel and stop accepting events. Idempotent.
    pub(crate) fn close(&self, err: Error) {
        let mut sealed = lock(&self.seal);
        if !*sealed {
            self.tx.post(Err(err)).ok();
            *sealed = true;
        }
    }
}

/// Notifier type, the consumer end of one subscription.
///
/// Events arrive in commit order. The stream ends with a terminal
/// sentinel, either [PairDeleted][Error::PairDeleted] when the watched
/// key is deleted, or [NotifierCanceled][Error::NotifierCanceled] when
/// the subscription is canceled or a range scan completes. Iterating a
/// notifier yields `Result<Event>` items, the terminal sentinel is the
/// last item.
#[derive(Debug)]
pub struct Notifier {
    id: u64,
    tx: Option<NotifierTx>,
    stream: Weak<Stream>,
    out_rx: Option<mpsc::Receiver<Res>>,
    th: Option<thread::Thread<Res, ()>>,
    done: bool,
}

impl Notifier {
    fn new(id: u64, chan_size: usize, stream: Weak<Stream>) -> (Notifier, NotifierTx) {
        let (out_tx, out_rx) = mpsc::sync_channel(chan_size);
        let th = thread::Thread::new(
            "notifier",
            move |rx: thread::Rx<Res>| move || queue(rx, out_tx),
        );
        let tx = NotifierTx {
            seal: Arc::new(Mutex::new(false)),
            tx: th.to_tx(),
        };

        let notifier = Notifier {
            id,
            tx: Some(tx.clone()),
            stream,
            out_rx: Some(out_rx),
            th: Some(th),
            done: false,
        };
        (notifier, tx)
    }

    // Notifier for streaming workers, not registered with any stream.
    pub(crate) fn unregistered(chan_size: usize) -> (Notifier, NotifierTx) {
        Notifier::new(1, chan_size, Weak::new())
    }

    /// Return the subscriber id, unique within one key's subscriber set.
    pub fn to_id(&self) -> u64 {
        self.id
    }

    /// Block until the next event, or the terminal sentinel, arrives.
    /// Once the stream is shut down return
    /// [NotifierCanceled][Error::NotifierCanceled].
    pub fn recv(&self) -> Result<Event> {
        if self.tx.is_none() {
            return Err(canceled());
        }
        match self.out_rx.as_ref() {
            Some(out_rx) => match out_rx.recv() {
                Ok(res) => res,
                Err(_) => Err(canceled()),
            },
            None => Err(canceled()),
        }
    }

    /// Variant of [recv][Notifier::recv] that waits at most `timeout`.
    /// Return none on timeout.
    pub fn recv_timeout(&self, timeout: time::Duration) -> Option<Result<Event>> {
        if self.tx.is_none() {
            return Some(Err(canceled()));
        }
        match self.out_rx.as_ref() {
            Some(out_rx) => match out_rx.recv_timeout(timeout) {
                Ok(res) => Some(res),
                Err(mpsc::RecvTimeoutError::Timeout) => None,
                Err(mpsc::RecvTimeoutError::Disconnected) => Some(Err(canceled())),
            },
            None => Some(Err(canceled())),
        }
    }

    /// Cancel this subscription. Cancel returns immediately, is
    /// idempotent, and the consumer side shall observe the
    /// [NotifierCanceled][Error::NotifierCanceled] sentinel next.
    pub fn cancel(&mut self) {
        if let Some(stream) = self.stream.upgrade() {
            stream.unregister(self.id);
        }
        if let Some(tx) = self.tx.take() {
            tx.close(canceled());
        }
    }
}

impl Iterator for Notifier {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.tx.is_none() {
            // locally canceled, skip whatever is in flight.
            self.done = true;
            return Some(Err(canceled()));
        }
        match self.out_rx.as_ref() {
            Some(out_rx) => match out_rx.recv() {
                Ok(res) => {
                    if res.is_err() {
                        self.done = true;
                    }
                    Some(res)
                }
                Err(_) => {
                    self.done = true;
                    None
                }
            },
            None => {
                self.done = true;
                None
            }
        }
    }
}

impl Drop for Notifier {
    fn drop(&mut self) {
        self.cancel();
        // unblock the drain thread's final flush, then join it.
        self.out_rx.take();
        self.th.take();
    }
}

// Drain loop, moves events from the unbounded inner queue into the
// bounded front channel. Events held in `pending` preserve arrival
// order. The loop exits, closing the front channel, after forwarding a
// terminal sentinel, or once the inner queue disconnects and pending
// events are flushed.
fn queue(in_rx: thread::Rx<Res>, out_tx: mpsc::SyncSender<Res>) {
    let mut pending: VecDeque<Res> = VecDeque::with_capacity(CHAN_SIZE);

    'main: loop {
        if pending.is_empty() {
            match in_rx.recv() {
                Ok(res) => pending.push_back(res),
                Err(_) => break 'main,
            }
        }
        // accept whatever is already queued upstream, without blocking.
        loop {
            match in_rx.try_recv() {
                Ok(res) => pending.push_back(res),
                Err(mpsc::TryRecvError::Empty) => break,
                Err(mpsc::TryRecvError::Disconnected) => break 'main,
            }
        }
        if let Some(res) = pending.pop_front() {
            if res.is_err() {
                // terminal sentinel, deliver and close the stream.
                out_tx.send(res).ok();
                return;
            }
            match out_tx.try_send(res) {
                Ok(_) => (),
                Err(mpsc::TrySendError::Full(res)) => {
                    pending.push_front(res);
                    // keep accepting upstream while the consumer lags.
                    match in_rx.recv_timeout(time::Duration::from_millis(1)) {
                        Ok(res) => pending.push_back(res),
                        Err(mpsc::RecvTimeoutError::Timeout) => (),
                        Err(mpsc::RecvTimeoutError::Disconnected) => break 'main,
                    }
                }
                Err(mpsc::TrySendError::Disconnected(_)) => return,
            }
        }
    }

    // input side gone, flush whatever is pending, blocking.
    for res in pending.into_iter() {
        let done = res.is_err();
        if out_tx.send(res).is_err() || done {
            break;
        }
    }
}

// Per-key subscriber set.
#[derive(Default, Debug)]
pub(crate) struct Stream {
    inner: Mutex<StreamInner>,
}

#[derive(Default, Debug)]
struct StreamInner {
    num: u64,
    notifiers: HashMap<u64, NotifierTx>,
}

impl Stream {
    fn register(stream: &Arc<Stream>, chan_size: usize) -> Notifier {
        let mut inner = lock(&stream.inner);
        inner.num += 1;
        let (notifier, tx) = Notifier::new(inner.num, chan_size, Arc::downgrade(stream));
        let num = inner.num;
        inner.notifiers.insert(num, tx);
        notifier
    }

    pub(crate) fn unregister(&self, id: u64) {
        let mut inner = lock(&self.inner);
        inner.notifiers.remove(&id);
    }

    fn notify(&self, event: Event) {
        let inner = lock(&self.inner);
        for tx in inner.notifiers.values() {
            tx.send(event.clone());
        }
    }

    fn close(&self, err: Error) {
        let mut inner = lock(&self.inner);
        for (_, tx) in inner.notifiers.drain() {
            tx.close(err.clone());
        }
        inner.num = 0;
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        lock(&self.inner).notifiers.len()
    }
}

// Registry of watched keys. Publishers (the committing writer) take the
// read lock; subscribe and delete-on-key take the write lock.
#[derive(Debug)]
pub(crate) struct Registry {
    streams: RwLock<HashMap<Vec<u8>, Arc<Stream>>>,
}

impl Registry {
    pub(crate) fn new() -> Registry {
        Registry {
            streams: RwLock::new(HashMap::new()),
        }
    }

    pub(crate) fn register(&self, key: Vec<u8>, chan_size: usize) -> Notifier {
        let mut streams = match self.streams.write() {
            Ok(streams) => streams,
            Err(poison) => poison.into_inner(),
        };
        let stream = streams.entry(key).or_insert_with(|| Arc::new(Stream::default()));
        Stream::register(stream, chan_size)
    }

    pub(crate) fn publish(&self, event: Event) {
        let stream = {
            let streams = match self.streams.read() {
                Ok(streams) => streams,
                Err(poison) => poison.into_inner(),
            };
            streams.get(&event.key).map(Arc::clone)
        };
        if let Some(stream) = stream {
            stream.notify(event)
        }
    }

    // The watched key got deleted, close its subscriber set. Later
    // subscriptions for the same key start a fresh set.
    pub(crate) fn close_key(&self, key: &[u8]) {
        let stream = {
            let mut streams = match self.streams.write() {
                Ok(streams) => streams,
                Err(poison) => poison.into_inner(),
            };
            streams.remove(key)
        };
        if let Some(stream) = stream {
            debug!(target: "mvdb", "closing watchers for {:?}", key);
            stream.close(deleted())
        }
    }
}

#[cfg(test)]
#[path = "notify_test.rs"]
mod notify_test;
