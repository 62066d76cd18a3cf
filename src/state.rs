//! Item lists and the notification path shared by the queue and its
//! completion tokens.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};

use crate::message::{Completed, MessageId, ProcessingResult};

/// Callback that receives every terminal notification.
pub type Notifier<M, R> = Box<dyn FnMut(Completed<M, R>)>;

/// One admitted message while the queue tracks it.
pub(crate) struct QueueItem<M> {
    pub(crate) id: MessageId,
    pub(crate) message: M,
    pub(crate) enqueued_at: Instant,
    pub(crate) processing_started_at: Option<Instant>,
}

impl<M> QueueItem<M> {
    pub(crate) fn new(id: MessageId, message: M, enqueued_at: Instant) -> Self {
        Self {
            id,
            message,
            enqueued_at,
            processing_started_at: None,
        }
    }
}

/// Which timestamp a deadline is measured from.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Stamp {
    Enqueued,
    ProcessingStarted,
}

impl Stamp {
    fn of<M>(self, item: &QueueItem<M>) -> Option<Instant> {
        match self {
            Stamp::Enqueued => Some(item.enqueued_at),
            Stamp::ProcessingStarted => item.processing_started_at,
        }
    }
}

/// Append-only list keyed by admission order.
///
/// `ordered` stays true while every appended timestamp is at or after the
/// previous one. Early-exit sweeps depend on it.
pub(crate) struct ItemList<M> {
    items: BTreeMap<u64, QueueItem<M>>,
    last_stamp: Option<Instant>,
    ordered: bool,
    name: &'static str,
}

impl<M> ItemList<M> {
    fn new(name: &'static str) -> Self {
        Self {
            items: BTreeMap::new(),
            last_stamp: None,
            ordered: true,
            name,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn is_ordered(&self) -> bool {
        self.ordered
    }

    pub(crate) fn contains(&self, key: u64) -> bool {
        self.items.contains_key(&key)
    }

    pub(crate) fn last_key(&self) -> Option<u64> {
        self.items.last_key_value().map(|(key, _)| *key)
    }

    fn push(&mut self, key: u64, stamp: Instant, item: QueueItem<M>) {
        if let Some(last) = self.last_stamp {
            if stamp < last && self.ordered {
                tracing::warn!(
                    list = self.name,
                    "Clock went backwards, timeout sweeps fall back to full scans"
                );
                self.ordered = false;
            }
        }
        self.last_stamp = Some(self.last_stamp.map_or(stamp, |last| last.max(stamp)));
        self.items.insert(key, item);
    }

    pub(crate) fn remove(&mut self, key: u64) -> Option<QueueItem<M>> {
        let item = self.items.remove(&key);
        self.reset_if_empty();
        item
    }

    /// Remove the head if its key is at most `bound`.
    pub(crate) fn pop_front_until(&mut self, bound: u64) -> Option<QueueItem<M>> {
        let key = match self.items.first_key_value() {
            Some((key, _)) if *key <= bound => *key,
            _ => return None,
        };
        self.remove(key)
    }

    /// Remove every item in list order.
    pub(crate) fn drain(&mut self) -> Vec<QueueItem<M>> {
        let items = std::mem::take(&mut self.items);
        self.reset_if_empty();
        items.into_values().collect()
    }

    /// Remove every item whose age, measured from `stamp`, has reached
    /// `deadline`.
    ///
    /// With `early_exit` the scan stops at the first live item, which is only
    /// sound while the list is ordered on that same stamp.
    pub(crate) fn take_expired(
        &mut self,
        now: Instant,
        deadline: Duration,
        stamp: Stamp,
        early_exit: bool,
    ) -> Vec<QueueItem<M>> {
        let early_exit = early_exit && self.ordered;
        let mut expired = Vec::new();

        for (key, item) in &self.items {
            let Some(at) = stamp.of(item) else {
                continue;
            };

            if now.saturating_duration_since(at) >= deadline {
                expired.push(*key);
            } else if early_exit {
                break;
            }
        }

        let items = expired
            .into_iter()
            .filter_map(|key| self.items.remove(&key))
            .collect();
        self.reset_if_empty();
        items
    }

    fn reset_if_empty(&mut self) {
        if self.items.is_empty() {
            self.last_stamp = None;
            self.ordered = true;
        }
    }
}

/// Both lists plus the key sequence that orders them.
pub(crate) struct Lists<M> {
    pub(crate) pending: ItemList<M>,
    pub(crate) in_progress: ItemList<M>,
    next_key: u64,
}

impl<M> Lists<M> {
    fn new() -> Self {
        Self {
            pending: ItemList::new("pending"),
            in_progress: ItemList::new("in_progress"),
            next_key: 0,
        }
    }

    fn next_key(&mut self) -> u64 {
        let key = self.next_key;
        self.next_key += 1;
        key
    }

    pub(crate) fn admit_pending(&mut self, item: QueueItem<M>) -> u64 {
        let key = self.next_key();
        self.pending.push(key, item.enqueued_at, item);
        key
    }

    pub(crate) fn admit_in_progress(&mut self, item: QueueItem<M>, started_at: Instant) -> u64 {
        let key = self.next_key();
        self.in_progress.push(key, started_at, item);
        key
    }
}

/// State reachable from both the queue and outstanding completion tokens.
pub(crate) struct Shared<M, R> {
    pub(crate) lists: RefCell<Lists<M>>,
    notifier: RefCell<Option<Notifier<M, R>>>,
    outbox: RefCell<VecDeque<Completed<M, R>>>,
    delivering: Cell<bool>,
}

impl<M, R> Shared<M, R> {
    pub(crate) fn new(notifier: Option<Notifier<M, R>>) -> Self {
        Self {
            lists: RefCell::new(Lists::new()),
            notifier: RefCell::new(notifier),
            outbox: RefCell::new(VecDeque::new()),
            delivering: Cell::new(false),
        }
    }

    /// Complete a dispatched item. Returns false if the item is no longer in
    /// progress.
    pub(crate) fn complete_in_progress(
        &self,
        key: u64,
        result: ProcessingResult,
        reason: Option<R>,
    ) -> bool {
        let item = self.lists.borrow_mut().in_progress.remove(key);

        match item {
            Some(item) => {
                tracing::debug!(message_id = %item.id, result = %result, "Message completed");
                self.finish(item, result, reason);
                true
            }
            None => false,
        }
    }

    /// Deliver the terminal notification for an item that has already left
    /// both lists.
    pub(crate) fn finish(&self, item: QueueItem<M>, result: ProcessingResult, reason: Option<R>) {
        self.deliver(Completed {
            id: item.id,
            message: item.message,
            result,
            reason,
        });
    }

    pub(crate) fn finish_all(&self, items: Vec<QueueItem<M>>, result: ProcessingResult) {
        for item in items {
            self.finish(item, result, None);
        }
    }

    /// Notifications raised while one is being delivered are queued and sent
    /// in order once it returns, so the notifier is never re-entered.
    fn deliver(&self, completed: Completed<M, R>) {
        self.outbox.borrow_mut().push_back(completed);

        if self.delivering.replace(true) {
            return;
        }
        // Cleared on unwind too, or a panicking notifier would park every
        // later notification in the outbox.
        let _delivering = DeliveringGuard(&self.delivering);

        loop {
            let next = self.outbox.borrow_mut().pop_front();
            let Some(completed) = next else {
                break;
            };

            let mut notifier = self.notifier.borrow_mut();
            match notifier.as_mut() {
                Some(notify) => notify(completed),
                None => {
                    tracing::trace!(message_id = %completed.id, "No completion callback registered")
                }
            }
        }
    }
}

struct DeliveringGuard<'a>(&'a Cell<bool>);

impl Drop for DeliveringGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    fn item(n: u32, at: Instant) -> QueueItem<u32> {
        QueueItem::new(MessageId::new(), n, at)
    }

    fn messages(items: &[QueueItem<u32>]) -> Vec<u32> {
        items.iter().map(|item| item.message).collect()
    }

    #[test]
    fn test_out_of_order_stamp_forces_full_scan() {
        let start = Instant::now();
        let mut lists = Lists::new();
        lists.admit_pending(item(1, start));
        lists.admit_pending(item(2, start + Duration::from_secs(5)));
        lists.admit_pending(item(3, start + Duration::from_secs(1)));

        // Out-of-order stamp disables the early exit.
        assert!(!lists.pending.is_ordered());

        let expired = lists.pending.take_expired(
            start + Duration::from_secs(3),
            Duration::from_secs(2),
            Stamp::Enqueued,
            true,
        );
        assert_eq!(messages(&expired), vec![1, 3]);
        assert_eq!(lists.pending.len(), 1);
    }

    #[test]
    fn test_take_expired_early_exit_when_ordered() {
        let start = Instant::now();
        let mut list = ItemList::new("test");
        list.push(0, start, item(1, start));
        list.push(1, start + Duration::from_secs(2), item(2, start + Duration::from_secs(2)));
        // Stamp says ordered, but the item itself is older; an ordered scan
        // trusts the stamp order and stops at the live item before it.
        list.push(2, start + Duration::from_secs(3), item(3, start));

        let expired =
            list.take_expired(start + Duration::from_secs(2), Duration::from_secs(1), Stamp::Enqueued, true);
        assert_eq!(messages(&expired), vec![1]);

        let expired =
            list.take_expired(start + Duration::from_secs(2), Duration::from_secs(1), Stamp::Enqueued, false);
        assert_eq!(messages(&expired), vec![3]);
    }

    #[test]
    fn test_ordering_resets_when_list_empties() {
        let start = Instant::now();
        let mut lists = Lists::new();
        lists.admit_pending(item(1, start + Duration::from_secs(5)));
        lists.admit_pending(item(2, start));
        assert!(!lists.pending.is_ordered());

        assert_eq!(lists.pending.drain().len(), 2);
        assert!(lists.pending.is_ordered());
        assert!(lists.pending.is_empty());
    }

    #[test]
    fn test_pop_front_until_respects_bound() {
        let start = Instant::now();
        let mut lists = Lists::new();
        let first = lists.admit_pending(item(1, start));
        lists.admit_pending(item(2, start));

        assert_eq!(lists.pending.pop_front_until(first).map(|i| i.message), Some(1));
        assert!(lists.pending.pop_front_until(first).is_none());
        assert_eq!(lists.pending.len(), 1);
    }

    #[test]
    fn test_processing_stamp_skips_unstarted_items() {
        let start = Instant::now();
        let mut list = ItemList::new("test");
        list.push(0, start, item(1, start));

        let expired = list.take_expired(
            start + Duration::from_secs(60),
            Duration::from_secs(1),
            Stamp::ProcessingStarted,
            true,
        );
        assert!(expired.is_empty());
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_nested_notifications_are_delivered_in_order() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let shared: Rc<Shared<u32, String>> = Rc::new(Shared::new(None));

        let start = Instant::now();
        let first = shared.lists.borrow_mut().admit_in_progress(item(1, start), start);
        let second = shared.lists.borrow_mut().admit_in_progress(item(2, start), start);

        let weak = Rc::downgrade(&shared);
        let log = seen.clone();
        *shared.notifier.borrow_mut() = Some(Box::new(move |completed: Completed<u32, String>| {
            log.borrow_mut().push(completed.message);
            if completed.message == 1 {
                // Completing another item from inside the notifier.
                let shared = weak.upgrade().unwrap();
                assert!(shared.complete_in_progress(second, ProcessingResult::Success, None));
                assert_eq!(log.borrow().len(), 1);
            }
        }));

        assert!(shared.complete_in_progress(first, ProcessingResult::Success, None));
        assert_eq!(*seen.borrow(), vec![1, 2]);
        assert!(!shared.complete_in_progress(second, ProcessingResult::Success, None));
    }

    #[test]
    fn test_delivery_resumes_after_notifier_panic() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let shared: Rc<Shared<u32, String>> = Rc::new(Shared::new(None));

        let start = Instant::now();
        let first = shared.lists.borrow_mut().admit_in_progress(item(1, start), start);
        let second = shared.lists.borrow_mut().admit_in_progress(item(2, start), start);

        let log = seen.clone();
        *shared.notifier.borrow_mut() = Some(Box::new(move |completed: Completed<u32, String>| {
            if completed.message == 1 {
                panic!("notifier failed");
            }
            log.borrow_mut().push(completed.message);
        }));

        let panicked = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            shared.complete_in_progress(first, ProcessingResult::Success, None)
        }));
        assert!(panicked.is_err());
        assert!(!shared.delivering.get());

        assert!(shared.complete_in_progress(second, ProcessingResult::Success, None));
        assert_eq!(*seen.borrow(), vec![2]);
    }
}
