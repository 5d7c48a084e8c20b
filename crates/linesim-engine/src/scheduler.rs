//! 事件排程器
//!
//! 以 `(時間, 序號)` 為鍵的最小堆。同一時刻的事件依排入順序派發，
//! 這個順序會影響分流器交替與合流公平性，必須保持穩定才能重現結果。

use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// 模擬時間（秒）
pub type SimTime = f64;

#[derive(Debug)]
struct Scheduled<E> {
    time: SimTime,
    seq: u64,
    event: E,
}

impl<E> PartialEq for Scheduled<E> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<E> Eq for Scheduled<E> {}

impl<E> PartialOrd for Scheduled<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E> Ord for Scheduled<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap 是最大堆，反轉比較取得最早事件
        other
            .time
            .total_cmp(&self.time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// 事件排程器（模擬時鐘）
#[derive(Debug)]
pub struct Scheduler<E> {
    now: SimTime,
    next_seq: u64,
    queue: BinaryHeap<Scheduled<E>>,
    dispatched: u64,
}

impl<E> Scheduler<E> {
    /// 創建時鐘位於 0 的排程器
    pub fn new() -> Self {
        Self {
            now: 0.0,
            next_seq: 0,
            queue: BinaryHeap::new(),
            dispatched: 0,
        }
    }

    /// 目前模擬時間
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// 已派發事件數
    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    /// 待處理事件數
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// 最早待處理事件的時間
    pub fn peek_time(&self) -> Option<SimTime> {
        self.queue.peek().map(|entry| entry.time)
    }

    /// 在絕對時間排入事件；早於目前時間者視為立即事件
    pub fn schedule_at(&mut self, time: SimTime, event: E) {
        let time = if time.is_nan() { self.now } else { time.max(self.now) };
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Scheduled { time, seq, event });
    }

    /// 延遲 `delay` 秒後排入事件
    pub fn schedule_after(&mut self, delay: SimTime, event: E) {
        self.schedule_at(self.now + delay.max(0.0), event);
    }

    /// 在目前時刻排入事件（排在同時刻既有事件之後）
    pub fn schedule_now(&mut self, event: E) {
        self.schedule_at(self.now, event);
    }

    /// 取出時間嚴格早於 `until` 的最早事件，並把時鐘推進到該事件時間
    pub fn pop_before(&mut self, until: SimTime) -> Option<E> {
        if self.queue.peek()?.time >= until {
            return None;
        }
        let entry = self.queue.pop()?;
        self.now = entry.time;
        self.dispatched += 1;
        Some(entry.event)
    }

    /// 依序派發所有早於 `until` 的事件，最後把時鐘設為 `until`
    ///
    /// 時間恰好等於 `until` 的事件保留到下一次推進。
    pub fn advance_to<Err, F>(&mut self, until: SimTime, mut dispatch: F) -> Result<(), Err>
    where
        F: FnMut(&mut Self, E) -> Result<(), Err>,
    {
        while let Some(event) = self.pop_before(until) {
            dispatch(self, event)?;
        }
        if until > self.now {
            self.now = until;
        }
        Ok(())
    }
}

impl<E> Default for Scheduler<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    fn drain(scheduler: &mut Scheduler<&'static str>, until: SimTime) -> Vec<(SimTime, &'static str)> {
        let mut seen = Vec::new();
        scheduler
            .advance_to(until, |s, event| {
                seen.push((s.now(), event));
                Ok::<(), Infallible>(())
            })
            .unwrap();
        seen
    }

    #[test]
    fn test_events_dispatch_in_time_order() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule_at(5.0, "c");
        scheduler.schedule_at(1.0, "a");
        scheduler.schedule_at(3.0, "b");

        let seen = drain(&mut scheduler, 10.0);
        assert_eq!(seen, vec![(1.0, "a"), (3.0, "b"), (5.0, "c")]);
        assert_eq!(scheduler.now(), 10.0);
        assert_eq!(scheduler.dispatched(), 3);
    }

    #[test]
    fn test_same_time_is_fifo() {
        let mut scheduler = Scheduler::new();
        for name in ["first", "second", "third", "fourth"] {
            scheduler.schedule_at(2.0, name);
        }

        let order: Vec<_> = drain(&mut scheduler, 3.0).into_iter().map(|(_, e)| e).collect();
        assert_eq!(order, vec!["first", "second", "third", "fourth"]);
    }

    #[test]
    fn test_events_at_horizon_stay_pending() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule_at(4.0, "boundary");
        scheduler.schedule_at(3.5, "inside");

        let seen = drain(&mut scheduler, 4.0);
        assert_eq!(seen, vec![(3.5, "inside")]);
        assert_eq!(scheduler.pending(), 1);
        assert_eq!(scheduler.now(), 4.0);

        let seen = drain(&mut scheduler, 5.0);
        assert_eq!(seen, vec![(4.0, "boundary")]);
    }

    #[test]
    fn test_dispatch_can_schedule_more_events() {
        let mut scheduler: Scheduler<u32> = Scheduler::new();
        scheduler.schedule_now(0);

        let mut fired = Vec::new();
        scheduler
            .advance_to(10.0, |s, n| {
                fired.push((s.now(), n));
                if n < 3 {
                    s.schedule_after(2.0, n + 1);
                    // 同時刻插入的事件排在既有事件之後
                    s.schedule_now(100 + n);
                }
                Ok::<(), Infallible>(())
            })
            .unwrap();

        assert_eq!(
            fired,
            vec![
                (0.0, 0),
                (0.0, 100),
                (2.0, 1),
                (2.0, 101),
                (4.0, 2),
                (4.0, 102),
                (6.0, 3)
            ]
        );
    }

    #[test]
    fn test_past_events_are_clamped_to_now() {
        let mut scheduler = Scheduler::new();
        drain(&mut scheduler, 10.0);
        scheduler.schedule_at(2.0, "late");
        scheduler.schedule_after(-1.0, "negative");
        assert_eq!(scheduler.peek_time(), Some(10.0));

        let seen = drain(&mut scheduler, 11.0);
        assert_eq!(seen, vec![(10.0, "late"), (10.0, "negative")]);
    }

    #[test]
    fn test_dispatch_error_stops_advance() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule_at(1.0, "ok");
        scheduler.schedule_at(2.0, "fail");
        scheduler.schedule_at(3.0, "never");

        let result = scheduler.advance_to(10.0, |_, event| {
            if event == "fail" {
                Err(event)
            } else {
                Ok(())
            }
        });

        assert_eq!(result, Err("fail"));
        assert_eq!(scheduler.now(), 2.0);
        assert_eq!(scheduler.pending(), 1);
    }
}
