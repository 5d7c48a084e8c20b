//! 緩衝區
//!
//! 兩種緩衝區都實作同一個 [`PartBuffer`] 能力介面，呼叫端只依賴介面：
//! - [`BoundedQueue`]：一般有界佇列（容量為 `None` 時不設上限）
//! - [`DelayBuffer`]：輸送延遲緩衝區，以令牌池同時限制在途與就緒工件

use std::collections::VecDeque;

use linesim_core::{ChannelKind, ChannelSpec, Part};

use crate::line::{Event, ProcessId};
use crate::scheduler::Scheduler;

/// 緩衝區索引
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub usize);

/// `put` 的結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutStatus {
    /// 已立即放入
    Done,
    /// 放入尚未完成；完成時會喚醒呼叫者
    Pending,
}

/// 緩衝區能力介面
pub trait PartBuffer {
    fn name(&self) -> &str;

    /// 名目容量；`None` 表示不設上限
    fn capacity(&self) -> Option<usize>;

    /// 就緒（可取出）的工件數
    fn ready_count(&self) -> usize;

    /// 在途工件數
    fn in_transit_count(&self) -> usize {
        0
    }

    /// 還能接受的工件數（不設上限時為 `usize::MAX`）
    fn free_capacity(&self) -> usize;

    /// 累計進入就緒佇列的工件數
    fn accepted(&self) -> u64;

    /// 排隊等待放入的工件數
    fn pending_puts(&self) -> usize;

    /// 不等待的放入；無空間時退回工件
    fn try_put(&mut self, part: Part, sched: &mut Scheduler<Event>) -> Result<(), Part>;

    /// 放入工件，空間不足時排隊等待
    fn put(&mut self, part: Part, waiter: ProcessId, sched: &mut Scheduler<Event>) -> PutStatus;

    /// 不等待的取出
    fn try_get(&mut self, sched: &mut Scheduler<Event>) -> Option<Part>;

    /// 取出工件；沒有就緒工件時登記等待，工件到達時喚醒 `waiter` 重試
    fn get(&mut self, waiter: ProcessId, sched: &mut Scheduler<Event>) -> Option<Part>;
}

/// 一般有界佇列
#[derive(Debug)]
pub struct BoundedQueue {
    name: String,
    capacity: Option<usize>,
    ready: VecDeque<Part>,
    putters: VecDeque<(ProcessId, Part)>,
    getters: VecDeque<ProcessId>,
    accepted: u64,
}

impl BoundedQueue {
    pub fn new(name: impl Into<String>, capacity: Option<usize>) -> Self {
        Self {
            name: name.into(),
            capacity,
            ready: VecDeque::new(),
            putters: VecDeque::new(),
            getters: VecDeque::new(),
            accepted: 0,
        }
    }

    fn has_space(&self) -> bool {
        self.capacity.map_or(true, |cap| self.ready.len() < cap)
    }

    fn push_ready(&mut self, part: Part, sched: &mut Scheduler<Event>) {
        self.ready.push_back(part);
        self.accepted += 1;
        if let Some(getter) = self.getters.pop_front() {
            sched.schedule_now(Event::Resume(getter));
        }
    }
}

impl PartBuffer for BoundedQueue {
    fn name(&self) -> &str {
        &self.name
    }

    fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    fn ready_count(&self) -> usize {
        self.ready.len()
    }

    fn free_capacity(&self) -> usize {
        self.capacity
            .map_or(usize::MAX, |cap| cap.saturating_sub(self.ready.len()))
    }

    fn accepted(&self) -> u64 {
        self.accepted
    }

    fn pending_puts(&self) -> usize {
        self.putters.len()
    }

    fn try_put(&mut self, part: Part, sched: &mut Scheduler<Event>) -> Result<(), Part> {
        if self.has_space() && self.putters.is_empty() {
            self.push_ready(part, sched);
            Ok(())
        } else {
            Err(part)
        }
    }

    fn put(&mut self, part: Part, waiter: ProcessId, sched: &mut Scheduler<Event>) -> PutStatus {
        match self.try_put(part, sched) {
            Ok(()) => PutStatus::Done,
            Err(part) => {
                self.putters.push_back((waiter, part));
                PutStatus::Pending
            }
        }
    }

    fn try_get(&mut self, sched: &mut Scheduler<Event>) -> Option<Part> {
        let part = self.ready.pop_front()?;
        // 騰出空間：依序接納等待中的放入
        if let Some((putter, pending)) = self.putters.pop_front() {
            self.push_ready(pending, sched);
            sched.schedule_now(Event::Resume(putter));
        }
        Some(part)
    }

    fn get(&mut self, waiter: ProcessId, sched: &mut Scheduler<Event>) -> Option<Part> {
        let part = self.try_get(sched);
        if part.is_none() {
            self.getters.push_back(waiter);
        }
        part
    }
}

/// 輸送延遲緩衝區
///
/// `put` 先從容量大小的令牌池取得一個令牌（沒有就等待），工件在途
/// `delay` 秒後進入就緒佇列，令牌持續保留；`get` 取走工件時才歸還令牌。
/// 因此 `ready + in_transit <= capacity` 永遠成立。
#[derive(Debug)]
pub struct DelayBuffer {
    id: ChannelId,
    name: String,
    capacity: usize,
    delay: f64,
    tokens: usize,
    in_transit: usize,
    ready: VecDeque<Part>,
    putters: VecDeque<(ProcessId, Part)>,
    getters: VecDeque<ProcessId>,
    accepted: u64,
}

impl DelayBuffer {
    pub fn new(id: ChannelId, name: impl Into<String>, capacity: usize, delay: f64) -> Self {
        Self {
            id,
            name: name.into(),
            capacity,
            delay,
            tokens: capacity,
            in_transit: 0,
            ready: VecDeque::new(),
            putters: VecDeque::new(),
            getters: VecDeque::new(),
            accepted: 0,
        }
    }

    pub fn delay(&self) -> f64 {
        self.delay
    }

    fn start_transit(&mut self, part: Part, waiter: Option<ProcessId>, sched: &mut Scheduler<Event>) {
        self.tokens -= 1;
        self.in_transit += 1;
        sched.schedule_after(
            self.delay,
            Event::TransitComplete {
                channel: self.id,
                part,
                waiter,
            },
        );
    }

    /// 在途時間結束：工件進入就緒佇列並喚醒放入者
    pub(crate) fn complete_transit(
        &mut self,
        part: Part,
        waiter: Option<ProcessId>,
        sched: &mut Scheduler<Event>,
    ) {
        self.in_transit -= 1;
        self.ready.push_back(part);
        self.accepted += 1;
        debug_assert!(self.ready.len() + self.in_transit <= self.capacity);

        if let Some(getter) = self.getters.pop_front() {
            sched.schedule_now(Event::Resume(getter));
        }
        if let Some(waiter) = waiter {
            sched.schedule_now(Event::Resume(waiter));
        }
    }
}

impl PartBuffer for DelayBuffer {
    fn name(&self) -> &str {
        &self.name
    }

    fn capacity(&self) -> Option<usize> {
        Some(self.capacity)
    }

    fn ready_count(&self) -> usize {
        self.ready.len()
    }

    fn in_transit_count(&self) -> usize {
        self.in_transit
    }

    fn free_capacity(&self) -> usize {
        self.tokens
    }

    fn accepted(&self) -> u64 {
        self.accepted
    }

    fn pending_puts(&self) -> usize {
        self.putters.len()
    }

    fn try_put(&mut self, part: Part, sched: &mut Scheduler<Event>) -> Result<(), Part> {
        if self.tokens > 0 && self.putters.is_empty() {
            self.start_transit(part, None, sched);
            Ok(())
        } else {
            Err(part)
        }
    }

    fn put(&mut self, part: Part, waiter: ProcessId, sched: &mut Scheduler<Event>) -> PutStatus {
        if self.tokens > 0 && self.putters.is_empty() {
            self.start_transit(part, Some(waiter), sched);
        } else {
            self.putters.push_back((waiter, part));
        }
        PutStatus::Pending
    }

    fn try_get(&mut self, sched: &mut Scheduler<Event>) -> Option<Part> {
        let part = self.ready.pop_front()?;
        self.tokens += 1;
        if let Some((putter, pending)) = self.putters.pop_front() {
            self.start_transit(pending, Some(putter), sched);
        }
        Some(part)
    }

    fn get(&mut self, waiter: ProcessId, sched: &mut Scheduler<Event>) -> Option<Part> {
        let part = self.try_get(sched);
        if part.is_none() {
            self.getters.push_back(waiter);
        }
        part
    }
}

/// 產線上的緩衝區
#[derive(Debug)]
pub enum Channel {
    Queue(BoundedQueue),
    Delay(DelayBuffer),
}

impl Channel {
    /// 依配置建立緩衝區
    pub fn from_spec(id: ChannelId, spec: &ChannelSpec) -> Self {
        match spec.kind {
            ChannelKind::Plain { capacity } => {
                Channel::Queue(BoundedQueue::new(spec.name.clone(), capacity))
            }
            ChannelKind::Delay { capacity, delay } => {
                Channel::Delay(DelayBuffer::new(id, spec.name.clone(), capacity, delay))
            }
        }
    }

    pub fn is_delay(&self) -> bool {
        matches!(self, Channel::Delay(_))
    }

    pub(crate) fn complete_transit(
        &mut self,
        part: Part,
        waiter: Option<ProcessId>,
        sched: &mut Scheduler<Event>,
    ) {
        match self {
            Channel::Delay(buffer) => buffer.complete_transit(part, waiter, sched),
            // 只有輸送延遲緩衝區會排程在途完成事件
            Channel::Queue(queue) => {
                tracing::warn!("佇列 {} 收到在途完成事件（工件 {}），已忽略", queue.name, part.id);
            }
        }
    }

    fn buffer(&self) -> &dyn PartBuffer {
        match self {
            Channel::Queue(queue) => queue,
            Channel::Delay(buffer) => buffer,
        }
    }

    fn buffer_mut(&mut self) -> &mut dyn PartBuffer {
        match self {
            Channel::Queue(queue) => queue,
            Channel::Delay(buffer) => buffer,
        }
    }
}

impl PartBuffer for Channel {
    fn name(&self) -> &str {
        self.buffer().name()
    }

    fn capacity(&self) -> Option<usize> {
        self.buffer().capacity()
    }

    fn ready_count(&self) -> usize {
        self.buffer().ready_count()
    }

    fn in_transit_count(&self) -> usize {
        self.buffer().in_transit_count()
    }

    fn free_capacity(&self) -> usize {
        self.buffer().free_capacity()
    }

    fn accepted(&self) -> u64 {
        self.buffer().accepted()
    }

    fn pending_puts(&self) -> usize {
        self.buffer().pending_puts()
    }

    fn try_put(&mut self, part: Part, sched: &mut Scheduler<Event>) -> Result<(), Part> {
        self.buffer_mut().try_put(part, sched)
    }

    fn put(&mut self, part: Part, waiter: ProcessId, sched: &mut Scheduler<Event>) -> PutStatus {
        self.buffer_mut().put(part, waiter, sched)
    }

    fn try_get(&mut self, sched: &mut Scheduler<Event>) -> Option<Part> {
        self.buffer_mut().try_get(sched)
    }

    fn get(&mut self, waiter: ProcessId, sched: &mut Scheduler<Event>) -> Option<Part> {
        self.buffer_mut().get(waiter, sched)
    }
}
