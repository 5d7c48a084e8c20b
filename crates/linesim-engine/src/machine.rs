//! 機台模型
//!
//! 每台機台由兩種行程驅動：
//! - 每個工位一個 [`SlotWorker`]：取得工位 → 等待投入 → (日曆等待) → 加工 → 送出
//! - 可用率低於 100% 時一個 [`BreakdownCycle`]：正常運轉與維修交替，切換 UP/DOWN 旗標

use std::collections::VecDeque;

use linesim_core::{MachineSpec, Part};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::channel::{ChannelId, PartBuffer, PutStatus};
use crate::dists::{sample_exponential, sample_process_time};
use crate::line::{Activity, Event, LineState, ProcessId};
use crate::scheduler::Scheduler;

/// 剩餘加工時間小於此值視為完成
const WORK_EPSILON: f64 = 1e-9;

/// 機台索引
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MachineId(pub usize);

/// 機台統計計數器（暖機結束時歸零）
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MachineCounters {
    /// 加工時間（秒）
    pub working_time: f64,

    /// 故障時間（秒，維修完成時累加）
    pub failure_time: f64,

    /// 缺料等待時間（秒，只在 UP 時累計）
    pub starvation_time: f64,

    /// 出料阻塞時間（秒）
    pub blocked_time: f64,

    /// 日曆停機等待時間（秒）
    pub calendar_wait_time: f64,

    /// 投入件數
    pub processed_count: u64,

    /// 故障次數
    pub breakdown_count: u64,
}

/// 機台狀態
#[derive(Debug)]
pub struct Machine {
    spec: MachineSpec,
    pub(crate) input: ChannelId,
    pub(crate) output: ChannelId,
    pub(crate) defect_sink: Option<ChannelId>,
    mtbf: f64,
    up: bool,
    /// 已取料、尚未送出完成的工件數
    active_count: usize,
    /// 已取料、尚未開始送出的工件數
    in_process: usize,
    busy_slots: usize,
    slot_waiters: VecDeque<ProcessId>,
    counters: MachineCounters,
}

impl Machine {
    pub fn new(
        spec: MachineSpec,
        input: ChannelId,
        output: ChannelId,
        defect_sink: Option<ChannelId>,
    ) -> Self {
        let mtbf = spec.mtbf();
        Self {
            spec,
            input,
            output,
            defect_sink,
            mtbf,
            up: true,
            active_count: 0,
            in_process: 0,
            busy_slots: 0,
            slot_waiters: VecDeque::new(),
            counters: MachineCounters::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn spec(&self) -> &MachineSpec {
        &self.spec
    }

    pub fn mtbf(&self) -> f64 {
        self.mtbf
    }

    pub fn is_up(&self) -> bool {
        self.up
    }

    pub fn active_count(&self) -> usize {
        self.active_count
    }

    pub fn in_process(&self) -> usize {
        self.in_process
    }

    pub fn busy_slots(&self) -> usize {
        self.busy_slots
    }

    pub fn counters(&self) -> &MachineCounters {
        &self.counters
    }

    /// 暖機結束：歸零統計計數器（在製數量不變）
    pub fn reset_counters(&mut self) {
        self.counters = MachineCounters::default();
    }

    /// 等待時間：缺料 + 故障 + 阻塞 + 日曆等待
    pub fn waiting_time(&self) -> f64 {
        let c = &self.counters;
        c.starvation_time + c.failure_time + c.blocked_time + c.calendar_wait_time
    }

    pub fn working_energy(&self) -> f64 {
        self.spec.working_power * self.counters.working_time
    }

    pub fn waiting_energy(&self) -> f64 {
        self.spec.waiting_power * self.waiting_time()
    }

    pub fn total_energy(&self) -> f64 {
        self.working_energy() + self.waiting_energy()
    }

    /// 稼動率（%）：加工時間 / (量測時間 × 工位數)，限制在 [0, 100]
    pub fn utilization(&self, measured_duration: f64) -> f64 {
        if measured_duration <= 0.0 {
            return 0.0;
        }
        let slots = self.spec.capacity.max(1) as f64;
        (self.counters.working_time / (measured_duration * slots) * 100.0).clamp(0.0, 100.0)
    }

    fn try_acquire_slot(&mut self, waiter: ProcessId) -> bool {
        if self.busy_slots < self.spec.capacity {
            self.busy_slots += 1;
            true
        } else {
            self.slot_waiters.push_back(waiter);
            false
        }
    }

    /// 釋放工位；有等待者時直接轉交
    fn release_slot(&mut self, sched: &mut Scheduler<Event>) {
        match self.slot_waiters.pop_front() {
            Some(waiter) => sched.schedule_now(Event::Resume(waiter)),
            None => self.busy_slots = self.busy_slots.saturating_sub(1),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum WorkerState {
    Acquire,
    AwaitSlot,
    Poll,
    CalendarGate { part: Part },
    StartProcessing { part: Part },
    /// `step`: 上一段等待中完成的加工量，恢復時入帳
    Processing { part: Part, remaining: f64, step: f64 },
    Route { part: Part },
    AwaitOutput { since: f64 },
}

/// 工位行程
#[derive(Debug)]
pub struct SlotWorker {
    machine: MachineId,
    state: WorkerState,
}

impl SlotWorker {
    pub fn new(machine: MachineId) -> Self {
        Self {
            machine,
            state: WorkerState::Acquire,
        }
    }
}

impl Activity for SlotWorker {
    fn resume(&mut self, me: ProcessId, line: &mut LineState, sched: &mut Scheduler<Event>) {
        let tick = line.tick;
        let LineState {
            channels,
            machines,
            rng,
            calendar,
            ..
        } = line;
        let Some(machine) = machines.get_mut(self.machine.0) else {
            tracing::warn!("工位行程引用不存在的機台 {}", self.machine.0);
            return;
        };

        loop {
            match self.state {
                WorkerState::Acquire => {
                    if machine.try_acquire_slot(me) {
                        self.state = WorkerState::Poll;
                    } else {
                        self.state = WorkerState::AwaitSlot;
                        return;
                    }
                }
                WorkerState::AwaitSlot => {
                    self.state = WorkerState::Poll;
                }
                WorkerState::Poll => {
                    let input = &mut channels[machine.input.0];
                    if machine.up && input.ready_count() > 0 {
                        if let Some(part) = input.try_get(sched) {
                            machine.counters.processed_count += 1;
                            machine.active_count += 1;
                            machine.in_process += 1;
                            self.state = WorkerState::CalendarGate { part };
                            continue;
                        }
                    }
                    // DOWN 期間的輪詢不算缺料
                    if machine.up {
                        machine.counters.starvation_time += tick;
                    }
                    sched.schedule_after(tick, Event::Resume(me));
                    return;
                }
                WorkerState::CalendarGate { part } => {
                    let wait = calendar.production_wait_time(sched.now());
                    machine.counters.calendar_wait_time += wait;
                    self.state = WorkerState::StartProcessing { part };
                    if wait > 0.0 {
                        sched.schedule_after(wait, Event::Resume(me));
                        return;
                    }
                }
                WorkerState::StartProcessing { part } => {
                    let duration = sample_process_time(rng, &machine.spec.process_time);
                    self.state = WorkerState::Processing {
                        part,
                        remaining: duration,
                        step: 0.0,
                    };
                }
                WorkerState::Processing {
                    part,
                    mut remaining,
                    step,
                } => {
                    if step > 0.0 {
                        machine.counters.working_time += step;
                        remaining -= step;
                    }
                    if remaining <= WORK_EPSILON {
                        machine.release_slot(sched);
                        self.state = WorkerState::Route { part };
                        continue;
                    }
                    // 只有在該段開始時為 UP 才算加工；DOWN 時保留剩餘時間
                    let step = if machine.up { remaining.min(tick) } else { 0.0 };
                    self.state = WorkerState::Processing {
                        part,
                        remaining,
                        step,
                    };
                    sched.schedule_after(if step > 0.0 { step } else { tick }, Event::Resume(me));
                    return;
                }
                WorkerState::Route { mut part } => {
                    let target = match (machine.spec.defect_rate, machine.defect_sink) {
                        (Some(rate), Some(sink)) => {
                            let defective = rng.gen::<f64>() < rate;
                            part.mark_inspected(defective);
                            if defective {
                                sink
                            } else {
                                machine.output
                            }
                        }
                        _ => machine.output,
                    };
                    machine.in_process -= 1;

                    match channels[target.0].put(part, me, sched) {
                        PutStatus::Done => {
                            machine.active_count -= 1;
                            self.state = WorkerState::Acquire;
                        }
                        PutStatus::Pending => {
                            self.state = WorkerState::AwaitOutput { since: sched.now() };
                            return;
                        }
                    }
                }
                WorkerState::AwaitOutput { since } => {
                    machine.counters.blocked_time += sched.now() - since;
                    machine.active_count -= 1;
                    self.state = WorkerState::Acquire;
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum BreakdownState {
    Init,
    Up,
    Down { repair: f64 },
}

/// 故障循環行程：UP 持續 `Exp(1/MTBF)`，DOWN 持續 `Exp(1/MTTR)`
#[derive(Debug)]
pub struct BreakdownCycle {
    machine: MachineId,
    state: BreakdownState,
}

impl BreakdownCycle {
    pub fn new(machine: MachineId) -> Self {
        Self {
            machine,
            state: BreakdownState::Init,
        }
    }
}

impl Activity for BreakdownCycle {
    fn resume(&mut self, me: ProcessId, line: &mut LineState, sched: &mut Scheduler<Event>) {
        let LineState { machines, rng, .. } = line;
        let Some(machine) = machines.get_mut(self.machine.0) else {
            return;
        };

        match self.state {
            BreakdownState::Init => {}
            BreakdownState::Up => {
                machine.up = false;
                machine.counters.breakdown_count += 1;
                let repair = sample_exponential(rng, machine.spec.mttr);
                tracing::trace!("{} 故障，維修 {:.1}s", machine.name(), repair);
                self.state = BreakdownState::Down { repair };
                sched.schedule_after(repair, Event::Resume(me));
                return;
            }
            BreakdownState::Down { repair } => {
                machine.counters.failure_time += repair;
                machine.up = true;
            }
        }

        let uptime = sample_exponential(rng, machine.mtbf);
        self.state = BreakdownState::Up;
        if uptime.is_finite() {
            sched.schedule_after(uptime, Event::Resume(me));
        }
    }
}
