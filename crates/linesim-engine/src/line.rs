//! 產線組裝與事件派發
//!
//! [`Line`] 擁有一次重複的全部狀態：排程器、緩衝區、機台、行程與 RNG。
//! 每個行程都是顯式狀態機，被 `Event::Resume` 喚醒後推進到下一個等待點。

use std::collections::HashMap;
use std::time::{Duration, Instant};

use linesim_core::{LineConfig, LineError, ProductionCalendar, Result};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::channel::{Channel, ChannelId, PartBuffer};
use crate::collector::WipSampler;
use crate::machine::{BreakdownCycle, Machine, MachineId, SlotWorker};
use crate::router::Router;
use crate::scheduler::Scheduler;
use crate::source::PartSource;

/// 每派發這麼多事件檢查一次實際時間預算
const BUDGET_CHECK_INTERVAL: u32 = 4096;

/// 行程索引
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessId(pub usize);

/// 排程事件
#[derive(Debug, Clone, Copy)]
pub enum Event {
    /// 喚醒行程
    Resume(ProcessId),

    /// 輸送延遲緩衝區的工件到達就緒佇列
    TransitComplete {
        channel: ChannelId,
        part: linesim_core::Part,
        waiter: Option<ProcessId>,
    },
}

/// 可被排程器喚醒的行程
pub trait Activity {
    /// 從上一個等待點繼續執行，直到下一個等待點
    fn resume(&mut self, me: ProcessId, line: &mut LineState, sched: &mut Scheduler<Event>);
}

/// 行程共用的產線狀態
#[derive(Debug)]
pub struct LineState {
    pub(crate) channels: Vec<Channel>,
    pub(crate) machines: Vec<Machine>,
    pub(crate) rng: ChaCha8Rng,
    pub(crate) calendar: ProductionCalendar,
    pub(crate) tick: f64,
    /// 投料源已產生的工件數
    pub(crate) released: u64,
    pub(crate) wip_samples: Vec<f64>,
}

impl LineState {
    /// 在製品：輸送延遲緩衝區的就緒 + 在途工件，加上各機台已取料未送出的工件
    pub fn wip(&self) -> usize {
        let buffered: usize = self
            .channels
            .iter()
            .filter(|c| c.is_delay())
            .map(|c| c.ready_count() + c.in_transit_count())
            .sum();
        let in_machines: usize = self.machines.iter().map(Machine::active_count).sum();
        buffered + in_machines
    }
}

#[derive(Debug)]
enum Process {
    Worker(SlotWorker),
    Breakdown(BreakdownCycle),
    Router(Router),
    Source(PartSource),
    Sampler(WipSampler),
}

impl Process {
    fn activity(&mut self) -> &mut dyn Activity {
        match self {
            Process::Worker(p) => p,
            Process::Breakdown(p) => p,
            Process::Router(p) => p,
            Process::Source(p) => p,
            Process::Sampler(p) => p,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct WallClock {
    deadline: Instant,
    budget: Duration,
}

/// 緩衝區快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSnapshot {
    pub name: String,
    pub capacity: Option<usize>,
    pub ready: usize,
    pub in_transit: usize,
    pub pending_puts: usize,
    pub free_capacity: usize,
}

/// 機台快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineSnapshot {
    pub name: String,
    pub up: bool,
    pub active: usize,
    pub in_process: usize,
    pub busy_slots: usize,
}

/// 產線快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineSnapshot {
    pub time: f64,
    pub channels: Vec<ChannelSnapshot>,
    pub machines: Vec<MachineSnapshot>,
    pub released: u64,
    pub resident: u64,
}

/// 一次重複的產線實例
#[derive(Debug)]
pub struct Line {
    name: String,
    sched: Scheduler<Event>,
    state: LineState,
    processes: Vec<Process>,
    sink: ChannelId,
    defect_sinks: Vec<ChannelId>,
    sink_baseline: u64,
    defect_baseline: u64,
    wall_clock: Option<WallClock>,
}

impl Line {
    /// 依配置建立產線；所有配置錯誤在時間推進前回報
    ///
    /// 行程啟動順序：各機台（故障循環、工位）、分流器、合流器、投料源。
    pub fn build(config: &LineConfig, seed: u64, tick: f64) -> Result<Self> {
        config.validate()?;
        if !(tick.is_finite() && tick > 0.0) {
            return Err(LineError::InvalidRunParams(format!("時間步長必須為正數: {}", tick)));
        }

        let ids: HashMap<&str, ChannelId> = config
            .channels
            .iter()
            .enumerate()
            .map(|(i, spec)| (spec.name.as_str(), ChannelId(i)))
            .collect();
        let lookup = |name: &str| {
            ids.get(name)
                .copied()
                .ok_or_else(|| LineError::UnknownChannel(name.to_string()))
        };

        let channels: Vec<Channel> = config
            .channels
            .iter()
            .enumerate()
            .map(|(i, spec)| Channel::from_spec(ChannelId(i), spec))
            .collect();

        let mut machines = Vec::with_capacity(config.machines.len());
        let mut processes = Vec::new();
        for (index, spec) in config.machines.iter().enumerate() {
            let input = lookup(&spec.input)?;
            let output = lookup(&spec.output)?;
            let defect_sink = spec.defect_sink.as_deref().map(lookup).transpose()?;

            let id = MachineId(index);
            if spec.can_break_down() {
                processes.push(Process::Breakdown(BreakdownCycle::new(id)));
            }
            for _ in 0..spec.capacity {
                processes.push(Process::Worker(SlotWorker::new(id)));
            }
            machines.push(Machine::new(spec.clone(), input, output, defect_sink));
        }

        for splitter in &config.splitters {
            let input = lookup(&splitter.input)?;
            let outputs = [lookup(&splitter.outputs[0])?, lookup(&splitter.outputs[1])?];
            processes.push(Process::Router(Router::splitter(
                splitter.name.clone(),
                input,
                outputs,
            )));
        }

        for merger in &config.mergers {
            let output = lookup(&merger.output)?;
            for input in &merger.inputs {
                processes.push(Process::Router(Router::forwarder(
                    format!("{}:{}", merger.name, input),
                    lookup(input)?,
                    output,
                )));
            }
        }

        processes.push(Process::Source(PartSource::new(
            lookup(&config.source.output)?,
            config.source.interarrival,
        )));

        let sink = lookup(&config.sink)?;
        let mut defect_sinks = Vec::new();
        for name in config.defect_sinks() {
            let id = lookup(name)?;
            if id != sink {
                defect_sinks.push(id);
            }
        }

        let mut sched = Scheduler::new();
        for pid in 0..processes.len() {
            sched.schedule_now(Event::Resume(ProcessId(pid)));
        }

        tracing::debug!(
            "建立產線 {}：緩衝區 {} 個，機台 {} 台，行程 {} 個，種子 {}",
            config.name,
            channels.len(),
            machines.len(),
            processes.len(),
            seed
        );

        Ok(Self {
            name: config.name.clone(),
            sched,
            state: LineState {
                channels,
                machines,
                rng: ChaCha8Rng::seed_from_u64(seed),
                calendar: config.calendar.clone(),
                tick,
                released: 0,
                wip_samples: Vec::new(),
            },
            processes,
            sink,
            defect_sinks,
            sink_baseline: 0,
            defect_baseline: 0,
            wall_clock: None,
        })
    }

    /// 建構器模式：設置實際時間截止點（超過即回傳錯誤）
    pub fn with_deadline(mut self, deadline: Instant, budget: Duration) -> Self {
        self.wall_clock = Some(WallClock { deadline, budget });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 目前模擬時間
    pub fn now(&self) -> f64 {
        self.sched.now()
    }

    /// 已派發事件數
    pub fn events_dispatched(&self) -> u64 {
        self.sched.dispatched()
    }

    /// 派發所有早於 `until` 的事件並把時鐘設為 `until`
    pub fn advance_to(&mut self, until: f64) -> Result<()> {
        let Line {
            sched,
            state,
            processes,
            wall_clock,
            ..
        } = self;
        let wall_clock = *wall_clock;
        let mut since_check = 0u32;

        sched.advance_to(until, |sched, event| {
            match event {
                Event::Resume(pid) => match processes.get_mut(pid.0) {
                    Some(process) => process.activity().resume(pid, state, sched),
                    None => tracing::warn!("喚醒不存在的行程 {}", pid.0),
                },
                Event::TransitComplete {
                    channel,
                    part,
                    waiter,
                } => match state.channels.get_mut(channel.0) {
                    Some(target) => target.complete_transit(part, waiter, sched),
                    None => tracing::warn!("在途完成事件指向不存在的緩衝區 {}", channel.0),
                },
            }

            if let Some(clock) = wall_clock {
                since_check += 1;
                if since_check >= BUDGET_CHECK_INTERVAL {
                    since_check = 0;
                    if Instant::now() >= clock.deadline {
                        return Err(LineError::WallClockBudgetExceeded {
                            budget_secs: clock.budget.as_secs_f64(),
                            sim_time: sched.now(),
                        });
                    }
                }
            }
            Ok(())
        })
    }

    /// 暖機結束：歸零機台計數器、記錄成品基準、啟動 WIP 取樣
    pub fn begin_measurement(&mut self, sample_interval: f64) {
        for machine in &mut self.state.machines {
            machine.reset_counters();
        }
        self.sink_baseline = self.sink_count();
        self.defect_baseline = self.defect_count();
        self.state.wip_samples.clear();

        let pid = ProcessId(self.processes.len());
        self.processes
            .push(Process::Sampler(WipSampler::new(sample_interval)));
        self.sched.schedule_now(Event::Resume(pid));

        tracing::debug!(
            "t={:.0}s 開始量測：成品基準 {}，在製品 {}",
            self.now(),
            self.sink_baseline,
            self.state.wip()
        );
    }

    pub fn machines(&self) -> &[Machine] {
        &self.state.machines
    }

    pub fn channels(&self) -> &[Channel] {
        &self.state.channels
    }

    /// 分流器與合流轉送器（建構順序）
    pub fn routers(&self) -> Vec<&Router> {
        self.processes
            .iter()
            .filter_map(|p| match p {
                Process::Router(router) => Some(router),
                _ => None,
            })
            .collect()
    }

    /// 目前在製品數
    pub fn wip(&self) -> usize {
        self.state.wip()
    }

    pub fn wip_samples(&self) -> &[f64] {
        &self.state.wip_samples
    }

    /// 成品緩衝區中的工件數
    pub fn sink_count(&self) -> u64 {
        self.state
            .channels
            .get(self.sink.0)
            .map_or(0, |c| c.ready_count() as u64)
    }

    /// 所有不良品緩衝區中的工件數
    pub fn defect_count(&self) -> u64 {
        self.defect_sinks
            .iter()
            .filter_map(|id| self.state.channels.get(id.0))
            .map(|c| c.ready_count() as u64)
            .sum()
    }

    /// 量測開始後的成品數
    pub fn produced_since_baseline(&self) -> u64 {
        self.sink_count().saturating_sub(self.sink_baseline)
    }

    /// 量測開始後的不良品數
    pub fn defects_since_baseline(&self) -> u64 {
        self.defect_count().saturating_sub(self.defect_baseline)
    }

    /// 投料源已產生的工件數
    pub fn released_parts(&self) -> u64 {
        self.state.released
    }

    /// 仍在產線內的工件數
    ///
    /// 成品/不良品區以外的就緒工件、所有在途與等待放入的工件，加上機台內加工中的工件。
    /// 任何時刻 `released == sink + defects + resident`。
    pub fn resident_parts(&self) -> u64 {
        let in_channels: usize = self
            .state
            .channels
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let terminal = self.is_terminal(ChannelId(i));
                let ready = if terminal { 0 } else { c.ready_count() };
                ready + c.in_transit_count() + c.pending_puts()
            })
            .sum();
        let in_machines: usize = self.state.machines.iter().map(Machine::in_process).sum();
        (in_channels + in_machines) as u64
    }

    fn is_terminal(&self, id: ChannelId) -> bool {
        id == self.sink || self.defect_sinks.contains(&id)
    }

    /// 產線狀態快照
    pub fn snapshot(&self) -> LineSnapshot {
        let channels = self
            .state
            .channels
            .iter()
            .map(|c| ChannelSnapshot {
                name: c.name().to_string(),
                capacity: c.capacity(),
                ready: c.ready_count(),
                in_transit: c.in_transit_count(),
                pending_puts: c.pending_puts(),
                free_capacity: c.free_capacity(),
            })
            .collect();
        let machines = self
            .state
            .machines
            .iter()
            .map(|m| MachineSnapshot {
                name: m.name().to_string(),
                up: m.is_up(),
                active: m.active_count(),
                in_process: m.in_process(),
                busy_slots: m.busy_slots(),
            })
            .collect();

        LineSnapshot {
            time: self.now(),
            channels,
            machines,
            released: self.released_parts(),
            resident: self.resident_parts(),
        }
    }
}
