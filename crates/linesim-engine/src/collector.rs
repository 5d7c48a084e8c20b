//! 統計收集
//!
//! - [`WipSampler`]：暖機結束後週期性取樣 WIP
//! - [`Collector`]：由一條跑完的產線計算單次重複的 KPI

use std::collections::HashMap;

use linesim_core::RunParams;

use crate::line::{Activity, Event, Line, LineState, ProcessId};
use crate::scheduler::Scheduler;
use crate::{
    BottleneckReport, MachineEnergy, MachineUtilization, OverallKpis, RunWarning,
    SimulationResult,
};

/// WIP 取樣行程：第一次取樣在啟動當下，之後每 `interval` 秒一次
#[derive(Debug)]
pub struct WipSampler {
    interval: f64,
}

impl WipSampler {
    pub fn new(interval: f64) -> Self {
        Self { interval }
    }
}

impl Activity for WipSampler {
    fn resume(&mut self, me: ProcessId, line: &mut LineState, sched: &mut Scheduler<Event>) {
        let wip = line.wip();
        line.wip_samples.push(wip as f64);
        sched.schedule_after(self.interval, Event::Resume(me));
    }
}

/// KPI 計算器
pub struct Collector;

impl Collector {
    /// 計算單次重複的結果
    ///
    /// 必須在 `Line::begin_measurement` 之後、推進到模擬時界時呼叫。
    pub fn collect(line: &Line, params: &RunParams, seed: u64) -> SimulationResult {
        let duration = params.measured_duration();
        let hours = params.measured_hours();
        let mut warnings = Vec::new();

        let produced_parts = line.produced_since_baseline();
        let defective_parts = line.defects_since_baseline();

        let throughput = if hours > 0.0 {
            produced_parts as f64 / hours
        } else {
            0.0
        };

        let samples = line.wip_samples();
        let mean_wip = if samples.is_empty() {
            0.0
        } else {
            samples.iter().sum::<f64>() / samples.len() as f64
        };

        if produced_parts == 0 {
            tracing::warn!("{}（種子 {}）量測期間沒有成品產出", line.name(), seed);
            warnings.push(RunWarning::warning(
                line.name().to_string(),
                "量測期間沒有任何成品產出".to_string(),
            ));
        }

        let machine_energy: Vec<MachineEnergy> = line
            .machines()
            .iter()
            .map(|m| {
                let c = m.counters();
                MachineEnergy {
                    machine: m.name().to_string(),
                    working_time: c.working_time,
                    waiting_time: m.waiting_time(),
                    starvation_time: c.starvation_time,
                    failure_time: c.failure_time,
                    blocked_time: c.blocked_time,
                    calendar_wait_time: c.calendar_wait_time,
                    working_energy: m.working_energy(),
                    waiting_energy: m.waiting_energy(),
                    total_energy: m.total_energy(),
                }
            })
            .collect();

        let all: Vec<MachineUtilization> = line
            .machines()
            .iter()
            .map(|m| {
                let c = m.counters();
                MachineUtilization {
                    machine: m.name().to_string(),
                    throughput: if hours > 0.0 {
                        c.processed_count as f64 / hours
                    } else {
                        0.0
                    },
                    utilization: m.utilization(duration),
                    processed_count: c.processed_count,
                    breakdown_count: c.breakdown_count,
                }
            })
            .collect();

        for entry in &all {
            tracing::debug!(
                "{}: 稼動率 {:.2}%，投入 {} 件，故障 {} 次",
                entry.machine,
                entry.utilization,
                entry.processed_count,
                entry.breakdown_count
            );
        }

        SimulationResult {
            line_name: line.name().to_string(),
            seed,
            measured_hours: hours,
            overall: OverallKpis {
                throughput,
                mean_wip,
                produced_parts,
                defective_parts,
            },
            machine_energy,
            bottleneck: BottleneckReport::rank(all),
            warnings,
        }
    }

    /// 各機台出現在前三名瓶頸的次數
    pub fn bottleneck_frequency(results: &[SimulationResult]) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for result in results {
            for entry in &result.bottleneck.top_3 {
                *counts.entry(entry.machine.clone()).or_insert(0) += 1;
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linesim_core::{ChannelSpec, LineConfig, MachineSpec, SourceSpec};

    fn two_machine_line() -> LineConfig {
        LineConfig::new("pair", SourceSpec::new("in", 1.0), "out")
            .with_channel(ChannelSpec::unbounded("in"))
            .with_channel(ChannelSpec::delay("mid", 2, 1.0))
            .with_channel(ChannelSpec::unbounded("out"))
            .with_machine(MachineSpec::new("A", "in", "mid", 2.0).with_power(2.0, 1.0))
            .with_machine(MachineSpec::new("B", "mid", "out", 6.0).with_power(2.0, 1.0))
    }

    fn run(config: &LineConfig, params: &RunParams) -> SimulationResult {
        let mut line = Line::build(config, 1, params.tick).unwrap();
        line.advance_to(params.warmup).unwrap();
        line.begin_measurement(params.wip_sample_interval);
        line.advance_to(params.horizon).unwrap();
        Collector::collect(&line, params, 1)
    }

    #[test]
    fn test_collect_throughput_and_wip() {
        let params = RunParams::new(7200.0, 3600.0);
        let result = run(&two_machine_line(), &params);

        // B 是瓶頸：每 6 秒一件 → 約 600 件/小時
        assert!((result.overall.throughput - 600.0).abs() < 10.0);
        assert_eq!(result.overall.produced_parts as f64, result.overall.throughput);
        assert!(result.overall.mean_wip > 0.0);
        // 60 秒取樣一次，第一次在暖機結束當下
        assert_eq!(line_samples(&two_machine_line(), &params), 60);
        assert!(result.warnings.is_empty());
    }

    fn line_samples(config: &LineConfig, params: &RunParams) -> usize {
        let mut line = Line::build(config, 1, params.tick).unwrap();
        line.advance_to(params.warmup).unwrap();
        line.begin_measurement(params.wip_sample_interval);
        line.advance_to(params.horizon).unwrap();
        line.wip_samples().len()
    }

    #[test]
    fn test_bottleneck_ranking() {
        let params = RunParams::new(7200.0, 3600.0);
        let result = run(&two_machine_line(), &params);

        assert_eq!(result.bottleneck.top_3[0].machine, "B");
        assert!(result.bottleneck.top_3[0].utilization > 95.0);
        assert_eq!(result.bottleneck.all.len(), 2);
        for entry in &result.bottleneck.all {
            assert!((0.0..=100.0).contains(&entry.utilization));
        }
    }

    #[test]
    fn test_energy_accounts_waiting_terms() {
        let params = RunParams::new(7200.0, 3600.0);
        let result = run(&two_machine_line(), &params);

        for energy in &result.machine_energy {
            assert!((energy.working_energy - 2.0 * energy.working_time).abs() < 1e-9);
            assert!((energy.waiting_energy - energy.waiting_time).abs() < 1e-9);
            let sum = energy.starvation_time
                + energy.failure_time
                + energy.blocked_time
                + energy.calendar_wait_time;
            assert!((energy.waiting_time - sum).abs() < 1e-9);
        }
        assert!(result.energy_per_part() > 0.0);
    }

    #[test]
    fn test_zero_production_yields_zero_kpis() {
        // 加工時間比量測區間還長
        let config = LineConfig::new("slow", SourceSpec::new("in", 1.0), "out")
            .with_channel(ChannelSpec::unbounded("in"))
            .with_channel(ChannelSpec::unbounded("out"))
            .with_machine(MachineSpec::new("A", "in", "out", 10_000.0));
        let params = RunParams::new(200.0, 100.0);
        let result = run(&config, &params);

        assert_eq!(result.overall.produced_parts, 0);
        assert_eq!(result.overall.throughput, 0.0);
        assert_eq!(result.energy_per_part(), 0.0);
        assert!(!result.energy_per_part().is_nan());
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_bottleneck_frequency_counts_top_three() {
        let params = RunParams::new(7200.0, 3600.0);
        let results = vec![
            run(&two_machine_line(), &params),
            run(&two_machine_line(), &params),
        ];
        let counts = Collector::bottleneck_frequency(&results);
        assert_eq!(counts.get("A"), Some(&2));
        assert_eq!(counts.get("B"), Some(&2));
    }
}
