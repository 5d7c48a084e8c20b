//! # Line Simulation Engine
//!
//! 離散事件產線模擬引擎：事件排程、緩衝區、機台狀態機、分流/合流、
//! 投料源、統計收集與多次重複執行

pub mod channel;
pub mod collector;
pub mod dists;
pub mod line;
pub mod machine;
pub mod replication;
pub mod router;
pub mod scheduler;
pub mod source;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// Re-export 主要類型
pub use channel::{BoundedQueue, Channel, ChannelId, DelayBuffer, PartBuffer, PutStatus};
pub use collector::Collector;
pub use line::{ChannelSnapshot, Line, LineSnapshot, MachineSnapshot};
pub use machine::{Machine, MachineCounters, MachineId};
pub use replication::{run_replication, ReplicationRunner};
pub use scheduler::{Scheduler, SimTime};

/// 整體 KPI
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverallKpis {
    /// 產出率（件/小時）
    pub throughput: f64,

    /// 平均在製品數
    pub mean_wip: f64,

    /// 量測期間成品數
    pub produced_parts: u64,

    /// 量測期間不良品數
    pub defective_parts: u64,
}

/// 單一機台的時間與能耗
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineEnergy {
    pub machine: String,
    pub working_time: f64,
    /// 缺料 + 故障 + 阻塞 + 日曆等待
    pub waiting_time: f64,
    pub starvation_time: f64,
    pub failure_time: f64,
    pub blocked_time: f64,
    pub calendar_wait_time: f64,
    pub working_energy: f64,
    pub waiting_energy: f64,
    pub total_energy: f64,
}

/// 單一機台的稼動資料
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineUtilization {
    pub machine: String,

    /// 投入件數 / 量測小時
    pub throughput: f64,

    /// 稼動率（%）
    pub utilization: f64,

    pub processed_count: u64,
    pub breakdown_count: u64,
}

/// 瓶頸分析
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BottleneckReport {
    /// 稼動率最高的前三台（由高到低）
    pub top_3: Vec<MachineUtilization>,

    /// 所有機台（宣告順序）
    pub all: Vec<MachineUtilization>,
}

impl BottleneckReport {
    /// 依稼動率排序；同分保持宣告順序
    pub fn rank(all: Vec<MachineUtilization>) -> Self {
        let mut sorted = all.clone();
        sorted.sort_by(|a, b| b.utilization.total_cmp(&a.utilization));
        sorted.truncate(3);
        Self { top_3: sorted, all }
    }
}

/// 模擬警告
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunWarning {
    pub subject: String,
    pub message: String,
    pub severity: WarningSeverity,
}

impl RunWarning {
    pub fn new(subject: String, message: String, severity: WarningSeverity) -> Self {
        Self {
            subject,
            message,
            severity,
        }
    }

    pub fn info(subject: String, message: String) -> Self {
        Self::new(subject, message, WarningSeverity::Info)
    }

    pub fn warning(subject: String, message: String) -> Self {
        Self::new(subject, message, WarningSeverity::Warning)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningSeverity {
    Info,
    Warning,
}

/// 單次重複的模擬結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub line_name: String,

    /// 本次重複使用的種子
    pub seed: u64,

    /// 量測時間（小時）
    pub measured_hours: f64,

    pub overall: OverallKpis,

    /// 各機台能耗（宣告順序）
    pub machine_energy: Vec<MachineEnergy>,

    pub bottleneck: BottleneckReport,

    #[serde(default)]
    pub warnings: Vec<RunWarning>,
}

impl SimulationResult {
    /// 所有機台總能耗
    pub fn total_energy(&self) -> f64 {
        self.machine_energy.iter().map(|e| e.total_energy).sum()
    }

    /// 每件成品能耗；沒有產出時為 0
    pub fn energy_per_part(&self) -> f64 {
        if self.overall.produced_parts == 0 {
            0.0
        } else {
            self.total_energy() / self.overall.produced_parts as f64
        }
    }

    /// 攤平成 `key → value` 表
    pub fn to_flat_map(&self) -> BTreeMap<String, f64> {
        let mut map = BTreeMap::new();
        map.insert("throughput".to_string(), self.overall.throughput);
        map.insert("wip".to_string(), self.overall.mean_wip);
        map.insert("produced_parts".to_string(), self.overall.produced_parts as f64);
        map.insert("defective_parts".to_string(), self.overall.defective_parts as f64);
        map.insert("total_energy".to_string(), self.total_energy());
        map.insert("energy_per_part".to_string(), self.energy_per_part());

        for energy in &self.machine_energy {
            let prefix = format!("machine.{}", energy.machine);
            map.insert(format!("{}.working_time", prefix), energy.working_time);
            map.insert(format!("{}.waiting_time", prefix), energy.waiting_time);
            map.insert(format!("{}.working_energy", prefix), energy.working_energy);
            map.insert(format!("{}.waiting_energy", prefix), energy.waiting_energy);
            map.insert(format!("{}.total_energy", prefix), energy.total_energy);
        }
        for entry in &self.bottleneck.all {
            let prefix = format!("machine.{}", entry.machine);
            map.insert(format!("{}.throughput", prefix), entry.throughput);
            map.insert(format!("{}.utilization", prefix), entry.utilization);
            map.insert(format!("{}.processed_count", prefix), entry.processed_count as f64);
            map.insert(format!("{}.breakdown_count", prefix), entry.breakdown_count as f64);
        }
        map
    }
}

/// 機台出現在前三名瓶頸的次數
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BottleneckCount {
    pub machine: String,
    pub count: usize,
}

/// 多次重複的彙總結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedResult {
    pub line_name: String,
    pub replications: usize,
    pub mean_throughput: f64,
    pub mean_wip: f64,

    /// 各次重複「總能耗 / 成品數」的平均
    pub mean_energy_per_part: f64,

    /// 依次數由多到少；同次數依機台宣告順序
    pub bottleneck_frequency: Vec<BottleneckCount>,

    /// 各次重複結果（重複順序）
    pub runs: Vec<SimulationResult>,

    /// 計算耗時（毫秒）
    pub calculation_time_ms: Option<u128>,
}

impl AggregatedResult {
    /// 彙總各次重複；`machine_order` 為機台宣告順序
    pub fn from_runs(
        line_name: impl Into<String>,
        runs: Vec<SimulationResult>,
        machine_order: &[String],
    ) -> Self {
        let mean = |f: &dyn Fn(&SimulationResult) -> f64| {
            if runs.is_empty() {
                0.0
            } else {
                runs.iter().map(f).sum::<f64>() / runs.len() as f64
            }
        };
        let mean_throughput = mean(&|r| r.overall.throughput);
        let mean_wip = mean(&|r| r.overall.mean_wip);
        let mean_energy_per_part = mean(&|r| r.energy_per_part());

        let counts = Collector::bottleneck_frequency(&runs);
        let mut bottleneck_frequency: Vec<BottleneckCount> = machine_order
            .iter()
            .filter_map(|name| {
                counts.get(name).map(|&count| BottleneckCount {
                    machine: name.clone(),
                    count,
                })
            })
            .collect();
        bottleneck_frequency.sort_by(|a, b| b.count.cmp(&a.count));

        Self {
            line_name: line_name.into(),
            replications: runs.len(),
            mean_throughput,
            mean_wip,
            mean_energy_per_part,
            bottleneck_frequency,
            runs,
            calculation_time_ms: None,
        }
    }

    /// 攤平成 `key → value` 表
    pub fn to_flat_map(&self) -> BTreeMap<String, f64> {
        let mut map = BTreeMap::new();
        map.insert("replications".to_string(), self.replications as f64);
        map.insert("throughput".to_string(), self.mean_throughput);
        map.insert("wip".to_string(), self.mean_wip);
        map.insert("energy_per_part".to_string(), self.mean_energy_per_part);
        for entry in &self.bottleneck_frequency {
            map.insert(
                format!("bottleneck.{}", entry.machine),
                entry.count as f64,
            );
        }
        map
    }
}

impl fmt::Display for AggregatedResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Mean Overall KPIs over {} runs ===", self.replications)?;
        writeln!(f, "Throughput = {:.2} parts/hour", self.mean_throughput)?;
        writeln!(f, "WIP = {:.2} parts", self.mean_wip)?;
        writeln!(
            f,
            "Mean Energy Consumption per Part = {:.4} kWh/part",
            self.mean_energy_per_part
        )?;
        writeln!(f)?;
        writeln!(f, "=== Bottleneck Frequency over runs ===")?;
        for entry in &self.bottleneck_frequency {
            writeln!(f, "{}: {} times", entry.machine, entry.count)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utilization(machine: &str, utilization: f64) -> MachineUtilization {
        MachineUtilization {
            machine: machine.to_string(),
            throughput: 0.0,
            utilization,
            processed_count: 0,
            breakdown_count: 0,
        }
    }

    fn result(throughput: f64, produced: u64, energy: f64, top: &[&str]) -> SimulationResult {
        SimulationResult {
            line_name: "test".to_string(),
            seed: 0,
            measured_hours: 1.0,
            overall: OverallKpis {
                throughput,
                mean_wip: 2.0,
                produced_parts: produced,
                defective_parts: 0,
            },
            machine_energy: vec![MachineEnergy {
                machine: "M1".to_string(),
                working_time: 0.0,
                waiting_time: 0.0,
                starvation_time: 0.0,
                failure_time: 0.0,
                blocked_time: 0.0,
                calendar_wait_time: 0.0,
                working_energy: energy,
                waiting_energy: 0.0,
                total_energy: energy,
            }],
            bottleneck: BottleneckReport {
                top_3: top.iter().map(|m| utilization(m, 50.0)).collect(),
                all: Vec::new(),
            },
            warnings: Vec::new(),
        }
    }

    #[test]
    fn test_rank_is_stable_on_ties() {
        let report = BottleneckReport::rank(vec![
            utilization("A", 40.0),
            utilization("B", 80.0),
            utilization("C", 40.0),
            utilization("D", 80.0),
            utilization("E", 10.0),
        ]);

        let names: Vec<_> = report.top_3.iter().map(|u| u.machine.as_str()).collect();
        assert_eq!(names, vec!["B", "D", "A"]);
        assert_eq!(report.all.len(), 5);
        assert_eq!(report.all[0].machine, "A");
    }

    #[test]
    fn test_energy_per_part_without_production() {
        let run = result(0.0, 0, 12.0, &[]);
        assert_eq!(run.energy_per_part(), 0.0);
        assert_eq!(run.to_flat_map()["energy_per_part"], 0.0);
    }

    #[test]
    fn test_aggregate_means_and_frequency() {
        let order: Vec<String> = ["M1", "M2", "M3", "M4"].iter().map(|s| s.to_string()).collect();
        let runs = vec![
            result(10.0, 10, 20.0, &["M2", "M3", "M1"]),
            result(20.0, 5, 20.0, &["M2", "M4", "M3"]),
        ];
        let aggregated = AggregatedResult::from_runs("test", runs, &order);

        assert_eq!(aggregated.replications, 2);
        assert_eq!(aggregated.mean_throughput, 15.0);
        assert_eq!(aggregated.mean_wip, 2.0);
        // (20/10 + 20/5) / 2
        assert_eq!(aggregated.mean_energy_per_part, 3.0);

        let frequency: Vec<_> = aggregated
            .bottleneck_frequency
            .iter()
            .map(|b| (b.machine.as_str(), b.count))
            .collect();
        assert_eq!(frequency, vec![("M2", 2), ("M3", 2), ("M1", 1), ("M4", 1)]);
    }

    #[test]
    fn test_flat_map_keys() {
        let order = vec!["M1".to_string()];
        let aggregated =
            AggregatedResult::from_runs("test", vec![result(10.0, 10, 20.0, &["M1"])], &order);
        let map = aggregated.to_flat_map();
        assert_eq!(map["throughput"], 10.0);
        assert_eq!(map["bottleneck.M1"], 1.0);

        let run_map = aggregated.runs[0].to_flat_map();
        assert_eq!(run_map["machine.M1.total_energy"], 20.0);
        assert_eq!(run_map["energy_per_part"], 2.0);
    }

    #[test]
    fn test_display_layout() {
        let order = vec!["M1".to_string()];
        let aggregated =
            AggregatedResult::from_runs("test", vec![result(12.346, 10, 20.0, &["M1"])], &order);
        let text = aggregated.to_string();
        assert!(text.contains("=== Mean Overall KPIs over 1 runs ==="));
        assert!(text.contains("Throughput = 12.35 parts/hour"));
        assert!(text.contains("Mean Energy Consumption per Part = 2.0000 kWh/part"));
        assert!(text.contains("M1: 1 times"));
    }
}
