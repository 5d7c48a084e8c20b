//! 多次重複執行
//!
//! 每次重複各自建立產線與 RNG（種子 `base_seed + i`），彼此不共享狀態，
//! 因此可以用 rayon 平行執行；結果一律依重複順序彙總。

use std::time::{Duration, Instant};

use linesim_core::{LineConfig, Result, RunParams};
use rayon::prelude::*;

use crate::collector::Collector;
use crate::line::Line;
use crate::{AggregatedResult, SimulationResult};

/// 執行單次重複：暖機 → 歸零 → 量測 → 計算 KPI
pub fn run_replication(config: &LineConfig, params: &RunParams, seed: u64) -> Result<SimulationResult> {
    run_with_deadline(config, params, seed, None)
}

fn run_with_deadline(
    config: &LineConfig,
    params: &RunParams,
    seed: u64,
    deadline: Option<(Instant, Duration)>,
) -> Result<SimulationResult> {
    params.validate()?;
    let mut line = Line::build(config, seed, params.tick)?;
    if let Some((at, budget)) = deadline {
        line = line.with_deadline(at, budget);
    }

    tracing::debug!("種子 {}：暖機至 {:.0}s", seed, params.warmup);
    line.advance_to(params.warmup)?;
    line.begin_measurement(params.wip_sample_interval);

    tracing::debug!("種子 {}：量測至 {:.0}s", seed, params.horizon);
    line.advance_to(params.horizon)?;

    let result = Collector::collect(&line, params, seed);
    tracing::debug!(
        "種子 {} 完成：產出率 {:.2} 件/小時，WIP {:.2}，事件 {} 個",
        seed,
        result.overall.throughput,
        result.overall.mean_wip,
        line.events_dispatched()
    );
    Ok(result)
}

/// 重複執行器
pub struct ReplicationRunner {
    config: LineConfig,
    params: RunParams,
}

impl ReplicationRunner {
    /// 創建執行器；配置與參數在此驗證
    pub fn new(config: LineConfig, params: RunParams) -> Result<Self> {
        config.validate()?;
        params.validate()?;
        Ok(Self { config, params })
    }

    pub fn config(&self) -> &LineConfig {
        &self.config
    }

    pub fn params(&self) -> &RunParams {
        &self.params
    }

    /// 執行所有重複並彙總
    ///
    /// 設定實際時間預算時，預算涵蓋全部重複；超過即回傳
    /// [`linesim_core::LineError::WallClockBudgetExceeded`]，不重試。
    pub fn run(&self) -> Result<AggregatedResult> {
        tracing::info!(
            "開始模擬 {}：{} 次重複，時界 {:.0}s，暖機 {:.0}s",
            self.config.name,
            self.params.replications,
            self.params.horizon,
            self.params.warmup
        );

        let start_time = Instant::now();
        // 截止點超出 `Instant` 可表示範圍時不設截止
        let deadline = self.params.wall_clock_budget().and_then(|budget| {
            start_time
                .checked_add(budget)
                .map(|deadline| (deadline, budget))
        });

        let seeds: Vec<u64> = (0..self.params.replications)
            .map(|i| self.params.seed_for(i))
            .collect();

        let runs: Vec<SimulationResult> = if self.params.parallel {
            seeds
                .par_iter()
                .map(|&seed| run_with_deadline(&self.config, &self.params, seed, deadline))
                .collect::<Result<Vec<_>>>()?
        } else {
            seeds
                .iter()
                .map(|&seed| run_with_deadline(&self.config, &self.params, seed, deadline))
                .collect::<Result<Vec<_>>>()?
        };

        let machine_order: Vec<String> =
            self.config.machines.iter().map(|m| m.name.clone()).collect();
        let mut aggregated = AggregatedResult::from_runs(&self.config.name, runs, &machine_order);
        aggregated.calculation_time_ms = Some(start_time.elapsed().as_millis());

        tracing::info!(
            "模擬完成，耗時 {:?}：產出率 {:.2} 件/小時，WIP {:.2}，每件能耗 {:.4}",
            start_time.elapsed(),
            aggregated.mean_throughput,
            aggregated.mean_wip,
            aggregated.mean_energy_per_part
        );

        Ok(aggregated)
    }
}
