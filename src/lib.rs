//! # linesim
//!
//! 產線離散事件模擬：評估產線配置的產出率、在製品、能耗與瓶頸
//!
//! ```no_run
//! use linesim::{LineConfig, ReplicationRunner, RunParams};
//!
//! let runner = ReplicationRunner::new(LineConfig::reference_line(), RunParams::default())?;
//! let result = runner.run()?;
//! println!("{}", result);
//! # Ok::<(), linesim::LineError>(())
//! ```

pub use linesim_compare;
pub use linesim_core;
pub use linesim_engine;

pub use linesim_compare::{compare, ComparisonReport, ConfigComparator, Kpi, Verdict};
pub use linesim_core::{
    ChannelSpec, LineConfig, LineError, MachineSpec, MergerSpec, ProcessTime, ProductionCalendar,
    Result, RunParams, Scenario, SourceSpec, SplitterSpec, StopWindow,
};
pub use linesim_engine::{
    run_replication, AggregatedResult, Line, ReplicationRunner, SimulationResult,
};

/// 從 JSON 情境檔執行所有重複
pub fn run_scenario_file(path: impl AsRef<std::path::Path>) -> Result<AggregatedResult> {
    let scenario = Scenario::from_json_file(path)?;
    ReplicationRunner::new(scenario.line, scenario.run)?.run()
}

/// 從 JSON 情境字串執行所有重複
pub fn run_scenario_json(json: &str) -> Result<AggregatedResult> {
    let scenario = Scenario::from_json_str(json)?;
    ReplicationRunner::new(scenario.line, scenario.run)?.run()
}

/// 彙總結果的 JSON 表示
pub fn to_json(result: &AggregatedResult) -> Result<String> {
    Ok(serde_json::to_string_pretty(result)?)
}
