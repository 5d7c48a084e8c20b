//! 從 JSON 情境檔執行模擬
//!
//! 執行：`cargo run --example scenario_json -- demos/scenarios/two_stage.json`

use anyhow::Context;
use linesim::{run_scenario_file, to_json};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "demos/scenarios/two_stage.json".to_string());

    let result =
        run_scenario_file(&path).with_context(|| format!("無法執行情境檔 {}", path))?;

    println!("{}", result);
    println!("=== 攤平 KPI ===");
    for (key, value) in result.to_flat_map() {
        println!("  {:<24} {:>12.4}", key, value);
    }

    if std::env::var_os("LINESIM_JSON").is_some() {
        println!("{}", to_json(&result)?);
    }

    Ok(())
}
