//! 參考產線模擬示例
//!
//! M1 → M2 → [M3 ‖ M4] → M5（含不良品分流、平日晚班停機）
//!
//! 執行：`RUST_LOG=info cargo run --example reference_line`

use linesim::{LineConfig, ReplicationRunner, RunParams};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== 參考產線模擬 ===\n");

    let config = LineConfig::reference_line();
    println!("產線配置: {}", config.name);
    for machine in &config.machines {
        println!(
            "  - {}: {} → {}, 加工 {:.0}s, 可用率 {:.2}%, MTTR {:.0}s",
            machine.name,
            machine.input,
            machine.output,
            machine.process_time.mean(),
            machine.availability,
            machine.mttr
        );
    }
    println!();

    // 30 天模擬、1 天暖機、10 次重複、種子 11
    let params = RunParams::default().with_parallel(true);
    tracing::info!(
        "執行 {} 次重複，基礎種子 {}",
        params.replications,
        params.base_seed
    );
    let result = ReplicationRunner::new(config, params)?.run()?;

    println!("{}", result);

    println!("=== 各次重複 ===");
    for run in &result.runs {
        println!(
            "  種子 {:>3}: 產出率 {:>7.2} 件/小時, WIP {:>5.2}, 每件能耗 {:.4} kWh",
            run.seed,
            run.overall.throughput,
            run.overall.mean_wip,
            run.energy_per_part()
        );
    }

    if let Some(ms) = result.calculation_time_ms {
        println!("\n計算耗時: {} ms", ms);
    }

    Ok(())
}
