//! 比較緩衝區容量對參考產線的影響

use linesim::{ChannelSpec, ConfigComparator, Kpi, LineConfig, RunParams, Verdict};
use tracing_subscriber::EnvFilter;

/// 把參考產線的輸送緩衝區容量改成 `capacity`
fn with_buffer_capacity(capacity: usize) -> LineConfig {
    let mut config = LineConfig::reference_line();
    config.name = format!("buffers-{}", capacity);
    for channel in &mut config.channels {
        if channel.is_delay() {
            *channel = ChannelSpec::delay(channel.name.clone(), capacity, 10.0);
        }
    }
    config
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== 緩衝區容量比較 ===\n");

    let configs: Vec<LineConfig> = [2, 4, 8].into_iter().map(with_buffer_capacity).collect();
    let params = RunParams::new(14.0 * 86_400.0, 86_400.0)
        .with_replications(5)
        .with_parallel(true);

    let report = ConfigComparator::new(params).with_tolerance(0.5).run(&configs, 0)?;

    println!("基準: {}\n", report.baseline);
    for candidate in &report.candidates {
        println!("{}:", candidate.name);
        for delta in &candidate.deltas {
            let percent = delta
                .percent
                .map_or_else(|| "n/a".to_string(), |p| format!("{:+.2}%", p));
            let mark = match delta.verdict {
                Verdict::Improved => "✓",
                Verdict::Worsened => "✗",
                Verdict::Unchanged => "=",
            };
            println!(
                "  {} {:<16} {:>10.4} → {:>10.4} ({})",
                mark,
                delta.kpi.name(),
                delta.baseline,
                delta.candidate,
                percent
            );
        }
        if let Some(machine) = &candidate.top_bottleneck {
            println!("  主要瓶頸: {}", machine);
        }
        println!();
    }

    for kpi in Kpi::ALL {
        if let Some(best) = report.best_by(kpi) {
            println!("最佳 {}: {}", kpi.name(), best);
        }
    }

    Ok(())
}
