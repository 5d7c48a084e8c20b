use criterion::{black_box, criterion_group, criterion_main, Criterion};
use linesim_core::{LineConfig, RunParams};
use linesim_engine::{run_replication, Line};

/// 參考產線一次重複（7 天、暖機 1 天）
fn bench_reference_replication(c: &mut Criterion) {
    let config = LineConfig::reference_line();
    let params = RunParams::new(7.0 * 86_400.0, 86_400.0);

    c.bench_function("reference_line_7_days", |b| {
        b.iter(|| black_box(run_replication(&config, &params, 11)))
    });
}

/// 單純推進事件，不計算 KPI
fn bench_event_dispatch(c: &mut Criterion) {
    let config = LineConfig::reference_line();

    c.bench_function("reference_line_advance_1_day", |b| {
        b.iter(|| {
            let mut line = Line::build(&config, 11, 1.0).ok()?;
            line.advance_to(86_400.0).ok()?;
            Some(black_box(line.events_dispatched()))
        })
    });
}

criterion_group!(benches, bench_reference_replication, bench_event_dispatch);
criterion_main!(benches);
