//! Benchmarks for the schedule calculator's `next_date` computation.

use chrono::{TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use jobforge::prelude::Recurrence;

fn bench_every_minute(c: &mut Criterion) {
    let rule = Recurrence::EveryMinute { second: 43 };
    let start = Utc.with_ymd_and_hms(2026, 6, 21, 21, 10, 15).unwrap();
    c.bench_function("recurrence_every_minute", |b| {
        b.iter(|| black_box(rule.next_date(black_box(start))))
    });
}

fn bench_monthly_skip(c: &mut Criterion) {
    let rule = Recurrence::Monthly {
        day_of_month: 31,
        hour: 0,
        minute: 0,
        tz: chrono_tz::UTC,
    };
    let start = Utc.with_ymd_and_hms(2026, 4, 29, 12, 0, 0).unwrap();
    c.bench_function("recurrence_monthly_skip_short_months", |b| {
        b.iter(|| black_box(rule.next_date(black_box(start))))
    });
}

criterion_group!(benches, bench_every_minute, bench_monthly_skip);
criterion_main!(benches);
