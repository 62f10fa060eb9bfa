use std::rc::Rc;

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use rhythmic::{Bpm, ManualClock, Repeater, Sequence};

/// Benchmark tempo conversions (hot path for tap-driven tempo changes)
fn bench_bpm_conversions(c: &mut Criterion) {
    c.bench_function("bpm_from_beat_length", |b| {
        b.iter(|| black_box(Bpm::for_beat_length(black_box(417.23)).current()));
    });

    c.bench_function("bpm_change_to", |b| {
        let bpm = Bpm::new(120.0);
        let mut next = 20.0;
        b.iter(|| {
            next = if next > 300.0 { 20.0 } else { next + 0.37 };
            bpm.change_to(black_box(next));
        });
    });
}

/// Benchmark a full scheduling pass over sequences of growing size
fn bench_sequence_scheduling_pass(c: &mut Criterion) {
    let mut group = c.benchmark_group("sequence_start");

    for event_count in [16, 128, 1024] {
        group.bench_with_input(
            BenchmarkId::from_parameter(event_count),
            &event_count,
            |b, &count| {
                let clock = ManualClock::new();
                let sequence = Sequence::new(Rc::new(clock.clone()));
                for i in 0..count {
                    sequence.add_event_at(i as f64 * 10.0, "note", i);
                }
                sequence.set_loop(count as f64 * 10.0);

                b.iter(|| {
                    sequence.start();
                    sequence.stop();
                });
            },
        );
    }
    group.finish();
}

/// Benchmark draining many pending one-shots through the clock queue
fn bench_clock_advance(c: &mut Criterion) {
    c.bench_function("manual_clock_advance_1k_ticks", |b| {
        b.iter(|| {
            let clock = ManualClock::new();
            let repeater = Repeater::new(Rc::new(clock.clone()), 1.0);
            repeater.start(|| {});
            clock.advance(black_box(1000.0));
            repeater.stop();
        });
    });
}

criterion_group!(
    benches,
    bench_bpm_conversions,
    bench_sequence_scheduling_pass,
    bench_clock_advance
);
criterion_main!(benches);
