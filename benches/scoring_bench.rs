//! Performance benchmarks for usage aggregation and scoring
//!
//! Targets:
//! - Aggregation: <1ms for a full 100-session batch
//! - Scoring: <1us per technology

use chrono::{Duration, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use stackwise_core::analysis::{aggregate, scoring};
use stackwise_core::config::ProficiencyScoring;
use stackwise_core::{Session, UserId};

const TECHNOLOGIES: [&str; 8] = [
    "Rust", "Python", "Go", "TypeScript", "React", "Django", "Docker", "SQL",
];

fn sessions(count: usize) -> Vec<Session> {
    (0..count)
        .map(|i| {
            let mut s = Session::new(
                format!("s{}", i),
                UserId(1),
                Utc::now() - Duration::minutes(i as i64),
            );
            s.primary_technology = Some(TECHNOLOGIES[i % TECHNOLOGIES.len()].to_string());
            s.frameworks = vec![TECHNOLOGIES[(i + 3) % TECHNOLOGIES.len()].to_string()];
            s.tools = vec!["Git".to_string()];
            s.duration_minutes = 30.0 + (i % 90) as f64;
            s.complexity_score = (i % 11) as f64;
            s.quality_score = (i % 101) as f64;
            s.project_name = Some(format!("project-{}", i % 5));
            s
        })
        .collect()
}

fn bench_aggregate(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregate");

    for size in [10, 100, 1000] {
        let batch = sessions(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &batch, |b, batch| {
            b.iter(|| aggregate(black_box(batch)));
        });
    }

    group.finish();
}

fn bench_scoring(c: &mut Criterion) {
    let usage = aggregate(&sessions(100));
    let proficiency = ProficiencyScoring::default();

    c.bench_function("raw_increment_all_technologies", |b| {
        b.iter(|| {
            usage
                .technologies
                .values()
                .map(|tech| scoring::raw_increment(black_box(tech), &proficiency))
                .sum::<f64>()
        });
    });

    c.bench_function("apply_increment_to_saturation", |b| {
        b.iter(|| {
            let mut score = 0.0;
            for _ in 0..100 {
                score = scoring::apply_increment(black_box(score), 20.0, &proficiency);
            }
            scoring::level_for(score)
        });
    });
}

criterion_group!(benches, bench_aggregate, bench_scoring);
criterion_main!(benches);
