use criterion::{Criterion, black_box, criterion_group, criterion_main};
use serde_json::json;
use webqa::browser::{BoundingBox, DEFAULT_VIEWPORT};
use webqa::dsl::validate_test_definition;
use webqa::interpreter::padded_clip;

fn benchmark_validation(c: &mut Criterion) {
    let steps: Vec<_> = (0..50)
        .map(|i| match i % 4 {
            0 => json!({ "action": "goto", "url": "https://example.com" }),
            1 => json!({ "action": "type", "selector": "#q", "text": "query" }),
            2 => json!({ "action": "screenshot_element", "selector": "#r", "name": format!("r{}", i), "padding": 8 }),
            _ => json!({ "action": "wait_for", "selector": ".done", "timeout": 1000 }),
        })
        .collect();
    let input = json!({ "test_name": "bench", "steps": steps });

    c.bench_function("validate_50_steps", |b| {
        b.iter(|| {
            let result = validate_test_definition(black_box(&input));
            assert!(result.is_ok());
        })
    });
}

fn benchmark_padded_clip(c: &mut Criterion) {
    let bounds = BoundingBox::new(1200.0, 690.0, 100.0, 50.0);

    c.bench_function("padded_clip", |b| {
        b.iter(|| padded_clip(black_box(&bounds), black_box(10.0), DEFAULT_VIEWPORT))
    });
}

criterion_group!(benches, benchmark_validation, benchmark_padded_clip);
criterion_main!(benches);
