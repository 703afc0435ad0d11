//! Performance benchmarks for mcpilot.
//!
//! This module contains benchmarks for:
//! - Bounded-output truncation of large diffs
//! - Descriptor validation and schema adaptation for large tool listings
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::{json, Value};

use mcpilot::core::bound_lines;
use mcpilot::mcp::{adapt, registry::parse_descriptors};

// ============================================================================
// Mock Data Fixtures
// ============================================================================

mod fixtures {
    use super::*;

    /// Generate diff-like text with `num_lines` lines.
    pub fn generate_diff(num_lines: usize) -> String {
        let mut lines = Vec::with_capacity(num_lines);
        for i in 0..num_lines {
            let line = match i % 10 {
                0 => format!("diff --git a/src/file_{i}.rs b/src/file_{i}.rs"),
                1 => format!("@@ -{i},7 +{i},8 @@"),
                2 | 5 => format!("-    let value_{i} = compute({i});"),
                3 | 6 => format!("+    let value_{i} = compute_checked({i})?;"),
                _ => format!("     context line {i}"),
            };
            lines.push(line);
        }
        lines.join("\n")
    }

    /// Generate a `tools/list` payload with `num_tools` entries.
    pub fn generate_tools(num_tools: usize) -> Vec<Value> {
        (0..num_tools)
            .map(|i| {
                json!({
                    "name": format!("tool_{i}"),
                    "description": format!("Tool number {i}"),
                    "inputSchema": {
                        "type": "object",
                        "properties": {
                            "path": {"type": "string"},
                            "limit": {"type": "integer"}
                        },
                        "required": ["path"]
                    }
                })
            })
            .collect()
    }
}

// ============================================================================
// Bounded Output Benchmarks
// ============================================================================

fn bench_bound_lines(c: &mut Criterion) {
    let mut group = c.benchmark_group("bound_lines");

    for size in [100, 1_200, 10_000, 100_000] {
        let diff = fixtures::generate_diff(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("max_500", size), &diff, |b, diff| {
            b.iter(|| bound_lines(black_box(diff), black_box(500)));
        });
    }

    let truncated = bound_lines(&fixtures::generate_diff(10_000), 500).text;
    group.bench_function("already_truncated", |b| {
        b.iter(|| bound_lines(black_box(&truncated), black_box(500)));
    });

    group.finish();
}

// ============================================================================
// Discovery Benchmarks
// ============================================================================

fn bench_discovery(c: &mut Criterion) {
    let mut group = c.benchmark_group("discovery");

    for size in [10, 100, 1_000] {
        let tools = fixtures::generate_tools(size);
        group.throughput(Throughput::Elements(size as u64));

        group.bench_with_input(BenchmarkId::new("parse_descriptors", size), &tools, |b, tools| {
            b.iter(|| parse_descriptors("bench", black_box(tools)));
        });

        let descriptors = parse_descriptors("bench", &tools);
        group.bench_with_input(BenchmarkId::new("adapt", size), &descriptors, |b, descriptors| {
            b.iter(|| adapt(black_box(descriptors)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_bound_lines, bench_discovery);
criterion_main!(benches);
