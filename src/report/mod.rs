//! Harvest summaries
//!
//! Aggregates the contexts returned by a harvest into counts and timings,
//! prints them for the CLI, and renders single pages as JSON lines.

use crate::pipeline::ScrapingContext;
use crate::ratelimit::DomainStats;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;

/// Harvest statistics summary
#[derive(Debug, Clone, Default)]
pub struct HarvestSummary {
    pub total_pages: u64,
    pub succeeded: u64,
    pub failed: u64,

    /// Errors and warnings summed over all pages
    pub total_errors: u64,
    pub total_warnings: u64,

    /// Pipeline restarts summed over all pages
    pub total_retries: u64,

    pub mean_processing_time: Duration,

    /// Mean time of each stage over the pages that ran it
    pub stage_means: BTreeMap<String, Duration>,

    /// Errors counted by the stage they were tagged with
    pub errors_by_stage: BTreeMap<String, u64>,

    /// Spacing statistics per domain, when available
    pub domains: Vec<(String, DomainStats)>,
}

impl HarvestSummary {
    /// Builds a summary from finished contexts
    pub fn from_contexts(contexts: &[ScrapingContext]) -> Self {
        let mut summary = HarvestSummary {
            total_pages: contexts.len() as u64,
            ..Default::default()
        };

        let mut total_time = Duration::ZERO;
        let mut stage_totals: BTreeMap<String, (Duration, u32)> = BTreeMap::new();

        for context in contexts {
            if context.is_success() {
                summary.succeeded += 1;
            } else {
                summary.failed += 1;
            }
            summary.total_errors += context.errors().len() as u64;
            summary.total_warnings += context.warnings().len() as u64;
            summary.total_retries += u64::from(context.retry_count());
            total_time += context.processing_time;

            for error in context.errors() {
                *summary.errors_by_stage.entry(error.stage.clone()).or_insert(0) += 1;
            }
            for (stage, elapsed) in &context.stage_times {
                let entry = stage_totals.entry(stage.clone()).or_insert((Duration::ZERO, 0));
                entry.0 += *elapsed;
                entry.1 += 1;
            }
        }

        if !contexts.is_empty() {
            summary.mean_processing_time = total_time / contexts.len() as u32;
        }
        summary.stage_means = stage_totals
            .into_iter()
            .map(|(stage, (total, count))| (stage, total / count))
            .collect();

        summary
    }

    /// Attaches per-domain spacing statistics
    pub fn with_domain_stats(mut self, domains: Vec<(String, DomainStats)>) -> Self {
        self.domains = domains;
        self
    }

    /// Share of pages that produced a result, in percent
    pub fn success_rate(&self) -> f64 {
        if self.total_pages == 0 {
            0.0
        } else {
            (self.succeeded as f64 / self.total_pages as f64) * 100.0
        }
    }
}

/// Prints a summary to stdout in a formatted manner
pub fn print_summary(summary: &HarvestSummary) {
    println!("=== Harvest Summary ===\n");

    println!("Overview:");
    println!("  Pages: {}", summary.total_pages);
    println!("  Succeeded: {}", summary.succeeded);
    println!("  Failed: {}", summary.failed);
    println!("  Pipeline retries: {}", summary.total_retries);
    println!("  Errors / warnings: {} / {}", summary.total_errors, summary.total_warnings);
    println!("  Mean time per page: {:?}", summary.mean_processing_time);
    println!();

    if !summary.stage_means.is_empty() {
        println!("Mean Stage Times:");
        for (stage, mean) in &summary.stage_means {
            println!("  {}: {:?}", stage, mean);
        }
        println!();
    }

    if !summary.errors_by_stage.is_empty() {
        println!("Errors by Stage:");
        let mut counts: Vec<_> = summary.errors_by_stage.iter().collect();
        counts.sort_by(|a, b| b.1.cmp(a.1));
        for (stage, count) in counts {
            println!("  {}: {}", stage, count);
        }
        println!();
    }

    if !summary.domains.is_empty() {
        println!("Domains ({}):", summary.domains.len());
        for (domain, stats) in &summary.domains {
            println!(
                "  - {}: {} requests, {:?} waited (avg {:?})",
                domain,
                stats.total_requests,
                stats.total_wait,
                stats.average_wait()
            );
        }
        println!();
    }

    println!(
        "Success Rate: {:.1}% ({} / {} pages produced a result)",
        summary.success_rate(),
        summary.succeeded,
        summary.total_pages
    );
}

/// Renders one finished page as a JSON object
pub fn page_json(context: &ScrapingContext) -> Value {
    let stage_times: BTreeMap<&str, f64> = context
        .stage_times
        .iter()
        .map(|(stage, elapsed)| (stage.as_str(), elapsed.as_secs_f64()))
        .collect();
    let messages = |list: &[crate::pipeline::StageMessage]| -> Vec<Value> {
        list.iter()
            .map(|m| json!({ "stage": m.stage, "message": m.message }))
            .collect()
    };

    json!({
        "url": context.url(),
        "success": context.is_success(),
        "robots_allowed": context.robots_allowed,
        "retries": context.retry_count(),
        "result": context.final_result,
        "errors": messages(context.errors()),
        "warnings": messages(context.warnings()),
        "processing_time": context.processing_time.as_secs_f64(),
        "stage_times": stage_times,
    })
}
