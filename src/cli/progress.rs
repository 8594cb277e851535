use std::path::Path;
use std::time::{Duration, Instant};

use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::models::scan_tree::ScanTree;
use crate::pipeline::{duration_ms, PipelineEvent, STAGES};

/// Renders pipeline events as a stage bar plus a status spinner.
pub struct ScanProgress {
    multi: MultiProgress,
    stage_bar: Option<ProgressBar>,
    status_bar: ProgressBar,
    findings_count: usize,
    start_time: Instant,
}

impl ScanProgress {
    pub fn new() -> Self {
        let multi = MultiProgress::new();

        let status_bar = multi.add(ProgressBar::new_spinner());
        if let Ok(spinner) = ProgressStyle::default_spinner().template("  {spinner:.cyan} {msg}") {
            status_bar.set_style(spinner);
        }
        status_bar.set_message("Initializing scan...");
        status_bar.enable_steady_tick(Duration::from_millis(120));

        Self {
            multi,
            stage_bar: None,
            status_bar,
            findings_count: 0,
            start_time: Instant::now(),
        }
    }

    pub fn handle_event(&mut self, event: &PipelineEvent) {
        match event {
            PipelineEvent::RunStarted { seed_url, scope_host } => {
                let bar = self
                    .multi
                    .insert_before(&self.status_bar, ProgressBar::new(STAGES.len() as u64));
                if let Ok(bar_style) = ProgressStyle::default_bar()
                    .template("  {bar:30.cyan/dark_gray} {pos}/{len} stages | {msg}")
                {
                    bar.set_style(bar_style.progress_chars("█▓░"));
                }
                bar.set_message(format!("Scanning {} ({})", seed_url, scope_host));
                self.stage_bar = Some(bar);
                self.update_status();
            }
            PipelineEvent::StageStarted { display_name, .. } => {
                if let Some(bar) = &self.stage_bar {
                    bar.set_message(display_name.to_string());
                }
                self.update_status();
            }
            PipelineEvent::StageCompleted { display_name, duration_ms, .. } => {
                if let Some(bar) = &self.stage_bar {
                    bar.inc(1);
                }
                self.println(&format!(
                    "  {} {} ({})",
                    style("✓").green(),
                    display_name,
                    format_elapsed(*duration_ms)
                ));
            }
            PipelineEvent::StageSkipped { .. } => {
                if let Some(bar) = &self.stage_bar {
                    bar.inc(1);
                }
            }
            PipelineEvent::StageFailed { display_name, error, .. } => {
                self.println(&format!("  {} {}: {}", style("✗").red(), display_name, error));
            }
            PipelineEvent::FindingsRecorded { count, .. } => {
                self.findings_count += count;
                self.update_status();
            }
            PipelineEvent::RunCompleted { total_findings, crawled, scanned, duration_ms } => {
                if let Some(bar) = self.stage_bar.take() {
                    bar.finish_with_message("All stages complete");
                }
                self.status_bar.finish_with_message(format!(
                    "Scan complete: {} findings | {} crawled | {} scanned | {}",
                    total_findings,
                    crawled,
                    scanned,
                    format_elapsed(*duration_ms),
                ));
            }
            PipelineEvent::RunInterrupted => {
                if let Some(bar) = self.stage_bar.take() {
                    bar.abandon_with_message("Interrupted");
                }
                self.status_bar.finish_with_message("Scan interrupted");
            }
            PipelineEvent::RunFailed { error } => {
                if let Some(bar) = self.stage_bar.take() {
                    bar.abandon_with_message("Failed");
                }
                self.status_bar.finish_with_message(format!("Scan failed: {}", error));
            }
        }
    }

    /// Stop the spinner if the run ended without a terminal event.
    pub fn finish(&mut self) {
        if let Some(bar) = self.stage_bar.take() {
            bar.abandon();
        }
        if !self.status_bar.is_finished() {
            self.status_bar.finish_and_clear();
        }
    }

    fn update_status(&self) {
        let elapsed = format_elapsed(duration_ms(self.start_time.elapsed()));
        self.status_bar
            .set_message(format!("{} | {} findings", elapsed, self.findings_count));
    }

    fn println(&self, msg: &str) {
        let _ = self.multi.println(msg);
    }
}

impl Default for ScanProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// Print the end-of-run summary.
pub fn print_summary(tree: &ScanTree, output: Option<&Path>) {
    println!();
    println!("  {} {}", style("▶").cyan().bold(), style("Scan summary").bold());
    println!("    Scope:     {}", tree.scope_host);
    println!("    Start URL: {}", tree.start_url);
    println!("    Crawled:   {}", tree.crawled_count);
    println!("    Scanned:   {}", tree.scanned_count);
    println!("    Findings:  {}", tree.total_findings());
    if !tree.cms_results.is_empty() {
        println!("    CMS:       {}", tree.cms_results.len());
    }
    if !tree.webapp_results.is_empty() {
        println!("    WebApps:   {}", tree.webapp_results.len());
    }
    if !tree.exploit_results.is_empty() {
        println!("    Exploits:  {} queries", tree.exploit_results.len());
    }
    println!("    Duration:  {}", format_elapsed(tree.duration_ms()));
    if let Some(path) = output {
        println!("  {} Report written to {}", style("✓").green(), path.display());
    }
}

pub fn format_elapsed(ms: u64) -> String {
    let secs = ms / 1000;
    let mins = secs / 60;
    let remaining_secs = secs % 60;
    if mins > 0 {
        format!("{}m{}s", mins, remaining_secs)
    } else {
        format!("{}s", secs)
    }
}
