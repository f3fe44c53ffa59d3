//! Terminal output: spinner while a job runs, coloured results.
//!
//! Uses `indicatif` for the spinner and `console` for styling.

use std::time::Duration;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::audit::{AuditRecord, AuditSummary};
use crate::job::Label;
use crate::service::JobView;

/// Progress indicator for one job submitted from the terminal.
pub struct JobProgress {
    pb: ProgressBar,
    green: Style,
    red: Style,
    yellow: Style,
}

impl JobProgress {
    pub fn start(job_id: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(format!("queued {job_id}"));
        pb.enable_steady_tick(Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    pub fn processing(&self) {
        self.pb.set_message("processing");
    }

    /// Clears the spinner and prints the final view.
    pub fn finish(&self, view: &JobView) {
        self.pb.finish_and_clear();
        match view {
            JobView::Complete { result } => {
                let style = label_style(result.label, &self.yellow, &self.green);
                println!(
                    "  {} {} ({:.2}% confidence, {:.4}s)",
                    self.green.apply_to("✓"),
                    style.apply_to(result.label),
                    result.confidence,
                    result.processing_time_seconds
                );
            }
            JobView::Failed { error } => {
                println!("  {} Job failed: {error}", self.red.apply_to("✗"));
            }
            JobView::Processing => {
                println!("  {} still processing", self.yellow.apply_to("…"));
            }
        }
    }
}

fn label_style<'a>(label: Label, ai: &'a Style, human: &'a Style) -> &'a Style {
    match label {
        Label::Ai => ai,
        Label::Human => human,
    }
}

/// Prints summary statistics followed by records, newest first.
pub fn print_audit(summary: &AuditSummary, records: &[AuditRecord]) {
    let bold = Style::new().bold();
    let dim = Style::new().dim();
    let yellow = Style::new().yellow();
    let green = Style::new().green();

    println!("{}", bold.apply_to("─── Audit Summary ───"));
    println!("  total queries     {}", summary.total_queries);
    match summary.avg_processing_time_seconds {
        Some(avg) => println!("  avg. response     {avg:.4}s"),
        None => println!("  avg. response     -"),
    }
    println!("  AI detections     {}", summary.ai_detections);
    println!("  human detections  {}", summary.human_detections);

    if records.is_empty() {
        println!();
        println!("{}", dim.apply_to("No queries have been logged yet."));
        return;
    }

    println!();
    println!("{}", bold.apply_to("─── Recent Queries ───"));
    for record in records {
        let style = label_style(record.label, &yellow, &green);
        println!(
            "  #{:<5} {}  {:<14} {:>6.2}%  {:.4}s  {}",
            record.sequence_id,
            dim.apply_to(record.timestamp.format("%Y-%m-%d %H:%M:%S")),
            style.apply_to(record.label),
            record.confidence,
            record.latency_seconds,
            preview(&record.input_text, 48),
        );
    }
}

/// First `max` characters of `text` on one line.
fn preview(text: &str, max: usize) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max {
        flat
    } else {
        let cut: String = flat.chars().take(max.saturating_sub(1)).collect();
        format!("{cut}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_flattens_and_truncates() {
        assert_eq!(preview("short\ntext", 48), "short text");
        assert_eq!(preview("abcdefghij", 5), "abcd…");
    }

    #[test]
    fn preview_counts_characters_not_bytes() {
        assert_eq!(preview("ééééé", 5), "ééééé");
    }
}
