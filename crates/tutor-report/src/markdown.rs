//! Markdown report generation.
//!
//! The generated document has a summary table, a per-module table, and a
//! footer with the generation time.

use std::fmt::Write;

use crate::{ModuleStatus, Report};

/// Generates Markdown progress reports.
pub struct MarkdownGenerator<'a> {
    report: &'a Report,
}

impl<'a> MarkdownGenerator<'a> {
    /// Creates a new Markdown generator for the given report.
    #[must_use]
    pub const fn new(report: &'a Report) -> Self {
        Self { report }
    }

    /// Generates the complete Markdown report.
    #[must_use]
    pub fn generate(&self) -> String {
        let mut output = String::new();

        self.write_title(&mut output);
        self.write_summary(&mut output);
        self.write_modules(&mut output);
        self.write_footer(&mut output);

        output
    }

    fn write_title(&self, output: &mut String) {
        let _ = writeln!(
            output,
            "# Course Progress: {}\n",
            escape_markdown(&self.report.course_title)
        );
        let _ = writeln!(output, "{}\n", escape_markdown(&self.report.description));
    }

    fn write_summary(&self, output: &mut String) {
        let summary = &self.report.summary;

        let _ = writeln!(output, "## Summary\n");
        let _ = writeln!(output, "| Metric | Value |");
        let _ = writeln!(output, "|--------|-------|");
        let _ = writeln!(output, "| Topic | {} |", escape_markdown(&self.report.topic));
        let _ = writeln!(
            output,
            "| Progress | {}% ({} of {} modules) |",
            summary.percent, summary.completed_modules, summary.total_modules
        );
        let _ = writeln!(
            output,
            "| Lessons Generated | {} |",
            summary.lessons_generated
        );
        let _ = writeln!(
            output,
            "| Best Score | {} |",
            format_score(summary.best_score)
        );
        let _ = writeln!(
            output,
            "| Average Score | {} |",
            format_score(summary.average_score)
        );
        let _ = writeln!(
            output,
            "| Created | {} |",
            self.report.created_at.format("%Y-%m-%d %H:%M UTC")
        );
        let _ = writeln!(output);
    }

    fn write_modules(&self, output: &mut String) {
        let _ = writeln!(output, "## Modules\n");
        let _ = writeln!(output, "| # | Module | Status | Questions | Score |");
        let _ = writeln!(output, "|---|--------|--------|-----------|-------|");

        for module in &self.report.modules {
            let _ = writeln!(
                output,
                "| {} | {} | {} {} | {} | {} |",
                module.position,
                escape_markdown(&module.title),
                status_icon(module.status),
                module.status,
                module.question_count,
                format_score(module.quiz_score)
            );
        }
        let _ = writeln!(output);

        if self.report.is_finished() {
            let _ = writeln!(output, "*All modules completed.*\n");
        }
    }

    fn write_footer(&self, output: &mut String) {
        let _ = writeln!(output, "---\n");
        let _ = writeln!(
            output,
            "*Generated by AI Tutor on {}*",
            self.report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
}

const fn status_icon(status: ModuleStatus) -> &'static str {
    match status {
        ModuleStatus::NotStarted => "○",
        ModuleStatus::InProgress => "◐",
        ModuleStatus::Completed => "✓",
    }
}

fn format_score(score: Option<f64>) -> String {
    score.map_or_else(|| "-".to_string(), |s| format!("{s:.0}%"))
}

/// Escapes characters with special meaning in Markdown.
fn escape_markdown(text: &str) -> String {
    let mut result = String::with_capacity(text.len());

    for ch in text.chars() {
        match ch {
            '*' | '_' | '`' | '#' | '[' | ']' | '!' | '\\' | '<' | '>' | '|' => {
                result.push('\\');
                result.push(ch);
            }
            '\n' => result.push_str("<br>"),
            _ => result.push(ch),
        }
    }

    result
}
