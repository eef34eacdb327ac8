use crate::results::{CaseOutcome, Classification, RunView};
use colored::{ColoredString, Colorize};
use std::fmt::Write;

fn paint(text: String, classification: Classification) -> ColoredString {
    match classification {
        Classification::Success => text.green(),
        Classification::Warning => text.yellow(),
        Classification::Failure => text.red(),
        Classification::Neutral => text.dimmed(),
    }
}

/// Render a run view as a terminal summary
pub fn render(view: &RunView) -> String {
    let summary = &view.summary;
    let mut out = String::new();

    let rate = format!("{}%", summary.success_rate);
    let rate = if summary.passed_steps == summary.total_steps {
        rate.green().bold()
    } else {
        rate.yellow().bold()
    };

    let _ = writeln!(out, "\n{}", "═".repeat(60).cyan());
    let _ = writeln!(out, "  {} {}", "Run".bold(), summary.run_id.cyan());
    let _ = writeln!(
        out,
        "  Steps: {}/{} passed ({})",
        summary.passed_steps, summary.total_steps, rate
    );
    let _ = writeln!(
        out,
        "  Avg response: {:.2}ms   Duration: {}",
        summary.average_response_time, summary.duration
    );

    let codes: Vec<String> = view
        .status_chart
        .iter()
        .map(|p| paint(format!("{}: {}", p.label, p.value), p.classification).to_string())
        .collect();
    let _ = writeln!(out, "  Status codes: {}", codes.join("  "));
    let _ = writeln!(out, "{}", "─".repeat(60).dimmed());

    for step in &view.steps {
        let mark = if step.is_passed() {
            "✓".green()
        } else {
            "✗".red()
        };
        let code = step
            .status_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "---".to_string());
        let time = step
            .response_time
            .map(|t| format!("{:.0}ms", t))
            .unwrap_or_default();
        let _ = write!(out, "  {} #{:<3} {} {:>8}", mark, step.sequence, code, time);
        if let Some(case) = &step.case_id {
            let _ = write!(out, "  {}", case.dimmed());
        }
        if let Some(err) = &step.error_message {
            let _ = write!(out, "  {}", err.red());
        }
        out.push('\n');
    }

    if !view.cases.is_empty() {
        let _ = writeln!(out, "{}", "─".repeat(60).dimmed());
        for case in &view.cases {
            let label = match case.outcome {
                CaseOutcome::Passed => "PASS".green(),
                CaseOutcome::Failed => "FAIL".red(),
                CaseOutcome::Skipped => "SKIP".yellow(),
            };
            let _ = writeln!(out, "  {} {} ({} steps)", label, case.name, case.step_count);
        }
    }

    let _ = writeln!(out, "{}", "═".repeat(60).cyan());
    out
}

/// Print the summary to stdout
pub fn print(view: &RunView) {
    print!("{}", render(view));
}
