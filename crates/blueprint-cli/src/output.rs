//! Run result output.

use anyhow::Result;

use blueprint_engine::{RunResult, StepStatus};

/// Print a run result to stdout.
pub fn print_run(result: &RunResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
    } else {
        print!("{}", render_summary(result));
    }
    Ok(())
}

/// Human-readable summary of a run.
pub fn render_summary(result: &RunResult) -> String {
    let status = if result.success { "SUCCEEDED" } else { "FAILED" };
    let mut out = format!(
        "Run {} {} in {} ms\n",
        result.run_id, status, result.duration_ms
    );

    let width = result
        .results
        .iter()
        .map(|r| r.step_id.len())
        .max()
        .unwrap_or(0);

    for step in &result.results {
        let mut line = format!("  {:<9} {:<width$}", step.status.to_string(), step.step_id);
        if step.status != StepStatus::Skipped {
            line.push_str(&format!(" {:>6} ms", step.duration_ms));
        }
        if let Some(ref error) = step.error {
            line.push_str(&format!("  {}", error));
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }

    if !result.errors.is_empty() {
        out.push_str("Errors:\n");
        for error in &result.errors {
            out.push_str(&format!("  - {}\n", error));
        }
    }
    out
}
