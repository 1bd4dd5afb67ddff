use fanout_core::progress::Progress;
use fanout_core::{RunId, RunOutcome};

/// Prints the three progress lines of a counter run to stdout
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleProgress;

impl Progress for ConsoleProgress {
    fn on_scatter(&self, _run_id: RunId, units: u64) {
        println!("Routing... Spawning {} tasks.", units);
    }

    fn on_barrier(&self, _run_id: RunId, _completed: u64, _failed: u64) {
        println!("Node: collector (all increments complete)");
    }

    fn on_result(&self, _run_id: RunId, expected: i64, got: i64) {
        println!("Node: result (Expected={}, Got={})", expected, got);
    }
}

/// Final banner printed after a run
pub fn render_outcome(outcome: &RunOutcome) -> String {
    let rule = "=".repeat(30);
    let mut out = format!(
        "\n{rule}\n      FINAL EXECUTION RESULT\n{rule}\n{}\nFinal counter value: {}\n",
        outcome.message, outcome.final_value
    );

    for failure in outcome.failures.iter().take(10) {
        out.push_str(&format!("  unit {}: {}\n", failure.index, failure.error));
    }
    if outcome.failures.len() > 10 {
        out.push_str(&format!("  ... and {} more\n", outcome.failures.len() - 10));
    }

    out
}
