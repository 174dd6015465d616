//! End-of-run summary rendering
//!
//! Printed after every run, success or failure, even in quiet mode: the
//! per-phase outcomes, the health report when validation ran, and every
//! accumulated warning and failure from the error log.

use comfy_table::{Cell, Color, Table};
use host_orchestration::{PhaseOutcome, RunContext, RunReport, TerminalState};

/// Print the run summary to stdout
pub fn print(report: &RunReport, ctx: &RunContext) {
    let mut table = Table::new();
    table.set_header(vec!["PHASE", "OUTCOME", "DETAIL"]);

    for phase in &report.phases {
        let (label, color, detail) = match &phase.outcome {
            PhaseOutcome::Completed => ("completed", Color::Green, String::new()),
            PhaseOutcome::AlreadySatisfied => {
                ("already satisfied", Color::DarkGrey, String::new())
            }
            PhaseOutcome::Warned(detail) => ("warning", Color::Yellow, detail.clone()),
            PhaseOutcome::Failed(detail) => ("failed", Color::Red, detail.clone()),
        };
        table.add_row(vec![
            Cell::new(phase.name),
            Cell::new(label).fg(color),
            Cell::new(detail),
        ]);
    }
    println!("{}", table);

    if let Some(health) = ctx.health.read().unwrap().as_ref() {
        let listening = format_ports(&health.listening_ports);
        let unreachable = format_ports(&health.unreachable_ports);
        println!(
            "Health: process {}, probe {}, listening [{}], not listening [{}]",
            if health.process_active { "active" } else { "inactive" },
            if health.probe_ok { "ok" } else { "failed" },
            listening,
            unreachable,
        );
    }

    if !report.records.is_empty() {
        let mut errors = Table::new();
        errors.set_header(vec!["TIME", "SOURCE", "EXIT", "DETAIL"]);
        for record in &report.records {
            errors.add_row(vec![
                Cell::new(record.timestamp.format("%H:%M:%S").to_string()),
                Cell::new(&record.command),
                Cell::new(
                    record
                        .exit_code
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                ),
                Cell::new(record.output.trim()),
            ]);
        }
        println!("{} issue(s) recorded:", report.records.len());
        println!("{}", errors);
    }

    let (label, color) = match report.terminal {
        TerminalState::Success => ("success", Color::Green),
        TerminalState::FailedRolledBack => ("failed (rolled back)", Color::Red),
        TerminalState::FailedNoRollback => ("failed (no rollback)", Color::Red),
    };
    let mut result = Table::new();
    result.add_row(vec![
        Cell::new(format!("run {}", report.run_id)),
        Cell::new(label).fg(color),
    ]);
    println!("{}", result);
}

fn format_ports(ports: &[u16]) -> String {
    ports
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
