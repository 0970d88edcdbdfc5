//! Table rendering for command output

use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};
use signal_consensus::{ConsensusReport, EnsembleOutcome, RegimeState};
use signal_runtime::ExecutionResult;

fn table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn pct(value: f64) -> String {
    format!("{:.1}%", value * 100.0)
}

pub fn consensus(report: &ConsensusReport) -> String {
    let mut agents = table(vec!["Agent", "Weight", "Result", "Confidence", "Latency", "Detail"]);
    for outcome in &report.outcomes {
        let latency = format!("{}ms", outcome.latency.as_millis());
        match &outcome.result {
            ExecutionResult::Success(signal) => agents.add_row(vec![
                outcome.descriptor.id.clone(),
                format!("{:.2}", outcome.descriptor.weight),
                signal.direction().to_string(),
                pct(signal.confidence()),
                latency,
                signal.reasoning().to_string(),
            ]),
            ExecutionResult::Failure(failure) => agents.add_row(vec![
                outcome.descriptor.id.clone(),
                format!("{:.2}", outcome.descriptor.weight),
                failure.kind.to_string(),
                "-".to_string(),
                latency,
                failure.message.clone(),
            ]),
        };
    }

    let c = &report.consensus;
    let mut summary = table(vec!["Subject", "Strategy", "Direction", "Confidence", "Agreement", "Failures"]);
    summary.add_row(vec![
        report.subject_id.clone(),
        c.strategy.clone(),
        c.direction.to_string(),
        pct(c.confidence),
        pct(c.agreement_fraction),
        format!(
            "{} timeout / {} error / {} invalid",
            report.failures.timeouts, report.failures.agent_errors, report.failures.invalid_outputs
        ),
    ]);

    let mut out = format!("{agents}\n{summary}\n{}", c.rationale);
    if report.empty_result_set {
        out.push_str("\nwarning: no agent produced a valid signal");
    }
    out
}

pub fn ensemble(outcome: &EnsembleOutcome) -> String {
    let mut stages = table(vec!["Stage", "Weight", "Value", "Contribution", "Direction", "Confidence", "Agrees"]);
    for c in &outcome.contributions {
        stages.add_row(vec![
            c.stage.clone(),
            format!("{:.2}", c.weight),
            format!("{:.3}", c.directional_value),
            format!("{:.3}", c.contribution),
            c.direction.to_string(),
            pct(c.confidence),
            if c.agrees { "yes" } else { "no" }.to_string(),
        ]);
    }

    let mut summary = table(vec!["Profile", "Score", "Direction", "Confidence", "Agreement", "Degraded"]);
    summary.add_row(vec![
        outcome.profile.clone(),
        format!("{:.3}", outcome.score),
        outcome.direction().to_string(),
        pct(outcome.confidence),
        pct(outcome.agreement_rate),
        if outcome.degraded {
            format!("yes (missing {})", outcome.missing_stages.join(", "))
        } else {
            "no".to_string()
        },
    ]);

    format!("{stages}\n{summary}")
}

pub fn regime(state: &RegimeState) -> String {
    let mut votes = table(vec!["Indicator", "Value", "Bull", "Bear", "Risk on", "Risk off"]);
    for c in &state.contributions {
        votes.add_row(vec![
            c.indicator.clone(),
            format!("{:.2}", c.value),
            c.votes.bull.to_string(),
            c.votes.bear.to_string(),
            c.votes.risk_on.to_string(),
            c.votes.risk_off.to_string(),
        ]);
    }
    votes.add_row(vec![
        "total".to_string(),
        String::new(),
        state.scores.bull.to_string(),
        state.scores.bear.to_string(),
        state.scores.risk_on.to_string(),
        state.scores.risk_off.to_string(),
    ]);

    format!(
        "{votes}\nregime: {} (confidence {})",
        state.regime,
        pct(state.confidence)
    )
}
