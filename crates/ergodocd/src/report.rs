//! Terminal rendering for conclusions, hypotheses and playbooks.
//!
//! ASCII only. Renderers return strings; the binary prints them.

use crate::action::{ActionOutcome, ActionRisk};
use crate::session::{Conclusion, ConclusionReason};
use ergodoc_shared::{
    BudgetCheck, Condition, ConfidenceTier, Hypothesis, PlaybookSet, Rule, TrendDirection,
};
use owo_colors::OwoColorize;
use std::fmt::Write;

fn tier_label(tier: ConfidenceTier) -> String {
    let label = format!("[{}]", tier.as_str().to_uppercase());
    match tier {
        ConfidenceTier::Confirmed => label.bright_green().bold().to_string(),
        ConfidenceTier::High => label.green().to_string(),
        ConfidenceTier::Medium => label.yellow().to_string(),
        ConfidenceTier::Low => label.dimmed().to_string(),
    }
}

pub fn describe_condition(condition: &Condition) -> String {
    match condition {
        Condition::Threshold { field, op, value } => {
            format!("{} {} {}", field, op.symbol(), value)
        }
        Condition::Compare { left, op, right } => format!("{} {} {}", left, op.symbol(), right),
        Condition::Equals { field, value } => format!("{} == {}", field, value),
        Condition::Trend {
            field,
            direction,
            samples,
        } => {
            let verb = match direction {
                TrendDirection::Increasing => "rising",
                TrendDirection::Decreasing => "falling",
            };
            format!("{} {} over {} samples", field, verb, samples)
        }
    }
}

/// Hypotheses in rule-priority order, with evidence.
pub fn render_hypotheses(hypotheses: &[Hypothesis]) -> String {
    let mut out = String::new();
    if hypotheses.is_empty() {
        let _ = writeln!(out, "  {}", "No rule matched".dimmed());
        return out;
    }
    for (rank, h) in hypotheses.iter().enumerate() {
        let subject = if h.subject.is_empty() {
            String::new()
        } else {
            format!(" ({})", h.subject.cyan())
        };
        let _ = writeln!(
            out,
            "  {}. {} {}{}",
            rank + 1,
            tier_label(h.tier),
            h.root_cause.bold(),
            subject
        );
        let _ = writeln!(out, "     rule:   {}", h.rule_id);
        let _ = writeln!(out, "     action: {}", h.action);
        for evidence in &h.evidence {
            let _ = writeln!(out, "     * {}", evidence.detail.dimmed());
        }
    }
    out
}

pub fn render_conclusion(conclusion: &Conclusion) -> String {
    let mut out = String::new();
    let headline = match &conclusion.reason {
        ConclusionReason::Confirmed { rule_id } => {
            format!("[CONFIRMED] {}", rule_id).bright_green().bold().to_string()
        }
        ConclusionReason::BudgetExhausted { check } => {
            let why = match check {
                BudgetCheck::StepsExhausted { limit, .. } => format!("{} step(s) used", limit),
                BudgetCheck::TimeExhausted { budget_ms, .. } => format!("{}ms spent", budget_ms),
                BudgetCheck::Ok => "budget spent".to_string(),
            };
            format!("[BEST EFFORT] budget exhausted, {}", why)
                .yellow()
                .to_string()
        }
    };

    let _ = writeln!(out);
    let _ = writeln!(out, "{}", headline);
    let _ = writeln!(
        out,
        "Playbook {} v{} | session {} | {} step(s) | {}ms | {} observation(s)",
        conclusion.playbook_id.cyan(),
        conclusion.playbook_version,
        conclusion.session_id,
        conclusion.steps_used,
        conclusion.elapsed_ms,
        conclusion.history.len()
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "[HYPOTHESES]");
    out.push_str(&render_hypotheses(&conclusion.hypotheses));
    out
}

/// Every playbook with its rules in priority order.
pub fn render_playbooks(set: &PlaybookSet) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Playbook set v{}", set.version);
    for playbook in &set.playbooks {
        let _ = writeln!(out);
        let _ = writeln!(out, "{} - {}", playbook.id.cyan().bold(), playbook.title);
        if !playbook.description.is_empty() {
            let _ = writeln!(out, "  {}", playbook.description.dimmed());
        }
        if playbook.rules.iter().any(Rule::has_trend) {
            let _ = writeln!(
                out,
                "  trend window: {} samples",
                playbook.max_trend_samples()
            );
        }
        for (rank, rule) in playbook.rules.iter().enumerate() {
            let _ = writeln!(
                out,
                "  {}. {} {} [{}]",
                rank + 1,
                tier_label(rule.tier()),
                rule.id,
                rule.kind
            );
            let conditions: Vec<String> = rule.when.iter().map(describe_condition).collect();
            let _ = writeln!(out, "     when {}", conditions.join(" and "));
        }
    }
    out
}

pub fn render_action(outcome: &ActionOutcome) -> String {
    let risk = match outcome.request.risk() {
        ActionRisk::Medium => "medium".yellow().to_string(),
        ActionRisk::High => "high".bright_red().to_string(),
    };
    let status = if outcome.applied {
        "[APPLIED]".green().to_string()
    } else {
        "[DRY RUN]".yellow().to_string()
    };
    format!("{} {} (risk {}, token {})", status, outcome.message, risk, outcome.token_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ergodoc_shared::Comparison;

    #[test]
    fn test_describe_conditions() {
        assert_eq!(
            describe_condition(&Condition::above("mailbox_depth", 100.0)),
            "mailbox_depth > 100"
        );
        assert_eq!(
            describe_condition(&Condition::compare(
                "restart_count",
                Comparison::Gt,
                "restart_intensity"
            )),
            "restart_count > restart_intensity"
        );
        assert_eq!(
            describe_condition(&Condition::decreasing("drain_ratio", 4)),
            "drain_ratio falling over 4 samples"
        );
        assert_eq!(
            describe_condition(&Condition::is("state", "wait_response")),
            "state == wait_response"
        );
    }

    #[test]
    fn test_playbook_listing_keeps_rule_order() {
        let rendered = render_playbooks(&PlaybookSet::builtin());
        let overload = rendered.find("mailbox-overload").unwrap();
        let deep = rendered.find("deep-mailbox").unwrap();
        assert!(overload < deep);
        assert!(rendered.contains("restart-intensity-exceeded"));
    }

    #[test]
    fn test_playbook_listing_shows_trend_window() {
        let rendered = render_playbooks(&PlaybookSet::builtin());
        let performance = rendered.find("Slow or overloaded processes").unwrap();
        let window = rendered.find("trend window: 3 samples").unwrap();
        assert!(performance < window);
    }

    #[test]
    fn test_empty_hypotheses() {
        assert!(render_hypotheses(&[]).contains("No rule matched"));
    }
}
