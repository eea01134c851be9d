use super::normalizer::normalize;
use super::taxonomy::RuleSet;
use super::Decision;

/// Normalize `cmd` and run it through the danger taxonomy.
pub fn analyze_command(rules: &RuleSet, cmd: &str) -> Decision {
    let normalized = normalize(cmd);
    decide(rules, cmd, &normalized)
}

/// Apply the taxonomy to both forms of a command.
///
/// Block rules run in catalog order against the raw and the normalized text;
/// the first hit wins. Otherwise every warn rule that matches the normalized
/// text contributes a warning and the command is allowed. Empty input is
/// allowed without warnings.
pub fn decide(rules: &RuleSet, raw: &str, normalized: &str) -> Decision {
    if raw.trim().is_empty() && normalized.trim().is_empty() {
        return Decision::allow(Vec::new());
    }

    for rule in rules.block_rules() {
        if rule.matches(raw) || rule.matches(normalized) {
            tracing::debug!(rule = rule.id, "Block rule matched");
            return Decision::block(rule.reason);
        }
    }

    let mut decision = Decision::allow(Vec::new());
    for rule in rules.warn_rules() {
        if rule.matches(normalized) {
            tracing::debug!(rule = rule.id, "Warn rule matched");
            decision.push_warning(rule.reason);
        }
    }
    decision
}
