//! Runs the rule catalog over one document
//!
//! A [`Suite`] is fixed to a conformance level when it is built. Running it
//! gives every admitted rule a fresh ledger, turns each ledger into a
//! verdict and collects the outcomes in registration order, whether the
//! rules ran one after another or in parallel.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::catalog::Catalog;
use crate::document::Document;
use crate::evaluator::RuleContext;
use crate::fetch::ResourceFetcher;
use crate::ledger::Ledger;
use crate::level::{ConformanceLevel, LevelGate};
use crate::resolver::ReferenceResolver;
use crate::rules::{Rule, RuleGroup, registry};
use crate::selector::{PathInterpreter, Selector};

/// Result of one rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Fail,
    /// The rule could not select its nodes
    Aborted { reason: String },
}

impl Verdict {
    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Pass => "PASS",
            Verdict::Fail => "FAIL",
            Verdict::Aborted { .. } => "ABORTED",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RuleOutcome {
    pub id: &'static str,
    pub group: &'static str,
    pub level: ConformanceLevel,
    pub description: &'static str,
    pub verdict: Verdict,
    pub ledger: Ledger,
    pub duration: Duration,
}

/// Per-rule outcomes of a suite run, in registration order
#[derive(Debug, Clone, Serialize)]
pub struct SuiteReport {
    pub level: ConformanceLevel,
    pub outcomes: Vec<RuleOutcome>,
    pub duration: Duration,
}

impl SuiteReport {
    /// True when no rule failed or aborted
    pub fn passed(&self) -> bool {
        self.outcomes.iter().all(|o| o.verdict == Verdict::Pass)
    }

    /// Outcomes of rules that failed or aborted
    pub fn failed_rules(&self) -> Vec<&RuleOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.verdict != Verdict::Pass)
            .collect()
    }

    pub fn violation_count(&self) -> usize {
        self.outcomes.iter().map(|o| o.ledger.len()).sum()
    }

    pub fn outcome(&self, id: &str) -> Option<&RuleOutcome> {
        self.outcomes.iter().find(|o| o.id == id)
    }

    /// Text rendering of every rule that failed, aborted or left warnings
    pub fn report(&self) -> String {
        let passed = self
            .outcomes
            .iter()
            .filter(|o| o.verdict == Verdict::Pass)
            .count();
        let mut out = format!(
            "conformance level {}: {} of {} rules passed",
            self.level,
            passed,
            self.outcomes.len()
        );
        for outcome in &self.outcomes {
            if outcome.verdict == Verdict::Pass && outcome.ledger.is_empty() {
                continue;
            }
            let _ = write!(
                out,
                "\n[{}] {} ({})",
                outcome.verdict.label(),
                outcome.id,
                outcome.group
            );
            if let Verdict::Aborted { reason } = &outcome.verdict {
                let _ = write!(out, ": {}", reason);
            }
            for line in outcome.ledger.report().lines() {
                let _ = write!(out, "\n    {}", line);
            }
        }
        out
    }
}

/// The set of rules admitted for one conformance level
pub struct Suite {
    catalog: Arc<Catalog>,
    selector: Arc<dyn Selector>,
    gate: LevelGate,
    groups: Vec<&'static RuleGroup>,
    parallel_rules: bool,
}

impl Suite {
    pub fn new(catalog: Arc<Catalog>, level: ConformanceLevel) -> Self {
        let gate = LevelGate::new(level);
        let groups: Vec<_> = registry()
            .iter()
            .filter(|group| gate.admits(group.level))
            .collect();
        let selector = Arc::new(PathInterpreter::new(catalog.namespaces.clone()));
        debug!(
            level = %level,
            groups = groups.len(),
            "rule suite assembled"
        );
        Self {
            catalog,
            selector,
            gate,
            groups,
            parallel_rules: false,
        }
    }

    /// Evaluate rules on the rayon thread pool
    pub fn with_parallel_rules(mut self, parallel: bool) -> Self {
        self.parallel_rules = parallel;
        self
    }

    /// Replace the node-set selector
    pub fn with_selector(mut self, selector: Arc<dyn Selector>) -> Self {
        self.selector = selector;
        self
    }

    pub fn level(&self) -> ConformanceLevel {
        self.gate.level()
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Admitted rules with their groups, in registration order
    pub fn rules(&self) -> Vec<(&'static RuleGroup, &'static Rule)> {
        self.groups
            .iter()
            .flat_map(|group| group.rules.iter().map(move |rule| (*group, rule)))
            .collect()
    }

    pub fn run(&self, document: &Document, fetcher: &dyn ResourceFetcher) -> SuiteReport {
        let start = Instant::now();
        let resolver = ReferenceResolver::new(fetcher, &self.catalog);
        let ctx = RuleContext {
            document,
            catalog: &self.catalog,
            selector: self.selector.as_ref(),
            resolver: &resolver,
        };

        let rules = self.rules();
        let outcomes: Vec<RuleOutcome> = if self.parallel_rules {
            rules
                .par_iter()
                .map(|(group, rule)| run_rule(&ctx, group, rule))
                .collect()
        } else {
            rules
                .iter()
                .map(|(group, rule)| run_rule(&ctx, group, rule))
                .collect()
        };

        let report = SuiteReport {
            level: self.level(),
            outcomes,
            duration: start.elapsed(),
        };
        info!(
            rules = report.outcomes.len(),
            failed = report.failed_rules().len(),
            violations = report.violation_count(),
            "suite finished"
        );
        report
    }
}

fn run_rule(ctx: &RuleContext<'_>, group: &RuleGroup, rule: &Rule) -> RuleOutcome {
    let start = Instant::now();
    debug!(rule = rule.id, group = group.name, "rule started");

    let mut ledger = Ledger::new();
    let verdict = match (rule.check)(ctx, &mut ledger) {
        Ok(()) if ledger.has_errors() => Verdict::Fail,
        Ok(()) => Verdict::Pass,
        Err(err) => {
            warn!(rule = rule.id, error = %err, "rule aborted");
            Verdict::Aborted {
                reason: err.to_string(),
            }
        }
    };

    debug!(
        rule = rule.id,
        verdict = verdict.label(),
        violations = ledger.len(),
        "rule finished"
    );
    RuleOutcome {
        id: rule.id,
        group: group.name,
        level: group.level,
        description: rule.description,
        verdict,
        ledger,
        duration: start.elapsed(),
    }
}
