//! Rule scheduler
//!
//! Rules are the unit of work: a rayon pool evaluates each rule end to end
//! against the shared, read-only document index, and the coordinator merges
//! the per-rule outcomes. Every function invocation gets its own deadline;
//! panics, errors and overruns become synthetic results carrying the rule's
//! severity so that one misbehaving rule never stops the others.
//!
//! Deadlines are enforced where the function yields control. Script
//! functions are interrupted by the Rhai engine itself. Native functions
//! observe the deadline cooperatively through [`FunctionContext::checkpoint`]
//! or [`FunctionContext::is_expired`]; a native function that never returns
//! keeps its worker, and cancellation waits for it.

use crate::cancel::CancelToken;
use crate::config::ExecutionOptions;
use crate::diagnostic::RuleFunctionResult;
use crate::error::ExecError;
use crate::functions::{
    project_field, FunctionContext, FunctionError, FunctionRegistry, InputNode, RuleFunction,
};
use crate::ignore::IgnoredItems;
use crate::index::{DocumentIndex, JsonPath, Match, NodeRef, SpecInfo};
use crate::logging::{Logger, ENGINE};
use crate::resolver::ResolvedView;
use crate::rule::{Rule, RuleAction};
use crate::script::fetch::FetchClient;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Node key naming the rules to skip for that node
pub const INLINE_IGNORE_KEY: &str = "x-lint-ignore";

/// Where a rule's evaluation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleState {
    /// Not yet picked up by a worker
    #[default]
    Enqueued,
    /// Every action ran to completion
    Done,
    /// The rule does not apply to the document's format
    FormatSkipped,
    /// No `given` expression matched a node
    NoMatch,
    /// An action names a function that is not registered
    FunctionMissing,
    /// At least one invocation overran its deadline
    Timeout,
    /// At least one invocation panicked
    Panicked,
    /// Stopped by cancellation or the outer deadline
    Interrupted,
}

impl RuleState {
    /// Whether the rule counts as evaluated
    pub fn is_complete(&self) -> bool {
        !matches!(self, RuleState::Enqueued | RuleState::Interrupted)
    }
}

/// Per-rule timing statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct RuleTiming {
    pub rule_id: String,
    /// Wall time spent on the rule
    #[serde(serialize_with = "serialize_millis", rename = "duration_ms")]
    pub duration: Duration,
    /// Number of function invocations
    pub invocations: usize,
    /// Number of results produced
    pub results: usize,
    pub state: RuleState,
}

impl RuleTiming {
    pub fn new(rule_id: &str) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            ..Default::default()
        }
    }

    /// Average time per invocation
    pub fn avg_time(&self) -> Duration {
        if self.invocations > 0 {
            self.duration / self.invocations as u32
        } else {
            Duration::ZERO
        }
    }
}

fn serialize_millis<S: serde::Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(value.as_secs_f64() * 1000.0)
}

/// Everything the engine collected
#[derive(Debug, Default)]
pub struct EngineOutput {
    /// Results in collection order, deduplicated
    pub results: Vec<RuleFunctionResult>,
    pub errors: Vec<ExecError>,
    /// Nodes skipped through `x-lint-ignore`
    pub ignored: IgnoredItems,
    /// One entry per rule, in rule order
    pub timings: Vec<RuleTiming>,
}

/// A document ready to lint
#[derive(Clone, Copy)]
pub struct Document<'a> {
    pub index: &'a DocumentIndex,
    pub view: &'a ResolvedView,
    pub spec_info: &'a SpecInfo,
}

/// What one worker produced for one rule
#[derive(Default)]
struct RuleOutcome {
    results: Vec<RuleFunctionResult>,
    errors: Vec<ExecError>,
    ignored: Vec<String>,
    timing: RuleTiming,
}

/// Evaluates a frozen rule set against a document
pub struct Engine<'a> {
    registry: &'a FunctionRegistry,
    options: &'a ExecutionOptions,
    logger: Logger,
    cancel: CancelToken,
    fetch: Option<Arc<FetchClient>>,
}

impl<'a> Engine<'a> {
    pub fn new(registry: &'a FunctionRegistry, options: &'a ExecutionOptions) -> Self {
        Self {
            registry,
            options,
            logger: options.make_logger(),
            cancel: options.cancel.clone().unwrap_or_default(),
            fetch: None,
        }
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    /// Build the shared fetch client when a rule calls a script function
    fn prepare_fetch(&mut self, rules: &[Arc<Rule>]) {
        let needs_fetch = rules.iter().flat_map(|r| r.actions()).any(|a| {
            self.registry
                .get(&a.function)
                .is_some_and(|f| f.category() == "custom")
        });
        if !needs_fetch {
            return;
        }
        match FetchClient::new(&self.options.fetch_config) {
            Ok(client) => self.fetch = Some(Arc::new(client)),
            Err(e) => self.logger.warn(
                ENGINE,
                format_args!("fetch disabled, unable to build HTTP client: {}", e),
            ),
        }
    }

    /// Run every rule and merge the outcomes
    pub fn run(mut self, rules: &[Arc<Rule>], document: Document<'_>) -> EngineOutput {
        let start = Instant::now();
        self.prepare_fetch(rules);

        let workers = self.options.worker_count();
        self.logger.debug(
            ENGINE,
            format_args!("evaluating {} rule(s) on {} worker(s)", rules.len(), workers),
        );

        let evaluate = |rule: &Arc<Rule>| self.evaluate_rule(rule, document);
        let outcomes: Vec<RuleOutcome> = match rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
        {
            Ok(pool) => pool.install(|| rules.par_iter().map(evaluate).collect()),
            Err(e) => {
                self.logger.warn(
                    ENGINE,
                    format_args!("unable to build worker pool, running sequentially: {}", e),
                );
                rules.iter().map(evaluate).collect()
            }
        };

        let mut output = EngineOutput::default();
        let mut seen = HashSet::new();
        let mut completed = 0;
        for outcome in outcomes {
            if outcome.timing.state.is_complete() {
                completed += 1;
            }
            for result in outcome.results {
                let key = (
                    result.rule_id.clone(),
                    result.file().to_string(),
                    result.line(),
                    result.column(),
                    result.message.clone(),
                );
                if seen.insert(key) {
                    output.results.push(result);
                }
            }
            output.errors.extend(outcome.errors);
            for path in outcome.ignored {
                output.ignored.add(&outcome.timing.rule_id, &path);
            }
            output.timings.push(outcome.timing);
        }

        let total = rules.len();
        if completed < total {
            let error = if self.cancel.is_cancelled() {
                ExecError::Cancelled { completed, total }
            } else {
                ExecError::DeadlineExceeded { completed, total }
            };
            self.logger.warn(ENGINE, format_args!("{}", error));
            output.errors.push(error);
        }

        self.logger.info(
            ENGINE,
            format_args!(
                "{} rule(s) produced {} result(s) in {:?}",
                total,
                output.results.len(),
                start.elapsed()
            ),
        );
        output
    }

    /// Cancelled or past the outer deadline
    fn interrupted(&self) -> bool {
        self.cancel.is_cancelled()
            || self
                .options
                .deadline
                .is_some_and(|deadline| Instant::now() >= deadline)
    }

    fn evaluate_rule(&self, rule: &Arc<Rule>, document: Document<'_>) -> RuleOutcome {
        let start = Instant::now();
        let mut outcome = RuleOutcome {
            timing: RuleTiming::new(&rule.id),
            ..Default::default()
        };

        if self.interrupted() {
            outcome.timing.state = RuleState::Interrupted;
            return outcome;
        }
        outcome.timing.state = self.select_and_invoke(rule, document, &mut outcome);
        outcome.timing.duration = start.elapsed();
        outcome.timing.results = outcome.results.len();
        outcome
    }

    fn select_and_invoke(
        &self,
        rule: &Arc<Rule>,
        document: Document<'_>,
        outcome: &mut RuleOutcome,
    ) -> RuleState {
        if !rule.applies_to(document.spec_info.format) {
            return RuleState::FormatSkipped;
        }

        let tree = if rule.resolved {
            document.view.tree(document.index)
        } else {
            document.index.raw()
        };

        // (given, match) pairs, unique by path
        let mut matches: Vec<(&str, Match<'_>)> = Vec::new();
        let mut paths = HashSet::new();
        for given in rule.given.paths() {
            let query = match JsonPath::parse(given) {
                Ok(query) => query,
                Err(e) => {
                    outcome.errors.push(ExecError::PathLookup {
                        rule_id: rule.id.clone(),
                        given: given.to_string(),
                        message: e.to_string(),
                    });
                    continue;
                }
            };
            for m in query.query(tree) {
                if paths.insert(m.path.clone()) {
                    matches.push((given, m));
                }
            }
        }

        matches.retain(|(_, m)| {
            if is_ignored_inline(&m.node, &rule.id) {
                outcome.ignored.push(m.path.clone());
                false
            } else {
                true
            }
        });
        if matches.is_empty() {
            return RuleState::NoMatch;
        }

        let mut state = RuleState::Done;
        for action in rule.actions() {
            let Some(function) = self.registry.get(&action.function) else {
                let (_, first) = &matches[0];
                outcome.results.push(self.synthetic(
                    rule,
                    &InputNode::from_match(first, 0),
                    format!("rule '{}' uses unknown function '{}'", rule.id, action.function),
                ));
                state = RuleState::FunctionMissing;
                continue;
            };

            let violations = function.schema().validate(&action.options);
            if !violations.is_empty() {
                let first = InputNode::from_match(&matches[0].1, 0);
                for violation in violations {
                    outcome.results.push(self.synthetic(
                        rule,
                        &first,
                        format!("invalid options for rule '{}': {}", rule.id, violation),
                    ));
                }
                continue;
            }

            let action_state = self.run_action(
                rule,
                action,
                function.as_ref(),
                &matches,
                document,
                outcome,
            );
            if action_state != RuleState::Done && state == RuleState::Done {
                state = action_state;
            }
            if state == RuleState::Interrupted {
                break;
            }
        }
        state
    }

    fn run_action(
        &self,
        rule: &Arc<Rule>,
        action: &RuleAction,
        function: &dyn RuleFunction,
        matches: &[(&str, Match<'_>)],
        document: Document<'_>,
        outcome: &mut RuleOutcome,
    ) -> RuleState {
        // (given, input) pairs after field projection
        let inputs: Vec<(&str, InputNode<'_>)> = matches
            .iter()
            .filter_map(|(given, m)| {
                let node = InputNode::from_match(m, 0);
                match action.field.as_deref() {
                    Some(field) if !function.inspects_field() => {
                        project_field(&node, field).map(|projected| (*given, projected))
                    }
                    _ => Some((*given, node)),
                }
            })
            .collect();
        if inputs.is_empty() {
            return RuleState::Done;
        }

        let mut state = RuleState::Done;
        if action.batch() && function.supports_batch() {
            let batch: Vec<InputNode<'_>> = inputs
                .iter()
                .enumerate()
                .map(|(i, (_, node))| InputNode {
                    index: i,
                    ..node.clone()
                })
                .collect();
            let ctx = self.context(rule, action, inputs[0].0, document, true);
            state = self.invoke(rule, function, &batch, &ctx, outcome);
        } else {
            for (given, node) in &inputs {
                if self.interrupted() {
                    return RuleState::Interrupted;
                }
                let ctx = self.context(rule, action, given, document, false);
                let invocation_state =
                    self.invoke(rule, function, std::slice::from_ref(node), &ctx, outcome);
                if invocation_state == RuleState::Interrupted {
                    return invocation_state;
                }
                if invocation_state != RuleState::Done && state == RuleState::Done {
                    state = invocation_state;
                }
            }
        }
        state
    }

    fn context<'c>(
        &'c self,
        rule: &'c Arc<Rule>,
        action: &'c RuleAction,
        given: &'c str,
        document: Document<'c>,
        batch: bool,
    ) -> FunctionContext<'c> {
        let tree = if rule.resolved {
            document.view.tree(document.index)
        } else {
            document.index.raw()
        };
        FunctionContext {
            rule,
            action,
            given,
            options: &action.options,
            index: document.index,
            tree,
            spec_info: document.spec_info,
            fetch_config: &self.options.fetch_config,
            fetch: self.fetch.as_ref(),
            deadline: self.invocation_deadline(),
            cancel: &self.cancel,
            logger: &self.logger,
            batch,
        }
    }

    /// Per-invocation deadline, capped by the outer deadline
    fn invocation_deadline(&self) -> Instant {
        let deadline = Instant::now() + self.options.timeout;
        match self.options.deadline {
            Some(outer) => deadline.min(outer),
            None => deadline,
        }
    }

    /// Call the function once, turning every failure into a result
    fn invoke(
        &self,
        rule: &Arc<Rule>,
        function: &dyn RuleFunction,
        input: &[InputNode<'_>],
        ctx: &FunctionContext<'_>,
        outcome: &mut RuleOutcome,
    ) -> RuleState {
        outcome.timing.invocations += 1;
        let anchor = &input[0];

        match catch_unwind(AssertUnwindSafe(|| function.run(input, ctx))) {
            Ok(Ok(results)) => {
                if Instant::now() > ctx.deadline {
                    return self.timed_out(rule, anchor, outcome);
                }
                for result in results {
                    outcome.results.push(self.complete(rule, input, result));
                }
                RuleState::Done
            }
            Ok(Err(err)) => match err.downcast_ref::<FunctionError>() {
                Some(FunctionError::Timeout) => self.timed_out(rule, anchor, outcome),
                Some(FunctionError::Cancelled) => RuleState::Interrupted,
                None => {
                    self.logger.warn(
                        ENGINE,
                        format_args!(
                            "rule '{}' function '{}' failed: {:#}",
                            rule.id,
                            function.name(),
                            err
                        ),
                    );
                    outcome.results.push(self.synthetic(
                        rule,
                        anchor,
                        format!("rule '{}' failed to run: {:#}", rule.id, err),
                    ));
                    RuleState::Done
                }
            },
            Err(payload) => {
                let reason = panic_message(payload.as_ref());
                self.logger.error(
                    ENGINE,
                    format_args!(
                        "rule '{}' function '{}' panicked: {}",
                        rule.id,
                        function.name(),
                        reason
                    ),
                );
                outcome.results.push(self.synthetic(
                    rule,
                    anchor,
                    format!("rule '{}' panicked: {}", rule.id, reason),
                ));
                RuleState::Panicked
            }
        }
    }

    fn timed_out(
        &self,
        rule: &Arc<Rule>,
        anchor: &InputNode<'_>,
        outcome: &mut RuleOutcome,
    ) -> RuleState {
        if self.interrupted() {
            return RuleState::Interrupted;
        }
        self.logger.warn(
            ENGINE,
            format_args!("rule '{}' timed out at {}", rule.id, anchor.path),
        );
        outcome.results.push(self.synthetic(
            rule,
            anchor,
            format!(
                "rule '{}' timed out after {}ms",
                rule.id,
                self.options.timeout.as_millis()
            ),
        ));
        RuleState::Timeout
    }

    /// A scheduler-generated result anchored at `anchor`
    fn synthetic(
        &self,
        rule: &Arc<Rule>,
        anchor: &InputNode<'_>,
        message: String,
    ) -> RuleFunctionResult {
        let mut result = anchor.result(message);
        result.rule_id = rule.id.clone();
        result.severity = rule.severity;
        result.rule = Some(rule.clone());
        result.batch_index = None;
        result
    }

    /// Fill the defaults a function left blank and apply the message template
    fn complete(
        &self,
        rule: &Arc<Rule>,
        input: &[InputNode<'_>],
        mut result: RuleFunctionResult,
    ) -> RuleFunctionResult {
        let source = result
            .batch_index
            .and_then(|i| input.get(i))
            .unwrap_or(&input[0]);

        if result.path.is_empty() {
            result.path = source.path.clone();
        }
        if result.range.start.line == 0 {
            let message = std::mem::take(&mut result.message);
            let path = std::mem::take(&mut result.path);
            result = RuleFunctionResult {
                batch_index: result.batch_index,
                ..source.result(message).with_path(path)
            };
        }
        if !rule.message.is_empty() {
            result.message = render_message(&rule.message, &source.node, &result.message);
        }
        result.rule_id = rule.id.clone();
        result.severity = rule.severity;
        result.rule = Some(rule.clone());
        result
    }
}

/// Whether the node opts out of `rule_id` through `x-lint-ignore`
fn is_ignored_inline(node: &NodeRef<'_>, rule_id: &str) -> bool {
    let Some(marker) = node.get(INLINE_IGNORE_KEY) else {
        return false;
    };
    if let Some(id) = marker.as_str() {
        return id == rule_id;
    }
    marker.items().iter().any(|item| item.as_str() == Some(rule_id))
}

/// Fill the template's `{{...}}` slot with the offending scalar, or with
/// the function's own message when the node is not a scalar
pub fn render_message(template: &str, node: &NodeRef<'_>, function_message: &str) -> String {
    let Some(open) = template.find("{{") else {
        return template.to_string();
    };
    let Some(close) = template[open..].find("}}").map(|i| open + i + 2) else {
        return template.to_string();
    };
    let value = node.text().unwrap_or(function_message);
    format!("{}{}{}", &template[..open], value, &template[close..])
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
