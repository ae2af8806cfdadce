//! One script invocation: a fresh engine, its event loop and its promises

use super::bridge;
use super::event_loop::{EventLoop, Job, LoopExit};
use super::fetch::{FetchClient, Response};
use super::promise::{
    is_terminal, rejection, terminated, Invoker, Microtasks, Promise, RhaiResult, Settled,
    CANCELLED, TIMEOUT,
};
use super::{api, ScriptError};
use crate::cancel::CancelToken;
use crate::config::FetchConfig;
use crate::functions::FunctionContext;
use crate::logging::{Logger, SCRIPT};
use rhai::{Dynamic, Engine, FnPtr, Scope};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Operations between deadline checks inside running script code
const PROGRESS_STRIDE: u64 = 256;

/// Nesting limits for statements and for function bodies, the same in
/// debug and release builds
const MAX_EXPR_DEPTH: usize = 128;
const MAX_FUNCTION_EXPR_DEPTH: usize = 64;

/// What a due timer does
#[derive(Clone)]
pub(crate) enum TimerAction {
    Callback(FnPtr),
    Resolve(Promise),
}

/// State shared by every native function registered for one invocation
pub(crate) struct ScriptState {
    pub event_loop: EventLoop,
    pub microtasks: Microtasks,
    timers: RefCell<HashMap<u64, TimerAction>>,
    fetches: RefCell<HashMap<u64, Promise>>,
    next_fetch: Cell<u64>,
    pub fetch: Option<Arc<FetchClient>>,
    pub fetch_config: FetchConfig,
    pub cancel: CancelToken,
    pub logger: Logger,
    pub rule_id: String,
}

impl ScriptState {
    pub fn new(ctx: &FunctionContext<'_>, cancel: CancelToken) -> Self {
        Self {
            event_loop: EventLoop::new(ctx.deadline, cancel.clone()),
            microtasks: Microtasks::default(),
            timers: RefCell::new(HashMap::new()),
            fetches: RefCell::new(HashMap::new()),
            next_fetch: Cell::new(1),
            fetch: ctx.fetch.cloned(),
            fetch_config: ctx.fetch_config.clone(),
            cancel,
            logger: ctx.logger.clone(),
            rule_id: ctx.rule.id.clone(),
        }
    }

    pub fn set_timer(&self, action: TimerAction, delay_ms: i64, repeat: bool) -> u64 {
        let delay = Duration::from_millis(delay_ms.max(0) as u64);
        let id = self.event_loop.set_timer(delay, repeat);
        self.timers.borrow_mut().insert(id, action);
        id
    }

    pub fn clear_timer(&self, id: i64) {
        if id > 0 {
            self.event_loop.clear_timer(id as u64);
            self.timers.borrow_mut().remove(&(id as u64));
        }
    }

    /// Park `promise` until the fetch registered under the returned id ends
    pub fn track_fetch(&self, promise: Promise) -> u64 {
        let id = self.next_fetch.get();
        self.next_fetch.set(id + 1);
        self.fetches.borrow_mut().insert(id, promise);
        id
    }

    pub fn drain_microtasks(&self, invoker: &Invoker<'_, '_>) -> RhaiResult<()> {
        while let Some(task) = self.microtasks.pop() {
            task.run(invoker, &self.microtasks)?;
        }
        Ok(())
    }

    fn run_job(&self, job: Job, invoker: &Invoker<'_, '_>) -> RhaiResult<()> {
        match job {
            Job::Timer(id) => {
                let action = if self.event_loop.is_timer_live(id) {
                    self.timers.borrow().get(&id).cloned()
                } else {
                    self.timers.borrow_mut().remove(&id)
                };
                match action {
                    Some(TimerAction::Callback(callback)) => {
                        if let Err(err) = invoker.call(&callback, Vec::new()) {
                            if is_terminal(&err) {
                                return Err(err);
                            }
                            self.logger.warn(
                                SCRIPT,
                                format_args!(
                                    "rule '{}': uncaught error in timer callback: {}",
                                    self.rule_id, err
                                ),
                            );
                        }
                    }
                    Some(TimerAction::Resolve(promise)) => {
                        promise.settle(Settled::Fulfilled(Dynamic::UNIT), &self.microtasks)
                    }
                    None => {}
                }
            }
            Job::Fetch { id, outcome } => {
                let promise = self.fetches.borrow_mut().remove(&id);
                if let Some(promise) = promise {
                    let outcome = match outcome {
                        Ok(data) => Settled::Fulfilled(Dynamic::from(Response::new(data))),
                        Err(e) => {
                            self.logger.debug(
                                SCRIPT,
                                format_args!("rule '{}': fetch failed: {}", self.rule_id, e),
                            );
                            Settled::Rejected(Dynamic::from(e.to_string()))
                        }
                    };
                    promise.settle(outcome, &self.microtasks);
                }
            }
        }
        self.drain_microtasks(invoker)
    }

    /// Pump the loop until `promise` settles.
    ///
    /// A rejection is raised as a catchable error. A promise that nothing
    /// left in the loop can settle ends the invocation as a timeout.
    pub fn await_promise(
        &self,
        promise: &Promise,
        invoker: &Invoker<'_, '_>,
    ) -> RhaiResult<Dynamic> {
        loop {
            self.drain_microtasks(invoker)?;
            match promise.state() {
                Some(Settled::Fulfilled(value)) => return Ok(value),
                Some(Settled::Rejected(reason)) => return Err(rejection(reason)),
                None => {}
            }
            match self.event_loop.next_job() {
                Ok(Some(job)) => self.run_job(job, invoker)?,
                Ok(None) => {
                    self.logger.debug(
                        SCRIPT,
                        format_args!(
                            "rule '{}': awaited promise can never settle",
                            self.rule_id
                        ),
                    );
                    return Err(terminated(TIMEOUT));
                }
                Err(LoopExit::Timeout) => return Err(terminated(TIMEOUT)),
                Err(LoopExit::Cancelled) => return Err(terminated(CANCELLED)),
            }
        }
    }

    /// Stop timers, refuse late callbacks and abort in-flight requests
    pub fn shutdown(&self) {
        self.event_loop.shutdown();
        self.cancel.cancel();
        self.timers.borrow_mut().clear();
        self.fetches.borrow_mut().clear();
        self.microtasks.clear();
    }
}

/// Bare engine with the parse limits every script is compiled under
pub(crate) fn new_engine() -> Engine {
    let mut engine = Engine::new();
    engine.set_max_expr_depths(MAX_EXPR_DEPTH, MAX_FUNCTION_EXPR_DEPTH);
    engine
}

/// Build an engine wired to `state` and to the invocation limits
pub(crate) fn engine(state: &Rc<ScriptState>, ctx: &FunctionContext<'_>) -> Engine {
    let mut engine = new_engine();

    let deadline = ctx.deadline;
    let cancel = state.cancel.clone();
    engine.on_progress(move |ops| {
        if ops % PROGRESS_STRIDE != 0 {
            return None;
        }
        if cancel.is_cancelled() {
            Some(Dynamic::from(CANCELLED.to_string()))
        } else if Instant::now() >= deadline {
            Some(Dynamic::from(TIMEOUT.to_string()))
        } else {
            None
        }
    });

    let logger = state.logger.clone();
    let rule_id = state.rule_id.clone();
    engine.on_print(move |text| {
        logger.info(SCRIPT, format_args!("[{}] {}", rule_id, text));
    });
    let logger = state.logger.clone();
    let rule_id = state.rule_id.clone();
    engine.on_debug(move |text, _source, pos| {
        logger.debug(SCRIPT, format_args!("[{}] {} {}", rule_id, pos, text));
    });

    api::register(&mut engine, state);
    bridge::register_core(&mut engine, ctx);
    engine
}

/// Run `run_rule(input, context)` once and wait for its result
pub(crate) fn invoke(
    name: &str,
    source: &str,
    input: Dynamic,
    ctx: &FunctionContext<'_>,
) -> Result<Dynamic, ScriptError> {
    let state = Rc::new(ScriptState::new(ctx, ctx.cancel.child()));
    let engine = engine(&state, ctx);
    let ast = engine.compile(source).map_err(|e| ScriptError::Compile {
        name: name.to_string(),
        message: e.to_string(),
    })?;

    let context = bridge::context_value(ctx);
    let mut scope = Scope::new();
    let outcome = engine
        .call_fn::<Dynamic>(&mut scope, &ast, "run_rule", (input, context))
        .and_then(|value| {
            let invoker = Invoker::Host {
                engine: &engine,
                ast: &ast,
            };
            state.drain_microtasks(&invoker)?;
            match value.clone().try_cast::<Promise>() {
                Some(promise) => state.await_promise(&promise, &invoker),
                None => Ok(value),
            }
        });
    state.shutdown();
    outcome.map_err(|err| ScriptError::from_eval(name, &err))
}
