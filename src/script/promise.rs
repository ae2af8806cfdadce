//! Promises and their reaction queue
//!
//! Reactions never run inline. Settling a promise queues one microtask per
//! subscriber; the runtime drains the queue after every job and whenever a
//! script waits.

use rhai::{Dynamic, Engine, EvalAltResult, FnPtr, NativeCallContext, Position, AST};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// Reason attached to a terminated invocation that ran past its deadline
pub const TIMEOUT: &str = "timeout";
/// Reason attached to a terminated invocation whose run was cancelled
pub const CANCELLED: &str = "cancelled";

pub type RhaiResult<T> = Result<T, Box<EvalAltResult>>;

/// Final state of a promise
#[derive(Debug, Clone)]
pub enum Settled {
    Fulfilled(Dynamic),
    Rejected(Dynamic),
}

struct Reaction {
    on_fulfilled: Option<FnPtr>,
    on_rejected: Option<FnPtr>,
    derived: Promise,
}

enum State {
    Pending(Vec<Reaction>),
    Settled(Settled),
}

/// A script-visible promise
#[derive(Clone)]
pub struct Promise(Rc<RefCell<State>>);

/// A reaction ready to run
pub struct Microtask {
    reaction: Reaction,
    outcome: Settled,
}

/// FIFO of ready reactions shared by every promise of an invocation
#[derive(Clone, Default)]
pub struct Microtasks(Rc<RefCell<VecDeque<Microtask>>>);

impl Microtasks {
    fn push(&self, task: Microtask) {
        self.0.borrow_mut().push_back(task);
    }

    pub fn pop(&self) -> Option<Microtask> {
        self.0.borrow_mut().pop_front()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

impl Default for Promise {
    fn default() -> Self {
        Self::new()
    }
}

impl Promise {
    pub fn new() -> Self {
        Promise(Rc::new(RefCell::new(State::Pending(Vec::new()))))
    }

    /// A promise that is already settled
    pub fn settled(outcome: Settled) -> Self {
        Promise(Rc::new(RefCell::new(State::Settled(outcome))))
    }

    pub fn state(&self) -> Option<Settled> {
        match &*self.0.borrow() {
            State::Pending(_) => None,
            State::Settled(outcome) => Some(outcome.clone()),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(&*self.0.borrow(), State::Pending(_))
    }

    /// Settle once; later calls are ignored. Fulfilling with another
    /// promise adopts its eventual state.
    pub fn settle(&self, outcome: Settled, queue: &Microtasks) {
        if let Settled::Fulfilled(value) = &outcome {
            if let Some(inner) = value.clone().try_cast::<Promise>() {
                if Rc::ptr_eq(&inner.0, &self.0) {
                    let reason = Dynamic::from("TypeError: a promise cannot resolve to itself");
                    self.settle(Settled::Rejected(reason), queue);
                } else {
                    inner.subscribe(
                        Reaction {
                            on_fulfilled: None,
                            on_rejected: None,
                            derived: self.clone(),
                        },
                        queue,
                    );
                }
                return;
            }
        }

        let reactions = {
            let mut state = self.0.borrow_mut();
            let State::Pending(reactions) = &mut *state else {
                return;
            };
            let reactions = std::mem::take(reactions);
            *state = State::Settled(outcome.clone());
            reactions
        };
        for reaction in reactions {
            queue.push(Microtask {
                reaction,
                outcome: outcome.clone(),
            });
        }
    }

    fn subscribe(&self, reaction: Reaction, queue: &Microtasks) {
        let mut state = self.0.borrow_mut();
        match &mut *state {
            State::Pending(reactions) => reactions.push(reaction),
            State::Settled(outcome) => queue.push(Microtask {
                reaction,
                outcome: outcome.clone(),
            }),
        }
    }

    /// Register handlers and return the promise of their result
    pub fn then(
        &self,
        on_fulfilled: Option<FnPtr>,
        on_rejected: Option<FnPtr>,
        queue: &Microtasks,
    ) -> Promise {
        let derived = Promise::new();
        self.subscribe(
            Reaction {
                on_fulfilled,
                on_rejected,
                derived: derived.clone(),
            },
            queue,
        );
        derived
    }
}

impl std::fmt::Debug for Promise {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.state() {
            None => write!(f, "Promise(pending)"),
            Some(Settled::Fulfilled(v)) => write!(f, "Promise(fulfilled: {})", v),
            Some(Settled::Rejected(v)) => write!(f, "Promise(rejected: {})", v),
        }
    }
}

impl Microtask {
    pub fn run(self, invoker: &Invoker<'_, '_>, queue: &Microtasks) -> RhaiResult<()> {
        let Microtask { reaction, outcome } = self;
        let (handler, value) = match outcome {
            Settled::Fulfilled(value) => (reaction.on_fulfilled, Settled::Fulfilled(value)),
            Settled::Rejected(value) => (reaction.on_rejected, Settled::Rejected(value)),
        };
        let Some(handler) = handler else {
            // pass the outcome through unchanged
            reaction.derived.settle(value, queue);
            return Ok(());
        };
        let argument = match value {
            Settled::Fulfilled(v) | Settled::Rejected(v) => v,
        };
        match invoker.call(&handler, vec![argument]) {
            Ok(result) => reaction.derived.settle(Settled::Fulfilled(result), queue),
            Err(err) if is_terminal(&err) => return Err(err),
            Err(err) => reaction
                .derived
                .settle(Settled::Rejected(thrown_value(&err)), queue),
        }
        Ok(())
    }
}

/// How to call back into script code from where we are
pub enum Invoker<'a, 'ctx> {
    /// From inside a native function
    Native(&'a NativeCallContext<'ctx>),
    /// From the host, after the entry point returned
    Host { engine: &'a Engine, ast: &'a AST },
}

impl Invoker<'_, '_> {
    pub fn call(&self, function: &FnPtr, args: Vec<Dynamic>) -> RhaiResult<Dynamic> {
        match self {
            Invoker::Native(ctx) => function.call_within_context::<Dynamic>(ctx, args),
            Invoker::Host { engine, ast } => function.call::<Dynamic>(engine, ast, args),
        }
    }
}

/// Strip function-call wrappers down to the error that was raised
pub fn root_cause(err: &EvalAltResult) -> &EvalAltResult {
    match err {
        EvalAltResult::ErrorInFunctionCall(_, _, inner, _) => root_cause(inner),
        EvalAltResult::ErrorInModule(_, inner, _) => root_cause(inner),
        other => other,
    }
}

/// Errors scripts cannot catch: deadline, cancellation, engine limits
pub fn is_terminal(err: &EvalAltResult) -> bool {
    let root = root_cause(err);
    matches!(root, EvalAltResult::ErrorTerminated(..)) || !root.is_catchable()
}

/// The value a script would see in `catch (e)`
pub fn thrown_value(err: &EvalAltResult) -> Dynamic {
    match root_cause(err) {
        EvalAltResult::ErrorRuntime(value, _) => value.clone(),
        other => Dynamic::from(other.to_string()),
    }
}

/// Human readable text of a thrown or rejected value
pub fn message_of(value: &Dynamic) -> String {
    if value.is_map() {
        if let Some(map) = value.clone().try_cast::<rhai::Map>() {
            if let Some(message) = map.get("message") {
                return message.to_string();
            }
        }
    }
    value.to_string()
}

pub fn terminated(reason: &str) -> Box<EvalAltResult> {
    EvalAltResult::ErrorTerminated(Dynamic::from(reason.to_string()), Position::NONE).into()
}

pub fn rejection(reason: Dynamic) -> Box<EvalAltResult> {
    EvalAltResult::ErrorRuntime(reason, Position::NONE).into()
}
