//! Async primitives visible to scripts: promises, timers and `fetch`

use super::fetch::{policy, FetchError, FetchRequest, Headers, RedirectMode, Response};
use super::promise::{is_terminal, thrown_value, Invoker, Promise, RhaiResult, Settled};
use super::runtime::{ScriptState, TimerAction};
use super::bridge;
use crate::script::event_loop::Job;
use rhai::{Array, Dynamic, Engine, FnPtr, Map, NativeCallContext};
use std::rc::Rc;

const SETTLE: &str = "settle_promise";

/// Register everything on `engine`, bound to `state`
pub(crate) fn register(engine: &mut Engine, state: &Rc<ScriptState>) {
    register_promises(engine, state);
    register_timers(engine, state);
    register_fetch(engine, state);
    register_headers(engine);
    register_response(engine);
}

/// `resolve`/`reject` handed to promise executors
fn settle_fn(promise: &Promise, fulfil: bool) -> RhaiResult<FnPtr> {
    let mut function = FnPtr::new(SETTLE)?;
    function.add_curry(Dynamic::from(promise.clone()));
    function.add_curry(Dynamic::from(fulfil));
    Ok(function)
}

fn outcome(fulfil: bool, value: Dynamic) -> Settled {
    if fulfil {
        Settled::Fulfilled(value)
    } else {
        Settled::Rejected(value)
    }
}

fn register_promises(engine: &mut Engine, state: &Rc<ScriptState>) {
    engine.register_type_with_name::<Promise>("Promise");

    let s = state.clone();
    engine.register_fn(SETTLE, move |promise: Promise, fulfil: bool, value: Dynamic| {
        promise.settle(outcome(fulfil, value), &s.microtasks);
    });
    let s = state.clone();
    engine.register_fn(SETTLE, move |promise: Promise, fulfil: bool| {
        promise.settle(outcome(fulfil, Dynamic::UNIT), &s.microtasks);
    });

    let s = state.clone();
    engine.register_fn(
        "new_promise",
        move |ctx: NativeCallContext, executor: FnPtr| -> RhaiResult<Promise> {
            let promise = Promise::new();
            let resolve = settle_fn(&promise, true)?;
            let reject = settle_fn(&promise, false)?;
            if let Err(err) = executor.call_within_context::<Dynamic>(&ctx, (resolve, reject)) {
                if is_terminal(&err) {
                    return Err(err);
                }
                promise.settle(Settled::Rejected(thrown_value(&err)), &s.microtasks);
            }
            Ok(promise)
        },
    );

    engine.register_fn("resolved", |value: Dynamic| {
        Promise::settled(Settled::Fulfilled(value))
    });
    engine.register_fn("rejected", |reason: Dynamic| {
        Promise::settled(Settled::Rejected(reason))
    });

    let s = state.clone();
    engine.register_fn("then", move |promise: &mut Promise, on_fulfilled: FnPtr| {
        promise.then(Some(on_fulfilled), None, &s.microtasks)
    });
    let s = state.clone();
    engine.register_fn(
        "then",
        move |promise: &mut Promise, on_fulfilled: FnPtr, on_rejected: FnPtr| {
            promise.then(Some(on_fulfilled), Some(on_rejected), &s.microtasks)
        },
    );
    let s = state.clone();
    engine.register_fn("catch_error", move |promise: &mut Promise, on_rejected: FnPtr| {
        promise.then(None, Some(on_rejected), &s.microtasks)
    });

    engine.register_get("pending", |promise: &mut Promise| promise.is_pending());

    let s = state.clone();
    engine.register_fn(
        "wait",
        move |ctx: NativeCallContext, promise: &mut Promise| -> RhaiResult<Dynamic> {
            s.await_promise(promise, &Invoker::Native(&ctx))
        },
    );
}

fn register_timers(engine: &mut Engine, state: &Rc<ScriptState>) {
    let s = state.clone();
    engine.register_fn("set_timeout", move |callback: FnPtr, delay: i64| {
        s.set_timer(TimerAction::Callback(callback), delay, false) as i64
    });
    let s = state.clone();
    engine.register_fn("set_interval", move |callback: FnPtr, every: i64| {
        s.set_timer(TimerAction::Callback(callback), every, true) as i64
    });
    let s = state.clone();
    engine.register_fn("clear_timeout", move |id: i64| s.clear_timer(id));
    let s = state.clone();
    engine.register_fn("clear_interval", move |id: i64| s.clear_timer(id));

    let s = state.clone();
    engine.register_fn("delay", move |ms: i64| {
        let promise = Promise::new();
        s.set_timer(TimerAction::Resolve(promise.clone()), ms, false);
        promise
    });
}

/// Turn `fetch(url, init)` arguments into a request
fn build_request(
    url: &str,
    init: Option<Map>,
    state: &ScriptState,
) -> Result<FetchRequest, FetchError> {
    let url = policy::validate_url(url, &state.fetch_config)?;
    let mut request = FetchRequest::get(url);
    let Some(init) = init else {
        return Ok(request);
    };

    if let Some(method) = init.get("method").filter(|m| !m.is_unit()) {
        let method = method
            .clone()
            .into_string()
            .map_err(|_| FetchError::Type("method must be a string".into()))?;
        request = request.with_method(&method);
    }

    if let Some(headers) = init.get("headers").filter(|h| !h.is_unit()) {
        if let Some(headers) = headers.clone().try_cast::<Headers>() {
            request.headers = headers;
        } else if let Some(map) = headers.clone().try_cast::<Map>() {
            for (name, value) in map {
                request.headers.set(name.as_str(), &value.to_string());
            }
        } else {
            return Err(FetchError::Type("headers must be a map".into()));
        }
    }

    if let Some(body) = init.get("body").filter(|b| !b.is_unit()) {
        let body = body
            .clone()
            .into_string()
            .map_err(|_| FetchError::Type("body must be a string".into()))?;
        request = request.with_body(body);
    }

    if let Some(mode) = init.get("redirect").filter(|r| !r.is_unit()) {
        let mode: RedirectMode = mode.to_string().parse().map_err(FetchError::Type)?;
        request = request.with_redirect(mode);
    }
    Ok(request)
}

fn start_fetch(state: &ScriptState, url: &str, init: Option<Map>) -> Promise {
    let promise = Promise::new();
    let request = match build_request(url, init, state) {
        Ok(request) => request,
        Err(e) => {
            promise.settle(
                Settled::Rejected(Dynamic::from(e.to_string())),
                &state.microtasks,
            );
            return promise;
        }
    };
    let Some(client) = &state.fetch else {
        let e = FetchError::Network("fetch is not available in this execution".into());
        promise.settle(
            Settled::Rejected(Dynamic::from(e.to_string())),
            &state.microtasks,
        );
        return promise;
    };

    let id = state.track_fetch(promise.clone());
    let enqueuer = state.event_loop.register_callback();
    client.start(request, state.cancel.clone(), move |outcome| {
        let _ = enqueuer.enqueue(Job::Fetch { id, outcome });
    });
    promise
}

fn register_fetch(engine: &mut Engine, state: &Rc<ScriptState>) {
    let s = state.clone();
    engine.register_fn("fetch", move |url: &str| start_fetch(&s, url, None));
    let s = state.clone();
    engine.register_fn("fetch", move |url: &str, init: Map| {
        start_fetch(&s, url, Some(init))
    });
}

fn optional_string(value: Option<&str>) -> Dynamic {
    value.map_or(Dynamic::UNIT, |v| Dynamic::from(v.to_string()))
}

fn register_headers(engine: &mut Engine) {
    engine
        .register_type_with_name::<Headers>("Headers")
        .register_fn("new_headers", Headers::new)
        .register_fn("new_headers", |init: Map| {
            let mut headers = Headers::new();
            for (name, value) in init {
                headers.append(name.as_str(), &value.to_string());
            }
            headers
        })
        .register_fn("get", |h: &mut Headers, name: &str| optional_string(h.get(name)))
        .register_fn("set", |h: &mut Headers, name: &str, value: &str| {
            h.set(name, value)
        })
        .register_fn("append", |h: &mut Headers, name: &str, value: &str| {
            h.append(name, value)
        })
        .register_fn("has", |h: &mut Headers, name: &str| h.has(name))
        .register_fn("delete", |h: &mut Headers, name: &str| h.delete(name))
        .register_fn("keys", |h: &mut Headers| -> Array {
            h.keys().into_iter().map(Dynamic::from).collect()
        })
        .register_fn("values", |h: &mut Headers| -> Array {
            h.values().into_iter().map(Dynamic::from).collect()
        })
        .register_fn("entries", |h: &mut Headers| -> Array {
            h.iter()
                .map(|(k, v)| {
                    let pair: Array =
                        vec![Dynamic::from(k.to_string()), Dynamic::from(v.to_string())];
                    Dynamic::from_array(pair)
                })
                .collect()
        })
        .register_fn(
            "for_each",
            |ctx: NativeCallContext, h: &mut Headers, callback: FnPtr| -> RhaiResult<()> {
                let entries: Vec<(String, String)> = h
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect();
                for (name, value) in entries {
                    callback.call_within_context::<Dynamic>(
                        &ctx,
                        (Dynamic::from(value), Dynamic::from(name)),
                    )?;
                }
                Ok(())
            },
        )
        .register_get("length", |h: &mut Headers| h.len() as i64);
}

fn register_response(engine: &mut Engine) {
    engine
        .register_type_with_name::<Response>("Response")
        .register_get("status", |r: &mut Response| r.status() as i64)
        .register_get("status_text", |r: &mut Response| r.status_text())
        .register_get("ok", |r: &mut Response| r.ok())
        .register_get("headers", |r: &mut Response| r.headers())
        .register_get("url", |r: &mut Response| r.url())
        .register_get("redirected", |r: &mut Response| r.redirected())
        .register_get("body_used", |r: &mut Response| r.body_used())
        .register_fn("text", |r: &mut Response| {
            Promise::settled(match r.text() {
                Ok(text) => Settled::Fulfilled(Dynamic::from(text)),
                Err(e) => Settled::Rejected(Dynamic::from(e)),
            })
        })
        .register_fn("json", |r: &mut Response| {
            Promise::settled(match r.json() {
                Ok(value) => Settled::Fulfilled(bridge::to_dynamic(&value)),
                Err(e) => Settled::Rejected(Dynamic::from(e)),
            })
        })
        .register_fn("clone", |r: &mut Response| -> RhaiResult<Response> {
            r.try_clone().map_err(Into::into)
        });
}
