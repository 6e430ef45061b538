//! Ambient, unit-of-work scoped context merged into every record.
//!
//! Every unit of work gets its own map through a `tokio` task-local scope:
//! bindings made inside [`with_request_id`] follow the future across
//! `.await` points and worker threads, and never reach sibling tasks.
//! [`run_with_request_id`] opens the same kind of scope around a
//! synchronous closure.
//!
//! Plain threads outside any runtime fall back to a per-thread map, which
//! [`request_scope`] guards so a binding is always released. Inside a
//! runtime there is no such fallback: a thread is shared by every task
//! it polls, so async units must be wrapped with [`with_request_id`] or
//! [`in_current_context`] before they can bind anything. Binding from an
//! unwrapped task is refused.

use serde_json::Value;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::fields::REQUEST_ID;

pub type ContextMap = BTreeMap<String, Value>;

tokio::task_local! {
    static TASK_CONTEXT: RefCell<ContextMap>;
}

thread_local! {
    static THREAD_CONTEXT: RefCell<ContextMap> = RefCell::new(ContextMap::new());
}

static UNSCOPED_WARNED: AtomicBool = AtomicBool::new(false);

enum Storage {
    Task,
    Thread,
    /// Inside a runtime, outside any unit-of-work scope.
    Unscoped,
}

fn current_storage() -> Storage {
    if TASK_CONTEXT.try_with(|_| ()).is_ok() {
        Storage::Task
    } else if tokio::runtime::Handle::try_current().is_ok() {
        Storage::Unscoped
    } else {
        Storage::Thread
    }
}

fn with_current<R>(f: impl FnOnce(&mut ContextMap) -> R) -> Option<R> {
    match current_storage() {
        Storage::Task => Some(TASK_CONTEXT.with(|cell| f(&mut cell.borrow_mut()))),
        Storage::Thread => Some(THREAD_CONTEXT.with(|cell| f(&mut cell.borrow_mut()))),
        Storage::Unscoped => {
            if !UNSCOPED_WARNED.swap(true, Ordering::Relaxed) {
                eprintln!(
                    "log context binding ignored: async code must run inside \
                     context::with_request_id or context::in_current_context"
                );
            }
            None
        }
    }
}

/// Bind `key` for the current unit of work. Returns the value it replaced.
///
/// Does nothing (and returns `None`) inside a runtime task that was not
/// wrapped in a unit-of-work scope.
pub fn bind(key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
    let key = key.into();
    let value = value.into();
    with_current(move |context| context.insert(key, value)).flatten()
}

pub fn unbind(key: &str) -> Option<Value> {
    with_current(|context| context.remove(key)).flatten()
}

pub fn get(key: &str) -> Option<Value> {
    snapshot().remove(key)
}

/// Copy of the current bindings. Never panics, even while thread-locals are
/// being torn down; the result is then empty.
pub fn snapshot() -> ContextMap {
    let read = |cell: &RefCell<ContextMap>| cell.try_borrow().map(|c| c.clone()).unwrap_or_default();
    match current_storage() {
        Storage::Task => TASK_CONTEXT.try_with(read).unwrap_or_default(),
        Storage::Thread => THREAD_CONTEXT.try_with(read).unwrap_or_default(),
        Storage::Unscoped => ContextMap::new(),
    }
}

/// Fresh random request id (UUID v4).
pub fn new_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub fn bind_request_id(request_id: impl Into<String>) -> Option<Value> {
    bind(REQUEST_ID, Value::String(request_id.into()))
}

/// Bind a freshly generated request id and return it.
pub fn bind_new_request_id() -> String {
    let request_id = new_request_id();
    bind_request_id(request_id.clone());
    request_id
}

pub fn unbind_request_id() -> Option<Value> {
    unbind(REQUEST_ID)
}

pub fn current_request_id() -> Option<String> {
    match get(REQUEST_ID)? {
        Value::String(id) => Some(id),
        other => Some(other.to_string()),
    }
}

/// Guard returned by [`request_scope`].
///
/// Restores whatever request id was bound before it on drop, including
/// during unwinding. Not `Send`: it must be released by the unit of work
/// that created it.
#[must_use = "the request id is unbound as soon as the guard is dropped"]
pub struct RequestScope {
    previous: Option<Value>,
    _not_send: PhantomData<*const ()>,
}

impl Drop for RequestScope {
    fn drop(&mut self) {
        match self.previous.take() {
            Some(previous) => {
                bind(REQUEST_ID, previous);
            }
            None => {
                unbind_request_id();
            }
        }
    }
}

/// Bind `request_id` until the returned guard is dropped.
pub fn request_scope(request_id: impl Into<String>) -> RequestScope {
    RequestScope {
        previous: bind_request_id(request_id),
        _not_send: PhantomData,
    }
}

/// Run `f` as its own unit of work with `request_id` bound.
///
/// Works on any thread, inside a runtime or not. `f` starts from a copy of
/// the caller's bindings; the scope is closed even if `f` panics.
pub fn run_with_request_id<R>(request_id: impl Into<String>, f: impl FnOnce() -> R) -> R {
    let mut context = snapshot();
    context.insert(REQUEST_ID.to_string(), Value::String(request_id.into()));
    TASK_CONTEXT.sync_scope(RefCell::new(context), f)
}

pub fn run_with_new_request_id<R>(f: impl FnOnce() -> R) -> R {
    run_with_request_id(new_request_id(), f)
}

/// Run `fut` as its own unit of work with `request_id` bound.
///
/// The future starts from a copy of the caller's bindings; anything it binds
/// or unbinds stays inside it.
pub async fn with_request_id<F>(request_id: impl Into<String>, fut: F) -> F::Output
where
    F: Future,
{
    let mut context = snapshot();
    context.insert(REQUEST_ID.to_string(), Value::String(request_id.into()));
    TASK_CONTEXT.scope(RefCell::new(context), fut).await
}

pub async fn with_new_request_id<F>(fut: F) -> F::Output
where
    F: Future,
{
    with_request_id(new_request_id(), fut).await
}

/// Like [`with_request_id`], taking the id from `provider`
/// (e.g. a closure reading an incoming request header).
pub async fn with_request_context<P, F>(provider: P, fut: F) -> F::Output
where
    P: FnOnce() -> String,
    F: Future,
{
    with_request_id(provider(), fut).await
}

/// Carry the current bindings into a future that is about to be spawned.
///
/// `tokio::spawn` does not inherit task-locals; wrap the child with this so
/// it logs under its parent's request id.
pub fn in_current_context<F>(fut: F) -> impl Future<Output = F::Output>
where
    F: Future,
{
    TASK_CONTEXT.scope(RefCell::new(snapshot()), fut)
}
