//! services/api/src/adapters/js_evaluator/mod.rs
//!
//! This module contains the code evaluator adapter. It implements the `CodeEvaluator`
//! port from the `core` crate by running generated JavaScript in a V8 isolate through
//! `deno_core`, one fresh isolate per request.
//!
//! Each isolate runs on tokio's blocking pool. A watchdog task holds the isolate's
//! thread-safe handle and terminates execution when the wall-clock budget runs out, so
//! a runaway handler gives its thread back instead of holding it forever. The V8 heap
//! is capped the same way through a near-heap-limit callback.

pub mod context;

use crate::config::ExecutionLimits;
use async_trait::async_trait;
use deno_core::{serde_v8, v8, JsRuntime, ModuleCodeString, PollEventLoopOptions, RuntimeOptions};
use genapi_core::domain::{
    unescape_sequences, EvaluationFailure, EvaluationOutcome, FailureKind, RequestSnapshot,
};
use genapi_core::ports::CodeEvaluator;
use serde::Deserialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use context::ExecutionScript;

/// Prefix that marks lines written by generated code through `console`.
pub const CONSOLE_PREFIX: &str = "[Endpoint Execution]:";

/// How long a terminated isolate may take to unwind before its thread is given up on.
const TERMINATION_GRACE: Duration = Duration::from_secs(2);

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the `CodeEvaluator` port with V8 isolates.
#[derive(Clone, Debug)]
pub struct V8CodeEvaluator {
    limits: ExecutionLimits,
}

impl V8CodeEvaluator {
    /// Creates a new `V8CodeEvaluator`.
    pub fn new(limits: ExecutionLimits) -> Self {
        Self { limits }
    }
}

//=========================================================================================
// Harness Report
//=========================================================================================

#[derive(Debug, Deserialize)]
struct ConsoleLine {
    level: String,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum HarnessReport {
    Completed {
        response: Value,
        #[serde(default)]
        logs: Vec<ConsoleLine>,
    },
    Failed {
        message: String,
        #[serde(default)]
        logs: Vec<ConsoleLine>,
    },
    Unserializable {
        message: String,
        #[serde(default)]
        logs: Vec<ConsoleLine>,
    },
}

/// Everything that comes back from the blocking pool.
struct RunResult {
    outcome: EvaluationOutcome,
    logs: Vec<ConsoleLine>,
}

impl RunResult {
    fn failed(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            outcome: EvaluationOutcome::Failed(EvaluationFailure::new(kind, message)),
            logs: Vec::new(),
        }
    }

    fn timed_out(budget: Duration) -> Self {
        Self::failed(
            FailureKind::Timeout,
            format!("Endpoint execution exceeded {} ms", budget.as_millis()),
        )
    }
}

/// Why an isolate was terminated from outside.
#[derive(Debug, Default)]
struct Interrupts {
    deadline_reached: AtomicBool,
    heap_exhausted: AtomicBool,
}

impl Interrupts {
    fn failure(&self, limits: &ExecutionLimits) -> Option<RunResult> {
        if self.heap_exhausted.load(Ordering::Acquire) {
            return Some(RunResult::failed(
                FailureKind::Exception,
                format!(
                    "Endpoint execution exceeded the {} MiB heap limit",
                    limits.heap_limit_bytes / (1024 * 1024)
                ),
            ));
        }
        if self.deadline_reached.load(Ordering::Acquire) {
            return Some(RunResult::timed_out(limits.timeout));
        }
        None
    }
}

//=========================================================================================
// Isolate Run
//=========================================================================================

/// Runs one script to completion on the current (blocking) thread.
fn run_script(
    script: &ExecutionScript,
    limits: &ExecutionLimits,
    deadline: Instant,
    interrupts: Arc<Interrupts>,
    isolate_tx: oneshot::Sender<v8::IsolateHandle>,
) -> RunResult {
    // Queued behind other evaluations for the whole budget.
    if Instant::now() >= deadline {
        return RunResult::timed_out(limits.timeout);
    }

    // The isolate's event loop needs a runtime of its own on this thread.
    let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            return RunResult::failed(
                FailureKind::Exception,
                format!("Failed to start the isolate runtime: {}", e),
            )
        }
    };
    rt.block_on(run_isolate(script, limits, interrupts, isolate_tx))
}

async fn run_isolate(
    script: &ExecutionScript,
    limits: &ExecutionLimits,
    interrupts: Arc<Interrupts>,
    isolate_tx: oneshot::Sender<v8::IsolateHandle>,
) -> RunResult {
    let mut runtime = JsRuntime::new(RuntimeOptions {
        create_params: Some(v8::CreateParams::default().heap_limits(0, limits.heap_limit_bytes)),
        ..Default::default()
    });

    let isolate_handle = runtime.v8_isolate().thread_safe_handle();
    {
        let interrupts = Arc::clone(&interrupts);
        let isolate_handle = isolate_handle.clone();
        runtime.add_near_heap_limit_callback(move |current_limit, _initial_limit| {
            interrupts.heap_exhausted.store(true, Ordering::Release);
            isolate_handle.terminate_execution();
            // Room for the terminated script to unwind.
            current_limit * 2
        });
    }
    // A closed receiver means the caller already gave up; the result is discarded anyway.
    let _ = isolate_tx.send(isolate_handle);

    let settled = match runtime
        .execute_script("endpoint.js", ModuleCodeString::from(script.source().to_string()))
    {
        Ok(_) => runtime
            .run_event_loop(PollEventLoopOptions::default())
            .await
            .map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };

    if let Some(interrupted) = interrupts.failure(limits) {
        return interrupted;
    }
    if let Err(message) = settled {
        return RunResult::failed(FailureKind::Exception, message);
    }

    let reported = match runtime.execute_script(
        "endpoint-outcome.js",
        ModuleCodeString::from(script.slot_expression().to_string()),
    ) {
        Ok(value) => {
            deno_core::scope!(scope, &mut runtime);
            let local = v8::Local::new(scope, &value);
            serde_v8::from_v8::<Value>(scope, local)
                .ok()
                .and_then(|value| value.as_str().map(str::to_string))
        }
        Err(e) => return RunResult::failed(FailureKind::Exception, e.to_string()),
    };

    let Some(reported) = reported else {
        return RunResult::failed(
            FailureKind::Unsettled,
            "Endpoint handler did not complete; a promise it awaited never settled",
        );
    };

    match serde_json::from_str::<HarnessReport>(&reported) {
        Ok(HarnessReport::Completed { response, logs }) => RunResult {
            outcome: EvaluationOutcome::Completed(response),
            logs,
        },
        Ok(HarnessReport::Failed { message, logs }) => RunResult {
            outcome: EvaluationOutcome::Failed(EvaluationFailure::new(FailureKind::Exception, message)),
            logs,
        },
        Ok(HarnessReport::Unserializable { message, logs }) => RunResult {
            outcome: EvaluationOutcome::Unreadable(message),
            logs,
        },
        Err(e) => RunResult {
            outcome: EvaluationOutcome::Unreadable(format!("malformed harness report: {}", e)),
            logs: Vec::new(),
        },
    }
}

/// Terminates the isolate once `deadline` passes.
async fn watch_deadline(
    isolate_rx: oneshot::Receiver<v8::IsolateHandle>,
    deadline: Instant,
    interrupts: Arc<Interrupts>,
) {
    let Ok(isolate_handle) = isolate_rx.await else {
        return;
    };
    tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await;
    interrupts.deadline_reached.store(true, Ordering::Release);
    isolate_handle.terminate_execution();
}

/// Re-emits what generated code wrote to `console`, marked so it stands apart from host logs.
fn emit_console(lines: &[ConsoleLine]) {
    for line in lines {
        match line.level.as_str() {
            "error" => error!(target: "endpoint_execution", "{} {}", CONSOLE_PREFIX, line.message),
            "warn" => warn!(target: "endpoint_execution", "{} {}", CONSOLE_PREFIX, line.message),
            "debug" => debug!(target: "endpoint_execution", "{} {}", CONSOLE_PREFIX, line.message),
            _ => info!(target: "endpoint_execution", "{} {}", CONSOLE_PREFIX, line.message),
        }
    }
}

//=========================================================================================
// `CodeEvaluator` Trait Implementation
//=========================================================================================

#[async_trait]
impl CodeEvaluator for V8CodeEvaluator {
    async fn evaluate(&self, code: &str, request: &RequestSnapshot) -> EvaluationOutcome {
        let code = if self.limits.unescape_source {
            unescape_sequences(code)
        } else {
            code.to_string()
        };

        let script = match ExecutionScript::build(&code, request) {
            Ok(script) => script,
            Err(e) => {
                return EvaluationOutcome::Failed(EvaluationFailure::new(
                    FailureKind::Exception,
                    format!("Failed to prepare execution context: {}", e),
                ))
            }
        };

        let limits = self.limits.clone();
        let budget = limits.timeout;
        let deadline = Instant::now() + budget;
        let interrupts = Arc::new(Interrupts::default());
        let (isolate_tx, isolate_rx) = oneshot::channel();

        let watchdog = tokio::spawn(watch_deadline(isolate_rx, deadline, Arc::clone(&interrupts)));
        let task = tokio::task::spawn_blocking(move || {
            run_script(&script, &limits, deadline, interrupts, isolate_tx)
        });

        let result = match tokio::time::timeout(budget + TERMINATION_GRACE, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => RunResult::failed(
                FailureKind::Exception,
                format!("Endpoint execution aborted: {}", join_error),
            ),
            Err(_) => {
                error!("Endpoint isolate did not stop after termination; abandoning its thread");
                RunResult::timed_out(budget)
            }
        };
        watchdog.abort();

        emit_console(&result.logs);
        result.outcome
    }
}
