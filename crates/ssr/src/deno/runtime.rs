//! JsRuntime execution for one render context.
//!
//! This module contains the impure side-effect code that executes
//! JavaScript using deno_core's JsRuntime. **Everything here runs on the
//! context's own thread** - `JsRuntime` is not `Send`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use deno_core::{
    extension, op2, v8, FsModuleLoader, JsRuntime, ModuleSpecifier, PollEventLoopOptions,
    RuntimeOptions,
};
use prerender_ssr_core::{
    clear_script, finish_boot_script, generate_polyfills, inject_script, navigate_script,
    probe_script, serialize_script, tick_script, ScriptKind,
};

use crate::context::Stability;
use crate::error::{Result, SsrError};
use crate::stability::StabilityProbe;

thread_local! {
    /// Thread-local storage for serialized document output.
    /// This is used because deno_core ops can't easily return complex values.
    static RENDERED_HTML: RefCell<Option<String>> = const { RefCell::new(None) };

    /// Boolean signals reported by the runtime polyfill.
    static FLAGS: RefCell<HashMap<String, bool>> = RefCell::new(HashMap::new());
}

/// Custom op to receive the serialized document from JavaScript.
#[op2(fast)]
fn op_set_html(#[string] html: String) {
    RENDERED_HTML.with(|cell| {
        *cell.borrow_mut() = Some(html);
    });
}

#[op2(fast)]
fn op_set_flag(#[string] name: String, value: bool) {
    FLAGS.with(|flags| {
        flags.borrow_mut().insert(name, value);
    });
}

/// Forward in-context console output to tracing.
#[op2(fast)]
fn op_console(#[string] level: String, #[string] message: String) {
    match level.as_str() {
        "error" => tracing::error!(target: "prerender_ssr::js", "{message}"),
        "warn" => tracing::warn!(target: "prerender_ssr::js", "{message}"),
        "debug" => tracing::debug!(target: "prerender_ssr::js", "{message}"),
        _ => tracing::info!(target: "prerender_ssr::js", "{message}"),
    }
}

extension!(prerender_ext, ops = [op_set_html, op_set_flag, op_console]);

fn take_flag(name: &str) -> Option<bool> {
    FLAGS.with(|flags| flags.borrow_mut().remove(name))
}

fn js_error(error: impl std::fmt::Display) -> SsrError {
    SsrError::JsExecution(error.to_string())
}

/// A template script with its source loaded.
#[derive(Clone, Debug)]
pub(crate) struct BundleScript {
    pub kind: ScriptKind,
    /// `file://` specifier; module imports resolve against it.
    pub specifier: ModuleSpecifier,
    pub code: String,
}

/// Everything a context needs to boot, shared by every context.
#[derive(Debug)]
pub(crate) struct ContextBundle {
    pub template_json: String,
    pub scripts: Vec<BundleScript>,
    pub node_env: String,
}

/// A booted JsRuntime with the prerender polyfills installed.
pub(crate) struct ContextRuntime {
    runtime: JsRuntime,
}

impl ContextRuntime {
    /// A bare runtime with the prerender ops registered.
    pub fn new() -> Self {
        let runtime = JsRuntime::new(RuntimeOptions {
            extensions: vec![prerender_ext::init()],
            module_loader: Some(Rc::new(FsModuleLoader)),
            ..Default::default()
        });
        Self { runtime }
    }

    /// Handle that can stop running JS from any thread.
    pub fn isolate_handle(&mut self) -> v8::IsolateHandle {
        self.runtime.v8_isolate().thread_safe_handle()
    }

    /// Boot at `url`: polyfills, template scripts, load events.
    pub async fn boot(&mut self, bundle: &ContextBundle, url: &str) -> Result<()> {
        // Pure function call from core - generates polyfills string
        let polyfills = generate_polyfills(&bundle.template_json, url, &bundle.node_env)?;

        self.execute("<polyfills>", polyfills).await?;
        for script in &bundle.scripts {
            match script.kind {
                ScriptKind::Classic => self.execute("<bundle>", script.code.clone()).await?,
                ScriptKind::Module => {
                    self.evaluate_module(&script.specifier, script.code.clone())
                        .await?
                }
            }
        }
        self.execute("<boot>", finish_boot_script().to_string())
            .await
    }

    /// Run a classic script, then drain the event loop.
    async fn execute(&mut self, name: &'static str, code: String) -> Result<()> {
        self.runtime.execute_script(name, code).map_err(js_error)?;
        self.run_event_loop().await
    }

    async fn evaluate_module(&mut self, specifier: &ModuleSpecifier, code: String) -> Result<()> {
        let id = self
            .runtime
            .load_side_es_module_from_code(specifier, code)
            .await
            .map_err(js_error)?;
        let evaluation = self.runtime.mod_evaluate(id);
        self.run_event_loop().await?;
        evaluation.await.map_err(js_error)
    }

    async fn run_event_loop(&mut self) -> Result<()> {
        self.runtime
            .run_event_loop(PollEventLoopOptions::default())
            .await
            .map_err(js_error)
    }

    /// Run due JS timers.
    async fn tick(&mut self) -> Result<()> {
        self.execute("<tick>", tick_script().to_string()).await
    }

    pub async fn inject(&mut self, payload_json: &str, script_body: &str) -> Result<()> {
        let script = inject_script(payload_json, script_body)?;
        self.execute("<inject>", script).await
    }

    /// Remove the injected payload and per-request browser state.
    ///
    /// Fails unless the polyfill confirms nothing of the payload is left.
    pub async fn clear(&mut self) -> Result<()> {
        take_flag("cleared");
        self.execute("<clear>", clear_script().to_string()).await?;
        match take_flag("cleared") {
            Some(true) => Ok(()),
            _ => Err(SsrError::JsExecution(
                "injected data survived clearing".to_string(),
            )),
        }
    }

    pub async fn navigate(&mut self, href: &str, route: &str) -> Result<bool> {
        take_flag("navigated");
        let script = navigate_script(href, route)?;
        self.execute("<navigate>", script).await?;
        let navigated = take_flag("navigated").unwrap_or(false);

        // One turn for work the route change scheduled.
        self.tick().await?;
        tokio::task::yield_now().await;

        Ok(navigated)
    }

    async fn probe(&mut self, marker_id: &str) -> Result<Option<Stability>> {
        self.tick().await?;
        self.execute("<probe>", probe_script(marker_id)?).await?;

        let done = take_flag("done").unwrap_or(false);
        let stable = take_flag("stable").unwrap_or(false);
        Ok(if done {
            Some(Stability::Completed)
        } else if stable {
            Some(Stability::Stable)
        } else {
            None
        })
    }

    pub async fn serialize(&mut self) -> Result<String> {
        RENDERED_HTML.with(|cell| cell.borrow_mut().take());
        self.execute("<serialize>", serialize_script().to_string())
            .await?;

        // Extract serialized document from thread-local storage
        RENDERED_HTML
            .with(|cell| cell.borrow_mut().take())
            .ok_or_else(|| SsrError::JsExecution("document was not serialized".to_string()))
    }
}

/// Probes a runtime for the loading marker and the completion flag.
pub(crate) struct MarkerProbe<'a> {
    pub runtime: &'a mut ContextRuntime,
    pub marker_id: &'a str,
}

impl StabilityProbe for MarkerProbe<'_> {
    async fn poll_stable(&mut self) -> Result<Option<Stability>> {
        self.runtime.probe(self.marker_id).await
    }
}
