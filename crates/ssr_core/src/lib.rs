//! Pure prerender logic - no I/O, no async, no side effects.
//!
//! This crate provides:
//! - Pool and pipeline configuration with validation
//! - Request eligibility and route naming
//! - Document template parsing and hydration payloads
//! - Polyfill generation for headless render contexts
//!
//! # Example
//!
//! ```
//! use prerender_ssr_core::{
//!     check_request, generate_polyfills, route_name, DocumentTemplate, HydrationPayload,
//!     PipelineConfig,
//! };
//!
//! let config = PipelineConfig::default().with_known_routes(["about"]);
//! assert!(check_request(&config, "GET", "/about", Some("text/html")).is_ok());
//! assert_eq!(route_name("/about", &config.known_routes, &config.home_route), "about");
//!
//! let template = DocumentTemplate::parse("<!doctype html><div id=\"root\"></div>").unwrap();
//! let polyfills = generate_polyfills(&template.to_json().unwrap(), "http://localhost/about", "production").unwrap();
//! assert!(polyfills.contains("__PRERENDER_BOOT__"));
//!
//! let payload = HydrationPayload::new(serde_json::json!({ "title": "About" })).unwrap();
//! assert!(payload.script_body().unwrap().starts_with("window.__PRERENDER_DATA__"));
//! ```

mod config;
mod error;
mod filter;
mod payload;
mod polyfills;
mod routes;
mod template;

pub use config::{
    PipelineConfig, PoolConfig, DEFAULT_ASSET_EXTENSIONS, DEFAULT_COMMAND_TIMEOUT_MS,
    DEFAULT_EXCLUDED_PREFIXES, DEFAULT_MAX_USES, DEFAULT_MIN_INSTANCES,
};
pub use error::{Result, SsrCoreError, MAX_PAYLOAD_SIZE};
pub use filter::{accepts_html, check_request, is_asset_path, is_under_prefix, Ineligible};
pub use payload::{escape_json_for_script, HydrationPayload, DATA_GLOBAL, DATA_SCRIPT_ID};
pub use polyfills::{
    clear_script, finish_boot_script, generate_polyfills, inject_script, navigate_script,
    probe_script, serialize_script, tick_script, DONE_FLAG, ROUTE_HOOK,
};
pub use routes::{last_segment, normalize_path, route_name};
pub use template::{
    local_script_path, DocumentTemplate, ScriptKind, ScriptSource, TemplateNode, TemplateScript,
};
