//! Document template parsing.
//!
//! The entry document is parsed once with html5ever into a plain tree that
//! render contexts rebuild as their live DOM. Scripts found along the way are
//! collected in document order so the context can execute the client bundle.

use html5ever::tendril::TendrilSink;
use html5ever::{parse_document, ParseOpts, QualName};
use markup5ever_rcdom::{Handle, NodeData, RcDom};
use serde::Serialize;

use crate::error::{Result, SsrCoreError};

const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

/// A node of the parsed document template.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TemplateNode {
    Document {
        children: Vec<TemplateNode>,
    },
    Doctype {
        name: String,
    },
    Element {
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        namespace: Option<String>,
        attrs: Vec<(String, String)>,
        children: Vec<TemplateNode>,
    },
    Text {
        text: String,
    },
    Comment {
        text: String,
    },
}

/// How a template script must be evaluated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScriptKind {
    Classic,
    Module,
}

/// Where a template script's code comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScriptSource {
    Inline(String),
    External(String),
}

/// An executable script referenced by the template.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TemplateScript {
    pub kind: ScriptKind,
    pub source: ScriptSource,
}

/// Parsed entry document.
#[derive(Clone, Debug)]
pub struct DocumentTemplate {
    root: TemplateNode,
    scripts: Vec<TemplateScript>,
}

impl DocumentTemplate {
    /// Parse an HTML document.
    ///
    /// html5ever recovers from malformed markup, so only an empty document
    /// is rejected.
    pub fn parse(html: &str) -> Result<Self> {
        if html.trim().is_empty() {
            return Err(SsrCoreError::TemplateParse("document is empty".to_string()));
        }

        let dom = parse_document(RcDom::default(), ParseOpts::default()).one(html);

        let mut scripts = Vec::new();
        let root = convert(&dom.document, &mut scripts).ok_or_else(|| {
            SsrCoreError::TemplateParse("document has no root node".to_string())
        })?;

        Ok(Self { root, scripts })
    }

    pub fn root(&self) -> &TemplateNode {
        &self.root
    }

    /// Executable scripts in document order.
    pub fn scripts(&self) -> &[TemplateScript] {
        &self.scripts
    }

    /// Serialize the tree for the in-context DOM builder.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(&self.root).map_err(|e| SsrCoreError::Serialization(e.to_string()))
    }
}

/// Relative path of a same-origin script `src`, if it can be read from disk.
pub fn local_script_path(src: &str) -> Option<&str> {
    let src = src.trim();
    if src.is_empty()
        || src.starts_with("//")
        || src.contains("://")
        || src.starts_with("data:")
        || src.starts_with("blob:")
    {
        return None;
    }
    let path = src.split(['?', '#']).next().unwrap_or_default();
    let path = path.trim_start_matches("./").trim_start_matches('/');
    (!path.is_empty()).then_some(path)
}

/// Script kind for a `type` attribute, or `None` for data blocks.
fn script_kind(type_attr: Option<&str>) -> Option<ScriptKind> {
    let Some(value) = type_attr.map(|t| t.trim().to_ascii_lowercase()) else {
        return Some(ScriptKind::Classic);
    };
    match value.as_str() {
        "" | "text/javascript" | "application/javascript" | "text/ecmascript"
        | "application/ecmascript" => Some(ScriptKind::Classic),
        "module" => Some(ScriptKind::Module),
        _ => None,
    }
}

fn attr_name(name: &QualName) -> String {
    match &name.prefix {
        Some(prefix) => format!("{prefix}:{}", name.local),
        None => name.local.to_string(),
    }
}

fn convert_children(handle: &Handle, scripts: &mut Vec<TemplateScript>) -> Vec<TemplateNode> {
    handle
        .children
        .borrow()
        .iter()
        .filter_map(|child| convert(child, scripts))
        .collect()
}

fn convert(handle: &Handle, scripts: &mut Vec<TemplateScript>) -> Option<TemplateNode> {
    match &handle.data {
        NodeData::Document => Some(TemplateNode::Document {
            children: convert_children(handle, scripts),
        }),
        NodeData::Doctype { name, .. } => Some(TemplateNode::Doctype {
            name: name.to_string(),
        }),
        NodeData::Text { contents } => Some(TemplateNode::Text {
            text: contents.borrow().to_string(),
        }),
        NodeData::Comment { contents } => Some(TemplateNode::Comment {
            text: contents.to_string(),
        }),
        NodeData::Element { name, attrs, .. } => {
            let attrs: Vec<(String, String)> = attrs
                .borrow()
                .iter()
                .map(|attr| (attr_name(&attr.name), attr.value.to_string()))
                .collect();
            let children = convert_children(handle, scripts);
            let namespace = (&*name.ns != HTML_NAMESPACE).then(|| name.ns.to_string());
            let local = name.local.to_string();

            if local == "script" && namespace.is_none() {
                if let Some(script) = collect_script(&attrs, &children) {
                    scripts.push(script);
                }
            }

            Some(TemplateNode::Element {
                name: local,
                namespace,
                attrs,
                children,
            })
        }
        NodeData::ProcessingInstruction { .. } => None,
    }
}

fn collect_script(attrs: &[(String, String)], children: &[TemplateNode]) -> Option<TemplateScript> {
    let attr = |name: &str| {
        attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    };

    // Legacy fallback bundles are for browsers without module support.
    if attr("nomodule").is_some() {
        return None;
    }
    let kind = script_kind(attr("type"))?;

    let source = match attr("src") {
        Some(src) => ScriptSource::External(src.to_string()),
        None => {
            let code: String = children
                .iter()
                .filter_map(|child| match child {
                    TemplateNode::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect();
            if code.trim().is_empty() {
                return None;
            }
            ScriptSource::Inline(code)
        }
    };

    Some(TemplateScript { kind, source })
}
