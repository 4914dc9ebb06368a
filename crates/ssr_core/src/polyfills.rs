//! Pure polyfill generation for render contexts.
//!
//! A render context is a bare V8 isolate. The generated script gives it the
//! browser surface a client bundle expects: a mutable DOM rebuilt from the
//! document template, `window`, `location`/`history`, storage, timers driven
//! from Rust, events, and the small runtime object (`__prerender`) the
//! context worker talks to.

use crate::error::{Result, SsrCoreError};
use crate::payload::{DATA_GLOBAL, DATA_SCRIPT_ID};

/// Function the client bundle installs to switch routes.
pub const ROUTE_HOOK: &str = "__prerenderSetRoute";

/// Flag the client bundle may set once its first render is committed.
pub const DONE_FLAG: &str = "__prerenderDone";

/// Generate the boot script for a render context.
///
/// This is a pure function - transforms input into output string.
/// Template JSON and strings are double-encoded so nothing from the inputs
/// is ever interpolated as code.
pub fn generate_polyfills(template_json: &str, url: &str, node_env: &str) -> Result<String> {
    let encode = |value: &str| {
        serde_json::to_string(value).map_err(|e| SsrCoreError::Serialization(e.to_string()))
    };
    let template_escaped = encode(template_json)?;
    let url_escaped = encode(url)?;
    let node_env_escaped = encode(node_env)?;
    let data_global = encode(DATA_GLOBAL)?;
    let data_script_id = encode(DATA_SCRIPT_ID)?;
    let route_hook = encode(ROUTE_HOOK)?;
    let done_flag = encode(DONE_FLAG)?;

    Ok(format!(
        r#"
// Boot parameters - safely injected by Rust
globalThis.__PRERENDER_BOOT__ = {{
    template: JSON.parse({template_escaped}),
    url: {url_escaped},
    nodeEnv: {node_env_escaped},
    dataGlobal: {data_global},
    dataScriptId: {data_script_id},
    routeHook: {route_hook},
    doneFlag: {done_flag},
}};

{CONSOLE_POLYFILL}
{ENCODING_POLYFILLS}
{DOM_POLYFILL}
{WINDOW_POLYFILL}
{RUNTIME_POLYFILL}
"#
    ))
}

/// Script run after the bundle: fires load events and one timer tick.
pub fn finish_boot_script() -> &'static str {
    "globalThis.__prerender.finishBoot();"
}

/// Script running due timers.
pub fn tick_script() -> &'static str {
    "globalThis.__prerender.tick();"
}

/// Script reporting `stable` and `done` flags for a loading marker id.
pub fn probe_script(marker_id: &str) -> Result<String> {
    let marker = serde_json::to_string(marker_id)
        .map_err(|e| SsrCoreError::Serialization(e.to_string()))?;
    Ok(format!("globalThis.__prerender.probe({marker});"))
}

/// Script exposing a payload globally and embedding it in the document.
pub fn inject_script(payload_json: &str, script_body: &str) -> Result<String> {
    let json = serde_json::to_string(payload_json)
        .map_err(|e| SsrCoreError::Serialization(e.to_string()))?;
    let body = serde_json::to_string(script_body)
        .map_err(|e| SsrCoreError::Serialization(e.to_string()))?;
    Ok(format!("globalThis.__prerender.inject({json}, {body});"))
}

/// Script removing all per-request state; reports the `cleared` flag.
pub fn clear_script() -> &'static str {
    "globalThis.__prerender.clear();"
}

/// Script moving the context to `href` and invoking the route hook.
pub fn navigate_script(href: &str, route: &str) -> Result<String> {
    let href = serde_json::to_string(href).map_err(|e| SsrCoreError::Serialization(e.to_string()))?;
    let route =
        serde_json::to_string(route).map_err(|e| SsrCoreError::Serialization(e.to_string()))?;
    Ok(format!("globalThis.__prerender.navigate({href}, {route});"))
}

/// Script reporting the serialized document.
pub fn serialize_script() -> &'static str {
    "globalThis.__prerender.serialize();"
}

const CONSOLE_POLYFILL: &str = r#"
if (typeof globalThis.queueMicrotask !== 'function') {
    globalThis.queueMicrotask = (fn) => { Promise.resolve().then(fn); };
}

// Console polyfill - forward JS logs to Rust tracing
(() => {
    const format = (args) => args.map((a) => {
        if (a instanceof Error) return a.stack || String(a);
        if (typeof a === 'object' && a !== null) { try { return JSON.stringify(a); } catch (_) { return String(a); } }
        return String(a);
    }).join(' ');
    const emit = (level) => (...args) => Deno.core.ops.op_console(level, format(args));
    globalThis.console = {
        log: emit('info'),
        info: emit('info'),
        warn: emit('warn'),
        error: emit('error'),
        debug: emit('debug'),
        trace: emit('debug'),
        group: () => {},
        groupCollapsed: () => {},
        groupEnd: () => {},
        table: emit('info'),
        time: () => {},
        timeEnd: () => {},
        assert: (cond, ...args) => { if (!cond) emit('error')('Assertion failed:', ...args); },
    };
})();

// Performance polyfill for timing
const performanceStart = Date.now();
globalThis.performance = {
    now: () => Date.now() - performanceStart,
    timeOrigin: performanceStart,
    mark: () => {},
    measure: () => {},
    getEntriesByName: () => [],
    getEntriesByType: () => [],
    clearMarks: () => {},
    clearMeasures: () => {},
};
"#;

const ENCODING_POLYFILLS: &str = r#"
// TextEncoder/TextDecoder polyfills
if (typeof globalThis.TextEncoder === 'undefined') {
    globalThis.TextEncoder = class TextEncoder {
        get encoding() { return 'utf-8'; }
        encode(str = '') {
            const utf8 = unescape(encodeURIComponent(String(str)));
            const result = new Uint8Array(utf8.length);
            for (let i = 0; i < utf8.length; i++) result[i] = utf8.charCodeAt(i);
            return result;
        }
    };
}
if (typeof globalThis.TextDecoder === 'undefined') {
    globalThis.TextDecoder = class TextDecoder {
        constructor(label = 'utf-8') { this.encoding = label.toLowerCase(); }
        decode(input) {
            if (!input) return '';
            const bytes = input instanceof Uint8Array ? input : new Uint8Array(input.buffer || input);
            let result = '';
            for (let i = 0; i < bytes.length; i++) result += String.fromCharCode(bytes[i]);
            return decodeURIComponent(escape(result));
        }
    };
}

// Base64 (latin1) helpers
if (typeof globalThis.btoa === 'undefined') {
    const chars = 'ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/';
    globalThis.btoa = (input) => {
        const str = String(input);
        let out = '';
        for (let i = 0; i < str.length; i += 3) {
            const a = str.charCodeAt(i), b = str.charCodeAt(i + 1), c = str.charCodeAt(i + 2);
            if (a > 255 || b > 255 || c > 255) throw new Error('InvalidCharacterError');
            const n = (a << 16) | ((b || 0) << 8) | (c || 0);
            out += chars[(n >> 18) & 63] + chars[(n >> 12) & 63]
                + (i + 1 < str.length ? chars[(n >> 6) & 63] : '=')
                + (i + 2 < str.length ? chars[n & 63] : '=');
        }
        return out;
    };
    globalThis.atob = (input) => {
        const str = String(input).replace(/[\s=]+/g, '');
        let out = '', buffer = 0, bits = 0;
        for (const ch of str) {
            const v = chars.indexOf(ch);
            if (v < 0) throw new Error('InvalidCharacterError');
            buffer = (buffer << 6) | v;
            bits += 6;
            if (bits >= 8) { bits -= 8; out += String.fromCharCode((buffer >> bits) & 255); }
        }
        return out;
    };
}
"#;

const DOM_POLYFILL: &str = r#"
// Minimal mutable DOM with HTML serialization
(() => {
    const HTML_NS = 'http://www.w3.org/1999/xhtml';
    const VOID = new Set(['area', 'base', 'br', 'col', 'embed', 'hr', 'img', 'input', 'link', 'meta', 'param', 'source', 'track', 'wbr']);
    const RAW_TEXT = new Set(['script', 'style', 'xmp', 'iframe', 'noembed', 'noframes', 'noscript']);
    const ENTITIES = { amp: '&', lt: '<', gt: '>', quot: '"', apos: "'", nbsp: '\u00a0' };

    const escapeText = (s) => String(s).replace(/&/g, '&amp;').replace(/</g, '&lt;').replace(/>/g, '&gt;').replace(/\u00a0/g, '&nbsp;');
    const escapeAttr = (s) => String(s).replace(/&/g, '&amp;').replace(/"/g, '&quot;').replace(/\u00a0/g, '&nbsp;');
    const decodeEntities = (s) => s.indexOf('&') < 0 ? s : s.replace(/&(#[xX][0-9a-fA-F]+|#[0-9]+|[a-zA-Z]+);/g, (all, e) => {
        if (e[0] === '#') {
            const code = e[1] === 'x' || e[1] === 'X' ? parseInt(e.slice(2), 16) : parseInt(e.slice(1), 10);
            return Number.isFinite(code) && code >= 0 && code <= 0x10ffff ? String.fromCodePoint(code) : all;
        }
        return Object.prototype.hasOwnProperty.call(ENTITIES, e) ? ENTITIES[e] : all;
    });

    class Event {
        constructor(type, init = {}) {
            this.type = String(type);
            this.bubbles = !!init.bubbles;
            this.cancelable = !!init.cancelable;
            this.defaultPrevented = false;
            this.target = null;
            this.currentTarget = null;
            this.timeStamp = Date.now();
            this._stopped = false;
        }
        preventDefault() { if (this.cancelable) this.defaultPrevented = true; }
        stopPropagation() { this._stopped = true; }
        stopImmediatePropagation() { this._stopped = true; }
        initEvent(type, bubbles, cancelable) { this.type = String(type); this.bubbles = !!bubbles; this.cancelable = !!cancelable; }
    }

    class CustomEvent extends Event {
        constructor(type, init = {}) { super(type, init); this.detail = init.detail === undefined ? null : init.detail; }
    }

    class EventTarget {
        constructor() { this._listeners = new Map(); }
        addEventListener(type, listener) {
            if (!listener) return;
            if (!this._listeners.has(type)) this._listeners.set(type, []);
            const list = this._listeners.get(type);
            if (!list.includes(listener)) list.push(listener);
        }
        removeEventListener(type, listener) {
            const list = this._listeners.get(type);
            if (!list) return;
            const i = list.indexOf(listener);
            if (i >= 0) list.splice(i, 1);
        }
        dispatchEvent(event) {
            if (!event.target) event.target = this;
            event.currentTarget = this;
            for (const listener of (this._listeners.get(event.type) || []).slice()) {
                try {
                    if (typeof listener === 'function') listener.call(this, event);
                    else if (listener && typeof listener.handleEvent === 'function') listener.handleEvent(event);
                } catch (e) { console.error(e); }
            }
            const handler = this['on' + event.type];
            if (typeof handler === 'function') {
                try { handler.call(this, event); } catch (e) { console.error(e); }
            }
            if (event.bubbles && !event._stopped && this.parentNode) this.parentNode.dispatchEvent(event);
            return !event.defaultPrevented;
        }
    }

    class Node extends EventTarget {
        constructor(nodeType, nodeName) {
            super();
            this.nodeType = nodeType;
            this.nodeName = nodeName;
            this.parentNode = null;
            this.childNodes = [];
            this.ownerDocument = null;
        }
        get parentElement() { return this.parentNode && this.parentNode.nodeType === 1 ? this.parentNode : null; }
        get firstChild() { return this.childNodes[0] || null; }
        get lastChild() { return this.childNodes[this.childNodes.length - 1] || null; }
        get nextSibling() {
            if (!this.parentNode) return null;
            const siblings = this.parentNode.childNodes;
            return siblings[siblings.indexOf(this) + 1] || null;
        }
        get previousSibling() {
            if (!this.parentNode) return null;
            const siblings = this.parentNode.childNodes;
            const i = siblings.indexOf(this);
            return i > 0 ? siblings[i - 1] : null;
        }
        get isConnected() {
            let node = this;
            while (node.parentNode) node = node.parentNode;
            return node.nodeType === 9;
        }
        get nodeValue() { return null; }
        set nodeValue(_) {}
        get textContent() {
            return this.childNodes.filter((c) => c.nodeType !== 8).map((c) => c.textContent).join('');
        }
        set textContent(value) {
            for (const child of this.childNodes.slice()) this.removeChild(child);
            if (value !== null && value !== undefined && value !== '') {
                this.appendChild(new Text(String(value), this.ownerDocument));
            }
        }
        hasChildNodes() { return this.childNodes.length > 0; }
        contains(other) {
            for (let node = other; node; node = node.parentNode) if (node === this) return true;
            return false;
        }
        _setOwner(doc) {
            this.ownerDocument = doc;
            for (const child of this.childNodes) child._setOwner(doc);
        }
        _adopt(child) {
            if (child.nodeType === 11) {
                const nodes = child.childNodes.slice();
                for (const node of nodes) child.removeChild(node);
                return nodes;
            }
            if (child.parentNode) child.parentNode.removeChild(child);
            return [child];
        }
        appendChild(child) { return this.insertBefore(child, null); }
        insertBefore(child, ref) {
            if (ref === child) return child;
            const nodes = this._adopt(child);
            let index = ref ? this.childNodes.indexOf(ref) : this.childNodes.length;
            if (index < 0) throw new Error('NotFoundError: reference node is not a child of this node');
            const owner = this.nodeType === 9 ? this : this.ownerDocument;
            for (const node of nodes) {
                node.parentNode = this;
                node._setOwner(owner);
            }
            this.childNodes.splice(index, 0, ...nodes);
            return child;
        }
        removeChild(child) {
            const i = this.childNodes.indexOf(child);
            if (i < 0) throw new Error('NotFoundError: node is not a child of this node');
            this.childNodes.splice(i, 1);
            child.parentNode = null;
            return child;
        }
        replaceChild(newChild, oldChild) {
            if (newChild === oldChild) return oldChild;
            this.insertBefore(newChild, oldChild);
            return this.removeChild(oldChild);
        }
        remove() { if (this.parentNode) this.parentNode.removeChild(this); }
        _toNode(value) { return typeof value === 'string' ? new Text(value, this.ownerDocument) : value; }
        append(...nodes) { for (const node of nodes) this.appendChild(this._toNode(node)); }
        prepend(...nodes) {
            const first = this.firstChild;
            for (const node of nodes) this.insertBefore(this._toNode(node), first);
        }
        before(...nodes) { if (this.parentNode) for (const node of nodes) this.parentNode.insertBefore(this._toNode(node), this); }
        after(...nodes) {
            if (!this.parentNode) return;
            let ref = this.nextSibling;
            for (const node of nodes) this.parentNode.insertBefore(this._toNode(node), ref);
        }
        replaceWith(...nodes) {
            if (!this.parentNode) return;
            this.before(...nodes);
            this.remove();
        }
        replaceChildren(...nodes) {
            for (const child of this.childNodes.slice()) this.removeChild(child);
            this.append(...nodes);
        }
        cloneNode(deep = false) {
            const copy = this._cloneShallow();
            if (deep) for (const child of this.childNodes) copy.appendChild(child.cloneNode(true));
            return copy;
        }
    }

    class CharacterData extends Node {
        constructor(nodeType, nodeName, data, doc) {
            super(nodeType, nodeName);
            this.data = String(data);
            this.ownerDocument = doc || null;
        }
        get nodeValue() { return this.data; }
        set nodeValue(value) { this.data = String(value); }
        get textContent() { return this.data; }
        set textContent(value) { this.data = String(value); }
        get length() { return this.data.length; }
    }

    class Text extends CharacterData {
        constructor(data = '', doc) { super(3, '#text', data, doc); }
        _cloneShallow() { return new Text(this.data, this.ownerDocument); }
        _serialize(parentName) { return RAW_TEXT.has(parentName) ? this.data : escapeText(this.data); }
    }

    class Comment extends CharacterData {
        constructor(data = '', doc) { super(8, '#comment', data, doc); }
        _cloneShallow() { return new Comment(this.data, this.ownerDocument); }
        _serialize() { return '<!--' + this.data + '-->'; }
    }

    class DocumentType extends Node {
        constructor(name, doc) { super(10, name); this.name = name; this.ownerDocument = doc || null; }
        _cloneShallow() { return new DocumentType(this.name, this.ownerDocument); }
        _serialize() { return '<!DOCTYPE ' + this.name + '>'; }
    }

    // Fragment parser for innerHTML / insertAdjacentHTML.
    const TAG = /<!--([\s\S]*?)-->|<![^>]*>|<\/([a-zA-Z][\w:-]*)\s*>|<([a-zA-Z][\w:-]*)((?:\s+[^\s"'>\/=]+(?:\s*=\s*(?:"[^"]*"|'[^']*'|[^\s"'=<>`]+))?)*)\s*(\/?)>/g;
    const ATTR = /([^\s"'>\/=]+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?/g;

    function parseFragment(html, doc, into) {
        const stack = [into];
        const top = () => stack[stack.length - 1];
        const text = (s) => { if (s) top().appendChild(doc.createTextNode(decodeEntities(s))); };
        TAG.lastIndex = 0;
        let last = 0;
        let m;
        while ((m = TAG.exec(html)) !== null) {
            text(html.slice(last, m.index));
            last = TAG.lastIndex;
            if (m[1] !== undefined) {
                top().appendChild(doc.createComment(m[1]));
            } else if (m[2] !== undefined) {
                const name = m[2].toLowerCase();
                for (let i = stack.length - 1; i > 0; i--) {
                    if (stack[i].localName === name) { stack.length = i; break; }
                }
            } else if (m[3] !== undefined) {
                const el = doc.createElement(m[3]);
                ATTR.lastIndex = 0;
                let a;
                while ((a = ATTR.exec(m[4])) !== null) {
                    el.setAttribute(a[1], decodeEntities(a[2] ?? a[3] ?? a[4] ?? ''));
                }
                top().appendChild(el);
                if (RAW_TEXT.has(el.localName)) {
                    const close = html.toLowerCase().indexOf('</' + el.localName, last);
                    const end = close < 0 ? html.length : close;
                    if (end > last) el.appendChild(doc.createTextNode(html.slice(last, end)));
                    const gt = close < 0 ? -1 : html.indexOf('>', close);
                    last = gt < 0 ? html.length : gt + 1;
                    TAG.lastIndex = last;
                } else if (!VOID.has(el.localName) && !m[5]) {
                    stack.push(el);
                }
            }
        }
        text(html.slice(last));
    }

    // Selector engine: compound selectors (tag, #id, .class, [attr op value])
    // joined by descendant or child combinators, comma separated.
    const TOKEN = /(\*|[a-zA-Z][\w-]*)|#([\w-]+)|\.([\w-]+)|\[\s*([\w:-]+)\s*(?:([~^$*|]?=)\s*(?:"([^"]*)"|'([^']*)'|([^\]\s]+)))?\s*\]/y;

    function parseCompound(text) {
        const compound = { tag: null, id: null, classes: [], attrs: [], invalid: false };
        let pos = 0;
        while (pos < text.length) {
            TOKEN.lastIndex = pos;
            const m = TOKEN.exec(text);
            if (!m) { compound.invalid = true; break; }
            if (m[1]) compound.tag = m[1] === '*' ? null : m[1].toLowerCase();
            else if (m[2]) compound.id = m[2];
            else if (m[3]) compound.classes.push(m[3]);
            else compound.attrs.push({ name: m[4].toLowerCase(), op: m[5] || null, value: m[6] ?? m[7] ?? m[8] ?? '' });
            pos = TOKEN.lastIndex;
        }
        return compound;
    }

    function parseSelector(selector) {
        return String(selector).split(',').map((part) => {
            const tokens = part.replace(/\s*>\s*/g, ' > ').trim().split(/\s+/).filter(Boolean);
            const steps = [];
            let combinator = ' ';
            for (const token of tokens) {
                if (token === '>') { combinator = '>'; continue; }
                steps.push({ compound: parseCompound(token), combinator });
                combinator = ' ';
            }
            return steps;
        }).filter((steps) => steps.length > 0);
    }

    function matchAttr(el, { name, op, value }) {
        const actual = el.getAttribute(name);
        if (actual === null) return false;
        switch (op) {
            case null: return true;
            case '=': return actual === value;
            case '~=': return actual.split(/\s+/).includes(value);
            case '^=': return value !== '' && actual.startsWith(value);
            case '$=': return value !== '' && actual.endsWith(value);
            case '*=': return value !== '' && actual.includes(value);
            case '|=': return actual === value || actual.startsWith(value + '-');
            default: return false;
        }
    }

    function matchCompound(el, compound) {
        if (el.nodeType !== 1 || compound.invalid) return false;
        if (compound.tag && el.localName.toLowerCase() !== compound.tag) return false;
        if (compound.id !== null && el.getAttribute('id') !== compound.id) return false;
        if (compound.classes.length) {
            const classes = (el.getAttribute('class') || '').split(/\s+/);
            if (!compound.classes.every((c) => classes.includes(c))) return false;
        }
        return compound.attrs.every((attr) => matchAttr(el, attr));
    }

    function matchSteps(el, steps, i) {
        if (!matchCompound(el, steps[i].compound)) return false;
        if (i === 0) return true;
        let parent = el.parentNode;
        if (steps[i].combinator === '>') {
            return !!parent && parent.nodeType === 1 && matchSteps(parent, steps, i - 1);
        }
        for (; parent && parent.nodeType === 1; parent = parent.parentNode) {
            if (matchSteps(parent, steps, i - 1)) return true;
        }
        return false;
    }

    const matchesSelector = (el, groups) => groups.some((steps) => matchSteps(el, steps, steps.length - 1));

    function descendants(root, out = []) {
        for (const child of root.childNodes) {
            if (child.nodeType === 1) out.push(child);
            descendants(child, out);
        }
        return out;
    }

    const QUERY_METHODS = {
        querySelectorAll(selector) {
            const groups = parseSelector(selector);
            return descendants(this).filter((el) => matchesSelector(el, groups));
        },
        querySelector(selector) {
            const groups = parseSelector(selector);
            return descendants(this).find((el) => matchesSelector(el, groups)) || null;
        },
        getElementsByTagName(name) {
            const wanted = String(name).toLowerCase();
            return descendants(this).filter((el) => wanted === '*' || el.localName.toLowerCase() === wanted);
        },
        getElementsByClassName(names) {
            const wanted = String(names).split(/\s+/).filter(Boolean);
            return descendants(this).filter((el) => {
                const classes = (el.getAttribute('class') || '').split(/\s+/);
                return wanted.every((c) => classes.includes(c));
            });
        },
        get children() { return this.childNodes.filter((n) => n.nodeType === 1); },
        get childElementCount() { return this.children.length; },
        get firstElementChild() { return this.children[0] || null; },
        get lastElementChild() { const c = this.children; return c[c.length - 1] || null; },
    };

    function parseStyle(text) {
        const map = new Map();
        for (const decl of String(text || '').split(';')) {
            const i = decl.indexOf(':');
            if (i > 0) {
                const key = decl.slice(0, i).trim();
                if (key) map.set(key, decl.slice(i + 1).trim());
            }
        }
        return map;
    }
    const formatStyle = (map) => Array.from(map, ([k, v]) => `${k}: ${v};`).join(' ');
    const toKebab = (prop) => prop.startsWith('--') ? prop : prop.replace(/[A-Z]/g, (c) => '-' + c.toLowerCase());

    function styleFor(el) {
        const read = () => parseStyle(el._attrs.get('style'));
        const write = (map) => { if (map.size) el._attrs.set('style', formatStyle(map)); else el._attrs.delete('style'); };
        const api = {
            getPropertyValue: (prop) => read().get(toKebab(prop)) || '',
            setProperty: (prop, value) => {
                const map = read();
                if (value === null || value === undefined || value === '') map.delete(toKebab(prop));
                else map.set(toKebab(prop), String(value));
                write(map);
            },
            removeProperty: (prop) => {
                const map = read();
                const old = map.get(toKebab(prop)) || '';
                map.delete(toKebab(prop));
                write(map);
                return old;
            },
        };
        return new Proxy(api, {
            get(target, prop) {
                if (prop in target) return target[prop];
                if (prop === 'cssText') return el._attrs.get('style') || '';
                if (prop === 'length') return read().size;
                if (typeof prop !== 'string') return undefined;
                return read().get(toKebab(prop)) || '';
            },
            set(target, prop, value) {
                if (prop === 'cssText') write(parseStyle(value));
                else if (typeof prop === 'string') api.setProperty(prop, value);
                return true;
            },
        });
    }

    function classListFor(el) {
        const read = () => (el.getAttribute('class') || '').split(/\s+/).filter(Boolean);
        const write = (list) => el.setAttribute('class', list.join(' '));
        return {
            add: (...names) => { const list = read(); for (const n of names) if (!list.includes(n)) list.push(n); write(list); },
            remove: (...names) => write(read().filter((n) => !names.includes(n))),
            contains: (name) => read().includes(name),
            toggle: (name, force) => {
                const has = read().includes(name);
                const want = force === undefined ? !has : !!force;
                if (want && !has) write([...read(), name]);
                if (!want && has) write(read().filter((n) => n !== name));
                return want;
            },
            replace: (from, to) => {
                const list = read();
                const i = list.indexOf(from);
                if (i < 0) return false;
                list[i] = to;
                write(list);
                return true;
            },
            item: (i) => read()[i] ?? null,
            get length() { return read().length; },
            get value() { return el.getAttribute('class') || ''; },
            toString: () => el.getAttribute('class') || '',
            [Symbol.iterator]: () => read()[Symbol.iterator](),
        };
    }

    class Element extends Node {
        constructor(name, doc, namespaceURI = HTML_NS) {
            const isHtml = namespaceURI === HTML_NS;
            super(1, isHtml ? String(name).toUpperCase() : String(name));
            this.namespaceURI = namespaceURI;
            this.localName = isHtml ? String(name).toLowerCase() : String(name);
            this.ownerDocument = doc || null;
            this._attrs = new Map();
        }
        _norm(name) { return this.namespaceURI === HTML_NS ? String(name).toLowerCase() : String(name); }
        get tagName() { return this.nodeName; }
        get attributes() { return Array.from(this._attrs, ([name, value]) => ({ name, value })); }
        getAttributeNames() { return Array.from(this._attrs.keys()); }
        getAttribute(name) { const key = this._norm(name); return this._attrs.has(key) ? this._attrs.get(key) : null; }
        setAttribute(name, value) { this._attrs.set(this._norm(name), String(value)); }
        setAttributeNS(_ns, name, value) { this._attrs.set(String(name), String(value)); }
        getAttributeNS(_ns, name) { return this._attrs.has(String(name)) ? this._attrs.get(String(name)) : null; }
        removeAttribute(name) { this._attrs.delete(this._norm(name)); }
        removeAttributeNS(_ns, name) { this._attrs.delete(String(name)); }
        hasAttribute(name) { return this._attrs.has(this._norm(name)); }
        hasAttributes() { return this._attrs.size > 0; }
        toggleAttribute(name, force) {
            const has = this.hasAttribute(name);
            const want = force === undefined ? !has : !!force;
            if (want && !has) this.setAttribute(name, '');
            if (!want && has) this.removeAttribute(name);
            return want;
        }
        get id() { return this.getAttribute('id') || ''; }
        set id(value) { this.setAttribute('id', value); }
        get className() { return this.getAttribute('class') || ''; }
        set className(value) { this.setAttribute('class', value); }
        get classList() { return classListFor(this); }
        get style() { return styleFor(this); }
        set style(value) { this.setAttribute('style', value); }
        get dataset() {
            const el = this;
            const attr = (prop) => 'data-' + toKebab(String(prop));
            return new Proxy({}, {
                get: (_, prop) => typeof prop === 'string' ? (el.getAttribute(attr(prop)) ?? undefined) : undefined,
                set: (_, prop, value) => { el.setAttribute(attr(prop), value); return true; },
                deleteProperty: (_, prop) => { el.removeAttribute(attr(prop)); return true; },
                has: (_, prop) => el.hasAttribute(attr(prop)),
            });
        }
        get nextElementSibling() {
            for (let n = this.nextSibling; n; n = n.nextSibling) if (n.nodeType === 1) return n;
            return null;
        }
        get previousElementSibling() {
            for (let n = this.previousSibling; n; n = n.previousSibling) if (n.nodeType === 1) return n;
            return null;
        }
        get innerHTML() { return this.childNodes.map((c) => c._serialize(this.localName)).join(''); }
        set innerHTML(html) {
            for (const child of this.childNodes.slice()) this.removeChild(child);
            if (html !== null && html !== undefined && html !== '') {
                if (RAW_TEXT.has(this.localName)) this.appendChild(new Text(String(html), this.ownerDocument));
                else parseFragment(String(html), this.ownerDocument, this);
            }
        }
        get outerHTML() { return this._serialize(); }
        get innerText() { return this.textContent; }
        set innerText(value) { this.textContent = value; }
        insertAdjacentHTML(position, html) {
            const fragment = this.ownerDocument.createDocumentFragment();
            parseFragment(String(html), this.ownerDocument, fragment);
            this._insertAdjacent(String(position).toLowerCase(), fragment);
        }
        insertAdjacentElement(position, el) { this._insertAdjacent(String(position).toLowerCase(), el); return el; }
        insertAdjacentText(position, text) { this._insertAdjacent(String(position).toLowerCase(), new Text(text, this.ownerDocument)); }
        _insertAdjacent(position, node) {
            switch (position) {
                case 'beforebegin': if (this.parentNode) this.parentNode.insertBefore(node, this); break;
                case 'afterbegin': this.insertBefore(node, this.firstChild); break;
                case 'beforeend': this.appendChild(node); break;
                case 'afterend': if (this.parentNode) this.parentNode.insertBefore(node, this.nextSibling); break;
                default: throw new Error('SyntaxError: invalid position ' + position);
            }
        }
        matches(selector) { return matchesSelector(this, parseSelector(selector)); }
        closest(selector) {
            const groups = parseSelector(selector);
            for (let el = this; el && el.nodeType === 1; el = el.parentNode) if (matchesSelector(el, groups)) return el;
            return null;
        }
        getBoundingClientRect() { return { x: 0, y: 0, top: 0, left: 0, right: 0, bottom: 0, width: 0, height: 0 }; }
        getClientRects() { return []; }
        get offsetWidth() { return 0; }
        get offsetHeight() { return 0; }
        get clientWidth() { return 0; }
        get clientHeight() { return 0; }
        scrollIntoView() {}
        focus() {}
        blur() {}
        click() { this.dispatchEvent(new Event('click', { bubbles: true, cancelable: true })); }
        attachShadow() { return this; }
        _cloneShallow() {
            const copy = new Element(this.localName, this.ownerDocument, this.namespaceURI);
            for (const [k, v] of this._attrs) copy._attrs.set(k, v);
            return copy;
        }
        _serialize() {
            let out = '<' + this.localName;
            for (const [k, v] of this._attrs) out += ' ' + k + '="' + escapeAttr(v) + '"';
            out += '>';
            if (this.namespaceURI === HTML_NS && VOID.has(this.localName)) return out;
            return out + this.innerHTML + '</' + this.localName + '>';
        }
    }

    // Reflected IDL attributes commonly touched by UI code.
    for (const name of ['href', 'src', 'type', 'name', 'title', 'alt', 'rel', 'lang', 'placeholder', 'action', 'method', 'target', 'htmlFor', 'role']) {
        const attr = name === 'htmlFor' ? 'for' : name.toLowerCase();
        Object.defineProperty(Element.prototype, name, {
            get() { return this.getAttribute(attr) || ''; },
            set(value) { this.setAttribute(attr, value); },
            configurable: true,
        });
    }
    for (const name of ['disabled', 'checked', 'hidden', 'selected', 'required', 'readOnly', 'multiple', 'autofocus']) {
        const attr = name.toLowerCase();
        Object.defineProperty(Element.prototype, name, {
            get() { return this.hasAttribute(attr); },
            set(value) { this.toggleAttribute(attr, !!value); },
            configurable: true,
        });
    }
    Object.defineProperty(Element.prototype, 'value', {
        get() { return this.localName === 'textarea' ? this.textContent : (this.getAttribute('value') ?? ''); },
        set(value) { if (this.localName === 'textarea') this.textContent = value; else this.setAttribute('value', value); },
        configurable: true,
    });

    class DocumentFragment extends Node {
        constructor(doc) { super(11, '#document-fragment'); this.ownerDocument = doc || null; }
        _cloneShallow() { return new DocumentFragment(this.ownerDocument); }
        _serialize() { return this.childNodes.map((c) => c._serialize('')).join(''); }
        getElementById(id) { return descendants(this).find((el) => el.getAttribute('id') === id) || null; }
    }

    class Document extends Node {
        constructor() {
            super(9, '#document');
            this.readyState = 'loading';
            this.defaultView = null;
            this.cookie = '';
            this.visibilityState = 'visible';
            this.hidden = false;
            this.referrer = '';
            this.characterSet = 'UTF-8';
            this.compatMode = 'CSS1Compat';
        }
        get documentElement() { return this.childNodes.find((n) => n.nodeType === 1) || null; }
        get doctype() { return this.childNodes.find((n) => n.nodeType === 10) || null; }
        _section(name) {
            const root = this.documentElement;
            return root ? root.childNodes.find((n) => n.nodeType === 1 && n.localName === name) || null : null;
        }
        get head() { return this._section('head'); }
        get body() { return this._section('body'); }
        get activeElement() { return this.body; }
        get title() { const t = this.querySelector('title'); return t ? t.textContent.trim() : ''; }
        set title(value) {
            let t = this.querySelector('title');
            if (!t) {
                t = this.createElement('title');
                if (this.head) this.head.appendChild(t);
            }
            t.textContent = value;
        }
        createElement(name) { return new Element(name, this, HTML_NS); }
        createElementNS(ns, name) { return new Element(name, this, ns || HTML_NS); }
        createTextNode(data) { return new Text(data, this); }
        createComment(data) { return new Comment(data, this); }
        createDocumentFragment() { return new DocumentFragment(this); }
        createEvent() { return new Event(''); }
        createRange() {
            const doc = this;
            return {
                setStart() {}, setEnd() {}, selectNode() {}, selectNodeContents() {}, collapse() {},
                getBoundingClientRect: () => ({ x: 0, y: 0, top: 0, left: 0, right: 0, bottom: 0, width: 0, height: 0 }),
                getClientRects: () => [],
                createContextualFragment(html) {
                    const fragment = doc.createDocumentFragment();
                    parseFragment(String(html), doc, fragment);
                    return fragment;
                },
            };
        }
        getSelection() { return { rangeCount: 0, removeAllRanges() {}, addRange() {} }; }
        getElementById(id) { return descendants(this).find((el) => el.getAttribute('id') === id) || null; }
        hasFocus() { return false; }
        _serialize() { return this.childNodes.map((c) => c._serialize('')).join(''); }
    }

    for (const Target of [Element, Document, DocumentFragment]) {
        Object.defineProperties(Target.prototype, Object.getOwnPropertyDescriptors(QUERY_METHODS));
    }

    function build(node, doc) {
        switch (node.type) {
            case 'doctype': return new DocumentType(node.name, doc);
            case 'text': return new Text(node.text, doc);
            case 'comment': return new Comment(node.text, doc);
            case 'element': {
                const el = new Element(node.name, doc, node.namespace || HTML_NS);
                for (const [k, v] of node.attrs) el._attrs.set(k, v);
                for (const child of node.children) el.appendChild(build(child, doc));
                return el;
            }
            default: throw new Error('unknown template node ' + node.type);
        }
    }

    function buildDocument(template) {
        const doc = new Document();
        for (const child of template.children || []) doc.appendChild(build(child, doc));
        return doc;
    }

    Object.assign(globalThis, {
        Event, CustomEvent, EventTarget, Node, CharacterData, Text, Comment, DocumentType,
        Element, DocumentFragment, Document,
        HTMLElement: Element, SVGElement: Element, HTMLDocument: Document,
        __prerenderDom: { buildDocument, parseFragment },
    });
    for (const name of ['Div', 'Span', 'Anchor', 'Button', 'Input', 'Form', 'Image', 'Script', 'Style', 'Template', 'TextArea', 'Select', 'Option', 'Label', 'Paragraph', 'Heading', 'UList', 'LI', 'Table', 'Canvas', 'Video', 'Audio', 'IFrame']) {
        globalThis['HTML' + name + 'Element'] = Element;
    }
})();
"#;

const WINDOW_POLYFILL: &str = r#"
// Window surface: document, location, history, storage, timers, observers
(() => {
    const boot = globalThis.__PRERENDER_BOOT__;
    const document = globalThis.__prerenderDom.buildDocument(boot.template);
    const windowEvents = new EventTarget();

    globalThis.window = globalThis;
    globalThis.self = globalThis;
    globalThis.top = globalThis;
    globalThis.parent = globalThis;
    globalThis.document = document;
    document.defaultView = globalThis;
    globalThis.addEventListener = windowEvents.addEventListener.bind(windowEvents);
    globalThis.removeEventListener = windowEvents.removeEventListener.bind(windowEvents);
    globalThis.dispatchEvent = windowEvents.dispatchEvent.bind(windowEvents);

    // Process polyfill (Node.js compatibility)
    globalThis.process = {
        env: { NODE_ENV: boot.nodeEnv },
        nextTick: (fn, ...args) => queueMicrotask(() => fn(...args)),
        browser: true,
    };

    // Location
    const URL_RE = /^([a-zA-Z][\w+.-]*:)\/\/([^\/?#:]*)(?::(\d+))?([^?#]*)(\?[^#]*)?(#.*)?$/;
    let current = null;

    function parseHref(href, base) {
        let value = String(href);
        if (!URL_RE.test(value) && base) {
            if (value.startsWith('//')) value = base.protocol + value;
            else if (value.startsWith('/')) value = base.origin + value;
            else if (value.startsWith('?')) value = base.origin + base.pathname + value;
            else if (value.startsWith('#')) value = base.origin + base.pathname + base.search + value;
            else {
                const dir = base.pathname.slice(0, base.pathname.lastIndexOf('/') + 1);
                value = base.origin + dir + value;
            }
        }
        const m = URL_RE.exec(value);
        if (!m) throw new TypeError('Invalid URL: ' + href);
        const protocol = m[1].toLowerCase();
        const hostname = m[2].toLowerCase();
        const port = m[3] || '';
        const host = port ? hostname + ':' + port : hostname;
        const pathname = m[4] || '/';
        const search = m[5] && m[5] !== '?' ? m[5] : '';
        const hash = m[6] && m[6] !== '#' ? m[6] : '';
        const origin = protocol + '//' + host;
        return { href: origin + pathname + search + hash, protocol, hostname, port, host, pathname, search, hash, origin };
    }

    const location = {
        assign(href) { history.pushState(null, '', href); },
        replace(href) { history.replaceState(null, '', href); },
        reload() {},
        toString() { return current.href; },
    };
    for (const key of ['href', 'protocol', 'hostname', 'port', 'host', 'pathname', 'search', 'hash', 'origin']) {
        Object.defineProperty(location, key, {
            get: () => current[key],
            set: key === 'origin' ? undefined : (value) => {
                if (key === 'href') { location.assign(value); return; }
                const next = Object.assign({}, current, { [key]: String(value) });
                const search = next.search && !next.search.startsWith('?') ? '?' + next.search : next.search;
                const hash = next.hash && !next.hash.startsWith('#') ? '#' + next.hash : next.hash;
                location.assign(next.protocol + '//' + next.host + next.pathname + search + hash);
            },
            enumerable: true,
        });
    }
    globalThis.location = location;
    document.location = location;

    // History
    const entries = [];
    let index = -1;
    const history = {
        get length() { return entries.length; },
        get state() { return index >= 0 ? entries[index].state : null; },
        scrollRestoration: 'auto',
        pushState(state, _title, href) {
            if (href !== undefined && href !== null) current = parseHref(href, current);
            entries.length = index + 1;
            entries.push({ state: state ?? null, href: current.href });
            index = entries.length - 1;
        },
        replaceState(state, _title, href) {
            if (href !== undefined && href !== null) current = parseHref(href, current);
            if (index < 0) { entries.push({ state: null, href: current.href }); index = 0; }
            entries[index] = { state: state ?? null, href: current.href };
        },
        go(delta = 0) {
            const target = index + delta;
            if (delta === 0 || target < 0 || target >= entries.length) return;
            index = target;
            current = parseHref(entries[index].href, current);
            const event = new Event('popstate');
            event.state = entries[index].state;
            setTimeout(() => globalThis.dispatchEvent(event), 0);
        },
        back() { history.go(-1); },
        forward() { history.go(1); },
        _reset(href) {
            current = parseHref(href, current);
            entries.length = 0;
            entries.push({ state: null, href: current.href });
            index = 0;
        },
    };
    globalThis.history = history;
    history._reset(boot.url);

    // URL / URLSearchParams (only when the isolate lacks them)
    if (typeof globalThis.URLSearchParams === 'undefined') {
        globalThis.URLSearchParams = class URLSearchParams {
            constructor(init = '') {
                this._pairs = [];
                if (typeof init === 'string') {
                    for (const part of init.replace(/^\?/, '').split('&')) {
                        if (!part) continue;
                        const [k, v = ''] = part.split('=');
                        const decode = (s) => decodeURIComponent(s.replace(/\+/g, ' '));
                        this._pairs.push([decode(k), decode(v)]);
                    }
                } else if (init && typeof init === 'object') {
                    const iter = Array.isArray(init) || typeof init[Symbol.iterator] === 'function' ? init : Object.entries(init);
                    for (const [k, v] of iter) this._pairs.push([String(k), String(v)]);
                }
            }
            get(name) { const p = this._pairs.find(([k]) => k === name); return p ? p[1] : null; }
            getAll(name) { return this._pairs.filter(([k]) => k === name).map(([, v]) => v); }
            has(name) { return this._pairs.some(([k]) => k === name); }
            set(name, value) { this.delete(name); this._pairs.push([String(name), String(value)]); }
            append(name, value) { this._pairs.push([String(name), String(value)]); }
            delete(name) { this._pairs = this._pairs.filter(([k]) => k !== name); }
            forEach(fn) { for (const [k, v] of this._pairs) fn(v, k, this); }
            keys() { return this._pairs.map(([k]) => k)[Symbol.iterator](); }
            values() { return this._pairs.map(([, v]) => v)[Symbol.iterator](); }
            entries() { return this._pairs.slice()[Symbol.iterator](); }
            [Symbol.iterator]() { return this.entries(); }
            toString() { return this._pairs.map(([k, v]) => encodeURIComponent(k) + '=' + encodeURIComponent(v)).join('&'); }
        };
    }
    if (typeof globalThis.URL === 'undefined') {
        globalThis.URL = class URL {
            constructor(href, base) {
                const baseParts = base === undefined ? null : parseHref(String(base), null);
                const parts = parseHref(href, baseParts);
                Object.assign(this, parts);
                this.searchParams = new URLSearchParams(parts.search);
            }
            toString() { return this.href; }
            toJSON() { return this.href; }
        };
    }

    // Storage (cleared between requests)
    class Storage {
        constructor() { this._items = new Map(); }
        get length() { return this._items.size; }
        key(i) { return Array.from(this._items.keys())[i] ?? null; }
        getItem(key) { return this._items.has(String(key)) ? this._items.get(String(key)) : null; }
        setItem(key, value) { this._items.set(String(key), String(value)); }
        removeItem(key) { this._items.delete(String(key)); }
        clear() { this._items.clear(); }
    }
    globalThis.Storage = Storage;
    globalThis.localStorage = new Storage();
    globalThis.sessionStorage = new Storage();

    globalThis.navigator = {
        userAgent: 'Mozilla/5.0 (X11; Linux x86_64) prerender',
        language: 'en-US',
        languages: ['en-US', 'en'],
        onLine: true,
        platform: 'Linux x86_64',
        cookieEnabled: false,
        hardwareConcurrency: 1,
        maxTouchPoints: 0,
        sendBeacon: () => false,
        clipboard: { writeText: () => Promise.resolve(), readText: () => Promise.resolve('') },
    };

    // Timers - run by the Rust side through __prerender.tick()
    const timers = new Map();
    let nextTimerId = 1;
    const schedule = (fn, delay, args, repeat) => {
        const id = nextTimerId++;
        const ms = Math.max(0, Number(delay) || 0);
        timers.set(id, { fn, args, due: Date.now() + ms, interval: repeat ? Math.max(1, ms) : null });
        return id;
    };
    globalThis.setTimeout = (fn, delay = 0, ...args) => schedule(fn, delay, args, false);
    globalThis.setInterval = (fn, delay = 0, ...args) => schedule(fn, delay, args, true);
    globalThis.clearTimeout = (id) => { timers.delete(id); };
    globalThis.clearInterval = (id) => { timers.delete(id); };
    globalThis.requestAnimationFrame = (fn) => schedule(() => fn(performance.now()), 16, [], false);
    globalThis.cancelAnimationFrame = (id) => { timers.delete(id); };
    globalThis.requestIdleCallback = (fn) => schedule(() => fn({ didTimeout: false, timeRemaining: () => 0 }), 1, [], false);
    globalThis.cancelIdleCallback = (id) => { timers.delete(id); };

    function runTimers() {
        const now = Date.now();
        const due = Array.from(timers.entries())
            .filter(([, t]) => t.due <= now)
            .sort((a, b) => a[1].due - b[1].due || a[0] - b[0]);
        for (const [id, timer] of due) {
            if (!timers.has(id)) continue;
            if (timer.interval === null) timers.delete(id);
            else timer.due = now + timer.interval;
            try {
                if (typeof timer.fn === 'function') timer.fn(...timer.args);
            } catch (e) {
                console.error(e);
            }
        }
        return timers.size;
    }

    // MessageChannel polyfill - React uses this for scheduling
    class MessagePort extends EventTarget {
        constructor() { super(); this.onmessage = null; this._peer = null; }
        postMessage(data) {
            const peer = this._peer;
            queueMicrotask(() => {
                const event = new Event('message');
                event.data = data;
                peer.dispatchEvent(event);
            });
        }
        start() {}
        close() {}
    }
    globalThis.MessageChannel = class MessageChannel {
        constructor() {
            this.port1 = new MessagePort();
            this.port2 = new MessagePort();
            this.port1._peer = this.port2;
            this.port2._peer = this.port1;
        }
    };

    class NoopObserver {
        constructor(callback) { this._callback = callback; }
        observe() {}
        unobserve() {}
        disconnect() {}
        takeRecords() { return []; }
    }
    globalThis.MutationObserver = NoopObserver;
    globalThis.ResizeObserver = NoopObserver;
    globalThis.IntersectionObserver = NoopObserver;
    globalThis.PerformanceObserver = NoopObserver;

    globalThis.matchMedia = (media) => ({
        matches: false,
        media: String(media),
        onchange: null,
        addListener() {},
        removeListener() {},
        addEventListener() {},
        removeEventListener() {},
        dispatchEvent: () => false,
    });
    globalThis.getComputedStyle = (el) => el.style;
    globalThis.innerWidth = 1280;
    globalThis.innerHeight = 800;
    globalThis.outerWidth = 1280;
    globalThis.outerHeight = 800;
    globalThis.devicePixelRatio = 1;
    globalThis.scrollX = 0;
    globalThis.scrollY = 0;
    globalThis.pageXOffset = 0;
    globalThis.pageYOffset = 0;
    globalThis.screen = { width: 1280, height: 800, availWidth: 1280, availHeight: 800, colorDepth: 24 };
    globalThis.scrollTo = () => {};
    globalThis.scrollBy = () => {};
    globalThis.alert = () => {};
    globalThis.confirm = () => false;
    globalThis.prompt = () => null;
    globalThis.open = () => null;
    globalThis.close = () => {};
    globalThis.focus = () => {};
    globalThis.blur = () => {};

    globalThis.crypto = globalThis.crypto || {
        getRandomValues(array) {
            for (let i = 0; i < array.length; i++) array[i] = Math.floor(Math.random() * 256);
            return array;
        },
        randomUUID() {
            const hex = Array.from({ length: 16 }, () => Math.floor(Math.random() * 256));
            hex[6] = (hex[6] & 0x0f) | 0x40;
            hex[8] = (hex[8] & 0x3f) | 0x80;
            const s = hex.map((b) => b.toString(16).padStart(2, '0')).join('');
            return `${s.slice(0, 8)}-${s.slice(8, 12)}-${s.slice(12, 16)}-${s.slice(16, 20)}-${s.slice(20)}`;
        },
    };

    // Network access is not available inside a render context; data
    // arrives through the injected payload instead.
    globalThis.fetch = () => Promise.reject(new TypeError('fetch is not available during prerender'));
    globalThis.XMLHttpRequest = class XMLHttpRequest {
        open() {}
        setRequestHeader() {}
        send() { throw new TypeError('XMLHttpRequest is not available during prerender'); }
        abort() {}
    };
    globalThis.WebSocket = class WebSocket {
        constructor() { throw new TypeError('WebSocket is not available during prerender'); }
    };
    globalThis.EventSource = class EventSource {
        constructor() { throw new TypeError('EventSource is not available during prerender'); }
    };

    globalThis.__prerenderWindow = {
        runTimers,
        pendingTimers: () => timers.size,
        resetLocation: (href) => history._reset(href),
    };
})();
"#;

const RUNTIME_POLYFILL: &str = r#"
// Runtime API driven by the context worker
(() => {
    const boot = globalThis.__PRERENDER_BOOT__;
    const ops = Deno.core.ops;
    const win = globalThis.__prerenderWindow;

    globalThis[boot.doneFlag] = false;
    globalThis.__prerenderReady = () => { globalThis[boot.doneFlag] = true; };

    const runtime = {
        finishBoot() {
            document.readyState = 'interactive';
            document.dispatchEvent(new Event('DOMContentLoaded', { bubbles: true }));
            document.readyState = 'complete';
            document.dispatchEvent(new Event('readystatechange'));
            globalThis.dispatchEvent(new Event('load'));
            win.runTimers();
        },
        tick() {
            win.runTimers();
        },
        probe(markerId) {
            ops.op_set_flag('stable', document.getElementById(markerId) === null);
            ops.op_set_flag('done', globalThis[boot.doneFlag] === true);
        },
        inject(json, scriptBody) {
            globalThis[boot.dataGlobal] = JSON.parse(json);
            const previous = document.getElementById(boot.dataScriptId);
            if (previous) previous.remove();
            const script = document.createElement('script');
            script.setAttribute('id', boot.dataScriptId);
            script.textContent = scriptBody;
            (document.head || document.body || document.documentElement).appendChild(script);
        },
        clear() {
            delete globalThis[boot.dataGlobal];
            const script = document.getElementById(boot.dataScriptId);
            if (script) script.remove();
            globalThis[boot.doneFlag] = false;
            localStorage.clear();
            sessionStorage.clear();
            document.cookie = '';
            ops.op_set_flag(
                'cleared',
                !(boot.dataGlobal in globalThis) && document.getElementById(boot.dataScriptId) === null,
            );
        },
        navigate(href, route) {
            win.resetLocation(href);
            const hook = globalThis[boot.routeHook];
            if (typeof hook === 'function') {
                hook(route);
                ops.op_set_flag('navigated', true);
            } else {
                ops.op_set_flag('navigated', false);
            }
        },
        serialize() {
            ops.op_set_html(document._serialize());
        },
    };

    Object.defineProperty(globalThis, '__prerender', { value: runtime });
})();
"#;
