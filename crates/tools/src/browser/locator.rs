//! Locator resolution: scanning the live DOM for interactive elements and
//! computing stable, re-resolvable XPath locators for them.
//!
//! Locators are opaque strings, never live node handles. They are computed
//! fresh on every scan and must be re-resolved against the current DOM each
//! time they are used, since the page is externally mutable between tool
//! calls.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Interactive tags the scanner reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementTag {
    A,
    Button,
    Input,
    Textarea,
    Select,
    Details,
}

impl ElementTag {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "a" => Some(Self::A),
            "button" => Some(Self::Button),
            "input" => Some(Self::Input),
            "textarea" => Some(Self::Textarea),
            "select" => Some(Self::Select),
            "details" => Some(Self::Details),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::A => "a",
            Self::Button => "button",
            Self::Input => "input",
            Self::Textarea => "textarea",
            Self::Select => "select",
            Self::Details => "details",
        }
    }
}

/// One interactive element as reported to the calling model. Produced fresh
/// by every scan; never cached across calls.
#[derive(Debug, Clone, Serialize)]
pub struct ElementDescriptor {
    /// XPath expression re-resolvable against the current DOM.
    pub id: String,
    pub tag: ElementTag,
    pub text: String,
    pub attributes: Map<String, Value>,
}

/// Raw per-element record returned by the in-page scan script.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawElement {
    pub tag: String,
    /// Structural XPath, or an `xpath_fallback_{i}_{tag}` placeholder when
    /// path computation failed for this element only.
    pub locator: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub aria_label: Option<String>,
    #[serde(default)]
    pub placeholder: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default)]
    pub href: Option<String>,
    #[serde(default, rename = "type")]
    pub input_type: Option<String>,
    #[serde(default)]
    pub visible: bool,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub selected: Option<bool>,
}

/// In-page scan: collects interactive elements and computes a structural
/// XPath per element. Uses the element's own id when present, otherwise a
/// positional index among same-tag siblings at each ancestor level, so the
/// locator survives recomputation while the subtree is unchanged. Per-element
/// path failures yield an indexed placeholder instead of aborting the scan.
pub const SCAN_SCRIPT: &str = r#"
(() => {
    function pathTo(el) {
        if (el.id !== '') return 'id("' + el.id + '")';
        if (el === document.body) return '/html/body';
        var ix = 0;
        var siblings = el.parentNode.childNodes;
        for (var i = 0; i < siblings.length; i++) {
            var sib = siblings[i];
            if (sib === el)
                return pathTo(el.parentNode) + '/' + el.tagName.toLowerCase() + '[' + (ix + 1) + ']';
            if (sib.nodeType === 1 && sib.tagName === el.tagName) ix++;
        }
        throw new Error('detached node');
    }
    const nodes = document.querySelectorAll(
        'a[href], button, input:not([type="hidden"]), textarea, select, details');
    const out = [];
    for (let i = 0; i < nodes.length; i++) {
        const el = nodes[i];
        const tag = el.tagName.toLowerCase();
        let locator;
        try {
            locator = pathTo(el);
        } catch (e) {
            locator = 'xpath_fallback_' + i + '_' + tag;
        }
        out.push({
            tag: tag,
            locator: locator,
            text: el.textContent || '',
            value: el.value || null,
            ariaLabel: el.getAttribute('aria-label'),
            placeholder: el.getAttribute('placeholder'),
            title: el.getAttribute('title'),
            id: el.id || null,
            name: el.getAttribute('name'),
            className: el.className || null,
            href: tag === 'a' ? el.href : null,
            type: el.getAttribute('type'),
            visible: !!(el.offsetWidth || el.offsetHeight || el.getClientRects().length),
            enabled: !el.disabled,
            selected: tag === 'input' ? (el.checked || false) : null,
        });
    }
    return JSON.stringify(out);
})()
"#;

/// Parse the scan script's payload. Accepts either a JSON string (the real
/// engine stringifies) or a direct array.
pub fn parse_scan_payload(value: &Value) -> Result<Vec<RawElement>, String> {
    let parsed: Vec<RawElement> = match value {
        Value::String(s) => {
            serde_json::from_str(s).map_err(|e| format!("bad scan payload: {}", e))?
        }
        Value::Array(_) => serde_json::from_value(value.clone())
            .map_err(|e| format!("bad scan payload: {}", e))?,
        other => return Err(format!("unexpected scan payload: {}", other)),
    };
    Ok(parsed)
}

/// Build descriptors from raw scan records, applying the optional keyword
/// filter. Records with tags outside the interactive set are dropped.
pub fn build_descriptors(raws: &[RawElement], keywords: Option<&str>) -> Vec<ElementDescriptor> {
    raws.iter()
        .filter_map(|raw| {
            let tag = ElementTag::parse(&raw.tag)?;
            if let Some(kw) = keywords {
                if !matches_keyword(raw, kw) {
                    return None;
                }
            }
            Some(descriptor_from_raw(raw, tag))
        })
        .collect()
}

/// An element matches if ANY of text, id, name, class, aria-label,
/// placeholder, title, or the computed locator contains the keyword,
/// case-insensitively.
fn matches_keyword(raw: &RawElement, keywords: &str) -> bool {
    let kw = keywords.to_lowercase();
    let contains = |field: Option<&str>| {
        field
            .map(|f| f.to_lowercase().contains(&kw))
            .unwrap_or(false)
    };
    contains(Some(&raw.text))
        || contains(raw.id.as_deref())
        || contains(raw.name.as_deref())
        || contains(raw.class_name.as_deref())
        || contains(raw.aria_label.as_deref())
        || contains(raw.placeholder.as_deref())
        || contains(raw.title.as_deref())
        || contains(Some(&raw.locator))
}

fn descriptor_from_raw(raw: &RawElement, tag: ElementTag) -> ElementDescriptor {
    let text = display_text(raw);
    let text = if text.is_empty() {
        format!("[{} element]", tag.as_str())
    } else {
        text
    };

    ElementDescriptor {
        id: raw.locator.clone(),
        tag,
        text,
        attributes: build_attributes(raw, tag),
    }
}

/// Display text falls back through text content, value, aria-label,
/// placeholder, then title. Whitespace is collapsed and the result truncated
/// to 150 characters.
fn display_text(raw: &RawElement) -> String {
    let candidates = [
        Some(raw.text.as_str()),
        raw.value.as_deref(),
        raw.aria_label.as_deref(),
        raw.placeholder.as_deref(),
        raw.title.as_deref(),
    ];
    let picked = candidates
        .into_iter()
        .flatten()
        .find(|s| !s.trim().is_empty())
        .unwrap_or("");

    normalize_ws(picked).chars().take(150).collect()
}

fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Tag-specific attribute projection, plus visible/enabled state and the
/// selected flag for inputs. Empty values are omitted.
fn build_attributes(raw: &RawElement, tag: ElementTag) -> Map<String, Value> {
    let mut attrs = Map::new();
    let mut put = |key: &str, value: Option<&str>| {
        if let Some(v) = value {
            if !v.is_empty() {
                attrs.insert(key.to_string(), Value::String(v.to_string()));
            }
        }
    };

    match tag {
        ElementTag::A => put("href", raw.href.as_deref()),
        ElementTag::Input => {
            put("type", raw.input_type.as_deref());
            put("name", raw.name.as_deref());
            put("placeholder", raw.placeholder.as_deref());
            put("value", raw.value.as_deref());
        }
        ElementTag::Button => {
            put("name", raw.name.as_deref());
            put("type", raw.input_type.as_deref());
        }
        ElementTag::Textarea | ElementTag::Select => put("name", raw.name.as_deref()),
        ElementTag::Details => {}
    }

    attrs.insert("visible".to_string(), Value::Bool(raw.visible));
    attrs.insert("enabled".to_string(), Value::Bool(raw.enabled));
    if tag == ElementTag::Input {
        if let Some(selected) = raw.selected {
            attrs.insert("selected".to_string(), Value::Bool(selected));
        }
    }

    attrs
}

// ─── Locator re-resolution scripts ────────────────────────────────────

/// Embed a Rust string as a JS string literal.
fn js_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

fn resolve_prelude(locator: &str) -> String {
    format!(
        "const el = document.evaluate({xp}, document, null, \
         XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue;\n\
         if (!el) return JSON.stringify({{found: false}});",
        xp = js_string(locator)
    )
}

/// Script that resolves `locator` and clicks it, returning
/// `{found, label}` JSON.
pub fn click_script(locator: &str) -> String {
    format!(
        r#"(() => {{
    {prelude}
    const label = ((el.textContent || '').trim() || el.value || el.getAttribute('aria-label') || '[no text]')
        .trim().slice(0, 100);
    el.scrollIntoView({{block: 'center'}});
    el.click();
    return JSON.stringify({{found: true, label: label}});
}})()"#,
        prelude = resolve_prelude(locator)
    )
}

/// Script that resolves `locator`, clears the field, and injects `text`,
/// dispatching the events frameworks listen for. Returns `{found, label}`.
pub fn type_script(locator: &str, text: &str) -> String {
    format!(
        r#"(() => {{
    {prelude}
    const label = (el.getAttribute('placeholder') || el.getAttribute('name') || '[input field]')
        .trim().slice(0, 50);
    el.focus();
    el.value = '';
    el.value = {text};
    el.dispatchEvent(new Event('input', {{bubbles: true}}));
    el.dispatchEvent(new Event('change', {{bubbles: true}}));
    return JSON.stringify({{found: true, label: label}});
}})()"#,
        prelude = resolve_prelude(locator),
        text = js_string(text)
    )
}

/// Outcome of a resolve-and-act script.
#[derive(Debug, Deserialize)]
pub struct ResolveOutcome {
    pub found: bool,
    #[serde(default)]
    pub label: String,
}

pub fn parse_resolve_payload(value: &Value) -> Result<ResolveOutcome, String> {
    match value {
        Value::String(s) => {
            serde_json::from_str(s).map_err(|e| format!("bad resolve payload: {}", e))
        }
        Value::Object(_) => serde_json::from_value(value.clone())
            .map_err(|e| format!("bad resolve payload: {}", e)),
        other => Err(format!("unexpected resolve payload: {}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(tag: &str, locator: &str, text: &str) -> RawElement {
        RawElement {
            tag: tag.to_string(),
            locator: locator.to_string(),
            text: text.to_string(),
            value: None,
            aria_label: None,
            placeholder: None,
            title: None,
            id: None,
            name: None,
            class_name: None,
            href: None,
            input_type: None,
            visible: true,
            enabled: true,
            selected: None,
        }
    }

    #[test]
    fn test_parse_scan_payload_from_string() {
        let payload = json!(
            r#"[{"tag":"a","locator":"id(\"home\")","text":"Home","href":"https://example.com/","visible":true,"enabled":true}]"#
        );
        let raws = parse_scan_payload(&payload).unwrap();
        assert_eq!(raws.len(), 1);
        assert_eq!(raws[0].tag, "a");
        assert_eq!(raws[0].locator, r#"id("home")"#);
    }

    #[test]
    fn test_parse_scan_payload_from_array() {
        let payload = json!([
            {"tag": "button", "locator": "body/button[1]", "text": "Go"}
        ]);
        let raws = parse_scan_payload(&payload).unwrap();
        assert_eq!(raws[0].locator, "body/button[1]");
    }

    #[test]
    fn test_keyword_filter_matches_text() {
        let raws = vec![
            raw("button", "body/button[1]", "Login"),
            raw("button", "body/button[2]", "Search"),
        ];
        let descriptors = build_descriptors(&raws, Some("log"));
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].text, "Login");
    }

    #[test]
    fn test_keyword_filter_no_match_is_empty() {
        let raws = vec![
            raw("button", "body/button[1]", "Login"),
            raw("button", "body/button[2]", "Search"),
        ];
        assert!(build_descriptors(&raws, Some("xyz")).is_empty());
    }

    #[test]
    fn test_keyword_filter_checks_all_fields() {
        let mut by_name = raw("input", "body/input[1]", "");
        by_name.name = Some("username".to_string());
        let mut by_locator = raw("button", r#"id("submit-btn")/button[1]"#, "");
        by_locator.selected = None;

        let descriptors = build_descriptors(&[by_name.clone()], Some("USER"));
        assert_eq!(descriptors.len(), 1);

        let descriptors = build_descriptors(&[by_locator], Some("submit"));
        assert_eq!(descriptors.len(), 1);

        let mut by_placeholder = raw("input", "body/input[2]", "");
        by_placeholder.placeholder = Some("Search the docs".to_string());
        let descriptors = build_descriptors(&[by_placeholder], Some("docs"));
        assert_eq!(descriptors.len(), 1);
    }

    #[test]
    fn test_display_text_fallback_chain() {
        let mut r = raw("input", "body/input[1]", "   ");
        r.value = Some("".to_string());
        r.aria_label = Some("Search box".to_string());
        let descriptors = build_descriptors(&[r], None);
        assert_eq!(descriptors[0].text, "Search box");
    }

    #[test]
    fn test_display_text_normalized_and_truncated() {
        let long = "word ".repeat(60);
        let r = raw("a", "body/a[1]", &format!("  line\none\r\n{}", long));
        let descriptors = build_descriptors(&[r], None);
        assert!(descriptors[0].text.chars().count() <= 150);
        assert!(!descriptors[0].text.contains('\n'));
        assert!(descriptors[0].text.starts_with("line one"));
    }

    #[test]
    fn test_empty_text_gets_tag_placeholder() {
        let r = raw("select", "body/select[1]", "");
        let descriptors = build_descriptors(&[r], None);
        assert_eq!(descriptors[0].text, "[select element]");
    }

    #[test]
    fn test_partial_scan_keeps_fallback_locator() {
        let raws = vec![
            raw("a", r#"id("nav")/a[1]"#, "Home"),
            raw("a", "xpath_fallback_1_a", "Broken"),
            raw("a", r#"id("nav")/a[3]"#, "About"),
        ];
        let descriptors = build_descriptors(&raws, None);
        assert_eq!(descriptors.len(), 3);
        assert_eq!(descriptors[1].id, "xpath_fallback_1_a");
    }

    #[test]
    fn test_attributes_tag_specific() {
        let mut link = raw("a", "body/a[1]", "Home");
        link.href = Some("https://example.com/".to_string());
        let mut input = raw("input", "body/input[1]", "");
        input.input_type = Some("checkbox".to_string());
        input.selected = Some(true);

        let descriptors = build_descriptors(&[link, input], None);
        assert_eq!(
            descriptors[0].attributes["href"],
            json!("https://example.com/")
        );
        assert!(descriptors[0].attributes.get("selected").is_none());
        assert_eq!(descriptors[1].attributes["type"], json!("checkbox"));
        assert_eq!(descriptors[1].attributes["selected"], json!(true));
        assert_eq!(descriptors[1].attributes["visible"], json!(true));
    }

    #[test]
    fn test_unknown_tags_dropped() {
        let raws = vec![raw("div", "body/div[1]", "not interactive")];
        assert!(build_descriptors(&raws, None).is_empty());
    }

    #[test]
    fn test_click_script_escapes_locator() {
        let script = click_script(r#"id("it's")/a[1]"#);
        assert!(script.contains(r#""id(\"it's\")/a[1]""#));
        assert!(script.contains("el.click()"));
    }

    #[test]
    fn test_type_script_escapes_text() {
        let script = type_script("body/input[1]", "a \"quoted\" value");
        assert!(script.contains(r#""a \"quoted\" value""#));
        assert!(script.contains("new Event('input'"));
    }

    #[test]
    fn test_parse_resolve_payload() {
        let found = parse_resolve_payload(&json!(r#"{"found":true,"label":"Sign in"}"#)).unwrap();
        assert!(found.found);
        assert_eq!(found.label, "Sign in");

        let missing = parse_resolve_payload(&json!({"found": false})).unwrap();
        assert!(!missing.found);
        assert_eq!(missing.label, "");
    }

    #[test]
    fn test_two_scans_of_static_dom_agree() {
        // The locator is a pure function of the raw record; identical scan
        // payloads must produce identical locator strings.
        let payload = json!(
            r#"[{"tag":"button","locator":"body/div[2]/button[1]","text":"Go"}]"#
        );
        let first = build_descriptors(&parse_scan_payload(&payload).unwrap(), None);
        let second = build_descriptors(&parse_scan_payload(&payload).unwrap(), None);
        assert_eq!(first[0].id, second[0].id);
    }
}
