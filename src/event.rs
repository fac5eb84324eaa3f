//! Owned XML events and the names they carry.
//!
//! Events are fully owned so that they can be buffered, replayed and moved
//! between readers without borrowing the parser's input buffer.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Namespace permanently bound to the `xml` prefix.
pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// Namespace of `xmlns` declarations.
pub const XMLNS_NS: &str = "http://www.w3.org/2000/xmlns/";

/// A namespace-qualified name.
///
/// Equality and hashing only consider the namespace URI and the local part;
/// the prefix is a serialization hint.
#[derive(Debug, Clone, Default)]
pub struct QName {
    namespace: String,
    local_part: String,
    prefix: String,
}

impl QName {
    pub fn new(namespace: impl Into<String>, local_part: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            local_part: local_part.into(),
            prefix: String::new(),
        }
    }

    pub fn with_prefix(
        namespace: impl Into<String>,
        local_part: impl Into<String>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            local_part: local_part.into(),
            prefix: prefix.into(),
        }
    }

    /// A name without namespace.
    pub fn local(local_part: impl Into<String>) -> Self {
        Self::new("", local_part)
    }

    /// Namespace URI, empty when the name is not namespaced.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn local_part(&self) -> &str {
        &self.local_part
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn has_namespace(&self) -> bool {
        !self.namespace.is_empty()
    }

    /// `prefix:local`, or just `local` when unprefixed.
    pub fn prefixed_name(&self) -> String {
        if self.prefix.is_empty() {
            self.local_part.clone()
        } else {
            format!("{}:{}", self.prefix, self.local_part)
        }
    }
}

impl PartialEq for QName {
    fn eq(&self, other: &Self) -> bool {
        self.namespace == other.namespace && self.local_part == other.local_part
    }
}

impl Eq for QName {}

impl Hash for QName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.namespace.hash(state);
        self.local_part.hash(state);
    }
}

/// Renders `{namespace}local`, or `local` without namespace.
impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            f.write_str(&self.local_part)
        } else {
            write!(f, "{{{}}}{}", self.namespace, self.local_part)
        }
    }
}

/// Parses the `{namespace}local` notation produced by `Display`.
impl FromStr for QName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("qualified name must not be empty".to_string());
        }
        match s.strip_prefix('{') {
            Some(rest) => {
                let (namespace, local) = rest
                    .split_once('}')
                    .ok_or_else(|| format!("missing closing brace in '{}'", s))?;
                if local.is_empty() {
                    return Err(format!("missing local part in '{}'", s));
                }
                Ok(QName::new(namespace, local))
            }
            None => Ok(QName::local(s)),
        }
    }
}

/// An attribute on a start element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: QName,
    pub value: String,
}

impl Attribute {
    pub fn new(name: QName, value: impl Into<String>) -> Self {
        Self {
            name,
            value: value.into(),
        }
    }
}

/// A namespace declaration; an empty prefix declares the default namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    pub prefix: String,
    pub uri: String,
}

impl Namespace {
    pub fn new(prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            uri: uri.into(),
        }
    }
}

/// Pull-parser event.
#[derive(Debug, Clone, PartialEq)]
pub enum XmlEvent {
    StartDocument,
    EndDocument,
    StartElement {
        name: QName,
        attributes: Vec<Attribute>,
        namespaces: Vec<Namespace>,
    },
    EndElement {
        name: QName,
    },
    Characters(String),
    CData(String),
    Comment(String),
}

impl XmlEvent {
    /// Start element without attributes or declarations.
    pub fn start(name: QName) -> Self {
        XmlEvent::StartElement {
            name,
            attributes: Vec::new(),
            namespaces: Vec::new(),
        }
    }

    pub fn end(name: QName) -> Self {
        XmlEvent::EndElement { name }
    }

    pub fn characters(text: impl Into<String>) -> Self {
        XmlEvent::Characters(text.into())
    }

    pub fn is_start_document(&self) -> bool {
        matches!(self, XmlEvent::StartDocument)
    }

    pub fn is_end_document(&self) -> bool {
        matches!(self, XmlEvent::EndDocument)
    }

    pub fn is_start_element(&self) -> bool {
        matches!(self, XmlEvent::StartElement { .. })
    }

    pub fn is_end_element(&self) -> bool {
        matches!(self, XmlEvent::EndElement { .. })
    }

    /// Whitespace-only character data.
    pub fn is_whitespace(&self) -> bool {
        match self {
            XmlEvent::Characters(text) => text.chars().all(char::is_whitespace),
            _ => false,
        }
    }

    /// Events that carry no structure: whitespace and comments.
    pub fn is_ignorable(&self) -> bool {
        self.is_whitespace() || matches!(self, XmlEvent::Comment(_))
    }

    /// Element name of a start or end element.
    pub fn element_name(&self) -> Option<&QName> {
        match self {
            XmlEvent::StartElement { name, .. } | XmlEvent::EndElement { name } => Some(name),
            _ => None,
        }
    }
}

/// Stack of in-scope namespace bindings.
#[derive(Debug, Clone, Default)]
pub struct NamespaceScope {
    frames: Vec<Vec<Namespace>>,
}

impl NamespaceScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a scope with the given declarations.
    pub fn push(&mut self, declarations: &[Namespace]) {
        self.frames.push(declarations.to_vec());
    }

    pub fn pop(&mut self) {
        self.frames.pop();
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Add a binding to the innermost scope.
    pub fn declare(&mut self, namespace: Namespace) {
        match self.frames.last_mut() {
            Some(frame) => frame.push(namespace),
            None => self.frames.push(vec![namespace]),
        }
    }

    /// URI bound to `prefix`; the empty prefix resolves the default namespace.
    pub fn uri_for(&self, prefix: &str) -> Option<&str> {
        if prefix == "xml" {
            return Some(XML_NS);
        }
        self.frames
            .iter()
            .rev()
            .flat_map(|frame| frame.iter().rev())
            .find(|ns| ns.prefix == prefix)
            .map(|ns| ns.uri.as_str())
    }

    /// A prefix currently bound to `uri`, innermost first. Shadowed bindings are skipped.
    pub fn prefix_for(&self, uri: &str) -> Option<&str> {
        if uri == XML_NS {
            return Some("xml");
        }
        self.frames
            .iter()
            .rev()
            .flat_map(|frame| frame.iter().rev())
            .filter(|ns| ns.uri == uri)
            .map(|ns| ns.prefix.as_str())
            .find(|prefix| self.uri_for(prefix) == Some(uri))
    }

    pub fn is_bound(&self, prefix: &str, uri: &str) -> bool {
        match self.uri_for(prefix) {
            Some(bound) => bound == uri,
            None => prefix.is_empty() && uri.is_empty(),
        }
    }

    /// Resolve a `prefix:local` value (e.g. a fault code) against the scope.
    pub fn resolve_qname(&self, value: &str) -> Option<QName> {
        let value = value.trim();
        match value.split_once(':') {
            Some((prefix, local)) => self
                .uri_for(prefix)
                .map(|uri| QName::with_prefix(uri, local, prefix)),
            None => Some(QName::new(self.uri_for("").unwrap_or(""), value)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_qname_equality_ignores_prefix() {
        let a = QName::with_prefix("urn:a", "Item", "a");
        let b = QName::with_prefix("urn:a", "Item", "other");
        assert_eq!(a, b);
        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
        assert_ne!(QName::new("urn:a", "Item"), QName::new("urn:b", "Item"));
    }

    #[test]
    fn test_qname_display_and_parse() {
        let name = QName::new("urn:example", "GetPrice");
        assert_eq!(name.to_string(), "{urn:example}GetPrice");
        let parsed: QName = "{urn:example}GetPrice".parse().unwrap();
        assert_eq!(parsed, name);
        let plain: QName = "Local".parse().unwrap();
        assert!(!plain.has_namespace());
        assert!("{urn:broken".parse::<QName>().is_err());
        assert!("".parse::<QName>().is_err());
    }

    #[test]
    fn test_scope_shadowing() {
        let mut scope = NamespaceScope::new();
        scope.push(&[Namespace::new("p", "urn:outer")]);
        scope.push(&[Namespace::new("p", "urn:inner")]);
        assert_eq!(scope.uri_for("p"), Some("urn:inner"));
        assert_eq!(scope.prefix_for("urn:outer"), None);
        scope.pop();
        assert_eq!(scope.uri_for("p"), Some("urn:outer"));
        assert_eq!(scope.prefix_for("urn:outer"), Some("p"));
        assert_eq!(scope.uri_for("xml"), Some(XML_NS));
    }

    #[test]
    fn test_resolve_prefixed_value() {
        let mut scope = NamespaceScope::new();
        scope.push(&[Namespace::new("soap", "urn:env")]);
        let code = scope.resolve_qname(" soap:Client ").unwrap();
        assert_eq!(code, QName::new("urn:env", "Client"));
        assert_eq!(code.prefix(), "soap");
        assert!(scope.resolve_qname("unknown:Client").is_none());
    }

    #[test]
    fn test_whitespace_events() {
        assert!(XmlEvent::characters(" \n\t").is_whitespace());
        assert!(!XmlEvent::characters(" x ").is_whitespace());
        assert!(XmlEvent::Comment("c".into()).is_ignorable());
    }
}
