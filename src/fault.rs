//! SOAP faults for both protocol versions.

use crate::error::SoapError;
use crate::event::{NamespaceScope, QName, XML_NS};
use crate::tree::Element;
use crate::version::SoapVersion;

/// Language used for SOAP 1.2 reason texts when none is given.
pub const DEFAULT_FAULT_LANGUAGE: &str = "en";

fn xml_lang() -> QName {
    QName::with_prefix(XML_NS, "lang", "xml")
}

/// Application-specific fault information.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FaultDetail {
    entries: Vec<Element>,
}

impl FaultDetail {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a detail entry and return it for population.
    pub fn add_entry(&mut self, name: QName) -> &mut Element {
        self.entries.push(Element::new(name));
        let last = self.entries.len() - 1;
        &mut self.entries[last]
    }

    pub fn push_entry(&mut self, entry: Element) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[Element] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn to_element(&self, name: QName) -> Element {
        let mut element = Element::new(name);
        for entry in &self.entries {
            element.add_child(entry.clone());
        }
        element
    }

    fn from_element(element: &Element) -> Self {
        Self {
            entries: element.child_elements().cloned().collect(),
        }
    }
}

/// SOAP 1.1 fault: code, single fault string, optional actor and detail.
#[derive(Debug, Clone, PartialEq)]
pub struct Soap11Fault {
    code: QName,
    fault_string: String,
    locale: Option<String>,
    actor: Option<String>,
    detail: Option<FaultDetail>,
}

impl Soap11Fault {
    pub fn new(code: QName, fault_string: impl Into<String>, locale: Option<&str>) -> Self {
        Self {
            code,
            fault_string: fault_string.into(),
            locale: locale.map(str::to_string),
            actor: None,
            detail: None,
        }
    }

    pub fn fault_code(&self) -> &QName {
        &self.code
    }

    pub fn fault_string(&self) -> &str {
        &self.fault_string
    }

    /// Language of the fault string, if one was given.
    pub fn fault_string_locale(&self) -> Option<&str> {
        self.locale.as_deref()
    }

    pub fn fault_actor(&self) -> Option<&str> {
        self.actor.as_deref()
    }

    pub fn set_fault_actor(&mut self, actor: impl Into<String>) {
        self.actor = Some(actor.into());
    }

    fn to_element(&self, version: SoapVersion) -> Element {
        let mut fault = Element::new(version.fault_name());
        fault.add_child(code_element(QName::local("faultcode"), &self.code, version));

        let string = fault.add_child(Element::with_text(
            QName::local("faultstring"),
            self.fault_string.clone(),
        ));
        if let Some(locale) = &self.locale {
            string.set_attribute(xml_lang(), locale.clone());
        }
        if let Some(actor) = &self.actor {
            fault.add_child(Element::with_text(QName::local("faultactor"), actor.clone()));
        }
        if let Some(detail) = &self.detail {
            fault.add_child(detail.to_element(QName::local("detail")));
        }
        fault
    }

    fn from_element(element: &Element, scope: &mut NamespaceScope) -> Result<Self, SoapError> {
        let code_element = required_child(element, "faultcode")?;
        let code = resolve_code(code_element, scope)?;
        let string_element = required_child(element, "faultstring")?;
        Ok(Self {
            code,
            fault_string: string_element.text(),
            locale: string_element.attribute(&xml_lang()).map(str::to_string),
            actor: child_local(element, "faultactor").map(Element::text),
            detail: child_local(element, "detail").map(FaultDetail::from_element),
        })
    }
}

/// SOAP 1.2 fault: code with subcodes, language-tagged reasons, node, role and detail.
#[derive(Debug, Clone, PartialEq)]
pub struct Soap12Fault {
    code: QName,
    subcodes: Vec<QName>,
    reasons: Vec<(String, String)>,
    node: Option<String>,
    role: Option<String>,
    detail: Option<FaultDetail>,
}

impl Soap12Fault {
    pub fn new(code: QName, reason: impl Into<String>, language: Option<&str>) -> Self {
        Self {
            code,
            subcodes: Vec::new(),
            reasons: vec![(
                language.unwrap_or(DEFAULT_FAULT_LANGUAGE).to_string(),
                reason.into(),
            )],
            node: None,
            role: None,
            detail: None,
        }
    }

    pub fn fault_code(&self) -> &QName {
        &self.code
    }

    pub fn fault_subcodes(&self) -> &[QName] {
        &self.subcodes
    }

    /// Append a subcode below the innermost existing one.
    pub fn add_fault_subcode(&mut self, subcode: QName) {
        self.subcodes.push(subcode);
    }

    /// Reason text for a language tag, compared case-insensitively.
    pub fn fault_reason_text(&self, language: &str) -> Option<&str> {
        self.reasons
            .iter()
            .find(|(lang, _)| lang.eq_ignore_ascii_case(language))
            .map(|(_, text)| text.as_str())
    }

    /// Set the reason for one language, replacing an existing text in that language.
    pub fn set_fault_reason_text(&mut self, language: &str, text: impl Into<String>) {
        let text = text.into();
        match self
            .reasons
            .iter_mut()
            .find(|(lang, _)| lang.eq_ignore_ascii_case(language))
        {
            Some((_, existing)) => *existing = text,
            None => self.reasons.push((language.to_string(), text)),
        }
    }

    pub fn fault_reason_languages(&self) -> impl Iterator<Item = &str> {
        self.reasons.iter().map(|(lang, _)| lang.as_str())
    }

    pub fn fault_node(&self) -> Option<&str> {
        self.node.as_deref()
    }

    pub fn set_fault_node(&mut self, node: impl Into<String>) {
        self.node = Some(node.into());
    }

    pub fn fault_role(&self) -> Option<&str> {
        self.role.as_deref()
    }

    pub fn set_fault_role(&mut self, role: impl Into<String>) {
        self.role = Some(role.into());
    }

    fn to_element(&self, version: SoapVersion) -> Element {
        let ns = version.envelope_namespace();
        let prefix = version.prefix();
        let name = |local: &str| QName::with_prefix(ns, local, prefix);

        let mut fault = Element::new(version.fault_name());

        let mut code = Element::new(name("Code"));
        code.add_child(code_element(name("Value"), &self.code, version));
        // subcodes nest: Code/Subcode/Subcode/...
        let mut nested: Option<Element> = None;
        for subcode in self.subcodes.iter().rev() {
            let mut element = Element::new(name("Subcode"));
            element.add_child(code_element(name("Value"), subcode, version));
            if let Some(inner) = nested.take() {
                element.add_child(inner);
            }
            nested = Some(element);
        }
        if let Some(subcode) = nested {
            code.add_child(subcode);
        }
        fault.add_child(code);

        let reason = fault.add_child(Element::new(name("Reason")));
        for (lang, text) in &self.reasons {
            let text_element = reason.add_child(Element::with_text(name("Text"), text.clone()));
            text_element.set_attribute(xml_lang(), lang.clone());
        }
        if let Some(node) = &self.node {
            fault.add_child(Element::with_text(name("Node"), node.clone()));
        }
        if let Some(role) = &self.role {
            fault.add_child(Element::with_text(name("Role"), role.clone()));
        }
        if let Some(detail) = &self.detail {
            fault.add_child(detail.to_element(name("Detail")));
        }
        fault
    }

    fn from_element(element: &Element, scope: &mut NamespaceScope) -> Result<Self, SoapError> {
        let code_element = required_child(element, "Code")?;
        scope.push(&code_element.namespaces);
        let codes = read_codes(code_element, scope);
        scope.pop();
        let (code, subcodes) = codes?;

        let reasons: Vec<(String, String)> = required_child(element, "Reason")?
            .child_elements()
            .filter(|e| e.name.local_part() == "Text")
            .map(|e| {
                let lang = e
                    .attribute(&xml_lang())
                    .unwrap_or(DEFAULT_FAULT_LANGUAGE)
                    .to_string();
                (lang, e.text())
            })
            .collect();
        if reasons.is_empty() {
            return Err(SoapError::InvalidEnvelope(
                "SOAP 1.2 fault reason has no text".to_string(),
            ));
        }

        Ok(Self {
            code,
            subcodes,
            reasons,
            node: child_local(element, "Node").map(Element::text),
            role: child_local(element, "Role").map(Element::text),
            detail: child_local(element, "Detail").map(FaultDetail::from_element),
        })
    }
}

/// A fault of either SOAP version.
#[derive(Debug, Clone, PartialEq)]
pub enum SoapFault {
    Soap11(Soap11Fault),
    Soap12(Soap12Fault),
}

impl SoapFault {
    /// Create a fault in the shape `version` requires.
    pub fn new(version: SoapVersion, code: QName, reason: impl Into<String>, locale: Option<&str>) -> Self {
        match version {
            SoapVersion::Soap11 => Self::Soap11(Soap11Fault::new(code, reason, locale)),
            SoapVersion::Soap12 => Self::Soap12(Soap12Fault::new(code, reason, locale)),
        }
    }

    pub fn version(&self) -> SoapVersion {
        match self {
            Self::Soap11(_) => SoapVersion::Soap11,
            Self::Soap12(_) => SoapVersion::Soap12,
        }
    }

    pub fn fault_code(&self) -> &QName {
        match self {
            Self::Soap11(f) => f.fault_code(),
            Self::Soap12(f) => f.fault_code(),
        }
    }

    /// The 1.1 fault string, or the first 1.2 reason text.
    pub fn fault_string_or_reason(&self) -> &str {
        match self {
            Self::Soap11(f) => f.fault_string(),
            Self::Soap12(f) => f.reasons.first().map(|(_, text)| text.as_str()).unwrap_or(""),
        }
    }

    pub fn fault_actor_or_role(&self) -> Option<&str> {
        match self {
            Self::Soap11(f) => f.fault_actor(),
            Self::Soap12(f) => f.fault_role(),
        }
    }

    pub fn set_fault_actor_or_role(&mut self, actor_or_role: impl Into<String>) {
        match self {
            Self::Soap11(f) => f.set_fault_actor(actor_or_role),
            Self::Soap12(f) => f.set_fault_role(actor_or_role),
        }
    }

    pub fn fault_detail(&self) -> Option<&FaultDetail> {
        match self {
            Self::Soap11(f) => f.detail.as_ref(),
            Self::Soap12(f) => f.detail.as_ref(),
        }
    }

    /// The fault detail, created empty on first use.
    pub fn add_fault_detail(&mut self) -> &mut FaultDetail {
        let detail = match self {
            Self::Soap11(f) => &mut f.detail,
            Self::Soap12(f) => &mut f.detail,
        };
        detail.get_or_insert_with(FaultDetail::new)
    }

    pub fn as_soap11(&self) -> Option<&Soap11Fault> {
        match self {
            Self::Soap11(f) => Some(f),
            Self::Soap12(_) => None,
        }
    }

    pub fn as_soap12(&self) -> Option<&Soap12Fault> {
        match self {
            Self::Soap12(f) => Some(f),
            Self::Soap11(_) => None,
        }
    }

    pub fn as_soap12_mut(&mut self) -> Option<&mut Soap12Fault> {
        match self {
            Self::Soap12(f) => Some(f),
            Self::Soap11(_) => None,
        }
    }

    /// The `Fault` element as it appears in the body.
    pub fn to_element(&self) -> Element {
        match self {
            Self::Soap11(f) => f.to_element(SoapVersion::Soap11),
            Self::Soap12(f) => f.to_element(SoapVersion::Soap12),
        }
    }

    /// Read a `Fault` element. `scope` holds the bindings in effect at the element.
    pub fn from_element(
        version: SoapVersion,
        element: &Element,
        scope: &mut NamespaceScope,
    ) -> Result<Self, SoapError> {
        scope.push(&element.namespaces);
        let fault = match version {
            SoapVersion::Soap11 => Soap11Fault::from_element(element, scope).map(Self::Soap11),
            SoapVersion::Soap12 => Soap12Fault::from_element(element, scope).map(Self::Soap12),
        };
        scope.pop();
        fault
    }
}

/// Element whose text is a prefixed fault code, declaring the prefix it uses.
fn code_element(name: QName, code: &QName, version: SoapVersion) -> Element {
    let prefix = if code.namespace() == version.envelope_namespace() {
        version.prefix().to_string()
    } else if !code.prefix().is_empty() {
        code.prefix().to_string()
    } else {
        "fc".to_string()
    };
    if code.has_namespace() {
        let mut element = Element::with_text(name, format!("{}:{}", prefix, code.local_part()));
        element.declare_namespace(prefix, code.namespace());
        element
    } else {
        Element::with_text(name, code.local_part())
    }
}

/// Read `Value` and the nested `Subcode/Value` chain of a SOAP 1.2 `Code`.
fn read_codes(
    code_element: &Element,
    scope: &mut NamespaceScope,
) -> Result<(QName, Vec<QName>), SoapError> {
    let code = resolve_code(required_child(code_element, "Value")?, scope)?;
    let mut subcodes = Vec::new();
    let mut pushed = 0;
    let mut current = child_local(code_element, "Subcode");
    let result = loop {
        let Some(subcode) = current else {
            break Ok(());
        };
        scope.push(&subcode.namespaces);
        pushed += 1;
        match required_child(subcode, "Value").and_then(|value| resolve_code(value, scope)) {
            Ok(value) => subcodes.push(value),
            Err(e) => break Err(e),
        }
        current = child_local(subcode, "Subcode");
    };
    for _ in 0..pushed {
        scope.pop();
    }
    result.map(|_| (code, subcodes))
}

fn resolve_code(element: &Element, scope: &mut NamespaceScope) -> Result<QName, SoapError> {
    scope.push(&element.namespaces);
    let text = element.text();
    let code = scope.resolve_qname(&text);
    scope.pop();
    code.ok_or_else(|| {
        SoapError::InvalidEnvelope(format!("fault code '{}' uses an unbound prefix", text.trim()))
    })
}

fn child_local<'a>(element: &'a Element, local: &str) -> Option<&'a Element> {
    element.child_elements().find(|e| e.name.local_part() == local)
}

fn required_child<'a>(element: &'a Element, local: &str) -> Result<&'a Element, SoapError> {
    child_local(element, local).ok_or_else(|| {
        SoapError::InvalidEnvelope(format!(
            "{} element is missing its {} child",
            element.name.local_part(),
            local
        ))
    })
}
