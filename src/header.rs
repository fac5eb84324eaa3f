//! SOAP header and header elements.

use crate::event::{Attribute, Namespace, QName, XmlEvent};
use crate::tree::Element;
use crate::version::{SoapVersion, SOAP_12_ULTIMATE_RECEIVER_ROLE};

/// The `Header` of an envelope. Header elements keep insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct SoapHeader {
    version: SoapVersion,
    name: QName,
    attributes: Vec<Attribute>,
    namespaces: Vec<Namespace>,
    elements: Vec<Element>,
}

impl SoapHeader {
    pub fn new(version: SoapVersion) -> Self {
        Self {
            version,
            name: version.header_name(),
            attributes: Vec::new(),
            namespaces: Vec::new(),
            elements: Vec::new(),
        }
    }

    /// Header read from input, keeping the start tag as written.
    pub(crate) fn parsed(
        version: SoapVersion,
        name: QName,
        attributes: Vec<Attribute>,
        namespaces: Vec<Namespace>,
        elements: Vec<Element>,
    ) -> Self {
        Self {
            version,
            name,
            attributes,
            namespaces,
            elements,
        }
    }

    pub fn name(&self) -> &QName {
        &self.name
    }

    pub fn version(&self) -> SoapVersion {
        self.version
    }

    /// Append a new, empty header element.
    pub fn add_header_element(&mut self, name: QName) -> SoapHeaderElement<'_> {
        self.elements.push(Element::new(name));
        let last = self.elements.len() - 1;
        SoapHeaderElement {
            version: self.version,
            element: &mut self.elements[last],
        }
    }

    /// Append a ready-made header element.
    pub fn push_header_element(&mut self, element: Element) {
        self.elements.push(element);
    }

    pub fn header_elements(&self) -> impl Iterator<Item = &Element> {
        self.elements.iter()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Header elements with the given name, in document order.
    pub fn examine_header_elements<'a>(
        &'a self,
        name: &'a QName,
    ) -> impl Iterator<Item = &'a Element> {
        self.elements.iter().filter(move |e| &e.name == name)
    }

    /// Mutable access to the header elements with the given name.
    pub fn header_elements_mut<'a>(
        &'a mut self,
        name: &'a QName,
    ) -> impl Iterator<Item = SoapHeaderElement<'a>> {
        let version = self.version;
        self.elements
            .iter_mut()
            .filter(move |e| &e.name == name)
            .map(move |element| SoapHeaderElement { version, element })
    }

    /// Remove every header element with the given name; returns how many were removed.
    pub fn remove_header_elements(&mut self, name: &QName) -> usize {
        let before = self.elements.len();
        self.elements.retain(|e| &e.name != name);
        before - self.elements.len()
    }

    pub fn is_must_understand(&self, element: &Element) -> bool {
        element
            .attribute(&self.version.must_understand_attribute_name())
            .map(|value| self.version.parse_must_understand(value))
            .unwrap_or(false)
    }

    pub fn actor_or_role<'e>(&self, element: &'e Element) -> Option<&'e str> {
        element.attribute(&self.version.actor_or_role_attribute_name())
    }

    /// Header elements marked mustUnderstand that target this node.
    ///
    /// An element targets this node when it has no actor/role, uses the
    /// "next" actor/role, uses the SOAP 1.2 ultimate receiver role, or uses
    /// one of `roles`.
    pub fn examine_must_understand_header_elements<'a>(
        &'a self,
        roles: &'a [&'a str],
    ) -> impl Iterator<Item = &'a Element> {
        self.elements.iter().filter(move |element| {
            if !self.is_must_understand(element) {
                return false;
            }
            match self.actor_or_role(element) {
                None => true,
                Some(role) => {
                    role == self.version.next_actor_or_role_uri()
                        || (self.version == SoapVersion::Soap12
                            && role == SOAP_12_ULTIMATE_RECEIVER_ROLE)
                        || roles.contains(&role)
                }
            }
        })
    }

    /// `Header` start tag, every header element, `Header` end tag.
    pub fn to_events(&self) -> Vec<XmlEvent> {
        let mut events = vec![XmlEvent::StartElement {
            name: self.name.clone(),
            attributes: self.attributes.clone(),
            namespaces: self.namespaces.clone(),
        }];
        for element in &self.elements {
            element.write_events(&mut events);
        }
        events.push(XmlEvent::end(self.name.clone()));
        events
    }
}

/// Mutable view of one header element.
pub struct SoapHeaderElement<'a> {
    version: SoapVersion,
    element: &'a mut Element,
}

impl SoapHeaderElement<'_> {
    pub fn name(&self) -> &QName {
        &self.element.name
    }

    pub fn set_must_understand(&mut self, must_understand: bool) -> &mut Self {
        let value = self.version.must_understand_value(must_understand);
        self.element
            .set_attribute(self.version.must_understand_attribute_name(), value);
        self
    }

    pub fn set_actor_or_role(&mut self, actor_or_role: impl Into<String>) -> &mut Self {
        self.element
            .set_attribute(self.version.actor_or_role_attribute_name(), actor_or_role);
        self
    }

    pub fn set_text(&mut self, text: impl Into<String>) -> &mut Self {
        self.element.set_text(text);
        self
    }

    pub fn element(&self) -> &Element {
        &*self.element
    }

    pub fn element_mut(&mut self) -> &mut Element {
        &mut *self.element
    }
}
