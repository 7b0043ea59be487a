//! Qualified and expanded names.
//!
//! Lexical names ([`QName`]) keep their prefix for display purposes only;
//! identity always goes through [`ExpandedName`], which pairs an optional
//! namespace URI with a local part. Expanded names render in Clark notation
//! (`{uri}local`) and also parse the EQName form `Q{uri}local`.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::XML_NAMESPACE;
use crate::error::XdmError;

/// A lexical qualified name: optional prefix plus local part.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QName {
    pub prefix: Option<String>,
    pub local: String,
}

impl QName {
    pub fn new(local: impl Into<String>) -> Self {
        Self {
            prefix: None,
            local: local.into(),
        }
    }

    pub fn with_prefix(prefix: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
            local: local.into(),
        }
    }

    /// Splits a lexical QName on its colon, validating both halves as
    /// NCNames.
    pub fn parse(lexical: &str) -> Result<Self, XdmError> {
        match lexical.split_once(':') {
            Some((prefix, local)) => {
                if is_ncname(prefix) && is_ncname(local) {
                    Ok(QName::with_prefix(prefix, local))
                } else {
                    Err(XdmError::InvalidName(lexical.to_string()))
                }
            }
            None => {
                if is_ncname(lexical) {
                    Ok(QName::new(lexical))
                } else {
                    Err(XdmError::InvalidName(lexical.to_string()))
                }
            }
        }
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.prefix {
            Some(p) => write!(f, "{}:{}", p, self.local),
            None => write!(f, "{}", self.local),
        }
    }
}

pub fn is_ncname(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '.')
}

/// Namespace-URI plus local-name pair; the identity of every named thing in
/// the engine. The lexical prefix is not part of identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExpandedName {
    pub uri: Option<String>,
    pub local: String,
}

impl ExpandedName {
    pub fn local(local: impl Into<String>) -> Self {
        Self {
            uri: None,
            local: local.into(),
        }
    }

    pub fn new(uri: impl Into<String>, local: impl Into<String>) -> Self {
        let uri = uri.into();
        Self {
            uri: if uri.is_empty() { None } else { Some(uri) },
            local: local.into(),
        }
    }

    /// Clark notation: `{uri}local`, or just `local` with no namespace.
    pub fn clark(&self) -> String {
        match &self.uri {
            Some(uri) => format!("{{{}}}{}", uri, self.local),
            None => self.local.clone(),
        }
    }

    /// Parses Clark notation produced by [`ExpandedName::clark`].
    pub fn parse_clark(s: &str) -> Result<Self, XdmError> {
        if let Some(rest) = s.strip_prefix('{') {
            let (uri, local) = rest
                .split_once('}')
                .ok_or_else(|| XdmError::InvalidName(s.to_string()))?;
            if local.is_empty() {
                return Err(XdmError::InvalidName(s.to_string()));
            }
            Ok(ExpandedName::new(uri, local))
        } else {
            Ok(ExpandedName::local(s))
        }
    }

    /// Parses the EQName form `Q{uri}local`.
    pub fn parse_eqname(s: &str) -> Result<Self, XdmError> {
        let rest = s
            .strip_prefix('Q')
            .ok_or_else(|| XdmError::InvalidName(s.to_string()))?;
        if !rest.starts_with('{') {
            return Err(XdmError::InvalidName(s.to_string()));
        }
        Self::parse_clark(rest)
    }

    pub fn uri_str(&self) -> &str {
        self.uri.as_deref().unwrap_or("")
    }
}

impl fmt::Display for ExpandedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.clark())
    }
}

/// Immutable prefix-to-URI bindings. The `xml` prefix is always bound.
/// Cheap to share via `Rc`; `bind` derives a new set.
#[derive(Debug, Clone, PartialEq)]
pub struct Namespaces {
    bindings: HashMap<String, String>,
    default_element: Option<String>,
}

impl Default for Namespaces {
    fn default() -> Self {
        let mut bindings = HashMap::new();
        bindings.insert("xml".to_string(), XML_NAMESPACE.to_string());
        Self {
            bindings,
            default_element: None,
        }
    }
}

impl Namespaces {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        self.bindings.insert(prefix.into(), uri.into());
        self
    }

    pub fn with_default_element(mut self, uri: impl Into<String>) -> Self {
        self.default_element = Some(uri.into());
        self
    }

    pub fn resolve(&self, prefix: &str) -> Option<&str> {
        self.bindings.get(prefix).map(String::as_str)
    }

    pub fn bindings(&self) -> impl Iterator<Item = (&str, &str)> {
        self.bindings
            .iter()
            .map(|(prefix, uri)| (prefix.as_str(), uri.as_str()))
    }

    pub fn default_element(&self) -> Option<&str> {
        self.default_element.as_deref()
    }

    /// Expands a lexical QName against these bindings. Unprefixed names get
    /// the default namespace when `use_default` is set (element name tests),
    /// no namespace otherwise (attributes, functions, variables).
    pub fn expand(&self, qname: &QName, use_default: bool) -> Result<ExpandedName, XdmError> {
        match &qname.prefix {
            Some(prefix) => match self.resolve(prefix) {
                Some(uri) => Ok(ExpandedName::new(uri, qname.local.clone())),
                None => Err(XdmError::InvalidName(format!(
                    "no namespace bound to prefix '{}'",
                    prefix
                ))),
            },
            None => {
                if use_default {
                    if let Some(uri) = self.default_element() {
                        return Ok(ExpandedName::new(uri, qname.local.clone()));
                    }
                }
                Ok(ExpandedName::local(qname.local.clone()))
            }
        }
    }

    pub fn into_rc(self) -> Rc<Namespaces> {
        Rc::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clark_round_trip() {
        let name = ExpandedName::new("http://example.com/ns", "item");
        assert_eq!(name.clark(), "{http://example.com/ns}item");
        assert_eq!(ExpandedName::parse_clark(&name.clark()).unwrap(), name);
    }

    #[test]
    fn clark_without_namespace() {
        let name = ExpandedName::local("item");
        assert_eq!(name.clark(), "item");
        assert_eq!(ExpandedName::parse_clark("item").unwrap(), name);
    }

    #[test]
    fn eqname_form() {
        let name = ExpandedName::parse_eqname("Q{http://x}k").unwrap();
        assert_eq!(name, ExpandedName::new("http://x", "k"));
        assert!(ExpandedName::parse_eqname("{http://x}k").is_err());
    }

    #[test]
    fn prefix_is_not_identity() {
        let ns = Namespaces::new().bind("p", "http://x").bind("q", "http://x");
        let a = ns.expand(&QName::with_prefix("p", "k"), false).unwrap();
        let b = ns.expand(&QName::with_prefix("q", "k"), false).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn unbound_prefix_is_an_error() {
        let ns = Namespaces::new();
        assert!(ns.expand(&QName::with_prefix("nope", "k"), false).is_err());
    }

    #[test]
    fn xml_prefix_is_prebound() {
        let ns = Namespaces::new();
        assert_eq!(ns.resolve("xml"), Some(crate::XML_NAMESPACE));
    }
}
