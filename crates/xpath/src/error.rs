//! Evaluation errors.
//!
//! Every variant that corresponds to a W3C-defined condition reports its
//! error code through [`XPathError::code`]; the codes are part of the
//! engine's external contract. Type errors carry the required and supplied
//! type descriptors for diagnostics.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum XPathError {
    #[error("Parse error in '{expression}': {message}")]
    Parse { expression: String, message: String },

    #[error("Type error: {message}")]
    Type {
        message: String,
        required: Option<String>,
        supplied: Option<String>,
    },

    #[error("Cannot coerce value: {message} (required {required}, supplied {supplied})")]
    Coercion {
        message: String,
        required: String,
        supplied: String,
    },

    #[error("Context item is required but not set")]
    NoContextItem,

    #[error("Unknown function {name}#{arity}")]
    UnknownFunction { name: String, arity: usize },

    #[error("Variable '${name}' not found")]
    UnknownVariable { name: String },

    #[error("Path result mixes nodes and atomic values")]
    MixedPathResult,

    #[error("Path step applied to a non-node value")]
    PathOnNonNode,

    #[error("Cannot cast '{value}' to {target}")]
    InvalidCastValue { value: String, target: String },

    #[error("Invalid lexical value: {0}")]
    InvalidLexicalValue(String),

    #[error("Division by zero")]
    DivisionByZero,

    #[error("No effective boolean value for {type_name}")]
    NoEffectiveBoolean { type_name: String },

    #[error("Cardinality error: expected {expected}, got {actual} items")]
    Cardinality { expected: String, actual: usize },

    #[error("Invalid QName '{0}'")]
    InvalidQName(String),

    #[error("No namespace bound to prefix '{0}'")]
    NoNamespaceForPrefix(String),

    #[error("Operands carry conflicting timezones")]
    TimezoneConflict,

    #[error("Array index {index} out of bounds (size: {size})")]
    ArrayIndexOutOfBounds { index: i64, size: usize },

    #[error("Codepoint not a valid XML character")]
    InvalidCodepoint,

    #[error("Unsupported normalization form '{0}'")]
    UnsupportedNormalization(String),

    #[error("Unknown collation '{0}'")]
    UnknownCollation(String),

    // XSLT dynamic errors surfaced by the function library
    #[error("Circular reference while evaluating key '{0}'")]
    KeyCycle(String),

    #[error("Unknown key '{0}'")]
    UnknownKey(String),

    #[error("Unknown decimal format '{0}'")]
    UnknownDecimalFormat(String),

    #[error("Invalid system property name '{0}'")]
    InvalidSystemProperty(String),

    #[error("Invalid name '{0}' for availability test")]
    InvalidAvailabilityName(String),

    #[error("Unknown accumulator '{0}'")]
    UnknownAccumulator(String),

    // resource retrieval
    #[error("Cannot retrieve '{uri}': {message}")]
    DocumentLoad { uri: String, message: String },

    #[error("Cannot parse XML: {0}")]
    XmlParse(String),

    #[error("Cannot read unparsed text '{uri}': {message}")]
    UnparsedText { uri: String, message: String },

    #[error("Cannot decode '{uri}' as {encoding}")]
    UnparsedTextEncoding { uri: String, encoding: String },

    // pictures
    #[error("Invalid picture '{picture}': {message}")]
    InvalidPicture { picture: String, message: String },

    // JSON
    #[error("Invalid JSON: {0}")]
    JsonParse(String),

    #[error("Duplicate JSON key '{0}'")]
    JsonDuplicateKey(String),

    #[error("Invalid JSON options: {0}")]
    JsonOptions(String),

    #[error("Cannot serialize to JSON: {0}")]
    JsonWrite(String),

    // regular expressions
    #[error("Invalid regular expression '{pattern}': {message}")]
    RegexSyntax { pattern: String, message: String },

    #[error("Invalid regular expression flags '{0}'")]
    RegexFlags(String),

    #[error("Error raised by fn:error: {code}: {message}")]
    Raised { code: String, message: String },

    #[error("Dynamic error [{code}]: {message}")]
    Dynamic { code: String, message: String },
}

impl XPathError {
    pub fn type_error(message: impl Into<String>) -> Self {
        XPathError::Type {
            message: message.into(),
            required: None,
            supplied: None,
        }
    }

    pub fn type_mismatch(
        message: impl Into<String>,
        required: impl Into<String>,
        supplied: impl Into<String>,
    ) -> Self {
        XPathError::Type {
            message: message.into(),
            required: Some(required.into()),
            supplied: Some(supplied.into()),
        }
    }

    pub fn parse(expression: impl Into<String>, message: impl Into<String>) -> Self {
        XPathError::Parse {
            expression: expression.into(),
            message: message.into(),
        }
    }

    pub fn dynamic(code: impl Into<String>, message: impl Into<String>) -> Self {
        XPathError::Dynamic {
            code: code.into(),
            message: message.into(),
        }
    }

    /// The W3C error code this condition surfaces at the boundary.
    pub fn code(&self) -> &str {
        match self {
            XPathError::Parse { .. } => "XPST0003",
            XPathError::Type { .. } => "XPTY0004",
            XPathError::Coercion { .. } => "XTTE0505",
            XPathError::NoContextItem => "XPDY0002",
            XPathError::UnknownFunction { .. } => "XPST0017",
            XPathError::UnknownVariable { .. } => "XPST0008",
            XPathError::MixedPathResult => "XPTY0018",
            XPathError::PathOnNonNode => "XPTY0019",
            XPathError::InvalidCastValue { .. } => "FORG0001",
            XPathError::InvalidLexicalValue(_) => "FOCA0002",
            XPathError::DivisionByZero => "FOAR0001",
            XPathError::NoEffectiveBoolean { .. } => "FORG0006",
            XPathError::Cardinality { .. } => "FORG0004",
            XPathError::InvalidQName(_) => "FOCA0002",
            XPathError::NoNamespaceForPrefix(_) => "FONS0004",
            XPathError::TimezoneConflict => "FORG0008",
            XPathError::ArrayIndexOutOfBounds { .. } => "FOAY0001",
            XPathError::InvalidCodepoint => "FOCH0001",
            XPathError::UnsupportedNormalization(_) => "FOCH0003",
            XPathError::UnknownCollation(_) => "FOCH0002",
            XPathError::KeyCycle(_) => "XTDE0640",
            XPathError::UnknownKey(_) => "XTDE1260",
            XPathError::UnknownDecimalFormat(_) => "XTDE1280",
            XPathError::InvalidSystemProperty(_) => "XTDE1390",
            XPathError::InvalidAvailabilityName(_) => "XTDE1400",
            XPathError::UnknownAccumulator(_) => "XTDE3340",
            XPathError::DocumentLoad { .. } => "FODC0002",
            XPathError::XmlParse(_) => "FODC0006",
            XPathError::UnparsedText { .. } => "FOUT1170",
            XPathError::UnparsedTextEncoding { .. } => "FOUT1190",
            XPathError::InvalidPicture { .. } => "FODF1310",
            XPathError::JsonParse(_) => "FOJS0001",
            XPathError::JsonDuplicateKey(_) => "FOJS0003",
            XPathError::JsonOptions(_) => "FOJS0005",
            XPathError::JsonWrite(_) => "FOJS0006",
            XPathError::RegexSyntax { .. } => "FORX0002",
            XPathError::RegexFlags(_) => "FORX0001",
            XPathError::Raised { code, .. } => code,
            XPathError::Dynamic { code, .. } => code,
        }
    }
}

impl From<stilo_xdm::XdmError> for XPathError {
    fn from(err: stilo_xdm::XdmError) -> Self {
        match err {
            stilo_xdm::XdmError::InvalidName(name) => XPathError::InvalidQName(name),
            stilo_xdm::XdmError::UnknownCollation(uri) => XPathError::UnknownCollation(uri),
            stilo_xdm::XdmError::XmlParse(message) => XPathError::XmlParse(message),
            stilo_xdm::XdmError::Builder(message) => XPathError::dynamic("XTDE0001", message),
        }
    }
}

pub type Result<T> = std::result::Result<T, XPathError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_bit_exact() {
        assert_eq!(XPathError::type_error("x").code(), "XPTY0004");
        assert_eq!(XPathError::KeyCycle("k".into()).code(), "XTDE0640");
        assert_eq!(XPathError::UnknownKey("k".into()).code(), "XTDE1260");
        assert_eq!(
            XPathError::UnknownDecimalFormat("d".into()).code(),
            "XTDE1280"
        );
        assert_eq!(
            XPathError::InvalidSystemProperty("p".into()).code(),
            "XTDE1390"
        );
        assert_eq!(
            XPathError::InvalidAvailabilityName("n".into()).code(),
            "XTDE1400"
        );
        assert_eq!(
            XPathError::DocumentLoad {
                uri: "u".into(),
                message: String::new()
            }
            .code(),
            "FODC0002"
        );
        assert_eq!(XPathError::XmlParse(String::new()).code(), "FODC0006");
        assert_eq!(
            XPathError::InvalidPicture {
                picture: String::new(),
                message: String::new()
            }
            .code(),
            "FODF1310"
        );
        assert_eq!(XPathError::JsonParse(String::new()).code(), "FOJS0001");
        assert_eq!(
            XPathError::JsonDuplicateKey(String::new()).code(),
            "FOJS0003"
        );
        assert_eq!(XPathError::JsonOptions(String::new()).code(), "FOJS0005");
        assert_eq!(XPathError::JsonWrite(String::new()).code(), "FOJS0006");
        assert_eq!(
            XPathError::RegexSyntax {
                pattern: String::new(),
                message: String::new()
            }
            .code(),
            "FORX0002"
        );
        assert_eq!(
            XPathError::UnparsedText {
                uri: String::new(),
                message: String::new()
            }
            .code(),
            "FOUT1170"
        );
        assert_eq!(
            XPathError::UnparsedTextEncoding {
                uri: String::new(),
                encoding: String::new()
            }
            .code(),
            "FOUT1190"
        );
        assert_eq!(
            XPathError::Coercion {
                message: String::new(),
                required: String::new(),
                supplied: String::new()
            }
            .code(),
            "XTTE0505"
        );
    }
}
