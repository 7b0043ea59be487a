use thiserror::Error;

use stilo_xpath::XPathError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum XsltError {
    #[error(transparent)]
    XPath(#[from] XPathError),

    #[error("Invalid match pattern '{pattern}': {message}")]
    Pattern { pattern: String, message: String },

    #[error("Stylesheet error: {0}")]
    Stylesheet(String),

    #[error("Output error: {0}")]
    Output(String),
}

impl XsltError {
    pub fn pattern(pattern: impl Into<String>, message: impl Into<String>) -> Self {
        XsltError::Pattern {
            pattern: pattern.into(),
            message: message.into(),
        }
    }

    /// The W3C code of the underlying condition, where one exists.
    pub fn code(&self) -> &str {
        match self {
            XsltError::XPath(inner) => inner.code(),
            XsltError::Pattern { .. } => "XTSE0340",
            XsltError::Stylesheet(_) => "XTSE0010",
            XsltError::Output(_) => "XTDE0001",
        }
    }
}

impl From<stilo_xdm::XdmError> for XsltError {
    fn from(err: stilo_xdm::XdmError) -> Self {
        XsltError::XPath(err.into())
    }
}

pub type Result<T> = std::result::Result<T, XsltError>;
