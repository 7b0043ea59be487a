use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum XdmError {
    #[error("Invalid name '{0}'")]
    InvalidName(String),

    #[error("Unknown collation URI '{0}'")]
    UnknownCollation(String),

    #[error("XML parse error: {0}")]
    XmlParse(String),

    #[error("Tree builder misuse: {0}")]
    Builder(String),
}

impl From<roxmltree::Error> for XdmError {
    fn from(err: roxmltree::Error) -> Self {
        XdmError::XmlParse(err.to_string())
    }
}
