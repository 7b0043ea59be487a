//! Resource resolution and the process-wide document cache.
//!
//! The cache maps absolute URIs to parsed documents; entries are immutable
//! once inserted, so concurrent population can only duplicate work. Errors
//! surface as the document-loading codes and the caller decides whether to
//! swallow them (`document()`) or raise (`doc()`).

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, LazyLock, RwLock};

use stilo_xdm::datasource::xml::resolve_uri;
use stilo_xdm::{ExpandedName, ParseOptions, XmlTree};
use stilo_xpath::XPathError;

static DOCUMENT_CACHE: LazyLock<RwLock<HashMap<String, Arc<XmlTree>>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

/// Loads raw resource bytes for documents and unparsed text.
pub trait ResourceResolver: Send + Sync {
    fn load(&self, uri: &str) -> io::Result<Vec<u8>>;
}

/// Filesystem-backed resolver; the default.
#[derive(Debug, Default)]
pub struct FileResolver;

impl ResourceResolver for FileResolver {
    fn load(&self, uri: &str) -> io::Result<Vec<u8>> {
        let path = uri.strip_prefix("file://").unwrap_or(uri);
        std::fs::read(path)
    }
}

/// In-memory resolver for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryResolver {
    resources: HashMap<String, Vec<u8>>,
}

impl MemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, uri: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        self.resources.insert(uri.into(), content.into());
        self
    }
}

impl ResourceResolver for MemoryResolver {
    fn load(&self, uri: &str) -> io::Result<Vec<u8>> {
        self.resources
            .get(uri)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, uri.to_string()))
    }
}

/// Resolves `href` against `base` and loads through the cache. The strip
/// rule applies only when the document is first parsed.
pub fn load_document(
    resolver: &dyn ResourceResolver,
    href: &str,
    base: Option<&str>,
    strip: Option<&dyn Fn(&ExpandedName) -> bool>,
) -> Result<Arc<XmlTree>, XPathError> {
    let absolute = match base {
        Some(base) => resolve_uri(href, base),
        None => href.to_string(),
    };
    if let Some(cached) = DOCUMENT_CACHE.read().unwrap().get(&absolute) {
        return Ok(Arc::clone(cached));
    }
    log::debug!("loading document '{}'", absolute);
    let bytes = resolver
        .load(&absolute)
        .map_err(|err| XPathError::DocumentLoad {
            uri: absolute.clone(),
            message: err.to_string(),
        })?;
    let text = String::from_utf8(bytes).map_err(|_| XPathError::DocumentLoad {
        uri: absolute.clone(),
        message: "resource is not valid UTF-8".to_string(),
    })?;
    let options = ParseOptions {
        base_uri: Some(absolute.clone()),
        document_uri: Some(absolute.clone()),
    };
    let tree =
        XmlTree::parse_with(&text, options, strip).map_err(|err| XPathError::DocumentLoad {
            uri: absolute.clone(),
            message: err.to_string(),
        })?;
    DOCUMENT_CACHE
        .write()
        .unwrap()
        .insert(absolute, Arc::clone(&tree));
    Ok(tree)
}

/// Reads a text resource; I/O failures map to the unparsed-text error and
/// unsupported encodings to the encoding error.
pub fn unparsed_text(
    resolver: &dyn ResourceResolver,
    href: &str,
    encoding: Option<&str>,
    base: Option<&str>,
) -> Result<String, XPathError> {
    let absolute = match base {
        Some(base) => resolve_uri(href, base),
        None => href.to_string(),
    };
    if let Some(encoding) = encoding {
        if !encoding.eq_ignore_ascii_case("utf-8") && !encoding.eq_ignore_ascii_case("utf8") {
            return Err(XPathError::UnparsedTextEncoding {
                uri: absolute,
                encoding: encoding.to_string(),
            });
        }
    }
    let bytes = resolver
        .load(&absolute)
        .map_err(|err| XPathError::UnparsedText {
            uri: absolute.clone(),
            message: err.to_string(),
        })?;
    String::from_utf8(bytes).map_err(|_| XPathError::UnparsedTextEncoding {
        uri: absolute,
        encoding: "utf-8".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use stilo_xdm::SourceNode;

    #[test]
    fn documents_are_cached_by_absolute_uri() {
        let resolver = MemoryResolver::new().with("mem://cache-test/a.xml", "<a/>");
        let first = load_document(&resolver, "a.xml", Some("mem://cache-test/base.xml"), None)
            .unwrap();
        let second =
            load_document(&resolver, "mem://cache-test/a.xml", None, None).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(
            first.root().document_uri().as_deref(),
            Some("mem://cache-test/a.xml")
        );
    }

    #[test]
    fn missing_documents_are_fodc0002() {
        let resolver = MemoryResolver::new();
        let err = load_document(&resolver, "mem://nowhere.xml", None, None).unwrap_err();
        assert_eq!(err.code(), "FODC0002");
    }

    #[test]
    fn unparsed_text_error_codes() {
        let resolver = MemoryResolver::new().with("mem://t.txt", "line1\nline2");
        assert_eq!(
            unparsed_text(&resolver, "mem://t.txt", None, None).unwrap(),
            "line1\nline2"
        );
        let err = unparsed_text(&resolver, "mem://missing.txt", None, None).unwrap_err();
        assert_eq!(err.code(), "FOUT1170");
        let err =
            unparsed_text(&resolver, "mem://t.txt", Some("ebcdic"), None).unwrap_err();
        assert_eq!(err.code(), "FOUT1190");
        let binary = MemoryResolver::new().with("mem://bin", vec![0xFF, 0xFE, 0x00]);
        let err = unparsed_text(&binary, "mem://bin", None, None).unwrap_err();
        assert_eq!(err.code(), "FOUT1190");
    }
}
