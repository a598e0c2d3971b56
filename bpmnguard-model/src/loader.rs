use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::ModelError;
use crate::model::ProcessModel;

/// Serialized form of a BPMN document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Json,
    Xml,
}

impl DocumentFormat {
    /// Picks the format from the file extension, falling back to the first
    /// non-whitespace character of the content.
    pub fn detect(path: &Path, raw: &str) -> Self {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("json") => DocumentFormat::Json,
            Some("bpmn") | Some("xml") => DocumentFormat::Xml,
            _ => Self::sniff(raw),
        }
    }

    pub fn sniff(raw: &str) -> Self {
        match raw.trim_start_matches('\u{feff}').trim_start().chars().next() {
            Some('<') => DocumentFormat::Xml,
            _ => DocumentFormat::Json,
        }
    }

    /// Whether `path` has an extension the loader recognises.
    pub fn is_supported(path: &Path) -> bool {
        matches!(
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(str::to_ascii_lowercase)
                .as_deref(),
            Some("json") | Some("bpmn") | Some("xml")
        )
    }
}

/// Parses every process of `raw` in the given format.
pub fn parse_all(raw: &str, format: DocumentFormat) -> Result<Vec<ProcessModel>, ModelError> {
    match format {
        DocumentFormat::Json => {
            let value: serde_json::Value = serde_json::from_str(raw)?;
            crate::json::all_from_json_value(&value)
        }
        DocumentFormat::Xml => crate::xml::all_from_xml_str(raw),
    }
}

/// Loads every process declared in the document at `path`.
pub fn load_all(path: impl AsRef<Path>) -> Result<Vec<ProcessModel>, ModelError> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).map_err(|err| ModelError::from_io(path, err))?;
    let format = DocumentFormat::detect(path, &raw);
    let models = parse_all(&raw, format)?;
    debug!(
        path = %path.display(),
        ?format,
        processes = models.len(),
        "loaded BPMN document"
    );
    Ok(models)
}

/// Loads the first process of the document at `path`.
pub fn load(path: impl AsRef<Path>) -> Result<ProcessModel, ModelError> {
    load_all(path)?
        .into_iter()
        .next()
        .ok_or(ModelError::NoProcess)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn detects_format_from_extension_and_content() {
        assert_eq!(
            DocumentFormat::detect(Path::new("a.bpmn"), "{}"),
            DocumentFormat::Xml
        );
        assert_eq!(
            DocumentFormat::detect(Path::new("a.JSON"), "<x/>"),
            DocumentFormat::Json
        );
        assert_eq!(
            DocumentFormat::detect(Path::new("a.txt"), "  \n<definitions/>"),
            DocumentFormat::Xml
        );
        assert_eq!(DocumentFormat::sniff("{\"a\": 1}"), DocumentFormat::Json);
        assert!(DocumentFormat::is_supported(Path::new("x/y.xml")));
        assert!(!DocumentFormat::is_supported(Path::new("x/y.csv")));
    }

    #[test]
    fn loads_json_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".json")
            .tempfile()
            .expect("temp file");
        write!(
            file,
            r#"{{"$type": "bpmn:Process", "id": "P", "flowElements": [{{"$type": "bpmn:StartEvent", "id": "s"}}]}}"#
        )
        .expect("write");

        let model = load(file.path()).expect("model");
        assert_eq!(model.id, "P");
        assert_eq!(model.element_count(), 1);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load("/definitely/not/here.json").unwrap_err();
        match err {
            ModelError::Io { path, .. } => assert!(path.ends_with("here.json")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
