use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, trace};

use notegen_core::{
    DocumentFile, DocumentStore, Error, GenerationRequest, Result, TextGenerator,
};

use super::{split_front_matter, strip_code_fences, truncate_chars, FileTransform, StepOutcome, MAX_PROMPT_CHARS};

const SYSTEM_PROMPT: &str = "You write YAML front matter for Markdown notes. \
Reply with YAML only: no delimiters, no explanations. \
Use the keys title, summary and tags (a list of lowercase keywords).";

/// Generates a YAML front matter block for a document.
///
/// Documents that already start with a front matter block are left alone
/// unless `overwrite_existing` is set.
pub struct FrontMatterStep {
    store: Arc<dyn DocumentStore>,
    generator: Arc<dyn TextGenerator>,
    overwrite_existing: bool,
}

impl FrontMatterStep {
    pub fn new(store: Arc<dyn DocumentStore>, generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            store,
            generator,
            overwrite_existing: false,
        }
    }

    pub fn with_overwrite_existing(mut self, overwrite: bool) -> Self {
        self.overwrite_existing = overwrite;
        self
    }

    fn build_prompt(file: &DocumentFile, body: &str) -> String {
        format!(
            "Note title: {}\n\nNote content:\n{}",
            file.basename,
            truncate_chars(body, MAX_PROMPT_CHARS)
        )
    }
}

/// Turn a model response into a normalized YAML mapping, one key per line.
fn normalize_yaml(response: &str) -> Result<String> {
    let text = strip_code_fences(response)?;
    let text = text.trim();
    let text = text.strip_prefix("---").unwrap_or(text);
    let text = text.strip_suffix("---").unwrap_or(text).trim();

    let value: serde_yaml::Value = serde_yaml::from_str(text)
        .map_err(|e| Error::Transform(format!("generated front matter is not valid YAML: {e}")))?;
    match value {
        serde_yaml::Value::Mapping(map) if !map.is_empty() => Ok(serde_yaml::to_string(&map)?),
        _ => Err(Error::Transform(
            "generated front matter is not a YAML mapping".into(),
        )),
    }
}

#[async_trait]
impl FileTransform for FrontMatterStep {
    async fn apply(&self, file: &DocumentFile) -> Result<StepOutcome> {
        let content = self.store.read(&file.path).await?;
        let (existing, body) = split_front_matter(&content);
        if existing.is_some() && !self.overwrite_existing {
            trace!(file_path = %file.path, "Front matter present, skipping");
            return Ok(StepOutcome::default());
        }

        let request =
            GenerationRequest::new(Self::build_prompt(file, body)).with_system(SYSTEM_PROMPT);
        let generated = self.generator.generate(&request).await?;
        let yaml = normalize_yaml(&generated.content)?;

        let updated = format!("---\n{yaml}---\n\n{body}");
        self.store.write(&file.path, &updated).await?;
        debug!(
            file_path = %file.path,
            step = "front_matter",
            model = self.generator.model_name(),
            replaced = existing.is_some(),
            "Front matter written"
        );

        Ok(StepOutcome {
            front_matter_generated: true,
            wikilinks_generated: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notegen_inference::MockGenerator;
    use notegen_store::MemoryDocumentStore;

    fn step(store: &MemoryDocumentStore, generator: MockGenerator) -> FrontMatterStep {
        FrontMatterStep::new(Arc::new(store.clone()), Arc::new(generator))
    }

    #[test]
    fn test_normalize_yaml_accepts_fenced_and_delimited() {
        assert_eq!(
            normalize_yaml("```yaml\ntitle: A\n```").unwrap(),
            "title: A\n"
        );
        assert_eq!(normalize_yaml("---\ntitle: A\n---").unwrap(), "title: A\n");
    }

    #[test]
    fn test_normalize_yaml_rejects_non_mapping() {
        assert!(matches!(normalize_yaml("just prose"), Err(Error::Transform(_))));
        assert!(matches!(normalize_yaml("- a\n- b"), Err(Error::Transform(_))));
        assert!(matches!(normalize_yaml("key: [unclosed"), Err(Error::Transform(_))));
    }

    #[tokio::test]
    async fn test_writes_front_matter_above_body() {
        let store = MemoryDocumentStore::with_documents([("notes/rust.md", "Ownership rules.\n")]);
        let generator = MockGenerator::new().with_fixed_response("title: Rust\ntags:\n- rust\n");
        let outcome = step(&store, generator.clone())
            .apply(&DocumentFile::new("notes/rust.md"))
            .await
            .unwrap();

        assert!(outcome.front_matter_generated);
        assert_eq!(
            store.get("notes/rust.md").await.unwrap(),
            "---\ntitle: Rust\ntags:\n- rust\n---\n\nOwnership rules.\n"
        );
        let prompt = &generator.calls()[0].request.prompt;
        assert!(prompt.contains("Note title: rust"));
        assert!(prompt.contains("Ownership rules."));
    }

    #[tokio::test]
    async fn test_existing_front_matter_is_kept() {
        let original = "---\ntitle: Mine\n---\n\nBody\n";
        let store = MemoryDocumentStore::with_documents([("a.md", original)]);
        let generator = MockGenerator::new().with_fixed_response("title: Theirs");
        let outcome = step(&store, generator.clone())
            .apply(&DocumentFile::new("a.md"))
            .await
            .unwrap();

        assert_eq!(outcome, StepOutcome::default());
        assert_eq!(store.get("a.md").await.unwrap(), original);
        assert_eq!(generator.call_count(), 0);
    }

    #[tokio::test]
    async fn test_overwrite_replaces_existing_block() {
        let store = MemoryDocumentStore::with_documents([("a.md", "---\ntitle: Old\n---\n\nBody\n")]);
        let generator = MockGenerator::new().with_fixed_response("title: New");
        let outcome = step(&store, generator)
            .with_overwrite_existing(true)
            .apply(&DocumentFile::new("a.md"))
            .await
            .unwrap();

        assert!(outcome.front_matter_generated);
        assert_eq!(store.get("a.md").await.unwrap(), "---\ntitle: New\n---\n\nBody\n");
    }

    #[tokio::test]
    async fn test_invalid_response_leaves_document_untouched() {
        let store = MemoryDocumentStore::with_documents([("a.md", "Body\n")]);
        let generator = MockGenerator::new().with_fixed_response("Sure! Here is some YAML");
        let err = step(&store, generator)
            .apply(&DocumentFile::new("a.md"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Transform(_)));
        assert_eq!(store.get("a.md").await.unwrap(), "Body\n");
    }

    #[tokio::test]
    async fn test_missing_document() {
        let store = MemoryDocumentStore::new();
        let err = step(&store, MockGenerator::new())
            .apply(&DocumentFile::new("gone.md"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
