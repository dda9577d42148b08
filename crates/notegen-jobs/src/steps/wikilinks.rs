use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use regex::Regex;
use tracing::{debug, trace};

use notegen_core::{
    DocumentFile, DocumentStore, Error, GenerationRequest, Result, TextGenerator,
};

use super::{
    default_link_transform, split_front_matter, strip_code_fences, truncate_chars,
    FileTransform, LinkTransform, StepOutcome, MAX_PROMPT_CHARS,
};

const SYSTEM_PROMPT: &str = "You add Obsidian-style [[wikilinks]] to Markdown notes. \
Wrap the key concepts of the note in [[double brackets]] without changing any other text. \
Reply with the full note body only.";

static WIKILINK: OnceCell<Regex> = OnceCell::new();

fn wikilink_pattern() -> Result<&'static Regex> {
    WIKILINK
        .get_or_try_init(|| Regex::new(r"\[\[([^\[\]|#]+)(?:[#|][^\[\]]*)?\]\]"))
        .map_err(|e| Error::Internal(format!("wikilink pattern: {e}")))
}

/// Link targets referenced in `text`, in order of appearance.
pub fn extract_wikilinks(text: &str) -> Result<Vec<String>> {
    Ok(wikilink_pattern()?
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .collect())
}

/// Split `body` into the part sent to the generator and the remainder.
///
/// The head holds at most [`MAX_PROMPT_CHARS`] characters and ends on a line
/// break when one exists inside that window.
fn prompt_window(body: &str) -> (&str, &str) {
    let head = truncate_chars(body, MAX_PROMPT_CHARS);
    if head.len() == body.len() {
        return (body, "");
    }
    let cut = head
        .rfind('\n')
        .map(|idx| idx + 1)
        .filter(|&end| !head[..end].trim().is_empty())
        .unwrap_or(head.len());
    body.split_at(cut)
}

/// Inserts wikilinks into a document body.
///
/// The generated text is merged into the document by a [`LinkTransform`];
/// the document is only written when that changes it. Bodies longer than
/// the prompt window are linked in their leading part only: the transform
/// sees the document up to the end of the window and the rest of the body
/// is appended unchanged.
pub struct WikilinkStep {
    store: Arc<dyn DocumentStore>,
    generator: Arc<dyn TextGenerator>,
    link_transform: LinkTransform,
}

impl WikilinkStep {
    pub fn new(store: Arc<dyn DocumentStore>, generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            store,
            generator,
            link_transform: default_link_transform(),
        }
    }

    pub fn with_link_transform(mut self, transform: LinkTransform) -> Self {
        self.link_transform = transform;
        self
    }
}

#[async_trait]
impl FileTransform for WikilinkStep {
    async fn apply(&self, file: &DocumentFile) -> Result<StepOutcome> {
        let content = self.store.read(&file.path).await?;
        let (_, body) = split_front_matter(&content);
        if body.trim().is_empty() {
            trace!(file_path = %file.path, "Empty body, skipping wikilinks");
            return Ok(StepOutcome::default());
        }

        let (head, tail) = prompt_window(body);
        let request = GenerationRequest::new(head).with_system(SYSTEM_PROMPT);
        let generated = self.generator.generate(&request).await?;
        let text = strip_code_fences(&generated.content)?;
        if text.trim().is_empty() {
            return Err(Error::Transform("generator returned an empty body".into()));
        }

        let updated = if tail.is_empty() {
            (self.link_transform)(&content, &text)
        } else {
            debug!(
                file_path = %file.path,
                linked_chars = head.chars().count(),
                kept_chars = tail.chars().count(),
                "Body exceeds prompt window, linking its leading part"
            );
            let shown = &content[..content.len() - tail.len()];
            let mut merged = (self.link_transform)(shown, &text);
            merged.truncate(merged.trim_end().len());
            merged.push_str(&head[head.trim_end().len()..]);
            merged.push_str(tail);
            merged
        };
        if updated == content {
            trace!(file_path = %file.path, "Wikilink transform made no change");
            return Ok(StepOutcome::default());
        }

        self.store.write(&file.path, &updated).await?;
        debug!(
            file_path = %file.path,
            step = "wikilinks",
            links = extract_wikilinks(&updated)?.len(),
            "Wikilinks written"
        );

        Ok(StepOutcome {
            front_matter_generated: false,
            wikilinks_generated: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notegen_core::GeneratedText;
    use notegen_inference::MockGenerator;
    use notegen_store::MemoryDocumentStore;

    fn step(store: &MemoryDocumentStore, generator: MockGenerator) -> WikilinkStep {
        WikilinkStep::new(Arc::new(store.clone()), Arc::new(generator))
    }

    #[test]
    fn test_extract_wikilinks() {
        let links =
            extract_wikilinks("See [[Rust]], [[Borrow Checker|borrowing]] and [[Traits#Objects]].")
                .unwrap();
        assert_eq!(links, vec!["Rust", "Borrow Checker", "Traits"]);
        assert!(extract_wikilinks("no links [here]").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_replaces_body_and_keeps_front_matter() {
        let store = MemoryDocumentStore::with_documents([(
            "a.md",
            "---\ntitle: A\n---\n\nRust has traits.\n",
        )]);
        let generator = MockGenerator::new().with_fixed_response("[[Rust]] has [[traits]].");
        let outcome = step(&store, generator.clone())
            .apply(&DocumentFile::new("a.md"))
            .await
            .unwrap();

        assert!(outcome.wikilinks_generated);
        assert_eq!(
            store.get("a.md").await.unwrap(),
            "---\ntitle: A\n---\n\n[[Rust]] has [[traits]].\n"
        );
        // Only the body is sent to the model.
        assert_eq!(generator.calls()[0].request.prompt, "Rust has traits.\n");
    }

    #[tokio::test]
    async fn test_unchanged_document_is_not_written() {
        let store = MemoryDocumentStore::with_documents([("a.md", "Already [[linked]].\n")]);
        let generator = MockGenerator::new().with_fixed_response("Already [[linked]].");
        let outcome = step(&store, generator)
            .apply(&DocumentFile::new("a.md"))
            .await
            .unwrap();
        assert_eq!(outcome, StepOutcome::default());
    }

    #[tokio::test]
    async fn test_custom_link_transform() {
        let store = MemoryDocumentStore::with_documents([("a.md", "Body\n")]);
        let generator = MockGenerator::new().with_fixed_response("[[Related]]");
        let transform: LinkTransform =
            Arc::new(|original, generated| format!("{original}\nSee also: {generated}\n"));
        step(&store, generator)
            .with_link_transform(transform)
            .apply(&DocumentFile::new("a.md"))
            .await
            .unwrap();

        assert_eq!(store.get("a.md").await.unwrap(), "Body\n\nSee also: [[Related]]\n");
    }

    #[tokio::test]
    async fn test_empty_body_skips_generation() {
        let store = MemoryDocumentStore::with_documents([("a.md", "---\ntitle: A\n---\n")]);
        let generator = MockGenerator::new();
        let outcome = step(&store, generator.clone())
            .apply(&DocumentFile::new("a.md"))
            .await
            .unwrap();
        assert_eq!(outcome, StepOutcome::default());
        assert_eq!(generator.call_count(), 0);
    }

    /// Prefixes a link to whatever it is sent.
    struct EchoLinker;

    #[async_trait]
    impl TextGenerator for EchoLinker {
        async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedText> {
            Ok(GeneratedText::new(format!("[[Link]] {}", request.prompt)))
        }

        fn model_name(&self) -> &str {
            "echo"
        }
    }

    #[test]
    fn test_prompt_window_ends_on_line_break() {
        let body = "0123456789\n".repeat(1_000);
        let (head, tail) = prompt_window(&body);
        assert!(head.chars().count() <= MAX_PROMPT_CHARS);
        assert!(head.ends_with('\n'));
        assert_eq!(format!("{head}{tail}"), body);

        assert_eq!(prompt_window("short\n"), ("short\n", ""));
    }

    #[tokio::test]
    async fn test_long_single_line_keeps_tail() {
        let body = format!("{}TAIL-MARKER\n", "x".repeat(9_000));
        let store = MemoryDocumentStore::with_documents([("a.md", body.clone())]);
        WikilinkStep::new(Arc::new(store.clone()), Arc::new(EchoLinker))
            .apply(&DocumentFile::new("a.md"))
            .await
            .unwrap();

        assert_eq!(store.get("a.md").await.unwrap(), format!("[[Link]] {body}"));
    }

    #[tokio::test]
    async fn test_long_note_links_window_and_keeps_rest() {
        let body = "Line about Rust.\n".repeat(600) + "TAIL-MARKER\n";
        let content = format!("---\ntitle: Long\n---\n\n{body}");
        let store = MemoryDocumentStore::with_documents([("a.md", content)]);
        let outcome = WikilinkStep::new(Arc::new(store.clone()), Arc::new(EchoLinker))
            .apply(&DocumentFile::new("a.md"))
            .await
            .unwrap();
        assert!(outcome.wikilinks_generated);

        let updated = store.get("a.md").await.unwrap();
        assert_eq!(updated, format!("---\ntitle: Long\n---\n\n[[Link]] {body}"));
        assert!(updated.ends_with("TAIL-MARKER\n"));
    }

    #[tokio::test]
    async fn test_empty_response_is_an_error() {
        let store = MemoryDocumentStore::with_documents([("a.md", "Body\n")]);
        let generator = MockGenerator::new().with_fixed_response("```\n```");
        let err = step(&store, generator)
            .apply(&DocumentFile::new("a.md"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transform(_)));
    }
}
