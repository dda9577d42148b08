//! Per-file transform steps run by the scheduler.
//!
//! A step reads a document through the [`notegen_core::DocumentStore`],
//! asks a [`notegen_core::TextGenerator`] for new content and writes the result back. The
//! [`StepPipeline`] chains the enabled steps into the single
//! [`FileTransform`] the scheduler retries as a unit.

use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use regex::Regex;

use notegen_core::{DocumentFile, Error, Result};

mod front_matter;
mod wikilinks;

pub use front_matter::FrontMatterStep;
pub use wikilinks::{extract_wikilinks, WikilinkStep};

/// Longest document excerpt sent to a generator, in characters.
pub(crate) const MAX_PROMPT_CHARS: usize = 8_000;

/// What a transform did to one document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepOutcome {
    pub front_matter_generated: bool,
    pub wikilinks_generated: bool,
}

impl StepOutcome {
    fn merge(self, other: StepOutcome) -> StepOutcome {
        StepOutcome {
            front_matter_generated: self.front_matter_generated || other.front_matter_generated,
            wikilinks_generated: self.wikilinks_generated || other.wikilinks_generated,
        }
    }
}

/// A fallible async transformation of one document.
#[async_trait]
pub trait FileTransform: Send + Sync {
    async fn apply(&self, file: &DocumentFile) -> Result<StepOutcome>;
}

/// Merges generated text into a document: `(original, generated) -> updated`.
pub type LinkTransform = Arc<dyn Fn(&str, &str) -> String + Send + Sync>;

/// Keep the original front matter block and replace the body with the
/// generated text.
pub fn default_link_transform() -> LinkTransform {
    Arc::new(|original, generated| {
        let body = generated.trim_end();
        match split_front_matter(original) {
            (Some(yaml), _) => format!("---\n{yaml}---\n\n{body}\n"),
            (None, _) => format!("{body}\n"),
        }
    })
}

/// Split a document into its front matter YAML (without delimiters) and body.
///
/// The YAML keeps its trailing newline. Blank lines between the closing
/// delimiter and the body are dropped. An unterminated block is treated as
/// body text.
pub fn split_front_matter(content: &str) -> (Option<&str>, &str) {
    let Some(rest) = content
        .strip_prefix("---\n")
        .or_else(|| content.strip_prefix("---\r\n"))
    else {
        return (None, content);
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end_matches(&['\r', '\n'][..]) == "---" {
            let yaml = &rest[..offset];
            let body = rest[offset + line.len()..].trim_start_matches(&['\r', '\n'][..]);
            return (Some(yaml), body);
        }
        offset += line.len();
    }
    (None, content)
}

static CODE_FENCE: OnceCell<Regex> = OnceCell::new();

fn code_fence() -> Result<&'static Regex> {
    CODE_FENCE
        .get_or_try_init(|| Regex::new(r"(?s)^\s*```[\w-]*[ \t]*\r?\n(.*?)\r?\n?```\s*$"))
        .map_err(|e| Error::Internal(format!("code fence pattern: {e}")))
}

/// Unwrap a response that the model wrapped in a single fenced code block.
pub fn strip_code_fences(text: &str) -> Result<String> {
    let fence = code_fence()?;
    Ok(match fence.captures(text).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str().to_string(),
        None => text.trim().to_string(),
    })
}

/// Cut `text` to at most `max` characters on a char boundary.
pub(crate) fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// The enabled steps of a batch, run in order: front matter, then wikilinks.
#[derive(Default)]
pub struct StepPipeline {
    front_matter: Option<Arc<FrontMatterStep>>,
    wikilinks: Option<Arc<WikilinkStep>>,
}

impl StepPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_front_matter(mut self, step: Arc<FrontMatterStep>) -> Self {
        self.front_matter = Some(step);
        self
    }

    pub fn with_wikilinks(mut self, step: Arc<WikilinkStep>) -> Self {
        self.wikilinks = Some(step);
        self
    }

    /// True when no step is enabled; every file is then skipped.
    pub fn is_empty(&self) -> bool {
        self.front_matter.is_none() && self.wikilinks.is_none()
    }
}

#[async_trait]
impl FileTransform for StepPipeline {
    async fn apply(&self, file: &DocumentFile) -> Result<StepOutcome> {
        let mut outcome = StepOutcome::default();
        if let Some(step) = &self.front_matter {
            outcome = outcome.merge(step.apply(file).await?);
        }
        if let Some(step) = &self.wikilinks {
            outcome = outcome.merge(step.apply(file).await?);
        }
        Ok(outcome)
    }
}
