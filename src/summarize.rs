use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::classify::{extract_text, ClassificationResult, FileType, Topic};
use crate::llm::{LanguageModel, SUMMARIZER_PERSONA};
use crate::tokens::{Tokenizer, DEFAULT_CHUNK_TOKENS};

/// Concatenated text of every positively classified document, blank-line separated.
pub fn concatenate_positive(results: &[ClassificationResult]) -> String {
    let mut combined = String::new();
    for result in results.iter().filter(|r| r.is_positive()) {
        let path = Path::new(&result.file_path);
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let file_type = FileType::from_path(path).unwrap_or(FileType::Markdown);
                combined.push_str(&extract_text(&content, file_type));
                combined.push_str("\n\n");
            }
            Err(e) => warn!("Skipping {} in summary input: {}", result.file_path, e),
        }
    }
    combined
}

pub struct Summarizer<'a> {
    model: &'a dyn LanguageModel,
    tokenizer: &'a Tokenizer,
    chunk_tokens: usize,
}

impl<'a> Summarizer<'a> {
    pub fn new(model: &'a dyn LanguageModel, tokenizer: &'a Tokenizer) -> Self {
        Self {
            model,
            tokenizer,
            chunk_tokens: DEFAULT_CHUNK_TOKENS,
        }
    }

    pub fn with_chunk_tokens(mut self, chunk_tokens: usize) -> Self {
        self.chunk_tokens = chunk_tokens;
        self
    }

    /// Summarise each line-packed chunk, then summarise the summaries when
    /// there was more than one. `None` for empty input.
    pub async fn summarize(&self, content: &str, topic: &Topic) -> Result<Option<String>> {
        let chunks = self.tokenizer.chunk_lines(content, self.chunk_tokens);
        if chunks.is_empty() {
            return Ok(None);
        }

        let mut summaries = Vec::with_capacity(chunks.len());
        for (i, chunk) in chunks.iter().enumerate() {
            info!("Summarizing chunk {} of {}...", i + 1, chunks.len());
            summaries.push(self.summarize_once(chunk, topic).await?);
        }

        let combined = summaries.join("\n\n");
        if chunks.len() == 1 {
            return Ok(Some(combined));
        }
        info!("Creating final summary...");
        Ok(Some(self.summarize_once(&combined, topic).await?))
    }

    async fn summarize_once(&self, content: &str, topic: &Topic) -> Result<String> {
        let prompt = summary_prompt(content, topic);
        self.model
            .complete(SUMMARIZER_PERSONA, &prompt)
            .await
            .context("Summary call failed")
    }
}

fn summary_prompt(content: &str, topic: &Topic) -> String {
    format!(
        "Read the following text, which is a concatenation of various files about {issue} ordinances in the {place}, {state}.\n\n\
Provide a structured summary of the overall content. Use lists to capture the key features of {issue} policy in {place} without dropping any policy details. \
Make sure the lists explain who can host, what kind of permit might be needed to host, and what the operating conditions are. \
Do not gloss over fine-grained details; those are what the reader needs to remain compliant.\n\n\
Page Content:\n{content}",
        issue = topic.issue,
        place = topic.city_county,
        state = topic.state,
        content = content,
    )
}

/// Write `text` to `path`, creating parent directories.
pub fn write_text(path: &Path, text: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))
}
