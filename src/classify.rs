use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use scraper::Html;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::llm::{response, LanguageModel, EXTRACTOR_PERSONA};
use crate::tokens::{Tokenizer, DEFAULT_CHUNK_TOKENS};

const HIDDEN_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

/// The policy question every document is classified against.
#[derive(Debug, Clone)]
pub struct Topic {
    pub issue: String,
    pub city_county: String,
    pub state: String,
}

impl Topic {
    pub fn describe(&self) -> String {
        format!("{} ordinances in the {}, {}", self.issue, self.city_county, self.state)
    }
}

/// One row of the classification report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub file_path: String,
    pub impacts_business: u8,
    pub token_count: usize,
}

impl ClassificationResult {
    pub fn is_positive(&self) -> bool {
        self.impacts_business == 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Html,
    Markdown,
}

impl FileType {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "html" => Some(FileType::Html),
            "md" => Some(FileType::Markdown),
            _ => None,
        }
    }
}

pub fn extract_text(content: &str, file_type: FileType) -> String {
    match file_type {
        FileType::Html => html_to_text(content),
        FileType::Markdown => content.to_string(),
    }
}

/// Visible text nodes, trimmed and joined by single spaces.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut parts: Vec<&str> = Vec::new();
    for node in document.tree.root().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| HIDDEN_ELEMENTS.contains(&e.name()))
        });
        let trimmed = text.trim();
        if !hidden && !trimmed.is_empty() {
            parts.push(trimmed);
        }
    }
    parts.join(" ")
}

pub struct Classifier<'a> {
    model: &'a dyn LanguageModel,
    tokenizer: &'a Tokenizer,
    chunk_tokens: usize,
}

impl<'a> Classifier<'a> {
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

    /// Asks the model chunk by chunk and stops at the first positive answer.
    /// A failed call counts as inconclusive and moves on to the next chunk.
    pub async fn classify(&self, text: &str, topic: &Topic) -> bool {
        let chunks = self.tokenizer.chunk_tokens(text, self.chunk_tokens);
        for (i, chunk) in chunks.iter().enumerate() {
            let prompt = classification_prompt(&chunk.text, topic);
            match self.model.complete(EXTRACTOR_PERSONA, &prompt).await {
                Ok(answer) => {
                    debug!("Chunk {}/{} result: {}", i + 1, chunks.len(), answer.trim());
                    if response::answers_true(&answer) {
                        return true;
                    }
                }
                Err(e) => warn!("Classification call failed on chunk {}: {:#}", i + 1, e),
            }
        }
        false
    }

    pub async fn process_file(&self, path: &Path, topic: &Topic) -> Result<ClassificationResult> {
        let file_type = FileType::from_path(path).unwrap_or(FileType::Markdown);
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let text = extract_text(&content, file_type);
        let token_count = self.tokenizer.count(&text);
        let impacts = self.classify(&text, topic).await;

        Ok(ClassificationResult {
            file_path: path.display().to_string(),
            impacts_business: u8::from(impacts),
            token_count,
        })
    }

    /// Classify every `.html` / `.md` file under `root`. Unreadable files are
    /// logged and left out of the report.
    pub async fn process_directory(
        &self,
        root: &Path,
        topic: &Topic,
    ) -> Result<(Vec<ClassificationResult>, usize)> {
        let files = collect_documents(root)?;
        info!("Classifying {} documents under {}", files.len(), root.display());

        let pb = ProgressBar::new(files.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
                .progress_chars("=> "),
        );

        let mut results = Vec::with_capacity(files.len());
        let mut total_tokens = 0usize;
        for path in files {
            match self.process_file(&path, topic).await {
                Ok(result) => {
                    total_tokens += result.token_count;
                    results.push(result);
                }
                Err(e) => warn!("Skipping {}: {:#}", path.display(), e),
            }
            pb.inc(1);
        }
        pb.finish_and_clear();

        Ok((results, total_tokens))
    }
}

fn classification_prompt(chunk: &str, topic: &Topic) -> String {
    format!(
        "Does any of the provided page content discuss the topic of {topic}? \
Answer with 'True' or 'False' and do not output anything else.\n\n\
It is worse to output a false negative than a false positive. If you are unsure, please answer 'True'.\n\n\
Page Content:\n{chunk}",
        topic = topic.describe(),
        chunk = chunk,
    )
}

/// Every `.html` and `.md` file below `root`, sorted for a stable report order.
pub fn collect_documents(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries =
            std::fs::read_dir(&dir).with_context(|| format!("Failed to list {}", dir.display()))?;
        for entry in entries {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if FileType::from_path(&path).is_some() {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

// ── Report ──

pub fn write_report(results: &[ClassificationResult], path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    if results.is_empty() {
        writer.write_record(["file_path", "impacts_business", "token_count"])?;
    }
    for result in results {
        writer.serialize(result)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_report(path: &Path) -> Result<Vec<ClassificationResult>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let rows = reader
        .deserialize()
        .collect::<Result<Vec<ClassificationResult>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubModel;
    use tempfile::TempDir;

    fn topic() -> Topic {
        Topic {
            issue: "short term rental".into(),
            city_county: "Humboldt County".into(),
            state: "CA".into(),
        }
    }

    #[test]
    fn html_text_skips_scripts_and_trims_text_nodes() {
        let html = "<html><head><style>p{}</style><script>var x = 1;</script></head>\
                    <body><h1> Rentals </h1>\n<p>Permit   required</p><p>  </p></body></html>";
        assert_eq!(html_to_text(html), "Rentals Permit   required");
    }

    #[test]
    fn markdown_passes_through() {
        assert_eq!(extract_text("# Title\n\nbody", FileType::Markdown), "# Title\n\nbody");
    }

    #[tokio::test]
    async fn first_positive_chunk_short_circuits() {
        let tokenizer = Tokenizer::cl100k().unwrap();
        // one scripted reply: a second call would fail the test through the stub
        let model = StubModel::new(["True"]);
        let classifier = Classifier::new(&model, &tokenizer).with_chunk_tokens(5);
        let text = "Short term rentals require a permit. ".repeat(20);

        assert!(classifier.classify(&text, &topic()).await);
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn all_negative_chunks_are_asked() {
        let tokenizer = Tokenizer::cl100k().unwrap();
        let model = StubModel::new(["False", "false.", "FALSE"]);
        let classifier = Classifier::new(&model, &tokenizer).with_chunk_tokens(4);
        let text = "one two three four five six seven eight nine ten eleven";
        let chunks = tokenizer.chunk_tokens(text, 4).len();
        assert_eq!(chunks, 3);

        assert!(!classifier.classify(text, &topic()).await);
        assert_eq!(model.calls(), 3);
    }

    #[tokio::test]
    async fn failed_call_is_inconclusive() {
        let tokenizer = Tokenizer::cl100k().unwrap();
        let model = StubModel::new(Vec::<String>::new());
        let classifier = Classifier::new(&model, &tokenizer);
        assert!(!classifier.classify("some text", &topic()).await);
    }

    #[tokio::test]
    async fn empty_document_is_negative_without_calls() {
        let tokenizer = Tokenizer::cl100k().unwrap();
        let model = StubModel::new(["True"]);
        let classifier = Classifier::new(&model, &tokenizer);
        assert!(!classifier.classify("", &topic()).await);
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn directory_walk_and_report() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("county.gov").join("code");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join("county.gov").join("index.html"), "<p>Welcome</p>").unwrap();
        std::fs::write(nested.join("ch1.pdf.md"), "Short-term rentals need a permit.").unwrap();
        std::fs::write(nested.join("notes.txt"), "ignored").unwrap();

        let tokenizer = Tokenizer::cl100k().unwrap();
        // sorted order: code/ch1.pdf.md before index.html
        let model = StubModel::new(["True", "False"]);
        let classifier = Classifier::new(&model, &tokenizer);

        let (results, total) = classifier.process_directory(dir.path(), &topic()).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].file_path.ends_with("ch1.pdf.md"));
        assert!(results[0].is_positive());
        assert!(!results[1].is_positive());
        assert_eq!(total, results.iter().map(|r| r.token_count).sum::<usize>());
        assert!(model.prompts()[0].contains("short term rental ordinances in the Humboldt County, CA"));

        let report = dir.path().join("report.csv");
        write_report(&results, &report).unwrap();
        let csv = std::fs::read_to_string(&report).unwrap();
        assert!(csv.starts_with("file_path,impacts_business,token_count\n"));
        assert_eq!(read_report(&report).unwrap(), results);
    }

    #[test]
    fn empty_report_still_has_header() {
        let dir = TempDir::new().unwrap();
        let report = dir.path().join("r.csv");
        write_report(&[], &report).unwrap();
        assert_eq!(
            std::fs::read_to_string(&report).unwrap(),
            "file_path,impacts_business,token_count\n"
        );
    }
}
