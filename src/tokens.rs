use anyhow::{anyhow, Result};
use tiktoken_rs::CoreBPE;

/// Budget used for both classification slices and summary chunks.
pub const DEFAULT_CHUNK_TOKENS: usize = 100_000;

/// cl100k_base token counter shared by reporting and chunking.
pub struct Tokenizer {
    bpe: CoreBPE,
}

/// A token-slice chunk: decoded text plus the number of tokens in the slice.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenChunk {
    pub text: String,
    pub tokens: usize,
}

impl Tokenizer {
    pub fn cl100k() -> Result<Self> {
        let bpe = tiktoken_rs::cl100k_base().map_err(|e| anyhow!("Failed to load cl100k_base: {}", e))?;
        Ok(Self { bpe })
    }

    pub fn count(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }

    /// Slice the token stream at fixed offsets of `max_tokens`. A boundary that
    /// would split a multi-byte character is pulled back until the slice decodes,
    /// so the decoded chunks concatenate to the original text.
    pub fn chunk_tokens(&self, text: &str, max_tokens: usize) -> Vec<TokenChunk> {
        let max_tokens = max_tokens.max(1);
        let tokens = self.bpe.encode_ordinary(text);
        let mut chunks = Vec::new();
        let mut start = 0;

        while start < tokens.len() {
            let mut end = (start + max_tokens).min(tokens.len());
            let decoded = loop {
                match self.bpe.decode(tokens[start..end].to_vec()) {
                    Ok(text) => break Some(text),
                    Err(_) if end - start > 1 => end -= 1,
                    Err(_) => break None,
                }
            };

            match decoded {
                Some(text) => chunks.push(TokenChunk {
                    text,
                    tokens: end - start,
                }),
                None => {
                    // A lone undecodable token: widen until it completes a character.
                    let mut wide = (start + 2).min(tokens.len());
                    let mut text = None;
                    while wide <= tokens.len() {
                        if let Ok(t) = self.bpe.decode(tokens[start..wide].to_vec()) {
                            text = Some(t);
                            break;
                        }
                        wide += 1;
                    }
                    end = wide.min(tokens.len());
                    chunks.push(TokenChunk {
                        text: text.unwrap_or_default(),
                        tokens: end - start,
                    });
                }
            }
            start = end;
        }

        chunks
    }

    /// Greedy whole-line packing: a line that would push the chunk past
    /// `max_tokens` starts a new chunk. The newline joining two lines is counted
    /// with the line after it. A single oversized line becomes its own chunk.
    ///
    /// Chunks join back with `\n` to the input; only chunks holding nothing but
    /// whitespace are dropped.
    pub fn chunk_lines(&self, text: &str, max_tokens: usize) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        let mut current_tokens = 0usize;

        for line in text.split('\n') {
            if !current.is_empty() {
                let line_tokens = self.count(&format!("\n{}", line));
                if current_tokens + line_tokens <= max_tokens {
                    current.push(line);
                    current_tokens += line_tokens;
                    continue;
                }
                push_chunk(&mut chunks, &current);
                current.clear();
            }
            current.push(line);
            current_tokens = self.count(line);
        }
        push_chunk(&mut chunks, &current);

        chunks
    }
}

fn push_chunk(chunks: &mut Vec<String>, lines: &[&str]) {
    let joined = lines.join("\n");
    if !joined.trim().is_empty() {
        chunks.push(joined);
    }
}
