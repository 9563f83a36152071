//! Comment summarization: a provider fallback chain over cloud APIs, ending
//! in a deterministic local generator that always produces something.

pub mod providers;

use tracing::{info, warn};

use crate::comments::CommentRecord;
use crate::config::SummarizerConfig;
use providers::{create_providers, ProviderAdapter};

/// Document text beyond this many characters is truncated in the prompt.
const MAX_PROMPT_DOC_CHARS: usize = 8_000;

pub struct Summarizer {
    providers: Vec<ProviderAdapter>,
}

impl Summarizer {
    pub fn new(cfg: &SummarizerConfig) -> Self {
        Self {
            providers: create_providers(cfg),
        }
    }

    /// Turn recorded comments into formal feedback text. Tries each
    /// configured provider in order; any failure or empty result falls
    /// through to the next, and the local generator is the terminal
    /// fallback. Returns the text and the name of the source that
    /// produced it.
    pub async fn summarize(
        &self,
        comments: &[CommentRecord],
        document_text: &str,
    ) -> (String, &'static str) {
        let prompt = build_prompt(comments, document_text);
        for provider in &self.providers {
            match provider.generate(&prompt).await {
                Ok(text) if !text.trim().is_empty() => {
                    info!(provider = provider.name(), "Summary generated");
                    return (text.trim().to_string(), provider.name());
                }
                Ok(_) => warn!(provider = provider.name(), "Provider returned empty text"),
                Err(e) => warn!(provider = provider.name(), "Provider failed: {:#}", e),
            }
        }
        (local_feedback(comments), "local")
    }
}

/// One prompt embedding the document and the ordered comment list.
fn build_prompt(comments: &[CommentRecord], document_text: &str) -> String {
    let mut doc = document_text.trim();
    if doc.len() > MAX_PROMPT_DOC_CHARS {
        let mut end = MAX_PROMPT_DOC_CHARS;
        while !doc.is_char_boundary(end) {
            end -= 1;
        }
        doc = &doc[..end];
    }

    let mut prompt = String::from(
        "You are helping a teacher turn informal spoken comments on a student \
         document into formal written feedback. Rewrite each comment as a \
         clear, professional sentence and combine them into one cohesive \
         piece of feedback. Do not invent issues that are not mentioned.\n\n",
    );
    prompt.push_str("Document text:\n---\n");
    prompt.push_str(doc);
    prompt.push_str("\n---\n\nComments (word position, text):\n");
    for comment in comments {
        prompt.push_str(&format!(
            "- at word {}: {}\n",
            comment.position_words, comment.text
        ));
    }
    prompt
}

/// Deterministic local fallback: map known casual phrasings to formal
/// sentences and join them with count-dependent phrasing. Always returns
/// non-empty text.
pub fn local_feedback(comments: &[CommentRecord]) -> String {
    if comments.is_empty() {
        return "No comments were recorded for this document.".to_string();
    }

    let clauses: Vec<String> = comments.iter().map(|c| formal_clause(&c.text)).collect();
    match &clauses[..] {
        [only] => format!("{}.", capitalize(only)),
        [first, second] => format!("{}. Additionally, {}.", capitalize(first), second),
        [first, middle @ .., last] => {
            let mut out = format!(
                "This document received {} comments. {}.",
                clauses.len(),
                capitalize(first)
            );
            for clause in middle {
                out.push_str(&format!(" Furthermore, {}.", clause));
            }
            out.push_str(&format!(" Finally, {}.", last));
            out
        }
        [] => unreachable!(),
    }
}

fn formal_clause(comment: &str) -> String {
    let lowered = comment.to_lowercase();
    let canned = [
        (
            &["format", "layout", "spacing"][..],
            "the formatting of this section should be revised for consistency",
        ),
        (
            &["grammar", "spelling", "typo"][..],
            "there are grammatical or spelling issues here that should be corrected",
        ),
        (
            &["good", "nice", "great", "well done", "excellent"][..],
            "this section is well executed",
        ),
        (
            &["unclear", "confusing", "hard to follow"][..],
            "this passage is unclear and would benefit from clarification",
        ),
        (
            &["citation", "cite", "source", "reference"][..],
            "a citation is needed to support this claim",
        ),
        (
            &["wrong", "incorrect", "mistake"][..],
            "this statement appears to be inaccurate and should be verified",
        ),
        (
            &["expand", "more detail", "too short"][..],
            "this section should be expanded with additional detail",
        ),
    ];
    for (triggers, sentence) in canned {
        if triggers.iter().any(|t| lowered.contains(t)) {
            return sentence.to_string();
        }
    }
    format!("please review the following note: \"{}\"", comment.trim())
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
