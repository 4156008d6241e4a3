//! Prompt assembly: retrieved context + question → model input.
//!
//! Templates are compiled once into a [`PromptTemplate`], which checks that
//! both `{context}` and `{question}` placeholders are present. Rendering is a
//! single pass over the compiled segments, so placeholder-looking text inside
//! a chunk or a question is never substituted a second time.

use serde::{Deserialize, Serialize};

use crate::document::DocumentChunk;
use crate::error::{RagError, Result};

const CONTEXT_PLACEHOLDER: &str = "{context}";
const QUESTION_PLACEHOLDER: &str = "{question}";

/// Separator placed between chunk texts in the context block.
pub const CONTEXT_DELIMITER: &str = "\n\n";

/// Instruction that keeps the model inside the supplied context.
pub const DEFAULT_GROUNDING_INSTRUCTION: &str = "Use the pieces of information provided in the \
context to answer user's question.\nIf you don't know the answer, just say that you don't know. \
Don't try to make up an answer.\nDon't provide anything outside the given context.";

pub const DEFAULT_TEMPLATE: &str =
    "Context: {context}\nQuestion: {question}\n\nStart the answer directly. No small talk please.";

/// Prompt configuration as read from a config file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PromptConfig {
    /// Template containing `{context}` and `{question}`.
    pub template: String,
    /// Sent ahead of the rendered template to forbid answers outside the context.
    pub grounding_instruction: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            template: DEFAULT_TEMPLATE.to_string(),
            grounding_instruction: DEFAULT_GROUNDING_INSTRUCTION.to_string(),
        }
    }
}

/// The rendered model input for one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptPayload {
    /// Grounding instruction; sent as the system message. May be empty.
    pub instruction: String,
    /// The rendered template; sent as the user message.
    pub body: String,
}

impl PromptPayload {
    /// Flatten to a single string for backends without message roles.
    pub fn as_text(&self) -> String {
        if self.instruction.is_empty() {
            self.body.clone()
        } else {
            format!("{}\n\n{}", self.instruction, self.body)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Context,
    Question,
}

/// A validated prompt template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    segments: Vec<Segment>,
    grounding_instruction: String,
}

impl PromptTemplate {
    /// Compile and validate a [`PromptConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Template`] if the template lacks `{context}` or
    /// `{question}`, or if the grounding instruction is blank.
    pub fn compile(config: &PromptConfig) -> Result<Self> {
        let segments = parse(&config.template);

        let has_context = segments.iter().any(|s| *s == Segment::Context);
        let has_question = segments.iter().any(|s| *s == Segment::Question);
        let missing: Vec<&str> = [(has_context, "context"), (has_question, "question")]
            .into_iter()
            .filter(|(present, _)| !present)
            .map(|(_, name)| name)
            .collect();
        if !missing.is_empty() {
            return Err(RagError::Template(format!(
                "template is missing required placeholder(s): {}",
                missing.iter().map(|m| format!("{{{m}}}")).collect::<Vec<_>>().join(", ")
            )));
        }

        let grounding_instruction = config.grounding_instruction.trim();
        if grounding_instruction.is_empty() {
            return Err(RagError::Template("grounding instruction must not be blank".to_string()));
        }

        Ok(Self { segments, grounding_instruction: grounding_instruction.to_string() })
    }

    /// Render the prompt for `question` over `chunks`, in the order given.
    pub fn render(&self, chunks: &[DocumentChunk], question: &str) -> PromptPayload {
        let context =
            chunks.iter().map(|c| c.text.as_str()).collect::<Vec<_>>().join(CONTEXT_DELIMITER);

        let mut body = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => body.push_str(text),
                Segment::Context => body.push_str(&context),
                Segment::Question => body.push_str(question),
            }
        }

        PromptPayload { instruction: self.grounding_instruction.clone(), body }
    }
}

fn parse(template: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        literal.push_str(&rest[..open]);
        let tail = &rest[open..];
        let placeholder = if tail.starts_with(CONTEXT_PLACEHOLDER) {
            Some((Segment::Context, CONTEXT_PLACEHOLDER.len()))
        } else if tail.starts_with(QUESTION_PLACEHOLDER) {
            Some((Segment::Question, QUESTION_PLACEHOLDER.len()))
        } else {
            None
        };

        match placeholder {
            Some((segment, len)) => {
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(segment);
                rest = &tail[len..];
            }
            None => {
                literal.push('{');
                rest = &tail[1..];
            }
        }
    }
    literal.push_str(rest);
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    segments
}

/// Validate `config` and render a prompt in one step.
///
/// # Errors
///
/// Returns [`RagError::Template`] if the template is missing a placeholder.
pub fn assemble(
    chunks: &[DocumentChunk],
    question: &str,
    config: &PromptConfig,
) -> Result<PromptPayload> {
    Ok(PromptTemplate::compile(config)?.render(chunks, question))
}
