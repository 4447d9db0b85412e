//! Prompt construction.

use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::request::GenerationRequest;

/// Length of the random request id embedded in each prompt.
const REQUEST_ID_LEN: usize = 6;

/// Generates a short lowercase alphanumeric token.
///
/// Parallel calls in one batch send otherwise identical prompts; the token
/// keeps the backend from returning the same cached reply to each of them.
#[must_use]
pub fn request_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(REQUEST_ID_LEN)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect()
}

/// Builds the generation prompt for one question.
#[must_use]
pub fn build_prompt(request: &GenerationRequest, request_id: &str) -> String {
    format!(
        "You are a quantitative finance interviewer. Generate a unique practice question.
Topic: {topic}
Difficulty: {difficulty}
Language: {language}
Request ID: {request_id}

Requirements:
- Use Markdown formatting for text (bold, italics, lists).
- Use LaTeX for ALL mathematical notation.
  - Wrap inline math in single dollar signs, e.g., $P(A|B)$.
  - Wrap block math in double dollar signs, e.g., $$ E[X] = \\sum x p(x) $$.
- Do NOT wrap the entire response in a single code block.

Stream the response strictly in this format with these exact separators:

### TITLE
(Write title here)
### QUESTION
(Write question text here, supporting Markdown & LaTeX)
### HINT
(Write hint here, supporting Markdown & LaTeX)
### SOLUTION
(Write full solution here, supporting Markdown & LaTeX)
### TAKEAWAY
(Write key takeaway here)
",
        topic = request.effective_topic(),
        difficulty = request.difficulty,
        language = request.language,
    )
}
