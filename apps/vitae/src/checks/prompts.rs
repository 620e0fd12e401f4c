// Prompt constants for the content critique check.

/// System prompt for CV critique — enforces JSON-only output.
pub const CRITIQUE_SYSTEM: &str = "You are a highly critical recruiter reviewing a CV. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON array. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Critique prompt template. Replace `{profile_json}` before sending.
pub const CRITIQUE_PROMPT_TEMPLATE: &str = r#"Review the following CV from a highly critical recruiter's perspective.
Point out flaws in the texts. Address each problematic value with a JSON path into the CV object, e.g. "sections[1].entries[0].bullets[2]".
Don't report missing information, texts with no issues, or the JSON format itself - focus on the quality of the texts.
Be concise and clear.
When proposing a revision, keep the tone of the original, the information it conveys, and roughly its length.

Return a JSON array with this EXACT schema (no extra fields, empty array if there are no problems):
[
  {
    "path": "sections[0].entries[0].text",
    "problem": "Readability",
    "recommendation": "Split the run-on sentence.",
    "revised": "The revised text."
  }
]

"problem" must be one of: "Recommendation", "Readability", "Grammar", "Brevity".

Here's the CV:
{profile_json}"#;
