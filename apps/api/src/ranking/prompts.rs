// All LLM prompt constants for the ranking module.
// Templates are filled by pure functions below; nothing here holds state.

use crate::llm_client::prompts::with_json_only;

/// System instruction for criteria extraction. The transcription step comes
/// first on purpose: the model grounds its criteria in the text it just read.
const EXTRACTION_BODY: &str = r#"You are a meticulous document reader working for a recruiting team.
You will receive the pages of a job description as images. Do two things, in order:
1. Transcribe the complete textual content of every page.
2. From that transcription, list the ranking criteria a recruiter would use to compare candidates:
   skills, certifications, years and kind of experience, education, and other qualifications.

Return a JSON object with this EXACT schema:
{
    "extracted_content": "<full text transcribed from the pages>",
    "criteria": ["<criterion 1>", "<criterion 2>", ...]
}

Rules:
- Each criterion is one short, self-contained phrase (e.g. "5+ years of Python development").
- Only include criteria that are stated or clearly implied by the document.
- If the document contains no usable criteria, return an empty "criteria" list."#;

pub const EXTRACTION_USER: &str = "Transcribe these job description pages, then list the key \
    ranking criteria (skills, certifications, experience, qualifications).";

/// Scoring template. Replace `{criteria_list}` via `build_scoring_prompt`.
const SCORING_TEMPLATE: &str = r#"You are an expert resume evaluator.
Score the resume shown in the attached page images against each of these criteria:
{criteria_list}

For every criterion assign an integer score from 0 to 5:
- 0: no evidence of the criterion anywhere in the resume
- 1-2: weak or indirect evidence
- 3-4: clear, relevant evidence
- 5: exceptional evidence that fully satisfies the criterion

Also extract the candidate's full name as written on the resume. If no name is present, use an empty string.

Return a JSON object with this EXACT schema:
{
    "candidate_name": "<candidate's full name>",
    "scores": {
        "<criterion exactly as listed above>": <integer 0-5>,
        ...
    },
    "total_score": <sum of all scores>
}

Use every criterion string verbatim as a key in "scores", character for character."#;

pub const SCORING_USER: &str = "Evaluate this resume against the criteria above.";

/// Improvement-suggestions template. Replace `{criteria_list}` via `build_suggestion_prompt`.
const SUGGESTION_TEMPLATE: &str = r#"You are a resume coach helping a candidate apply for a specific role.
The role is evaluated on these criteria:
{criteria_list}

Review the resume shown in the attached page images and report:
1. Skills or qualifications the criteria require that the resume does not show at all.
2. Skills that are present but weakly supported, each with a concrete, actionable suggestion.
3. Changes to formatting, layout and presentation that would make the resume stronger.

Return a JSON object with this EXACT schema:
{
    "missing_skills": ["<missing skill>", ...],
    "weak_areas": [
        {"skill": "<skill>", "suggestion": "<specific improvement>"}
    ],
    "format_suggestions": ["<formatting or presentation suggestion>", ...]
}"#;

pub const SUGGESTION_USER: &str = "Review this resume against the criteria above and list missing \
    skills, weak areas with suggestions, and formatting improvements.";

pub fn extraction_prompt() -> String {
    with_json_only(EXTRACTION_BODY)
}

/// Renders criteria as a bullet list, one verbatim criterion per line.
pub fn criteria_bullets(criteria: &[String]) -> String {
    criteria
        .iter()
        .map(|c| format!("- {c}"))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn build_scoring_prompt(criteria: &[String]) -> String {
    with_json_only(&SCORING_TEMPLATE.replace("{criteria_list}", &criteria_bullets(criteria)))
}

pub fn build_suggestion_prompt(criteria: &[String]) -> String {
    with_json_only(&SUGGESTION_TEMPLATE.replace("{criteria_list}", &criteria_bullets(criteria)))
}
