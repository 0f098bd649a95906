// Shared prompt fragments. Each service that needs LLM calls defines its own
// prompts.rs alongside it; only cross-cutting pieces live here.

/// Appended to every system instruction that expects a structured reply.
pub const JSON_ONLY_INSTRUCTION: &str = "Your output must be valid JSON matching the schema above. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Joins a prompt body with the JSON-only instruction.
pub fn with_json_only(body: &str) -> String {
    format!("{}\n\n{}", body.trim_end(), JSON_ONLY_INSTRUCTION)
}
