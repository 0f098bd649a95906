// Resume ranking: criteria extraction, per-resume scoring, batch aggregation
// and improvement suggestions. All LLM calls go through `StructuredCompletion`.

pub mod advisor;
pub mod batch;
pub mod criteria;
pub mod handlers;
pub mod prompts;
pub mod scorer;

use crate::document::PageImageSet;
use crate::llm_client::ContentPart;

/// User-turn content: the instruction text followed by every page image in order.
pub fn page_parts(instruction: &str, pages: &PageImageSet) -> Vec<ContentPart> {
    std::iter::once(ContentPart::Text(instruction.to_string()))
        .chain(pages.iter().map(|page| ContentPart::ImageUrl(page.data_url())))
        .collect()
}
