// Shared prompt fragments.
// Each pipeline stage that calls the model defines its own prompts alongside it
// (see assessment/prompts.rs). This file contains cross-cutting fragments.

/// Appended to every matching prompt: suggestions must come from the supplied list.
pub const CLOSED_LIST_INSTRUCTION: &str = "\
    CRITICAL: Only use identifiers that appear verbatim in the candidate list above. \
    Never invent, abbreviate, or reformat an identifier. \
    If nothing in the list is a plausible match, return an empty list.";
