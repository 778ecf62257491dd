// AI exposure assessment engine.
// Implements: occupation matching, task → activity mapping, exposure aggregation,
// career recommendations, and the pipeline tying them together.
// All model calls go through the semantic port; nothing here talks to the LLM directly.

pub mod activity_mapper;
pub mod aggregator;
pub mod errors;
pub mod handlers;
pub mod occupation_matcher;
pub mod pipeline;
pub mod prompts;
pub mod recommender;
pub mod skill_tags;
