// All LLM prompt constants for the assessment pipeline.
// Reuses cross-cutting fragments from llm_client::prompts.

/// System prompt for occupation matching. JSON-only output.
pub const OCCUPATION_MATCH_SYSTEM: &str = "You are a labor-market taxonomy expert. \
    You map informal job titles onto a standardized occupation catalogue. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences.";

/// Occupation matching prompt. Replace: {job_title}, {industry}, {candidates}, {closed_list_instruction}
pub const OCCUPATION_MATCH_PROMPT_TEMPLATE: &str = r#"Match the job title below to the most plausible occupations from the candidate list.

JOB TITLE: {job_title}
INDUSTRY: {industry}

CANDIDATE OCCUPATIONS (code: title):
{candidates}

{closed_list_instruction}

Return a JSON object with this EXACT schema, listing at most 3 matches, best first:
{
  "matches": [
    {"code": "29-1141.00", "confidence": 0.8}
  ]
}

confidence is a number between 0 and 1 reflecting how likely the job title denotes that occupation."#;

/// System prompt for task → activity mapping. JSON-only output.
pub const ACTIVITY_MAP_SYSTEM: &str = "You are an occupational analyst. \
    You map free-text descriptions of work tasks onto standardized detailed work activities. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences.";

/// Single-task mapping prompt. Replace: {task}, {activities}, {closed_list_instruction}
pub const ACTIVITY_MAP_PROMPT_TEMPLATE: &str = r#"Select the standardized activities that best describe the task below.

TASK: {task}

CANDIDATE ACTIVITIES (id: title):
{activities}

{closed_list_instruction}

Return a JSON object with this EXACT schema:
{
  "activities": [
    {"activity_id": "4.A.2.a.4", "relevance": 0.9}
  ],
  "confidence": 0.75
}

RULES:
1. Select between 1 and 5 activities, most relevant first
2. relevance (0-1) is how much of the task the activity covers
3. confidence (0-1) is how sure you are that the selection as a whole describes the task"#;

/// Batched mapping prompt. Replace: {tasks}, {activities}, {closed_list_instruction}
pub const ACTIVITY_MAP_BATCH_PROMPT_TEMPLATE: &str = r#"Select the standardized activities that best describe EACH task below.

TASKS (index: description):
{tasks}

CANDIDATE ACTIVITIES (id: title):
{activities}

{closed_list_instruction}

Return a JSON object with this EXACT schema, one entry per task index:
{
  "tasks": [
    {
      "task_index": 0,
      "activities": [
        {"activity_id": "4.A.2.a.4", "relevance": 0.9}
      ],
      "confidence": 0.75
    }
  ]
}

RULES:
1. Select between 1 and 5 activities per task, most relevant first
2. relevance (0-1) is how much of the task the activity covers
3. confidence (0-1) is how sure you are that the selection as a whole describes the task
4. task_index must be the index shown in the task list"#;
