//! System prompt template and request assembly.
//!
//! Everything here is a pure function of its arguments: no clock, randomness
//! or environment, so the same persona, history and config always produce the
//! same request.

use crate::ai::CompletionRequest;
use crate::generation::GenerationConfig;
use crate::persona::Persona;
use crate::session::Turn;

/// Render the system prompt for a persona.
pub fn system_prompt(persona: &Persona) -> String {
    let mut prompt = String::new();

    prompt.push_str(&format!("You are playing the role of \"{}\".\n", persona.name()));
    prompt.push_str(
        "Always stay true to the character sheet below and talk with the user naturally.\n\n",
    );

    prompt.push_str("[Character]\n");
    prompt.push_str(persona.style());
    prompt.push_str("\n\n");

    prompt.push_str("[Output guidelines]\n");
    prompt.push_str("- Answer in 1 to 3 short paragraphs, using bullet points when it helps.\n");
    prompt.push_str("- No preamble and no comments about yourself or about being an AI.\n");
    prompt.push_str(
        "- For difficult topics, add exactly one analogy or example that makes it easier to grasp.\n",
    );

    prompt
}

/// Build the request for the next completion: the persona's system turn
/// followed by the full history.
pub fn build_request(
    persona: &Persona,
    history: &[Turn],
    config: &GenerationConfig,
) -> CompletionRequest {
    let mut messages = Vec::with_capacity(history.len() + 1);
    messages.push(Turn::system(system_prompt(persona)));
    messages.extend_from_slice(history);

    CompletionRequest::new(messages, *config)
}
