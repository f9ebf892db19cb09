//! System prompt for grounded answer synthesis.

/// Strict grounding rules given to the generation provider.
pub const GROUNDING_SYSTEM_PROMPT: &str = "\
You are a documentation assistant. Answer questions using ONLY the supplied \
context.

Rules:
1. Answer exclusively from the context blocks. Do not use outside knowledge.
2. Every claim in your answer must be traceable to one of the citations.
3. If the context does not contain enough information to answer, say so \
explicitly instead of guessing.
4. Cite sources inline by file and line range, e.g. [R2-ARCHITECTURE.md, \
lines 14-32].
5. Keep the answer concise and factual.";

/// Builds the user prompt from the assembled context and the question.
#[must_use]
pub fn build_user_prompt(context: &str, question: &str) -> String {
    format!("Context:\n\n{context}\nQuestion: {question}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_mentions_traceability() {
        assert!(GROUNDING_SYSTEM_PROMPT.contains("traceable"));
        assert!(GROUNDING_SYSTEM_PROMPT.contains("ONLY"));
    }

    #[test]
    fn test_user_prompt_layout() {
        let prompt = build_user_prompt("ctx", "why?");
        assert!(prompt.starts_with("Context:\n\nctx"));
        assert!(prompt.ends_with("Question: why?"));
    }
}
