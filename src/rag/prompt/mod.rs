
use itertools::Itertools;

/// Separates retrieved passages inside the prompt
pub const CONTEXT_DELIMITER: &str = "\n\n---\n\n";

/// Join passages in rank order
#[inline]
pub fn join_context<'a, I>(passages: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    passages.into_iter().join(CONTEXT_DELIMITER)
}

/// Wrap retrieved context and the question in the fixed grounding instructions
#[inline]
pub fn grounded_prompt(query: &str, context: &str) -> String {
    format!(
        "You are a helpful assistant with access to specific document context. Follow these guidelines:

1. **PRIMARY PRIORITY**: Use the information from the provided CONTEXT below to answer the question.
2. **SECONDARY PRIORITY**: If the context doesn't contain sufficient information, you may supplement with your general knowledge, but clearly indicate when you're doing so.
3. **TRANSPARENCY**: Always specify your sources:
   - For context-based info: \"According to the provided documents...\" or \"Based on the context...\"
   - For general knowledge: \"Based on general knowledge...\" or \"Generally speaking...\"
4. **ACCURACY**: Be factual and helpful. Don't make up specific details not found in either source.
5. **COMPLETENESS**: Provide comprehensive answers when possible.

CONTEXT FROM DOCUMENTS:
--- start of context ---
{context}
--- end of context ---

QUESTION:
{query}

HELPFUL RESPONSE (prioritizing context, supplementing with general knowledge when needed):"
    )
}
