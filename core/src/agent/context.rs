use std::fmt::Write;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an intelligent assistant with access to various tools and a knowledge base.
You can help users by:
1. Answering questions using information retrieved from the knowledge base
2. Using available tools to perform specific tasks
3. Providing accurate and helpful responses

When using tools:
- Explain what you are doing and why
- If a tool returns an error, adjust the arguments or tell the user
- Use the most appropriate tool for each task

When using the knowledge base:
- Cite the retrieved documents you relied on
- If nothing relevant was retrieved, say so clearly";

/// Prefixes `query` with the retrieved chunks, numbered from 1 in rank order.
/// Without chunks the query is returned unchanged.
pub fn augment_query(query: &str, chunks: &[String]) -> String {
    if chunks.is_empty() {
        return query.to_string();
    }

    let mut prompt = String::from("Based on the following information:\n\n");
    for (i, chunk) in chunks.iter().enumerate() {
        let _ = writeln!(prompt, "Document {}: {}\n", i + 1, chunk.trim());
    }
    let _ = write!(prompt, "Please answer the question: {query}");
    prompt
}
