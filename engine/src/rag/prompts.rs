//! Prompt templates for the two generation calls

/// Separator placed between documents in a prompt
pub const DOCUMENT_SEPARATOR: &str = "\n\n";

/// Prompt for an intermediate answer built from the first `window` documents
pub fn intermediate_prompt(question: &str, documents: &[String], window: usize) -> String {
    let end = window.min(documents.len());
    format!(
        "Answer the question using the information below.\n\n\
         Question: {}\n\n\
         Available information:\n{}\n\n\
         Answer:",
        question,
        documents[..end].join(DOCUMENT_SEPARATOR)
    )
}

/// Prompt for the final answer built from every collected document
pub fn synthesis_prompt(question: &str, documents: &[String]) -> String {
    format!(
        "Combine all of the information below into one comprehensive answer to the question.\n\n\
         Question: {}\n\n\
         All collected information:\n{}\n\n\
         Final answer:",
        question,
        documents.join(DOCUMENT_SEPARATOR)
    )
}
