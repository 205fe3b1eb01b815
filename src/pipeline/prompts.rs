//! System instructions for each model call
//!
//! Extraction responses are requested as `{"entities": [...]}` so that
//! endpoints running in JSON-object mode can honour them; the decoder also
//! accepts a bare array.

const EXTRACTION_FORMAT: &str = r#"Respond with a JSON object of the form:
{"entities": [{"entity_name": "<category>", "relevant_text": "<text copied from the contract>"}]}

Rules:
- relevant_text must be copied exactly as it appears in the contract, never paraphrased or summarised
- use broad, generic category names ("Termination", not "Termination by Employee")
- group related clauses under one category instead of creating variations
- if the same text matters to two categories, emit it once per category"#;

/// Instruction for chunk 0: propose categories with no prior context.
pub fn initial_extraction(max_categories: usize) -> String {
    format!(
        "You are a legal document analyzer. Given a section of contract text, identify the \
         broad legal categories it contains (for example \"Employment\", \"Compensation\", \
         \"Benefits\") and the text that belongs to each.\n\
         Use the minimum number of categories needed, never more than {max}.\n\n{format}",
        max = max_categories,
        format = EXTRACTION_FORMAT,
    )
}

/// Instruction for chunk i > 0: map onto the current category list first.
pub fn subsequent_extraction(existing: &[String], max_categories: usize) -> String {
    format!(
        "You are a legal document analyzer. Given a section of contract text and the \
         categories already identified in this contract, assign each relevant piece of text \
         to a category.\n\n\
         Existing categories: {existing}\n\n\
         - Always prefer an existing category name, spelled exactly as listed, even if the match is not perfect\n\
         - Create a new category only when the content is fundamentally distinct from every existing one\n\
         - The total number of categories must stay at or below {max}\n\n{format}",
        existing = existing.join(", "),
        max = max_categories,
        format = EXTRACTION_FORMAT,
    )
}

/// User message accompanying every explanation request.
pub const EXPLANATION_REQUEST: &str =
    "Please explain this clause and suggest negotiation counters.";

/// Instruction for explaining one category's combined text.
pub fn explanation(category: &str, text: &str) -> String {
    format!(
        "You are a legal contract expert. Given a contract clause title and its associated \
         text, explain it in simple terms and suggest potential negotiation counters.\n\n\
         Contract Clause: {category}\n\
         Contract Text: {text}\n\n\
         Respond with a JSON object with fields:\n\
         - meaning: a clear explanation in simple terms that covers every detail of the text\n\
         - counters: up to three specific, realistic negotiation counters (empty array if none apply)",
    )
}

/// Instruction for answering a question from retrieved context.
pub fn answer(context: &str) -> String {
    format!(
        "You are a legal contract expert. Answer the user's question using only the contract \
         text segments below.\n\n\
         Contract Text Segments:\n{context}\n\n\
         - Base your answer only on the provided segments and be specific\n\
         - If the segments do not fully answer the question, say so\n\
         - If the question is general rather than about this contract, answer from general knowledge",
    )
}

/// User message accompanying the negotiation email request.
pub const EMAIL_REQUEST: &str = "Please draft the email response for my contract negotiation.";

/// Instruction for drafting the negotiation email.
pub fn negotiation_email(accepted: &str, rejected: &str, countered: &str) -> String {
    format!(
        "You are an expert in drafting professional business correspondence. Write an email \
         about a contract negotiation that reads as if the sender wrote it personally.\n\n\
         1. Accepted clauses:\n{accepted}\n\n\
         2. Rejected clauses:\n{rejected}\n\n\
         3. Countered clauses (with proposed changes):\n{countered}\n\n\
         - Keep a cordial, professional tone\n\
         - Acknowledge accepted clauses in a sentence or two\n\
         - Give a brief, reasonable justification for each rejection\n\
         - Explain each counter-proposal clearly\n\
         - Open with \"Dear [Recipient]\" and include a closing\n\
         - Return only the email body",
    )
}
