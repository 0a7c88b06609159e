//! Per-run state record
//!
//! One `RunState` exists per invocation and is owned by the executor for the
//! lifetime of that invocation. Fields are private; each step mutates the
//! record only through the method scoped to it.

use sdk::EngineError;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct RunState {
    question: String,
    documents: Vec<String>,
    recursion_depth: u32,
    max_recursions: u32,
    processed_targets: Vec<String>,
    new_targets: Vec<String>,
    answer: String,
    #[serde(skip)]
    answered: bool,
}

impl RunState {
    pub fn new(question: impl Into<String>, max_recursions: u32) -> Self {
        Self {
            question: question.into(),
            documents: Vec::new(),
            recursion_depth: 0,
            max_recursions,
            processed_targets: Vec::new(),
            new_targets: Vec::new(),
            answer: String::new(),
            answered: false,
        }
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    /// Every document retrieved so far, in retrieval order
    pub fn documents(&self) -> &[String] {
        &self.documents
    }

    /// Completed retrieve rounds
    pub fn recursion_depth(&self) -> u32 {
        self.recursion_depth
    }

    pub fn max_recursions(&self) -> u32 {
        self.max_recursions
    }

    /// All targets ever recorded, concatenated round by round
    pub fn processed_targets(&self) -> &[String] {
        &self.processed_targets
    }

    /// Targets discovered by the most recent generate round
    pub fn new_targets(&self) -> &[String] {
        &self.new_targets
    }

    /// Final answer; empty until synthesis has run
    pub fn answer(&self) -> &str {
        &self.answer
    }

    pub fn is_answered(&self) -> bool {
        self.answered
    }

    /// Query for the next retrieve round.
    ///
    /// The first round searches for the question itself. Later rounds follow
    /// the first newly discovered target, falling back to the question.
    pub fn next_query(&self) -> &str {
        if self.recursion_depth == 0 {
            return &self.question;
        }
        self.new_targets
            .first()
            .map(String::as_str)
            .unwrap_or(&self.question)
    }

    /// Append retrieved texts in the order given. Returns how many were added.
    pub fn append_documents<I>(&mut self, texts: I) -> usize
    where
        I: IntoIterator<Item = String>,
    {
        let before = self.documents.len();
        self.documents.extend(texts);
        self.documents.len() - before
    }

    /// Mark one retrieve round as finished, whether or not it found anything.
    pub fn complete_retrieval(&mut self) {
        self.recursion_depth = self.recursion_depth.saturating_add(1);
    }

    /// Replace `new_targets` and append them to `processed_targets`.
    pub fn record_targets(&mut self, new_targets: Vec<String>) {
        self.processed_targets.extend(new_targets.iter().cloned());
        self.new_targets = new_targets;
    }

    /// Assign the final answer.
    ///
    /// # Errors
    /// Returns `EngineError::InvalidState` if an answer was already set.
    pub fn set_answer(&mut self, answer: impl Into<String>) -> Result<(), EngineError> {
        if self.answered {
            return Err(EngineError::InvalidState(
                "answer has already been set for this run".to_string(),
            ));
        }
        self.answer = answer.into();
        self.answered = true;
        Ok(())
    }

    /// Split into (answer, documents, processed_targets)
    pub fn into_parts(self) -> (String, Vec<String>, Vec<String>) {
        (self.answer, self.documents, self.processed_targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_is_empty() {
        let state = RunState::new("what is rag?", 2);
        assert_eq!(state.question(), "what is rag?");
        assert!(state.documents().is_empty());
        assert_eq!(state.recursion_depth(), 0);
        assert_eq!(state.max_recursions(), 2);
        assert!(state.processed_targets().is_empty());
        assert!(state.new_targets().is_empty());
        assert_eq!(state.answer(), "");
        assert!(!state.is_answered());
    }

    #[test]
    fn test_next_query_selection() {
        let mut state = RunState::new("question", 3);
        assert_eq!(state.next_query(), "question");

        // Targets recorded before the first retrieval are ignored
        state.record_targets(vec!["early".to_string()]);
        assert_eq!(state.next_query(), "question");

        state.complete_retrieval();
        assert_eq!(state.next_query(), "early");

        state.record_targets(vec!["first".to_string(), "second".to_string()]);
        assert_eq!(state.next_query(), "first");

        state.record_targets(Vec::new());
        assert_eq!(state.next_query(), "question");
    }

    #[test]
    fn test_documents_append_in_order() {
        let mut state = RunState::new("q", 2);
        assert_eq!(state.append_documents(vec!["a".into(), "b".into()]), 2);
        assert_eq!(state.append_documents(Vec::new()), 0);
        assert_eq!(state.append_documents(vec!["a".into()]), 1);
        assert_eq!(state.documents(), &["a", "b", "a"]);
    }

    #[test]
    fn test_record_targets_appends_without_dedup() {
        let mut state = RunState::new("q", 2);
        state.record_targets(vec!["x".into(), "y".into()]);
        state.record_targets(vec!["y".into()]);

        assert_eq!(state.new_targets(), &["y"]);
        assert_eq!(state.processed_targets(), &["x", "y", "y"]);
    }

    #[test]
    fn test_answer_is_set_once() {
        let mut state = RunState::new("q", 2);
        state.set_answer("first").unwrap();
        assert_eq!(state.answer(), "first");

        let err = state.set_answer("second").unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));
        assert_eq!(state.answer(), "first");
    }

    #[test]
    fn test_empty_answer_still_counts_as_answered() {
        let mut state = RunState::new("q", 2);
        state.set_answer("").unwrap();
        assert!(state.is_answered());
        assert!(state.set_answer("again").is_err());
    }
}
