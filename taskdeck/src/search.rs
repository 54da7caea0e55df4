//! Case-insensitive substring filter over task text.

use taskdeck_proto::task::Task;

/// A normalized search term. An empty term matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilter {
    term: String,
}

impl SearchFilter {
    #[must_use]
    pub fn new(term: &str) -> Self {
        Self {
            term: term.trim().to_lowercase(),
        }
    }

    #[must_use]
    pub fn term(&self) -> &str {
        &self.term
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.term.is_empty()
    }

    #[must_use]
    pub fn matches(&self, text: &str) -> bool {
        !self.is_active() || text.to_lowercase().contains(&self.term)
    }

    /// Tasks whose text matches, in their original order.
    #[must_use]
    pub fn apply<'a>(&self, tasks: &'a [Task]) -> Vec<&'a Task> {
        tasks.iter().filter(|t| self.matches(&t.text)).collect()
    }
}
