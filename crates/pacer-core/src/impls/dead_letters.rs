use parking_lot::Mutex;

use crate::domain::PacerError;
use crate::ports::{DeadLetter, DeadLetterSink};

/// Keeps dead letters in memory and mirrors each one to the log.
#[derive(Default)]
pub struct InMemoryDeadLetters {
    letters: Mutex<Vec<DeadLetter>>,
}

impl InMemoryDeadLetters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<DeadLetter> {
        self.letters.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.letters.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.letters.lock().is_empty()
    }
}

impl DeadLetterSink for InMemoryDeadLetters {
    fn record(&self, letter: DeadLetter) -> Result<(), PacerError> {
        tracing::warn!(
            task = %letter.task.id(),
            url = %letter.task.url(),
            attempt = letter.task.attempt(),
            reason = %letter.reason,
            "dead-lettered"
        );
        self.letters.lock().push(letter);
        Ok(())
    }
}
