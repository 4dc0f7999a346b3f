//! Fixed affirmation list with a wrapping cursor.

use crate::dispatch::EffectRequest;

pub const AFFIRMATIONS: [&str; 3] = [
    "I am calm and in control.",
    "This moment will pass, and I'll be stronger.",
    "I am worthy of peace and happiness.",
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AffirmationRotator {
    index: usize,
}

impl AffirmationRotator {
    pub fn new() -> Self {
        Self { index: 0 }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn current(&self) -> &'static str {
        AFFIRMATIONS[self.index]
    }

    /// Step to the next affirmation, wrapping after the last.
    pub fn advance(&mut self) -> &'static str {
        self.index = (self.index + 1) % AFFIRMATIONS.len();
        self.current()
    }

    pub fn current_effect(&self) -> EffectRequest {
        EffectRequest::ShowAffirmation {
            index: self.index,
            text: self.current().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_at_end() {
        let mut rotator = AffirmationRotator::new();
        assert_eq!(rotator.current(), AFFIRMATIONS[0]);
        assert_eq!(rotator.advance(), AFFIRMATIONS[1]);
        assert_eq!(rotator.advance(), AFFIRMATIONS[2]);
        assert_eq!(rotator.advance(), AFFIRMATIONS[0]);
        assert_eq!(rotator.index(), 0);
    }
}
