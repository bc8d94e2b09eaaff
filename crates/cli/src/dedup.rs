use sha2::{Digest, Sha256};

/// Remembers the last submitted recording so an accidental resubmission of the
/// same audio does not start a second turn.
#[derive(Debug, Default)]
pub struct SubmissionFilter {
    last: Option<Vec<u8>>,
}

impl SubmissionFilter {
    /// Returns `true` if `audio` is new and should be processed.
    pub fn accept(&mut self, audio: &[u8]) -> bool {
        let digest = Sha256::digest(audio).to_vec();
        if self.last.as_ref() == Some(&digest) {
            return false;
        }
        self.last = Some(digest);
        true
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_audio_is_skipped() {
        let mut filter = SubmissionFilter::default();
        assert!(filter.accept(b"first"));
        assert!(!filter.accept(b"first"));
        assert!(filter.accept(b"second"));
        assert!(filter.accept(b"first"));
    }

    #[test]
    fn reset_allows_resubmission() {
        let mut filter = SubmissionFilter::default();
        assert!(filter.accept(b"clip"));
        filter.reset();
        assert!(filter.accept(b"clip"));
    }
}
