/// User-entered text collected across the Input and Target steps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmissionDraft {
    pub resume_text: String,
    pub job_description_text: String,
}

impl SubmissionDraft {
    pub fn resume_chars(&self) -> usize {
        self.resume_text.trim().chars().count()
    }

    pub fn job_description_chars(&self) -> usize {
        self.job_description_text.trim().chars().count()
    }

    pub fn clear(&mut self) {
        self.resume_text.clear();
        self.job_description_text.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_trimmed_characters() {
        let draft = SubmissionDraft {
            resume_text: "  héllo \n".to_string(),
            job_description_text: "\t\n".to_string(),
        };
        assert_eq!(draft.resume_chars(), 5);
        assert_eq!(draft.job_description_chars(), 0);
    }
}
