//! Post composer dialog state.

use crate::models::{Community, CreatePostRequest};

/// Reasons a draft cannot be submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftError {
    MissingTitle,
    MissingContent,
    MissingCommunity,
}

impl std::fmt::Display for DraftError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DraftError::MissingTitle => write!(f, "Please add a title"),
            DraftError::MissingContent => write!(f, "Please write something"),
            DraftError::MissingCommunity => write!(f, "Please pick a community"),
        }
    }
}

impl std::error::Error for DraftError {}

/// The draft behind the "new post" dialog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostComposer {
    pub title: String,
    pub content: String,
    pub community_id: Option<String>,
    pub is_anonymous: bool,
    open: bool,
}

impl PostComposer {
    pub fn open(&mut self) {
        self.open = true;
    }

    pub fn close(&mut self) {
        self.open = false;
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Pre-select the first community when nothing is chosen yet.
    pub fn select_default_community(&mut self, communities: &[Community]) {
        if self.community_id.is_none() {
            self.community_id = communities.first().map(|c| c.id.clone());
        }
    }

    /// Turn the draft into a request. Whitespace-only fields count as empty.
    pub fn validate(&self) -> Result<CreatePostRequest, DraftError> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(DraftError::MissingTitle);
        }
        let content = self.content.trim();
        if content.is_empty() {
            return Err(DraftError::MissingContent);
        }
        let community_id = self
            .community_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or(DraftError::MissingCommunity)?;

        Ok(CreatePostRequest {
            title: title.to_string(),
            content: content.to_string(),
            community_id: community_id.to_string(),
            is_anonymous: self.is_anonymous,
        })
    }

    /// Clear the draft and close the dialog. The community choice is kept.
    pub fn reset(&mut self) {
        self.title.clear();
        self.content.clear();
        self.is_anonymous = false;
        self.open = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn communities() -> Vec<Community> {
        vec![
            Community {
                id: "c1".to_string(),
                name: "Academics".to_string(),
            },
            Community {
                id: "c2".to_string(),
                name: "Sports".to_string(),
            },
        ]
    }

    #[test]
    fn test_validate_rejects_blank_fields() {
        let mut composer = PostComposer::default();
        assert_eq!(composer.validate(), Err(DraftError::MissingTitle));

        composer.title = "  Lab partner?  ".to_string();
        composer.content = " \n ".to_string();
        assert_eq!(composer.validate(), Err(DraftError::MissingContent));

        composer.content = "Need one for DSP".to_string();
        assert_eq!(composer.validate(), Err(DraftError::MissingCommunity));

        composer.community_id = Some("c1".to_string());
        let request = composer.validate().unwrap();
        assert_eq!(request.title, "Lab partner?");
        assert_eq!(request.community_id, "c1");
        assert!(!request.is_anonymous);
    }

    #[test]
    fn test_default_community_is_first() {
        let mut composer = PostComposer::default();
        composer.select_default_community(&communities());
        assert_eq!(composer.community_id.as_deref(), Some("c1"));

        composer.community_id = Some("c2".to_string());
        composer.select_default_community(&communities());
        assert_eq!(composer.community_id.as_deref(), Some("c2"));

        let mut empty = PostComposer::default();
        empty.select_default_community(&[]);
        assert!(empty.community_id.is_none());
    }

    #[test]
    fn test_reset_clears_and_closes() {
        let mut composer = PostComposer::default();
        composer.open();
        composer.title = "t".to_string();
        composer.content = "c".to_string();
        composer.is_anonymous = true;
        composer.community_id = Some("c2".to_string());

        composer.reset();
        assert!(!composer.is_open());
        assert!(composer.title.is_empty());
        assert!(composer.content.is_empty());
        assert!(!composer.is_anonymous);
        assert_eq!(composer.community_id.as_deref(), Some("c2"));
    }
}
