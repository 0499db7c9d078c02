use crate::core::Document;
use crate::entities::{Post, User};
use serde::Deserialize;
use serde::de::DeserializeOwned;

/// A document type exposed over HTTP: payload validation plus partial
/// updates.
pub trait Resource: Document {
    /// Body of a `PATCH` request; every field optional.
    type Patch: DeserializeOwned + Send + 'static;

    fn validate(&self) -> Result<(), String>;

    fn apply_patch(&mut self, patch: Self::Patch);
}

#[derive(Debug, Default, Deserialize)]
pub struct UserPatch {
    pub name: Option<String>,
    pub email: Option<String>,
}

impl Resource for User {
    type Patch = UserPatch;

    fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name must not be empty".to_string());
        }
        let email = self.email.trim();
        if email.len() != self.email.len() {
            return Err("email must not have surrounding whitespace".to_string());
        }
        match email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
            _ => Err(format!("email '{}' is not a valid address", self.email)),
        }
    }

    fn apply_patch(&mut self, patch: UserPatch) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(email) = patch.email {
            self.email = email;
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostPatch {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub content: Option<String>,
    pub author_id: Option<String>,
    pub published: Option<bool>,
}

impl Resource for Post {
    type Patch = PostPatch;

    fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("title must not be empty".to_string());
        }
        let valid_slug = !self.slug.is_empty()
            && self
                .slug
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        if !valid_slug {
            return Err(format!(
                "slug '{}' must be non-empty lowercase letters, digits or '-'",
                self.slug
            ));
        }
        Ok(())
    }

    fn apply_patch(&mut self, patch: PostPatch) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(slug) = patch.slug {
            self.slug = slug;
        }
        if let Some(content) = patch.content {
            self.content = content;
        }
        if let Some(author_id) = patch.author_id {
            self.author_id = Some(author_id);
        }
        if let Some(published) = patch.published {
            self.published = published;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_validation() {
        assert!(User::new("Ann", "ann@x.com").validate().is_ok());
        assert!(User::new("  ", "ann@x.com").validate().is_err());
        assert!(User::new("Ann", "ann.x.com").validate().is_err());
        assert!(User::new("Ann", "@x.com").validate().is_err());
        assert!(User::new("Ann", " ann@x.com").validate().is_err());
    }

    #[test]
    fn post_validation() {
        assert!(Post::new("Hello", "hello-world-2").validate().is_ok());
        assert!(Post::new("", "hello").validate().is_err());
        assert!(Post::new("Hello", "Hello World").validate().is_err());
        assert!(Post::new("Hello", "").validate().is_err());
    }

    #[test]
    fn patch_only_touches_present_fields() {
        let mut user = User::new("Ann", "ann@x.com");
        user.apply_patch(UserPatch {
            name: Some("Annie".to_string()),
            email: None,
        });
        assert_eq!(user, User::new("Annie", "ann@x.com"));

        let mut post = Post::new("Hello", "hello");
        post.apply_patch(PostPatch {
            published: Some(true),
            ..PostPatch::default()
        });
        assert!(post.published);
        assert_eq!(post.slug, "hello");
    }
}
