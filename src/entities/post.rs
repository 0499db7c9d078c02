use crate::core::Document;
use serde::{Deserialize, Serialize};

/// A content page addressed by its `slug`, which is unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub title: String,
    pub slug: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_id: Option<String>,
    #[serde(default)]
    pub published: bool,
}

impl Post {
    pub fn new(title: impl Into<String>, slug: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            slug: slug.into(),
            content: String::new(),
            author_id: None,
            published: false,
        }
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn author(mut self, author_id: impl Into<String>) -> Self {
        self.author_id = Some(author_id.into());
        self
    }

    pub fn published(mut self, published: bool) -> Self {
        self.published = published;
        self
    }
}

impl Document for Post {
    const UNIQUE_FIELD: &'static str = "slug";

    fn unique_key(&self) -> &str {
        &self.slug
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Record;
    use serde_json::json;

    #[test]
    fn optional_fields_default_when_missing() {
        let post: Post = serde_json::from_value(json!({
            "title": "Hello",
            "slug": "hello"
        }))
        .unwrap();

        assert_eq!(post, Post::new("Hello", "hello"));
        assert_eq!(post.unique_key(), "hello");
    }

    #[test]
    fn record_flattens_camel_case_fields() {
        let record = Record::new(
            Post::new("Hello", "hello")
                .content("first post")
                .author("user-1")
                .published(true),
        );
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["authorId"], json!("user-1"));
        assert_eq!(value["published"], json!(true));
        assert_eq!(value["slug"], json!("hello"));

        let decoded: Record<Post> = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, record);
    }
}
