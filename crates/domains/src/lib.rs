//! lostboard/crates/domains/src/lib.rs
//!
//! Domain models, the backend query language and the port traits of the
//! campus lost-and-found board. Nothing in here performs I/O.

pub mod error;
pub mod models;
pub mod ports;
pub mod query;

// Re-exporting for easier access in other crates
pub use error::*;
pub use models::*;
pub use ports::*;
pub use query::*;

#[cfg(test)]
mod tests {
    use super::models::*;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn test_anonymous_comment_hides_author() {
        let comment = Comment {
            id: 1,
            post_id: 7,
            user_id: Some(Uuid::new_v4()),
            content: "我在图书馆三楼见过".to_string(),
            is_anonymous: true,
            created_at: Utc::now(),
            author: Some(ProfileRef {
                id: None,
                nickname: Some("小王".into()),
                avatar_url: Some("https://cdn.example/avatar.png".into()),
            }),
        };

        let view = comment.author();
        assert_eq!(view.name, ANONYMOUS_NAME);
        assert!(view.avatar_url.is_none());
    }

    #[test]
    fn test_named_comment_uses_profile() {
        let comment = Comment {
            id: 2,
            post_id: 7,
            user_id: Some(Uuid::new_v4()),
            content: "谢谢".to_string(),
            is_anonymous: false,
            created_at: Utc::now(),
            author: Some(ProfileRef {
                id: None,
                nickname: None,
                avatar_url: Some("https://cdn.example/a.png".into()),
            }),
        };

        let view = comment.author();
        assert_eq!(view.name, DEFAULT_NICKNAME);
        assert_eq!(view.avatar_url.as_deref(), Some("https://cdn.example/a.png"));
    }
}
