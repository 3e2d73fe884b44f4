//! AT protocol response shapes and their record mapping

use keyharvest_core::{Record, Value};
use serde::Deserialize;

/// Field identifying a post across searches.
pub const DEDUP_FIELD: &str = "uri";

/// `com.atproto.server.createSession` output (the parts we use).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub access_jwt: String,
    pub did: String,
    pub handle: String,
}

/// `app.bsky.feed.searchPosts` output.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchPage {
    #[serde(default)]
    pub posts: Vec<PostView>,
    #[serde(default)]
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostView {
    pub uri: String,
    pub author: Author,
    #[serde(default)]
    pub record: PostRecord,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub did: String,
    pub handle: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// The `app.bsky.feed.post` record embedded in a post view.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostRecord {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl PostView {
    /// Flatten into the stored record layout.
    pub fn to_record(&self, keyword: &str) -> Record {
        Record::new()
            .with("keyword", keyword)
            .with("uri", self.uri.as_str())
            .with("author", self.author.handle.as_str())
            .with("display_name", self.author.display_name.as_deref())
            .with("did", self.author.did.as_str())
            .with("text", self.record.text.as_str())
            .with(
                "created_at",
                self.record.created_at.as_deref().map(Value::timestamp_or_text),
            )
            .with("bio", self.author.description.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"{
        "cursor": "25",
        "hitsTotal": 1234,
        "posts": [
            {
                "uri": "at://did:plc:abc/app.bsky.feed.post/3k1",
                "cid": "bafy",
                "author": {
                    "did": "did:plc:abc",
                    "handle": "analyst.bsky.social",
                    "displayName": "Analyst",
                    "description": "Sanctions and AML"
                },
                "record": {
                    "$type": "app.bsky.feed.post",
                    "text": "New FATF guidance on NPOs",
                    "createdAt": "2024-03-01T12:30:00.000Z"
                },
                "indexedAt": "2024-03-01T12:30:01.000Z"
            },
            {
                "uri": "at://did:plc:def/app.bsky.feed.post/3k2",
                "author": { "did": "did:plc:def", "handle": "anon.bsky.social" },
                "record": { "text": "", "createdAt": "yesterday" }
            }
        ]
    }"#;

    #[test]
    fn parses_search_page() {
        let page: SearchPage = serde_json::from_str(PAGE).unwrap();
        assert_eq!(page.cursor.as_deref(), Some("25"));
        assert_eq!(page.posts.len(), 2);
        assert_eq!(page.posts[1].author.display_name, None);
    }

    #[test]
    fn record_layout() {
        let page: SearchPage = serde_json::from_str(PAGE).unwrap();
        let record = page.posts[0].to_record("fatf");
        let fields: Vec<&str> = record.fields().collect();
        assert_eq!(
            fields,
            ["keyword", "uri", "author", "display_name", "did", "text", "created_at", "bio"]
        );
        assert_eq!(record.get("author").as_str(), Some("analyst.bsky.social"));
        assert!(matches!(record.get("created_at"), Value::Timestamp(_)));
        assert_eq!(record.get("bio").as_str(), Some("Sanctions and AML"));
    }

    #[test]
    fn missing_optional_fields_are_null() {
        let page: SearchPage = serde_json::from_str(PAGE).unwrap();
        let record = page.posts[1].to_record("fatf");
        assert!(record.get("display_name").is_null());
        assert!(record.get("bio").is_null());
        // Unparseable timestamps are kept verbatim
        assert_eq!(record.get("created_at").as_str(), Some("yesterday"));
    }

    #[test]
    fn empty_page_defaults() {
        let page: SearchPage = serde_json::from_str("{}").unwrap();
        assert!(page.posts.is_empty());
        assert!(page.cursor.is_none());
    }

    #[test]
    fn parses_session() {
        let session: Session = serde_json::from_str(
            r#"{"accessJwt":"a","refreshJwt":"r","did":"did:plc:x","handle":"me.bsky.social"}"#,
        )
        .unwrap();
        assert_eq!(session.access_jwt, "a");
    }
}
