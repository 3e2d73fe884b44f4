//! Live search against bsky.social.
//!
//! Requires network access plus BLUESKY_USERNAME / BLUESKY_APP_PASSWORD.
//! Run with: cargo test -p keyharvest-bluesky --test live -- --ignored

use keyharvest_batch::SourceAdapter;
use keyharvest_bluesky::{BlueskyAdapter, Config};

#[test]
#[ignore]
fn search_returns_posts() {
    let config = Config::default().with_env_credentials();
    let adapter = BlueskyAdapter::new(config).expect("credentials in environment");
    adapter.login().expect("login");

    let set = adapter.fetch("counter-terrorism financing", 30).expect("search");

    assert!(set.len() <= 30);
    for record in &set {
        assert!(record.get("uri").as_str().is_some_and(|u| u.starts_with("at://")));
        assert_eq!(record.get("keyword").as_str(), Some("counter-terrorism financing"));
    }
}
