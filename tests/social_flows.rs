// Social graph, feed, and engagement behavior over a real database

mod common;

use common::{create_profile, setup};
use feedhub::error::AppError;
use feedhub::models::FeedFilter;
use feedhub::posts::CreatePostOutcome;

fn created_post_id(outcome: CreatePostOutcome) -> i64 {
    match outcome {
        CreatePostOutcome::Created(post) => post.id,
        CreatePostOutcome::Scheduled { .. } => panic!("expected an immediate post"),
    }
}

async fn publish(ctx: &common::TestContext, author: i64, content: &str) -> i64 {
    created_post_id(
        ctx.posts
            .create_post(author, content, None, None)
            .await
            .unwrap(),
    )
}

#[tokio::test]
async fn test_follow_lifecycle() {
    let ctx = setup().await;
    let alice = create_profile(&ctx, "alice").await;
    let bob = create_profile(&ctx, "bob").await;

    ctx.graph.follow(alice.id, bob.id).await.unwrap();
    assert!(ctx.graph.is_following(alice.id, bob.id).await.unwrap());
    // Follows are directed
    assert!(!ctx.graph.is_following(bob.id, alice.id).await.unwrap());

    // A repeated follow is an explicit error, not a silent no-op
    let err = ctx.graph.follow(alice.id, bob.id).await.unwrap_err();
    assert!(matches!(err, AppError::AlreadyFollowing));

    ctx.graph.unfollow(alice.id, bob.id).await.unwrap();
    assert!(!ctx.graph.is_following(alice.id, bob.id).await.unwrap());

    let err = ctx.graph.unfollow(alice.id, bob.id).await.unwrap_err();
    assert!(matches!(err, AppError::NotFollowing));
}

#[tokio::test]
async fn test_self_follow_rejected() {
    let ctx = setup().await;
    let alice = create_profile(&ctx, "alice").await;

    let err = ctx.graph.follow(alice.id, alice.id).await.unwrap_err();
    assert!(matches!(err, AppError::SelfFollow));
}

#[tokio::test]
async fn test_follow_requires_existing_profiles() {
    let ctx = setup().await;
    let alice = create_profile(&ctx, "alice").await;

    let err = ctx.graph.follow(alice.id, 9999).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_feed_visibility_set() {
    let ctx = setup().await;
    let alice = create_profile(&ctx, "alice").await;
    let bob = create_profile(&ctx, "bob").await;
    let carol = create_profile(&ctx, "carol").await;

    ctx.graph.follow(alice.id, bob.id).await.unwrap();

    let p1 = publish(&ctx, bob.id, "hello").await;
    let p2 = publish(&ctx, carol.id, "unseen").await;
    let own = publish(&ctx, alice.id, "my own post").await;

    let feed = ctx.feed.feed(alice.id, &FeedFilter::default()).await.unwrap();
    let ids: Vec<i64> = feed.iter().map(|p| p.id).collect();

    assert!(ids.contains(&p1));
    assert!(ids.contains(&own));
    // carol is not followed, so her post stays invisible
    assert!(!ids.contains(&p2));

    // Repeated reads are stable absent intervening mutation
    let again = ctx.feed.feed(alice.id, &FeedFilter::default()).await.unwrap();
    let again_ids: Vec<i64> = again.iter().map(|p| p.id).collect();
    assert_eq!(ids, again_ids);
}

#[tokio::test]
async fn test_feed_ordering_newest_first() {
    let ctx = setup().await;
    let bob = create_profile(&ctx, "bob").await;

    let first = publish(&ctx, bob.id, "first").await;
    let second = publish(&ctx, bob.id, "second").await;
    let third = publish(&ctx, bob.id, "third").await;

    let feed = ctx.feed.feed(bob.id, &FeedFilter::default()).await.unwrap();
    let ids: Vec<i64> = feed.iter().map(|p| p.id).collect();

    // created_at descending, id descending on ties
    assert_eq!(ids, vec![third, second, first]);
}

#[tokio::test]
async fn test_feed_filters() {
    let ctx = setup().await;
    let alice = create_profile(&ctx, "alice").await;
    let bob = create_profile(&ctx, "bobby_tables").await;

    ctx.graph.follow(alice.id, bob.id).await.unwrap();
    publish(&ctx, bob.id, "Hello World").await;
    publish(&ctx, alice.id, "something else").await;

    // Case-insensitive substring on author username
    let filter = FeedFilter {
        author: Some("BOBBY".to_string()),
        title: None,
    };
    let feed = ctx.feed.feed(alice.id, &filter).await.unwrap();
    assert_eq!(feed.len(), 1);
    assert_eq!(feed[0].author, "bobby_tables");

    // Case-insensitive substring on content
    let filter = FeedFilter {
        author: None,
        title: Some("hello".to_string()),
    };
    let feed = ctx.feed.feed(alice.id, &filter).await.unwrap();
    assert_eq!(feed.len(), 1);
    assert_eq!(feed[0].content, "Hello World");

    // A filter matching nothing narrows to empty, not an error
    let filter = FeedFilter {
        author: None,
        title: Some("absent".to_string()),
    };
    let feed = ctx.feed.feed(alice.id, &filter).await.unwrap();
    assert!(feed.is_empty());
}

#[tokio::test]
async fn test_empty_feed_is_ok() {
    let ctx = setup().await;
    let loner = create_profile(&ctx, "loner").await;

    let feed = ctx.feed.feed(loner.id, &FeedFilter::default()).await.unwrap();
    assert!(feed.is_empty());
}

#[tokio::test]
async fn test_toggle_like_is_its_own_inverse() {
    let ctx = setup().await;
    let alice = create_profile(&ctx, "alice").await;
    let bob = create_profile(&ctx, "bob").await;
    let post = publish(&ctx, bob.id, "likeable").await;

    let outcome = ctx.engagement.toggle_like(alice.id, post).await.unwrap();
    assert!(outcome.liked);
    assert_eq!(outcome.like_count, 1);

    // Same operation, second call: toggle, not additive
    let outcome = ctx.engagement.toggle_like(alice.id, post).await.unwrap();
    assert!(!outcome.liked);
    assert_eq!(outcome.like_count, 0);
}

#[tokio::test]
async fn test_liked_posts_survive_unfollow() {
    let ctx = setup().await;
    let alice = create_profile(&ctx, "alice").await;
    let bob = create_profile(&ctx, "bob").await;

    ctx.graph.follow(alice.id, bob.id).await.unwrap();
    let post = publish(&ctx, bob.id, "memorable").await;
    ctx.engagement.toggle_like(alice.id, post).await.unwrap();

    ctx.graph.unfollow(alice.id, bob.id).await.unwrap();

    // Likes are not scoped by the visibility set
    let liked = ctx.feed.liked_posts(alice.id).await.unwrap();
    assert_eq!(liked.len(), 1);
    assert_eq!(liked[0].id, post);

    // ...even though the post is gone from the feed
    let feed = ctx.feed.feed(alice.id, &FeedFilter::default()).await.unwrap();
    assert!(feed.is_empty());
}

#[tokio::test]
async fn test_comments_ordered_and_validated() {
    let ctx = setup().await;
    let alice = create_profile(&ctx, "alice").await;
    let bob = create_profile(&ctx, "bob").await;
    ctx.graph.follow(alice.id, bob.id).await.unwrap();
    let post = publish(&ctx, bob.id, "discuss").await;

    let c1 = ctx.engagement.add_comment(alice.id, post, "first").await.unwrap();
    let c2 = ctx.engagement.add_comment(bob.id, post, "second").await.unwrap();
    let c3 = ctx.engagement.add_comment(alice.id, post, "  third  ").await.unwrap();
    // Content is stored trimmed
    assert_eq!(c3.content, "third");

    let detail = ctx.posts.get_post(alice.id, post).await.unwrap();
    let ids: Vec<i64> = detail.comments.iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![c3.id, c2.id, c1.id]);

    let err = ctx
        .engagement
        .add_comment(alice.id, post, "   ")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::EmptyComment));

    // The rejected comment left nothing behind
    let detail = ctx.posts.get_post(alice.id, post).await.unwrap();
    assert_eq!(detail.comments.len(), 3);
}

#[tokio::test]
async fn test_feed_rows_carry_engagement_counts() {
    let ctx = setup().await;
    let alice = create_profile(&ctx, "alice").await;
    let bob = create_profile(&ctx, "bob").await;
    ctx.graph.follow(alice.id, bob.id).await.unwrap();

    let post = publish(&ctx, bob.id, "counted").await;
    ctx.engagement.toggle_like(alice.id, post).await.unwrap();
    ctx.engagement.add_comment(alice.id, post, "nice").await.unwrap();
    ctx.engagement.add_comment(bob.id, post, "thanks").await.unwrap();

    let feed = ctx.feed.feed(alice.id, &FeedFilter::default()).await.unwrap();
    assert_eq!(feed[0].likes, 1);
    assert_eq!(feed[0].comments, 2);
}

#[tokio::test]
async fn test_post_detail_respects_visibility() {
    let ctx = setup().await;
    let alice = create_profile(&ctx, "alice").await;
    let carol = create_profile(&ctx, "carol").await;
    let post = publish(&ctx, carol.id, "private-ish").await;

    // Not followed: reads as missing, no existence signal
    let err = ctx.posts.get_post(alice.id, post).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    ctx.graph.follow(alice.id, carol.id).await.unwrap();
    let detail = ctx.posts.get_post(alice.id, post).await.unwrap();
    assert_eq!(detail.author, "carol");
}

#[tokio::test]
async fn test_profile_listing_and_detail() {
    let ctx = setup().await;
    let alice = create_profile(&ctx, "alice").await;
    let bob = create_profile(&ctx, "bob").await;
    let carol = create_profile(&ctx, "caroline").await;

    ctx.graph.follow(alice.id, bob.id).await.unwrap();
    ctx.graph.follow(carol.id, bob.id).await.unwrap();

    // Case-insensitive username filter
    let found = ctx.profiles.list_profiles(Some("CARO")).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].username, "caroline");

    let all = ctx.profiles.list_profiles(None).await.unwrap();
    assert_eq!(all.len(), 3);
    let bob_row = all.iter().find(|p| p.username == "bob").unwrap();
    assert_eq!(bob_row.followers, 2);
    assert_eq!(bob_row.following, 0);

    let detail = ctx.profiles.get_detail(bob.id).await.unwrap();
    assert_eq!(detail.followers, vec!["alice", "caroline"]);
    assert!(detail.following.is_empty());
}

#[tokio::test]
async fn test_profile_update_owner_only() {
    let ctx = setup().await;
    let alice = create_profile(&ctx, "alice").await;
    let bob = create_profile(&ctx, "bob").await;

    let err = ctx
        .profiles
        .update_profile(alice.id, bob.id, None, Some("hijacked"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::PermissionDenied));

    let updated = ctx
        .profiles
        .update_profile(alice.id, alice.id, None, Some("about me"))
        .await
        .unwrap();
    assert_eq!(updated.biography, "about me");
    assert_eq!(updated.username, "alice");

    // Usernames stay unique across updates
    let err = ctx
        .profiles
        .update_profile(alice.id, alice.id, Some("bob"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn test_duplicate_username_rejected() {
    let ctx = setup().await;
    create_profile(&ctx, "alice").await;

    let err = ctx.profiles.create_profile(2, "alice", "").await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn test_delete_post_cascades() {
    let ctx = setup().await;
    let alice = create_profile(&ctx, "alice").await;
    let bob = create_profile(&ctx, "bob").await;
    ctx.graph.follow(alice.id, bob.id).await.unwrap();

    let post = publish(&ctx, bob.id, "ephemeral").await;
    ctx.engagement.add_comment(alice.id, post, "gone soon").await.unwrap();
    ctx.engagement.toggle_like(alice.id, post).await.unwrap();

    // Only the owner may delete
    let err = ctx.posts.delete_post(alice.id, post).await.unwrap_err();
    assert!(matches!(err, AppError::PermissionDenied));

    ctx.posts.delete_post(bob.id, post).await.unwrap();

    assert!(ctx.db.get_post(post).await.unwrap().is_none());
    assert!(ctx.db.comments_for_post(post).await.unwrap().is_empty());
    assert!(ctx.feed.liked_posts(alice.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_attach_image_owner_only() {
    let ctx = setup().await;
    let alice = create_profile(&ctx, "alice").await;
    let bob = create_profile(&ctx, "bob").await;
    let post = publish(&ctx, bob.id, "picture this").await;

    let err = ctx
        .posts
        .attach_image(alice.id, post, b"not yours")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::PermissionDenied));

    let image_ref = ctx.posts.attach_image(bob.id, post, b"bytes").await.unwrap();
    assert_eq!(image_ref, format!("posts/{}.img", post));

    let stored = ctx.db.get_post(post).await.unwrap().unwrap();
    assert_eq!(stored.image_ref.as_deref(), Some(image_ref.as_str()));
}
