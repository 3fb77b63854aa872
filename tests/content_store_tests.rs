use chrono::NaiveDate;
use quill_blog::{
    AppError, MemoryRepository,
    models::{PostFields, User},
    pagination,
    repository::{NewUser, Repository},
};

// --- Helpers ---

fn fields(title: &str) -> PostFields {
    PostFields {
        title: title.to_string(),
        subtitle: format!("{title} subtitle"),
        body: "<p>Lorem ipsum</p>".to_string(),
        img_url: "https://images.example.com/a.jpg".to_string(),
    }
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, d).unwrap()
}

async fn seeded_author(repo: &MemoryRepository) -> User {
    repo.create_user(NewUser {
        email: "owner@example.com".to_string(),
        name: "owner".to_string(),
        password_hash: "$argon2id$placeholder".to_string(),
    })
    .await
    .unwrap()
}

// --- Posts ---

#[tokio::test]
async fn test_create_and_fetch_post() {
    let repo = MemoryRepository::new();
    let author = seeded_author(&repo).await;

    let created = repo.create_post(author.id, fields("Hello"), day(17)).await.unwrap();
    assert_eq!(created.author_name, "owner");
    assert_eq!(created.date, day(17));

    let fetched = repo.get_post(created.id).await.unwrap().unwrap();
    assert_eq!(fetched, created);
    assert!(repo.get_post(created.id + 1).await.unwrap().is_none());
}

#[tokio::test]
async fn test_post_for_missing_author_is_rejected() {
    let repo = MemoryRepository::new();
    let result = repo.create_post(42, fields("Orphan"), day(1)).await;
    assert!(matches!(result, Err(AppError::NotFound)));
}

#[tokio::test]
async fn test_duplicate_title_rejected_on_create_and_update() {
    let repo = MemoryRepository::new();
    let author = seeded_author(&repo).await;
    repo.create_post(author.id, fields("Taken"), day(1)).await.unwrap();
    let other = repo.create_post(author.id, fields("Other"), day(2)).await.unwrap();

    let dup = repo.create_post(author.id, fields("Taken"), day(3)).await;
    assert!(matches!(dup, Err(AppError::DuplicateTitle)));

    let renamed = repo.update_post(other.id, fields("Taken")).await;
    assert!(matches!(renamed, Err(AppError::DuplicateTitle)));

    // keeping its own title is not a conflict
    let same = repo.update_post(other.id, fields("Other")).await.unwrap();
    assert!(same.is_some());
}

#[tokio::test]
async fn test_concurrent_duplicate_titles_single_winner() {
    let repo = MemoryRepository::new();
    let author = seeded_author(&repo).await;

    let (a, b) = tokio::join!(
        repo.create_post(author.id, fields("Race"), day(5)),
        repo.create_post(author.id, fields("Race"), day(5)),
    );

    assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
    assert_eq!(repo.count_posts().await.unwrap(), 1);
}

#[tokio::test]
async fn test_update_keeps_author_and_date() {
    let repo = MemoryRepository::new();
    let author = seeded_author(&repo).await;
    let post = repo.create_post(author.id, fields("Before"), day(3)).await.unwrap();

    let updated = repo
        .update_post(post.id, fields("After"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.title, "After");
    assert_eq!(updated.date, post.date);
    assert_eq!(updated.author_id, post.author_id);

    assert!(repo.update_post(999, fields("Nope")).await.unwrap().is_none());
}

#[tokio::test]
async fn test_delete_removes_post_and_comments() {
    let repo = MemoryRepository::new();
    let author = seeded_author(&repo).await;
    let doomed = repo.create_post(author.id, fields("Doomed"), day(1)).await.unwrap();
    let kept = repo.create_post(author.id, fields("Kept"), day(2)).await.unwrap();

    repo.add_comment(doomed.id, author.id, "first".into()).await.unwrap();
    repo.add_comment(kept.id, author.id, "stays".into()).await.unwrap();

    assert!(repo.delete_post(doomed.id).await.unwrap());
    assert!(repo.get_post(doomed.id).await.unwrap().is_none());
    assert!(repo.get_comments(doomed.id).await.unwrap().is_empty());
    assert_eq!(repo.get_comments(kept.id).await.unwrap().len(), 1);

    // already gone
    assert!(!repo.delete_post(doomed.id).await.unwrap());
}

// --- Comments ---

#[tokio::test]
async fn test_comments_are_ordered_and_attributed() {
    let repo = MemoryRepository::new();
    let author = seeded_author(&repo).await;
    let reader = repo
        .create_user(NewUser {
            email: "reader@example.com".to_string(),
            name: "reader".to_string(),
            password_hash: "$argon2id$placeholder".to_string(),
        })
        .await
        .unwrap();
    let post = repo.create_post(author.id, fields("Chatty"), day(1)).await.unwrap();

    repo.add_comment(post.id, reader.id, "one".into()).await.unwrap();
    repo.add_comment(post.id, author.id, "two".into()).await.unwrap();

    let comments = repo.get_comments(post.id).await.unwrap();
    let texts: Vec<&str> = comments.iter().map(|c| c.text.as_str()).collect();
    assert_eq!(texts, ["one", "two"]);
    assert_eq!(comments[0].author_name, "reader");
    assert_eq!(comments[1].author_name, "owner");
}

#[tokio::test]
async fn test_comment_on_missing_post_is_not_found() {
    let repo = MemoryRepository::new();
    let author = seeded_author(&repo).await;

    let result = repo.add_comment(7, author.id, "hello".into()).await;
    assert!(matches!(result, Err(AppError::NotFound)));
}

// --- Listing/Pagination ---

#[tokio::test]
async fn test_listing_is_newest_first() {
    let repo = MemoryRepository::new();
    let author = seeded_author(&repo).await;
    for (i, d) in [3, 9, 1, 9].into_iter().enumerate() {
        repo.create_post(author.id, fields(&format!("P{i}")), day(d))
            .await
            .unwrap();
    }

    let page = pagination::list_posts(&repo, 1, 10).await.unwrap();
    let titles: Vec<&str> = page.posts.iter().map(|p| p.title.as_str()).collect();
    // same-day posts fall back to insertion order, newest id first
    assert_eq!(titles, ["P3", "P1", "P0", "P2"]);
}

#[tokio::test]
async fn test_listing_pages_partition_all_posts() {
    let repo = MemoryRepository::new();
    let author = seeded_author(&repo).await;
    for i in 1..=10 {
        repo.create_post(author.id, fields(&format!("Post {i}")), day(i))
            .await
            .unwrap();
    }

    let mut seen = Vec::new();
    for index in 1..=3 {
        let page = pagination::list_posts(&repo, index, 4).await.unwrap();
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.page_index, index);
        seen.extend(page.posts.into_iter().map(|p| p.id));
    }

    assert_eq!(seen.len(), 10);
    seen.sort_unstable();
    seen.dedup();
    assert_eq!(seen.len(), 10);

    let first = pagination::list_posts(&repo, 1, 4).await.unwrap();
    assert_eq!(first.posts[0].title, "Post 10");
}

#[tokio::test]
async fn test_listing_out_of_range_is_empty() {
    let repo = MemoryRepository::new();
    let author = seeded_author(&repo).await;
    for i in 1..=5 {
        repo.create_post(author.id, fields(&format!("Post {i}")), day(i))
            .await
            .unwrap();
    }

    let past = pagination::list_posts(&repo, 3, 4).await.unwrap();
    assert!(past.posts.is_empty());
    assert_eq!(past.total_pages, 2);

    let zero = pagination::list_posts(&repo, 0, 4).await.unwrap();
    assert!(zero.posts.is_empty());
    assert_eq!(zero.total_pages, 2);
}

#[tokio::test]
async fn test_listing_empty_store() {
    let repo = MemoryRepository::new();
    let page = pagination::list_posts(&repo, 1, 4).await.unwrap();
    assert!(page.posts.is_empty());
    assert_eq!(page.total_pages, 0);
}
