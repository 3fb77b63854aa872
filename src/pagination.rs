//! Listing/Pagination service over the post store.

use serde::Deserialize;

use crate::{error::Result, models::PostPage, repository::Repository};

/// PageQuery
///
/// Query parameters accepted by the listing endpoint (GET /?page_index=N).
#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct PageQuery {
    /// 1-indexed page number, defaults to 1.
    pub page_index: Option<u32>,
}

/// Number of pages needed to show `total` posts, `page_size` at a time.
pub fn total_pages(total: i64, page_size: u32) -> u32 {
    if total <= 0 || page_size == 0 {
        return 0;
    }
    let size = i64::from(page_size);
    ((total + size - 1) / size) as u32
}

/// list_posts
///
/// Returns one page of posts, newest first. Nothing is clamped: a page index of
/// zero or past the last page yields an empty list with the same page count.
pub async fn list_posts(repo: &dyn Repository, page_index: u32, page_size: u32) -> Result<PostPage> {
    let total = repo.count_posts().await?;
    let total_pages = total_pages(total, page_size);

    let posts = if page_index == 0 || page_index > total_pages {
        Vec::new()
    } else {
        let offset = i64::from(page_index - 1) * i64::from(page_size);
        repo.list_posts(i64::from(page_size), offset).await?
    };

    Ok(PostPage {
        posts,
        page_index,
        total_pages,
    })
}
