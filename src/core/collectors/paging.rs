use std::future::Future;

use crate::core::collectors::CollectorError;

/// One page of a cursor-paginated response.
pub struct Page<T> {
    pub items: T,
    /// Cursor for the following page, `None` when this is the last one.
    pub next: Option<String>,
}

impl<T> Page<T> {
    /// Build a page from the provider's continuation fields. A page only
    /// continues when the provider says so *and* hands back a cursor.
    pub fn new(items: T, has_more: bool, next: Option<String>) -> Self {
        let next = if has_more {
            next.filter(|cursor| !cursor.is_empty())
        } else {
            None
        };
        Self { items, next }
    }
}

/// Follow a cursor until the provider stops returning one.
///
/// Pages are requested strictly one after another because each cursor comes
/// from the previous response. The first error aborts the whole walk and
/// nothing collected so far is returned.
pub async fn fetch_all_pages<T, F, Fut>(mut fetch_page: F) -> Result<Vec<T>, CollectorError>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>, CollectorError>>,
{
    let mut pages = Vec::new();
    let mut cursor: Option<String> = None;

    loop {
        let page = fetch_page(cursor.take()).await?;
        pages.push(page.items);
        match page.next {
            Some(next) => {
                tracing::debug!(cursor = %next, "Following next page");
                cursor = Some(next);
            }
            None => break,
        }
    }

    Ok(pages)
}
