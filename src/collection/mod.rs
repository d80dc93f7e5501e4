//! Pageable list results.

mod query;

pub use query::ListQuery;

use futures_util::Stream;
use std::collections::VecDeque;

use crate::http::{Api, ApiResponse};
use crate::resource::{Record, Resource};
use crate::types::ListPage;
use crate::{Error, Result};

/// How a list endpoint navigates between pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageMode {
    /// `offset` + `limit`; both directions.
    Offset,
    /// Opaque continuation token; forward only.
    Cursor,
}

/// One page of a list endpoint.
#[derive(Debug)]
pub struct Collection<R: Resource> {
    api: Api,
    items: Vec<Record<R>>,
    total: Option<u64>,
    href: Option<String>,
    prev: Option<String>,
    next: Option<String>,
    mode: PageMode,
}

impl<R: Resource> Collection<R> {
    /// Query the resource's list endpoint.
    pub async fn query(api: &Api, query: &ListQuery) -> Result<Self> {
        Self::fetch(api, R::ENDPOINTS.query, query, PageMode::Offset).await
    }

    /// Query an arbitrary list endpoint returning records of `R`.
    pub async fn fetch(api: &Api, path: &str, query: &ListQuery, mode: PageMode) -> Result<Self> {
        query.validate()?;
        if mode == PageMode::Cursor && query.offset.is_some() {
            return Err(Error::Validation(
                "cursor endpoints do not accept an offset".to_string(),
            ));
        }
        let response = api.get_with(path, &query.to_pairs()).await?;
        Self::from_response(api.clone(), response, mode)
    }

    fn from_response(api: Api, response: ApiResponse, mode: PageMode) -> Result<Self> {
        let total = response.total();
        let page: ListPage = serde_json::from_value(response.body)?;
        let prev = page.link("prev").map(|link| link.href.clone());
        let next = page.link("next").map(|link| link.href.clone());
        let items = page
            .items
            .into_iter()
            .map(|item| Record::from_value(api.clone(), item))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            api,
            items,
            total,
            href: page.href,
            prev,
            next,
            mode,
        })
    }

    pub fn items(&self) -> &[Record<R>] {
        &self.items
    }

    pub fn into_items(self) -> Vec<Record<R>> {
        self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record<R>> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// `x-total-matching-query` of the page request.
    pub fn total(&self) -> Option<u64> {
        self.total
    }

    pub fn href(&self) -> Option<&str> {
        self.href.as_deref()
    }

    pub fn mode(&self) -> PageMode {
        self.mode
    }

    pub fn has_next(&self) -> bool {
        self.next.is_some()
    }

    pub fn has_previous(&self) -> bool {
        self.mode == PageMode::Offset && self.prev.is_some()
    }

    pub async fn next_page(&self) -> Result<Self> {
        let href = self
            .next
            .as_deref()
            .ok_or_else(|| Error::Pagination("no next page".to_string()))?;
        let response = self.api.get_with(href, &[]).await?;
        Self::from_response(self.api.clone(), response, self.mode)
    }

    pub async fn previous_page(&self) -> Result<Self> {
        if self.mode == PageMode::Cursor {
            return Err(Error::Pagination(
                "cursor listings cannot be traversed backwards".to_string(),
            ));
        }
        let href = self
            .prev
            .as_deref()
            .ok_or_else(|| Error::Pagination("no previous page".to_string()))?;
        let response = self.api.get_with(href, &[]).await?;
        Self::from_response(self.api.clone(), response, self.mode)
    }

    /// Every item from this page onwards, fetching further pages lazily.
    /// The stream ends after the first page without a next link, or after
    /// yielding a fetch error.
    pub fn all(self) -> impl Stream<Item = Result<Record<R>>> + Send + 'static {
        let state = Traversal {
            api: self.api,
            buffer: VecDeque::from(self.items),
            next: self.next,
            mode: self.mode,
        };
        futures_util::stream::unfold(Some(state), |state| async move {
            let mut state = state?;
            loop {
                if let Some(item) = state.buffer.pop_front() {
                    return Some((Ok(item), Some(state)));
                }
                let href = state.next.take()?;
                tracing::debug!("fetching next page {}", href);
                let page = match state.api.get_with(&href, &[]).await {
                    Ok(response) => Self::from_response(state.api.clone(), response, state.mode),
                    Err(e) => Err(e),
                };
                match page {
                    Ok(page) => {
                        state.buffer = VecDeque::from(page.items);
                        state.next = page.next;
                    }
                    Err(e) => return Some((Err(e), None)),
                }
            }
        })
    }
}

struct Traversal<R: Resource> {
    api: Api,
    buffer: VecDeque<Record<R>>,
    next: Option<String>,
    mode: PageMode,
}

impl<R: Resource> IntoIterator for Collection<R> {
    type Item = Record<R>;
    type IntoIter = std::vec::IntoIter<Record<R>>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a, R: Resource> IntoIterator for &'a Collection<R> {
    type Item = &'a Record<R>;
    type IntoIter = std::slice::Iter<'a, Record<R>>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
