use serde::{Deserialize, Serialize};

/// 1-based page number and page size, already defaulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u64,
    pub limit: u64,
}

impl PageRequest {
    /// Missing or zero values fall back to page 1 and `default_size`.
    pub fn new(page: Option<u64>, page_size: Option<u64>, default_size: u64) -> Self {
        Self {
            page: page.filter(|p| *p > 0).unwrap_or(1),
            limit: page_size.filter(|s| *s > 0).unwrap_or(default_size.max(1)),
        }
    }

    pub fn skip(&self) -> u64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

/// Paginated listing envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub total: u64,
    pub page: u64,
    pub pages: u64,
    pub limit: u64,
    pub docs: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(request: PageRequest, total: u64, docs: Vec<T>) -> Self {
        Self {
            total,
            page: request.page,
            pages: page_count(total, request.limit),
            limit: request.limit,
            docs,
        }
    }

    /// Cuts the requested page out of an already filtered, ordered list.
    pub fn from_vec(request: PageRequest, items: Vec<T>) -> Self {
        let total = items.len() as u64;
        let docs = items
            .into_iter()
            .skip(request.skip() as usize)
            .take(request.limit as usize)
            .collect();
        Self::new(request, total, docs)
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        let docs = self.docs.into_iter().map(f).collect();
        Page {
            total: self.total,
            page: self.page,
            pages: self.pages,
            limit: self.limit,
            docs,
        }
    }
}

pub fn page_count(total: u64, limit: u64) -> u64 {
    if limit == 0 {
        0
    } else {
        total.div_ceil(limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_missing_and_zero_values() {
        assert_eq!(PageRequest::new(None, None, 20), PageRequest { page: 1, limit: 20 });
        assert_eq!(PageRequest::new(Some(0), Some(0), 20), PageRequest { page: 1, limit: 20 });
        assert_eq!(PageRequest::new(Some(3), Some(5), 20).skip(), 10);
    }

    #[test]
    fn page_sizes_follow_ceil_and_clamp() {
        for n in 0..12u64 {
            for s in 1..5u64 {
                for p in 1..6u64 {
                    let items: Vec<u64> = (0..n).collect();
                    let page = Page::from_vec(PageRequest::new(Some(p), Some(s), 20), items);
                    let expected = n.saturating_sub((p - 1) * s).min(s);
                    assert_eq!(page.pages, (n + s - 1) / s);
                    assert_eq!(page.docs.len() as u64, expected, "n={n} s={s} p={p}");
                }
            }
        }
    }

    #[test]
    fn empty_collection_has_no_pages() {
        let page: Page<u8> = Page::from_vec(PageRequest::new(None, Some(2), 20), vec![]);
        assert_eq!(page.total, 0);
        assert_eq!(page.pages, 0);
        assert!(page.docs.is_empty());
    }
}
