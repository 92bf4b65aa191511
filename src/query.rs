//! List/search query conventions shared by every app.
//!
//! | Param | Alias | Meaning |
//! |---|---|---|
//! | `free_text_query` | `q` | free-text search |
//! | `sort` | `s` | comma-separated sort keys |
//! | `page` | `p` | 1-based page, default 1 |
//! | `pageSize` | `ps` | default 10, capped at 10 000 |
//! | `fields` | `f` | comma-separated projection |
//! | `context` | | `key:value` pairs, comma-separated |
//! | `uiReady` | `ur` | flag, presence means true |
//! | `scrollId` | | cursor for scroll-style paging |
//!
//! Any parameter whose name starts with an uppercase letter is a filter
//! (`Status=open,closed`). Everything else lands in `other`.

use std::collections::HashMap;

pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const MAX_PAGE_SIZE: usize = 10_000;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ListQuery {
    pub free_text: String,
    pub filter: HashMap<String, Vec<String>>,
    pub sort: Vec<String>,
    pub page: usize,
    pub page_size: usize,
    pub fields: Vec<String>,
    pub context: HashMap<String, String>,
    pub ui_ready: bool,
    pub scroll_id: String,
    pub other: HashMap<String, Vec<String>>,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            free_text: String::new(),
            filter: HashMap::new(),
            sort: Vec::new(),
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            fields: Vec::new(),
            context: HashMap::new(),
            ui_ready: false,
            scroll_id: String::new(),
            other: HashMap::new(),
        }
    }
}

impl ListQuery {
    pub fn from_params(params: &HashMap<String, Vec<String>>) -> Self {
        let mut query = Self::default();

        for (param, values) in params {
            let Some(first_char) = param.chars().next() else { continue };
            if first_char.is_uppercase() {
                query.filter.insert(param.clone(), split_values(values));
                continue;
            }

            let first = values.first().map(String::as_str);
            match param.as_str() {
                "free_text_query" | "q" => {
                    if let Some(v) = first {
                        query.free_text = v.to_owned();
                    }
                }
                "sort" | "s" => query.sort = split_values(values),
                "page" | "p" => {
                    if let Some(page) = first.and_then(|v| v.parse().ok()) {
                        query.page = page;
                    }
                }
                "pageSize" | "ps" => {
                    if let Some(size) = first.and_then(|v| v.parse::<usize>().ok()) {
                        query.page_size = size.min(MAX_PAGE_SIZE);
                    }
                }
                "scrollId" => {
                    if let Some(v) = first {
                        query.scroll_id = v.to_owned();
                    }
                }
                "fields" | "f" => query.fields = split_values(values),
                "context" => {
                    for pair in split_values(values) {
                        let Some((kind, value)) = pair.split_once(':') else { continue };
                        let (kind, value) = (kind.trim(), value.trim());
                        if !kind.is_empty() && !value.is_empty() {
                            query.context.insert(kind.to_owned(), value.to_owned());
                        }
                    }
                }
                "uiReady" | "ur" => query.ui_ready = true,
                _ => {
                    query.other.insert(param.clone(), split_values(values));
                }
            }
        }

        query
    }

    /// Zero-based offset of the first item on the requested page.
    pub fn offset(&self) -> usize {
        self.page.saturating_sub(1).saturating_mul(self.page_size)
    }
}

fn split_values(values: &[String]) -> Vec<String> {
    values
        .iter()
        .flat_map(|v| v.split(','))
        .map(str::to_owned)
        .collect()
}
