use serde::Serialize;

use crate::filter::Page;

/// Envelope for every non-callback response.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<serde_json::Value>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T, message: impl Into<String>) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            message: message.into(),
            error: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMetadata {
    pub page: u64,
    pub size: u64,
    pub total_elements: u64,
    pub total_pages: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageLinks {
    pub first: String,
    #[serde(rename = "self")]
    pub self_link: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last: Option<String>,
}

impl PageLinks {
    pub fn from_page<T>(page: &Page<T>, base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        let link = |number: u64| format!("{}?page={}&size={}", base, number, page.size);

        PageLinks {
            first: link(0),
            self_link: link(page.page),
            prev: page.has_previous().then(|| link(page.page - 1)),
            next: page.has_next().then(|| link(page.page + 1)),
            last: (!page.is_last()).then(|| link(page.total_pages().saturating_sub(1))),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PagedResponse<T> {
    pub content: Vec<T>,
    pub metadata: PageMetadata,
    pub links: PageLinks,
}

impl<T> PagedResponse<T> {
    pub fn from_page(page: Page<T>, base_url: &str) -> Self {
        let metadata = PageMetadata {
            page: page.page,
            size: page.size,
            total_elements: page.total_elements,
            total_pages: page.total_pages(),
        };
        let links = PageLinks::from_page(&page, base_url);
        PagedResponse {
            content: page.content,
            metadata,
            links,
        }
    }
}
