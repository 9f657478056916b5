use crate::codec::Record;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Book {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isbn: Option<String>,
    pub title: String,
    pub publication_year: i32,
    pub page_count: i32,
    pub available: bool,
    /// Ids of the book's authors, in credit order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub authors_id: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub loan_history: Vec<LoanRecord>,
    /// Free-form attributes (language, edition, ...).
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// One past or current loan of a book.
///
/// `return_date` stays `None` while the loan is open and is persisted as an
/// explicit null.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoanRecord {
    pub member_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member_name: Option<String>,
    pub loan_date: i64,
    pub due_date: i64,
    pub return_date: Option<i64>,
}

impl Book {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            available: true,
            ..Self::default()
        }
    }

    pub fn with_isbn(mut self, isbn: impl Into<String>) -> Self {
        self.isbn = Some(isbn.into());
        self
    }

    pub fn with_page_count(mut self, page_count: i32) -> Self {
        self.page_count = page_count;
        self
    }

    pub fn with_publication_year(mut self, year: i32) -> Self {
        self.publication_year = year;
        self
    }

    pub fn with_author(mut self, author_id: impl Into<String>) -> Self {
        self.authors_id.push(author_id.into());
        self
    }

    pub fn with_category(mut self, category_id: impl Into<String>) -> Self {
        self.category_id = Some(category_id.into());
        self
    }

    pub fn with_publisher(mut self, publisher_id: impl Into<String>) -> Self {
        self.publisher_id = Some(publisher_id.into());
        self
    }

    pub fn is_on_loan(&self) -> bool {
        self.loan_history.iter().any(LoanRecord::is_open)
    }
}

impl LoanRecord {
    pub fn is_open(&self) -> bool {
        self.return_date.is_none()
    }
}

impl Record for Book {
    fn record_id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty())
    }

    fn set_record_id(&mut self, id: Option<String>) {
        self.id = id;
    }
}
