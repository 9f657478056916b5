//! Entity-specific finders available on any [`Repository`].
//!
//! # Responsibility
//! - Express common library lookups as [`Filter`]s once, for both backends.
//!
//! # Invariants
//! - User-supplied name fragments are matched literally, never as patterns.
//! - Id-valued filters go through [`Repository::native_id`].

use super::{RepoResult, Repository};
use crate::document::Value;
use crate::model::{Author, Book, Category, Member, Publisher};
use crate::query::{Filter, Query};

pub trait AuthorQueries: Repository<Author> {
    /// Case-insensitive substring match on the author name.
    fn find_authors_by_name(&self, fragment: &str) -> RepoResult<Vec<Author>> {
        self.find(&Query::filtered(Filter::contains("name", fragment)))
    }

    fn find_authors_by_nationality(&self, nationality: &str) -> RepoResult<Vec<Author>> {
        self.find(&Query::filtered(Filter::eq("nationality", nationality)))
    }
}

impl<R: Repository<Author> + ?Sized> AuthorQueries for R {}

pub trait BookQueries: Repository<Book> {
    fn find_books_by_category(&self, category_id: &str) -> RepoResult<Vec<Book>> {
        let category = self.native_id(category_id);
        self.find(&Query::filtered(Filter::eq("categoryId", category)))
    }

    /// Books listing `author_id` among their authors.
    fn find_books_by_author(&self, author_id: &str) -> RepoResult<Vec<Book>> {
        let author = self.native_id(author_id);
        self.find(&Query::filtered(Filter::eq("authorsId", author)))
    }

    fn find_available_books(&self) -> RepoResult<Vec<Book>> {
        self.find(&Query::filtered(Filter::eq("available", true)))
    }

    fn find_book_by_isbn(&self, isbn: &str) -> RepoResult<Option<Book>> {
        Ok(self
            .find(&Query::filtered(Filter::eq("isbn", isbn)))?
            .into_iter()
            .next())
    }

    fn find_books_by_title(&self, fragment: &str) -> RepoResult<Vec<Book>> {
        self.find(&Query::filtered(Filter::contains("title", fragment)))
    }

    fn find_books_by_publication_year(&self, year: i32) -> RepoResult<Vec<Book>> {
        self.find(&Query::filtered(Filter::eq("publicationYear", year)))
    }

    fn find_books_with_more_pages_than(&self, pages: i32) -> RepoResult<Vec<Book>> {
        self.find(&Query::filtered(Filter::gt("pageCount", pages)))
    }

    fn update_book_availability(&self, book_id: &str, available: bool) -> RepoResult<bool> {
        self.update_field(book_id, "available", Value::Bool(available))
    }
}

impl<R: Repository<Book> + ?Sized> BookQueries for R {}

pub trait CategoryQueries: Repository<Category> {
    fn find_categories_by_name(&self, fragment: &str) -> RepoResult<Vec<Category>> {
        self.find(&Query::filtered(Filter::contains("name", fragment)))
    }

    fn find_categories_by_path(&self, path: &str) -> RepoResult<Vec<Category>> {
        self.find(&Query::filtered(Filter::eq("path", path)))
    }

    /// Categories nested anywhere below `parent_path`.
    fn find_subcategories(&self, parent_path: &str) -> RepoResult<Vec<Category>> {
        let prefix = format!("{}/", parent_path.trim_end_matches('/'));
        self.find(&Query::filtered(Filter::starts_with("path", &prefix)))
    }
}

impl<R: Repository<Category> + ?Sized> CategoryQueries for R {}

pub trait PublisherQueries: Repository<Publisher> {
    fn find_publishers_by_name(&self, fragment: &str) -> RepoResult<Vec<Publisher>> {
        self.find(&Query::filtered(Filter::contains("name", fragment)))
    }
}

impl<R: Repository<Publisher> + ?Sized> PublisherQueries for R {}

pub trait MemberQueries: Repository<Member> {
    /// Case-insensitive substring match on first or last name.
    fn find_members_by_name(&self, fragment: &str) -> RepoResult<Vec<Member>> {
        self.find(&Query::filtered(Filter::or([
            Filter::contains("firstName", fragment),
            Filter::contains("lastName", fragment),
        ])))
    }

    fn find_members_by_email(&self, email: &str) -> RepoResult<Vec<Member>> {
        self.find(&Query::filtered(Filter::eq("email", email)))
    }

    fn find_members_with_overdue_loans(&self) -> RepoResult<Vec<Member>> {
        self.find(&Query::filtered(Filter::elem_match(
            "activeLoans",
            Filter::eq("isOverdue", true),
        )))
    }
}

impl<R: Repository<Member> + ?Sized> MemberQueries for R {}
