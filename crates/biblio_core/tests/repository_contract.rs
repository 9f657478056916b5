//! Behavior every `Repository` implementation shares, checked against both
//! backends through `&dyn Repository<T>`.

use biblio_core::codec::{AuthorCodec, BookCodec, MemberCodec};
use biblio_core::model::{ActiveLoan, LoanRecord};
use biblio_core::query::{Filter, Projection, Query, Sort, Update};
use biblio_core::{
    Author, Book, DocumentRepository, DocumentStore, Member, Repository, SessionRepository,
    SessionStore, Value,
};

fn document_authors() -> DocumentRepository<Author, AuthorCodec> {
    DocumentRepository::for_entity(&DocumentStore::open_in_memory().unwrap())
}

fn session_authors() -> SessionRepository<Author> {
    SessionRepository::for_entity(&SessionStore::open_in_memory().unwrap())
}

fn document_books() -> DocumentRepository<Book, BookCodec> {
    DocumentRepository::for_entity(&DocumentStore::open_in_memory().unwrap())
}

fn session_books() -> SessionRepository<Book> {
    SessionRepository::for_entity(&SessionStore::open_in_memory().unwrap())
}

fn insert_then_find_returns_the_record(repo: &dyn Repository<Author>) {
    let author = Author::new("Ada Lovelace").with_nationality("British");

    let id = repo.insert_one(&author).unwrap();
    assert!(!id.is_empty());

    let found = repo.find_by_id(&id).unwrap().unwrap();
    let mut expected = author.clone();
    expected.id = Some(id);
    assert_eq!(found, expected);
}

#[test]
fn insert_then_find_returns_the_record_on_both_backends() {
    insert_then_find_returns_the_record(&document_authors());
    insert_then_find_returns_the_record(&session_authors());
}

fn missing_ids_are_not_errors(repo: &dyn Repository<Author>) {
    assert_eq!(repo.find_by_id("507f1f77bcf86cd799439011").unwrap(), None);
    assert_eq!(repo.find_by_id("authors/999-Z").unwrap(), None);
    assert_eq!(repo.find_by_id("not-an-id").unwrap(), None);
    assert!(!repo.delete_by_id("not-an-id").unwrap());
}

#[test]
fn missing_ids_are_not_errors_on_both_backends() {
    missing_ids_are_not_errors(&document_authors());
    missing_ids_are_not_errors(&session_authors());
}

fn delete_many_removes_only_matches(repo: &dyn Repository<Book>) {
    let books = [120, 430, 600, 610, 700]
        .into_iter()
        .map(|pages| Book::new(format!("Book of {pages} pages")).with_page_count(pages))
        .collect::<Vec<_>>();
    repo.insert_many(&books).unwrap();

    assert!(repo.delete_many(&Filter::gt("pageCount", 500)).unwrap());

    let remaining = repo
        .find(&Query::all().sorted(Sort::ascending("pageCount")))
        .unwrap()
        .into_iter()
        .map(|book| book.page_count)
        .collect::<Vec<_>>();
    assert_eq!(remaining, vec![120, 430]);
    assert!(!repo.delete_many(&Filter::gt("pageCount", 500)).unwrap());
}

#[test]
fn delete_many_removes_only_matches_on_both_backends() {
    delete_many_removes_only_matches(&document_books());
    delete_many_removes_only_matches(&session_books());
}

fn update_field_changes_one_field(repo: &dyn Repository<Author>) {
    let id = repo
        .insert_one(&Author::new("Victor Hugo").with_nationality("Belgian"))
        .unwrap();

    assert!(repo
        .update_field(&id, "nationality", Value::from("French"))
        .unwrap());

    let author = repo.find_by_id(&id).unwrap().unwrap();
    assert_eq!(author.name, "Victor Hugo");
    assert_eq!(author.nationality.as_deref(), Some("French"));
    assert!(!repo
        .update_field("authors/404-A", "nationality", Value::from("French"))
        .unwrap());
}

#[test]
fn update_field_changes_one_field_on_both_backends() {
    update_field_changes_one_field(&document_authors());
    update_field_changes_one_field(&session_authors());
}

fn delete_all_is_idempotent(repo: &dyn Repository<Author>) {
    assert!(repo.delete_all().unwrap());

    repo.insert_one(&Author::new("Mary Shelley")).unwrap();
    assert!(repo.delete_all().unwrap());
    assert!(repo.delete_all().unwrap());
    assert_eq!(repo.count(&Filter::All).unwrap(), 0);
}

#[test]
fn delete_all_is_idempotent_on_both_backends() {
    delete_all_is_idempotent(&document_authors());
    delete_all_is_idempotent(&session_authors());
}

fn insert_many_keeps_order(repo: &dyn Repository<Author>) {
    let authors = vec![
        Author::new("Jane Austen"),
        Author::new("Leo Tolstoy").with_nationality("Russian"),
        Author::new("Chinua Achebe").with_nationality("Nigerian"),
    ];

    let ids = repo.insert_many(&authors).unwrap();
    assert_eq!(ids.len(), 3);

    let found = repo.find_all().unwrap();
    let names = found.iter().map(|author| author.name.as_str()).collect::<Vec<_>>();
    assert_eq!(names, vec!["Jane Austen", "Leo Tolstoy", "Chinua Achebe"]);
    let found_ids = found
        .iter()
        .map(|author| author.id.clone().unwrap())
        .collect::<Vec<_>>();
    assert_eq!(found_ids, ids);
    assert!(repo.insert_many(&[]).unwrap().is_empty());
}

#[test]
fn insert_many_keeps_order_on_both_backends() {
    insert_many_keeps_order(&document_authors());
    insert_many_keeps_order(&session_authors());
}

fn update_replaces_by_id(repo: &dyn Repository<Author>) -> (bool, bool) {
    let id = repo.insert_one(&Author::new("George Eliot")).unwrap();
    let mut author = repo.find_by_id(&id).unwrap().unwrap();

    author.nationality = Some("British".to_string());
    let changed = repo.update(&author).unwrap();
    let unchanged = repo.update(&author).unwrap();

    assert_eq!(
        repo.find_by_id(&id).unwrap().unwrap().nationality.as_deref(),
        Some("British")
    );
    assert!(!repo.update(&Author::new("No Id")).unwrap());
    (changed, unchanged)
}

#[test]
fn document_update_reports_content_changes_only() {
    assert_eq!(update_replaces_by_id(&document_authors()), (true, false));
}

#[test]
fn session_update_reports_every_successful_store() {
    assert_eq!(update_replaces_by_id(&session_authors()), (true, true));
}

#[test]
fn document_update_sees_no_change_in_stored_doubles() {
    let repo = document_books();
    let mut book = Book::new("Sanditon");
    book.metadata.insert(
        "weight".to_string(),
        serde_json::json!(3.2645108827514357e-77),
    );
    let id = repo.insert_one(&book).unwrap();
    book.id = Some(id.clone());

    assert_eq!(repo.find_by_id(&id).unwrap(), Some(book.clone()));
    assert!(!repo.update(&book).unwrap());
    assert!(!repo.update(&book).unwrap());
}

fn update_of_absent_record_is_a_no_op(repo: &dyn Repository<Author>, absent_id: &str) {
    let mut ghost = Author::new("Ghost");
    ghost.id = Some(absent_id.to_string());

    assert!(!repo.update(&ghost).unwrap());
    assert_eq!(repo.count(&Filter::All).unwrap(), 0);
    assert!(!repo.delete(&ghost).unwrap());
}

#[test]
fn update_of_absent_record_is_a_no_op_on_both_backends() {
    update_of_absent_record_is_a_no_op(&document_authors(), "507f1f77bcf86cd799439011");
    update_of_absent_record_is_a_no_op(&session_authors(), "authors/77-A");
}

fn ids_are_not_reused(repo: &dyn Repository<Author>) {
    let first = repo.insert_one(&Author::new("Homer")).unwrap();
    assert!(repo.delete_by_id(&first).unwrap());
    assert!(repo.delete_all().unwrap());

    let second = repo.insert_one(&Author::new("Homer")).unwrap();
    assert_ne!(first, second);
}

#[test]
fn ids_are_not_reused_on_both_backends() {
    ids_are_not_reused(&document_authors());
    ids_are_not_reused(&session_authors());
}

fn update_many_patches_matches(repo: &dyn Repository<Book>) -> bool {
    repo.insert_many(&[
        Book::new("Dune").with_publication_year(1965),
        Book::new("Emma").with_publication_year(1815),
    ])
    .unwrap();

    let updated = repo
        .update_many(
            &Filter::lt("publicationYear", 1900),
            &Update::new().set("available", false).inc("pageCount", 10),
        )
        .unwrap();

    let emma = repo
        .find(&Query::filtered(Filter::eq("title", "Emma")))
        .unwrap()
        .remove(0);
    assert!(!emma.available);
    assert_eq!(emma.page_count, 10);
    assert!(!repo
        .update_many(&Filter::eq("title", "Missing"), &Update::new().set("available", true))
        .unwrap());
    updated
}

#[test]
fn update_many_patches_matches_on_both_backends() {
    assert!(update_many_patches_matches(&document_books()));
    assert!(update_many_patches_matches(&session_books()));
}

fn identity_updates_are_rejected(repo: &dyn Repository<Book>, identity_field: &str) {
    let err = repo
        .update_many(&Filter::All, &Update::new().set(identity_field, "x"))
        .unwrap_err();
    assert_eq!(err.code(), "invalid_query");
    assert!(repo
        .update_many(&Filter::All, &Update::new())
        .is_err());
}

#[test]
fn identity_updates_are_rejected_on_both_backends() {
    identity_updates_are_rejected(&document_books(), "_id");
    identity_updates_are_rejected(&session_books(), "id");
}

fn projection_zero_fills_excluded_fields(repo: &dyn Repository<Book>) {
    repo.insert_one(
        &Book::new("Middlemarch")
            .with_isbn("978-0141439549")
            .with_page_count(880),
    )
    .unwrap();

    let projected = repo
        .find(&Query::all().with_projection(Projection::include(["title"])))
        .unwrap();
    assert_eq!(projected.len(), 1);
    assert_eq!(projected[0].title, "Middlemarch");
    assert_eq!(projected[0].page_count, 0);
    assert_eq!(projected[0].isbn, None);
    assert!(projected[0].id.is_some());

    let anonymous = repo
        .find(&Query::all().with_projection(Projection::exclude(["isbn"]).without_id()))
        .unwrap();
    assert_eq!(anonymous[0].id, None);
    assert_eq!(anonymous[0].page_count, 880);
}

#[test]
fn projection_zero_fills_excluded_fields_on_both_backends() {
    projection_zero_fills_excluded_fields(&document_books());
    projection_zero_fills_excluded_fields(&session_books());
}

fn nested_projections_zero_fill_references(
    books: &dyn Repository<Book>,
    members: &dyn Repository<Member>,
) {
    let mut book = Book::new("Persuasion").with_page_count(249);
    book.loan_history = vec![LoanRecord {
        member_id: "members/1-A".to_string(),
        member_name: Some("Anne Elliot".to_string()),
        loan_date: 10,
        due_date: 20,
        return_date: None,
    }];
    books.insert_one(&book).unwrap();

    let projected = books
        .find(&Query::all().with_projection(Projection::include(["title", "loanHistory.loanDate"])))
        .unwrap();
    assert_eq!(projected.len(), 1);
    assert_eq!(projected[0].title, "Persuasion");
    assert_eq!(projected[0].page_count, 0);
    assert_eq!(
        projected[0].loan_history,
        vec![LoanRecord {
            loan_date: 10,
            ..LoanRecord::default()
        }]
    );

    let mut member = Member::new("Frederick", "Wentworth");
    member.active_loans = vec![ActiveLoan {
        book_id: "books/1-A".to_string(),
        due_date: 30,
        is_overdue: true,
        ..ActiveLoan::default()
    }];
    members.insert_one(&member).unwrap();

    let overdue = members
        .find(&Query::all().with_projection(Projection::include(["activeLoans.isOverdue"])))
        .unwrap();
    assert_eq!(overdue.len(), 1);
    assert_eq!(overdue[0].first_name, "");
    assert_eq!(
        overdue[0].active_loans,
        vec![ActiveLoan {
            is_overdue: true,
            ..ActiveLoan::default()
        }]
    );
}

#[test]
fn nested_projections_zero_fill_references_on_both_backends() {
    let documents = DocumentStore::open_in_memory().unwrap();
    nested_projections_zero_fill_references(
        &document_books(),
        &DocumentRepository::<Member, MemberCodec>::for_entity(&documents),
    );

    let sessions = SessionStore::open_in_memory().unwrap();
    nested_projections_zero_fill_references(
        &session_books(),
        &SessionRepository::<Member>::for_entity(&sessions),
    );
}

fn sort_and_count_agree(repo: &dyn Repository<Book>) {
    repo.insert_many(&[
        Book::new("B").with_publication_year(2001).with_page_count(300),
        Book::new("A").with_publication_year(2001).with_page_count(100),
        Book::new("C").with_publication_year(1999).with_page_count(200),
    ])
    .unwrap();

    let titles = repo
        .find(
            &Query::all().sorted(Sort::descending("publicationYear").then_ascending("title")),
        )
        .unwrap()
        .into_iter()
        .map(|book| book.title)
        .collect::<Vec<_>>();
    assert_eq!(titles, vec!["A", "B", "C"]);

    assert_eq!(repo.count(&Filter::gte("pageCount", 200)).unwrap(), 2);
    assert_eq!(
        repo.count(&Filter::and([
            Filter::eq("publicationYear", 2001),
            Filter::negate(Filter::eq("title", "A")),
        ]))
        .unwrap(),
        1
    );
}

#[test]
fn sort_and_count_agree_on_both_backends() {
    sort_and_count_agree(&document_books());
    sort_and_count_agree(&session_books());
}

fn drop_collection_empties_it(repo: &dyn Repository<Author>) {
    repo.insert_one(&Author::new("Dante")).unwrap();
    repo.drop_collection().unwrap();
    assert!(repo.find_all().unwrap().is_empty());
}

#[test]
fn drop_collection_empties_it_on_both_backends() {
    drop_collection_empties_it(&document_authors());
    drop_collection_empties_it(&session_authors());
}
