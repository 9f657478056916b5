use biblio_core::model::ActiveLoan;
use biblio_core::{
    Author, AuthorQueries, Book, BookQueries, Category, CategoryQueries, DocumentRepository,
    DocumentStore, Member, MemberQueries, Publisher, PublisherQueries, Repository,
    SessionRepository, SessionStore,
};

struct Library {
    authors: Box<dyn Repository<Author>>,
    books: Box<dyn Repository<Book>>,
    categories: Box<dyn Repository<Category>>,
    publishers: Box<dyn Repository<Publisher>>,
    members: Box<dyn Repository<Member>>,
}

fn document_library() -> Library {
    let store = DocumentStore::open_in_memory().unwrap();
    Library {
        authors: Box::new(DocumentRepository::<Author, _>::for_entity(&store)),
        books: Box::new(DocumentRepository::<Book, _>::for_entity(&store)),
        categories: Box::new(DocumentRepository::<Category, _>::for_entity(&store)),
        publishers: Box::new(DocumentRepository::<Publisher, _>::for_entity(&store)),
        members: Box::new(DocumentRepository::<Member, _>::for_entity(&store)),
    }
}

fn session_library() -> Library {
    let store = SessionStore::open_in_memory().unwrap();
    Library {
        authors: Box::new(SessionRepository::<Author>::for_entity(&store)),
        books: Box::new(SessionRepository::<Book>::for_entity(&store)),
        categories: Box::new(SessionRepository::<Category>::for_entity(&store)),
        publishers: Box::new(SessionRepository::<Publisher>::for_entity(&store)),
        members: Box::new(SessionRepository::<Member>::for_entity(&store)),
    }
}

fn libraries() -> [(&'static str, Library); 2] {
    [("document", document_library()), ("session", session_library())]
}

fn titles(books: Vec<Book>) -> Vec<String> {
    let mut titles = books.into_iter().map(|book| book.title).collect::<Vec<_>>();
    titles.sort();
    titles
}

#[test]
fn author_finders_match_names_literally_and_case_insensitively() {
    for (backend, library) in libraries() {
        let authors = library.authors.as_ref();
        authors
            .insert_many(&[
                Author::new("Ada Lovelace").with_nationality("British"),
                Author::new("Alan Turing").with_nationality("British"),
                Author::new("A.B. Cole").with_nationality("American"),
            ])
            .unwrap();

        let found = authors.find_authors_by_name("LOVE").unwrap();
        assert_eq!(found.len(), 1, "{backend}");
        assert_eq!(found[0].name, "Ada Lovelace");

        assert_eq!(authors.find_authors_by_name("a.b").unwrap().len(), 1, "{backend}");
        assert_eq!(
            authors.find_authors_by_nationality("British").unwrap().len(),
            2,
            "{backend}"
        );
    }
}

#[test]
fn book_finders_follow_references_and_ranges() {
    for (backend, library) in libraries() {
        let ada = library
            .authors
            .insert_one(&Author::new("Ada Lovelace"))
            .unwrap();
        let babbage = library
            .authors
            .insert_one(&Author::new("Charles Babbage"))
            .unwrap();
        let science = library
            .categories
            .insert_one(&Category::new("Science"))
            .unwrap();

        let books = library.books.as_ref();
        let mut sketch = Book::new("Sketch of the Analytical Engine")
            .with_isbn("111")
            .with_author(ada.clone())
            .with_author(babbage.clone())
            .with_category(science.clone())
            .with_publication_year(1843)
            .with_page_count(66);
        sketch.available = false;
        books
            .insert_many(&[
                sketch,
                Book::new("Passages from the Life of a Philosopher")
                    .with_isbn("222")
                    .with_author(babbage.clone())
                    .with_publication_year(1864)
                    .with_page_count(496),
            ])
            .unwrap();

        assert_eq!(
            titles(books.find_books_by_author(&ada).unwrap()),
            vec!["Sketch of the Analytical Engine"],
            "{backend}"
        );
        assert_eq!(books.find_books_by_author(&babbage).unwrap().len(), 2, "{backend}");
        assert_eq!(books.find_books_by_category(&science).unwrap().len(), 1, "{backend}");
        assert_eq!(
            titles(books.find_available_books().unwrap()),
            vec!["Passages from the Life of a Philosopher"],
            "{backend}"
        );
        assert_eq!(
            books.find_book_by_isbn("222").unwrap().map(|book| book.publication_year),
            Some(1864),
            "{backend}"
        );
        assert_eq!(books.find_book_by_isbn("999").unwrap(), None, "{backend}");
        assert_eq!(books.find_books_by_title("analytical").unwrap().len(), 1, "{backend}");
        assert_eq!(
            books.find_books_by_publication_year(1843).unwrap().len(),
            1,
            "{backend}"
        );
        assert_eq!(
            titles(books.find_books_with_more_pages_than(100).unwrap()),
            vec!["Passages from the Life of a Philosopher"],
            "{backend}"
        );
    }
}

#[test]
fn update_book_availability_flips_the_flag() {
    for (backend, library) in libraries() {
        let books = library.books.as_ref();
        let id = books.insert_one(&Book::new("Frankenstein")).unwrap();

        assert!(books.update_book_availability(&id, false).unwrap(), "{backend}");
        assert!(books.find_available_books().unwrap().is_empty(), "{backend}");
        assert!(books.update_book_availability(&id, true).unwrap(), "{backend}");
        assert_eq!(books.find_available_books().unwrap().len(), 1, "{backend}");
    }
}

#[test]
fn category_finders_walk_the_path_hierarchy() {
    for (backend, library) in libraries() {
        let categories = library.categories.as_ref();
        categories
            .insert_many(&[
                Category::new("Fiction").with_path("Fiction"),
                Category::new("Fantasy").with_path("Fiction/Fantasy"),
                Category::new("High Fantasy").with_path("Fiction/Fantasy/High"),
                Category::new("Fictional Essays").with_path("Fictional"),
            ])
            .unwrap();

        let mut below = categories
            .find_subcategories("Fiction")
            .unwrap()
            .into_iter()
            .map(|category| category.name)
            .collect::<Vec<_>>();
        below.sort();
        assert_eq!(below, vec!["Fantasy", "High Fantasy"], "{backend}");

        assert_eq!(
            categories.find_categories_by_path("Fiction/Fantasy").unwrap()[0].name,
            "Fantasy",
            "{backend}"
        );
        assert_eq!(categories.find_categories_by_name("fant").unwrap().len(), 2, "{backend}");
    }
}

#[test]
fn publisher_finder_matches_fragments() {
    for (backend, library) in libraries() {
        let publishers = library.publishers.as_ref();
        publishers
            .insert_many(&[Publisher::new("Penguin Random House"), Publisher::new("Faber")])
            .unwrap();

        let found = publishers.find_publishers_by_name("random").unwrap();
        assert_eq!(found.len(), 1, "{backend}");
        assert_eq!(found[0].name, "Penguin Random House");
    }
}

#[test]
fn member_finders_cover_names_email_and_overdue_loans() {
    for (backend, library) in libraries() {
        let members = library.members.as_ref();
        let mut late = Member::new("Grace", "Hopper").with_email("grace@example.org");
        late.active_loans = vec![
            ActiveLoan {
                book_id: "books/1-A".to_string(),
                due_date: 10,
                is_overdue: false,
                ..ActiveLoan::default()
            },
            ActiveLoan {
                book_id: "books/2-A".to_string(),
                due_date: 5,
                is_overdue: true,
                ..ActiveLoan::default()
            },
        ];
        let mut punctual = Member::new("Alan", "Grace").with_email("alan@example.org");
        punctual.active_loans = vec![ActiveLoan {
            book_id: "books/3-A".to_string(),
            is_overdue: false,
            ..ActiveLoan::default()
        }];
        members.insert_many(&[late, punctual]).unwrap();

        assert_eq!(members.find_members_by_name("grace").unwrap().len(), 2, "{backend}");
        assert_eq!(members.find_members_by_name("hop").unwrap().len(), 1, "{backend}");
        assert_eq!(
            members.find_members_by_email("alan@example.org").unwrap()[0].first_name,
            "Alan",
            "{backend}"
        );

        let overdue = members.find_members_with_overdue_loans().unwrap();
        assert_eq!(overdue.len(), 1, "{backend}");
        assert!(overdue[0].has_overdue_loans());
        assert_eq!(overdue[0].last_name, "Hopper");
    }
}
