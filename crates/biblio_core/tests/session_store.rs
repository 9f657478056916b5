use biblio_core::identity::parse_composite_id;
use biblio_core::query::{Filter, Projection, Query, UpdateOp};
use biblio_core::store::{SessionStore, StoreError};
use biblio_core::{Author, StoreConfig, Value};
use serde_json::json;

#[test]
fn stored_entities_get_composite_ids_from_hilo_blocks() {
    let store = SessionStore::open(&StoreConfig::in_memory().with_hilo_capacity(2)).unwrap();
    let mut session = store.open_session().unwrap();

    let ids = (0..3)
        .map(|n| {
            session
                .store_value("books", None, json!({ "title": format!("Book {n}") }))
                .unwrap()
        })
        .collect::<Vec<_>>();
    let author = session
        .store("authors", None, &Author::new("Ada Lovelace"))
        .unwrap();
    session.save_changes().unwrap();

    assert_eq!(ids, vec!["books/1-A", "books/2-A", "books/3-A"]);
    assert_eq!(parse_composite_id(&author), Some(("authors", 1, "A")));
}

#[test]
fn unsaved_sessions_discard_their_writes() {
    let store = SessionStore::open_in_memory().unwrap();

    let id = {
        let mut session = store.open_session().unwrap();
        let id = session
            .store_value("authors", None, json!({ "name": "Ghost" }))
            .unwrap();
        assert!(session.has_changes());
        id
    };

    assert!(store.list_collection_names().unwrap().is_empty());
    let mut session = store.open_session().unwrap();
    assert_eq!(session.load("authors", &id).unwrap(), None);
}

#[test]
fn loads_strip_the_id_property_and_keep_the_body() {
    let store = SessionStore::open_in_memory().unwrap();
    let mut session = store.open_session().unwrap();

    let id = session
        .store_value(
            "authors",
            Some("authors/custom-A"),
            json!({ "id": "ignored", "name": "Ada" }),
        )
        .unwrap();
    session.save_changes().unwrap();

    assert_eq!(id, "authors/custom-A");
    assert_eq!(
        session.load("authors", &id).unwrap(),
        Some(json!({ "name": "Ada" }))
    );
    assert!(session.exists("authors", &id).unwrap());
    assert!(!session.exists("books", &id).unwrap());
}

#[test]
fn non_object_bodies_are_rejected() {
    let store = SessionStore::open_in_memory().unwrap();
    let mut session = store.open_session().unwrap();

    let err = session
        .store_value("authors", None, json!(["not", "an", "object"]))
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidData(_)));
    assert!(!session.has_changes());
}

#[test]
fn one_id_cannot_live_in_two_collections() {
    let store = SessionStore::open_in_memory().unwrap();
    let mut session = store.open_session().unwrap();
    session
        .store_value("authors", Some("shared/1-A"), json!({ "name": "Ada" }))
        .unwrap();
    session.save_changes().unwrap();

    session
        .store_value("books", Some("shared/1-A"), json!({ "title": "Clash" }))
        .unwrap();
    let err = session.save_changes().unwrap_err();
    assert!(matches!(err, StoreError::DuplicateKey { .. }));

    assert_eq!(
        session.load("authors", "shared/1-A").unwrap(),
        Some(json!({ "name": "Ada" }))
    );
}

#[test]
fn save_changes_is_atomic() {
    let store = SessionStore::open_in_memory().unwrap();
    let mut session = store.open_session().unwrap();
    session
        .store_value("authors", Some("authors/1-A"), json!({ "name": "Ada" }))
        .unwrap();
    session.save_changes().unwrap();

    session
        .store_value("books", None, json!({ "title": "Kept?" }))
        .unwrap();
    session
        .patch(
            "authors",
            "authors/1-A",
            UpdateOp::Inc("name".to_string(), Value::from(1)),
        )
        .unwrap();
    let err = session.save_changes().unwrap_err();
    assert!(matches!(err, StoreError::InvalidQuery(_)));

    assert_eq!(session.count("books", &Filter::All).unwrap(), 0);
    assert!(!session.has_changes());
}

#[test]
fn patches_set_unset_and_increment() {
    let store = SessionStore::open_in_memory().unwrap();
    let mut session = store.open_session().unwrap();
    let id = session
        .store_value(
            "books",
            None,
            json!({ "title": "Dune", "pageCount": 412, "isbn": "x" }),
        )
        .unwrap();
    session.save_changes().unwrap();

    session
        .patch("books", &id, UpdateOp::Inc("pageCount".to_string(), Value::from(8)))
        .unwrap();
    session
        .patch("books", &id, UpdateOp::Unset("isbn".to_string()))
        .unwrap();
    session
        .patch(
            "books",
            &id,
            UpdateOp::Set("metadata".to_string(), Value::from("signed")),
        )
        .unwrap();
    let summary = session.save_changes().unwrap();

    assert_eq!(summary.patched, 3);
    assert_eq!(
        session.load("books", &id).unwrap(),
        Some(json!({ "title": "Dune", "pageCount": 420, "metadata": "signed" }))
    );

    let err = session
        .patch("books", &id, UpdateOp::Set("id".to_string(), Value::from("other")))
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidQuery(_)));
}

#[test]
fn queries_filter_sort_and_project_in_sql() {
    let store = SessionStore::open_in_memory().unwrap();
    let mut session = store.open_session().unwrap();
    for (title, pages, tags) in [
        ("A", 100, json!(["classic"])),
        ("B", 300, json!(["modern", "classic"])),
        ("C", 200, json!([])),
    ] {
        session
            .store_value(
                "books",
                None,
                json!({ "title": title, "pageCount": pages, "tags": tags }),
            )
            .unwrap();
    }
    session.save_changes().unwrap();

    let classics = session
        .query(
            "books",
            &Query::filtered(Filter::eq("tags", "classic"))
                .sorted(biblio_core::query::Sort::descending("pageCount"))
                .with_projection(Projection::include(["title"])),
        )
        .unwrap();
    let bodies = classics.iter().map(|entity| entity.body.clone()).collect::<Vec<_>>();
    assert_eq!(bodies, vec![json!({ "title": "B" }), json!({ "title": "A" })]);

    assert_eq!(
        session
            .query_ids("books", &Filter::missing("isbn"))
            .unwrap()
            .len(),
        3
    );
    assert_eq!(
        session
            .count("books", &Filter::is_in("title", ["A", "C"]))
            .unwrap(),
        2
    );
    assert_eq!(
        session
            .count("books", &Filter::regex_ci("title", "^b$"))
            .unwrap(),
        1
    );
}

#[test]
fn sessions_enforce_their_request_budget() {
    let store = SessionStore::open(
        &StoreConfig::in_memory().with_max_requests_per_session(2),
    )
    .unwrap();
    let mut session = store.open_session().unwrap();

    session.count("authors", &Filter::All).unwrap();
    session.exists("authors", "authors/1-A").unwrap();
    let err = session.load("authors", "authors/1-A").unwrap_err();
    assert!(matches!(err, StoreError::RequestBudgetExceeded { limit: 2 }));
    drop(session);

    let mut fresh = store.open_session().unwrap();
    assert!(fresh.count("authors", &Filter::All).is_ok());
}

#[test]
fn reset_storage_keeps_hilo_counters() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig::file(dir.path().join("reset.db")).with_hilo_capacity(4);

    let first = {
        let store = SessionStore::open(&config).unwrap();
        let mut session = store.open_session().unwrap();
        let id = session
            .store_value("authors", None, json!({ "name": "Ada" }))
            .unwrap();
        session.save_changes().unwrap();
        drop(session);

        store.reset_storage().unwrap();
        assert!(store.list_collection_names().unwrap().is_empty());
        id
    };

    let store = SessionStore::open(&config).unwrap();
    let mut session = store.open_session().unwrap();
    assert_eq!(session.count("authors", &Filter::All).unwrap(), 0);
    let second = session
        .store_value("authors", None, json!({ "name": "Ada" }))
        .unwrap();

    assert_eq!(first, "authors/1-A");
    assert_eq!(second, "authors/5-A");
}

#[test]
fn hilo_blocks_survive_reopening_a_file_database() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig::file(dir.path().join("hilo.db")).with_hilo_capacity(4);

    let first = {
        let store = SessionStore::open(&config).unwrap();
        let mut session = store.open_session().unwrap();
        let id = session
            .store_value("members", None, json!({ "firstName": "Grace" }))
            .unwrap();
        session.save_changes().unwrap();
        id
    };

    let store = SessionStore::open(&config).unwrap();
    let mut session = store.open_session().unwrap();
    let second = session
        .store_value("members", None, json!({ "firstName": "Alan" }))
        .unwrap();

    assert_eq!(first, "members/1-A");
    assert_eq!(second, "members/5-A");
}

#[test]
fn id_filters_and_sorts_read_the_document_id() {
    let store = SessionStore::open_in_memory().unwrap();
    let mut session = store.open_session().unwrap();
    for (id, name) in [("authors/2-A", "Ada"), ("authors/1-A", "Alan"), ("authors/3-A", "Grace")] {
        session
            .store_value("authors", Some(id), json!({ "name": name }))
            .unwrap();
    }
    session.save_changes().unwrap();

    let found = session
        .query("authors", &Query::filtered(Filter::eq("id", "authors/1-A")))
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, "authors/1-A");
    assert_eq!(found[0].body, json!({ "name": "Alan" }));

    let sorted = session
        .query(
            "authors",
            &Query::all().sorted(biblio_core::query::Sort::descending("id")),
        )
        .unwrap()
        .into_iter()
        .map(|entity| entity.id)
        .collect::<Vec<_>>();
    assert_eq!(sorted, vec!["authors/3-A", "authors/2-A", "authors/1-A"]);

    assert_eq!(
        session
            .count("authors", &Filter::is_in("id", ["authors/2-A", "authors/3-A"]))
            .unwrap(),
        2
    );
    assert_eq!(
        session
            .count(
                "authors",
                &Filter::and([Filter::ne("id", "authors/2-A"), Filter::eq("name", "Ada")])
            )
            .unwrap(),
        0
    );
    assert_eq!(session.count("authors", &Filter::eq("id", 1)).unwrap(), 0);
}
