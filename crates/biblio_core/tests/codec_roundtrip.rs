use biblio_core::codec::{AuthorCodec, BookCodec, CategoryCodec, MemberCodec, PublisherCodec};
use biblio_core::identity::{CompositeIdentity, OpaqueIdentity};
use biblio_core::model::{
    ActiveLoan, ContactInfo, EmergencyContact, LoanRecord, MemberPreferences, ReadingStats,
};
use biblio_core::{
    Author, Book, Category, Codec, CodecError, Document, Member, ObjectId, Publisher, Value,
};
use serde_json::json;
use std::collections::BTreeMap;

fn sample_member(id: &str, book_id: &str) -> Member {
    let mut member = Member::new("Grace", "Hopper").with_email("grace@example.org");
    member.id = Some(id.to_string());
    member.address = Some("1 Navy Yard".to_string());
    member.registration_date = 1_700_000_000_000;
    member.contact_info = Some(ContactInfo {
        phone: Some("555-0100".to_string()),
        alternate_email: None,
        emergency_contact: Some(EmergencyContact {
            name: Some("Vincent".to_string()),
            relationship: Some("spouse".to_string()),
            phone: None,
        }),
    });
    member.active_loans = vec![ActiveLoan {
        book_id: book_id.to_string(),
        book_title: Some("Compilers".to_string()),
        isbn: None,
        loan_date: 1_700_000_100_000,
        due_date: 1_701_000_000_000,
        is_overdue: true,
    }];
    member.reading_stats = Some(ReadingStats {
        total_books_read: 42,
        books_read_this_year: 3,
        average_days_to_return: 12,
        category_preferences: BTreeMap::from([("Computing".to_string(), 30)]),
        favorite_authors: vec!["Knuth".to_string()],
    });
    member.preferences = Some(MemberPreferences {
        preferred_format: Some("hardcover".to_string()),
        notification_preferences: BTreeMap::from([("email".to_string(), true)]),
        favorite_subjects: vec!["Mathematics".to_string()],
    });
    member
}

#[test]
fn member_round_trips_through_the_document_codec() {
    let member_id = ObjectId::new().to_hex();
    let book_id = ObjectId::new().to_hex();
    let member = sample_member(&member_id, &book_id);

    let document = MemberCodec.encode(&member, &OpaqueIdentity).unwrap();
    assert!(matches!(document.get("_id"), Some(Value::ObjectId(_))));
    assert!(matches!(
        document.get_path("activeLoans.0.bookId"),
        Some(Value::ObjectId(_))
    ));

    let decoded = MemberCodec.decode(&document, &OpaqueIdentity).unwrap();
    assert_eq!(decoded, member);
}

#[test]
fn member_round_trips_through_stored_json() {
    let member = sample_member("members/7-A", "books/3-A");

    let document = MemberCodec.encode(&member, &CompositeIdentity).unwrap();
    let reparsed = Document::from_json_str(&document.to_json_string()).unwrap();

    assert_eq!(MemberCodec.decode(&reparsed, &CompositeIdentity).unwrap(), member);
}

#[test]
fn open_loans_keep_an_explicit_null_return_date() {
    let member_id = ObjectId::new().to_hex();
    let mut book = Book::new("The Art of Computer Programming").with_page_count(672);
    book.loan_history = vec![
        LoanRecord {
            member_id: member_id.clone(),
            member_name: Some("Grace Hopper".to_string()),
            loan_date: 10,
            due_date: 20,
            return_date: Some(15),
        },
        LoanRecord {
            member_id,
            member_name: None,
            loan_date: 30,
            due_date: 40,
            return_date: None,
        },
    ];
    book.metadata = BTreeMap::from([
        ("edition".to_string(), json!(3)),
        ("tags".to_string(), json!(["algorithms", "classic"])),
    ]);

    let document = BookCodec.encode(&book, &OpaqueIdentity).unwrap();
    assert_eq!(document.get_path("loanHistory.1.returnDate"), Some(&Value::Null));
    assert_eq!(document.get("_id"), None);

    let decoded = BookCodec.decode(&document, &OpaqueIdentity).unwrap();
    assert_eq!(decoded, book);
    assert!(decoded.is_on_loan());
}

#[test]
fn reference_ids_encode_as_native_object_ids() {
    let author_id = ObjectId::new().to_hex();
    let book = Book::new("Emma")
        .with_author(author_id.clone())
        .with_category("not-hex");

    let document = BookCodec.encode(&book, &OpaqueIdentity).unwrap();

    assert_eq!(
        document.get("authorsId"),
        Some(&Value::Array(vec![Value::ObjectId(
            author_id.parse::<ObjectId>().unwrap()
        )]))
    );
    assert_eq!(document.get("categoryId"), Some(&Value::from("not-hex")));
}

#[test]
fn missing_optional_fields_decode_to_zero_values() {
    let document = Document::new().with("name", "Penguin");

    let publisher = PublisherCodec.decode(&document, &OpaqueIdentity).unwrap();
    assert_eq!(publisher, Publisher::new("Penguin"));

    let book = BookCodec.decode(&Document::new(), &OpaqueIdentity).unwrap();
    assert_eq!(book.title, "");
    assert_eq!(book.page_count, 0);
    assert!(!book.available);
    assert!(book.authors_id.is_empty());
}

#[test]
fn nested_identity_values_are_malformed() {
    let document = Document::new()
        .with("_id", Document::new().with("nested", 1))
        .with("name", "Broken");

    let err = AuthorCodec.decode(&document, &OpaqueIdentity).unwrap_err();
    assert!(matches!(
        err,
        CodecError::MalformedId { ref field, found: "document", .. } if field == "_id"
    ));

    let list_id = Document::new().with("_id", vec![1, 2]).with("name", "Broken");
    assert!(matches!(
        CategoryCodec.decode(&list_id, &OpaqueIdentity),
        Err(CodecError::MalformedId { found: "array", .. })
    ));
}

#[test]
fn mistyped_fields_are_rejected() {
    let document = Document::new().with("name", 12);

    let err = AuthorCodec.decode(&document, &OpaqueIdentity).unwrap_err();
    assert!(matches!(
        err,
        CodecError::InvalidType { ref field, expected: "a string", found: "int", .. } if field == "name"
    ));
}

#[test]
fn codecs_do_not_validate_domain_rules() {
    let category = Category::new("").with_path("");
    let document = CategoryCodec.encode(&category, &OpaqueIdentity).unwrap();
    assert_eq!(
        CategoryCodec.decode(&document, &OpaqueIdentity).unwrap(),
        category
    );

    let author = Author::new("");
    assert!(AuthorCodec.encode(&author, &OpaqueIdentity).is_ok());
}
