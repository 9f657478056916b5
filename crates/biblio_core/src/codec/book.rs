use super::{put_id, put_opt, Codec, CodecResult, Fields, LibraryEntity, Record};
use crate::document::{Document, Value, ID_FIELD};
use crate::identity::IdentityStrategy;
use crate::model::{Book, LoanRecord};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default)]
pub struct BookCodec;

impl Codec<Book> for BookCodec {
    fn encode(&self, book: &Book, identity: &dyn IdentityStrategy) -> CodecResult<Document> {
        let mut document = Document::new();
        put_id(&mut document, ID_FIELD, book.record_id(), identity);
        put_opt(&mut document, "isbn", book.isbn.as_deref());
        document.insert("title", book.title.as_str());
        document.insert("publicationYear", book.publication_year);
        document.insert("pageCount", book.page_count);
        document.insert("available", book.available);

        if !book.authors_id.is_empty() {
            let authors = book
                .authors_id
                .iter()
                .map(|id| identity.to_native(id))
                .collect::<Vec<_>>();
            document.insert("authorsId", Value::Array(authors));
        }
        put_id(&mut document, "categoryId", book.category_id.as_deref(), identity);
        put_id(&mut document, "publisherId", book.publisher_id.as_deref(), identity);

        if !book.loan_history.is_empty() {
            let loans = book
                .loan_history
                .iter()
                .map(|loan| Value::Document(encode_loan(loan, identity)))
                .collect::<Vec<_>>();
            document.insert("loanHistory", Value::Array(loans));
        }
        if !book.metadata.is_empty() {
            let metadata = book
                .metadata
                .iter()
                .map(|(key, value)| (key.clone(), Value::from_json(value.clone())))
                .collect::<Document>();
            document.insert("metadata", metadata);
        }
        Ok(document)
    }

    fn decode(&self, document: &Document, identity: &dyn IdentityStrategy) -> CodecResult<Book> {
        let fields = Fields::new("book", document);

        let loan_history = fields
            .documents("loanHistory")?
            .into_iter()
            .map(|loan| decode_loan(loan, identity))
            .collect::<CodecResult<Vec<_>>>()?;
        let metadata = fields
            .document("metadata")?
            .map(|metadata| {
                metadata
                    .iter()
                    .map(|(key, value)| (key.to_string(), value.to_json()))
                    .collect::<BTreeMap<_, _>>()
            })
            .unwrap_or_default();

        Ok(Book {
            id: fields.id(ID_FIELD, identity)?,
            isbn: fields.string("isbn")?,
            title: fields.string_or_default("title")?,
            publication_year: fields.i32("publicationYear")?,
            page_count: fields.i32("pageCount")?,
            available: fields.bool("available")?,
            authors_id: fields.id_list("authorsId", identity)?,
            category_id: fields.id("categoryId", identity)?,
            publisher_id: fields.id("publisherId", identity)?,
            loan_history,
            metadata,
        })
    }
}

fn encode_loan(loan: &LoanRecord, identity: &dyn IdentityStrategy) -> Document {
    let mut document = Document::new();
    document.insert("memberId", identity.to_native(&loan.member_id));
    put_opt(&mut document, "memberName", loan.member_name.as_deref());
    document.insert("loanDate", loan.loan_date);
    document.insert("dueDate", loan.due_date);
    // Open loans keep an explicit null return date.
    document.insert("returnDate", loan.return_date);
    document
}

fn decode_loan(document: &Document, identity: &dyn IdentityStrategy) -> CodecResult<LoanRecord> {
    let fields = Fields::new("loan record", document);
    Ok(LoanRecord {
        member_id: fields.id("memberId", identity)?.unwrap_or_default(),
        member_name: fields.string("memberName")?,
        loan_date: fields.i64("loanDate")?.unwrap_or_default(),
        due_date: fields.i64("dueDate")?.unwrap_or_default(),
        return_date: fields.i64("returnDate")?,
    })
}

impl LibraryEntity for Book {
    const COLLECTION: &'static str = "books";
    type Codec = BookCodec;
}
