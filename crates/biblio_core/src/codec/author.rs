use super::{put_id, put_opt, Codec, CodecResult, Fields, LibraryEntity, Record};
use crate::document::{Document, ID_FIELD};
use crate::identity::IdentityStrategy;
use crate::model::Author;

#[derive(Debug, Clone, Copy, Default)]
pub struct AuthorCodec;

impl Codec<Author> for AuthorCodec {
    fn encode(&self, author: &Author, identity: &dyn IdentityStrategy) -> CodecResult<Document> {
        let mut document = Document::new();
        put_id(&mut document, ID_FIELD, author.record_id(), identity);
        document.insert("name", author.name.as_str());
        put_opt(&mut document, "nationality", author.nationality.as_deref());
        Ok(document)
    }

    fn decode(&self, document: &Document, identity: &dyn IdentityStrategy) -> CodecResult<Author> {
        let fields = Fields::new("author", document);
        Ok(Author {
            id: fields.id(ID_FIELD, identity)?,
            name: fields.string_or_default("name")?,
            nationality: fields.string("nationality")?,
        })
    }
}

impl LibraryEntity for Author {
    const COLLECTION: &'static str = "authors";
    type Codec = AuthorCodec;
}
