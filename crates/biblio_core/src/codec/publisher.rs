use super::{put_id, Codec, CodecResult, Fields, LibraryEntity, Record};
use crate::document::{Document, ID_FIELD};
use crate::identity::IdentityStrategy;
use crate::model::Publisher;

#[derive(Debug, Clone, Copy, Default)]
pub struct PublisherCodec;

impl Codec<Publisher> for PublisherCodec {
    fn encode(
        &self,
        publisher: &Publisher,
        identity: &dyn IdentityStrategy,
    ) -> CodecResult<Document> {
        let mut document = Document::new();
        put_id(&mut document, ID_FIELD, publisher.record_id(), identity);
        document.insert("name", publisher.name.as_str());
        Ok(document)
    }

    fn decode(
        &self,
        document: &Document,
        identity: &dyn IdentityStrategy,
    ) -> CodecResult<Publisher> {
        let fields = Fields::new("publisher", document);
        Ok(Publisher {
            id: fields.id(ID_FIELD, identity)?,
            name: fields.string_or_default("name")?,
        })
    }
}

impl LibraryEntity for Publisher {
    const COLLECTION: &'static str = "publishers";
    type Codec = PublisherCodec;
}
