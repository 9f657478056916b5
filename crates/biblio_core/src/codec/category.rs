use super::{put_id, put_opt, Codec, CodecResult, Fields, LibraryEntity, Record};
use crate::document::{Document, ID_FIELD};
use crate::identity::IdentityStrategy;
use crate::model::Category;

#[derive(Debug, Clone, Copy, Default)]
pub struct CategoryCodec;

impl Codec<Category> for CategoryCodec {
    fn encode(
        &self,
        category: &Category,
        identity: &dyn IdentityStrategy,
    ) -> CodecResult<Document> {
        let mut document = Document::new();
        put_id(&mut document, ID_FIELD, category.record_id(), identity);
        document.insert("name", category.name.as_str());
        put_opt(&mut document, "path", category.path.as_deref());
        Ok(document)
    }

    fn decode(
        &self,
        document: &Document,
        identity: &dyn IdentityStrategy,
    ) -> CodecResult<Category> {
        let fields = Fields::new("category", document);
        Ok(Category {
            id: fields.id(ID_FIELD, identity)?,
            name: fields.string_or_default("name")?,
            path: fields.string("path")?,
        })
    }
}

impl LibraryEntity for Category {
    const COLLECTION: &'static str = "categories";
    type Codec = CategoryCodec;
}
