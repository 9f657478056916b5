use super::{put_id, put_opt, put_strings, Codec, CodecResult, Fields, LibraryEntity, Record};
use crate::document::{Document, Value, ID_FIELD};
use crate::identity::IdentityStrategy;
use crate::model::{
    ActiveLoan, ContactInfo, EmergencyContact, Member, MemberPreferences, ReadingStats,
};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default)]
pub struct MemberCodec;

impl Codec<Member> for MemberCodec {
    fn encode(&self, member: &Member, identity: &dyn IdentityStrategy) -> CodecResult<Document> {
        let mut document = Document::new();
        put_id(&mut document, ID_FIELD, member.record_id(), identity);
        document.insert("firstName", member.first_name.as_str());
        document.insert("lastName", member.last_name.as_str());
        put_opt(&mut document, "email", member.email.as_deref());
        put_opt(&mut document, "address", member.address.as_deref());
        document.insert("registrationDate", member.registration_date);

        if let Some(contact) = &member.contact_info {
            document.insert("contactInfo", encode_contact(contact));
        }
        if !member.active_loans.is_empty() {
            let loans = member
                .active_loans
                .iter()
                .map(|loan| Value::Document(encode_active_loan(loan, identity)))
                .collect::<Vec<_>>();
            document.insert("activeLoans", Value::Array(loans));
        }
        if let Some(stats) = &member.reading_stats {
            document.insert("readingStats", encode_stats(stats));
        }
        if let Some(preferences) = &member.preferences {
            document.insert("preferences", encode_preferences(preferences));
        }
        Ok(document)
    }

    fn decode(&self, document: &Document, identity: &dyn IdentityStrategy) -> CodecResult<Member> {
        let fields = Fields::new("member", document);

        let contact_info = fields.document("contactInfo")?.map(decode_contact).transpose()?;
        let active_loans = fields
            .documents("activeLoans")?
            .into_iter()
            .map(|loan| decode_active_loan(loan, identity))
            .collect::<CodecResult<Vec<_>>>()?;
        let reading_stats = fields.document("readingStats")?.map(decode_stats).transpose()?;
        let preferences = fields
            .document("preferences")?
            .map(decode_preferences)
            .transpose()?;

        Ok(Member {
            id: fields.id(ID_FIELD, identity)?,
            first_name: fields.string_or_default("firstName")?,
            last_name: fields.string_or_default("lastName")?,
            email: fields.string("email")?,
            address: fields.string("address")?,
            registration_date: fields.i64("registrationDate")?.unwrap_or_default(),
            contact_info,
            active_loans,
            reading_stats,
            preferences,
        })
    }
}

fn encode_contact(contact: &ContactInfo) -> Document {
    let mut document = Document::new();
    put_opt(&mut document, "phone", contact.phone.as_deref());
    put_opt(&mut document, "alternateEmail", contact.alternate_email.as_deref());
    if let Some(emergency) = &contact.emergency_contact {
        let mut nested = Document::new();
        put_opt(&mut nested, "name", emergency.name.as_deref());
        put_opt(&mut nested, "relationship", emergency.relationship.as_deref());
        put_opt(&mut nested, "phone", emergency.phone.as_deref());
        document.insert("emergencyContact", nested);
    }
    document
}

fn decode_contact(document: &Document) -> CodecResult<ContactInfo> {
    let fields = Fields::new("contact info", document);
    let emergency_contact = fields
        .document("emergencyContact")?
        .map(|nested| -> CodecResult<EmergencyContact> {
            let fields = Fields::new("emergency contact", nested);
            Ok(EmergencyContact {
                name: fields.string("name")?,
                relationship: fields.string("relationship")?,
                phone: fields.string("phone")?,
            })
        })
        .transpose()?;
    Ok(ContactInfo {
        phone: fields.string("phone")?,
        alternate_email: fields.string("alternateEmail")?,
        emergency_contact,
    })
}

fn encode_active_loan(loan: &ActiveLoan, identity: &dyn IdentityStrategy) -> Document {
    let mut document = Document::new();
    document.insert("bookId", identity.to_native(&loan.book_id));
    put_opt(&mut document, "bookTitle", loan.book_title.as_deref());
    put_opt(&mut document, "isbn", loan.isbn.as_deref());
    document.insert("loanDate", loan.loan_date);
    document.insert("dueDate", loan.due_date);
    document.insert("isOverdue", loan.is_overdue);
    document
}

fn decode_active_loan(
    document: &Document,
    identity: &dyn IdentityStrategy,
) -> CodecResult<ActiveLoan> {
    let fields = Fields::new("active loan", document);
    Ok(ActiveLoan {
        book_id: fields.id("bookId", identity)?.unwrap_or_default(),
        book_title: fields.string("bookTitle")?,
        isbn: fields.string("isbn")?,
        loan_date: fields.i64("loanDate")?.unwrap_or_default(),
        due_date: fields.i64("dueDate")?.unwrap_or_default(),
        is_overdue: fields.bool("isOverdue")?,
    })
}

fn encode_stats(stats: &ReadingStats) -> Document {
    let mut document = Document::new()
        .with("totalBooksRead", stats.total_books_read)
        .with("booksReadThisYear", stats.books_read_this_year)
        .with("averageDaysToReturn", stats.average_days_to_return);
    if !stats.category_preferences.is_empty() {
        let preferences = stats
            .category_preferences
            .iter()
            .map(|(category, count)| (category.clone(), Value::from(*count)))
            .collect::<Document>();
        document.insert("categoryPreferences", preferences);
    }
    put_strings(&mut document, "favoriteAuthors", &stats.favorite_authors);
    document
}

fn decode_stats(document: &Document) -> CodecResult<ReadingStats> {
    let fields = Fields::new("reading stats", document);
    let category_preferences = match fields.document("categoryPreferences")? {
        Some(nested) => {
            let counts = Fields::new("category preferences", nested);
            nested
                .keys()
                .map(|category| -> CodecResult<(String, i32)> {
                    Ok((category.to_string(), counts.i32(category)?))
                })
                .collect::<CodecResult<BTreeMap<_, _>>>()?
        }
        None => BTreeMap::new(),
    };
    Ok(ReadingStats {
        total_books_read: fields.i32("totalBooksRead")?,
        books_read_this_year: fields.i32("booksReadThisYear")?,
        average_days_to_return: fields.i32("averageDaysToReturn")?,
        category_preferences,
        favorite_authors: fields.string_list("favoriteAuthors")?,
    })
}

fn encode_preferences(preferences: &MemberPreferences) -> Document {
    let mut document = Document::new();
    put_opt(&mut document, "preferredFormat", preferences.preferred_format.as_deref());
    if !preferences.notification_preferences.is_empty() {
        let channels = preferences
            .notification_preferences
            .iter()
            .map(|(channel, enabled)| (channel.clone(), Value::Bool(*enabled)))
            .collect::<Document>();
        document.insert("notificationPreferences", channels);
    }
    put_strings(&mut document, "favoriteSubjects", &preferences.favorite_subjects);
    document
}

fn decode_preferences(document: &Document) -> CodecResult<MemberPreferences> {
    let fields = Fields::new("preferences", document);
    let notification_preferences = match fields.document("notificationPreferences")? {
        Some(nested) => {
            let channels = Fields::new("notification preferences", nested);
            nested
                .keys()
                .map(|channel| -> CodecResult<(String, bool)> {
                    Ok((channel.to_string(), channels.bool(channel)?))
                })
                .collect::<CodecResult<BTreeMap<_, _>>>()?
        }
        None => BTreeMap::new(),
    };
    Ok(MemberPreferences {
        preferred_format: fields.string("preferredFormat")?,
        notification_preferences,
        favorite_subjects: fields.string_list("favoriteSubjects")?,
    })
}

impl LibraryEntity for Member {
    const COLLECTION: &'static str = "members";
    type Codec = MemberCodec;
}
