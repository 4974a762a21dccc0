//! # Entity Schema
//!
//! Static field tables describing the canonical shape of each entity type.
//!
//! Every canonical field has a camelCase name, a kind that decides its default
//! value, and optional legacy aliases used by seed/import tooling. The
//! snake_case spelling of a canonical name is always accepted as an alias and
//! does not need to be listed.
//!
//! The tables are consumed by [`normalizer::normalize`], which is the only
//! place in the crate that resolves naming ambiguity.

pub mod normalizer;

pub use normalizer::{canonical_key, normalize, to_camel_case, to_snake_case};

use crate::shared::entity::EntityType;
use serde_json::Value;

/// Value family of a canonical field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// String, defaults to `""`
    Text,
    /// Number, defaults to `0`
    Number,
    /// Array, defaults to `[]`
    List,
    /// Boolean, defaults to `false`
    Flag,
}

impl FieldKind {
    /// Value used when neither the canonical nor a legacy name is present
    pub fn default_value(&self) -> Value {
        match self {
            FieldKind::Text => Value::String(String::new()),
            FieldKind::Number => Value::from(0),
            FieldKind::List => Value::Array(Vec::new()),
            FieldKind::Flag => Value::Bool(false),
        }
    }
}

/// One canonical attribute
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    /// Canonical camelCase name
    pub name: &'static str,
    /// Value family
    pub kind: FieldKind,
    /// Legacy names besides the snake_case spelling, in lookup order
    pub aliases: &'static [&'static str],
}

const fn text(name: &'static str) -> FieldSpec {
    FieldSpec { name, kind: FieldKind::Text, aliases: &[] }
}

const fn number(name: &'static str) -> FieldSpec {
    FieldSpec { name, kind: FieldKind::Number, aliases: &[] }
}

const fn list(name: &'static str) -> FieldSpec {
    FieldSpec { name, kind: FieldKind::List, aliases: &[] }
}

const fn flag(name: &'static str) -> FieldSpec {
    FieldSpec { name, kind: FieldKind::Flag, aliases: &[] }
}

const fn alias(spec: FieldSpec, aliases: &'static [&'static str]) -> FieldSpec {
    FieldSpec { aliases, ..spec }
}

/// Legacy names of the `id` field
pub const ID_ALIASES: &[&str] = &["_id", "uuid"];
/// Legacy names of the `updatedAt` field
pub const UPDATED_AT_ALIASES: &[&str] = &["updated_at", "modifiedAt", "modified_at", "lastModified"];
/// Legacy names of the `syncState` field
pub const SYNC_STATE_ALIASES: &[&str] = &["sync_state", "syncStatus", "sync_status"];

const PROPERTY_FIELDS: &[FieldSpec] = &[
    text("title"),
    text("description"),
    text("address"),
    text("city"),
    alias(text("postalCode"), &["zip", "zip_code", "zipCode"]),
    alias(number("price"), &["listing_price", "listingPrice"]),
    text("currency"),
    text("status"),
    alias(text("propertyType"), &["type", "kind"]),
    number("bedrooms"),
    number("bathrooms"),
    alias(number("areaSqm"), &["area", "surface"]),
    alias(text("agentId"), &["agent"]),
    alias(list("photos"), &["images"]),
    list("tags"),
    number("createdAt"),
];

const CONTACT_FIELDS: &[FieldSpec] = &[
    alias(text("firstName"), &["first", "given_name"]),
    alias(text("lastName"), &["last", "family_name", "surname"]),
    text("email"),
    alias(text("phone"), &["phone_number", "phoneNumber", "mobile"]),
    text("company"),
    text("role"),
    text("notes"),
    list("tags"),
    number("createdAt"),
];

const DEAL_FIELDS: &[FieldSpec] = &[
    text("title"),
    alias(text("propertyId"), &["property"]),
    alias(text("contactId"), &["contact", "client_id"]),
    alias(text("agentId"), &["agent"]),
    alias(text("stage"), &["pipeline_stage", "status"]),
    alias(number("value"), &["amount", "deal_value"]),
    text("currency"),
    number("probability"),
    alias(text("expectedCloseDate"), &["close_date", "closeDate"]),
    text("notes"),
    number("createdAt"),
];

const AGENT_FIELDS: &[FieldSpec] = &[
    alias(text("name"), &["full_name", "fullName"]),
    text("email"),
    alias(text("phone"), &["phone_number", "mobile"]),
    text("region"),
    alias(flag("active"), &["is_active", "isActive"]),
    alias(text("avatarUrl"), &["avatar", "photo_url"]),
    number("createdAt"),
];

const TASK_FIELDS: &[FieldSpec] = &[
    text("title"),
    text("description"),
    alias(text("dueDate"), &["due", "deadline"]),
    alias(flag("done"), &["completed", "is_done", "isDone"]),
    text("priority"),
    alias(text("assigneeId"), &["assigned_to", "assignee"]),
    alias(text("relatedId"), &["related_to"]),
    number("createdAt"),
];

const CHECK_IN_FIELDS: &[FieldSpec] = &[
    alias(text("agentId"), &["agent"]),
    alias(text("propertyId"), &["property"]),
    alias(number("latitude"), &["lat"]),
    alias(number("longitude"), &["lng", "lon"]),
    alias(text("note"), &["notes", "comment"]),
    alias(number("capturedAt"), &["timestamp", "captured"]),
    alias(list("mediaIds"), &["media", "attachments"]),
];

const MEDIA_FIELDS: &[FieldSpec] = &[
    alias(text("ownerType"), &["owner_kind"]),
    alias(text("ownerId"), &["owner"]),
    alias(text("kind"), &["media_type", "type"]),
    alias(text("uri"), &["url", "file_path", "path"]),
    alias(text("mimeType"), &["content_type", "mime"]),
    alias(number("durationSeconds"), &["duration"]),
    alias(number("sizeBytes"), &["size"]),
    alias(number("capturedAt"), &["timestamp"]),
];

/// Canonical field table of an entity type
pub fn fields_for(entity_type: EntityType) -> &'static [FieldSpec] {
    match entity_type {
        EntityType::Property => PROPERTY_FIELDS,
        EntityType::Contact => CONTACT_FIELDS,
        EntityType::Deal => DEAL_FIELDS,
        EntityType::Agent => AGENT_FIELDS,
        EntityType::Task => TASK_FIELDS,
        EntityType::CheckIn => CHECK_IN_FIELDS,
        EntityType::Media => MEDIA_FIELDS,
    }
}

/// Look up one canonical field
pub fn field_spec(entity_type: EntityType, name: &str) -> Option<&'static FieldSpec> {
    fields_for(entity_type).iter().find(|spec| spec.name == name)
}
