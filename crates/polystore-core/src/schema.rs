//! Explicit schema descriptors consumed by the record backends.
//!
//! A descriptor replaces per-table branching inside adapters: the adapter
//! reads the field list to build DDL and to map columns, and the engine
//! treats id/created_at/updated_at as system-managed rather than schema
//! fields.

/// Storage kind of a single record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    Real,
    Boolean,
    /// Structured value stored as a JSON-encoded string.
    Json,
}

/// A foreign-key-like association. Only the relational adapter turns this
/// into an enforced constraint; everywhere else it is a weak reference.
#[derive(Debug, Clone, Copy)]
pub struct Reference {
    pub collection: &'static str,
    pub cascade: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub references: Option<Reference>,
}

impl FieldDescriptor {
    pub const fn text(name: &'static str) -> Self {
        Self::new(name, FieldKind::Text, false)
    }

    pub const fn required_text(name: &'static str) -> Self {
        Self::new(name, FieldKind::Text, true)
    }

    pub const fn integer(name: &'static str) -> Self {
        Self::new(name, FieldKind::Integer, false)
    }

    pub const fn real(name: &'static str) -> Self {
        Self::new(name, FieldKind::Real, false)
    }

    pub const fn boolean(name: &'static str) -> Self {
        Self::new(name, FieldKind::Boolean, false)
    }

    pub const fn json(name: &'static str) -> Self {
        Self::new(name, FieldKind::Json, false)
    }

    pub const fn reference(
        name: &'static str,
        collection: &'static str,
        cascade: bool,
    ) -> Self {
        FieldDescriptor {
            name,
            kind: FieldKind::Integer,
            required: true,
            references: Some(Reference {
                collection,
                cascade,
            }),
        }
    }

    const fn new(name: &'static str, kind: FieldKind, required: bool) -> Self {
        FieldDescriptor {
            name,
            kind,
            required,
            references: None,
        }
    }
}

/// Descriptor for one logical entity kind.
#[derive(Debug, Clone, Copy)]
pub struct RecordSchema {
    /// Table name for relational backends.
    pub collection: &'static str,
    /// Discriminator value for backends sharing one physical store.
    pub record_type: &'static str,
    pub fields: &'static [FieldDescriptor],
}

impl RecordSchema {
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }
}
