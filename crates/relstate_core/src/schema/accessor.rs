//! Precomputed per-model accessor tables.

/// How a field name on a model is read and written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Accessor {
    /// Plain value stored on the row.
    Attribute,
    /// Id stored on the row, resolving to one `to` row.
    ForeignKey {
        /// Target model.
        to: String,
    },
    /// Id stored on the row, resolving to one `to` row.
    OneToOne {
        /// Target model.
        to: String,
    },
    /// Collection of `from` rows whose `field` points here.
    ReverseForeignKey {
        /// Owning model.
        from: String,
        /// Foreign key field on the owning model.
        field: String,
    },
    /// The `from` row whose `field` points here, if any.
    ReverseOneToOne {
        /// Owning model.
        from: String,
        /// One-to-one field on the owning model.
        field: String,
    },
    /// Collection linked through a join model.
    ManyToMany(ManyToManyPath),
}

impl Accessor {
    /// Whether the accessor yields a collection.
    pub fn is_collection(&self) -> bool {
        matches!(
            self,
            Accessor::ReverseForeignKey { .. } | Accessor::ManyToMany(_)
        )
    }

    /// Whether the value is stored on the row itself.
    pub fn is_stored(&self) -> bool {
        matches!(
            self,
            Accessor::Attribute | Accessor::ForeignKey { .. } | Accessor::OneToOne { .. }
        )
    }
}

/// A many-to-many relation seen from one side.
///
/// The forward side is the model that declared the relation; the backward
/// side is its target. For a self-referencing relation both sides are the
/// same model and differ only by which join column is "this side".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManyToManyPath {
    /// Model that declared the relation.
    pub owner: String,
    /// Field name on the owner.
    pub field: String,
    /// Target model.
    pub target: String,
    /// Join model.
    pub through: String,
    /// Join column pointing at the owner.
    pub from_column: String,
    /// Join column pointing at the target.
    pub to_column: String,
    /// Whether this is the owner's view.
    pub forward: bool,
    /// Whether deleting a target deletes the owners linked to it.
    pub cascade: bool,
}

impl ManyToManyPath {
    /// Join column holding this side's id.
    pub fn this_column(&self) -> &str {
        if self.forward {
            &self.from_column
        } else {
            &self.to_column
        }
    }

    /// Join column holding the other side's id.
    pub fn other_column(&self) -> &str {
        if self.forward {
            &self.to_column
        } else {
            &self.from_column
        }
    }

    /// Model on this side.
    pub fn this_model(&self) -> &str {
        if self.forward {
            &self.owner
        } else {
            &self.target
        }
    }

    /// Model on the other side.
    pub fn other_model(&self) -> &str {
        if self.forward {
            &self.target
        } else {
            &self.owner
        }
    }

    /// The same relation seen from the other side.
    #[must_use]
    pub fn reversed(&self) -> Self {
        Self {
            forward: !self.forward,
            ..self.clone()
        }
    }
}

/// A relation pointing at a model, consulted when one of its rows is deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReverseRelation {
    /// Rows of `from` whose `field` holds the deleted id.
    ForeignKey {
        /// Owning model.
        from: String,
        /// Foreign key field.
        field: String,
        /// Delete the owning rows instead of nulling the field.
        cascade: bool,
    },
    /// The row of `from` whose `field` holds the deleted id.
    OneToOne {
        /// Owning model.
        from: String,
        /// One-to-one field.
        field: String,
        /// Delete the owning row instead of nulling the field.
        cascade: bool,
    },
    /// Join rows linking the deleted row.
    ManyToMany(ManyToManyPath),
}
