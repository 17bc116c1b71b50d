//! Core identifier types shared across storage, execution, and indexing.

/// Identifier of a node or edge within its entity pool.
pub type EntityId = u64;

/// Node identifier.
pub type NodeId = u64;

/// Edge identifier.
pub type EdgeId = u64;

/// Small integer identifying a node label.
pub type LabelId = u16;

/// Small integer identifying a relation type.
pub type RelationId = u16;

/// Small integer identifying an attribute name.
pub type AttrId = u16;

/// Sentinel for "no entity".
pub const INVALID_ENTITY_ID: EntityId = u64::MAX;

/// Sentinel for a label that is not (yet) known to the schema.
pub const UNKNOWN_LABEL: LabelId = LabelId::MAX;

/// Sentinel for a relation type that is not (yet) known to the schema.
pub const UNKNOWN_RELATION: RelationId = RelationId::MAX;

/// Sentinel for an attribute name that is not (yet) known to the schema.
pub const UNKNOWN_ATTR: AttrId = AttrId::MAX;
