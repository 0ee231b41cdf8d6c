use std::fmt;
use std::marker::PhantomData;

use rkyv::{Archive, Deserialize, Serialize};

/// Every kind of entity the cosmos can hold. Each kind owns one pool.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Archive, Serialize, Deserialize,
)]
#[rkyv(derive(Debug))]
pub enum EntityType {
    Character,
    Vehicle,
    Projectile,
}

impl EntityType {
    pub const ALL: [EntityType; 3] = [
        EntityType::Character,
        EntityType::Vehicle,
        EntityType::Projectile,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Character => "character",
            EntityType::Vehicle => "vehicle",
            EntityType::Projectile => "projectile",
        }
    }

    pub(crate) fn tag(&self) -> u32 {
        match self {
            EntityType::Character => 1,
            EntityType::Vehicle => 2,
            EntityType::Projectile => 3,
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position of an entity inside its pool plus the generation of that slot.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Archive,
    Serialize,
    Deserialize,
)]
#[rkyv(derive(Debug))]
pub struct RawId {
    pub index: u32,
    pub version: u32,
}

impl RawId {
    pub fn new(index: u32, version: u32) -> Self {
        Self { index, version }
    }
}

/// Identifies one entity across the whole cosmos.
///
/// Ordering is by kind, then index, then version, which is the order every
/// system iterates in.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Archive, Serialize, Deserialize,
)]
#[rkyv(derive(Debug))]
pub struct EntityId {
    pub kind: EntityType,
    pub raw: RawId,
}

impl EntityId {
    pub fn new(kind: EntityType, raw: RawId) -> Self {
        Self { kind, raw }
    }

    pub fn index(&self) -> u32 {
        self.raw.index
    }

    pub fn version(&self) -> u32 {
        self.raw.version
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}v{}", self.kind, self.raw.index, self.raw.version)
    }
}

/// Compile-time typed id. Converts into [`EntityId`] for storage in components
/// and on the wire.
pub struct TypedId<E> {
    raw: RawId,
    _kind: PhantomData<fn() -> E>,
}

impl<E> TypedId<E> {
    pub(crate) fn from_raw(raw: RawId) -> Self {
        Self {
            raw,
            _kind: PhantomData,
        }
    }

    pub fn raw(&self) -> RawId {
        self.raw
    }
}

impl<E: super::EntityKind> TypedId<E> {
    pub fn id(&self) -> EntityId {
        EntityId::new(E::KIND, self.raw)
    }

    /// Narrows an untyped id. Fails when the kind does not match.
    pub fn try_from_id(id: EntityId) -> Option<Self> {
        (id.kind == E::KIND).then(|| Self::from_raw(id.raw))
    }
}

impl<E: super::EntityKind> From<TypedId<E>> for EntityId {
    fn from(typed: TypedId<E>) -> Self {
        typed.id()
    }
}

impl<E> Clone for TypedId<E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for TypedId<E> {}

impl<E> PartialEq for TypedId<E> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<E> Eq for TypedId<E> {}

impl<E> fmt::Debug for TypedId<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedId")
            .field("index", &self.raw.index)
            .field("version", &self.raw.version)
            .finish()
    }
}
