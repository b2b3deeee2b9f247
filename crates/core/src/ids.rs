//! Typed identifiers

use std::{
    cmp::Ordering,
    fmt::{Debug, Display, Formatter, Result as FmtResult},
    hash::{Hash, Hasher},
    marker::PhantomData,
    str::FromStr,
};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// A UUID tagged with the entity type it identifies, so that a tier id can
/// never be passed where a product id is expected.
pub struct TypedId<T>(Uuid, PhantomData<T>);

impl<T> TypedId<T> {
    /// Wrap an existing UUID.
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid, PhantomData)
    }

    /// Generate a fresh random id.
    #[must_use]
    pub fn new() -> Self {
        Self::from_uuid(Uuid::new_v4())
    }

    /// Unwrap into the underlying UUID.
    #[must_use]
    pub const fn into_uuid(self) -> Uuid {
        self.0
    }
}

impl<T> Default for TypedId<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for TypedId<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for TypedId<T> {}

impl<T> Debug for TypedId<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        Debug::fmt(&self.0, f)
    }
}

impl<T> Display for TypedId<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        Display::fmt(&self.0, f)
    }
}

impl<T> PartialEq for TypedId<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<T> Eq for TypedId<T> {}

impl<T> Hash for TypedId<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl<T> PartialOrd for TypedId<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for TypedId<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl<T> From<Uuid> for TypedId<T> {
    fn from(value: Uuid) -> Self {
        Self::from_uuid(value)
    }
}

impl<T> From<TypedId<T>> for Uuid {
    fn from(value: TypedId<T>) -> Self {
        value.into_uuid()
    }
}

impl<T> FromStr for TypedId<T> {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_uuid(Uuid::from_str(s)?))
    }
}

impl<T> Serialize for TypedId<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de, T> Deserialize<'de> for TypedId<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self::from_uuid(Uuid::deserialize(deserializer)?))
    }
}

/// Tag for product identifiers.
#[derive(Debug)]
pub struct ProductTag;

/// Tag for pricing tier identifiers.
#[derive(Debug)]
pub struct TierTag;

/// Tag for add-on identifiers.
#[derive(Debug)]
pub struct AddonTag;

/// Tag for pricing model identifiers.
#[derive(Debug)]
pub struct PricingModelTag;

/// Tag for saved quote identifiers.
#[derive(Debug)]
pub struct QuoteTag;

/// Identifies a product in a price book.
pub type ProductId = TypedId<ProductTag>;

/// Identifies a pricing tier of a product.
pub type TierId = TypedId<TierTag>;

/// Identifies an optional add-on under a tier.
pub type AddonId = TypedId<AddonTag>;

/// Identifies the pricing model version a product is bound to.
pub type PricingModelId = TypedId<PricingModelTag>;

/// Identifies a saved quote document.
pub type QuoteId = TypedId<QuoteTag>;

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    #[test]
    fn typed_ids_round_trip_through_uuid() {
        let uuid = Uuid::new_v4();
        let id = ProductId::from_uuid(uuid);

        assert_eq!(id.into_uuid(), uuid);
        assert_eq!(Uuid::from(id), uuid);
        assert_eq!(ProductId::from(uuid), id);
    }

    #[test]
    fn typed_ids_parse_from_string() -> TestResult {
        let id: TierId = "8c1df1f5-94b2-4c6e-9d35-5c6b6da8b9f1".parse()?;

        assert_eq!(
            id.to_string(),
            "8c1df1f5-94b2-4c6e-9d35-5c6b6da8b9f1".to_string()
        );

        Ok(())
    }

    #[test]
    fn typed_ids_serialize_as_plain_uuids() -> TestResult {
        let id = AddonId::new();
        let json = serde_json::to_string(&id)?;
        let back: AddonId = serde_json::from_str(&json)?;

        assert_eq!(back, id);
        assert_eq!(json, format!("\"{id}\""));

        Ok(())
    }

    #[test]
    fn fresh_ids_are_distinct() {
        assert_ne!(ProductId::new(), ProductId::new());
    }
}
