//! Strongly typed identifiers.
//!
//! Every identifier is a `Uuid` newtype so a `UnitId` can never be passed where a
//! `ReservationId` is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            #[doc = concat!("Creates a new random `", stringify!($name), "`")]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            #[doc = concat!("Create a `", stringify!($name), "` from a `Uuid`")]
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id! {
    /// Unique identifier for one physical equipment unit
    UnitId
}

define_id! {
    /// Unique identifier for a reservation
    ReservationId
}

define_id! {
    /// Training session a reservation belongs to
    SessionId
}

define_id! {
    /// Player a unit is assigned to
    PlayerId
}

define_id! {
    /// Facility that houses equipment units
    FacilityId
}

define_id! {
    /// Staff user acting on reservations
    UserId
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn ids_round_trip_through_uuid() {
        let uuid = Uuid::new_v4();
        let id = UnitId::from_uuid(uuid);
        assert_eq!(id.as_uuid(), &uuid);
        assert_eq!(id.to_string(), uuid.to_string());
    }

    #[test]
    fn ids_serialize_transparently() {
        let id = ReservationId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
    }
}
