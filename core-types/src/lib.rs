// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Shared settings schema, identifiers and the append-only record store for the slot allocation service.

pub mod config;
pub mod mapping;
pub mod uid;

pub use config::ServiceSettings;
pub use mapping::{Mapped, MappingError, MappingStore};
pub use uid::{AllocationUid, UID_LEN};
