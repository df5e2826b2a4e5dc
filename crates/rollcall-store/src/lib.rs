//! rollcall-store — SQLite-backed persistence for identities and
//! attendance events.
//!
//! Implements the core's `IdentityStore` and `AttendanceStore` collaborator
//! traits plus the admin queries the CLI needs. Enrollment samples live as
//! image files under `<images_root>/<employee_id>/`; however many samples a
//! directory holds, all of them are enrolled.

pub mod sqlite;

pub use sqlite::{SqliteStore, StoreCounts, StoreError};
