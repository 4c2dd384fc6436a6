//! The harvest pipeline, stage by stage.
//!
//! ```text
//! fetch ──▶ paginate ──▶ extract ──▶ transform ──▶ HarvestedItem
//!                                       │
//!                         resolve ◀─────┤
//!                         materialize ◀─┘
//! ```
//!
//! [`fetch`] turns URLs into sanitized XML text; [`paginate`] walks the
//! paged export; [`extract`] yields [`extract::SourceItem`]s from each
//! page; [`transform`] converts SPIP markup to HTML, leaning on
//! [`resolve`] for document-id lookups and [`materialize`] for media
//! downloads. The driver in [`crate::harvest`] wires the stages together.

pub mod extract;
pub mod fetch;
pub mod materialize;
pub mod paginate;
pub mod resolve;
pub mod transform;
