//! Small cross-cutting helpers shared by the persistence and channel layers.

pub mod json_ext;
pub mod merge_inspector;
pub mod message_id_helpers;
pub mod type_guards;
