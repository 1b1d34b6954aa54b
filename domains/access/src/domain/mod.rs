//! Access domain layer: permission types, grants, resource lineage

pub mod entities;
pub mod permission;
