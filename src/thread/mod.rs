//! Thread identity: ID allocation, ghost records, legacy parent
//! metadata, and the top-level linking algorithm.

pub mod alloc;
pub mod ghost;
pub mod linker;
pub mod parent_meta;
