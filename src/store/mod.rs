//! The persistent document index: storage format, document records,
//! term postings, and atomic transactions.

pub mod document;
pub mod format;
pub mod fulltext;
pub mod index;
