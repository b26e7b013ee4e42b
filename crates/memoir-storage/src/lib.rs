//! Blob store capability.
//!
//! This crate provides:
//! - The [`BlobStore`] trait with streamed upload and download handles
//! - An S3-compatible backend with multipart uploads
//! - An in-memory backend with the same atomic-finalize semantics
//! - Stream-to-file and file-to-stream transfer helpers

pub mod blob;
pub mod error;
pub mod memory;
pub mod s3;

pub use blob::{copy_to_file, upload_file, BlobReader, BlobStore, BlobUpload};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryBlobStore;
pub use s3::{S3BlobStore, S3Config};
