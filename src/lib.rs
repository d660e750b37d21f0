#![doc = include_str!("../README.md")]
#![warn(rustdoc::all)]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![deny(unused_must_use, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

#[macro_use]
extern crate tracing;

pub mod error;
pub use error::{Result, StoreError};

mod config;
pub use config::Config;

pub mod uri;

pub mod utils;

pub mod analysis;
pub use analysis::{CompletionItem, CompletionItemKind, DocumentScope, Spanned, ZigData};

pub mod build_file;
pub use build_file::{BuildAssociatedConfig, BuildConfig, BuildFile, Package};

pub mod translate;
pub use translate::CimportResult;

mod store;
pub use store::{Cimport, Document, DocumentStore};

pub use url::Url;
