//! Event-access credential rendering and print-batch pipeline.
//!
//! The crate has two halves: `render` turns a template plus credential data
//! into a raster image (photo, QR, text and zone blocks), and `batch` owns
//! the asynchronous print pipeline that aggregates many rendered credentials
//! into paginated PDFs. Everything around them (`store`, `storage`,
//! `notify`, `attach`) is the seam towards the surrounding CRUD application.

pub mod attach;
pub mod batch;
pub mod cache;
pub mod config;
pub mod model;
pub mod notify;
pub mod pdf;
pub mod render;
pub mod storage;
pub mod store;
pub mod util;

pub use batch::orchestrator::Orchestrator;
pub use batch::worker::{spawn_worker, BatchJob, RenderCredential};
pub use config::Config;
pub use render::credential::CredentialRenderer;
pub use store::Store;
