//! tradeextract
//! ------------
//! Turns timestamped broker chat messages into structured trade records with a
//! text-generation model, then collapses near-duplicate trades pooled from many
//! transcripts.
//!
//! Pipeline:
//!   messages.json -> batches -> prompt -> completion service -> strict array parse
//!   -> per-message `{timestamp, llm_structured}` -> pooled trades -> fingerprint dedupe
//!
//! The extractor guarantees one result per input message, in input order, even
//! when the service fails or replies with garbage: a bad batch degrades to nulls
//! and never takes the rest of the run down with it.

pub mod config;
pub mod dedupe;
pub mod error;
pub mod extract;
pub mod fingerprint;
pub mod message;
pub mod pipeline;
pub mod prompt;
pub mod reply;
pub mod service;

pub use config::ExtractConfig;
pub use dedupe::{dedupe, load_trades_from_dir};
pub use error::{BatchFailure, ReplyError, ServiceError, StoreError};
pub use extract::{BatchDiagnostic, ExtractionResult, ExtractionRun, Extractor, RunReport, TradeRecord};
pub use fingerprint::{fingerprint, FINGERPRINT_FIELDS};
pub use message::{load_messages, Message};
pub use pipeline::{dedupe_dir, extract_dir, extract_file, llm_output_name};
pub use service::{CompletionRequest, CompletionService, OpenAiService};
