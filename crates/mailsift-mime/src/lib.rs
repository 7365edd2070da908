//! # mailsift-mime
//!
//! Resilient MIME envelope builder for email.
//!
//! Real-world mail is frequently malformed. This crate parses whatever it is
//! given into an [`Envelope`] and records every defect it works around in a
//! diagnostic ledger instead of failing.
//!
//! ## Features
//!
//! - **Part tree**: Arena of [`Part`]s built by recursive multipart descent
//! - **Body reconciliation**: Chooses plain and HTML bodies, synthesizing
//!   plain text from HTML when needed
//! - **Classification**: Separates inline content from attachments
//! - **Encodings**: Lenient Base64, Quoted-Printable, RFC 2047 and RFC 2231
//! - **Charsets**: Declared charset, UTF-8, then a configurable fallback
//! - **Diagnostics**: Every recovery leaves a [`Finding`]
//!
//! ## Quick Start
//!
//! ```
//! use mailsift_mime::Envelope;
//!
//! let raw = "From: sender@example.com\r\n\
//!            Subject: Test\r\n\
//!            Content-Type: text/plain\r\n\
//!            \r\n\
//!            Hello, World!";
//!
//! let envelope = Envelope::parse(raw)?;
//! assert_eq!(envelope.subject(), Some("Test"));
//! assert_eq!(envelope.text(), Some("Hello, World!"));
//! assert!(envelope.diagnostics().is_empty());
//! # Ok::<(), mailsift_mime::Error>(())
//! ```
//!
//! ### Inspecting Diagnostics
//!
//! ```
//! use mailsift_mime::{Envelope, FindingKind};
//!
//! let envelope = Envelope::parse("Subject: no type\r\n\r\nbody")?;
//! let finding = &envelope.diagnostics()[0];
//! assert_eq!(finding.kind, FindingKind::MissingContentType);
//! assert!(finding.to_string().starts_with("[E] MissingContentType: "));
//! # Ok::<(), mailsift_mime::Error>(())
//! ```
//!
//! ### Options
//!
//! ```
//! use mailsift_mime::{Envelope, ParserOptions};
//!
//! let options = ParserOptions::builder()
//!     .max_depth(8)
//!     .max_message_size(10 * 1024 * 1024)
//!     .fallback_charset("iso-8859-2")
//!     .build();
//!
//! let envelope = Envelope::parse_with("Content-Type: text/plain\r\n\r\nhi", &options)?;
//! assert_eq!(envelope.text(), Some("hi"));
//! # Ok::<(), mailsift_mime::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod content_type;
mod envelope;
mod error;
mod header;
mod ledger;
mod multipart;
mod options;
mod part;

pub mod charset;
pub mod encoding;
pub mod html;

pub use content_type::{ContentDisposition, ContentType, Disposition, Parameters};
pub use encoding::TransferEncoding;
pub use envelope::Envelope;
pub use error::{Error, Result};
pub use header::{HeaderField, Headers};
pub use ledger::{Finding, FindingKind, Ledger, Severity};
pub use options::{DEFAULT_MAX_DEPTH, ParserOptions, ParserOptionsBuilder};
pub use part::{Content, Part, PartId, PartRole};
