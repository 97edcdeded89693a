//! Wire-format layer: line framing, frame classification, and the credential
//! payload codecs.
//!
//! Nothing in this module does I/O or timing. These are the pure pieces the
//! session layer drives:
//! - `line`: newline framing with a hard per-line byte cap.
//! - `frame`: phase-gated classification of one line into a handshake frame.
//! - `creds`: the credential payload value, with validated names and a
//!   redacting `Debug`.
//! - `codec`: the two payload encodings (single-line JSON and the legacy
//!   `+CRED` block), behind one push-style decoder.

pub mod codec;
pub mod creds;
pub mod frame;
pub mod line;

pub use codec::{encode_lines, DecodeError, PayloadDecoder, WireFormat};
pub use creds::CredentialSet;
pub use frame::{classify, Frame, Phase};
