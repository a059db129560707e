//! Speech synthesis stages

mod azure;

pub use azure::{build_ssml, AzureTts, TtsError};
