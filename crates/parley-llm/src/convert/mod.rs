//! Conversions between the IR and each vendor's wire format

pub mod anthropic;
pub mod google;
pub mod openai;
