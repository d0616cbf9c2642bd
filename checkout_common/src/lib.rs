mod krw;

pub mod op;
mod secret;

pub use krw::{Krw, KrwConversionError, KRW_CURRENCY_CODE, KRW_CURRENCY_CODE_LOWER};
pub use secret::Secret;
