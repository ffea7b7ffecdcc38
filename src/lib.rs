pub mod converter;
pub mod session;

pub use converter::{
    classify, diagnose_environment, ConvertError, FetchOutcome, Limits, NullProgress,
    ProgressSink, UrlIntent, UrlKind,
};
pub use session::{Converter, Delivery, SessionContext};
