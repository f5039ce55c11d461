pub type Result<T> = std::result::Result<T, GenerationError>;

/// Fault raised anywhere on the encode -> generate -> decode path.
///
/// The variants keep the failing stage distinguishable for logs and tests;
/// the generation endpoint collapses them into a single `error` string on
/// the wire, so no variant ever surfaces as a transport-level failure.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("Tokenization error: {0}")]
    Tokenization(String),

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Decoding error: {0}")]
    Decoding(String),
}

impl From<candle_core::Error> for GenerationError {
    fn from(err: candle_core::Error) -> Self {
        Self::Inference(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_name_the_failing_stage() {
        let err = GenerationError::Tokenization("bad byte".to_string());
        assert_eq!(err.to_string(), "Tokenization error: bad byte");

        let err = GenerationError::Inference("shape mismatch".to_string());
        assert_eq!(err.to_string(), "Inference error: shape mismatch");

        let err = GenerationError::Decoding("invalid id".to_string());
        assert_eq!(err.to_string(), "Decoding error: invalid id");
    }
}
