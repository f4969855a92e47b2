use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Terminal session failures. Once raised, detection stays frozen until the
/// session is explicitly restarted.
#[derive(Error, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionFailure {
    #[error("face is likely a photo/image")]
    Liveness,
    #[error("multiple faces detected in frame")]
    MultiFaceSustained,
    #[error("tab inactive too often")]
    TabInactivity,
}

impl SessionFailure {
    pub fn reason(&self) -> String {
        self.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reasons_are_human_readable() {
        assert_eq!(
            SessionFailure::Liveness.reason(),
            "face is likely a photo/image"
        );
        assert_eq!(
            SessionFailure::MultiFaceSustained.reason(),
            "multiple faces detected in frame"
        );
        assert_eq!(
            SessionFailure::TabInactivity.reason(),
            "tab inactive too often"
        );
    }

    #[test]
    fn test_serializes_as_snake_case() {
        assert_eq!(
            serde_json::to_string(&SessionFailure::MultiFaceSustained).unwrap(),
            r#""multi_face_sustained""#
        );
    }
}
