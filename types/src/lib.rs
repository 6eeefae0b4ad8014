use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

/// Client-held reactive state, as exchanged with the browser.
///
/// Always a JSON object. Arrays, strings and other JSON values are not
/// accepted as signals.
pub type SignalSet = serde_json::Map<String, serde_json::Value>;

/// Identifier for each event stream session (one per SSE connection).
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct SessionKey(pub Uuid);

impl SessionKey {
    #[cfg(feature = "uuid-v4")]
    pub fn new() -> Self {
        SessionKey(Uuid::new_v4())
    }
}

#[cfg(feature = "uuid-v4")]
impl Default for SessionKey {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Outcome of reading signals from a request.
///
/// Serializes as `{"success":true,"signals":{..}}` or
/// `{"success":false,"error":".."}`.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalReadResult {
    /// The signals sent by the client.
    Success(SignalSet),
    /// Why the signals could not be read.
    Failure(String),
}

impl SignalReadResult {
    pub fn is_success(&self) -> bool {
        matches!(self, SignalReadResult::Success(_))
    }

    pub fn signals(&self) -> Option<&SignalSet> {
        match self {
            SignalReadResult::Success(signals) => Some(signals),
            SignalReadResult::Failure(_) => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            SignalReadResult::Success(_) => None,
            SignalReadResult::Failure(error) => Some(error),
        }
    }

    /// Convert into a `Result`, keeping the error message.
    pub fn into_result(self) -> Result<SignalSet, String> {
        match self {
            SignalReadResult::Success(signals) => Ok(signals),
            SignalReadResult::Failure(error) => Err(error),
        }
    }
}

impl<E: std::fmt::Display> From<Result<SignalSet, E>> for SignalReadResult {
    fn from(result: Result<SignalSet, E>) -> Self {
        match result {
            Ok(signals) => SignalReadResult::Success(signals),
            Err(e) => SignalReadResult::Failure(e.to_string()),
        }
    }
}

impl Serialize for SignalReadResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("SignalReadResult", 2)?;
        match self {
            SignalReadResult::Success(signals) => {
                state.serialize_field("success", &true)?;
                state.serialize_field("signals", signals)?;
            }
            SignalReadResult::Failure(error) => {
                state.serialize_field("success", &false)?;
                state.serialize_field("error", error)?;
            }
        }
        state.end()
    }
}
