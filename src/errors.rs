use ::hyper;
use thiserror::Error;

/// Possible errors
#[derive(Error, Debug)]
pub enum Error {
    /// A patch mode outside the set understood by the client.
    #[error("invalid patch mode `{0}`, valid modes are: outer, inner, replace, append, prepend, before, after, remove")]
    InvalidPatchMode(String),
    /// A required event field was missing or blank.
    #[error("{0} is required and cannot be empty")]
    MissingRequiredField(&'static str),
    /// Client signals (or a value to be sent as signals) were not valid JSON.
    #[error("invalid JSON in request: {0}")]
    InvalidJson(serde_json::Error),
    /// Client signals parsed as JSON but not as an object.
    #[error("expected object, got {0}")]
    NotARecord(&'static str),
    /// A read request carried no signals parameter.
    #[error("missing '{0}' query parameter")]
    MissingParameter(&'static str),
    /// The client went away or the stream was aborted.
    #[error("event stream aborted")]
    TransportAborted,
    /// The stream generator returned an error and no error handler was set.
    #[error("stream generator failed: {0}")]
    GeneratorFault(String),
    /// The request body could not be read.
    #[error("failed reading request body: {0}")]
    Transport(String),
    /// A wrapped error from the hyper crate
    #[error("hyper error `{0}`")]
    Hyper(hyper::Error),
    /// A wrapped error from the http crate
    #[error("http error `{0}`")]
    Http(http::Error),
}

impl From<hyper::Error> for Error {
    fn from(orig: hyper::Error) -> Error {
        Error::Hyper(orig)
    }
}

impl From<http::Error> for Error {
    fn from(orig: http::Error) -> Error {
        Error::Http(orig)
    }
}

impl From<serde_json::Error> for Error {
    fn from(orig: serde_json::Error) -> Error {
        Error::InvalidJson(orig)
    }
}
