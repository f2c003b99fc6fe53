//! Payload codecs.
//!
//! A consumer is instantiated for one value type; that type decides how
//! raw stream payloads become typed values by implementing [`Decode`].
//! [`Encode`] is the producer-side counterpart.

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Turn raw payload bytes into a typed value.
pub trait Decode: Sized {
    type Error: std::error::Error + Send + Sync + 'static;

    fn decode(bytes: &[u8]) -> Result<Self, Self::Error>;
}

/// Turn a typed value into raw payload bytes.
pub trait Encode {
    type Error: std::error::Error + Send + Sync + 'static;

    fn encode(&self) -> Result<Vec<u8>, Self::Error>;
}

/// Payloads carried as JSON documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Json<T>(pub T);

impl<T> Json<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T: DeserializeOwned> Decode for Json<T> {
    type Error = serde_json::Error;

    fn decode(bytes: &[u8]) -> Result<Self, Self::Error> {
        serde_json::from_slice(bytes).map(Json)
    }
}

impl<T: Serialize> Encode for Json<T> {
    type Error = serde_json::Error;

    fn encode(&self) -> Result<Vec<u8>, Self::Error> {
        serde_json::to_vec(&self.0)
    }
}

impl Decode for String {
    type Error = std::string::FromUtf8Error;

    fn decode(bytes: &[u8]) -> Result<Self, Self::Error> {
        String::from_utf8(bytes.to_vec())
    }
}

impl Encode for String {
    type Error = std::convert::Infallible;

    fn encode(&self) -> Result<Vec<u8>, Self::Error> {
        Ok(self.as_bytes().to_vec())
    }
}

impl Decode for Vec<u8> {
    type Error = std::convert::Infallible;

    fn decode(bytes: &[u8]) -> Result<Self, Self::Error> {
        Ok(bytes.to_vec())
    }
}
