//! The `{code, message, data}` wrapper returned by every REST endpoint.

use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Envelope code signalling success.
pub const CODE_OK: u16 = 200;

/// Uniform response wrapper. `code == 200` means success and `data` carries
/// the payload; any other code is a business failure described by `message`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub code: u16,
    #[serde(default)]
    pub message: String,
    // No `default` attribute here: serde already yields `None` for a missing
    // Option field, and the attribute would impose `T: Default` on callers.
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    pub fn is_ok(&self) -> bool {
        self.code == CODE_OK
    }

    /// Unwrap the envelope per the RPC contract: success yields the payload
    /// (which may legitimately be absent), anything else becomes
    /// [`ApiError::Business`] carrying the server-supplied message.
    pub fn into_result(self) -> Result<Option<T>, ApiError> {
        if self.is_ok() {
            Ok(self.data)
        } else {
            Err(ApiError::Business {
                code: self.code,
                message: self.message,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_unwraps_data() {
        let env: Envelope<String> =
            serde_json::from_str(r#"{"code":200,"message":"success","data":"ok"}"#).unwrap();
        assert_eq!(env.into_result().unwrap(), Some("ok".to_string()));
    }

    #[test]
    fn success_without_data_is_none() {
        let env: Envelope<String> = serde_json::from_str(r#"{"code":200,"message":""}"#).unwrap();
        assert_eq!(env.into_result().unwrap(), None);

        let env: Envelope<String> =
            serde_json::from_str(r#"{"code":200,"message":"","data":null}"#).unwrap();
        assert_eq!(env.into_result().unwrap(), None);
    }

    #[test]
    fn payload_type_needs_no_default_impl() {
        #[derive(Debug, PartialEq, Deserialize)]
        struct Payload {
            id: String,
        }

        let env: Envelope<Payload> =
            serde_json::from_str(r#"{"code":200,"message":"","data":{"id":"u1"}}"#).unwrap();
        assert_eq!(env.into_result().unwrap(), Some(Payload { id: "u1".into() }));

        // A missing data field still decodes for payloads without Default.
        let env: Envelope<Payload> = serde_json::from_str(r#"{"code":200,"message":""}"#).unwrap();
        assert!(env.into_result().unwrap().is_none());
    }

    #[test]
    fn non_200_surfaces_the_server_message() {
        let env: Envelope<String> =
            serde_json::from_str(r#"{"code":500,"message":"nickname taken"}"#).unwrap();
        assert_eq!(
            env.into_result().unwrap_err(),
            ApiError::Business {
                code: 500,
                message: "nickname taken".into()
            }
        );
    }
}
