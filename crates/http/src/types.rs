//! Wire types of the auth service endpoints the client itself talks to

use serde::{Deserialize, Serialize};

/// Body returned by the refresh endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshResponse {
    #[serde(rename = "accessToken", alias = "access_token")]
    pub access_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_response_field_names() {
        let camel: RefreshResponse = serde_json::from_str(r#"{"accessToken":"abc"}"#).unwrap();
        assert_eq!(camel.access_token, "abc");

        let snake: RefreshResponse = serde_json::from_str(r#"{"access_token":"def"}"#).unwrap();
        assert_eq!(snake.access_token, "def");

        let json = serde_json::to_value(&camel).unwrap();
        assert_eq!(json["accessToken"], "abc");
    }
}
