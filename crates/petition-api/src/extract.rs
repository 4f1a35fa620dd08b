use axum::{
    extract::{FromRequestParts, Path},
    http::request::Parts,
};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use petition_types::schema::check_against_schema;

use crate::error::{ApiError, ApiResult};

/// Positive integer id from the `{id}` path segment. Anything else is
/// answered as a missing resource.
#[derive(Debug, Clone, Copy)]
pub struct ResourceId(pub i64);

impl<S> FromRequestParts<S> for ResourceId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|_| ApiError::NotFound)?;

        match raw.parse::<i64>() {
            Ok(id) if id > 0 => Ok(ResourceId(id)),
            _ => Err(ApiError::NotFound),
        }
    }
}

/// Parses a JSON body, checks it against the named schema fragment and
/// deserializes the cleaned object. An empty body is read as `{}`.
pub fn validated_body<T>(body: &Bytes, schema: &str, require_not_empty: bool) -> ApiResult<T>
where
    T: DeserializeOwned,
{
    let value = parse_json(body)?;
    validated_value(&value, schema, require_not_empty)
}

pub fn parse_json(body: &Bytes) -> ApiResult<Value> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Map::new()));
    }
    serde_json::from_slice(body).map_err(|e| ApiError::bad_request(format!("invalid JSON: {}", e)))
}

pub fn validated_value<T>(value: &Value, schema: &str, require_not_empty: bool) -> ApiResult<T>
where
    T: DeserializeOwned,
{
    let cleaned =
        check_against_schema(schema, value, require_not_empty).map_err(ApiError::BadRequest)?;
    serde_json::from_value(Value::Object(cleaned)).map_err(|e| ApiError::bad_request(e.to_string()))
}

/// Minimal shape check; an address only has to contain `@`.
pub fn check_email(email: &str) -> ApiResult<()> {
    if email.contains('@') {
        Ok(())
    } else {
        Err(ApiError::bad_request("email must be a valid email address"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use petition_types::api::{LoginRequest, PatchPetitionRequest};
    use petition_types::schema::{LOGIN, PATCH_PETITION};

    #[test]
    fn blank_body_reads_as_empty_object() {
        assert_eq!(parse_json(&Bytes::from_static(b"  \n")).unwrap(), Value::Object(Map::new()));
    }

    #[test]
    fn malformed_json_is_a_bad_request() {
        let err = parse_json(&Bytes::from_static(b"{not json")).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[test]
    fn body_is_validated_then_deserialized() {
        let body = Bytes::from_static(br#"{"email":"a@b.c","password":"pw","extra":1}"#);
        let req: LoginRequest = validated_body(&body, LOGIN, true).unwrap();
        assert_eq!(req.email, "a@b.c");

        let empty = Bytes::new();
        let err = validated_body::<PatchPetitionRequest>(&empty, PATCH_PETITION, true).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(ref m) if m == "no valid fields provided"));
    }

    #[test]
    fn email_needs_an_at_sign() {
        assert!(check_email("someone@example.com").is_ok());
        assert!(check_email("someone.example.com").is_err());
    }
}
