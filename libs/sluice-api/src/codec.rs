use serde_json::Value;
use uuid::Uuid;

use crate::error::DecodeError;
use crate::record::UserRecord;

/// Decode one raw payload into a [`UserRecord`].
///
/// The payload must be a JSON object carrying a UUID `id`; anything else is
/// a decode failure. Every other field of the fixed schema is projected as
/// nullable text: absent or non-string values become `None`, never an
/// error. Pure function, no side effects.
pub fn decode(raw: &[u8]) -> Result<UserRecord, DecodeError> {
    let value: Value = serde_json::from_slice(raw)?;
    let obj = value.as_object().ok_or(DecodeError::NotAnObject)?;

    let id = obj
        .get("id")
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingId)?;
    let id = Uuid::parse_str(id).map_err(|_| DecodeError::InvalidId(id.to_string()))?;

    Ok(UserRecord {
        id,
        first_name: text_field(obj, "first_name"),
        last_name: text_field(obj, "last_name"),
        gender: text_field(obj, "gender"),
        address: text_field(obj, "address"),
        post_code: text_field(obj, "post_code"),
        email: text_field(obj, "email"),
        username: text_field(obj, "username"),
        dob: text_field(obj, "dob"),
        registered_date: text_field(obj, "registered_date"),
        phone: text_field(obj, "phone"),
        picture: text_field(obj, "picture"),
    })
}

fn text_field(obj: &serde_json::Map<String, Value>, name: &str) -> Option<String> {
    obj.get(name).and_then(Value::as_str).map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "8ec2e2af-6d4f-43fe-b3c3-3d754b7c79b3";

    #[test]
    fn decodes_full_record() {
        let raw = format!(
            r#"{{"id":"{ID}","first_name":"Ann","last_name":"Lee","gender":"female",
                "address":"1 Main St","post_code":"90210","email":"a@x.com",
                "username":"ann","dob":"1990-01-01","registered_date":"2020-05-05",
                "phone":"555-0100","picture":"http://example.com/p.jpg"}}"#
        );
        let record = decode(raw.as_bytes()).unwrap();
        assert_eq!(record.id, Uuid::parse_str(ID).unwrap());
        assert_eq!(record.first_name.as_deref(), Some("Ann"));
        assert_eq!(record.picture.as_deref(), Some("http://example.com/p.jpg"));
    }

    #[test]
    fn absent_fields_become_null() {
        let raw = format!(r#"{{"id":"{ID}","first_name":"Ann","email":"a@x.com"}}"#);
        let record = decode(raw.as_bytes()).unwrap();
        assert_eq!(record.first_name.as_deref(), Some("Ann"));
        assert_eq!(record.email.as_deref(), Some("a@x.com"));
        assert_eq!(record.last_name, None);
        assert_eq!(record.phone, None);
    }

    #[test]
    fn mistyped_fields_become_null() {
        let raw = format!(r#"{{"id":"{ID}","first_name":42,"post_code":90210,"phone":null}}"#);
        let record = decode(raw.as_bytes()).unwrap();
        assert_eq!(record.first_name, None);
        assert_eq!(record.post_code, None);
        assert_eq!(record.phone, None);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(matches!(decode(b"not json {"), Err(DecodeError::Json(_))));
    }

    #[test]
    fn non_object_json_is_an_error() {
        assert!(matches!(decode(b"[1,2,3]"), Err(DecodeError::NotAnObject)));
        assert!(matches!(decode(b"\"hello\""), Err(DecodeError::NotAnObject)));
    }

    #[test]
    fn missing_or_invalid_id_is_an_error() {
        assert!(matches!(
            decode(br#"{"first_name":"Ann"}"#),
            Err(DecodeError::MissingId)
        ));
        assert!(matches!(
            decode(br#"{"id":7}"#),
            Err(DecodeError::MissingId)
        ));
        assert!(matches!(
            decode(br#"{"id":"not-a-uuid"}"#),
            Err(DecodeError::InvalidId(_))
        ));
    }
}
