use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Partition identifier within the source topic.
pub type PartitionId = i32;

/// Position of a message within a partition. One per appended message,
/// never decreasing.
pub type Offset = i64;

/// One raw message pulled from the source queue. The payload is opaque
/// until the codec decodes it.
#[derive(Debug, Clone)]
pub struct SourceMessage {
    pub partition: PartitionId,
    pub offset: Offset,
    pub payload: Vec<u8>,
}

/// A decoded user record. `id` is the sink primary key; every other field
/// is nullable text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: Uuid,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub gender: Option<String>,
    pub address: Option<String>,
    pub post_code: Option<String>,
    pub email: Option<String>,
    pub username: Option<String>,
    pub dob: Option<String>,
    pub registered_date: Option<String>,
    pub phone: Option<String>,
    pub picture: Option<String>,
}
