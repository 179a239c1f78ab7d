//! UUID v7 identifiers.
//!
//! Records and tags use UUIDv7 so that primary keys sort in creation order.

use uuid::Uuid;

#[inline]
pub fn new_v7() -> Uuid {
    Uuid::now_v7()
}
