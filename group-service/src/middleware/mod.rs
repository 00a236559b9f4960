pub mod actor;

pub use actor::{Actor, AUDIT_ID_HEADER, USER_ID_HEADER};
