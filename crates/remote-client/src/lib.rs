//! HTTP implementation of [`sync_core::RemoteClient`].
//!
//! Speaks the CRM REST API: records are exchanged in `{"data": [...]}`
//! envelopes, listings carry `{"info": {"more_records": ...}}`, and requests
//! are authorized with an OAuth access token.

mod client;
mod response;

pub use client::{HttpRemoteClient, AUTH_SCHEME};
pub use response::{parse_deleted_page, parse_record_page, parse_save_results};
