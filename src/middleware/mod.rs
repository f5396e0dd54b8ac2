pub mod request_context;
pub mod requester;

pub use request_context::{make_request_span, request_context_middleware, RequestId, REQUEST_ID_HEADER};
pub use requester::{Requester, USER_ID_HEADER};
