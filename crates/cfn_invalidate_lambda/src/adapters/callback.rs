use crate::runtime::contract::CallbackRequest;

pub trait CallbackTransport {
    /// Sends the PUT once and returns the HTTP status code of the response.
    fn put(&self, request: &CallbackRequest) -> Result<u16, String>;
}
